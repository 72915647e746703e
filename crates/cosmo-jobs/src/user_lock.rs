//! Per-user mutual exclusion for projection jobs.
//!
//! A LEARNING pass and a concurrent TRANSFORMING pass for the same user must
//! not race on the transformation matrix record; jobs for different users are
//! fully independent. The registry hands out one async mutex per user id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Registry of per-user async locks.
#[derive(Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `user_id`, waiting if another job for the same
    /// user is in flight. The guard releases on drop.
    pub async fn lock(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().expect("user lock registry poisoned");
            map.entry(user_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    /// Number of users with a registered lock (for introspection/tests).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("user lock registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
