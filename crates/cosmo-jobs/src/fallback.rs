//! Deterministic fallbacks for degraded projection cycles.
//!
//! When the reduction service is down the pipeline still owes every entity a
//! finite position; when an embedding never arrived it still owes the
//! reduction call an input vector. Both fallbacks are pure functions of their
//! inputs so repeated degraded cycles agree with each other.

use std::f64::consts::PI;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use cosmo_core::{defaults, Coord3};

/// Evenly distributed points on a golden-ratio (Fibonacci) sphere, scaled to
/// the batch size. Index-deterministic: the same `count` always yields the
/// same layout.
pub fn spiral_coordinates(count: usize) -> Vec<Coord3> {
    if count == 0 {
        return Vec::new();
    }

    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
    let radius = defaults::FALLBACK_RADIUS * (count as f64).cbrt();

    (0..count)
        .map(|i| {
            // y walks the sphere poles; the half-step offset keeps the first
            // and last points off the exact poles.
            let y = 1.0 - 2.0 * ((i as f64 + 0.5) / count as f64);
            let ring = (1.0 - y * y).sqrt();
            let theta = golden_angle * i as f64;
            Coord3::new(
                radius * ring * theta.cos(),
                radius * y,
                radius * ring * theta.sin(),
            )
        })
        .collect()
}

/// Deterministic unit pseudo-vector derived from an entity id.
///
/// SHA-256 in counter mode expands the 16-byte id to any dimensionality;
/// the result is normalized so magnitudes are comparable to real embeddings.
pub fn pseudo_vector(entity_id: Uuid, dimension: usize) -> Vec<f32> {
    if dimension == 0 {
        return Vec::new();
    }

    let mut values = Vec::with_capacity(dimension);
    let mut block: u32 = 0;
    while values.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(entity_id.as_bytes());
        hasher.update(block.to_le_bytes());
        let digest = hasher.finalize();

        for chunk in digest.chunks_exact(4) {
            if values.len() == dimension {
                break;
            }
            let n = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            values.push((n as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        block += 1;
    }

    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut values {
            *v /= norm;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spiral_empty() {
        assert!(spiral_coordinates(0).is_empty());
    }

    #[test]
    fn test_spiral_all_finite() {
        for count in [1, 2, 17, 500] {
            let coords = spiral_coordinates(count);
            assert_eq!(coords.len(), count);
            assert!(coords.iter().all(Coord3::is_finite), "count = {}", count);
        }
    }

    #[test]
    fn test_spiral_deterministic() {
        assert_eq!(spiral_coordinates(64), spiral_coordinates(64));
    }

    #[test]
    fn test_spiral_points_distinct() {
        let coords = spiral_coordinates(100);
        for i in 0..coords.len() {
            for j in (i + 1)..coords.len() {
                assert_ne!(coords[i], coords[j], "points {} and {} collide", i, j);
            }
        }
    }

    #[test]
    fn test_spiral_on_sphere_surface() {
        let count = 200;
        let radius = defaults::FALLBACK_RADIUS * (count as f64).cbrt();
        for c in spiral_coordinates(count) {
            let r = (c.x * c.x + c.y * c.y + c.z * c.z).sqrt();
            assert!((r - radius).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pseudo_vector_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(pseudo_vector(id, 768), pseudo_vector(id, 768));
    }

    #[test]
    fn test_pseudo_vector_distinct_ids_differ() {
        let a = pseudo_vector(Uuid::new_v4(), 64);
        let b = pseudo_vector(Uuid::new_v4(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_pseudo_vector_unit_norm() {
        let v = pseudo_vector(Uuid::new_v4(), 768);
        assert_eq!(v.len(), 768);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_pseudo_vector_odd_dimensions() {
        // Dimensions that don't divide the 32-byte digest evenly.
        for dim in [1, 7, 33, 100] {
            assert_eq!(pseudo_vector(Uuid::nil(), dim).len(), dim);
        }
    }

    #[test]
    fn test_pseudo_vector_zero_dimension() {
        assert!(pseudo_vector(Uuid::nil(), 0).is_empty());
    }
}
