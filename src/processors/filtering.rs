//! Per-point filters applied before clustering.
//!
//! Both filters are pure and order-preserving: the output is the
//! sub-sequence of input points that pass, with their source indices.

use crate::core::loaders::PointCloud;

/// Keep points whose probability of false alarm is at most `threshold`.
///
/// An empty result is valid and is returned as an empty cloud.
pub fn filter_by_confidence(cloud: &PointCloud, threshold: f32) -> PointCloud {
    cloud.retain_by(|p| p.confidence <= threshold)
}

/// Remove ground returns: keep points strictly above `ground_z`.
///
/// This is a flat cut in sensor coordinates. It assumes the ground is
/// level relative to the sensor origin; no plane is fitted.
pub fn remove_ground(cloud: &PointCloud, ground_z: f32) -> PointCloud {
    cloud.retain_by(|p| p.z > ground_z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::Point;

    fn sample_cloud() -> PointCloud {
        PointCloud::from_points(&[
            Point::new(0.0, 0.0, 0.0, 0.02),
            Point::new(1.0, 0.0, 100.0, 0.08),
            Point::new(2.0, 0.0, 800.0, 0.05),
            Point::new(3.0, 0.0, 500.0, 0.01),
            Point::new(4.0, 0.0, 501.0, 0.50),
            Point::new(5.0, 0.0, 900.0, 0.00),
        ])
    }

    #[test]
    fn test_confidence_filter_is_inclusive() {
        let filtered = filter_by_confidence(&sample_cloud(), 0.05);
        assert_eq!(filtered.x, vec![0.0, 2.0, 3.0, 5.0]);
        assert_eq!(filtered.source_index, vec![0, 2, 3, 5]);
    }

    #[test]
    fn test_confidence_filter_subset_and_bound() {
        let cloud = sample_cloud();
        for &tau in &[0.0f32, 0.01, 0.05, 0.1, 1.0] {
            let filtered = filter_by_confidence(&cloud, tau);
            assert!(filtered.len() <= cloud.len());
            assert!(filtered.confidence.iter().all(|&c| c <= tau));
            // Relative order preserved
            assert!(filtered.source_index.windows(2).all(|w| w[0] < w[1]));
            for (i, &src) in filtered.source_index.iter().enumerate() {
                assert_eq!(filtered.point(i), cloud.point(src));
            }
        }
    }

    #[test]
    fn test_confidence_filter_can_empty_the_cloud() {
        let filtered = filter_by_confidence(&sample_cloud(), -1.0);
        assert!(filtered.is_empty());

        let again = filter_by_confidence(&filtered, 0.5);
        assert!(again.is_empty());
    }

    #[test]
    fn test_remove_ground_is_strict() {
        let above = remove_ground(&sample_cloud(), 500.0);
        assert_eq!(above.z, vec![800.0, 501.0, 900.0]);
        assert_eq!(above.source_index, vec![2, 4, 5]);
    }

    #[test]
    fn test_remove_ground_on_empty_cloud() {
        let cloud = PointCloud::new();
        assert!(remove_ground(&cloud, 500.0).is_empty());
    }

    #[test]
    fn test_filters_compose_and_keep_original_indices() {
        let cloud = sample_cloud();
        let out = remove_ground(&filter_by_confidence(&cloud, 0.05), 50.0);
        assert_eq!(out.source_index, vec![2, 3, 5]);
    }
}
