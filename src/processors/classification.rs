//! Geometric classification of clusters into cone-like objects.
//!
//! A cluster is cone-like when its axis-aligned bounding box is narrow in
//! x and y and tall in z. All comparisons are strict, so a cluster sitting
//! exactly on a threshold is not a cone.

use log::info;
use serde::Serialize;

use crate::config::ConeConfig;
use crate::processors::clustering::NOISE;

/// Axis-aligned bounding box of a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterExtents {
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub point_count: usize,
}

impl ClusterExtents {
    fn from_point(p: &[f32; 3]) -> Self {
        Self {
            min: *p,
            max: *p,
            point_count: 1,
        }
    }

    fn include(mut self, p: &[f32; 3]) -> Self {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
        self.point_count += 1;
        self
    }

    /// Bounding box of the selected points, or `None` if there are none.
    pub fn fold<I>(coords: &[[f32; 3]], indices: I) -> Option<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        indices.into_iter().fold(None, |acc, i| {
            let p = &coords[i];
            Some(match acc {
                None => Self::from_point(p),
                Some(ext) => ext.include(p),
            })
        })
    }

    #[inline]
    pub fn x_range(&self) -> f32 {
        self.max[0] - self.min[0]
    }

    #[inline]
    pub fn y_range(&self) -> f32 {
        self.max[1] - self.min[1]
    }

    #[inline]
    pub fn z_range(&self) -> f32 {
        self.max[2] - self.min[2]
    }

    pub fn centre(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    /// Narrow in x and y, tall in z. Strict on every side.
    pub fn is_cone_like(&self, thresholds: &ConeConfig) -> bool {
        self.x_range() < thresholds.x_max
            && self.y_range() < thresholds.y_max
            && self.z_range() > thresholds.z_min
    }
}

/// Bounding boxes of every cluster, indexed by cluster id.
///
/// Computed in one pass over the labels. Noise points are skipped.
pub fn cluster_extents(
    coords: &[[f32; 3]],
    labels: &[i32],
    num_clusters: usize,
) -> Vec<Option<ClusterExtents>> {
    let mut extents: Vec<Option<ClusterExtents>> = vec![None; num_clusters];
    for (p, &label) in coords.iter().zip(labels) {
        if label < 0 {
            continue;
        }
        let slot = &mut extents[label as usize];
        *slot = Some(match slot.take() {
            None => ClusterExtents::from_point(p),
            Some(ext) => ext.include(p),
        });
    }
    extents
}

/// A cluster that passed the cone test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConeCluster {
    pub id: i32,
    pub point_count: usize,
    pub extents: ClusterExtents,
    /// Mean position of the member points.
    pub centroid: [f32; 3],
}

/// Mean position of each selected cluster; `None` for the others.
fn centroids(coords: &[[f32; 3]], labels: &[i32], selected: &[bool]) -> Vec<Option<[f32; 3]>> {
    let mut sums = vec![([0.0f64; 3], 0usize); selected.len()];
    for (p, &label) in coords.iter().zip(labels) {
        if label < 0 || !selected[label as usize] {
            continue;
        }
        let (sum, count) = &mut sums[label as usize];
        for axis in 0..3 {
            sum[axis] += p[axis] as f64;
        }
        *count += 1;
    }
    sums
        .into_iter()
        .zip(selected)
        .map(|((sum, count), &keep)| {
            (keep && count > 0).then(|| {
                let n = count as f64;
                [
                    (sum[0] / n) as f32,
                    (sum[1] / n) as f32,
                    (sum[2] / n) as f32,
                ]
            })
        })
        .collect()
}

/// Output of the shape classifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Per-point flag, true only for members of cone-like clusters.
    pub is_cone: Vec<bool>,
    /// Cone-like clusters in ascending id order.
    pub cones: Vec<ConeCluster>,
}

impl Classification {
    pub fn cone_points(&self) -> usize {
        self.is_cone.iter().filter(|&&c| c).count()
    }
}

/// Tag every member of a cone-like cluster.
///
/// `labels` must be parallel to `coords`; `num_clusters` is the number of
/// distinct non-noise ids. Each cone found is logged at `info`.
pub fn classify_cones(
    coords: &[[f32; 3]],
    labels: &[i32],
    num_clusters: usize,
    thresholds: &ConeConfig,
) -> Classification {
    debug_assert_eq!(coords.len(), labels.len());

    let candidates: Vec<(usize, ClusterExtents)> = cluster_extents(coords, labels, num_clusters)
        .into_iter()
        .enumerate()
        .filter_map(|(id, ext)| ext.map(|e| (id, e)))
        .filter(|(_, e)| e.is_cone_like(thresholds))
        .collect();

    let mut cone_ids = vec![false; num_clusters];
    for (id, _) in &candidates {
        cone_ids[*id] = true;
    }
    let means = centroids(coords, labels, &cone_ids);

    let cones: Vec<ConeCluster> = candidates
        .into_iter()
        .map(|(id, extents)| ConeCluster {
            id: id as i32,
            point_count: extents.point_count,
            extents,
            centroid: means[id].unwrap_or_else(|| extents.centre()),
        })
        .collect();

    for cone in &cones {
        info!(
            "Cone-like cluster: ID={}, points={}, centroid=({:.1}, {:.1}, {:.1}), x_range={}, y_range={}, z_range={}",
            cone.id,
            cone.point_count,
            cone.centroid[0],
            cone.centroid[1],
            cone.centroid[2],
            cone.extents.x_range(),
            cone.extents.y_range(),
            cone.extents.z_range()
        );
    }

    let is_cone: Vec<bool> = labels
        .iter()
        .map(|&l| l != NOISE && cone_ids[l as usize])
        .collect();

    let classification = Classification { is_cone, cones };
    info!(
        "Cones identified: {} ({} points)",
        classification.cones.len(),
        classification.cone_points()
    );
    classification
}
