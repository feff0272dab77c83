//! Deterministic DBSCAN clustering for 3D point clouds.
//!
//! This module implements DBSCAN in two phases:
//! - Neighbourhood queries, answered by a `kiddo` KD-tree (or a brute-force
//!   scan) and optionally spread across the `rayon` thread pool
//! - Cluster expansion, which is strictly serial and walks points in input
//!   order, so labels never depend on thread scheduling
//!
//! # Example
//!
//! ```
//! use cone_detect::processors::clustering::{dbscan, ClusteringParams, NOISE};
//!
//! let coords = vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [100.0, 100.0, 100.0]];
//! let clustering = dbscan(&coords, &ClusteringParams::new(5.0, 2)).unwrap();
//! assert_eq!(clustering.labels, vec![0, 0, NOISE]);
//! ```

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use log::debug;
use rayon::prelude::*;

use crate::config::{ClusteringConfig, ConfigError, NeighborStrategy};

/// Label of points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Internal marker for points not reached yet.
const UNLABELED: i32 = -2;

/// Relative slack on the KD-tree query radius. Candidates are re-checked
/// with the exact predicate, so the slack only has to cover rounding.
const KD_QUERY_SLACK: f32 = 1e-3;

/// Parameters for a single DBSCAN run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusteringParams {
    /// Neighbourhood radius (inclusive)
    pub eps: f32,
    /// Minimum neighbourhood size, the point itself included
    pub min_points: usize,
    /// Neighbourhood query backend
    pub strategy: NeighborStrategy,
    /// Answer neighbourhood queries on the rayon pool
    pub parallel: bool,
}

impl ClusteringParams {
    pub fn new(eps: f32, min_points: usize) -> Self {
        Self {
            eps,
            min_points,
            strategy: NeighborStrategy::KdTree,
            parallel: true,
        }
    }

    pub fn with_strategy(mut self, strategy: NeighborStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(ConfigError::InvalidEps(self.eps));
        }
        if self.min_points < 1 {
            return Err(ConfigError::InvalidMinPoints(self.min_points));
        }
        Ok(())
    }
}

impl From<&ClusteringConfig> for ClusteringParams {
    fn from(config: &ClusteringConfig) -> Self {
        Self {
            eps: config.eps,
            min_points: config.min_points,
            strategy: config.strategy,
            parallel: config.parallel,
        }
    }
}

#[inline]
fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Radius query over a fixed set of points.
///
/// Every implementation must return exactly the indices `j` with
/// `squared_distance(coords[i], coords[j]) <= eps²`, `i` included, in
/// ascending order. Strategies are interchangeable only because of this.
pub trait NeighborSearch: Sync {
    /// Number of indexed points.
    fn len(&self) -> usize;

    /// Neighbourhood of point `i`.
    fn neighbors(&self, i: usize) -> Vec<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exhaustive O(n²) neighbourhood search.
pub struct BruteForceSearch<'a> {
    coords: &'a [[f32; 3]],
    eps_sq: f32,
}

impl<'a> BruteForceSearch<'a> {
    pub fn new(coords: &'a [[f32; 3]], eps: f32) -> Self {
        Self {
            coords,
            eps_sq: eps * eps,
        }
    }
}

impl NeighborSearch for BruteForceSearch<'_> {
    fn len(&self) -> usize {
        self.coords.len()
    }

    fn neighbors(&self, i: usize) -> Vec<usize> {
        let query = &self.coords[i];
        self.coords
            .iter()
            .enumerate()
            .filter(|(_, c)| squared_distance(query, c) <= self.eps_sq)
            .map(|(j, _)| j)
            .collect()
    }
}

/// KD-tree neighbourhood search backed by `kiddo`.
pub struct KdTreeSearch<'a> {
    coords: &'a [[f32; 3]],
    tree: ImmutableKdTree<f32, 3>,
    eps_sq: f32,
    query_radius: f32,
}

impl<'a> KdTreeSearch<'a> {
    /// Build the tree. O(n log n).
    pub fn new(coords: &'a [[f32; 3]], eps: f32) -> Self {
        let eps_sq = eps * eps;
        Self {
            coords,
            tree: ImmutableKdTree::new_from_slice(coords),
            eps_sq,
            query_radius: eps_sq * (1.0 + KD_QUERY_SLACK),
        }
    }
}

impl NeighborSearch for KdTreeSearch<'_> {
    fn len(&self) -> usize {
        self.coords.len()
    }

    fn neighbors(&self, i: usize) -> Vec<usize> {
        let query = &self.coords[i];
        let mut found: Vec<usize> = self
            .tree
            .within::<SquaredEuclidean>(query, self.query_radius)
            .iter()
            .map(|nn| nn.item as usize)
            .filter(|&j| squared_distance(query, &self.coords[j]) <= self.eps_sq)
            .collect();
        found.sort_unstable();
        found
    }
}

/// Answer every neighbourhood query, in input order.
pub fn neighborhoods<S: NeighborSearch>(search: &S, parallel: bool) -> Vec<Vec<usize>> {
    if parallel {
        (0..search.len())
            .into_par_iter()
            .map(|i| search.neighbors(i))
            .collect()
    } else {
        (0..search.len()).map(|i| search.neighbors(i)).collect()
    }
}

/// Result of a DBSCAN run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clustering {
    /// Cluster id per point, `NOISE` for outliers. Ids are dense from 0 in
    /// order of discovery.
    pub labels: Vec<i32>,
    /// Number of clusters formed.
    pub num_clusters: usize,
    /// Whether each point is a core point.
    pub core_mask: Vec<bool>,
}

impl Clustering {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// Point count of each cluster, indexed by cluster id.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.num_clusters];
        for &label in &self.labels {
            if label >= 0 {
                sizes[label as usize] += 1;
            }
        }
        sizes
    }

    /// Indices of the points labeled `cluster`.
    pub fn members(&self, cluster: i32) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(move |&(_, &l)| cluster >= 0 && l == cluster)
            .map(|(i, _)| i)
    }
}

/// Serial DBSCAN expansion over precomputed neighbourhoods.
///
/// Points are visited in input order. A non-core point is provisionally
/// noise when first visited; a later expansion can still claim it as a
/// border point.
pub fn expand_clusters(neighbors: &[Vec<usize>], min_points: usize) -> Clustering {
    let n = neighbors.len();
    let core_mask: Vec<bool> = neighbors.iter().map(|nb| nb.len() >= min_points).collect();

    let mut labels = vec![UNLABELED; n];
    let mut visited = vec![false; n];
    let mut frontier: Vec<usize> = Vec::new();
    let mut next_cluster: i32 = 0;

    for p in 0..n {
        if visited[p] {
            continue;
        }
        visited[p] = true;

        if !core_mask[p] {
            labels[p] = NOISE;
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        labels[p] = cluster;
        frontier.extend_from_slice(&neighbors[p]);

        while let Some(q) = frontier.pop() {
            if !visited[q] {
                visited[q] = true;
                if core_mask[q] {
                    // Points that already carry a cluster id were expanded already
                    frontier.extend(neighbors[q].iter().copied().filter(|&r| labels[r] < 0));
                }
            }
            if labels[q] == UNLABELED || labels[q] == NOISE {
                labels[q] = cluster;
            }
        }
    }

    debug_assert!(labels.iter().all(|&l| l != UNLABELED));

    Clustering {
        labels,
        num_clusters: next_cluster as usize,
        core_mask,
    }
}

/// DBSCAN over 3D Euclidean distance.
///
/// # Errors
///
/// Returns `ConfigError` if `eps` is not a positive finite number or
/// `min_points` is zero. An empty input is not an error.
///
/// # Performance
///
/// - KD-tree build: O(n log n)
/// - Queries: O(log n + k) each, parallel when `params.parallel`
/// - Expansion: O(total neighbourhood size), serial
pub fn dbscan(coords: &[[f32; 3]], params: &ClusteringParams) -> Result<Clustering, ConfigError> {
    params.validate()?;

    if coords.is_empty() {
        return Ok(Clustering::default());
    }

    let neighbors = match params.strategy {
        NeighborStrategy::KdTree => {
            neighborhoods(&KdTreeSearch::new(coords, params.eps), params.parallel)
        }
        NeighborStrategy::BruteForce => {
            neighborhoods(&BruteForceSearch::new(coords, params.eps), params.parallel)
        }
    };

    let total: usize = neighbors.iter().map(Vec::len).sum();
    debug!(
        "DBSCAN: {} points, mean neighbourhood size {:.1} ({:?}, parallel={})",
        coords.len(),
        total as f64 / coords.len() as f64,
        params.strategy,
        params.parallel
    );

    Ok(expand_clusters(&neighbors, params.min_points))
}

/// True if two labelings describe the same partition: same noise set and
/// the same grouping of clustered points, up to renaming of cluster ids.
pub fn same_partition(a: &[i32], b: &[i32]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let size = a.iter().chain(b).copied().max().unwrap_or(-1).max(-1) + 1;
    let mut a_to_b = vec![None; size as usize];
    let mut b_to_a = vec![None; size as usize];

    for (&la, &lb) in a.iter().zip(b) {
        if (la == NOISE) != (lb == NOISE) {
            return false;
        }
        if la == NOISE {
            continue;
        }
        let (ia, ib) = (la as usize, lb as usize);
        match (a_to_b[ia], b_to_a[ib]) {
            (None, None) => {
                a_to_b[ia] = Some(lb);
                b_to_a[ib] = Some(la);
            }
            (Some(mb), Some(ma)) if mb == lb && ma == la => {}
            _ => return false,
        }
    }

    true
}
