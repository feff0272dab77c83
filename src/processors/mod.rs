//! Data processing stages.

pub mod classification;
pub mod clustering;
pub mod filtering;

// Re-export key types for convenience
pub use classification::{classify_cones, Classification, ClusterExtents, ConeCluster};
pub use clustering::{dbscan, Clustering, ClusteringParams, NeighborSearch, NOISE};
pub use filtering::{filter_by_confidence, remove_ground};
