//! Core data types and I/O operations.

pub mod loaders;
pub mod writers;

pub use loaders::{load_lidar_csv, LoaderError, Point, PointCloud, RawRecord};
pub use writers::{write_classified_csv, write_report_yaml, WriteError};
