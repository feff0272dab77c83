//! LiDAR cone detection pipeline.
//!
//! This crate provides tools for:
//! - Loading LiDAR returns from CSV, tolerating incomplete rows
//! - Filtering points by probability of false alarm and ground height
//! - DBSCAN clustering over 3D Euclidean distance (KD-tree or brute force,
//!   parallel neighbourhood queries)
//! - Classifying clusters as cones from their bounding-box extents
//!
//! # Example
//!
//! ```no_run
//! use cone_detect::{core::loaders::load_lidar_csv, Pipeline, PipelineConfig};
//!
//! let records = load_lidar_csv("frame.csv").unwrap();
//! let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
//! let output = pipeline.run(&records);
//! println!("{} cones", output.report.cones_identified);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod processors;
pub mod visualization;

pub use config::{ConfidenceThreshold, ConfigError, PipelineConfig};
pub use core::loaders::{Point, PointCloud, RawRecord};
pub use pipeline::{Pipeline, PipelineOutput, PipelineReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
