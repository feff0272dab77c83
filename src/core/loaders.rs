//! Point cloud containers and the LiDAR CSV loader.
//!
//! This module provides:
//! - `Point`, a single immutable LiDAR return
//! - `PointCloud`, a structure-of-arrays cloud that remembers where each
//!   point came from in the input
//! - `RawRecord` and `load_lidar_csv` for reading frames whose rows may
//!   have missing fields

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Accepted header names for the confidence column, compared lowercase.
const CONFIDENCE_COLUMNS: &[&str] = &["confidence", "pfa", "probability of false alarm"];

/// A single LiDAR return.
///
/// `confidence` is the probability of false alarm: lower is more trustworthy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub confidence: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            z,
            confidence,
        }
    }

    #[inline]
    pub fn coords(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// One input row as read from disk. Any field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawRecord {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub confidence: Option<f32>,
}

impl RawRecord {
    pub fn new(x: f32, y: f32, z: f32, confidence: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            confidence: Some(confidence),
        }
    }

    /// The complete point, or `None` if any field is missing or not finite.
    pub fn to_point(&self) -> Option<Point> {
        let point = Point::new(self.x?, self.y?, self.z?, self.confidence?);
        let all_finite = point.x.is_finite()
            && point.y.is_finite()
            && point.z.is_finite()
            && point.confidence.is_finite();
        all_finite.then_some(point)
    }
}

/// Container for 3D point cloud data.
///
/// Points keep their input order. `source_index[i]` is the row of point `i`
/// in the original input, so filtered clouds can be traced back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
    /// Probability of false alarm of each point.
    pub confidence: Vec<f32>,
    /// Input row of each point.
    pub source_index: Vec<usize>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            confidence: Vec::with_capacity(capacity),
            source_index: Vec::with_capacity(capacity),
        }
    }

    /// Builds a cloud whose source indices are the positions in `points`.
    pub fn from_points(points: &[Point]) -> Self {
        let mut cloud = Self::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            cloud.push_indexed(*p, i);
        }
        cloud
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Appends a point whose source index is its position in this cloud.
    pub fn push(&mut self, point: Point) {
        let idx = self.len();
        self.push_indexed(point, idx);
    }

    /// Appends a point with an explicit source index.
    #[inline]
    pub fn push_indexed(&mut self, point: Point, source_index: usize) {
        self.x.push(point.x);
        self.y.push(point.y);
        self.z.push(point.z);
        self.confidence.push(point.confidence);
        self.source_index.push(source_index);
    }

    /// Returns point `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    #[inline]
    pub fn point(&self, i: usize) -> Point {
        Point::new(self.x[i], self.y[i], self.z[i], self.confidence[i])
    }

    /// Iterates over the points in order.
    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.len()).map(move |i| self.point(i))
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f32; 3]> {
        self.iter().map(|p| p.coords()).collect()
    }

    /// New cloud containing the points for which `keep` is true, in order.
    pub fn retain_by<F>(&self, mut keep: F) -> PointCloud
    where
        F: FnMut(&Point) -> bool,
    {
        let mut out = PointCloud::with_capacity(self.len());
        for (p, &source) in self.iter().zip(&self.source_index) {
            if keep(&p) {
                out.push_indexed(p, source);
            }
        }
        out
    }
}

/// Load LiDAR returns from a CSV file.
///
/// The header must name `x`, `y`, `z` and a confidence column (`confidence`,
/// `pfa` or `Probability of False Alarm`), case-insensitive. Empty or
/// unparseable cells become `None`; dropping such rows is left to the
/// pipeline so the count can be reported.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a required column is
/// absent, or the file has no data rows.
pub fn load_lidar_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let mut missing = Vec::new();
    let mut column = |name: &str| {
        let idx = col_map.get(name).copied();
        if idx.is_none() {
            missing.push(name.to_string());
        }
        idx
    };
    let x_idx = column("x");
    let y_idx = column("y");
    let z_idx = column("z");
    let conf_idx = CONFIDENCE_COLUMNS
        .iter()
        .find_map(|name| col_map.get(*name).copied());
    if conf_idx.is_none() {
        missing.push("confidence".to_string());
    }

    let (Some(x_idx), Some(y_idx), Some(z_idx), Some(conf_idx)) = (x_idx, y_idx, z_idx, conf_idx)
    else {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    };

    let mut records = Vec::with_capacity(10000);

    for result in reader.records() {
        let record = result?;
        let field = |idx: usize| record.get(idx).and_then(|s| s.trim().parse::<f32>().ok());

        records.push(RawRecord {
            x: field(x_idx),
            y: field(y_idx),
            z: field(z_idx),
            confidence: field(conf_idx),
        });
    }

    if records.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(records)
}
