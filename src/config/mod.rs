//! Configuration types for the cone detection pipeline.

use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::processors::clustering::ClusteringParams;

/// Errors raised when a configuration value cannot be used.
///
/// These are reported before any point is processed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("clustering eps must be a positive finite number, got {0}")]
    InvalidEps(f32),

    #[error("clustering min_points must be at least 1, got {0}")]
    InvalidMinPoints(usize),

    #[error("{name} must be a finite number, got {value}")]
    NonFinite { name: &'static str, value: f32 },
}

/// Acceptance threshold on the per-point probability of false alarm.
///
/// Serialized as `strict`, `moderate`, `allowing` or `!custom <value>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceThreshold {
    /// PFA <= 0.01
    Strict,
    /// PFA <= 0.05
    Moderate,
    /// PFA <= 0.10
    Allowing,
    /// Any value in [0, 1]
    Custom(f32),
}

impl ConfidenceThreshold {
    pub const STRICT: f32 = 0.01;
    pub const MODERATE: f32 = 0.05;
    pub const ALLOWING: f32 = 0.10;

    /// Raw value without range checking.
    pub fn value(&self) -> f32 {
        match *self {
            ConfidenceThreshold::Strict => Self::STRICT,
            ConfidenceThreshold::Moderate => Self::MODERATE,
            ConfidenceThreshold::Allowing => Self::ALLOWING,
            ConfidenceThreshold::Custom(v) => v,
        }
    }

    /// Resolve to a usable threshold.
    ///
    /// A custom value outside [0, 1] (or NaN) falls back to the moderate
    /// preset. The second element is the rejected value, if any.
    pub fn resolve(&self) -> (f32, Option<f32>) {
        match *self {
            ConfidenceThreshold::Custom(v) if !(0.0..=1.0).contains(&v) => {
                warn!(
                    "Custom confidence threshold {} is outside [0, 1]; using moderate ({})",
                    v,
                    Self::MODERATE
                );
                (Self::MODERATE, Some(v))
            }
            other => (other.value(), None),
        }
    }

    /// Parse a CLI-style value: a preset name or a bare number.
    ///
    /// Unrecognized text maps to moderate, mirroring the fallback of
    /// [`resolve`](Self::resolve).
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "1" => ConfidenceThreshold::Strict,
            "moderate" | "2" => ConfidenceThreshold::Moderate,
            "allowing" | "3" => ConfidenceThreshold::Allowing,
            other => match other.parse::<f32>() {
                Ok(v) => ConfidenceThreshold::Custom(v),
                Err(_) => {
                    warn!("Unrecognized confidence threshold '{}'; using moderate", s);
                    ConfidenceThreshold::Moderate
                }
            },
        }
    }
}

impl Default for ConfidenceThreshold {
    fn default() -> Self {
        ConfidenceThreshold::Moderate
    }
}

/// Configuration for the confidence filter and ground suppressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Maximum accepted probability of false alarm
    #[serde(default)]
    pub confidence: ConfidenceThreshold,

    /// Points with z at or below this height are treated as ground
    #[serde(default = "default_ground_z")]
    pub ground_z: f32,
}

fn default_ground_z() -> f32 {
    500.0
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            confidence: ConfidenceThreshold::default(),
            ground_z: default_ground_z(),
        }
    }
}

/// Neighbourhood query backend used by DBSCAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborStrategy {
    /// Exhaustive O(n²) scan
    BruteForce,
    /// kiddo KD-tree radius queries
    KdTree,
}

impl Default for NeighborStrategy {
    fn default() -> Self {
        NeighborStrategy::KdTree
    }
}

/// Configuration for DBSCAN clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusteringConfig {
    /// Neighbourhood radius
    #[serde(default = "default_eps")]
    pub eps: f32,

    /// Minimum neighbourhood size (including the point itself) for a core point
    #[serde(default = "default_min_points")]
    pub min_points: usize,

    /// Neighbourhood query backend
    #[serde(default)]
    pub strategy: NeighborStrategy,

    /// Run neighbourhood queries on the rayon thread pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_eps() -> f32 {
    700.0
}

fn default_min_points() -> usize {
    5
}

fn default_parallel() -> bool {
    true
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_points: default_min_points(),
            strategy: NeighborStrategy::default(),
            parallel: default_parallel(),
        }
    }
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ClusteringParams::from(self).validate()
    }
}

/// Bounding-box thresholds for cone-like clusters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConeConfig {
    /// Exclusive upper bound on the x extent
    #[serde(default = "default_x_max")]
    pub x_max: f32,

    /// Exclusive upper bound on the y extent
    #[serde(default = "default_y_max")]
    pub y_max: f32,

    /// Exclusive lower bound on the z extent
    #[serde(default = "default_z_min")]
    pub z_min: f32,
}

fn default_x_max() -> f32 {
    1500.0
}

fn default_y_max() -> f32 {
    1500.0
}

fn default_z_min() -> f32 {
    500.0
}

impl Default for ConeConfig {
    fn default() -> Self {
        Self {
            x_max: default_x_max(),
            y_max: default_y_max(),
            z_min: default_z_min(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub filtering: FilterConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub classification: ConeConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every parameter that would make a run meaningless.
    ///
    /// The confidence threshold is not checked here; it has a documented
    /// fallback instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("filtering.ground_z", self.filtering.ground_z)?;
        self.clustering.validate()?;
        check_finite("classification.x_max", self.classification.x_max)?;
        check_finite("classification.y_max", self.classification.y_max)?;
        check_finite("classification.z_min", self.classification.z_min)?;
        Ok(())
    }
}

fn check_finite(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { name, value })
    }
}
