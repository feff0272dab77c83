//! End-to-end cone detection over one LiDAR frame.
//!
//! The pipeline runs four stages in a fixed order:
//!
//! 1. Confidence filter (probability of false alarm at most the threshold)
//! 2. Ground suppression (z strictly above `ground_z`)
//! 3. DBSCAN clustering
//! 4. Cone classification of each cluster's bounding box
//!
//! Configuration is validated once in [`Pipeline::new`]. After that a run
//! cannot fail: incomplete rows are dropped and counted, and empty
//! intermediate clouds flow through every later stage.

use log::{info, warn};
use serde::Serialize;

use crate::config::{ConfigError, PipelineConfig};
use crate::core::loaders::{PointCloud, RawRecord};
use crate::processors::classification::{classify_cones, ConeCluster};
use crate::processors::clustering::{dbscan, ClusteringParams, NOISE};
use crate::processors::filtering::{filter_by_confidence, remove_ground};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    ConfidenceFilter,
    GroundRemoval,
}

/// Recoverable problems noticed during a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// Input rows with a missing or non-finite field were dropped.
    IncompleteRecords { dropped: usize },
    /// The custom confidence threshold was out of range; moderate was used.
    ConfidenceFallback { requested: f32, used: f32 },
    /// A stage left no points for the stages after it. `received` is the
    /// number of points (or rows, for ingest) the stage was given.
    EmptyStage { stage: Stage, received: usize },
}

/// Summary counts of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub input_records: usize,
    pub dropped_incomplete: usize,
    pub confidence_threshold: f32,
    pub after_confidence: usize,
    pub after_ground: usize,
    pub clusters_formed: usize,
    pub noise_points: usize,
    /// Number of cone-like clusters.
    pub cones_identified: usize,
    /// Number of points belonging to cone-like clusters.
    pub cone_points: usize,
    pub warnings: Vec<DataQualityWarning>,
}

/// Annotated result of one run.
///
/// `labels` and `is_cone` are parallel to `cloud`, which holds the points
/// that survived both filters.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub cloud: PointCloud,
    pub labels: Vec<i32>,
    pub is_cone: Vec<bool>,
    pub cones: Vec<ConeCluster>,
    pub report: PipelineReport,
}

impl PipelineOutput {
    /// Indices into `cloud` of the points in cone-like clusters.
    pub fn cone_indices(&self) -> Vec<usize> {
        self.is_cone
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn noise_indices(&self) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == NOISE)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Validated pipeline, reusable across frames.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    threshold: f32,
    fallback: Option<f32>,
}

impl Pipeline {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unusable clustering radius, minimum
    /// point count, or a non-finite threshold. An out-of-range custom
    /// confidence threshold is not an error; it falls back to moderate.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (threshold, fallback) = config.filtering.confidence.resolve();
        Ok(Self {
            config,
            threshold,
            fallback,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Effective confidence threshold after preset resolution and fallback.
    pub fn confidence_threshold(&self) -> f32 {
        self.threshold
    }

    /// Run on raw input rows, dropping incomplete ones first.
    pub fn run(&self, records: &[RawRecord]) -> PipelineOutput {
        let mut cloud = PointCloud::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if let Some(point) = record.to_point() {
                cloud.push_indexed(point, i);
            }
        }

        let dropped = records.len() - cloud.len();
        let mut warnings = Vec::new();
        if dropped > 0 {
            warn!(
                "Missing values detected in the data. Dropped {} of {} rows.",
                dropped,
                records.len()
            );
            warnings.push(DataQualityWarning::IncompleteRecords { dropped });
        }
        if cloud.is_empty() {
            warnings.push(DataQualityWarning::EmptyStage {
                stage: Stage::Ingest,
                received: records.len(),
            });
        }

        self.execute(cloud, records.len(), dropped, warnings)
    }

    /// Run on a cloud whose points are already complete.
    pub fn run_cloud(&self, cloud: PointCloud) -> PipelineOutput {
        let input = cloud.len();
        let mut warnings = Vec::new();
        if cloud.is_empty() {
            warnings.push(DataQualityWarning::EmptyStage {
                stage: Stage::Ingest,
                received: 0,
            });
        }
        self.execute(cloud, input, 0, warnings)
    }

    fn execute(
        &self,
        cloud: PointCloud,
        input_records: usize,
        dropped_incomplete: usize,
        mut warnings: Vec<DataQualityWarning>,
    ) -> PipelineOutput {
        if let Some(requested) = self.fallback {
            warnings.push(DataQualityWarning::ConfidenceFallback {
                requested,
                used: self.threshold,
            });
        }

        info!(
            "Step 1: Filtering {} points on confidence <= {}",
            cloud.len(),
            self.threshold
        );
        let filtered = filter_by_confidence(&cloud, self.threshold);
        if filtered.is_empty() && !cloud.is_empty() {
            warnings.push(DataQualityWarning::EmptyStage {
                stage: Stage::ConfidenceFilter,
                received: cloud.len(),
            });
        }

        info!(
            "Step 2: Removing ground points (z <= {}) from {} points",
            self.config.filtering.ground_z,
            filtered.len()
        );
        let non_ground = remove_ground(&filtered, self.config.filtering.ground_z);
        if non_ground.is_empty() && !filtered.is_empty() {
            warnings.push(DataQualityWarning::EmptyStage {
                stage: Stage::GroundRemoval,
                received: filtered.len(),
            });
        }

        for warning in &warnings {
            if let DataQualityWarning::EmptyStage { stage, received } = warning {
                warn!(
                    "{:?} stage left no points out of {}; continuing with an empty cloud",
                    stage, received
                );
            }
        }

        info!("Step 3: Clustering {} points", non_ground.len());
        let coords = non_ground.to_coords();
        let params = ClusteringParams::from(&self.config.clustering);
        // Parameters were validated in Pipeline::new
        let clustering = dbscan(&coords, &params).unwrap_or_default();
        info!(
            "Clusters formed (excluding noise): {}",
            clustering.num_clusters
        );

        info!("Step 4: Identifying cone-like objects");
        let classification = classify_cones(
            &coords,
            &clustering.labels,
            clustering.num_clusters,
            &self.config.classification,
        );

        let report = PipelineReport {
            input_records,
            dropped_incomplete,
            confidence_threshold: self.threshold,
            after_confidence: filtered.len(),
            after_ground: non_ground.len(),
            clusters_formed: clustering.num_clusters,
            noise_points: clustering.noise_count(),
            cones_identified: classification.cones.len(),
            cone_points: classification.cone_points(),
            warnings,
        };

        PipelineOutput {
            cloud: non_ground,
            labels: clustering.labels,
            is_cone: classification.is_cone,
            cones: classification.cones,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfidenceThreshold;
    use crate::core::loaders::Point;

    fn config(ground_z: f32, eps: f32, min_points: usize) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.filtering.ground_z = ground_z;
        config.clustering.eps = eps;
        config.clustering.min_points = min_points;
        config
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert_eq!(
            Pipeline::new(config(500.0, 0.0, 5)).unwrap_err(),
            ConfigError::InvalidEps(0.0)
        );
        assert_eq!(
            Pipeline::new(config(500.0, 700.0, 0)).unwrap_err(),
            ConfigError::InvalidMinPoints(0)
        );
    }

    #[test]
    fn test_column_detected_as_cone() {
        let records: Vec<RawRecord> = (0..5)
            .map(|i| RawRecord::new(0.0, 0.0, i as f32 * 150.0, 0.02))
            .collect();

        let pipeline = Pipeline::new(config(-1.0, 200.0, 2)).unwrap();
        let output = pipeline.run(&records);

        assert_eq!(output.labels, vec![0; 5]);
        assert_eq!(output.is_cone, vec![true; 5]);
        assert_eq!(output.report.clusters_formed, 1);
        assert_eq!(output.report.cones_identified, 1);
        assert_eq!(output.report.cone_points, 5);
        assert!(output.report.warnings.is_empty());
    }

    #[test]
    fn test_incomplete_records_dropped_and_counted() {
        let mut records: Vec<RawRecord> = (0..6)
            .map(|i| RawRecord::new(0.0, 0.0, 600.0 + i as f32 * 120.0, 0.01))
            .collect();
        records.insert(2, RawRecord { z: None, ..RawRecord::new(0.0, 0.0, 900.0, 0.01) });
        records.push(RawRecord::default());

        let pipeline = Pipeline::new(config(500.0, 200.0, 2)).unwrap();
        let output = pipeline.run(&records);

        assert_eq!(output.report.input_records, 8);
        assert_eq!(output.report.dropped_incomplete, 2);
        assert_eq!(output.cloud.len(), 6);
        assert_eq!(output.cloud.source_index, vec![0, 1, 3, 4, 5, 6]);
        assert!(output
            .report
            .warnings
            .contains(&DataQualityWarning::IncompleteRecords { dropped: 2 }));
        assert_eq!(output.report.cones_identified, 1);
    }

    #[test]
    fn test_everything_filtered_still_runs_all_stages() {
        let records = vec![
            RawRecord::new(0.0, 0.0, 600.0, 0.9),
            RawRecord::new(0.0, 0.0, 700.0, 0.8),
        ];
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let output = pipeline.run(&records);

        assert!(output.cloud.is_empty());
        assert!(output.labels.is_empty());
        assert!(output.is_cone.is_empty());
        assert_eq!(output.report.after_confidence, 0);
        assert_eq!(output.report.after_ground, 0);
        assert_eq!(output.report.clusters_formed, 0);
        assert_eq!(output.report.cones_identified, 0);
        assert_eq!(
            output.report.warnings,
            vec![DataQualityWarning::EmptyStage {
                stage: Stage::ConfidenceFilter,
                received: 2,
            }]
        );
    }

    #[test]
    fn test_all_ground_yields_empty_result() {
        let cloud = PointCloud::from_points(&[
            Point::new(0.0, 0.0, 10.0, 0.01),
            Point::new(5.0, 0.0, 20.0, 0.01),
        ]);
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let output = pipeline.run_cloud(cloud);

        assert_eq!(output.report.after_confidence, 2);
        assert_eq!(output.report.after_ground, 0);
        assert!(output.labels.is_empty());
        assert_eq!(
            output.report.warnings,
            vec![DataQualityWarning::EmptyStage {
                stage: Stage::GroundRemoval,
                received: 2,
            }]
        );
    }

    #[test]
    fn test_empty_input() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let output = pipeline.run(&[]);
        assert!(output.cloud.is_empty());
        assert_eq!(output.report.input_records, 0);
        assert_eq!(
            output.report.warnings,
            vec![DataQualityWarning::EmptyStage {
                stage: Stage::Ingest,
                received: 0,
            }]
        );
    }

    #[test]
    fn test_all_incomplete_rows_reports_received_count() {
        let records = vec![RawRecord::default(); 3];
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let output = pipeline.run(&records);

        assert_eq!(
            output.report.warnings,
            vec![
                DataQualityWarning::IncompleteRecords { dropped: 3 },
                DataQualityWarning::EmptyStage {
                    stage: Stage::Ingest,
                    received: 3,
                },
            ]
        );
    }

    #[test]
    fn test_confidence_fallback_reported() {
        let mut cfg = config(500.0, 700.0, 5);
        cfg.filtering.confidence = ConfidenceThreshold::Custom(3.0);
        let pipeline = Pipeline::new(cfg).unwrap();
        assert_eq!(pipeline.confidence_threshold(), 0.05);

        let output = pipeline.run(&[RawRecord::new(0.0, 0.0, 900.0, 0.04)]);
        assert_eq!(output.report.confidence_threshold, 0.05);
        assert!(output
            .report
            .warnings
            .contains(&DataQualityWarning::ConfidenceFallback {
                requested: 3.0,
                used: 0.05
            }));
    }

    #[test]
    fn test_noise_and_cone_indices() {
        let mut points: Vec<Point> = (0..5)
            .map(|i| Point::new(0.0, 0.0, 600.0 + i as f32 * 150.0, 0.0))
            .collect();
        points.push(Point::new(9000.0, 9000.0, 900.0, 0.0));

        let pipeline = Pipeline::new(config(500.0, 200.0, 2)).unwrap();
        let output = pipeline.run_cloud(PointCloud::from_points(&points));

        assert_eq!(output.cone_indices(), vec![0, 1, 2, 3, 4]);
        assert_eq!(output.noise_indices(), vec![5]);
        assert_eq!(output.report.noise_points, 1);
    }
}
