//! Writers for classified clouds and run reports.
//!
//! This module exports pipeline results:
//! - CSV with one row per surviving point, its cluster label and cone flag
//! - YAML summary report

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use crate::pipeline::{PipelineOutput, PipelineReport};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// YAML serialization error.
    #[error("YAML write error for '{path}': {source}")]
    YamlError {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Annotation arrays not parallel to the cloud.
    #[error("array length mismatch: cloud has {cloud_len} points, labels has {labels_len}, flags has {flags_len}")]
    LengthMismatch {
        cloud_len: usize,
        labels_len: usize,
        flags_len: usize,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Write the classified cloud to CSV.
///
/// Columns: `source_index,x,y,z,confidence,cluster,is_cone`. `source_index`
/// is the row of the point in the original input; `cluster` is `-1` for
/// noise.
///
/// # Errors
///
/// Returns an error if:
/// - `labels` or `is_cone` is not parallel to the cloud
/// - Parent directories cannot be created
/// - File cannot be created or written to
///
/// # Example
///
/// ```no_run
/// use cone_detect::core::writers::write_classified_csv;
/// use cone_detect::pipeline::PipelineOutput;
/// use std::path::Path;
///
/// let output = PipelineOutput::default();
/// write_classified_csv(Path::new("classified.csv"), &output).unwrap();
/// ```
pub fn write_classified_csv(path: &Path, output: &PipelineOutput) -> Result<()> {
    let cloud = &output.cloud;
    if output.labels.len() != cloud.len() || output.is_cone.len() != cloud.len() {
        return Err(WriteError::LengthMismatch {
            cloud_len: cloud.len(),
            labels_len: output.labels.len(),
            flags_len: output.is_cone.len(),
        });
    }

    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));

    let path_str = path.display().to_string();
    let csv_err = |e: csv::Error| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    csv_writer
        .write_record([
            "source_index",
            "x",
            "y",
            "z",
            "confidence",
            "cluster",
            "is_cone",
        ])
        .map_err(csv_err)?;

    for i in 0..cloud.len() {
        csv_writer
            .write_record(&[
                cloud.source_index[i].to_string(),
                format!("{:.6}", cloud.x[i]),
                format!("{:.6}", cloud.y[i]),
                format!("{:.6}", cloud.z[i]),
                format!("{:.6}", cloud.confidence[i]),
                output.labels[i].to_string(),
                output.is_cone[i].to_string(),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

/// Write the run report as YAML.
pub fn write_report_yaml(path: &Path, report: &PipelineReport) -> Result<()> {
    ensure_parent_dirs(path)?;

    let path_str = path.display().to_string();
    let content = serde_yaml::to_string(report).map_err(|e| WriteError::YamlError {
        path: path_str.clone(),
        source: e,
    })?;

    fs::write(path, content).map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{Point, PointCloud};
    use crate::pipeline::DataQualityWarning;
    use tempfile::tempdir;

    fn create_test_output() -> PipelineOutput {
        let mut cloud = PointCloud::new();
        cloud.push_indexed(Point::new(1.0, 2.0, 600.0, 0.01), 3);
        cloud.push_indexed(Point::new(1.0, 2.0, 1200.0, 0.02), 7);
        cloud.push_indexed(Point::new(9.0, 9.0, 900.0, 0.03), 8);

        PipelineOutput {
            cloud,
            labels: vec![0, 0, -1],
            is_cone: vec![true, true, false],
            ..Default::default()
        }
    }

    #[test]
    fn test_write_classified_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classified.csv");

        write_classified_csv(&path, &create_test_output()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "source_index,x,y,z,confidence,cluster,is_cone");
        assert_eq!(lines.len(), 4); // header + 3 data rows
        assert!(lines[1].starts_with("3,"));
        assert!(lines[1].ends_with(",0,true"));
        assert!(lines[3].starts_with("8,"));
        assert!(lines[3].ends_with(",-1,false"));
    }

    #[test]
    fn test_write_classified_csv_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subdir").join("nested").join("out.csv");

        write_classified_csv(&path, &PipelineOutput::default()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_write_classified_csv_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classified.csv");
        let mut output = create_test_output();
        output.is_cone.pop();

        match write_classified_csv(&path, &output).unwrap_err() {
            WriteError::LengthMismatch {
                cloud_len,
                labels_len,
                flags_len,
            } => {
                assert_eq!(cloud_len, 3);
                assert_eq!(labels_len, 3);
                assert_eq!(flags_len, 2);
            }
            other => panic!("Expected LengthMismatch error, got {:?}", other),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_write_report_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.yaml");
        let report = PipelineReport {
            input_records: 10,
            dropped_incomplete: 1,
            clusters_formed: 2,
            cones_identified: 1,
            warnings: vec![DataQualityWarning::IncompleteRecords { dropped: 1 }],
            ..Default::default()
        };

        write_report_yaml(&path, &report).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("clusters_formed: 2"));
        assert!(content.contains("cones_identified: 1"));
        assert!(content.contains("incomplete_records"));
    }
}
