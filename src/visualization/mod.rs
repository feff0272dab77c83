//! Scatter-plot rendering of classified point clouds.
//!
//! Points are drawn as a 2D projection with plotters. Cone clusters are
//! red, other clusters take colors from a fixed palette and noise is gray.
//! Text is rendered with a bundled DejaVu Sans font so no system fonts are
//! needed.

use std::path::Path;
use std::sync::OnceLock;

use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::pipeline::PipelineOutput;
use crate::processors::clustering::NOISE;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty point cloud")]
    EmptyPointCloud,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1920;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1080;

/// Color palette for non-cone clusters. No reds, those mark cones.
const CLUSTER_COLORS: &[(u8, u8, u8)] = &[
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (0, 206, 209),   // Turquoise
    (138, 43, 226),  // Blue Violet
    (50, 205, 50),   // Lime Green
    (0, 191, 255),   // Deep Sky Blue
    (255, 215, 0),   // Gold
];

const CONE_COLOR: (u8, u8, u8) = (228, 26, 28);

/// Noise color (gray) for unclustered points (label = -1).
const NOISE_COLOR: (u8, u8, u8) = (160, 160, 160);

/// Font family registered for captions, axis descriptions and the legend.
const FONT_FAMILY: &str = "sans-serif";

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Register the bundled font with plotters, once per process.
fn ensure_font() -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT_DATA).is_ok());
    if ok {
        Ok(())
    } else {
        Err(VisualizationError::PlottingError(
            "bundled font could not be loaded".to_string(),
        ))
    }
}

/// Which pair of axes to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// x against y
    #[default]
    TopDown,
    /// x against z
    Side,
}

impl Projection {
    fn project(&self, x: f32, y: f32, z: f32) -> (f32, f32) {
        match self {
            Projection::TopDown => (x, y),
            Projection::Side => (x, z),
        }
    }

    fn axis_labels(&self) -> (&'static str, &'static str) {
        match self {
            Projection::TopDown => ("X-axis", "Y-axis"),
            Projection::Side => ("X-axis", "Z-axis"),
        }
    }
}

/// Legend group of a plotted point. Ordered by draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PointKind {
    Noise,
    Cluster,
    Cone,
}

impl PointKind {
    fn of(label: i32, is_cone: bool) -> Self {
        if is_cone {
            PointKind::Cone
        } else if label == NOISE {
            PointKind::Noise
        } else {
            PointKind::Cluster
        }
    }

    fn legend(&self) -> &'static str {
        match self {
            PointKind::Noise => "Noise",
            PointKind::Cluster => "Cluster",
            PointKind::Cone => "Cone",
        }
    }

    fn legend_color(&self) -> RGBColor {
        let c = match self {
            PointKind::Noise => NOISE_COLOR,
            PointKind::Cluster => CLUSTER_COLORS[0],
            PointKind::Cone => CONE_COLOR,
        };
        RGBColor(c.0, c.1, c.2)
    }

    fn radius(&self) -> i32 {
        match self {
            PointKind::Cone => 4,
            _ => 2,
        }
    }
}

/// Color for a point given its cluster label and cone flag.
fn point_color(label: i32, is_cone: bool) -> RGBColor {
    let c = match PointKind::of(label, is_cone) {
        PointKind::Cone => CONE_COLOR,
        PointKind::Noise => NOISE_COLOR,
        PointKind::Cluster => CLUSTER_COLORS[label as usize % CLUSTER_COLORS.len()],
    };
    RGBColor(c.0, c.1, c.2)
}

/// Plot the classified cloud of a pipeline run and save it as PNG.
///
/// The chart carries a caption, axis descriptions for the projection and a
/// legend with one entry per point kind present (cone, cluster, noise).
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `output` - Pipeline result to draw
/// * `projection` - Axes to draw
/// * `title` - Caption drawn above the chart
/// * `max_points` - Maximum number of points to plot (subsamples if exceeded)
pub fn plot_classified_cloud(
    output_path: &Path,
    output: &PipelineOutput,
    projection: Projection,
    title: &str,
    max_points: usize,
) -> Result<()> {
    let cloud = &output.cloud;
    if cloud.is_empty() {
        return Err(VisualizationError::EmptyPointCloud);
    }
    ensure_font()?;

    let n = cloud.len();
    let step = if n > max_points.max(1) {
        n / max_points.max(1)
    } else {
        1
    };

    let mut points: Vec<(f32, f32, RGBColor, PointKind)> = (0..n)
        .step_by(step)
        .map(|i| {
            let (u, v) = projection.project(cloud.x[i], cloud.y[i], cloud.z[i]);
            let is_cone = output.is_cone.get(i).copied().unwrap_or(false);
            let label = output.labels.get(i).copied().unwrap_or(NOISE);
            (u, v, point_color(label, is_cone), PointKind::of(label, is_cone))
        })
        .collect();
    // Cones last so they stay visible on top of noise
    points.sort_by_key(|p| p.3);

    let (u_min, u_max, v_min, v_max) = compute_bounds(&points);
    let u_padding = (u_max - u_min) * 0.05;
    let v_padding = (v_max - v_min) * 0.05;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT))
        .into_drawing_area();

    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT_FAMILY, 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(
            (u_min - u_padding)..(u_max + u_padding),
            (v_min - v_padding)..(v_max + v_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let (x_desc, y_desc) = projection.axis_labels();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .label_style((FONT_FAMILY, 14))
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    for kind in [PointKind::Noise, PointKind::Cluster, PointKind::Cone] {
        if !points.iter().any(|p| p.3 == kind) {
            continue;
        }
        let legend_color = kind.legend_color();
        chart
            .draw_series(
                points
                    .iter()
                    .filter(|p| p.3 == kind)
                    .map(|(u, v, color, _)| Circle::new((*u, *v), kind.radius(), color.filled())),
            )
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?
            .label(kind.legend())
            .legend(move |(x, y)| Circle::new((x, y), 4, legend_color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font((FONT_FAMILY, 16))
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the bounds (min/max) of the projected coordinates.
fn compute_bounds(points: &[(f32, f32, RGBColor, PointKind)]) -> (f32, f32, f32, f32) {
    let mut u_min = f32::MAX;
    let mut u_max = f32::MIN;
    let mut v_min = f32::MAX;
    let mut v_max = f32::MIN;

    for (u, v, _, _) in points {
        u_min = u_min.min(*u);
        u_max = u_max.max(*u);
        v_min = v_min.min(*v);
        v_max = v_max.max(*v);
    }

    if (u_max - u_min).abs() < f32::EPSILON {
        u_min -= 1.0;
        u_max += 1.0;
    }
    if (v_max - v_min).abs() < f32::EPSILON {
        v_min -= 1.0;
        v_max += 1.0;
    }

    (u_min, u_max, v_min, v_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{Point, PointCloud};
    use tempfile::tempdir;

    fn sample_output() -> PipelineOutput {
        let cloud = PointCloud::from_points(&[
            Point::new(0.0, 0.0, 600.0, 0.0),
            Point::new(0.0, 10.0, 1300.0, 0.0),
            Point::new(3000.0, 0.0, 700.0, 0.0),
            Point::new(3050.0, 20.0, 750.0, 0.0),
            Point::new(-900.0, 400.0, 800.0, 0.0),
        ]);
        PipelineOutput {
            cloud,
            labels: vec![0, 0, 1, 1, NOISE],
            is_cone: vec![true, true, false, false, false],
            ..Default::default()
        }
    }

    #[test]
    fn test_point_color() {
        let cone = point_color(3, true);
        assert_eq!((cone.0, cone.1, cone.2), CONE_COLOR);
        let noise = point_color(NOISE, false);
        assert_eq!((noise.0, noise.1, noise.2), NOISE_COLOR);
        let wrapped = point_color(CLUSTER_COLORS.len() as i32, false);
        assert_eq!((wrapped.0, wrapped.1, wrapped.2), CLUSTER_COLORS[0]);
    }

    #[test]
    fn test_compute_bounds_degenerate() {
        let points = vec![(5.0f32, 5.0f32, RGBColor(0, 0, 0), PointKind::Noise)];
        assert_eq!(compute_bounds(&points), (4.0, 6.0, 4.0, 6.0));
    }

    #[test]
    fn test_projection() {
        assert_eq!(Projection::TopDown.project(1.0, 2.0, 3.0), (1.0, 2.0));
        assert_eq!(Projection::Side.project(1.0, 2.0, 3.0), (1.0, 3.0));
        assert_eq!(Projection::TopDown.axis_labels(), ("X-axis", "Y-axis"));
        assert_eq!(Projection::Side.axis_labels(), ("X-axis", "Z-axis"));
    }

    #[test]
    fn test_point_kind_draw_order() {
        assert_eq!(PointKind::of(NOISE, false), PointKind::Noise);
        assert_eq!(PointKind::of(2, false), PointKind::Cluster);
        assert_eq!(PointKind::of(2, true), PointKind::Cone);
        assert!(PointKind::Noise < PointKind::Cluster);
        assert!(PointKind::Cluster < PointKind::Cone);
        assert_eq!(PointKind::Cone.legend(), "Cone");
    }

    #[test]
    fn test_bundled_font_registers() {
        ensure_font().unwrap();
        // Idempotent
        ensure_font().unwrap();
    }

    #[test]
    fn test_plot_classified_cloud_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cones.png");

        plot_classified_cloud(&path, &sample_output(), Projection::Side, "Frame 702", 1000)
            .unwrap();

        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_plot_empty_cloud_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.png");
        let empty = PipelineOutput::default();
        let result = plot_classified_cloud(&path, &empty, Projection::TopDown, "Empty", 10);
        assert!(matches!(result, Err(VisualizationError::EmptyPointCloud)));
    }
}
