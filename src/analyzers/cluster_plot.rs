use plotters::prelude::*;
use std::ops::Range;

use crate::error::{ProcessingError, Result};
use crate::utils::constants::{PLOT_HEIGHT, PLOT_WIDTH};

const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

pub fn cluster_color(cluster_id: usize) -> RGBColor {
    PALETTE[cluster_id % PALETTE.len()]
}

/// One point of the scatter plot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub cluster_id: usize,
}

/// Axis range covering `values` with a 5% margin; a flat range is widened by 1
fn axis_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return -1.0..1.0;
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 1.0)..(max + 1.0);
    }
    let margin = (max - min) * 0.05;
    (min - margin)..(max + margin)
}

/// Render a 2-D scatter of the projected rows, one colour per cluster, as PNG bytes
pub fn render_scatter(points: &[PlotPoint]) -> Result<Vec<u8>> {
    let render_error = |e: &dyn std::fmt::Display| ProcessingError::Render(e.to_string());

    // The bitmap encoder only writes to paths; render to a scratch file
    let scratch = tempfile::Builder::new()
        .prefix("weather_clusters")
        .suffix(".png")
        .tempfile()?;
    let path = scratch.path().to_path_buf();

    {
        let root = BitMapBackend::new(&path, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| render_error(&e))?;

        let x_range = axis_range(points.iter().map(|p| p.x));
        let y_range = axis_range(points.iter().map(|p| p.y));

        let mut chart = ChartBuilder::on(&root)
            .margin(40)
            .build_cartesian_2d(x_range.clone(), y_range.clone())
            .map_err(|e| render_error(&e))?;

        // Frame and zero axes
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x_range.start, y_range.start), (x_range.end, y_range.end)],
                BLACK.stroke_width(1),
            )))
            .map_err(|e| render_error(&e))?;
        if x_range.contains(&0.0) {
            chart
                .draw_series(std::iter::once(PathElement::new(
                    vec![(0.0, y_range.start), (0.0, y_range.end)],
                    RGBColor(200, 200, 200),
                )))
                .map_err(|e| render_error(&e))?;
        }
        if y_range.contains(&0.0) {
            chart
                .draw_series(std::iter::once(PathElement::new(
                    vec![(x_range.start, 0.0), (x_range.end, 0.0)],
                    RGBColor(200, 200, 200),
                )))
                .map_err(|e| render_error(&e))?;
        }

        chart
            .draw_series(points.iter().map(|point| {
                Circle::new(
                    (point.x, point.y),
                    6,
                    cluster_color(point.cluster_id).filled(),
                )
            }))
            .map_err(|e| render_error(&e))?;

        root.present().map_err(|e| render_error(&e))?;
    }

    let bytes = std::fs::read(&path)?;
    Ok(bytes)
}
