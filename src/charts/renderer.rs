//! Static Chart Renderer
//! Writes PNG bar and line charts of the report aggregates with plotters.
//!
//! Layout:
//! 1. Caption centered on top
//! 2. Mesh with y grid only, axis descriptions on both axes
//! 3. Bars (categorical x) or a line with point markers (integer x)
//! 4. Long category labels are rotated 90 degrees

use plotters::prelude::*;
use std::path::Path;
use thiserror::Error;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 720;

// Colors
const BAR_COLOR: RGBColor = RGBColor(91, 155, 213);
const LINE_COLOR: RGBColor = RGBColor(237, 125, 49);

/// Labels longer than this are drawn rotated.
const ROTATE_LABELS_OVER: usize = 6;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Nothing to plot for chart '{0}'")]
    NoData(String),
    #[error("Failed to render chart: {0}")]
    Render(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_err<E: std::error::Error>(e: E) -> ChartError {
    ChartError::Render(e.to_string())
}

/// One bar of a categorical chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

impl Bar {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Axis captions and title of one chart.
#[derive(Debug, Clone, Copy)]
pub struct ChartLabels<'a> {
    pub title: &'a str,
    pub x_desc: &'a str,
    pub y_desc: &'a str,
}

pub struct StaticChartRenderer;

impl StaticChartRenderer {
    /// Vertical bar chart, one bar per entry in the given order.
    pub fn bar_chart(path: &Path, labels: ChartLabels<'_>, bars: &[Bar]) -> Result<(), ChartError> {
        if bars.is_empty() {
            return Err(ChartError::NoData(labels.title.to_string()));
        }

        let rotate = bars.iter().any(|b| b.label.len() > ROTATE_LABELS_OVER);
        let longest = bars.iter().map(|b| b.label.len()).max().unwrap_or(0) as u32;
        let x_label_area = if rotate { 40 + longest * 7 } else { 50 };

        let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let n = bars.len() as u32;
        let y_max = Self::y_upper(bars.iter().map(|b| b.value));
        let mut chart = ChartBuilder::on(&root)
            .caption(labels.title, ("sans-serif", 26))
            .margin(15)
            .x_label_area_size(x_label_area)
            .y_label_area_size(80)
            .build_cartesian_2d((0u32..n).into_segmented(), 0f64..y_max)
            .map_err(render_err)?;

        let names: Vec<String> = bars.iter().map(|b| b.label.clone()).collect();
        let formatter = |v: &SegmentValue<u32>| match v {
            SegmentValue::CenterOf(i) => names.get(*i as usize).cloned().unwrap_or_default(),
            _ => String::new(),
        };
        let font = ("sans-serif", 13).into_font();
        let font = if rotate {
            font.transform(FontTransform::Rotate90)
        } else {
            font
        };

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(bars.len())
            .x_label_formatter(&formatter)
            .x_label_style(font)
            .x_desc(labels.x_desc)
            .y_desc(labels.y_desc)
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(
                Histogram::vertical(&chart)
                    .style(BAR_COLOR.filled())
                    .margin(4)
                    .data(bars.iter().enumerate().map(|(i, b)| (i as u32, b.value))),
            )
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        tracing::debug!(path = %path.display(), bars = bars.len(), "Rendered bar chart");
        Ok(())
    }

    /// Line chart over an integer x axis (years), with point markers.
    pub fn line_chart(
        path: &Path,
        labels: ChartLabels<'_>,
        points: &[(i32, f64)],
    ) -> Result<(), ChartError> {
        if points.is_empty() {
            return Err(ChartError::NoData(labels.title.to_string()));
        }

        let (x_min, x_max) = Self::x_range(points);
        let y_max = Self::y_upper(points.iter().map(|(_, y)| *y));

        let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(labels.title, ("sans-serif", 26))
            .margin(15)
            .x_label_area_size(50)
            .y_label_area_size(80)
            .build_cartesian_2d(x_min..x_max, 0f64..y_max)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_labels(points.len().min(20))
            .x_label_formatter(&|x: &i32| x.to_string())
            .x_desc(labels.x_desc)
            .y_desc(labels.y_desc)
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(LineSeries::new(
                points.iter().copied(),
                LINE_COLOR.stroke_width(2),
            ))
            .map_err(render_err)?;
        chart
            .draw_series(
                points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 4, LINE_COLOR.filled())),
            )
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        tracing::debug!(path = %path.display(), points = points.len(), "Rendered line chart");
        Ok(())
    }

    /// Upper y bound with 10% headroom; 1.0 when every value is zero.
    pub fn y_upper(values: impl Iterator<Item = f64>) -> f64 {
        let max = values.filter(|v| v.is_finite()).fold(0.0_f64, f64::max);
        if max <= 0.0 {
            1.0
        } else {
            max * 1.1
        }
    }

    /// x bounds padded by one unit on each side.
    pub fn x_range(points: &[(i32, f64)]) -> (i32, i32) {
        let min = points.iter().map(|(x, _)| *x).min().unwrap_or(0);
        let max = points.iter().map(|(x, _)| *x).max().unwrap_or(0);
        (min - 1, max + 1)
    }
}
