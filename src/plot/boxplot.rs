// src/plot/boxplot.rs

//! Box plot with a jittered strip of the raw values, one box per group.

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::{
    Area, GRID, HIGHLIGHT, INK, PlotError, SIGNIFICANT, font, jitter, padded_range, palette,
    render_err, render_png, titled,
};
use crate::analytics::stats::describe;

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

const CAPTION_LINE: i32 = 17;

#[derive(Debug, Clone)]
pub struct BoxGroup {
    pub name: String,
    /// Extra lines printed under the group name (n, mean, ...).
    pub caption: Vec<String>,
    pub values: Vec<f64>,
    /// Values drawn on top with a distinct marker.
    pub highlight: Vec<f64>,
}

impl BoxGroup {
    /// Group with the usual n / mean / median / SD caption.
    pub fn with_summary(name: impl Into<String>, values: Vec<f64>) -> Self {
        let caption = match describe(&values) {
            Some(d) => vec![
                format!("(n={})", d.n),
                format!("Mean={:.2}", d.mean),
                format!("Med={:.2}", d.median),
                match d.std {
                    Some(sd) => format!("SD={:.2}", sd),
                    None => "SD=-".to_string(),
                },
            ],
            None => vec!["(n=0)".to_string()],
        };
        Self {
            name: name.into(),
            caption,
            values,
            highlight: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoxPlot {
    pub heading: String,
    pub subtitle: Option<String>,
    pub significant: bool,
    pub y_label: String,
    pub groups: Vec<BoxGroup>,
}

/// Quartiles of the finite values, `None` when there are none.
/// Whiskers end at the 1.5 x IQR fences.
pub fn group_quartiles(values: &[f64]) -> Option<Quartiles> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(Quartiles::new(&finite))
    }
}

pub fn render(plot: &BoxPlot) -> Result<Vec<u8>, PlotError> {
    if plot.groups.iter().all(|g| group_quartiles(&g.values).is_none()) {
        return Err(PlotError::Empty);
    }
    render_png(WIDTH, HEIGHT, |area| draw(area, plot))
}

/// Draws the plot into `area`, so it can share a canvas with other panels.
pub fn draw(area: &Area<'_>, plot: &BoxPlot) -> Result<(), PlotError> {
    let body = titled(area, &plot.heading, plot.subtitle.as_deref(), plot.significant)?;

    let quartiles: Vec<Option<Quartiles>> =
        plot.groups.iter().map(|g| group_quartiles(&g.values)).collect();
    let fences = quartiles.iter().flatten().flat_map(|q| {
        let [low, _, _, _, high] = q.values();
        [f64::from(low), f64::from(high)]
    });
    let (lo, hi) = padded_range(
        plot.groups
            .iter()
            .flat_map(|g| g.values.iter().chain(&g.highlight).copied())
            .chain(fences),
    )
    .ok_or(PlotError::Empty)?;

    let caption_lines = plot.groups.iter().map(|g| g.caption.len()).max().unwrap_or(0) as i32 + 1;
    let n = plot.groups.len().max(1) as f64;

    let mut chart = ChartBuilder::on(&body)
        .margin(16)
        .x_label_area_size(caption_lines * CAPTION_LINE + 14)
        .y_label_area_size(64)
        .build_cartesian_2d(0f64..n, lo as f32..hi as f32)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .y_labels(6)
        .light_line_style(GRID)
        .y_desc(plot.y_label.as_str())
        .axis_desc_style(font(15))
        .label_style(font(13))
        .draw()
        .map_err(render_err)?;

    let (left, _) = chart.backend_coord(&(0.2, lo as f32));
    let (right, _) = chart.backend_coord(&(0.8, lo as f32));
    let box_px = (right - left).max(4) as u32;

    let base = body.get_base_pixel();
    let caption_style = font(13)
        .color(&INK)
        .pos(Pos::new(HPos::Center, VPos::Top));

    for (i, (group, q)) in plot.groups.iter().zip(&quartiles).enumerate() {
        let x = i as f64 + 0.5;

        if let Some(q) = q {
            let [_, q1, _, q3, _] = q.values();
            let color = palette(i);
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x - 0.3, q1), (x + 0.3, q3)],
                    color.filled(),
                )))
                .map_err(render_err)?;
            chart
                .draw_series(std::iter::once(
                    Boxplot::new_vertical(x, q)
                        .width(box_px)
                        .whisker_width(0.5)
                        .style(INK.stroke_width(2)),
                ))
                .map_err(render_err)?;
        }

        chart
            .draw_series(group.values.iter().enumerate().map(|(j, v)| {
                Circle::new((x + jitter(j) * 0.12, *v as f32), 3, BLACK.mix(0.5).filled())
            }))
            .map_err(render_err)?;

        for v in &group.highlight {
            let at = (x, *v as f32);
            chart
                .draw_series([
                    TriangleMarker::new(at, 9, HIGHLIGHT.filled()),
                    TriangleMarker::new(at, 9, SIGNIFICANT.stroke_width(2)),
                ])
                .map_err(render_err)?;
        }

        let (cx, cy) = chart.backend_coord(&(x, lo as f32));
        let lines = std::iter::once(group.name.as_str()).chain(group.caption.iter().map(String::as_str));
        for (k, line) in lines.enumerate() {
            let at = (cx - base.0, cy - base.1 + 8 + k as i32 * CAPTION_LINE);
            body.draw_text(line, &caption_style, at).map_err(render_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartiles_ignore_non_finite_values() {
        let q = group_quartiles(&[1.0, 2.0, 3.0, 4.0, 100.0, f64::NAN]).unwrap();
        assert_eq!(q.values(), [-1.0, 2.0, 3.0, 4.0, 7.0]);
        assert!(group_quartiles(&[]).is_none());
        assert!(group_quartiles(&[f64::INFINITY]).is_none());
    }

    #[test]
    fn renders_png_with_highlight() {
        let mut a = BoxGroup::with_summary("A", vec![80.0, 85.0, 90.0]);
        a.highlight.push(85.0);
        let plot = BoxPlot {
            heading: "Analysis: Score".to_string(),
            subtitle: Some("(Wilcoxon Rank-Sum p=0.050)".to_string()),
            significant: true,
            y_label: "Score".to_string(),
            groups: vec![a, BoxGroup::with_summary("B", vec![60.0, 65.0, 70.0])],
        };
        let png = render(&plot).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(png, render(&plot).unwrap());
    }

    #[test]
    fn empty_plot_is_an_error() {
        let plot = BoxPlot {
            heading: "x".to_string(),
            subtitle: None,
            significant: false,
            y_label: String::new(),
            groups: vec![BoxGroup::with_summary("A", vec![])],
        };
        assert_eq!(render(&plot), Err(PlotError::Empty));
    }
}
