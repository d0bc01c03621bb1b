// src/plot/trend.rs

//! Median line across time points with IQR error bars and significance brackets.

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::{
    GRID, INK, PlotError, SIGNIFICANT, font, padded_range, palette, render_err, render_png, titled,
};

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 560;

#[derive(Debug, Clone)]
pub struct TrendPoint {
    pub label: String,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
}

/// A significant pair of time points, by index.
#[derive(Debug, Clone)]
pub struct Bracket {
    pub from: usize,
    pub to: usize,
    pub p_value: f64,
}

#[derive(Debug, Clone)]
pub struct TrendPlot {
    pub heading: String,
    pub subtitle: Option<String>,
    pub significant: bool,
    pub points: Vec<TrendPoint>,
    pub brackets: Vec<Bracket>,
}

fn stars(p: f64) -> &'static str {
    if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else {
        "*"
    }
}

pub fn render(plot: &TrendPlot) -> Result<Vec<u8>, PlotError> {
    if plot.points.is_empty() {
        return Err(PlotError::Empty);
    }
    render_png(WIDTH, HEIGHT, |area| {
        let body = titled(area, &plot.heading, plot.subtitle.as_deref(), plot.significant)?;

        // Brackets sit above the data, so the y range reserves a band for them.
        let (lo, hi) = padded_range(plot.points.iter().flat_map(|p| [p.q1, p.q3, p.median]))
            .ok_or(PlotError::Empty)?;
        let band = (hi - lo) * 0.12;
        let top = hi + band * plot.brackets.len() as f64;
        let n = plot.points.len() as f64;

        let mut chart = ChartBuilder::on(&body)
            .margin(16)
            .x_label_area_size(36)
            .y_label_area_size(64)
            .build_cartesian_2d(0f64..n, lo..top)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(0)
            .y_labels(6)
            .light_line_style(GRID)
            .label_style(font(13))
            .draw()
            .map_err(render_err)?;

        let xs: Vec<f64> = (0..plot.points.len()).map(|i| i as f64 + 0.5).collect();
        let color = palette(2);

        chart
            .draw_series(plot.points.iter().zip(&xs).map(|(p, &x)| {
                ErrorBar::new_vertical(x, p.q1, p.median, p.q3, INK.stroke_width(2), 12)
            }))
            .map_err(render_err)?;

        let medians: Vec<(f64, f64)> = plot
            .points
            .iter()
            .zip(&xs)
            .map(|(p, &x)| (x, p.median))
            .collect();
        chart
            .draw_series(LineSeries::new(medians.iter().copied(), color.stroke_width(3)))
            .map_err(render_err)?;
        chart
            .draw_series(medians.iter().map(|&at| {
                EmptyElement::at(at)
                    + Circle::new((0, 0), 6, color.filled())
                    + Circle::new((0, 0), 6, INK.stroke_width(1))
            }))
            .map_err(render_err)?;

        let bracket_label = font(13)
            .color(&SIGNIFICANT)
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        for (level, b) in plot.brackets.iter().enumerate() {
            let (Some(&x1), Some(&x2)) = (xs.get(b.from), xs.get(b.to)) else {
                continue;
            };
            let y = hi + band * (level as f64 + 0.6);
            let foot = hi + band * (level as f64 + 0.3);
            let label = format!("{} p={:.3}", stars(b.p_value), b.p_value);
            chart
                .draw_series(std::iter::once(PathElement::new(
                    vec![(x1, foot), (x1, y), (x2, y), (x2, foot)],
                    INK.stroke_width(1),
                )))
                .map_err(render_err)?;
            chart
                .draw_series(std::iter::once(Text::new(
                    label,
                    ((x1 + x2) / 2.0, y),
                    bracket_label.clone(),
                )))
                .map_err(render_err)?;
        }

        let base = body.get_base_pixel();
        let tick_label = font(13)
            .color(&INK)
            .pos(Pos::new(HPos::Center, VPos::Top));
        for (p, &x) in plot.points.iter().zip(&xs) {
            let (px, py) = chart.backend_coord(&(x, lo));
            body.draw_text(&p.label, &tick_label, (px - base.0, py - base.1 + 8))
                .map_err(render_err)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_levels() {
        assert_eq!(stars(0.0005), "***");
        assert_eq!(stars(0.005), "**");
        assert_eq!(stars(0.04), "*");
    }

    #[test]
    fn renders_with_brackets() {
        let plot = TrendPlot {
            heading: "Score Comparison: Part A".to_string(),
            subtitle: Some("(Friedman p=0.0498)".to_string()),
            significant: true,
            points: (1..=3)
                .map(|i| TrendPoint {
                    label: format!("Test {}", i),
                    median: 50.0 + i as f64 * 10.0,
                    q1: 45.0 + i as f64 * 10.0,
                    q3: 55.0 + i as f64 * 10.0,
                })
                .collect(),
            brackets: vec![Bracket { from: 0, to: 2, p_value: 0.03 }],
        };
        let png = render(&plot).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn no_points_is_an_error() {
        let plot = TrendPlot {
            heading: "x".to_string(),
            subtitle: None,
            significant: false,
            points: vec![],
            brackets: vec![],
        };
        assert_eq!(render(&plot), Err(PlotError::Empty));
    }
}
