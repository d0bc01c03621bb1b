// src/plot/quadrant.rs

//! Effort/performance quadrant scatter for teaching efficiency.

use plotters::prelude::*;

use super::{
    Area, GRID, HIGHLIGHT, INK, MUTED, PlotError, SIGNIFICANT, boxplot, font, palette, render_err,
    render_png, titled,
};

pub const WIDTH: u32 = 760;
pub const HEIGHT: u32 = 640;

const HIGH_EFFICIENCY: RGBColor = RGBColor(46, 125, 50);

#[derive(Debug, Clone)]
pub struct QuadrantPoint {
    pub group: String,
    pub z_r: f64,
    pub z_p: f64,
}

#[derive(Debug, Clone)]
pub struct QuadrantPlot {
    pub heading: String,
    /// Group names in legend/color order.
    pub groups: Vec<String>,
    pub points: Vec<QuadrantPoint>,
    /// Per-group (Z_R mean, Z_P mean), same order as `groups`.
    pub means: Vec<(f64, f64)>,
    /// Point drawn last with its own marker, e.g. the viewing learner.
    pub highlight: Option<(f64, f64)>,
}

/// Point shape per group, so groups stay apart without color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Circle,
    Triangle,
    Cross,
}

pub fn marker(group_index: usize) -> Marker {
    [Marker::Circle, Marker::Triangle, Marker::Cross][group_index % 3]
}

impl QuadrantPlot {
    fn limit(&self) -> f64 {
        self.points
            .iter()
            .flat_map(|p| [p.z_r.abs(), p.z_p.abs()])
            .chain(self.highlight.iter().flat_map(|(r, p)| [r.abs(), p.abs()]))
            .filter(|v| v.is_finite())
            .fold(3.0, f64::max)
            * 1.1
    }
}

/// Draws the quadrant into `area`.
pub fn draw(area: &Area<'_>, plot: &QuadrantPlot) -> Result<(), PlotError> {
    let body = titled(area, &plot.heading, None, false)?;
    let lim = plot.limit();

    let mut chart = ChartBuilder::on(&body)
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(-lim..lim, -lim..lim)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_labels(7)
        .y_labels(7)
        .light_line_style(GRID)
        .x_desc("Mental effort Z (R)")
        .y_desc("Performance Z (P)")
        .axis_desc_style(font(15))
        .label_style(font(13))
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series([
            PathElement::new(vec![(-lim, 0.0), (lim, 0.0)], MUTED.stroke_width(1)),
            PathElement::new(vec![(0.0, -lim), (0.0, lim)], MUTED.stroke_width(1)),
        ])
        .map_err(render_err)?;
    chart
        .draw_series(DashedLineSeries::new(
            vec![(-lim, -lim), (lim, lim)],
            8,
            6,
            INK.stroke_width(2),
        ))
        .map_err(render_err)?;

    chart
        .draw_series([
            Text::new("HIGH EFFICIENCY", (-lim * 0.9, lim * 0.8), font(14).color(&HIGH_EFFICIENCY)),
            Text::new("LOW EFFICIENCY", (lim * 0.35, -lim * 0.75), font(14).color(&SIGNIFICANT)),
            Text::new("E=0", (lim * 0.7, lim * 0.85), font(13).color(&INK)),
        ])
        .map_err(render_err)?;

    for (gi, group) in plot.groups.iter().enumerate() {
        let color = palette(gi);
        let points = plot
            .points
            .iter()
            .filter(|p| &p.group == group)
            .map(|p| (p.z_r, p.z_p));
        let fill = color.mix(0.8).filled();
        let stroke = color.stroke_width(2);
        let label = format!("Group {}", group);

        match marker(gi) {
            Marker::Circle => {
                chart
                    .draw_series(points.map(|at| Circle::new(at, 5, fill)))
                    .map_err(render_err)?
                    .label(label)
                    .legend(move |at| Circle::new(at, 5, fill));
            }
            Marker::Triangle => {
                chart
                    .draw_series(points.map(|at| TriangleMarker::new(at, 7, fill)))
                    .map_err(render_err)?
                    .label(label)
                    .legend(move |at| TriangleMarker::new(at, 7, fill));
            }
            Marker::Cross => {
                chart
                    .draw_series(points.map(|at| Cross::new(at, 5, stroke)))
                    .map_err(render_err)?
                    .label(label)
                    .legend(move |at| Cross::new(at, 5, stroke));
            }
        }
    }

    for (gi, mean) in plot.means.iter().enumerate().take(plot.groups.len()) {
        let diamond = vec![(0, -9), (9, 0), (0, 9), (-9, 0)];
        let mut outline = diamond.clone();
        outline.push((0, -9));
        chart
            .draw_series(std::iter::once(
                EmptyElement::at(*mean)
                    + Polygon::new(diamond, palette(gi).filled())
                    + PathElement::new(outline, INK.stroke_width(2)),
            ))
            .map_err(render_err)?;
    }

    if let Some(at) = plot.highlight {
        chart
            .draw_series(std::iter::once(
                EmptyElement::at(at)
                    + Circle::new((0, 0), 11, HIGHLIGHT.filled())
                    + Circle::new((0, 0), 11, SIGNIFICANT.stroke_width(3))
                    + Text::new("YOU", (14, -26), font(20).color(&SIGNIFICANT)),
            ))
            .map_err(render_err)?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerLeft)
        .background_style(WHITE.mix(0.85))
        .border_style(INK)
        .label_font(font(13))
        .draw()
        .map_err(render_err)
}

/// Quadrant on its own, for the learner view.
pub fn render(plot: &QuadrantPlot) -> Result<Vec<u8>, PlotError> {
    if plot.points.is_empty() {
        return Err(PlotError::Empty);
    }
    render_png(WIDTH, HEIGHT, |area| draw(area, plot))
}

/// Quadrant next to a box plot of the efficiency scores.
pub fn render_with_boxplot(plot: &QuadrantPlot, scores: &boxplot::BoxPlot) -> Result<Vec<u8>, PlotError> {
    if plot.points.is_empty() {
        return Err(PlotError::Empty);
    }
    render_png(WIDTH * 2, HEIGHT, |area| {
        let (left, right) = area.split_horizontally(WIDTH);
        draw(&left, plot)?;
        boxplot::draw(&right, scores)
    })
}
