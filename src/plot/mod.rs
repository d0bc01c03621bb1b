// src/plot/mod.rs

//! Raster figures for the analytics views.
//!
//! Figures are built with plotters charts on an in-memory RGB bitmap and
//! encoded to PNG. Text is rasterised with ab_glyph from an embedded DejaVu
//! Sans, so rendering needs no system fonts and the same input always yields
//! the same bytes.

pub mod boxplot;
pub mod quadrant;
pub mod trend;

use std::fmt;
use std::io::Cursor;
use std::sync::OnceLock;

use base64::{Engine as _, engine::general_purpose};
use image::{ImageFormat, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::register_font;

pub type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

pub const INK: RGBColor = RGBColor(33, 33, 33);
pub const GRID: RGBColor = RGBColor(225, 225, 225);
pub const MUTED: RGBColor = RGBColor(140, 140, 140);
pub const SIGNIFICANT: RGBColor = RGBColor(214, 39, 40);
pub const HIGHLIGHT: RGBColor = RGBColor(255, 196, 0);

/// Family name the embedded font is registered under.
pub const FONT: &str = "sans-serif";

static FONT_BYTES: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Seaborn "Set2"-like qualitative palette.
const PALETTE: [RGBColor; 8] = [
    RGBColor(102, 194, 165),
    RGBColor(252, 141, 98),
    RGBColor(141, 160, 203),
    RGBColor(231, 138, 195),
    RGBColor(166, 216, 84),
    RGBColor(255, 217, 47),
    RGBColor(229, 196, 148),
    RGBColor(179, 179, 179),
];

pub fn palette(i: usize) -> RGBColor {
    PALETTE[i % PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlotError {
    Render(String),
    Encode(String),
    Empty,
}

impl fmt::Display for PlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlotError::Render(msg) => write!(f, "plot rendering failed: {}", msg),
            PlotError::Encode(msg) => write!(f, "PNG encoding failed: {}", msg),
            PlotError::Empty => write!(f, "nothing to plot"),
        }
    }
}

impl std::error::Error for PlotError {}

pub(crate) fn render_err<E: fmt::Display>(e: E) -> PlotError {
    PlotError::Render(e.to_string())
}

/// Registers the embedded font with plotters once per process.
fn ensure_font() -> Result<(), PlotError> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED
        .get_or_init(|| register_font(FONT, FontStyle::Normal, FONT_BYTES).is_ok());
    if ok {
        Ok(())
    } else {
        Err(PlotError::Render("embedded font could not be loaded".to_string()))
    }
}

/// Text style in the embedded font.
pub fn font<'a>(size: u32) -> TextStyle<'a> {
    TextStyle::from((FONT, size).into_font())
}

/// Draws onto a white `width` x `height` canvas and returns PNG bytes.
pub fn render_png<F>(width: u32, height: u32, draw: F) -> Result<Vec<u8>, PlotError>
where
    F: FnOnce(&Area<'_>) -> Result<(), PlotError>,
{
    ensure_font()?;

    let mut buf = vec![255u8; (width as usize) * (height as usize) * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        draw(&root)?;
        root.present().map_err(render_err)?;
    }

    let img = RgbImage::from_raw(width, height, buf)
        .ok_or_else(|| PlotError::Encode("pixel buffer size mismatch".to_string()))?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| PlotError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

pub fn to_base64(png: &[u8]) -> String {
    general_purpose::STANDARD.encode(png)
}

pub fn to_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", to_base64(png))
}

/// Title plus an optional second line; returns the area left below them.
pub fn titled<'a>(
    area: &Area<'a>,
    heading: &str,
    subtitle: Option<&str>,
    significant: bool,
) -> Result<Area<'a>, PlotError> {
    let color = if significant { SIGNIFICANT } else { INK };
    let mut body = area.titled(heading, font(22).color(&color)).map_err(render_err)?;
    if let Some(sub) = subtitle {
        body = body.titled(sub, font(16).color(&color)).map_err(render_err)?;
    }
    Ok(body)
}

/// Padded data range; a flat range is widened so it still has height.
pub fn padded_range(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return None;
    }
    if (hi - lo).abs() < f64::EPSILON {
        let pad = if lo.abs() > 1.0 { lo.abs() * 0.1 } else { 1.0 };
        return Some((lo - pad, hi + pad));
    }
    let pad = (hi - lo) * 0.08;
    Some((lo - pad, hi + pad))
}

/// Deterministic horizontal jitter in [-1, 1] for the i-th point.
pub fn jitter(i: usize) -> f64 {
    ((i as f64 + 1.0) * 0.618_033_988_75).fract() * 2.0 - 1.0
}
