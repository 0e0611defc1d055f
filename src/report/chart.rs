//! Raster charts for the KPI section.
//!
//! Charts contain shapes only. Labels and values are typeset by the PDF
//! composer next to the image, so rendering needs no font and the same input
//! always yields the same pixels.

use plotters::prelude::*;
use std::f64::consts::PI;

use crate::error::ChartError;
use crate::model::{Severity, Status};

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 500;

const MARGIN: i32 = 40;
const BACKGROUND: Rgb = Rgb::hex(0xff_ff_ff);
const AXIS: Rgb = Rgb::hex(0x64_74_8b);
const PLACEHOLDER_FILL: Rgb = Rgb::hex(0xf1_f5_f9);
const PLACEHOLDER_FRAME: Rgb = Rgb::hex(0xcb_d5_e1);

const PALETTE: [Rgb; 8] = [
    Rgb::hex(0x25_63_eb),
    Rgb::hex(0x7c_3a_ed),
    Rgb::hex(0x08_91_b2),
    Rgb::hex(0xdb_27_77),
    Rgb::hex(0xea_58_0c),
    Rgb::hex(0x65_a3_0d),
    Rgb::hex(0x47_55_69),
    Rgb::hex(0xca_8a_04),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    #[must_use]
    pub const fn hex(value: u32) -> Self {
        Self((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    /// Components scaled to `0.0..=1.0`, as PDF color operators expect.
    #[must_use]
    pub fn unit(self) -> [f32; 3] {
        [
            f32::from(self.0) / 255.0,
            f32::from(self.1) / 255.0,
            f32::from(self.2) / 255.0,
        ]
    }

    fn plotters(self) -> RGBColor {
        RGBColor(self.0, self.1, self.2)
    }
}

#[must_use]
pub fn severity_color(severity: Severity) -> Rgb {
    match severity {
        Severity::High => Rgb::hex(0xdc_26_26),
        Severity::Medium => Rgb::hex(0xf5_9e_0b),
        Severity::Low => Rgb::hex(0x10_b9_81),
    }
}

#[must_use]
pub fn status_color(status: Status) -> Rgb {
    match status {
        Status::Open => Rgb::hex(0xef_44_44),
        Status::Resolved => Rgb::hex(0x22_c5_5e),
        Status::Suppressed => Rgb::hex(0x94_a3_b8),
    }
}

/// Fixed color for the `index`-th series of an open-ended chart.
#[must_use]
pub fn palette(index: usize) -> Rgb {
    PALETTE[index % PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Pie,
    HorizontalBar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartDatum {
    pub label: String,
    pub value: usize,
    pub color: Rgb,
}

impl ChartDatum {
    pub fn new(label: impl Into<String>, value: usize, color: Rgb) -> Self {
        Self {
            label: label.into(),
            value,
            color,
        }
    }
}

/// Packed 8-bit RGB pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

#[cfg(test)]
impl RasterImage {
    fn pixel(&self, x: u32, y: u32) -> Rgb {
        let i = ((y * self.width + x) * 3) as usize;
        Rgb(self.rgb[i], self.rgb[i + 1], self.rgb[i + 2])
    }

    /// Whether any pixel has exactly `color`.
    fn contains(&self, color: Rgb) -> bool {
        self.rgb
            .chunks_exact(3)
            .any(|p| p == [color.0, color.1, color.2])
    }
}

/// Renders `data` as a `width` x `height` chart.
///
/// When every value is zero the result is a neutral placeholder.
pub fn render_chart(
    kind: ChartKind,
    data: &[ChartDatum],
    width: u32,
    height: u32,
) -> Result<RasterImage, ChartError> {
    let mut rgb = vec![0u8; (width as usize) * (height as usize) * 3];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (width, height)).into_drawing_area();
        root.fill(&BACKGROUND.plotters()).map_err(draw_err)?;

        let total: usize = data.iter().map(|d| d.value).sum();
        let (w, h) = (width as i32, height as i32);
        if total == 0 {
            draw_placeholder(&root, w, h)?;
        } else {
            match kind {
                ChartKind::Bar => draw_bars(&root, data, w, h)?,
                ChartKind::HorizontalBar => draw_horizontal_bars(&root, data, w, h)?,
                ChartKind::Pie => draw_pie(&root, data, total, w, h)?,
            }
        }
        root.present().map_err(draw_err)?;
    }

    Ok(RasterImage { width, height, rgb })
}

type Area<'a> = DrawingArea<BitMapBackend<'a>, plotters::coord::Shift>;

fn draw_err<E: std::fmt::Display>(e: E) -> ChartError {
    ChartError::Draw {
        message: e.to_string(),
    }
}

fn fill_rect(
    root: &Area<'_>,
    from: (i32, i32),
    to: (i32, i32),
    color: Rgb,
) -> Result<(), ChartError> {
    root.draw(&Rectangle::new([from, to], color.plotters().filled()))
        .map_err(draw_err)
}

fn draw_placeholder(root: &Area<'_>, w: i32, h: i32) -> Result<(), ChartError> {
    fill_rect(root, (MARGIN, MARGIN), (w - MARGIN, h - MARGIN), PLACEHOLDER_FILL)?;
    root.draw(&Rectangle::new(
        [(MARGIN, MARGIN), (w - MARGIN, h - MARGIN)],
        PLACEHOLDER_FRAME.plotters().stroke_width(3),
    ))
    .map_err(draw_err)
}

fn draw_bars(root: &Area<'_>, data: &[ChartDatum], w: i32, h: i32) -> Result<(), ChartError> {
    let max = data.iter().map(|d| d.value).max().unwrap_or(0).max(1) as f64;
    let base = h - MARGIN;
    let plot_h = f64::from(h - 2 * MARGIN);
    let slot = f64::from(w - 2 * MARGIN) / data.len() as f64;

    for (i, datum) in data.iter().enumerate() {
        if datum.value == 0 {
            continue;
        }
        let left = MARGIN + (slot * i as f64 + slot * 0.2) as i32;
        let right = MARGIN + (slot * (i + 1) as f64 - slot * 0.2) as i32;
        let top = base - (datum.value as f64 / max * plot_h) as i32;
        fill_rect(root, (left, top), (right, base), datum.color)?;
    }
    fill_rect(root, (MARGIN, base), (w - MARGIN, base + 2), AXIS)
}

fn draw_horizontal_bars(
    root: &Area<'_>,
    data: &[ChartDatum],
    w: i32,
    h: i32,
) -> Result<(), ChartError> {
    let max = data.iter().map(|d| d.value).max().unwrap_or(0).max(1) as f64;
    let plot_w = f64::from(w - 2 * MARGIN);
    let slot = f64::from(h - 2 * MARGIN) / data.len() as f64;

    for (i, datum) in data.iter().enumerate() {
        if datum.value == 0 {
            continue;
        }
        let top = MARGIN + (slot * i as f64 + slot * 0.15) as i32;
        let bottom = MARGIN + (slot * (i + 1) as f64 - slot * 0.15) as i32;
        let right = MARGIN + (datum.value as f64 / max * plot_w) as i32;
        fill_rect(root, (MARGIN, top), (right, bottom), datum.color)?;
    }
    fill_rect(root, (MARGIN - 2, MARGIN), (MARGIN, h - MARGIN), AXIS)
}

fn draw_pie(
    root: &Area<'_>,
    data: &[ChartDatum],
    total: usize,
    w: i32,
    h: i32,
) -> Result<(), ChartError> {
    let center = (w / 2, h / 2);
    let radius = f64::from(w.min(h) / 2 - MARGIN / 2);
    // Start at twelve o'clock and go clockwise.
    let mut start = -PI / 2.0;

    for datum in data.iter().filter(|d| d.value > 0) {
        let sweep = datum.value as f64 / total as f64 * 2.0 * PI;
        let steps = (sweep.to_degrees().ceil() as usize).max(2);

        let mut points = Vec::with_capacity(steps + 2);
        points.push(center);
        for step in 0..=steps {
            let angle = start + sweep * step as f64 / steps as f64;
            points.push((
                center.0 + (radius * angle.cos()).round() as i32,
                center.1 + (radius * angle.sin()).round() as i32,
            ));
        }
        root.draw(&Polygon::new(points, datum.color.plotters().filled()))
            .map_err(draw_err)?;
        start += sweep;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn severity_data(high: usize, medium: usize, low: usize) -> Vec<ChartDatum> {
        vec![
            ChartDatum::new("High", high, severity_color(Severity::High)),
            ChartDatum::new("Medium", medium, severity_color(Severity::Medium)),
            ChartDatum::new("Low", low, severity_color(Severity::Low)),
        ]
    }

    #[test]
    fn hex_colors_unpack() {
        assert_eq!(severity_color(Severity::High), Rgb(0xdc, 0x26, 0x26));
        assert_eq!(status_color(Status::Suppressed), Rgb(0x94, 0xa3, 0xb8));
        assert_eq!(palette(0), palette(PALETTE.len()));
    }

    #[test]
    fn bar_chart_uses_series_colors() {
        let image = render_chart(ChartKind::Bar, &severity_data(20, 50, 30), 400, 250).unwrap();
        assert_eq!(image.rgb.len(), 400 * 250 * 3);
        for severity in Severity::ALL {
            assert!(image.contains(severity_color(severity)), "{severity} missing");
        }
        assert_eq!(image.pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn zero_values_are_not_drawn() {
        for kind in [ChartKind::Bar, ChartKind::Pie, ChartKind::HorizontalBar] {
            let image = render_chart(kind, &severity_data(5, 0, 3), 300, 200).unwrap();
            assert!(image.contains(severity_color(Severity::High)));
            assert!(!image.contains(severity_color(Severity::Medium)), "{kind:?}");
        }
    }

    #[test]
    fn pie_fills_the_center() {
        let data = vec![ChartDatum::new("Open", 1, status_color(Status::Open))];
        let image = render_chart(ChartKind::Pie, &data, 300, 300).unwrap();
        assert_eq!(image.pixel(200, 100), status_color(Status::Open));
        assert_eq!(image.pixel(100, 200), status_color(Status::Open));
        assert_eq!(image.pixel(2, 2), BACKGROUND);
    }

    #[test]
    fn empty_data_renders_placeholder() {
        for data in [Vec::new(), severity_data(0, 0, 0)] {
            let image = render_chart(ChartKind::Bar, &data, 300, 200).unwrap();
            assert!(image.contains(PLACEHOLDER_FILL));
            assert!(!image.contains(severity_color(Severity::High)));
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let data = severity_data(7, 11, 2);
        let a = render_chart(ChartKind::Pie, &data, 320, 200).unwrap();
        let b = render_chart(ChartKind::Pie, &data, 320, 200).unwrap();
        assert_eq!(a, b);
    }
}
