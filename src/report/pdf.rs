//! PDF report composition.
//!
//! Layout runs in two passes. The first pass places text, rules, images and
//! link areas on A4 pages while tracking the vertical cursor; the second pass
//! adds footers once the page count is known and serializes the document.
//! Text uses the standard Helvetica faces, so nothing has to be embedded.

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use std::mem;
use tracing::{debug, warn};

use super::chart::{self, ChartDatum, ChartKind, RasterImage, Rgb};
use super::ReportLayout;
use crate::error::ReportError;
use crate::model::{ClashRecord, KpiSummary, Severity, Status};
use crate::storage::CaptureLookup;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 56.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const FOOTER_Y: f32 = 30.0;
const SCREENSHOT_BOX: (f32, f32) = (283.0, 170.0);
const LOGO_BOX: (f32, f32) = (227.0, 113.0);
const CHART_WIDTH: f32 = 300.0;
const ROW_HEIGHT: f32 = 16.0;
const TABLE_FONT: f32 = 8.5;
const LABEL_WIDTH: f32 = 130.0;

const TEXT: Rgb = Rgb::hex(0x0f_17_2a);
const MUTED: Rgb = Rgb::hex(0x64_74_8b);
const ACCENT: Rgb = Rgb::hex(0x1e_40_af);
const RULE: Rgb = Rgb::hex(0xe2_e8_f0);
const HEADER_FILL: Rgb = Rgb::hex(0xe2_e8_f0);
const ZEBRA_FILL: Rgb = Rgb::hex(0xf8_fa_fc);
const LINK: Rgb = Rgb::hex(0x25_63_eb);

/// What goes into one report.
pub struct ReportContent<'a> {
    pub title: &'a str,
    pub prepared_by: &'a str,
    pub generated_at: DateTime<Utc>,
    pub filter_description: &'a str,
    pub records: &'a [&'a ClashRecord],
    pub kpis: &'a KpiSummary,
    pub include_screenshots: bool,
    /// Encoded PNG or JPEG drawn at the top of the cover.
    pub logo: Option<&'a [u8]>,
}

/// Lays out and serializes the report.
///
/// `captures` is only consulted when `include_screenshots` is set; a capture
/// that is missing or cannot be decoded leaves its row without an image.
pub fn compose(
    content: &ReportContent<'_>,
    layout: &ReportLayout,
    captures: Option<&dyn CaptureLookup>,
) -> Result<Vec<u8>, ReportError> {
    let mut builder = PageBuilder::new();

    cover_page(&mut builder, content);
    kpi_section(&mut builder, content.kpis, layout)?;
    let captures = captures.filter(|_| content.include_screenshots);
    details_section(&mut builder, content.records, layout, captures);

    let (pages, images) = builder.finish(&layout.disclaimer);
    debug!(pages = pages.len(), images = images.len(), "report laid out");
    serialize(content, pages, &images)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Italic];

    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Italic => "Helvetica-Oblique",
        }
    }
}

struct Link {
    rect: [f32; 4],
    uri: String,
}

#[derive(Default)]
struct Page {
    ops: Vec<Operation>,
    links: Vec<Link>,
}

/// Cursor-based page layout. `y` is the top of the free area, in PDF points
/// from the bottom edge.
struct PageBuilder {
    done: Vec<Page>,
    current: Page,
    y: f32,
    images: Vec<(String, RasterImage)>,
}

impl PageBuilder {
    fn new() -> Self {
        Self {
            done: Vec::new(),
            current: Page::default(),
            y: PAGE_HEIGHT - MARGIN,
            images: Vec::new(),
        }
    }

    fn new_page(&mut self) {
        self.done.push(mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Starts a new page unless `height` still fits. Returns whether it broke.
    fn reserve(&mut self, height: f32) -> bool {
        if self.y - height < MARGIN {
            self.new_page();
            return true;
        }
        false
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn text(&mut self, x: f32, y: f32, font: Font, size: f32, color: Rgb, text: &str) {
        let [r, g, b] = color.unit();
        self.current.ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource().into(), size.into()]),
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::String(encode(text), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        let [r, g, b] = color.unit();
        self.current.ops.extend([
            Operation::new("rg", vec![r.into(), g.into(), b.into()]),
            Operation::new("re", vec![x.into(), y.into(), width.into(), height.into()]),
            Operation::new("f", vec![]),
        ]);
    }

    fn rule(&mut self, y: f32, color: Rgb) {
        self.fill_rect(MARGIN, y, CONTENT_WIDTH, 0.75, color);
    }

    fn image(&mut self, image: RasterImage, x: f32, y: f32, width: f32, height: f32) {
        let name = format!("Im{}", self.images.len() + 1);
        self.current.ops.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.images.push((name, image));
    }

    fn link(&mut self, rect: [f32; 4], uri: &str) {
        self.current.links.push(Link {
            rect,
            uri: uri.to_string(),
        });
    }

    /// Wrapped text starting at `x`, breaking pages as needed.
    fn paragraph(&mut self, x: f32, font: Font, size: f32, color: Rgb, text: &str) {
        let leading = size * 1.4;
        for line in wrap(text, font, size, PAGE_WIDTH - MARGIN - x) {
            self.reserve(leading);
            self.y -= leading;
            self.text(x, self.y + size * 0.3, font, size, color, &line);
        }
    }

    fn heading(&mut self, text: &str) {
        self.reserve(40.0);
        self.y -= 22.0;
        self.text(MARGIN, self.y, Font::Bold, 16.0, TEXT, text);
        self.y -= 8.0;
        self.rule(self.y, RULE);
        self.y -= 12.0;
    }

    fn subheading(&mut self, text: &str, color: Rgb) {
        self.reserve(40.0);
        self.y -= 16.0;
        self.text(MARGIN, self.y, Font::Bold, 12.0, color, text);
        self.y -= 8.0;
    }

    /// Bold label on the left, wrapped value on the right.
    fn key_value(&mut self, label: &str, value: &str, size: f32) {
        let leading = size * 1.45;
        let lines = wrap(value, Font::Regular, size, CONTENT_WIDTH - LABEL_WIDTH);
        self.reserve(leading * lines.len() as f32);
        let label = fit(label, Font::Bold, size, LABEL_WIDTH - 8.0);
        for (i, line) in lines.iter().enumerate() {
            self.y -= leading;
            if i == 0 {
                self.text(MARGIN, self.y, Font::Bold, size, MUTED, &label);
            }
            self.text(MARGIN + LABEL_WIDTH, self.y, Font::Regular, size, TEXT, line);
        }
    }

    /// Closes the last page and stamps page numbers and the disclaimer on
    /// every page after the cover.
    fn finish(mut self, disclaimer: &str) -> (Vec<Page>, Vec<(String, RasterImage)>) {
        self.done.push(mem::take(&mut self.current));
        let total = self.done.len();

        for (index, page) in self.done.iter_mut().enumerate().skip(1) {
            let number = format!("Page {} of {total}", index + 1);
            let number_width = text_width(&number, Font::Regular, 8.0);
            let note = fit(disclaimer, Font::Italic, 7.0, CONTENT_WIDTH - number_width - 12.0);

            let mut footer = PageBuilder::new();
            footer.rule(FOOTER_Y + 12.0, RULE);
            if !note.is_empty() {
                footer.text(MARGIN, FOOTER_Y, Font::Italic, 7.0, MUTED, &note);
            }
            footer.text(
                PAGE_WIDTH - MARGIN - number_width,
                FOOTER_Y,
                Font::Regular,
                8.0,
                MUTED,
                &number,
            );
            page.ops.append(&mut footer.current.ops);
        }

        (self.done, self.images)
    }
}

fn cover_page(b: &mut PageBuilder, content: &ReportContent<'_>) {
    b.fill_rect(0.0, PAGE_HEIGHT - 14.0, PAGE_WIDTH, 14.0, ACCENT);

    if let Some(bytes) = content.logo {
        match decode_raster(bytes) {
            Some(Ok(logo)) => {
                let (width, height) = fit_box(&logo, LOGO_BOX);
                let top = PAGE_HEIGHT - 80.0;
                b.image(logo, MARGIN, top - height, width, height);
            }
            Some(Err(e)) => warn!(error = %e, "skipping undecodable logo"),
            None => warn!("skipping empty logo"),
        }
    }

    b.y = PAGE_HEIGHT - 240.0;
    b.paragraph(MARGIN, Font::Bold, 28.0, TEXT, content.title);
    b.gap(14.0);
    b.rule(b.y, ACCENT);
    b.gap(18.0);

    let generated = content.generated_at.format("%Y-%m-%d %H:%M UTC").to_string();
    let count = content.records.len().to_string();
    b.key_value("Prepared by", content.prepared_by, 11.0);
    b.key_value("Generated", &generated, 11.0);
    b.key_value("Filter", content.filter_description, 11.0);
    b.key_value("Clashes in report", &count, 11.0);
}

fn kpi_section(
    b: &mut PageBuilder,
    kpis: &KpiSummary,
    layout: &ReportLayout,
) -> Result<(), ReportError> {
    b.new_page();
    b.heading("Key Performance Indicators");

    if kpis.total_clashes == 0 {
        b.paragraph(
            MARGIN,
            Font::Italic,
            11.0,
            MUTED,
            "No data: no clashes match the selected filter.",
        );
        b.gap(8.0);
    }

    let mut rows = vec![("Total clashes".to_string(), kpis.total_clashes.to_string())];
    for severity in Severity::ALL {
        rows.push((
            format!("{} severity", severity.label()),
            kpis.by_severity.get(severity).to_string(),
        ));
    }
    for status in Status::ALL {
        rows.push((status.label().to_string(), kpis.by_status.get(status).to_string()));
    }
    rows.push((
        "Resolved percentage".to_string(),
        format!("{:.1}%", kpis.resolved_percentage),
    ));
    for (label, value) in &rows {
        b.key_value(label, value, 10.0);
    }

    if !kpis.top_categories.is_empty() {
        b.subheading("Top categories", TEXT);
        for category in &kpis.top_categories {
            b.key_value(&category.category, &category.count.to_string(), 10.0);
        }
    }

    let severity: Vec<ChartDatum> = Severity::ALL
        .iter()
        .map(|&s| ChartDatum::new(s.label(), kpis.by_severity.get(s), chart::severity_color(s)))
        .collect();
    chart_block(b, "Clashes by severity", ChartKind::Bar, &severity, layout)?;

    let status: Vec<ChartDatum> = Status::ALL
        .iter()
        .map(|&s| ChartDatum::new(s.label(), kpis.by_status.get(s), chart::status_color(s)))
        .collect();
    chart_block(b, "Clashes by status", ChartKind::Pie, &status, layout)?;

    let disciplines: Vec<ChartDatum> = kpis
        .by_discipline
        .iter()
        .take(layout.max_chart_series)
        .enumerate()
        .map(|(i, d)| ChartDatum::new(d.discipline_pair.as_str(), d.count, chart::palette(i)))
        .collect();
    chart_block(
        b,
        "Clashes by discipline pair",
        ChartKind::HorizontalBar,
        &disciplines,
        layout,
    )
}

/// Chart image on the left with its legend typeset on the right.
fn chart_block(
    b: &mut PageBuilder,
    title: &str,
    kind: ChartKind,
    data: &[ChartDatum],
    layout: &ReportLayout,
) -> Result<(), ReportError> {
    let image = chart::render_chart(kind, data, layout.chart_width, layout.chart_height)?;
    let width = CHART_WIDTH;
    let height = width * image.height as f32 / image.width.max(1) as f32;

    b.reserve(height + 40.0);
    b.subheading(title, TEXT);
    let top = b.y;
    let empty = data.iter().all(|d| d.value == 0);
    b.image(image, MARGIN, top - height, width, height);

    if empty {
        let label = "No data";
        let x = MARGIN + (width - text_width(label, Font::Italic, 11.0)) / 2.0;
        b.text(x, top - height / 2.0 - 4.0, Font::Italic, 11.0, MUTED, label);
    } else {
        let legend_x = MARGIN + width + 16.0;
        let legend_width = PAGE_WIDTH - MARGIN - legend_x - 14.0;
        let mut y = top - 14.0;
        for datum in data {
            b.fill_rect(legend_x, y, 8.0, 8.0, datum.color);
            let entry = fit(
                &format!("{}: {}", datum.label, datum.value),
                Font::Regular,
                9.0,
                legend_width,
            );
            b.text(legend_x + 14.0, y + 0.5, Font::Regular, 9.0, TEXT, &entry);
            y -= 14.0;
        }
    }

    b.y = top - height - 12.0;
    Ok(())
}

struct Column {
    title: &'static str,
    width: f32,
}

const DETAIL_COLUMNS: [Column; 6] = [
    Column { title: "ID", width: 78.0 },
    Column { title: "Title", width: 140.0 },
    Column { title: "Status", width: 62.0 },
    Column { title: "Disciplines", width: 118.0 },
    Column { title: "Level", width: 45.0 },
    Column { title: "Link", width: 40.0 },
];
const CELL_PADDING: f32 = 4.0;

fn details_section(
    b: &mut PageBuilder,
    records: &[&ClashRecord],
    layout: &ReportLayout,
    captures: Option<&dyn CaptureLookup>,
) {
    b.new_page();
    b.heading("Clash Details");

    if records.is_empty() {
        b.paragraph(
            MARGIN,
            Font::Italic,
            11.0,
            MUTED,
            "No clashes match the selected filter.",
        );
        return;
    }

    for severity in Severity::ALL {
        let group: Vec<&ClashRecord> = records
            .iter()
            .copied()
            .filter(|r| r.severity == severity)
            .collect();
        if group.is_empty() {
            continue;
        }

        b.reserve(40.0 + 2.0 * ROW_HEIGHT);
        b.subheading(
            &format!("{} Severity ({})", severity.label(), group.len()),
            chart::severity_color(severity),
        );
        table_header(b);

        for (i, record) in group.iter().take(layout.rows_per_severity).enumerate() {
            if b.reserve(ROW_HEIGHT) {
                table_header(b);
            }
            table_row(b, record, i % 2 == 1);

            if let Some(image) = captures.and_then(|c| load_screenshot(c, &record.id)) {
                screenshot(b, image);
            }
        }

        let hidden = group.len().saturating_sub(layout.rows_per_severity);
        if hidden > 0 {
            b.gap(4.0);
            b.paragraph(
                MARGIN,
                Font::Italic,
                9.0,
                MUTED,
                &format!(
                    "... and {hidden} more {} severity clashes not shown",
                    severity.as_str()
                ),
            );
        }
        b.gap(10.0);
    }
}

fn table_header(b: &mut PageBuilder) {
    b.fill_rect(MARGIN, b.y - ROW_HEIGHT, CONTENT_WIDTH, ROW_HEIGHT, HEADER_FILL);
    let mut x = MARGIN;
    for column in &DETAIL_COLUMNS {
        b.text(x + CELL_PADDING, b.y - 11.0, Font::Bold, TABLE_FONT, TEXT, column.title);
        x += column.width;
    }
    b.y -= ROW_HEIGHT;
}

fn table_row(b: &mut PageBuilder, record: &ClashRecord, shaded: bool) {
    if shaded {
        b.fill_rect(MARGIN, b.y - ROW_HEIGHT, CONTENT_WIDTH, ROW_HEIGHT, ZEBRA_FILL);
    }

    let cells = [
        record.id.clone(),
        record.title.clone(),
        record.status.label().to_string(),
        record.discipline_label(),
        record.level.clone().unwrap_or_else(|| "-".to_string()),
    ];
    let baseline = b.y - 11.0;
    let mut x = MARGIN;
    for (cell, column) in cells.iter().zip(&DETAIL_COLUMNS) {
        let shown = fit(cell, Font::Regular, TABLE_FONT, column.width - 2.0 * CELL_PADDING);
        b.text(x + CELL_PADDING, baseline, Font::Regular, TABLE_FONT, TEXT, &shown);
        x += column.width;
    }

    if let Some(url) = record.deep_link.as_deref().filter(|u| !u.is_empty()) {
        let label = "Open";
        b.text(x + CELL_PADDING, baseline, Font::Regular, TABLE_FONT, LINK, label);
        let right = x + CELL_PADDING + text_width(label, Font::Regular, TABLE_FONT);
        b.link([x, b.y - ROW_HEIGHT, right, b.y], url);
    }

    b.y -= ROW_HEIGHT;
}

/// Size of `image` scaled to fit `(max_w, max_h)`, aspect ratio kept.
fn fit_box(image: &RasterImage, (max_w, max_h): (f32, f32)) -> (f32, f32) {
    let scale = (max_w / image.width as f32).min(max_h / image.height as f32);
    (image.width as f32 * scale, image.height as f32 * scale)
}

fn screenshot(b: &mut PageBuilder, image: RasterImage) {
    let (width, height) = fit_box(&image, SCREENSHOT_BOX);

    b.reserve(height + 8.0);
    b.y -= 4.0;
    b.image(image, MARGIN + CELL_PADDING, b.y - height, width, height);
    b.y -= height + 4.0;
}

fn load_screenshot(captures: &dyn CaptureLookup, clash_id: &str) -> Option<RasterImage> {
    let bytes = captures.capture(clash_id)?;
    match decode_raster(&bytes)? {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(clash = clash_id, error = %e, "skipping undecodable capture");
            None
        }
    }
}

/// Decodes PNG or JPEG bytes; `None` for an image without pixels.
fn decode_raster(bytes: &[u8]) -> Option<Result<RasterImage, image::ImageError>> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(decoded) => decoded.to_rgb8(),
        Err(e) => return Some(Err(e)),
    };
    if decoded.width() == 0 || decoded.height() == 0 {
        return None;
    }
    Some(Ok(RasterImage {
        width: decoded.width(),
        height: decoded.height(),
        rgb: decoded.into_raw(),
    }))
}

fn serialize(
    content: &ReportContent<'_>,
    pages: Vec<Page>,
    images: &[(String, RasterImage)],
) -> Result<Vec<u8>, ReportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource(), id);
    }

    let mut xobjects = Dictionary::new();
    for (name, image) in images {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(image.width),
            "Height" => i64::from(image.height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        let id = doc.add_object(Stream::new(dict, image.rgb.clone()));
        xobjects.set(name.as_str(), id);
    }

    let resources_id = doc.add_object(dictionary! {
        "Font" => fonts,
        "XObject" => xobjects,
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let stream = Content {
            operations: page.ops,
        }
        .encode()?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), stream));

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if !page.links.is_empty() {
            let annots: Vec<Object> = page.links.iter().map(link_annotation).collect();
            page_dict.set("Annots", annots);
        }
        kids.push(doc.add_object(page_dict).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(encode(content.title), StringFormat::Literal),
        "Author" => Object::String(encode(content.prepared_by), StringFormat::Literal),
        "Creator" => Object::string_literal(concat!("clash-reporter ", env!("CARGO_PKG_VERSION"))),
        "CreationDate" => Object::string_literal(
            content.generated_at.format("D:%Y%m%d%H%M%SZ").to_string()
        ),
    });
    doc.trailer.set("Info", info_id);

    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

fn link_annotation(link: &Link) -> Object {
    let rect: Vec<Object> = link.rect.iter().map(|&v| v.into()).collect();
    Object::Dictionary(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => rect,
        "Border" => vec![0.into(), 0.into(), 0.into()],
        "A" => dictionary! {
            "S" => "URI",
            "URI" => Object::string_literal(link.uri.as_str()),
        },
    })
}

/// Encodes text for a WinAnsi Type1 font. Characters outside Latin-1 become `?`.
fn encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            0x20..=0x7e | 0xa0..=0xff => u32::from(c) as u8,
            0x09 | 0x0a | 0x0d => b' ',
            _ => b'?',
        })
        .collect()
}

/// Helvetica advance widths for ASCII 0x20..=0x7e, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

fn char_width(c: char) -> u16 {
    match u32::from(c) {
        code @ 0x20..=0x7e => HELVETICA_WIDTHS[(code - 0x20) as usize],
        _ => 556,
    }
}

fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(char_width(c))).sum();
    // Bold faces run slightly wider; the regular metrics are close enough otherwise.
    let scale = if font == Font::Bold { 1.06 } else { 1.0 };
    units as f32 * size / 1000.0 * scale
}

/// Shortens `text` with a trailing `...` until it fits `max_width`.
fn fit(text: &str, font: Font, size: f32, max_width: f32) -> String {
    if text_width(text, font, size) <= max_width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + "...";
        if text_width(&candidate, font, size) <= max_width {
            return candidate;
        }
    }
    String::new()
}

/// Greedy word wrap. Words wider than a line are split by character.
fn wrap(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{line} {word}")
        };
        if text_width(&candidate, font, size) <= max_width {
            line = candidate;
            continue;
        }
        if !line.is_empty() {
            lines.push(mem::take(&mut line));
        }
        for c in word.chars() {
            let mut next = line.clone();
            next.push(c);
            if !line.is_empty() && text_width(&next, font, size) > max_width {
                lines.push(mem::take(&mut line));
                line.push(c);
            } else {
                line = next;
            }
        }
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clash::fixtures::record;
    use crate::service::calculate_kpis;
    use crate::source::mock::generate_mock_clashes;
    use std::collections::HashMap;
    use std::io::Cursor;

    struct MemoryCaptures(HashMap<String, Vec<u8>>);

    impl CaptureLookup for MemoryCaptures {
        fn capture(&self, clash_id: &str) -> Option<Vec<u8>> {
            self.0.get(clash_id).cloned()
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn compose_records(
        records: &[ClashRecord],
        title: &str,
        layout: &ReportLayout,
        captures: Option<&dyn CaptureLookup>,
    ) -> Vec<u8> {
        let refs: Vec<&ClashRecord> = records.iter().collect();
        let kpis = calculate_kpis(refs.iter().copied());
        let content = ReportContent {
            title,
            prepared_by: "QA",
            generated_at: Utc::now(),
            filter_description: "All clashes (no filter)",
            records: &refs,
            kpis: &kpis,
            include_screenshots: true,
            logo: None,
        };
        compose(&content, layout, captures).unwrap()
    }

    fn image_count(doc: &Document) -> usize {
        doc.objects
            .values()
            .filter(|o| match o {
                Object::Stream(s) => matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"),
                _ => false,
            })
            .count()
    }

    fn page_texts(page: &Page) -> Vec<String> {
        page.ops
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    fn lay_out(records: &[ClashRecord], layout: &ReportLayout) -> Vec<Page> {
        let refs: Vec<&ClashRecord> = records.iter().collect();
        let kpis = calculate_kpis(refs.iter().copied());
        let mut b = PageBuilder::new();
        kpi_section(&mut b, &kpis, layout).unwrap();
        details_section(&mut b, &refs, layout, None);
        b.finish(&layout.disclaimer).0
    }

    #[test]
    fn empty_report_is_a_valid_pdf() {
        let bytes = compose_records(&[], "Empty", &ReportLayout::default(), None);
        assert!(bytes.starts_with(b"%PDF-"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() >= 3);
        // Three placeholder charts, nothing else.
        assert_eq!(image_count(&doc), 3);
    }

    #[test]
    fn title_lands_in_document_metadata() {
        let records = generate_mock_clashes(10, 1, Utc::now());
        let bytes = compose_records(&records, "Tower B coordination", &ReportLayout::default(), None);
        let needle = b"Tower B coordination";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn footer_numbers_every_page_but_the_cover() {
        let records = generate_mock_clashes(100, 3, Utc::now());
        let layout = ReportLayout::default();
        let refs: Vec<&ClashRecord> = records.iter().collect();
        let kpis = calculate_kpis(refs.iter().copied());
        let content = ReportContent {
            title: "Footers",
            prepared_by: "QA",
            generated_at: Utc::now(),
            filter_description: "All clashes (no filter)",
            records: &refs,
            kpis: &kpis,
            include_screenshots: false,
            logo: None,
        };
        let mut b = PageBuilder::new();
        cover_page(&mut b, &content);
        kpi_section(&mut b, &kpis, &layout).unwrap();
        details_section(&mut b, &refs, &layout, None);
        let (pages, _) = b.finish(&layout.disclaimer);
        let total = pages.len();

        assert!(!page_texts(&pages[0]).iter().any(|t| t.starts_with("Page ")));
        for (i, page) in pages.iter().enumerate().skip(1) {
            let texts = page_texts(page);
            assert!(texts.contains(&format!("Page {} of {total}", i + 1)));
            assert!(texts
                .iter()
                .any(|t| t.len() > 20 && layout.disclaimer.starts_with(t.trim_end_matches("..."))));
        }
    }

    #[test]
    fn severity_sections_are_capped_with_a_note() {
        let records = generate_mock_clashes(100, 8, Utc::now());
        let layout = ReportLayout {
            rows_per_severity: 5,
            ..ReportLayout::default()
        };
        let texts: Vec<String> = lay_out(&records, &layout).iter().flat_map(page_texts).collect();

        assert!(texts.contains(&"High Severity (20)".to_string()));
        assert!(texts.contains(&"... and 15 more high severity clashes not shown".to_string()));
        assert!(texts.contains(&"... and 45 more medium severity clashes not shown".to_string()));
        assert!(texts.contains(&"... and 25 more low severity clashes not shown".to_string()));
    }

    #[test]
    fn absent_severities_get_no_section() {
        let records = vec![
            record("c1", Severity::High, Status::Open),
            record("c2", Severity::High, Status::Resolved),
        ];
        let texts: Vec<String> = lay_out(&records, &ReportLayout::default())
            .iter()
            .flat_map(page_texts)
            .collect();

        assert!(texts.contains(&"High Severity (2)".to_string()));
        assert!(!texts.iter().any(|t| t.starts_with("Medium Severity")));
        assert!(!texts.iter().any(|t| t.contains("more high severity")));
    }

    #[test]
    fn table_header_repeats_after_page_break() {
        let records = generate_mock_clashes(100, 2, Utc::now());
        let layout = ReportLayout {
            rows_per_severity: 100,
            ..ReportLayout::default()
        };
        let pages = lay_out(&records, &layout);
        let detail_pages = pages
            .iter()
            .filter(|p| page_texts(p).iter().any(|t| t.starts_with("clash_")))
            .collect::<Vec<_>>();

        assert!(detail_pages.len() > 1);
        for page in detail_pages {
            assert!(page_texts(page).contains(&"Disciplines".to_string()));
        }
    }

    #[test]
    fn screenshots_are_embedded_and_bad_ones_skipped() {
        let records = vec![
            record("c1", Severity::High, Status::Open),
            record("c2", Severity::High, Status::Open),
            record("c3", Severity::Low, Status::Open),
        ];
        let captures = MemoryCaptures(HashMap::from([
            ("c1".to_string(), png(40, 20)),
            ("c2".to_string(), b"not an image".to_vec()),
        ]));

        let bytes = compose_records(&records, "Shots", &ReportLayout::default(), Some(&captures));
        let doc = Document::load_mem(&bytes).unwrap();
        // Three charts plus the one decodable capture.
        assert_eq!(image_count(&doc), 4);
    }

    #[test]
    fn logo_is_drawn_on_the_cover_within_its_box() {
        let logo = png(400, 100);
        let kpis = calculate_kpis(std::iter::empty());
        let mut content = ReportContent {
            title: "Logo",
            prepared_by: "QA",
            generated_at: Utc::now(),
            filter_description: "All clashes (no filter)",
            records: &[],
            kpis: &kpis,
            include_screenshots: false,
            logo: Some(&logo),
        };

        let mut b = PageBuilder::new();
        cover_page(&mut b, &content);
        assert_eq!(b.images.len(), 1);
        let cm = b
            .current
            .ops
            .iter()
            .find(|op| op.operator == "cm")
            .unwrap();
        let width = cm.operands[0].as_float().unwrap();
        let height = cm.operands[3].as_float().unwrap();
        assert!((width - LOGO_BOX.0).abs() < 0.01);
        assert!(height <= LOGO_BOX.1);

        let garbage = b"not a logo".to_vec();
        content.logo = Some(&garbage);
        let mut b = PageBuilder::new();
        cover_page(&mut b, &content);
        assert!(b.images.is_empty());
    }

    #[test]
    fn deep_links_become_annotations() {
        let records = vec![record("c1", Severity::High, Status::Open)];
        let pages = lay_out(&records, &ReportLayout::default());
        let links: Vec<&Link> = pages.iter().flat_map(|p| &p.links).collect();
        assert_eq!(links.len(), 1);
        assert_eq!(Some(links[0].uri.as_str()), records[0].deep_link.as_deref());
    }

    #[test]
    fn text_helpers() {
        assert_eq!(encode("Caf\u{e9} \u{2013} ok"), b"Caf\xe9 ? ok".to_vec());
        assert!(text_width("WWW", Font::Regular, 10.0) > text_width("iii", Font::Regular, 10.0));

        let fitted = fit("A rather long clash title", Font::Regular, 10.0, 50.0);
        assert!(fitted.ends_with("..."));
        assert!(text_width(&fitted, Font::Regular, 10.0) <= 50.0);

        let lines = wrap("one two three four five six", Font::Regular, 10.0, 40.0);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| text_width(l, Font::Regular, 10.0) <= 40.0));
        assert_eq!(wrap("", Font::Regular, 10.0, 40.0), vec![String::new()]);
    }
}
