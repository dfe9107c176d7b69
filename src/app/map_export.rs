//! One-page PDF map layout: title block, map frame with the analysis
//! layers, legend, summary notes, scale bar, north arrow and date.

use geo::{Coord, Geometry, LineString, Polygon, Rect};
use pdf_writer::{Content, Finish, Name, Pdf, Rect as PdfRect, Ref, Str, TextStr};

use crate::core::projection::LocalProjection;
use crate::core::Storage;
use crate::domain::model::Layer;
use crate::utils::error::{Result, WnvError};

const MARGIN: f32 = 36.0;
const LEGEND_WIDTH: f32 = 190.0;
const TITLE_BLOCK: f32 = 70.0;
const FOOTER: f32 = 40.0;

const REGULAR: Name<'static> = Name(b"F1");
const BOLD: Name<'static> = Name(b"F2");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symbol {
    Fill { fill: Rgb, stroke: Rgb },
    Outline { stroke: Rgb },
    Dot { color: Rgb, radius: f32 },
    Cross { color: Rgb, size: f32 },
}

#[derive(Debug, Clone)]
pub struct MapLayer {
    pub label: String,
    pub symbol: Symbol,
    pub layer: Layer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    LetterLandscape,
    LetterPortrait,
    A4Landscape,
    A4Portrait,
}

impl PageSize {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "letter-landscape" => Ok(PageSize::LetterLandscape),
            "letter-portrait" => Ok(PageSize::LetterPortrait),
            "a4-landscape" => Ok(PageSize::A4Landscape),
            "a4-portrait" => Ok(PageSize::A4Portrait),
            other => Err(WnvError::InvalidConfigValueError {
                field: "map.page".to_string(),
                value: other.to_string(),
                reason: "Unknown page size".to_string(),
            }),
        }
    }

    /// Width and height in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PageSize::LetterLandscape => (792.0, 612.0),
            PageSize::LetterPortrait => (612.0, 792.0),
            PageSize::A4Landscape => (842.0, 595.0),
            PageSize::A4Portrait => (595.0, 842.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapLayout {
    pub title: String,
    pub subtitle: Option<String>,
    pub date_text: String,
    pub page: PageSize,
    pub layers: Vec<MapLayer>,
    pub notes: Vec<String>,
}

/// Builtin Type1 fonts only cover Latin-1; anything outside ASCII becomes '?'.
fn pdf_text(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' })
        .collect()
}

fn write_text(content: &mut Content, font: Name, size: f32, x: f32, y: f32, text: &str) {
    let bytes = pdf_text(text);
    content.begin_text();
    content.set_font(font, size);
    content.next_line(x, y);
    content.show(Str(&bytes));
    content.end_text();
}

/// Maps lon/lat onto the map frame, keeping metric aspect ratio.
struct FrameTransform {
    projection: LocalProjection,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl FrameTransform {
    fn fit(extent: Rect<f64>, frame: (f32, f32, f32, f32)) -> Self {
        let (fx, fy, fw, fh) = frame;
        let projection = LocalProjection::centered_on(extent);
        let min = projection.forward(extent.min());
        let max = projection.forward(extent.max());
        let width = (max.x - min.x).max(1.0);
        let height = (max.y - min.y).max(1.0);

        let scale = (fw as f64 / width).min(fh as f64 / height) * 0.92;
        let offset_x = fx as f64 + (fw as f64 - width * scale) / 2.0 - min.x * scale;
        let offset_y = fy as f64 + (fh as f64 - height * scale) / 2.0 - min.y * scale;

        Self {
            projection,
            scale,
            offset_x,
            offset_y,
        }
    }

    fn apply(&self, c: Coord<f64>) -> (f32, f32) {
        let p = self.projection.forward(c);
        (
            (p.x * self.scale + self.offset_x) as f32,
            (p.y * self.scale + self.offset_y) as f32,
        )
    }

    fn meters_per_point(&self) -> f64 {
        1.0 / self.scale
    }
}

fn ring_path(content: &mut Content, ring: &LineString<f64>, t: &FrameTransform, close: bool) {
    let mut coords = ring.coords();
    let Some(first) = coords.next() else {
        return;
    };
    let (x, y) = t.apply(*first);
    content.move_to(x, y);
    for c in coords {
        let (x, y) = t.apply(*c);
        content.line_to(x, y);
    }
    if close {
        content.close_path();
    }
}

fn polygon_path(content: &mut Content, polygon: &Polygon<f64>, t: &FrameTransform) {
    ring_path(content, polygon.exterior(), t, true);
    for hole in polygon.interiors() {
        ring_path(content, hole, t, true);
    }
}

fn draw_point(content: &mut Content, c: Coord<f64>, symbol: Symbol, t: &FrameTransform) {
    let (x, y) = t.apply(c);
    match symbol {
        Symbol::Dot { radius, .. } => {
            content.rect(x - radius, y - radius, radius * 2.0, radius * 2.0);
            content.fill_nonzero();
        }
        Symbol::Cross { size, .. } => {
            content.move_to(x - size, y - size);
            content.line_to(x + size, y + size);
            content.move_to(x - size, y + size);
            content.line_to(x + size, y - size);
            content.stroke();
        }
        Symbol::Fill { .. } | Symbol::Outline { .. } => {
            content.rect(x - 1.5, y - 1.5, 3.0, 3.0);
            content.fill_nonzero();
        }
    }
}

fn set_symbol_colors(content: &mut Content, symbol: Symbol) {
    match symbol {
        Symbol::Fill { fill, stroke } => {
            content.set_fill_rgb(fill.0, fill.1, fill.2);
            content.set_stroke_rgb(stroke.0, stroke.1, stroke.2);
            content.set_line_width(0.6);
        }
        Symbol::Outline { stroke } => {
            content.set_stroke_rgb(stroke.0, stroke.1, stroke.2);
            content.set_line_width(1.2);
        }
        Symbol::Dot { color, .. } => {
            content.set_fill_rgb(color.0, color.1, color.2);
        }
        Symbol::Cross { color, .. } => {
            content.set_stroke_rgb(color.0, color.1, color.2);
            content.set_line_width(1.0);
        }
    }
}

fn draw_geometry(content: &mut Content, geometry: &Geometry<f64>, symbol: Symbol, t: &FrameTransform) {
    let paint_polygons = |content: &mut Content, polygons: &[Polygon<f64>]| {
        for polygon in polygons {
            polygon_path(content, polygon, t);
        }
        match symbol {
            Symbol::Fill { .. } => {
                content.fill_even_odd_and_stroke();
            }
            _ => {
                content.stroke();
            }
        }
    };

    match geometry {
        Geometry::Point(p) => draw_point(content, p.0, symbol, t),
        Geometry::MultiPoint(mp) => {
            for p in &mp.0 {
                draw_point(content, p.0, symbol, t);
            }
        }
        Geometry::Polygon(p) => paint_polygons(content, std::slice::from_ref(p)),
        Geometry::MultiPolygon(mp) => paint_polygons(content, &mp.0),
        Geometry::Rect(r) => paint_polygons(content, &[r.to_polygon()]),
        Geometry::LineString(ls) => {
            ring_path(content, ls, t, false);
            content.stroke();
        }
        Geometry::MultiLineString(mls) => {
            for ls in &mls.0 {
                ring_path(content, ls, t, false);
            }
            content.stroke();
        }
        Geometry::GeometryCollection(gc) => {
            for g in &gc.0 {
                draw_geometry(content, g, symbol, t);
            }
        }
        Geometry::Line(_) | Geometry::Triangle(_) => {}
    }
}

fn draw_legend_swatch(content: &mut Content, x: f32, y: f32, symbol: Symbol) {
    set_symbol_colors(content, symbol);
    match symbol {
        Symbol::Fill { .. } => {
            content.rect(x, y, 18.0, 10.0);
            content.fill_nonzero_and_stroke();
        }
        Symbol::Outline { .. } => {
            content.rect(x, y, 18.0, 10.0);
            content.stroke();
        }
        Symbol::Dot { radius, .. } => {
            content.rect(x + 9.0 - radius, y + 5.0 - radius, radius * 2.0, radius * 2.0);
            content.fill_nonzero();
        }
        Symbol::Cross { .. } => {
            content.move_to(x + 5.0, y);
            content.line_to(x + 13.0, y + 10.0);
            content.move_to(x + 5.0, y + 10.0);
            content.line_to(x + 13.0, y);
            content.stroke();
        }
    }
}

/// Rounds a length down to 1, 2 or 5 times a power of ten.
fn nice_length(meters: f64) -> f64 {
    if meters <= 0.0 || !meters.is_finite() {
        return 0.0;
    }
    let magnitude = 10f64.powf(meters.log10().floor());
    let leading = meters / magnitude;
    let step = if leading >= 5.0 {
        5.0
    } else if leading >= 2.0 {
        2.0
    } else {
        1.0
    };
    step * magnitude
}

fn format_length(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{} km", meters / 1000.0)
    } else {
        format!("{} m", meters)
    }
}

fn draw_scale_bar(content: &mut Content, t: &FrameTransform, x: f32, y: f32, max_width: f32) {
    let length = nice_length(max_width as f64 * t.meters_per_point());
    if length <= 0.0 {
        return;
    }
    let width = (length / t.meters_per_point()) as f32;

    content.set_fill_rgb(0.0, 0.0, 0.0);
    content.rect(x, y, width / 2.0, 4.0);
    content.fill_nonzero();
    content.set_stroke_rgb(0.0, 0.0, 0.0);
    content.set_line_width(0.5);
    content.rect(x, y, width, 4.0);
    content.stroke();
    write_text(content, REGULAR, 8.0, x, y + 7.0, "0");
    write_text(content, REGULAR, 8.0, x + width - 12.0, y + 7.0, &format_length(length));
}

fn draw_north_arrow(content: &mut Content, x: f32, y: f32) {
    content.set_fill_rgb(0.0, 0.0, 0.0);
    content.move_to(x, y + 24.0);
    content.line_to(x - 7.0, y);
    content.line_to(x, y + 6.0);
    content.line_to(x + 7.0, y);
    content.close_path();
    content.fill_nonzero();
    write_text(content, BOLD, 11.0, x - 4.0, y + 28.0, "N");
}

fn layout_extent(layers: &[MapLayer]) -> Option<Rect<f64>> {
    layers
        .iter()
        .filter_map(|l| l.layer.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

pub fn render_map(layout: &MapLayout) -> Result<Vec<u8>> {
    let (page_w, page_h) = layout.page.dimensions();
    let frame = (
        MARGIN,
        MARGIN + FOOTER,
        page_w - 2.0 * MARGIN - LEGEND_WIDTH,
        page_h - 2.0 * MARGIN - TITLE_BLOCK - FOOTER,
    );
    if frame.2 <= 0.0 || frame.3 <= 0.0 {
        return Err(WnvError::RenderError {
            message: "page too small for the map frame".to_string(),
        });
    }

    let mut content = Content::new();

    // Title block
    let mut title_y = page_h - MARGIN - 22.0;
    write_text(&mut content, BOLD, 20.0, MARGIN, title_y, &layout.title);
    if let Some(subtitle) = layout.subtitle.as_deref().filter(|s| !s.trim().is_empty()) {
        title_y -= 20.0;
        write_text(&mut content, REGULAR, 13.0, MARGIN, title_y, subtitle);
    }

    // Map frame
    let (fx, fy, fw, fh) = frame;
    content.set_stroke_rgb(0.2, 0.2, 0.2);
    content.set_line_width(1.0);
    content.rect(fx, fy, fw, fh);
    content.stroke();

    let transform = layout_extent(&layout.layers).map(|extent| FrameTransform::fit(extent, frame));
    match &transform {
        Some(t) => {
            content.save_state();
            content.rect(fx, fy, fw, fh);
            content.clip_nonzero();
            content.end_path();
            for map_layer in &layout.layers {
                set_symbol_colors(&mut content, map_layer.symbol);
                for feature in &map_layer.layer.features {
                    draw_geometry(&mut content, &feature.geometry, map_layer.symbol, t);
                }
            }
            content.restore_state();

            draw_scale_bar(&mut content, t, fx + 10.0, fy + 10.0, fw * 0.25);
            draw_north_arrow(&mut content, fx + fw - 20.0, fy + fh - 44.0);
        }
        None => {
            tracing::warn!("⚠️ Map has no features to draw");
            write_text(&mut content, REGULAR, 12.0, fx + 12.0, fy + fh / 2.0, "No features to display");
        }
    }

    // Legend
    let legend_x = fx + fw + 14.0;
    let mut legend_y = fy + fh - 14.0;
    write_text(&mut content, BOLD, 12.0, legend_x, legend_y, "Legend");
    for map_layer in &layout.layers {
        legend_y -= 20.0;
        draw_legend_swatch(&mut content, legend_x, legend_y - 2.0, map_layer.symbol);
        let label = format!("{} ({})", map_layer.label, map_layer.layer.len());
        write_text(&mut content, REGULAR, 9.0, legend_x + 24.0, legend_y, &label);
    }

    legend_y -= 30.0;
    for note in &layout.notes {
        write_text(&mut content, REGULAR, 8.5, legend_x, legend_y, note);
        legend_y -= 13.0;
    }

    // Date element
    write_text(&mut content, BOLD, 9.0, MARGIN, MARGIN + 14.0, "Date:");
    write_text(&mut content, REGULAR, 9.0, MARGIN, MARGIN, &layout.date_text);

    let catalog_id = Ref::new(1);
    let page_tree_id = Ref::new(2);
    let page_id = Ref::new(3);
    let regular_id = Ref::new(4);
    let bold_id = Ref::new(5);
    let content_id = Ref::new(6);
    let info_id = Ref::new(7);

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.pages(page_tree_id).kids([page_id]).count(1);

    let mut page = pdf.page(page_id);
    page.media_box(PdfRect::new(0.0, 0.0, page_w, page_h));
    page.parent(page_tree_id);
    page.contents(content_id);
    page.resources()
        .fonts()
        .pair(REGULAR, regular_id)
        .pair(BOLD, bold_id);
    page.finish();

    pdf.type1_font(regular_id).base_font(Name(b"Helvetica"));
    pdf.type1_font(bold_id).base_font(Name(b"Helvetica-Bold"));
    pdf.document_info(info_id)
        .title(TextStr(&layout.title))
        .creator(TextStr("wnv-outbreak"));

    pdf.stream(content_id, &content.finish());
    Ok(pdf.finish())
}

/// Renders the layout and writes it through `storage`; returns the file name written.
pub async fn export_map<S: Storage>(layout: &MapLayout, storage: &S, filename: &str) -> Result<String> {
    let bytes = render_map(layout)?;
    storage.write_file(filename, &bytes).await?;
    tracing::info!("🗺️ Map exported: {} ({} bytes)", filename, bytes.len());
    Ok(filename.to_string())
}
