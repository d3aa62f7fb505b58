use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resvg::render;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use super::font::RasterFont;
use crate::error::{AnnotateError, Result};

/// Extra leading between lines of a multi-line annotation, in pixels.
const LINE_GAP: f32 = 4.0;

pub(crate) struct TextLayer {
    pub(crate) text: String,
    /// Top-left corner of the text block, pixel space.
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) color: String,
    pub(crate) font: RasterFont,
}

pub(crate) struct ImageLayer {
    pub(crate) png: Vec<u8>,
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// Builds an SVG that paints `background` edge to edge, then every text
/// layer in order, then the optional image layer.
pub(crate) fn compose_svg(
    background_png: &[u8],
    width: u32,
    height: u32,
    texts: &[TextLayer],
    stamp: Option<&ImageLayer>,
) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    push_png(&mut svg, background_png, 0.0, 0.0, width, height);

    for layer in texts {
        svg.push_str(&text_element(layer));
    }

    if let Some(stamp) = stamp {
        push_png(&mut svg, &stamp.png, stamp.x, stamp.y, stamp.width, stamp.height);
    }

    svg.push_str("</svg>");
    svg
}

fn push_png(svg: &mut String, png: &[u8], x: f64, y: f64, width: u32, height: u32) {
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(png));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="{x}" y="{y}" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        x = x,
        y = y,
        w = width,
        h = height
    ));
}

fn text_element(layer: &TextLayer) -> String {
    let font = &layer.font;
    let baseline = layer.y as f32 + font.ascent;
    let mut out = format!(
        r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="{color}" xml:space="preserve">"#,
        x = layer.x,
        y = baseline,
        size = font.size,
        family = escape_xml(&font.family),
        color = escape_xml(&layer.color)
    );
    for (idx, line) in layer.text.split('\n').enumerate() {
        let escaped = escape_xml(line);
        if idx == 0 {
            out.push_str(&escaped);
        } else {
            out.push_str(&format!(
                r#"<tspan x="{x}" dy="{dy}">{text}</tspan>"#,
                x = layer.x,
                dy = font.size + LINE_GAP,
                text = escaped
            ));
        }
    }
    out.push_str("</text>");
    out
}

/// Renders `svg` to an RGBA buffer with system fonts plus any custom faces.
pub(crate) fn rasterize_svg(svg: &str, fonts: &[Arc<Vec<u8>>]) -> Result<image::RgbaImage> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    for data in fonts {
        db.load_font_data(data.as_ref().clone());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options)
        .map_err(|err| AnnotateError::image(format!("failed to parse SVG: {}", err)))?;
    let size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(size.width(), size.height())
        .ok_or_else(|| AnnotateError::image("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    image::RgbaImage::from_raw(size.width(), size.height(), pixmap.take())
        .ok_or_else(|| AnnotateError::image("failed to build image buffer from SVG"))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::font::test_fallback;

    fn layer(text: &str, color: &str) -> TextLayer {
        TextLayer {
            text: text.to_string(),
            x: 50.0,
            y: 50.0,
            color: color.to_string(),
            font: test_fallback(),
        }
    }

    #[test]
    fn text_is_positioned_by_its_top_edge() {
        let element = text_element(&layer("SAMPLE", "red"));
        assert!(element.starts_with(r#"<text x="50" y="58.8" font-size="11""#), "{element}");
        assert!(element.contains(r#"fill="red""#));
        assert!(element.ends_with(">SAMPLE</text>"));
    }

    #[test]
    fn markup_in_text_and_color_is_escaped() {
        let element = text_element(&layer("A&B <x>", "\"><script"));
        assert!(element.contains("A&amp;B &lt;x&gt;"));
        assert!(element.contains(r#"fill="&quot;&gt;&lt;script""#));
    }

    #[test]
    fn extra_lines_become_tspans() {
        let element = text_element(&layer("one\ntwo", "blue"));
        assert!(element.contains(r#"one<tspan x="50" dy="15">two</tspan>"#), "{element}");
    }

    #[test]
    fn layers_are_painted_in_order_after_background() {
        let svg = compose_svg(
            b"png",
            100,
            80,
            &[layer("first", "red"), layer("second", "blue")],
            None,
        );
        let background = svg.find("<image").expect("background");
        let first = svg.find(">first<").expect("first");
        let second = svg.find(">second<").expect("second");
        assert!(background < first && first < second);
        assert!(svg.contains(r#"width="100" height="80" viewBox="0 0 100 80""#));
    }
}
