use printpdf::image_crate::{self, DynamicImage, RgbImage};
use printpdf::{BuiltinFont, Color, Image, ImageTransform, Mm, PdfDocument, Rgb};

use crate::error::{AnnotateError, Result};

pub const LETTER_WIDTH_PT: f64 = 612.0;
pub const LETTER_HEIGHT_PT: f64 = 792.0;

/// Fill colors available to PDF overlays. Any name other than red or blue
/// maps to black.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfColor {
    Red,
    Blue,
    Black,
}

impl PdfColor {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "red" => PdfColor::Red,
            "blue" => PdfColor::Blue,
            _ => PdfColor::Black,
        }
    }

    pub fn rgb(self) -> (f32, f32, f32) {
        match self {
            PdfColor::Red => (1.0, 0.0, 0.0),
            PdfColor::Blue => (0.0, 0.0, 1.0),
            PdfColor::Black => (0.0, 0.0, 0.0),
        }
    }
}

pub(crate) struct OverlayText {
    pub(crate) text: String,
    /// Baseline origin in PDF space.
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) size: f32,
    pub(crate) color: PdfColor,
}

pub(crate) struct OverlayImage {
    pub(crate) image: DynamicImage,
    /// Lower-left corner in PDF space.
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) width: f64,
    pub(crate) height: f64,
}

/// Renders a single-page PDF of `width` x `height` points holding only the
/// given texts (Helvetica) and optional image.
pub(crate) fn build_overlay(
    width: f64,
    height: f64,
    texts: &[OverlayText],
    stamp: Option<&OverlayImage>,
) -> Result<Vec<u8>> {
    let (doc, page, layer) =
        PdfDocument::new("overlay", pt_to_mm(width), pt_to_mm(height), "Overlay");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(AnnotateError::pdf)?;
    let current_layer = doc.get_page(page).get_layer(layer);

    for text in texts {
        let (r, g, b) = text.color.rgb();
        current_layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
        current_layer.use_text(
            text.text.as_str(),
            text.size,
            pt_to_mm(text.x),
            pt_to_mm(text.y),
            &font,
        );
    }

    if let Some(stamp) = stamp {
        let pixel_width = stamp.image.width().max(1) as f64;
        let pixel_height = stamp.image.height().max(1) as f64;
        let pdf_image = Image::from_dynamic_image(&flatten_onto_white(&stamp.image));
        // At 72 dpi one image pixel spans one point before scaling.
        let transform = ImageTransform {
            translate_x: Some(pt_to_mm(stamp.x)),
            translate_y: Some(pt_to_mm(stamp.y)),
            rotate: None,
            scale_x: Some((stamp.width / pixel_width) as f32),
            scale_y: Some((stamp.height / pixel_height) as f32),
            dpi: Some(72.0),
        };
        pdf_image.add_to_layer(current_layer.clone(), transform);
    }

    let mut buffer = Vec::new();
    {
        let mut writer = std::io::BufWriter::new(&mut buffer);
        doc.save(&mut writer).map_err(AnnotateError::pdf)?;
    }
    Ok(buffer)
}

/// PDF image XObjects here are plain DeviceRGB, so any alpha channel is
/// composited onto white first.
fn flatten_onto_white(image: &DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return DynamicImage::ImageRgb8(image.to_rgb8());
    }
    let rgba = image.to_rgba8();
    let mut flat = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = px[3] as u32;
        let blend = |channel: u8| ((channel as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        flat.put_pixel(x, y, image_crate::Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    DynamicImage::ImageRgb8(flat)
}

fn pt_to_mm(pt: f64) -> Mm {
    Mm((pt * 25.4 / 72.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::shown_strings;

    #[test]
    fn color_mapping_is_case_insensitive_and_total() {
        for name in ["red", "RED", "Red"] {
            assert_eq!(PdfColor::from_name(name).rgb(), (1.0, 0.0, 0.0));
        }
        assert_eq!(PdfColor::from_name("Blue").rgb(), (0.0, 0.0, 1.0));
        for name in ["green", "#ff0000", ""] {
            assert_eq!(PdfColor::from_name(name), PdfColor::Black);
        }
    }

    #[test]
    fn overlay_is_a_single_page_of_the_requested_size() {
        let bytes = build_overlay(
            LETTER_WIDTH_PT,
            LETTER_HEIGHT_PT,
            &[OverlayText {
                text: "PAID".to_string(),
                x: 100.0,
                y: 200.0,
                size: 20.0,
                color: PdfColor::Blue,
            }],
            None,
        )
        .expect("overlay");
        let doc = lopdf::Document::load_mem(&bytes).expect("parse overlay");
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().expect("page");
        let content = doc.get_page_content(page_id).expect("content");
        assert_eq!(shown_strings(&content), vec!["PAID".to_string()]);
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        use printpdf::image_crate::{Rgba, RgbaImage};
        let mut rgba = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(rgba)).to_rgb8();
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [0, 0, 255]);
    }
}
