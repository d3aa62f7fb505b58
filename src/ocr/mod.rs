mod anchor;
mod engine;

use image::DynamicImage;

use crate::error::Result;

pub use anchor::{AnchorMatch, PageWords, find_text_positions, match_words};
pub use engine::{TesseractEngine, list_tesseract_languages};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// One word token as reported by the OCR engine, in pixel space.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BBoxPx,
}

impl OcrWord {
    pub fn new(text: impl Into<String>, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            text: text.into(),
            bbox: BBoxPx { x, y, w, h },
        }
    }
}

/// Word-level text detection. Implementations must return tokens in a stable
/// order (left-to-right, top-to-bottom for tesseract).
pub trait OcrEngine {
    fn words(&self, image: &DynamicImage) -> Result<Vec<OcrWord>>;
}

impl<E: OcrEngine + ?Sized> OcrEngine for &E {
    fn words(&self, image: &DynamicImage) -> Result<Vec<OcrWord>> {
        (**self).words(image)
    }
}

impl<E: OcrEngine + ?Sized> OcrEngine for Box<E> {
    fn words(&self, image: &DynamicImage) -> Result<Vec<OcrWord>> {
        (**self).words(image)
    }
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub languages: String,
    pub psm: Option<u32>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            languages: "eng".to_string(),
            psm: None,
        }
    }
}
