mod parse;
mod tesseract;

use anyhow::Context;
use image::DynamicImage;
use std::cell::RefCell;
use std::io::Write;

use super::{OcrEngine, OcrSettings, OcrWord};
use crate::error::{AnnotateError, Result};

pub use tesseract::list_tesseract_languages;

/// Shells out to the `tesseract` executable, one TSV run per image.
pub struct TesseractEngine {
    settings: OcrSettings,
    languages: RefCell<Option<String>>,
}

impl TesseractEngine {
    pub fn new(settings: OcrSettings) -> Self {
        Self {
            settings,
            languages: RefCell::new(None),
        }
    }

    fn languages(&self) -> Result<String> {
        if let Some(value) = self.languages.borrow().as_ref() {
            return Ok(value.clone());
        }
        let resolved = tesseract::normalize_ocr_languages(&self.settings.languages)
            .map_err(AnnotateError::ocr)?;
        *self.languages.borrow_mut() = Some(resolved.clone());
        Ok(resolved)
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new(OcrSettings::default())
    }
}

impl OcrEngine for TesseractEngine {
    fn words(&self, image: &DynamicImage) -> Result<Vec<OcrWord>> {
        if !crate::raster::command_exists("tesseract") {
            return Err(AnnotateError::MissingDependency(
                "anchor placement requires tesseract (install tesseract-ocr)".to_string(),
            ));
        }
        let languages = self.languages()?;
        let tsv = run_on_image(image, &languages, self.settings.psm).map_err(AnnotateError::ocr)?;
        Ok(parse::parse_tsv_words(&tsv))
    }
}

fn run_on_image(image: &DynamicImage, languages: &str, psm: Option<u32>) -> anyhow::Result<String> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .with_context(|| "failed to create temp file for OCR")?;
    image
        .write_to(&mut tmp, image::ImageFormat::Png)
        .with_context(|| "failed to write temp image for OCR")?;
    tmp.flush().ok();
    tesseract::run_tesseract_tsv(tmp.path(), languages, psm)
}
