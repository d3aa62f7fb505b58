use image::DynamicImage;

use super::{OcrEngine, OcrWord};
use crate::error::Result;

/// Bounding box of one token that contained the anchor text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorMatch {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Case-insensitive substring match against whitespace-trimmed tokens,
/// preserving the engine's emission order.
pub fn match_words(words: &[OcrWord], target: &str) -> Vec<AnchorMatch> {
    let needle = target.to_lowercase();
    words
        .iter()
        .filter(|word| word.text.trim().to_lowercase().contains(&needle))
        .map(|word| AnchorMatch {
            x: word.bbox.x,
            y: word.bbox.y,
            width: word.bbox.w,
            height: word.bbox.h,
        })
        .collect()
}

pub fn find_text_positions(
    engine: &dyn OcrEngine,
    image: &DynamicImage,
    target: &str,
) -> Result<Vec<AnchorMatch>> {
    let words = engine.words(image)?;
    Ok(match_words(&words, target))
}

/// Runs OCR on a page at most once, however many anchors are looked up.
pub struct PageWords<'a> {
    image: &'a DynamicImage,
    words: Option<Vec<OcrWord>>,
}

impl<'a> PageWords<'a> {
    pub fn new(image: &'a DynamicImage) -> Self {
        Self { image, words: None }
    }

    pub fn image(&self) -> &DynamicImage {
        self.image
    }

    pub fn find(&mut self, engine: &dyn OcrEngine, target: &str) -> Result<Vec<AnchorMatch>> {
        if self.words.is_none() {
            let words = engine.words(self.image)?;
            tracing::debug!("ocr produced {} word(s)", words.len());
            self.words = Some(words);
        }
        Ok(match_words(self.words.as_deref().unwrap_or_default(), target))
    }
}
