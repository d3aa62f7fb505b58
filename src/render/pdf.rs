use image::DynamicImage;
use lopdf::{Document, ObjectId};
use std::path::Path;

use super::merge::merge_overlay;
use super::overlay::{
    LETTER_HEIGHT_PT, LETTER_WIDTH_PT, OverlayImage, OverlayText, PdfColor, build_overlay,
};
use super::{PlacedAnnotation, RenderReport, expand_text, write_atomically};
use crate::config::{AnnotationConfig, Signature};
use crate::error::{AnnotateError, Result};
use crate::notice::{Notice, Reporter};
use crate::ocr::OcrEngine;
use crate::placement::{CoordinateResolver, PageContext};
use crate::raster::{RasterizedPages, Rasterizer};

/// Size and optional rendering of one page, as seen by the overlay.
struct PageFrame {
    width: f64,
    height: f64,
    raster: Option<DynamicImage>,
}

/// Where overlay geometry comes from for each page.
trait PagePlacement {
    fn frame(&self, index: usize) -> Result<PageFrame>;
}

/// Manual coordinates only: every overlay is a US Letter page.
struct DirectPlacement;

impl PagePlacement for DirectPlacement {
    fn frame(&self, _index: usize) -> Result<PageFrame> {
        Ok(PageFrame {
            width: LETTER_WIDTH_PT,
            height: LETTER_HEIGHT_PT,
            raster: None,
        })
    }
}

/// Anchors present: each page is rasterized at 72 dpi so one pixel is one
/// point, and the overlay takes the raster's size.
struct OcrPlacement {
    pages: RasterizedPages,
}

impl PagePlacement for OcrPlacement {
    fn frame(&self, index: usize) -> Result<PageFrame> {
        if index >= self.pages.len() {
            return Err(AnnotateError::Pdf(format!(
                "page {} was not rasterized ({} pages rendered)",
                index + 1,
                self.pages.len()
            )));
        }
        let raster = self.pages.load(index)?;
        Ok(PageFrame {
            width: raster.width() as f64,
            height: raster.height() as f64,
            raster: Some(raster),
        })
    }
}

/// Stamps annotations onto the pages of an existing PDF without touching
/// its original content.
pub struct PdfOverlayRenderer<'a> {
    ocr: &'a dyn OcrEngine,
    rasterizer: &'a dyn Rasterizer,
    reporter: &'a dyn Reporter,
}

impl<'a> PdfOverlayRenderer<'a> {
    pub fn new(
        ocr: &'a dyn OcrEngine,
        rasterizer: &'a dyn Rasterizer,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            ocr,
            rasterizer,
            reporter,
        }
    }

    pub fn render(
        &self,
        input: &Path,
        output: &Path,
        config: &AnnotationConfig,
    ) -> Result<RenderReport> {
        let mut doc = Document::load(input).map_err(|err| {
            AnnotateError::pdf(format!("failed to read {}: {}", input.display(), err))
        })?;
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

        let placement: Box<dyn PagePlacement> = if config.needs_ocr() {
            tracing::info!("rasterizing {} for anchor lookup", input.display());
            Box::new(OcrPlacement {
                pages: self.rasterizer.rasterize(input)?,
            })
        } else {
            Box::new(DirectPlacement)
        };

        for annotation in &config.annotations {
            if let Some(font) = &annotation.font {
                self.reporter.report(Notice::FontIgnored { path: font.clone() });
            }
        }

        let signature = config
            .signature
            .as_ref()
            .and_then(|signature| self.load_signature(signature));

        let resolver = CoordinateResolver::new(self.ocr, self.reporter);
        let mut report = RenderReport {
            pages: page_ids.len(),
            ..RenderReport::default()
        };

        for (index, page_id) in page_ids.iter().enumerate() {
            let number = index + 1;
            let stamp = if index == 0 { signature.as_ref() } else { None };
            if config.annotations.is_empty() && stamp.is_none() {
                continue;
            }

            let frame = placement.frame(index)?;
            let mut page = PageContext::pdf_page(number, frame.height, frame.raster.as_ref());
            let mut texts = Vec::with_capacity(config.annotations.len());
            for annotation in &config.annotations {
                let resolved = resolver.resolve(annotation, &mut page)?;
                let text = expand_text(&annotation.text);
                report.placed.push(PlacedAnnotation {
                    page: number,
                    text: text.clone(),
                    x: resolved.point.x,
                    y: resolved.point.y,
                    size: annotation.size,
                    color: annotation.color.clone(),
                    from_anchor: resolved.from_anchor,
                });
                texts.push(OverlayText {
                    text,
                    x: resolved.point.x,
                    y: resolved.point.y,
                    size: annotation.size as f32,
                    color: PdfColor::from_name(&annotation.color),
                });
            }

            let overlay = build_overlay(frame.width, frame.height, &texts, stamp)?;
            merge_overlay(&mut doc, *page_id, &overlay)?;
            if stamp.is_some() {
                report.signature_drawn = true;
            }
            tracing::debug!("page {}: merged {} annotation(s)", number, texts.len());
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(AnnotateError::pdf)?;
        write_atomically(output, &bytes)?;
        tracing::info!("annotated PDF saved to {}", output.display());
        Ok(report)
    }

    fn load_signature(&self, signature: &Signature) -> Option<OverlayImage> {
        match printpdf::image_crate::open(&signature.path) {
            Ok(image) => Some(OverlayImage {
                image,
                x: signature.x as f64,
                y: signature.y as f64,
                width: signature.width as f64,
                height: signature.height as f64,
            }),
            Err(err) => {
                self.reporter.report(Notice::SignatureSkipped {
                    path: signature.path.clone(),
                    reason: err.to_string(),
                });
                None
            }
        }
    }
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize> {
    let doc = Document::load(path).map_err(AnnotateError::pdf)?;
    Ok(doc.get_pages().len())
}
