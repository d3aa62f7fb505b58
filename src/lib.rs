use std::path::Path;

pub mod config;
pub mod error;
pub mod logging;
pub mod notice;
pub mod ocr;
pub mod placement;
pub mod raster;
pub mod render;
mod test_util;

pub use config::{Annotation, AnnotationConfig, Placement, Signature, load_config};
pub use error::{AnnotateError, Result};
pub use notice::{Notice, RecordingReporter, Reporter, TracingReporter};
pub use ocr::{OcrEngine, OcrSettings, OcrWord, TesseractEngine};
pub use placement::{CoordinateResolver, PageContext, Point, TargetSpace};
pub use raster::{PopplerRasterizer, RasterizedPages, Rasterizer};
pub use render::{ImageRenderer, PdfOverlayRenderer, PlacedAnnotation, RenderReport};

/// Input kinds the annotator knows how to draw on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Image,
    Pdf,
}

impl InputKind {
    /// Classifies by lowercase extension. Anything else is rejected with the
    /// offending extension (including the dot) in the error.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" => Ok(InputKind::Image),
            "pdf" => Ok(InputKind::Pdf),
            "" => Err(AnnotateError::UnsupportedFormat(
                path.display().to_string(),
            )),
            other => Err(AnnotateError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// Entry point tying config loading to the right renderer.
pub struct Annotator {
    ocr: Box<dyn OcrEngine>,
    rasterizer: Box<dyn Rasterizer>,
    reporter: Box<dyn Reporter>,
}

impl Annotator {
    pub fn new(
        ocr: Box<dyn OcrEngine>,
        rasterizer: Box<dyn Rasterizer>,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        Self {
            ocr,
            rasterizer,
            reporter,
        }
    }

    /// Tesseract for OCR, mutool/pdftoppm for rasterizing, notices to
    /// `tracing`.
    pub fn system(settings: OcrSettings) -> Self {
        Self::new(
            Box::new(TesseractEngine::new(settings)),
            Box::new(PopplerRasterizer),
            Box::new(TracingReporter),
        )
    }

    /// Loads the config, then annotates `input` into `output`. The config is
    /// validated before the input is inspected; nothing is written unless the
    /// whole run succeeds.
    pub fn annotate(
        &self,
        input: &Path,
        output: &Path,
        config_path: Option<&Path>,
    ) -> Result<RenderReport> {
        let config = load_config(config_path, self.reporter.as_ref())?;
        self.annotate_with(input, output, &config)
    }

    pub fn annotate_with(
        &self,
        input: &Path,
        output: &Path,
        config: &AnnotationConfig,
    ) -> Result<RenderReport> {
        if !input.exists() {
            return Err(AnnotateError::InputNotFound(input.to_path_buf()));
        }
        match InputKind::from_path(input)? {
            InputKind::Image => {
                ImageRenderer::new(self.ocr.as_ref(), self.reporter.as_ref())
                    .render(input, output, config)
            }
            InputKind::Pdf => PdfOverlayRenderer::new(
                self.ocr.as_ref(),
                self.rasterizer.as_ref(),
                self.reporter.as_ref(),
            )
            .render(input, output, config),
        }
    }
}
