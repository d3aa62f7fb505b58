use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::font::FontResolver;
use super::svg::{ImageLayer, TextLayer, compose_svg, rasterize_svg};
use super::{PlacedAnnotation, RenderReport, expand_text, write_atomically};
use crate::config::{AnnotationConfig, Signature};
use crate::error::{AnnotateError, Result};
use crate::notice::{Notice, Reporter};
use crate::ocr::OcrEngine;
use crate::placement::{CoordinateResolver, PageContext};

/// Draws annotations straight onto a raster image.
pub struct ImageRenderer<'a> {
    ocr: &'a dyn OcrEngine,
    reporter: &'a dyn Reporter,
}

impl<'a> ImageRenderer<'a> {
    pub fn new(ocr: &'a dyn OcrEngine, reporter: &'a dyn Reporter) -> Self {
        Self { ocr, reporter }
    }

    pub fn render(
        &self,
        input: &Path,
        output: &Path,
        config: &AnnotationConfig,
    ) -> Result<RenderReport> {
        let format = output_format(output)?;
        let source = image::open(input).map_err(|err| {
            AnnotateError::image(format!("failed to decode {}: {}", input.display(), err))
        })?;
        let canvas = DynamicImage::ImageRgb8(source.to_rgb8());
        let (width, height) = (canvas.width(), canvas.height());

        let resolver = CoordinateResolver::new(self.ocr, self.reporter);
        let mut page = PageContext::image(&canvas);
        let mut report = RenderReport {
            pages: 1,
            ..RenderReport::default()
        };
        let fonts = FontResolver::new();
        let mut layers = Vec::with_capacity(config.annotations.len());
        for annotation in &config.annotations {
            let font = fonts.resolve(annotation.size, annotation.font.as_deref(), self.reporter)?;
            let resolved = resolver.resolve(annotation, &mut page)?;
            let text = expand_text(&annotation.text);
            report.placed.push(PlacedAnnotation {
                page: 1,
                text: text.clone(),
                x: resolved.point.x,
                y: resolved.point.y,
                size: annotation.size,
                color: annotation.color.clone(),
                from_anchor: resolved.from_anchor,
            });
            layers.push(TextLayer {
                text,
                x: resolved.point.x,
                y: resolved.point.y,
                color: annotation.color.clone(),
                font,
            });
        }

        let stamp = config
            .signature
            .as_ref()
            .and_then(|signature| self.load_signature(signature));
        report.signature_drawn = stamp.is_some();

        let annotated = if layers.is_empty() && stamp.is_none() {
            canvas
        } else {
            let background = encode(&canvas, ImageFormat::Png)?;
            let svg = compose_svg(&background, width, height, &layers, stamp.as_ref());
            let fonts: Vec<Arc<Vec<u8>>> = layers
                .iter()
                .filter_map(|layer| layer.font.data.clone())
                .collect();
            let rendered = rasterize_svg(&svg, &fonts)?;
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rendered).to_rgb8())
        };

        let bytes = encode(&annotated, format)?;
        write_atomically(output, &bytes)?;
        tracing::info!("annotated image saved to {}", output.display());
        Ok(report)
    }

    fn load_signature(&self, signature: &Signature) -> Option<ImageLayer> {
        let loaded = image::open(&signature.path)
            .map_err(|err| err.to_string())
            .and_then(|img| encode(&img, ImageFormat::Png).map_err(|err| err.to_string()));
        match loaded {
            Ok(png) => Some(ImageLayer {
                png,
                x: signature.x as f64,
                y: signature.y as f64,
                width: signature.width,
                height: signature.height,
            }),
            Err(reason) => {
                self.reporter.report(Notice::SignatureSkipped {
                    path: signature.path.clone(),
                    reason,
                });
                None
            }
        }
    }
}

fn output_format(output: &Path) -> Result<ImageFormat> {
    ImageFormat::from_path(output).map_err(|_| {
        AnnotateError::UnsupportedFormat(
            output
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!(".{}", ext.to_lowercase()))
                .unwrap_or_else(|| output.display().to_string()),
        )
    })
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|err| AnnotateError::image(format!("failed to encode image: {}", err)))?;
    Ok(bytes)
}
