//! Turns an [`Annotation`]'s placement into concrete coordinates on one
//! page or image.
//!
//! OCR always reports pixel space (origin top-left). Literal coordinates from
//! the config are taken to be in the target's own space already and are
//! never transformed; only anchor-derived points are flipped for PDF pages.

use image::DynamicImage;

use crate::config::{Annotation, Placement};
use crate::error::{AnnotateError, Result};
use crate::notice::{Notice, Reporter};
use crate::ocr::{OcrEngine, PageWords};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn from_ints(x: i64, y: i64) -> Self {
        Self::new(x as f64, y as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetSpace {
    /// Raster image, origin top-left.
    Pixel,
    /// PDF page of the given height, origin bottom-left.
    Pdf { page_height: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub point: Point,
    /// True when the point came from an OCR match rather than the config.
    pub from_anchor: bool,
}

/// Everything the resolver needs to know about the page being drawn on.
pub struct PageContext<'img> {
    words: Option<PageWords<'img>>,
    space: TargetSpace,
    page: Option<usize>,
}

impl<'img> PageContext<'img> {
    pub fn image(raster: &'img DynamicImage) -> Self {
        Self {
            words: Some(PageWords::new(raster)),
            space: TargetSpace::Pixel,
            page: None,
        }
    }

    /// `page` is 1-based. Without a raster, anchored annotations cannot be
    /// resolved on this page.
    pub fn pdf_page(page: usize, page_height: f64, raster: Option<&'img DynamicImage>) -> Self {
        Self {
            words: raster.map(PageWords::new),
            space: TargetSpace::Pdf { page_height },
            page: Some(page),
        }
    }

    pub fn space(&self) -> TargetSpace {
        self.space
    }
}

pub struct CoordinateResolver<'a> {
    ocr: &'a dyn OcrEngine,
    reporter: &'a dyn Reporter,
}

impl<'a> CoordinateResolver<'a> {
    pub fn new(ocr: &'a dyn OcrEngine, reporter: &'a dyn Reporter) -> Self {
        Self { ocr, reporter }
    }

    pub fn resolve(&self, annotation: &Annotation, page: &mut PageContext<'_>) -> Result<Resolved> {
        match &annotation.placement {
            Placement::Manual { x, y } => Ok(Resolved {
                point: Point::from_ints(*x, *y),
                from_anchor: false,
            }),
            Placement::Anchored {
                pattern,
                offset_x,
                offset_y,
                fallback,
            } => {
                let words = page.words.as_mut().ok_or_else(|| {
                    AnnotateError::MissingDependency(format!(
                        "no rendered page available to locate '{}'",
                        pattern
                    ))
                })?;
                let matches = words.find(self.ocr, pattern)?;
                let Some(first) = matches.first() else {
                    self.reporter.report(Notice::AnchorMissed {
                        pattern: pattern.clone(),
                        page: page.page,
                        fallback: *fallback,
                    });
                    return Ok(Resolved {
                        point: Point::from_ints(fallback.0, fallback.1),
                        from_anchor: false,
                    });
                };

                let x = first.x as f64 + *offset_x as f64;
                let y = match page.space {
                    TargetSpace::Pixel => first.y as f64 + *offset_y as f64,
                    TargetSpace::Pdf { page_height } => {
                        page_height - first.y as f64 - *offset_y as f64
                    }
                };
                tracing::debug!("anchor '{}' resolved to ({}, {})", pattern, x, y);
                Ok(Resolved {
                    point: Point::new(x, y),
                    from_anchor: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnotationConfig;
    use crate::notice::RecordingReporter;
    use crate::ocr::OcrWord;
    use crate::test_util::FixedOcr;

    fn anchored(offset_x: i64, offset_y: i64) -> Annotation {
        Annotation {
            text: "PAID".to_string(),
            size: 20,
            color: "blue".to_string(),
            font: None,
            placement: Placement::Anchored {
                pattern: "Total".to_string(),
                offset_x,
                offset_y,
                fallback: (100, 200),
            },
        }
    }

    fn total_engine() -> FixedOcr {
        FixedOcr::new(vec![
            OcrWord::new("Invoice", 20, 20, 80, 20),
            OcrWord::new("Total:", 300, 100, 50, 20),
        ])
    }

    #[test]
    fn manual_coordinates_pass_through_in_both_spaces() {
        let config = AnnotationConfig::builtin();
        let engine = FixedOcr::default();
        let reporter = RecordingReporter::new();
        let resolver = CoordinateResolver::new(&engine, &reporter);

        let raster = DynamicImage::new_rgb8(10, 10);
        let mut image_page = PageContext::image(&raster);
        let mut pdf_page = PageContext::pdf_page(1, 792.0, None);
        for page in [&mut image_page, &mut pdf_page] {
            let resolved = resolver
                .resolve(&config.annotations[0], page)
                .expect("resolve");
            assert_eq!(resolved.point, Point::new(50.0, 50.0));
            assert!(!resolved.from_anchor);
        }
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn image_anchor_adds_offsets_without_flip() {
        let engine = total_engine();
        let reporter = RecordingReporter::new();
        let resolver = CoordinateResolver::new(&engine, &reporter);
        let raster = DynamicImage::new_rgb8(612, 792);
        let mut page = PageContext::image(&raster);

        let resolved = resolver.resolve(&anchored(5, -5), &mut page).expect("resolve");
        assert_eq!(resolved.point, Point::new(305.0, 95.0));
        assert!(resolved.from_anchor);
        assert!(reporter.notices().is_empty());
    }

    #[test]
    fn pdf_anchor_flips_against_page_height() {
        let engine = total_engine();
        let reporter = RecordingReporter::new();
        let resolver = CoordinateResolver::new(&engine, &reporter);
        let raster = DynamicImage::new_rgb8(612, 792);
        let mut page = PageContext::pdf_page(1, 792.0, Some(&raster));

        let resolved = resolver.resolve(&anchored(5, -5), &mut page).expect("resolve");
        assert_eq!(resolved.point, Point::new(305.0, 697.0));
    }

    #[test]
    fn anchor_miss_falls_back_unflipped_and_reports() {
        let engine = FixedOcr::new(vec![OcrWord::new("Balance", 1, 1, 1, 1)]);
        let reporter = RecordingReporter::new();
        let resolver = CoordinateResolver::new(&engine, &reporter);
        let raster = DynamicImage::new_rgb8(612, 792);
        let mut page = PageContext::pdf_page(3, 792.0, Some(&raster));

        let resolved = resolver.resolve(&anchored(5, -5), &mut page).expect("resolve");
        assert_eq!(resolved.point, Point::new(100.0, 200.0));
        assert!(!resolved.from_anchor);
        assert_eq!(
            reporter.notices(),
            vec![Notice::AnchorMissed {
                pattern: "Total".to_string(),
                page: Some(3),
                fallback: (100, 200),
            }]
        );
    }

    #[test]
    fn blank_pattern_never_matches_and_falls_back() {
        let engine = total_engine();
        let reporter = RecordingReporter::new();
        let resolver = CoordinateResolver::new(&engine, &reporter);
        let raster = DynamicImage::new_rgb8(612, 792);
        let mut page = PageContext::image(&raster);
        let mut annotation = anchored(5, -5);
        if let Placement::Anchored { pattern, .. } = &mut annotation.placement {
            *pattern = "  ".to_string();
        }

        let resolved = resolver.resolve(&annotation, &mut page).expect("resolve");
        assert_eq!(resolved.point, Point::new(100.0, 200.0));
        assert!(matches!(
            reporter.notices().as_slice(),
            [Notice::AnchorMissed { .. }]
        ));
    }

    #[test]
    fn first_match_wins() {
        let engine = FixedOcr::new(vec![
            OcrWord::new("Subtotal", 10, 500, 60, 20),
            OcrWord::new("Total:", 300, 100, 50, 20),
        ]);
        let reporter = RecordingReporter::new();
        let resolver = CoordinateResolver::new(&engine, &reporter);
        let raster = DynamicImage::new_rgb8(612, 792);
        let mut page = PageContext::image(&raster);

        let resolved = resolver.resolve(&anchored(0, 0), &mut page).expect("resolve");
        assert_eq!(resolved.point, Point::new(10.0, 500.0));
    }

    #[test]
    fn anchored_without_raster_is_missing_dependency() {
        let engine = total_engine();
        let reporter = RecordingReporter::new();
        let resolver = CoordinateResolver::new(&engine, &reporter);
        let mut page = PageContext::pdf_page(1, 792.0, None);

        let err = resolver.resolve(&anchored(0, 0), &mut page).unwrap_err();
        assert!(matches!(err, AnnotateError::MissingDependency(_)));
    }
}
