use anyhow::{Context, Result, anyhow};
use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use crate::error::AnnotateError;
use crate::notice::{Notice, Reporter};

/// Installed families tried, in order, when no custom font is requested or
/// it failed to load. If none is present any face with Latin glyphs is used.
const FALLBACK_FAMILIES: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "NotoSans",
    "Arial",
    "Helvetica",
];
/// The fallback face is drawn at this pixel size whatever size was requested.
pub(crate) const FALLBACK_SIZE: f32 = 11.0;

#[derive(Clone)]
pub(crate) struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    ascender: i16,
    family: Option<String>,
}

impl FontMetrics {
    pub(crate) fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub(crate) fn data(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.data)
    }

    fn ascent_px(&self, size: f32) -> f32 {
        self.ascender.max(0) as f32 * size / self.units_per_em.max(1) as f32
    }
}

/// Font choice for one raster annotation.
#[derive(Clone)]
pub(crate) struct RasterFont {
    pub(crate) family: String,
    pub(crate) size: f32,
    /// Distance from the top of the line box to the baseline, in pixels.
    pub(crate) ascent: f32,
    pub(crate) data: Option<Arc<Vec<u8>>>,
}

impl RasterFont {
    fn from_metrics(metrics: &FontMetrics, family: String, size: f32) -> Self {
        Self {
            family,
            size,
            ascent: metrics.ascent_px(size),
            data: Some(metrics.data()),
        }
    }
}

/// Picks the face for each raster annotation. The system fallback is looked
/// up once and reused for every annotation that needs it.
pub(crate) struct FontResolver {
    fallback: RefCell<Option<RasterFont>>,
}

impl FontResolver {
    pub(crate) fn new() -> Self {
        Self {
            fallback: RefCell::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_fallback(font: RasterFont) -> Self {
        Self {
            fallback: RefCell::new(Some(font)),
        }
    }

    /// Loads the requested TrueType font at `size`. Without a path the
    /// fallback is used silently; a path that fails to load is reported and
    /// also falls back. Fails only when no fallback face is installed.
    pub(crate) fn resolve(
        &self,
        size: u32,
        path: Option<&Path>,
        reporter: &dyn Reporter,
    ) -> crate::error::Result<RasterFont> {
        let Some(path) = path else {
            return self.fallback();
        };
        match load_font_metrics(path) {
            Ok(metrics) => {
                let family = metrics
                    .family()
                    .map(str::to_string)
                    .unwrap_or_else(|| "sans-serif".to_string());
                Ok(RasterFont::from_metrics(&metrics, family, size as f32))
            }
            Err(err) => {
                reporter.report(Notice::FontFallback {
                    path: path.to_path_buf(),
                    reason: format!("{:#}", err),
                });
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> crate::error::Result<RasterFont> {
        if let Some(font) = self.fallback.borrow().as_ref() {
            return Ok(font.clone());
        }
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        let font = resolve_system_fallback(&db).map_err(AnnotateError::image)?;
        tracing::debug!("fallback font resolved to '{}'", font.family);
        *self.fallback.borrow_mut() = Some(font.clone());
        Ok(font)
    }
}

fn resolve_system_fallback(db: &fontdb::Database) -> Result<RasterFont> {
    for family in FALLBACK_FAMILIES {
        let families = [fontdb::Family::Name(family)];
        let query = fontdb::Query {
            families: &families,
            ..Default::default()
        };
        if let Some(id) = db.query(&query) {
            if let Some(font) = raster_font_for_face(db, id) {
                return Ok(font);
            }
        }
    }

    db.faces()
        .filter_map(|face| raster_font_for_face(db, face.id))
        .next()
        .ok_or_else(|| anyhow!("no usable system font found for annotation text"))
}

/// Builds a fallback font from an installed face, using the family name
/// fontdb indexed it under so the SVG renderer finds the same face.
fn raster_font_for_face(db: &fontdb::Database, id: fontdb::ID) -> Option<RasterFont> {
    let family = db
        .face(id)
        .and_then(|info| info.families.first())
        .map(|(name, _)| name.clone())?;
    let metrics = db
        .with_face_data(id, |data, index| metrics_for_latin_face(data, index))
        .flatten()?;
    Some(RasterFont::from_metrics(&metrics, family, FALLBACK_SIZE))
}

fn metrics_for_latin_face(data: &[u8], index: u32) -> Option<FontMetrics> {
    let face = Face::parse(data, index).ok()?;
    face.glyph_index('A')?;
    Some(FontMetrics {
        units_per_em: face.units_per_em().max(1),
        ascender: face.ascender(),
        family: extract_family_name(&face),
        data: Arc::new(data.to_vec()),
    })
}

pub(crate) fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(data)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

fn load_font_metrics_from_data(data: Vec<u8>) -> Result<FontMetrics> {
    let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
    for index in 0..count {
        if let Ok(face) = Face::parse(&data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let ascender = face.ascender();
            return Ok(FontMetrics {
                data: Arc::new(data),
                units_per_em,
                ascender,
                family,
            });
        }
    }
    Err(anyhow!("failed to parse font data"))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
pub(crate) fn test_fallback() -> RasterFont {
    RasterFont {
        family: "Test Sans".to_string(),
        size: FALLBACK_SIZE,
        ascent: 8.8,
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::RecordingReporter;
    use tempfile::tempdir;

    #[test]
    fn no_path_uses_fallback_without_notice() {
        let reporter = RecordingReporter::new();
        let resolver = FontResolver::with_fallback(test_fallback());
        let font = resolver.resolve(30, None, &reporter).expect("font");
        assert_eq!(font.family, "Test Sans");
        assert_eq!(font.size, FALLBACK_SIZE);
        assert!(reporter.notices().is_empty());
    }

    #[test]
    fn unreadable_font_falls_back_and_ignores_size() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").expect("write font");

        let reporter = RecordingReporter::new();
        let resolver = FontResolver::with_fallback(test_fallback());
        let font = resolver.resolve(30, Some(&path), &reporter).expect("font");
        assert_eq!(font.size, FALLBACK_SIZE);
        assert_eq!(font.family, "Test Sans");
        match reporter.notices().as_slice() {
            [Notice::FontFallback { path: reported, .. }] => assert_eq!(reported, &path),
            other => panic!("unexpected notices: {other:?}"),
        }
    }

    #[test]
    fn missing_font_file_falls_back() {
        let reporter = RecordingReporter::new();
        let resolver = FontResolver::with_fallback(test_fallback());
        let font = resolver
            .resolve(12, Some(Path::new("/no/such/font.ttf")), &reporter)
            .expect("font");
        assert_eq!(font.family, "Test Sans");
        assert_eq!(reporter.notices().len(), 1);
    }

    #[test]
    fn system_fallback_is_a_concrete_installed_face() {
        let reporter = RecordingReporter::new();
        let font = FontResolver::new().resolve(12, None, &reporter).expect("system font");
        assert_ne!(font.family, "sans-serif");
        assert!(!font.family.is_empty());
        assert!(font.data.is_some());
        assert!(font.ascent > 0.0 && font.ascent <= FALLBACK_SIZE);
    }

    #[test]
    fn empty_database_has_no_fallback() {
        let db = fontdb::Database::new();
        assert!(resolve_system_fallback(&db).is_err());
    }
}
