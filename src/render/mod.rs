mod font;
pub mod image;
mod merge;
mod overlay;
pub mod pdf;
mod svg;

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use time::macros::format_description;

use crate::error::Result;

pub use self::image::ImageRenderer;
pub use self::pdf::PdfOverlayRenderer;
pub use overlay::PdfColor;

/// One annotation as it was actually drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedAnnotation {
    /// 1-based page number; always 1 for images.
    pub page: usize,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub size: u32,
    pub color: String,
    pub from_anchor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderReport {
    pub pages: usize,
    pub placed: Vec<PlacedAnnotation>,
    pub signature_drawn: bool,
}

impl RenderReport {
    pub fn summary_lines(&self) -> Vec<String> {
        self.placed
            .iter()
            .map(|placed| {
                format!(
                    "page {}: '{}' at ({}, {}) size {} {}{}",
                    placed.page,
                    placed.text,
                    placed.x,
                    placed.y,
                    placed.size,
                    placed.color,
                    if placed.from_anchor { " [anchor]" } else { "" }
                )
            })
            .collect()
    }
}

/// Replaces `{date}` with today's UTC date (`YYYY-MM-DD`).
pub(crate) fn expand_text(text: &str) -> String {
    if !text.contains("{date}") {
        return text.to_string();
    }
    let today = time::OffsetDateTime::now_utc().date();
    expand_text_with(text, &format_date(today))
}

fn expand_text_with(text: &str, today: &str) -> String {
    text.replace("{date}", today)
}

fn format_date(date: time::Date) -> String {
    date.format(format_description!("[year]-[month]-[day]")).unwrap_or_default()
}

/// Writes `bytes` next to `output` and renames it into place, so a failed run
/// never leaves a partial file behind.
pub(crate) fn write_atomically(output: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(output).map_err(|err| err.error)?;
    Ok(())
}
