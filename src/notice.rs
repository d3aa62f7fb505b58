//! Non-fatal conditions raised while annotating.
//!
//! Components never log fallbacks directly; they hand a [`Notice`] to the
//! [`Reporter`] they were built with. The default reporter forwards to
//! `tracing`, tests swap in a recorder.

use std::cell::RefCell;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// No config path was given and the built-in annotation is used.
    DefaultConfig,
    /// OCR did not find the anchor text; fallback coordinates are used.
    AnchorMissed {
        pattern: String,
        page: Option<usize>,
        fallback: (i64, i64),
    },
    /// A custom font could not be loaded; the default font is used.
    FontFallback { path: PathBuf, reason: String },
    /// A custom font was requested for a PDF overlay, where only the
    /// built-in family is available.
    FontIgnored { path: PathBuf },
    /// The signature image could not be loaded and was not drawn.
    SignatureSkipped { path: PathBuf, reason: String },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::DefaultConfig => write!(f, "no config provided, using defaults"),
            Notice::AnchorMissed {
                pattern,
                page: Some(page),
                fallback,
            } => write!(
                f,
                "match '{}' not found on page {}, using ({}, {})",
                pattern, page, fallback.0, fallback.1
            ),
            Notice::AnchorMissed {
                pattern,
                page: None,
                fallback,
            } => write!(
                f,
                "match '{}' not found, using ({}, {})",
                pattern, fallback.0, fallback.1
            ),
            Notice::FontFallback { path, reason } => {
                write!(f, "font load failed ({}): {}", path.display(), reason)
            }
            Notice::FontIgnored { path } => write!(
                f,
                "custom font {} is not used for pdf overlays",
                path.display()
            ),
            Notice::SignatureSkipped { path, reason } => {
                write!(f, "signature {} skipped: {}", path.display(), reason)
            }
        }
    }
}

pub trait Reporter {
    fn report(&self, notice: Notice);
}

/// Forwards every notice to `tracing` at WARN.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, notice: Notice) {
        tracing::warn!("{}", notice);
    }
}

/// Keeps notices in memory so callers can inspect which fallbacks fired.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    notices: RefCell<Vec<Notice>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, notice: Notice) {
        self.notices.borrow_mut().push(notice);
    }
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn report(&self, notice: Notice) {
        (**self).report(notice);
    }
}

impl<R: Reporter + ?Sized> Reporter for std::rc::Rc<R> {
    fn report(&self, notice: Notice) {
        (**self).report(notice);
    }
}
