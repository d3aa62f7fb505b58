use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AnnotateError, Result};
use crate::notice::{Notice, Reporter};

pub const DEFAULT_SIZE: u32 = 12;
pub const DEFAULT_COLOR: &str = "red";
pub const DEFAULT_FALLBACK: (i64, i64) = (50, 50);
pub const DEFAULT_SIGNATURE_SIZE: (u32, u32) = (100, 50);

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub size: u32,
    pub color: String,
    pub font: Option<PathBuf>,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// Literal coordinates in the target's own space.
    Manual { x: i64, y: i64 },
    /// Offset from the first OCR token containing `pattern`; `fallback` is
    /// used verbatim when nothing matches.
    Anchored {
        pattern: String,
        offset_x: i64,
        offset_y: i64,
        fallback: (i64, i64),
    },
}

impl Annotation {
    pub fn is_anchored(&self) -> bool {
        matches!(self.placement, Placement::Anchored { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub path: PathBuf,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationConfig {
    pub annotations: Vec<Annotation>,
    pub signature: Option<Signature>,
}

impl AnnotationConfig {
    /// The config used when no file is supplied: a single red `SAMPLE` stamp.
    pub fn builtin() -> Self {
        Self {
            annotations: vec![Annotation {
                text: "SAMPLE".to_string(),
                size: 14,
                color: DEFAULT_COLOR.to_string(),
                font: None,
                placement: Placement::Manual { x: 50, y: 50 },
            }],
            signature: None,
        }
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(source).map_err(|err| AnnotateError::ConfigParse {
                path: PathBuf::from("<memory>"),
                message: err.to_string(),
            })?;
        Self::from_value(value)
    }

    pub fn needs_ocr(&self) -> bool {
        self.annotations.iter().any(Annotation::is_anchored)
    }

    fn from_value(value: Value) -> Result<Self> {
        let records = value
            .get("annotations")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AnnotateError::Validation("must contain 'annotations' list".to_string())
            })?;

        let annotations = records
            .iter()
            .enumerate()
            .map(|(index, record)| parse_annotation(index, record))
            .collect::<Result<Vec<_>>>()?;

        let signature = match value.get("signature") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(parse_signature(raw)?),
        };

        Ok(Self {
            annotations,
            signature,
        })
    }
}

pub fn load_config(path: Option<&Path>, reporter: &dyn Reporter) -> Result<AnnotationConfig> {
    let Some(path) = path else {
        reporter.report(Notice::DefaultConfig);
        return Ok(AnnotationConfig::builtin());
    };

    if !path.exists() {
        return Err(AnnotateError::ConfigNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)?;
    let value = if is_toml(path) {
        let parsed: toml::Value =
            toml::from_str(&content).map_err(|err| AnnotateError::ConfigParse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        serde_json::to_value(parsed).map_err(|err| AnnotateError::ConfigParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?
    } else {
        serde_json::from_str(&content).map_err(|err| AnnotateError::ConfigParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?
    };

    let config = AnnotationConfig::from_value(value)?;
    tracing::debug!(
        "loaded {} annotation(s) from {}",
        config.annotations.len(),
        path.display()
    );
    Ok(config)
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct RawAnnotation {
    text: Option<String>,
    x: Option<i64>,
    y: Option<i64>,
    size: Option<u32>,
    color: Option<String>,
    font: Option<PathBuf>,
    #[serde(rename = "match")]
    pattern: Option<String>,
    offset_x: Option<i64>,
    offset_y: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawSignature {
    path: Option<PathBuf>,
    x: Option<i64>,
    y: Option<i64>,
    width: Option<u32>,
    height: Option<u32>,
}

fn parse_annotation(index: usize, record: &Value) -> Result<Annotation> {
    let raw: RawAnnotation = serde_json::from_value(record.clone())
        .map_err(|err| AnnotateError::Validation(format!("annotation #{}: {}", index, err)))?;

    let text = raw.text.ok_or_else(|| {
        AnnotateError::Validation(format!("annotation #{}: missing 'text'", index))
    })?;

    // An empty `match` means no anchor at all; a blank one is kept and
    // simply never matches, landing on the fallback.
    let placement = match raw.pattern.filter(|pattern| !pattern.is_empty()) {
        Some(pattern) => Placement::Anchored {
            pattern,
            offset_x: raw.offset_x.unwrap_or(0),
            offset_y: raw.offset_y.unwrap_or(0),
            fallback: (
                raw.x.unwrap_or(DEFAULT_FALLBACK.0),
                raw.y.unwrap_or(DEFAULT_FALLBACK.1),
            ),
        },
        None => match (raw.x, raw.y) {
            (Some(x), Some(y)) => Placement::Manual { x, y },
            (None, _) => {
                return Err(AnnotateError::Validation(format!(
                    "annotation #{}: missing 'x'",
                    index
                )));
            }
            (_, None) => {
                return Err(AnnotateError::Validation(format!(
                    "annotation #{}: missing 'y'",
                    index
                )));
            }
        },
    };

    Ok(Annotation {
        text,
        size: raw.size.unwrap_or(DEFAULT_SIZE),
        color: raw.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        font: raw.font,
        placement,
    })
}

fn parse_signature(value: &Value) -> Result<Signature> {
    let raw: RawSignature = serde_json::from_value(value.clone())
        .map_err(|err| AnnotateError::Validation(format!("signature: {}", err)))?;
    let path = raw
        .path
        .ok_or_else(|| AnnotateError::Validation("signature: missing 'path'".to_string()))?;
    let (Some(x), Some(y)) = (raw.x, raw.y) else {
        return Err(AnnotateError::Validation(
            "signature: missing 'x' or 'y'".to_string(),
        ));
    };
    Ok(Signature {
        path,
        x,
        y,
        width: raw.width.unwrap_or(DEFAULT_SIGNATURE_SIZE.0),
        height: raw.height.unwrap_or(DEFAULT_SIGNATURE_SIZE.1),
    })
}
