use anyhow::{Context, anyhow};
use image::DynamicImage;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use crate::error::{AnnotateError, Result};

/// Rasterization resolution. At 72 dpi one pixel is one PDF point, so OCR
/// boxes and page heights share units with the overlay.
pub const RASTER_DPI: u32 = 72;

/// Turns each page of a PDF into an image for OCR.
pub trait Rasterizer {
    fn rasterize(&self, pdf_path: &Path) -> Result<RasterizedPages>;
}

impl<R: Rasterizer + ?Sized> Rasterizer for &R {
    fn rasterize(&self, pdf_path: &Path) -> Result<RasterizedPages> {
        (**self).rasterize(pdf_path)
    }
}

impl<R: Rasterizer + ?Sized> Rasterizer for Box<R> {
    fn rasterize(&self, pdf_path: &Path) -> Result<RasterizedPages> {
        (**self).rasterize(pdf_path)
    }
}

enum RasterPage {
    File(PathBuf),
    Memory(DynamicImage),
}

/// Page images in page order. File-backed pages are decoded on demand so
/// only the page being worked on is held in memory.
pub struct RasterizedPages {
    pages: Vec<RasterPage>,
    _dir: Option<TempDir>,
}

impl RasterizedPages {
    pub fn from_images(images: Vec<DynamicImage>) -> Self {
        Self {
            pages: images.into_iter().map(RasterPage::Memory).collect(),
            _dir: None,
        }
    }

    fn from_files(dir: TempDir, paths: Vec<PathBuf>) -> Self {
        Self {
            pages: paths.into_iter().map(RasterPage::File).collect(),
            _dir: Some(dir),
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn load(&self, index: usize) -> Result<DynamicImage> {
        match self.pages.get(index) {
            Some(RasterPage::File(path)) => image::open(path).map_err(|err| {
                AnnotateError::image(format!(
                    "failed to decode rendered page {}: {}",
                    index + 1,
                    err
                ))
            }),
            Some(RasterPage::Memory(image)) => Ok(image.clone()),
            None => Err(AnnotateError::Pdf(format!(
                "rasterizer produced no image for page {}",
                index + 1
            ))),
        }
    }
}

/// Renders pages with `mutool draw` (mupdf) or `pdftoppm` (poppler),
/// whichever is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct PopplerRasterizer;

impl Rasterizer for PopplerRasterizer {
    fn rasterize(&self, pdf_path: &Path) -> Result<RasterizedPages> {
        let tool = if command_exists("mutool") {
            RasterTool::Mutool
        } else if command_exists("pdftoppm") {
            RasterTool::Pdftoppm
        } else {
            return Err(AnnotateError::MissingDependency(
                "pdf rendering for OCR requires mutool or pdftoppm (install mupdf or poppler)"
                    .to_string(),
            ));
        };
        render_pdf_pages(pdf_path, tool).map_err(|err| AnnotateError::Pdf(format!("{:#}", err)))
    }
}

#[derive(Clone, Copy)]
enum RasterTool {
    Mutool,
    Pdftoppm,
}

fn render_pdf_pages(pdf_path: &Path, tool: RasterTool) -> anyhow::Result<RasterizedPages> {
    let dir = tempfile::tempdir().with_context(|| "failed to create temp dir for pdf")?;
    let dpi = RASTER_DPI.to_string();

    let output = match tool {
        RasterTool::Mutool => Command::new("mutool")
            .arg("draw")
            .arg("-r")
            .arg(&dpi)
            .arg("-o")
            .arg(dir.path().join("page-%03d.png"))
            .arg(pdf_path)
            .output()
            .with_context(|| "failed to run mutool")?,
        RasterTool::Pdftoppm => Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(&dpi)
            .arg(pdf_path)
            .arg(dir.path().join("page"))
            .output()
            .with_context(|| "failed to run pdftoppm")?,
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let name = match tool {
            RasterTool::Mutool => "mutool",
            RasterTool::Pdftoppm => "pdftoppm",
        };
        return Err(anyhow!("{} failed: {}", name, stderr.trim()));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir.path())
        .with_context(|| "failed to read temp pdf directory")?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_page_image(path))
        .collect();
    paths.sort();
    tracing::debug!("rasterized {} page(s) from {}", paths.len(), pdf_path.display());

    Ok(RasterizedPages::from_files(dir, paths))
}

fn is_page_image(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with("page"))
        .unwrap_or(false)
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("png"))
            .unwrap_or(false)
}

pub(crate) fn command_exists(cmd: &str) -> bool {
    let path = Path::new(cmd);
    if path.components().count() > 1 {
        return is_executable(path);
    }

    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };

    env::split_paths(&path_var).any(|dir| is_executable(&dir.join(cmd)))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_images_are_recognised_by_name_and_extension() {
        assert!(is_page_image(Path::new("/tmp/x/page-001.png")));
        assert!(is_page_image(Path::new("/tmp/x/page-1.PNG")));
        assert!(!is_page_image(Path::new("/tmp/x/page-1.ppm")));
        assert!(!is_page_image(Path::new("/tmp/x/input.png")));
    }

    #[test]
    fn in_memory_pages_load_by_index() {
        let pages = RasterizedPages::from_images(vec![
            DynamicImage::new_rgb8(612, 792),
            DynamicImage::new_rgb8(300, 400),
        ]);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages.load(1).expect("page 2").height(), 400);
        assert!(matches!(pages.load(2), Err(AnnotateError::Pdf(_))));
    }

    #[test]
    fn missing_command_is_not_found() {
        assert!(!command_exists("definitely-not-a-real-command-xyz"));
    }

    #[test]
    fn explicit_paths_need_the_execute_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let tool = dir.path().join("mutool");
        fs::write(&tool, "#!/bin/sh\n").expect("write tool");
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o644)).expect("chmod");
        assert!(!command_exists(tool.to_str().expect("utf-8 path")));

        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).expect("chmod");
        assert!(command_exists(tool.to_str().expect("utf-8 path")));
        assert!(!command_exists(dir.path().to_str().expect("utf-8 path")));
    }
}
