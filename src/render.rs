//! Page rendering
//!
//! Turns a document page into a pixel buffer. PDFs are rasterized with
//! ImageMagick in a time-boxed subprocess, with the page count taken from
//! `lopdf`; raster files (PNG, JPEG, TIFF, BMP) are single-page documents.
//!
//! Renderers never return `Err` for the whole call: a [`RenderedPage`]
//! always carries the total page count (0 when unknown) next to either the
//! image or the failure.

use image::DynamicImage;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::util::{format_duration, load_image};

/// Default render scale (2x = 144 DPI for PDFs)
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;

/// Default per-file render timeout
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(60);

/// PDF user-space units per inch
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Interval between subprocess status polls
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Rendering error types
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Rendering timed out after {}: {path}", format_duration(*.timeout))]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("External tool error: {0}")]
    ExternalToolError(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Rendering options
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Resolution multiplier relative to 72 DPI
    pub scale: f32,
    /// Per-file timeout for external renderers
    pub timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: DEFAULT_RENDER_SCALE,
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }
}

impl RenderOptions {
    /// Create a new options builder
    pub fn builder() -> RenderOptionsBuilder {
        RenderOptionsBuilder::default()
    }

    /// Density passed to the PDF rasterizer
    pub fn dpi(&self) -> u32 {
        (PDF_POINTS_PER_INCH * self.scale).round().max(1.0) as u32
    }
}

/// Builder for RenderOptions
#[derive(Debug, Default)]
pub struct RenderOptionsBuilder {
    options: RenderOptions,
}

impl RenderOptionsBuilder {
    /// Set render scale (clamped to 0.25-8.0)
    #[must_use]
    pub fn scale(mut self, scale: f32) -> Self {
        self.options.scale = scale.clamp(0.25, 8.0);
        self
    }

    /// Set per-file timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> RenderOptions {
        self.options
    }
}

/// Result of rendering one page
#[derive(Debug)]
pub struct RenderedPage {
    /// Rendered image, or why it could not be produced
    pub image: Result<DynamicImage, RenderError>,
    /// Page actually rendered (0 when the request was out of range)
    pub page_index: usize,
    /// Total pages in the document, 0 when unknown
    pub total_pages: usize,
}

impl RenderedPage {
    fn failed(error: RenderError, page_index: usize, total_pages: usize) -> Self {
        Self {
            image: Err(error),
            page_index,
            total_pages,
        }
    }
}

/// Rendering collaborator
pub trait PageRenderer: Send + Sync {
    /// Render `page_index` of the document at `path`.
    ///
    /// Out-of-range indices fall back to page 0.
    fn render(&self, path: &Path, page_index: usize, options: &RenderOptions) -> RenderedPage;
}

/// Renderer for raster image files (always one page)
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterRenderer;

impl PageRenderer for RasterRenderer {
    fn render(&self, path: &Path, _page_index: usize, _options: &RenderOptions) -> RenderedPage {
        if !path.exists() {
            return RenderedPage::failed(RenderError::FileNotFound(path.to_path_buf()), 0, 0);
        }

        match load_image(path) {
            Ok(img) => RenderedPage {
                image: Ok(img),
                page_index: 0,
                total_pages: 1,
            },
            Err(e) => RenderedPage::failed(RenderError::InvalidImage(e), 0, 1),
        }
    }
}

/// ImageMagick-based PDF renderer
#[derive(Debug, Clone)]
pub struct MagickRenderer {
    program: String,
}

impl Default for MagickRenderer {
    fn default() -> Self {
        Self {
            program: "magick".to_string(),
        }
    }
}

impl MagickRenderer {
    /// Use a specific ImageMagick executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the configured executable can be launched
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// Page count from the PDF structure, `None` when it cannot be parsed
    pub fn page_count(path: &Path) -> Option<usize> {
        match lopdf::Document::load(path) {
            Ok(doc) => Some(doc.get_pages().len()),
            Err(e) => {
                debug!(file = %path.display(), error = %e, "lopdf could not read page count");
                None
            }
        }
    }

    fn rasterize(
        &self,
        path: &Path,
        page_index: usize,
        options: &RenderOptions,
    ) -> Result<DynamicImage, RenderError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-density").arg(options.dpi().to_string());
        cmd.arg("-background").arg("white");
        cmd.arg("-alpha").arg("remove");
        cmd.arg("-alpha").arg("off");
        cmd.arg(format!("{}[{}]", path.display(), page_index));
        cmd.arg("png:-");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| RenderError::ExternalToolError(format!("{}: {}", self.program, e)))?;
        let (status, stdout, stderr) = wait_with_timeout(child, options.timeout, path)?;

        if !status.success() {
            return Err(RenderError::ExternalToolError(
                String::from_utf8_lossy(&stderr).trim().to_string(),
            ));
        }

        image::load_from_memory(&stdout).map_err(|e| RenderError::InvalidImage(e.to_string()))
    }
}

impl PageRenderer for MagickRenderer {
    fn render(&self, path: &Path, page_index: usize, options: &RenderOptions) -> RenderedPage {
        if !path.exists() {
            return RenderedPage::failed(RenderError::FileNotFound(path.to_path_buf()), 0, 0);
        }

        let total_pages = Self::page_count(path).unwrap_or(0);
        let page_index = if total_pages > 0 && page_index >= total_pages {
            0
        } else {
            page_index
        };

        match self.rasterize(path, page_index, options) {
            Ok(img) => RenderedPage {
                image: Ok(img),
                page_index,
                // An unparseable structure that still rasterizes has at least this page
                total_pages: total_pages.max(page_index + 1),
            },
            Err(e) => {
                warn!(file = %path.display(), page = page_index, error = %e, "page render failed");
                RenderedPage::failed(e, page_index, total_pages)
            }
        }
    }
}

/// Picks a renderer by file extension: PDFs go to ImageMagick, anything
/// else is decoded as a raster image
#[derive(Debug, Clone, Default)]
pub struct DocumentRenderer {
    pdf: MagickRenderer,
    raster: RasterRenderer,
}

impl DocumentRenderer {
    pub fn new(pdf: MagickRenderer) -> Self {
        Self {
            pdf,
            raster: RasterRenderer,
        }
    }

    /// Whether PDF rendering is available on this system
    pub fn pdf_available(&self) -> bool {
        self.pdf.is_available()
    }
}

impl PageRenderer for DocumentRenderer {
    fn render(&self, path: &Path, page_index: usize, options: &RenderOptions) -> RenderedPage {
        if is_pdf(path) {
            self.pdf.render(path, page_index, options)
        } else {
            self.raster.render(path, page_index, options)
        }
    }
}

/// Whether a path has a `.pdf` extension (case-insensitive)
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

type ProcessOutput = (std::process::ExitStatus, Vec<u8>, Vec<u8>);

/// Wait for a child process, killing it once `timeout` elapses.
///
/// Output pipes are drained on helper threads so a large image cannot
/// block the child on a full pipe.
fn wait_with_timeout(
    mut child: Child,
    timeout: Duration,
    path: &Path,
) -> Result<ProcessOutput, RenderError> {
    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RenderError::Timeout {
                path: path.to_path_buf(),
                timeout,
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = join_reader(stdout_reader)?;
    let stderr = join_reader(stderr_reader)?;
    Ok((status, stdout, stderr))
}

type Reader = Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Reader {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_reader(reader: Reader) -> Result<Vec<u8>, RenderError> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| RenderError::ExternalToolError("output reader panicked".to_string()))?
            .map_err(RenderError::from),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_default_options() {
        let opts = RenderOptions::default();
        assert_eq!(opts.scale, 2.0);
        assert_eq!(opts.dpi(), 144);
        assert_eq!(opts.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_clamping() {
        let opts = RenderOptions::builder().scale(100.0).build();
        assert_eq!(opts.scale, 8.0);

        let opts = RenderOptions::builder()
            .scale(1.0)
            .timeout(Duration::from_secs(5))
            .build();
        assert_eq!(opts.dpi(), 72);
        assert_eq!(opts.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(Path::new("a/ABC12345.pdf")));
        assert!(is_pdf(Path::new("a/ABC12345.PDF")));
        assert!(!is_pdf(Path::new("a/ABC12345.png")));
        assert!(!is_pdf(Path::new("a/ABC12345")));
    }

    #[test]
    fn test_raster_renderer_loads_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ABC12345.png");
        GrayImage::from_pixel(40, 30, Luma([128])).save(&path).unwrap();

        let page = RasterRenderer.render(&path, 0, &RenderOptions::default());
        let img = page.image.unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_raster_renderer_out_of_range_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ABC12345.png");
        GrayImage::from_pixel(10, 10, Luma([0])).save(&path).unwrap();

        let page = RasterRenderer.render(&path, 5, &RenderOptions::default());
        assert!(page.image.is_ok());
        assert_eq!(page.page_index, 0);
    }

    #[test]
    fn test_raster_renderer_missing_file() {
        let page = RasterRenderer.render(
            Path::new("/nonexistent/ABC12345.png"),
            0,
            &RenderOptions::default(),
        );
        assert!(matches!(page.image, Err(RenderError::FileNotFound(_))));
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_raster_renderer_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ABC12345.png");
        std::fs::write(&path, b"not a png").unwrap();

        let page = RasterRenderer.render(&path, 0, &RenderOptions::default());
        assert!(matches!(page.image, Err(RenderError::InvalidImage(_))));
    }

    #[test]
    fn test_magick_renderer_missing_file() {
        let page = MagickRenderer::default().render(
            Path::new("/nonexistent/ABC12345.pdf"),
            0,
            &RenderOptions::default(),
        );
        assert!(matches!(page.image, Err(RenderError::FileNotFound(_))));
    }

    #[test]
    fn test_magick_renderer_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ABC12345.pdf");
        std::fs::write(&path, b"%PDF-1.4 broken").unwrap();

        let renderer = MagickRenderer::with_program("/nonexistent/magick-binary");
        assert!(!renderer.is_available());

        let page = renderer.render(&path, 0, &RenderOptions::default());
        assert!(matches!(page.image, Err(RenderError::ExternalToolError(_))));
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_page_count_invalid_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        assert_eq!(MagickRenderer::page_count(&path), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_with_timeout_kills_slow_process() {
        let child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let start = Instant::now();
        let result = wait_with_timeout(child, Duration::from_millis(100), Path::new("slow.pdf"));
        let err = result.unwrap_err();
        assert!(matches!(err, RenderError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_message_keeps_subsecond_value() {
        let err = RenderError::Timeout {
            path: PathBuf::from("slow.pdf"),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Rendering timed out after 250ms: slow.pdf");
    }

    #[test]
    fn test_pdf_available_follows_program_lookup() {
        let renderer = DocumentRenderer::new(MagickRenderer::with_program("/nonexistent/magick"));
        assert!(!renderer.pdf_available());
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_with_timeout_collects_output() {
        let child = Command::new("echo")
            .arg("rendered")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let (status, stdout, _) =
            wait_with_timeout(child, Duration::from_secs(5), Path::new("fast.pdf")).unwrap();
        assert!(status.success());
        assert_eq!(String::from_utf8_lossy(&stdout).trim(), "rendered");
    }

    #[test]
    fn test_document_renderer_dispatches_raster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ABC12345.png");
        GrayImage::from_pixel(12, 12, Luma([255])).save(&path).unwrap();

        let renderer = DocumentRenderer::new(MagickRenderer::with_program("/nonexistent/magick"));
        let page = renderer.render(&path, 0, &RenderOptions::default());
        assert!(page.image.is_ok());
    }
}
