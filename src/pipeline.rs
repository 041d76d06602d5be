//! Comparison pipeline
//!
//! Runs the per-page engine and the folder batch on top of it.
//!
//! ## Per page
//!
//! 1. Render both sides (in parallel)
//! 2. Resolve each side's content region (manual override or detection)
//! 3. Normalize both regions onto the shared canvas
//! 4. Score with SSIM
//!
//! ## Batch
//!
//! Pairs run on a bounded thread pool in memory-sized chunks. One pair's
//! failure never aborts the others, and results come back in pair order.

use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::{DetectionOptions, DetectionResult, RegionDetector};
use crate::normalize::{NormalizeOptions, Normalizer, MAX_TARGET_SIDE};
use crate::overrides::{PageOverrides, Side};
use crate::pairing::{DocumentFile, MatchKind, Pair};
use crate::render::{DocumentRenderer, PageRenderer, RenderOptions, DEFAULT_RENDER_SCALE};
use crate::similarity::{
    Comparison, SimilarityResult, SimilarityScorer, SsimOptions, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::validation::{AutoApproveCandidate, ValidationLedger};

// ============================================================
// Memory Management Utilities
// ============================================================

/// Estimated peak memory per pair in flight (two renders, canvases, SSIM tables)
const ESTIMATED_PAIR_MEMORY_MB: usize = 64;

/// Minimum chunk size for parallel processing
const MIN_CHUNK_SIZE: usize = 4;

/// Default memory limit if not specified (4GB)
const DEFAULT_MEMORY_LIMIT_MB: usize = 4096;

/// Calculate a chunk size that keeps pairs in flight within memory limits
///
/// # Arguments
/// * `total_items` - Total number of items to process
/// * `max_memory_mb` - Maximum memory to use (0 = detect)
/// * `threads` - Number of parallel threads
pub fn calculate_optimal_chunk_size(
    total_items: usize,
    max_memory_mb: usize,
    threads: usize,
) -> usize {
    let memory_limit = if max_memory_mb == 0 {
        get_available_memory_mb().unwrap_or(DEFAULT_MEMORY_LIMIT_MB)
    } else {
        max_memory_mb
    };

    // Leave half for the OS and renderer subprocesses
    let usable_memory = memory_limit / 2;

    let max_concurrent = threads.max(1);
    let capacity = (usable_memory / ESTIMATED_PAIR_MEMORY_MB).min(max_concurrent);

    capacity.max(MIN_CHUNK_SIZE).min(total_items).max(1)
}

/// Get available system memory in MB
#[cfg(target_os = "linux")]
fn get_available_memory_mb() -> Option<usize> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    meminfo
        .lines()
        .find(|line| line.starts_with("MemAvailable:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<usize>().ok())
        .map(|kb| kb / 1024)
}

#[cfg(not(target_os = "linux"))]
fn get_available_memory_mb() -> Option<usize> {
    Some(DEFAULT_MEMORY_LIMIT_MB)
}

/// Process items in chunks for memory-controlled parallel execution
///
/// Each chunk runs in parallel; chunks run one after another to cap peak
/// memory. Results are returned in input order.
pub fn process_in_chunks<T, R, F, P>(
    items: &[T],
    chunk_size: usize,
    processor: F,
    progress: Option<&P>,
) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
    P: Fn(usize, usize) + Sync,
{
    let total = items.len();
    if total == 0 {
        return vec![];
    }

    let effective_chunk_size = if chunk_size == 0 { total } else { chunk_size };
    let completed = AtomicUsize::new(0);
    let mut results: Vec<R> = Vec::with_capacity(total);

    for (chunk_index, chunk) in items.chunks(effective_chunk_size).enumerate() {
        let offset = chunk_index * effective_chunk_size;
        // par_iter().enumerate().map().collect() keeps chunk order
        let chunk_results: Vec<R> = chunk
            .par_iter()
            .enumerate()
            .map(|(i, item)| {
                let result = processor(offset + i, item);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(cb) = progress {
                    cb(done, total);
                }
                result
            })
            .collect();
        results.extend(chunk_results);
    }

    results
}

// ============================================================
// Progress
// ============================================================

/// Progress callback for batch steps
pub trait ProgressCallback: Send + Sync {
    /// Called when a new step starts
    fn on_step_start(&self, step: &str);
    /// Called to report progress within a step
    fn on_step_progress(&self, current: usize, total: usize);
    /// Called when a step completes
    fn on_step_complete(&self, step: &str, message: &str);
    /// Called for debug/verbose messages
    fn on_debug(&self, message: &str);
}

/// No-op progress callback (silent mode)
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_step_start(&self, _step: &str) {}
    fn on_step_progress(&self, _current: usize, _total: usize) {}
    fn on_step_complete(&self, _step: &str, _message: &str) {}
    fn on_debug(&self, _message: &str) {}
}

// ============================================================
// Configuration
// ============================================================

/// Pipeline processing error
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Content detection settings
    pub detection: DetectionOptions,
    /// Canvas settings
    pub normalize: NormalizeOptions,
    /// SSIM parameters
    pub ssim: SsimOptions,
    /// Conformity threshold (0-100)
    pub threshold: f64,
    /// Compute scores at all
    pub similarity_enabled: bool,
    /// Auto-approve eligible single-page pairs after a batch
    pub auto_approve: bool,
    /// Render scale relative to 72 DPI
    pub render_scale: f32,
    /// Per-file render timeout in seconds
    pub render_timeout_secs: u64,
    /// Thread count (None = auto)
    pub threads: Option<usize>,
    /// Maximum memory usage in MB (0 = detect)
    #[serde(default)]
    pub max_memory_mb: usize,
    /// Pairs per chunk (0 = auto based on memory)
    #[serde(default)]
    pub chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection: DetectionOptions::default(),
            normalize: NormalizeOptions::default(),
            ssim: SsimOptions::default(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            similarity_enabled: true,
            auto_approve: true,
            render_scale: DEFAULT_RENDER_SCALE,
            render_timeout_secs: 60,
            threads: None,
            max_memory_mb: 0,
            chunk_size: 0,
        }
    }
}

impl PipelineConfig {
    /// Convert to JSON string for diagnostics
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Set similarity threshold (clamped to 0-100)
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 100.0);
        self
    }

    /// Enable/disable automatic content detection
    #[must_use]
    pub fn with_auto_crop(mut self, enabled: bool) -> Self {
        self.detection.auto_crop = enabled;
        self
    }

    /// Enable/disable scoring
    #[must_use]
    pub fn with_similarity(mut self, enabled: bool) -> Self {
        self.similarity_enabled = enabled;
        self
    }

    /// Enable/disable post-batch auto-approve
    #[must_use]
    pub fn with_auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = enabled;
        self
    }

    /// Set thread count
    #[must_use]
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads.map(|t| t.max(1));
        self
    }

    /// Set render scale (clamped to 0.25-8.0)
    #[must_use]
    pub fn with_render_scale(mut self, scale: f32) -> Self {
        self.render_scale = scale.clamp(0.25, 8.0);
        self
    }

    /// Set canvas size (each side clamped to 1-8192)
    #[must_use]
    pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
        self.normalize.target_width = width.clamp(1, MAX_TARGET_SIDE);
        self.normalize.target_height = height.clamp(1, MAX_TARGET_SIDE);
        self
    }

    /// Options handed to the renderer
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions::builder()
            .scale(self.render_scale)
            .timeout(Duration::from_secs(self.render_timeout_secs))
            .build()
    }

    /// Effective worker count
    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

// ============================================================
// Reports
// ============================================================

/// What happened to one side of a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SideOutcome {
    /// The pair has no file on this side
    Missing,
    Loaded { width: u32, height: u32 },
    /// The document has fewer pages than requested
    PageOutOfRange { total_pages: usize },
    Failed { error: String },
}

impl SideOutcome {
    /// Short status for reports
    pub fn describe(&self, side: Side, page: usize) -> String {
        match self {
            SideOutcome::Missing => format!("{side} file missing"),
            SideOutcome::Loaded { width, height } => format!("{side} loaded ({width}x{height})"),
            SideOutcome::PageOutOfRange { .. } => format!("{side} has no page {}", page + 1),
            SideOutcome::Failed { error } => format!("Could not load {side}: {error}"),
        }
    }
}

/// Result of comparing one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub page: usize,
    pub original: SideOutcome,
    pub printer: SideOutcome,
    /// Page counts as reported by the renderer (0 = unknown or missing)
    pub original_pages: usize,
    pub printer_pages: usize,
    pub comparison: Comparison,
}

impl PageReport {
    /// Pages in the pair: max of both sides, at least 1
    pub fn total_pages(&self) -> usize {
        self.original_pages.max(self.printer_pages).max(1)
    }
}

/// Result of processing every page of one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    /// Position in the resolved pair list
    pub index: usize,
    pub code: String,
    pub file_name: String,
    pub match_kind: MatchKind,
    pub total_pages: usize,
    /// One report per page for matched pairs; page 0 only otherwise
    pub pages: Vec<PageReport>,
}

impl PairReport {
    /// Page 0 score, used for auto-approve and export
    pub fn first_score(&self) -> Option<f64> {
        self.pages.first().and_then(|p| p.comparison.score())
    }

    pub fn first_comparison(&self) -> Option<&Comparison> {
        self.pages.first().map(|p| &p.comparison)
    }

    pub fn auto_approve_candidate(&self) -> AutoApproveCandidate {
        AutoApproveCandidate {
            pair: self.index,
            total_pages: self.total_pages,
            score: self.first_score(),
        }
    }

    /// Report for a pair whose processing aborted
    fn aborted(index: usize, pair: &Pair, error: String) -> Self {
        Self {
            index,
            code: pair.code().to_string(),
            file_name: pair.display_name(),
            match_kind: pair.match_kind(),
            total_pages: 1,
            pages: vec![PageReport {
                page: 0,
                original: SideOutcome::Failed {
                    error: error.clone(),
                },
                printer: SideOutcome::Failed {
                    error: error.clone(),
                },
                original_pages: 0,
                printer_pages: 0,
                comparison: Comparison::Failed { error },
            }],
        }
    }
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub pairs: Vec<PairReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Auto-approve eligible pairs into `ledger`; returns the count
    pub fn auto_approve(&self, ledger: &mut ValidationLedger, threshold: f64) -> usize {
        ledger.auto_approve_all(
            self.pairs.iter().map(PairReport::auto_approve_candidate),
            threshold,
        )
    }

    /// One line per page of a matched pair that could not be scored
    pub fn unscored_notes(&self) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|pair| pair.match_kind == MatchKind::Both)
            .flat_map(|pair| {
                pair.pages.iter().filter_map(move |page| match &page.comparison {
                    Comparison::Undefined { reason } => {
                        Some(format!("{} page {}: {}", pair.code, page.page + 1, reason))
                    }
                    Comparison::Failed { error } => {
                        Some(format!("{} page {}: {}", pair.code, page.page + 1, error))
                    }
                    _ => None,
                })
            })
            .collect()
    }

    /// Pages that received a score
    pub fn scored_pages(&self) -> usize {
        self.pages().filter(|p| p.comparison.score().is_some()).count()
    }

    /// Pages whose score met the threshold
    pub fn conformant_pages(&self) -> usize {
        self.pages().filter(|p| p.comparison.is_conformant()).count()
    }

    /// Pages where scoring failed
    pub fn failed_pages(&self) -> usize {
        self.pages()
            .filter(|p| matches!(p.comparison, Comparison::Failed { .. }))
            .count()
    }

    fn pages(&self) -> impl Iterator<Item = &PageReport> {
        self.pairs.iter().flat_map(|p| p.pages.iter())
    }
}

// ============================================================
// Pipeline
// ============================================================

/// One side after rendering
struct SideRender {
    outcome: SideOutcome,
    image: Option<DynamicImage>,
    total_pages: usize,
}

/// Detection, normalization and scoring over a rendering collaborator
pub struct ComparisonPipeline {
    config: PipelineConfig,
    renderer: Arc<dyn PageRenderer>,
    detector: RegionDetector,
    scorer: SimilarityScorer,
}

impl ComparisonPipeline {
    /// Pipeline with the default PDF/raster renderer
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_renderer(config, Arc::new(DocumentRenderer::default()))
    }

    pub fn with_renderer(config: PipelineConfig, renderer: Arc<dyn PageRenderer>) -> Self {
        let detector = RegionDetector::new(config.detection.clone());
        let scorer = SimilarityScorer::new(config.ssim.clone());
        Self {
            config,
            renderer,
            detector,
            scorer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn detector(&self) -> &RegionDetector {
        &self.detector
    }

    /// Compare two decoded pages
    pub fn compare_images(
        &self,
        original: &DynamicImage,
        printer: &DynamicImage,
        overrides: PageOverrides,
    ) -> Comparison {
        if !self.config.similarity_enabled {
            return Comparison::Disabled;
        }

        let (det_original, det_printer) = rayon::join(
            || self.detector.resolve(original, overrides.original),
            || self.detector.resolve(printer, overrides.printer),
        );
        debug!(
            original = %det_original.method,
            printer = %det_printer.method,
            "regions resolved"
        );

        self.score_regions(original, printer, det_original, det_printer)
    }

    fn score_regions(
        &self,
        original: &DynamicImage,
        printer: &DynamicImage,
        det_original: DetectionResult,
        det_printer: DetectionResult,
    ) -> Comparison {
        let options = &self.config.normalize;
        let normalized = Normalizer::normalize(original, &det_original.region, options)
            .and_then(|a| Ok((a, Normalizer::normalize(printer, &det_printer.region, options)?)));
        let (norm_original, norm_printer) = match normalized {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "normalization failed");
                return Comparison::Failed {
                    error: e.to_string(),
                };
            }
        };

        match self
            .scorer
            .score(&norm_original.to_gray(), &norm_printer.to_gray())
        {
            Ok(score) => Comparison::Scored(SimilarityResult::new(
                score,
                det_original,
                det_printer,
                self.config.threshold,
            )),
            Err(e) => {
                warn!(error = %e, "scoring failed");
                Comparison::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Render and compare one page of a pair
    pub fn compare_page(&self, pair: &Pair, page: usize, overrides: PageOverrides) -> PageReport {
        let (original, printer) = rayon::join(
            || self.render_side(pair.original(), page),
            || self.render_side(pair.printer(), page),
        );

        let comparison = match (&original.image, &printer.image) {
            (Some(a), Some(b)) => self.compare_images(a, b, overrides),
            _ => {
                let reason = [
                    (Side::Original, &original.outcome),
                    (Side::Printer, &printer.outcome),
                ]
                .iter()
                .filter(|(_, outcome)| !matches!(outcome, SideOutcome::Loaded { .. }))
                .map(|(side, outcome)| outcome.describe(*side, page))
                .collect::<Vec<_>>()
                .join("; ");
                Comparison::Undefined { reason }
            }
        };

        PageReport {
            page,
            original: original.outcome,
            printer: printer.outcome,
            original_pages: original.total_pages,
            printer_pages: printer.total_pages,
            comparison,
        }
    }

    fn render_side(&self, doc: Option<&DocumentFile>, page: usize) -> SideRender {
        let Some(doc) = doc else {
            return SideRender {
                outcome: SideOutcome::Missing,
                image: None,
                total_pages: 0,
            };
        };

        let rendered = self
            .renderer
            .render(&doc.path, page, &self.config.render_options());
        let total_pages = rendered.total_pages;

        match rendered.image {
            Ok(img) if rendered.page_index == page => SideRender {
                outcome: SideOutcome::Loaded {
                    width: img.width(),
                    height: img.height(),
                },
                image: Some(img),
                total_pages,
            },
            Ok(_) => SideRender {
                outcome: SideOutcome::PageOutOfRange { total_pages },
                image: None,
                total_pages,
            },
            Err(e) => SideRender {
                outcome: SideOutcome::Failed {
                    error: e.to_string(),
                },
                image: None,
                total_pages,
            },
        }
    }

    /// Process every page of a pair
    pub fn process_pair(&self, index: usize, pair: &Pair) -> PairReport {
        let first = self.compare_page(pair, 0, PageOverrides::default());
        let total_pages = first.total_pages();

        let mut pages = Vec::with_capacity(total_pages);
        pages.push(first);
        if pair.is_matched() {
            for page in 1..total_pages {
                pages.push(self.compare_page(pair, page, PageOverrides::default()));
            }
        }

        PairReport {
            index,
            code: pair.code().to_string(),
            file_name: pair.display_name(),
            match_kind: pair.match_kind(),
            total_pages,
            pages,
        }
    }

    /// Process all pairs on a bounded pool
    pub fn run_batch<P: ProgressCallback>(
        &self,
        pairs: &[Pair],
        progress: &P,
    ) -> Result<BatchReport, PipelineError> {
        let start = Instant::now();
        let threads = self.config.effective_threads();
        let chunk_size = if self.config.chunk_size == 0 {
            calculate_optimal_chunk_size(pairs.len(), self.config.max_memory_mb, threads)
        } else {
            self.config.chunk_size
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        info!(pairs = pairs.len(), threads, chunk_size, "batch started");
        progress.on_step_start(&format!("Comparing {} pairs...", pairs.len()));

        let report_progress = |current: usize, total: usize| progress.on_step_progress(current, total);
        let reports = pool.install(|| {
            process_in_chunks(
                pairs,
                chunk_size,
                |index, pair| self.process_pair_isolated(index, pair),
                Some(&report_progress),
            )
        });

        let report = BatchReport {
            pairs: reports,
            elapsed: start.elapsed(),
        };
        for note in report.unscored_notes() {
            progress.on_debug(&note);
        }
        let summary = format!(
            "{} pages scored, {} conformant, {} failed",
            report.scored_pages(),
            report.conformant_pages(),
            report.failed_pages()
        );
        info!(elapsed_ms = report.elapsed.as_millis() as u64, "{summary}");
        progress.on_step_complete("Comparing pairs", &summary);

        Ok(report)
    }

    fn process_pair_isolated(&self, index: usize, pair: &Pair) -> PairReport {
        match catch_unwind(AssertUnwindSafe(|| self.process_pair(index, pair))) {
            Ok(report) => report,
            Err(_) => {
                warn!(pair = index, code = pair.code(), "pair processing panicked");
                PairReport::aborted(index, pair, "internal error while processing pair".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ContentRegion, DetectionMethod};
    use crate::render::{RenderError, RenderedPage};
    use image::{GrayImage, Luma};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    /// In-memory renderer: path -> pages
    struct FakeRenderer {
        docs: HashMap<PathBuf, Vec<DynamicImage>>,
    }

    impl PageRenderer for FakeRenderer {
        fn render(&self, path: &Path, page_index: usize, _options: &RenderOptions) -> RenderedPage {
            match self.docs.get(path) {
                Some(pages) => {
                    let index = if page_index < pages.len() { page_index } else { 0 };
                    RenderedPage {
                        image: Ok(pages[index].clone()),
                        page_index: index,
                        total_pages: pages.len(),
                    }
                }
                None => RenderedPage {
                    image: Err(RenderError::FileNotFound(path.to_path_buf())),
                    page_index: 0,
                    total_pages: 0,
                },
            }
        }
    }

    fn block_page(offset: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(400, 400, |x, y| {
            if (100 + offset..300).contains(&x) && (100..300).contains(&y) {
                Luma([0])
            } else {
                Luma([255])
            }
        }))
    }

    fn pipeline(docs: Vec<(&str, Vec<DynamicImage>)>, config: PipelineConfig) -> ComparisonPipeline {
        let docs = docs
            .into_iter()
            .map(|(p, pages)| (PathBuf::from(p), pages))
            .collect();
        ComparisonPipeline::with_renderer(config, Arc::new(FakeRenderer { docs }))
    }

    fn both(original: &str, printer: &str) -> Pair {
        Pair::both(DocumentFile::new(original), DocumentFile::new(printer))
    }

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.threshold, 85.0);
        assert!(config.similarity_enabled);
        assert!(config.auto_approve);
        assert!(config.detection.auto_crop);
        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.normalize.target_width, 800);
    }

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::default()
            .with_threshold(150.0)
            .with_auto_crop(false)
            .with_similarity(false)
            .with_auto_approve(false)
            .with_threads(Some(0))
            .with_render_scale(1.0)
            .with_canvas(400, 300);

        assert_eq!(config.threshold, 100.0);
        assert!(!config.detection.auto_crop);
        assert!(!config.similarity_enabled);
        assert!(!config.auto_approve);
        assert_eq!(config.threads, Some(1));
        assert_eq!(config.effective_threads(), 1);
        assert_eq!(config.render_options().dpi(), 72);
        assert_eq!(
            (config.normalize.target_width, config.normalize.target_height),
            (400, 300)
        );
    }

    #[test]
    fn test_pipeline_config_to_json() {
        let json = PipelineConfig::default().to_json();
        assert!(json.contains("\"threshold\": 85.0"));
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PipelineConfig::default());
    }

    #[test]
    fn test_compare_identical_pages() {
        let p = pipeline(vec![], PipelineConfig::default());
        let page = block_page(0);
        let comparison = p.compare_images(&page, &page, PageOverrides::default());

        let result = comparison.result().unwrap();
        assert_eq!(result.score, 100.0);
        assert!(result.conformant);
        assert_eq!(result.original.method, DetectionMethod::Threshold);
    }

    #[test]
    fn test_compare_different_pages() {
        let p = pipeline(vec![], PipelineConfig::default());
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(400, 400, Luma([255])));
        let comparison = p.compare_images(&block_page(0), &white, PageOverrides::default());
        let result = comparison.result().unwrap();
        assert!(result.score < 85.0);
        assert!(!result.conformant);
        assert_eq!(result.printer.method, DetectionMethod::Full);
        assert!(result.needs_review());
    }

    #[test]
    fn test_manual_override_one_side() {
        let p = pipeline(vec![], PipelineConfig::default());
        let page = block_page(0);
        let overrides = PageOverrides {
            original: Some(ContentRegion::new(50, 50, 350, 350).unwrap()),
            printer: None,
        };
        let result = p.compare_images(&page, &page, overrides).result().cloned().unwrap();

        assert_eq!(result.original.method, DetectionMethod::Manual);
        assert_eq!(result.original.confidence, 1.0);
        assert_eq!(result.printer.method, DetectionMethod::Threshold);
    }

    #[test]
    fn test_similarity_disabled() {
        let p = pipeline(vec![], PipelineConfig::default().with_similarity(false));
        let page = block_page(0);
        assert_eq!(
            p.compare_images(&page, &page, PageOverrides::default()),
            Comparison::Disabled
        );
    }

    #[test]
    fn test_compare_page_missing_side_is_undefined() {
        let p = pipeline(vec![("o/ABCDEFGH.png", vec![block_page(0)])], PipelineConfig::default());
        let pair = Pair::original_only(DocumentFile::new("o/ABCDEFGH.png"));
        let report = p.compare_page(&pair, 0, PageOverrides::default());

        assert_eq!(report.printer, SideOutcome::Missing);
        assert!(matches!(report.original, SideOutcome::Loaded { .. }));
        match report.comparison {
            Comparison::Undefined { reason } => assert_eq!(reason, "Printer file missing"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_compare_page_render_failure_is_undefined() {
        let p = pipeline(vec![("o/ABCDEFGH.png", vec![block_page(0)])], PipelineConfig::default());
        let report = p.compare_page(&both("o/ABCDEFGH.png", "p/ABCDEFGH.png"), 0, PageOverrides::default());

        assert!(matches!(report.printer, SideOutcome::Failed { .. }));
        assert_eq!(report.comparison.score(), None);
        assert_eq!(report.comparison.display_score(), "N/A");
    }

    #[test]
    fn test_compare_page_out_of_range_side() {
        let p = pipeline(
            vec![
                ("o/ABCDEFGH.pdf", vec![block_page(0), block_page(0)]),
                ("p/ABCDEFGH.pdf", vec![block_page(0)]),
            ],
            PipelineConfig::default(),
        );
        let report = p.compare_page(&both("o/ABCDEFGH.pdf", "p/ABCDEFGH.pdf"), 1, PageOverrides::default());

        assert_eq!(report.printer, SideOutcome::PageOutOfRange { total_pages: 1 });
        assert_eq!(report.total_pages(), 2);
        assert!(matches!(report.comparison, Comparison::Undefined { .. }));
    }

    #[test]
    fn test_process_pair_all_pages() {
        let p = pipeline(
            vec![
                ("o/ABCDEFGH.pdf", vec![block_page(0), block_page(0), block_page(0)]),
                ("p/ABCDEFGH.pdf", vec![block_page(0), block_page(0), block_page(40)]),
            ],
            PipelineConfig::default(),
        );
        let report = p.process_pair(3, &both("o/ABCDEFGH.pdf", "p/ABCDEFGH.pdf"));

        assert_eq!(report.index, 3);
        assert_eq!(report.total_pages, 3);
        assert_eq!(report.pages.len(), 3);
        assert_eq!(report.first_score(), Some(100.0));
        assert!(report.pages[2].comparison.score().unwrap() < 100.0);
    }

    #[test]
    fn test_process_unmatched_pair_first_page_only() {
        let p = pipeline(
            vec![("p/ABCDEFGH.pdf", vec![block_page(0), block_page(0)])],
            PipelineConfig::default(),
        );
        let report = p.process_pair(0, &Pair::printer_only(DocumentFile::new("p/ABCDEFGH.pdf")));

        assert_eq!(report.total_pages, 2);
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.first_score(), None);
    }

    #[test]
    fn test_run_batch_keeps_order_and_isolates_failures() {
        let p = pipeline(
            vec![
                ("o/AAAAAAAA.png", vec![block_page(0)]),
                ("p/AAAAAAAA.png", vec![block_page(0)]),
                ("o/CCCCCCCC.png", vec![block_page(0)]),
                ("p/CCCCCCCC.png", vec![block_page(60)]),
            ],
            PipelineConfig::default().with_threads(Some(2)),
        );
        let pairs = vec![
            both("o/AAAAAAAA.png", "p/AAAAAAAA.png"),
            both("o/BBBBBBBB.png", "p/BBBBBBBB.png"),
            both("o/CCCCCCCC.png", "p/CCCCCCCC.png"),
        ];

        let report = p.run_batch(&pairs, &SilentProgress).unwrap();
        let codes: Vec<&str> = report.pairs.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["AAAAAAAA", "BBBBBBBB", "CCCCCCCC"]);
        assert_eq!(report.pairs[0].first_score(), Some(100.0));
        assert_eq!(report.pairs[1].first_score(), None);
        assert!(report.pairs[2].first_score().is_some());
        assert_eq!(report.scored_pages(), 2);
    }

    /// Collects debug messages
    #[derive(Default)]
    struct RecordingProgress {
        messages: std::sync::Mutex<Vec<String>>,
    }

    impl ProgressCallback for RecordingProgress {
        fn on_step_start(&self, _step: &str) {}
        fn on_step_progress(&self, _current: usize, _total: usize) {}
        fn on_step_complete(&self, _step: &str, _message: &str) {}
        fn on_debug(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_run_batch_reports_unscored_pages() {
        let p = pipeline(
            vec![
                ("o/AAAAAAAA.png", vec![block_page(0)]),
                ("p/AAAAAAAA.png", vec![block_page(0)]),
            ],
            PipelineConfig::default(),
        );
        let pairs = vec![
            both("o/AAAAAAAA.png", "p/AAAAAAAA.png"),
            both("o/BBBBBBBB.png", "p/BBBBBBBB.png"),
            Pair::original_only(DocumentFile::new("o/ZZZZZZZZ.png")),
        ];
        let progress = RecordingProgress::default();
        p.run_batch(&pairs, &progress).unwrap();

        let messages = progress.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("BBBBBBBB page 1: "));
    }

    #[test]
    fn test_batch_auto_approve() {
        let p = pipeline(
            vec![
                ("o/AAAAAAAA.png", vec![block_page(0)]),
                ("p/AAAAAAAA.png", vec![block_page(0)]),
            ],
            PipelineConfig::default(),
        );
        let pairs = vec![
            both("o/AAAAAAAA.png", "p/AAAAAAAA.png"),
            Pair::original_only(DocumentFile::new("o/ZZZZZZZZ.png")),
        ];
        let report = p.run_batch(&pairs, &SilentProgress).unwrap();

        let mut ledger = ValidationLedger::new();
        assert_eq!(report.auto_approve(&mut ledger, 85.0), 1);
        assert!(ledger.is_auto_approved(0));
        assert!(!ledger.is_auto_approved(1));
    }

    #[test]
    fn test_calculate_optimal_chunk_size_basic() {
        let chunk = calculate_optimal_chunk_size(100, 8192, 8);
        assert!((MIN_CHUNK_SIZE..=100).contains(&chunk));
    }

    #[test]
    fn test_calculate_optimal_chunk_size_small_batch() {
        assert_eq!(calculate_optimal_chunk_size(2, 8192, 8), 2);
    }

    #[test]
    fn test_calculate_optimal_chunk_size_zero_items() {
        assert_eq!(calculate_optimal_chunk_size(0, 8192, 8), 1);
    }

    #[test]
    fn test_process_in_chunks_empty() {
        let items: Vec<i32> = vec![];
        let results: Vec<i32> = process_in_chunks(&items, 4, |_, x| *x * 2, None::<&fn(usize, usize)>);
        assert!(results.is_empty());
    }

    #[test]
    fn test_process_in_chunks_maintains_order() {
        let items: Vec<i32> = (0..20).collect();
        let results: Vec<(usize, i32)> =
            process_in_chunks(&items, 4, |i, x| (i, *x * 2), None::<&fn(usize, usize)>);

        let expected: Vec<(usize, i32)> = (0..20).map(|x| (x as usize, x * 2)).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_process_in_chunks_with_progress() {
        let items: Vec<i32> = (0..10).collect();
        let progress_count = Arc::new(AtomicUsize::new(0));
        let progress_count_clone = progress_count.clone();

        let progress_fn = move |_current: usize, _total: usize| {
            progress_count_clone.fetch_add(1, Ordering::Relaxed);
        };

        let results: Vec<i32> = process_in_chunks(&items, 4, |_, x| *x * 2, Some(&progress_fn));

        assert_eq!(results.len(), 10);
        assert_eq!(progress_count.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_process_in_chunks_chunk_size_zero() {
        let items: Vec<i32> = (0..10).collect();
        let results: Vec<i32> = process_in_chunks(&items, 0, |_, x| *x + 1, None::<&fn(usize, usize)>);
        assert_eq!(results, (1..11).collect::<Vec<i32>>());
    }

    #[test]
    fn test_side_outcome_describe() {
        assert_eq!(SideOutcome::Missing.describe(Side::Original, 0), "Original file missing");
        assert_eq!(
            SideOutcome::PageOutOfRange { total_pages: 1 }.describe(Side::Printer, 2),
            "Printer has no page 3"
        );
        assert_eq!(
            SideOutcome::Failed {
                error: "timeout".into()
            }
            .describe(Side::Printer, 0),
            "Could not load Printer: timeout"
        );
    }
}
