//! proofmatch - content-aware conformity checks for printer proofs
//!
//! Compares each page of an original design document against the proof a
//! printer sent back, scoring how closely the printed content matches while
//! ignoring margins, bleed and scale differences.
//!
//! # Features
//!
//! - **Pairing** ([`pairing`], [`identifier`]) - Match originals and proofs by their 8-character code
//! - **Rendering** ([`render`]) - PDF pages via `ImageMagick`, raster files directly
//! - **Content Detection** ([`detect`]) - Threshold and edge based content regions with a validation gate
//! - **Normalization** ([`normalize`]) - Crop and fit both sides onto one canvas
//! - **Similarity** ([`similarity`]) - Windowed SSIM scored 0-100 against a threshold
//! - **Review** ([`session`], [`validation`]) - Page decisions, pair status, auto-approve
//! - **Export** ([`export`]) - CSV/JSON reports
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use proofmatch::{ComparisonPipeline, DocumentFile, PageOverrides, Pair, PipelineConfig};
//!
//! let pipeline = ComparisonPipeline::new(PipelineConfig::default().with_threshold(90.0));
//! let pair = Pair::both(
//!     DocumentFile::new("originals/AB12CD34_flyer.pdf"),
//!     DocumentFile::new("proofs/AB12CD34_proof.pdf"),
//! );
//!
//! let report = pipeline.compare_page(&pair, 0, PageOverrides::default());
//! println!("Similarity: {}", report.comparison.display_score());
//! ```
//!
//! ## Using Builder Patterns
//!
//! ```rust
//! use proofmatch::{DetectionOptions, NormalizeOptions, Resampler};
//!
//! let detection = DetectionOptions::builder()
//!     .intensity_threshold(240)
//!     .area_ratio_gate(0.2, 0.9)
//!     .build();
//!
//! let canvas = NormalizeOptions::builder()
//!     .target_width(1000)
//!     .target_height(1400)
//!     .resampler(Resampler::Bilinear)
//!     .build();
//! ```
//!
//! # Architecture
//!
//! ```text
//! Folders -> Pairing -> Render (both sides) -> Content Detection
//!                                                     |
//!                                  Normalize -> SSIM -> Validation -> Export
//! ```

pub mod cli;
pub mod config;
pub mod detect;
pub mod export;
pub mod identifier;
pub mod normalize;
pub mod overrides;
pub mod pairing;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod similarity;
pub mod util;
pub mod validation;

// Re-exports for convenience
pub use cli::{
    create_progress_bar, create_spinner, BarProgress, BatchArgs, Cli, Commands, CompareArgs,
    ExitCode, PairsArgs,
};
pub use config::{CliOverrides, Config, ConfigError};
pub use detect::{
    ContentDetector, ContentRegion, DetectionMethod, DetectionOptions, DetectionOptionsBuilder,
    DetectionResult, EdgeDetector, RegionDetector, RegionError, ThresholdDetector,
};
pub use export::{
    export_rows, rows_from_batch, rows_from_session, ExportError, ExportFormat, ExportRow,
};
pub use identifier::{extract_code, extract_code_from_path, CODE_LENGTH};
pub use normalize::{
    NormalizeError, NormalizeOptions, NormalizeOptionsBuilder, NormalizedImage, Normalizer,
    Resampler,
};
pub use overrides::{ManualOverrides, PageOverrides, Side};
pub use pairing::{
    discover_documents, DocumentFile, MatchKind, Pair, PairResolver, PairingError,
    DOCUMENT_EXTENSIONS,
};
pub use pipeline::{
    BatchReport, ComparisonPipeline, PageReport, PairReport, PipelineConfig, PipelineError,
    ProgressCallback, SideOutcome, SilentProgress,
};
pub use render::{
    DocumentRenderer, MagickRenderer, PageRenderer, RasterRenderer, RenderError, RenderOptions,
    RenderOptionsBuilder, RenderedPage,
};
pub use session::{ComparisonRequest, ContextKey, ReviewSession};
pub use similarity::{
    ssim, Comparison, SimilarityError, SimilarityResult, SimilarityScorer, SsimOptions,
};
pub use validation::{
    AutoApproveCandidate, PageKey, PageValidation, PairStatus, ValidationLedger, ValidationStatus,
};
