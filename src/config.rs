//! Configuration file support for proofmatch
//!
//! Supports TOML configuration files with the following search order:
//! 1. `--config <path>` - explicitly specified path
//! 2. `./proofmatch.toml` - current directory
//! 3. `~/.config/proofmatch/config.toml` - user config
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [detection]
//! auto_crop = true
//! intensity_threshold = 250
//!
//! [similarity]
//! threshold = 90.0
//!
//! [normalize]
//! width = 1000
//! height = 1000
//!
//! [batch]
//! threads = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::detect::DetectionOptions;
use crate::normalize::Resampler;
use crate::pipeline::PipelineConfig;

/// File name looked up in the current directory
pub const LOCAL_CONFIG_FILE: &str = "proofmatch.toml";

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Content detection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    /// Run automatic detection
    #[serde(default)]
    pub auto_crop: Option<bool>,

    /// Content intensity threshold (0-255)
    #[serde(default)]
    pub intensity_threshold: Option<u8>,

    /// Minimum content fraction per row/column
    #[serde(default)]
    pub min_content_ratio: Option<f64>,

    /// Threshold-method padding fraction
    #[serde(default)]
    pub threshold_padding: Option<f64>,

    /// Edge detector Gaussian sigma
    #[serde(default)]
    pub edge_sigma: Option<f32>,

    /// Canny low threshold (0-1)
    #[serde(default)]
    pub edge_low: Option<f32>,

    /// Canny high threshold (0-1)
    #[serde(default)]
    pub edge_high: Option<f32>,

    /// Edge-method padding fraction
    #[serde(default)]
    pub edge_padding: Option<f64>,

    /// Minimum edge pixel count
    #[serde(default)]
    pub min_edge_pixels: Option<usize>,

    /// Lower area ratio gate
    #[serde(default)]
    pub min_area_ratio: Option<f64>,

    /// Upper area ratio gate
    #[serde(default)]
    pub max_area_ratio: Option<f64>,
}

/// Similarity settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimilarityConfig {
    /// Compute scores at all
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Conformity threshold (0-100)
    #[serde(default)]
    pub threshold: Option<f64>,

    /// SSIM window side
    #[serde(default)]
    pub window_size: Option<usize>,
}

/// Canvas settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NormalizeConfig {
    /// Canvas width in pixels
    #[serde(default)]
    pub width: Option<u32>,

    /// Canvas height in pixels
    #[serde(default)]
    pub height: Option<u32>,

    /// Resampling filter
    #[serde(default)]
    pub resampler: Option<Resampler>,

    /// Allow enlarging small regions
    #[serde(default)]
    pub upscale: Option<bool>,
}

/// Rendering settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RenderConfig {
    /// Scale relative to 72 DPI
    #[serde(default)]
    pub scale: Option<f32>,

    /// Per-file timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Batch settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    /// Number of worker threads
    #[serde(default)]
    pub threads: Option<usize>,

    /// Auto-approve eligible pairs after scoring
    #[serde(default)]
    pub auto_approve: Option<bool>,

    /// Memory budget in MB
    #[serde(default)]
    pub max_memory_mb: Option<usize>,

    /// Pairs per chunk
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default search path
    ///
    /// Returns the defaults when no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::search_paths() {
            if path.exists() {
                tracing::debug!("Loading config from {}", path.display());
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Convert to PipelineConfig
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig {
            detection: self.detection_options(),
            ..PipelineConfig::default()
        };

        // Similarity
        if let Some(enabled) = self.similarity.enabled {
            config = config.with_similarity(enabled);
        }
        if let Some(threshold) = self.similarity.threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(window) = self.similarity.window_size {
            config.ssim.window_size = window;
        }

        // Canvas
        let width = self.normalize.width.unwrap_or(config.normalize.target_width);
        let height = self.normalize.height.unwrap_or(config.normalize.target_height);
        config = config.with_canvas(width, height);
        if let Some(resampler) = self.normalize.resampler {
            config.normalize.resampler = resampler;
        }
        if let Some(upscale) = self.normalize.upscale {
            config.normalize.upscale = upscale;
        }

        // Rendering
        if let Some(scale) = self.render.scale {
            config = config.with_render_scale(scale);
        }
        if let Some(timeout) = self.render.timeout_secs {
            config.render_timeout_secs = timeout.max(1);
        }

        // Batch
        if let Some(threads) = self.batch.threads {
            config = config.with_threads(Some(threads));
        }
        if let Some(auto_approve) = self.batch.auto_approve {
            config = config.with_auto_approve(auto_approve);
        }
        if let Some(mb) = self.batch.max_memory_mb {
            config.max_memory_mb = mb;
        }
        if let Some(chunk) = self.batch.chunk_size {
            config.chunk_size = chunk;
        }

        config
    }

    fn detection_options(&self) -> DetectionOptions {
        let d = &self.detection;
        let defaults = DetectionOptions::default();
        let mut builder = DetectionOptions::builder();

        if let Some(enabled) = d.auto_crop {
            builder = builder.auto_crop(enabled);
        }
        if let Some(threshold) = d.intensity_threshold {
            builder = builder.intensity_threshold(threshold);
        }
        if let Some(ratio) = d.min_content_ratio {
            builder = builder.min_content_ratio(ratio);
        }
        if let Some(padding) = d.threshold_padding {
            builder = builder.threshold_padding(padding);
        }
        if let Some(sigma) = d.edge_sigma {
            builder = builder.edge_sigma(sigma);
        }
        if d.edge_low.is_some() || d.edge_high.is_some() {
            builder = builder.edge_thresholds(
                d.edge_low.unwrap_or(defaults.edge_low),
                d.edge_high.unwrap_or(defaults.edge_high),
            );
        }
        if let Some(padding) = d.edge_padding {
            builder = builder.edge_padding(padding);
        }
        if let Some(count) = d.min_edge_pixels {
            builder = builder.min_edge_pixels(count);
        }
        if d.min_area_ratio.is_some() || d.max_area_ratio.is_some() {
            builder = builder.area_ratio_gate(
                d.min_area_ratio.unwrap_or(defaults.min_area_ratio),
                d.max_area_ratio.unwrap_or(defaults.max_area_ratio),
            );
        }

        builder.build()
    }

    /// Merge with CLI arguments (CLI takes precedence)
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> PipelineConfig {
        let mut config = self.to_pipeline_config();

        if let Some(threshold) = cli.threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(auto_crop) = cli.auto_crop {
            config = config.with_auto_crop(auto_crop);
        }
        if let Some(similarity) = cli.similarity {
            config = config.with_similarity(similarity);
        }
        if let Some(auto_approve) = cli.auto_approve {
            config = config.with_auto_approve(auto_approve);
        }
        if let Some(threads) = cli.threads {
            config = config.with_threads(Some(threads));
        }
        if let Some(scale) = cli.render_scale {
            config = config.with_render_scale(scale);
        }
        if let Some((width, height)) = cli.canvas {
            config = config.with_canvas(width, height);
        }

        config
    }

    /// Get config file search paths
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("proofmatch").join("config.toml"));
        }

        paths
    }
}

/// CLI override values for merging with config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub threshold: Option<f64>,
    pub auto_crop: Option<bool>,
    pub similarity: Option<bool>,
    pub auto_approve: Option<bool>,
    pub threads: Option<usize>,
    pub render_scale: Option<f32>,
    pub canvas: Option<(u32, u32)>,
}

impl CliOverrides {
    /// Create new empty overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Set threshold override
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Set auto-crop override
    pub fn with_auto_crop(mut self, auto_crop: bool) -> Self {
        self.auto_crop = Some(auto_crop);
        self
    }

    /// Set auto-approve override
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = Some(auto_approve);
        self
    }

    /// Set thread count override
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}
