//! Content detection core types
//!
//! Regions, detection results and the tunables shared by every detector.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Grayscale intensity below which a pixel counts as content
pub const DEFAULT_INTENSITY_THRESHOLD: u8 = 250;

/// Minimum fraction of content pixels for a row/column to qualify
pub const DEFAULT_MIN_CONTENT_RATIO: f64 = 0.05;

/// Threshold-method padding, as a fraction of height/width
pub const DEFAULT_THRESHOLD_PADDING: f64 = 0.02;

/// Gaussian sigma of the edge detector
pub const DEFAULT_EDGE_SIGMA: f32 = 2.0;

/// Canny hysteresis thresholds on a [0, 1] intensity scale
pub const DEFAULT_EDGE_LOW: f32 = 0.1;
pub const DEFAULT_EDGE_HIGH: f32 = 0.3;

/// Dilation passes applied to the edge mask
pub const DEFAULT_DILATE_ITERATIONS: u8 = 3;

/// Minimum number of edge pixels for a usable region
pub const DEFAULT_MIN_EDGE_PIXELS: usize = 100;

/// Edge-method padding, as a fraction of min(height, width)
pub const DEFAULT_EDGE_PADDING: f64 = 0.05;

/// Area ratio gate (exclusive bounds)
pub const DEFAULT_MIN_AREA_RATIO: f64 = 0.15;
pub const DEFAULT_MAX_AREA_RATIO: f64 = 0.95;

/// Minimum region side length in pixels
pub const DEFAULT_MIN_REGION_SIZE: u32 = 100;

/// Fixed confidences per method
pub const CONFIDENCE_THRESHOLD: f64 = 0.9;
pub const CONFIDENCE_EDGE: f64 = 0.7;
pub const CONFIDENCE_MANUAL: f64 = 1.0;
pub const CONFIDENCE_DISABLED: f64 = 1.0;
pub const CONFIDENCE_FULL: f64 = 0.5;

// ============================================================
// Error Types
// ============================================================

/// Region construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("Empty region: ({left}, {top}) - ({right}, {bottom})")]
    Empty {
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
    },

    #[error("Region ({left}, {top}) - ({right}, {bottom}) exceeds image {width}x{height}")]
    OutOfBounds {
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
        width: u32,
        height: u32,
    },

    #[error("Invalid region syntax: {0}")]
    Parse(String),
}

// ============================================================
// Region
// ============================================================

/// Rectangle of page content in source pixel coordinates.
///
/// Bounds are half-open: `right` and `bottom` are exclusive, so a region
/// always has `left < right` and `top < bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRegion {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl ContentRegion {
    /// Create a region with positive area
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Result<Self, RegionError> {
        if left >= right || top >= bottom {
            return Err(RegionError::Empty {
                left,
                top,
                right,
                bottom,
            });
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Create a region and check it against image dimensions
    pub fn within(
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, RegionError> {
        let region = Self::new(left, top, right, bottom)?;
        if !region.fits(width, height) {
            return Err(RegionError::OutOfBounds {
                left,
                top,
                right,
                bottom,
                width,
                height,
            });
        }
        Ok(region)
    }

    /// The whole image. Zero-sized dimensions are treated as 1.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width.max(1),
            bottom: height.max(1),
        }
    }

    pub fn left(&self) -> u32 {
        self.left
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn right(&self) -> u32 {
        self.right
    }

    pub fn bottom(&self) -> u32 {
        self.bottom
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Fraction of the image covered by this region
    pub fn area_ratio(&self, width: u32, height: u32) -> f64 {
        let image_area = width as u64 * height as u64;
        if image_area == 0 {
            return 0.0;
        }
        self.area() as f64 / image_area as f64
    }

    /// Whether the region lies inside a `width` x `height` image
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.right <= width && self.bottom <= height
    }

    /// Bounds as `[left, top, right, bottom]`
    pub fn to_array(&self) -> [u32; 4] {
        [self.left, self.top, self.right, self.bottom]
    }
}

impl std::fmt::Display for ContentRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.top, self.right, self.bottom)
    }
}

impl std::str::FromStr for ContentRegion {
    type Err = RegionError;

    /// Parse `L,T,R,B`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| RegionError::Parse(format!("{s}: {e}")))?;

        match parts.as_slice() {
            [l, t, r, b] => Self::new(*l, *t, *r, *b),
            _ => Err(RegionError::Parse(format!(
                "{s}: expected four values LEFT,TOP,RIGHT,BOTTOM"
            ))),
        }
    }
}

// ============================================================
// Detection Result
// ============================================================

/// How a region was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Threshold,
    Edge,
    Manual,
    Disabled,
    Full,
}

impl DetectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::Threshold => "threshold",
            DetectionMethod::Edge => "edge",
            DetectionMethod::Manual => "manual",
            DetectionMethod::Disabled => "disabled",
            DetectionMethod::Full => "full",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Region plus the evidence behind it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub region: ContentRegion,
    pub confidence: f64,
    pub method: DetectionMethod,
}

impl DetectionResult {
    /// Whole image because auto-crop is off
    pub fn disabled(width: u32, height: u32) -> Self {
        Self {
            region: ContentRegion::full(width, height),
            confidence: CONFIDENCE_DISABLED,
            method: DetectionMethod::Disabled,
        }
    }

    /// Whole image because no detector produced a usable region
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            region: ContentRegion::full(width, height),
            confidence: CONFIDENCE_FULL,
            method: DetectionMethod::Full,
        }
    }

    /// Human-supplied region
    pub fn manual(region: ContentRegion) -> Self {
        Self {
            region,
            confidence: CONFIDENCE_MANUAL,
            method: DetectionMethod::Manual,
        }
    }
}

// ============================================================
// Options
// ============================================================

/// Content detection options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOptions {
    /// Run automatic detection at all
    pub auto_crop: bool,
    /// Content intensity threshold (0-255)
    pub intensity_threshold: u8,
    /// Minimum content fraction per row/column
    pub min_content_ratio: f64,
    /// Threshold-method padding fraction
    pub threshold_padding: f64,
    /// Edge detector Gaussian sigma
    pub edge_sigma: f32,
    /// Canny low threshold (0-1)
    pub edge_low: f32,
    /// Canny high threshold (0-1)
    pub edge_high: f32,
    /// Dilation passes
    pub dilate_iterations: u8,
    /// Minimum edge pixel count
    pub min_edge_pixels: usize,
    /// Edge-method padding fraction
    pub edge_padding: f64,
    /// Lower area ratio gate (exclusive)
    pub min_area_ratio: f64,
    /// Upper area ratio gate (exclusive)
    pub max_area_ratio: f64,
    /// Minimum region width and height
    pub min_region_size: u32,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            auto_crop: true,
            intensity_threshold: DEFAULT_INTENSITY_THRESHOLD,
            min_content_ratio: DEFAULT_MIN_CONTENT_RATIO,
            threshold_padding: DEFAULT_THRESHOLD_PADDING,
            edge_sigma: DEFAULT_EDGE_SIGMA,
            edge_low: DEFAULT_EDGE_LOW,
            edge_high: DEFAULT_EDGE_HIGH,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
            min_edge_pixels: DEFAULT_MIN_EDGE_PIXELS,
            edge_padding: DEFAULT_EDGE_PADDING,
            min_area_ratio: DEFAULT_MIN_AREA_RATIO,
            max_area_ratio: DEFAULT_MAX_AREA_RATIO,
            min_region_size: DEFAULT_MIN_REGION_SIZE,
        }
    }
}

impl DetectionOptions {
    /// Create a new options builder
    pub fn builder() -> DetectionOptionsBuilder {
        DetectionOptionsBuilder::default()
    }

    /// Options with automatic detection switched off
    pub fn disabled() -> Self {
        Self {
            auto_crop: false,
            ..Default::default()
        }
    }

    /// Validation gate shared by all automatic detectors
    pub fn passes_gate(&self, region: &ContentRegion, width: u32, height: u32) -> bool {
        let ratio = region.area_ratio(width, height);
        ratio > self.min_area_ratio
            && ratio < self.max_area_ratio
            && region.width() >= self.min_region_size
            && region.height() >= self.min_region_size
    }
}

/// Builder for DetectionOptions
#[derive(Debug, Default)]
pub struct DetectionOptionsBuilder {
    options: DetectionOptions,
}

impl DetectionOptionsBuilder {
    /// Enable or disable automatic detection
    #[must_use]
    pub fn auto_crop(mut self, enabled: bool) -> Self {
        self.options.auto_crop = enabled;
        self
    }

    /// Set content intensity threshold (0-255)
    #[must_use]
    pub fn intensity_threshold(mut self, threshold: u8) -> Self {
        self.options.intensity_threshold = threshold;
        self
    }

    /// Set minimum content ratio (clamped to 0.0-1.0)
    #[must_use]
    pub fn min_content_ratio(mut self, ratio: f64) -> Self {
        self.options.min_content_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set threshold-method padding (clamped to 0.0-0.5)
    #[must_use]
    pub fn threshold_padding(mut self, padding: f64) -> Self {
        self.options.threshold_padding = padding.clamp(0.0, 0.5);
        self
    }

    /// Set edge sigma (clamped to 0.1-10.0)
    #[must_use]
    pub fn edge_sigma(mut self, sigma: f32) -> Self {
        self.options.edge_sigma = sigma.clamp(0.1, 10.0);
        self
    }

    /// Set hysteresis thresholds (clamped to 0.0-1.0, low <= high)
    #[must_use]
    pub fn edge_thresholds(mut self, low: f32, high: f32) -> Self {
        let low = low.clamp(0.0, 1.0);
        let high = high.clamp(0.0, 1.0);
        self.options.edge_low = low.min(high);
        self.options.edge_high = high.max(low);
        self
    }

    /// Set dilation passes
    #[must_use]
    pub fn dilate_iterations(mut self, iterations: u8) -> Self {
        self.options.dilate_iterations = iterations;
        self
    }

    /// Set minimum edge pixel count
    #[must_use]
    pub fn min_edge_pixels(mut self, count: usize) -> Self {
        self.options.min_edge_pixels = count;
        self
    }

    /// Set edge-method padding (clamped to 0.0-0.5)
    #[must_use]
    pub fn edge_padding(mut self, padding: f64) -> Self {
        self.options.edge_padding = padding.clamp(0.0, 0.5);
        self
    }

    /// Set area ratio gate (clamped to 0.0-1.0, min <= max)
    #[must_use]
    pub fn area_ratio_gate(mut self, min: f64, max: f64) -> Self {
        let min = min.clamp(0.0, 1.0);
        let max = max.clamp(0.0, 1.0);
        self.options.min_area_ratio = min.min(max);
        self.options.max_area_ratio = max.max(min);
        self
    }

    /// Set minimum region side length
    #[must_use]
    pub fn min_region_size(mut self, size: u32) -> Self {
        self.options.min_region_size = size;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> DetectionOptions {
        self.options
    }
}
