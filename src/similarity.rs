//! Structural similarity scoring
//!
//! Mean SSIM over 7x7 windows (sample covariance, K1 = 0.01, K2 = 0.03,
//! 8-bit data range), averaged over windows lying fully inside the image.
//! Window sums come from integer summed-area tables, so the score is exactly
//! symmetric and exactly 100 for identical inputs.

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::{DetectionMethod, DetectionResult, CONFIDENCE_FULL};

/// Default conformity threshold (percent)
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 85.0;

/// Default SSIM window side
pub const DEFAULT_WINDOW_SIZE: usize = 7;

/// Similarity error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimilarityError {
    #[error("Image sizes differ: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(u32, u32, u32, u32),

    #[error("Image {width}x{height} is smaller than the {window}x{window} window")]
    TooSmall { width: u32, height: u32, window: usize },

    #[error("Window size must be odd and at least 3, got {0}")]
    InvalidWindow(usize),
}

pub type Result<T> = std::result::Result<T, SimilarityError>;

/// SSIM parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsimOptions {
    pub window_size: usize,
    pub k1: f64,
    pub k2: f64,
    pub data_range: f64,
}

impl Default for SsimOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            k1: 0.01,
            k2: 0.03,
            data_range: 255.0,
        }
    }
}

/// Mean SSIM of two equally sized grayscale images, in [-1, 1]
pub fn ssim(a: &GrayImage, b: &GrayImage, options: &SsimOptions) -> Result<f64> {
    if a.dimensions() != b.dimensions() {
        return Err(SimilarityError::DimensionMismatch(
            a.width(),
            a.height(),
            b.width(),
            b.height(),
        ));
    }

    let win = options.window_size;
    if win < 3 || win % 2 == 0 {
        return Err(SimilarityError::InvalidWindow(win));
    }

    let (width, height) = (a.width() as usize, a.height() as usize);
    if width < win || height < win {
        return Err(SimilarityError::TooSmall {
            width: a.width(),
            height: a.height(),
            window: win,
        });
    }

    let tables = WindowSums::build(a.as_raw(), b.as_raw(), width, height);

    let n = (win * win) as f64;
    let cov_norm = n / (n - 1.0);
    let c1 = (options.k1 * options.data_range).powi(2);
    let c2 = (options.k2 * options.data_range).powi(2);

    let row_sums: Vec<f64> = (0..=height - win)
        .into_par_iter()
        .map(|y| {
            let mut acc = 0.0;
            for x in 0..=width - win {
                let s = tables.window(x, y, win);
                let ux = s.x as f64 / n;
                let uy = s.y as f64 / n;
                let vx = cov_norm * (s.xx as f64 / n - ux * ux);
                let vy = cov_norm * (s.yy as f64 / n - uy * uy);
                let vxy = cov_norm * (s.xy as f64 / n - ux * uy);

                let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
                let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
                acc += num / den;
            }
            acc
        })
        .collect();

    let count = ((width - win + 1) * (height - win + 1)) as f64;
    Ok(row_sums.iter().sum::<f64>() / count)
}

/// Per-window sums of x, y, x², y² and xy
struct Sums {
    x: u64,
    y: u64,
    xx: u64,
    yy: u64,
    xy: u64,
}

/// Summed-area tables, (w + 1) x (h + 1) each
struct WindowSums {
    stride: usize,
    x: Vec<u64>,
    y: Vec<u64>,
    xx: Vec<u64>,
    yy: Vec<u64>,
    xy: Vec<u64>,
}

impl WindowSums {
    fn build(a: &[u8], b: &[u8], width: usize, height: usize) -> Self {
        let stride = width + 1;
        let len = stride * (height + 1);
        let mut tables = Self {
            stride,
            x: vec![0; len],
            y: vec![0; len],
            xx: vec![0; len],
            yy: vec![0; len],
            xy: vec![0; len],
        };

        for row in 0..height {
            let (mut rx, mut ry, mut rxx, mut ryy, mut rxy) = (0u64, 0u64, 0u64, 0u64, 0u64);
            for col in 0..width {
                let pa = a[row * width + col] as u64;
                let pb = b[row * width + col] as u64;
                rx += pa;
                ry += pb;
                rxx += pa * pa;
                ryy += pb * pb;
                rxy += pa * pb;

                let above = row * stride + col + 1;
                let here = (row + 1) * stride + col + 1;
                tables.x[here] = tables.x[above] + rx;
                tables.y[here] = tables.y[above] + ry;
                tables.xx[here] = tables.xx[above] + rxx;
                tables.yy[here] = tables.yy[above] + ryy;
                tables.xy[here] = tables.xy[above] + rxy;
            }
        }

        tables
    }

    fn window(&self, x: usize, y: usize, win: usize) -> Sums {
        let tl = y * self.stride + x;
        let tr = tl + win;
        let bl = (y + win) * self.stride + x;
        let br = bl + win;
        let rect = |t: &[u64]| t[br] + t[tl] - t[tr] - t[bl];
        Sums {
            x: rect(&self.x),
            y: rect(&self.y),
            xx: rect(&self.xx),
            yy: rect(&self.yy),
            xy: rect(&self.xy),
        }
    }
}

/// SSIM scaled to a 0-100 score
#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    options: SsimOptions,
}

impl SimilarityScorer {
    pub fn new(options: SsimOptions) -> Self {
        Self { options }
    }

    /// Unrounded score in [0, 100]
    pub fn score(&self, a: &GrayImage, b: &GrayImage) -> Result<f64> {
        let raw = ssim(a, b, &self.options)?;
        Ok(raw.clamp(0.0, 1.0) * 100.0)
    }
}

/// Score with the detection evidence behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// Unrounded score in [0, 100]
    pub score: f64,
    pub original: DetectionResult,
    pub printer: DetectionResult,
    /// Lower of the two side confidences
    pub confidence: f64,
    /// Method of the less confident side (original on ties)
    pub method: DetectionMethod,
    /// Threshold the result was judged against
    pub threshold: f64,
    pub conformant: bool,
}

impl SimilarityResult {
    pub fn new(
        score: f64,
        original: DetectionResult,
        printer: DetectionResult,
        threshold: f64,
    ) -> Self {
        let weaker = if printer.confidence < original.confidence {
            &printer
        } else {
            &original
        };
        Self {
            score,
            confidence: weaker.confidence,
            method: weaker.method,
            original,
            printer,
            threshold,
            conformant: score >= threshold,
        }
    }

    /// Re-judge against a new threshold
    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
        self.conformant = self.score >= threshold;
    }

    /// Score rounded for display
    pub fn display_score(&self) -> String {
        format!("{:.2}", self.score)
    }

    /// Detection was uncertain on at least one side
    pub fn needs_review(&self) -> bool {
        self.confidence < CONFIDENCE_FULL
            || self.original.method == DetectionMethod::Full
            || self.printer.method == DetectionMethod::Full
    }
}

/// Outcome of comparing one page of a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Comparison {
    Scored(SimilarityResult),
    /// No comparison possible (missing side or render failure)
    Undefined { reason: String },
    /// Scoring switched off for the session
    Disabled,
    /// Scoring itself failed
    Failed { error: String },
}

impl Comparison {
    pub fn score(&self) -> Option<f64> {
        match self {
            Comparison::Scored(result) => Some(result.score),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&SimilarityResult> {
        match self {
            Comparison::Scored(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_conformant(&self) -> bool {
        self.result().is_some_and(|r| r.conformant)
    }

    /// Score as shown in reports
    pub fn display_score(&self) -> String {
        match self {
            Comparison::Scored(result) => result.display_score(),
            Comparison::Undefined { .. } | Comparison::Disabled => "N/A".to_string(),
            Comparison::Failed { .. } => "error".to_string(),
        }
    }
}
