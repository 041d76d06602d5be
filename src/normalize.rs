//! Region Normalization module
//!
//! Crops a page to its content region and fits it onto a fixed-size canvas
//! so both sides of a comparison share one coordinate space.
//!
//! # Features
//!
//! - Aspect-preserving fit (largest scale keeping both sides within target)
//! - Centered placement on a solid background (white by default)
//! - Output is always exactly the target size
//!
//! # Example
//!
//! ```rust,no_run
//! use proofmatch::{ContentRegion, NormalizeOptions, Normalizer};
//!
//! let img = image::open("page.png").unwrap();
//! let region = ContentRegion::new(40, 40, 600, 800).unwrap();
//!
//! let normalized = Normalizer::normalize(&img, &region, &NormalizeOptions::default()).unwrap();
//! println!("Fitted {:?} at {:?}", normalized.fitted_size, normalized.offset);
//! ```

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::ContentRegion;

// ============================================================
// Constants
// ============================================================

/// Default canvas width
pub const DEFAULT_TARGET_WIDTH: u32 = 800;

/// Default canvas height
pub const DEFAULT_TARGET_HEIGHT: u32 = 800;

/// Default padding color (white)
pub const DEFAULT_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Largest accepted canvas side
pub const MAX_TARGET_SIDE: u32 = 8192;

// ============================================================
// Error Types
// ============================================================

/// Normalization error types
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Region {region} exceeds image {width}x{height}")]
    RegionOutOfBounds {
        region: ContentRegion,
        width: u32,
        height: u32,
    },

    #[error("Invalid target size: {0}x{1}")]
    InvalidTarget(u32, u32),
}

pub type Result<T> = std::result::Result<T, NormalizeError>;

// ============================================================
// Options
// ============================================================

/// Resampler type for resizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampler {
    /// Nearest neighbor (fastest, lowest quality)
    Nearest,
    /// Bilinear interpolation
    Bilinear,
    /// Bicubic interpolation
    Bicubic,
    /// Lanczos3 (high quality)
    #[default]
    Lanczos3,
}

impl Resampler {
    fn filter(self) -> FilterType {
        match self {
            Resampler::Nearest => FilterType::Nearest,
            Resampler::Bilinear => FilterType::Triangle,
            Resampler::Bicubic => FilterType::CatmullRom,
            Resampler::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Normalization options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Canvas width
    pub target_width: u32,
    /// Canvas height
    pub target_height: u32,
    /// Resampler type
    pub resampler: Resampler,
    /// Padding color
    pub background: [u8; 3],
    /// Allow enlarging regions smaller than the canvas
    pub upscale: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            target_height: DEFAULT_TARGET_HEIGHT,
            resampler: Resampler::Lanczos3,
            background: DEFAULT_BACKGROUND,
            upscale: true,
        }
    }
}

impl NormalizeOptions {
    /// Create a new options builder
    pub fn builder() -> NormalizeOptionsBuilder {
        NormalizeOptionsBuilder::default()
    }

    /// Bilinear resampling, for previews and large batches
    pub fn fast() -> Self {
        Self {
            resampler: Resampler::Bilinear,
            ..Default::default()
        }
    }
}

/// Builder for NormalizeOptions
#[derive(Debug, Default)]
pub struct NormalizeOptionsBuilder {
    options: NormalizeOptions,
}

impl NormalizeOptionsBuilder {
    /// Set canvas width (clamped to 1-8192)
    #[must_use]
    pub fn target_width(mut self, width: u32) -> Self {
        self.options.target_width = width.clamp(1, MAX_TARGET_SIDE);
        self
    }

    /// Set canvas height (clamped to 1-8192)
    #[must_use]
    pub fn target_height(mut self, height: u32) -> Self {
        self.options.target_height = height.clamp(1, MAX_TARGET_SIDE);
        self
    }

    /// Set resampler
    #[must_use]
    pub fn resampler(mut self, resampler: Resampler) -> Self {
        self.options.resampler = resampler;
        self
    }

    /// Set padding color
    #[must_use]
    pub fn background(mut self, color: [u8; 3]) -> Self {
        self.options.background = color;
        self
    }

    /// Allow or forbid enlarging small regions
    #[must_use]
    pub fn upscale(mut self, upscale: bool) -> Self {
        self.options.upscale = upscale;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> NormalizeOptions {
        self.options
    }
}

// ============================================================
// Result Types
// ============================================================

/// A region fitted onto the canvas
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Canvas, exactly target size
    pub image: RgbImage,
    /// Region taken from the source
    pub region: ContentRegion,
    /// Size after scaling, before padding
    pub fitted_size: (u32, u32),
    /// Top-left of the fitted image on the canvas
    pub offset: (u32, u32),
    /// Scale factor applied to the region
    pub scale: f64,
}

impl NormalizedImage {
    /// Single-channel view used for scoring
    pub fn to_gray(&self) -> GrayImage {
        imageops::grayscale(&self.image)
    }
}

// ============================================================
// Main Implementation
// ============================================================

/// Region normalizer
pub struct Normalizer;

impl Normalizer {
    /// Crop `image` to `region` and fit it onto the canvas
    pub fn normalize(
        image: &DynamicImage,
        region: &ContentRegion,
        options: &NormalizeOptions,
    ) -> Result<NormalizedImage> {
        let (target_w, target_h) = (options.target_width, options.target_height);
        if target_w == 0 || target_h == 0 {
            return Err(NormalizeError::InvalidTarget(target_w, target_h));
        }

        let (img_w, img_h) = (image.width(), image.height());
        if !region.fits(img_w, img_h) {
            return Err(NormalizeError::RegionOutOfBounds {
                region: *region,
                width: img_w,
                height: img_h,
            });
        }

        let cropped = image
            .crop_imm(region.left(), region.top(), region.width(), region.height())
            .to_rgb8();

        let (scale, fitted_w, fitted_h) =
            Self::fit(region.width(), region.height(), target_w, target_h, options.upscale);

        let fitted = if (fitted_w, fitted_h) == cropped.dimensions() {
            cropped
        } else {
            imageops::resize(&cropped, fitted_w, fitted_h, options.resampler.filter())
        };

        let offset = ((target_w - fitted_w) / 2, (target_h - fitted_h) / 2);
        let mut canvas = RgbImage::from_pixel(target_w, target_h, Rgb(options.background));
        imageops::overlay(&mut canvas, &fitted, offset.0 as i64, offset.1 as i64);

        Ok(NormalizedImage {
            image: canvas,
            region: *region,
            fitted_size: (fitted_w, fitted_h),
            offset,
            scale,
        })
    }

    /// Scale and fitted size for a `w` x `h` region on a `tw` x `th` canvas.
    ///
    /// Fitted sides are rounded and kept within 1..=target.
    pub fn fit(w: u32, h: u32, tw: u32, th: u32, upscale: bool) -> (f64, u32, u32) {
        let mut scale = (tw as f64 / w.max(1) as f64).min(th as f64 / h.max(1) as f64);
        if !upscale {
            scale = scale.min(1.0);
        }

        let fitted_w = ((w as f64 * scale).round() as u32).clamp(1, tw);
        let fitted_h = ((h as f64 * scale).round() as u32).clamp(1, th);
        (scale, fitted_w, fitted_h)
    }
}
