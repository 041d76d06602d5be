//! Edge-based content detection
//!
//! Fallback for pages whose content is too light for the intensity split:
//! Canny edges are dilated to close broken contours and their bounding box
//! becomes the region.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;

use super::types::{ContentRegion, DetectionMethod, DetectionOptions, CONFIDENCE_EDGE};
use super::ContentDetector;

/// Smoothing `imageproc::edges::canny` always applies before the gradient
const CANNY_BUILTIN_SIGMA: f32 = 1.4;

/// Scale between [0, 1] thresholds and 8-bit gradient magnitudes
const INTENSITY_SCALE: f32 = 255.0;

/// Canny edge detector with dilation
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeDetector;

impl EdgeDetector {
    /// Bounding box of the dilated edge mask, padded and clamped.
    ///
    /// Returns `None` when fewer than `min_edge_pixels` edge pixels remain.
    pub fn find_region(gray: &GrayImage, options: &DetectionOptions) -> Option<ContentRegion> {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return None;
        }

        let mask = Self::edge_mask(gray, options);
        let (count, bounds) = edge_bounds(&mask);
        if count < options.min_edge_pixels {
            return None;
        }
        let (min_x, min_y, max_x, max_y) = bounds?;

        let pad = (width.min(height) as f64 * options.edge_padding) as u32;

        ContentRegion::new(
            min_x.saturating_sub(pad),
            min_y.saturating_sub(pad),
            (max_x + 1).saturating_add(pad).min(width),
            (max_y + 1).saturating_add(pad).min(height),
        )
        .ok()
    }

    /// Dilated binary edge mask (non-zero = edge)
    pub fn edge_mask(gray: &GrayImage, options: &DetectionOptions) -> GrayImage {
        // canny blurs with a fixed sigma; top up to the requested total
        let extra_sigma =
            (options.edge_sigma.powi(2) - CANNY_BUILTIN_SIGMA.powi(2)).max(0.0).sqrt();
        let edges = if extra_sigma > f32::EPSILON {
            let blurred = gaussian_blur_f32(gray, extra_sigma);
            canny(
                &blurred,
                options.edge_low * INTENSITY_SCALE,
                options.edge_high * INTENSITY_SCALE,
            )
        } else {
            canny(
                gray,
                options.edge_low * INTENSITY_SCALE,
                options.edge_high * INTENSITY_SCALE,
            )
        };

        if options.dilate_iterations == 0 {
            edges
        } else {
            // L1 radius k equals k passes with a 3x3 cross
            dilate(&edges, Norm::L1, options.dilate_iterations)
        }
    }
}

impl ContentDetector for EdgeDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Edge
    }

    fn confidence(&self) -> f64 {
        CONFIDENCE_EDGE
    }

    fn detect(&self, gray: &GrayImage, options: &DetectionOptions) -> Option<ContentRegion> {
        Self::find_region(gray, options)
    }
}

/// Edge pixel count and inclusive bounding box
fn edge_bounds(mask: &GrayImage) -> (usize, Option<(u32, u32, u32, u32)>) {
    let mut count = 0usize;
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        count += 1;
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    (count, bounds)
}
