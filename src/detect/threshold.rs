//! Intensity-threshold content detection
//!
//! Counts dark pixels per row and column and keeps the span of rows/columns
//! whose dark fraction exceeds a minimum ratio.

use image::GrayImage;
use rayon::prelude::*;

use super::types::{ContentRegion, DetectionMethod, DetectionOptions, CONFIDENCE_THRESHOLD};
use super::ContentDetector;

/// Background/content split on grayscale intensity
#[derive(Debug, Default, Clone, Copy)]
pub struct ThresholdDetector;

impl ThresholdDetector {
    /// Bounding box of qualifying rows/columns, padded and clamped.
    ///
    /// Returns `None` when no row or no column qualifies.
    pub fn find_region(gray: &GrayImage, options: &DetectionOptions) -> Option<ContentRegion> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let (row_counts, col_counts) = Self::content_counts(gray, options.intensity_threshold);

        let (top, last_row) = qualifying_span(&row_counts, width, options.min_content_ratio)?;
        let (left, last_col) = qualifying_span(&col_counts, height, options.min_content_ratio)?;

        let pad_y = (height as f64 * options.threshold_padding) as u32;
        let pad_x = (width as f64 * options.threshold_padding) as u32;

        ContentRegion::new(
            left.saturating_sub(pad_x),
            top.saturating_sub(pad_y),
            (last_col + 1).saturating_add(pad_x).min(width),
            (last_row + 1).saturating_add(pad_y).min(height),
        )
        .ok()
    }

    /// Per-row and per-column counts of pixels darker than `threshold`
    fn content_counts(gray: &GrayImage, threshold: u8) -> (Vec<u32>, Vec<u32>) {
        let width = gray.width() as usize;
        let raw = gray.as_raw();

        let row_counts: Vec<u32> = raw
            .par_chunks(width)
            .map(|row| row.iter().filter(|&&p| p < threshold).count() as u32)
            .collect();

        let col_counts = raw
            .par_chunks(width)
            .fold(
                || vec![0u32; width],
                |mut acc, row| {
                    for (count, &p) in acc.iter_mut().zip(row) {
                        if p < threshold {
                            *count += 1;
                        }
                    }
                    acc
                },
            )
            .reduce(
                || vec![0u32; width],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            );

        (row_counts, col_counts)
    }
}

impl ContentDetector for ThresholdDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Threshold
    }

    fn confidence(&self) -> f64 {
        CONFIDENCE_THRESHOLD
    }

    fn detect(&self, gray: &GrayImage, options: &DetectionOptions) -> Option<ContentRegion> {
        Self::find_region(gray, options)
    }
}

/// First and last index whose count exceeds `min_ratio` of `length`
fn qualifying_span(counts: &[u32], length: u32, min_ratio: f64) -> Option<(u32, u32)> {
    let qualifies = |c: &u32| *c as f64 / length as f64 > min_ratio;
    let first = counts.iter().position(qualifies)?;
    let last = counts.iter().rposition(qualifies)?;
    Some((first as u32, last as u32))
}
