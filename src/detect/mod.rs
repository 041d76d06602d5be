//! Content Region Detection module
//!
//! Locates the printed content inside a rendered page so that white margins
//! and bleed do not take part in the comparison.
//!
//! # Selection policy
//!
//! 1. Auto-crop disabled: the full image, confidence 1.0, method `disabled`
//! 2. Each detector in priority order (threshold, then edge). The first
//!    region passing the area/size gate wins with that detector's confidence.
//! 3. Nothing usable: the full image, confidence 0.5, method `full`
//!
//! A manual region preempts all of the above.
//!
//! # Example
//!
//! ```rust,no_run
//! use proofmatch::{DetectionOptions, RegionDetector};
//!
//! let img = image::open("page.png").unwrap();
//! let detector = RegionDetector::new(DetectionOptions::default());
//! let result = detector.detect(&img);
//!
//! println!("{} ({:.1}) via {}", result.region, result.confidence, result.method);
//! ```

// Submodules
mod edge;
mod threshold;
mod types;

use image::{DynamicImage, GrayImage};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

// Re-export public API
pub use edge::EdgeDetector;
pub use threshold::ThresholdDetector;
pub use types::{
    ContentRegion, DetectionMethod, DetectionOptions, DetectionOptionsBuilder, DetectionResult,
    RegionError, CONFIDENCE_DISABLED, CONFIDENCE_EDGE, CONFIDENCE_FULL, CONFIDENCE_MANUAL,
    CONFIDENCE_THRESHOLD, DEFAULT_INTENSITY_THRESHOLD, DEFAULT_MAX_AREA_RATIO,
    DEFAULT_MIN_AREA_RATIO, DEFAULT_MIN_REGION_SIZE,
};

/// One automatic detection method
pub trait ContentDetector: Send + Sync {
    /// Method reported when this detector's region is chosen
    fn method(&self) -> DetectionMethod;

    /// Fixed confidence attached to this detector's regions
    fn confidence(&self) -> f64;

    /// Candidate region, or `None` when nothing was found
    fn detect(&self, gray: &GrayImage, options: &DetectionOptions) -> Option<ContentRegion>;
}

/// Ordered detectors plus the selection policy
pub struct RegionDetector {
    options: DetectionOptions,
    detectors: Vec<Box<dyn ContentDetector>>,
}

impl Default for RegionDetector {
    fn default() -> Self {
        Self::new(DetectionOptions::default())
    }
}

impl std::fmt::Debug for RegionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<DetectionMethod> = self.detectors.iter().map(|d| d.method()).collect();
        f.debug_struct("RegionDetector")
            .field("options", &self.options)
            .field("detectors", &methods)
            .finish()
    }
}

impl RegionDetector {
    /// Threshold detector first, edge detector as fallback
    pub fn new(options: DetectionOptions) -> Self {
        Self::with_detectors(
            options,
            vec![Box::new(ThresholdDetector), Box::new(EdgeDetector)],
        )
    }

    /// Custom detector chain, tried in order
    pub fn with_detectors(
        options: DetectionOptions,
        detectors: Vec<Box<dyn ContentDetector>>,
    ) -> Self {
        Self { options, detectors }
    }

    pub fn options(&self) -> &DetectionOptions {
        &self.options
    }

    /// Run the selection policy on a decoded page
    pub fn detect(&self, image: &DynamicImage) -> DetectionResult {
        if !self.options.auto_crop {
            return DetectionResult::disabled(image.width(), image.height());
        }
        self.detect_gray(&image.to_luma8())
    }

    /// Run the selection policy on a grayscale page
    pub fn detect_gray(&self, gray: &GrayImage) -> DetectionResult {
        let (width, height) = gray.dimensions();
        if !self.options.auto_crop {
            return DetectionResult::disabled(width, height);
        }

        for detector in &self.detectors {
            let method = detector.method();
            let Some(region) = self.run_guarded(detector.as_ref(), gray) else {
                debug!(%method, "no region found");
                continue;
            };

            if !region.fits(width, height) {
                warn!(%method, %region, width, height, "detector returned region outside image");
                continue;
            }

            if self.options.passes_gate(&region, width, height) {
                debug!(%method, %region, "region accepted");
                return DetectionResult {
                    region,
                    confidence: detector.confidence(),
                    method,
                };
            }

            debug!(
                %method,
                %region,
                area_ratio = region.area_ratio(width, height),
                "region rejected by validation gate"
            );
        }

        debug!("falling back to full image");
        DetectionResult::full(width, height)
    }

    /// Manual region when given, otherwise the selection policy.
    ///
    /// A manual region reaching past the image is clipped to it; if nothing
    /// is left the automatic policy runs instead.
    pub fn resolve(&self, image: &DynamicImage, manual: Option<ContentRegion>) -> DetectionResult {
        if let Some(region) = manual {
            let (width, height) = (image.width(), image.height());
            match clip(region, width, height) {
                Some(clipped) => {
                    if clipped != region {
                        warn!(%region, %clipped, "manual region clipped to image bounds");
                    }
                    return DetectionResult::manual(clipped);
                }
                None => warn!(%region, width, height, "manual region outside image, ignored"),
            }
        }
        self.detect(image)
    }

    /// Detector failures count as "no region"
    fn run_guarded(&self, detector: &dyn ContentDetector, gray: &GrayImage) -> Option<ContentRegion> {
        match catch_unwind(AssertUnwindSafe(|| detector.detect(gray, &self.options))) {
            Ok(region) => region,
            Err(_) => {
                warn!(method = %detector.method(), "detector panicked; treating as no region");
                None
            }
        }
    }
}

fn clip(region: ContentRegion, width: u32, height: u32) -> Option<ContentRegion> {
    ContentRegion::new(
        region.left(),
        region.top(),
        region.right().min(width),
        region.bottom().min(height),
    )
    .ok()
}
