//! Manual region overrides
//!
//! Human-supplied content rectangles, keyed by (pair, page, side). The store
//! belongs to one review session; it is never shared between sessions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::detect::ContentRegion;
use crate::validation::PageKey;

/// Which document of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Original,
    Printer,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Original, Side::Printer];

    pub fn label(self) -> &'static str {
        match self {
            Side::Original => "Original",
            Side::Printer => "Printer",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Manual regions for both sides of one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOverrides {
    pub original: Option<ContentRegion>,
    pub printer: Option<ContentRegion>,
}

impl PageOverrides {
    pub fn get(&self, side: Side) -> Option<ContentRegion> {
        match side {
            Side::Original => self.original,
            Side::Printer => self.printer,
        }
    }
}

/// Manual override store
#[derive(Debug, Clone, Default)]
pub struct ManualOverrides {
    regions: HashMap<(PageKey, Side), ContentRegion>,
}

impl ManualOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the region for one side of a page
    pub fn set(&mut self, key: PageKey, side: Side, region: ContentRegion) {
        self.regions.insert((key, side), region);
    }

    pub fn get(&self, key: PageKey, side: Side) -> Option<ContentRegion> {
        self.regions.get(&(key, side)).copied()
    }

    /// Both sides' regions for a page
    pub fn for_page(&self, key: PageKey) -> PageOverrides {
        PageOverrides {
            original: self.get(key, Side::Original),
            printer: self.get(key, Side::Printer),
        }
    }

    /// Remove one side's region, returning it
    pub fn remove(&mut self, key: PageKey, side: Side) -> Option<ContentRegion> {
        self.regions.remove(&(key, side))
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }
}
