//! Review session state
//!
//! Everything a single reviewer mutates lives here: the cursor over pairs
//! and pages, manual overrides, runtime settings and page decisions. A
//! session is owned by one control thread; comparisons are computed
//! elsewhere from a [`ComparisonRequest`] and handed back through
//! [`ReviewSession::apply`], which drops results for a context the session
//! has since left.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::detect::ContentRegion;
use crate::overrides::{ManualOverrides, PageOverrides, Side};
use crate::pairing::Pair;
use crate::pipeline::{ComparisonPipeline, PageReport, PipelineConfig};
use crate::render::PageRenderer;
use crate::similarity::Comparison;
use crate::validation::{
    AutoApproveCandidate, PageKey, PairStatus, ValidationLedger, ValidationStatus,
};

/// A page plus the session generation it was requested under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub key: PageKey,
    pub generation: u64,
}

/// Everything needed to compute one page off the session thread
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub context: ContextKey,
    pub pair: Pair,
    pub overrides: PageOverrides,
    pub config: PipelineConfig,
}

impl ComparisonRequest {
    /// Render and compare the requested page
    pub fn execute(&self, renderer: Arc<dyn PageRenderer>) -> PageReport {
        ComparisonPipeline::with_renderer(self.config.clone(), renderer).compare_page(
            &self.pair,
            self.context.key.page,
            self.overrides,
        )
    }
}

/// Interactive review state over a resolved pair list
#[derive(Debug, Clone)]
pub struct ReviewSession {
    pairs: Vec<Pair>,
    matched_only: bool,
    /// Indices into `pairs` reachable by navigation
    visible: Vec<usize>,
    /// Position in `visible`
    cursor: usize,
    page: usize,
    page_counts: HashMap<usize, usize>,
    overrides: ManualOverrides,
    ledger: ValidationLedger,
    config: PipelineConfig,
    generation: u64,
    comparisons: HashMap<PageKey, Comparison>,
}

impl ReviewSession {
    pub fn new(pairs: Vec<Pair>, config: PipelineConfig) -> Self {
        let visible = (0..pairs.len()).collect();
        Self {
            pairs,
            matched_only: false,
            visible,
            cursor: 0,
            page: 0,
            page_counts: HashMap::new(),
            overrides: ManualOverrides::new(),
            ledger: ValidationLedger::new(),
            config,
            generation: 0,
            comparisons: HashMap::new(),
        }
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn ledger(&self) -> &ValidationLedger {
        &self.ledger
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full-list indices reachable by navigation
    pub fn visible_pairs(&self) -> &[usize] {
        &self.visible
    }

    /// Full-list index of the current pair
    pub fn current_pair_index(&self) -> Option<usize> {
        self.visible.get(self.cursor).copied()
    }

    pub fn current_pair(&self) -> Option<&Pair> {
        self.current_pair_index().map(|i| &self.pairs[i])
    }

    pub fn current_page(&self) -> usize {
        self.page
    }

    pub fn current_key(&self) -> Option<PageKey> {
        self.current_pair_index().map(|pair| PageKey::new(pair, self.page))
    }

    pub fn context(&self) -> Option<ContextKey> {
        self.current_key().map(|key| ContextKey {
            key,
            generation: self.generation,
        })
    }

    /// Known page count of a pair; 1 until a render has reported one
    pub fn total_pages(&self, pair: usize) -> usize {
        self.page_counts.get(&pair).copied().unwrap_or(1).max(1)
    }

    pub fn comparison(&self, key: PageKey) -> Option<&Comparison> {
        self.comparisons.get(&key)
    }

    pub fn override_region(&self, side: Side) -> Option<ContentRegion> {
        self.current_key()
            .and_then(|key| self.overrides.get(key, side))
    }

    pub fn pair_status(&self, pair: usize) -> PairStatus {
        self.ledger.pair_status(pair, self.total_pages(pair))
    }

    /// Decided pages and total pages of a pair
    pub fn progress(&self, pair: usize) -> (usize, usize) {
        let total = self.total_pages(pair);
        let validated = self
            .ledger
            .page_statuses(pair, total)
            .into_iter()
            .filter(|s| *s != ValidationStatus::Pending)
            .count();
        (validated, total)
    }

    // ============================================================
    // Settings
    // ============================================================

    /// Restrict navigation to pairs with both files
    pub fn set_matched_only(&mut self, matched_only: bool) {
        let current = self.current_pair_index();
        self.matched_only = matched_only;
        self.visible = (0..self.pairs.len())
            .filter(|&i| !matched_only || self.pairs[i].is_matched())
            .collect();

        match current.and_then(|c| self.visible.iter().position(|&i| i == c)) {
            Some(pos) => self.cursor = pos,
            None => {
                self.cursor = 0;
                self.page = 0;
            }
        }
        self.context_changed();
    }

    pub fn matched_only(&self) -> bool {
        self.matched_only
    }

    /// Change the threshold; stored scores are re-judged, not recomputed
    pub fn set_threshold(&mut self, threshold: f64) {
        self.config.threshold = threshold.clamp(0.0, 100.0);
        for comparison in self.comparisons.values_mut() {
            if let Comparison::Scored(result) = comparison {
                result.set_threshold(self.config.threshold);
            }
        }
    }

    /// Toggle automatic detection; cached scores are dropped
    pub fn set_auto_crop(&mut self, enabled: bool) {
        if self.config.detection.auto_crop != enabled {
            self.config.detection.auto_crop = enabled;
            self.invalidate_comparisons();
        }
    }

    /// Toggle scoring; cached scores are dropped
    pub fn set_similarity_enabled(&mut self, enabled: bool) {
        if self.config.similarity_enabled != enabled {
            self.config.similarity_enabled = enabled;
            self.invalidate_comparisons();
        }
    }

    // ============================================================
    // Overrides
    // ============================================================

    /// Set a manual region for one side of the current page
    pub fn set_override(&mut self, side: Side, region: ContentRegion) -> bool {
        let Some(key) = self.current_key() else {
            return false;
        };
        self.overrides.set(key, side, region);
        self.comparisons.remove(&key);
        self.generation += 1;
        true
    }

    /// Drop the manual region for one side of the current page
    pub fn clear_override(&mut self, side: Side) -> bool {
        let Some(key) = self.current_key() else {
            return false;
        };
        if self.overrides.remove(key, side).is_none() {
            return false;
        }
        self.comparisons.remove(&key);
        self.generation += 1;
        true
    }

    // ============================================================
    // Navigation
    // ============================================================

    pub fn next_pair(&mut self) -> bool {
        if self.cursor + 1 >= self.visible.len() {
            return false;
        }
        self.move_to(self.cursor + 1, 0);
        true
    }

    pub fn previous_pair(&mut self) -> bool {
        if self.cursor == 0 || self.visible.is_empty() {
            return false;
        }
        self.move_to(self.cursor - 1, 0);
        true
    }

    /// Jump to a pair by its full-list index
    pub fn go_to_pair(&mut self, pair: usize) -> bool {
        match self.visible.iter().position(|&i| i == pair) {
            Some(pos) => {
                self.move_to(pos, 0);
                true
            }
            None => false,
        }
    }

    pub fn next_page(&mut self) -> bool {
        let Some(pair) = self.current_pair_index() else {
            return false;
        };
        if self.page + 1 >= self.total_pages(pair) {
            return false;
        }
        self.move_to(self.cursor, self.page + 1);
        true
    }

    pub fn previous_page(&mut self) -> bool {
        if self.page == 0 || self.visible.is_empty() {
            return false;
        }
        self.move_to(self.cursor, self.page - 1);
        true
    }

    /// Go to the first undecided page: in the current pair if it has one,
    /// otherwise in the first visible pair that does
    pub fn go_to_first_pending(&mut self) -> bool {
        let order = (self.cursor..self.visible.len()).chain(0..self.cursor);
        for pos in order {
            let pair = self.visible[pos];
            if let Some(page) = self.ledger.first_pending_page(pair, self.total_pages(pair)) {
                self.move_to(pos, page);
                return true;
            }
        }
        false
    }

    fn move_to(&mut self, cursor: usize, page: usize) {
        self.cursor = cursor;
        self.page = page;
        self.context_changed();
    }

    fn context_changed(&mut self) {
        self.overrides.clear();
        self.generation += 1;
    }

    fn invalidate_comparisons(&mut self) {
        self.comparisons.clear();
        self.generation += 1;
    }

    // ============================================================
    // Comparisons
    // ============================================================

    /// Work item for the current page
    pub fn request(&self) -> Option<ComparisonRequest> {
        let context = self.context()?;
        Some(ComparisonRequest {
            context,
            pair: self.pairs[context.key.pair].clone(),
            overrides: self.overrides.for_page(context.key),
            config: self.config.clone(),
        })
    }

    /// Store a finished comparison unless the session has moved on.
    ///
    /// Returns `false` (and drops the report) for stale contexts.
    pub fn apply(&mut self, context: ContextKey, report: PageReport) -> bool {
        if self.context() != Some(context) {
            debug!(
                pair = context.key.pair,
                page = context.key.page,
                generation = context.generation,
                current = self.generation,
                "discarding stale comparison"
            );
            return false;
        }

        self.page_counts
            .insert(context.key.pair, report.total_pages());
        let mut comparison = report.comparison;
        // The threshold may have moved since the request was built
        if let Comparison::Scored(result) = &mut comparison {
            result.set_threshold(self.config.threshold);
        }
        self.comparisons.insert(context.key, comparison);
        true
    }

    /// Compute the current page synchronously
    pub fn refresh(&mut self, renderer: Arc<dyn PageRenderer>) -> Option<&Comparison> {
        let request = self.request()?;
        let report = request.execute(renderer);
        self.apply(request.context, report);
        self.comparisons.get(&request.context.key)
    }

    // ============================================================
    // Decisions
    // ============================================================

    /// Record a decision on the current page, then move on: next page when
    /// one remains, else the next pair once every page is decided, else the
    /// first undecided page of this pair
    pub fn decide(&mut self, status: ValidationStatus, comment: impl Into<String>) -> Option<PageKey> {
        let key = self.current_key()?;
        self.ledger.record(key, status, comment);

        let total = self.total_pages(key.pair);
        if key.page + 1 < total {
            self.move_to(self.cursor, key.page + 1);
        } else if !self.ledger.pair_status(key.pair, total).is_pending() {
            self.next_pair();
        } else if let Some(page) = self.ledger.first_pending_page(key.pair, total) {
            self.move_to(self.cursor, page);
        }
        Some(key)
    }

    pub fn approve(&mut self, comment: impl Into<String>) -> Option<PageKey> {
        self.decide(ValidationStatus::Approved, comment)
    }

    pub fn reject(&mut self, comment: impl Into<String>) -> Option<PageKey> {
        self.decide(ValidationStatus::Rejected, comment)
    }

    /// Auto-approve every eligible pair with a page 0 score at or above the
    /// active threshold
    pub fn auto_approve_all(&mut self) -> usize {
        let candidates: Vec<AutoApproveCandidate> = (0..self.pairs.len())
            .map(|pair| AutoApproveCandidate {
                pair,
                total_pages: self.total_pages(pair),
                score: self
                    .comparisons
                    .get(&PageKey::new(pair, 0))
                    .and_then(Comparison::score),
            })
            .collect();
        self.ledger.auto_approve_all(candidates, self.config.threshold)
    }
}
