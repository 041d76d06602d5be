//! Page and pair validation state
//!
//! Page decisions are stored in a [`ValidationLedger`] keyed by
//! (pair index, page index). Pair status is never stored: it is reduced from
//! the page decisions by [`PairStatus::aggregate`] whenever it is needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Identity of one page of one pair (indices into the full pair list)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageKey {
    pub pair: usize,
    pub page: usize,
}

impl PageKey {
    pub fn new(pair: usize, page: usize) -> Self {
        Self { pair, page }
    }
}

/// Decision state of a single page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValidationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ValidationStatus::Pending => "Pending",
            ValidationStatus::Approved => "Approved",
            ValidationStatus::Rejected => "Rejected",
        })
    }
}

/// A recorded page decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageValidation {
    pub status: ValidationStatus,
    pub comment: String,
    pub decided_at: Option<DateTime<Utc>>,
    /// Set by the auto-approve path rather than a human
    pub auto_approved: bool,
}

impl Default for PageValidation {
    fn default() -> Self {
        Self {
            status: ValidationStatus::Pending,
            comment: String::new(),
            decided_at: None,
            auto_approved: false,
        }
    }
}

/// Aggregated status of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairStatus {
    Pending { validated: usize, total: usize },
    Approved,
    Rejected,
}

impl PairStatus {
    /// Reduce the ordered page statuses of one pair.
    ///
    /// Pending while any page is undecided; once all are decided, Rejected
    /// if any page is rejected, else Approved.
    pub fn aggregate<I>(pages: I) -> Self
    where
        I: IntoIterator<Item = ValidationStatus>,
    {
        let (total, validated, rejected) =
            pages
                .into_iter()
                .fold((0, 0, false), |(total, validated, rejected), status| match status {
                    ValidationStatus::Pending => (total + 1, validated, rejected),
                    ValidationStatus::Approved => (total + 1, validated + 1, rejected),
                    ValidationStatus::Rejected => (total + 1, validated + 1, true),
                });

        if total == 0 || validated < total {
            PairStatus::Pending { validated, total }
        } else if rejected {
            PairStatus::Rejected
        } else {
            PairStatus::Approved
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PairStatus::Pending { .. })
    }
}

impl std::fmt::Display for PairStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairStatus::Pending { validated, total } => write!(f, "Pending ({validated}/{total})"),
            PairStatus::Approved => f.write_str("Approved"),
            PairStatus::Rejected => f.write_str("Rejected"),
        }
    }
}

/// Input to a bulk auto-approve pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoApproveCandidate {
    pub pair: usize,
    pub total_pages: usize,
    /// Page 0 similarity; `None` when the pair could not be scored
    pub score: Option<f64>,
}

/// Page decisions for one session or batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationLedger {
    pages: BTreeMap<PageKey, PageValidation>,
}

impl ValidationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a human decision now. Recording `Pending` clears the page.
    pub fn record(&mut self, key: PageKey, status: ValidationStatus, comment: impl Into<String>) {
        self.record_at(key, status, comment, Utc::now());
    }

    /// Record a human decision with an explicit timestamp
    pub fn record_at(
        &mut self,
        key: PageKey,
        status: ValidationStatus,
        comment: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        if status == ValidationStatus::Pending {
            self.pages.remove(&key);
            return;
        }
        self.pages.insert(
            key,
            PageValidation {
                status,
                comment: comment.into(),
                decided_at: Some(at),
                auto_approved: false,
            },
        );
    }

    pub fn get(&self, key: PageKey) -> Option<&PageValidation> {
        self.pages.get(&key)
    }

    pub fn status(&self, key: PageKey) -> ValidationStatus {
        self.pages
            .get(&key)
            .map(|v| v.status)
            .unwrap_or_default()
    }

    /// Statuses of pages `0..total_pages` of a pair, in page order
    pub fn page_statuses(&self, pair: usize, total_pages: usize) -> Vec<ValidationStatus> {
        (0..total_pages)
            .map(|page| self.status(PageKey::new(pair, page)))
            .collect()
    }

    pub fn pair_status(&self, pair: usize, total_pages: usize) -> PairStatus {
        PairStatus::aggregate(self.page_statuses(pair, total_pages))
    }

    /// First page of a pair still awaiting a decision
    pub fn first_pending_page(&self, pair: usize, total_pages: usize) -> Option<usize> {
        (0..total_pages).find(|&page| self.status(PageKey::new(pair, page)) == ValidationStatus::Pending)
    }

    /// Most recent decision recorded on any page of a pair
    pub fn latest_decision(&self, pair: usize) -> Option<&PageValidation> {
        self.pages
            .range(PageKey::new(pair, 0)..=PageKey::new(pair, usize::MAX))
            .map(|(_, v)| v)
            .max_by_key(|v| v.decided_at)
    }

    /// Whether any page of the pair was approved automatically
    pub fn is_auto_approved(&self, pair: usize) -> bool {
        self.pages
            .range(PageKey::new(pair, 0)..=PageKey::new(pair, usize::MAX))
            .any(|(_, v)| v.auto_approved)
    }

    /// Auto-approve a single-page pair that is still pending and scored at
    /// or above `threshold`. Returns whether the pair was approved.
    pub fn auto_approve(&mut self, candidate: AutoApproveCandidate, threshold: f64) -> bool {
        let Some(score) = candidate.score else {
            return false;
        };
        if candidate.total_pages != 1 || score < threshold {
            return false;
        }

        let key = PageKey::new(candidate.pair, 0);
        if self.pages.contains_key(&key) {
            return false;
        }

        self.pages.insert(
            key,
            PageValidation {
                status: ValidationStatus::Approved,
                comment: format!("Auto-approved (Score: {score:.2}%)"),
                decided_at: Some(Utc::now()),
                auto_approved: true,
            },
        );
        true
    }

    /// Auto-approve every eligible candidate; returns how many were approved
    pub fn auto_approve_all<I>(&mut self, candidates: I, threshold: f64) -> usize
    where
        I: IntoIterator<Item = AutoApproveCandidate>,
    {
        let approved = candidates
            .into_iter()
            .filter(|&candidate| self.auto_approve(candidate, threshold))
            .count();
        info!(approved, threshold, "auto-approve pass complete");
        approved
    }

    /// Number of decided pages across all pairs
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
