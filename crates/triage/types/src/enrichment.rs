use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Result of a bounded enrichment lookup that matched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub excerpt: String,
    /// Signed delta applied to the running uncertainty, usually negative.
    pub confidence_adjustment: f64,
}

impl EnrichmentResult {
    pub fn new(excerpt: impl Into<String>, confidence_adjustment: f64) -> Self {
        Self {
            excerpt: excerpt.into(),
            confidence_adjustment,
        }
    }

    /// Reject adjustments that could not have come from a bounded lookup.
    pub fn check(&self) -> Result<(), ContractError> {
        let adj = self.confidence_adjustment;
        if !adj.is_finite() || !(-1.0..=1.0).contains(&adj) {
            return Err(ContractError::AdjustmentOutOfRange(adj));
        }
        Ok(())
    }

    /// Cut the excerpt to at most `max_chars` characters on a char boundary.
    pub fn bounded(mut self, max_chars: usize) -> Self {
        if let Some((idx, _)) = self.excerpt.char_indices().nth(max_chars) {
            self.excerpt.truncate(idx);
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LookupOutcome {
    Matched(EnrichmentResult),
    NoMatch,
}

/// Record of an enrichment attempt. Its presence in a run means the gate
/// fired, whether or not the lookup matched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub query: String,
    pub outcome: LookupOutcome,
}

impl EnrichmentRecord {
    pub fn result(&self) -> Option<&EnrichmentResult> {
        match &self.outcome {
            LookupOutcome::Matched(result) => Some(result),
            LookupOutcome::NoMatch => None,
        }
    }
}
