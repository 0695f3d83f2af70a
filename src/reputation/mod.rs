/// Reputation scoring: tier resolution and standing computation
pub mod engine;

pub use engine::ReputationEngine;

use crate::db::models::ReputationEvent;
use serde::{Deserialize, Serialize};

/// Ledger entries shown per page
pub const PAGE_SIZE: i64 = 30;

/// Display window for the reputation ledger
///
/// Filters only the listed events; the total score and the rolling
/// subtotals always cover the full history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodFilter {
    Days(u32),
    #[default]
    All,
}

impl PeriodFilter {
    /// Parse the `period` query parameter; anything unrecognized means
    /// the full history.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("30") => PeriodFilter::Days(30),
            Some("60") => PeriodFilter::Days(60),
            Some("90") => PeriodFilter::Days(90),
            _ => PeriodFilter::All,
        }
    }

    pub fn days(&self) -> Option<u32> {
        match self {
            PeriodFilter::Days(d) => Some(*d),
            PeriodFilter::All => None,
        }
    }
}

/// A profile's computed reputation standing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standing {
    pub total_score: i64,
    pub grade: String,
    pub tier_min_score: i64,
    pub next_grade: Option<String>,
    pub next_min_score: Option<i64>,
    /// Progress toward the next tier, [0.0, 100.0], one decimal
    pub progress_percent: f64,
    pub score_30: i64,
    pub score_60: i64,
    pub score_90: i64,
    pub page: i64,
    pub page_count: i64,
    pub total_events: i64,
    pub events: Vec<ReputationEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_filter_parsing() {
        assert_eq!(PeriodFilter::parse(Some("30")), PeriodFilter::Days(30));
        assert_eq!(PeriodFilter::parse(Some("60")), PeriodFilter::Days(60));
        assert_eq!(PeriodFilter::parse(Some("90")), PeriodFilter::Days(90));
        assert_eq!(PeriodFilter::parse(Some("all")), PeriodFilter::All);
        assert_eq!(PeriodFilter::parse(Some("7")), PeriodFilter::All);
        assert_eq!(PeriodFilter::parse(None), PeriodFilter::All);
    }
}
