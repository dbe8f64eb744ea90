use serde::Serialize;

use crate::common::{SessionId, FAIR_COIN_P, FLIP_TARGET};
use crate::domains::aggregation::ResultSet;
use crate::domains::results::TossResult;
use crate::domains::statistics::{
    binomial_p_value_two_sided, expected_distribution, heads_histogram, normalized_histogram,
};

/// How many of the newest results a live snapshot carries.
pub const RECENT_LIMIT: usize = 20;

/// Statistics derived from a session's full result set. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateView {
    pub session_id: Option<SessionId>,
    pub participant_count: usize,
    pub total_trials: u64,
    pub total_heads: u64,
    /// `histogram[k]` participants got exactly `k` heads.
    pub histogram: Vec<u32>,
    /// Histogram as shares of participants, for plotting against `expected`.
    pub normalized: Vec<f64>,
    /// Binomial(FLIP_TARGET, 0.5) probabilities.
    pub expected: Vec<f64>,
    /// Two-sided exact test of all flips against a fair coin. Absent until
    /// there is at least one flip.
    pub p_value: Option<f64>,
}

impl AggregateView {
    pub fn empty(session_id: Option<SessionId>) -> Self {
        Self::from_results(session_id, &[])
    }

    pub fn from_results(session_id: Option<SessionId>, results: &[TossResult]) -> Self {
        Self::from_heads(session_id, results.iter().map(|r| i64::from(r.heads)))
    }

    pub fn from_set(set: &ResultSet) -> Self {
        Self::from_heads(set.session_id(), set.heads_counts())
    }

    fn from_heads(session_id: Option<SessionId>, heads: impl Iterator<Item = i64>) -> Self {
        let heads: Vec<i64> = heads.collect();
        let participant_count = heads.len();
        let total_trials = (participant_count * FLIP_TARGET) as u64;
        let total_heads = heads.iter().map(|&h| h.max(0) as u64).sum::<u64>();
        let histogram = heads_histogram(heads.iter().copied(), FLIP_TARGET);

        Self {
            session_id,
            participant_count,
            total_trials,
            total_heads,
            normalized: normalized_histogram(&histogram, participant_count),
            histogram,
            expected: expected_distribution(FLIP_TARGET as u64, FAIR_COIN_P),
            p_value: (total_trials > 0).then(|| {
                binomial_p_value_two_sided(total_trials, total_heads as i64, FAIR_COIN_P)
            }),
        }
    }
}

/// What an observer of a session sees at one moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub aggregate: AggregateView,
    /// Newest first, at most `RECENT_LIMIT`.
    pub recent: Vec<TossResult>,
    /// The change feed is subscribed; without it the view only moves on reload.
    pub realtime: bool,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

impl LiveSnapshot {
    pub fn idle() -> Self {
        Self {
            aggregate: AggregateView::empty(None),
            recent: Vec::new(),
            realtime: false,
            loading: false,
            load_error: None,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.aggregate.session_id
    }
}
