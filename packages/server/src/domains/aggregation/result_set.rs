//! In-memory result set for the observed session.
//!
//! Two sources feed it: a bulk load of every stored row and the change feed
//! of new inserts. They can arrive in any order, and the feed may deliver a
//! row twice, so both paths merge by result id.

use std::collections::HashSet;

use crate::common::{ResultId, SessionId};
use crate::domains::results::TossResult;

#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    session_id: Option<SessionId>,
    /// Newest first.
    results: Vec<TossResult>,
    ids: HashSet<ResultId>,
}

impl ResultSet {
    pub fn new(session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn results(&self) -> &[TossResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn contains(&self, id: ResultId) -> bool {
        self.ids.contains(&id)
    }

    /// Apply one feed delivery. Returns `true` if the set changed.
    ///
    /// Rows from another session and rows already present are ignored.
    pub fn apply_inserted(&mut self, result: TossResult) -> bool {
        if Some(result.session_id) != self.session_id || !self.ids.insert(result.id) {
            return false;
        }
        self.results.insert(0, result);
        true
    }

    /// Merge a completed bulk load.
    ///
    /// Rows delivered by the feed before the load finished are kept even if
    /// the load did not see them. The merged set is ordered like the store
    /// lists it: `created_at` then `id`, both descending.
    pub fn merge_bulk(&mut self, loaded: Vec<TossResult>) -> usize {
        let before = self.results.len();
        for result in loaded {
            if Some(result.session_id) == self.session_id && self.ids.insert(result.id) {
                self.results.push(result);
            }
        }
        self.results.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        self.results.len() - before
    }

    pub fn heads_counts(&self) -> impl Iterator<Item = i64> + '_ {
        self.results.iter().map(|r| i64::from(r.heads))
    }
}
