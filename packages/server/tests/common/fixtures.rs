//! Test fixtures for creating test data.

#![allow(dead_code)]

use chrono::Utc;
use coin_toss_core::common::{ResultId, SessionId, FLIP_TARGET};
use coin_toss_core::domains::results::{Coin, Flip, NewTossResult, TossResult};

/// A valid submission with `heads` heads followed by tails.
pub fn submission(session_id: SessionId, heads: usize) -> NewTossResult {
    NewTossResult {
        session_id,
        participant_label: Some(format!("p{}", heads)),
        heads: heads as i32,
        tails: (FLIP_TARGET - heads) as i32,
        sequence: format!("{}{}", "H".repeat(heads), "T".repeat(FLIP_TARGET - heads)),
    }
}

/// A row that was never stored, for feeding straight into the change feed.
pub fn detached_row(session_id: SessionId, heads: usize) -> TossResult {
    submission(session_id, heads).into_result(ResultId::new(), Utc::now())
}

/// Coin that lands heads exactly `heads` times out of `FLIP_TARGET`.
pub struct RiggedCoin {
    heads: usize,
    flipped: usize,
}

impl RiggedCoin {
    pub fn boxed(heads: usize) -> Box<dyn Coin> {
        Box::new(Self { heads, flipped: 0 })
    }
}

impl Coin for RiggedCoin {
    fn flip_once(&mut self) -> Flip {
        self.flipped += 1;
        if self.flipped <= self.heads {
            Flip::Heads
        } else {
            Flip::Tails
        }
    }
}
