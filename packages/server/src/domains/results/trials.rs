//! Trial generator and the participant's in-progress flip sequence.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::common::{FLIP_TARGET, HEADS_SYMBOL, TAILS_SYMBOL};

/// Outcome of a single coin flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flip {
    Heads,
    Tails,
}

impl Flip {
    pub fn symbol(self) -> char {
        match self {
            Flip::Heads => HEADS_SYMBOL,
            Flip::Tails => TAILS_SYMBOL,
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            HEADS_SYMBOL => Some(Flip::Heads),
            TAILS_SYMBOL => Some(Flip::Tails),
            _ => None,
        }
    }
}

impl fmt::Display for Flip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Source of independent binary trials.
pub trait Coin: Send {
    fn flip_once(&mut self) -> Flip;
}

/// Unbiased coin backed by a seedable RNG.
pub struct FairCoin {
    rng: StdRng,
}

impl FairCoin {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic coin for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for FairCoin {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl Coin for FairCoin {
    fn flip_once(&mut self) -> Flip {
        if self.rng.gen_bool(0.5) {
            Flip::Heads
        } else {
            Flip::Tails
        }
    }
}

/// Ordered flips for one submission, capped at `FLIP_TARGET`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialSequence {
    flips: Vec<Flip>,
}

impl TrialSequence {
    pub fn new() -> Self {
        Self {
            flips: Vec::with_capacity(FLIP_TARGET),
        }
    }

    /// Appends a flip. Past the cap this is a no-op and returns `false`.
    pub fn push(&mut self, flip: Flip) -> bool {
        if self.is_complete() {
            return false;
        }
        self.flips.push(flip);
        true
    }

    /// Flips `coin` once and records it, unless the sequence is full.
    pub fn flip_with(&mut self, coin: &mut dyn Coin) -> Option<Flip> {
        if self.is_complete() {
            return None;
        }
        let flip = coin.flip_once();
        self.flips.push(flip);
        Some(flip)
    }

    pub fn reset(&mut self) {
        self.flips.clear();
    }

    pub fn len(&self) -> usize {
        self.flips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flips.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.flips.len() >= FLIP_TARGET
    }

    pub fn last(&self) -> Option<Flip> {
        self.flips.last().copied()
    }

    pub fn heads(&self) -> usize {
        self.flips.iter().filter(|f| **f == Flip::Heads).count()
    }

    pub fn tails(&self) -> usize {
        self.flips.len() - self.heads()
    }

    pub fn flips(&self) -> &[Flip] {
        &self.flips
    }

    /// Sequence as stored, e.g. `HTTH...`.
    pub fn to_symbols(&self) -> String {
        self.flips.iter().map(|f| f.symbol()).collect()
    }
}
