// Constants shared by the kernel and domain layers.

/// Trials each participant performs before submitting.
pub const FLIP_TARGET: usize = 20;

/// Symbol recorded in a result sequence for heads.
pub const HEADS_SYMBOL: char = 'H';

/// Symbol recorded in a result sequence for tails.
pub const TAILS_SYMBOL: char = 'T';

/// Null hypothesis success probability (a fair coin).
pub const FAIR_COIN_P: f64 = 0.5;
