//! Statistics domain - exact binomial test against a fair coin.

pub mod binomial;

pub use binomial::{
    binomial_p_value_two_sided, binomial_pmf, expected_distribution, heads_histogram,
    normalized_histogram, PMF_TOLERANCE,
};
