// Coin Toss Experiment - Core
//
// Live classroom randomness experiment: a host opens a session, participants
// flip a coin twenty times and submit once, and the host watches the
// aggregate and an exact binomial test update as results arrive.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
