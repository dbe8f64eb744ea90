//! Results domain - trial generation, validation and one-shot submission.

pub mod ingestion;
pub mod models;
pub mod trials;

pub use ingestion::{Participant, SubmitError, TrialProgress};
pub use models::*;
pub use trials::{Coin, FairCoin, Flip, TrialSequence};
