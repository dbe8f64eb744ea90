//! Sessions domain - lifecycle of an experiment run, seen by host and participants.

pub mod host;
pub mod models;
pub mod monitor;

pub use host::{HostError, JoinLink, SessionHost};
pub use models::*;
pub use monitor::{CheckTicket, MissingReason, SessionMonitor, SessionState, SessionView};
