//! Typed ids for the experiment's entities.

pub use super::id::Id;

/// Marker type for experiment sessions.
pub struct Session;

/// Marker type for submitted toss results.
pub struct TossResult;

/// Typed id for sessions. Doubles as the join token handed to participants.
pub type SessionId = Id<Session>;

/// Typed id for submitted results.
pub type ResultId = Id<TossResult>;
