use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

use crate::common::{ResultId, SessionId, FLIP_TARGET, HEADS_SYMBOL, TAILS_SYMBOL};
use crate::domains::results::trials::TrialSequence;

/// TossResult - one participant's completed run of `FLIP_TARGET` flips.
///
/// Immutable once stored. `heads + tails == FLIP_TARGET` and `heads` equals
/// the number of `H` symbols in `sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TossResult {
    pub id: ResultId,
    pub session_id: SessionId,
    pub participant_label: Option<String>,
    pub heads: i32,
    pub tails: i32,
    pub sequence: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by a participant; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTossResult {
    pub session_id: SessionId,
    pub participant_label: Option<String>,
    pub heads: i32,
    pub tails: i32,
    pub sequence: String,
}

/// Reasons a candidate result breaks the result invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a nickname.")]
    MissingLabel,

    #[error("Please complete exactly {expected} flips.")]
    WrongLength { expected: usize, actual: usize },

    #[error("Sequence contains an unknown symbol {0:?}")]
    UnknownSymbol(char),

    #[error("Heads/tails counts ({heads}/{tails}) do not match the sequence")]
    CountMismatch { heads: i32, tails: i32 },
}

impl NewTossResult {
    /// Builds a submission from a finished trial sequence.
    ///
    /// The label is trimmed; counts are derived from the sequence rather
    /// than trusted from the caller.
    pub fn from_trials(
        session_id: SessionId,
        label: &str,
        trials: &TrialSequence,
    ) -> Result<Self, ValidationError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ValidationError::MissingLabel);
        }
        if !trials.is_complete() {
            return Err(ValidationError::WrongLength {
                expected: FLIP_TARGET,
                actual: trials.len(),
            });
        }

        let result = Self {
            session_id,
            participant_label: Some(label.to_string()),
            heads: trials.heads() as i32,
            tails: trials.tails() as i32,
            sequence: trials.to_symbols(),
        };
        result.validate()?;
        Ok(result)
    }

    /// Checks the stored-result invariant. Run again at the store boundary
    /// since the HTTP edge accepts raw submissions.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let length = self.sequence.chars().count();
        if length != FLIP_TARGET {
            return Err(ValidationError::WrongLength {
                expected: FLIP_TARGET,
                actual: length,
            });
        }

        let mut heads = 0;
        for symbol in self.sequence.chars() {
            match symbol {
                HEADS_SYMBOL => heads += 1,
                TAILS_SYMBOL => {}
                other => return Err(ValidationError::UnknownSymbol(other)),
            }
        }

        if self.heads != heads || self.heads + self.tails != FLIP_TARGET as i32 {
            return Err(ValidationError::CountMismatch {
                heads: self.heads,
                tails: self.tails,
            });
        }
        Ok(())
    }

    /// Materializes the row as a store would, with fresh id and timestamp.
    pub fn into_result(self, id: ResultId, created_at: DateTime<Utc>) -> TossResult {
        TossResult {
            id,
            session_id: self.session_id,
            participant_label: self.participant_label,
            heads: self.heads,
            tails: self.tails,
            sequence: self.sequence,
            created_at,
        }
    }
}

// =============================================================================
// TossResult Queries
// =============================================================================

impl TossResult {
    /// Insert a validated submission. The database checks the same
    /// invariant again through table constraints.
    pub async fn create(new: &NewTossResult, pool: &PgPool) -> Result<Self> {
        let result = sqlx::query_as::<_, TossResult>(
            r#"
            INSERT INTO results (session_id, participant_label, heads, tails, sequence)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.session_id)
        .bind(&new.participant_label)
        .bind(new.heads)
        .bind(new.tails)
        .bind(&new.sequence)
        .fetch_one(pool)
        .await?;
        Ok(result)
    }

    pub async fn find_by_id(id: ResultId, pool: &PgPool) -> Result<Option<Self>> {
        let result = sqlx::query_as::<_, TossResult>("SELECT * FROM results WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(result)
    }

    /// All results for a session, newest first.
    pub async fn find_by_session(session_id: SessionId, pool: &PgPool) -> Result<Vec<Self>> {
        let results = sqlx::query_as::<_, TossResult>(
            r#"
            SELECT * FROM results
            WHERE session_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::results::trials::Flip;

    fn sequence_of(heads: usize) -> TrialSequence {
        let mut trials = TrialSequence::new();
        for i in 0..FLIP_TARGET {
            trials.push(if i < heads { Flip::Heads } else { Flip::Tails });
        }
        trials
    }

    #[test]
    fn from_trials_derives_counts_and_trims_label() {
        let session_id = SessionId::new();
        let result = NewTossResult::from_trials(session_id, "  ada ", &sequence_of(8)).unwrap();

        assert_eq!(result.participant_label.as_deref(), Some("ada"));
        assert_eq!(result.heads, 8);
        assert_eq!(result.tails, 12);
        assert_eq!(result.sequence, format!("{}{}", "H".repeat(8), "T".repeat(12)));
    }

    #[test]
    fn blank_label_is_rejected() {
        let err = NewTossResult::from_trials(SessionId::new(), "   ", &sequence_of(3)).unwrap_err();
        assert_eq!(err, ValidationError::MissingLabel);
    }

    #[test]
    fn short_sequence_is_rejected() {
        let mut trials = TrialSequence::new();
        trials.push(Flip::Heads);
        let err = NewTossResult::from_trials(SessionId::new(), "bo", &trials).unwrap_err();
        assert_eq!(
            err,
            ValidationError::WrongLength {
                expected: FLIP_TARGET,
                actual: 1
            }
        );
    }

    #[test]
    fn validate_catches_tampered_counts() {
        let mut result = NewTossResult::from_trials(SessionId::new(), "cy", &sequence_of(10)).unwrap();
        result.heads = 11;
        result.tails = 9;
        assert!(matches!(
            result.validate(),
            Err(ValidationError::CountMismatch { .. })
        ));
    }

    #[test]
    fn validate_catches_unknown_symbols() {
        let mut result = NewTossResult::from_trials(SessionId::new(), "di", &sequence_of(0)).unwrap();
        result.sequence.replace_range(0..1, "X");
        assert_eq!(result.validate(), Err(ValidationError::UnknownSymbol('X')));
    }
}
