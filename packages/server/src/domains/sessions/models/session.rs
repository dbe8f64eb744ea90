use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::SessionId;

/// Session - one run of the experiment. Opened by a host, closed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: SessionId,
    pub is_open: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Session Queries
// =============================================================================

impl Session {
    /// Insert a new open session; id and timestamp come from the database.
    pub async fn create(pool: &PgPool) -> Result<Self> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions DEFAULT VALUES
            RETURNING id, is_open, created_at
            "#,
        )
        .fetch_one(pool)
        .await?;
        Ok(session)
    }

    /// Point lookup. `None` when the token does not resolve.
    pub async fn find_by_id(id: SessionId, pool: &PgPool) -> Result<Option<Self>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, is_open, created_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(session)
    }

    /// Conditional update to closed. Closing twice is harmless; sessions
    /// never reopen.
    pub async fn close(id: SessionId, pool: &PgPool) -> Result<Option<Self>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET is_open = false
            WHERE id = $1
            RETURNING id, is_open, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(session)
    }
}
