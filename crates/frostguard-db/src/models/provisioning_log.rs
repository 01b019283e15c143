//! Provisioning log model.
//!
//! Append-only record of step attempts across runs. `status` answers
//! "how did we get here" without replaying remote calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Outcome of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// Attempt began; a terminal outcome row follows unless the process
    /// died mid-step.
    Started,
    Success,
    Failed,
    /// Ledger said done and the artifact confirmed; nothing to do.
    Skipped,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Started => write!(f, "started"),
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Failed => write!(f, "failed"),
            AttemptOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for AttemptOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "started" => Ok(AttemptOutcome::Started),
            "success" => Ok(AttemptOutcome::Success),
            "failed" => Ok(AttemptOutcome::Failed),
            "skipped" => Ok(AttemptOutcome::Skipped),
            _ => Err(format!("Unknown attempt outcome: {s}")),
        }
    }
}

/// Structured detail attached to a log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDetail {
    pub http_status: Option<u16>,
    pub correlation_id: Option<String>,
    pub message: Option<String>,
    /// Remote resource the failed call targeted, e.g. `application fg-a-app`.
    pub endpoint: Option<String>,
    /// Truncated remote response body.
    pub body_excerpt: Option<String>,
    /// Stable failure category, matching the error taxonomy.
    pub category: Option<String>,
    /// Wall-clock time spent in the attempt.
    pub duration_ms: Option<u64>,
}

/// One step attempt on one connection.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProvisioningLogEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub connection_id: Uuid,
    pub step: String,
    pub outcome: AttemptOutcome,
    /// 1-based attempt counter within the run.
    pub attempt: i32,
    pub detail: Option<Json<LogDetail>>,
    pub created_at: DateTime<Utc>,
}

impl ProvisioningLogEntry {
    /// Append an entry.
    pub async fn insert(pool: &sqlx::PgPool, new: &NewLogEntry) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO provisioning_log (id, tenant_id, connection_id, step, outcome, attempt, detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(new.connection_id)
        .bind(&new.step)
        .bind(new.outcome)
        .bind(new.attempt)
        .bind(new.detail.clone().map(Json))
        .fetch_one(pool)
        .await
    }

    /// Recent entries for a connection, newest first.
    pub async fn list_for_connection(
        pool: &sqlx::PgPool,
        connection_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM provisioning_log
            WHERE connection_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(connection_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

/// Request to append a log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub tenant_id: Uuid,
    pub connection_id: Uuid,
    pub step: String,
    pub outcome: AttemptOutcome,
    pub attempt: i32,
    pub detail: Option<LogDetail>,
}
