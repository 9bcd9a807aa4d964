use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::dna::{RawMetrics, ScoreBreakdown};

/// A persisted analysis. Created exactly once per `github_id` and never
/// mutated afterwards; re-requests are served from this row.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserDnaRecord {
    pub id: i32,
    pub github_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub dna_primary: String,
    pub dna_secondary: String,
    pub score_breakdown: Json<ScoreBreakdown>,
    pub raw_metrics: Option<Json<RawMetrics>>,
    pub analyzed_at: DateTime<Utc>,
}

/// Insert payload for a freshly scored account.
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub github_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub dna_primary: String,
    pub dna_secondary: String,
    pub score_breakdown: ScoreBreakdown,
    pub raw_metrics: RawMetrics,
}

/// Outcome of the insert-on-first-analysis write. A duplicate key means a
/// concurrent analysis won the race; the caller re-reads the winner's row.
#[derive(Debug)]
pub enum InsertUserOutcome {
    Created(UserDnaRecord),
    DuplicateKey,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RateLimitRow {
    pub count: i32,
    pub reset_time: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RecentUserRow {
    pub username: String,
    pub avatar_url: Option<String>,
    pub dna_primary: String,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Statistics {
    pub total_users: i64,
    pub total_visits: i64,
    pub dna_distribution: Vec<(String, i64)>,
    pub recent_users: Vec<RecentUserRow>,
}
