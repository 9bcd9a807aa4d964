use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::types::{RecentUserRow, Statistics, UserDnaRecord};
use crate::dna::{DnaClassification, ScoreBreakdown};

/// Body of a successful analyze call; identical whether freshly computed
/// or served from the stored record.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponse {
    pub dna_primary: String,
    pub dna_secondary: String,
    pub score_breakdown: ScoreBreakdown,
}

impl From<DnaClassification> for AnalysisResponse {
    fn from(classification: DnaClassification) -> Self {
        Self {
            dna_primary: classification.primary.to_string(),
            dna_secondary: classification.secondary.to_string(),
            score_breakdown: classification.scores,
        }
    }
}

impl From<UserDnaRecord> for AnalysisResponse {
    fn from(record: UserDnaRecord) -> Self {
        Self {
            dna_primary: record.dna_primary,
            dna_secondary: record.dna_secondary,
            score_breakdown: record.score_breakdown.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardMetrics {
    pub repos: u32,
    pub stars: u32,
    pub followers: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    pub username: String,
    pub avatar_url: Option<String>,
    pub dna_primary: String,
    pub dna_secondary: String,
    pub score: u32,
    pub metrics: LeaderboardMetrics,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisitResponse {
    pub visit_count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentUser {
    pub username: String,
    pub avatar_url: Option<String>,
    pub dna_primary: String,
    pub analyzed_at: DateTime<Utc>,
}

impl From<RecentUserRow> for RecentUser {
    fn from(row: RecentUserRow) -> Self {
        Self {
            username: row.username,
            avatar_url: row.avatar_url,
            dna_primary: row.dna_primary,
            analyzed_at: row.analyzed_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub total_users: i64,
    pub total_visits: i64,
    pub dna_distribution: HashMap<String, i64>,
    pub recent_users: Vec<RecentUser>,
}

impl From<Statistics> for StatisticsResponse {
    fn from(value: Statistics) -> Self {
        Self {
            total_users: value.total_users,
            total_visits: value.total_visits,
            dna_distribution: value.dna_distribution.into_iter().collect(),
            recent_users: value.recent_users.into_iter().map(Into::into).collect(),
        }
    }
}

/// Error body shared by every failing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    /// Seconds until the caller may retry, present on 429 responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// Upstream quota reset as epoch milliseconds, when GitHub reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<i64>,
}

impl ErrorResponse {
    pub fn new(error: String) -> Self {
        Self {
            error,
            retry_after: None,
            tier: None,
            reset_at: None,
        }
    }
}
