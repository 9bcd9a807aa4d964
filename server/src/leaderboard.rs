use std::cmp::Ordering;
use std::str::FromStr;

use futures::future::join_all;
use itertools::Itertools;
use tracing::{instrument, warn};

use crate::api::github::GithubClient;
use crate::db::types::UserDnaRecord;
use crate::db::DB;
use crate::dna::{DnaType, RawMetrics};
use crate::types::{LeaderboardEntry, LeaderboardMetrics};

/// Only this many preliminary leaders are eligible for a live follower
/// refresh; everyone below uses stored data as-is.
const REFRESH_TOP: usize = 10;
const MAX_ENTRIES: usize = 50;

/// Per-repo/star/follower point weights of the leaderboard formula.
const REPO_POINTS: u32 = 10;
const STAR_POINTS: u32 = 5;
const FOLLOWER_POINTS: u32 = 20;
const FORK_POINTS: u32 = 3;
const ACTIVITY_POINTS: u32 = 15;
const README_POINTS: u32 = 25;
const LICENSE_POINTS: u32 = 25;
const LANGUAGE_POINTS: u32 = 10;
const BALANCED_SIZE_BONUS: u32 = 50;
const BALANCED_SIZE_CEILING: f64 = 100_000.0;

/// The comparable leaderboard score: a weighted sum of stored aggregates
/// scaled by the primary-DNA multiplier, floored at zero. Distinct from
/// the DNA scoring formulas. An unrecognized DNA type scales by 1.0.
pub fn leaderboard_score(metrics: &RawMetrics, dna_primary: Option<DnaType>) -> f64 {
    let size_bonus = if metrics.average_repo_size > 0.0
        && metrics.average_repo_size < BALANCED_SIZE_CEILING
    {
        BALANCED_SIZE_BONUS
    } else {
        0
    };

    let base = metrics.total_repos * REPO_POINTS
        + metrics.total_stars * STAR_POINTS
        + metrics.followers * FOLLOWER_POINTS
        + metrics.total_forks * FORK_POINTS
        + metrics.recent_activity * ACTIVITY_POINTS
        + metrics.has_readme * README_POINTS
        + metrics.has_license * LICENSE_POINTS
        + metrics.distinct_languages() * LANGUAGE_POINTS
        + size_bonus;

    let multiplier = dna_primary.map_or(1.0, DnaType::leaderboard_multiplier);
    (f64::from(base) * multiplier).max(0.0)
}

struct Candidate {
    record: UserDnaRecord,
    metrics: RawMetrics,
    dna_primary: Option<DnaType>,
    score: f64,
}

impl Candidate {
    fn from_record(record: UserDnaRecord) -> Option<Self> {
        let metrics = record.raw_metrics.as_ref()?.0.clone();
        if !metrics.has_activity() {
            return None;
        }
        let dna_primary = DnaType::from_str(&record.dna_primary).ok();
        let score = leaderboard_score(&metrics, dna_primary);
        Some(Self {
            record,
            metrics,
            dna_primary,
            score,
        })
    }

    fn into_entry(self) -> LeaderboardEntry {
        LeaderboardEntry {
            username: self.record.username,
            avatar_url: self.record.avatar_url,
            dna_primary: self.record.dna_primary,
            dna_secondary: self.record.dna_secondary,
            score: self.score.round() as u32,
            metrics: LeaderboardMetrics {
                repos: self.metrics.total_repos,
                stars: self.metrics.total_stars,
                followers: self.metrics.followers,
            },
            analyzed_at: self.record.analyzed_at,
        }
    }
}

fn sort_descending(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Ranks every stored analysis: filter out inactive records, score, refresh
/// missing follower counts for the preliminary top entries, then sort and
/// truncate. A failed refresh never aborts the ranking.
#[instrument(skip(db, github))]
pub async fn rank(db: &DB, github: &GithubClient) -> anyhow::Result<Vec<LeaderboardEntry>> {
    let records = db.leaderboard_candidates().await?;

    let mut candidates: Vec<Candidate> = records
        .into_iter()
        .filter_map(Candidate::from_record)
        .collect();
    sort_descending(&mut candidates);

    // Records stored before follower tracking carry a zero count; refresh
    // those among the preliminary leaders from the live API.
    let refreshes = candidates
        .iter()
        .take(REFRESH_TOP)
        .enumerate()
        .filter(|(_, candidate)| candidate.metrics.followers == 0)
        .map(|(index, candidate)| {
            let username = candidate.record.username.clone();
            async move { (index, github.fetch_followers(&username).await) }
        });

    for (index, refreshed) in join_all(refreshes).await {
        match refreshed {
            Ok(followers) => {
                let candidate = &mut candidates[index];
                candidate.metrics.followers = followers;
                candidate.score = leaderboard_score(&candidate.metrics, candidate.dna_primary);
            }
            Err(e) => {
                warn!(
                    "Failed to refresh followers for {}: {e}",
                    candidates[index].record.username
                );
            }
        }
    }

    Ok(candidates
        .into_iter()
        .sorted_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        .take(MAX_ENTRIES)
        .map(Candidate::into_entry)
        .collect())
}
