use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use utoipa::ToSchema;

use crate::api::github::GithubAccount;

/// Repositories updated/created within this horizon count as "recent".
/// Six months approximated as 6x30 days, matching the analysis contract.
pub const RECENCY_HORIZON_DAYS: i64 = 6 * 30;

/// The seven developer personality categories. Declaration order is the
/// fixed iteration order of the weight table and breaks ties between
/// equally scored categories.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DnaType {
    Architect,
    Fixer,
    Sprinter,
    Nightowl,
    Experimenter,
    Lonewolf,
    Builder,
}

impl DnaType {
    /// Fixed leaderboard multiplier per personality.
    pub const fn leaderboard_multiplier(self) -> f64 {
        match self {
            DnaType::Architect => 1.20,
            DnaType::Builder => 1.15,
            DnaType::Fixer => 1.10,
            DnaType::Experimenter => 1.05,
            DnaType::Nightowl => 1.00,
            DnaType::Sprinter => 0.95,
            DnaType::Lonewolf => 0.90,
        }
    }
}

pub type ScoreBreakdown = BTreeMap<DnaType, u32>;

/// Aggregate counts derived once per analysis from the fetched repository
/// list. Field names follow the persisted JSON shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMetrics {
    pub total_repos: u32,
    pub total_stars: u32,
    pub total_forks: u32,
    pub followers: u32,
    pub languages: HashMap<String, u32>,
    pub recent_activity: u32,
    pub average_repo_size: f64,
    pub has_readme: u32,
    pub has_license: u32,
    pub is_fork: u32,
    pub created_recently: u32,
}

impl RawMetrics {
    pub fn from_account(account: &GithubAccount, analyzed_at: DateTime<Utc>) -> Self {
        let horizon = analyzed_at - Duration::days(RECENCY_HORIZON_DAYS);

        let mut metrics = Self {
            total_repos: account.repos.len() as u32,
            followers: account.followers,
            ..Self::default()
        };

        let mut total_size: u64 = 0;
        for repo in &account.repos {
            metrics.total_stars += repo.stargazers_count;
            metrics.total_forks += repo.forks_count;
            total_size += u64::from(repo.size);

            if let Some(language) = &repo.language {
                *metrics.languages.entry(language.clone()).or_default() += 1;
            }
            if repo.updated_at.is_some_and(|updated| updated > horizon) {
                metrics.recent_activity += 1;
            }
            if repo.created_at.is_some_and(|created| created > horizon) {
                metrics.created_recently += 1;
            }
            if repo.has_readme {
                metrics.has_readme += 1;
            }
            if repo.license.is_some() {
                metrics.has_license += 1;
            }
            if repo.fork {
                metrics.is_fork += 1;
            }
        }

        metrics.average_repo_size = total_size as f64 / metrics.total_repos.max(1) as f64;
        metrics
    }

    pub fn distinct_languages(&self) -> u32 {
        self.languages.len() as u32
    }

    /// Whether any activity signal is present at all. Records failing this
    /// check are treated as incomplete analyses and excluded from ranking.
    pub fn has_activity(&self) -> bool {
        self.total_repos > 0 || self.total_stars > 0 || self.followers > 0 || self.total_forks > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnaClassification {
    pub primary: DnaType,
    pub secondary: DnaType,
    pub scores: ScoreBreakdown,
}

/// Fixed linear weight table, one formula per category.
fn raw_score(category: DnaType, m: &RawMetrics) -> f64 {
    let languages = f64::from(m.distinct_languages());
    let repos = f64::from(m.total_repos);
    match category {
        DnaType::Architect => {
            f64::from(m.total_stars) * 0.3 + repos * 0.2 + languages * 0.5
        }
        DnaType::Fixer => {
            f64::from(m.total_forks) * 0.4 + f64::from(m.recent_activity) * 0.6
        }
        DnaType::Sprinter => {
            f64::from(m.created_recently) * 0.5
                + (10_000.0 - m.average_repo_size) * 0.0001
                + repos * 0.3
        }
        DnaType::Nightowl => f64::from(m.recent_activity) * 0.5,
        DnaType::Experimenter => languages * 0.6 + repos * 0.4,
        DnaType::Lonewolf => {
            let stars_per_repo = f64::from(m.total_stars) / f64::from(m.total_repos.max(1));
            stars_per_repo * 0.7 + (10.0 - repos) * 0.3
        }
        DnaType::Builder => {
            m.average_repo_size * 0.0001
                + f64::from(m.has_readme) * 0.3
                + f64::from(m.has_license) * 0.3
        }
    }
}

/// Pure scoring function: computes the 7 raw category scores, normalizes
/// against the maximum so the top category lands at exactly 100, and picks
/// the two leading categories by stable descending sort.
pub fn score(metrics: &RawMetrics) -> DnaClassification {
    let raw: Vec<(DnaType, f64)> = DnaType::iter()
        .map(|category| (category, raw_score(category, metrics)))
        .collect();

    let max = raw
        .iter()
        .map(|(_, score)| *score)
        .fold(f64::MIN, f64::max)
        .max(f64::EPSILON);

    let mut normalized: Vec<(DnaType, u32)> = raw
        .into_iter()
        .map(|(category, score)| {
            let scaled = (score / max * 100.0).round();
            (category, scaled.clamp(0.0, 100.0) as u32)
        })
        .collect();

    let scores: ScoreBreakdown = normalized.iter().copied().collect();

    // Stable sort keeps the weight-table order between equal scores.
    normalized.sort_by(|a, b| b.1.cmp(&a.1));
    let primary = normalized[0].0;
    let secondary = normalized[1].0;

    DnaClassification {
        primary,
        secondary,
        scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::github::GithubRepo;

    fn metrics(
        total_repos: u32,
        total_stars: u32,
        total_forks: u32,
        languages: &[(&str, u32)],
        recent_activity: u32,
        created_recently: u32,
        average_repo_size: f64,
        has_readme: u32,
        has_license: u32,
    ) -> RawMetrics {
        RawMetrics {
            total_repos,
            total_stars,
            total_forks,
            languages: languages
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
            recent_activity,
            created_recently,
            average_repo_size,
            has_readme,
            has_license,
            ..RawMetrics::default()
        }
    }

    #[test]
    fn top_category_normalizes_to_exactly_100() {
        let m = metrics(12, 340, 25, &[("Rust", 8), ("Go", 4)], 6, 2, 1500.0, 9, 5, );
        let classification = score(&m);

        let max = classification.scores.values().max().copied().unwrap();
        assert_eq!(max, 100);
        assert_eq!(classification.scores[&classification.primary], 100);
        assert_eq!(
            classification
                .scores
                .values()
                .filter(|&&value| value == 100)
                .count(),
            1
        );
        for value in classification.scores.values() {
            assert!(*value <= 100);
        }
        assert_eq!(classification.scores.len(), 7);
        assert_ne!(classification.primary, classification.secondary);
    }

    #[test]
    fn scoring_is_deterministic() {
        let m = metrics(5, 40, 3, &[("Python", 5)], 2, 1, 800.0, 3, 1);
        assert_eq!(score(&m), score(&m));
    }

    #[test]
    fn zero_repositories_degrade_finitely() {
        let m = RawMetrics {
            followers: 7,
            ..RawMetrics::default()
        };
        let classification = score(&m);

        for value in classification.scores.values() {
            assert!(*value <= 100);
        }
        // Lonewolf dominates an empty account: 0.7 * 0 + 0.3 * 10.
        assert_eq!(classification.primary, DnaType::Lonewolf);
        assert_eq!(classification.scores[&DnaType::Lonewolf], 100);
    }

    #[test]
    fn negative_raw_scores_clamp_to_zero() {
        // 15 repos push the lonewolf formula negative: 0.3 * (10 - 15).
        let m = metrics(15, 0, 0, &[("C", 15)], 0, 0, 100.0, 0, 0);
        let classification = score(&m);
        assert_eq!(classification.scores[&DnaType::Lonewolf], 0);
    }

    #[test]
    fn three_repo_scenario_matches_weight_table_literally() {
        let analyzed_at = Utc::now();
        let recent = analyzed_at - Duration::days(30);
        let old = analyzed_at - Duration::days(300);

        let account = GithubAccount {
            id: 1234,
            login: "octocat".to_string(),
            avatar_url: Some("https://avatars.githubusercontent.com/u/1234".to_string()),
            followers: 4,
            public_repos: 3,
            repos: vec![
                GithubRepo {
                    stargazers_count: 2,
                    forks_count: 1,
                    language: Some("Rust".to_string()),
                    updated_at: Some(recent),
                    created_at: Some(analyzed_at - Duration::days(400)),
                    size: 1200,
                    has_readme: true,
                    license: Some(crate::api::github::GithubLicense {
                        spdx_id: Some("MIT".to_string()),
                    }),
                    fork: false,
                },
                GithubRepo {
                    stargazers_count: 0,
                    forks_count: 0,
                    language: Some("TypeScript".to_string()),
                    updated_at: Some(old),
                    created_at: Some(analyzed_at - Duration::days(500)),
                    size: 300,
                    has_readme: false,
                    license: None,
                    fork: true,
                },
                GithubRepo {
                    stargazers_count: 5,
                    forks_count: 2,
                    language: Some("Rust".to_string()),
                    updated_at: Some(analyzed_at - Duration::days(250)),
                    created_at: Some(analyzed_at - Duration::days(420)),
                    size: 4500,
                    has_readme: true,
                    license: None,
                    fork: false,
                },
            ],
        };

        let m = RawMetrics::from_account(&account, analyzed_at);
        assert_eq!(m.total_repos, 3);
        assert_eq!(m.total_stars, 7);
        assert_eq!(m.total_forks, 3);
        assert_eq!(m.followers, 4);
        assert_eq!(m.distinct_languages(), 2);
        assert_eq!(m.recent_activity, 1);
        assert_eq!(m.created_recently, 0);
        assert_eq!(m.average_repo_size, 2000.0);
        assert_eq!(m.has_readme, 2);
        assert_eq!(m.has_license, 1);
        assert_eq!(m.is_fork, 1);

        // Raw scores from the weight table:
        //   architect    0.3*7 + 0.2*3 + 0.5*2            = 3.7
        //   fixer        0.4*3 + 0.6*1                    = 1.8
        //   sprinter     0.5*0 + 0.0001*8000 + 0.3*3      = 1.7
        //   nightowl     0.5*1                            = 0.5
        //   experimenter 0.6*2 + 0.4*3                    = 2.4
        //   lonewolf     0.7*(7/3) + 0.3*7                = 3.7333...
        //   builder      0.0001*2000 + 0.3*2 + 0.3*1      = 1.1
        let classification = score(&m);
        assert_eq!(classification.primary, DnaType::Lonewolf);
        assert_eq!(classification.secondary, DnaType::Architect);
        assert_eq!(classification.scores[&DnaType::Architect], 99);
        assert_eq!(classification.scores[&DnaType::Fixer], 48);
        assert_eq!(classification.scores[&DnaType::Sprinter], 46);
        assert_eq!(classification.scores[&DnaType::Nightowl], 13);
        assert_eq!(classification.scores[&DnaType::Experimenter], 64);
        assert_eq!(classification.scores[&DnaType::Lonewolf], 100);
        assert_eq!(classification.scores[&DnaType::Builder], 29);
    }

    #[test]
    fn leaderboard_multipliers_span_architect_down_to_lonewolf() {
        let max = DnaType::iter()
            .map(DnaType::leaderboard_multiplier)
            .fold(f64::MIN, f64::max);
        assert_eq!(max, DnaType::Architect.leaderboard_multiplier());
        assert_eq!(DnaType::Architect.leaderboard_multiplier(), 1.20);
        assert_eq!(DnaType::Lonewolf.leaderboard_multiplier(), 0.90);
    }

    #[test]
    fn breakdown_serializes_with_lowercase_category_keys() {
        let m = metrics(2, 1, 0, &[("Rust", 2)], 0, 0, 10.0, 1, 0);
        let json = serde_json::to_value(score(&m).scores).unwrap();
        assert!(json.get("architect").is_some());
        assert!(json.get("lonewolf").is_some());
    }
}
