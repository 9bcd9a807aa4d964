use async_trait::async_trait;
use chrono::Utc;
use rocket::request::{FromRequest, Outcome, Request};
use tracing::{info, instrument, warn};

use crate::api::github::{GithubAccount, GithubClient};
use crate::db::types::{InsertUserOutcome, NewUserRecord, UserDnaRecord};
use crate::db::DB;
use crate::dna::{self, RawMetrics};
use crate::error::{AnalyzeError, FetchError};
use crate::rate_limit::{resolve_tier, AnalysisLimiter, RateDecision, Tier};
use crate::types::AnalysisResponse;

/// GitHub's own username length ceiling.
pub const MAX_USERNAME_LEN: usize = 39;

/// What a request carries before authentication: an optional bearer token
/// and the client network identity used for anonymous rate limiting.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: Option<String>,
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Credentials {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = req
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::to_string);

        let client_ip = req
            .headers()
            .get_one("x-forwarded-for")
            .and_then(|forwarded| forwarded.split(',').next())
            .map(|ip| ip.trim().to_string())
            .or_else(|| req.headers().get_one("x-real-ip").map(str::to_string))
            .or_else(|| req.client_ip().map(|ip| ip.to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        Outcome::Success(Credentials {
            token,
            client_ip,
            user_agent: req.headers().get_one("user-agent").map(str::to_string),
            referrer: req.headers().get_one("referer").map(str::to_string),
        })
    }
}

pub fn validate_username(username: &str) -> Result<(), AnalyzeError> {
    if username.is_empty() {
        return Err(AnalyzeError::Validation("Username is required".to_string()));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(AnalyzeError::Validation(
            "Invalid username format".to_string(),
        ));
    }
    Ok(())
}

/// The slice of storage the analyze pipeline touches.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn get_user_by_username(&self, username: &str)
        -> anyhow::Result<Option<UserDnaRecord>>;
    async fn get_user_by_github_id(&self, github_id: i64)
        -> anyhow::Result<Option<UserDnaRecord>>;
    async fn insert_user(&self, record: &NewUserRecord) -> anyhow::Result<InsertUserOutcome>;
}

#[async_trait]
impl AnalysisStore for DB {
    async fn get_user_by_username(
        &self,
        username: &str,
    ) -> anyhow::Result<Option<UserDnaRecord>> {
        DB::get_user_by_username(self, username).await
    }

    async fn get_user_by_github_id(
        &self,
        github_id: i64,
    ) -> anyhow::Result<Option<UserDnaRecord>> {
        DB::get_user_by_github_id(self, github_id).await
    }

    async fn insert_user(&self, record: &NewUserRecord) -> anyhow::Result<InsertUserOutcome> {
        DB::insert_user(self, record).await
    }
}

/// The upstream capability the pipeline needs.
#[async_trait]
pub trait FetchAccount: Send + Sync {
    async fn fetch_account(&self, username: &str) -> Result<GithubAccount, FetchError>;
}

#[async_trait]
impl FetchAccount for GithubClient {
    async fn fetch_account(&self, username: &str) -> Result<GithubAccount, FetchError> {
        GithubClient::fetch_account(self, username).await
    }
}

/// The analyze use case: authenticate, gate, validate, then defer to
/// [`load_or_analyze`]. An account is analyzed at most once.
#[instrument(skip(db, github, limiter, credentials))]
pub async fn analyze(
    db: &DB,
    github: &GithubClient,
    limiter: &AnalysisLimiter,
    credentials: &Credentials,
    username: &str,
) -> Result<AnalysisResponse, AnalyzeError> {
    let user_id = match &credentials.token {
        Some(token) => match db.get_token_user(token).await {
            Ok(Some(user_id)) => Some(user_id),
            Ok(None) => return Err(AnalyzeError::AuthInvalid),
            Err(e) => return Err(AnalyzeError::Storage(e)),
        },
        None => None,
    };

    // Authenticated callers are tracked by user id, everyone else by
    // client address. A failed tier lookup is labeled FREE; the persistent
    // check below will hit the same outage and degrade on its own.
    let identifier = user_id
        .clone()
        .unwrap_or_else(|| credentials.client_ip.clone());
    let tier = match resolve_tier(db, user_id.as_deref()).await {
        Ok(tier) => tier,
        Err(e) => {
            warn!("Failed to resolve tier for {identifier}: {e:#}");
            Tier::Free
        }
    };
    if let RateDecision::Denied { reset_in_ms, tier } = limiter.check(&identifier, tier).await {
        return Err(AnalyzeError::RateLimited { reset_in_ms, tier });
    }

    validate_username(username)?;

    load_or_analyze(db, github, username).await
}

/// Cache-or-compute core of the pipeline: a stored record short-circuits
/// before any upstream call, a fresh account is fetched, scored and
/// inserted exactly once, and concurrent first analyses converge on the
/// single row the unique constraint admits.
pub async fn load_or_analyze<S, G>(
    store: &S,
    github: &G,
    username: &str,
) -> Result<AnalysisResponse, AnalyzeError>
where
    S: AnalysisStore,
    G: FetchAccount,
{
    if let Some(existing) = store
        .get_user_by_username(username)
        .await
        .map_err(AnalyzeError::Storage)?
    {
        info!("User {username} already analyzed");
        return Ok(existing.into());
    }

    let account = github.fetch_account(username).await?;
    let metrics = RawMetrics::from_account(&account, Utc::now());
    let classification = dna::score(&metrics);

    let record = NewUserRecord {
        github_id: account.id,
        username: account.login.clone(),
        avatar_url: account.avatar_url.clone(),
        dna_primary: classification.primary.to_string(),
        dna_secondary: classification.secondary.to_string(),
        score_breakdown: classification.scores,
        raw_metrics: metrics,
    };

    match store
        .insert_user(&record)
        .await
        .map_err(AnalyzeError::Storage)?
    {
        InsertUserOutcome::Created(user) => Ok(user.into()),
        InsertUserOutcome::DuplicateKey => {
            // A concurrent analysis finished first; serve its record.
            info!("Concurrent analysis won for {}, re-reading", account.login);
            store
                .get_user_by_github_id(account.id)
                .await
                .map_err(AnalyzeError::Storage)?
                .map(Into::into)
                .ok_or_else(|| {
                    AnalyzeError::Storage(anyhow::anyhow!(
                        "duplicate key reported but no row found for github_id {}",
                        account.id
                    ))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sqlx::types::Json;

    use super::*;
    use crate::api::github::GithubRepo;

    #[test]
    fn empty_usernames_are_rejected() {
        assert!(matches!(
            validate_username(""),
            Err(AnalyzeError::Validation(_))
        ));
    }

    #[test]
    fn usernames_at_the_github_ceiling_pass() {
        let at_limit = "a".repeat(MAX_USERNAME_LEN);
        assert!(validate_username(&at_limit).is_ok());

        let over_limit = "a".repeat(MAX_USERNAME_LEN + 1);
        assert!(matches!(
            validate_username(&over_limit),
            Err(AnalyzeError::Validation(_))
        ));
    }

    #[derive(Default)]
    struct StubStore {
        existing: Option<UserDnaRecord>,
        winner: Option<UserDnaRecord>,
        duplicate_on_insert: bool,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisStore for StubStore {
        async fn get_user_by_username(
            &self,
            _: &str,
        ) -> anyhow::Result<Option<UserDnaRecord>> {
            Ok(self.existing.clone())
        }

        async fn get_user_by_github_id(
            &self,
            _: i64,
        ) -> anyhow::Result<Option<UserDnaRecord>> {
            Ok(self.winner.clone())
        }

        async fn insert_user(
            &self,
            record: &NewUserRecord,
        ) -> anyhow::Result<InsertUserOutcome> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.duplicate_on_insert {
                return Ok(InsertUserOutcome::DuplicateKey);
            }
            Ok(InsertUserOutcome::Created(UserDnaRecord {
                id: 1,
                github_id: record.github_id,
                username: record.username.clone(),
                avatar_url: record.avatar_url.clone(),
                dna_primary: record.dna_primary.clone(),
                dna_secondary: record.dna_secondary.clone(),
                score_breakdown: Json(record.score_breakdown.clone()),
                raw_metrics: Some(Json(record.raw_metrics.clone())),
                analyzed_at: Utc::now(),
            }))
        }
    }

    #[derive(Default)]
    struct StubFetcher {
        account: Option<GithubAccount>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FetchAccount for StubFetcher {
        async fn fetch_account(&self, _: &str) -> Result<GithubAccount, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.account.clone().ok_or(FetchError::NotFound)
        }
    }

    fn stored_record(username: &str, github_id: i64) -> UserDnaRecord {
        UserDnaRecord {
            id: 7,
            github_id,
            username: username.to_string(),
            avatar_url: None,
            dna_primary: "architect".to_string(),
            dna_secondary: "builder".to_string(),
            score_breakdown: Json(Default::default()),
            raw_metrics: None,
            analyzed_at: Utc::now(),
        }
    }

    fn account(github_id: i64, login: &str) -> GithubAccount {
        GithubAccount {
            id: github_id,
            login: login.to_string(),
            avatar_url: None,
            followers: 1,
            public_repos: 1,
            repos: vec![GithubRepo {
                stargazers_count: 3,
                forks_count: 1,
                language: Some("Rust".to_string()),
                updated_at: None,
                created_at: None,
                size: 100,
                has_readme: true,
                license: None,
                fork: false,
            }],
        }
    }

    #[rocket::async_test]
    async fn a_cached_record_short_circuits_the_upstream_fetch() {
        let store = StubStore {
            existing: Some(stored_record("octocat", 1234)),
            ..StubStore::default()
        };
        let fetcher = StubFetcher::default();

        let response = load_or_analyze(&store, &fetcher, "octocat").await.unwrap();
        assert_eq!(response.dna_primary, "architect");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[rocket::async_test]
    async fn an_unknown_user_persists_nothing() {
        let store = StubStore::default();
        let fetcher = StubFetcher::default();

        let result = load_or_analyze(&store, &fetcher, "ghost").await;
        assert!(matches!(
            result,
            Err(AnalyzeError::Fetch(FetchError::NotFound))
        ));
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[rocket::async_test]
    async fn a_fresh_account_is_fetched_and_inserted_once() {
        let store = StubStore::default();
        let fetcher = StubFetcher {
            account: Some(account(42, "newbie")),
            ..StubFetcher::default()
        };

        let response = load_or_analyze(&store, &fetcher, "newbie").await.unwrap();
        assert!(!response.dna_primary.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    }

    #[rocket::async_test]
    async fn concurrent_first_analyses_converge_on_the_winning_record() {
        // The stored winner carries a primary the stub account's metrics
        // would never produce, so serving it proves the re-read happened.
        let store = StubStore {
            winner: Some(stored_record("octocat", 1234)),
            duplicate_on_insert: true,
            ..StubStore::default()
        };
        let fetcher = StubFetcher {
            account: Some(account(1234, "octocat")),
            ..StubFetcher::default()
        };

        let response = load_or_analyze(&store, &fetcher, "octocat").await.unwrap();
        assert_eq!(response.dna_primary, "architect");
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    }
}
