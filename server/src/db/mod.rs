use rocket::{
    fairing::{self, AdHoc},
    Build, Rocket,
};
use rocket_db_pools::Database;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use crate::rate_limit::Tier;

pub mod types;

use types::{
    InsertUserOutcome, NewUserRecord, RateLimitRow, RecentUserRow, Statistics, UserDnaRecord,
};

#[derive(Database, Clone, Debug)]
#[database("github_dna")]
pub struct DB(PgPool);

const USER_COLUMNS: &str = "id, github_id, username, avatar_url, dna_primary, dna_secondary, \
                            score_breakdown, raw_metrics, analyzed_at";

impl DB {
    /// Cache lookup for the analyze path: exact match on the stored
    /// username, which is GitHub's canonical casing.
    #[instrument(skip(self))]
    pub async fn get_user_by_username(
        &self,
        username: &str,
    ) -> anyhow::Result<Option<UserDnaRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, UserDnaRecord>(&query)
            .bind(username)
            .fetch_optional(&self.0)
            .await?)
    }

    /// Recovery lookup after a duplicate-key insert, keyed by the external
    /// identity rather than the username.
    #[instrument(skip(self))]
    pub async fn get_user_by_github_id(
        &self,
        github_id: i64,
    ) -> anyhow::Result<Option<UserDnaRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE github_id = $1");
        Ok(sqlx::query_as::<_, UserDnaRecord>(&query)
            .bind(github_id)
            .fetch_optional(&self.0)
            .await?)
    }

    /// Inserts a freshly analyzed account. Unique-constraint conflicts are
    /// reported as an outcome, not an error, so the caller can resolve the
    /// concurrent-analysis race.
    #[instrument(skip(self, record), fields(username = %record.username))]
    pub async fn insert_user(&self, record: &NewUserRecord) -> anyhow::Result<InsertUserOutcome> {
        let query = format!(
            "INSERT INTO users (github_id, username, avatar_url, dna_primary, dna_secondary, \
             score_breakdown, raw_metrics, analyzed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now())
             RETURNING {USER_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, UserDnaRecord>(&query)
            .bind(record.github_id)
            .bind(&record.username)
            .bind(&record.avatar_url)
            .bind(&record.dna_primary)
            .bind(&record.dna_secondary)
            .bind(Json(&record.score_breakdown))
            .bind(Json(&record.raw_metrics))
            .fetch_one(&self.0)
            .await;

        match inserted {
            Ok(user) => Ok(InsertUserOutcome::Created(user)),
            Err(e)
                if e.as_database_error()
                    .is_some_and(|db_error| db_error.is_unique_violation()) =>
            {
                Ok(InsertUserOutcome::DuplicateKey)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All analyzed users carrying raw metrics, newest first. Input to the
    /// leaderboard ranker.
    #[instrument(skip(self))]
    pub async fn leaderboard_candidates(&self) -> anyhow::Result<Vec<UserDnaRecord>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE raw_metrics IS NOT NULL \
             ORDER BY analyzed_at DESC"
        );
        Ok(sqlx::query_as::<_, UserDnaRecord>(&query)
            .fetch_all(&self.0)
            .await?)
    }

    pub async fn get_rate_limit(
        &self,
        identifier: &str,
        action: &str,
    ) -> anyhow::Result<Option<RateLimitRow>> {
        Ok(sqlx::query_as::<_, RateLimitRow>(
            "SELECT count, reset_time FROM rate_limits WHERE identifier = $1 AND action = $2",
        )
        .bind(identifier)
        .bind(action)
        .fetch_optional(&self.0)
        .await?)
    }

    pub async fn insert_rate_limit(
        &self,
        identifier: &str,
        action: &str,
        reset_time: i64,
        tier: Tier,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO rate_limits (identifier, action, count, reset_time, tier)
             VALUES ($1, $2, 1, $3, $4)
             ON CONFLICT (identifier, action) DO NOTHING",
        )
        .bind(identifier)
        .bind(action)
        .bind(reset_time)
        .bind(tier.to_string())
        .execute(&self.0)
        .await?;
        Ok(())
    }

    /// Restarts an expired window with a fresh count of one.
    pub async fn reset_rate_limit(
        &self,
        identifier: &str,
        action: &str,
        reset_time: i64,
        tier: Tier,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE rate_limits SET count = 1, reset_time = $3, tier = $4, updated_at = now()
             WHERE identifier = $1 AND action = $2",
        )
        .bind(identifier)
        .bind(action)
        .bind(reset_time)
        .bind(tier.to_string())
        .execute(&self.0)
        .await?;
        Ok(())
    }

    pub async fn increment_rate_limit(
        &self,
        identifier: &str,
        action: &str,
        count: i32,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE rate_limits SET count = $3, updated_at = now()
             WHERE identifier = $1 AND action = $2",
        )
        .bind(identifier)
        .bind(action)
        .bind(count)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    pub async fn get_user_tier(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT tier FROM user_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.0)
                .await?;
        Ok(row.map(|(tier,)| tier))
    }

    /// Resolves a bearer token to its owning user id.
    pub async fn get_token_user(&self, token: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM api_tokens WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.0)
                .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    /// One-hour dedup window per `(ip_hash, path)` pair.
    pub async fn has_recent_visit(&self, ip_hash: &str, path: &str) -> anyhow::Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT id FROM visits
             WHERE ip_hash = $1 AND path = $2 AND created_at >= now() - INTERVAL '1 hour'
             LIMIT 1",
        )
        .bind(ip_hash)
        .bind(path)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.is_some())
    }

    pub async fn insert_visit(
        &self,
        path: &str,
        ip_hash: &str,
        user_agent: Option<&str>,
        referrer: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO visits (path, ip_hash, user_agent, referrer) VALUES ($1, $2, $3, $4)",
        )
        .bind(path)
        .bind(ip_hash)
        .bind(user_agent)
        .bind(referrer)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    pub async fn count_visits(&self, path: &str) -> anyhow::Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits WHERE path = $1")
            .bind(path)
            .fetch_one(&self.0)
            .await?;
        Ok(row.0)
    }

    #[instrument(skip(self))]
    pub async fn statistics(&self) -> anyhow::Result<Statistics> {
        let total_users: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.0)
            .await?;
        let total_visits: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits")
            .fetch_one(&self.0)
            .await?;
        let dna_distribution: Vec<(String, i64)> = sqlx::query_as(
            "SELECT dna_primary, COUNT(*) FROM users GROUP BY dna_primary",
        )
        .fetch_all(&self.0)
        .await?;
        let recent_users = sqlx::query_as::<_, RecentUserRow>(
            "SELECT username, avatar_url, dna_primary, analyzed_at FROM users
             ORDER BY analyzed_at DESC LIMIT 10",
        )
        .fetch_all(&self.0)
        .await?;

        Ok(Statistics {
            total_users: total_users.0,
            total_visits: total_visits.0,
            dna_distribution,
            recent_users,
        })
    }
}

async fn run_migrations(rocket: Rocket<Build>) -> fairing::Result {
    match DB::fetch(&rocket) {
        Some(db) => match sqlx::migrate!("./migrations").run(&**db).await {
            Ok(_) => Ok(rocket),
            Err(e) => {
                rocket::error!("Failed to initialize SQLx database: {}", e);
                Err(rocket)
            }
        },
        None => Err(rocket),
    }
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("SQLx Stage", |rocket| async {
        // Fairings attached here run after every build-time attach, so the
        // limiter stage is queued from this callback: attached any earlier
        // it would ignite before DB::init and find no managed pool.
        rocket
            .attach(DB::init())
            .attach(AdHoc::try_on_ignite("SQLx Migrations", run_migrations))
            .attach(crate::rate_limit::stage())
    })
}
