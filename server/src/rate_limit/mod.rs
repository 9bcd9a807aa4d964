use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rocket::fairing::AdHoc;
use rocket::tokio::sync::Mutex;
use rocket_db_pools::Database;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::db::DB;

/// Action key for analyze-call counters in the persistent store.
pub const ANALYZE_ACTION: &str = "github_analysis";

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Leaderboard reads are gated purely in memory at 30 requests per minute
/// per client address.
pub const LEADERBOARD_REQUESTS: u32 = 30;
pub const LEADERBOARD_WINDOW_MS: i64 = MINUTE_MS;

// Conservative policy applied while the persistent store is unreachable.
const FALLBACK_REQUESTS: u32 = 5;
const FALLBACK_WINDOW_MS: i64 = 15 * MINUTE_MS;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Tier {
    Anonymous,
    Free,
    Premium,
    Admin,
    /// Reported when a decision came from the in-memory fallback path.
    Fallback,
}

#[derive(Debug, Clone, Copy)]
pub struct TierPolicy {
    pub requests: u32,
    pub window_ms: i64,
}

impl Tier {
    pub const fn policy(self) -> TierPolicy {
        let (requests, window_ms) = match self {
            Tier::Anonymous => (3, HOUR_MS),
            Tier::Free => (10, HOUR_MS),
            Tier::Premium => (50, HOUR_MS),
            Tier::Admin => (1000, HOUR_MS),
            Tier::Fallback => (FALLBACK_REQUESTS, FALLBACK_WINDOW_MS),
        };
        TierPolicy {
            requests,
            window_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        remaining: u32,
        reset_in_ms: i64,
        tier: Tier,
    },
    Denied {
        reset_in_ms: i64,
        tier: Tier,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// The check-and-consume capability shared by both limiter backends.
#[async_trait]
pub trait CheckAndConsume: Send + Sync {
    async fn check_and_consume(&self, identifier: &str, tier: Tier)
        -> anyhow::Result<RateDecision>;
}

/// Durable cross-process counters in the `rate_limits` table. The
/// read-then-write sequence is deliberately not wrapped in a transaction;
/// small over- or under-counts under race are an accepted approximation.
pub struct PersistentLimiter {
    db: DB,
    action: &'static str,
}

impl PersistentLimiter {
    pub fn new(db: DB, action: &'static str) -> Self {
        Self { db, action }
    }
}

#[async_trait]
impl CheckAndConsume for PersistentLimiter {
    #[instrument(skip(self))]
    async fn check_and_consume(
        &self,
        identifier: &str,
        tier: Tier,
    ) -> anyhow::Result<RateDecision> {
        let policy = tier.policy();
        let now_ms = Utc::now().timestamp_millis();

        let Some(row) = self.db.get_rate_limit(identifier, self.action).await? else {
            self.db
                .insert_rate_limit(identifier, self.action, now_ms + policy.window_ms, tier)
                .await?;
            return Ok(RateDecision::Allowed {
                remaining: policy.requests.saturating_sub(1),
                reset_in_ms: policy.window_ms,
                tier,
            });
        };

        if now_ms > row.reset_time {
            // The window restarts fully on the first request after expiry.
            self.db
                .reset_rate_limit(identifier, self.action, now_ms + policy.window_ms, tier)
                .await?;
            return Ok(RateDecision::Allowed {
                remaining: policy.requests.saturating_sub(1),
                reset_in_ms: policy.window_ms,
                tier,
            });
        }

        let next_count = row.count.saturating_add(1);
        if next_count as u32 > policy.requests {
            // A rejected call does not consume quota.
            return Ok(RateDecision::Denied {
                reset_in_ms: row.reset_time - now_ms,
                tier,
            });
        }

        self.db
            .increment_rate_limit(identifier, self.action, next_count)
            .await?;
        Ok(RateDecision::Allowed {
            remaining: policy.requests.saturating_sub(next_count as u32),
            reset_in_ms: row.reset_time - now_ms,
            tier,
        })
    }
}

struct WindowSlot {
    count: u32,
    reset_at_ms: i64,
}

/// Process-local counters, keyed by identifier alone. Created once at
/// process start, never persisted, safe to lose on restart.
pub struct InMemoryLimiter {
    requests: u32,
    window_ms: i64,
    slots: Mutex<HashMap<String, WindowSlot>>,
}

impl InMemoryLimiter {
    pub fn new(requests: u32, window_ms: i64) -> Self {
        Self {
            requests,
            window_ms,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn fallback() -> Self {
        Self::new(FALLBACK_REQUESTS, FALLBACK_WINDOW_MS)
    }

    pub async fn check(&self, identifier: &str, tier: Tier) -> RateDecision {
        let now_ms = Utc::now().timestamp_millis();
        let mut slots = self.slots.lock().await;
        Self::decide(&mut slots, identifier, tier, self.requests, self.window_ms, now_ms)
    }

    fn decide(
        slots: &mut HashMap<String, WindowSlot>,
        identifier: &str,
        tier: Tier,
        requests: u32,
        window_ms: i64,
        now_ms: i64,
    ) -> RateDecision {
        match slots.get_mut(identifier) {
            None => {
                slots.insert(
                    identifier.to_string(),
                    WindowSlot {
                        count: 1,
                        reset_at_ms: now_ms + window_ms,
                    },
                );
                RateDecision::Allowed {
                    remaining: requests.saturating_sub(1),
                    reset_in_ms: window_ms,
                    tier,
                }
            }
            Some(slot) if now_ms > slot.reset_at_ms => {
                slot.count = 1;
                slot.reset_at_ms = now_ms + window_ms;
                RateDecision::Allowed {
                    remaining: requests.saturating_sub(1),
                    reset_in_ms: window_ms,
                    tier,
                }
            }
            Some(slot) if slot.count >= requests => RateDecision::Denied {
                reset_in_ms: slot.reset_at_ms - now_ms,
                tier,
            },
            Some(slot) => {
                slot.count += 1;
                RateDecision::Allowed {
                    remaining: requests.saturating_sub(slot.count),
                    reset_in_ms: slot.reset_at_ms - now_ms,
                    tier,
                }
            }
        }
    }
}

#[async_trait]
impl CheckAndConsume for InMemoryLimiter {
    async fn check_and_consume(
        &self,
        identifier: &str,
        tier: Tier,
    ) -> anyhow::Result<RateDecision> {
        Ok(self.check(identifier, tier).await)
    }
}

/// Two-tier strategy: try the durable limiter first and degrade to the
/// in-memory one on any persistence fault. Callers always get a decision,
/// never an error; a database outage reduces quota precision, not
/// availability.
pub struct FallbackLimiter<P: CheckAndConsume = PersistentLimiter> {
    primary: P,
    fallback: InMemoryLimiter,
}

impl<P: CheckAndConsume> FallbackLimiter<P> {
    pub fn new(primary: P, fallback: InMemoryLimiter) -> Self {
        Self { primary, fallback }
    }

    pub async fn check(&self, identifier: &str, tier: Tier) -> RateDecision {
        match self.primary.check_and_consume(identifier, tier).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Rate limit store unavailable, falling back to in-memory counters: {e:#}");
                self.fallback.check(identifier, Tier::Fallback).await
            }
        }
    }
}

/// The limiter instance gating `POST /api/analyze`.
pub type AnalysisLimiter = FallbackLimiter<PersistentLimiter>;

/// Separately managed in-memory gate for the leaderboard endpoint.
pub struct LeaderboardGate(InMemoryLimiter);

impl LeaderboardGate {
    pub fn new() -> Self {
        Self(InMemoryLimiter::new(
            LEADERBOARD_REQUESTS,
            LEADERBOARD_WINDOW_MS,
        ))
    }

    pub async fn check(&self, client_ip: &str) -> RateDecision {
        self.0.check(client_ip, Tier::Anonymous).await
    }
}

impl Default for LeaderboardGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the rate-limit tier for an authenticated caller, defaulting to
/// FREE when no tier record exists. Anonymous callers never hit the store.
pub async fn resolve_tier(db: &DB, user_id: Option<&str>) -> anyhow::Result<Tier> {
    let Some(user_id) = user_id else {
        return Ok(Tier::Anonymous);
    };
    Ok(match db.get_user_tier(user_id).await? {
        Some(tier) => Tier::from_str(&tier).unwrap_or(Tier::Free),
        None => Tier::Free,
    })
}

pub fn stage() -> AdHoc {
    AdHoc::try_on_ignite("Rate limiters", |rocket| async {
        let Some(db) = DB::fetch(&rocket) else {
            rocket::error!("Failed to get DB connection for rate limiters");
            return Err(rocket);
        };
        let limiter = AnalysisLimiter::new(
            PersistentLimiter::new(db.clone(), ANALYZE_ACTION),
            InMemoryLimiter::fallback(),
        );
        Ok(rocket.manage(limiter).manage(LeaderboardGate::new()))
    })
}
