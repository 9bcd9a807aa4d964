use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{instrument, warn};

use crate::error::FetchError;

mod types;
pub use types::*;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only client for the public GitHub REST API. An optional personal
/// token raises the upstream quota but is not required.
#[derive(Clone, Debug)]
pub struct GithubClient {
    octocrab: octocrab::Octocrab,
}

impl GithubClient {
    pub fn new(github_token: Option<String>) -> anyhow::Result<Self> {
        let builder = octocrab::Octocrab::builder()
            .set_connect_timeout(Some(FETCH_TIMEOUT))
            .set_read_timeout(Some(FETCH_TIMEOUT));
        let octocrab = match github_token {
            Some(token) => builder.personal_token(token).build()?,
            None => builder.build()?,
        };
        Ok(Self { octocrab })
    }

    /// Fetches and validates a user profile together with its public
    /// repository listing (first 100 repos, most recently updated first).
    #[instrument(skip(self))]
    pub async fn fetch_account(&self, username: &str) -> Result<GithubAccount, FetchError> {
        let profile: GithubProfile = self.get_json(format!("/users/{username}")).await?;

        let (Some(login), Some(id)) = (profile.login, profile.id) else {
            return Err(FetchError::InvalidProfile);
        };
        if profile.account_type.as_deref() != Some("User") {
            return Err(FetchError::InvalidProfile);
        }

        let repos: serde_json::Value = self
            .get_json(format!("/users/{username}/repos?per_page=100&sort=updated"))
            .await?;
        if !repos.is_array() {
            return Err(FetchError::Malformed);
        }
        let repos: Vec<GithubRepo> =
            serde_json::from_value(repos).map_err(|_| FetchError::Malformed)?;

        if repos.is_empty() && profile.followers == 0 && profile.public_repos == 0 {
            return Err(FetchError::NoActivity);
        }

        Ok(GithubAccount {
            id,
            login,
            avatar_url: profile.avatar_url,
            followers: profile.followers,
            public_repos: profile.public_repos,
            repos,
        })
    }

    /// Fetches only the follower count, used by the leaderboard refresh of
    /// stored records that predate follower tracking.
    #[instrument(skip(self))]
    pub async fn fetch_followers(&self, username: &str) -> Result<u32, FetchError> {
        let profile: GithubProfile = self.get_json(format!("/users/{username}")).await?;
        Ok(profile.followers)
    }

    async fn get_json<T: DeserializeOwned>(&self, route: String) -> Result<T, FetchError> {
        match self.octocrab.get(&route, None::<&()>).await {
            Ok(value) => Ok(value),
            Err(octocrab::Error::GitHub { source, .. }) => {
                Err(self.classify_github_error(source.status_code.as_u16()).await)
            }
            Err(e) => Err(FetchError::Transport(e.to_string())),
        }
    }

    async fn classify_github_error(&self, status: u16) -> FetchError {
        match status {
            404 => FetchError::NotFound,
            403 | 429 => FetchError::UpstreamRateLimited {
                reset_at_ms: self.upstream_reset_ms().await,
            },
            status => FetchError::Upstream { status },
        }
    }

    /// The `/rate_limit` endpoint stays reachable when the core quota is
    /// exhausted; it reports the reset as epoch seconds.
    async fn upstream_reset_ms(&self) -> Option<i64> {
        match self.octocrab.ratelimit().get().await {
            Ok(limits) => Some(limits.resources.core.reset as i64 * 1000),
            Err(e) => {
                warn!("Failed to fetch upstream rate limit reset: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_listing_parses_license_and_recency_fields() {
        let payload = serde_json::json!([
            {
                "stargazers_count": 8,
                "forks_count": 2,
                "language": "Rust",
                "updated_at": "2025-06-01T12:00:00Z",
                "created_at": "2021-01-01T00:00:00Z",
                "size": 420,
                "license": { "spdx_id": "MIT" },
                "fork": false
            },
            {
                "language": null,
                "updated_at": null,
                "created_at": null,
                "license": null
            }
        ]);

        let repos: Vec<GithubRepo> = serde_json::from_value(payload).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].stargazers_count, 8);
        assert_eq!(
            repos[0].license.as_ref().unwrap().spdx_id.as_deref(),
            Some("MIT")
        );
        assert!(repos[1].license.is_none());
        assert_eq!(repos[1].size, 0);
        assert!(!repos[1].has_readme);
    }

    #[test]
    fn profile_parses_with_missing_identity_fields() {
        let profile: GithubProfile = serde_json::from_value(serde_json::json!({
            "followers": 3,
            "public_repos": 1
        }))
        .unwrap();
        assert!(profile.login.is_none());
        assert!(profile.id.is_none());
        assert_eq!(profile.followers, 3);
    }
}
