use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Raw `GET /users/{username}` payload. Identity fields stay optional until
/// the fetcher validates them.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub login: Option<String>,
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    #[serde(default)]
    pub followers: u32,
    #[serde(default)]
    pub public_repos: u32,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubLicense {
    pub spdx_id: Option<String>,
}

/// One element of the `GET /users/{username}/repos` listing, reduced to the
/// fields the scoring engine consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepo {
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub forks_count: u32,
    pub language: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub has_readme: bool,
    pub license: Option<GithubLicense>,
    #[serde(default)]
    pub fork: bool,
}

/// A validated profile plus its public repositories.
#[derive(Debug, Clone)]
pub struct GithubAccount {
    pub id: i64,
    pub login: String,
    pub avatar_url: Option<String>,
    pub followers: u32,
    pub public_repos: u32,
    pub repos: Vec<GithubRepo>,
}
