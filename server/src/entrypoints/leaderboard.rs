use std::sync::Arc;

use github_dna_server::analysis::Credentials;
use github_dna_server::api::github::GithubClient;
use github_dna_server::db::DB;
use github_dna_server::error::AnalyzeError;
use github_dna_server::leaderboard;
use github_dna_server::rate_limit::{LeaderboardGate, RateDecision};
use github_dna_server::types::{ErrorResponse, LeaderboardResponse};
use rocket::serde::json::Json;
use rocket::State;

#[utoipa::path(context_path = "/api", responses(
    (status = 200, description = "Get the developer leaderboard", body = LeaderboardResponse),
    (status = 429, description = "Too many leaderboard requests", body = ErrorResponse),
))]
#[get("/leaderboard")]
pub async fn get_leaderboard(
    db: &State<DB>,
    github: &State<Arc<GithubClient>>,
    gate: &State<LeaderboardGate>,
    credentials: Credentials,
) -> Result<Json<LeaderboardResponse>, AnalyzeError> {
    if let RateDecision::Denied { reset_in_ms, tier } = gate.check(&credentials.client_ip).await {
        return Err(AnalyzeError::RateLimited { reset_in_ms, tier });
    }

    let leaderboard = leaderboard::rank(db, github)
        .await
        .map_err(AnalyzeError::Storage)?;
    Ok(Json(LeaderboardResponse { leaderboard }))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing leaderboard entrypoint", |rocket| async {
        rocket.mount("/api", rocket::routes![get_leaderboard])
    })
}
