use std::sync::Arc;

use github_dna_server::analysis::{self, Credentials};
use github_dna_server::api::github::GithubClient;
use github_dna_server::db::DB;
use github_dna_server::error::AnalyzeError;
use github_dna_server::rate_limit::AnalysisLimiter;
use github_dna_server::types::{AnalysisResponse, ErrorResponse};
use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    pub username: String,
}

#[utoipa::path(context_path = "/api", request_body = AnalyzeRequest, responses(
    (status = 200, description = "Analyze a GitHub profile", body = AnalysisResponse),
    (status = 400, description = "Invalid username", body = ErrorResponse),
    (status = 401, description = "Invalid authentication token", body = ErrorResponse),
    (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
))]
#[post("/analyze", data = "<request>")]
pub async fn analyze(
    db: &State<DB>,
    github: &State<Arc<GithubClient>>,
    limiter: &State<AnalysisLimiter>,
    credentials: Credentials,
    request: Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResponse>, AnalyzeError> {
    let response =
        analysis::analyze(db, github, limiter, &credentials, &request.username).await?;
    Ok(Json(response))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing analyze entrypoint", |rocket| async {
        rocket.mount("/api", rocket::routes![analyze])
    })
}
