use rocket::fairing::AdHoc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod analyze;
pub mod leaderboard;
pub mod statistics;
pub mod visits;

#[derive(OpenApi)]
#[openapi(
    paths(
        analyze::analyze,
        leaderboard::get_leaderboard,
        visits::track_visit,
        statistics::statistics,
    ),
    components(schemas(
        github_dna_server::types::AnalysisResponse,
        github_dna_server::types::LeaderboardResponse,
        github_dna_server::types::LeaderboardEntry,
        github_dna_server::types::LeaderboardMetrics,
        github_dna_server::types::VisitResponse,
        github_dna_server::types::StatisticsResponse,
        github_dna_server::types::RecentUser,
        github_dna_server::types::ErrorResponse,
        analyze::AnalyzeRequest,
        visits::VisitRequest,
    ))
)]
struct ApiDoc;

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket
            .attach(analyze::stage())
            .attach(leaderboard::stage())
            .attach(visits::stage())
            .attach(statistics::stage())
            .mount(
                "/",
                SwaggerUi::new("/swagger-ui/<_..>").url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
}
