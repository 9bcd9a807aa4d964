use github_dna_server::db::DB;
use github_dna_server::types::StatisticsResponse;
use rocket::serde::json::Json;
use rocket::State;

#[utoipa::path(context_path = "/info", responses(
    (status = 200, description = "Get analysis statistics", body = StatisticsResponse)
))]
#[get("/")]
pub async fn statistics(db: &State<DB>) -> Option<Json<StatisticsResponse>> {
    match db.statistics().await {
        Ok(statistics) => Some(Json(statistics.into())),
        Err(e) => {
            tracing::error!("Failed to get statistics: {e:#}");
            None
        }
    }
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing statistics entrypoint", |rocket| async {
        rocket.mount("/info", rocket::routes![statistics])
    })
}
