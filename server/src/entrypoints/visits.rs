use github_dna_server::analysis::Credentials;
use github_dna_server::db::DB;
use github_dna_server::types::VisitResponse;
use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct VisitRequest {
    pub path: Option<String>,
}

/// Visitor addresses are stored only as a hex sha256 digest.
pub fn hash_ip(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}

#[utoipa::path(context_path = "/api", request_body = VisitRequest, responses(
    (status = 200, description = "Record a visit and return the landing page count", body = VisitResponse)
))]
#[post("/visits", data = "<request>")]
pub async fn track_visit(
    db: &State<DB>,
    credentials: Credentials,
    request: Option<Json<VisitRequest>>,
) -> Option<Json<VisitResponse>> {
    let path = request
        .and_then(|body| body.into_inner().path)
        .unwrap_or_else(|| "/".to_string());
    let ip_hash = hash_ip(&credentials.client_ip);

    // One counted visit per address and path per hour. A failed dedup
    // check or insert still yields the count response.
    match db.has_recent_visit(&ip_hash, &path).await {
        Ok(true) => {}
        Ok(false) => {
            if let Err(e) = db
                .insert_visit(
                    &path,
                    &ip_hash,
                    credentials.user_agent.as_deref(),
                    credentials.referrer.as_deref(),
                )
                .await
            {
                tracing::error!("Failed to record visit on {path}: {e:#}");
            }
        }
        Err(e) => {
            tracing::error!("Failed to check for recent visit on {path}: {e:#}");
        }
    }

    let visit_count = match db.count_visits("/").await {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Failed to count visits: {e:#}");
            return None;
        }
    };
    Some(Json(VisitResponse { visit_count }))
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing visits entrypoint", |rocket| async {
        rocket.mount("/api", rocket::routes![track_visit])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_hashes_are_stable_hex_digests() {
        let digest = hash_ip("203.0.113.7");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, hash_ip("203.0.113.7"));
        assert_ne!(digest, hash_ip("203.0.113.8"));
    }
}
