#[macro_use]
extern crate rocket;

mod entrypoints;

use std::sync::Arc;

use rocket_prometheus::PrometheusMetrics;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use github_dna_server::api::github::GithubClient;
use github_dna_server::db;

#[derive(Debug, serde::Deserialize)]
pub struct Env {
    github_token: Option<String>,
}

#[launch]
async fn rocket() -> _ {
    dotenv::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let env = envy::from_env::<Env>().expect("Failed to load environment variables");
    let github =
        Arc::new(GithubClient::new(env.github_token).expect("Failed to create GitHub client"));

    let prometheus = PrometheusMetrics::new();
    let cors = rocket_cors::CorsOptions::default()
        .to_cors()
        .expect("Failed to build CORS fairing");

    let span = tracing::info_span!("Starting Rocket");
    let _enter = span.enter();

    // db::stage() also queues the rate-limiter stage, which must ignite
    // after the pool fairing it fetches.
    rocket::build()
        .manage(github)
        .attach(db::stage())
        .attach(prometheus.clone())
        .mount("/metrics", prometheus)
        .attach(cors)
        .attach(entrypoints::stage())
}
