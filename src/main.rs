mod api;
mod error;
mod harness;
mod languages;
mod limits;
mod problems;
mod runner;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::api::AppState;
use crate::problems::JsonProblemStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("grader=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    languages::init_languages()?;
    info!("Loaded language configurations");

    let problems_path =
        std::env::var("GRADER_PROBLEMS_FILE").unwrap_or_else(|_| "./files/problems.json".into());
    let store = JsonProblemStore::load(&problems_path)
        .await
        .with_context(|| format!("Failed to load problem store from {}", problems_path))?;

    let state = AppState {
        store: Arc::new(store),
    };

    let addr = std::env::var("GRADER_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Grading backend listening on {}", addr);

    axum::serve(listener, api::create_router(state)).await?;

    Ok(())
}
