use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;

mod config;
mod error;
mod logging;
mod routes;
mod services;
pub mod models;

use services::conversation::Conversation;
use services::insight::{InsightService, OpenAiModel};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;

    // Wire the model client and conversation at the composition root so
    // tests can swap the model for a double.
    let model = OpenAiModel::new(&config.openai_key);
    let insight = InsightService::new(Arc::new(model));
    let conversation = Conversation::new(insight);

    let state = Arc::new(AppState::new(config, conversation));

    // Build our application with a route
    let app = Router::new()
        .merge(routes::routes())
        .merge(routes::csv::routes())
        .merge(routes::chat::routes())
        .with_state(state);

    // Run it
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// Application state
pub struct AppState {
    pub config: config::Config,
    pub conversation: Conversation,
}

impl AppState {
    fn new(config: config::Config, conversation: Conversation) -> Self {
        Self {
            config,
            conversation,
        }
    }
}
