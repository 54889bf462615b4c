//! Studyloop · Learning Content Pipeline Backend
//!
//! - Axum HTTP API over the quiz-generation / content-analysis pipelines
//!   and the assessment scoring engine
//! - Optional OpenAI integration (via environment variables); without it a
//!   deterministic stub backend serves every request
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   OPENAI_API_KEY    : enables the live generative backend if present
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o-mini"
//!   AGENT_CONFIG_PATH : path to TOML config (stage prompts)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod backend;
mod config;
mod domain;
mod logic;
mod persist;
mod pipeline;
mod protocol;
mod routes;
mod sanitize;
mod scoring;
mod stages;
mod state;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (backend selection, prompts, stores).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "studyloop_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
