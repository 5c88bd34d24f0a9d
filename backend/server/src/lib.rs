//! Backend of the SafeHer personal-safety app: the SOS alert path.
//!
//!
//!
//! # What happens on SOS
//! - App calls `POST /api/sos/trigger` with the current `lat`/`lng`
//! - Server loads the user's trusted contacts
//! - Every contact gets an SMS with a map link, through Twilio
//! - One incident is saved with how each SMS went
//! - Every client connected on `/ws` gets `sos:alert`
//! - App shows the per-contact result list it got back
//!
//! Resolving (`POST /api/sos/resolve`) is owner-only and pushes `sos:resolved`.
//! History is at `GET /api/sos/logs`, newest first.
//!
//!
//!
//! # Auth
//! - Login/registration live in the auth service, which writes sessions to Redis
//! - Every `/api` call carries `Authorization: Bearer <token>`
//! - The identity behind the token is trusted as-is
//!
//!
//!
//! # Notes
//!
//! ## SMS is best effort
//! A contact with a bad number, an unverified number (Twilio trial accounts) or a
//! provider hiccup is reported back as failed, but the trigger itself still
//! succeeds. Nothing retries.
//!
//! ## Realtime is best effort
//! `sos:alert` and `sos:resolved` go to every connected client, not just the
//! user's contacts. A client that is offline at that moment never sees the event.
//!
//!
//!
//! # Setup
//!
//! Environment.
//! ```sh
//! export RUST_PORT=5000
//! export REDIS_URL=redis://localhost:6379
//! export TWILIO_SID=AC...
//! export TWILIO_NUMBER=+1...
//! echo "auth-token" > /run/secrets/TWILIO_AUTH   # or export TWILIO_AUTH
//! ```
//!
//! Run.
//! ```sh
//! RUST_LOG=info cargo run -p safeher
//! ```
//!
//! Trigger.
//! ```sh
//! curl -X POST localhost:5000/api/sos/trigger \
//!   -H "Authorization: Bearer $TOKEN" -H "Content-Type: application/json" \
//!   -d '{"lat":28.6,"lng":77.2}'
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod broadcaster;
pub mod config;
pub mod database;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod routes;
pub mod socket;
pub mod state;
pub mod store;
pub mod utils;

use routes::{health_handler, logs_handler, resolve_handler, test_sms_handler, trigger_handler};
use socket::ws_handler;
use state::AppState;

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    state.broadcaster.shutdown().await;

    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let cors = match state
        .config
        .cors_origin
        .as_deref()
        .map(HeaderValue::from_str)
    {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(e)) => {
            warn!("Invalid CORS_ORIGIN ({e}), allowing any origin");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    };

    let api = Router::new()
        .route("/sos/trigger", post(trigger_handler))
        .route("/sos/resolve", post(resolve_handler))
        .route("/sos/logs", get(logs_handler))
        .route("/test/sms", post(test_sms_handler));

    Router::new()
        .route("/", get(health_handler))
        .route("/ws", get(ws_handler))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
