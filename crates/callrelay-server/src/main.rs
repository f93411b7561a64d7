//! Call relay server binary.
//!
//! Loads `config.toml` (or the path given as the first argument or in
//! `CALLRELAY_CONFIG_PATH`), wires the collaborators and serves until
//! SIGINT/SIGTERM.

use callrelay_server::config::{self, Config, LoggingConfig};
use callrelay_server::{app, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Where the config path came from, for the startup log.
fn config_path() -> (String, &'static str) {
    let arg = std::env::args().nth(1).filter(|p| !p.trim().is_empty());
    if let Some(path) = arg {
        return (path, "cli-arg");
    }
    match std::env::var("CALLRELAY_CONFIG_PATH") {
        Ok(path) if !path.trim().is_empty() => (path, "env-var"),
        _ => (DEFAULT_CONFIG_PATH.to_string(), "default"),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Logs the collaborators that will refuse work because they are not set up.
fn warn_on_gaps(config: &Config) {
    if config.server.public_url.is_empty() {
        tracing::warn!("server.public_url is not set; TwiML will use the request Host header");
    }
    if config.agent.api_key.is_empty() {
        tracing::warn!("agent.api_key is not set; every media stream will fail setup");
    }
    if config.webhook.url.is_empty() {
        tracing::warn!("webhook.url is not set; opening messages, transcripts and bookings are disabled");
    }
    if config.scheduling.calendars.is_empty() {
        tracing::warn!("no scheduling calendars configured; schedule_meeting will always fail");
    }
}

#[tokio::main]
async fn main() {
    let (path, source) = config_path();
    let config = config::load_config(Some(path.as_str()))
        .expect("failed to load configuration; fix the file or CALLRELAY_* variables");

    init_tracing(&config.logging);
    tracing::info!(source, path = %path, "configuration loaded");
    warn_on_gaps(&config);

    let state = AppState::from_config(&config).expect("failed to build HTTP client");
    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind listen address");
    tracing::info!(%addr, "callrelay listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("callrelay stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("SIGINT received, draining connections"),
        () = terminate => tracing::info!("SIGTERM received, draining connections"),
    }
}
