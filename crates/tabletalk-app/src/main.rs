//! TableTalk application binary - composition root.
//!
//! Ties together all TableTalk crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Build the LLM translator (reqwest client + API key from env)
//! 3. Create the session store and chat orchestrator
//! 4. Start a background sweep for expired sessions
//! 5. Start the axum HTTP server serving the chat page and the JSON API

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tabletalk_api::{create_router, AppState};
use tabletalk_chat::SessionStore;
use tabletalk_core::config::TabletalkConfig;
use tabletalk_llm::{DynTranslator, LlmTranslator};

#[derive(Parser)]
#[command(name = "tabletalk")]
#[command(about = "Chat with your data: prompt in, SQL out")]
struct Args {
    /// Path to the config file (default: ~/.tabletalk/config.toml or
    /// TABLETALK_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the configured data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Resolve the config file path (TABLETALK_CONFIG env, or
/// ~/.tabletalk/config.toml).
fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TABLETALK_CONFIG") {
        return PathBuf::from(p);
    }
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".tabletalk").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".tabletalk").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Periodically drop idle sessions and delete their files.
async fn session_sweep_loop(store: Arc<SessionStore>) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
    loop {
        interval.tick().await;
        let removed = store.sweep_expired();
        if removed > 0 {
            tracing::debug!(removed, "Session sweep");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting TableTalk v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Config.
    let config_file = args.config.unwrap_or_else(config_path);
    let mut config = TabletalkConfig::load_or_default(&config_file);
    if let Some(port) = args.port {
        config.general.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.general.data_dir = dir.to_string_lossy().into_owned();
    }
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Data directory.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    // Session files never outlive their session; clear leftovers from a
    // previous run.
    let sessions_dir = data_dir.join("sessions");
    if sessions_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&sessions_dir) {
            tracing::warn!(path = %sessions_dir.display(), error = %e, "Failed to clear stale session files");
        }
    }

    // Translator.
    let translator = LlmTranslator::new(config.llm.clone())?;
    if translator.has_api_key() {
        tracing::info!(model = %config.llm.model, "LLM translator ready");
    } else {
        tracing::warn!(
            env = %config.llm.api_key_env,
            "No API key found; chat turns will fail until it is set"
        );
    }
    let translator: Box<dyn DynTranslator> = Box::new(translator);

    // Sessions and orchestrator.
    let store = Arc::new(SessionStore::new(
        data_dir.clone(),
        config.chat.session_timeout_minutes,
    ));
    tracing::info!(dir = %data_dir.display(), "Session store ready");

    let sweep_store = Arc::clone(&store);
    tokio::spawn(async move {
        session_sweep_loop(sweep_store).await;
    });

    let port = config.general.port;
    let state = AppState::new(config, store, translator);

    // HTTP server.
    let addr = format!("127.0.0.1:{}", port);
    let router = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind — is another instance running?");
            tracing::error!("Try: tabletalk --port {}", port + 1);
            return Err(e.into());
        }
    };

    tracing::info!(addr = %addr, "API server listening");
    tracing::info!("Chat page at http://{}/ui", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
