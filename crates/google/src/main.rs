use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use auth_plugin_google::{build_app, AppDeps, PluginConfig};
use auth_plugin_sdk::directory::HttpDirectoryClient;
use auth_plugin_sdk::session::SqliteSessionStore;
use tokio::signal;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("auth-plugin-google - Google sign-in for the gateway");
    println!();
    println!("USAGE:");
    println!("    auth-plugin-google [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config PATH  Config file to load");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version");
    println!();
    println!("CONFIG:");
    println!("    {}", PluginConfig::default_config_path().display());
    println!();
    println!("ENVIRONMENT:");
    println!("    SESSION_SECRET, JWT_SECRET, USER_ID,");
    println!("    GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("auth-plugin-google {VERSION}");
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            other => {
                anyhow::bail!("unknown argument: {other} (see --help)");
            }
        }
    }

    let config = PluginConfig::load(config_path.as_deref())?;

    let directory = HttpDirectoryClient::new(
        config.auth_api_url.clone(),
        config.jwt_secret.clone(),
        config.user_id.clone(),
    )?;
    if config.jwt_secret.is_none() || config.user_id.is_none() {
        tracing::warn!("JWT_SECRET or USER_ID not set; directory requests are unauthenticated");
    }

    let sessions = Arc::new(SqliteSessionStore::open(&config.session.database)?);
    let prune_store = Arc::clone(&sessions);
    let prune_every = Duration::from_secs(config.session.prune_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(prune_every);
        loop {
            interval.tick().await;
            if let Err(e) = prune_store.prune_expired().await {
                tracing::error!(error = %e, "Failed to prune expired sessions");
            }
        }
    });

    let app = build_app(
        &config,
        AppDeps {
            directory: Arc::new(directory),
            sessions,
            strategy: None,
        },
    )?;

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        external_url = %config.external_url,
        "Google auth plugin listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
