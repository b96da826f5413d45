use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tinyserve::App;
use tinyserve::config::{Cli, FileConfig, Settings};
use tinyserve::routes;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "tinyserve=debug,tower_http=debug"
    } else {
        "tinyserve=info,tower_http=info"
    };

    // stdout is reserved for the access log
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load config from file if provided, otherwise use defaults
    let file_config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::from_sources(cli, file_config).map_err(|err| {
        error!("Invalid configuration: {}", err);
        err
    })?;

    if !settings.root.is_dir() {
        warn!("Root path is not a directory: {}", settings.root.display());
    }
    info!("Serving files from: {}", settings.root.display());

    if settings.basic_auth_enabled() {
        info!("Enabling Basic Auth");
    }

    let app = App::from_settings(&settings).map_err(|err| {
        error!("Invalid configuration: {}", err);
        err
    })?;
    if let Some(status) = &app.status {
        info!("Serving status at {}", status.path);
    }
    let router = routes::create_router(app);

    let addr: SocketAddr = format!("{}:{}", settings.bind, settings.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|err| {
        error!("Failed to bind {}: {}", addr, err);
        err
    })?;
    info!("Listening at {} {}...", addr, settings.path_prefix());

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
