use std::io::IsTerminal;
use std::sync::Arc;

use clap::Parser;
use datas3t::config::{Opt, Settings};
use datas3t::context::AppContext;
use datas3t::db::Catalog;
use datas3t::object_store::S3ObjectStoreFactory;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::parse();
    let settings = Settings::load(&opt)?;
    setup_tracing(&settings)?;

    let catalog = Catalog::connect(&settings.database_url).await?;
    let ctx = AppContext::new(catalog.clone(), Arc::new(S3ObjectStoreFactory), settings.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = tokio::spawn(datas3t::deletion_worker::run(catalog.pool().clone(), settings.deletion_worker_interval(), shutdown_rx));

    let app = datas3t::http::router(ctx);
    let listener = tokio::net::TcpListener::bind(settings.bind_address).await?;
    info!("server is running at http://{}", settings.bind_address);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    info!("server is stopped");
    Ok(())
}

fn setup_tracing(settings: &Settings) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let enable_color = std::io::stdout().is_terminal();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(enable_color))
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let _ = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
