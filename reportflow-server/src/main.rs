mod api;
mod run_manager;
mod types;

use anyhow::Context;
use clap::Parser;
use reportflow::rehearsal::rehearsal_site;
use reportflow::{ReportFlow, SettleDelays, Settings};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use run_manager::{RunManager, DEFAULT_RETAINED_RUNS};

#[derive(Parser, Debug)]
#[command(name = "reportflow-server")]
#[command(about = "HTTP front door that triggers browser-driven report extractions")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Enable CORS for all origins
    #[arg(long, env = "REPORTFLOW_CORS")]
    cors: bool,

    /// Finished runs kept for status polling
    #[arg(long, env = "REPORTFLOW_RETAINED_RUNS", default_value_t = DEFAULT_RETAINED_RUNS)]
    retained_runs: usize,

    /// Drive the built-in simulated site instead of Chrome
    #[arg(long, env = "REPORTFLOW_REHEARSAL")]
    rehearsal: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("🚀 Starting reportflow-server v{}", env!("CARGO_PKG_VERSION"));
    info!("🔧 Port: {}", args.port);
    info!("🔧 CORS: {}", if args.cors { "enabled" } else { "disabled" });

    let flow = if args.rehearsal {
        info!("🎭 Rehearsal mode: using the simulated site");
        ReportFlow::with_engine(Arc::new(rehearsal_site().engine()), rehearsal_settings())
    } else {
        let settings = Settings::from_env().context("Failed to load configuration")?;
        ReportFlow::launch(settings)
            .await
            .context("Failed to launch browser")?
    };
    let flow = Arc::new(flow);
    let manager = Arc::new(RunManager::new(flow.clone()).with_retention(args.retained_runs));

    let app = api::router(manager, args.cors);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("✅ Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Shutting down browser");
    flow.shutdown().await;

    Ok(())
}

fn rehearsal_settings() -> Settings {
    let settings = Settings::from_env().unwrap_or_else(|e| {
        warn!("{}; using rehearsal defaults", e);
        Settings::for_target("https://rehearsal.invalid/login")
            .with_credentials("rehearsal", "rehearsal")
            .with_email("reports@rehearsal.invalid")
    });
    settings.with_settle_delays(SettleDelays::none())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
