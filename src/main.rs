use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use replayman::cli::Cli;
use replayman::engine::http::HttpSimulator;
use replayman::engine::orchestrator::Orchestrator;
use replayman::hooks::AppHooks;
use replayman::store::{FsReportStore, FsSessionStore};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("replayman=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = match cli.into_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("replayman: {err}");
            return ExitCode::from(2);
        }
    };

    let orchestrator = Orchestrator::new(
        Arc::new(AppHooks::new()),
        Arc::new(HttpSimulator::new()),
        Arc::new(FsSessionStore::new()),
        Arc::new(FsReportStore::new()),
    );
    if orchestrator.run(cfg).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
