use std::process::ExitCode;

use anyhow::Context;

use beacon::Config;
use beacon::server::{self, pool::WorkerPool};

fn main() -> ExitCode {
    let cfg = Config::load().context("failed to load configuration");

    // A config that failed to load still gets its error logged, at the default level.
    let level = cfg
        .as_ref()
        .ok()
        .and_then(|cfg| cfg.logging.max_level().ok())
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level)
        .init();

    match cfg.and_then(|cfg| start(&cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn start(cfg: &Config) -> anyhow::Result<()> {
    let pool = WorkerPool::new(cfg.server.workers).context("failed to start worker pool")?;

    pool.block_on(server::run(cfg, pool.threads(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }))
    .context("server failed")?;

    Ok(())
}
