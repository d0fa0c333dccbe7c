use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use dt_challenges_evaluator::cli::Opts;
use dt_challenges_evaluator::config::Config;
use dt_challenges_evaluator::env_check;
use dt_challenges_evaluator::metrics::Metrics;
use dt_challenges_evaluator::runner::{self, RunnerContext, RunnerOptions};

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    let level = if opts.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("dt_challenges_evaluator={}", level))
            }),
        )
        .init();

    info!(
        "dt-challenges-evaluator {}",
        env!("CARGO_PKG_VERSION")
    );
    info!("called with:\n{:?}", std::env::args().collect::<Vec<_>>());

    let config = Arc::new(Config::from_env());

    let docker = match env_check::docker_client() {
        Ok(d) => d,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = env_check::check_docker_environment(&docker).await {
        error!("{}", e);
        std::process::exit(1);
    }
    if let Err(e) = env_check::check_compose_available(&config.compose_bin) {
        error!("{}", e);
        std::process::exit(1);
    }

    let runner_opts = match RunnerOptions::from_opts(&opts) {
        Ok(o) => o,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    config.print_banner();

    let ctx = RunnerContext::new(config, runner_opts, Metrics::new(), docker);

    if opts.continuous {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping after the current job...");
                let _ = tx.send(true);
            }
            std::future::pending::<()>().await;
        });
        runner::run_continuous(&ctx, rx).await;
    } else if let Err(e) = runner::run_once(&ctx, opts.submission).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
