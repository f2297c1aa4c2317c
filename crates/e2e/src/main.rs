//! AAFT step entry point
//!
//! Invoked by the CI harness with its configuration in the environment.
//! Exits 0 whenever a result was produced, pass or fail; 2 on setup errors.

use std::process::ExitCode;

use aaft_e2e::{Args, StepRunner};
use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging(debug: bool, json: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let config = args.into_config().context("invalid step configuration")?;

    info!("AAFT step v{}", aaft_common::VERSION);

    let runner = StepRunner::new(config);
    let completed = runner.run().await.context("failed to start the step")?;

    info!(
        "Step finished with status {} (delivery {})",
        completed.report.status(),
        completed.delivery
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug, args.log_json);

    match async_main(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
