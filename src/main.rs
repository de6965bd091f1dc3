use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    boardpdf::logging::init().context("init logging")?;

    let cli = boardpdf::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    // The page driver uses a blocking HTTP client, so page work runs off the
    // async workers.
    match cli.command {
        boardpdf::cli::Command::Scrape(args) => {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received; stopping after the current article");
                    flag.store(true, Ordering::SeqCst);
                }
            });
            tokio::task::spawn_blocking(move || boardpdf::scrape::run(args, cancel))
                .await
                .context("join scrape task")?
                .context("scrape")?;
        }
        boardpdf::cli::Command::Article(args) => {
            tokio::task::spawn_blocking(move || boardpdf::article::run(args))
                .await
                .context("join article task")?
                .context("article")?;
        }
        boardpdf::cli::Command::Analyze(args) => {
            tokio::task::spawn_blocking(move || boardpdf::maintenance::run_analyze(args))
                .await
                .context("join analyze task")?
                .context("analyze")?;
        }
        boardpdf::cli::Command::Stats(args) => {
            boardpdf::maintenance::run_stats(args).context("stats")?;
        }
        boardpdf::cli::Command::Reset(args) => {
            boardpdf::maintenance::run_reset(args).context("reset")?;
        }
    }

    Ok(())
}
