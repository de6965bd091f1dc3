use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ScraperConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk a board's listing pages and download every article's PDFs.
    Scrape(ScrapeArgs),
    /// Process a single article page and print the result as JSON.
    Article(ArticleArgs),
    /// Print download, failure, learning and checkpoint statistics as JSON.
    Stats(StatsArgs),
    /// Delete learned strategies, records and downloaded files.
    Reset(ResetArgs),
    /// Print the element structure and detector results of a page.
    Analyze(AnalyzeArgs),
}

/// Options shared by every command.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// YAML config file. `BOARDPDF_*` environment variables override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory PDFs are saved to.
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Directory holding the ledger, checkpoint and learned strategies.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

impl CommonArgs {
    /// Config file, then environment, then flags.
    pub fn resolve(&self) -> anyhow::Result<ScraperConfig> {
        let mut config = ScraperConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.download_dir {
            config.download_dir = dir.clone();
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir = dir.clone();
        }
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Board listing URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Continue from the saved checkpoint for this board.
    #[arg(long, default_value_t = false)]
    pub resume: bool,

    /// Stop after this many listing pages.
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Never prompt; continue whenever a question would be asked.
    #[arg(long, default_value_t = false)]
    pub unattended: bool,

    /// Disable the fast path that tries the last successful strategy first.
    #[arg(long, default_value_t = false)]
    pub no_fast_mode: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct ArticleArgs {
    /// Article page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Title recorded with the downloads. Defaults to the URL.
    #[arg(long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Only forget learned strategies.
    #[arg(long, default_value_t = false)]
    pub learning_only: bool,

    /// Keep downloaded files on disk.
    #[arg(long, default_value_t = false)]
    pub keep_downloads: bool,

    /// Do not ask for confirmation.
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Rejects anything but absolute http(s) URLs.
pub fn parse_http_url(raw: &str) -> anyhow::Result<url::Url> {
    let url = url::Url::parse(raw).map_err(|err| anyhow::anyhow!("invalid url {raw}: {err}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("unsupported url scheme: {other}"),
    }
}
