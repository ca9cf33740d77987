//! Command-line interface for chanwatch.
//!
//! Provides commands for checking a channel once, listing what the cursor
//! has recorded, and showing the resolved configuration.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{self, ConfigError, ConfigOverrides, FetchBackend, ProbeBackend, ResolvedConfig};
use crate::core::{CheckError, CursorStore, Orchestrator};
use crate::domain::{ChannelRef, CheckOutcome, CheckReport};

/// chanwatch - download a channel's newest video exactly once
#[derive(Parser, Debug)]
#[command(name = "chanwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the channel once and download the newest video if it is new
    Check(CheckArgs),

    /// List identities recorded in the cursor
    History {
        /// Cursor file (defaults to the configured one)
        #[arg(long)]
        cursor: Option<PathBuf>,

        /// Maximum number of entries to show (most recent last)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// Channel id or videos page URL (prompted for if not configured)
    #[arg(short, long)]
    pub channel: Option<String>,

    /// How to discover new videos
    #[arg(long, value_enum)]
    pub probe: Option<ProbeBackend>,

    /// How to download media
    #[arg(long, value_enum)]
    pub fetcher: Option<FetchBackend>,

    /// Directory downloaded files are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Cursor file recording already-downloaded videos
    #[arg(long)]
    pub cursor: Option<PathBuf>,

    /// Only consider videos whose title contains this text (page probes)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Replace an existing file with the same name
    #[arg(long)]
    pub overwrite: bool,

    /// Process every matching video on the page, not just the newest
    #[arg(long)]
    pub all: bool,

    /// Probe and compare only; do not download or update the cursor
    #[arg(long)]
    pub dry_run: bool,
}

impl CheckArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            channel: self.channel.clone(),
            probe: self.probe,
            fetcher: self.fetcher,
            output_dir: self.output_dir.clone(),
            cursor_path: self.cursor.clone(),
            title_filter: self.filter.clone(),
            overwrite: self.overwrite,
            all_matches: self.all,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Check(args) => run_check(args).await,
            Commands::History { cursor, limit } => show_history(cursor, limit),
            Commands::Config => show_config(),
        }
    }
}

/// One check: config → credentials → channel → orchestrator
async fn run_check(args: CheckArgs) -> Result<()> {
    let config = config::load(&args.overrides()).map_err(CheckError::from)?;

    // Missing credentials are fatal before anything else happens
    if config.probe == ProbeBackend::Api {
        config.require_api_key().map_err(CheckError::from)?;
    }

    let channel = match &config.channel {
        Some(channel) => ChannelRef::new(channel.as_str()),
        None => {
            let stdin = io::stdin();
            let mut stderr = io::stderr();
            prompt_channel(&mut stdin.lock(), &mut stderr).map_err(CheckError::from)?
        }
    };

    let mut orchestrator = Orchestrator::from_config(&config)?.with_dry_run(args.dry_run);

    let report = if config.all_matches {
        orchestrator.check_all(&channel).await?
    } else {
        orchestrator.check(&channel).await?
    };

    print_report(&report);
    Ok(())
}

/// Ask for the channel on the terminal; an empty answer is a config error
pub fn prompt_channel<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> Result<ChannelRef, ConfigError> {
    write!(writer, "Enter the channel ID: ").map_err(ConfigError::Prompt)?;
    writer.flush().map_err(ConfigError::Prompt)?;

    let mut line = String::new();
    reader.read_line(&mut line).map_err(ConfigError::Prompt)?;

    let channel = ChannelRef::new(line);
    if channel.as_str().is_empty() {
        return Err(ConfigError::MissingChannel);
    }
    Ok(channel)
}

fn print_report(report: &CheckReport) {
    for outcome in &report.outcomes {
        match outcome {
            CheckOutcome::NotFound => println!("No new videos found."),
            CheckOutcome::AlreadySeen { item } => {
                println!("No new videos found. Latest is already downloaded: {}", item.title)
            }
            CheckOutcome::Downloaded { path, .. } => {
                println!("Video downloaded successfully: {}", path.display())
            }
            CheckOutcome::WouldDownload { item } => {
                println!("New video (dry run): {} [{}]", item.title, item.id)
            }
        }
    }
}

/// Print the cursor contents
fn show_history(cursor: Option<PathBuf>, limit: usize) -> Result<()> {
    let path = match cursor {
        Some(path) => path,
        None => config::load(&ConfigOverrides::default())
            .map_err(CheckError::from)?
            .cursor_path,
    };

    let entries = CursorStore::snapshot(&path)
        .map_err(CheckError::from)
        .with_context(|| format!("Failed to read history from {}", path.display()))?;

    if entries.is_empty() {
        println!("No videos recorded in {}", path.display());
        return Ok(());
    }

    let skip = entries.len().saturating_sub(limit);
    for entry in &entries[skip..] {
        println!("{}", entry);
    }
    if skip > 0 {
        eprintln!("({} older entries not shown)", skip);
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let config = config::load(&ConfigOverrides::default()).map_err(CheckError::from)?;
    print!("{}", describe_config(&config));
    Ok(())
}

fn describe_config(config: &ResolvedConfig) -> String {
    let keys: Vec<String> = config.match_keys.iter().map(|k| k.to_string()).collect();
    let mut out = String::new();

    out.push_str("chanwatch configuration\n");
    out.push_str("=======================\n\n");
    out.push_str(&format!(
        "Config file: {}\n",
        config
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    ));
    out.push_str(&format!(
        "Channel:     {}\n",
        config.channel.as_deref().unwrap_or("(prompt)")
    ));
    out.push_str(&format!("Probe:       {:?}\n", config.probe));
    out.push_str(&format!("Fetcher:     {:?}\n", config.fetcher));
    out.push_str(&format!(
        "API key:     {}\n",
        if config.api_key.is_some() { "(set)" } else { "(not set)" }
    ));
    out.push_str(&format!("Output dir:  {}\n", config.output_dir.display()));
    out.push_str(&format!("Cursor:      {}\n", config.cursor_path.display()));
    out.push_str(&format!("Extension:   {}\n", config.extension));
    out.push_str(&format!("Match keys:  {}\n", keys.join(", ")));
    out.push_str(&format!(
        "Filter:      {}\n",
        config.title_filter.as_deref().unwrap_or("(none)")
    ));
    out.push_str(&format!("Overwrite:   {}\n", config.overwrite));
    out.push_str(&format!("All matches: {}\n", config.all_matches));
    out.push_str(&format!(
        "WebDriver:   {} (wait {}s)\n",
        config.webdriver_url,
        config.browser_wait.as_secs()
    ));
    out.push_str(&format!(
        "yt-dlp:      {} -f {}\n",
        config.ytdlp_binary, config.ytdlp_format
    ));

    out
}
