use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use mailtrack_core::TrackerCore;
use mailtrack_core::types::{AppConfig, Config};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

/// Operator tool for a mailtrack data directory. Works with the server stopped.
#[derive(Parser, Debug)]
#[command(name = "mailtrack")]
#[command(version)]
struct Cli {
    /// Data directory holding keys.json and entries/
    #[arg(long, global = true, env = "MAILTRACK_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Limits file; defaults to mailtrack.toml inside the data directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a batch of new keys
    Generate {
        /// Number of keys
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Characters per key
        #[arg(short, long, default_value_t = 8)]
        length: usize,

        /// Free-form note stored with every key of the batch
        #[arg(short, long, default_value = "")]
        comment: String,
    },
    /// List every key, newest first, with whether it is used
    List,
    /// Show whether a key exists and is used
    Status { key: String },
    /// Print an entry and its visit log
    Show { key: String },
}

/// Never used to sign anything: the CLI issues no capability tokens.
const OFFLINE_TOKEN_SECRET: &[u8] = b"mailtrack-cli-offline";

fn open_core(cli: &Cli) -> Result<TrackerCore> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppConfig::path(&cli.data_dir));
    let app_config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("failed to create {}", cli.data_dir.display()))?;
    let core = TrackerCore::open(
        Config {
            base_path: cli.data_dir.clone(),
        },
        app_config.limits,
        OFFLINE_TOKEN_SECRET,
    )?;
    Ok(core)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mailtrack_core=warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let core = open_core(&cli)?;
    let mut out = std::io::stdout().lock();
    let format = if cli.json {
        commands::Format::Json
    } else {
        commands::Format::Text
    };

    match cli.command {
        Command::Generate {
            count,
            length,
            comment,
        } => commands::generate(&core, &mut out, format, count, length, &comment),
        Command::List => commands::list(&core, &mut out, format),
        Command::Status { key } => commands::status(&core, &mut out, format, &key),
        Command::Show { key } => commands::show(&core, &mut out, format, &key),
    }?;
    out.flush()?;
    Ok(())
}
