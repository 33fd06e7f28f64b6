//! Replay harness for the MedMinder service worker.
//!
//! Runs one worker event against an in-memory host and prints every log
//! message the worker relayed to clients, one JSON object per line, followed
//! by the event outcome.
//!
//! ## Usage
//!
//! ```bash
//! # Precache with one asset missing
//! sw-replay install --missing /manifest.json
//!
//! # Prune stale buckets
//! sw-replay activate --existing medminder-cache-v0 --existing medminder-cache-v1
//!
//! # Push a plain text payload with the primary render failing
//! sw-replay push --text "Take your vitamins" --fail-primary
//!
//! # Click with an app window already open
//! sw-replay click --window https://localhost:3000/today
//!
//! # Control message
//! sw-replay message '{"type":"TEST_LOG"}'
//! ```

use clap::{Parser, Subcommand};
use medminder_common::{init_logging, LogConfig, LogFormat};
use std::path::PathBuf;

mod replay;

use replay::{Replay, Scenario};

#[derive(Parser)]
#[command(name = "sw-replay")]
#[command(about = "Replay service worker events against an in-memory host")]
struct Cli {
    /// Worker configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Origin used when no configuration file is given
    #[arg(long, global = true, default_value = "https://localhost:3000")]
    origin: String,

    /// Log filter for local tracing output
    #[arg(long, global = true, default_value = "warn")]
    log_filter: String,

    /// Local log format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the install event
    Install {
        /// Precache paths the network should not serve
        #[arg(long)]
        missing: Vec<String>,
    },

    /// Run the activate event
    Activate {
        /// Cache buckets present before activation
        #[arg(long)]
        existing: Vec<String>,
    },

    /// Install, then run a fetch event
    Fetch {
        /// Path to request
        path: String,
        /// Fail every network request
        #[arg(long)]
        offline: bool,
    },

    /// Run a push event
    Push {
        /// Payload file, sent as raw bytes
        #[arg(long, conflicts_with = "text")]
        payload: Option<PathBuf>,
        /// Payload text
        #[arg(long)]
        text: Option<String>,
        /// Fail the primary notification render
        #[arg(long)]
        fail_primary: bool,
        /// Fail the fallback notification render as well
        #[arg(long, requires = "fail_primary")]
        fail_fallback: bool,
    },

    /// Show a notification, then click it
    Click {
        /// Open window URLs, in creation order
        #[arg(long)]
        window: Vec<String>,
    },

    /// Post a control message
    Message {
        /// Message body (JSON)
        json: String,
    },
}

impl Commands {
    fn into_scenario(self) -> anyhow::Result<Scenario> {
        Ok(match self {
            Commands::Install { missing } => Scenario::Install { missing },
            Commands::Activate { existing } => Scenario::Activate { existing },
            Commands::Fetch { path, offline } => Scenario::Fetch { path, offline },
            Commands::Push {
                payload,
                text,
                fail_primary,
                fail_fallback,
            } => {
                let data = match (payload, text) {
                    (Some(path), _) => Some(std::fs::read(&path)?),
                    (None, Some(text)) => Some(text.into_bytes()),
                    (None, None) => None,
                };
                let failures = usize::from(fail_primary) + usize::from(fail_fallback);
                Scenario::Push { data, failures }
            }
            Commands::Click { window } => Scenario::Click { windows: window },
            Commands::Message { json } => Scenario::Message {
                body: serde_json::from_str(&json)?,
            },
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format: LogFormat = cli.log_format.parse()?;
    init_logging(
        LogConfig::default()
            .with_filter(cli.log_filter.clone())
            .with_format(format),
    )?;

    let config = replay::load_config(cli.config.as_deref(), &cli.origin)?;
    let scenario = cli.command.into_scenario()?;
    let Replay { logs, outcome } = replay::run(config, scenario).await?;

    for log in &logs {
        println!("{}", serde_json::to_string(log)?);
    }
    println!("outcome: {}", outcome);

    Ok(())
}
