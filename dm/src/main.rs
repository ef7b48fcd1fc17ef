//! AI Dungeon Master terminal application.
//!
//! A line-oriented front-end: guided character creation, then free-text
//! actions answered by the Dungeon Master.
//!
//! ```bash
//! cargo run -p dm -- --demo -v
//! ```

mod console;
mod play;

use anyhow::{Context, Result};
use clap::Parser;
use dm_core::{GameConfig, GameSession, Mode, SessionStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dm")]
#[command(about = "Play a text adventure with an AI Dungeon Master")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "dm.toml")]
    config: PathBuf,

    /// Directory for saved sessions (overrides the config file)
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Start in demo mode even when an API key is available
    #[arg(long)]
    demo: bool,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = GameConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.save_dir {
        config = config.with_save_dir(dir);
    }

    let store = SessionStore::file(&config.save_dir);
    let mut session = GameSession::open(config, store).await;
    if cli.demo {
        session.set_mode(Mode::Simulated)?;
    }

    play::run(session).await
}

fn init_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // RUST_LOG overrides the -v level
    builder.parse_default_env();
    builder.init();
}
