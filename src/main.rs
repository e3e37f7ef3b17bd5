mod commands;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use taskdeck::cache::{CacheLayer, MemoryStorage, SqliteStorage};
use taskdeck::config::{CacheBackend, Config};
use taskdeck::logging;
use taskdeck::tasks::{HttpTaskFetch, TaskApi};

#[derive(Parser, Debug)]
#[command(name = "taskdeck")]
#[command(about = "A cache-first command line client for your tasks")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/taskdeck/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let log_dir = logging::default_log_dir().ok_or_else(|| eyre!("No data directory available"))?;
  let _log_guard = logging::init_logging(&log_dir, config.log_level.as_deref())?;

  let cache = match config.cache.backend {
    CacheBackend::Sqlite => CacheLayer::new(SqliteStorage::open(config.cache.path.as_deref())?),
    CacheBackend::Memory => CacheLayer::new(MemoryStorage::new()),
  };
  let fetch = HttpTaskFetch::new(&config)?;
  let api = TaskApi::with_reads(Arc::new(fetch), cache, config.reads);

  commands::run(args.command, &api, &config).await
}
