mod app;
mod commands;

use clap::Parser;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use student_life::config::Config;
use student_life::store::SqliteStore;

/// Environment variable holding the log filter
const LOG_ENV: &str = "STUDENT_LIFE_LOG";

#[derive(Parser, Debug)]
#[command(name = "studentlife")]
#[command(about = "Schedule, tasks, expenses and study chat for Student Life")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/studentlife/config.yaml)
  #[arg(short, long)]
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

  let db_path = match &config.storage.path {
    Some(path) => path.clone(),
    None => SqliteStore::default_path()?,
  };
  let log_dir = db_path
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from("."));
  let _guard = init_tracing(&log_dir)?;

  let app = app::App::new(config, &db_path)?;
  app.run(args.command).await
}

/// Log to a daily file next to the database so stdout stays clean.
fn init_tracing(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)?;
  let appender = tracing_appender::rolling::daily(dir, "studentlife.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()?;

  Ok(guard)
}
