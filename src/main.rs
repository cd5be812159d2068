mod app;
mod constants;
mod deps;
mod display;
mod error;
mod graphics;
mod input;
mod launcher;
mod models;
mod paths;
mod provider;
mod store;
mod task;
mod theme;
mod thumbs;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{
  DefaultTerminal,
  crossterm::event::{self, Event, KeyEventKind},
};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::{App, Services};
use constants::constants;
use display::CliDisplayMode;
use launcher::SystemProcesses;
use paths::AppPaths;
use provider::YtDlp;
use store::StateStore;
use thumbs::ThumbnailCache;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Thumbnail rendering: 'auto', 'direct' (half blocks) or 'ascii'
  #[arg(short, long, default_value = "auto")]
  display_mode: CliDisplayMode,

  /// Player executable name or path (overrides the saved mpv_path)
  #[arg(long, env = "MPVTUBE_PLAYER")]
  player: Option<String>,

  /// Use this state file instead of ~/.youtube_mpv_config.json
  #[arg(long)]
  state_file: Option<PathBuf>,

  /// yt-dlp executable name or path
  #[arg(long)]
  ytdlp: Option<PathBuf>,
}

// --- Logging ---

/// Log to a daily file; stdout belongs to the terminal UI. Filter with `MPVTUBE_LOG`.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir).with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;
  let appender = tracing_appender::rolling::daily(log_dir, "mpvtube.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  let filter = EnvFilter::try_from_env("MPVTUBE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
  Ok(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let paths = AppPaths::discover().context("Could not determine the home directory")?;
  let _guard = init_tracing(&paths.log_dir)?;
  info!(version = env!("CARGO_PKG_VERSION"), "mpvtube starting");

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, args, paths).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, args: Args, paths: AppPaths) -> Result<()> {
  let display_mode = display::resolve_display_mode(args.display_mode);
  let state_file = args.state_file.unwrap_or(paths.state_file);
  let store = Arc::new(StateStore::open(state_file));
  info!(state = %store.path().display(), "store: opened");

  let http = Client::builder()
    .user_agent(concat!("mpvtube/", env!("CARGO_PKG_VERSION")))
    .build()
    .context("Failed to build HTTP client")?;
  let ytdlp = args.ytdlp.unwrap_or_else(|| PathBuf::from(&constants().ytdlp_program));
  let services = Services {
    provider: Arc::new(YtDlp::new(ytdlp, http.clone())),
    processes: Arc::new(SystemProcesses::new(vec![paths.bin_dir.clone()])),
    thumbs: ThumbnailCache::new(paths.thumb_dir),
    http,
    bin_dir: paths.bin_dir,
  };

  let mut app = App::new(store, services, display_mode, args.player);
  info!(display = display_mode.label(), player = %app.player, "app: ready");
  app.start();

  loop {
    app.check_pending();
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          input::handle_key_event(&mut app, key);
        }
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }

  if let Err(e) = app.store().save() {
    warn!(err = %e, "store: final save failed");
  }
  info!("mpvtube exiting");
  Ok(())
}
