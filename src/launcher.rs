use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, RwLock};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::constants::constants;
use crate::error::{CoreError, Result};

/// Executable lookup and process creation for the player.
pub trait ProcessHost: Send + Sync {
  fn resolve(&self, name: &str) -> Result<PathBuf>;
  fn spawn(&self, program: &Path, args: &[String]) -> Result<Child>;

  /// Extend the resolution path, e.g. after the dependency fetch installed a binary.
  fn add_search_dir(&self, _dir: PathBuf) {}
}

/// Resolves against locally installed tool directories first, then `PATH`.
#[derive(Default)]
pub struct SystemProcesses {
  extra_dirs: RwLock<Vec<PathBuf>>,
}

impl SystemProcesses {
  pub fn new(extra_dirs: Vec<PathBuf>) -> Self {
    Self { extra_dirs: RwLock::new(extra_dirs) }
  }

  fn search_path(&self) -> Option<OsString> {
    let dirs = self.extra_dirs.read().unwrap_or_else(|p| p.into_inner());
    let system = std::env::var_os("PATH");
    let all = dirs.iter().cloned().chain(system.iter().flat_map(std::env::split_paths));
    std::env::join_paths(all).ok()
  }
}

impl ProcessHost for SystemProcesses {
  fn add_search_dir(&self, dir: PathBuf) {
    let mut dirs = self.extra_dirs.write().unwrap_or_else(|p| p.into_inner());
    if !dirs.contains(&dir) {
      info!(dir = %dir.display(), "launcher: added search dir");
      dirs.insert(0, dir);
    }
  }

  fn resolve(&self, name: &str) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    which::which_in(name, self.search_path(), cwd).map_err(|_| CoreError::NotFound(name.to_string()))
  }

  fn spawn(&self, program: &Path, args: &[String]) -> Result<Child> {
    Command::new(program)
      .args(args)
      .stdin(Stdio::null())
      // Never piped: an undrained pipe fills up and blocks the player.
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .spawn()
      .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
          CoreError::NotFound(program.display().to_string())
        } else {
          CoreError::Io(e)
        }
      })
  }
}

/// `["--format-override=<id>", url]`; the program itself goes in front when spawning.
pub fn player_args(format_id: &str, url: &str) -> Vec<String> {
  vec![format!("{}={}", constants().format_flag, format_id), url.to_string()]
}

/// Resolve `player`, start it for `url` with `format_id`, and wait for it to exit.
///
/// Resolution failure is reported before anything is spawned. Run this as a background
/// operation; it only blocks the task it runs on.
pub async fn launch(host: Arc<dyn ProcessHost>, player: String, format_id: String, url: String) -> Result<ExitStatus> {
  let program = host.resolve(&player).inspect_err(|_| {
    warn!(player = %player, "launcher: player not found, nothing spawned");
  })?;

  let args = player_args(&format_id, &url);
  info!(program = %program.display(), ?args, "launcher: starting player");
  let mut child = host.spawn(&program, &args)?;

  let status = child.wait().await?;
  info!(code = ?status.code(), "launcher: player exited");
  Ok(status)
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Resolves nothing and counts spawn attempts.
  #[derive(Default)]
  pub struct EmptySystem {
    pub spawns: AtomicUsize,
  }

  impl ProcessHost for EmptySystem {
    fn resolve(&self, name: &str) -> Result<PathBuf> {
      Err(CoreError::NotFound(name.to_string()))
    }

    fn spawn(&self, _program: &Path, _args: &[String]) -> Result<Child> {
      self.spawns.fetch_add(1, Ordering::SeqCst);
      Err(CoreError::Io(std::io::Error::other("spawn should not be reached")))
    }
  }
}
