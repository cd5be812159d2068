use directories::{BaseDirs, ProjectDirs};
use std::path::{Path, PathBuf};

use crate::constants::constants;

/// Per-user locations. The state file and thumbnail cache live directly in the home
/// directory; logs and downloaded tools go to the platform data directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
  pub state_file: PathBuf,
  pub thumb_dir: PathBuf,
  pub bin_dir: PathBuf,
  pub log_dir: PathBuf,
}

impl AppPaths {
  pub fn discover() -> Option<Self> {
    let home = BaseDirs::new()?.home_dir().to_path_buf();
    let project = ProjectDirs::from("", "", "mpvtube")?;
    let c = constants();
    Some(Self {
      state_file: home.join(&c.state_file_name),
      thumb_dir: home.join(&c.cache_dir_name).join("thumbs"),
      bin_dir: project.data_dir().join("bin"),
      log_dir: project.data_dir().join("logs"),
    })
  }

  /// Everything under one directory (tests, portable installs).
  pub fn under(base: &Path) -> Self {
    let c = constants();
    Self {
      state_file: base.join(&c.state_file_name),
      thumb_dir: base.join(&c.cache_dir_name).join("thumbs"),
      bin_dir: base.join("bin"),
      log_dir: base.join("logs"),
    }
  }
}
