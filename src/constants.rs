//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!`, parsed once on first access.

use serde::Deserialize;
use std::sync::LazyLock;

#[derive(Debug, Deserialize)]
pub struct Constants {
  // Persisted state
  pub state_file_name: String,
  pub cache_dir_name: String,
  pub history_cap: usize,
  pub favorites_cap: usize,

  // Search
  pub max_results_limit: u8,
  pub default_max_results: u8,

  // Player
  pub default_player: String,
  pub format_flag: String,
  pub quick_play_format: String,

  // Provider
  pub ytdlp_program: String,

  // Dependency fetch
  pub player_archive_url: String,
  pub player_executable: String,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; a malformed file fails the first test run.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.history_cap, 20);
    assert_eq!(c.favorites_cap, 50);
    assert_eq!(c.max_results_limit, 50);
    assert_eq!(c.default_player, "mpv");
    assert_eq!(c.quick_play_format, "best");
  }
}
