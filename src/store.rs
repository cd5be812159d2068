//! Persisted history, favorites and settings.
//!
//! The whole document lives in one JSON file. Every mutation re-serializes it and
//! replaces the file atomically (temp file + rename), under the same lock that guards
//! the in-memory copy, so writers on any thread are serialized.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::error::{CoreError, Result};
use crate::models::FavoriteEntry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  #[serde(deserialize_with = "lenient_quality")]
  pub default_quality: String,
  #[serde(deserialize_with = "lenient_flag")]
  pub auto_start_last: bool,
  #[serde(deserialize_with = "lenient_count")]
  pub max_results: u8,
  /// Keys this version does not know about are kept as-is.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

// A bad value for one recognized setting resets only that setting.

fn lenient_quality<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
  let value = Value::deserialize(d)?;
  Ok(value.as_str().map(str::trim).filter(|q| !q.is_empty()).map_or_else(|| Settings::default().default_quality, String::from))
}

fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
  Ok(Value::deserialize(d)?.as_bool().unwrap_or_default())
}

/// Any JSON number, rounded and clamped to `1..=max_results_limit`.
fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u8, D::Error> {
  let limit = constants().max_results_limit;
  Ok(match Value::deserialize(d)?.as_f64() {
    Some(n) if n.is_finite() => n.round().clamp(1.0, f64::from(limit)) as u8,
    _ => constants().default_max_results,
  })
}

fn lenient_settings<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Settings, D::Error> {
  let value = Value::deserialize(d)?;
  Ok(if value.is_object() { serde_json::from_value(value).unwrap_or_default() } else { Settings::default() })
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      default_quality: "best".to_string(),
      auto_start_last: false,
      max_results: constants().default_max_results,
      extra: Map::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
  pub mpv_path: String,
  pub history: Vec<String>,
  pub favorites: Vec<FavoriteEntry>,
  #[serde(deserialize_with = "lenient_settings")]
  pub settings: Settings,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Default for PersistedState {
  fn default() -> Self {
    Self {
      mpv_path: constants().default_player.clone(),
      history: Vec::new(),
      favorites: Vec::new(),
      settings: Settings::default(),
      extra: Map::new(),
    }
  }
}

impl PersistedState {
  /// Move `query` to the front of the history, capped.
  pub fn push_history(&mut self, query: &str) {
    self.history.retain(|q| q != query);
    self.history.insert(0, query.to_string());
    self.history.truncate(constants().history_cap);
  }

  /// Insert `entry` at the front unless an equal entry exists. Returns whether it was inserted.
  pub fn push_favorite(&mut self, entry: FavoriteEntry) -> bool {
    if self.favorites.contains(&entry) {
      return false;
    }
    self.favorites.insert(0, entry);
    self.favorites.truncate(constants().favorites_cap);
    true
  }

  /// Restore the size and uniqueness invariants on a document read from disk.
  fn normalize(&mut self) {
    let mut history: Vec<String> = Vec::with_capacity(self.history.len());
    for q in self.history.drain(..) {
      if !history.contains(&q) {
        history.push(q);
      }
    }
    history.truncate(constants().history_cap);
    self.history = history;

    let mut favorites: Vec<FavoriteEntry> = Vec::with_capacity(self.favorites.len());
    for f in self.favorites.drain(..) {
      if !favorites.contains(&f) {
        favorites.push(f);
      }
    }
    favorites.truncate(constants().favorites_cap);
    self.favorites = favorites;

    self.settings.max_results = self.settings.max_results.clamp(1, constants().max_results_limit);
    if self.mpv_path.trim().is_empty() {
      self.mpv_path = constants().default_player.clone();
    }
  }
}

/// Read the document at `path`. Missing or malformed files yield defaults.
pub fn load(path: &Path) -> PersistedState {
  let content = match std::fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      info!(path = %path.display(), "store: no state file, using defaults");
      return PersistedState::default();
    }
    Err(e) => {
      warn!(path = %path.display(), err = %e, "store: state file unreadable, using defaults");
      return PersistedState::default();
    }
  };
  match serde_json::from_str::<PersistedState>(&content) {
    Ok(mut state) => {
      state.normalize();
      state
    }
    Err(e) => {
      warn!(path = %path.display(), err = %e, "store: state file malformed, using defaults");
      PersistedState::default()
    }
  }
}

/// Write `state` to `path` by way of a sibling temp file, so a failure never truncates the old document.
pub fn write_atomic(path: &Path, state: &PersistedState) -> Result<()> {
  let dir = match path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
    _ => PathBuf::from("."),
  };
  std::fs::create_dir_all(&dir)?;
  let json = serde_json::to_vec_pretty(state).map_err(std::io::Error::other)?;

  let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
  tmp.write_all(&json)?;
  tmp.as_file().sync_all()?;
  tmp.persist(path).map_err(|e| e.error)?;
  Ok(())
}

pub struct StateStore {
  path: PathBuf,
  state: Mutex<PersistedState>,
}

impl StateStore {
  /// Load the document at `path` (never fails; see [`load`]).
  pub fn open(path: PathBuf) -> Self {
    let state = load(&path);
    Self { path, state: Mutex::new(state) }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn lock(&self) -> MutexGuard<'_, PersistedState> {
    // Every mutation is a single field update, so a poisoned document is still consistent.
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// Write-through save used by the mutators. Failures are logged and the in-memory state wins.
  fn persist(&self, state: &PersistedState) {
    if let Err(e) = write_atomic(&self.path, state) {
      warn!(path = %self.path.display(), err = %e, "store: save failed, keeping in-memory state");
    } else {
      debug!(path = %self.path.display(), "store: saved");
    }
  }

  pub fn save(&self) -> Result<()> {
    let state = self.lock();
    write_atomic(&self.path, &state)
  }

  #[cfg(test)]
  pub fn snapshot(&self) -> PersistedState {
    self.lock().clone()
  }

  pub fn history(&self) -> Vec<String> {
    self.lock().history.clone()
  }

  pub fn favorites(&self) -> Vec<FavoriteEntry> {
    self.lock().favorites.clone()
  }

  pub fn settings(&self) -> Settings {
    self.lock().settings.clone()
  }

  pub fn player_path(&self) -> String {
    self.lock().mpv_path.clone()
  }

  pub fn set_player_path(&self, path: &str) {
    let mut state = self.lock();
    state.mpv_path = path.to_string();
    self.persist(&state);
  }

  pub fn add_history(&self, query: &str) {
    let mut state = self.lock();
    state.push_history(query);
    self.persist(&state);
  }

  pub fn add_favorite(&self, entry: FavoriteEntry) -> bool {
    let mut state = self.lock();
    let inserted = state.push_favorite(entry);
    if inserted {
      self.persist(&state);
    }
    inserted
  }

  /// Remove every favorite with `url`. Returns how many were removed.
  pub fn remove_favorite(&self, url: &str) -> usize {
    let mut state = self.lock();
    let before = state.favorites.len();
    state.favorites.retain(|f| f.url != url);
    let removed = before - state.favorites.len();
    if removed > 0 {
      self.persist(&state);
    }
    removed
  }

  /// Typed read of a setting; `default` when missing or of the wrong shape.
  pub fn get_setting<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
    let state = self.lock();
    let Ok(Value::Object(map)) = serde_json::to_value(&state.settings) else {
      return default;
    };
    map.get(key).cloned().and_then(|v| serde_json::from_value(v).ok()).unwrap_or(default)
  }

  /// Typed write of a setting. Recognized keys must keep their type; nothing is saved on rejection.
  pub fn set_setting<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
    let invalid = |reason: String| CoreError::InvalidSetting { key: key.to_string(), reason };
    let value = serde_json::to_value(value).map_err(|e| invalid(e.to_string()))?;
    let limit = constants().max_results_limit;
    match key {
      "default_quality" if !value.is_string() => return Err(invalid("expected a string".to_string())),
      "auto_start_last" if !value.is_boolean() => return Err(invalid("expected a boolean".to_string())),
      "max_results" if !value.as_u64().is_some_and(|n| (1..=u64::from(limit)).contains(&n)) => {
        return Err(invalid(format!("must be an integer within 1..={}", limit)));
      }
      _ => {}
    }

    let mut state = self.lock();
    let mut map = match serde_json::to_value(&state.settings) {
      Ok(Value::Object(map)) => map,
      _ => Map::new(),
    };
    map.insert(key.to_string(), value);
    let settings: Settings = serde_json::from_value(Value::Object(map)).map_err(|e| invalid(e.to_string()))?;
    state.settings = settings;
    self.persist(&state);
    Ok(())
  }
}
