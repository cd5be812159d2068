use image::DynamicImage;
use ratatui::widgets::ListState;
use reqwest::Client;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::constants::constants;
use crate::deps;
use crate::display::DisplayMode;
use crate::error::CoreError;
use crate::launcher::{self, ProcessHost};
use crate::models::{FavoriteEntry, FormatDescriptor, SearchQuery, SearchResultEntry, quality_menu};
use crate::provider::Provider;
use crate::store::StateStore;
use crate::task::{Signal, TaskHandle, TaskId, Worker};
use crate::theme::{self, THEMES, Theme};
use crate::thumbs::{Thumbnail, ThumbnailCache};

// --- Types ---

/// Formats for one video, already deduplicated and ordered for the picker.
#[derive(Debug, Clone)]
pub struct FormatLookup {
  pub entry: SearchResultEntry,
  pub formats: Vec<FormatDescriptor>,
}

/// Everything background operations report back to the controller.
#[derive(Debug)]
pub enum Message {
  Search(TaskId, Signal<Vec<SearchResultEntry>>),
  Formats(TaskId, Signal<FormatLookup>),
  Thumbnail(TaskId, Signal<Thumbnail>),
  Player(TaskId, Signal<ExitStatus>),
  Install(TaskId, Signal<PathBuf>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Input,
  Results,
  Quality,
  History,
  Favorites,
}

impl AppMode {
  /// Views reachable with Tab, in cycling order.
  pub const VIEWS: [AppMode; 3] = [AppMode::Results, AppMode::History, AppMode::Favorites];

  pub fn label(self) -> &'static str {
    match self {
      AppMode::Input => "Search",
      AppMode::Results => "Results",
      AppMode::Quality => "Quality",
      AppMode::History => "History",
      AppMode::Favorites => "Favorites",
    }
  }
}

/// Collaborators the controller starts operations against.
pub struct Services {
  pub provider: Arc<dyn Provider>,
  pub processes: Arc<dyn ProcessHost>,
  pub thumbs: ThumbnailCache,
  pub http: Client,
  pub bin_dir: PathBuf,
}

/// Handles of in-flight operations. At most one search, one format lookup,
/// one player and one install run at a time; thumbnails run in parallel.
#[derive(Default)]
pub(crate) struct ActiveTasks {
  pub(crate) search: Option<TaskHandle>,
  pub(crate) formats: Option<TaskHandle>,
  pub(crate) player: Option<TaskHandle>,
  pub(crate) install: Option<TaskHandle>,
  pub(crate) thumbs: HashMap<TaskId, TaskHandle>,
}

/// Payloads are only applied while the slot still holds the same, uncancelled task.
fn is_live(slot: &Option<TaskHandle>, id: TaskId) -> bool {
  slot.as_ref().is_some_and(|h| h.id() == id && !h.is_cancelled())
}

fn finish(slot: &mut Option<TaskHandle>, id: TaskId) -> bool {
  if slot.as_ref().is_some_and(|h| h.id() == id) {
    *slot = None;
    true
  } else {
    false
  }
}

/// Thumbnail already scaled for the preview pane: (url, width, height, image).
#[derive(Default)]
pub struct GraphicsCache {
  pub resized_thumb: Option<(String, u16, u16, DynamicImage)>,
}

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub theme_index: usize,
  pub display_mode: DisplayMode,
  pub results: Vec<SearchResultEntry>,
  pub list_state: ListState,
  pub quality: Option<FormatLookup>,
  pub quality_state: ListState,
  pub history_state: ListState,
  pub favorites_state: ListState,
  /// Decoded thumbnails keyed by thumbnail URL.
  pub thumbnails: HashMap<String, DynamicImage>,
  pub gfx: GraphicsCache,
  pub result_count: u8,
  pub player: String,
  pub now_playing: Option<String>,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  pub info_message: Option<String>,
  pub should_quit: bool,
  store: Arc<StateStore>,
  services: Services,
  worker: Worker<Message>,
  inbox: mpsc::UnboundedReceiver<Message>,
  pub(crate) tasks: ActiveTasks,
  error_time: Option<Instant>,
}

impl App {
  /// `player` overrides the stored player path when given.
  pub fn new(store: Arc<StateStore>, services: Services, display_mode: DisplayMode, player: Option<String>) -> Self {
    let settings = store.settings();
    let theme_index = theme::index_of(&store.get_setting("theme", String::new())).unwrap_or(0);
    let player = player.filter(|p| !p.trim().is_empty()).unwrap_or_else(|| store.player_path());
    let (worker, inbox) = Worker::with_inbox();

    Self {
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      mode: AppMode::Input,
      theme_index,
      display_mode,
      results: Vec::new(),
      list_state: ListState::default(),
      quality: None,
      quality_state: ListState::default(),
      history_state: ListState::default(),
      favorites_state: ListState::default(),
      thumbnails: HashMap::new(),
      gfx: GraphicsCache::default(),
      result_count: settings.max_results,
      player,
      now_playing: None,
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      store,
      services,
      worker,
      inbox,
      tasks: ActiveTasks::default(),
      error_time: None,
    }
  }

  /// Startup actions: re-run the most recent query when `auto_start_last` is on.
  pub fn start(&mut self) {
    if !self.store.settings().auto_start_last {
      return;
    }
    if let Some(last) = self.store.history().into_iter().next() {
      info!(query = %last, "app: auto-starting last search");
      self.set_input(last);
      self.trigger_search();
    }
  }

  pub fn theme(&self) -> &'static Theme {
    &THEMES[self.theme_index % THEMES.len()]
  }

  pub fn store(&self) -> &StateStore {
    &self.store
  }

  pub fn is_searching(&self) -> bool {
    self.tasks.search.is_some()
  }

  pub fn is_fetching_formats(&self) -> bool {
    self.tasks.formats.is_some()
  }

  pub fn is_playing(&self) -> bool {
    self.tasks.player.is_some()
  }

  pub fn is_installing(&self) -> bool {
    self.tasks.install.is_some()
  }

  pub fn selected_result(&self) -> Option<&SearchResultEntry> {
    self.list_state.selected().and_then(|i| self.results.get(i))
  }

  /// Tab: Results -> History -> Favorites -> Results. Lists get a selection on entry.
  pub fn next_view(&mut self) {
    let idx = AppMode::VIEWS.iter().position(|m| *m == self.mode).map_or(0, |i| (i + 1) % AppMode::VIEWS.len());
    self.mode = AppMode::VIEWS[idx];
    let (state, len) = match self.mode {
      AppMode::History => (&mut self.history_state, self.store.history().len()),
      AppMode::Favorites => (&mut self.favorites_state, self.store.favorites().len()),
      _ => (&mut self.list_state, self.results.len()),
    };
    if state.selected().is_none() && len > 0 {
      state.select(Some(0));
    }
  }

  /// Replace the query text and put the cursor at its end.
  pub fn set_input(&mut self, text: String) {
    self.cursor_position = text.chars().count();
    self.input = text;
    self.input_scroll = 0;
  }

  // --- Messages ---

  pub fn set_error(&mut self, msg: String) {
    warn!(error = %msg, "app: error shown");
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Errors dismiss themselves after 5 seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(5)
    {
      self.clear_error();
    }
  }

  fn set_info(&mut self, msg: impl Into<String>) {
    self.info_message = Some(msg.into());
  }

  // --- Inbox ---

  /// Apply every message that arrived since the last call. Never blocks.
  pub fn check_pending(&mut self) {
    while let Ok(message) = self.inbox.try_recv() {
      self.handle_message(message);
    }
  }

  fn handle_message(&mut self, message: Message) {
    match message {
      Message::Search(id, signal) => self.on_search(id, signal),
      Message::Formats(id, signal) => self.on_formats(id, signal),
      Message::Thumbnail(id, signal) => self.on_thumbnail(id, signal),
      Message::Player(id, signal) => self.on_player(id, signal),
      Message::Install(id, signal) => self.on_install(id, signal),
    }
  }

  fn on_search(&mut self, id: TaskId, signal: Signal<Vec<SearchResultEntry>>) {
    match signal {
      Signal::Result(results) if is_live(&self.tasks.search, id) => {
        if results.is_empty() {
          self.set_error("No results found.".to_string());
          return;
        }
        info!(count = results.len(), "app: search results");
        self.results = results;
        self.list_state.select(Some(0));
        self.mode = AppMode::Results;
        self.prune_thumbnails();
        self.fetch_thumbnails();
      }
      Signal::Error(e) if is_live(&self.tasks.search, id) => self.set_error(format!("Search failed: {}", e)),
      Signal::Finished => {
        if finish(&mut self.tasks.search, id) {
          self.status_message = None;
        }
      }
      _ => debug!(task = %id, "app: stale search signal dropped"),
    }
  }

  fn on_formats(&mut self, id: TaskId, signal: Signal<FormatLookup>) {
    match signal {
      Signal::Result(lookup) if is_live(&self.tasks.formats, id) => {
        if lookup.formats.is_empty() {
          self.set_error(format!("No playable formats for '{}'.", lookup.entry.title));
          return;
        }
        self.quality_state.select(Some(0));
        self.quality = Some(lookup);
        self.mode = AppMode::Quality;
      }
      Signal::Error(e) if is_live(&self.tasks.formats, id) => self.set_error(format!("Format lookup failed: {}", e)),
      Signal::Finished => {
        if finish(&mut self.tasks.formats, id) {
          self.status_message = None;
        }
      }
      _ => debug!(task = %id, "app: stale format signal dropped"),
    }
  }

  fn on_thumbnail(&mut self, id: TaskId, signal: Signal<Thumbnail>) {
    let live = self.tasks.thumbs.get(&id).is_some_and(|h| !h.is_cancelled());
    match signal {
      Signal::Result(thumb) if live => {
        self.thumbnails.insert(thumb.url, thumb.image);
      }
      // A missing thumbnail only leaves the preview empty.
      Signal::Error(e) if live => debug!(task = %id, err = %e, "app: thumbnail unavailable"),
      Signal::Finished => {
        self.tasks.thumbs.remove(&id);
      }
      _ => {}
    }
  }

  fn on_player(&mut self, id: TaskId, signal: Signal<ExitStatus>) {
    match signal {
      Signal::Result(status) if is_live(&self.tasks.player, id) => {
        if status.success() {
          self.set_info("Player closed.");
        } else {
          self.set_error(format!("Player exited with {}", status));
        }
      }
      Signal::Error(CoreError::NotFound(name)) if is_live(&self.tasks.player, id) => {
        self.set_error(format!("Player '{}' not found. Install it or press Ctrl+G to fetch it.", name));
      }
      Signal::Error(e) if is_live(&self.tasks.player, id) => self.set_error(format!("Failed to start player: {}", e)),
      Signal::Finished => {
        if finish(&mut self.tasks.player, id) {
          self.now_playing = None;
        }
      }
      _ => {}
    }
  }

  fn on_install(&mut self, id: TaskId, signal: Signal<PathBuf>) {
    match signal {
      Signal::Result(path) if is_live(&self.tasks.install, id) => {
        if let Some(dir) = path.parent() {
          self.services.processes.add_search_dir(dir.to_path_buf());
        }
        self.player = path.to_string_lossy().into_owned();
        self.store.set_player_path(&self.player);
        self.set_info(format!("Player installed to {}", path.display()));
      }
      Signal::Error(e) if is_live(&self.tasks.install, id) => self.set_error(format!("Install failed: {}", e)),
      Signal::Finished => {
        if finish(&mut self.tasks.install, id) {
          self.status_message = None;
        }
      }
      _ => {}
    }
  }

  // --- Search ---

  /// Search for the input text. Any running search is cancelled first.
  pub fn trigger_search(&mut self) {
    let text = self.input.trim().to_string();
    let query = match SearchQuery::new(&text, self.result_count) {
      Ok(query) => query,
      Err(e) => {
        self.set_error(e.to_string());
        return;
      }
    };

    self.cancel_search();
    self.cancel_thumbnails();
    self.clear_error();
    self.info_message = None;
    self.results.clear();
    self.list_state.select(None);
    self.store.add_history(&text);

    info!(query = %text, limit = query.limit(), "app: search triggered");
    self.status_message = Some(format!("Searching '{}'…", text));
    let op = self.services.provider.search(query);
    self.tasks.search = Some(self.worker.start(Message::Search, op));
  }

  /// Stop waiting for the running search. Its results are discarded when they arrive and
  /// the slot stays busy until the task reports `Finished`.
  pub fn cancel_search(&mut self) {
    if let Some(handle) = self.tasks.search.as_ref().filter(|h| !h.is_cancelled()) {
      handle.cancel();
      self.status_message = None;
      self.set_info("Search cancelled.");
    }
  }

  fn cancel_thumbnails(&mut self) {
    for handle in self.tasks.thumbs.values() {
      handle.cancel();
    }
    self.tasks.thumbs.clear();
  }

  /// Keep only the decoded thumbnails the current results still show.
  fn prune_thumbnails(&mut self) {
    let results = &self.results;
    self.thumbnails.retain(|url, _| results.iter().any(|r| r.thumbnail.as_deref() == Some(url.as_str())));
    if self.gfx.resized_thumb.as_ref().is_some_and(|(url, ..)| !self.thumbnails.contains_key(url)) {
      self.gfx.resized_thumb = None;
    }
  }

  fn fetch_thumbnails(&mut self) {
    let urls: Vec<String> = self
      .results
      .iter()
      .filter_map(|r| r.thumbnail.clone())
      .filter(|url| !self.thumbnails.contains_key(url))
      .collect();
    for url in urls {
      let cache = self.services.thumbs.clone();
      let provider = Arc::clone(&self.services.provider);
      let handle = self.worker.start(Message::Thumbnail, async move { cache.load_or_fetch(provider, url).await });
      self.tasks.thumbs.insert(handle.id(), handle);
    }
  }

  /// Re-run the history entry at `index`.
  pub fn rerun_history(&mut self, index: usize) {
    if let Some(query) = self.store.history().into_iter().nth(index) {
      self.set_input(query);
      self.trigger_search();
    }
  }

  // --- Quality + playback ---

  /// Look up formats for `entry` and open the quality picker when they arrive.
  pub fn open_quality(&mut self, entry: SearchResultEntry) {
    if let Some(previous) = self.tasks.formats.take() {
      previous.cancel();
    }
    info!(url = %entry.url, "app: format lookup");
    self.clear_error();
    self.status_message = Some(format!("Fetching formats for '{}'…", entry.title));
    let lookup = self.services.provider.lookup_formats(entry.url.clone());
    self.tasks.formats = Some(self.worker.start(Message::Formats, async move {
      let formats = quality_menu(lookup.await?);
      Ok::<_, CoreError>(FormatLookup { entry, formats })
    }));
  }

  /// Start the player for `entry` with `format_id`. Refused while a player is running.
  pub fn play(&mut self, entry: &SearchResultEntry, format_id: &str) {
    if self.is_playing() {
      self.set_error("A player is already running.".to_string());
      return;
    }
    info!(url = %entry.url, format = %format_id, "app: launching player");
    self.clear_error();
    self.now_playing = Some(entry.title.clone());
    let host = Arc::clone(&self.services.processes);
    let op = launcher::launch(host, self.player.clone(), format_id.to_string(), entry.url.clone());
    self.tasks.player = Some(self.worker.start(Message::Player, op));
  }

  /// Play with the fixed quick-play format, skipping the picker.
  pub fn quick_play(&mut self, entry: &SearchResultEntry) {
    self.play(entry, &constants().quick_play_format);
  }

  /// Play the format highlighted in the quality picker.
  pub fn play_selected_quality(&mut self) {
    let Some(lookup) = self.quality.as_ref() else { return };
    let Some(format) = self.quality_state.selected().and_then(|i| lookup.formats.get(i)) else { return };
    let (entry, id) = (lookup.entry.clone(), format.id.clone());
    self.play(&entry, &id);
  }

  // --- Favorites ---

  pub fn add_favorite(&mut self, entry: &SearchResultEntry) {
    if self.store.add_favorite(FavoriteEntry::from(entry)) {
      self.set_info(format!("Added '{}' to favorites.", entry.title));
    } else {
      self.set_info("Already in favorites.");
    }
  }

  pub fn remove_favorite(&mut self, url: &str) {
    let removed = self.store.remove_favorite(url);
    if removed > 0 {
      self.set_info("Removed from favorites.");
    }
    let len = self.store.favorites().len();
    match self.favorites_state.selected() {
      Some(_) if len == 0 => self.favorites_state.select(None),
      Some(i) if i >= len => self.favorites_state.select(Some(len - 1)),
      _ => {}
    }
  }

  // --- Settings ---

  /// Change the number of requested results by `delta`, within 1..=limit, and persist it.
  pub fn adjust_count(&mut self, delta: i16) {
    let max = i16::from(constants().max_results_limit);
    let next = (i16::from(self.result_count) + delta).clamp(1, max) as u8;
    if next == self.result_count {
      return;
    }
    self.result_count = next;
    if let Err(e) = self.store.set_setting("max_results", next) {
      self.set_error(format!("Could not save setting: {}", e));
    }
  }

  pub fn next_theme(&mut self) {
    self.theme_index = (self.theme_index + 1) % THEMES.len();
    let name = self.theme().name;
    if let Err(e) = self.store.set_setting("theme", name) {
      self.set_error(format!("Could not save setting: {}", e));
    }
  }

  // --- Dependencies ---

  /// Download the player into the local tool directory (Windows only).
  pub fn trigger_install(&mut self) {
    if self.is_installing() {
      return;
    }
    self.status_message = Some("Downloading player…".to_string());
    let op = deps::install_player(self.services.http.clone(), self.services.bin_dir.clone());
    self.tasks.install = Some(self.worker.start(Message::Install, op));
  }
}
