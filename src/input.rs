use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, AppMode};
use crate::models::SearchResultEntry;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

/// Move a list selection by one with wrap-around.
fn step(selected: Option<usize>, count: usize, forward: bool) -> Option<usize> {
  if count == 0 {
    return None;
  }
  Some(match (selected, forward) {
    (None, _) => 0,
    (Some(i), true) => (i + 1) % count,
    (Some(0), false) => count - 1,
    (Some(i), false) => (i - 1).min(count - 1),
  })
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('c') => {
        app.should_quit = true;
        return;
      }
      KeyCode::Char('t') => {
        app.next_theme();
        return;
      }
      KeyCode::Char('g') => {
        app.trigger_install();
        return;
      }
      KeyCode::Up => {
        app.adjust_count(1);
        return;
      }
      KeyCode::Down => {
        app.adjust_count(-1);
        return;
      }
      _ => {}
    }
  }

  if key.code == KeyCode::Tab {
    app.next_view();
    return;
  }

  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Results => handle_results_key(app, key),
    AppMode::Quality => handle_quality_key(app, key),
    AppMode::History => handle_history_key(app, key),
    AppMode::Favorites => handle_favorites_key(app, key),
  }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => {
      app.trigger_search();
    }
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Esc => {
      if app.is_searching() {
        app.cancel_search();
      } else if !app.input.is_empty() {
        app.set_input(String::new());
      } else if !app.results.is_empty() {
        app.mode = AppMode::Results;
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Down => {
      if !app.results.is_empty() {
        app.mode = AppMode::Results;
      }
    }
    _ => {}
  }
}

fn handle_results_key(app: &mut App, key: KeyEvent) {
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      app.list_state.select(step(app.list_state.selected(), app.results.len(), true));
    }
    KeyCode::Up | KeyCode::Char('k') => {
      app.list_state.select(step(app.list_state.selected(), app.results.len(), false));
    }
    KeyCode::Enter => {
      if let Some(entry) = app.selected_result().cloned() {
        app.open_quality(entry);
      }
    }
    KeyCode::Char('b') => {
      if let Some(entry) = app.selected_result().cloned() {
        app.quick_play(&entry);
      }
    }
    KeyCode::Char('f') => {
      if let Some(entry) = app.selected_result().cloned() {
        app.add_favorite(&entry);
      }
    }
    KeyCode::Esc | KeyCode::Char('/') => {
      if app.is_searching() {
        app.cancel_search();
      }
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

fn handle_quality_key(app: &mut App, key: KeyEvent) {
  let count = app.quality.as_ref().map_or(0, |q| q.formats.len());
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      app.quality_state.select(step(app.quality_state.selected(), count, true));
    }
    KeyCode::Up | KeyCode::Char('k') => {
      app.quality_state.select(step(app.quality_state.selected(), count, false));
    }
    KeyCode::Enter => {
      app.play_selected_quality();
    }
    KeyCode::Esc => {
      app.quality = None;
      app.mode = if app.results.is_empty() { AppMode::Favorites } else { AppMode::Results };
    }
    _ => {}
  }
}

fn handle_history_key(app: &mut App, key: KeyEvent) {
  let count = app.store().history().len();
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      app.history_state.select(step(app.history_state.selected(), count, true));
    }
    KeyCode::Up | KeyCode::Char('k') => {
      app.history_state.select(step(app.history_state.selected(), count, false));
    }
    KeyCode::Enter => {
      if let Some(i) = app.history_state.selected() {
        app.rerun_history(i);
      }
    }
    KeyCode::Esc => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

fn handle_favorites_key(app: &mut App, key: KeyEvent) {
  let favorites = app.store().favorites();
  let selected = app.favorites_state.selected().and_then(|i| favorites.get(i));
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      app.favorites_state.select(step(app.favorites_state.selected(), favorites.len(), true));
    }
    KeyCode::Up | KeyCode::Char('k') => {
      app.favorites_state.select(step(app.favorites_state.selected(), favorites.len(), false));
    }
    KeyCode::Enter => {
      if let Some(fav) = selected {
        app.open_quality(SearchResultEntry::from(fav));
      }
    }
    KeyCode::Char('b') => {
      if let Some(fav) = selected {
        app.quick_play(&SearchResultEntry::from(fav));
      }
    }
    KeyCode::Char('d') | KeyCode::Delete => {
      if let Some(fav) = selected {
        app.remove_favorite(&fav.url);
      }
    }
    KeyCode::Esc => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::testing::{entry, harness, settle};
  use crate::provider::testing::FakeProvider;

  fn press(app: &mut App, code: KeyCode) {
    handle_key_event(app, KeyEvent::new(code, KeyModifiers::NONE));
  }

  fn ctrl(app: &mut App, code: KeyCode) {
    handle_key_event(app, KeyEvent::new(code, KeyModifiers::CONTROL));
  }

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5); // past end
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 0), 0);
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6);
  }

  #[test]
  fn char_to_byte_empty() {
    assert_eq!(char_to_byte_index("", 0), 0);
    assert_eq!(char_to_byte_index("", 5), 0);
  }

  #[test]
  fn step_wraps_both_ways() {
    assert_eq!(step(None, 3, true), Some(0));
    assert_eq!(step(Some(2), 3, true), Some(0));
    assert_eq!(step(Some(0), 3, false), Some(2));
    assert_eq!(step(Some(1), 0, true), None);
  }

  // --- key handling ---

  #[tokio::test]
  async fn typing_edits_at_cursor() {
    let mut h = harness(FakeProvider::with_results(Vec::new()));
    for c in "cts".chars() {
      press(&mut h.app, KeyCode::Char(c));
    }
    press(&mut h.app, KeyCode::Left);
    press(&mut h.app, KeyCode::Left);
    press(&mut h.app, KeyCode::Char('a'));
    assert_eq!(h.app.input, "cats");
    press(&mut h.app, KeyCode::Home);
    press(&mut h.app, KeyCode::Delete);
    assert_eq!(h.app.input, "ats");
  }

  #[tokio::test]
  async fn enter_searches_and_results_keys_act_on_selection() {
    let results = vec![entry("Cats", "https://y/1"), entry("Dogs", "https://y/2")];
    let mut h = harness(FakeProvider::with_results(results));
    h.app.set_input("pets".to_string());
    press(&mut h.app, KeyCode::Enter);
    settle(&mut h.app, |a| a.mode == AppMode::Results && !a.is_searching()).await;

    press(&mut h.app, KeyCode::Char('j'));
    press(&mut h.app, KeyCode::Char('f'));
    let favorites = h.app.store().favorites();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].title, "Dogs");
  }

  #[tokio::test]
  async fn esc_cancels_running_search() {
    let mut h = harness(FakeProvider::with_results(vec![entry("Cats", "https://y/1")]));
    h.app.set_input("cats".to_string());
    press(&mut h.app, KeyCode::Enter);
    press(&mut h.app, KeyCode::Esc);
    assert_eq!(h.app.info_message.as_deref(), Some("Search cancelled."));
    // A second Esc before the task finishes neither clears the input nor quits.
    press(&mut h.app, KeyCode::Esc);
    assert_eq!(h.app.input, "cats");
    assert!(!h.app.should_quit);

    settle(&mut h.app, |a| !a.is_searching()).await;
    assert!(h.app.results.is_empty());
    assert_eq!(h.app.mode, AppMode::Input);
  }

  #[tokio::test]
  async fn control_keys_adjust_count_and_quit() {
    let mut h = harness(FakeProvider::with_results(Vec::new()));
    let start = h.app.result_count;
    ctrl(&mut h.app, KeyCode::Down);
    assert_eq!(h.app.result_count, start - 1);
    ctrl(&mut h.app, KeyCode::Char('c'));
    assert!(h.app.should_quit);
  }

  #[tokio::test]
  async fn ctrl_g_fetches_player_and_tab_still_switches_views() {
    let mut h = harness(FakeProvider::with_results(Vec::new()));
    h.app.mode = AppMode::Results;
    press(&mut h.app, KeyCode::Tab);
    assert_eq!(h.app.mode, AppMode::History);
    assert!(!h.app.is_installing());

    ctrl(&mut h.app, KeyCode::Char('g'));
    assert!(h.app.is_installing());
    assert_eq!(h.app.mode, AppMode::History);
  }

  #[tokio::test]
  async fn favorites_view_removes_with_d() {
    let mut h = harness(FakeProvider::with_results(Vec::new()));
    h.app.add_favorite(&entry("Cats", "https://y/1"));
    h.app.mode = AppMode::History;
    press(&mut h.app, KeyCode::Tab);
    assert_eq!(h.app.mode, AppMode::Favorites);
    press(&mut h.app, KeyCode::Char('d'));
    assert!(h.app.store().favorites().is_empty());
  }
}
