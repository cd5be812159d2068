use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, List, ListItem, ListState, Padding, Paragraph, Wrap},
};

use crate::app::{App, AppMode};
use crate::graphics::{ThumbnailWidget, fit_to_cells};
use crate::theme::Theme;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

fn panel<'a>(theme: &Theme, title: impl Into<Line<'a>>) -> Block<'a> {
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border))
}

/// Striped rows with `left` truncated so `right` stays flush with the edge.
fn striped_items<'a>(theme: &Theme, rows: Vec<(String, String)>, selected: Option<usize>, inner_w: usize) -> Vec<ListItem<'a>> {
  rows
    .into_iter()
    .enumerate()
    .map(|(i, (left, right))| {
      let is_selected = Some(i) == selected;
      let fg = if is_selected { theme.highlight_fg } else { theme.fg };
      let bg = if is_selected {
        theme.highlight_bg
      } else if i % 2 == 1 {
        theme.stripe_bg
      } else {
        theme.bg
      };

      let right_w = right.chars().count();
      let title = truncate_str(&left, inner_w.saturating_sub(if right_w > 0 { right_w + 2 } else { 0 }));
      let gap = inner_w.saturating_sub(title.chars().count() + right_w);
      let line = Line::from(vec![
        Span::styled(title, Style::default().fg(fg)),
        Span::raw(" ".repeat(gap)),
        Span::styled(right, Style::default().fg(theme.muted)),
      ]);
      ListItem::new(line).bg(bg)
    })
    .collect()
}

fn render_list(frame: &mut Frame, theme: &Theme, area: Rect, title: String, items: Vec<ListItem>, state: &mut ListState) {
  let list = List::new(items)
    .block(panel(theme, title))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg).add_modifier(Modifier::BOLD));
  frame.render_stateful_widget(list, area, state);
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  render_main(frame, app, main_area);
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let tabs: Vec<Span> = AppMode::VIEWS
    .iter()
    .flat_map(|mode| {
      let style = if *mode == app.mode {
        Style::default().fg(theme.accent).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
      } else {
        Style::default().fg(theme.muted)
      };
      [Span::styled(mode.label(), style), Span::raw("  ")]
    })
    .collect();
  let mut spans = vec![Span::styled(" ▶ mpvtube ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))];
  spans.extend(tabs);
  frame.render_widget(Line::from(spans), area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_main(frame: &mut Frame, app: &mut App, area: Rect) {
  match app.mode {
    AppMode::Results if !app.results.is_empty() => render_results(frame, app, area),
    AppMode::Quality if app.quality.is_some() => render_quality(frame, app, area),
    AppMode::History => render_history(frame, app, area),
    AppMode::Favorites => render_favorites(frame, app, area),
    _ if !app.results.is_empty() => render_results(frame, app, area),
    _ => render_welcome(frame, app.theme(), area),
  }
}

fn render_welcome(frame: &mut Frame, theme: &Theme, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("▶  Welcome to mpvtube", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled("Search YouTube. Pick a quality. Watch in mpv.", Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled("Type a query or paste a URL below and press Enter.", Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
    Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border)),
  );
  frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let [list_area, preview_area] =
    Layout::horizontal([Constraint::Percentage(62), Constraint::Percentage(38)]).areas(area);

  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = list_area.width.saturating_sub(4) as usize;
  let rows = app.results.iter().map(|r| (r.title.clone(), r.meta_line())).collect();
  let items = striped_items(theme, rows, app.list_state.selected(), inner_w);
  let title = format!(" Results ({}) ", app.results.len());
  render_list(frame, theme, list_area, title, items, &mut app.list_state);

  render_preview(frame, app, preview_area);
}

fn render_preview(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let block = panel(theme, format!(" Preview · {} ", app.display_mode.label()));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let Some(entry) = app.selected_result().cloned() else { return };
  let text_rows = 4u16.min(inner.height);
  let [thumb_area, info_area] =
    Layout::vertical([Constraint::Min(0), Constraint::Length(text_rows)]).areas(inner);

  if let Some(url) = entry.thumbnail.as_deref()
    && let Some(image) = app.thumbnails.get(url)
    && !thumb_area.is_empty()
  {
    let (w, h) = (thumb_area.width, thumb_area.height);
    let cached = app.gfx.resized_thumb.as_ref().is_some_and(|(u, cw, ch, _)| u == url && *cw == w && *ch == h);
    if !cached {
      app.gfx.resized_thumb = Some((url.to_string(), w, h, fit_to_cells(image, w, h, app.display_mode)));
    }
    if let Some((_, _, _, fitted)) = app.gfx.resized_thumb.as_ref() {
      frame.render_widget(ThumbnailWidget { image: fitted, mode: app.display_mode }, thumb_area);
    }
  } else if !thumb_area.is_empty() {
    let placeholder = if entry.thumbnail.is_some() { "loading thumbnail…" } else { "no thumbnail" };
    let text = Paragraph::new(Span::styled(placeholder, Style::default().fg(theme.muted))).alignment(Alignment::Center);
    let [_, middle, _] =
      Layout::vertical([Constraint::Fill(1), Constraint::Length(1), Constraint::Fill(1)]).areas(thumb_area);
    frame.render_widget(text, middle);
  }

  let info = vec![
    Line::from(Span::styled(entry.title.clone(), Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
    Line::from(Span::styled(entry.meta_line(), Style::default().fg(theme.muted))),
    Line::from(Span::styled(entry.url.clone(), Style::default().fg(theme.muted))),
  ];
  frame.render_widget(Paragraph::new(info).wrap(Wrap { trim: true }), info_area);
}

fn render_quality(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let Some(lookup) = app.quality.as_ref() else { return };
  let inner_w = area.width.saturating_sub(4) as usize;
  let rows = lookup.formats.iter().map(|f| (format!("{:<14}{}", f.label(), f.detail()), String::new())).collect();
  let items = striped_items(theme, rows, app.quality_state.selected(), inner_w);
  let title = format!(" Quality · {} ", truncate_str(&lookup.entry.title, inner_w.saturating_sub(12)));
  render_list(frame, theme, area, title, items, &mut app.quality_state);
}

fn render_history(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let history = app.store().history();
  if history.is_empty() {
    render_empty(frame, theme, area, " History ", "No searches yet.");
    return;
  }
  let inner_w = area.width.saturating_sub(4) as usize;
  let rows = history.into_iter().enumerate().map(|(i, q)| (q, format!("{}", i + 1))).collect();
  let items = striped_items(theme, rows, app.history_state.selected(), inner_w);
  render_list(frame, theme, area, " History ".to_string(), items, &mut app.history_state);
}

fn render_favorites(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let favorites = app.store().favorites();
  if favorites.is_empty() {
    render_empty(frame, theme, area, " Favorites ", "Press f on a result to keep it here.");
    return;
  }
  let inner_w = area.width.saturating_sub(4) as usize;
  let rows = favorites
    .into_iter()
    .map(|f| {
      let duration = f.duration.and_then(crate::models::format_duration).unwrap_or_default();
      (f.title, duration)
    })
    .collect();
  let items = striped_items(theme, rows, app.favorites_state.selected(), inner_w);
  render_list(frame, theme, area, " Favorites ".to_string(), items, &mut app.favorites_state);
}

fn render_empty(frame: &mut Frame, theme: &Theme, area: Rect, title: &'static str, hint: &'static str) {
  let paragraph = Paragraph::new(vec![Line::from(""), Line::from(Span::styled(hint, Style::default().fg(theme.muted)))])
    .alignment(Alignment::Center)
    .block(panel(theme, title));
  frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(theme.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(title) = &app.now_playing {
    (format!(" ♪ Playing {}", title), Style::default().fg(theme.status))
  } else if let Some(info) = &app.info_message {
    (format!(" ℹ {}", info), Style::default().fg(theme.muted))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let border_color = if app.mode == AppMode::Input { theme.accent } else { theme.border };
  let input_block = Block::bordered()
    .title(" Search YouTube ")
    .title(Line::from(format!(" {} results ", app.result_count)).right_aligned())
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if app.mode == AppMode::Input {
    let cursor_x = area.x + 2 + (cursor_col - app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let mut keys: Vec<(&str, &str)> = match app.mode {
    AppMode::Input if app.is_searching() => vec![("Esc", "Cancel")],
    AppMode::Input => vec![("Enter", "Search"), ("Tab", "Views"), ("Esc", if app.results.is_empty() { "Quit" } else { "Clear" })],
    AppMode::Results => vec![("Enter", "Quality"), ("b", "Play best"), ("f", "Favorite"), ("j/k", "Navigate"), ("Esc", "Search")],
    AppMode::Quality => vec![("Enter", "Play"), ("j/k", "Navigate"), ("Esc", "Back")],
    AppMode::History => vec![("Enter", "Search again"), ("Tab", "Views"), ("Esc", "Search")],
    AppMode::Favorites => vec![("Enter", "Quality"), ("b", "Play best"), ("d", "Remove"), ("Esc", "Search")],
  };
  keys.extend([("^↑/↓", "Count"), ("^t", "Theme"), ("^g", "Get mpv")]);

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw(" "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}
