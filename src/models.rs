use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::constants::constants;
use crate::error::{CoreError, Result};

/// A validated search request: trimmed text (or URL) plus the number of results wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
  text: String,
  limit: u8,
}

impl SearchQuery {
  pub fn new(text: &str, limit: u8) -> Result<Self> {
    let text = text.trim();
    if text.is_empty() {
      return Err(CoreError::InvalidQuery("query is empty".to_string()));
    }
    let max = constants().max_results_limit;
    if limit == 0 || limit > max {
      return Err(CoreError::InvalidQuery(format!("result count {} is outside 1..={}", limit, max)));
    }
    Ok(Self { text: text.to_string(), limit })
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn limit(&self) -> u8 {
    self.limit
  }

  pub fn is_url(&self) -> bool {
    self.text.starts_with("http://") || self.text.starts_with("https://")
  }

  /// The target handed to yt-dlp: URLs go through untouched, text becomes `ytsearchN:`.
  pub fn provider_target(&self) -> String {
    if self.is_url() { self.text.clone() } else { format!("ytsearch{}:{}", self.limit, self.text) }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResultEntry {
  pub title: String,
  pub duration: Option<f64>,
  pub upload_date: Option<String>,
  pub url: String,
  pub thumbnail: Option<String>,
}

impl SearchResultEntry {
  /// Duration as `m:ss`. Minutes are not folded into hours.
  pub fn duration_label(&self) -> Option<String> {
    format_duration(self.duration?)
  }

  /// Upload date parsed from its `YYYYMMDD` code.
  pub fn upload_day(&self) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(self.upload_date.as_deref()?, "%Y%m%d").ok()
  }

  /// `m:ss | YYYY-MM-DD`, leaving out whichever half is unknown.
  pub fn meta_line(&self) -> String {
    let mut parts = Vec::new();
    if let Some(d) = self.duration_label() {
      parts.push(d);
    }
    if let Some(day) = self.upload_day() {
      parts.push(day.format("%Y-%m-%d").to_string());
    }
    parts.join(" | ")
  }
}

pub fn format_duration(secs: f64) -> Option<String> {
  if !secs.is_finite() || secs <= 0.0 {
    return None;
  }
  let total = secs as u64;
  Some(format!("{}:{:02}", total / 60, total % 60))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatDescriptor {
  pub id: String,
  pub height: Option<u32>,
  pub vcodec: Option<String>,
  pub acodec: Option<String>,
  pub ext: Option<String>,
  /// Audio bitrate in kbps.
  pub abr: Option<f64>,
  /// Total bitrate in kbps.
  pub tbr: Option<f64>,
  pub filesize: Option<u64>,
}

impl FormatDescriptor {
  pub fn is_audio_only(&self) -> bool {
    self.vcodec.as_deref() == Some("none")
  }

  pub fn label(&self) -> String {
    if self.is_audio_only() {
      return match self.abr {
        Some(abr) => format!("audio {}kbps", abr.round() as u64),
        None => "audio".to_string(),
      };
    }
    match self.height {
      Some(h) => format!("{}p", h),
      None => "?p".to_string(),
    }
  }

  /// Secondary details shown next to the label: id, container, codec, bitrate, size.
  pub fn detail(&self) -> String {
    let mut parts = vec![self.id.clone()];
    if let Some(ext) = &self.ext {
      parts.push(ext.clone());
    }
    let codec = if self.is_audio_only() { self.acodec.as_deref() } else { self.vcodec.as_deref() };
    if let Some(codec) = codec.filter(|c| *c != "none") {
      parts.push(codec.to_string());
    }
    if let Some(tbr) = self.tbr {
      parts.push(format!("{}k", tbr.round() as u64));
    }
    if let Some(size) = self.filesize {
      parts.push(format!("{:.1} MiB", size as f64 / (1024.0 * 1024.0)));
    }
    parts.join("  ")
  }
}

/// Drop repeated format ids, keeping the first occurrence and the original order.
pub fn dedupe_formats(formats: Vec<FormatDescriptor>) -> Vec<FormatDescriptor> {
  let mut seen = HashSet::new();
  formats.into_iter().filter(|f| seen.insert(f.id.clone())).collect()
}

/// Deduplicated formats ordered for the quality picker: tallest video first, audio-only last.
pub fn quality_menu(formats: Vec<FormatDescriptor>) -> Vec<FormatDescriptor> {
  let mut menu = dedupe_formats(formats);
  menu.sort_by_key(|f| std::cmp::Reverse(if f.is_audio_only() { 0 } else { f.height.unwrap_or(0) + 1 }));
  menu
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
  pub title: String,
  pub url: String,
  pub duration: Option<f64>,
}

impl From<&SearchResultEntry> for FavoriteEntry {
  fn from(entry: &SearchResultEntry) -> Self {
    Self { title: entry.title.clone(), url: entry.url.clone(), duration: entry.duration }
  }
}

impl From<&FavoriteEntry> for SearchResultEntry {
  fn from(fav: &FavoriteEntry) -> Self {
    Self { title: fav.title.clone(), duration: fav.duration, upload_date: None, url: fav.url.clone(), thumbnail: None }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fmt(id: &str, height: Option<u32>) -> FormatDescriptor {
    FormatDescriptor {
      id: id.to_string(),
      height,
      vcodec: Some("avc1".to_string()),
      acodec: None,
      ext: Some("mp4".to_string()),
      abr: None,
      tbr: None,
      filesize: None,
    }
  }

  fn audio(id: &str, abr: f64) -> FormatDescriptor {
    FormatDescriptor { vcodec: Some("none".to_string()), abr: Some(abr), ..fmt(id, None) }
  }

  // --- SearchQuery ---

  #[test]
  fn query_trims_and_keeps_limit() {
    let q = SearchQuery::new("  cats  ", 10).unwrap();
    assert_eq!(q.text(), "cats");
    assert_eq!(q.limit(), 10);
    assert_eq!(q.provider_target(), "ytsearch10:cats");
  }

  #[test]
  fn query_rejects_empty_and_out_of_range() {
    assert!(matches!(SearchQuery::new("   ", 5), Err(CoreError::InvalidQuery(_))));
    assert!(matches!(SearchQuery::new("cats", 0), Err(CoreError::InvalidQuery(_))));
    assert!(matches!(SearchQuery::new("cats", 51), Err(CoreError::InvalidQuery(_))));
    assert!(SearchQuery::new("cats", 50).is_ok());
    assert!(SearchQuery::new("cats", 1).is_ok());
  }

  #[test]
  fn query_url_passes_through() {
    let q = SearchQuery::new("https://www.youtube.com/watch?v=abc", 3).unwrap();
    assert!(q.is_url());
    assert_eq!(q.provider_target(), "https://www.youtube.com/watch?v=abc");
  }

  // --- SearchResultEntry display ---

  #[test]
  fn duration_formats_minutes_and_seconds() {
    assert_eq!(format_duration(65.0).as_deref(), Some("1:05"));
    assert_eq!(format_duration(3725.0).as_deref(), Some("62:05"));
    assert_eq!(format_duration(0.0), None);
    assert_eq!(format_duration(-3.0), None);
  }

  #[test]
  fn meta_line_skips_unparseable_date() {
    let mut entry = SearchResultEntry {
      title: "t".to_string(),
      duration: Some(90.0),
      upload_date: Some("20240131".to_string()),
      url: "u".to_string(),
      thumbnail: None,
    };
    assert_eq!(entry.meta_line(), "1:30 | 2024-01-31");
    entry.upload_date = Some("2024013".to_string());
    assert_eq!(entry.meta_line(), "1:30");
    entry.duration = None;
    assert_eq!(entry.meta_line(), "");
  }

  // --- Formats ---

  #[test]
  fn dedupe_keeps_first_occurrence() {
    let formats = vec![fmt("a", Some(720)), fmt("a", Some(360)), fmt("b", Some(480))];
    let deduped = dedupe_formats(formats);
    assert_eq!(deduped.len(), 2);
    assert_eq!(deduped[0].id, "a");
    assert_eq!(deduped[0].height, Some(720));
    assert_eq!(deduped[1].id, "b");
  }

  #[test]
  fn quality_menu_orders_tallest_first_audio_last() {
    let formats = vec![audio("140", 129.5), fmt("18", Some(360)), fmt("22", Some(720)), fmt("x", None)];
    let ids: Vec<_> = quality_menu(formats).into_iter().map(|f| f.id).collect();
    assert_eq!(ids, vec!["22", "18", "x", "140"]);
  }

  #[test]
  fn labels() {
    assert_eq!(fmt("22", Some(720)).label(), "720p");
    assert_eq!(fmt("x", None).label(), "?p");
    assert_eq!(audio("140", 129.5).label(), "audio 130kbps");
  }

  // --- Favorites ---

  #[test]
  fn favorite_equality_is_structural() {
    let a = FavoriteEntry { title: "t".to_string(), url: "u".to_string(), duration: Some(1.0) };
    let mut b = a.clone();
    assert_eq!(a, b);
    b.duration = None;
    assert_ne!(a, b);
  }
}
