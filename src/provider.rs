use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::models::{FormatDescriptor, SearchQuery, SearchResultEntry};

/// Search, format lookup and thumbnail download. Any failure is a [`CoreError::Provider`].
pub trait Provider: Send + Sync {
  fn search(&self, query: SearchQuery) -> BoxFuture<'static, Result<Vec<SearchResultEntry>>>;
  fn lookup_formats(&self, url: String) -> BoxFuture<'static, Result<Vec<FormatDescriptor>>>;
  fn fetch_thumbnail(&self, url: String) -> BoxFuture<'static, Result<Vec<u8>>>;
}

// --- yt-dlp JSON shapes ---

#[derive(Debug, Default, Deserialize)]
struct RawThumbnail {
  url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
  id: Option<String>,
  title: Option<String>,
  duration: Option<f64>,
  upload_date: Option<String>,
  webpage_url: Option<String>,
  url: Option<String>,
  thumbnail: Option<String>,
  thumbnails: Option<Vec<RawThumbnail>>,
}

#[derive(Debug, Deserialize)]
struct RawListing {
  entries: Option<Vec<Option<RawEntry>>>,
  #[serde(flatten)]
  single: RawEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFormat {
  format_id: Option<String>,
  height: Option<f64>,
  vcodec: Option<String>,
  acodec: Option<String>,
  ext: Option<String>,
  abr: Option<f64>,
  tbr: Option<f64>,
  filesize: Option<f64>,
  filesize_approx: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
  #[serde(default)]
  formats: Option<Vec<RawFormat>>,
}

fn non_empty(s: Option<String>) -> Option<String> {
  s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty() && s != "NA")
}

impl RawEntry {
  fn into_entry(self) -> Option<SearchResultEntry> {
    let url = non_empty(self.webpage_url)
      .or_else(|| non_empty(self.url))
      .or_else(|| non_empty(self.id).map(|id| format!("https://www.youtube.com/watch?v={}", id)))?;
    let thumbnail = non_empty(self.thumbnail)
      .or_else(|| self.thumbnails.and_then(|t| t.into_iter().rev().find_map(|t| non_empty(t.url))));
    let upload_date = non_empty(self.upload_date).filter(|d| d.len() == 8 && d.chars().all(|c| c.is_ascii_digit()));
    Some(SearchResultEntry {
      title: non_empty(self.title).unwrap_or_else(|| "Unknown".to_string()),
      duration: self.duration.filter(|d| d.is_finite() && *d >= 0.0),
      upload_date,
      url,
      thumbnail,
    })
  }
}

impl RawFormat {
  fn into_descriptor(self) -> Option<FormatDescriptor> {
    let id = non_empty(self.format_id)?;
    let positive = |v: Option<f64>| v.filter(|v| v.is_finite() && *v > 0.0);
    Some(FormatDescriptor {
      id,
      height: positive(self.height).map(|h| h as u32),
      vcodec: non_empty(self.vcodec),
      acodec: non_empty(self.acodec),
      ext: non_empty(self.ext),
      abr: positive(self.abr),
      tbr: positive(self.tbr),
      filesize: positive(self.filesize).or(positive(self.filesize_approx)).map(|s| s as u64),
    })
  }
}

/// Parse `yt-dlp -J --flat-playlist` output. A document without `entries` is a single video.
pub fn parse_listing(json: &str, limit: usize) -> Result<Vec<SearchResultEntry>> {
  let listing: RawListing =
    serde_json::from_str(json).map_err(|e| CoreError::provider(format!("unexpected yt-dlp search output: {}", e)))?;
  let entries = match listing.entries {
    Some(entries) => entries.into_iter().flatten().filter_map(RawEntry::into_entry).take(limit).collect(),
    None => listing.single.into_entry().into_iter().collect(),
  };
  Ok(entries)
}

/// Parse `yt-dlp -J` output into descriptors, dropping records without a format id.
pub fn parse_formats(json: &str) -> Result<Vec<FormatDescriptor>> {
  let info: RawInfo =
    serde_json::from_str(json).map_err(|e| CoreError::provider(format!("unexpected yt-dlp format output: {}", e)))?;
  Ok(info.formats.unwrap_or_default().into_iter().filter_map(RawFormat::into_descriptor).collect())
}

// --- yt-dlp + HTTP provider ---

#[derive(Clone)]
pub struct YtDlp {
  program: PathBuf,
  client: Client,
}

impl YtDlp {
  pub fn new(program: PathBuf, client: Client) -> Self {
    Self { program, client }
  }
}

/// Run yt-dlp with `args` and return its stdout.
async fn run_ytdlp(program: PathBuf, args: Vec<String>) -> Result<String> {
  debug!(program = %program.display(), ?args, "provider: running yt-dlp");
  let output = Command::new(&program)
    .args(&args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await
    .map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        CoreError::provider("yt-dlp not found. Install it with: pip install yt-dlp (or your package manager)")
      } else {
        CoreError::provider(format!("Failed to execute yt-dlp: {}", e))
      }
    })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("no error output").trim();
    return Err(CoreError::provider(format!("yt-dlp failed ({}): {}", output.status, reason)));
  }

  String::from_utf8(output.stdout).map_err(|_| CoreError::provider("yt-dlp output is not UTF-8"))
}

impl Provider for YtDlp {
  fn search(&self, query: SearchQuery) -> BoxFuture<'static, Result<Vec<SearchResultEntry>>> {
    let program = self.program.clone();
    Box::pin(async move {
      let mut args: Vec<String> =
        ["-J", "--flat-playlist", "--skip-download", "--no-warnings", "--ignore-errors"].map(String::from).to_vec();
      if query.is_url() {
        args.push("--playlist-items".to_string());
        args.push(format!("1:{}", query.limit()));
      }
      args.push("--".to_string());
      args.push(query.provider_target());

      let stdout = run_ytdlp(program, args).await?;
      let results = parse_listing(&stdout, query.limit() as usize)?;
      info!(query = %query.text(), count = results.len(), "provider: search done");
      Ok(results)
    })
  }

  fn lookup_formats(&self, url: String) -> BoxFuture<'static, Result<Vec<FormatDescriptor>>> {
    let program = self.program.clone();
    Box::pin(async move {
      let args = ["-J", "--no-playlist", "--skip-download", "--no-warnings", "--", url.as_str()].map(String::from).to_vec();
      let stdout = run_ytdlp(program, args).await?;
      let formats = parse_formats(&stdout)?;
      info!(url = %url, count = formats.len(), "provider: formats fetched");
      Ok(formats)
    })
  }

  fn fetch_thumbnail(&self, url: String) -> BoxFuture<'static, Result<Vec<u8>>> {
    let client = self.client.clone();
    Box::pin(async move {
      let response =
        client.get(&url).send().await.map_err(|e| CoreError::provider(format!("thumbnail request failed: {}", e)))?;
      if !response.status().is_success() {
        return Err(CoreError::provider(format!("thumbnail request returned {} for {}", response.status(), url)));
      }
      let bytes =
        response.bytes().await.map_err(|e| CoreError::provider(format!("failed to read thumbnail bytes: {}", e)))?;
      Ok(bytes.to_vec())
    })
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Canned provider: fixed search results (or a failure), formats and thumbnail bytes.
  pub struct FakeProvider {
    pub results: std::result::Result<Vec<SearchResultEntry>, String>,
    pub formats: Vec<FormatDescriptor>,
    pub thumbnail: Vec<u8>,
    pub searches: Mutex<Vec<String>>,
    pub thumbnail_fetches: AtomicUsize,
  }

  impl FakeProvider {
    pub fn with_results(results: Vec<SearchResultEntry>) -> Self {
      Self {
        results: Ok(results),
        formats: Vec::new(),
        thumbnail: Vec::new(),
        searches: Mutex::new(Vec::new()),
        thumbnail_fetches: AtomicUsize::new(0),
      }
    }

    pub fn failing(msg: &str) -> Self {
      Self { results: Err(msg.to_string()), ..Self::with_results(Vec::new()) }
    }
  }

  impl Provider for FakeProvider {
    fn search(&self, query: SearchQuery) -> BoxFuture<'static, Result<Vec<SearchResultEntry>>> {
      self.searches.lock().unwrap().push(query.text().to_string());
      let results = self.results.clone().map_err(CoreError::Provider);
      Box::pin(async move { results })
    }

    fn lookup_formats(&self, _url: String) -> BoxFuture<'static, Result<Vec<FormatDescriptor>>> {
      let formats = self.formats.clone();
      Box::pin(async move { Ok(formats) })
    }

    fn fetch_thumbnail(&self, url: String) -> BoxFuture<'static, Result<Vec<u8>>> {
      self.thumbnail_fetches.fetch_add(1, Ordering::SeqCst);
      let bytes = self.thumbnail.clone();
      Box::pin(async move {
        if bytes.is_empty() { Err(CoreError::provider(format!("no thumbnail at {}", url))) } else { Ok(bytes) }
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SEARCH_JSON: &str = r#"{
    "_type": "playlist",
    "id": "cats",
    "title": "cats",
    "entries": [
      {
        "id": "aaa",
        "title": "Cat video",
        "url": "https://www.youtube.com/watch?v=aaa",
        "duration": 125.0,
        "thumbnails": [{"url": "https://i.ytimg.com/vi/aaa/small.jpg"}, {"url": "https://i.ytimg.com/vi/aaa/big.jpg"}]
      },
      null,
      {
        "id": "bbb",
        "title": "",
        "webpage_url": "https://www.youtube.com/watch?v=bbb",
        "upload_date": "20230415",
        "thumbnail": "https://i.ytimg.com/vi/bbb/hq.jpg"
      },
      {"id": "ccc", "duration": null, "upload_date": "NA"},
      {"title": "no way to play this"}
    ]
  }"#;

  #[test]
  fn listing_maps_entries() {
    let results = parse_listing(SEARCH_JSON, 10).unwrap();
    assert_eq!(results.len(), 3);

    assert_eq!(results[0].title, "Cat video");
    assert_eq!(results[0].duration, Some(125.0));
    assert_eq!(results[0].thumbnail.as_deref(), Some("https://i.ytimg.com/vi/aaa/big.jpg"));

    assert_eq!(results[1].title, "Unknown");
    assert_eq!(results[1].url, "https://www.youtube.com/watch?v=bbb");
    assert_eq!(results[1].upload_date.as_deref(), Some("20230415"));

    assert_eq!(results[2].url, "https://www.youtube.com/watch?v=ccc");
    assert_eq!(results[2].upload_date, None);
    assert_eq!(results[2].thumbnail, None);
  }

  #[test]
  fn listing_respects_limit() {
    assert_eq!(parse_listing(SEARCH_JSON, 1).unwrap().len(), 1);
  }

  #[test]
  fn single_video_document_is_one_result() {
    let json = r#"{"id": "xyz", "title": "Direct", "webpage_url": "https://youtu.be/xyz", "duration": 10}"#;
    let results = parse_listing(json, 5).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "https://youtu.be/xyz");
    assert_eq!(results[0].duration, Some(10.0));
  }

  #[test]
  fn garbage_is_a_provider_error() {
    assert!(matches!(parse_listing("not json", 5), Err(CoreError::Provider(_))));
    assert!(matches!(parse_formats("[1, 2]"), Err(CoreError::Provider(_))));
  }

  #[test]
  fn formats_drop_records_without_id() {
    let json = r#"{
      "id": "aaa",
      "formats": [
        {"format_id": "sb0", "vcodec": "none", "acodec": "none", "ext": "mhtml"},
        {"ext": "mp4", "height": 1080},
        {"format_id": "140", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.478, "filesize": 3401232},
        {"format_id": "22", "height": 720, "vcodec": "avc1.64001F", "tbr": 1200.5, "filesize_approx": 10485760.0},
        {"format_id": "", "height": 480}
      ]
    }"#;
    let formats = parse_formats(json).unwrap();
    let ids: Vec<_> = formats.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["sb0", "140", "22"]);
    assert_eq!(formats[1].filesize, Some(3401232));
    assert_eq!(formats[2].height, Some(720));
    assert_eq!(formats[2].filesize, Some(10485760));
  }

  #[test]
  fn missing_formats_is_empty() {
    assert!(parse_formats(r#"{"id": "aaa"}"#).unwrap().is_empty());
  }

  #[tokio::test]
  async fn missing_binary_is_a_provider_error() {
    let provider = YtDlp::new(PathBuf::from("/nonexistent/yt-dlp-binary"), Client::new());
    let err = provider.lookup_formats("https://example.invalid/v".to_string()).await.unwrap_err();
    assert!(matches!(err, CoreError::Provider(msg) if msg.contains("not found")));
  }
}
