//! Player download for platforms where it is not usually installed system-wide.
//!
//! The archive goes to a named temp file next to the install dir and is removed when
//! it goes out of scope, whether the install succeeded or not.

use futures::StreamExt;
use reqwest::Client;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::constants::constants;
use crate::error::{CoreError, Result};

/// The only platform the player archive is published for.
pub const SUPPORTED_OS: &str = "windows";

/// Download and install the player into `bin_dir` for the running platform.
pub async fn install_player(client: Client, bin_dir: PathBuf) -> Result<PathBuf> {
  let c = constants();
  install_player_on(std::env::consts::OS, client, &c.player_archive_url, &c.player_executable, bin_dir).await
}

pub async fn install_player_on(
  os: &str,
  client: Client,
  archive_url: &str,
  executable: &str,
  bin_dir: PathBuf,
) -> Result<PathBuf> {
  if os != SUPPORTED_OS {
    return Err(CoreError::UnsupportedPlatform(format!("player download is only available on {}, not {}", SUPPORTED_OS, os)));
  }

  tokio::fs::create_dir_all(&bin_dir).await?;
  let archive = tempfile::Builder::new().prefix("player-").suffix(".zip.part").tempfile_in(&bin_dir)?;
  let mut file = tokio::fs::File::from_std(archive.reopen()?);

  info!(url = %archive_url, "deps: downloading player archive");
  let response = client
    .get(archive_url)
    .send()
    .await
    .map_err(|e| CoreError::provider(format!("player download failed: {}", e)))?;
  if !response.status().is_success() {
    return Err(CoreError::provider(format!("player download returned {}", response.status())));
  }

  let mut downloaded: u64 = 0;
  let mut stream = response.bytes_stream();
  while let Some(chunk) = stream.next().await {
    let chunk = chunk.map_err(|e| CoreError::provider(format!("player download interrupted: {}", e)))?;
    file.write_all(&chunk).await?;
    downloaded += chunk.len() as u64;
  }
  file.flush().await?;
  drop(file);
  info!(bytes = downloaded, "deps: archive downloaded");

  let executable = executable.to_string();
  tokio::task::spawn_blocking(move || {
    let installed = extract_executable(archive.path(), &executable, &bin_dir);
    drop(archive);
    installed
  })
  .await
  .map_err(|e| CoreError::TaskFailed(e.to_string()))?
}

/// Copy the entry whose file name is `executable` (any directory, any case) out of the zip
/// at `archive_path` into `dest_dir`.
pub fn extract_executable(archive_path: &Path, executable: &str, dest_dir: &Path) -> Result<PathBuf> {
  let invalid = |e: zip::result::ZipError| CoreError::Io(std::io::Error::new(ErrorKind::InvalidData, e));

  let mut archive = zip::ZipArchive::new(File::open(archive_path)?).map_err(invalid)?;
  let index = (0..archive.len())
    .find(|&i| {
      archive.by_index(i).is_ok_and(|entry| {
        !entry.is_dir()
          && entry.name().rsplit(['/', '\\']).next().is_some_and(|name| name.eq_ignore_ascii_case(executable))
      })
    })
    .ok_or_else(|| CoreError::NotFound(format!("{} in downloaded archive", executable)))?;

  let mut entry = archive.by_index(index).map_err(invalid)?;
  let mut tmp = tempfile::NamedTempFile::new_in(dest_dir)?;
  std::io::copy(&mut entry, &mut tmp)?;
  tmp.flush()?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o755))?;
  }

  let target = dest_dir.join(executable);
  tmp.persist(&target).map_err(|e| e.error)?;
  info!(path = %target.display(), "deps: player installed");
  Ok(target)
}

#[cfg(test)]
mod tests {
  use super::*;
  use zip::write::FileOptions;

  fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let mut zw = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in files {
      zw.start_file(*name, FileOptions::default()).unwrap();
      zw.write_all(data).unwrap();
    }
    zw.finish().unwrap();
  }

  #[test]
  fn extracts_nested_executable_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("player.zip");
    write_zip(&archive, &[("mpv/readme.txt", b"hello"), ("mpv/bin/MPV.EXE", b"MZ-binary")]);

    let dest = dir.path().join("bin");
    std::fs::create_dir_all(&dest).unwrap();
    let installed = extract_executable(&archive, "mpv.exe", &dest).unwrap();
    assert_eq!(installed, dest.join("mpv.exe"));
    assert_eq!(std::fs::read(&installed).unwrap(), b"MZ-binary");
    assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 1);
  }

  #[test]
  fn archive_without_executable_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("player.zip");
    write_zip(&archive, &[("docs/mpv.exe.txt", b"no")]);
    let err = extract_executable(&archive, "mpv.exe", dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
  }

  #[test]
  fn corrupt_archive_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("player.zip");
    std::fs::write(&archive, b"definitely not a zip").unwrap();
    assert!(matches!(extract_executable(&archive, "mpv.exe", dir.path()), Err(CoreError::Io(_))));
  }

  #[tokio::test]
  async fn unsupported_platform_fails_before_any_io() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    let err = install_player_on("linux", Client::new(), "http://127.0.0.1:9/p.zip", "mpv.exe", bin.clone())
      .await
      .unwrap_err();
    assert!(matches!(err, CoreError::UnsupportedPlatform(_)));
    assert!(!bin.exists());
  }

  #[tokio::test]
  async fn failed_download_leaves_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    // Nothing listens on the discard port locally, so the request fails fast.
    let err = install_player_on("windows", Client::new(), "http://127.0.0.1:9/p.zip", "mpv.exe", bin.clone())
      .await
      .unwrap_err();
    assert!(matches!(err, CoreError::Provider(_)));
    assert_eq!(std::fs::read_dir(&bin).unwrap().count(), 0);
  }
}
