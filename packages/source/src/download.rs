//! Cached bulk-file downloads with content-hash verification.
//!
//! A downloaded file is reused while its mtime is younger than the cache
//! window. Each download writes a `<name>.sha256` sidecar; on reuse the
//! digest is recomputed and a mismatch forces a fresh download, so a
//! truncated file cannot stay cached.

use std::fs::File;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest as _, Sha256};

use crate::SourceError;
use crate::config::DOWNLOAD_CACHE_DAYS;

/// Per-request timeout for bulk downloads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(String::new, |n| {
        n.to_string_lossy().into_owned()
    });
    name.push_str(".sha256");
    path.with_file_name(name)
}

fn file_sha256(path: &Path) -> Result<String, SourceError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 256 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn cached_file_usable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    let Ok(age) = modified.elapsed() else {
        return false;
    };
    if age > Duration::from_secs(DOWNLOAD_CACHE_DAYS * 86_400) {
        return false;
    }

    let sidecar = sidecar_path(path);
    match std::fs::read_to_string(&sidecar) {
        Ok(expected) => match file_sha256(path) {
            Ok(actual) if actual == expected.trim() => true,
            Ok(_) => {
                log::warn!(
                    "Cached {} fails its checksum, re-downloading",
                    path.display()
                );
                false
            }
            Err(e) => {
                log::warn!("Could not hash cached {}: {e}", path.display());
                false
            }
        },
        // Pre-sidecar cache entry: bless it so future reuses verify.
        Err(_) => match file_sha256(path) {
            Ok(actual) => {
                let _ = std::fs::write(&sidecar, actual);
                true
            }
            Err(_) => false,
        },
    }
}

/// Downloads `url` into `cache_dir/filename` unless a fresh, intact copy
/// is already cached. Returns the path of the usable file.
///
/// # Errors
///
/// Returns [`SourceError`] if the directory cannot be created, the
/// download fails, or the file cannot be written. If a download attempt
/// fails while a cached copy exists (however stale), the cached copy is
/// returned instead.
pub async fn ensure_downloaded(
    client: &reqwest::Client,
    url: &str,
    cache_dir: &Path,
    filename: &str,
) -> Result<PathBuf, SourceError> {
    std::fs::create_dir_all(cache_dir)?;
    let path = cache_dir.join(filename);

    if cached_file_usable(&path) {
        log::info!("Using cached {filename}");
        return Ok(path);
    }

    log::info!("Downloading {filename} from {url}");
    let result = download_to(client, url, &path).await;

    match result {
        Ok(()) => Ok(path),
        Err(e) if path.exists() => {
            log::warn!("Download of {filename} failed ({e}), falling back to stale cache");
            Ok(path)
        }
        Err(e) => Err(e),
    }
}

async fn download_to(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<(), SourceError> {
    let mut response = client
        .get(url)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;

    let tmp_path = path.with_extension("part");
    let mut file = File::create(&tmp_path)?;
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
    }
    file.flush()?;
    drop(file);

    std::fs::rename(&tmp_path, path)?;
    std::fs::write(sidecar_path(path), hex::encode(hasher.finalize()))?;

    log::info!(
        "Downloaded {}: {} MB",
        path.display(),
        downloaded / 1024 / 1024
    );
    Ok(())
}
