use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use transporter_types::{UploadError, UploadResult};

/// Fallback name when the URL path has no usable last segment.
const DEFAULT_PACKAGE_NAME: &str = "package.ipa";

/// True for sources that must be fetched before upload.
pub fn is_remote_source(source: &str) -> bool {
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| source.starts_with(scheme))
}

/// Shared parent directory for downloaded packages, created on demand.
pub async fn ensure_temp_dir() -> UploadResult<PathBuf> {
    let dir = std::env::temp_dir().join("transporter");
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

/// A downloaded package on local disk. The file and its private directory are
/// removed when this guard drops, whichever way the run ends.
#[derive(Debug)]
pub struct TempPackage {
    dir: PathBuf,
    path: PathBuf,
}

impl TempPackage {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempPackage {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("Removed temporary package {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.dir.display(), e),
        }
    }
}

/// Stream `url` into a fresh temp directory, keeping the URL's file name so
/// the package is reported under its real name.
///
/// `on_progress(bytes_so_far, total)` fires per received chunk, but only when
/// the server sent a `Content-Length`.
pub async fn download_temp_file<F>(
    client: &Client,
    url: &str,
    mut on_progress: F,
) -> UploadResult<TempPackage>
where
    F: FnMut(u64, u64),
{
    if url.starts_with("ftp://") {
        return Err(UploadError::Download("ftp:// sources are not supported".into()));
    }
    let parsed = Url::parse(url)
        .map_err(|e| UploadError::Download(format!("invalid URL {}: {}", url, e)))?;

    let file_name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or(DEFAULT_PACKAGE_NAME)
        .to_string();

    let dir = ensure_temp_dir().await?.join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&dir).await?;
    // Guard exists before the first byte so a failed download still cleans up.
    let package = TempPackage {
        path: dir.join(&file_name),
        dir,
    };

    info!("Downloading {}", url);

    let resp = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| UploadError::Download(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(UploadError::Download(format!(
            "{} returned {}",
            url,
            resp.status()
        )));
    }

    let total = resp.content_length();
    let mut out = tokio::fs::File::create(&package.path).await?;
    let mut stream = resp.bytes_stream();
    let mut so_far: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let data = chunk.map_err(|e| UploadError::Download(e.to_string()))?;
        out.write_all(&data).await?;
        so_far += data.len() as u64;
        if let Some(total) = total {
            on_progress(so_far, total);
        }
    }
    out.flush().await?;

    info!("Downloaded {} bytes to {}", so_far, package.path.display());
    Ok(package)
}
