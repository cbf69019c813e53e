//! HTTP plumbing shared by the scraping downloaders.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::DownloadError;
use crate::config::DownloadSettings;

/// `Accept-Language` sent to every media host.
pub const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// Builds the scraping client: cookies kept across requests, proxy applied.
pub fn build_client(settings: &DownloadSettings) -> anyhow::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

    let mut builder = Client::builder()
        .user_agent(settings.user_agent.clone())
        .default_headers(headers)
        .cookie_store(true)
        .connect_timeout(settings.socket_timeout);

    if let Some(proxy) = &settings.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid DOWNLOAD_PROXY")?);
    }

    builder.build().context("Failed to build HTTP client")
}

/// Streams `source_url` into `destination`. A partially written file is removed on failure.
pub async fn download_to_file(
    client: &Client,
    source_url: &str,
    destination: &Path,
    headers: HeaderMap,
    timeout: Duration,
) -> Result<u64, DownloadError> {
    match stream_to_file(client, source_url, destination, headers, timeout).await {
        Ok(written) => {
            debug!("Saved {} bytes to {}", written, destination.display());
            Ok(written)
        }
        Err(e) => {
            warn!("Failed to download {}: {:#}", source_url, e);
            cleanup_file(destination).await;
            Err(DownloadError::FileTransfer)
        }
    }
}

async fn stream_to_file(
    client: &Client,
    source_url: &str,
    destination: &Path,
    headers: HeaderMap,
    timeout: Duration,
) -> anyhow::Result<u64> {
    let mut response = client
        .get(source_url)
        .headers(headers)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;

    let mut file = File::create(destination)
        .await
        .with_context(|| format!("creating {}", destination.display()))?;

    let mut written = 0_u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Removes a downloaded file. A missing file is not an error.
pub async fn cleanup_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cleanup_file_removes_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        cleanup_file(&path).await;
        assert!(!path.exists());

        cleanup_file(&path).await;
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.mp4");
        let client = build_client(&DownloadSettings::default()).unwrap();

        let result = download_to_file(
            &client,
            "http://127.0.0.1:9/unreachable.mp4",
            &path,
            HeaderMap::new(),
            Duration::from_secs(2),
        )
        .await;

        assert!(matches!(result, Err(DownloadError::FileTransfer)));
        assert!(!path.exists());
    }

    #[test]
    fn test_build_client_rejects_bad_proxy() {
        let settings = DownloadSettings {
            proxy: Some("not a proxy at all".to_owned()),
            ..DownloadSettings::default()
        };
        assert!(build_client(&settings).is_err());
    }
}
