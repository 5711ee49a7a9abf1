//! HTTP fetcher streaming response bodies to disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::constants::{CONNECT_TIMEOUT_SECS, FETCH_TIMEOUT_SECS};
use super::{FetchError, FetchOutcome, FetchTarget, Fetcher, part_filename};
use crate::http_client::{HttpTimeouts, build_http_client};

/// Fetcher backed by a pooled reqwest client.
///
/// Create once and share between workers; connections are reused.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the default 10 s connect / 120 s total timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(
            HttpTimeouts::from_secs(CONNECT_TIMEOUT_SECS, FETCH_TIMEOUT_SECS),
            None,
        )
    }

    /// Creates a fetcher with explicit timeouts and optional User-Agent.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built.
    pub fn with_timeouts(
        timeouts: HttpTimeouts,
        user_agent: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(timeouts, user_agent)?,
        })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(
        skip(self, target, dest),
        fields(key = %target.key, url = %target.url, dest = %dest.display())
    )]
    async fn fetch(&self, target: &FetchTarget, dest: &Path) -> Result<FetchOutcome, FetchError> {
        if let Some(bytes) = existing_file_len(dest).await? {
            debug!(bytes, "destination already present, skipping request");
            return Ok(FetchOutcome::AlreadyPresent { bytes });
        }

        if !matches!(target.url.scheme(), "http" | "https") {
            return Err(FetchError::invalid_url(target.url.as_str()));
        }

        let url = target.url.as_str();
        let response = self.send(url).await?;
        let part_path = part_path_for(dest, &target.key);

        let bytes = match write_part_file(response, url, &part_path).await {
            Ok(0) => {
                remove_quietly(&part_path).await;
                return Err(FetchError::EmptyBody {
                    url: url.to_string(),
                });
            }
            Ok(bytes) => bytes,
            Err(error) => {
                remove_quietly(&part_path).await;
                return Err(error);
            }
        };

        // Linking never replaces an existing file, so the first item to land
        // under a shared derived name keeps it.
        let placed = tokio::fs::hard_link(&part_path, dest).await;
        remove_quietly(&part_path).await;
        match placed {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = existing_file_len(dest).await?.unwrap_or(0);
                debug!(bytes = existing, "destination appeared during fetch, discarding body");
                return Ok(FetchOutcome::AlreadyPresent { bytes: existing });
            }
            Err(source) => return Err(FetchError::io(dest, source)),
        }

        info!(bytes, "fetch complete");
        Ok(FetchOutcome::Downloaded { bytes })
    }
}

fn part_path_for(dest: &Path, key: &str) -> PathBuf {
    let name = dest
        .file_name()
        .map_or_else(|| "item".into(), |n| n.to_string_lossy());
    dest.with_file_name(part_filename(&name, key))
}

/// Returns the size of a non-empty regular file at `path`.
///
/// A zero-length file is a leftover from an interrupted writer and is removed.
async fn existing_file_len(path: &Path) -> Result<Option<u64>, FetchError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(Some(meta.len())),
        Ok(meta) if meta.is_file() => {
            warn!(path = %path.display(), "removing empty file at destination");
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| FetchError::io(path, e))?;
            Ok(None)
        }
        Ok(_) => Err(FetchError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "destination exists and is not a regular file",
            ),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FetchError::io(path, e)),
    }
}

/// Streams the response body into `part_path` and syncs it to disk.
async fn write_part_file(
    response: reqwest::Response,
    url: &str,
    part_path: &Path,
) -> Result<u64, FetchError> {
    let mut file = File::create(part_path)
        .await
        .map_err(|e| FetchError::io(part_path, e))?;

    let bytes = stream_to_file(&mut file, response, url, part_path).await?;

    file.sync_all()
        .await
        .map_err(|e| FetchError::io(part_path, e))?;
    Ok(bytes)
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::from_reqwest(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::io(file_path, e))?;

    Ok(bytes_written)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove temporary file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::retry::{Classify, FailureKind};

    fn target(server: &MockServer, route: &str, name: &str) -> FetchTarget {
        let url = Url::parse(&format!("{}{route}", server.uri())).unwrap();
        FetchTarget::new("k1", url, name)
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_writes_file_atomically() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/get.php"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"EPUB bytes"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let dest = temp_dir.path().join("Dune.epub");
        let outcome = fetcher
            .fetch(&target(&server, "/get.php", "Dune.epub"), &dest)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 10 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"EPUB bytes");
        assert_eq!(dir_entries(temp_dir.path()), vec!["Dune.epub"]);
    }

    #[tokio::test]
    async fn test_fetch_existing_file_makes_no_request() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new"))
            .expect(0)
            .mount(&server)
            .await;

        let dest = temp_dir.path().join("Dune.epub");
        std::fs::write(&dest, b"old bytes").unwrap();

        let fetcher = HttpFetcher::new().unwrap();
        let outcome = fetcher
            .fetch(&target(&server, "/get.php", "Dune.epub"), &dest)
            .await
            .unwrap();

        assert_eq!(outcome, FetchOutcome::AlreadyPresent { bytes: 9 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"old bytes");
    }

    #[tokio::test]
    async fn test_fetch_replaces_stale_empty_file() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh"))
            .mount(&server)
            .await;

        let dest = temp_dir.path().join("a.pdf");
        std::fs::write(&dest, b"").unwrap();

        let fetcher = HttpFetcher::new().unwrap();
        let outcome = fetcher
            .fetch(&target(&server, "/a", "a.pdf"), &dest)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 5 });
    }

    #[tokio::test]
    async fn test_fetch_404_leaves_no_files() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let error = fetcher
            .fetch(
                &target(&server, "/missing", "a.pdf"),
                &temp_dir.path().join("a.pdf"),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, FetchError::HttpStatus { status: 404, .. }));
        assert_eq!(error.failure_kind(), FailureKind::NotFound);
        assert!(dir_entries(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_transient() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let error = fetcher
            .fetch(
                &target(&server, "/empty", "a.pdf"),
                &temp_dir.path().join("a.pdf"),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, FetchError::EmptyBody { .. }));
        assert_eq!(error.failure_kind(), FailureKind::TransientNetwork);
        assert!(dir_entries(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_timeout_cleans_up() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::with_timeouts(HttpTimeouts::from_secs(5, 1), None).unwrap();
        let error = fetcher
            .fetch(
                &target(&server, "/slow", "a.pdf"),
                &temp_dir.path().join("a.pdf"),
            )
            .await
            .unwrap_err();

        assert_eq!(error.failure_kind(), FailureKind::TransientNetwork);
        assert!(dir_entries(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_scheme() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse("ftp://example.com/a.pdf").unwrap();
        let target = FetchTarget::new("k1", url, "a.pdf");

        let error = fetcher
            .fetch(&target, &temp_dir.path().join("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::InvalidUrl { .. }));
    }

    #[test]
    fn test_part_path_sits_next_to_destination() {
        let part = part_path_for(Path::new("/out/Dune.epub"), "abc");
        assert_eq!(part, PathBuf::from("/out/.Dune.epub.abc.part"));
    }
}
