//! Retrying, size-bounded file downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::policy::SecurityGate;
use super::{build_client, ensure_ok, next_chunk, read_limited, send, USER_AGENT};
use crate::error::{InstallError, InstallResult};
use crate::progress::{ProgressBand, ProgressReporter};

const MIB: u64 = 1024 * 1024;

/// Limits and timeouts for the download engine.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub user_agent: String,
    pub download_timeout: Duration,
    pub text_timeout: Duration,
    pub max_download_bytes: u64,
    pub max_text_bytes: u64,
    pub max_attempts: u32,
    /// First retry delay; doubles on every further attempt
    pub retry_backoff: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            download_timeout: Duration::from_secs(600),
            text_timeout: Duration::from_secs(30),
            max_download_bytes: 500 * MIB,
            max_text_bytes: MIB,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl DownloadSettings {
    /// Delay before the attempt that follows `failed_attempt` (1-based).
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(1u32 << exp)
    }
}

/// One file transfer.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    pub step: String,
    pub max_bytes: u64,
    /// Where download progress lands on the step's percentage scale
    pub band: ProgressBand,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, step: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            step: step.into(),
            max_bytes: 500 * MIB,
            band: ProgressBand::new(25.0, 55.0),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_band(mut self, band: ProgressBand) -> Self {
        self.band = band;
        self
    }
}

/// HTTP download engine bound to one security gate and cancellation token.
#[derive(Debug, Clone)]
pub struct Downloader {
    gate: SecurityGate,
    settings: DownloadSettings,
    file_client: reqwest::Client,
    text_client: reqwest::Client,
    reporter: ProgressReporter,
    cancel: CancellationToken,
}

impl Downloader {
    pub fn new(
        gate: SecurityGate,
        settings: DownloadSettings,
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> InstallResult<Self> {
        let file_client = build_client(&gate, settings.download_timeout, &settings.user_agent)?;
        let text_client = build_client(&gate, settings.text_timeout, &settings.user_agent)?;

        Ok(Self {
            gate,
            settings,
            file_client,
            text_client,
            reporter,
            cancel,
        })
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    /// A task with this engine's size ceiling applied.
    pub fn task(&self, url: impl Into<String>, destination: impl Into<PathBuf>, step: &str) -> DownloadTask {
        DownloadTask::new(url, destination, step).with_max_bytes(self.settings.max_download_bytes)
    }

    /// Download once. Returns the number of bytes written.
    ///
    /// On any failure after the destination was created, the partial file
    /// is removed before the error is returned.
    pub async fn fetch(&self, task: &DownloadTask) -> InstallResult<u64> {
        let url = self.gate.validate(&task.url)?;

        self.reporter.installing(
            &task.step,
            format!("Downloading from {}...", task.url),
            task.band.start,
        );
        tracing::info!("Downloading {} to {}", url, task.destination.display());

        let mut response = send(self.file_client.get(url.clone()), &self.cancel, "download").await?;
        ensure_ok(&response, &url)?;

        let total = response.content_length().filter(|len| *len > 0);
        if let Some(len) = total {
            if len > task.max_bytes {
                return Err(InstallError::SizeLimitExceeded {
                    size: len,
                    limit: task.max_bytes,
                });
            }
        }

        let mut file = create_private(&task.destination).await?;

        let copied = self.stream_body(&mut response, &mut file, task, total).await;
        let finalized = match copied {
            Ok(_) => finalize(&mut file, &task.destination).await,
            Err(_) => Ok(()),
        };
        drop(file);

        // A copy failure wins over whatever the close reported.
        match (copied, finalized) {
            (Ok(written), Ok(())) => {
                tracing::debug!("Downloaded {} bytes to {}", written, task.destination.display());
                Ok(written)
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                remove_partial(&task.destination).await;
                Err(e)
            }
        }
    }

    async fn stream_body(
        &self,
        response: &mut reqwest::Response,
        file: &mut File,
        task: &DownloadTask,
        total: Option<u64>,
    ) -> InstallResult<u64> {
        let mut written: u64 = 0;
        let mut last_reported: Option<u64> = None;

        while let Some(chunk) = next_chunk(response, &self.cancel, "download").await? {
            let size = written + chunk.len() as u64;
            if size > task.max_bytes {
                return Err(InstallError::SizeLimitExceeded {
                    size,
                    limit: task.max_bytes,
                });
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| InstallError::io_at("write", &task.destination, e))?;
            written = size;

            match total {
                Some(total) => {
                    let pct = written.saturating_mul(100) / total;
                    if last_reported != Some(pct) {
                        last_reported = Some(pct);
                        let fraction = written as f64 / total as f64;
                        self.reporter.installing(
                            &task.step,
                            format!("Downloading... {:.1}%", fraction * 100.0),
                            task.band.at(fraction),
                        );
                    }
                }
                None => {
                    let mib = written / MIB;
                    if last_reported != Some(mib) {
                        last_reported = Some(mib);
                        self.reporter.installing(
                            &task.step,
                            format!("Downloading... {} MB", mib),
                            task.band.start,
                        );
                    }
                }
            }
        }

        Ok(written)
    }

    /// [`fetch`](Self::fetch) with bounded retries and cancellable
    /// exponential backoff. Non-transient errors are returned at once.
    pub async fn fetch_with_retry(&self, task: &DownloadTask) -> InstallResult<u64> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self.fetch(task).await {
                Ok(written) => return Ok(written),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::error!("Download of {} failed after {} attempts: {}", task.url, attempt, err);
                return Err(InstallError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let backoff = self.settings.backoff_for(attempt);
            tracing::warn!(
                "Download attempt {}/{} for {} failed: {}",
                attempt,
                max_attempts,
                task.url,
                err
            );
            self.reporter.installing(
                &task.step,
                format!(
                    "Download failed, retrying in {:?}... (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    max_attempts
                ),
                task.band.start,
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(InstallError::cancelled("download")),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// Fetch a small text payload such as a checksum manifest.
    pub async fn fetch_text(&self, raw_url: &str) -> InstallResult<String> {
        let url = self.gate.validate(raw_url)?;
        tracing::debug!("Fetching {}", url);

        let response = send(self.text_client.get(url.clone()), &self.cancel, "fetch").await?;
        ensure_ok(&response, &url)?;

        let body = read_limited(response, self.settings.max_text_bytes, &self.cancel, "fetch").await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Create (or truncate) `path` readable and writable by the owner only.
async fn create_private(path: &Path) -> InstallResult<File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    options
        .open(path)
        .await
        .map_err(|e| InstallError::io_at("create", path, e))
}

async fn finalize(file: &mut File, path: &Path) -> InstallResult<()> {
    file.flush()
        .await
        .map_err(|e| InstallError::io_at("flush", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| InstallError::io_at("finalize", path, e))
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove partial download {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::policy::{TrustedHostSet, MAX_REDIRECTS};
    use crate::progress::{InstallProgress, InstallStatus};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

    fn test_settings() -> DownloadSettings {
        DownloadSettings {
            retry_backoff: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn loopback_gate() -> SecurityGate {
        SecurityGate::for_tests(TrustedHostSet::new(["127.0.0.1"]))
    }

    fn downloader_with(
        settings: DownloadSettings,
        cancel: CancellationToken,
    ) -> (Downloader, Arc<Mutex<Vec<InstallProgress>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let reporter = ProgressReporter::new(Arc::new(move |p: &InstallProgress| {
            captured.lock().unwrap().push(p.clone());
        }));
        let downloader = Downloader::new(loopback_gate(), settings, reporter, cancel).unwrap();
        (downloader, events)
    }

    fn downloader() -> (Downloader, Arc<Mutex<Vec<InstallProgress>>>) {
        downloader_with(test_settings(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_fetch_writes_file_and_reports_progress() {
        let server = MockServer::start().await;
        let payload = vec![7u8; 4096];
        Mock::given(method("GET"))
            .and(path("/node.msi"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("node.msi");
        let (dl, events) = downloader();
        let task = dl.task(format!("{}/node.msi", server.uri()), &dest, "nodejs");

        let written = dl.fetch(&task).await.unwrap();
        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);

        let events = events.lock().unwrap();
        assert!(events[0].message.starts_with("Downloading from"));
        let last = events.last().unwrap();
        assert_eq!(last.status, InstallStatus::Installing);
        assert_eq!(last.percentage, task.band.end);
        assert!(last.message.contains("100.0%"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_downloaded_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MZ".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("git.exe");
        let (dl, _) = downloader();
        dl.fetch(&dl.task(server.uri(), &dest, "git")).await.unwrap();

        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[tokio::test]
    async fn test_non_200_is_error_and_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.msi");
        let (dl, _) = downloader();
        let err = dl.fetch(&dl.task(server.uri(), &dest, "nodejs")).await.unwrap_err();

        assert!(matches!(err, InstallError::HttpStatus { status: 404, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_declared_oversize_rejected_upfront() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("big.msi");
        let (dl, _) = downloader();
        let task = dl.task(server.uri(), &dest, "nodejs").with_max_bytes(1024);

        let err = dl.fetch(&task).await.unwrap_err();
        assert!(matches!(err, InstallError::SizeLimitExceeded { size: 2048, limit: 1024 }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_size_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (dl, _) = downloader();
        let task = dl
            .task(server.uri(), dir.path().join("big.msi"), "nodejs")
            .with_max_bytes(100);

        let err = dl.fetch_with_retry(&task).await.unwrap_err();
        assert!(matches!(err, InstallError::SizeLimitExceeded { .. }));
    }

    struct FailThenSucceed {
        failures: usize,
        calls: Arc<Mutex<usize>>,
    }

    impl Respond for FailThenSucceed {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec())
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let server = MockServer::start().await;
        let calls = Arc::new(Mutex::new(0));
        Mock::given(method("GET"))
            .respond_with(FailThenSucceed {
                failures: 2,
                calls: calls.clone(),
            })
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("Git-installer.exe");
        let (dl, events) = downloader();
        let written = dl
            .fetch_with_retry(&dl.task(server.uri(), &dest, "git"))
            .await
            .unwrap();

        assert_eq!(written, 7);
        assert_eq!(*calls.lock().unwrap(), 3);

        let retries: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.message.starts_with("Download failed, retrying"))
            .map(|e| e.message.clone())
            .collect();
        assert_eq!(retries.len(), 2);
        assert!(retries[0].contains("(attempt 2/3)"));
        assert!(retries[1].contains("(attempt 3/3)"));
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.exe");
        let (dl, _) = downloader();
        let err = dl
            .fetch_with_retry(&dl.task(server.uri(), &dest, "git"))
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::RetriesExhausted { attempts: 3, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_backoff_sleep_is_cancellable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let settings = DownloadSettings {
            retry_backoff: Duration::from_secs(60),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let (dl, _) = downloader_with(settings, cancel.clone());

        let dir = tempfile::tempdir().unwrap();
        let task = dl.task(server.uri(), dir.path().join("x.exe"), "git");

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                cancel.cancel();
            })
        };

        let started = std::time::Instant::now();
        let err = dl.fetch_with_retry(&task).await.unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_untrusted_url_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (dl, _) = downloader();
        let url = server.uri().replace("127.0.0.1", "localhost");
        let err = dl
            .fetch_with_retry(&dl.task(url, dir.path().join("x"), "git"))
            .await
            .unwrap_err();

        assert!(err.is_security());
    }

    #[tokio::test]
    async fn test_redirect_to_untrusted_host_blocked_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "https://evil.example/payload.exe"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("payload.exe");
        let (dl, _) = downloader();
        let err = dl
            .fetch_with_retry(&dl.task(format!("{}/start", server.uri()), &dest, "git"))
            .await
            .unwrap_err();

        assert!(err.is_security(), "unexpected error: {}", err);
        assert!(!dest.exists());
    }

    /// Redirects `/hop/N` to `/hop/N+1` forever.
    struct EndlessHops;

    impl Respond for EndlessHops {
        fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
            let n: u32 = request
                .url
                .path()
                .trim_start_matches("/hop/")
                .parse()
                .unwrap_or(0);
            ResponseTemplate::new(302).insert_header("Location", format!("/hop/{}", n + 1).as_str())
        }
    }

    #[tokio::test]
    async fn test_redirect_chain_stops_at_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(EndlessHops)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (dl, _) = downloader();
        let err = dl
            .fetch(&dl.task(format!("{}/hop/0", server.uri()), dir.path().join("x"), "git"))
            .await
            .unwrap_err();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), MAX_REDIRECTS);

        match err {
            InstallError::Security(crate::error::SecurityViolation::TooManyRedirects { limit }) => {
                assert_eq!(limit, 10)
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v22.13.1/SHASUMS256.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abc  node.msi\n"))
            .mount(&server)
            .await;

        let (dl, _) = downloader();
        let body = dl
            .fetch_text(&format!("{}/v22.13.1/SHASUMS256.txt", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "abc  node.msi\n");
    }

    #[tokio::test]
    async fn test_fetch_text_enforces_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let settings = DownloadSettings {
            max_text_bytes: 1024,
            ..test_settings()
        };
        let (dl, _) = downloader_with(settings, CancellationToken::new());
        let err = dl.fetch_text(&server.uri()).await.unwrap_err();
        assert!(matches!(err, InstallError::SizeLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_already_cancelled_fetch_returns_promptly() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (dl, _) = downloader_with(test_settings(), cancel);

        let server = MockServer::start().await;
        let err = dl.fetch_text(&server.uri()).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_backoff_doubles() {
        let settings = DownloadSettings::default();
        assert_eq!(settings.backoff_for(1), Duration::from_secs(1));
        assert_eq!(settings.backoff_for(2), Duration::from_secs(2));
        assert_eq!(settings.backoff_for(3), Duration::from_secs(4));
    }
}
