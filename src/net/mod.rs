//! Outbound HTTP: security gate, download engine and release metadata.

pub mod download;
pub mod policy;
pub mod release;

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, Url};
use tokio_util::sync::CancellationToken;

use crate::error::{InstallError, InstallResult};

pub use download::{DownloadSettings, DownloadTask, Downloader};
pub use policy::{SecurityGate, TrustedHostSet, MAX_REDIRECTS};
pub use release::{Release, ReleaseAsset, ReleaseClient};

/// Client identifier sent with every request
pub const USER_AGENT: &str = concat!("devstrap/", env!("CARGO_PKG_VERSION"));

/// Build a client whose redirects are vetted by `gate`.
pub(crate) fn build_client(
    gate: &SecurityGate,
    timeout: Duration,
    user_agent: &str,
) -> InstallResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .redirect(gate.redirect_policy())
        .build()
        .map_err(InstallError::Network)
}

/// Send a request, abandoning it if `cancel` fires first.
pub(crate) async fn send(
    request: RequestBuilder,
    cancel: &CancellationToken,
    operation: &str,
) -> InstallResult<Response> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(InstallError::cancelled(operation)),
        result = request.send() => result.map_err(InstallError::from_reqwest),
    }
}

/// Reject anything but 200 OK.
pub(crate) fn ensure_ok(response: &Response, url: &Url) -> InstallResult<()> {
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(InstallError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

/// Next body chunk, or `None` at end of stream.
pub(crate) async fn next_chunk(
    response: &mut Response,
    cancel: &CancellationToken,
    operation: &str,
) -> InstallResult<Option<Bytes>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(InstallError::cancelled(operation)),
        chunk = response.chunk() => chunk.map_err(InstallError::from_reqwest),
    }
}

/// Read a whole body into memory, failing once it grows past `limit` bytes.
pub(crate) async fn read_limited(
    mut response: Response,
    limit: u64,
    cancel: &CancellationToken,
    operation: &str,
) -> InstallResult<Vec<u8>> {
    if let Some(declared) = response.content_length() {
        if declared > limit {
            return Err(InstallError::SizeLimitExceeded {
                size: declared,
                limit,
            });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = next_chunk(&mut response, cancel, operation).await? {
        let size = body.len() as u64 + chunk.len() as u64;
        if size > limit {
            return Err(InstallError::SizeLimitExceeded { size, limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
