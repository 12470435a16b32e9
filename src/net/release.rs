//! GitHub release metadata.

use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::policy::SecurityGate;
use super::{build_client, ensure_ok, read_limited, send};
use crate::error::InstallResult;

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Release JSON is small; anything larger is not a release object.
const MAX_RELEASE_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Published, non-draft, non-prerelease
    pub fn is_stable(&self) -> bool {
        !self.draft && !self.prerelease
    }
}

/// Release-API client. Only the hosts in its gate may be contacted.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    gate: SecurityGate,
    client: reqwest::Client,
    cancel: CancellationToken,
}

impl ReleaseClient {
    pub fn new(
        gate: SecurityGate,
        timeout: Duration,
        user_agent: &str,
        cancel: CancellationToken,
    ) -> InstallResult<Self> {
        let client = build_client(&gate, timeout, user_agent)?;
        Ok(Self {
            gate,
            client,
            cancel,
        })
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    /// GET a release object from `url` (typically `.../releases/latest`).
    pub async fn fetch_release(&self, raw_url: &str) -> InstallResult<Release> {
        let url = self.gate.validate(raw_url)?;
        tracing::debug!("Fetching release metadata from {}", url);

        let request = self.client.get(url.clone()).header(ACCEPT, GITHUB_ACCEPT);
        let response = send(request, &self.cancel, "release lookup").await?;
        ensure_ok(&response, &url)?;

        let body = read_limited(response, MAX_RELEASE_BYTES, &self.cancel, "release lookup").await?;
        let release: Release = serde_json::from_slice(&body)?;

        tracing::debug!(
            "Release {} has {} assets (draft: {}, prerelease: {})",
            release.tag_name,
            release.assets.len(),
            release.draft,
            release.prerelease
        );
        Ok(release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstallError;
    use crate::net::policy::TrustedHostSet;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> ReleaseClient {
        ReleaseClient::new(
            SecurityGate::for_tests(TrustedHostSet::new(["127.0.0.1"])),
            Duration::from_secs(5),
            "devstrap-test",
            CancellationToken::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_release_sends_github_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/git-for-windows/git/releases/latest"))
            .and(header("Accept", GITHUB_ACCEPT))
            .and(header("User-Agent", "devstrap-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tag_name": "v2.47.1.windows.2",
                "html_url": "https://github.com/git-for-windows/git/releases/tag/v2.47.1.windows.2",
                "draft": false,
                "prerelease": false,
                "assets": [{
                    "name": "Git-2.47.1.2-64-bit.exe",
                    "browser_download_url": "https://github.com/git-for-windows/git/releases/download/v2.47.1.windows.2/Git-2.47.1.2-64-bit.exe",
                    "content_type": "application/executable",
                    "size": 67000000
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let release = client()
            .fetch_release(&format!(
                "{}/repos/git-for-windows/git/releases/latest",
                server.uri()
            ))
            .await
            .unwrap();

        assert_eq!(release.tag_name, "v2.47.1.windows.2");
        assert!(release.is_stable());
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].size, 67000000);
    }

    #[tokio::test]
    async fn test_fetch_release_rejects_bad_status_and_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client();
        let err = client
            .fetch_release(&format!("{}/forbidden", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::HttpStatus { status: 403, .. }));

        let err = client
            .fetch_release(&format!("{}/garbage", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Json(_)));
    }

    #[test]
    fn test_release_defaults_for_missing_fields() {
        let release: Release = serde_json::from_str(r#"{"tag_name": "v1.0.0"}"#).unwrap();
        assert!(release.assets.is_empty());
        assert!(release.is_stable());

        let draft: Release =
            serde_json::from_str(r#"{"tag_name": "v1.1.0", "draft": true}"#).unwrap();
        assert!(!draft.is_stable());
    }
}
