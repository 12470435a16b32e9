//! Checks whether a newer release of devstrap itself is published.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::InstallerConfig;
use crate::error::InstallResult;
use crate::net::{Release, ReleaseClient, SecurityGate, USER_AGENT};
use crate::version::{clean_version, is_newer};

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub available: bool,
    pub current_version: String,
    pub latest_version: String,
    #[serde(rename = "downloadURL", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

/// Windows installer asset, or the release page when there is none.
pub fn download_url(release: &Release) -> Option<String> {
    release
        .assets
        .iter()
        .find(|asset| {
            let name = asset.name.to_lowercase();
            name.contains("windows") || name.ends_with(".exe") || name.ends_with(".msi")
        })
        .map(|asset| asset.browser_download_url.clone())
        .or_else(|| Some(release.html_url.clone()).filter(|url| !url.is_empty()))
}

/// Compare a fetched release with the running version. Drafts and
/// prereleases never count as updates.
pub fn update_info(release: &Release, current: &str) -> UpdateInfo {
    let current_version = clean_version(current).to_string();
    let latest_version = clean_version(&release.tag_name).to_string();

    UpdateInfo {
        available: release.is_stable() && is_newer(&latest_version, &current_version),
        download_url: download_url(release),
        current_version,
        latest_version,
    }
}

pub struct UpdateChecker {
    client: ReleaseClient,
    url: String,
}

impl UpdateChecker {
    pub fn new(config: &InstallerConfig, cancel: CancellationToken) -> InstallResult<Self> {
        let client = ReleaseClient::new(
            SecurityGate::github(),
            config.update_check_timeout(),
            USER_AGENT,
            cancel,
        )?;
        Ok(Self::with_client(client, config.self_update_url()))
    }

    pub fn with_client(client: ReleaseClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn check_for_update(&self, current: &str) -> InstallResult<UpdateInfo> {
        let release = self.client.fetch_release(&self.url).await?;
        let info = update_info(&release, current);
        tracing::info!(
            "Latest release {} (running {}, update available: {})",
            info.latest_version,
            info.current_version,
            info.available
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ReleaseAsset, TrustedHostSet};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn release(tag: &str, assets: &[&str]) -> Release {
        Release {
            tag_name: tag.to_string(),
            name: None,
            html_url: format!("https://github.com/devstrap/devstrap/releases/tag/{}", tag),
            body: None,
            draft: false,
            prerelease: false,
            assets: assets
                .iter()
                .map(|name| ReleaseAsset {
                    name: name.to_string(),
                    browser_download_url: format!("https://github.com/devstrap/devstrap/releases/download/{}/{}", tag, name),
                    content_type: String::new(),
                    size: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_newer_release_is_available() {
        let info = update_info(&release("v0.3.0", &["devstrap-0.3.0-windows-x64.zip"]), "0.2.9");
        assert!(info.available);
        assert_eq!(info.current_version, "0.2.9");
        assert_eq!(info.latest_version, "0.3.0");
        assert!(info.download_url.unwrap().ends_with("devstrap-0.3.0-windows-x64.zip"));
    }

    #[test]
    fn test_same_or_older_release_is_not_available() {
        assert!(!update_info(&release("v1.2.0", &[]), "v1.2.0").available);
        assert!(!update_info(&release("v1.1.9", &[]), "1.2.0").available);
        assert!(!update_info(&release("1.2", &[]), "1.2.0").available);
    }

    #[test]
    fn test_prerelease_is_ignored() {
        let mut rel = release("v9.0.0-rc1", &[]);
        rel.prerelease = true;
        assert!(!update_info(&rel, "0.1.0").available);
    }

    #[test]
    fn test_download_url_prefers_installer_asset() {
        let rel = release("v1.0.0", &["checksums.txt", "devstrap-setup.MSI", "devstrap.exe"]);
        assert!(download_url(&rel).unwrap().ends_with("devstrap-setup.MSI"));

        let rel = release("v1.0.0", &["devstrap-linux.tar.gz"]);
        assert_eq!(
            download_url(&rel).unwrap(),
            "https://github.com/devstrap/devstrap/releases/tag/v1.0.0"
        );
    }

    #[test]
    fn test_serializes_like_the_frontend_expects() {
        let info = update_info(&release("v1.0.0", &["devstrap.exe"]), "1.0.0");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["currentVersion"], "1.0.0");
        assert!(json["downloadURL"].as_str().unwrap().ends_with("devstrap.exe"));
    }

    #[tokio::test]
    async fn test_check_for_update_against_release_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/devstrap/devstrap/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag_name": "v99.0.0",
                "html_url": "https://github.com/devstrap/devstrap/releases/tag/v99.0.0",
                "assets": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReleaseClient::new(
            SecurityGate::for_tests(TrustedHostSet::new(["127.0.0.1"])),
            Duration::from_secs(5),
            USER_AGENT,
            CancellationToken::new(),
        )
        .unwrap();
        let url = format!("{}/repos/devstrap/devstrap/releases/latest", server.uri());
        let checker = UpdateChecker::with_client(client, url);

        let info = checker.check_for_update(CURRENT_VERSION).await.unwrap();
        assert!(info.available);
        assert_eq!(info.latest_version, "99.0.0");
    }

    #[test]
    fn test_default_checker_targets_trusted_api() {
        let checker = UpdateChecker::new(&InstallerConfig::default(), CancellationToken::new()).unwrap();
        assert_eq!(checker.url, "https://api.github.com/repos/devstrap/devstrap/releases/latest");
        assert!(checker.client.gate().validate(&checker.url).is_ok());
    }
}
