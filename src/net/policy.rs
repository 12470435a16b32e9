//! Network security gate.
//!
//! Every outbound request and every redirect hop passes through
//! [`SecurityGate::check`]: HTTPS only, exact-match host allowlist, and a
//! bounded redirect chain.

use std::collections::BTreeSet;

use reqwest::redirect;
use reqwest::Url;

use crate::error::{InstallResult, SecurityViolation};

/// Maximum number of requests in a redirect chain
pub const MAX_REDIRECTS: usize = 10;

/// Release-API hosts
const GITHUB_HOSTS: &[&str] = &[
    "github.com",
    "api.github.com",
    "objects.githubusercontent.com",
    "release-assets.githubusercontent.com",
];

/// Distribution CDN hosts for the runtime
const NODEJS_HOSTS: &[&str] = &["nodejs.org", "cdn.nodejs.org"];

/// Hostnames a network operation may contact or be redirected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedHostSet {
    hosts: BTreeSet<String>,
}

impl TrustedHostSet {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Release-API hosts only
    pub fn github() -> Self {
        Self::new(GITHUB_HOSTS.iter().copied())
    }

    /// Release-API hosts plus distribution CDNs
    pub fn all() -> Self {
        Self::new(GITHUB_HOSTS.iter().chain(NODEJS_HOSTS).copied())
    }

    /// Exact match only; subdomains of a trusted host are not trusted.
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }
}

/// Approves or rejects requests against a [`TrustedHostSet`].
#[derive(Debug, Clone)]
pub struct SecurityGate {
    hosts: TrustedHostSet,
    allow_plain_http: bool,
}

impl SecurityGate {
    pub fn new(hosts: TrustedHostSet) -> Self {
        Self {
            hosts,
            allow_plain_http: false,
        }
    }

    pub fn github() -> Self {
        Self::new(TrustedHostSet::github())
    }

    pub fn all() -> Self {
        Self::new(TrustedHostSet::all())
    }

    /// Gate for loopback mock servers, which only speak plain HTTP.
    #[cfg(test)]
    pub(crate) fn for_tests(hosts: TrustedHostSet) -> Self {
        Self {
            hosts,
            allow_plain_http: true,
        }
    }

    pub fn hosts(&self) -> &TrustedHostSet {
        &self.hosts
    }

    /// Decide whether `url` may be requested after `chain_len` prior
    /// requests in the same redirect chain.
    pub fn check(&self, url: &Url, chain_len: usize) -> Result<(), SecurityViolation> {
        if chain_len >= MAX_REDIRECTS {
            return Err(SecurityViolation::TooManyRedirects {
                limit: MAX_REDIRECTS,
            });
        }

        let scheme = url.scheme();
        let scheme_ok = scheme == "https" || (self.allow_plain_http && scheme == "http");
        if !scheme_ok {
            return Err(SecurityViolation::InsecureScheme {
                scheme: scheme.to_string(),
            });
        }

        match url.host_str() {
            Some(host) if self.hosts.contains(host) => Ok(()),
            Some(host) => Err(SecurityViolation::UntrustedHost {
                host: host.to_string(),
            }),
            None => Err(SecurityViolation::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            }),
        }
    }

    /// Parse and check a URL that is about to be requested directly.
    pub fn validate(&self, raw: &str) -> InstallResult<Url> {
        let url = Url::parse(raw).map_err(|e| SecurityViolation::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        self.check(&url, 0)?;
        Ok(url)
    }

    /// Redirect hook for a reqwest client.
    ///
    /// Violations surface as the error source of the failed request.
    pub fn redirect_policy(&self) -> redirect::Policy {
        let gate = self.clone();
        redirect::Policy::custom(move |attempt| {
            match gate.check(attempt.url(), attempt.previous().len()) {
                Ok(()) => attempt.follow(),
                Err(violation) => {
                    tracing::warn!("Blocked redirect to {}: {}", attempt.url(), violation);
                    attempt.error(violation)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_too_many_redirects_rejected_even_for_trusted_host() {
        let gate = SecurityGate::github();
        let err = gate
            .check(&url("https://github.com/test"), MAX_REDIRECTS)
            .unwrap_err();
        assert_eq!(err, SecurityViolation::TooManyRedirects { limit: 10 });

        assert!(gate.check(&url("https://github.com/test"), MAX_REDIRECTS - 1).is_ok());
    }

    #[test]
    fn test_non_https_rejected() {
        let gate = SecurityGate::all();
        let err = gate.check(&url("http://github.com/test"), 0).unwrap_err();
        assert!(matches!(err, SecurityViolation::InsecureScheme { .. }));

        let err = gate.check(&url("ftp://nodejs.org/dist"), 0).unwrap_err();
        assert!(matches!(err, SecurityViolation::InsecureScheme { .. }));
    }

    #[test]
    fn test_untrusted_host_rejected() {
        let gate = SecurityGate::github();
        let err = gate.check(&url("https://evil.com/malware"), 0).unwrap_err();
        assert_eq!(
            err,
            SecurityViolation::UntrustedHost {
                host: "evil.com".to_string()
            }
        );
    }

    #[test]
    fn test_trusted_hosts_accepted() {
        let gate = SecurityGate::github();
        for host in TrustedHostSet::github().iter() {
            assert!(
                gate.check(&url(&format!("https://{}/test", host)), 0).is_ok(),
                "{} should be trusted",
                host
            );
        }
    }

    #[test]
    fn test_no_subdomain_matching() {
        let gate = SecurityGate::github();
        assert!(gate.check(&url("https://evil.github.com/x"), 0).is_err());
        assert!(gate.check(&url("https://github.com.evil.io/x"), 0).is_err());
    }

    #[test]
    fn test_narrow_set_excludes_cdn() {
        let narrow = TrustedHostSet::github();
        let broad = TrustedHostSet::all();
        assert!(!narrow.contains("nodejs.org"));
        assert!(broad.contains("nodejs.org"));
        assert!(broad.contains("cdn.nodejs.org"));
        for host in narrow.iter() {
            assert!(broad.contains(host));
        }
    }

    #[test]
    fn test_host_match_is_case_insensitive() {
        let set = TrustedHostSet::new(["GitHub.com"]);
        assert!(set.contains("github.com"));
        assert!(set.contains("GITHUB.COM"));
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let gate = SecurityGate::all();
        let err = gate.validate("not a url").unwrap_err();
        assert!(err.is_security());

        let ok = gate.validate("https://nodejs.org/dist/v22.13.1/SHASUMS256.txt");
        assert!(ok.is_ok());
    }

    #[test]
    fn test_test_gate_admits_loopback_http_only_for_listed_hosts() {
        let gate = SecurityGate::for_tests(TrustedHostSet::new(["127.0.0.1"]));
        assert!(gate.check(&url("http://127.0.0.1:8080/x"), 0).is_ok());
        assert!(gate.check(&url("http://localhost:8080/x"), 0).is_err());
    }
}
