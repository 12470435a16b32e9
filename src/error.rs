//! Installer error types.
//!
//! Errors are grouped so callers can decide how to react: network failures
//! are retried by the download engine, security and integrity failures abort
//! the current strategy immediately, and cancellation unwinds everything.

use thiserror::Error;

/// A rejected outbound request or redirect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityViolation {
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("refusing non-HTTPS URL with scheme '{scheme}'")]
    InsecureScheme { scheme: String },

    #[error("host '{host}' is not in the trusted host list")]
    UntrustedHost { host: String },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors produced while installing or updating a component.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Request construction or transport failure
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Server answered with something other than 200
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// HTTPS, allowlist or redirect policy rejected the request
    #[error("Security policy violation: {0}")]
    Security(#[from] SecurityViolation),

    /// No manifest entry for the artifact
    #[error("checksum not found for {filename}")]
    ChecksumNotFound { filename: String },

    /// A mandatory checksum could not be obtained
    #[error("checksum required for {artifact} but unavailable: {reason}")]
    ChecksumMissing { artifact: String, reason: String },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("payload too large: {size} bytes exceeds limit of {limit}")]
    SizeLimitExceeded { size: u64, limit: u64 },

    /// Subprocess could not be started or exited non-zero
    #[error("command '{command}' failed ({status})\nOutput: {output}")]
    Execution {
        command: String,
        status: String,
        output: String,
    },

    #[error("{command} not found in PATH")]
    NotFound { command: String },

    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} is not supported on this platform")]
    Unsupported(String),

    #[error("download failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<InstallError>,
    },

    /// Strategy A failed and the component has no strategy B
    #[error("{component} cannot be installed: {reason}")]
    NoFallback { component: String, reason: String },

    /// Terminal failure of one orchestrated step
    #[error("{component} installation failed: {source}")]
    StepFailed {
        component: String,
        #[source]
        source: Box<InstallError>,
    },
}

impl InstallError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn io_at(action: &str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::io(format!("failed to {} {}", action, path.display()), source)
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn not_found(command: impl Into<String>) -> Self {
        Self::NotFound {
            command: command.into(),
        }
    }

    pub fn execution(
        command: impl Into<String>,
        status: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Execution {
            command: command.into(),
            status: status.into(),
            output: output.into(),
        }
    }

    pub fn step_failed(component: impl Into<String>, source: InstallError) -> Self {
        Self::StepFailed {
            component: component.into(),
            source: Box::new(source),
        }
    }

    /// Map a reqwest failure, recovering policy violations raised by the
    /// redirect hook so they are not mistaken for transient transport errors.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(current) = source {
            if let Some(violation) = current.downcast_ref::<SecurityViolation>() {
                return Self::Security(violation.clone());
            }
            source = current.source();
        }
        Self::Network(err)
    }

    /// Whether the download engine may try the same request again.
    ///
    /// Policy, integrity and size violations are deterministic and never
    /// retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::HttpStatus { .. } | Self::Io { .. } => true,
            Self::StepFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::StepFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub fn is_security(&self) -> bool {
        match self {
            Self::Security(_) => true,
            Self::RetriesExhausted { source, .. } => source.is_security(),
            Self::StepFailed { source, .. } => source.is_security(),
            _ => false,
        }
    }

    pub fn is_integrity(&self) -> bool {
        match self {
            Self::ChecksumNotFound { .. }
            | Self::ChecksumMissing { .. }
            | Self::ChecksumMismatch { .. } => true,
            Self::StepFailed { source, .. } | Self::RetriesExhausted { source, .. } => {
                source.is_integrity()
            }
            _ => false,
        }
    }
}

/// Result type alias for installer operations
pub type InstallResult<T> = std::result::Result<T, InstallError>;
