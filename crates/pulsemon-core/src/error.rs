// ── Core error types ──
//
// Only fetch failures are caller-visible in practice; validation,
// storage, and listener failures are recovered locally and logged.
// The `From<pulsemon_api::Error>` impl translates transport-layer errors
// into these variants.

use thiserror::Error;

/// Error returned by a bus listener. Logged by the bus, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport errors ─────────────────────────────────────────────
    #[error("Request failed with HTTP {status} {status_text}")]
    Http { status: u16, status_text: String },

    #[error("Cannot reach metrics API: {reason}")]
    Unreachable { reason: String },

    #[error("Metrics API rejected credentials: {message}")]
    Unauthorized { message: String },

    #[error("Malformed metrics payload: {message}")]
    Decode { message: String },

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CoreError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status code, for failures that carry one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }

    /// Short machine-oriented description of what went wrong underneath.
    pub fn cause(&self) -> Option<String> {
        match self {
            Self::Http { status, status_text } => Some(format!("{status} {status_text}")),
            Self::Unreachable { reason } => Some(reason.clone()),
            Self::Unauthorized { .. } => Some("401 Unauthorized".into()),
            Self::Decode { .. } => Some("decode".into()),
            Self::Storage(e) => Some(e.to_string()),
            Self::Validation { field, .. } => Some(field.clone()),
            Self::Config { .. } => None,
        }
    }

    /// Returns `true` for network/HTTP failures (as opposed to local ones).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Unreachable { .. } | Self::Unauthorized { .. } | Self::Decode { .. }
        )
    }
}

/// Failure reading or writing the persisted preference slot.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("preference storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<pulsemon_api::Error> for CoreError {
    fn from(err: pulsemon_api::Error) -> Self {
        match err {
            pulsemon_api::Error::Http {
                status,
                status_text,
                body: _,
            } => CoreError::Http {
                status,
                status_text,
            },
            pulsemon_api::Error::Authentication { message } => CoreError::Unauthorized { message },
            pulsemon_api::Error::Transport(ref e) => {
                if let Some(status) = e.status() {
                    CoreError::Http {
                        status: status.as_u16(),
                        status_text: status.canonical_reason().unwrap_or("Unknown").to_owned(),
                    }
                } else {
                    CoreError::Unreachable {
                        reason: e.to_string(),
                    }
                }
            }
            pulsemon_api::Error::Tls(reason) => CoreError::Unreachable {
                reason: format!("TLS error: {reason}"),
            },
            pulsemon_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            pulsemon_api::Error::Deserialization { message, body: _ } => {
                CoreError::Decode { message }
            }
        }
    }
}
