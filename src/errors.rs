//! Binding Error Hierarchy
//!
//! Errors surfaced by the UCI and ubus bindings, grouped by the layer that
//! raises them: native library returns, marshaling, command validation and
//! connection management.

use std::fmt::Display;
use std::path::PathBuf;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The native bus or store could not be reached
    #[error("connect to {path:?} failed: {reason}")]
    Connect { path: PathBuf, reason: String },

    /// Package, section, option or object absent
    #[error("{0} not found")]
    NotFound(String),

    /// Command is missing its target or a required name
    #[error("validation failed: {0}")]
    Validation(String),

    /// Field kind unsupported or value unparsable during (un)marshal
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Non-OK return from a native library call
    #[error(transparent)]
    Native(#[from] NativeError),

    /// Native call failed with a retryable condition (EAGAIN class)
    #[error("transient native failure: {0}")]
    Transient(NativeError),

    /// Invoke exceeded its deadline after all retries
    #[error("request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// Handle used after its context was released
    #[error("{0} already closed")]
    Closed(&'static str),

    /// Error reported by a user supplied reply handler
    #[error("reply handler failed: {0}")]
    Handler(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Wrapped native return code plus the library's own message.
///
/// Formats as `"<code>: <message>"`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct NativeError {
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Marshaling failures between typed records and the option model
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    /// Record contains a kind that has no option representation
    #[error("unsupported kind {kind} for option {option:?}")]
    Unsupported { option: String, kind: &'static str },

    /// Stored option text does not parse as the field's type
    #[error("option {option:?}: cannot parse {value:?}: {reason}")]
    Parse {
        option: String,
        value: String,
        reason: String,
    },

    /// Stored option kind differs from the destination field kind
    #[error("option {option:?}: expected {expected}, found {found}")]
    KindMismatch {
        option: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for TypeError {
    fn custom<T: Display>(msg: T) -> Self {
        TypeError::Custom(msg.to_string())
    }
}

impl serde::de::Error for TypeError {
    fn custom<T: Display>(msg: T) -> Self {
        TypeError::Custom(msg.to_string())
    }
}

impl Error {
    /// Whether the failure is worth retrying against the native layer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}
