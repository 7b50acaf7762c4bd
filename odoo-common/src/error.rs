//! # Error Taxonomy
//!
//! Purpose: Give callers one error type for every client operation while
//! keeping authorization failures, remote faults and transport failures
//! distinguishable by variant.
//!
//! ## Layers
//!
//! ```text
//! OdooError
//!   ├── Transport(TransportError)   connection, HTTP status, malformed XML
//!   ├── AccessDenied { .. }         fault code 3, rejected credentials
//!   ├── Rpc { code, message }       any other remote fault
//!   ├── Mapping(MappingError)       record coercion failure
//!   ├── ObjectNotFound { .. }       raised by lookups, never by execute
//!   ├── NotAuthenticated            execute before authenticate
//!   └── Config(ConfigError)         client configuration rejected
//! ```

use std::fmt;

use thiserror::Error;

/// Result alias used across the workspace.
pub type OdooResult<T> = Result<T, OdooError>;

/// Errors surfaced by the session, the typed operations and the mapper.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OdooError {
    /// Endpoint, connection or decode failure. Never retried.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server rejected the credentials or the operation (fault code 3).
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// Any other remote fault.
    #[error("rpc fault {code}: {message}")]
    Rpc { code: i32, message: String },

    /// A remote record could not be coerced into its typed shape.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A lookup by id found nothing.
    #[error("{model} record {id} does not exist")]
    ObjectNotFound { model: String, id: i64 },

    /// An operation was issued before the session obtained a user id.
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// Client configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl OdooError {
    /// Returns true for authorization failures, whichever call raised them.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, OdooError::AccessDenied { .. })
    }

    /// Returns the remote fault code for `Rpc` errors.
    pub fn fault_code(&self) -> Option<i32> {
        match self {
            OdooError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failures below the RPC layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Base URL or endpoint path could not be turned into a request URL.
    #[error("invalid endpoint url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP request could not be sent or its body could not be read.
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    /// The server answered with a non-success HTTP status.
    #[error("{endpoint} answered with http status {status}")]
    Status { endpoint: String, status: u16 },

    /// The response body was not a well-formed XML-RPC method response.
    #[error("malformed xml-rpc response: {0}")]
    Protocol(String),

    /// The response decoded fine but did not have the expected shape.
    #[error("unexpected response: expected {expected}, got {found}")]
    UnexpectedResponse {
        expected: &'static str,
        found: &'static str,
    },
}

/// A field of a remote record could not be coerced into the target kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot map field '{field}': expected {expected}, found {found}")]
pub struct MappingError {
    /// Name of the offending field.
    pub field: String,
    /// Target kind declared in the record schema.
    pub expected: &'static str,
    /// Short description of the value that arrived.
    pub found: String,
}

/// One problem found while validating a client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    /// A required setting is absent or blank.
    Missing(&'static str),
    /// A setting is present but unusable.
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::Missing(field) => write!(f, "{} is missing", field),
            ConfigIssue::Invalid { field, reason } => write!(f, "{} is invalid: {}", field, reason),
        }
    }
}

/// Configuration rejected by validation, listing every issue at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid client configuration: {}", render_issues(.issues))]
pub struct ConfigError {
    pub issues: Vec<ConfigIssue>,
}

impl ConfigError {
    /// Returns true when `field` was reported missing.
    pub fn is_missing(&self, field: &str) -> bool {
        self.issues
            .iter()
            .any(|issue| matches!(issue, ConfigIssue::Missing(name) if *name == field))
    }

    /// Returns true when `field` was reported invalid.
    pub fn is_invalid(&self, field: &str) -> bool {
        self.issues
            .iter()
            .any(|issue| matches!(issue, ConfigIssue::Invalid { field: name, .. } if *name == field))
    }
}

fn render_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ConfigIssue::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
