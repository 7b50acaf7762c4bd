//! # RPC Session
//!
//! Purpose: Authenticate once and funnel every model method through a single
//! `execute` primitive that maps remote faults onto error kinds.
//!
//! ## Design Principles
//! 1. **Single Choke Point**: typed operations never talk to a transport
//!    directly; tracing and metrics live in `execute` only.
//! 2. **Fail Fast**: `execute` refuses to build a payload until a user id has
//!    been obtained.
//! 3. **Read-Only After Login**: once authenticated the session is only read,
//!    so an `Arc<Session>` can be shared by any number of tasks.
//!
//! ## State Machine
//!
//! ```text
//! Unauthenticated --authenticate()--> Authenticated
//!        |                                  |
//!   execute() -> NotAuthenticated      execute() -> server
//! ```
//!
//! There is no way back; build a new session to log in again.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use odoo_common::{
    Endpoint, ExecuteKw, Fault, Kwargs, MethodCall, MethodResponse, OdooError, OdooResult,
    TransportError, Value,
};

use crate::metrics::{CallMetrics, CallOutcome, MetricsSnapshot};
use crate::transport::{HttpTransport, Transport, TransportOptions};

/// Validated connection settings. Immutable once a session is built.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub database: String,
    pub username: String,
    pub secret: String,
    /// Base URL without trailing slash, e.g. `https://erp.example.com`.
    pub base_url: String,
}

impl Credentials {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Credentials {
            database: database.into(),
            username: username.into(),
            secret: secret.into(),
            base_url: base_url.into(),
        }
    }
}

// Keep the secret out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Authenticated identity plus the two endpoint transports.
pub struct Session {
    credentials: Credentials,
    uid: Option<i64>,
    common: Arc<dyn Transport>,
    object: Arc<dyn Transport>,
    metrics: CallMetrics,
}

impl Session {
    /// Builds an unauthenticated session over explicit transports.
    pub fn new(credentials: Credentials, common: Arc<dyn Transport>, object: Arc<dyn Transport>) -> Self {
        Session {
            credentials,
            uid: None,
            common,
            object,
            metrics: CallMetrics::new(),
        }
    }

    /// Opens both HTTP endpoints for `credentials`. No request is made.
    pub fn open(credentials: Credentials, options: TransportOptions) -> Result<Self, TransportError> {
        let common = HttpTransport::open(&credentials.base_url, Endpoint::Common, options)?;
        let object = Self::open_models_endpoint(&credentials, options)?;
        Ok(Session::new(credentials, Arc::new(common), Arc::new(object)))
    }

    /// Opens the endpoint used for every model method.
    ///
    /// Independent of the authentication endpoint: same base URL, different
    /// path.
    pub fn open_models_endpoint(
        credentials: &Credentials,
        options: TransportOptions,
    ) -> Result<HttpTransport, TransportError> {
        HttpTransport::open(&credentials.base_url, Endpoint::Object, options)
    }

    /// Logs in and stores the user id.
    ///
    /// Calling it again on an authenticated session returns the stored id
    /// without a round trip.
    ///
    /// # Errors
    /// - `AccessDenied` on fault code 3, or when the server answers `false`
    ///   (unknown login or wrong secret).
    /// - `Transport` on connection, HTTP or decode failures.
    /// - `Rpc` on any other fault.
    pub async fn authenticate(&mut self) -> OdooResult<i64> {
        if let Some(uid) = self.uid {
            return Ok(uid);
        }

        let call = MethodCall::authenticate(
            &self.credentials.database,
            &self.credentials.username,
            &self.credentials.secret,
        );
        let value = match self.common.call(&call).await? {
            MethodResponse::Success(value) => value,
            MethodResponse::Fault(fault) => return Err(fault_to_error(fault)),
        };

        let uid = match value {
            Value::Int(uid) if uid > 0 => uid,
            Value::Int(_) | Value::Bool(false) => {
                return Err(OdooError::AccessDenied {
                    message: format!(
                        "login '{}' rejected by database '{}'",
                        self.credentials.username, self.credentials.database
                    ),
                });
            }
            other => {
                return Err(TransportError::UnexpectedResponse {
                    expected: "user id",
                    found: other.kind(),
                }
                .into());
            }
        };

        info!(
            database = %self.credentials.database,
            username = %self.credentials.username,
            uid,
            "authenticated"
        );
        self.uid = Some(uid);
        Ok(uid)
    }

    /// User id, once authenticated.
    #[inline]
    pub fn uid(&self) -> Option<i64> {
        self.uid
    }

    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.uid.is_some()
    }

    #[inline]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Point-in-time call metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Invokes `method` on `model` through `execute_kw`.
    ///
    /// Fault code 3 becomes `AccessDenied`; any other fault becomes `Rpc`
    /// with the remote code and message; transport failures pass through.
    pub async fn execute(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Option<Kwargs>,
    ) -> OdooResult<Value> {
        let uid = self.uid.ok_or(OdooError::NotAuthenticated)?;
        let call = ExecuteKw {
            database: &self.credentials.database,
            uid,
            secret: &self.credentials.secret,
            model,
            method,
            args,
            kwargs,
        }
        .into_call();

        debug!(model, method, "execute_kw");
        self.metrics.record_call_start();
        let started = Instant::now();
        let result = self.object.call(&call).await;
        let outcome = match &result {
            Ok(MethodResponse::Success(_)) => CallOutcome::Success,
            Ok(MethodResponse::Fault(_)) => CallOutcome::Fault,
            Err(_) => CallOutcome::TransportError,
        };
        self.metrics.record_call_end(started.elapsed(), outcome);

        match result? {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault(fault) => {
                debug!(model, method, code = fault.code, "execute_kw fault");
                Err(fault_to_error(fault))
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("credentials", &self.credentials)
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

/// Maps a remote fault onto the caller-facing error kind.
pub fn fault_to_error(fault: Fault) -> OdooError {
    if fault.is_access_denied() {
        OdooError::AccessDenied {
            message: fault.message,
        }
    } else {
        OdooError::Rpc {
            code: fault.code,
            message: fault.message,
        }
    }
}
