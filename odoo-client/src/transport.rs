//! # Transport
//!
//! Purpose: Carry one encoded method call to one endpoint and hand back the
//! decoded response.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: `Session` talks to `dyn Transport`, so tests swap
//!    the HTTP carrier for an in-process one without touching call logic.
//! 2. **One Endpoint per Transport**: the authentication and model endpoints
//!    are separate handles, opened independently.
//! 3. **Shared Client**: `reqwest::Client` is internally reference counted
//!    and safe to use from many tasks at once.
//! 4. **Faults Are Not Errors Here**: a fault is a successful exchange; only
//!    HTTP, IO and decode failures become `TransportError`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::header::CONTENT_TYPE;

use odoo_common::{Endpoint, MethodCall, MethodResponse, TransportError};

use crate::xmlrpc::{decode_response, encode_call};

/// Carries method calls to a single endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `call` and returns the decoded response (success or fault).
    async fn call(&self, call: &MethodCall) -> Result<MethodResponse, TransportError>;
}

/// Timeouts applied to each HTTP transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportOptions {
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional whole-request timeout.
    pub request_timeout: Option<Duration>,
}

/// XML-RPC over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: reqwest::Url,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Opens a transport for `endpoint` under `base_url`.
    ///
    /// No request is made; an unreachable server surfaces on the first call.
    pub fn open(
        base_url: &str,
        endpoint: Endpoint,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        let raw = endpoint.url(base_url);
        let url = reqwest::Url::parse(&raw).map_err(|err| TransportError::InvalidUrl {
            url: raw.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl {
                url: raw,
                reason: "scheme must be http or https".to_string(),
            });
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|err| TransportError::Request {
            endpoint: url.to_string(),
            reason: err.to_string(),
        })?;

        Ok(HttpTransport { url, http })
    }

    /// Full endpoint URL.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, call: &MethodCall) -> Result<MethodResponse, TransportError> {
        let mut body = BytesMut::with_capacity(512);
        encode_call(call, &mut body);

        let request_failed = |err: reqwest::Error| TransportError::Request {
            endpoint: self.url.to_string(),
            reason: err.to_string(),
        };

        let response = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "text/xml")
            .body(body.freeze())
            .send()
            .await
            .map_err(request_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        let payload = response.bytes().await.map_err(request_failed)?;
        decode_response(&payload)
    }
}
