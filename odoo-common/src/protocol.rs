//! # Protocol Structures
//!
//! Purpose: Define the procedure-call convention spoken with the server,
//! independent of how calls are serialized or carried.
//!
//! ## Design Principles
//!
//! 1. **Two Endpoints**: authentication goes to `common`, every model method
//!    goes through `execute_kw` on `object`.
//! 2. **Positional Payloads**: `execute_kw` takes a fixed positional prefix
//!    followed by the method's own arguments, built in exactly one place.
//! 3. **Faults Are Data**: a fault is a normal response variant; mapping it to
//!    an error kind is the session's job.
//!
//! ## Call Layout
//!
//! ```text
//! POST <base>/xmlrpc/2/common
//!   authenticate(database, username, secret, {})            -> uid | false
//!
//! POST <base>/xmlrpc/2/object
//!   execute_kw(database, uid, secret, model, method, args [, kwargs])
//!   +----------+-----+--------+-------+--------+------+----------+
//!   | database | uid | secret | model | method | args | kwargs?  |
//!   +----------+-----+--------+-------+--------+------+----------+
//!   | string   | int | string | string| string | array| struct   |
//!   +----------+-----+--------+-------+--------+------+----------+
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::types::Value;

/// Fault code the server uses for rejected credentials or permissions.
pub const FAULT_ACCESS_DENIED: i32 = 3;

/// Fault code assumed when the server sends a non-numeric `faultCode`.
pub const FAULT_APPLICATION_ERROR: i32 = 1;

/// Remote procedure used for authentication.
pub const AUTHENTICATE: &str = "authenticate";

/// Remote procedure used for every model method.
pub const EXECUTE_KW: &str = "execute_kw";

/// Named arguments passed to a model method.
pub type Kwargs = BTreeMap<String, Value>;

/// Server endpoints, both rooted at the configured base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Authentication and version queries.
    Common,
    /// Model method calls.
    Object,
}

impl Endpoint {
    /// Path suffix appended to the base URL.
    pub const fn path(self) -> &'static str {
        match self {
            Endpoint::Common => "xmlrpc/2/common",
            Endpoint::Object => "xmlrpc/2/object",
        }
    }

    /// Joins the endpoint path onto a base URL, tolerating a trailing slash.
    pub fn url(self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.path())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Model methods exposed by the typed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelMethod {
    Search,
    SearchRead,
    Create,
    Write,
    Unlink,
}

impl ModelMethod {
    /// Remote method name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ModelMethod::Search => "search",
            ModelMethod::SearchRead => "search_read",
            ModelMethod::Create => "create",
            ModelMethod::Write => "write",
            ModelMethod::Unlink => "unlink",
        }
    }
}

impl fmt::Display for ModelMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A procedure call: name plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        MethodCall {
            method: method.into(),
            params,
        }
    }

    /// Builds `authenticate(database, username, secret, {})`.
    pub fn authenticate(database: &str, username: &str, secret: &str) -> Self {
        MethodCall::new(
            AUTHENTICATE,
            vec![
                Value::from(database),
                Value::from(username),
                Value::from(secret),
                Value::Struct(BTreeMap::new()),
            ],
        )
    }
}

/// Remote fault: integer code plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Fault {
            code,
            message: message.into(),
        }
    }

    /// Returns true for the access-denied sentinel.
    #[inline]
    pub fn is_access_denied(&self) -> bool {
        self.code == FAULT_ACCESS_DENIED
    }
}

/// Decoded method response.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault(Fault),
}

/// `execute_kw` payload for one model method call.
///
/// Use: built by the session for every typed operation, then turned into a
/// `MethodCall` for the object endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteKw<'a> {
    pub database: &'a str,
    pub uid: i64,
    pub secret: &'a str,
    pub model: &'a str,
    pub method: &'a str,
    pub args: Vec<Value>,
    pub kwargs: Option<Kwargs>,
}

impl ExecuteKw<'_> {
    /// Lays out the positional parameters; `kwargs` is appended only when set.
    pub fn into_call(self) -> MethodCall {
        let mut params = Vec::with_capacity(7);
        params.push(Value::from(self.database));
        params.push(Value::Int(self.uid));
        params.push(Value::from(self.secret));
        params.push(Value::from(self.model));
        params.push(Value::from(self.method));
        params.push(Value::Array(self.args));
        if let Some(kwargs) = self.kwargs {
            params.push(Value::Struct(kwargs));
        }
        MethodCall::new(EXECUTE_KW, params)
    }
}
