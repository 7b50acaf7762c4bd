//! # Typed Client API
//!
//! Purpose: Expose typed CRUD operations (search, search_read, create, write,
//! unlink) over an authenticated session, plus the configuration that builds
//! one.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `OdooClient` hides endpoints, payload layout and the
//!    wire codec behind one method per model operation.
//! 2. **Opaque Domains**: filters are passed through untouched; the server is
//!    the only interpreter.
//! 3. **Fail Fast**: a result of the wrong shape surfaces immediately as
//!    `TransportError::UnexpectedResponse`.
//! 4. **Pure Validation**: `ClientConfig::validate` reports every problem at
//!    once and never touches the network.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use odoo_common::{
    field_names, map_record, ConfigError, ConfigIssue, Domain, Kwargs, ModelMethod, OdooError,
    OdooResult, Record, RemoteRecord, TransportError, Value,
};

use crate::metrics::MetricsSnapshot;
use crate::session::{Credentials, Session};
use crate::transport::TransportOptions;

/// Environment variable holding the database name.
pub const ENV_DATABASE: &str = "ODOO_DATABASE";
/// Environment variable holding the login.
pub const ENV_USERNAME: &str = "ODOO_USERNAME";
/// Environment variable holding the password or API key.
pub const ENV_PASSWORD: &str = "ODOO_PASSWORD";
/// Environment variable holding the server base URL.
pub const ENV_URL: &str = "ODOO_URL";

// Each setting is read from its prefixed name first, then from the bare name
// used by older `.env` files.
const DATABASE_KEYS: [&str; 2] = [ENV_DATABASE, "DATABASE"];
const USERNAME_KEYS: [&str; 2] = [ENV_USERNAME, "USERNAME"];
const PASSWORD_KEYS: [&str; 2] = [ENV_PASSWORD, "PASSWORD"];
const URL_KEYS: [&str; 2] = [ENV_URL, "URL"];

/// Unvalidated client settings.
///
/// Built from the environment, a `.env` style file, JSON, or by hand; turned
/// into `Credentials` by `validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub database: String,
    pub username: String,
    pub secret: String,
    pub base_url: String,
    /// Optional TCP connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Optional whole-request timeout in milliseconds.
    pub request_timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        ClientConfig {
            database: database.into(),
            username: username.into(),
            secret: secret.into(),
            base_url: base_url.into(),
            ..ClientConfig::default()
        }
    }

    /// Reads the settings from the process environment.
    ///
    /// Each setting comes from its `ODOO_*` variable, or from the bare name
    /// (`DATABASE`, `USERNAME`, `PASSWORD`, `URL`) when the prefixed one is
    /// unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads a `.env` file, letting the process environment override
    /// anything the file sets. The process environment is not modified.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, dotenvy::Error> {
        let file = read_env_file(path)?;
        Ok(Self::from_lookup(|key| {
            env::var(key).ok().or_else(|| file.get(key).cloned())
        }))
    }

    /// Parses a JSON document with the same field names as the struct.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |keys: [&str; 2]| keys.into_iter().find_map(&lookup).unwrap_or_default();
        ClientConfig {
            database: read(DATABASE_KEYS),
            username: read(USERNAME_KEYS),
            secret: read(PASSWORD_KEYS),
            base_url: read(URL_KEYS),
            ..ClientConfig::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(saturating_millis(timeout));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(saturating_millis(timeout));
        self
    }

    /// Checks every field and returns the credentials a session needs.
    ///
    /// # Errors
    /// A `ConfigError` listing each blank field and each unusable value.
    pub fn validate(&self) -> Result<Credentials, ConfigError> {
        let mut issues = Vec::new();
        let mut require = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                issues.push(ConfigIssue::Missing(field));
            }
        };
        require("database", &self.database);
        require("username", &self.username);
        require("secret", &self.secret);
        require("base_url", &self.base_url);

        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if !base_url.is_empty() {
            match reqwest::Url::parse(&base_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => issues.push(ConfigIssue::Invalid {
                    field: "base_url",
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                }),
                Err(err) => issues.push(ConfigIssue::Invalid {
                    field: "base_url",
                    reason: err.to_string(),
                }),
            }
        }
        if self.request_timeout_ms == Some(0) {
            issues.push(ConfigIssue::Invalid {
                field: "request_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        if !issues.is_empty() {
            return Err(ConfigError { issues });
        }
        Ok(Credentials::new(
            self.database.trim(),
            self.username.trim(),
            self.secret.as_str(),
            base_url,
        ))
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            request_timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Reads every `KEY=VALUE` pair of a `.env` file.
///
/// Quoting, escapes, inline comments and `export` prefixes follow dotenv
/// rules.
pub fn read_env_file(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>, dotenvy::Error> {
    dotenvy::from_path_iter(path)?.collect()
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Typed operations over an authenticated session.
///
/// Every method goes through `Session::execute` and returns its errors
/// unchanged. Safe to share across tasks behind an `Arc`.
#[derive(Debug)]
pub struct OdooClient {
    session: Session,
}

impl OdooClient {
    /// Validates `config`, opens both endpoints and authenticates.
    ///
    /// An unreachable server surfaces here as `OdooError::Transport`.
    pub async fn connect(config: &ClientConfig) -> OdooResult<Self> {
        let credentials = config.validate()?;
        let session = Session::open(credentials, config.transport_options())?;
        Self::login(session).await
    }

    /// Authenticates `session` and wraps it.
    pub async fn login(mut session: Session) -> OdooResult<Self> {
        session.authenticate().await?;
        Ok(OdooClient { session })
    }

    /// Wraps a session as is. Operations fail with `NotAuthenticated` until
    /// the session has a user id.
    pub fn from_session(session: Session) -> Self {
        OdooClient { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn uid(&self) -> Option<i64> {
        self.session.uid()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.session.metrics()
    }

    /// Raw escape hatch for methods without a typed wrapper.
    pub async fn execute(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Option<Kwargs>,
    ) -> OdooResult<Value> {
        self.session.execute(model, method, args, kwargs).await
    }

    /// Returns the ids matching `domain`, in server order.
    pub async fn search(&self, model: &str, domain: &Domain) -> OdooResult<Vec<i64>> {
        let result = self
            .call(model, ModelMethod::Search, vec![domain.as_value().clone()], None)
            .await?;
        expect_ids(result)
    }

    /// Returns the records matching `domain`, restricted to `fields`.
    pub async fn search_read(
        &self,
        model: &str,
        domain: &Domain,
        fields: &[String],
    ) -> OdooResult<Vec<RemoteRecord>> {
        let mut kwargs = Kwargs::new();
        kwargs.insert(
            "fields".to_string(),
            Value::Array(fields.iter().map(|field| Value::from(field.as_str())).collect()),
        );
        let result = self
            .call(
                model,
                ModelMethod::SearchRead,
                vec![domain.as_value().clone()],
                Some(kwargs),
            )
            .await?;
        expect_records(result)
    }

    /// Reads and maps every `R` matching `domain`.
    pub async fn search_read_as<R: Record>(&self, domain: &Domain) -> OdooResult<Vec<R>> {
        let records = self.search_read(R::MODEL, domain, &field_names::<R>()).await?;
        records
            .iter()
            .map(|remote| map_record::<R>(remote).map_err(OdooError::from))
            .collect()
    }

    /// Looks up one `R` by id.
    ///
    /// # Errors
    /// `ObjectNotFound` when no record has that id.
    pub async fn get_by_id<R: Record>(&self, id: i64) -> OdooResult<R> {
        self.search_read_as::<R>(&Domain::ids_in(&[id]))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OdooError::ObjectNotFound {
                model: R::MODEL.to_string(),
                id,
            })
    }

    /// Creates a record and returns its id.
    pub async fn create(&self, model: &str, values: RemoteRecord) -> OdooResult<i64> {
        let result = self
            .call(model, ModelMethod::Create, vec![Value::Struct(values)], None)
            .await?;
        match result {
            Value::Int(id) => Ok(id),
            other => Err(unexpected("record id", &other)),
        }
    }

    /// Writes `values` onto every record in `ids`.
    pub async fn update(&self, model: &str, ids: &[i64], values: RemoteRecord) -> OdooResult<bool> {
        let result = self
            .call(
                model,
                ModelMethod::Write,
                vec![Value::id_list(ids), Value::Struct(values)],
                None,
            )
            .await?;
        expect_bool(result)
    }

    /// Deletes every record in `ids`.
    pub async fn delete(&self, model: &str, ids: &[i64]) -> OdooResult<bool> {
        let result = self
            .call(model, ModelMethod::Unlink, vec![Value::id_list(ids)], None)
            .await?;
        expect_bool(result)
    }

    async fn call(
        &self,
        model: &str,
        method: ModelMethod,
        args: Vec<Value>,
        kwargs: Option<Kwargs>,
    ) -> OdooResult<Value> {
        self.session.execute(model, method.as_str(), args, kwargs).await
    }
}

fn unexpected(expected: &'static str, found: &Value) -> OdooError {
    TransportError::UnexpectedResponse {
        expected,
        found: found.kind(),
    }
    .into()
}

fn expect_ids(value: Value) -> OdooResult<Vec<i64>> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(unexpected("list of ids", &other)),
    };
    items
        .iter()
        .map(|item| item.as_i64().ok_or_else(|| unexpected("integer id", item)))
        .collect()
}

fn expect_records(value: Value) -> OdooResult<Vec<RemoteRecord>> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(unexpected("list of records", &other)),
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Struct(record) => Ok(record),
            other => Err(unexpected("record", &other)),
        })
        .collect()
}

fn expect_bool(value: Value) -> OdooResult<bool> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(unexpected("boolean", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ClientConfig {
        ClientConfig::new("prod", "admin", "hunter2", "https://erp.example.com/")
    }

    #[test]
    fn validate_trims_base_url() {
        let credentials = complete().validate().unwrap();
        assert_eq!(credentials.base_url, "https://erp.example.com");
        assert_eq!(credentials.database, "prod");
        assert_eq!(credentials.secret, "hunter2");
    }

    #[test]
    fn validate_lists_every_issue() {
        let config = ClientConfig::new("", " ", "", "ftp://erp.example.com");
        let err = config.validate().unwrap_err();
        assert!(err.is_missing("database"));
        assert!(err.is_missing("username"));
        assert!(err.is_missing("secret"));
        assert!(err.is_invalid("base_url"));
        assert_eq!(err.issues.len(), 4);

        let err = ClientConfig::default().validate().unwrap_err();
        assert!(err.is_missing("base_url"));
        assert!(!err.is_invalid("base_url"));
    }

    #[test]
    fn validate_rejects_unparseable_url_and_zero_timeout() {
        let mut config = complete();
        config.base_url = "erp.example.com".to_string();
        config.request_timeout_ms = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.is_invalid("base_url"));
        assert!(err.is_invalid("request_timeout_ms"));
    }

    fn temp_env_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("odoo-client-{}-{}.env", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn env_file_strips_comments_and_expands_escapes() {
        let path = temp_env_file(
            "dotenv",
            "# comment\n\nODOO_DATABASE=prod\nexport ODOO_URL='http://localhost:8069'\nODOO_PASSWORD=s3cret # prod login\nODOO_USERNAME=\"a\\nb\"\n",
        );
        let vars = read_env_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(vars.get("ODOO_DATABASE").map(String::as_str), Some("prod"));
        assert_eq!(vars.get("ODOO_URL").map(String::as_str), Some("http://localhost:8069"));
        assert_eq!(vars.get("ODOO_PASSWORD").map(String::as_str), Some("s3cret"));
        assert_eq!(vars.get("ODOO_USERNAME").map(String::as_str), Some("a\nb"));
    }

    #[test]
    fn env_file_missing_is_an_error() {
        let path = std::env::temp_dir().join("odoo-client-does-not-exist.env");
        assert!(read_env_file(&path).is_err());
    }

    #[test]
    fn lookup_prefers_first_source() {
        let path = temp_env_file("precedence", "ODOO_DATABASE=file\nODOO_URL=http://file:8069\n");
        let file = read_env_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let process: BTreeMap<&str, &str> = [("ODOO_DATABASE", "process")].into_iter().collect();
        let config = ClientConfig::from_lookup(|key| {
            process
                .get(key)
                .map(|value| value.to_string())
                .or_else(|| file.get(key).cloned())
        });
        assert_eq!(config.database, "process");
        assert_eq!(config.base_url, "http://file:8069");
        assert_eq!(config.username, "");
    }

    #[test]
    fn lookup_falls_back_to_bare_names() {
        let vars: BTreeMap<&str, &str> = [
            ("DATABASE", "legacy"),
            ("USERNAME", "admin"),
            ("PASSWORD", "pw"),
            ("URL", "http://old:8069"),
            ("ODOO_USERNAME", "prefixed"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()));
        assert_eq!(config.database, "legacy");
        assert_eq!(config.username, "prefixed");
        assert_eq!(config.secret, "pw");
        assert_eq!(config.base_url, "http://old:8069");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_config_and_timeouts() {
        let config = ClientConfig::from_json(
            r#"{"database":"prod","username":"admin","secret":"x","base_url":"http://localhost:8069","request_timeout_ms":1500}"#,
        )
        .unwrap();
        assert_eq!(config.database, "prod");
        let options = config.transport_options();
        assert_eq!(options.request_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.connect_timeout, None);

        let options = complete()
            .with_connect_timeout(Duration::from_secs(2))
            .transport_options();
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn result_shape_checks() {
        assert_eq!(
            expect_ids(Value::Array(vec![Value::Int(3), Value::Int(1)])).unwrap(),
            vec![3, 1]
        );
        assert!(matches!(
            expect_ids(Value::Bool(true)),
            Err(OdooError::Transport(TransportError::UnexpectedResponse { .. }))
        ));
        assert!(expect_records(Value::Array(vec![Value::Int(1)])).is_err());
        assert!(expect_bool(Value::Bool(true)).unwrap());
    }
}
