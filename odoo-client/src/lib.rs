//! # Odoo XML-RPC Client
//!
//! Purpose: Authenticate against an Odoo server once, then issue typed model
//! operations and batched parallel reads over XML-RPC.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `OdooClient` hides endpoints, payload layout and the
//!    wire codec.
//! 2. **Single Choke Point**: every model call goes through `Session::execute`.
//! 3. **Strategy Pattern**: transports sit behind the `Transport` trait so the
//!    HTTP carrier can be swapped in tests.
//! 4. **Protocol Clarity**: XML-RPC is encoded and parsed explicitly.

mod client;
mod fetch;
mod metrics;
mod session;
mod transport;
mod xmlrpc;

pub use client::{
    read_env_file, ClientConfig, OdooClient, ENV_DATABASE, ENV_PASSWORD, ENV_URL, ENV_USERNAME,
};
pub use fetch::{
    fetch_records, partition, CancelToken, FetchOptions, FetchSummary, RecordStream,
    DEFAULT_BATCH_SIZE,
};
pub use metrics::{CallMetrics, CallOutcome, LatencySnapshot, MetricsSnapshot};
pub use session::{fault_to_error, Credentials, Session};
pub use transport::{HttpTransport, Transport, TransportOptions};
pub use xmlrpc::{decode_response, encode_call, encode_value};
