// odoo-common - Shared value model, protocol and record definitions
//
// This crate holds everything that does not touch the network: the XML-RPC
// value model, the execute_kw call convention, the error taxonomy and the
// schema-driven record mapper.

pub mod attachment;
pub mod error;
pub mod mapper;
pub mod models;
pub mod protocol;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use mapper::*;
pub use models::*;
pub use protocol::*;
pub use types::*;
