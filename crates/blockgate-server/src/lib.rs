//! HTTP server for blockgate.
//!
//! Exposes the block upload API over axum. The tenant of every upload
//! request is taken from the `X-Scope-OrgID` header; errors are answered as
//! a single line of plain text.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{ServerConfig, StorageConfig};
pub use error::{ApiError, ServerError, ServerResult};
pub use handler::TENANT_HEADER;
pub use router::build_router;
pub use server::BlockgateServer;
