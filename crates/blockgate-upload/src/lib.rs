//! Block upload pipeline for blockgate.
//!
//! Clients push a complete block in three steps: `start` records the
//! block's metadata, `put_file` stores each index and chunk file, and
//! `finish` either commits the block right away or hands it to a background
//! validation that commits it once the block proves sound.
//!
//! The state of an upload is never kept in memory. It is derived from the
//! objects under the block's prefix:
//!
//! | objects present                         | state        |
//! |-----------------------------------------|--------------|
//! | `meta.json`                             | `complete`   |
//! | none of the metadata objects            | `not-found`  |
//! | `uploading-meta.json` + fresh record    | `validating` / `failed` |
//! | `uploading-meta.json` otherwise         | `uploading`  |
//!
//! A validation record is fresh while its heartbeat is younger than the
//! configured timeout, so a validation whose process died is eventually
//! treated as an upload in progress again.
//!
//! - [`service`] -- [`BlockUploadService`], the operations themselves
//! - [`meta_validator`] -- sanitizing client-supplied metadata
//! - [`validator`] -- [`BlockValidator`], staging and verifying a block
//! - [`gate`] -- [`ValidationGate`], the cap on concurrent validations
//! - [`state`] -- state derivation and the query response

pub mod config;
pub mod error;
pub mod gate;
pub mod heartbeat;
pub mod limits;
pub mod meta_validator;
pub mod metrics;
pub mod records;
pub mod service;
pub mod state;
pub mod token;
pub mod validator;

#[cfg(test)]
mod testutil;

pub use config::{UploadConfig, MAX_META_SIZE_BYTES};
pub use error::{UploadError, UploadResult, ValidationError};
pub use gate::{ValidationGate, ValidationPermit};
pub use limits::{LimitsConfig, StaticTenantLimits, TenantLimits, TenantLimitsConfig};
pub use metrics::{TenantUploadStats, UploadMetrics};
pub use service::BlockUploadService;
pub use state::{BlockUploadState, BlockUploadStateResponse, ValidationRecord};
pub use token::request_id;
pub use validator::{BlockValidator, ValidationLimits};
