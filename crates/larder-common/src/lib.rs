//! Larder Common Library
//!
//! Shared error type and logging setup for the Larder workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `LarderError` and the `Result` alias used for
//!   configuration and other cross-crate failures
//! - **Logging**: `tracing` subscriber initialization driven by `LOG_*`
//!   environment variables
//!
//! # Example
//!
//! ```no_run
//! use larder_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{LarderError, Result};
