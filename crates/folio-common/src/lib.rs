//! Folio Common - Shared Configuration and Errors
//!
//! Foundational types shared by the Folio crates: the runtime configuration
//! loaded by the command line runner and the error type used while loading it.
//!
//! Key Features:
//! - TOML-backed configuration with defaults for every field
//! - Unified error type for configuration and file access
//!
//! @version 0.1.0
//! @author Folio Development Team

pub mod config;
pub mod error;

pub use config::FolioConfig;
pub use error::{FolioError, Result};
