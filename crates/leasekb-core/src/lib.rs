//! # LeaseKB Core
//!
//! Shared building blocks for the LeaseKB workspace:
//! - [`error`]: the `KbError` taxonomy used by every library crate
//! - [`config`]: TOML configuration (`~/.leasekb/config.toml`)
//! - [`traits`]: collaborator seams (`Embedder`, `Completer`)

pub mod config;
pub mod error;
pub mod traits;

pub use config::KbConfig;
pub use error::{KbError, Result};

/// Opaque per-record metadata: string keys to arbitrary JSON values.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
