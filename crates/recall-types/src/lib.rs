//! # recall-types
//!
//! Shared settings for the recall workspace.
//!
//! Settings are layered the same way for every consumer:
//! defaults -> config file -> environment (`RECALL_*`).

pub mod config;
pub mod error;

pub use config::{SearchSettings, Settings, StoreSettings};
pub use error::ConfigError;
