//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration from the XDG config
//! directory (or an explicit path) and falls back to defaults when the file
//! does not exist yet.

pub mod config;
