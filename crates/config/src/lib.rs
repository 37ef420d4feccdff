//! Configuration loading, validation, and env substitution for the realtime
//! subscription layer.
//!
//! Config files: `rally.toml`, `rally.yaml`, or `rally.json`
//! Searched in `./` then `~/.config/rally/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{BackoffConfig, RealtimeConfig, TransportConfig},
    validate::{Diagnostic, Severity, validate},
};
