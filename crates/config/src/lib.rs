//! Configuration loading, validation and env substitution.
//!
//! Config files: `hublink.toml`, `hublink.yaml`, or `hublink.json`
//! Searched in `./` then `~/.config/hublink/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        AntiSpamConfig, BlockWordsConfig, CacheConfig, ContentConfig, DatabaseConfig,
        HublinkConfig, MetricsConfig, RelayConfig, StaffConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
