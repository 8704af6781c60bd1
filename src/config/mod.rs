//! Configuration module.
//!
//! Settings resolve through four layers, lowest first: built-in defaults, the
//! TOML config file, `PHOTOSCROLL_*` environment variables, and CLI flags.

pub mod loader;

pub use loader::{
    apply_cli_overrides, apply_env_overrides, default_config_path, default_log_path,
    default_token_store_path, load_config_file, load_config_with_precedence, merge_config,
    resolve, ConfigError, ConfigFile, ResolvedConfig,
};
