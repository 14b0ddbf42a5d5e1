//! Configuration loading, validation and env substitution for the relay.
//!
//! Config files: `discord-echo.toml`, `discord-echo.yaml` or
//! `discord-echo.json`, searched in `./` then `~/.config/discord-echo/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all
//! string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod template;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config, write_template},
    schema::{BridgeConfig, ChannelEntry, DiscordConfig, EchoConfig, LimitsConfig, RelayConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
