use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::EchoConfig,
    template::default_config_template,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "discord-echo.toml",
    "discord-echo.yaml",
    "discord-echo.yml",
    "discord-echo.json",
];

/// Environment variable that overrides `discord.token`.
pub const TOKEN_ENV: &str = "DISCORD_ECHO_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<EchoConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./discord-echo.{toml,yaml,yml,json}`
/// 2. `~/.config/discord-echo/discord-echo.{toml,yaml,yml,json}`
///
/// Returns `EchoConfig::default()` if no config file is found or it fails to
/// parse; a relay without routes simply drops everything.
pub fn discover_and_load() -> EchoConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    EchoConfig::default()
}

/// Apply process-environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut EchoConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut EchoConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
        debug!("discord token taken from {TOKEN_ENV}");
        config.discord.token = Secret::new(token);
    }
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/discord-echo/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "discord-echo").map(|d| d.config_dir().to_path_buf())
}

/// Write the documented default template to `path`.
///
/// Refuses to overwrite an existing file.
pub fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::Message(format!(
            "{} already exists, not overwriting",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, default_config_template())?;
    info!(path = %path.display(), "wrote default config");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> Result<EchoConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}
