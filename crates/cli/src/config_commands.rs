use std::path::{Path, PathBuf};

use anyhow::Result;

use echo_config::validate::{self, Severity};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the config file and print diagnostics. Exits 1 on errors.
pub fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(path);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Where `init` writes when no path is given.
pub fn default_init_path() -> PathBuf {
    echo_config::config_dir()
        .map(|dir| dir.join("discord-echo.toml"))
        .unwrap_or_else(|| PathBuf::from("discord-echo.toml"))
}

/// Write the documented default config.
pub fn init(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(default_init_path);
    echo_config::write_template(&path)?;
    eprintln!("Wrote {}", path.display());
    eprintln!("Add your bot token and [[channels]] entries, then run `discord-echo check`.");
    Ok(())
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_loadable_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discord-echo.toml");
        init(Some(path.clone())).unwrap();
        assert!(echo_config::load_config(&path).is_ok());
        assert!(init(Some(path)).is_err());
    }

    #[test]
    fn default_path_is_a_toml_file() {
        assert!(default_init_path().ends_with("discord-echo.toml"));
    }
}
