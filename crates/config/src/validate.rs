//! Configuration validation engine.
//!
//! Checks a config file against the known schema, detects unknown or
//! misspelled fields, and flags routing entries the relay would not be able
//! to use.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use secrecy::ExposeSecret;

use crate::schema::{EchoConfig, LimitsConfig};

/// Discord rejects webhook messages longer than this many characters.
const DISCORD_CONTENT_LIMIT: usize = 2000;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "route", "discord",
    /// "limits", "bridge", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "channels[1].webhook_id"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

fn push(
    diagnostics: &mut Vec<Diagnostic>,
    severity: Severity,
    category: &'static str,
    path: impl Into<String>,
    message: impl Into<String>,
) {
    diagnostics.push(Diagnostic {
        severity,
        category,
        path: path.into(),
        message: message.into(),
    });
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Array(Box<KnownKeys>),
    Leaf,
}

/// Mirrors every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Array, Leaf, Struct};

    let channel_entry = Struct(HashMap::from([
        ("ingame_channel", Leaf),
        ("webhook_id", Leaf),
        ("webhook_token", Leaf),
        ("webhook_url", Leaf),
        ("avatar_url", Leaf),
        ("discord_channel_id", Leaf),
    ]));

    Struct(HashMap::from([
        (
            "discord",
            Struct(HashMap::from([
                ("token", Leaf),
                ("api_base", Leaf),
                ("gateway", Leaf),
            ])),
        ),
        ("channels", Array(Box::new(channel_entry))),
        (
            "relay",
            Struct(HashMap::from([
                ("request_timeout_secs", Leaf),
                ("queue_capacity", Leaf),
                ("shutdown_timeout_secs", Leaf),
                ("worker_threads", Leaf),
            ])),
        ),
        (
            "limits",
            Struct(HashMap::from([
                ("content_chars", Leaf),
                ("display_name_bytes", Leaf),
                ("inbound_body_bytes", Leaf),
            ])),
        ),
        (
            "bridge",
            Struct(HashMap::from([("map_server", Leaf), ("listen", Leaf)])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance`, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered default
/// location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|e| e == "toml");

    let mut result = if is_toml {
        match std::fs::read_to_string(actual_path) {
            Ok(content) => validate_toml_str(&crate::env_subst::substitute_env(&content)),
            Err(e) => ValidationResult {
                diagnostics: vec![Diagnostic {
                    severity: Severity::Error,
                    category: "syntax",
                    path: String::new(),
                    message: format!("failed to read config file: {e}"),
                }],
                config_path: None,
            },
        }
    } else {
        // YAML/JSON: no field-level walk, only parse + semantic checks.
        let mut diagnostics = Vec::new();
        match crate::loader::load_config(actual_path) {
            Ok(config) => check_semantics(&config, &mut diagnostics),
            Err(e) => push(&mut diagnostics, Severity::Error, "syntax", "", e.to_string()),
        }
        ValidationResult {
            diagnostics,
            config_path: None,
        }
    };
    result.config_path = Some(actual_path.clone());
    result
}

/// Validate a TOML string without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            push(
                &mut diagnostics,
                Severity::Error,
                "syntax",
                "",
                format!("TOML syntax error: {e}"),
            );
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&toml_value, &build_schema_map(), "", &mut diagnostics);

    match toml::from_str::<EchoConfig>(toml_str) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => push(
            &mut diagnostics,
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        ),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (toml::Value::Table(table), KnownKeys::Struct(fields)) => {
            let known_keys: Vec<&str> = fields.keys().copied().collect();
            for (key, child_value) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child_value, child_schema, &path, diagnostics);
                    continue;
                }
                let msg = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                push(diagnostics, Severity::Error, "unknown-field", path, msg);
            }
        },
        (toml::Value::Array(arr), KnownKeys::Array(item_schema)) => {
            for (i, item) in arr.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                check_unknown_fields(item, item_schema, &path, diagnostics);
            }
        },
        // Leaf or type mismatch; type errors are caught by deserialization.
        _ => {},
    }
}

fn is_snowflake(s: &str) -> bool {
    !s.is_empty() && s.len() <= 20 && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_host_port(s: &str) -> bool {
    s.rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

/// Run semantic checks on a successfully parsed config.
fn check_semantics(config: &EchoConfig, diagnostics: &mut Vec<Diagnostic>) {
    check_discord(config, diagnostics);
    check_routes(config, diagnostics);
    check_limits(&config.limits, diagnostics);

    if config.relay.queue_capacity == 0 {
        push(
            diagnostics,
            Severity::Error,
            "limits",
            "relay.queue_capacity",
            "queue capacity must be at least 1",
        );
    }
    if config.relay.request_timeout_secs == 0 {
        push(
            diagnostics,
            Severity::Warning,
            "limits",
            "relay.request_timeout_secs",
            "a zero timeout makes every webhook call fail",
        );
    }

    for (field, value) in [
        ("bridge.map_server", &config.bridge.map_server),
        ("bridge.listen", &config.bridge.listen),
    ] {
        if let Some(addr) = value
            && !is_host_port(addr)
        {
            push(
                diagnostics,
                Severity::Error,
                "bridge",
                field,
                format!("expected host:port, got \"{addr}\""),
            );
        }
    }
}

fn check_discord(config: &EchoConfig, diagnostics: &mut Vec<Diagnostic>) {
    let token = config.discord.token.expose_secret();
    if config.discord.gateway && !config.discord.has_token() {
        push(
            diagnostics,
            Severity::Warning,
            "discord",
            "discord.token",
            "no bot token; Discord messages will not reach the game",
        );
    } else if token.contains("${") {
        push(
            diagnostics,
            Severity::Warning,
            "discord",
            "discord.token",
            "token contains an unresolved ${...} placeholder",
        );
    }

    if url::Url::parse(&config.discord.api_base).is_err() {
        push(
            diagnostics,
            Severity::Error,
            "discord",
            "discord.api_base",
            "not a valid URL",
        );
    }
}

fn check_routes(config: &EchoConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.channels.is_empty() {
        push(
            diagnostics,
            Severity::Warning,
            "route",
            "channels",
            "no channels configured; nothing will be relayed",
        );
        return;
    }

    let mut outbound_seen = HashSet::new();
    let mut inbound_seen = HashSet::new();

    for (i, entry) in config.channels.iter().enumerate() {
        let base = format!("channels[{i}]");

        if entry.ingame_channel.is_empty() {
            push(
                diagnostics,
                Severity::Error,
                "route",
                format!("{base}.ingame_channel"),
                "in-game channel name is required",
            );
        }

        let has_id = entry.webhook_id.is_some();
        let has_token = entry.webhook_token.is_some();
        if entry.webhook_url.is_none() && has_id != has_token {
            push(
                diagnostics,
                Severity::Error,
                "route",
                &base,
                "webhook_id and webhook_token must be given together",
            );
        }
        if let Some(id) = &entry.webhook_id
            && !is_snowflake(id)
        {
            push(
                diagnostics,
                Severity::Error,
                "route",
                format!("{base}.webhook_id"),
                format!("\"{id}\" is not a numeric Discord ID"),
            );
        }
        if let Some(url) = &entry.webhook_url {
            let ok = url::Url::parse(url.expose_secret())
                .is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
            if !ok {
                push(
                    diagnostics,
                    Severity::Error,
                    "route",
                    format!("{base}.webhook_url"),
                    "not a valid http(s) URL",
                );
            }
        }
        let channel_id = entry.discord_channel_id.as_deref().map(str::trim);
        if let Some(id) = channel_id
            && !is_snowflake(id)
        {
            push(
                diagnostics,
                Severity::Error,
                "route",
                format!("{base}.discord_channel_id"),
                format!("\"{id}\" is not a numeric Discord ID"),
            );
        }

        let outbound = entry.webhook_url(&config.discord.api_base).is_some();
        let inbound = channel_id.is_some();
        if !outbound && !inbound {
            push(
                diagnostics,
                Severity::Warning,
                "route",
                &base,
                format!(
                    "channel \"{}\" has neither a webhook nor a discord_channel_id",
                    entry.ingame_channel
                ),
            );
        }
        if outbound && !outbound_seen.insert(entry.ingame_channel.as_str()) {
            push(
                diagnostics,
                Severity::Error,
                "route",
                format!("{base}.ingame_channel"),
                format!(
                    "channel \"{}\" already has a webhook route",
                    entry.ingame_channel
                ),
            );
        }
        if let Some(id) = channel_id
            && !inbound_seen.insert(id)
        {
            push(
                diagnostics,
                Severity::Error,
                "route",
                format!("{base}.discord_channel_id"),
                format!("discord channel {id} is mapped more than once"),
            );
        }
        if entry.ingame_channel.starts_with('<') {
            push(
                diagnostics,
                Severity::Warning,
                "route",
                format!("{base}.ingame_channel"),
                "channel names starting with '<' look like relayed author tags",
            );
        }
    }
}

fn check_limits(limits: &LimitsConfig, diagnostics: &mut Vec<Diagnostic>) {
    if limits.content_chars == 0 || limits.content_chars > DISCORD_CONTENT_LIMIT {
        push(
            diagnostics,
            Severity::Error,
            "limits",
            "limits.content_chars",
            format!("must be between 1 and {DISCORD_CONTENT_LIMIT}"),
        );
    }
    if limits.display_name_bytes < 3 {
        push(
            diagnostics,
            Severity::Error,
            "limits",
            "limits.display_name_bytes",
            "must leave room for the <name> tag (at least 3)",
        );
    }
    if limits.inbound_body_bytes == 0 {
        push(
            diagnostics,
            Severity::Error,
            "limits",
            "limits.inbound_body_bytes",
            "must be at least 1",
        );
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(result: &'a ValidationResult, path: &str) -> Option<&'a Diagnostic> {
        result.diagnostics.iter().find(|d| d.path == path)
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("token", "tokn"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn empty_config_has_no_errors() {
        let result = validate_toml_str("");
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert!(result.count(Severity::Warning) >= 1);
    }

    #[test]
    fn unknown_top_level_key_with_suggestion() {
        let result = validate_toml_str("[discrod]\ntoken = \"x\"\n");
        let d = find(&result, "discrod").unwrap();
        assert_eq!(d.category, "unknown-field");
        assert!(d.message.contains("did you mean \"discord\""));
    }

    #[test]
    fn unknown_field_inside_channel_entry() {
        let toml = r#"
[[channels]]
ingame_channel = "main"
webhook_urll = "http://localhost/hook"
"#;
        let result = validate_toml_str(toml);
        let d = find(&result, "channels[0].webhook_urll").unwrap();
        assert!(d.message.contains("webhook_url"));
    }

    #[test]
    fn full_valid_config_has_no_errors() {
        let toml = r#"
[discord]
token = "bot-token"

[[channels]]
ingame_channel = "main"
webhook_id = "1205170163368984597"
webhook_token = "secret"
discord_channel_id = "1205170163368984597"

[[channels]]
ingame_channel = "trade"
webhook_url = "https://discord.com/api/webhooks/1/abc"
discord_channel_id = "1205170179923775550"

[bridge]
map_server = "127.0.0.1:5121"
listen = "127.0.0.1:5122"
"#;
        let result = validate_toml_str(toml);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 0, "{:?}", result.diagnostics);
    }

    #[test]
    fn duplicate_routes_are_errors() {
        let toml = r#"
[discord]
token = "t"

[[channels]]
ingame_channel = "main"
webhook_url = "https://discord.com/api/webhooks/1/a"
discord_channel_id = "123"

[[channels]]
ingame_channel = "main"
webhook_url = "https://discord.com/api/webhooks/2/b"
discord_channel_id = "123"
"#;
        let result = validate_toml_str(toml);
        assert!(find(&result, "channels[1].ingame_channel").is_some());
        assert!(find(&result, "channels[1].discord_channel_id").is_some());
        assert_eq!(result.count(Severity::Error), 2);
    }

    #[test]
    fn half_configured_webhook_is_error() {
        let toml = r#"
[[channels]]
ingame_channel = "main"
webhook_id = "42"
"#;
        let result = validate_toml_str(toml);
        let d = find(&result, "channels[0]").unwrap();
        assert_eq!(d.severity, Severity::Error);
    }

    #[test]
    fn non_numeric_channel_id_is_error() {
        let toml = r#"
[[channels]]
ingame_channel = "support"
discord_channel_id = "support-room"
"#;
        let result = validate_toml_str(toml);
        assert!(find(&result, "channels[0].discord_channel_id").is_some());
    }

    #[test]
    fn padded_channel_id_is_accepted_and_deduplicated() {
        let toml = r#"
[discord]
token = "t"

[[channels]]
ingame_channel = "main"
discord_channel_id = " 22 "

[[channels]]
ingame_channel = "trade"
discord_channel_id = "22"
"#;
        let result = validate_toml_str(toml);
        assert_eq!(result.count(Severity::Error), 1, "{:?}", result.diagnostics);
        let d = find(&result, "channels[1].discord_channel_id").unwrap();
        assert!(d.message.contains("mapped more than once"));
    }

    #[test]
    fn zero_queue_capacity_is_error() {
        let result = validate_toml_str("[relay]\nqueue_capacity = 0\n");
        assert!(find(&result, "relay.queue_capacity").is_some());
        assert!(result.has_errors());
    }

    #[test]
    fn content_limit_above_platform_max_is_error() {
        let result = validate_toml_str("[limits]\ncontent_chars = 4000\n");
        assert!(find(&result, "limits.content_chars").is_some());
    }

    #[test]
    fn bad_bridge_address_is_error() {
        let result = validate_toml_str("[bridge]\nmap_server = \"localhost\"\n");
        assert!(find(&result, "bridge.map_server").is_some());
    }

    #[test]
    fn type_error_detected() {
        let result = validate_toml_str("[relay]\nqueue_capacity = \"many\"\n");
        assert!(result.diagnostics.iter().any(|d| d.category == "type-error"));
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("this is not valid toml [[[");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic {
            severity: Severity::Warning,
            category: "route",
            path: "channels[0]".into(),
            message: "no destination".into(),
        };
        assert_eq!(d.to_string(), "warning [route] channels[0]: no destination");
    }
}
