/// Config schema types (discord account, channel routes, relay tuning, packet bridge).
use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Default Discord REST base, without trailing slash.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    pub discord: DiscordConfig,
    /// Channel routing table. Each entry may carry an outbound webhook, an
    /// inbound Discord channel ID, or both.
    pub channels: Vec<ChannelEntry>,
    pub relay: RelayConfig,
    pub limits: LimitsConfig,
    pub bridge: BridgeConfig,
}

/// Bot account used for the gateway connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Only one gateway session may use it at a time.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    /// REST API base used to build webhook URLs from `webhook_id`/`webhook_token`.
    pub api_base: String,
    /// Set to false to relay in-game chat to webhooks only, without a bot.
    pub gateway: bool,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            api_base: DEFAULT_API_BASE.into(),
            gateway: true,
        }
    }
}

impl DiscordConfig {
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

/// One row of the routing table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelEntry {
    /// In-game channel name, matched exactly (case-sensitive).
    pub ingame_channel: String,
    pub webhook_id: Option<String>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub webhook_token: Option<Secret<String>>,
    /// Full webhook URL; takes precedence over `webhook_id`/`webhook_token`.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub webhook_url: Option<Secret<String>>,
    /// Avatar shown next to relayed in-game messages.
    pub avatar_url: Option<String>,
    /// Discord channel whose messages are injected into `ingame_channel`.
    pub discord_channel_id: Option<String>,
}

impl ChannelEntry {
    /// Resolve the webhook URL for this entry, if it has one.
    pub fn webhook_url(&self, api_base: &str) -> Option<Secret<String>> {
        if let Some(url) = &self.webhook_url {
            return Some(url.clone());
        }
        match (&self.webhook_id, &self.webhook_token) {
            (Some(id), Some(token)) if !id.is_empty() && !token.expose_secret().is_empty() => {
                Some(Secret::new(format!(
                    "{}/webhooks/{}/{}",
                    api_base.trim_end_matches('/'),
                    id,
                    token.expose_secret()
                )))
            },
            _ => None,
        }
    }
}

/// Delivery and lifecycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Per-request timeout for webhook calls, covering DNS, TLS and response.
    pub request_timeout_secs: u64,
    /// Pending deliveries per channel before new messages are dropped.
    pub queue_capacity: usize,
    /// How long shutdown waits for the gateway task to exit.
    pub shutdown_timeout_secs: u64,
    /// Worker threads of the dedicated runtime used when embedded in a host.
    pub worker_threads: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            queue_capacity: 64,
            shutdown_timeout_secs: 5,
            worker_threads: 2,
        }
    }
}

/// Size bounds applied when formatting relayed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum webhook `content` length in characters (Discord: 2000).
    pub content_chars: usize,
    /// Maximum in-game display name length in bytes (NAME_LENGTH minus NUL).
    pub display_name_bytes: usize,
    /// Maximum in-game message body in bytes for injected messages.
    pub inbound_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            content_chars: 2000,
            display_name_bytes: 23,
            inbound_body_bytes: 249,
        }
    }
}

/// Standalone packet bridge, used when the relay runs outside the map server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Map server address that accepts relay packets (e.g. "127.0.0.1:5121").
    pub map_server: Option<String>,
    /// Local address accepting in-game chat packets from the map server.
    pub listen: Option<String>,
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
