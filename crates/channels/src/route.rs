//! Bidirectional routing between in-game channels and Discord.
//!
//! The table is built once, at configuration load, and never mutated while
//! the relay runs; share it behind an `Arc` and read it from any thread.

use std::{collections::HashMap, fmt};

use {
    echo_config::EchoConfig,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{Error, Result};

/// A webhook endpoint for one in-game channel.
#[derive(Clone)]
pub struct WebhookTarget {
    url: Secret<String>,
    avatar_url: Option<String>,
}

impl WebhookTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Secret::new(url.into()),
            avatar_url: None,
        }
    }

    pub fn from_secret(url: Secret<String>) -> Self {
        Self {
            url,
            avatar_url: None,
        }
    }

    #[must_use]
    pub fn with_avatar(mut self, avatar_url: Option<String>) -> Self {
        self.avatar_url = avatar_url.filter(|u| !u.is_empty());
        self
    }

    /// Full webhook URL, including the token. Never log this.
    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }
}

impl fmt::Debug for WebhookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookTarget")
            .field("url", &"[REDACTED]")
            .field("avatar_url", &self.avatar_url)
            .finish()
    }
}

/// Platform-assigned channel identifier (a Discord snowflake in decimal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalChannelId(String);

impl ExternalChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ExternalChannelId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ExternalChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ExternalChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a channel's messages go (outbound) or come from (inbound).
#[derive(Debug, Clone)]
pub enum Destination {
    Webhook(WebhookTarget),
    External(ExternalChannelId),
}

/// One routing entry.
#[derive(Debug, Clone)]
pub struct ChannelRoute {
    pub in_game_channel: String,
    pub destination: Destination,
}

/// Immutable lookup tables for both relay directions.
#[derive(Debug, Default)]
pub struct RouteTable {
    outbound: HashMap<String, WebhookTarget>,
    inbound: HashMap<ExternalChannelId, String>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// Build the table from the `[[channels]]` section.
    pub fn from_config(config: &EchoConfig) -> Result<Self> {
        let mut builder = Self::builder();
        for entry in &config.channels {
            if let Some(url) = entry.webhook_url(&config.discord.api_base) {
                builder = builder.route(ChannelRoute {
                    in_game_channel: entry.ingame_channel.clone(),
                    destination: Destination::Webhook(
                        WebhookTarget::from_secret(url).with_avatar(entry.avatar_url.clone()),
                    ),
                });
            }
            if let Some(id) = &entry.discord_channel_id {
                builder = builder.route(ChannelRoute {
                    in_game_channel: entry.ingame_channel.clone(),
                    destination: Destination::External(ExternalChannelId::new(id.trim())),
                });
            }
        }
        builder.build()
    }

    /// Webhook for an in-game channel. Exact, case-sensitive match.
    pub fn resolve_outbound(&self, channel_name: &str) -> Result<&WebhookTarget> {
        self.outbound
            .get(channel_name)
            .ok_or_else(|| Error::outbound_route(channel_name))
    }

    /// In-game channel fed by an external channel.
    pub fn resolve_inbound(&self, external_id: &ExternalChannelId) -> Result<&str> {
        self.inbound
            .get(external_id)
            .map(String::as_str)
            .ok_or_else(|| Error::inbound_route(external_id.as_str()))
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.inbound.is_empty()
    }
}

/// Collects routes and checks per-direction uniqueness on [`build`](Self::build).
///
/// A hardcoded table is just a builder with literal entries.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    routes: Vec<ChannelRoute>,
}

impl RouteTableBuilder {
    #[must_use]
    pub fn route(mut self, route: ChannelRoute) -> Self {
        self.routes.push(route);
        self
    }

    #[must_use]
    pub fn webhook(self, channel: impl Into<String>, target: WebhookTarget) -> Self {
        self.route(ChannelRoute {
            in_game_channel: channel.into(),
            destination: Destination::Webhook(target),
        })
    }

    #[must_use]
    pub fn external(self, channel: impl Into<String>, id: impl Into<ExternalChannelId>) -> Self {
        self.route(ChannelRoute {
            in_game_channel: channel.into(),
            destination: Destination::External(id.into()),
        })
    }

    pub fn build(self) -> Result<RouteTable> {
        let mut table = RouteTable::default();
        for route in self.routes {
            if route.in_game_channel.is_empty() {
                return Err(Error::invalid_input("route with empty in-game channel name"));
            }
            match route.destination {
                Destination::Webhook(target) => {
                    if table.outbound.contains_key(&route.in_game_channel) {
                        return Err(Error::invalid_input(format!(
                            "duplicate webhook route for channel {}",
                            route.in_game_channel
                        )));
                    }
                    table.outbound.insert(route.in_game_channel, target);
                },
                Destination::External(id) => {
                    if table.inbound.contains_key(&id) {
                        return Err(Error::invalid_input(format!(
                            "external channel {id} is mapped more than once"
                        )));
                    }
                    table.inbound.insert(id, route.in_game_channel);
                },
            }
        }
        debug!(
            outbound = table.outbound.len(),
            inbound = table.inbound.len(),
            "route table built"
        );
        Ok(table)
    }
}
