use {
    echo_config::LimitsConfig,
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result};

/// Which way a message travels through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// In-game channel to Discord webhook.
    Outbound,
    /// Discord channel to in-game channel.
    Inbound,
}

/// Size bounds enforced on relayed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayLimits {
    /// Webhook `content` limit, in characters.
    pub content_chars: usize,
    /// In-game display name limit, in bytes.
    pub display_name_bytes: usize,
    /// In-game message body limit, in bytes.
    pub inbound_body_bytes: usize,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self::from(LimitsConfig::default())
    }
}

impl From<LimitsConfig> for RelayLimits {
    fn from(cfg: LimitsConfig) -> Self {
        Self {
            content_chars: cfg.content_chars,
            display_name_bytes: cfg.display_name_bytes,
            inbound_body_bytes: cfg.inbound_body_bytes,
        }
    }
}

/// One chat message on its way through the relay.
///
/// Created per event and moved into whatever task delivers it; no two
/// deliveries ever share one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub source_channel: String,
    pub author_display_name: String,
    pub body: String,
    pub direction: Direction,
}

impl RelayMessage {
    pub fn outbound(
        channel: impl Into<String>,
        author: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            source_channel: channel.into(),
            author_display_name: author.into(),
            body: body.into(),
            direction: Direction::Outbound,
        }
    }

    pub fn inbound(
        channel: impl Into<String>,
        author: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            source_channel: channel.into(),
            author_display_name: author.into(),
            body: body.into(),
            direction: Direction::Inbound,
        }
    }

    /// Bound the body for a webhook post. Empty bodies are rejected.
    pub fn bounded_for_webhook(mut self, limits: &RelayLimits) -> Result<Self> {
        if self.body.trim().is_empty() {
            return Err(Error::invalid_input(format!(
                "empty message body from {} in {}",
                self.author_display_name, self.source_channel
            )));
        }
        truncate_chars(&mut self.body, limits.content_chars);
        Ok(self)
    }

    /// Bound the body for injection into an in-game channel.
    pub fn bounded_for_game(mut self, limits: &RelayLimits) -> Result<Self> {
        if self.body.trim().is_empty() {
            return Err(Error::invalid_input(format!(
                "empty message body from {} for {}",
                self.author_display_name, self.source_channel
            )));
        }
        truncate_bytes(&mut self.body, limits.inbound_body_bytes);
        Ok(self)
    }
}

/// Shorten `s` to at most `max` characters. Returns whether it was cut.
pub fn truncate_chars(s: &mut String, max: usize) -> bool {
    match s.char_indices().nth(max) {
        Some((idx, _)) => {
            s.truncate(idx);
            true
        },
        None => false,
    }
}

/// Shorten `s` to at most `max` bytes without splitting a character.
pub fn truncate_bytes(s: &mut String, max: usize) -> bool {
    if s.len() <= max {
        return false;
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    s.truncate(idx);
    true
}
