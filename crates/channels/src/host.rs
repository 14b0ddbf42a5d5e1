use {async_trait::async_trait, serde::Serialize};

use crate::Result;

/// Handle to a live in-game channel, as returned by [`GameChannels::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRef {
    pub name: String,
}

impl ChannelRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The host's channel service.
///
/// The embedded build wires this to the map server's channel list; the
/// standalone build forwards `send` as relay packets over TCP.
#[async_trait]
pub trait GameChannels: Send + Sync {
    /// Look up a channel by exact name. `None` when the host has no such
    /// channel right now (deleted, not yet created).
    async fn search(&self, name: &str) -> Option<ChannelRef>;

    /// Broadcast `text` on `channel` as `author`.
    ///
    /// The host fires its channel-send post-hook for this message like any
    /// other, which is why `author` must already be tagged.
    async fn send(&self, channel: &ChannelRef, author: &str, text: &str) -> Result<()>;
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Lobby {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl GameChannels for Lobby {
        async fn search(&self, name: &str) -> Option<ChannelRef> {
            (name == "lobby").then(|| ChannelRef::new(name))
        }

        async fn send(&self, channel: &ChannelRef, author: &str, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((channel.name.clone(), author.into(), text.into()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn trait_object_dispatch() {
        let lobby = Lobby::default();
        let host: &dyn GameChannels = &lobby;
        assert!(host.search("main").await.is_none());
        let channel = host.search("lobby").await.unwrap();
        host.send(&channel, "<frank>", "hello").await.unwrap();
        assert_eq!(lobby.sent.lock().unwrap().as_slice(), &[(
            "lobby".to_string(),
            "<frank>".to_string(),
            "hello".to_string()
        )]);
    }
}
