//! Discord event handler for serenity.
//!
//! [`RelayHandler`] turns gateway events into [`InboundEvent`]s and hands
//! them to the [`InboundListener`], which does the actual relaying and can be
//! driven without a gateway connection.

use std::sync::Arc;

use {
    serenity::{
        all::{Context, EventHandler, GatewayIntents, Message, Ready},
        async_trait,
    },
    tracing::{debug, info, warn},
};

use echo_channels::{
    ExternalChannelId, GameChannels, LoopGuard, RelayLimits, RelayMessage, RouteTable,
};

use crate::session::BotSession;

/// A Discord message, reduced to what the relay needs.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub channel_id: ExternalChannelId,
    pub author_name: String,
    /// Legacy four-digit discriminator; `None` for migrated usernames.
    pub discriminator: Option<u16>,
    pub author_is_bot: bool,
    pub content: String,
}

impl From<&Message> for InboundEvent {
    fn from(msg: &Message) -> Self {
        Self {
            channel_id: ExternalChannelId::from(msg.channel_id.get()),
            author_name: msg.author.name.clone(),
            discriminator: msg.author.discriminator.map(|d| d.get()),
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Injected,
    /// Bot or webhook author, including our own webhook posts.
    IgnoredBot,
    IgnoredEmpty,
    Unrouted,
    /// The host has no live channel by the routed name.
    UnknownChannel,
    SendFailed,
}

/// Discord-to-game relay.
pub struct InboundListener {
    routes: Arc<RouteTable>,
    game: Arc<dyn GameChannels>,
    session: Arc<BotSession>,
    guard: LoopGuard,
    limits: RelayLimits,
}

impl InboundListener {
    pub fn new(
        routes: Arc<RouteTable>,
        game: Arc<dyn GameChannels>,
        session: Arc<BotSession>,
        limits: RelayLimits,
    ) -> Self {
        Self {
            routes,
            game,
            session,
            guard: LoopGuard::new(limits.display_name_bytes),
            limits,
        }
    }

    pub fn session(&self) -> &Arc<BotSession> {
        &self.session
    }

    /// Gateway reported ready as `bot_name`.
    pub fn on_ready(&self, bot_name: &str) {
        if self.session.mark_ready(bot_name.to_string()) {
            info!(bot_name, "discord relay bot ready");
        } else {
            debug!(bot_name, status = ?self.session.status(), "ignoring ready event");
        }
    }

    pub async fn handle_message(&self, event: InboundEvent) -> InboundOutcome {
        if event.author_is_bot {
            return InboundOutcome::IgnoredBot;
        }
        if event.content.trim().is_empty() {
            debug!(channel_id = %event.channel_id, "ignoring message without text");
            return InboundOutcome::IgnoredEmpty;
        }

        let channel_name = match self.routes.resolve_inbound(&event.channel_id) {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "not relaying discord message");
                return InboundOutcome::Unrouted;
            },
        };

        let Some(channel) = self.game.search(channel_name).await else {
            warn!(channel = channel_name, "in-game channel not found, dropping message");
            return InboundOutcome::UnknownChannel;
        };

        let author = self
            .guard
            .tag_with_discriminator(&event.author_name, event.discriminator);
        let msg = match RelayMessage::inbound(channel_name, author, event.content)
            .bounded_for_game(&self.limits)
        {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping message");
                return InboundOutcome::IgnoredEmpty;
            },
        };

        match self
            .game
            .send(&channel, &msg.author_display_name, &msg.body)
            .await
        {
            Ok(()) => {
                debug!(
                    channel = %msg.source_channel,
                    author = %msg.author_display_name,
                    "relayed discord message"
                );
                InboundOutcome::Injected
            },
            Err(e) => {
                warn!(channel = %msg.source_channel, error = %e, "in-game send failed");
                InboundOutcome::SendFailed
            },
        }
    }
}

/// Handler for Discord gateway events.
pub struct RelayHandler {
    listener: Arc<InboundListener>,
}

impl RelayHandler {
    pub fn new(listener: Arc<InboundListener>) -> Self {
        Self { listener }
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        debug!(guilds = ready.guilds.len(), "discord gateway ready");
        self.listener.on_ready(&ready.user.name);
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let event = InboundEvent::from(&msg);
        let outcome = self.listener.handle_message(event).await;
        debug!(message_id = msg.id.get(), ?outcome, "discord message handled");
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {
        echo_channels::{ChannelRef, Error, Result},
        rstest::rstest,
        secrecy::Secret,
    };

    use {
        super::*,
        crate::session::SessionStatus,
    };

    #[derive(Default)]
    struct FakeGame {
        channels: Vec<&'static str>,
        fail_send: bool,
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl GameChannels for FakeGame {
        async fn search(&self, name: &str) -> Option<ChannelRef> {
            self.channels
                .iter()
                .any(|c| *c == name)
                .then(|| ChannelRef::new(name))
        }

        async fn send(&self, channel: &ChannelRef, author: &str, text: &str) -> Result<()> {
            if self.fail_send {
                return Err(Error::invalid_input("host refused"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel.name.clone(), author.into(), text.into()));
            Ok(())
        }
    }

    fn listener(game: Arc<FakeGame>) -> InboundListener {
        let routes = RouteTable::builder()
            .external("support", "123456789")
            .external("ghost", "555")
            .build()
            .unwrap();
        InboundListener::new(
            Arc::new(routes),
            game,
            Arc::new(BotSession::new(Secret::new("tok".into()))),
            RelayLimits::default(),
        )
    }

    fn event(channel_id: &str, author: &str, content: &str) -> InboundEvent {
        InboundEvent {
            channel_id: ExternalChannelId::from(channel_id),
            author_name: author.into(),
            discriminator: None,
            author_is_bot: false,
            content: content.into(),
        }
    }

    fn game() -> Arc<FakeGame> {
        Arc::new(FakeGame {
            channels: vec!["support"],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn injects_with_tagged_author() {
        let game = game();
        let l = listener(Arc::clone(&game));
        let outcome = l.handle_message(event("123456789", "grace", "need help")).await;
        assert_eq!(outcome, InboundOutcome::Injected);
        assert_eq!(game.sent.lock().unwrap().as_slice(), &[(
            "support".to_string(),
            "<grace>".to_string(),
            "need help".to_string()
        )]);
    }

    #[tokio::test]
    async fn bot_authors_never_injected() {
        let game = game();
        let l = listener(Arc::clone(&game));
        let mut ev = event("123456789", "relay-hook", "echo");
        ev.author_is_bot = true;
        assert_eq!(l.handle_message(ev).await, InboundOutcome::IgnoredBot);
        assert!(game.sent.lock().unwrap().is_empty());
    }

    #[rstest]
    #[case("999", "hi", InboundOutcome::Unrouted)]
    #[case("555", "hi", InboundOutcome::UnknownChannel)]
    #[case("123456789", "", InboundOutcome::IgnoredEmpty)]
    #[case("123456789", "  \n", InboundOutcome::IgnoredEmpty)]
    #[tokio::test]
    async fn dropped_events(
        #[case] channel_id: &str,
        #[case] content: &str,
        #[case] expected: InboundOutcome,
    ) {
        let game = game();
        let l = listener(Arc::clone(&game));
        assert_eq!(
            l.handle_message(event(channel_id, "grace", content)).await,
            expected
        );
        assert!(game.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_swallowed() {
        let game = Arc::new(FakeGame {
            channels: vec!["support"],
            fail_send: true,
            ..Default::default()
        });
        let l = listener(game);
        assert_eq!(
            l.handle_message(event("123456789", "grace", "hi")).await,
            InboundOutcome::SendFailed
        );
    }

    #[tokio::test]
    async fn long_bodies_and_names_are_bounded() {
        let game = game();
        let l = listener(Arc::clone(&game));
        let mut ev = event("123456789", &"n".repeat(40), &"b".repeat(500));
        ev.discriminator = Some(1234);
        l.handle_message(ev).await;
        let sent = game.sent.lock().unwrap();
        let (_, author, body) = &sent[0];
        assert_eq!(author.len(), 23);
        assert!(author.starts_with('<') && author.ends_with("#1234>"));
        assert_eq!(body.len(), 249);
    }

    #[test]
    fn ready_records_identity() {
        let l = listener(game());
        l.session().set_status(SessionStatus::Connecting);
        l.on_ready("relay-bot");
        assert_eq!(l.session().status(), SessionStatus::Ready);
        assert_eq!(l.session().identity().as_deref(), Some("relay-bot"));
    }

    #[test]
    fn intents_cover_message_content() {
        let intents = RelayHandler::intents();
        assert!(intents.contains(GatewayIntents::GUILD_MESSAGES));
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
    }
}
