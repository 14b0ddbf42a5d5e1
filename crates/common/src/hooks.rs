//! Host hook types.
//!
//! The game server exposes a handful of extension points to plugins: a
//! post-hook that fires after every successful channel send, and the two
//! lifecycle notifications around the server coming online and shutting
//! down. The host glue translates its native callbacks into
//! [`HookPayload`]s and hands them to a [`HookRegistry`]; relay code only
//! ever sees these types.

use std::{collections::HashMap, fmt, sync::Arc};

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
};

use crate::Error;

// ── HookEvent ───────────────────────────────────────────────────────────────

/// Host events that handlers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    /// Fired after the host delivered a message to an in-game channel.
    ChannelSend,
    /// The map server finished loading and is accepting players.
    ServerOnline,
    /// The map server is tearing down; handlers must release resources.
    ServerFinal,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl HookEvent {
    /// Events whose handlers are independent observers and may run
    /// concurrently. Lifecycle events run one handler at a time in priority
    /// order.
    pub fn is_fan_out(&self) -> bool {
        matches!(self, Self::ChannelSend)
    }
}

// ── HookPayload ─────────────────────────────────────────────────────────────

/// Payload carried with each hook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum HookPayload {
    ChannelSend {
        /// In-game channel name.
        channel: String,
        /// Display name of the sending character.
        author: String,
        text: String,
        /// `false` when the author session does not belong to a connected
        /// game client (host-internal or injected sessions).
        from_client: bool,
    },
    ServerOnline,
    ServerFinal,
}

impl HookPayload {
    /// Returns the [`HookEvent`] variant that matches this payload.
    pub fn event(&self) -> HookEvent {
        match self {
            Self::ChannelSend { .. } => HookEvent::ChannelSend,
            Self::ServerOnline => HookEvent::ServerOnline,
            Self::ServerFinal => HookEvent::ServerFinal,
        }
    }
}

// ── HookHandler trait ───────────────────────────────────────────────────────

#[async_trait]
pub trait HookHandler: Send + Sync {
    /// A human-readable name for this handler.
    fn name(&self) -> &str;

    /// Which events this handler subscribes to.
    fn events(&self) -> &[HookEvent];

    /// Priority for ordering. Higher values run first. Default is 0.
    fn priority(&self) -> i32 {
        0
    }

    async fn handle(&self, event: HookEvent, payload: &HookPayload) -> Result<()>;

    /// Synchronous entry point used when the host calls from its own event
    /// thread. The default blocks on [`HookHandler::handle`]; handlers on the
    /// chat hot path override it so the host thread never waits on I/O.
    fn handle_sync(&self, event: HookEvent, payload: &HookPayload) -> Result<()> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tokio::task::block_in_place(|| handle.block_on(self.handle(event, payload)))
            },
            Err(_) => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                rt.block_on(self.handle(event, payload))
            },
        }
    }
}

/// Result of dispatching one event. Failures are collected, never raised to
/// the host.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Handlers that were invoked.
    pub invoked: usize,
    pub failures: Vec<Error>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── HookRegistry ────────────────────────────────────────────────────────────

/// Registered hook handlers, keyed by event.
#[derive(Default)]
pub struct HookRegistry {
    handlers: HashMap<HookEvent, Vec<Arc<dyn HookHandler>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for all events it subscribes to.
    /// Handlers are sorted by priority (descending) within each event.
    pub fn register(&mut self, handler: Arc<dyn HookHandler>) {
        for &event in handler.events() {
            let handlers = self.handlers.entry(event).or_default();
            handlers.push(Arc::clone(&handler));
            handlers.sort_by_key(|h| std::cmp::Reverse(h.priority()));
        }
        info!(handler = handler.name(), "hook handler registered");
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Fan-out events run their handlers concurrently; lifecycle events run
    /// them one after another in priority order. Handler errors are logged
    /// and returned in the report.
    pub async fn dispatch(&self, payload: &HookPayload) -> DispatchReport {
        let event = payload.event();
        let Some(handlers) = self.handlers.get(&event).filter(|h| !h.is_empty()) else {
            return DispatchReport::default();
        };

        debug!(event = %event, count = handlers.len(), "dispatching hook event");

        let mut report = DispatchReport::default();
        if event.is_fan_out() {
            let futures = handlers.iter().map(|handler| async move {
                (handler.name(), handler.handle(event, payload).await)
            });
            report.invoked = handlers.len();
            for (name, result) in futures::future::join_all(futures).await {
                if let Err(e) = result {
                    warn!(handler = %name, event = %event, error = %e, "hook handler failed");
                    report.failures.push(Error::hook(name, e));
                }
            }
        } else {
            for handler in handlers {
                report.invoked += 1;
                if let Err(e) = handler.handle(event, payload).await {
                    warn!(handler = handler.name(), event = %event, error = %e, "hook handler failed");
                    report.failures.push(Error::hook(handler.name(), e));
                }
            }
        }
        report
    }

    /// Synchronous dispatch for the host's event thread.
    pub fn dispatch_sync(&self, payload: &HookPayload) -> DispatchReport {
        let event = payload.event();
        let Some(handlers) = self.handlers.get(&event).filter(|h| !h.is_empty()) else {
            return DispatchReport::default();
        };

        debug!(event = %event, count = handlers.len(), "dispatching hook event (sync)");

        let mut report = DispatchReport::default();
        for handler in handlers {
            report.invoked += 1;
            if let Err(e) = handler.handle_sync(event, payload) {
                warn!(handler = handler.name(), event = %event, error = %e, "hook handler failed (sync)");
                report.failures.push(Error::hook(handler.name(), e));
            }
        }
        report
    }
}
