//! Wires the relay together and sequences its lifecycle.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    echo_common::hooks::{HookEvent, HookHandler, HookPayload, HookRegistry},
    tokio::task::JoinHandle,
    tracing::{debug, error, info, warn},
};

use {
    echo_channels::{GameChannels, RelayLimits, RelayMessage, Result, RouteTable},
    echo_config::EchoConfig,
    echo_discord::{
        BotSession, DispatchOutcome, DispatcherOptions, InboundListener, OutboundDispatcher,
        gateway,
    },
};

use crate::runtime::RelayRuntime;

/// Owns every relay component. One per process.
pub struct RelayOrchestrator {
    routes: Arc<RouteTable>,
    dispatcher: Arc<OutboundDispatcher>,
    listener: Arc<InboundListener>,
    runtime: RelayRuntime,
    gateway_enabled: bool,
    shutdown_timeout: Duration,
    gateway_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl RelayOrchestrator {
    pub fn new(
        config: &EchoConfig,
        game: Arc<dyn GameChannels>,
        runtime: RelayRuntime,
    ) -> Result<Self> {
        let routes = Arc::new(RouteTable::from_config(config)?);
        let dispatcher = Arc::new(OutboundDispatcher::new(
            Arc::clone(&routes),
            DispatcherOptions::from(config),
            runtime.handle(),
        )?);
        let session = Arc::new(BotSession::new(config.discord.token.clone()));
        let listener = Arc::new(InboundListener::new(
            Arc::clone(&routes),
            game,
            session,
            RelayLimits::from(config.limits),
        ));
        info!(
            outbound_routes = routes.outbound_len(),
            inbound_routes = routes.inbound_len(),
            gateway = config.discord.gateway,
            "relay configured"
        );
        Ok(Self {
            routes,
            dispatcher,
            listener,
            runtime,
            gateway_enabled: config.discord.gateway,
            shutdown_timeout: Duration::from_secs(config.relay.shutdown_timeout_secs),
            gateway_task: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn dispatcher(&self) -> &Arc<OutboundDispatcher> {
        &self.dispatcher
    }

    pub fn listener(&self) -> &Arc<InboundListener> {
        &self.listener
    }

    pub fn session(&self) -> &Arc<BotSession> {
        self.listener.session()
    }

    pub fn runtime(&self) -> &RelayRuntime {
        &self.runtime
    }

    /// Register the channel-send post-hook and the lifecycle hook.
    pub fn install(self: &Arc<Self>, registry: &mut HookRegistry) {
        registry.register(Arc::new(ChannelSendHook {
            dispatcher: Arc::clone(&self.dispatcher),
        }));
        registry.register(Arc::new(LifecycleHook {
            relay: Arc::clone(self),
        }));
    }

    /// Spawn the gateway lifecycle on the relay runtime. Only the first call
    /// does anything.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("relay already started");
            return false;
        }
        if !self.gateway_enabled {
            info!("discord gateway disabled, relaying game chat to webhooks only");
            return true;
        }

        let listener = Arc::clone(&self.listener);
        let task = self.runtime.handle().spawn(async move {
            match gateway::start(listener).await {
                Ok(run_loop) => {
                    if let Err(e) = run_loop.await {
                        warn!(error = %e, "gateway run loop panicked");
                    }
                },
                Err(e) => error!(error = %e, "discord gateway not started"),
            }
        });
        *self.gateway_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        true
    }

    /// Disconnect the gateway and flush pending webhook deliveries. Only the
    /// first call does anything.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            debug!("relay already stopped");
            return;
        }
        info!("stopping relay");

        let task = self
            .gateway_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            gateway::stop(&self.listener, task, self.shutdown_timeout).await;
        }

        if !self.dispatcher.drain(self.shutdown_timeout).await {
            warn!("webhook deliveries still in flight at shutdown");
        }
        self.dispatcher.log_stats();
    }

    /// Blocking [`shutdown`](Self::shutdown) for the host thread.
    pub fn stop(&self) {
        self.runtime.block_on(self.shutdown());
    }
}

/// Forwards in-game chat to the dispatcher.
struct ChannelSendHook {
    dispatcher: Arc<OutboundDispatcher>,
}

impl ChannelSendHook {
    fn relay(&self, payload: &HookPayload) {
        let HookPayload::ChannelSend {
            channel,
            author,
            text,
            from_client,
        } = payload
        else {
            return;
        };
        if !from_client {
            debug!(channel = %channel, author = %author, "skipping message from non-client session");
            return;
        }
        let outcome = self
            .dispatcher
            .dispatch(RelayMessage::outbound(channel, author, text));
        if outcome != DispatchOutcome::Queued {
            debug!(channel = %channel, ?outcome, "message not relayed");
        }
    }
}

#[async_trait]
impl HookHandler for ChannelSendHook {
    fn name(&self) -> &str {
        "discord-relay"
    }

    fn events(&self) -> &[HookEvent] {
        &[HookEvent::ChannelSend]
    }

    async fn handle(&self, _event: HookEvent, payload: &HookPayload) -> anyhow::Result<()> {
        self.relay(payload);
        Ok(())
    }

    fn handle_sync(&self, _event: HookEvent, payload: &HookPayload) -> anyhow::Result<()> {
        self.relay(payload);
        Ok(())
    }
}

/// Starts the relay when the server comes online, stops it at teardown.
struct LifecycleHook {
    relay: Arc<RelayOrchestrator>,
}

#[async_trait]
impl HookHandler for LifecycleHook {
    fn name(&self) -> &str {
        "discord-relay-lifecycle"
    }

    fn events(&self) -> &[HookEvent] {
        &[HookEvent::ServerOnline, HookEvent::ServerFinal]
    }

    async fn handle(&self, event: HookEvent, _payload: &HookPayload) -> anyhow::Result<()> {
        match event {
            HookEvent::ServerOnline => {
                self.relay.start();
            },
            HookEvent::ServerFinal => self.relay.shutdown().await,
            HookEvent::ChannelSend => {},
        }
        Ok(())
    }

    fn handle_sync(&self, event: HookEvent, _payload: &HookPayload) -> anyhow::Result<()> {
        match event {
            HookEvent::ServerOnline => {
                self.relay.start();
            },
            HookEvent::ServerFinal => self.relay.stop(),
            HookEvent::ChannelSend => {},
        }
        Ok(())
    }
}
