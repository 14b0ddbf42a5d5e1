use std::{sync::Arc, time::Duration};

use {
    anyhow::{Result, bail},
    tokio::runtime::Handle,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use {
    echo_channels::{RelayMessage, RouteTable},
    echo_common::hooks::{HookPayload, HookRegistry},
    echo_config::EchoConfig,
    echo_discord::{DispatchOutcome, DispatcherOptions, OutboundDispatcher},
    echo_relay::{
        PacketForwarder, PacketListener, RelayOrchestrator, RelayRuntime,
        bridge::DEFAULT_MAP_SERVER,
    },
};

/// Run the relay as a standalone process next to the map server until
/// Ctrl-C.
pub async fn run(config: EchoConfig) -> Result<()> {
    let map_server = config
        .bridge
        .map_server
        .clone()
        .unwrap_or_else(|| DEFAULT_MAP_SERVER.to_string());
    let game = Arc::new(PacketForwarder::new(
        map_server.as_str(),
        Duration::from_secs(config.relay.request_timeout_secs),
    ));
    let relay = Arc::new(RelayOrchestrator::new(
        &config,
        game,
        RelayRuntime::shared(Handle::current()),
    )?);

    let mut registry = HookRegistry::new();
    relay.install(&mut registry);
    let registry = Arc::new(registry);

    let cancel = CancellationToken::new();
    let bridge = match &config.bridge.listen {
        Some(addr) => {
            let listener = PacketListener::bind(addr).await?;
            Some(tokio::spawn(
                listener.run(Arc::clone(&registry), cancel.clone()),
            ))
        },
        None => {
            warn!("bridge.listen not set, in-game chat will not reach Discord");
            None
        },
    };

    info!(map_server = %map_server, "relay running, press Ctrl-C to stop");
    registry.dispatch(&HookPayload::ServerOnline).await;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    cancel.cancel();
    if let Some(task) = bridge
        && let Err(e) = task.await
    {
        warn!(error = %e, "packet bridge task failed");
    }
    registry.dispatch(&HookPayload::ServerFinal).await;
    Ok(())
}

/// Post one message through the configured webhook for `channel`.
pub async fn send(config: EchoConfig, channel: String, author: String, message: String) -> Result<()> {
    let routes = Arc::new(RouteTable::from_config(&config)?);
    let dispatcher = OutboundDispatcher::new(
        routes,
        DispatcherOptions::from(&config),
        Handle::current(),
    )?;

    let outcome = dispatcher.dispatch(RelayMessage::outbound(channel.as_str(), author, message));
    if outcome != DispatchOutcome::Queued {
        bail!("message for {channel} not relayed ({outcome:?})");
    }

    let timeout = Duration::from_secs(config.relay.request_timeout_secs + 1);
    dispatcher.drain(timeout).await;
    let stats = dispatcher.stats();
    if stats.delivered != 1 {
        bail!("webhook delivery for {channel} failed, see the log for details");
    }
    eprintln!("Delivered to {channel}.");
    Ok(())
}
