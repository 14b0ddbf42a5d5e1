//! Gateway connection lifecycle.
//!
//! `Disconnected -> Connecting -> Ready -> Disconnected`, with
//! `ShuttingDown` while [`stop`] runs. The serenity run loop lives on its own
//! task; this module only starts it and tears it down.

use std::{sync::Arc, time::Duration};

use {
    serenity::Client,
    tokio::task::JoinHandle,
    tracing::{error, info, warn},
};

use echo_channels::{Error, Result};

use crate::{
    handler::{InboundListener, RelayHandler},
    session::SessionStatus,
};

/// Connect the bot and spawn its run loop on the current runtime.
///
/// An empty token or a client that cannot be built is reported as
/// `ConnectionFailure` and leaves the session `Disconnected`.
pub async fn start(listener: Arc<InboundListener>) -> Result<JoinHandle<()>> {
    let session = Arc::clone(listener.session());
    if !session.has_token() {
        session.reset();
        return Err(Error::connection("discord bot token is empty"));
    }

    if !session.begin_connect() {
        return Err(Error::connection(format!(
            "bot session is {:?}, not connecting",
            session.status()
        )));
    }
    let client = Client::builder(session.token(), RelayHandler::intents())
        .event_handler(RelayHandler::new(listener))
        .await;
    let mut client = match client {
        Ok(client) => client,
        Err(e) => {
            session.reset();
            return Err(Error::connection(format!("failed to build discord client: {e}")));
        },
    };
    session.attach_shard_manager(Arc::clone(&client.shard_manager));
    if session.status() == SessionStatus::ShuttingDown {
        session.take_shard_manager();
        return Err(Error::connection("shutdown requested while connecting"));
    }

    info!("connecting discord gateway");
    Ok(tokio::spawn(async move {
        if let Err(e) = client.start().await {
            error!(error = %e, "discord gateway stopped with error");
        } else {
            info!("discord gateway stopped");
        }
        if session.status() != SessionStatus::ShuttingDown {
            session.reset();
        }
    }))
}

/// Disconnect every shard and wait up to `timeout` for the run loop to end.
///
/// Returns false if the task had to be abandoned. In-flight handler calls
/// are not cancelled.
pub async fn stop(listener: &InboundListener, task: JoinHandle<()>, timeout: Duration) -> bool {
    let session = listener.session();
    if !session.begin_shutdown() {
        warn!("gateway shutdown already in progress");
    }
    if let Some(manager) = session.take_shard_manager() {
        manager.shutdown_all().await;
    }
    let finished = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "gateway task ended abnormally");
            true
        },
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "gateway task did not stop in time"
            );
            false
        },
    };
    session.reset();
    finished
}
