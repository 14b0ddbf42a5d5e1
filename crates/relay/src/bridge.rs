//! Packet bridge for running the relay next to, rather than inside, the map
//! server.
//!
//! Discord messages go to the map server as `0x0F01` packets, one TCP
//! connection per packet. In-game chat comes back the same way on the
//! listen address and is fed into the local hook registry as if the host had
//! fired its channel-send hook.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    echo_common::hooks::{HookPayload, HookRegistry},
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use echo_channels::{
    ChannelRef, Error, GameChannels, Result,
    packet::{PACKET_LEN, RelayPacket},
};

/// Default map server address of the standalone bot.
pub const DEFAULT_MAP_SERVER: &str = "127.0.0.1:5121";

/// [`GameChannels`] over TCP to a map server.
pub struct PacketForwarder {
    addr: String,
    timeout: Duration,
}

impl PacketForwarder {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn write_packet(&self, packet: &RelayPacket) -> Result<()> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| Error::network(None, format!("connect to {} timed out", self.addr)))?
            .map_err(|e| Error::network(None, format!("connect to {}: {e}", self.addr)))?;
        stream.write_all(&packet.encode()).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl GameChannels for PacketForwarder {
    /// The map server owns the channel list; every name is forwarded and
    /// unknown channels are dropped on its side.
    async fn search(&self, name: &str) -> Option<ChannelRef> {
        Some(ChannelRef::new(name))
    }

    async fn send(&self, channel: &ChannelRef, author: &str, text: &str) -> Result<()> {
        let packet = RelayPacket::new(channel.name.as_str(), author, text);
        self.write_packet(&packet).await?;
        debug!(channel = %channel.name, author, addr = %self.addr, "relay packet sent");
        Ok(())
    }
}

/// Accepts `0x0F01` packets carrying in-game chat.
pub struct PacketListener {
    listener: TcpListener,
}

impl PacketListener {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "packet bridge listening");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires.
    pub async fn run(self, registry: Arc<HookRegistry>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("packet bridge stopped");
                    return;
                },
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "packet bridge connection");
                        let registry = Arc::clone(&registry);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = read_packets(stream, &registry, cancel).await {
                                warn!(%peer, error = %e, "packet bridge connection failed");
                            }
                        });
                    },
                    Err(e) => warn!(error = %e, "packet bridge accept failed"),
                },
            }
        }
    }
}

async fn read_packets(
    mut stream: TcpStream,
    registry: &HookRegistry,
    cancel: CancellationToken,
) -> Result<()> {
    let mut frame = [0u8; PACKET_LEN];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = stream.read_exact(&mut frame) => read,
        };
        match read {
            Ok(_) => {},
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let packet = match RelayPacket::decode(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "dropping malformed relay packet");
                continue;
            },
        };
        let payload = HookPayload::ChannelSend {
            channel: packet.channel,
            author: packet.username,
            text: packet.message,
            from_client: true,
        };
        let report = registry.dispatch(&payload).await;
        if !report.is_clean() {
            debug!(failures = report.failures.len(), "channel-send hook reported failures");
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use echo_common::hooks::{HookEvent, HookHandler};

    use super::*;

    #[tokio::test]
    async fn forwarder_writes_one_packet_per_connection() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let forwarder = PacketForwarder::new(addr.to_string(), Duration::from_secs(2));

        let accept = tokio::spawn(async move {
            let (mut stream, _) = server.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let channel = forwarder.search("support").await.unwrap();
        forwarder.send(&channel, "<grace>", "need help").await.unwrap();

        let bytes = accept.await.unwrap();
        assert_eq!(bytes.len(), PACKET_LEN);
        assert_eq!(
            RelayPacket::decode(&bytes).unwrap(),
            RelayPacket::new("support", "<grace>", "need help")
        );
    }

    #[tokio::test]
    async fn forwarder_reports_unreachable_server() {
        let forwarder = PacketForwarder::new("127.0.0.1:9", Duration::from_secs(2));
        let err = forwarder
            .send(&ChannelRef::new("main"), "<a>", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NetworkFailure { .. }));
    }

    struct Capture(Arc<Mutex<Vec<HookPayload>>>);

    #[async_trait]
    impl HookHandler for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        fn events(&self) -> &[HookEvent] {
            &[HookEvent::ChannelSend]
        }

        async fn handle(&self, _event: HookEvent, payload: &HookPayload) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn listener_feeds_channel_send_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(Capture(Arc::clone(&seen))));

        let listener = PacketListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.run(Arc::new(registry), cancel.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&RelayPacket::new("trade", "Alice", "WTS sword").encode())
            .await
            .unwrap();
        stream.write_all(&[0u8; 10]).await.unwrap();
        stream.shutdown().await.unwrap();
        drop(stream);

        for _ in 0..100 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            &seen[0],
            HookPayload::ChannelSend { channel, author, from_client: true, .. }
                if channel == "trade" && author == "Alice"
        ));
    }
}
