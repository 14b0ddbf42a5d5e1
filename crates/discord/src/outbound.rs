//! Non-blocking game-to-Discord delivery.
//!
//! [`OutboundDispatcher::dispatch`] is called from the host's channel-send
//! hook, on the host's own thread. It never waits on the network: the
//! message is bounded, paired with its webhook target and pushed onto a
//! bounded per-channel queue. One worker per channel drains its queue on the
//! relay runtime, so a channel's messages keep their order while different
//! channels deliver concurrently.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    dashmap::DashMap,
    reqwest::Client,
    tokio::{runtime::Handle, sync::mpsc},
    tracing::{debug, info, warn},
};

use echo_channels::{LoopGuard, RelayLimits, RelayMessage, RouteTable, WebhookTarget};

use crate::webhook::{self, WebhookPayload};

/// What `dispatch` did with a message. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the channel's delivery worker.
    Queued,
    /// Author carries the relay tag; nothing sent.
    Echo,
    /// No webhook for the channel; nothing sent.
    Unrouted,
    /// Message could not be turned into a payload (empty body).
    Rejected,
    /// The channel's queue was full.
    Dropped,
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    queued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub queued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl StatsSnapshot {
    /// Queued deliveries not yet finished.
    pub fn pending(&self) -> u64 {
        self.queued
            .saturating_sub(self.delivered)
            .saturating_sub(self.failed)
    }
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// One queued webhook call. Owns everything it needs.
struct Delivery {
    channel: String,
    target: WebhookTarget,
    payload: WebhookPayload,
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub limits: RelayLimits,
    pub queue_capacity: usize,
    pub request_timeout: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            limits: RelayLimits::default(),
            queue_capacity: 64,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&echo_config::EchoConfig> for DispatcherOptions {
    fn from(cfg: &echo_config::EchoConfig) -> Self {
        Self {
            limits: RelayLimits::from(cfg.limits),
            queue_capacity: cfg.relay.queue_capacity,
            request_timeout: Duration::from_secs(cfg.relay.request_timeout_secs),
        }
    }
}

pub struct OutboundDispatcher {
    routes: Arc<RouteTable>,
    guard: LoopGuard,
    limits: RelayLimits,
    client: Client,
    runtime: Handle,
    queue_capacity: usize,
    queues: DashMap<String, mpsc::Sender<Delivery>>,
    stats: Arc<DispatchStats>,
}

impl OutboundDispatcher {
    /// Workers are spawned on `runtime`, which must outlive the dispatcher.
    pub fn new(
        routes: Arc<RouteTable>,
        options: DispatcherOptions,
        runtime: Handle,
    ) -> echo_channels::Result<Self> {
        let client = webhook::build_client(options.request_timeout)?;
        Ok(Self {
            routes,
            guard: LoopGuard::new(options.limits.display_name_bytes),
            limits: options.limits,
            client,
            runtime,
            queue_capacity: options.queue_capacity.max(1),
            queues: DashMap::new(),
            stats: Arc::new(DispatchStats::default()),
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Relay one in-game message. Returns immediately.
    pub fn dispatch(&self, msg: RelayMessage) -> DispatchOutcome {
        if self.guard.is_relayed_echo(&msg.author_display_name) {
            debug!(
                channel = %msg.source_channel,
                author = %msg.author_display_name,
                "skipping relayed message"
            );
            return DispatchOutcome::Echo;
        }

        let target = match self.routes.resolve_outbound(&msg.source_channel) {
            Ok(target) => target.clone(),
            Err(e) => {
                warn!(error = %e, "not relaying message");
                return DispatchOutcome::Unrouted;
            },
        };

        let msg = match msg.bounded_for_webhook(&self.limits) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping message");
                return DispatchOutcome::Rejected;
            },
        };

        let delivery = Delivery {
            payload: WebhookPayload::from_message(&msg, &target),
            channel: msg.source_channel,
            target,
        };
        self.enqueue(delivery)
    }

    fn enqueue(&self, delivery: Delivery) -> DispatchOutcome {
        let sender = self
            .queues
            .entry(delivery.channel.clone())
            .or_insert_with(|| self.spawn_worker(&delivery.channel))
            .clone();

        match sender.try_send(delivery) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Queued
            },
            Err(mpsc::error::TrySendError::Full(delivery)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = %delivery.channel,
                    capacity = self.queue_capacity,
                    "delivery queue full, dropping message"
                );
                DispatchOutcome::Dropped
            },
            Err(mpsc::error::TrySendError::Closed(delivery)) => {
                self.queues.remove(&delivery.channel);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(channel = %delivery.channel, "delivery worker gone, dropping message");
                DispatchOutcome::Dropped
            },
        }
    }

    fn spawn_worker(&self, channel: &str) -> mpsc::Sender<Delivery> {
        let (tx, mut rx) = mpsc::channel::<Delivery>(self.queue_capacity);
        let client = self.client.clone();
        let stats = Arc::clone(&self.stats);
        let channel = channel.to_string();
        debug!(channel = %channel, "starting delivery worker");
        self.runtime.spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match webhook::execute(&client, &delivery.target, &delivery.payload).await {
                    Ok(()) => {
                        stats.delivered.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            channel = %delivery.channel,
                            author = %delivery.payload.username,
                            error = %e,
                            "webhook delivery failed"
                        );
                    },
                }
            }
            debug!(channel = %channel, "delivery worker stopped");
        });
        tx
    }

    /// Close every queue and wait for queued deliveries to finish, up to
    /// `timeout`. Returns false if some were still in flight. Messages
    /// dispatched afterwards start fresh workers.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.queues.clear();
        let deadline = Instant::now() + timeout;
        loop {
            if self.stats.snapshot().pending() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Log the final counters.
    pub fn log_stats(&self) {
        let s = self.stats();
        info!(
            queued = s.queued,
            delivered = s.delivered,
            failed = s.failed,
            dropped = s.dropped,
            "outbound relay stats"
        );
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn table(url: &str) -> Arc<RouteTable> {
        Arc::new(
            RouteTable::builder()
                .webhook("trade", WebhookTarget::new(url))
                .build()
                .unwrap(),
        )
    }

    fn dispatcher(url: &str, options: DispatcherOptions) -> OutboundDispatcher {
        OutboundDispatcher::new(table(url), options, Handle::current()).unwrap()
    }

    #[rstest]
    #[case("<alice>", "trade", DispatchOutcome::Echo)]
    #[case("alice", "guild", DispatchOutcome::Unrouted)]
    #[tokio::test]
    async fn skipped_messages_make_no_request(
        #[case] author: &str,
        #[case] channel: &str,
        #[case] expected: DispatchOutcome,
    ) {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let d = dispatcher(&format!("{}/hook", server.url()), DispatcherOptions::default());
        assert_eq!(d.dispatch(RelayMessage::outbound(channel, author, "hi")), expected);
        assert!(d.drain(Duration::from_secs(1)).await);
        assert_eq!(d.stats().queued, 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_body_rejected() {
        let d = dispatcher("http://127.0.0.1:9/hook", DispatcherOptions::default());
        assert_eq!(
            d.dispatch(RelayMessage::outbound("trade", "alice", "")),
            DispatchOutcome::Rejected
        );
    }

    #[tokio::test]
    async fn delivers_one_post_with_plain_username() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "username": "Alice",
                "content": "WTS sword"
            })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let d = dispatcher(&format!("{}/hook", server.url()), DispatcherOptions::default());
        assert_eq!(
            d.dispatch(RelayMessage::outbound("trade", "Alice", "WTS sword")),
            DispatchOutcome::Queued
        );
        assert!(d.drain(Duration::from_secs(5)).await);
        mock.assert_async().await;
        assert_eq!(d.stats().delivered, 1);
    }

    #[rstest]
    #[case(2000, 2000)]
    #[case(2001, 2000)]
    #[tokio::test]
    async fn content_bounded_at_platform_limit(#[case] len: usize, #[case] sent: usize) {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "content": "a".repeat(sent)
            })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let d = dispatcher(&format!("{}/hook", server.url()), DispatcherOptions::default());
        d.dispatch(RelayMessage::outbound("trade", "Alice", "a".repeat(len)));
        assert!(d.drain(Duration::from_secs(5)).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failures_are_counted_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let d = dispatcher(&format!("{}/hook", server.url()), DispatcherOptions::default());
        d.dispatch(RelayMessage::outbound("trade", "Alice", "hi"));
        assert!(d.drain(Duration::from_secs(5)).await);
        mock.assert_async().await;
        assert_eq!(d.stats().failed, 1);
        assert_eq!(d.stats().delivered, 0);
    }

    #[tokio::test]
    async fn same_channel_delivers_every_message() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for i in 0..5 {
            mocks.push(
                server
                    .mock("POST", "/hook")
                    .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                        "content": format!("msg {i}")
                    })))
                    .with_status(204)
                    .expect(1)
                    .create_async()
                    .await,
            );
        }

        let d = dispatcher(&format!("{}/hook", server.url()), DispatcherOptions::default());
        for i in 0..5 {
            d.dispatch(RelayMessage::outbound("trade", "Alice", format!("msg {i}")));
        }
        assert!(d.drain(Duration::from_secs(5)).await);
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hundred_dispatches_never_block_on_a_stalled_endpoint() {
        // Accepts connections (via the backlog) but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let d = dispatcher(&format!("http://{addr}/hook"), DispatcherOptions {
            queue_capacity: 128,
            request_timeout: Duration::from_millis(500),
            ..Default::default()
        });

        let started = Instant::now();
        let outcomes: Vec<_> = (0..100)
            .map(|i| d.dispatch(RelayMessage::outbound("trade", "Alice", format!("msg {i}"))))
            .collect();
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(outcomes.iter().all(|o| *o == DispatchOutcome::Queued));
        assert_eq!(d.stats().queued, 100);
        drop(listener);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn hundred_channels_from_many_threads_all_complete() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Regex(r"^/hooks/ch\d+$".into()))
            .with_status(204)
            .expect(100)
            .create_async()
            .await;

        let routes = (0..100)
            .fold(RouteTable::builder(), |builder, i| {
                builder.webhook(
                    format!("ch{i}"),
                    WebhookTarget::new(format!("{}/hooks/ch{i}", server.url())),
                )
            })
            .build()
            .unwrap();
        let d = OutboundDispatcher::new(
            Arc::new(routes),
            DispatcherOptions::default(),
            Handle::current(),
        )
        .unwrap();

        let started = Instant::now();
        tokio::task::block_in_place(|| {
            std::thread::scope(|scope| {
                for worker in 0..4 {
                    let d = &d;
                    scope.spawn(move || {
                        for i in (worker..100).step_by(4) {
                            let outcome = d.dispatch(RelayMessage::outbound(
                                format!("ch{i}"),
                                "Alice",
                                format!("msg {i}"),
                            ));
                            assert_eq!(outcome, DispatchOutcome::Queued);
                        }
                    });
                }
            })
        });
        assert!(started.elapsed() < Duration::from_millis(250));

        assert!(d.drain(Duration::from_secs(10)).await);
        let stats = d.stats();
        assert_eq!(stats.queued, 100);
        assert_eq!(stats.delivered + stats.failed, 100);
        assert_eq!(stats.dropped, 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn full_queue_drops() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let d = dispatcher(&format!("http://{addr}/hook"), DispatcherOptions {
            queue_capacity: 1,
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        });

        // The current-thread runtime cannot run the worker until we yield,
        // so the second message finds the queue still occupied.
        assert_eq!(
            d.dispatch(RelayMessage::outbound("trade", "a", "1")),
            DispatchOutcome::Queued
        );
        assert_eq!(
            d.dispatch(RelayMessage::outbound("trade", "a", "2")),
            DispatchOutcome::Dropped
        );
        assert_eq!(d.stats().dropped, 1);
        drop(listener);
    }
}
