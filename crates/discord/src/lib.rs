//! Discord side of the relay: webhook delivery out, gateway bot in.

pub mod gateway;
pub mod handler;
pub mod outbound;
pub mod session;
pub mod webhook;

pub use {
    handler::{InboundEvent, InboundListener, InboundOutcome, RelayHandler},
    outbound::{
        DispatchOutcome, DispatcherOptions, OutboundDispatcher, StatsSnapshot,
    },
    session::{BotSession, SessionStatus},
    webhook::WebhookPayload,
};
