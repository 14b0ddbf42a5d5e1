//! Relay core shared by both directions.
//!
//! Routing between in-game channels and Discord destinations, the loop guard
//! that keeps relayed messages from bouncing back, bounded message
//! formatting, the `0x0F01` relay packet, and the traits the host game
//! server implements.

pub mod error;
pub mod guard;
pub mod host;
pub mod message;
pub mod packet;
pub mod route;

pub use {
    error::{Error, Result},
    guard::LoopGuard,
    host::{ChannelRef, GameChannels},
    message::{Direction, RelayLimits, RelayMessage},
    route::{ChannelRoute, Destination, ExternalChannelId, RouteTable, WebhookTarget},
};
