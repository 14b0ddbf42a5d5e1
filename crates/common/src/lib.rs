//! Shared error definitions and the host hook registry used across the
//! discord-echo crates.

pub mod error;
pub mod hooks;

pub use error::{Error, FromMessage};
