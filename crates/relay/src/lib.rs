//! Relay assembly: runtime selection, hook installation, start/stop, and
//! the standalone packet bridge.

pub mod bridge;
pub mod orchestrator;
pub mod runtime;

pub use {
    bridge::{PacketForwarder, PacketListener},
    orchestrator::RelayOrchestrator,
    runtime::RelayRuntime,
};
