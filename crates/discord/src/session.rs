//! The single gateway session of the process.

use std::sync::{
    Arc, Mutex, RwLock,
    atomic::{AtomicU8, Ordering},
};

use {
    secrecy::{ExposeSecret, Secret},
    serenity::gateway::ShardManager,
    tracing::debug,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    Disconnected = 0,
    Connecting = 1,
    Ready = 2,
    ShuttingDown = 3,
}

impl SessionStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::ShuttingDown,
            _ => Self::Disconnected,
        }
    }
}

/// Bot connection state, shared between the orchestrator, the gateway task
/// and the event handler.
///
/// Constructed once by the orchestrator and passed around by `Arc`.
pub struct BotSession {
    token: Secret<String>,
    status: AtomicU8,
    identity: RwLock<Option<String>>,
    shard_manager: Mutex<Option<Arc<ShardManager>>>,
}

impl BotSession {
    pub fn new(token: Secret<String>) -> Self {
        Self {
            token,
            status: AtomicU8::new(SessionStatus::Disconnected as u8),
            identity: RwLock::new(None),
            shard_manager: Mutex::new(None),
        }
    }

    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }

    pub(crate) fn token(&self) -> &str {
        self.token.expose_secret().trim()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        let prev = SessionStatus::from_u8(self.status.swap(status as u8, Ordering::AcqRel));
        if prev != status {
            debug!(from = ?prev, to = ?status, "bot session status");
        }
    }

    /// `Disconnected -> Connecting`. False in any other state.
    pub(crate) fn begin_connect(&self) -> bool {
        self.status
            .compare_exchange(
                SessionStatus::Disconnected as u8,
                SessionStatus::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Ready` unless a shutdown already started.
    pub(crate) fn mark_ready(&self, identity: String) -> bool {
        let ok = self
            .status
            .compare_exchange(
                SessionStatus::Connecting as u8,
                SessionStatus::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
            || self.status() == SessionStatus::Ready;
        if ok {
            *self.identity.write().unwrap_or_else(|e| e.into_inner()) = Some(identity);
        }
        ok
    }

    /// Bot user name, once the gateway reported ready.
    pub fn identity(&self) -> Option<String> {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn attach_shard_manager(&self, manager: Arc<ShardManager>) {
        *self.shard_manager.lock().unwrap_or_else(|e| e.into_inner()) = Some(manager);
    }

    pub(crate) fn take_shard_manager(&self) -> Option<Arc<ShardManager>> {
        self.shard_manager
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Enter `ShuttingDown`. False if already shutting down.
    pub(crate) fn begin_shutdown(&self) -> bool {
        let prev = self
            .status
            .swap(SessionStatus::ShuttingDown as u8, Ordering::AcqRel);
        prev != SessionStatus::ShuttingDown as u8
    }

    /// Back to `Disconnected`, forgetting the identity.
    pub(crate) fn reset(&self) {
        self.set_status(SessionStatus::Disconnected);
        *self.identity.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl std::fmt::Debug for BotSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotSession")
            .field("token", &"[REDACTED]")
            .field("status", &self.status())
            .field("identity", &self.identity())
            .finish()
    }
}
