use std::{future::Future, time::Duration};

use {
    tokio::runtime::{Builder, Handle, Runtime},
    tracing::debug,
};

use {echo_channels::Result, echo_config::EchoConfig};

/// Where relay tasks run.
///
/// Embedded in a host with its own (non-async) event loop, the relay owns a
/// dedicated multi-thread runtime so webhook calls and the gateway never run
/// on the host thread. Inside an async process it shares the caller's.
pub enum RelayRuntime {
    Owned(Runtime),
    Shared(Handle),
}

impl RelayRuntime {
    pub fn dedicated(worker_threads: usize) -> Result<Self> {
        let rt = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("echo-relay")
            .enable_all()
            .build()?;
        debug!(worker_threads = worker_threads.max(1), "relay runtime started");
        Ok(Self::Owned(rt))
    }

    /// Dedicated runtime sized by `relay.worker_threads`.
    pub fn for_embedding(config: &EchoConfig) -> Result<Self> {
        Self::dedicated(config.relay.worker_threads)
    }

    pub fn shared(handle: Handle) -> Self {
        Self::Shared(handle)
    }

    pub fn handle(&self) -> Handle {
        match self {
            Self::Owned(rt) => rt.handle().clone(),
            Self::Shared(handle) => handle.clone(),
        }
    }

    /// Run `fut` to completion from synchronous code.
    ///
    /// With a shared runtime the caller must be on one of its worker threads
    /// or outside any runtime; a current-thread runtime cannot be blocked.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        match self {
            Self::Owned(rt) => rt.block_on(fut),
            Self::Shared(handle) => match Handle::try_current() {
                Ok(_) => tokio::task::block_in_place(|| handle.block_on(fut)),
                Err(_) => handle.block_on(fut),
            },
        }
    }

    /// Tear down an owned runtime, abandoning tasks still running after
    /// `timeout`. No-op for a shared one.
    pub fn shutdown(self, timeout: Duration) {
        if let Self::Owned(rt) = self {
            rt.shutdown_timeout(timeout);
            debug!("relay runtime stopped");
        }
    }
}
