//! Cancellation support for the active response stream
//!
//! A stop request and the stream read loop run independently. They meet on a
//! single `CancellationToken`: the stream registers its token here, and
//! `abort_active` cancels whatever is registered without touching the stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct ActiveStream {
    id: u64,
    token: CancellationToken,
}

/// Single-slot registry for the stream currently being read
///
/// Only one stream per coordinator is expected at a time. Binding a second one
/// replaces the first (last writer wins); use one coordinator per session when
/// several conversations stream concurrently.
#[derive(Debug, Default)]
pub struct CancellationCoordinator {
    active: Mutex<Option<ActiveStream>>,
    next_id: AtomicU64,
}

impl CancellationCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `token` as the active stream's token
    ///
    /// The returned binding unregisters the token when dropped, unless another
    /// token has been bound since.
    pub fn bind(self: &Arc<Self>, token: CancellationToken) -> StreamBinding {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.active.lock().replace(ActiveStream { id, token });
        if let Some(previous) = previous {
            warn!(
                "Stream #{} bound while stream #{} was still active, replacing it",
                id, previous.id
            );
        } else {
            debug!("Stream #{} bound", id);
        }

        StreamBinding {
            coordinator: Arc::clone(self),
            id,
        }
    }

    /// Cancel the active stream, if any
    ///
    /// Idempotent. The binding stays in place; the stream releases it once it
    /// observes the cancellation. Returns whether a stream was bound.
    pub fn abort_active(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(active) => {
                info!("Aborting active stream #{}", active.id);
                active.token.cancel();
                true
            }
            None => {
                debug!("No active stream to abort");
                false
            }
        }
    }

    /// Remove the binding regardless of which stream holds it
    pub fn clear(&self) {
        if let Some(active) = self.active.lock().take() {
            debug!("Stream #{} cleared", active.id);
        }
    }

    /// Whether a stream is currently bound
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    fn release(&self, id: u64) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
            debug!("Stream #{} released", id);
        }
    }
}

/// Registration of one stream with a [`CancellationCoordinator`]
#[derive(Debug)]
pub struct StreamBinding {
    coordinator: Arc<CancellationCoordinator>,
    id: u64,
}

impl StreamBinding {
    /// Unregister now (same as dropping)
    pub fn release(self) {}
}

impl Drop for StreamBinding {
    fn drop(&mut self) {
        self.coordinator.release(self.id);
    }
}
