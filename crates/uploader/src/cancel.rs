//! Cancellation of running uploads.
//!
//! Every session acquires its own [`CancelScope`] wrapping a fresh
//! `CancellationToken`. A cancel request fires the tokens of the scopes that
//! are alive at that moment and nothing else, so a request that races with
//! the end of one session can never leak into the next.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

type ScopeMap = Arc<Mutex<HashMap<u64, CancellationToken>>>;

/// Routes external cancel requests to the active session scopes.
#[derive(Default)]
pub struct CancellationController {
    scopes: ScopeMap,
    next_id: AtomicU64,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a cancellation scope for a new session.
    pub fn acquire(&self) -> CancelScope {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.scopes.lock().unwrap().insert(id, token.clone());
        CancelScope {
            id,
            token,
            scopes: Arc::clone(&self.scopes),
        }
    }

    /// Cancels every active scope.
    ///
    /// Returns `false` when nothing was cancelled: no session is running, or
    /// the running ones were already cancelled.
    pub fn request_cancel(&self) -> bool {
        let scopes = self.scopes.lock().unwrap();
        let mut fired = false;
        for token in scopes.values() {
            if !token.is_cancelled() {
                token.cancel();
                fired = true;
            }
        }
        if !fired {
            debug!("cancel requested with no active upload");
        }
        fired
    }

    /// Whether any scope is alive.
    pub fn is_active(&self) -> bool {
        !self.scopes.lock().unwrap().is_empty()
    }
}

/// Cancellation scope of one session. Released on drop.
pub struct CancelScope {
    id: u64,
    token: CancellationToken,
    scopes: ScopeMap,
}

impl CancelScope {
    /// Token observed by the session and handed to the remote.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancelScope {
    fn drop(&mut self) {
        if let Ok(mut scopes) = self.scopes.lock() {
            scopes.remove(&self.id);
        }
    }
}
