use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Fault injection state for testing
#[derive(Debug, Default)]
pub struct FaultInjector {
    // Chunk failures
    fail_chunks_enabled: AtomicBool,
    chunks_before_failure: AtomicU64,

    // Commit failures
    pub fail_commit_once: AtomicBool,

    // Latency injection, per chunk
    pub inject_latency_ms: AtomicU64,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `n` more chunks through, then fails every chunk until cleared.
    pub fn fail_after_chunks(&self, n: u64) {
        self.chunks_before_failure.store(n, Ordering::SeqCst);
        self.fail_chunks_enabled.store(true, Ordering::SeqCst);
    }

    /// Check if the next chunk should fail
    pub fn should_fail_chunk(&self) -> bool {
        if !self.fail_chunks_enabled.load(Ordering::SeqCst) {
            return false;
        }
        self.chunks_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_err()
    }

    /// Check if the commit should fail
    pub fn should_fail_commit(&self) -> bool {
        self.fail_commit_once.swap(false, Ordering::SeqCst)
    }

    /// Delay to apply before each chunk, if any.
    pub fn latency(&self) -> Option<Duration> {
        match self.inject_latency_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Reset all faults
    pub fn clear(&self) {
        self.fail_chunks_enabled.store(false, Ordering::SeqCst);
        self.chunks_before_failure.store(0, Ordering::SeqCst);
        self.fail_commit_once.store(false, Ordering::SeqCst);
        self.inject_latency_ms.store(0, Ordering::Relaxed);
    }
}
