use std::sync::{Arc, Mutex};

use blockput_protocol::ProgressEvent;
use tokio::sync::mpsc;

/// Turns block completions into a fractional progress stream.
///
/// At most one subscriber at a time. With nobody subscribed, notifications
/// are dropped rather than buffered. One notifier serves one session.
#[derive(Clone, Default)]
pub struct ProgressNotifier {
    inner: Arc<Mutex<NotifierInner>>,
}

#[derive(Default)]
struct NotifierInner {
    subscriber: Option<mpsc::UnboundedSender<ProgressEvent>>,
    last: f64,
    closed: bool,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the single subscriber.
    ///
    /// Returns `None` while another subscriber's stream is still alive, or
    /// once the notifier has closed.
    pub fn subscribe(&self) -> Option<ProgressStream> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return None;
        }
        if inner.subscriber.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscriber = Some(tx);
        Some(ProgressStream { rx })
    }

    /// Whether a live subscriber is attached.
    pub fn has_subscriber(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.subscriber.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Publishes `completed / total`.
    ///
    /// When `completed` reaches `total` the value is followed by
    /// [`ProgressEvent::EndOfStream`] and the notifier closes. Values lower
    /// than one already published are ignored. Returns whether a value was
    /// delivered to a subscriber.
    pub fn publish(&self, completed: usize, total: usize) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return false;
        }
        let fraction = if total == 0 {
            1.0
        } else {
            (completed as f64 / total as f64).min(1.0)
        };
        if fraction < inner.last {
            return false;
        }
        inner.last = fraction;

        let mut delivered = false;
        if let Some(tx) = &inner.subscriber {
            delivered = tx.send(ProgressEvent::Progress(fraction)).is_ok();
            if !delivered {
                inner.subscriber = None;
            }
        }

        if completed >= total {
            if let Some(tx) = inner.subscriber.take() {
                let _ = tx.send(ProgressEvent::EndOfStream);
            }
            inner.closed = true;
        }
        delivered
    }

    /// Ends the stream without a final value or end-of-stream marker.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        inner.subscriber = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Whether both handles point at the same notifier.
    pub fn same_as(&self, other: &ProgressNotifier) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Receiving half of a progress subscription.
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressStream {
    /// Waits for the next event. `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Returns an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Drains the stream until it ends.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}
