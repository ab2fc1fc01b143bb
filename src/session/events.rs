//! Events a session publishes and the fan-out channel that carries them.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;

/// Output of the pipeline process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A chunk of stdout or stderr, as read.
    Log(String),
    /// The process is gone. `exit_code` is absent when it never ran or was killed.
    Close { exit_code: Option<i32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
}

/// A filesystem change inside a run's pipeline directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub kind: ChangeKind,
    /// Path relative to the pipeline directory.
    pub path: String,
}

/// Anything that can be written as one SSE frame.
pub trait StreamEvent: Clone + Send + Sync + 'static {
    /// SSE event name.
    fn name(&self) -> &'static str;
    /// SSE data payload.
    fn payload(&self) -> String;
}

impl StreamEvent for SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Close { .. } => "close",
        }
    }

    /// Raw text for logs, the exit code (or nothing) for close.
    fn payload(&self) -> String {
        match self {
            Self::Log(text) => text.clone(),
            Self::Close { exit_code } => exit_code.map(|c| c.to_string()).unwrap_or_default(),
        }
    }
}

impl StreamEvent for ProgressEvent {
    fn name(&self) -> &'static str {
        "progress"
    }

    fn payload(&self) -> String {
        match self.kind {
            ChangeKind::Added => format!("added {}", self.path),
            ChangeKind::Removed => format!("removed {}", self.path),
        }
    }
}

/// Fan-out of one event sequence to any number of subscribers.
///
/// Each subscriber owns an unbounded queue. A slow reader only delays
/// itself and still sees every event published after it subscribed, in order.
pub struct Broadcaster<T> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.lock().len())
            .finish()
    }
}

impl<T> Broadcaster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<T>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        Subscription { rx, on_drop: None }
    }

    /// Live subscribers. Dropped ones are pruned on the way.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl<T: Clone> Broadcaster<T> {
    /// Publish to current subscribers. Nobody listening is not an error.
    pub fn publish(&self, event: T) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// One subscriber's queue. The stream ends once its [`Broadcaster`] is gone.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Run `f` when this subscription is dropped. By then it no longer
    /// counts towards [`Broadcaster::subscriber_count`].
    pub fn on_drop(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_drop = Some(Box::new(f));
        self
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(f) = self.on_drop.take() {
            f();
        }
    }
}
