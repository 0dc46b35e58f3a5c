//! Tokio-backed [`ProgressIndicator`] for running contexts outside a host IDE.
//!
//! [`TrackedProgress`] publishes every change as a [`ProgressSnapshot`] on a
//! `tokio::sync::watch` channel so renderers can follow a task without
//! polling. Wrap it in a [`context::TaskScope`] to connect it to a context.
//!
//! ```
//! use std::sync::Arc;
//! use context::{Context, StatusOutput, TaskScope};
//! use progress::TrackedProgress;
//!
//! let progress = Arc::new(TrackedProgress::new("Syncing project"));
//! let context = Context::create();
//! context.push(Arc::new(TaskScope::new(progress.clone())));
//! context.output(StatusOutput::new("Resolving targets"));
//! assert_eq!(progress.snapshot().text, "Resolving targets");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use context::ProgressIndicator;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by [`TrackedProgress`].
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ProgressError {
    /// A completion fraction outside `[0.0, 1.0]`.
    #[error("progress fraction {fraction} is outside 0.0..=1.0")]
    FractionOutOfRange { fraction: f64 },

    /// A deadline was requested outside a tokio runtime.
    #[error("no tokio runtime is available to enforce the deadline")]
    NoRuntime,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The observable state of a [`TrackedProgress`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Fixed title of the tracked task.
    pub title: String,
    /// Latest status text.
    pub text: String,
    /// Completion in `[0.0, 1.0]`.
    pub fraction: f64,
    /// Whether cancellation has been requested.
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// TrackedProgress
// ---------------------------------------------------------------------------

/// A cancellable progress indicator whose state can be watched.
pub struct TrackedProgress {
    state: watch::Sender<ProgressSnapshot>,
    cancelled: AtomicBool,
    callbacks: Mutex<Vec<Box<dyn FnOnce() + Send + 'static>>>,
}

impl TrackedProgress {
    /// Creates an uncancelled indicator at zero progress.
    pub fn new(title: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ProgressSnapshot {
            title: title.into(),
            text: String::new(),
            fraction: 0.0,
            cancelled: false,
        });
        Self {
            state,
            cancelled: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// The current state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.state.subscribe()
    }

    /// Sets the completion fraction.
    ///
    /// # Errors
    ///
    /// [`ProgressError::FractionOutOfRange`] if `fraction` is not within
    /// `[0.0, 1.0]`; the state is left unchanged.
    pub fn try_set_fraction(&self, fraction: f64) -> Result<(), ProgressError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ProgressError::FractionOutOfRange { fraction });
        }
        self.state.send_modify(|state| state.fraction = fraction);
        Ok(())
    }

    /// Cancels the indicator once `timeout` has elapsed, unless it was
    /// cancelled or dropped before then.
    ///
    /// # Errors
    ///
    /// [`ProgressError::NoRuntime`] when called outside a tokio runtime.
    pub fn with_deadline(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<JoinHandle<()>, ProgressError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ProgressError::NoRuntime)?;
        let weak: Weak<Self> = Arc::downgrade(self);
        Ok(handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(progress) = weak.upgrade() {
                if !progress.is_cancelled() {
                    debug!(title = %progress.snapshot().title, ?timeout, "progress deadline reached");
                    progress.cancel();
                }
            }
        }))
    }

    /// Resolves once the indicator is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|state| state.cancelled).await;
    }
}

impl ProgressIndicator for TrackedProgress {
    fn set_text(&self, text: &str) {
        self.state.send_modify(|state| state.text = text.to_string());
    }

    fn set_fraction(&self, fraction: f64) {
        if let Err(err) = self.try_set_fraction(fraction) {
            warn!(error = %err, "clamping progress fraction");
            self.state
                .send_modify(|state| state.fraction = fraction.clamp(0.0, 1.0));
        }
    }

    fn cancel(&self) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.state.send_modify(|state| state.cancelled = true);
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            callback();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn on_cancel(&self, callback: Box<dyn FnOnce() + Send + 'static>) {
        {
            let mut callbacks = self.callbacks.lock();
            if !self.is_cancelled() {
                callbacks.push(callback);
                return;
            }
        }
        callback();
    }
}

impl std::fmt::Debug for TrackedProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedProgress")
            .field("state", &*self.state.borrow())
            .finish()
    }
}
