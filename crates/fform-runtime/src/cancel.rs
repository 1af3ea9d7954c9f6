#![forbid(unsafe_code)]

//! Cooperative cancellation for async validation runs.
//!
//! Each scheduled run owns a [`CancelHandle`]; the validator receives the
//! matching [`CancelSignal`]. Superseding a run (a new edit on a matching
//! path, a rollback, a reset) cancels the handle. Validators may poll
//! [`CancelSignal::is_cancelled`], bail out with [`CancelSignal::check`], or
//! race their work against [`CancelSignal::cancelled`].
//!
//! ```
//! use fform_runtime::cancel::CancelHandle;
//!
//! let handle = CancelHandle::new();
//! let signal = handle.signal();
//! assert!(signal.check().is_ok());
//! handle.cancel();
//! assert!(signal.is_cancelled());
//! assert!(signal.check().is_err());
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;
use web_time::{Duration, Instant};

use crate::async_validation::AsyncValidationError;

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

/// Total number of handles cancelled (for diagnostics).
static CANCELLATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

#[must_use]
pub fn cancellations_total() -> u64 {
    CANCELLATIONS_TOTAL.load(Ordering::Relaxed)
}

struct SignalInner {
    id: u64,
    created: Instant,
    cancelled: AtomicBool,
    notify: Notify,
}

/// Validator-side view of a cancellation handle.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<SignalInner>,
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("id", &self.inner.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelSignal {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the handle has been cancelled.
    pub fn check(&self) -> Result<(), AsyncValidationError> {
        if self.is_cancelled() {
            Err(AsyncValidationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the handle is cancelled. Never completes otherwise.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Time since the handle was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.inner.created.elapsed()
    }
}

/// Owner side of a [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    signal: CancelSignal,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: CancelSignal {
                inner: Arc::new(SignalInner {
                    id: NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed),
                    created: Instant::now(),
                    cancelled: AtomicBool::new(false),
                    notify: Notify::new(),
                }),
            },
        }
    }

    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        self.signal.clone()
    }

    /// Cancel the handle. Idempotent; only the first call is counted.
    pub fn cancel(&self) {
        let inner = &self.signal.inner;
        if inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        CANCELLATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(signal_id = inner.id, "validation run cancelled");
        inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }
}
