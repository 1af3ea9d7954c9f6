#![forbid(unsafe_code)]

//! Version-tracked shared values with change notification.
//!
//! # Design
//!
//! [`Observable<T>`] keeps its value, a version counter, and a subscriber
//! list in shared `Rc<RefCell<..>>` storage. Subscribers are stored as
//! `Weak` callbacks; the strong side lives in the [`Subscription`] returned by
//! [`subscribe`](Observable::subscribe), so dropping the subscription is
//! enough to stop notifications. Dead entries are pruned during the next
//! notification.
//!
//! Callbacks run after the internal borrow is released, so a callback may
//! read or set the same observable. A re-entrant set notifies every
//! subscriber with the newer value right away and the outer delivery stops
//! there, so nobody is handed the superseded value afterwards.
//!
//! # Invariants
//!
//! 1. `version` increments exactly once per `set` that changes the value.
//! 2. Setting a value equal to the current one does nothing.
//! 3. Subscribers are notified in registration order.
//! 4. The last value a subscriber receives is the current value.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = dyn Fn(&T);

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
}

/// A shared, version-tracked value.
///
/// Cloning an `Observable` yields another handle to the **same** value.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value for the duration of `f`.
    ///
    /// `f` must not call `set` on this observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Replace the value and notify subscribers. Returns whether the value
    /// changed.
    pub fn set(&self, value: T) -> bool {
        let (callbacks, version) = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return false;
            }
            inner.value = value;
            inner.version += 1;
            inner.subscribers.retain(|w| w.strong_count() > 0);
            let callbacks = inner
                .subscribers
                .iter()
                .filter_map(Weak::upgrade)
                .collect::<Vec<_>>();
            (callbacks, inner.version)
        };
        self.notify(&callbacks, version);
        true
    }

    /// Mutate a copy of the value in place; notifies only if the result
    /// differs from the current value.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    /// Register `callback`, invoked with the new value after every change.
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Read-only view for handing out to callers.
    #[must_use]
    pub fn read_only(&self) -> ReadOnly<T> {
        ReadOnly {
            source: self.clone(),
        }
    }

    /// Deliver the value written at `version`, stopping as soon as a
    /// re-entrant set has moved past it.
    fn notify(&self, callbacks: &[Rc<Callback<T>>], version: u64) {
        for callback in callbacks {
            let value = {
                let inner = self.inner.borrow();
                if inner.version != version {
                    return;
                }
                inner.value.clone()
            };
            callback(&value);
        }
    }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// RAII guard keeping a subscriber callback registered.
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) removes the
/// callback before the next notification.
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl Subscription {
    /// Explicitly stop receiving notifications.
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ─── ReadOnly ────────────────────────────────────────────────────────────────

/// Read and subscribe access to an [`Observable`], without `set`.
pub struct ReadOnly<T> {
    source: Observable<T>,
}

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnly").field(&self.source).finish()
    }
}

impl<T: Clone + PartialEq + 'static> ReadOnly<T> {
    #[must_use]
    pub fn get(&self) -> T {
        self.source.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.source.with(f)
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.source.version()
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.source.subscribe(callback)
    }
}
