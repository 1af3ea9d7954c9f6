#![forbid(unsafe_code)]

//! Push-style observable state for FrankenForm.
//!
//! - [`Observable`]: a shared, version-tracked value with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`ReadOnly`]: the read/subscribe half of an `Observable`, handed to
//!   callers so only the engine can write.
//! - [`Derived`]: a value recomputed eagerly whenever its sources change.
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Subscribers are stored as `Weak` callbacks and cleaned up lazily during
//! notification.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.

pub mod derived;
pub mod observable;

pub use derived::Derived;
pub use observable::{Observable, ReadOnly, Subscription};
