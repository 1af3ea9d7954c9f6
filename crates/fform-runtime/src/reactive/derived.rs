#![forbid(unsafe_code)]

//! Eagerly recomputed values derived from [`Observable`] sources.
//!
//! # Design
//!
//! [`Derived<T>`] owns an output [`Observable<T>`] and the subscriptions that
//! feed it. Every source change recomputes the value immediately and pushes
//! it into the output, so subscribers of a derived value are notified in the
//! same synchronous pass as the source change. Because the output is an
//! `Observable`, a recomputation that yields an equal value is a no-op.
//!
//! # Failure Modes
//!
//! - **Source dropped**: the subscription becomes inert and the derived value
//!   keeps its last result.

use std::fmt;
use std::rc::Rc;

use super::observable::{Observable, ReadOnly, Subscription};

/// A value kept in sync with one or two source observables.
///
/// Cloning a `Derived` yields another handle to the **same** output.
pub struct Derived<T> {
    output: Observable<T>,
    _subscriptions: Rc<Vec<Subscription>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            _subscriptions: Rc::clone(&self._subscriptions),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("output", &self.output)
            .field("sources", &self._subscriptions.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Derived<T> {
    /// Derive from a single source.
    pub fn from_observable<S: Clone + PartialEq + 'static>(
        source: &Observable<S>,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let output = Observable::new(source.with(&map));
        let sink = output.clone();
        let sub = source.subscribe(move |value| {
            sink.set(map(value));
        });
        Self {
            output,
            _subscriptions: Rc::new(vec![sub]),
        }
    }

    /// Derive from two sources. `map` sees the latest value of both.
    pub fn from2<S1, S2>(
        s1: &Observable<S1>,
        s2: &Observable<S2>,
        map: impl Fn(&S1, &S2) -> T + 'static,
    ) -> Self
    where
        S1: Clone + PartialEq + 'static,
        S2: Clone + PartialEq + 'static,
    {
        let map = Rc::new(map);
        let output = Observable::new(s1.with(|a| s2.with(|b| map(a, b))));

        let (sink, other, f) = (output.clone(), s2.clone(), Rc::clone(&map));
        let sub1 = s1.subscribe(move |a| {
            sink.set(other.with(|b| f(a, b)));
        });
        let (sink, other, f) = (output.clone(), s1.clone(), map);
        let sub2 = s2.subscribe(move |b| {
            sink.set(other.with(|a| f(a, b)));
        });

        Self {
            output,
            _subscriptions: Rc::new(vec![sub1, sub2]),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.output.get()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.output.version()
    }

    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.output.subscribe(callback)
    }

    /// Read-only view of the output. The view stays current only while this
    /// `Derived` (or a clone) is alive.
    #[must_use]
    pub fn read_only(&self) -> ReadOnly<T> {
        self.output.read_only()
    }

    /// The output observable, for chaining into further derivations.
    pub(crate) fn output(&self) -> &Observable<T> {
        &self.output
    }
}
