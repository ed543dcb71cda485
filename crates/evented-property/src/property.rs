#![forbid(unsafe_code)]

//! Value containers that fire an event source when mutated.
//!
//! # Design
//!
//! [`Evented<T, P>`] wraps a value of type `T` in shared, reference-counted
//! storage together with one [`EventSource`]. Every mutation asks the fire
//! policy `P` whether subscribers should be notified; if so, the source fires
//! synchronously, after the new value is stored.
//!
//! The three variants are aliases over the same type:
//!
//! | Alias | Value | Policy |
//! |-------|-------|--------|
//! | [`EventedProperty<T>`] | `T: PartialEq` | [`SkipDuplicates`] |
//! | [`EventedPropertyOptional<T>`] | `Option<T>` | [`SkipDuplicates`] |
//! | [`EventedPropertyBasic<T>`] | any `T` | [`AlwaysFire`] |
//!
//! # Invariants
//!
//! 1. Subscribers observe the new value: it is stored before the fire.
//! 2. Value-passing callbacks get a clone taken at fire time; no borrow of
//!    the value is held while they run, so they may call `set` themselves.
//! 3. Sliding-window state is per subscriber.
//! 4. Derived callbacks hold the property weakly and do nothing once it is
//!    gone.
//!
//! # Failure Modes
//!
//! - **Re-entrant update**: calling any property method from inside the
//!   closure passed to [`update`](Evented::update) or [`with`](Evented::with)
//!   panics (`RefCell` borrow rules).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::event_source::{EventSource, Unsubscribe};
use crate::owner::{Owner, WeakOwner};
use crate::policy::{AlwaysFire, FirePolicy, PropertyConfig, SkipDuplicates};
use crate::subscriber::Callback;

#[cfg(feature = "tracing")]
use tracing::trace;

struct PropertyInner<T, P> {
    value: RefCell<T>,
    policy: P,
    events: EventSource,
}

/// A shared value that fires its event source on mutation.
///
/// Cloning creates another handle to the **same** value and subscribers.
pub struct Evented<T, P> {
    inner: Rc<PropertyInner<T, P>>,
}

/// Equatable property; equal assignments are skipped by default.
pub type EventedProperty<T> = Evented<T, SkipDuplicates>;

/// Optional equatable property; `None` transitions always count as changes.
pub type EventedPropertyOptional<T> = Evented<Option<T>, SkipDuplicates>;

/// Unconstrained property; every assignment fires.
pub type EventedPropertyBasic<T> = Evented<T, AlwaysFire>;

impl<T, P> Clone for Evented<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug, P: fmt::Debug> fmt::Debug for Evented<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evented")
            .field("value", &*self.inner.value.borrow())
            .field("policy", &self.inner.policy)
            .field("subscriber_count", &self.inner.events.subscriber_count())
            .finish()
    }
}

impl<T: PartialEq + 'static> Evented<T, SkipDuplicates> {
    /// Create a property that skips duplicate assignments.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::with_config(initial, PropertyConfig::default())
    }

    #[must_use]
    pub fn with_skip_duplicates(initial: T, skip_duplicates: bool) -> Self {
        Self::with_policy(initial, SkipDuplicates::new(skip_duplicates))
    }

    #[must_use]
    pub fn with_config(initial: T, config: PropertyConfig) -> Self {
        Self::with_policy(initial, SkipDuplicates::from(&config))
    }

    /// Whether assigning an equal value is suppressed.
    #[must_use]
    pub fn should_skip_duplicates(&self) -> bool {
        self.inner.policy.enabled()
    }

    pub fn set_should_skip_duplicates(&self, skip: bool) {
        self.inner.policy.set_enabled(skip);
    }
}

impl<T: PartialEq + 'static> Evented<Option<T>, SkipDuplicates> {
    #[must_use]
    pub fn is_some(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Take the value out, leaving `None`. Fires if a value was present
    /// (or if duplicate skipping is off).
    pub fn take(&self) -> Option<T> {
        self.replace(None)
    }
}

impl<T: 'static> Evented<T, AlwaysFire> {
    /// Create a property that fires on every assignment.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::with_policy(initial, AlwaysFire)
    }
}

impl<T: 'static, P: FirePolicy<T> + 'static> Evented<T, P> {
    /// Create a property with an explicit fire policy.
    #[must_use]
    pub fn with_policy(initial: T, policy: P) -> Self {
        Self {
            inner: Rc::new(PropertyInner {
                value: RefCell::new(initial),
                policy,
                events: EventSource::new(),
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &P {
        &self.inner.policy
    }

    /// The event source fired by this property.
    #[must_use]
    pub fn events(&self) -> &EventSource {
        &self.inner.events
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Store `value`, then fire if the policy says so.
    pub fn set(&self, value: T) {
        let previous = self.replace(value);
        drop(previous);
    }

    /// Store `value` and return the previous one, firing if the policy
    /// says so.
    pub fn replace(&self, value: T) -> T {
        let (previous, fire) = {
            let mut current = self.inner.value.borrow_mut();
            let fire = self.inner.policy.should_fire(&current, &value);
            (std::mem::replace(&mut *current, value), fire)
        };

        #[cfg(feature = "tracing")]
        trace!(fired = fire, "evented property: set");

        if fire {
            self.inner.events.fire_event();
        }
        previous
    }

    /// Fire the event source without changing the value.
    pub fn fire_event(&self) {
        self.inner.events.fire_event();
    }

    /// See [`EventSource::subscribe`].
    pub fn subscribe(&self, owner: &impl Owner, callback: impl Fn() + 'static) -> Unsubscribe {
        self.inner.events.subscribe(owner, callback)
    }

    /// See [`EventSource::subscribe_once`].
    pub fn subscribe_once(
        &self,
        owner: &impl Owner,
        callback: impl FnOnce() + 'static,
    ) -> Unsubscribe {
        self.inner.events.subscribe_once(owner, callback)
    }

    pub fn remove_all_subscribers(&self) {
        self.inner.events.remove_all_subscribers();
    }

    pub fn set_on_subscriber_added(&self, hook: impl Fn(&WeakOwner, &Callback) + 'static) {
        self.inner.events.set_on_subscriber_added(hook);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.subscriber_count()
    }
}

impl<T: Clone + 'static, P: FirePolicy<T> + 'static> Evented<T, P> {
    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Modify the value in place. The policy compares a snapshot of the old
    /// value with the result.
    ///
    /// # Panics
    ///
    /// Panics if `f` touches this property.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let fire = {
            let mut current = self.inner.value.borrow_mut();
            let old = current.clone();
            f(&mut current);
            self.inner.policy.should_fire(&old, &current)
        };

        #[cfg(feature = "tracing")]
        trace!(fired = fire, "evented property: update");

        if fire {
            self.inner.events.fire_event();
        }
    }

    /// Snapshot of the value, or `None` once the property is gone.
    fn current(inner: &Weak<PropertyInner<T, P>>) -> Option<T> {
        let inner = inner.upgrade()?;
        let value = inner.value.borrow().clone();
        Some(value)
    }

    /// `on_change(value)` runs every time the property fires.
    pub fn subscribe_to_value(
        &self,
        owner: &impl Owner,
        on_change: impl Fn(&T) + 'static,
    ) -> Unsubscribe {
        let weak = Rc::downgrade(&self.inner);
        self.subscribe(owner, move || {
            if let Some(value) = Self::current(&weak) {
                on_change(&value);
            }
        })
    }

    /// `on_change(value)` runs the next time the property fires, and never
    /// again.
    pub fn subscribe_once_to_value(
        &self,
        owner: &impl Owner,
        on_change: impl FnOnce(&T) + 'static,
    ) -> Unsubscribe {
        let weak = Rc::downgrade(&self.inner);
        self.subscribe_once(owner, move || {
            if let Some(value) = Self::current(&weak) {
                on_change(&value);
            }
        })
    }

    /// `on_change(old, new)` runs every time the property fires.
    ///
    /// `old` starts as the value at subscription time and afterwards is the
    /// `new` this subscriber saw last.
    pub fn subscribe_to_sliding_window(
        &self,
        owner: &impl Owner,
        on_change: impl Fn(&T, &T) + 'static,
    ) -> Unsubscribe {
        let weak = Rc::downgrade(&self.inner);
        let previous = RefCell::new(self.get());
        self.subscribe(owner, move || {
            let Some(current) = Self::current(&weak) else {
                return;
            };
            // Advance before calling out so a nested fire sees this window.
            let old = previous.replace(current.clone());
            on_change(&old, &current);
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
