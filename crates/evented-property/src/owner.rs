#![forbid(unsafe_code)]

//! Owner handles that gate subscriber lifetime.
//!
//! Every subscription is associated with an *owner*. The event source only
//! ever holds the owner weakly; once the owner is dropped, the subscriber is
//! dead and will never be invoked again.
//!
//! Any `Rc<T>` can act as an owner. For call sites that have no natural
//! `Rc`-managed object, [`OwnerToken`] is an explicit handle whose
//! [`release`](OwnerToken::release) (or drop) ends the lifetime of every
//! subscriber registered with it.
//!
//! # Invariants
//!
//! 1. [`WeakOwner::is_alive`] never panics and never revives the owner.
//! 2. Once `is_alive` returns `false` it returns `false` forever.

use std::fmt;
use std::rc::{Rc, Weak};

/// Liveness query over a weak pointer of any pointee type.
trait Liveness {
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized> Liveness for Weak<T> {
    #[inline]
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// A type-erased weak reference to a subscriber's owner.
///
/// Cloning is cheap and yields another weak reference to the same owner.
#[derive(Clone)]
pub struct WeakOwner {
    inner: Rc<dyn Liveness>,
}

impl WeakOwner {
    /// Wrap a weak pointer as an owner reference.
    #[must_use]
    pub fn from_weak<T: ?Sized + 'static>(weak: Weak<T>) -> Self {
        Self {
            inner: Rc::new(weak),
        }
    }

    /// `true` while the owner is still alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }
}

impl fmt::Debug for WeakOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakOwner")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Anything that can stand in as the owner of a subscription.
pub trait Owner {
    /// Produce a weak reference to this owner.
    fn weak_owner(&self) -> WeakOwner;
}

impl<T: ?Sized + 'static> Owner for Rc<T> {
    fn weak_owner(&self) -> WeakOwner {
        WeakOwner::from_weak(Rc::downgrade(self))
    }
}

impl Owner for WeakOwner {
    fn weak_owner(&self) -> WeakOwner {
        self.clone()
    }
}

/// Explicit owner handle for subscribers that are not tied to an `Rc`.
///
/// Subscribers registered with a token stay alive until every clone of the
/// token has been released or dropped.
///
/// ```
/// use evented_property::{EventSource, OwnerToken};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let source = EventSource::new();
/// let token = OwnerToken::new();
/// let hits = Rc::new(Cell::new(0));
/// let hits_cb = Rc::clone(&hits);
/// let _unsub = source.subscribe(&token, move || hits_cb.set(hits_cb.get() + 1));
///
/// source.fire_event();
/// token.release();
/// source.fire_event();
/// assert_eq!(hits.get(), 1);
/// ```
#[derive(Clone, Default)]
pub struct OwnerToken {
    alive: Rc<()>,
}

impl OwnerToken {
    /// Create a fresh, live owner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Release this handle. Equivalent to dropping it; spelled out so the
    /// disposal point is visible at the call site.
    pub fn release(self) {
        drop(self);
    }
}

impl Owner for OwnerToken {
    fn weak_owner(&self) -> WeakOwner {
        WeakOwner::from_weak(Rc::downgrade(&self.alive))
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerToken")
            .field("handles", &Rc::strong_count(&self.alive))
            .finish()
    }
}
