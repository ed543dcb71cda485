#![forbid(unsafe_code)]

//! Ordered collection of owner-gated callbacks that can be fired together.
//!
//! # Design
//!
//! [`EventSource`] keeps its subscribers in shared, reference-counted storage
//! (`Rc<..>` with `RefCell` fields). Cloning the source yields another handle
//! to the same subscriber list. Each subscriber pairs a callback with a weak
//! owner reference; once the owner is dropped, the subscriber is pruned on the
//! next [`fire_event`](EventSource::fire_event) and never runs again.
//!
//! # Invariants
//!
//! 1. Subscribers fire in subscription order.
//! 2. Dead subscribers are pruned *before* any callback runs, so a fire never
//!    leaves a dead subscriber in the list.
//! 3. A fire works on a snapshot: subscribe/unsubscribe calls made from inside
//!    a callback take effect on the next fire, not the current one.
//! 4. No `RefCell` borrow is held while user code (callbacks, the
//!    subscriber-added hook, or destructors of removed callbacks) runs.
//!
//! # Failure Modes
//!
//! | Mode | Condition | Behavior |
//! |------|-----------|----------|
//! | Double unsubscribe | Token invoked twice | Second call is a no-op |
//! | Stale token | Source dropped before the token | No-op |
//! | Owner dies mid-fire | A callback drops a later subscriber's owner | Later subscriber is skipped |
//! | Subscriber leak | Owner outlives interest in the event | Callback keeps firing; use the token or a [`SubscriptionGuard`] |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::owner::{Owner, WeakOwner};
use crate::subscriber::{Callback, Subscriber};

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

/// Hook run whenever a subscriber is added.
type SubscriberAddedHook = Rc<dyn Fn(&WeakOwner, &Callback)>;

#[derive(Default)]
struct SourceInner {
    subscribers: RefCell<Vec<Rc<Subscriber>>>,
    on_subscriber_added: RefCell<Option<SubscriberAddedHook>>,
}

impl SourceInner {
    /// Detach dead subscribers from the list and hand them back, so the
    /// caller drops them after the borrow is released.
    fn take_dead(&self) -> Vec<Rc<Subscriber>> {
        let mut subscribers = self.subscribers.borrow_mut();
        let (live, dead): (Vec<_>, Vec<_>) = std::mem::take(&mut *subscribers)
            .into_iter()
            .partition(|s| s.is_alive());
        *subscribers = live;
        dead
    }
}

/// Collects callbacks and fires them on demand.
///
/// Each callback is associated with an owner. If that owner is dropped, the
/// callback is never called again.
#[derive(Clone, Default)]
pub struct EventSource {
    inner: Rc<SourceInner>,
}

impl EventSource {
    /// Create an event source with no subscribers and no hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `callback`, tied to the lifetime of `owner`.
    ///
    /// The subscriber-added hook (if any) runs before this returns. The
    /// returned token removes exactly this subscriber.
    pub fn subscribe(&self, owner: &impl Owner, callback: impl Fn() + 'static) -> Unsubscribe {
        self.subscribe_callback(owner.weak_owner(), Rc::new(callback))
    }

    fn subscribe_callback(&self, owner: WeakOwner, callback: Callback) -> Unsubscribe {
        let record = Rc::new(Subscriber::new(owner.clone(), Rc::clone(&callback)));
        let token = Unsubscribe {
            source: Rc::downgrade(&self.inner),
            record: Rc::downgrade(&record),
        };

        let _count = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            subscribers.push(record);
            subscribers.len()
        };
        #[cfg(feature = "tracing")]
        trace!(subscribers = _count, "event source: subscribe");

        let hook = self.inner.on_subscriber_added.borrow().clone();
        if let Some(hook) = hook {
            hook(&owner, &callback);
        }
        token
    }

    /// Add `callback`, tied to `owner`, to be called at most once.
    ///
    /// After the first call the subscriber removes itself. Invoking the
    /// returned token before the first fire prevents the call entirely.
    pub fn subscribe_once(
        &self,
        owner: &impl Owner,
        callback: impl FnOnce() + 'static,
    ) -> Unsubscribe {
        let slot: Rc<Cell<Option<Unsubscribe>>> = Rc::default();
        let spent = Rc::new(Cell::new(false));
        let pending = Cell::new(Some(callback));

        let wrapper = {
            let slot = Rc::clone(&slot);
            let spent = Rc::clone(&spent);
            move || {
                // A nested fire can reach us again before we are removed.
                let Some(callback) = pending.take() else {
                    return;
                };
                spent.set(true);
                callback();
                if let Some(token) = slot.take() {
                    token.unsubscribe();
                }
            }
        };

        let token = self.subscribe(owner, wrapper);
        if spent.get() {
            // The subscriber-added hook already ran the callback.
            token.unsubscribe();
        } else {
            slot.set(Some(token.clone()));
        }
        token
    }

    /// Remove every subscriber, alive or not.
    pub fn remove_all_subscribers(&self) {
        let removed = std::mem::take(&mut *self.inner.subscribers.borrow_mut());
        #[cfg(feature = "tracing")]
        debug!(removed = removed.len(), "event source: remove all subscribers");
        drop(removed);
    }

    /// Drop subscribers whose owners are gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let dead = self.inner.take_dead();
        dead.len()
    }

    /// Call every subscriber whose owner is still alive, in subscription
    /// order.
    pub fn fire_event(&self) {
        let dead = self.inner.take_dead();
        let snapshot: Vec<Rc<Subscriber>> = self.inner.subscribers.borrow().clone();

        #[cfg(feature = "tracing")]
        trace!(
            pruned = dead.len(),
            fired = snapshot.len(),
            "event source: fire"
        );
        drop(dead);

        for subscriber in &snapshot {
            if subscriber.is_alive() {
                subscriber.invoke();
            }
        }
    }

    /// Install a hook that runs with `(owner, callback)` every time a
    /// subscriber is added. Replaces any previous hook.
    pub fn set_on_subscriber_added(&self, hook: impl Fn(&WeakOwner, &Callback) + 'static) {
        let previous = self.inner.on_subscriber_added.replace(Some(Rc::new(hook)));
        drop(previous);
    }

    /// Remove the subscriber-added hook.
    pub fn clear_on_subscriber_added(&self) {
        let previous = self.inner.on_subscriber_added.take();
        drop(previous);
    }

    /// Number of subscribers currently held, including dead ones that have
    /// not been pruned yet.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("subscriber_count", &self.subscriber_count())
            .field(
                "has_subscriber_added_hook",
                &self.inner.on_subscriber_added.borrow().is_some(),
            )
            .finish()
    }
}

/// Token returned by the subscribe operations. Removes its subscriber when
/// [`unsubscribe`](Unsubscribe::unsubscribe) is called.
///
/// The token holds only weak references, so it never keeps the event source
/// or the callback alive. Clones remove the same subscriber.
#[derive(Clone)]
pub struct Unsubscribe {
    source: Weak<SourceInner>,
    record: Weak<Subscriber>,
}

impl Unsubscribe {
    /// Remove the subscriber. Idempotent.
    pub fn unsubscribe(&self) {
        let Some(inner) = self.source.upgrade() else {
            return;
        };
        let removed: Vec<Rc<Subscriber>> = {
            let mut subscribers = inner.subscribers.borrow_mut();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *subscribers)
                .into_iter()
                .partition(|s| self.is(s));
            *subscribers = kept;
            removed
        };

        #[cfg(feature = "tracing")]
        if !removed.is_empty() {
            trace!(
                subscribers = inner.subscribers.borrow().len(),
                "event source: unsubscribe"
            );
        }
        drop(removed);
    }

    /// `true` while the subscriber is still registered with a live source.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        let Some(inner) = self.source.upgrade() else {
            return false;
        };
        let found = inner.subscribers.borrow().iter().any(|s| self.is(s));
        found
    }

    /// Convert into a guard that unsubscribes when dropped.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard {
            token: self,
            armed: true,
        }
    }

    #[inline]
    fn is(&self, subscriber: &Rc<Subscriber>) -> bool {
        std::ptr::eq(Rc::as_ptr(subscriber), self.record.as_ptr())
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// RAII guard around an [`Unsubscribe`] token.
///
/// Dropping the guard removes the subscriber, even on panic or early return.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard {
    token: Unsubscribe,
    armed: bool,
}

impl SubscriptionGuard {
    /// Give up the guard without unsubscribing.
    pub fn disarm(mut self) -> Unsubscribe {
        self.armed = false;
        self.token.clone()
    }

    /// `true` while the guarded subscriber is still registered.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.token.is_subscribed()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.token.unsubscribe();
        }
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("armed", &self.armed)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::OwnerToken;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        (count, move || count_clone.set(count_clone.get() + 1))
    }

    #[test]
    fn fire_calls_subscribers() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        let _unsub = source.subscribe(&owner, cb);
        source.fire_event();
        source.fire_event();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn fire_order_is_subscription_order() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let log = Rc::new(RefCell::new(Vec::new()));

        for tag in ['A', 'B', 'C'] {
            let log = Rc::clone(&log);
            source.subscribe(&owner, move || log.borrow_mut().push(tag));
        }

        source.fire_event();
        assert_eq!(*log.borrow(), vec!['A', 'B', 'C']);
    }

    #[test]
    fn dead_owner_never_fires() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        source.subscribe(&owner, cb);
        source.fire_event();
        assert_eq!(count.get(), 1);

        drop(owner);
        source.fire_event();
        assert_eq!(count.get(), 1);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn dead_subscribers_pruned_before_fire() {
        let source = EventSource::new();
        let keep = Rc::new(());
        let gone = Rc::new(());

        source.subscribe(&keep, || {});
        source.subscribe(&gone, || {});
        source.subscribe(&gone, || {});
        drop(gone);

        // Not pruned until something asks.
        assert_eq!(source.subscriber_count(), 3);
        source.fire_event();
        assert_eq!(source.subscriber_count(), 1);
    }

    #[test]
    fn prune_without_firing() {
        let source = EventSource::new();
        let gone = Rc::new(());
        let (count, cb) = counter();

        source.subscribe(&gone, cb);
        drop(gone);

        assert_eq!(source.prune(), 1);
        assert_eq!(source.prune(), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn unsubscribe_removes_only_that_subscriber() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();

        let unsub_a = source.subscribe(&owner, cb_a);
        let _unsub_b = source.subscribe(&owner, cb_b);

        unsub_a.unsubscribe();
        source.fire_event();
        assert_eq!(a.get(), 0);
        assert_eq!(b.get(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        let unsub = source.subscribe(&owner, cb);
        let _other = source.subscribe(&owner, || {});
        assert!(unsub.is_subscribed());

        unsub.unsubscribe();
        unsub.unsubscribe();
        unsub.clone().unsubscribe();

        assert!(!unsub.is_subscribed());
        assert_eq!(source.subscriber_count(), 1);
        source.fire_event();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn unsubscribe_identity_not_value() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();
        let cb = Rc::new(cb);

        let cb_first = Rc::clone(&cb);
        let first = source.subscribe(&owner, move || cb_first());
        let cb_second = Rc::clone(&cb);
        let _second = source.subscribe(&owner, move || cb_second());

        first.unsubscribe();
        source.fire_event();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unsubscribe_after_source_dropped() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let unsub = source.subscribe(&owner, || {});
        drop(source);

        assert!(!unsub.is_subscribed());
        unsub.unsubscribe();
    }

    #[test]
    fn token_does_not_keep_callback_alive() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let payload = Rc::new(());
        let payload_cb = Rc::clone(&payload);

        let unsub = source.subscribe(&owner, move || {
            let _ = &payload_cb;
        });
        assert_eq!(Rc::strong_count(&payload), 2);

        unsub.unsubscribe();
        assert_eq!(Rc::strong_count(&payload), 1);
    }

    #[test]
    fn subscribe_once_fires_once() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        source.subscribe_once(&owner, cb);
        source.fire_event();
        source.fire_event();
        source.fire_event();

        assert_eq!(count.get(), 1);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_once_can_unsubscribe() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        let unsub = source.subscribe_once(&owner, cb);
        unsub.unsubscribe();
        source.fire_event();
        source.fire_event();

        assert_eq!(count.get(), 0);
    }

    #[test]
    fn subscribe_once_token_after_fire_is_noop() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        let unsub = source.subscribe_once(&owner, cb);
        source.fire_event();
        unsub.unsubscribe();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn subscribe_once_survives_nested_fire() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        // Fires the source again from inside the first callback.
        let nested = source.clone();
        let armed = Rc::new(Cell::new(true));
        let armed_cb = Rc::clone(&armed);
        source.subscribe(&owner, move || {
            if armed_cb.replace(false) {
                nested.fire_event();
            }
        });
        source.subscribe_once(&owner, cb);

        source.fire_event();
        source.fire_event();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn subscribe_once_dead_owner_never_fires() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        source.subscribe_once(&owner, cb);
        drop(owner);
        source.fire_event();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn hook_runs_once_per_subscribe() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (calls, hook) = counter();
        source.set_on_subscriber_added(move |_, _| hook());

        source.subscribe(&owner, || {});
        assert_eq!(calls.get(), 1);
        source.subscribe(&owner, || {});
        assert_eq!(calls.get(), 2);
        source.subscribe_once(&owner, || {});
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn hook_receives_owner_and_callback() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        source.set_on_subscriber_added(|owner, callback| {
            assert!(owner.is_alive());
            callback();
        });
        source.subscribe(&owner, cb);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn hook_running_once_callback_removes_it() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        source.set_on_subscriber_added(|_, callback| callback());
        let unsub = source.subscribe_once(&owner, cb);
        assert_eq!(count.get(), 1);
        assert!(!unsub.is_subscribed());

        source.fire_event();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn cleared_hook_no_longer_runs() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (calls, hook) = counter();

        source.set_on_subscriber_added(move |_, _| hook());
        source.clear_on_subscriber_added();
        source.subscribe(&owner, || {});
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn hook_may_subscribe() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let inner_source = source.clone();
        let inner_owner = Rc::clone(&owner);
        let depth = Rc::new(Cell::new(0));
        let depth_hook = Rc::clone(&depth);

        source.set_on_subscriber_added(move |_, _| {
            if depth_hook.replace(depth_hook.get() + 1) == 0 {
                inner_source.subscribe(&inner_owner, || {});
            }
        });
        source.subscribe(&owner, || {});
        assert_eq!(source.subscriber_count(), 2);
    }

    #[test]
    fn remove_all_subscribers_clears_everything() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let gone = Rc::new(());
        let (count, cb) = counter();

        source.subscribe(&owner, cb);
        source.subscribe(&gone, || {});
        drop(gone);

        source.remove_all_subscribers();
        assert_eq!(source.subscriber_count(), 0);
        source.fire_event();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn subscribe_during_fire_waits_for_next_fire() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (late, late_cb) = counter();
        let late_cb = Rc::new(late_cb);

        let inner_source = source.clone();
        let inner_owner = Rc::clone(&owner);
        let added = Cell::new(false);
        source.subscribe(&owner, move || {
            if !added.replace(true) {
                let late_cb = Rc::clone(&late_cb);
                inner_source.subscribe(&inner_owner, move || late_cb());
            }
        });

        source.fire_event();
        assert_eq!(late.get(), 0);
        source.fire_event();
        assert_eq!(late.get(), 1);
    }

    #[test]
    fn unsubscribe_during_fire_waits_for_next_fire() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (b, cb_b) = counter();
        let slot: Rc<RefCell<Option<Unsubscribe>>> = Rc::default();

        let slot_a = Rc::clone(&slot);
        source.subscribe(&owner, move || {
            if let Some(token) = slot_a.borrow_mut().take() {
                token.unsubscribe();
            }
        });
        *slot.borrow_mut() = Some(source.subscribe(&owner, cb_b));

        source.fire_event();
        assert_eq!(b.get(), 1);
        source.fire_event();
        assert_eq!(b.get(), 1);
    }

    #[test]
    fn owner_dropped_mid_fire_is_skipped() {
        let source = EventSource::new();
        let first = Rc::new(());
        let second: Rc<RefCell<Option<Rc<()>>>> = Rc::new(RefCell::new(Some(Rc::new(()))));
        let (count, cb) = counter();

        let second_handle = Rc::clone(&second);
        source.subscribe(&first, move || {
            second_handle.borrow_mut().take();
        });
        let second_owner = second.borrow().clone().unwrap();
        source.subscribe(&second_owner, cb);
        drop(second_owner);

        source.fire_event();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn owner_token_gates_subscribers() {
        let source = EventSource::new();
        let token = OwnerToken::new();
        let (count, cb) = counter();

        source.subscribe(&token, cb);
        source.fire_event();
        token.release();
        source.fire_event();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn guard_unsubscribes_on_drop() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        let guard = source.subscribe(&owner, cb).into_guard();
        assert!(guard.is_subscribed());
        source.fire_event();
        drop(guard);
        source.fire_event();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn disarmed_guard_keeps_subscription() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let (count, cb) = counter();

        let token = source.subscribe(&owner, cb).into_guard().disarm();
        source.fire_event();
        assert_eq!(count.get(), 1);

        token.unsubscribe();
        source.fire_event();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn callback_owning_its_guard_can_be_removed() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let holder: Rc<RefCell<Option<SubscriptionGuard>>> = Rc::default();

        let holder_cb = Rc::clone(&holder);
        let guard = source
            .subscribe(&owner, move || {
                let _ = &holder_cb;
            })
            .into_guard();
        *holder.borrow_mut() = Some(guard);
        drop(holder);

        // Dropping the callback drops the guard, which unsubscribes.
        source.remove_all_subscribers();
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn clones_share_subscribers() {
        let source = EventSource::new();
        let other = source.clone();
        let owner = Rc::new(());
        let (count, cb) = counter();

        source.subscribe(&owner, cb);
        other.fire_event();
        assert_eq!(count.get(), 1);
        assert_eq!(other.subscriber_count(), 1);
    }

    #[test]
    fn debug_format() {
        let source = EventSource::new();
        let owner = Rc::new(());
        let unsub = source.subscribe(&owner, || {});

        let dbg = format!("{source:?}");
        assert!(dbg.contains("EventSource"));
        assert!(dbg.contains("subscriber_count: 1"));
        assert!(format!("{unsub:?}").contains("subscribed: true"));
    }
}
