#![forbid(unsafe_code)]

//! Evented properties: values that notify subscribers when they change.
//!
//! This crate provides a small observer primitive whose callbacks live only
//! as long as an associated *owner* object:
//!
//! - [`EventSource`]: an ordered list of owner-gated callbacks with
//!   subscribe, subscribe-once, unsubscribe tokens and fire-all.
//! - [`EventedProperty`], [`EventedPropertyOptional`],
//!   [`EventedPropertyBasic`]: value containers that fire an event source on
//!   mutation, under different duplicate-suppression policies.
//! - [`OwnerToken`] and [`SubscriptionGuard`]: explicit lifetime handles for
//!   call sites without a natural `Rc` owner.
//!
//! # Architecture
//!
//! Everything is single-threaded and synchronous: `Rc<..>` with `RefCell`
//! fields for shared ownership, `Weak` for owner liveness. Dead subscribers
//! are pruned at the start of every fire.
//!
//! # Invariants
//!
//! 1. A subscriber whose owner has been dropped never fires again.
//! 2. Subscribers fire in subscription order.
//! 3. A fire works on a snapshot of the subscriber list taken after pruning.
//! 4. Mutations store the new value before firing.
//!
//! # Example
//!
//! ```
//! use evented_property::EventedProperty;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let temperature = EventedProperty::new(20);
//! let owner = Rc::new(());
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let log_cb = Rc::clone(&log);
//! temperature.subscribe_to_sliding_window(&owner, move |old, new| {
//!     log_cb.borrow_mut().push((*old, *new));
//! });
//!
//! temperature.set(21);
//! temperature.set(21); // duplicate, skipped
//! temperature.set(19);
//!
//! drop(owner);
//! temperature.set(30); // owner gone, nobody listens
//!
//! assert_eq!(*log.borrow(), vec![(20, 21), (21, 19)]);
//! ```

pub mod event_source;
pub mod owner;
pub mod policy;
pub mod property;
pub mod subscriber;

pub use event_source::{EventSource, SubscriptionGuard, Unsubscribe};
pub use owner::{Owner, OwnerToken, WeakOwner};
pub use policy::{AlwaysFire, FirePolicy, PropertyConfig, SkipDuplicates};
pub use property::{Evented, EventedProperty, EventedPropertyBasic, EventedPropertyOptional};
pub use subscriber::{Callback, Subscriber};
