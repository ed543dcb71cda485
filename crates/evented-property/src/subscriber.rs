#![forbid(unsafe_code)]

//! A single callback paired with a weakly-held owner.

use std::fmt;
use std::rc::Rc;

use crate::owner::WeakOwner;

#[cfg(feature = "tracing")]
use tracing::error;

/// Zero-argument callback stored by an event source.
pub type Callback = Rc<dyn Fn()>;

/// A callback whose lifetime is bounded by its owner.
///
/// # Failure Modes
///
/// | Mode | Condition | Behavior |
/// |------|-----------|----------|
/// | Dead invoke | `invoke()` after the owner was dropped | Panics (debug) or no-op (release) |
pub struct Subscriber {
    owner: WeakOwner,
    callback: Callback,
}

impl Subscriber {
    #[must_use]
    pub fn new(owner: WeakOwner, callback: Callback) -> Self {
        Self { owner, callback }
    }

    /// `true` iff the owner is still alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.owner.is_alive()
    }

    /// The owner this subscriber is tied to.
    #[must_use]
    pub fn owner(&self) -> &WeakOwner {
        &self.owner
    }

    /// The stored callback.
    #[must_use]
    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Run the callback.
    ///
    /// Callers must prune dead subscribers first; invoking a dead subscriber
    /// trips a debug assertion and is otherwise ignored.
    pub fn invoke(&self) {
        let alive = self.is_alive();
        debug_assert!(alive, "subscriber invoked after its owner was dropped");
        if !alive {
            #[cfg(feature = "tracing")]
            error!("subscriber invoked after its owner was dropped; prune before firing");
            return;
        }
        (self.callback)();
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
