#![forbid(unsafe_code)]

//! Fire policies: when does a mutation notify subscribers?
//!
//! | Policy | Value bound | Fires when |
//! |--------|-------------|------------|
//! | [`SkipDuplicates`] | `PartialEq` | `new != old`, or skipping is disabled |
//! | [`AlwaysFire`] | none | every assignment |
//!
//! `Option<T>` is `PartialEq` whenever `T` is, so the optional property
//! variant uses [`SkipDuplicates`] as well; `None` never equals `Some(_)`.

use std::cell::Cell;

/// Decides whether replacing `old` with `new` should fire the event source.
///
/// Policies run while the property's value is borrowed and must not touch
/// the property they belong to.
pub trait FirePolicy<T: ?Sized> {
    fn should_fire(&self, old: &T, new: &T) -> bool;
}

/// Fire only when the value actually changes, unless disabled.
///
/// The flag can be flipped after construction through a shared reference.
#[derive(Debug, Clone)]
pub struct SkipDuplicates {
    enabled: Cell<bool>,
}

impl SkipDuplicates {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Cell::new(enabled),
        }
    }

    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}

impl Default for SkipDuplicates {
    fn default() -> Self {
        Self::new(true)
    }
}

impl From<&PropertyConfig> for SkipDuplicates {
    fn from(config: &PropertyConfig) -> Self {
        Self::new(config.skip_duplicates)
    }
}

impl<T: PartialEq + ?Sized> FirePolicy<T> for SkipDuplicates {
    #[inline]
    fn should_fire(&self, old: &T, new: &T) -> bool {
        !self.enabled() || old != new
    }
}

/// Fire on every assignment, no comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysFire;

impl<T: ?Sized> FirePolicy<T> for AlwaysFire {
    #[inline]
    fn should_fire(&self, _old: &T, _new: &T) -> bool {
        true
    }
}

/// Construction-time settings for the equatable property variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyConfig {
    /// Suppress notifications when the new value equals the old one.
    /// Default: true.
    pub skip_duplicates: bool,
}

impl Default for PropertyConfig {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
        }
    }
}

impl PropertyConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether equal assignments are suppressed.
    #[must_use]
    pub fn with_skip_duplicates(mut self, skip: bool) -> Self {
        self.skip_duplicates = skip;
        self
    }
}
