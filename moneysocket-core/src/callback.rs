//! Optional subscriber slots.
//!
//! Layers and stacks expose their events as [`CallbackSlot`]s. A slot holds at
//! most one subscriber; setting a new one replaces the old. Emitting into an
//! empty slot does nothing: no error, no buffering, no replay.

use std::fmt;
use std::sync::{Arc, RwLock};

/// A settable, clearable callback of type `F` (usually `dyn Fn(..) + Send + Sync`).
pub struct CallbackSlot<F: ?Sized> {
    inner: RwLock<Option<Arc<F>>>,
}

impl<F: ?Sized> CallbackSlot<F> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Install a subscriber, replacing any previous one.
    pub fn set(&self, callback: Arc<F>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *inner = Some(callback);
    }

    /// Remove the subscriber.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *inner = None;
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Clone out the current subscriber.
    ///
    /// Callers invoke the returned handle after the slot lock is released, so
    /// a subscriber may safely replace itself or emit into other slots.
    pub fn get(&self) -> Option<Arc<F>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<F: ?Sized> Default for CallbackSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for CallbackSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Invoke the subscriber of a slot, if any.
///
/// ```rust
/// use moneysocket_core::{emit, CallbackSlot};
/// use std::sync::Arc;
///
/// let slot: CallbackSlot<dyn Fn(u64) + Send + Sync> = CallbackSlot::new();
/// emit!(slot, 5); // no subscriber: nothing happens
///
/// slot.set(Arc::new(|msecs: u64| assert_eq!(msecs, 5)));
/// emit!(slot, 5);
/// ```
#[macro_export]
macro_rules! emit {
    ($slot:expr $(, $arg:expr)* $(,)?) => {
        if let Some(callback) = $slot.get() {
            callback($($arg),*);
        }
    };
}
