//! Synchronization utilities for handing results between threads.
//!
//! # Key Components
//!
//! - [`Completion`] - a one-shot slot a caller blocks on until another thread fills it
//! - [`Completer`] - the producing half; dropping it unfilled breaks the completion
//!
//! If the completer is dropped without a value, for example because the engine thread shut
//! down with work still queued, waiting returns [`crate::Error::Disconnected`].

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::{Error, Result};

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Done(T),
    Taken,
    Broken,
}

#[derive(Debug)]
struct Inner<T> {
    slot: Mutex<Slot<T>>,
    condvar: Condvar,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// The waiting half of a one-shot result.
///
/// # Examples
///
/// ```rust
/// use std::thread;
/// use importshim::utils::synchronization::Completion;
///
/// let (completion, completer) = Completion::new();
/// thread::spawn(move || completer.complete(42));
///
/// assert_eq!(completion.wait(None)?, Some(42));
/// # Ok::<(), importshim::Error>(())
/// ```
#[derive(Debug)]
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

/// The producing half of a [`Completion`].
#[derive(Debug)]
pub struct Completer<T> {
    inner: Option<Arc<Inner<T>>>,
}

impl<T> Completion<T> {
    /// Creates a connected completion and completer.
    #[must_use]
    pub fn new() -> (Completion<T>, Completer<T>) {
        let inner = Arc::new(Inner {
            slot: Mutex::new(Slot::Pending),
            condvar: Condvar::new(),
        });
        (
            Completion {
                inner: Arc::clone(&inner),
            },
            Completer { inner: Some(inner) },
        )
    }

    /// Blocks until the value arrives, the completer is dropped, or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on timeout; the value may still arrive later and can be collected
    /// by waiting again.
    ///
    /// # Errors
    /// Returns [`Error::Disconnected`] if the completer was dropped without a value, or the
    /// value was already taken.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Option<T>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.inner.lock();

        loop {
            match std::mem::replace(&mut *guard, Slot::Taken) {
                Slot::Done(value) => return Ok(Some(value)),
                Slot::Taken => return Err(Error::Disconnected),
                Slot::Broken => {
                    *guard = Slot::Broken;
                    return Err(Error::Disconnected);
                }
                Slot::Pending => *guard = Slot::Pending,
            }

            match deadline {
                None => {
                    guard = self
                        .inner
                        .condvar
                        .wait(guard)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    guard = self
                        .inner
                        .condvar
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

impl<T> Completer<T> {
    /// Delivers the value and wakes the waiter.
    pub fn complete(mut self, value: T) {
        if let Some(inner) = self.inner.take() {
            *inner.lock() = Slot::Done(value);
            inner.condvar.notify_all();
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let mut guard = inner.lock();
            if matches!(*guard, Slot::Pending) {
                *guard = Slot::Broken;
            }
            drop(guard);
            inner.condvar.notify_all();
        }
    }
}
