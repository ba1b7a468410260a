#![allow(unused_macros)]

/// Helper macro for locking items
///
/// A poisoned lock is entered anyway; a panicking work unit must not wedge the session.
///
/// ```rust, ignore
///  let mut state = lock!(self.state);
///  state.phase = SessionState::Ready;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let annotation = read_lock!(entry.annotation);
///  println!("{}", annotation);
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  *write_lock!(entry.annotation) = annotation;
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}
