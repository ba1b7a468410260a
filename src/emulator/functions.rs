//! The registered function set of a session.

use std::sync::{Arc, RwLock};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::emulator::ImportAnnotation;

/// Every function ever registered with a session, in first-registration order.
///
/// Entries are never removed. Registering an existing `(module, name)` again replaces the
/// annotation in place, so a replay after a page reload installs each function exactly once and
/// in its original position.
#[derive(Debug, Default)]
pub(crate) struct FunctionSet {
    entries: boxcar::Vec<RwLock<Arc<ImportAnnotation>>>,
    index: DashMap<(String, String), usize>,
}

impl FunctionSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a function; returns `true` if it was not known yet.
    pub(crate) fn insert(&self, annotation: Arc<ImportAnnotation>) -> bool {
        match self.index.entry(annotation.key()) {
            Entry::Occupied(entry) => {
                *write_lock!(self.entries[*entry.get()]) = annotation;
                false
            }
            Entry::Vacant(entry) => {
                let position = self.entries.push(RwLock::new(annotation));
                entry.insert(position);
                true
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.count()
    }

    /// The current annotations in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ImportAnnotation>> {
        self.entries
            .iter()
            .map(|(_, entry)| Arc::clone(&read_lock!(entry)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_keeps_position() {
        let set = FunctionSet::new();
        assert!(set.insert(Arc::new(ImportAnnotation::with_script("M", "a", "() => 1"))));
        assert!(set.insert(Arc::new(ImportAnnotation::with_script("M", "b", "() => 2"))));
        assert!(!set.insert(Arc::new(ImportAnnotation::with_script("M", "a", "() => 3"))));

        let snapshot = set.snapshot();
        assert_eq!(set.len(), 2);
        assert_eq!(snapshot[0].script.as_deref(), Some("() => 3"));
        assert_eq!(snapshot[1].name, "b");
    }

    #[test]
    fn concurrent_registration_has_no_duplicates() {
        let set = Arc::new(FunctionSet::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let set = Arc::clone(&set);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let script = format!("() => {}", t);
                        set.insert(Arc::new(ImportAnnotation::with_script("M", format!("f{}", i), script)));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(set.len(), 50);
    }
}
