//! The per-class import registry.

use std::{fmt, sync::Arc};

use rustc_hash::FxHashMap;

use crate::emulator::ImportAnnotation;

/// Identity of a method within one class: its name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
}

impl MethodKey {
    /// Creates a key.
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MethodKey {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// Import annotations of one class, keyed by method and kept in declaration order.
///
/// A registry lives for one rewrite pass: the scanner fills it, the rewriter consumes it.
#[derive(Debug, Default, Clone)]
pub struct ImportRegistry {
    entries: Vec<(MethodKey, Arc<ImportAnnotation>)>,
    index: FxHashMap<MethodKey, usize>,
}

impl ImportRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing the annotation of an existing key in place.
    pub fn insert(&mut self, key: MethodKey, annotation: ImportAnnotation) {
        let annotation = Arc::new(annotation);
        match self.index.get(&key) {
            Some(&position) => self.entries[position].1 = annotation,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, annotation));
            }
        }
    }

    /// Looks up the annotation of a method.
    #[must_use]
    pub fn get(&self, name: &str, descriptor: &str) -> Option<&Arc<ImportAnnotation>> {
        self.index
            .get(&MethodKey::new(name, descriptor))
            .map(|&position| &self.entries[position].1)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no import-annotated method was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&MethodKey, &Arc<ImportAnnotation>)> {
        self.entries.iter().map(|(k, a)| (k, a))
    }
}
