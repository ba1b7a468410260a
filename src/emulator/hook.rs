//! The class load hook.
//!
//! [`ClassLoadHook`] is what a class-definition interceptor calls for every class: it scans the
//! bytes, rewrites the import-annotated native methods when there are any, and otherwise hands
//! the input back untouched. Each rewritten class is recorded in a ledger.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use importshim::emulator::{ClassLoadHook, ClassTransformer, EmulatorConfig, Session};
//!
//! let config = EmulatorConfig::default();
//! let session = Session::new(config.clone());
//! let hook = ClassLoadHook::new(config, Arc::new(session));
//!
//! let bytes = std::fs::read("Bindings.class")?;
//! let patched = hook.transform("com/example/Bindings", &bytes)?;
//! std::fs::write("Bindings.class", &patched)?;
//! # Ok::<(), importshim::Error>(())
//! ```

use std::{borrow::Cow, sync::Arc};

use dashmap::DashMap;
use rayon::prelude::*;

use crate::{
    classfile::ClassFile,
    emulator::{
        rewriter::{MethodRewriter, PatchedMethod, ScriptRegistrar},
        scan, EmulatorConfig,
    },
    Result,
};

/// Transforms class definitions at load time.
pub trait ClassTransformer: Send + Sync {
    /// Returns the bytes to define for `class_name`; borrowed input means "unchanged".
    ///
    /// # Errors
    /// Any error aborts the definition of this one class.
    fn transform<'a>(&self, class_name: &str, bytes: &'a [u8]) -> Result<Cow<'a, [u8]>>;
}

/// Rewrites import-annotated native methods into script proxies.
pub struct ClassLoadHook {
    config: EmulatorConfig,
    registrar: Arc<dyn ScriptRegistrar>,
    ledger: DashMap<String, Vec<PatchedMethod>>,
}

impl ClassLoadHook {
    /// Creates a hook that registers rewritten methods with `registrar`.
    #[must_use]
    pub fn new(config: EmulatorConfig, registrar: Arc<dyn ScriptRegistrar>) -> Self {
        ClassLoadHook {
            config,
            registrar,
            ledger: DashMap::new(),
        }
    }

    /// The configuration of this hook.
    #[must_use]
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// The methods rewritten in `class_name`, if the class was rewritten.
    #[must_use]
    pub fn patched(&self, class_name: &str) -> Option<Vec<PatchedMethod>> {
        self.ledger.get(class_name).map(|entry| entry.value().clone())
    }

    /// Names of all rewritten classes, sorted.
    #[must_use]
    pub fn patched_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.ledger.iter().map(|entry| entry.key().clone()).collect();
        classes.sort();
        classes
    }

    /// Transforms many classes in parallel. The results are in input order.
    pub fn transform_batch<'a>(
        &self,
        classes: &[(&str, &'a [u8])],
    ) -> Vec<Result<Cow<'a, [u8]>>> {
        classes
            .par_iter()
            .map(|&(name, bytes)| self.transform(name, bytes))
            .collect()
    }

    fn rewrite(&self, class_name: &str, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut class = ClassFile::parse(bytes)?;
        let scanned = scan(&class, &self.config.import_annotation)?;
        for diagnostic in &scanned.diagnostics {
            log::warn!("skipping import: {}", diagnostic);
        }
        if scanned.registry.is_empty() {
            return Ok(None);
        }

        let patched = MethodRewriter::new(&self.config, self.registrar.as_ref())
            .rewrite(&mut class, &scanned.registry)?;
        let output = class.to_bytes()?;
        log::debug!("rewrote {} native method(s) of {}", patched.len(), class_name);
        self.ledger.insert(class_name.to_string(), patched);
        Ok(Some(output))
    }
}

impl ClassTransformer for ClassLoadHook {
    fn transform<'a>(&self, class_name: &str, bytes: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self.rewrite(class_name, bytes) {
            Ok(Some(patched)) => Ok(Cow::Owned(patched)),
            Ok(None) => Ok(Cow::Borrowed(bytes)),
            Err(error) => {
                log::error!("cannot load class {}: {}", class_name, error);
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for ClassLoadHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassLoadHook")
            .field("import_annotation", &self.config.import_annotation)
            .field("patched_classes", &self.ledger.len())
            .finish()
    }
}
