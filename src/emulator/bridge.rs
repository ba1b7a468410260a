//! The call surface of rewritten methods.
//!
//! Every proxy body ends in one static call `bridge(module, name, args)`. Whatever answers that
//! call on the JVM side forwards it to a [`ScriptBridge`]; the crate provides the two
//! implementations, [`Session`] for arbitrary threads and [`ScriptHost`] for code already
//! running on the engine thread.

use std::sync::Arc;

use crate::{
    emulator::{rewriter::ScriptRegistrar, HostValue, ImportAnnotation, ScriptHost, Session},
    Result,
};

/// Executes import functions by module and name.
pub trait ScriptBridge {
    /// Calls `<module>.<name>(args...)` and returns its result.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownFunction`] if there is no such function and
    /// [`crate::Error::Script`] if it throws.
    fn invoke(&self, module: &str, name: &str, args: Vec<HostValue>) -> Result<HostValue>;
}

impl ScriptBridge for Session {
    fn invoke(&self, module: &str, name: &str, args: Vec<HostValue>) -> Result<HostValue> {
        Session::invoke(self, module, name, args)
    }
}

impl ScriptBridge for ScriptHost {
    fn invoke(&self, module: &str, name: &str, args: Vec<HostValue>) -> Result<HostValue> {
        ScriptHost::invoke(self, module, name, &args)
    }
}

impl<T: ScriptBridge + ?Sized> ScriptBridge for Arc<T> {
    fn invoke(&self, module: &str, name: &str, args: Vec<HostValue>) -> Result<HostValue> {
        (**self).invoke(module, name, args)
    }
}

impl ScriptRegistrar for Session {
    fn register_script(&self, annotation: Arc<ImportAnnotation>) -> Result<()> {
        Session::register_script(self, annotation)
    }
}
