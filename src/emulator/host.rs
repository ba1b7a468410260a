//! The embedded script engine.
//!
//! A [`ScriptHost`] owns one QuickJS runtime and the context of the currently loaded page. It
//! is deliberately `!Send`: the lifecycle layer creates it on the engine thread and never lets
//! it leave. All other threads reach it through [`crate::emulator::Session`].
//!
//! # Namespaces
//!
//! Import functions live in `<namespace>.<module>.<name>`, with the namespace object
//! (`wasmImports` by default) taken from the page or created empty after the page scripts
//! ran. [`ScriptHost::register`] installs functions; [`ScriptHost::invoke`] calls them with
//! the module object as `this`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use importshim::emulator::{EmulatorConfig, HostValue, ImportAnnotation, PageSource, ScriptHost};
//!
//! let host = ScriptHost::new(Arc::new(EmulatorConfig::default()))?;
//! host.load_page(&PageSource::Content(String::new()))?;
//! host.register(&ImportAnnotation::with_script("M", "add", "(a, b) => a + b"))?;
//!
//! let sum = host.invoke("M", "add", &[HostValue::Int(2), HostValue::Int(3)])?;
//! assert_eq!(sum, HostValue::Int(5));
//! # Ok::<(), importshim::Error>(())
//! ```

use std::{cell::RefCell, sync::Arc};

use rquickjs::{
    function::{Args, Func},
    Context, Ctx, Object, Persistent, Runtime, Value,
};

use crate::{
    emulator::{
        annotation::is_script_identifier,
        page::{extract_scripts, PageSource},
        value::{HostValue, ObjectHandle, ReleaseQueue},
        EmulatorConfig, ImportAnnotation,
    },
    Error, Result,
};

const CONSOLE_NATIVE: &str = "__importshim_console";

const CONSOLE_SHIM: &str = r#"(function (native) {
    function text(args) {
        return Array.prototype.map.call(args, function (a) {
            if (typeof a === 'string') return a;
            try {
                var s = JSON.stringify(a);
                return s === undefined ? String(a) : s;
            } catch (e) {
                return String(a);
            }
        }).join(' ');
    }
    function level(n) {
        return native ? function () { native(n, text(arguments)); } : function () {};
    }
    globalThis.console = {
        debug: level(0), trace: level(0),
        log: level(1), info: level(1),
        warn: level(2),
        error: level(3)
    };
})(globalThis.__importshim_console);"#;

fn console_line(level: i32, text: String) {
    let level = match level {
        0 => log::Level::Debug,
        1 => log::Level::Info,
        2 => log::Level::Warn,
        _ => log::Level::Error,
    };
    log::log!(target: "importshim::console", level, "{}", text);
}

/// Turns a pending script exception into [`Error::Script`].
trait CaughtExt<T> {
    fn caught(self, ctx: &Ctx<'_>) -> Result<T>;
}

impl<T> CaughtExt<T> for rquickjs::Result<T> {
    fn caught(self, ctx: &Ctx<'_>) -> Result<T> {
        self.map_err(|error| match error {
            rquickjs::Error::Exception => {
                let thrown = ctx.catch();
                match thrown.as_exception() {
                    Some(exception) => Error::Script {
                        message: exception.message().unwrap_or_default(),
                        stack: exception.stack().filter(|s| !s.is_empty()),
                    },
                    None => Error::Script {
                        message: thrown
                            .as_string()
                            .and_then(|s| s.to_string().ok())
                            .unwrap_or_else(|| format!("{:?}", thrown)),
                        stack: None,
                    },
                }
            }
            other => Error::from(other),
        })
    }
}

/// Script objects handed out as [`ObjectHandle`]s for the current page.
#[derive(Default)]
struct HandleTable {
    generation: u64,
    slots: Vec<Option<Persistent<Value<'static>>>>,
    free: Vec<u32>,
    released: Arc<ReleaseQueue>,
}

impl HandleTable {
    /// Frees the slots of dropped handles.
    fn sweep(&mut self) {
        for (generation, id) in self.released.drain() {
            if generation != self.generation {
                continue;
            }
            if let Some(slot) = self.slots.get_mut(id as usize) {
                if slot.take().is_some() {
                    self.free.push(id);
                }
            }
        }
    }

    fn insert(&mut self, object: Persistent<Value<'static>>) -> Result<ObjectHandle> {
        self.sweep();
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(object);
                id
            }
            None => {
                let id = u32::try_from(self.slots.len())
                    .map_err(|_| Error::Error("object handle table is full".to_string()))?;
                self.slots.push(Some(object));
                id
            }
        };
        Ok(ObjectHandle::new(self.generation, id, Arc::clone(&self.released)))
    }

    fn get(&self, handle: &ObjectHandle) -> Option<&Persistent<Value<'static>>> {
        if handle.generation() != self.generation {
            return None;
        }
        self.slots.get(handle.id() as usize)?.as_ref()
    }

    fn reset(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.released.drain();
        self.generation += 1;
    }
}

/// One QuickJS runtime bound to the current thread.
pub struct ScriptHost {
    // dropped before the runtime that owns their values
    handles: RefCell<HandleTable>,
    page: RefCell<Option<Context>>,
    runtime: Runtime,
    config: Arc<EmulatorConfig>,
}

impl ScriptHost {
    /// Creates a host without a page.
    ///
    /// # Errors
    /// Returns [`Error::Boot`] if the runtime cannot be allocated.
    pub fn new(config: Arc<EmulatorConfig>) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| Error::Boot(format!("no script runtime: {}", e)))?;
        Ok(ScriptHost {
            handles: RefCell::new(HandleTable::default()),
            page: RefCell::new(None),
            runtime,
            config,
        })
    }

    /// The configuration this host was created with.
    #[must_use]
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Returns `true` once a page was loaded successfully.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.page.borrow().is_some()
    }

    /// Number of pages loaded so far; handles of older pages are dead.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.handles.borrow().generation
    }

    /// Number of script objects currently kept alive for outstanding handles.
    ///
    /// Slots of dropped handles are only reclaimed when the engine next converts a value, so
    /// this may lag behind by the handles dropped since.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        let mut handles = self.handles.borrow_mut();
        handles.sweep();
        handles.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Replaces the current page: a fresh context runs the page scripts in order, then the
    /// namespace object is looked up or created.
    ///
    /// On failure the host is left without a page.
    ///
    /// # Errors
    /// - [`Error::Boot`] if the page cannot be read or the namespace name is invalid
    /// - [`Error::NotSupported`] for remote URLs
    /// - [`Error::Script`] if a page script throws
    pub fn load_page(&self, source: &PageSource) -> Result<()> {
        let namespace = self.config.namespace.as_str();
        if !is_script_identifier(namespace) {
            return Err(Error::Boot(format!("invalid namespace name {:?}", namespace)));
        }

        self.handles.borrow_mut().reset();
        self.page.borrow_mut().take();

        let (content, base) = source.read()?;
        let scripts = extract_scripts(&content, base.as_deref())?;

        let context = Context::full(&self.runtime)
            .map_err(|e| Error::Boot(format!("no script context: {}", e)))?;
        context.with(|ctx| -> Result<()> {
            if self.config.forward_console {
                ctx.globals().set(CONSOLE_NATIVE, Func::from(console_line)).caught(&ctx)?;
            }
            ctx.eval::<(), _>(CONSOLE_SHIM).caught(&ctx)?;

            for script in &scripts {
                log::debug!("evaluating page script {}", script.origin);
                ctx.eval::<(), _>(script.source.as_str()).caught(&ctx)?;
            }

            let existing: Value = ctx.globals().get(namespace).caught(&ctx)?;
            if !existing.is_object() {
                ctx.eval::<(), _>(format!("var {} = {{}};", namespace)).caught(&ctx)?;
            }
            Ok(())
        })?;

        *self.page.borrow_mut() = Some(context);
        log::info!(
            "page loaded with {} script(s), generation {}",
            scripts.len(),
            self.generation()
        );
        Ok(())
    }

    fn context(&self) -> Result<Context> {
        self.page
            .borrow()
            .clone()
            .ok_or_else(|| Error::Boot("no page is loaded".to_string()))
    }

    /// Installs the function of `annotation`.
    ///
    /// The module object is created in the namespace if it does not exist yet; without a
    /// script, a global object of the module's name is aliased instead when there is one. A
    /// script is evaluated as an expression and bound to `<module>.<name>`, replacing any
    /// earlier binding.
    ///
    /// # Errors
    /// - [`Error::Boot`] if no page is loaded
    /// - [`Error::Script`] if the script does not evaluate
    pub fn register(&self, annotation: &ImportAnnotation) -> Result<()> {
        let context = self.context()?;
        context.with(|ctx| -> Result<()> {
            let globals = ctx.globals();
            let namespace: Object = globals.get(self.config.namespace.as_str()).caught(&ctx)?;

            let existing: Value = namespace.get(annotation.module.as_str()).caught(&ctx)?;
            let module = match existing.into_object() {
                Some(module) => module,
                None => {
                    let global: Value = globals.get(annotation.module.as_str()).caught(&ctx)?;
                    let module = match global.into_object() {
                        Some(global) if !annotation.has_script() => global,
                        _ => Object::new(ctx.clone()).caught(&ctx)?,
                    };
                    namespace
                        .set(annotation.module.as_str(), module.clone())
                        .caught(&ctx)?;
                    module
                }
            };

            if let Some(script) = &annotation.script {
                let function: Value = ctx.eval(format!("({}\n)", script)).caught(&ctx)?;
                module.set(annotation.name.as_str(), function).caught(&ctx)?;
            }
            log::debug!("registered {}", annotation);
            Ok(())
        })
    }

    /// Calls `<module>.<name>(args...)` with the module as `this`.
    ///
    /// The module is taken from the namespace object, or else from a global of that name.
    ///
    /// # Errors
    /// - [`Error::UnknownFunction`] if the module or function does not exist
    /// - [`Error::Script`] if the function throws
    /// - [`Error::Boot`] if no page is loaded
    pub fn invoke(&self, module: &str, name: &str, args: &[HostValue]) -> Result<HostValue> {
        let unknown = || Error::UnknownFunction {
            module: module.to_string(),
            name: name.to_string(),
        };

        let context = self.context()?;
        context.with(|ctx| -> Result<HostValue> {
            let globals = ctx.globals();
            let namespace: Value = globals.get(self.config.namespace.as_str()).caught(&ctx)?;
            let from_namespace = match namespace.as_object() {
                Some(namespace) => namespace.get::<_, Value>(module).caught(&ctx)?.into_object(),
                None => None,
            };
            let target = match from_namespace {
                Some(target) => target,
                None => globals
                    .get::<_, Value>(module)
                    .caught(&ctx)?
                    .into_object()
                    .ok_or_else(unknown)?,
            };

            let function: Value = target.get(name).caught(&ctx)?;
            let function = function.as_function().ok_or_else(unknown)?;

            let mut call = Args::new(ctx.clone(), args.len());
            call.this(target.clone()).caught(&ctx)?;
            for arg in args {
                call.push_arg(self.to_script(&ctx, arg)?).caught(&ctx)?;
            }
            let result: Value = function.call_arg(call).caught(&ctx)?;
            self.to_host(&ctx, result)
        })
    }

    /// Evaluates `source` in the page context and returns its completion value.
    ///
    /// # Errors
    /// - [`Error::Boot`] if no page is loaded
    /// - [`Error::Script`] if the source throws
    pub fn eval(&self, source: &str) -> Result<HostValue> {
        let context = self.context()?;
        context.with(|ctx| {
            let value: Value = ctx.eval(source).caught(&ctx)?;
            self.to_host(&ctx, value)
        })
    }

    fn to_script<'js>(&self, ctx: &Ctx<'js>, value: &HostValue) -> Result<Value<'js>> {
        let string = |s: &str| -> Result<Value<'js>> {
            Ok(rquickjs::String::from_str(ctx.clone(), s).caught(ctx)?.into_value())
        };

        Ok(match value {
            HostValue::Undefined => Value::new_undefined(ctx.clone()),
            HostValue::Null => Value::new_null(ctx.clone()),
            HostValue::Bool(b) => Value::new_bool(ctx.clone(), *b),
            HostValue::Int(v) => Value::new_int(ctx.clone(), *v),
            HostValue::Double(v) => Value::new_float(ctx.clone(), *v),
            HostValue::String(s) => string(s)?,
            HostValue::StringLike(s) => string(&s.to_script_string())?,
            HostValue::Array(values) => {
                let array = rquickjs::Array::new(ctx.clone()).caught(ctx)?;
                for (i, value) in values.iter().enumerate() {
                    array.set(i, self.to_script(ctx, value)?).caught(ctx)?;
                }
                array.into_value()
            }
            HostValue::Object(handle) => {
                let handles = self.handles.borrow();
                match handles.get(handle) {
                    Some(object) => object.clone().restore(ctx).caught(ctx)?,
                    None => {
                        log::warn!("stale object handle {:?}", handle);
                        Value::new_undefined(ctx.clone())
                    }
                }
            }
        })
    }

    fn to_host<'js>(&self, ctx: &Ctx<'js>, value: Value<'js>) -> Result<HostValue> {
        if value.is_undefined() {
            return Ok(HostValue::Undefined);
        }
        if value.is_null() {
            return Ok(HostValue::Null);
        }
        if let Some(b) = value.as_bool() {
            return Ok(HostValue::Bool(b));
        }
        if let Some(v) = value.as_int() {
            return Ok(HostValue::Int(v));
        }
        if let Some(v) = value.as_float() {
            return Ok(HostValue::Double(v));
        }
        if let Some(s) = value.as_string() {
            return Ok(HostValue::String(s.to_string().caught(ctx)?));
        }
        if let Some(array) = value.as_array() {
            let mut values = Vec::with_capacity(array.len());
            for element in array.iter::<Value>() {
                values.push(self.to_host(ctx, element.caught(ctx)?)?);
            }
            return Ok(HostValue::Array(values));
        }

        let object = Persistent::save(ctx, value);
        Ok(HostValue::Object(self.handles.borrow_mut().insert(object)?))
    }
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost")
            .field("loaded", &self.is_loaded())
            .field("generation", &self.generation())
            .field("namespace", &self.config.namespace)
            .finish()
    }
}
