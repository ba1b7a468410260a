//! The import emulator.
//!
//! Native methods of compiled classes that carry the import annotation are backed, in the
//! compiled WebAssembly, by functions of the embedding page. When the same classes run on a
//! JVM instead, the emulator rewrites those native methods at load time into proxies that call
//! the same functions in an embedded QuickJS engine.
//!
//! # Architecture
//!
//! - [`scanner`] - finds import-annotated native methods in a class
//! - [`registry`] - the per-class `name + descriptor` to annotation map
//! - [`rewriter`] - generates the proxy bodies and registers their functions
//! - [`hook`] - the per-class entry point of a class-definition interceptor
//! - [`host`] - the script engine, bound to one thread
//! - [`session`] - the lifecycle manager that owns the engine thread
//! - [`bridge`] - the call surface the proxies end up in
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use importshim::emulator::{ClassLoadHook, ClassTransformer, EmulatorConfig, Session};
//!
//! let config = EmulatorConfig::from_agent_args("boot_timeout_ms=10000")?;
//! let session = Session::new(config.clone());
//! let hook = ClassLoadHook::new(config, Arc::new(session.clone()));
//!
//! let bytes = std::fs::read("target/classes/com/example/Bindings.class")?;
//! let defined = hook.transform("com/example/Bindings", &bytes)?;
//! println!("{} bytes, rewritten: {:?}", defined.len(), hook.patched("com/example/Bindings"));
//!
//! session.launch_file("index.html", |host| host.eval("typeof wasmImports"))?;
//! # Ok::<(), importshim::Error>(())
//! ```

pub mod annotation;
pub mod bridge;
pub mod config;
mod functions;
pub mod hook;
pub mod host;
pub mod page;
pub mod registry;
pub mod rewriter;
pub mod scanner;
pub mod session;
pub mod state;
pub mod value;

pub use annotation::ImportAnnotation;
pub use bridge::ScriptBridge;
pub use config::EmulatorConfig;
pub use hook::{ClassLoadHook, ClassTransformer};
pub use host::ScriptHost;
pub use page::PageSource;
pub use registry::{ImportRegistry, MethodKey};
pub use rewriter::{MethodRewriter, NoopRegistrar, PatchedMethod, ScriptRegistrar};
pub use scanner::{scan, Diagnostic, ScanResult};
pub use session::Session;
pub use state::SessionState;
pub use value::{HostValue, ObjectHandle, StringLike};
