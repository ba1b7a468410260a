// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'classfile/mod.rs' uses mmap to map a class file into memory

//! # importshim
//!
//! Load-time rewriting of import-annotated native methods into calls against an embedded
//! script engine.
//!
//! Code written for a Java-to-WebAssembly compiler declares the functions it needs from the
//! embedding page as `native` methods with an import annotation naming a module, a function
//! and, optionally, the script source of the function. In the browser the compiler wires those
//! imports up. `importshim` makes the same classes runnable on a plain JVM: a class-load hook
//! turns each such native method into a small proxy that calls the function inside an embedded
//! QuickJS engine, which runs on its own thread behind a synchronous session API.
//!
//! ## Features
//!
//! - **Class file model** - byte-exact reading and writing of JVM class files
//! - **Bytecode encoder** - straight-line code generation with exact `max_stack`
//! - **Annotation scanner** - finds import annotations without decoding method bodies
//! - **Proxy rewriter** - boxing, string-like wrappers, unboxing per return type
//! - **Script host** - QuickJS with module namespaces, console forwarding and object handles
//! - **Session** - one engine thread, a single execution slot, error and panic propagation
//!
//! ## Quick Start
//!
//! ```rust
//! use importshim::prelude::*;
//!
//! let session = Session::new(EmulatorConfig::testing());
//! session.register_script(ImportAnnotation::with_script("M", "add", "(a, b) => a + b").into())?;
//!
//! let sum = session.invoke("M", "add", vec![HostValue::Int(2), HostValue::Int(3)])?;
//! assert_eq!(sum, HostValue::Int(5));
//! # Ok::<(), importshim::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`classfile`] - Class file parsing, constant pool, attributes, annotations, descriptors
//! - [`bytecode`] - Opcode table, instruction decoder and encoder
//! - [`emulator`] - Scanner, rewriter, class-load hook, script host and session
//! - [`utils`] - Synchronization helpers
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust,no_run
//! use importshim::{Error, classfile::ClassFile};
//!
//! match ClassFile::from_path("Bindings.class") {
//!     Ok(class) => println!("Loaded {}", class.this_class_name()?),
//!     Err(Error::Malformed { message, .. }) => println!("Malformed class: {}", message),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! # Ok::<(), importshim::Error>(())
//! ```
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! cargo +nightly fuzz run classfile --release
//! ```
//!
//! ### Testing
//!
//! ```bash
//! RUST_LOG=debug cargo test
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use importshim::prelude::*;
///
/// let class = ClassFile::from_path("Bindings.class")?;
/// let found = scan(&class, &EmulatorConfig::default().import_annotation)?;
/// println!("{} import(s)", found.registry.len());
/// # Ok::<(), importshim::Error>(())
/// ```
pub mod prelude;

/// JVM class file reading and writing.
///
/// The model keeps every structure the emulator does not touch in raw form, so that an
/// unmodified class serializes back to its exact input bytes.
///
/// # Key Types
///
/// - [`classfile::ClassFile`] - a parsed class
/// - [`classfile::ConstantPool`] - constant pool with de-duplicating insertion
/// - [`classfile::MethodSignature`] - parsed method descriptors
pub mod classfile;

/// JVM instruction set, decoding and encoding.
///
/// # Examples
///
/// ```rust
/// use importshim::bytecode::{decode, Opcode};
///
/// let code = [0x1A, 0x1B, 0x60, 0xAC]; // iload_0 iload_1 iadd ireturn
/// let instructions = decode(&code)?;
/// assert_eq!(instructions[2].opcode, Opcode::Iadd);
/// # Ok::<(), importshim::Error>(())
/// ```
pub mod bytecode;

/// The import emulator: scanning, rewriting, and the script engine session.
pub mod emulator;

/// Utilities shared across the crate.
pub mod utils;

/// `importshim` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `importshim` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use importshim::{Error, classfile::ClassFile};
///
/// assert!(matches!(ClassFile::parse(&[]), Err(Error::Empty)));
/// ```
pub use error::Error;

/// Bounds-checked cursor over class file bytes.
///
/// # Example
///
/// ```rust
/// use importshim::Parser;
///
/// let mut parser = Parser::new(&[0xCA, 0xFE, 0xBA, 0xBE]);
/// assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
/// # Ok::<(), importshim::Error>(())
/// ```
pub use classfile::parser::Parser;
