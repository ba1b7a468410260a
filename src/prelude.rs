//! # importshim Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the importshim library. Import this module to get quick access to the class file
//! model, the rewriting pipeline and the script session.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all importshim operations
pub use crate::Error;

/// The result type used throughout importshim
pub use crate::Result;

/// Low-level parsing cursor
pub use crate::Parser;

// ================================================================================================
// Class Files and Bytecode
// ================================================================================================

/// Parsed class files and their parts
pub use crate::classfile::{
    ClassAccess, ClassFile, ConstantPool, MethodAccess, MethodInfo, MethodSignature, ReturnKind,
    ValueKind,
};

/// Instruction decoding and encoding
pub use crate::bytecode::{decode, CodeEncoder, Instruction, Opcode};

// ================================================================================================
// Emulator
// ================================================================================================

/// Configuration
pub use crate::emulator::EmulatorConfig;

/// Scanning and rewriting
pub use crate::emulator::{
    scan, ClassLoadHook, ClassTransformer, Diagnostic, ImportAnnotation, ImportRegistry,
    MethodKey, MethodRewriter, PatchedMethod, ScriptRegistrar,
};

/// The script engine and its session
pub use crate::emulator::{
    HostValue, PageSource, ScriptBridge, ScriptHost, Session, SessionState, StringLike,
};
