//! JVM bytecode encoding and decoding.
//!
//! - [`opcodes`] - the instruction set table
//! - [`encoder`] - [`CodeEncoder`], used by the rewriter to emit proxy bodies
//! - [`decoder`] - [`decode`], a linear decoder for inspecting method bodies

pub mod decoder;
pub mod encoder;
pub mod opcodes;

pub use decoder::{decode, decode_instruction, Instruction};
pub use encoder::CodeEncoder;
pub use opcodes::Opcode;
