//! Linear decoding of JVM instruction streams.
//!
//! The decoder walks a `Code` array front to back and yields one [`Instruction`] per opcode,
//! including the variable-length `tableswitch`, `lookupswitch` and `wide` forms. It performs no
//! control flow analysis; the emulator only needs it to inspect generated proxies and to list
//! the calls a method makes.
//!
//! # Examples
//!
//! ```rust
//! use importshim::bytecode::{decode, Opcode};
//!
//! // aload_0; areturn
//! let instructions = decode(&[0x2A, 0xB0])?;
//! assert_eq!(instructions[0].opcode, Opcode::Aload0);
//! assert_eq!(instructions[1].offset, 1);
//! # Ok::<(), importshim::Error>(())
//! ```

use crate::{bytecode::opcodes::Opcode, Parser, Result};

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the opcode within the code array
    pub offset: usize,
    /// The opcode; for `wide` this is [`Opcode::Wide`] and the modified opcode is the first
    /// operand byte
    pub opcode: Opcode,
    /// Operand bytes, excluding switch alignment padding
    pub operands: Vec<u8>,
}

impl Instruction {
    /// The first two operand bytes as an unsigned index, e.g. the constant pool index of
    /// `invokestatic`, `checkcast` or `ldc_w`.
    #[must_use]
    pub fn u16_operand(&self) -> Option<u16> {
        match self.operands.as_slice() {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// The constant pool index referenced by this instruction, if it has one.
    #[must_use]
    pub fn pool_index(&self) -> Option<u16> {
        match self.opcode {
            Opcode::Ldc => self.operands.first().map(|b| u16::from(*b)),
            Opcode::LdcW
            | Opcode::Ldc2W
            | Opcode::Getstatic
            | Opcode::Putstatic
            | Opcode::Getfield
            | Opcode::Putfield
            | Opcode::Invokevirtual
            | Opcode::Invokespecial
            | Opcode::Invokestatic
            | Opcode::Invokeinterface
            | Opcode::Invokedynamic
            | Opcode::New
            | Opcode::Anewarray
            | Opcode::Checkcast
            | Opcode::Instanceof
            | Opcode::Multianewarray => self.u16_operand(),
            _ => None,
        }
    }

    /// Total encoded length, including any switch padding.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let padding = match self.opcode {
            Opcode::Tableswitch | Opcode::Lookupswitch => switch_padding(self.offset),
            _ => 0,
        };
        1 + padding + self.operands.len()
    }
}

fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn read_i32(parser: &mut Parser, operands: &mut Vec<u8>) -> Result<i32> {
    let bytes = parser.read_bytes(4)?;
    operands.extend_from_slice(bytes);
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decodes the instruction at the parser's position.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for undefined opcodes or invalid switch tables and
/// [`crate::Error::OutOfBounds`] for truncated instructions.
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let offset = parser.pos();
    let byte = parser.read_be::<u8>()?;
    let Some(opcode) = Opcode::from_repr(byte) else {
        return Err(malformed_error!("Undefined opcode 0x{:02X} at {}", byte, offset));
    };

    let operands = match opcode.operand_len() {
        Some(len) => parser.read_bytes(len)?.to_vec(),
        None => match opcode {
            Opcode::Wide => {
                let modified = parser.read_be::<u8>()?;
                let len = match Opcode::from_repr(modified) {
                    Some(Opcode::Iinc) => 4,
                    Some(
                        Opcode::Iload
                        | Opcode::Lload
                        | Opcode::Fload
                        | Opcode::Dload
                        | Opcode::Aload
                        | Opcode::Istore
                        | Opcode::Lstore
                        | Opcode::Fstore
                        | Opcode::Dstore
                        | Opcode::Astore
                        | Opcode::Ret,
                    ) => 2,
                    _ => {
                        return Err(malformed_error!(
                            "Invalid wide modified opcode 0x{:02X} at {}",
                            modified,
                            offset
                        ))
                    }
                };
                let mut operands = vec![modified];
                operands.extend_from_slice(parser.read_bytes(len)?);
                operands
            }
            Opcode::Tableswitch => {
                parser.advance_by(switch_padding(offset))?;
                let mut operands = Vec::new();
                read_i32(parser, &mut operands)?;
                let low = read_i32(parser, &mut operands)?;
                let high = read_i32(parser, &mut operands)?;
                if high < low {
                    return Err(malformed_error!("tableswitch high < low at {}", offset));
                }
                let entries = usize::try_from(i64::from(high) - i64::from(low) + 1)
                    .map_err(|_| malformed_error!("tableswitch too large at {}", offset))?;
                operands.extend_from_slice(parser.read_bytes(entries * 4)?);
                operands
            }
            Opcode::Lookupswitch => {
                parser.advance_by(switch_padding(offset))?;
                let mut operands = Vec::new();
                read_i32(parser, &mut operands)?;
                let pairs = read_i32(parser, &mut operands)?;
                let pairs = usize::try_from(pairs)
                    .map_err(|_| malformed_error!("Negative lookupswitch count at {}", offset))?;
                operands.extend_from_slice(parser.read_bytes(pairs * 8)?);
                operands
            }
            other => {
                return Err(malformed_error!("No operand layout for {} at {}", other, offset))
            }
        },
    };

    Ok(Instruction {
        offset,
        opcode,
        operands,
    })
}

/// Decodes a complete code array.
///
/// # Errors
/// Returns the first error of [`decode_instruction`].
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser)?);
    }
    Ok(instructions)
}
