//! Instruction encoding with operand stack tracking.
//!
//! [`CodeEncoder`] appends instructions to a code array and interns their constants into the
//! class's [`ConstantPool`]. Every emitting method updates the simulated operand stack depth,
//! in slots, so that [`CodeEncoder::finalize`] can produce a `Code` attribute with an exact
//! `max_stack`. The encoder only emits straight-line code; it has no labels.
//!
//! # Examples
//!
//! ```rust
//! use importshim::bytecode::CodeEncoder;
//! use importshim::classfile::{ConstantPool, ReturnKind, ValueKind};
//!
//! let mut pool = ConstantPool::new();
//! let mut encoder = CodeEncoder::new(&mut pool);
//! encoder
//!     .load(&ValueKind::Int, 0)?
//!     .load(&ValueKind::Int, 1)?
//!     .invokestatic("java/lang/Math", "max", "(II)I")?
//!     .return_value(&ReturnKind::Value(ValueKind::Int))?;
//!
//! let code = encoder.finalize(2)?;
//! assert_eq!(code.max_stack, 2);
//! # Ok::<(), importshim::Error>(())
//! ```

use crate::{
    bytecode::opcodes::Opcode,
    classfile::{
        attributes::CodeAttribute, io::write_be, ConstantPool, MethodSignature, ReturnKind,
        ValueKind,
    },
    Result,
};

/// Emits straight-line bytecode while tracking the operand stack.
pub struct CodeEncoder<'a> {
    pool: &'a mut ConstantPool,
    code: Vec<u8>,
    depth: u16,
    max_depth: u16,
}

impl<'a> CodeEncoder<'a> {
    /// Creates an encoder that interns constants into `pool`.
    #[must_use]
    pub fn new(pool: &'a mut ConstantPool) -> Self {
        CodeEncoder {
            pool,
            code: Vec::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    /// Current operand stack depth in slots.
    #[must_use]
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Highest stack depth reached so far.
    #[must_use]
    pub fn max_stack(&self) -> u16 {
        self.max_depth
    }

    /// The code emitted so far.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    fn update_stack_depth(&mut self, pops: u16, pushes: u16) -> Result<()> {
        if pops > self.depth {
            return Err(malformed_error!(
                "Operand stack underflow at offset {}: need {} slots, have {}",
                self.code.len(),
                pops,
                self.depth
            ));
        }
        self.depth = self.depth - pops + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        Ok(())
    }

    fn emit(&mut self, opcode: Opcode, pops: u16, pushes: u16) -> Result<&mut Self> {
        self.update_stack_depth(pops, pushes)?;
        self.code.push(opcode.code());
        Ok(self)
    }

    fn emit_u16(&mut self, opcode: Opcode, operand: u16, pops: u16, pushes: u16) -> Result<&mut Self> {
        self.emit(opcode, pops, pushes)?;
        write_be(&mut self.code, operand);
        Ok(self)
    }

    /// `aconst_null`
    ///
    /// # Errors
    /// Never fails; returns `Result` for chaining.
    pub fn aconst_null(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::AconstNull, 0, 1)
    }

    /// Pushes a string literal with `ldc` or `ldc_w`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the constant pool is full.
    pub fn ldc_string(&mut self, value: &str) -> Result<&mut Self> {
        let index = self.pool.add_string(value)?;
        match u8::try_from(index) {
            Ok(short) => {
                self.emit(Opcode::Ldc, 0, 1)?;
                self.code.push(short);
                Ok(self)
            }
            Err(_) => self.emit_u16(Opcode::LdcW, index, 0, 1),
        }
    }

    /// Pushes an `int` constant using the shortest encoding.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if a pool constant is needed and the pool is full.
    pub fn push_int(&mut self, value: i32) -> Result<&mut Self> {
        match value {
            -1 => self.emit(Opcode::IconstM1, 0, 1),
            0 => self.emit(Opcode::Iconst0, 0, 1),
            1 => self.emit(Opcode::Iconst1, 0, 1),
            2 => self.emit(Opcode::Iconst2, 0, 1),
            3 => self.emit(Opcode::Iconst3, 0, 1),
            4 => self.emit(Opcode::Iconst4, 0, 1),
            5 => self.emit(Opcode::Iconst5, 0, 1),
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    self.emit(Opcode::Bipush, 0, 1)?;
                    self.code.push(byte.to_be_bytes()[0]);
                    Ok(self)
                } else if let Ok(short) = i16::try_from(value) {
                    self.emit(Opcode::Sipush, 0, 1)?;
                    self.code.extend_from_slice(&short.to_be_bytes());
                    Ok(self)
                } else {
                    let index = self.pool.add_integer(value)?;
                    match u8::try_from(index) {
                        Ok(short) => {
                            self.emit(Opcode::Ldc, 0, 1)?;
                            self.code.push(short);
                            Ok(self)
                        }
                        Err(_) => self.emit_u16(Opcode::LdcW, index, 0, 1),
                    }
                }
            }
        }
    }

    /// `anewarray`: pops a length, pushes a new array of `class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the constant pool is full.
    pub fn anewarray(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.pool.add_class(class)?;
        self.emit_u16(Opcode::Anewarray, index, 1, 1)
    }

    /// `dup`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Dup, 1, 2)
    }

    /// `aastore`: pops array, index and value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn aastore(&mut self) -> Result<&mut Self> {
        self.emit(Opcode::Aastore, 3, 0)
    }

    /// Loads local `slot` with the load instruction matching `kind`.
    ///
    /// Slots 0 to 3 use the one byte forms, larger slots `wide` when needed.
    ///
    /// # Errors
    /// Never fails for valid slots; returns `Result` for chaining.
    pub fn load(&mut self, kind: &ValueKind, slot: u16) -> Result<&mut Self> {
        let (base, short_base) = match kind {
            ValueKind::Boolean
            | ValueKind::Byte
            | ValueKind::Char
            | ValueKind::Short
            | ValueKind::Int => (Opcode::Iload, Opcode::Iload0),
            ValueKind::Long => (Opcode::Lload, Opcode::Lload0),
            ValueKind::Float => (Opcode::Fload, Opcode::Fload0),
            ValueKind::Double => (Opcode::Dload, Opcode::Dload0),
            ValueKind::Object(_) | ValueKind::Array(_) => (Opcode::Aload, Opcode::Aload0),
        };
        let pushes = kind.slot_size();

        if slot <= 3 {
            let opcode = Opcode::from_repr(short_base.code() + slot as u8)
                .ok_or_else(|| malformed_error!("No short load form for slot {}", slot))?;
            return self.emit(opcode, 0, pushes);
        }

        match u8::try_from(slot) {
            Ok(byte) => {
                self.emit(base, 0, pushes)?;
                self.code.push(byte);
            }
            Err(_) => {
                self.emit(Opcode::Wide, 0, pushes)?;
                self.code.push(base.code());
                write_be(&mut self.code, slot);
            }
        }
        Ok(self)
    }

    fn invoke(
        &mut self,
        opcode: Opcode,
        class: &str,
        name: &str,
        descriptor: &str,
        receiver: u16,
    ) -> Result<&mut Self> {
        let signature = MethodSignature::parse(descriptor)?;
        let pushes = match &signature.ret {
            ReturnKind::Void => 0,
            ReturnKind::Value(kind) => kind.slot_size(),
        };
        let index = self.pool.add_method_ref(class, name, descriptor)?;
        self.emit_u16(opcode, index, signature.arg_slots() + receiver, pushes)
    }

    /// `invokestatic class.name descriptor`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad descriptor or stack underflow.
    pub fn invokestatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(Opcode::Invokestatic, class, name, descriptor, 0)
    }

    /// `invokevirtual class.name descriptor`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad descriptor or stack underflow.
    pub fn invokevirtual(&mut self, class: &str, name: &str, descriptor: &str) -> Result<&mut Self> {
        self.invoke(Opcode::Invokevirtual, class, name, descriptor, 1)
    }

    /// `checkcast class`; `class` is an internal name or an array descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn checkcast(&mut self, class: &str) -> Result<&mut Self> {
        let index = self.pool.add_class(class)?;
        self.emit_u16(Opcode::Checkcast, index, 1, 1)
    }

    /// Discards a value of `slots` size with `pop` or `pop2`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn pop(&mut self, slots: u16) -> Result<&mut Self> {
        if slots == 2 {
            self.emit(Opcode::Pop2, 2, 0)
        } else {
            self.emit(Opcode::Pop, 1, 0)
        }
    }

    /// Narrows the `int` on top of the stack to `kind` (`i2b`, `i2c`, `i2s`); a no-op for the
    /// other kinds.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn narrow(&mut self, kind: &ValueKind) -> Result<&mut Self> {
        match kind {
            ValueKind::Byte => self.emit(Opcode::I2b, 1, 1),
            ValueKind::Char => self.emit(Opcode::I2c, 1, 1),
            ValueKind::Short => self.emit(Opcode::I2s, 1, 1),
            _ => Ok(self),
        }
    }

    /// Emits the return instruction matching `kind`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the stack does not hold a value of that kind.
    pub fn return_value(&mut self, kind: &ReturnKind) -> Result<&mut Self> {
        let kind = match kind {
            ReturnKind::Void => return self.emit(Opcode::Return, 0, 0),
            ReturnKind::Value(kind) => kind,
        };
        let opcode = match kind {
            ValueKind::Boolean
            | ValueKind::Byte
            | ValueKind::Char
            | ValueKind::Short
            | ValueKind::Int => Opcode::Ireturn,
            ValueKind::Long => Opcode::Lreturn,
            ValueKind::Float => Opcode::Freturn,
            ValueKind::Double => Opcode::Dreturn,
            ValueKind::Object(_) | ValueKind::Array(_) => Opcode::Areturn,
        };
        self.emit(opcode, kind.slot_size(), 0)
    }

    /// Finishes the method body.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if nothing was emitted or the code exceeds
    /// 65535 bytes.
    pub fn finalize(self, max_locals: u16) -> Result<CodeAttribute> {
        if self.code.is_empty() || self.code.len() > usize::from(u16::MAX) {
            return Err(malformed_error!("Code length {} outside 1..=65535", self.code.len()));
        }
        Ok(CodeAttribute {
            max_stack: self.max_depth,
            max_locals,
            code: self.code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        })
    }
}
