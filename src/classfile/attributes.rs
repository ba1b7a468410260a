//! Class file attributes.
//!
//! Attributes are kept as raw `(name_index, bytes)` pairs ([`AttributeInfo`]) so that any
//! attribute this crate does not understand survives a parse/serialise cycle unchanged. The
//! `Code` attribute has a typed view, [`CodeAttribute`], used by the rewriter to emit new
//! method bodies and by the decoder to inspect existing ones.

use crate::{
    classfile::{constpool::ConstantPool, io::write_be, parser::Parser},
    Result,
};

/// Attribute names consulted by this crate.
#[allow(missing_docs)]
pub mod names {
    pub const CODE: &str = "Code";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const SIGNATURE: &str = "Signature";
    pub const EXCEPTIONS: &str = "Exceptions";
}

/// A raw attribute: the name index and the undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Index of the `CONSTANT_Utf8` attribute name
    pub name_index: u16,
    /// The attribute body, without the 6 byte header
    pub data: Vec<u8>,
}

impl AttributeInfo {
    /// Parses one attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let name_index = parser.read_be::<u16>()?;
        let data = parser.read_u32_prefixed()?.to_vec();
        Ok(AttributeInfo { name_index, data })
    }

    /// Parses a `u16` count followed by that many attributes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse_list(parser: &mut Parser) -> Result<Vec<Self>> {
        let count = parser.read_be::<u16>()?;
        (0..count).map(|_| AttributeInfo::parse(parser)).collect()
    }

    /// Serialises the attribute including its header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the body is larger than 4 GiB.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let len = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("Attribute body exceeds u32 length"))?;
        write_be(out, self.name_index);
        write_be(out, len);
        out.extend_from_slice(&self.data);
        Ok(())
    }

    /// Serialises a `u16` count followed by the attributes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if there are more than 65535 attributes.
    pub fn write_list(attributes: &[AttributeInfo], out: &mut Vec<u8>) -> Result<()> {
        let count = u16::try_from(attributes.len())
            .map_err(|_| malformed_error!("More than 65535 attributes"))?;
        write_be(out, count);
        for attribute in attributes {
            attribute.write(out)?;
        }
        Ok(())
    }

    /// Returns `true` if this attribute's name is `name`.
    #[must_use]
    pub fn is_named(&self, pool: &ConstantPool, name: &str) -> bool {
        pool.utf8(self.name_index).is_ok_and(|n| n == name)
    }
}

/// One entry of a `Code` attribute's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// Start of the protected range (inclusive)
    pub start_pc: u16,
    /// End of the protected range (exclusive)
    pub end_pc: u16,
    /// Handler start
    pub handler_pc: u16,
    /// Caught class, 0 for any
    pub catch_type: u16,
}

/// Typed view of a `Code` attribute (JVMS §4.7.3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeAttribute {
    /// Maximum operand stack depth, in slots
    pub max_stack: u16,
    /// Number of local variable slots including parameters
    pub max_locals: u16,
    /// The instruction stream
    pub code: Vec<u8>,
    /// Exception handlers
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Nested attributes (`LineNumberTable`, `StackMapTable`, ...)
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    /// Parses the body of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input, and
    /// [`crate::Error::Malformed`] for an empty instruction stream.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let code = parser.read_u32_prefixed()?.to_vec();
        if code.is_empty() {
            return Err(malformed_error!("Code attribute with empty code array"));
        }

        let handlers = parser.read_be::<u16>()?;
        let mut exception_table = Vec::with_capacity(usize::from(handlers));
        for _ in 0..handlers {
            exception_table.push(ExceptionTableEntry {
                start_pc: parser.read_be()?,
                end_pc: parser.read_be()?,
                handler_pc: parser.read_be()?,
                catch_type: parser.read_be()?,
            });
        }
        let attributes = AttributeInfo::parse_list(&mut parser)?;

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Serialises the body of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code exceeds the 65535 byte limit of the
    /// format or a table overflows its count.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.code.is_empty() || self.code.len() > usize::from(u16::MAX) {
            return Err(malformed_error!(
                "Code length {} outside 1..=65535",
                self.code.len()
            ));
        }
        let handlers = u16::try_from(self.exception_table.len())
            .map_err(|_| malformed_error!("Exception table overflow"))?;

        let mut out = Vec::with_capacity(12 + self.code.len());
        write_be(&mut out, self.max_stack);
        write_be(&mut out, self.max_locals);
        write_be(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        write_be(&mut out, handlers);
        for entry in &self.exception_table {
            write_be(&mut out, entry.start_pc);
            write_be(&mut out, entry.end_pc);
            write_be(&mut out, entry.handler_pc);
            write_be(&mut out, entry.catch_type);
        }
        AttributeInfo::write_list(&self.attributes, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_attribute_layout() {
        let code = CodeAttribute {
            max_stack: 2,
            max_locals: 1,
            code: vec![0x2A, 0xB0],
            exception_table: vec![ExceptionTableEntry {
                start_pc: 0,
                end_pc: 1,
                handler_pc: 1,
                catch_type: 0,
            }],
            attributes: Vec::new(),
        };

        let bytes = code.to_bytes().unwrap();
        assert_eq!(&bytes[..8], &[0, 2, 0, 1, 0, 0, 0, 2]);
        assert_eq!(CodeAttribute::parse(&bytes).unwrap(), code);
    }

    #[test]
    fn empty_code_rejected() {
        assert!(CodeAttribute::default().to_bytes().is_err());
        let bytes = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(CodeAttribute::parse(&bytes).is_err());
    }

    #[test]
    fn attribute_names() {
        let mut pool = ConstantPool::new();
        let name_index = pool.add_utf8(names::CODE).unwrap();
        let attribute = AttributeInfo {
            name_index,
            data: vec![1, 2, 3],
        };

        assert!(attribute.is_named(&pool, "Code"));
        assert!(!attribute.is_named(&pool, "Signature"));

        let mut out = Vec::new();
        attribute.write(&mut out).unwrap();
        assert_eq!(out.len(), 9);
        assert_eq!(AttributeInfo::parse(&mut Parser::new(&out)).unwrap(), attribute);
    }
}
