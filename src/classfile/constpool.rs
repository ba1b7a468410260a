//! The class file constant pool.
//!
//! Every name, descriptor and literal a class refers to lives in its constant pool (JVMS §4.4).
//! [`ConstantPool`] parses the pool, answers typed lookups, and appends new entries for the
//! rewriter. Appending de-duplicates against existing entries so a class that is patched twice
//! does not grow twice.
//!
//! `CONSTANT_Utf8` entries keep their raw *modified UTF-8* bytes so that re-serialising an
//! untouched pool is byte-exact; [`decode_modified_utf8`] and [`encode_modified_utf8`] convert
//! at the edges.

use std::borrow::Cow;

use crate::{
    classfile::{io::write_be, parser::Parser},
    Error, Result,
};

/// Constant pool tag values, JVMS table 4.4-B.
#[allow(missing_docs)]
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// A single constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Slot 0 and the upper half of a `Long` or `Double`
    Unusable,
    /// Raw modified UTF-8 bytes
    Utf8(Vec<u8>),
    /// `int` literal
    Integer(i32),
    /// `float` literal
    Float(f32),
    /// `long` literal, occupies two slots
    Long(i64),
    /// `double` literal, occupies two slots
    Double(f64),
    /// Class reference, index of the internal name
    Class(u16),
    /// String literal, index of the value
    String(u16),
    /// Field reference `(class, name_and_type)`
    FieldRef(u16, u16),
    /// Method reference `(class, name_and_type)`
    MethodRef(u16, u16),
    /// Interface method reference `(class, name_and_type)`
    InterfaceMethodRef(u16, u16),
    /// `(name, descriptor)`
    NameAndType(u16, u16),
    /// `(reference_kind, reference_index)`
    MethodHandle(u8, u16),
    /// Method descriptor index
    MethodType(u16),
    /// `(bootstrap_method_attr_index, name_and_type)`
    Dynamic(u16, u16),
    /// `(bootstrap_method_attr_index, name_and_type)`
    InvokeDynamic(u16, u16),
    /// Module name index
    Module(u16),
    /// Package name index
    Package(u16),
}

impl Constant {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let tag = parser.read_be::<u8>()?;
        Ok(match tag {
            tag::UTF8 => Constant::Utf8(parser.read_u16_prefixed()?.to_vec()),
            tag::INTEGER => Constant::Integer(parser.read_be()?),
            tag::FLOAT => Constant::Float(parser.read_be()?),
            tag::LONG => Constant::Long(parser.read_be()?),
            tag::DOUBLE => Constant::Double(parser.read_be()?),
            tag::CLASS => Constant::Class(parser.read_be()?),
            tag::STRING => Constant::String(parser.read_be()?),
            tag::FIELDREF => Constant::FieldRef(parser.read_be()?, parser.read_be()?),
            tag::METHODREF => Constant::MethodRef(parser.read_be()?, parser.read_be()?),
            tag::INTERFACE_METHODREF => {
                Constant::InterfaceMethodRef(parser.read_be()?, parser.read_be()?)
            }
            tag::NAME_AND_TYPE => Constant::NameAndType(parser.read_be()?, parser.read_be()?),
            tag::METHOD_HANDLE => Constant::MethodHandle(parser.read_be()?, parser.read_be()?),
            tag::METHOD_TYPE => Constant::MethodType(parser.read_be()?),
            tag::DYNAMIC => Constant::Dynamic(parser.read_be()?, parser.read_be()?),
            tag::INVOKE_DYNAMIC => Constant::InvokeDynamic(parser.read_be()?, parser.read_be()?),
            tag::MODULE => Constant::Module(parser.read_be()?),
            tag::PACKAGE => Constant::Package(parser.read_be()?),
            other => {
                return Err(malformed_error!(
                    "Unknown constant pool tag {} at offset {}",
                    other,
                    parser.pos() - 1
                ))
            }
        })
    }

    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Constant::Unusable => {}
            Constant::Utf8(bytes) => {
                let len = u16::try_from(bytes.len())
                    .map_err(|_| malformed_error!("Utf8 constant longer than 65535 bytes"))?;
                write_be(out, tag::UTF8);
                write_be(out, len);
                out.extend_from_slice(bytes);
            }
            Constant::Integer(value) => {
                write_be(out, tag::INTEGER);
                write_be(out, *value);
            }
            Constant::Float(value) => {
                write_be(out, tag::FLOAT);
                write_be(out, *value);
            }
            Constant::Long(value) => {
                write_be(out, tag::LONG);
                write_be(out, *value);
            }
            Constant::Double(value) => {
                write_be(out, tag::DOUBLE);
                write_be(out, *value);
            }
            Constant::Class(index) => write_u16_entry(out, tag::CLASS, *index),
            Constant::String(index) => write_u16_entry(out, tag::STRING, *index),
            Constant::FieldRef(a, b) => write_pair_entry(out, tag::FIELDREF, *a, *b),
            Constant::MethodRef(a, b) => write_pair_entry(out, tag::METHODREF, *a, *b),
            Constant::InterfaceMethodRef(a, b) => {
                write_pair_entry(out, tag::INTERFACE_METHODREF, *a, *b);
            }
            Constant::NameAndType(a, b) => write_pair_entry(out, tag::NAME_AND_TYPE, *a, *b),
            Constant::MethodHandle(kind, index) => {
                write_be(out, tag::METHOD_HANDLE);
                write_be(out, *kind);
                write_be(out, *index);
            }
            Constant::MethodType(index) => write_u16_entry(out, tag::METHOD_TYPE, *index),
            Constant::Dynamic(a, b) => write_pair_entry(out, tag::DYNAMIC, *a, *b),
            Constant::InvokeDynamic(a, b) => write_pair_entry(out, tag::INVOKE_DYNAMIC, *a, *b),
            Constant::Module(index) => write_u16_entry(out, tag::MODULE, *index),
            Constant::Package(index) => write_u16_entry(out, tag::PACKAGE, *index),
        }
        Ok(())
    }

    /// `Long` and `Double` take two pool slots.
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

fn write_u16_entry(out: &mut Vec<u8>, tag: u8, index: u16) {
    write_be(out, tag);
    write_be(out, index);
}

fn write_pair_entry(out: &mut Vec<u8>, tag: u8, first: u16, second: u16) {
    write_be(out, tag);
    write_be(out, first);
    write_be(out, second);
}

/// The constant pool of a class file.
///
/// Indices are 1-based as in the class file; slot 0 and the slot following a
/// `Long`/`Double` hold [`Constant::Unusable`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
        }
    }

    /// Parses `constant_pool_count` followed by the pool entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags or a zero count, and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("constant_pool_count must be at least 1"));
        }

        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(Constant::Unusable);
        while entries.len() < usize::from(count) {
            let constant = Constant::parse(parser)?;
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                if entries.len() >= usize::from(count) {
                    return Err(malformed_error!("Wide constant in the last pool slot"));
                }
                entries.push(Constant::Unusable);
            }
        }

        Ok(ConstantPool { entries })
    }

    /// Serialises `constant_pool_count` followed by the entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an entry cannot be encoded.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        write_be(out, self.count());
        for entry in &self.entries {
            entry.write(out)?;
        }
        Ok(())
    }

    /// The `constant_pool_count` value, one more than the highest index.
    #[must_use]
    pub fn count(&self) -> u16 {
        // insertion refuses to grow past u16::MAX
        u16::try_from(self.entries.len()).unwrap_or(u16::MAX)
    }

    /// Returns the entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, out of range indices and unusable slots.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index {} (count {})",
                index,
                self.entries.len()
            )),
            Some(constant) => Ok(constant),
        }
    }

    /// Returns the decoded string of the `CONSTANT_Utf8` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing, of another kind, or not valid
    /// modified UTF-8.
    pub fn utf8(&self, index: u16) -> Result<Cow<'_, str>> {
        match self.get(index)? {
            Constant::Utf8(bytes) => decode_modified_utf8(bytes),
            other => Err(malformed_error!(
                "Expected Utf8 constant at {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Returns the internal name referenced by the `CONSTANT_Class` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a class.
    pub fn class_name(&self, index: u16) -> Result<Cow<'_, str>> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(malformed_error!(
                "Expected Class constant at {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Iterates over `(index, constant)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .filter_map(|(i, c)| u16::try_from(i).ok().map(|i| (i, c)))
    }

    fn find(&self, wanted: &Constant) -> Option<u16> {
        self.iter().find(|(_, c)| *c == wanted).map(|(i, _)| i)
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > usize::from(u16::MAX) {
            return Err(Error::NotSupported(
                "constant pool would exceed 65535 entries".to_string(),
            ));
        }

        let index = u16::try_from(self.entries.len())
            .map_err(|_| Error::NotSupported("constant pool index overflow".to_string()))?;
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    fn intern(&mut self, constant: Constant) -> Result<u16> {
        match self.find(&constant) {
            Some(index) => Ok(index),
            None => self.push(constant),
        }
    }

    /// Returns the index of a `CONSTANT_Utf8` for `value`, appending one if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(Constant::Utf8(encode_modified_utf8(value)))
    }

    /// Returns the index of a `CONSTANT_Class` for the internal name `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        self.intern(Constant::Class(name))
    }

    /// Returns the index of a `CONSTANT_String` literal.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let value = self.add_utf8(value)?;
        self.intern(Constant::String(value))
    }

    /// Returns the index of a `CONSTANT_Integer` literal.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.intern(Constant::Integer(value))
    }

    /// Returns the index of a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.intern(Constant::NameAndType(name, descriptor))
    }

    /// Returns the index of a `CONSTANT_Methodref` for a class (not interface) method.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(class)?;
        let nat = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::MethodRef(class, nat))
    }

    /// Resolves a `Methodref`/`InterfaceMethodref` into `(class, name, descriptor)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is not a method reference.
    pub fn method_ref(&self, index: u16) -> Result<(String, String, String)> {
        let (class, nat) = match self.get(index)? {
            Constant::MethodRef(c, n) | Constant::InterfaceMethodRef(c, n) => (*c, *n),
            other => {
                return Err(malformed_error!(
                    "Expected method reference at {}, found {:?}",
                    index,
                    other
                ))
            }
        };

        let Constant::NameAndType(name, descriptor) = self.get(nat)? else {
            return Err(malformed_error!("Expected NameAndType at {}", nat));
        };

        Ok((
            self.class_name(class)?.into_owned(),
            self.utf8(*name)?.into_owned(),
            self.utf8(*descriptor)?.into_owned(),
        ))
    }
}

/// Decodes JVM *modified UTF-8* (JVMS §4.4.7).
///
/// Differences to standard UTF-8: NUL is encoded as `C0 80`, and supplementary characters
/// are encoded as two three-byte surrogates.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid byte sequences.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<Cow<'_, str>> {
    if bytes.iter().all(|b| *b != 0 && *b < 0x80) {
        // plain ASCII is identical in both encodings
        return std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|_| malformed_error!("Invalid ASCII in Utf8 constant"));
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return Err(malformed_error!("Raw NUL byte in modified UTF-8"));
            }
            units.push(u16::from(b0));
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes
                .get(i + 1)
                .ok_or_else(|| malformed_error!("Truncated two-byte sequence"))?;
            if b1 & 0xC0 != 0x80 {
                return Err(malformed_error!("Invalid continuation byte {:#x}", b1));
            }
            units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1 & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let (Some(b1), Some(b2)) = (bytes.get(i + 1), bytes.get(i + 2)) else {
                return Err(malformed_error!("Truncated three-byte sequence"));
            };
            if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                return Err(malformed_error!("Invalid continuation byte"));
            }
            units.push(
                (u16::from(b0 & 0x0F) << 12) | (u16::from(b1 & 0x3F) << 6) | u16::from(b2 & 0x3F),
            );
            i += 3;
        } else {
            return Err(malformed_error!("Invalid modified UTF-8 lead byte {:#x}", b0));
        }
    }

    String::from_utf16(&units)
        .map(Cow::Owned)
        .map_err(|_| malformed_error!("Unpaired surrogate in Utf8 constant"))
}

/// Encodes a string as JVM *modified UTF-8*.
#[must_use]
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_utf8_special_cases() {
        assert_eq!(encode_modified_utf8("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode_modified_utf8(&[b'a', 0xC0, 0x80]).unwrap(), "a\0");

        // U+1F600 as a surrogate pair, 3 bytes each
        let encoded = encode_modified_utf8("\u{1F600}");
        assert_eq!(encoded.len(), 6);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "\u{1F600}");

        assert_eq!(decode_modified_utf8("ä".as_bytes()).unwrap(), "ä");
        assert!(decode_modified_utf8(&[0xFF]).is_err());
        assert!(decode_modified_utf8(&[b'a', 0x00]).is_err());
    }

    #[test]
    fn interning_deduplicates() {
        let mut pool = ConstantPool::new();
        let first = pool.add_method_ref("a/B", "run", "()V").unwrap();
        let count = pool.count();
        let second = pool.add_method_ref("a/B", "run", "()V").unwrap();

        assert_eq!(first, second);
        assert_eq!(pool.count(), count);
        assert_eq!(
            pool.method_ref(first).unwrap(),
            ("a/B".to_string(), "run".to_string(), "()V".to_string())
        );
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        pool.push(Constant::Long(7)).unwrap();
        let next = pool.add_utf8("x").unwrap();
        assert_eq!(next, 3);
        assert!(pool.get(2).is_err());

        let mut out = Vec::new();
        pool.write(&mut out).unwrap();
        let parsed = ConstantPool::parse(&mut Parser::new(&out)).unwrap();
        assert_eq!(parsed, pool);
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let data = [0x00, 0x02, 0x02, 0x00];
        assert!(matches!(
            ConstantPool::parse(&mut Parser::new(&data)),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn typed_lookups_reject_other_kinds() {
        let mut pool = ConstantPool::new();
        let string = pool.add_string("hello").unwrap();
        assert!(pool.utf8(string).is_err());
        assert!(pool.class_name(string).is_err());
        assert!(pool.get(0).is_err());
        assert!(pool.get(99).is_err());
    }
}
