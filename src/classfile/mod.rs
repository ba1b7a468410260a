//! JVM class file model.
//!
//! This module reads and writes the `ClassFile` structure of JVMS §4. The model keeps the
//! constant pool fully decoded and every attribute raw, so that a parse followed by
//! [`ClassFile::to_bytes`] reproduces the input byte for byte. Only the pieces the emulator
//! touches have typed views: method access flags, [`attributes::CodeAttribute`], and the
//! annotation attributes.
//!
//! # Architecture
//!
//! - [`io`] - big-endian primitive reading/writing
//! - [`parser`] - bounds-checked cursor over the input
//! - [`constpool`] - constant pool decoding and de-duplicating insertion
//! - [`attributes`] - raw attributes and the `Code` attribute
//! - [`annotations`] - `Runtime[In]VisibleAnnotations` bodies
//! - [`descriptor`] - field and method descriptors
//! - [`access`] - class and method access flags
//!
//! # Examples
//!
//! ```rust,no_run
//! use importshim::classfile::ClassFile;
//!
//! let class = ClassFile::from_path("target/classes/com/example/Main.class")?;
//! println!("{} has {} methods", class.this_class_name()?, class.methods.len());
//! for method in &class.methods {
//!     if method.access_flags.is_native() {
//!         println!("  native {}{}", class.method_name(method)?, class.method_descriptor(method)?);
//!     }
//! }
//! # Ok::<(), importshim::Error>(())
//! ```

use std::{borrow::Cow, fs::File, path::Path};

use memmap2::Mmap;

pub mod access;
pub mod annotations;
pub mod attributes;
pub mod constpool;
pub mod descriptor;
pub mod io;
pub mod parser;

pub use access::{ClassAccess, MethodAccess};
pub use annotations::{Annotation, ElementValue};
pub use attributes::{AttributeInfo, CodeAttribute};
pub use constpool::{Constant, ConstantPool};
pub use descriptor::{MethodSignature, ReturnKind, ValueKind};

use crate::{classfile::io::write_be, Error, Parser, Result};

/// The class file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// A field declaration. Fields are carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Raw access flags
    pub access_flags: u16,
    /// Index of the field name
    pub name_index: u16,
    /// Index of the field descriptor
    pub descriptor_index: u16,
    /// Field attributes
    pub attributes: Vec<AttributeInfo>,
}

/// A method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Access flags, unknown bits retained
    pub access_flags: MethodAccess,
    /// Index of the method name
    pub name_index: u16,
    /// Index of the method descriptor
    pub descriptor_index: u16,
    /// Method attributes
    pub attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    /// Returns the first attribute named `name`.
    #[must_use]
    pub fn attribute<'a>(&'a self, pool: &ConstantPool, name: &str) -> Option<&'a AttributeInfo> {
        self.attributes.iter().find(|a| a.is_named(pool, name))
    }

    /// Decodes this method's `Code` attribute, if it has one.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the attribute body is not a valid `Code` attribute.
    pub fn code(&self, pool: &ConstantPool) -> Result<Option<CodeAttribute>> {
        self.attribute(pool, attributes::names::CODE)
            .map(|a| CodeAttribute::parse(&a.data))
            .transpose()
    }
}

/// A parsed class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// The constant pool
    pub constant_pool: ConstantPool,
    /// Class access flags, unknown bits retained
    pub access_flags: ClassAccess,
    /// Index of this class's `CONSTANT_Class`
    pub this_class: u16,
    /// Index of the superclass, 0 for `java/lang/Object` itself
    pub super_class: u16,
    /// Indices of directly implemented interfaces
    pub interfaces: Vec<u16>,
    /// Declared fields
    pub fields: Vec<FieldInfo>,
    /// Declared methods
    pub methods: Vec<MethodInfo>,
    /// Class attributes
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Parses a class file from memory.
    ///
    /// # Errors
    /// - [`Error::Empty`] for empty input
    /// - [`Error::Malformed`] for a bad magic number, invalid constants or trailing bytes
    /// - [`Error::OutOfBounds`] for truncated input
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Empty);
        }

        let mut parser = Parser::new(data);
        let magic = parser.read_be::<u32>()?;
        if magic != MAGIC {
            return Err(malformed_error!("Invalid magic 0x{:08X}", magic));
        }

        let minor_version = parser.read_be::<u16>()?;
        let major_version = parser.read_be::<u16>()?;
        let constant_pool = ConstantPool::parse(&mut parser)?;
        let access_flags = ClassAccess::from_bits_retain(parser.read_be::<u16>()?);
        let this_class = parser.read_be::<u16>()?;
        let super_class = parser.read_be::<u16>()?;

        let interface_count = parser.read_be::<u16>()?;
        let interfaces = (0..interface_count)
            .map(|_| parser.read_be::<u16>())
            .collect::<Result<Vec<_>>>()?;

        let field_count = parser.read_be::<u16>()?;
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            fields.push(FieldInfo {
                access_flags: parser.read_be()?,
                name_index: parser.read_be()?,
                descriptor_index: parser.read_be()?,
                attributes: AttributeInfo::parse_list(&mut parser)?,
            });
        }

        let method_count = parser.read_be::<u16>()?;
        let mut methods = Vec::with_capacity(usize::from(method_count));
        for _ in 0..method_count {
            methods.push(MethodInfo {
                access_flags: MethodAccess::from_bits_retain(parser.read_be()?),
                name_index: parser.read_be()?,
                descriptor_index: parser.read_be()?,
                attributes: AttributeInfo::parse_list(&mut parser)?,
            });
        }

        let attributes = AttributeInfo::parse_list(&mut parser)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class file",
                data.len() - parser.pos()
            ));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Memory-maps and parses a class file on disk.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be opened or mapped, and any error of
    /// [`ClassFile::parse`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Err(Error::Empty);
        }
        // SAFETY: the mapping is read-only and dropped before this function returns
        let mmap = unsafe { Mmap::map(&file)? };
        ClassFile::parse(&mmap)
    }

    /// Serialises the class file.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if a table exceeds the size limits of the format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        fn count(len: usize, what: &str) -> Result<u16> {
            u16::try_from(len).map_err(|_| malformed_error!("Too many {}: {}", what, len))
        }

        let mut out = Vec::new();
        write_be(&mut out, MAGIC);
        write_be(&mut out, self.minor_version);
        write_be(&mut out, self.major_version);
        self.constant_pool.write(&mut out)?;
        write_be(&mut out, self.access_flags.bits());
        write_be(&mut out, self.this_class);
        write_be(&mut out, self.super_class);

        write_be(&mut out, count(self.interfaces.len(), "interfaces")?);
        for interface in &self.interfaces {
            write_be(&mut out, *interface);
        }

        write_be(&mut out, count(self.fields.len(), "fields")?);
        for field in &self.fields {
            write_be(&mut out, field.access_flags);
            write_be(&mut out, field.name_index);
            write_be(&mut out, field.descriptor_index);
            AttributeInfo::write_list(&field.attributes, &mut out)?;
        }

        write_be(&mut out, count(self.methods.len(), "methods")?);
        for method in &self.methods {
            write_be(&mut out, method.access_flags.bits());
            write_be(&mut out, method.name_index);
            write_be(&mut out, method.descriptor_index);
            AttributeInfo::write_list(&method.attributes, &mut out)?;
        }

        AttributeInfo::write_list(&self.attributes, &mut out)?;
        Ok(out)
    }

    /// The internal name of this class, e.g. `com/example/Main`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `this_class` is not a class constant.
    pub fn this_class_name(&self) -> Result<Cow<'_, str>> {
        self.constant_pool.class_name(self.this_class)
    }

    /// The simple name of this class: the part after the last `/`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `this_class` is not a class constant.
    pub fn simple_name(&self) -> Result<String> {
        let name = self.this_class_name()?;
        Ok(simple_name(&name).to_string())
    }

    /// Name of a method of this class.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the name index is not a `Utf8` constant.
    pub fn method_name(&self, method: &MethodInfo) -> Result<Cow<'_, str>> {
        self.constant_pool.utf8(method.name_index)
    }

    /// Descriptor of a method of this class.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the descriptor index is not a `Utf8` constant.
    pub fn method_descriptor(&self, method: &MethodInfo) -> Result<Cow<'_, str>> {
        self.constant_pool.utf8(method.descriptor_index)
    }

    /// Finds a method by name and descriptor.
    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            self.method_name(m).is_ok_and(|n| n == name)
                && self.method_descriptor(m).is_ok_and(|d| d == descriptor)
        })
    }
}

/// Returns the part of an internal or binary class name after the last `/` or `.`.
#[must_use]
pub fn simple_name(class_name: &str) -> &str {
    class_name
        .rsplit_once(['/', '.'])
        .map_or(class_name, |(_, simple)| simple)
}
