//! Parsing of `Runtime[In]VisibleAnnotations` attributes.
//!
//! Annotations are stored on methods as a list of `annotation` structures (JVMS §4.7.16):
//! a type descriptor index plus `(element_name_index, element_value)` pairs. Element values
//! are a tagged union whose constant forms point into the constant pool. This module decodes
//! the structure without resolving it; [`ElementValue::as_string`] and friends resolve
//! against a [`ConstantPool`] on demand.

use std::borrow::Cow;

use crate::{
    classfile::{constpool::Constant, constpool::ConstantPool, parser::Parser},
    Result,
};

/// Element value tags, JVMS table 4.7.16.1-A.
#[allow(missing_docs)]
pub mod element_tag {
    pub const BYTE: u8 = b'B';
    pub const CHAR: u8 = b'C';
    pub const DOUBLE: u8 = b'D';
    pub const FLOAT: u8 = b'F';
    pub const INT: u8 = b'I';
    pub const LONG: u8 = b'J';
    pub const SHORT: u8 = b'S';
    pub const BOOLEAN: u8 = b'Z';
    pub const STRING: u8 = b's';
    pub const ENUM: u8 = b'e';
    pub const CLASS: u8 = b'c';
    pub const ANNOTATION: u8 = b'@';
    pub const ARRAY: u8 = b'[';
}

/// One annotation: its type and its explicitly given elements.
///
/// Elements left at their declared default are absent from the class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Index of the field descriptor of the annotation type, e.g. `Lpkg/Import;`
    pub type_index: u16,
    /// `(element_name_index, value)` pairs in class file order
    pub elements: Vec<(u16, ElementValue)>,
}

/// The value of an annotation element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// A primitive or string constant: the tag and the constant pool index
    Const {
        /// One of the [`element_tag`] constant tags
        tag: u8,
        /// Index of the constant
        index: u16,
    },
    /// An enum constant
    Enum {
        /// Index of the enum type descriptor
        type_name_index: u16,
        /// Index of the constant's simple name
        const_name_index: u16,
    },
    /// A class literal, index of the return descriptor
    Class(u16),
    /// A nested annotation
    Annotation(Box<Annotation>),
    /// An array of values
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Parses one `annotation` structure.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown element tags and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let type_index = parser.read_be::<u16>()?;
        let pairs = parser.read_be::<u16>()?;
        let mut elements = Vec::with_capacity(usize::from(pairs));
        for _ in 0..pairs {
            let name_index = parser.read_be::<u16>()?;
            elements.push((name_index, ElementValue::parse(parser)?));
        }
        Ok(Annotation {
            type_index,
            elements,
        })
    }

    /// Returns the annotation type descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the type index is not a `Utf8` constant.
    pub fn type_descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<Cow<'p, str>> {
        pool.utf8(self.type_index)
    }

    /// Iterates over `(element name, value)` pairs, resolving the names.
    ///
    /// # Errors
    /// Each item is an error if its name index does not resolve to a `Utf8` constant.
    pub fn named_elements<'a, 'p>(
        &'a self,
        pool: &'p ConstantPool,
    ) -> impl Iterator<Item = Result<(Cow<'p, str>, &'a ElementValue)>> + 'a
    where
        'p: 'a,
    {
        self.elements
            .iter()
            .map(move |(name, value)| Ok((pool.utf8(*name)?, value)))
    }
}

impl ElementValue {
    /// Parses one `element_value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let tag = parser.read_be::<u8>()?;
        Ok(match tag {
            element_tag::BYTE
            | element_tag::CHAR
            | element_tag::DOUBLE
            | element_tag::FLOAT
            | element_tag::INT
            | element_tag::LONG
            | element_tag::SHORT
            | element_tag::BOOLEAN
            | element_tag::STRING => ElementValue::Const {
                tag,
                index: parser.read_be()?,
            },
            element_tag::ENUM => ElementValue::Enum {
                type_name_index: parser.read_be()?,
                const_name_index: parser.read_be()?,
            },
            element_tag::CLASS => ElementValue::Class(parser.read_be()?),
            element_tag::ANNOTATION => ElementValue::Annotation(Box::new(Annotation::parse(parser)?)),
            element_tag::ARRAY => {
                let count = parser.read_be::<u16>()?;
                let values = (0..count)
                    .map(|_| ElementValue::parse(parser))
                    .collect::<Result<Vec<_>>>()?;
                ElementValue::Array(values)
            }
            other => {
                return Err(malformed_error!(
                    "Unknown element_value tag {:?}",
                    char::from(other)
                ))
            }
        })
    }

    /// Resolves a string constant (`s` tag).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if this is not a string constant or the index
    /// does not resolve to a `Utf8` entry.
    pub fn as_string<'p>(&self, pool: &'p ConstantPool) -> Result<Cow<'p, str>> {
        match self {
            ElementValue::Const {
                tag: element_tag::STRING,
                index,
            } => pool.utf8(*index),
            other => Err(malformed_error!("Expected a string element, found {:?}", other)),
        }
    }

    /// Resolves an `int`-like constant (`B`, `C`, `I`, `S`, `Z` tags).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if this is not an int-like constant.
    pub fn as_int(&self, pool: &ConstantPool) -> Result<i32> {
        match self {
            ElementValue::Const { tag, index }
                if matches!(
                    *tag,
                    element_tag::BYTE
                        | element_tag::CHAR
                        | element_tag::INT
                        | element_tag::SHORT
                        | element_tag::BOOLEAN
                ) =>
            {
                match pool.get(*index)? {
                    Constant::Integer(value) => Ok(*value),
                    other => Err(malformed_error!("Expected Integer constant, found {:?}", other)),
                }
            }
            other => Err(malformed_error!("Expected an int element, found {:?}", other)),
        }
    }
}

/// Parses the body of a `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if the body is not a
/// well-formed annotation list, including trailing garbage.
pub fn parse_annotations(data: &[u8]) -> Result<Vec<Annotation>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let annotations = (0..count)
        .map(|_| Annotation::parse(&mut parser))
        .collect::<Result<Vec<_>>>()?;

    if parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after annotation list",
            data.len() - parser.pos()
        ));
    }
    Ok(annotations)
}

/// Serialises an annotation list in attribute body layout.
///
/// Used to build annotated classes programmatically.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a count overflows `u16`.
pub fn write_annotations(annotations: &[Annotation], out: &mut Vec<u8>) -> Result<()> {
    use crate::classfile::io::write_be;

    fn count(len: usize) -> Result<u16> {
        u16::try_from(len).map_err(|_| malformed_error!("Annotation table overflow"))
    }

    fn write_value(value: &ElementValue, out: &mut Vec<u8>) -> Result<()> {
        match value {
            ElementValue::Const { tag, index } => {
                write_be(out, *tag);
                write_be(out, *index);
            }
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => {
                write_be(out, element_tag::ENUM);
                write_be(out, *type_name_index);
                write_be(out, *const_name_index);
            }
            ElementValue::Class(index) => {
                write_be(out, element_tag::CLASS);
                write_be(out, *index);
            }
            ElementValue::Annotation(nested) => {
                write_be(out, element_tag::ANNOTATION);
                write_one(nested, out)?;
            }
            ElementValue::Array(values) => {
                write_be(out, element_tag::ARRAY);
                write_be(out, count(values.len())?);
                for value in values {
                    write_value(value, out)?;
                }
            }
        }
        Ok(())
    }

    fn write_one(annotation: &Annotation, out: &mut Vec<u8>) -> Result<()> {
        write_be(out, annotation.type_index);
        write_be(out, count(annotation.elements.len())?);
        for (name, value) in &annotation.elements {
            write_be(out, *name);
            write_value(value, out)?;
        }
        Ok(())
    }

    write_be(out, count(annotations.len())?);
    for annotation in annotations {
        write_one(annotation, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ConstantPool, Vec<Annotation>) {
        let mut pool = ConstantPool::new();
        let ty = pool.add_utf8("Lx/Import;").unwrap();
        let module = pool.add_utf8("module").unwrap();
        let value = pool.add_utf8("M").unwrap();
        let flag = pool.add_utf8("flag").unwrap();
        let one = pool.add_integer(1).unwrap();

        let annotation = Annotation {
            type_index: ty,
            elements: vec![
                (
                    module,
                    ElementValue::Const {
                        tag: element_tag::STRING,
                        index: value,
                    },
                ),
                (
                    flag,
                    ElementValue::Array(vec![ElementValue::Const {
                        tag: element_tag::BOOLEAN,
                        index: one,
                    }]),
                ),
            ],
        };
        (pool, vec![annotation])
    }

    #[test]
    fn parse_written_list() {
        let (pool, annotations) = sample();
        let mut bytes = Vec::new();
        write_annotations(&annotations, &mut bytes).unwrap();

        let parsed = parse_annotations(&bytes).unwrap();
        assert_eq!(parsed, annotations);
        assert_eq!(parsed[0].type_descriptor(&pool).unwrap(), "Lx/Import;");

        let elements: Vec<_> = parsed[0]
            .named_elements(&pool)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(elements[0].0, "module");
        assert_eq!(elements[0].1.as_string(&pool).unwrap(), "M");
        assert!(elements[1].1.as_string(&pool).is_err());
    }

    #[test]
    fn int_elements() {
        let (pool, annotations) = sample();
        let ElementValue::Array(values) = &annotations[0].elements[1].1 else {
            panic!("expected array");
        };
        assert_eq!(values[0].as_int(&pool).unwrap(), 1);
    }

    #[test]
    fn unknown_tag() {
        // one annotation, type 1, one pair, name 2, tag 'x'
        let bytes = [0, 1, 0, 1, 0, 1, 0, 2, b'x', 0, 0];
        assert!(parse_annotations(&bytes).is_err());
    }

    #[test]
    fn trailing_bytes() {
        let bytes = [0, 0, 0xFF];
        assert!(parse_annotations(&bytes).is_err());
    }
}
