//! Field and method descriptors.
//!
//! A method descriptor such as `(IJLjava/lang/String;[D)Z` encodes the parameter kinds and
//! the return kind of a method (JVMS §4.3). [`MethodSignature`] is the parsed form the
//! rewriter uses to choose load, boxing and unboxing instructions.
//!
//! # Examples
//!
//! ```rust
//! use importshim::classfile::{MethodSignature, ReturnKind, ValueKind};
//!
//! let sig = MethodSignature::parse("(IJLjava/lang/String;)V")?;
//! assert_eq!(sig.params, vec![
//!     ValueKind::Int,
//!     ValueKind::Long,
//!     ValueKind::Object("java/lang/String".into()),
//! ]);
//! assert_eq!(sig.ret, ReturnKind::Void);
//! assert_eq!(sig.arg_slots(), 4);
//! # Ok::<(), importshim::Error>(())
//! ```

use std::fmt;

use strum::{EnumDiscriminants, EnumIter, IntoStaticStr};

use crate::Result;

/// Maximum number of array dimensions a descriptor may have (JVMS §4.3.2).
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// The kind of a single value: a parameter, a field, or a non-void return.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumDiscriminants)]
#[strum_discriminants(
    name(ValueSort),
    derive(EnumIter, IntoStaticStr, Hash),
    doc = "The descriptor character class of a [`ValueKind`], without class names or components."
)]
pub enum ValueKind {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<ValueKind>),
}

impl ValueKind {
    fn parse(desc: &str, pos: &mut usize) -> Result<Self> {
        let bytes = desc.as_bytes();
        let Some(&c) = bytes.get(*pos) else {
            return Err(malformed_error!("Descriptor {:?} ends early", desc));
        };
        *pos += 1;

        Ok(match c {
            b'B' => ValueKind::Byte,
            b'C' => ValueKind::Char,
            b'D' => ValueKind::Double,
            b'F' => ValueKind::Float,
            b'I' => ValueKind::Int,
            b'J' => ValueKind::Long,
            b'S' => ValueKind::Short,
            b'Z' => ValueKind::Boolean,
            b'L' => {
                let rest = &desc[*pos..];
                let Some(end) = rest.find(';') else {
                    return Err(malformed_error!("Unterminated class name in {:?}", desc));
                };
                let name = &rest[..end];
                if name.is_empty() || name.contains(['.', '[']) {
                    return Err(malformed_error!("Invalid class name {:?} in {:?}", name, desc));
                }
                *pos += end + 1;
                ValueKind::Object(name.to_string())
            }
            b'[' => {
                let dimensions = 1 + bytes[*pos..].iter().take_while(|&&b| b == b'[').count();
                if dimensions > MAX_ARRAY_DIMENSIONS {
                    return Err(malformed_error!(
                        "{} array dimensions in {:?}, at most {} are allowed",
                        dimensions,
                        desc,
                        MAX_ARRAY_DIMENSIONS
                    ));
                }
                let component = ValueKind::parse(desc, pos)?;
                ValueKind::Array(Box::new(component))
            }
            b'V' => {
                return Err(malformed_error!(
                    "void is only valid as a return kind in {:?}",
                    desc
                ))
            }
            other => {
                return Err(malformed_error!(
                    "Unknown descriptor character {:?} in {:?}",
                    char::from(other),
                    desc
                ))
            }
        })
    }

    /// Parses a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for invalid or trailing characters.
    pub fn parse_field(desc: &str) -> Result<Self> {
        let mut pos = 0;
        let kind = ValueKind::parse(desc, &mut pos)?;
        if pos != desc.len() {
            return Err(malformed_error!("Trailing characters in descriptor {:?}", desc));
        }
        Ok(kind)
    }

    /// Number of local variable / operand stack slots a value of this kind occupies.
    #[must_use]
    pub fn slot_size(&self) -> u16 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }

    /// Returns `true` for the eight primitive kinds.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, ValueKind::Object(_) | ValueKind::Array(_))
    }

    /// The name to use in `checkcast` / `anewarray`: the internal name for classes, the
    /// descriptor for arrays, `None` for primitives.
    #[must_use]
    pub fn class_operand(&self) -> Option<String> {
        match self {
            ValueKind::Object(name) => Some(name.clone()),
            ValueKind::Array(_) => Some(self.to_string()),
            _ => None,
        }
    }

    /// The wrapper class primitives are boxed into, e.g. `java/lang/Integer` for `I`.
    #[must_use]
    pub fn box_class(&self) -> Option<&'static str> {
        Some(match self {
            ValueKind::Byte => "java/lang/Byte",
            ValueKind::Char => "java/lang/Character",
            ValueKind::Double => "java/lang/Double",
            ValueKind::Float => "java/lang/Float",
            ValueKind::Int => "java/lang/Integer",
            ValueKind::Long => "java/lang/Long",
            ValueKind::Short => "java/lang/Short",
            ValueKind::Boolean => "java/lang/Boolean",
            ValueKind::Object(_) | ValueKind::Array(_) => return None,
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Byte => f.write_str("B"),
            ValueKind::Char => f.write_str("C"),
            ValueKind::Double => f.write_str("D"),
            ValueKind::Float => f.write_str("F"),
            ValueKind::Int => f.write_str("I"),
            ValueKind::Long => f.write_str("J"),
            ValueKind::Short => f.write_str("S"),
            ValueKind::Boolean => f.write_str("Z"),
            ValueKind::Object(name) => write!(f, "L{};", name),
            ValueKind::Array(component) => write!(f, "[{}", component),
        }
    }
}

/// The return kind of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// `V`
    Void,
    /// Any value kind
    Value(ValueKind),
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnKind::Void => f.write_str("V"),
            ReturnKind::Value(kind) => kind.fmt(f),
        }
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Parameter kinds in declaration order, without the receiver
    pub params: Vec<ValueKind>,
    /// The return kind
    pub ret: ReturnKind,
}

impl MethodSignature {
    /// Parses a method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `desc` is not a well-formed method descriptor.
    pub fn parse(desc: &str) -> Result<Self> {
        if !desc.starts_with('(') {
            return Err(malformed_error!("Method descriptor {:?} must start with '('", desc));
        }

        let mut pos = 1;
        let mut params = Vec::new();
        loop {
            match desc.as_bytes().get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => params.push(ValueKind::parse(desc, &mut pos)?),
                None => return Err(malformed_error!("Unterminated parameter list in {:?}", desc)),
            }
        }

        let ret = if &desc[pos..] == "V" {
            ReturnKind::Void
        } else {
            let kind = ValueKind::parse(desc, &mut pos)?;
            if pos != desc.len() {
                return Err(malformed_error!("Trailing characters in descriptor {:?}", desc));
            }
            ReturnKind::Value(kind)
        };

        Ok(MethodSignature { params, ret })
    }

    /// Number of local variable slots the parameters occupy, excluding the receiver.
    #[must_use]
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(ValueKind::slot_size).sum()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            param.fmt(f)?;
        }
        f.write_str(")")?;
        self.ret.fmt(f)
    }
}
