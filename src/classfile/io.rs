//! Bounds-checked big-endian I/O for class file structures.
//!
//! Class files store every multi-byte quantity in big-endian order (JVMS §4). This module
//! provides the primitive read and write helpers the [`crate::classfile::parser::Parser`]
//! and the class file writer are built on.
//!
//! # Key Components
//!
//! - [`ClassIO`] - Trait for primitive types that can be read from and written to class files
//! - [`read_be_at`] / [`write_be`] - Bounds-checked primitive access
//!
//! # Examples
//!
//! ```rust,ignore
//! use importshim::classfile::io::{read_be_at, write_be};
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE];
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&data, &mut offset)?;
//! assert_eq!(magic, 0xCAFE_BABE);
//!
//! let mut out = Vec::new();
//! write_be(&mut out, 0x0034_u16);
//! assert_eq!(out, [0x00, 0x34]);
//! # Ok::<(), importshim::Error>(())
//! ```

use crate::Result;

/// Trait for implementing type-specific big-endian reading and writing.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array used for conversion.
pub trait ClassIO: Sized {
    /// Associated type representing the byte array type for this numeric type
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]> + AsRef<[u8]>;

    /// Decode from big-endian bytes
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Encode to big-endian bytes
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty),*) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Safely reads a value of type `T` in big-endian byte order from a data buffer at a specific offset.
///
/// The offset is advanced by the number of bytes read.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset += type_len;

    Ok(T::from_be_bytes(read))
}

/// Reads a value of type `T` in big-endian byte order from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Appends `value` to `out` in big-endian byte order.
pub fn write_be<T: ClassIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Overwrites the bytes at `offset` with `value` in big-endian byte order.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn write_be_at<T: ClassIO>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    if offset + bytes.len() > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[offset..offset + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_sequence() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        let mut offset = 0;

        assert_eq!(read_be_at::<u32>(&data, &mut offset).unwrap(), 0xCAFE_BABE);
        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 0);
        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 52);
        assert_eq!(offset, 8);
    }

    #[test]
    fn read_past_end() {
        let data = [0x01];
        let mut offset = 0;
        assert!(matches!(
            read_be_at::<u16>(&data, &mut offset),
            Err(crate::Error::OutOfBounds { .. })
        ));
        assert_eq!(offset, 0);
    }

    #[test]
    fn write_then_patch() {
        let mut out = Vec::new();
        write_be(&mut out, 0x0102_u16);
        write_be(&mut out, -1_i32);
        assert_eq!(out, [0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFF]);

        write_be_at(&mut out, 2, 7_u32).unwrap();
        assert_eq!(out, [0x01, 0x02, 0x00, 0x00, 0x00, 0x07]);
        assert!(write_be_at(&mut out, 5, 1_u16).is_err());
    }

    #[test]
    fn floats() {
        let mut out = Vec::new();
        write_be(&mut out, 1.5_f64);
        assert_eq!(read_be::<f64>(&out).unwrap(), 1.5);
    }
}
