use crate::util::{Offset, OffsetVec, Width};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Cursor, ErrorKind, Read};

/// Counterpart of `Serialize`: reads a construct from a class file
///
/// All primitives are big endian and sequences are prefixed with a `u16` length, except where an
/// implementation says otherwise.
pub trait Parse: Sized {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self>;

    /// Parse from a byte slice, requiring that every byte is consumed
    fn parse_exact(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let parsed = Self::parse(&mut cursor)?;
        if cursor.position() as usize != bytes.len() {
            return Err(invalid_data(format!(
                "{} trailing bytes",
                bytes.len() - cursor.position() as usize
            )));
        }
        Ok(parsed)
    }
}

macro_rules! impl_primitive {
    ($type:ty: $($read:tt)+) => {
        impl Parse for $type {
            fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
                $($read)+(reader)
            }
        }
    };
}

impl_primitive!(u8: ReadBytesExt::read_u8);
impl_primitive!(u16: ReadBytesExt::read_u16::<BigEndian>);
impl_primitive!(u32: ReadBytesExt::read_u32::<BigEndian>);
impl_primitive!(u64: ReadBytesExt::read_u64::<BigEndian>);
impl_primitive!(i8: ReadBytesExt::read_i8);
impl_primitive!(i16: ReadBytesExt::read_i16::<BigEndian>);
impl_primitive!(i32: ReadBytesExt::read_i32::<BigEndian>);
impl_primitive!(i64: ReadBytesExt::read_i64::<BigEndian>);

impl<A: Parse> Parse for Vec<A> {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        let count = u16::parse(reader)?;
        let mut elems = Vec::with_capacity(count as usize);
        for _ in 0..count {
            elems.push(A::parse(reader)?);
        }
        Ok(elems)
    }
}

/// Constant pools start at offset 1 and are prefixed with their offset length
impl<A: Parse + Width> Parse for OffsetVec<A> {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        let offset_len = u16::parse(reader)? as usize;
        if offset_len == 0 {
            return Err(invalid_data("constant pool count of 0"));
        }
        let mut elems = OffsetVec::new_starting_at(Offset(1));
        while elems.offset_len().0 < offset_len {
            let _ = elems.push(A::parse(reader)?);
        }
        if elems.offset_len().0 != offset_len {
            return Err(invalid_data("last constant overflows the constant pool"));
        }
        Ok(elems)
    }
}

/// Bytes prefixed by a `u32` length
pub fn parse_u32_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = u32::parse(reader)? as usize;
    let mut bytes = vec![];
    reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(io::Error::from(ErrorKind::UnexpectedEof));
    }
    Ok(bytes)
}

pub fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, message.into())
}
