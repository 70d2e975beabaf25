use super::{
    invalid_data, Attribute, ClassAccessFlags, ClassConstantIndex, Constant, ConstantIndex,
    FieldAccessFlags, MethodAccessFlags, Parse, Serialize, Utf8ConstantIndex, Version,
};
use crate::errors::Error;
use crate::util::OffsetVec;
use byteorder::WriteBytesExt;
use std::io::{self, ErrorKind, Read};

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, PartialEq, Eq)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Superclass, or 0 for `java/lang/Object`
    pub super_class: ConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file, requiring that all of the bytes are used
    pub fn from_bytes(bytes: &[u8]) -> Result<ClassFile, Error> {
        ClassFile::parse_exact(bytes).map_err(|err| match err.kind() {
            ErrorKind::UnexpectedEof => Error::class_file("truncated class file"),
            _ => Error::class_file(err.to_string()),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for ClassFile {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(invalid_data(format!("bad class file magic {:02x?}", magic)));
        }
        Ok(ClassFile {
            version: Version::parse(reader)?,
            constants: OffsetVec::parse(reader)?,
            access_flags: ClassAccessFlags::parse(reader)?,
            this_class: ClassConstantIndex::parse(reader)?,
            super_class: ConstantIndex::parse(reader)?,
            interfaces: Vec::parse(reader)?,
            fields: Vec::parse(reader)?,
            methods: Vec::parse(reader)?,
            attributes: Vec::parse(reader)?,
        })
    }
}

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug, PartialEq, Eq)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Field {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Field {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Field {
            access_flags: FieldAccessFlags::parse(reader)?,
            name_index: Utf8ConstantIndex::parse(reader)?,
            descriptor_index: Utf8ConstantIndex::parse(reader)?,
            attributes: Vec::parse(reader)?,
        })
    }
}

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, PartialEq, Eq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Method {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Method {
            access_flags: MethodAccessFlags::parse(reader)?,
            name_index: Utf8ConstantIndex::parse(reader)?,
            descriptor_index: Utf8ConstantIndex::parse(reader)?,
            attributes: Vec::parse(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::Offset;

    fn minimal_class() -> ClassFile {
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        let this_name = constants.push(Constant::Utf8("Foo".to_owned()));
        let this_class = constants.push(Constant::Class(Utf8ConstantIndex(ConstantIndex(
            this_name.0 as u16,
        ))));
        ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class: ClassConstantIndex(ConstantIndex(this_class.0 as u16)),
            super_class: ConstantIndex::NONE,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
    }

    #[test]
    fn round_trip() {
        let class = minimal_class();
        let bytes = class.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &ClassFile::MAGIC);
        assert_eq!(ClassFile::from_bytes(&bytes).unwrap(), class);
    }

    #[test]
    fn malformed_class_files() {
        let bytes = minimal_class().to_bytes().unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[3] = 0xBF;
        assert!(matches!(
            ClassFile::from_bytes(&bad_magic),
            Err(Error::ClassFile(_))
        ));

        assert!(matches!(
            ClassFile::from_bytes(&bytes[..bytes.len() - 1]),
            Err(Error::ClassFile(_))
        ));

        let mut trailing = bytes;
        trailing.push(0);
        assert!(ClassFile::from_bytes(&trailing).is_err());
    }
}
