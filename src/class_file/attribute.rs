use super::{
    parse_u32_bytes, ClassConstantIndex, ConstantIndex, InnerClassAccessFlags, Parse, Serialize,
    Utf8ConstantIndex,
};
use byteorder::WriteBytesExt;
use std::io::{self, Read};

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attributes are kept in this raw form in a `ClassFile`, and are only parsed into one of the
/// structures below once their name has been looked up.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Parse for Attribute {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        let name_index = Utf8ConstantIndex::parse(reader)?;
        let info = parse_u32_bytes(reader)?;
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize + Parse {
    /// Name of the attribute
    const NAME: &'static str;
}

macro_rules! attribute_io {
    ($name:ident => $($field:ident: $type:ty),* $(,)?) => {
        impl Serialize for $name {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
                $(self.$field.serialize(writer)?;)*
                Ok(())
            }
        }

        impl Parse for $name {
            fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
                Ok($name { $($field: <$type>::parse(reader)?),* })
            }
        }
    };
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.2
#[derive(Debug, PartialEq, Eq)]
pub struct ConstantValue {
    pub value: ConstantIndex,
}

attribute_io!(ConstantValue => value: ConstantIndex);

impl AttributeLike for ConstantValue {
    const NAME: &'static str = "ConstantValue";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

attribute_io!(Code =>
    max_stack: u16,
    max_locals: u16,
    code_array: BytecodeArray,
    exception_table: Vec<ExceptionHandler>,
    attributes: Vec<Attribute>,
);

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Class of exceptions caught, or 0 to catch everything
    pub catch_type: ConstantIndex,
}

attribute_io!(ExceptionHandler =>
    start_pc: u16,
    end_pc: u16,
    handler_pc: u16,
    catch_type: ConstantIndex,
);

/// Encoded bytecode instructions
#[derive(Debug, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Parse for BytecodeArray {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        parse_u32_bytes(reader).map(BytecodeArray)
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.5
#[derive(Debug, PartialEq, Eq)]
pub struct Exceptions {
    pub exceptions: Vec<ClassConstantIndex>,
}

attribute_io!(Exceptions => exceptions: Vec<ClassConstantIndex>);

impl AttributeLike for Exceptions {
    const NAME: &'static str = "Exceptions";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.6
#[derive(Debug, PartialEq, Eq)]
pub struct InnerClasses {
    pub classes: Vec<InnerClass>,
}

attribute_io!(InnerClasses => classes: Vec<InnerClass>);

impl AttributeLike for InnerClasses {
    const NAME: &'static str = "InnerClasses";
}

#[derive(Debug, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class: ClassConstantIndex,

    /// Enclosing class, or 0 for local and anonymous classes
    pub outer_class: ConstantIndex,

    /// Simple name, or 0 for anonymous classes
    pub inner_name: ConstantIndex,
    pub access_flags: InnerClassAccessFlags,
}

attribute_io!(InnerClass =>
    inner_class: ClassConstantIndex,
    outer_class: ConstantIndex,
    inner_name: ConstantIndex,
    access_flags: InnerClassAccessFlags,
);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.7
#[derive(Debug, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub class: ClassConstantIndex,

    /// Name and type of the enclosing method, or 0 if the class is not enclosed by a method
    pub method: ConstantIndex,
}

attribute_io!(EnclosingMethod => class: ClassConstantIndex, method: ConstantIndex);

impl AttributeLike for EnclosingMethod {
    const NAME: &'static str = "EnclosingMethod";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.9
#[derive(Debug, PartialEq, Eq)]
pub struct Signature {
    pub signature: Utf8ConstantIndex,
}

attribute_io!(Signature => signature: Utf8ConstantIndex);

impl AttributeLike for Signature {
    const NAME: &'static str = "Signature";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.10
#[derive(Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub source_file: Utf8ConstantIndex,
}

attribute_io!(SourceFile => source_file: Utf8ConstantIndex);

impl AttributeLike for SourceFile {
    const NAME: &'static str = "SourceFile";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, PartialEq, Eq)]
pub struct LineNumberTable {
    pub lines: Vec<LineNumber>,
}

attribute_io!(LineNumberTable => lines: Vec<LineNumber>);

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

#[derive(Debug, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

attribute_io!(LineNumber => start_pc: u16, line_number: u16);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, PartialEq, Eq)]
pub struct LocalVariableTable {
    pub variables: Vec<LocalVariable>,
}

attribute_io!(LocalVariableTable => variables: Vec<LocalVariable>);

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";
}

/// Same layout as `LocalVariableTable`, but with generic signatures instead of descriptors
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.14
#[derive(Debug, PartialEq, Eq)]
pub struct LocalVariableTypeTable {
    pub variables: Vec<LocalVariable>,
}

attribute_io!(LocalVariableTypeTable => variables: Vec<LocalVariable>);

impl AttributeLike for LocalVariableTypeTable {
    const NAME: &'static str = "LocalVariableTypeTable";
}

#[derive(Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: Utf8ConstantIndex,

    /// Descriptor or signature, depending on the table
    pub descriptor: Utf8ConstantIndex,
    pub index: u16,
}

attribute_io!(LocalVariable =>
    start_pc: u16,
    length: u16,
    name: Utf8ConstantIndex,
    descriptor: Utf8ConstantIndex,
    index: u16,
);

/// Marker attribute, with no contents
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.15
#[derive(Debug, PartialEq, Eq)]
pub struct Deprecated;

impl Serialize for Deprecated {
    fn serialize<W: WriteBytesExt>(&self, _writer: &mut W) -> io::Result<()> {
        Ok(())
    }
}

impl Parse for Deprecated {
    fn parse<R: Read>(_reader: &mut R) -> io::Result<Self> {
        Ok(Deprecated)
    }
}

impl AttributeLike for Deprecated {
    const NAME: &'static str = "Deprecated";
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn code_attribute_round_trip() {
        let code = Code {
            max_stack: 2,
            max_locals: 1,
            code_array: BytecodeArray(vec![0x2a, 0xb0]),
            exception_table: vec![ExceptionHandler {
                start_pc: 0,
                end_pc: 1,
                handler_pc: 1,
                catch_type: ConstantIndex::NONE,
            }],
            attributes: vec![Attribute {
                name_index: Utf8ConstantIndex(ConstantIndex(9)),
                info: vec![1, 2, 3],
            }],
        };
        let mut bytes = vec![];
        code.serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 2 + 2 + 4 + 2 + 2 + 8 + 2 + 2 + 4 + 3);
        assert_eq!(Code::parse_exact(&bytes).unwrap(), code);
    }

    #[test]
    fn deprecated_is_empty() {
        let mut bytes = vec![];
        Deprecated.serialize(&mut bytes).unwrap();
        assert!(bytes.is_empty());
        assert!(Deprecated::parse_exact(&[0]).is_err());
    }
}
