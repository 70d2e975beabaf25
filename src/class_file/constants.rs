use super::{invalid_data, length_u16, Attribute, AttributeLike, Parse, Serialize};
use crate::errors::Error;
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::collections::{HashMap, HashSet};
use std::io::{self, Read};

/// Constants as in the constant pool
///
/// Floating point constants are kept as their raw bits, so that every NaN survives unchanged.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(u32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(u64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is Java's modified UTF-8 (CESU-8 with a two byte null).
    Utf8(String),

    /// `Utf8` constant holding unpaired surrogates, kept as its UTF-16 units
    Utf8Units(Vec<u16>),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle { kind: u8, member: ConstantIndex },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant or call site
    Dynamic {
        is_call_site: bool,
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Module or package name
    ModuleOrPackage { is_module: bool, name: Utf8ConstantIndex },
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                let buffer = cesu8::to_java_cesu8(string);
                1u8.serialize(writer)?;
                length_u16(buffer.len(), "Utf8 constant")?.serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Utf8Units(units) => {
                let buffer = encode_units(units);
                1u8.serialize(writer)?;
                length_u16(buffer.len(), "Utf8 constant")?.serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(bits) => {
                4u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(bits) => {
                6u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle { kind, member } => {
                15u8.serialize(writer)?;
                kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                is_call_site,
                bootstrap_method,
                name_and_type,
            } => {
                (if *is_call_site { 18u8 } else { 17u8 }).serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::ModuleOrPackage { is_module, name } => {
                (if *is_module { 19u8 } else { 20u8 }).serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Parse for Constant {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(match u8::parse(reader)? {
            1 => {
                let length = u16::parse(reader)?;
                let mut bytes = vec![0; length as usize];
                reader.read_exact(&mut bytes)?;
                match cesu8::from_java_cesu8(&bytes) {
                    Ok(string) => Constant::Utf8(string.into_owned()),
                    Err(_) => Constant::Utf8Units(decode_units(&bytes)?),
                }
            }
            3 => Constant::Integer(i32::parse(reader)?),
            4 => Constant::Float(u32::parse(reader)?),
            5 => Constant::Long(i64::parse(reader)?),
            6 => Constant::Double(u64::parse(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::parse(reader)?),
            8 => Constant::String(Utf8ConstantIndex::parse(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::parse(reader)?,
                NameAndTypeConstantIndex::parse(reader)?,
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::parse(reader)?,
                name_and_type: NameAndTypeConstantIndex::parse(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::parse(reader)?,
                descriptor: Utf8ConstantIndex::parse(reader)?,
            },
            15 => Constant::MethodHandle {
                kind: u8::parse(reader)?,
                member: ConstantIndex::parse(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::parse(reader)?,
            },
            tag @ (17 | 18) => Constant::Dynamic {
                is_call_site: tag == 18,
                bootstrap_method: u16::parse(reader)?,
                name_and_type: NameAndTypeConstantIndex::parse(reader)?,
            },
            tag @ (19 | 20) => Constant::ModuleOrPackage {
                is_module: tag == 19,
                name: Utf8ConstantIndex::parse(reader)?,
            },
            tag => return Err(invalid_data(format!("unknown constant tag {}", tag))),
        })
    }
}

/// Encode UTF-16 units one by one in modified UTF-8
///
/// `cesu8` only encodes `str`, which cannot hold the unpaired surrogates these constants have.
fn encode_units(units: &[u16]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(units.len() * 3);
    for &unit in units {
        match unit {
            0x0001..=0x007F => buffer.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buffer.push((unit >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
            _ => {
                buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Decode modified UTF-8 into UTF-16 units, without requiring surrogates to be paired
fn decode_units(bytes: &[u8]) -> io::Result<Vec<u16>> {
    let malformed = || invalid_data("malformed modified UTF-8 constant");
    let continuation = |byte: Option<&u8>| match byte {
        Some(byte) if byte & 0b1100_0000 == 0b1000_0000 => Ok((byte & 0x3F) as u16),
        _ => Err(malformed()),
    };

    let mut units = vec![];
    let mut bytes = bytes.iter();
    while let Some(&first) = bytes.next() {
        let unit = match first {
            0x01..=0x7F => first as u16,
            0xC0..=0xDF => (first as u16 & 0x1F) << 6 | continuation(bytes.next())?,
            0xE0..=0xEF => {
                let high = continuation(bytes.next())?;
                (first as u16 & 0x0F) << 12 | high << 6 | continuation(bytes.next())?
            }
            _ => return Err(malformed()),
        };
        units.push(unit);
    }
    Ok(units)
}


/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

impl ConstantIndex {
    /// Index 0 is used to mean "no constant" (eg. a `catch_type` catching everything)
    pub const NONE: ConstantIndex = ConstantIndex(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

macro_rules! typed_indices {
    ($($name:ident),*) => {
        $(
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Parse for $name {
                fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
                    ConstantIndex::parse(reader).map($name)
                }
            }
        )*
    };
}

typed_indices!(
    Utf8ConstantIndex,
    ClassConstantIndex,
    NameAndTypeConstantIndex
);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for ConstantIndex {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        u16::parse(reader).map(ConstantIndex)
    }
}

/// Typed lookups into a parsed constant pool
pub trait ConstantsReader {
    fn constant(&self, index: ConstantIndex) -> Result<&Constant, Error>;

    fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0)? {
            Constant::Utf8(string) => Ok(string),
            Constant::Utf8Units(_) => Err(Error::class_file(format!(
                "Utf8 constant at index {} is not valid Unicode",
                (index.0).0
            ))),
            other => Err(unexpected_constant(index.0, "Utf8", other)),
        }
    }

    /// UTF-16 units of a `Utf8` constant, which need not be valid Unicode
    fn utf8_units(&self, index: Utf8ConstantIndex) -> Result<Vec<u16>, Error> {
        match self.constant(index.0)? {
            Constant::Utf8(string) => Ok(string.encode_utf16().collect()),
            Constant::Utf8Units(units) => Ok(units.clone()),
            other => Err(unexpected_constant(index.0, "Utf8", other)),
        }
    }

    fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(unexpected_constant(index.0, "Class", other)),
        }
    }

    /// Class name, or `None` for the 0 index
    fn optional_class_name(&self, index: ConstantIndex) -> Result<Option<&str>, Error> {
        if index.is_none() {
            Ok(None)
        } else {
            self.class_name(ClassConstantIndex(index)).map(Some)
        }
    }

    fn optional_utf8(&self, index: ConstantIndex) -> Result<Option<&str>, Error> {
        if index.is_none() {
            Ok(None)
        } else {
            self.utf8(Utf8ConstantIndex(index)).map(Some)
        }
    }

    fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.constant(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(unexpected_constant(index.0, "NameAndType", other)),
        }
    }

    /// Class, name, and descriptor of a field or method reference
    fn member(&self, index: ConstantIndex) -> Result<MemberKey<'_>, Error> {
        let (kind, class, name_and_type) = match self.constant(index)? {
            Constant::FieldRef(class, name_and_type) => (MemberKind::Field, class, name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface: false,
            } => (MemberKind::Method, class, name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface: true,
            } => (MemberKind::InterfaceMethod, class, name_and_type),
            other => return Err(unexpected_constant(index, "member reference", other)),
        };
        let (name, descriptor) = self.name_and_type(*name_and_type)?;
        Ok(MemberKey {
            kind,
            class: self.class_name(*class)?,
            name,
            descriptor,
        })
    }
}

impl ConstantsReader for OffsetVec<Constant> {
    fn constant(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.get_offset(Offset(index.0 as usize))
            .ok()
            .ok_or_else(|| Error::class_file(format!("no constant at index {}", index.0)))
    }
}

fn unexpected_constant(index: ConstantIndex, expected: &str, found: &Constant) -> Error {
    Error::class_file(format!(
        "expected {} constant at index {} but found {:?}",
        expected, index.0, found
    ))
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemberKey<'a> {
    pub kind: MemberKind,
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Value-level description of a constant, used to build class file constant pools
///
/// Unlike `Constant`, keys refer to other constants by value, so they can be recorded before any
/// index has been assigned.
#[derive(Clone, Hash, Eq, PartialEq, Debug)]
pub enum PoolKey {
    Utf8(String),
    Utf8Units(Vec<u16>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(String),
    String(String),
    StringUnits(Vec<u16>),
    NameAndType(String, String),
    Member(MemberKind, String, String, String),
}

impl PoolKey {
    fn dependencies(&self) -> Vec<PoolKey> {
        match self {
            PoolKey::Class(name) | PoolKey::String(name) => vec![PoolKey::Utf8(name.clone())],
            PoolKey::StringUnits(units) => vec![PoolKey::Utf8Units(units.clone())],
            PoolKey::NameAndType(name, descriptor) => vec![
                PoolKey::Utf8(name.clone()),
                PoolKey::Utf8(descriptor.clone()),
            ],
            PoolKey::Member(_, class, name, descriptor) => vec![
                PoolKey::Class(class.clone()),
                PoolKey::NameAndType(name.clone(), descriptor.clone()),
            ],
            _ => vec![],
        }
    }
}

impl Width for PoolKey {
    fn width(&self) -> usize {
        match self {
            PoolKey::Long(_) | PoolKey::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Something which hands out constant pool indices
///
/// Class files are written by running the same code twice: once against a `ConstantsCollector`,
/// which records every constant and hands out placeholder indices, and once against the
/// `ConstantsPool` built from what was collected, which hands out the real indices.
pub trait ConstantsWriter {
    /// Get the index of a constant
    fn constant_index(&mut self, key: PoolKey) -> Result<ConstantIndex, Error>;

    /// Get the index of a constant loaded by a single byte `ldc`
    fn narrow_constant_index(&mut self, key: PoolKey) -> Result<u8, Error>;

    fn utf8(&mut self, string: &str) -> Result<Utf8ConstantIndex, Error> {
        self.constant_index(PoolKey::Utf8(string.to_owned()))
            .map(Utf8ConstantIndex)
    }

    fn class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        self.constant_index(PoolKey::Class(name.to_owned()))
            .map(ClassConstantIndex)
    }

    fn name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        self.constant_index(PoolKey::NameAndType(name.to_owned(), descriptor.to_owned()))
            .map(NameAndTypeConstantIndex)
    }

    fn member(
        &mut self,
        kind: MemberKind,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        self.constant_index(PoolKey::Member(
            kind,
            class.to_owned(),
            name.to_owned(),
            descriptor.to_owned(),
        ))
    }

    /// Serialize an attribute, along with its name
    fn attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<Attribute, Error> {
        let name_index = self.utf8(A::NAME)?;
        let mut info = vec![];
        attribute.serialize(&mut info)?;
        Ok(Attribute { name_index, info })
    }
}

/// First pass of writing a class file: record all of the constants needed
#[derive(Default, Debug)]
pub struct ConstantsCollector {
    priority: Vec<PoolKey>,
    priority_seen: HashSet<PoolKey>,
    keys: Vec<PoolKey>,
    seen: HashSet<PoolKey>,
}

impl ConstantsCollector {
    pub fn new() -> ConstantsCollector {
        ConstantsCollector::default()
    }

    /// Whether a constant has been recorded
    pub fn contains(&self, key: &PoolKey) -> bool {
        self.seen.contains(key) || self.priority_seen.contains(key)
    }

    /// Names of all class constants recorded so far, in the order they were recorded
    pub fn class_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.priority
            .iter()
            .chain(self.keys.iter())
            .filter_map(|key| match key {
                PoolKey::Class(name) => Some(name.as_str()),
                _ => None,
            })
    }

    fn record(&mut self, key: PoolKey) {
        if self.seen.insert(key.clone()) {
            let dependencies = key.dependencies();
            self.keys.push(key);
            for dependency in dependencies {
                self.record(dependency);
            }
        }
    }
}

impl ConstantsWriter for ConstantsCollector {
    fn constant_index(&mut self, key: PoolKey) -> Result<ConstantIndex, Error> {
        self.record(key);
        Ok(ConstantIndex::NONE)
    }

    fn narrow_constant_index(&mut self, key: PoolKey) -> Result<u8, Error> {
        if self.priority_seen.insert(key.clone()) {
            for dependency in key.dependencies() {
                self.record(dependency);
            }
            self.priority.push(key);
        }
        Ok(0)
    }
}

/// Class file constants pool, with every index already assigned
///
/// Constants loaded by a narrow `ldc` come first (so that their indices fit in a byte), then the
/// rest in the order they were first recorded.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,
    indices: HashMap<PoolKey, ConstantIndex>,
}

impl ConstantsPool {
    /// Assign indices to everything collected
    pub fn new(collector: ConstantsCollector, class_name: &str) -> Result<ConstantsPool, Error> {
        let ConstantsCollector {
            priority,
            priority_seen,
            keys,
            ..
        } = collector;

        let mut layout: OffsetVec<PoolKey> = OffsetVec::new_starting_at(Offset(1));
        let rest = keys.into_iter().filter(|key| !priority_seen.contains(key));
        for key in priority.into_iter().chain(rest) {
            let _ = layout.push(key);
        }

        let Offset(slots) = layout.offset_len();
        if slots > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow {
                class: class_name.to_owned(),
                slots,
            });
        }

        let indices: HashMap<PoolKey, ConstantIndex> = layout
            .iter()
            .map(|(Offset(offset), _, key)| (key.clone(), ConstantIndex(offset as u16)))
            .collect();
        let lookup = |key: PoolKey| -> Result<ConstantIndex, Error> {
            indices
                .get(&key)
                .copied()
                .ok_or_else(|| Error::format(format!("constant {:?} was never collected", key)))
        };

        let mut constants = OffsetVec::new_starting_at(Offset(1));
        for (_, _, key) in &layout {
            let constant = match key {
                PoolKey::Utf8(string) => Constant::Utf8(string.clone()),
                PoolKey::Utf8Units(units) => Constant::Utf8Units(units.clone()),
                PoolKey::Integer(integer) => Constant::Integer(*integer),
                PoolKey::Float(bits) => Constant::Float(*bits),
                PoolKey::Long(long) => Constant::Long(*long),
                PoolKey::Double(bits) => Constant::Double(*bits),
                PoolKey::Class(name) => {
                    Constant::Class(Utf8ConstantIndex(lookup(PoolKey::Utf8(name.clone()))?))
                }
                PoolKey::String(string) => {
                    Constant::String(Utf8ConstantIndex(lookup(PoolKey::Utf8(string.clone()))?))
                }
                PoolKey::StringUnits(units) => Constant::String(Utf8ConstantIndex(lookup(
                    PoolKey::Utf8Units(units.clone()),
                )?)),
                PoolKey::NameAndType(name, descriptor) => Constant::NameAndType {
                    name: Utf8ConstantIndex(lookup(PoolKey::Utf8(name.clone()))?),
                    descriptor: Utf8ConstantIndex(lookup(PoolKey::Utf8(descriptor.clone()))?),
                },
                PoolKey::Member(kind, class, name, descriptor) => {
                    let class = ClassConstantIndex(lookup(PoolKey::Class(class.clone()))?);
                    let name_and_type = NameAndTypeConstantIndex(lookup(PoolKey::NameAndType(
                        name.clone(),
                        descriptor.clone(),
                    ))?);
                    match kind {
                        MemberKind::Field => Constant::FieldRef(class, name_and_type),
                        MemberKind::Method | MemberKind::InterfaceMethod => Constant::MethodRef {
                            class,
                            name_and_type,
                            is_interface: *kind == MemberKind::InterfaceMethod,
                        },
                    }
                }
            };
            let _ = constants.push(constant);
        }

        Ok(ConstantsPool { constants, indices })
    }

    /// Consume the pool and return the final vector of constants
    pub fn into_offset_vec(self) -> OffsetVec<Constant> {
        self.constants
    }
}

impl ConstantsWriter for ConstantsPool {
    fn constant_index(&mut self, key: PoolKey) -> Result<ConstantIndex, Error> {
        self.indices
            .get(&key)
            .copied()
            .ok_or_else(|| Error::format(format!("constant {:?} was never collected", key)))
    }

    fn narrow_constant_index(&mut self, key: PoolKey) -> Result<u8, Error> {
        let ConstantIndex(index) = self.constant_index(key)?;
        u8::try_from(index)
            .map_err(|_| Error::format(format!("ldc target #{} does not fit in a byte", index)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dependencies_follow_their_constant() {
        let mut collector = ConstantsCollector::new();
        collector
            .member(MemberKind::Field, "pkg/A", "x", "I")
            .unwrap();
        collector.constant_index(PoolKey::Long(7)).unwrap();
        collector.class("pkg/A").unwrap();

        let pool = ConstantsPool::new(collector, "pkg/A").unwrap();
        let constants = pool.into_offset_vec();
        let expected = vec![
            Constant::FieldRef(
                ClassConstantIndex(ConstantIndex(2)),
                NameAndTypeConstantIndex(ConstantIndex(4)),
            ),
            Constant::Class(Utf8ConstantIndex(ConstantIndex(3))),
            Constant::Utf8("pkg/A".to_owned()),
            Constant::NameAndType {
                name: Utf8ConstantIndex(ConstantIndex(5)),
                descriptor: Utf8ConstantIndex(ConstantIndex(6)),
            },
            Constant::Utf8("x".to_owned()),
            Constant::Utf8("I".to_owned()),
            Constant::Long(7),
        ];
        let found: Vec<Constant> = constants.iter().map(|(_, _, c)| c.clone()).collect();
        assert_eq!(found, expected);
        assert_eq!(constants.offset_len(), Offset(9));
    }

    #[test]
    fn narrow_constants_come_first() {
        let mut collector = ConstantsCollector::new();
        for i in 0..300 {
            collector.constant_index(PoolKey::Integer(i)).unwrap();
        }
        collector
            .narrow_constant_index(PoolKey::String("hello".to_owned()))
            .unwrap();
        collector
            .narrow_constant_index(PoolKey::Integer(299))
            .unwrap();

        let mut pool = ConstantsPool::new(collector, "A").unwrap();
        assert_eq!(
            pool.narrow_constant_index(PoolKey::String("hello".to_owned()))
                .unwrap(),
            1
        );
        assert_eq!(pool.narrow_constant_index(PoolKey::Integer(299)).unwrap(), 2);
        // 299 of the integers, then the string's contents
        assert_eq!(
            pool.constant_index(PoolKey::Integer(0)).unwrap(),
            ConstantIndex(3)
        );
        assert_eq!(
            pool.constant_index(PoolKey::Utf8("hello".to_owned())).unwrap(),
            ConstantIndex(302)
        );
        assert!(pool.narrow_constant_index(PoolKey::Integer(298)).is_err());
    }

    #[test]
    fn overflowing_pool() {
        let mut collector = ConstantsCollector::new();
        for i in 0..32768 {
            collector.constant_index(PoolKey::Long(i)).unwrap();
        }
        match ConstantsPool::new(collector, "Big") {
            Err(Error::ConstantPoolOverflow { slots, .. }) => assert_eq!(slots, 65537),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn parse_and_lookup() {
        let mut collector = ConstantsCollector::new();
        let key = PoolKey::Member(
            MemberKind::InterfaceMethod,
            "java/util/List".to_owned(),
            "size".to_owned(),
            "()I".to_owned(),
        );
        collector.constant_index(key.clone()).unwrap();
        let mut pool = ConstantsPool::new(collector, "A").unwrap();
        let index = pool.constant_index(key).unwrap();

        let mut bytes = vec![];
        pool.into_offset_vec().serialize(&mut bytes).unwrap();
        let parsed = OffsetVec::<Constant>::parse_exact(&bytes).unwrap();

        let member = parsed.member(index).unwrap();
        assert_eq!(member.kind, MemberKind::InterfaceMethod);
        assert_eq!(member.class, "java/util/List");
        assert_eq!(member.name, "size");
        assert_eq!(member.descriptor, "()I");
        assert!(parsed.utf8(Utf8ConstantIndex(index)).is_err());
    }
}
