use super::{invalid_data, length_u16, AttributeLike, ConstantIndex, Parse, Serialize, Utf8ConstantIndex};
use byteorder::WriteBytesExt;
use std::io::{self, Read};

/// Deepest nesting of arrays and annotations accepted inside an element value
const MAX_NESTING: usize = 256;

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface
    pub type_index: Utf8ConstantIndex,
    pub pairs: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub name_index: Utf8ConstantIndex,
    pub value: ElementValue,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive (`B`, `C`, `D`, `F`, `I`, `J`, `S`, `Z`) or `String` (`s`) constant
    ///
    /// Strings point straight at a `Utf8` constant, the others at a numeric constant.
    Const { tag: u8, value: ConstantIndex },

    /// `e`: field descriptor of the enum and the simple name of the constant
    Enum {
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },

    /// `c`: return descriptor of the class literal (so `V` for `void.class`)
    Class(Utf8ConstantIndex),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    pub fn tag(&self) -> u8 {
        match self {
            ElementValue::Const { tag, .. } => *tag,
            ElementValue::Enum { .. } => b'e',
            ElementValue::Class(_) => b'c',
            ElementValue::Annotation(_) => b'@',
            ElementValue::Array(_) => b'[',
        }
    }

    fn parse_nested<R: Read>(reader: &mut R, depth: usize) -> io::Result<Self> {
        if depth > MAX_NESTING {
            return Err(invalid_data("element values nested too deeply"));
        }
        Ok(match u8::parse(reader)? {
            tag @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's') => {
                ElementValue::Const {
                    tag,
                    value: ConstantIndex::parse(reader)?,
                }
            }
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::parse(reader)?,
                const_name: Utf8ConstantIndex::parse(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::parse(reader)?),
            b'@' => ElementValue::Annotation(Annotation::parse_nested(reader, depth + 1)?),
            b'[' => {
                let count = u16::parse(reader)?;
                let mut values = vec![];
                for _ in 0..count {
                    values.push(ElementValue::parse_nested(reader, depth + 1)?);
                }
                ElementValue::Array(values)
            }
            tag => return Err(invalid_data(format!("unknown element value tag {}", tag))),
        })
    }
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            ElementValue::Const { value, .. } => value.serialize(writer),
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                type_name.serialize(writer)?;
                const_name.serialize(writer)
            }
            ElementValue::Class(class) => class.serialize(writer),
            ElementValue::Annotation(annotation) => annotation.serialize(writer),
            ElementValue::Array(values) => {
                length_u16(values.len(), "element value array")?.serialize(writer)?;
                for value in values {
                    value.serialize(writer)?;
                }
                Ok(())
            }
        }
    }
}

impl Parse for ElementValue {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        ElementValue::parse_nested(reader, 0)
    }
}

impl Annotation {
    fn parse_nested<R: Read>(reader: &mut R, depth: usize) -> io::Result<Self> {
        let type_index = Utf8ConstantIndex::parse(reader)?;
        let count = u16::parse(reader)?;
        let mut pairs = vec![];
        for _ in 0..count {
            pairs.push(ElementValuePair {
                name_index: Utf8ConstantIndex::parse(reader)?,
                value: ElementValue::parse_nested(reader, depth)?,
            });
        }
        Ok(Annotation { type_index, pairs })
    }
}

impl Serialize for Annotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.type_index.serialize(writer)?;
        length_u16(self.pairs.len(), "element value pairs")?.serialize(writer)?;
        for pair in &self.pairs {
            pair.name_index.serialize(writer)?;
            pair.value.serialize(writer)?;
        }
        Ok(())
    }
}

impl Parse for Annotation {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        Annotation::parse_nested(reader, 0)
    }
}

/// `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations`, by `VISIBLE`
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, PartialEq, Eq)]
pub struct Annotations<const VISIBLE: bool>(pub Vec<Annotation>);

impl<const VISIBLE: bool> Serialize for Annotations<VISIBLE> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)
    }
}

impl<const VISIBLE: bool> Parse for Annotations<VISIBLE> {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        Vec::parse(reader).map(Annotations)
    }
}

pub type RuntimeVisibleAnnotations = Annotations<true>;
pub type RuntimeInvisibleAnnotations = Annotations<false>;

impl AttributeLike for Annotations<true> {
    const NAME: &'static str = "RuntimeVisibleAnnotations";
}

impl AttributeLike for Annotations<false> {
    const NAME: &'static str = "RuntimeInvisibleAnnotations";
}

/// `RuntimeVisibleParameterAnnotations` or `RuntimeInvisibleParameterAnnotations`
///
/// There is one list of annotations per parameter, with a single byte count of parameters.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.18
#[derive(Debug, PartialEq, Eq)]
pub struct ParameterAnnotations<const VISIBLE: bool>(pub Vec<Vec<Annotation>>);

impl<const VISIBLE: bool> Serialize for ParameterAnnotations<VISIBLE> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        let count = u8::try_from(self.0.len())
            .map_err(|_| invalid_data(format!("{} annotated parameters", self.0.len())))?;
        count.serialize(writer)?;
        for annotations in &self.0 {
            annotations.serialize(writer)?;
        }
        Ok(())
    }
}

impl<const VISIBLE: bool> Parse for ParameterAnnotations<VISIBLE> {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        let count = u8::parse(reader)?;
        let mut parameters = vec![];
        for _ in 0..count {
            parameters.push(Vec::parse(reader)?);
        }
        Ok(ParameterAnnotations(parameters))
    }
}

pub type RuntimeVisibleParameterAnnotations = ParameterAnnotations<true>;
pub type RuntimeInvisibleParameterAnnotations = ParameterAnnotations<false>;

impl AttributeLike for ParameterAnnotations<true> {
    const NAME: &'static str = "RuntimeVisibleParameterAnnotations";
}

impl AttributeLike for ParameterAnnotations<false> {
    const NAME: &'static str = "RuntimeInvisibleParameterAnnotations";
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.22
#[derive(Debug, PartialEq, Eq)]
pub struct AnnotationDefault(pub ElementValue);

impl Serialize for AnnotationDefault {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for AnnotationDefault {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        ElementValue::parse(reader).map(AnnotationDefault)
    }
}

impl AttributeLike for AnnotationDefault {
    const NAME: &'static str = "AnnotationDefault";
}

#[cfg(test)]
mod test {
    use super::*;

    fn utf8(index: u16) -> Utf8ConstantIndex {
        Utf8ConstantIndex(ConstantIndex(index))
    }

    #[test]
    fn nested_values() {
        // @A(x = {1, @B}, e = E.ONE, c = void.class)
        let annotation = Annotation {
            type_index: utf8(1),
            pairs: vec![
                ElementValuePair {
                    name_index: utf8(2),
                    value: ElementValue::Array(vec![
                        ElementValue::Const {
                            tag: b'I',
                            value: ConstantIndex(3),
                        },
                        ElementValue::Annotation(Annotation {
                            type_index: utf8(4),
                            pairs: vec![],
                        }),
                    ]),
                },
                ElementValuePair {
                    name_index: utf8(5),
                    value: ElementValue::Enum {
                        type_name: utf8(6),
                        const_name: utf8(7),
                    },
                },
                ElementValuePair {
                    name_index: utf8(8),
                    value: ElementValue::Class(utf8(9)),
                },
            ],
        };
        let attribute: RuntimeVisibleAnnotations = Annotations(vec![annotation]);
        let mut bytes = vec![];
        attribute.serialize(&mut bytes).unwrap();
        assert_eq!(
            bytes,
            vec![
                0, 1, 0, 1, 0, 3, // one annotation of type #1 with three pairs
                0, 2, b'[', 0, 2, b'I', 0, 3, b'@', 0, 4, 0, 0, // x
                0, 5, b'e', 0, 6, 0, 7, // e
                0, 8, b'c', 0, 9, // c
            ]
        );
        assert_eq!(RuntimeVisibleAnnotations::parse_exact(&bytes).unwrap(), attribute);
    }

    #[test]
    fn parameter_counts_are_a_byte() {
        let bytes = [2, 0, 0, 0, 1, 0, 7, 0, 0];
        let parsed = RuntimeInvisibleParameterAnnotations::parse_exact(&bytes).unwrap();
        assert_eq!(parsed.0.len(), 2);
        assert!(parsed.0[0].is_empty());
        assert_eq!(parsed.0[1][0].type_index, utf8(7));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        // arrays of one array of one array...
        let mut bytes = vec![];
        for _ in 0..100_000 {
            bytes.extend([b'[', 0, 1]);
        }
        bytes.extend([b'Z', 0, 1]);
        assert!(AnnotationDefault::parse_exact(&bytes).is_err());
    }

    #[test]
    fn unknown_tags() {
        assert!(AnnotationDefault::parse_exact(&[b'q', 0, 1]).is_err());
    }
}
