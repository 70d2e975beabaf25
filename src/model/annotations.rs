//! Annotations in the segment model
//!
//! Element values refer to the segment pool directly: numeric constants by category, strings
//! and names as `Utf8` entries, and type descriptors as signatures.

use crate::class_file::{
    self, ConstantsReader, ConstantsWriter, ElementValuePair, PoolKey, Utf8ConstantIndex,
};
use crate::cp::{ConstantPool, DoubleId, FloatId, IntId, LongId, SignatureId, Utf8Id};
use crate::errors::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub descriptor: SignatureId,
    pub pairs: Vec<(Utf8Id, ElementValue)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementValue {
    /// `B`, `C`, `I`, `S`, or `Z`, all of which are stored as `Integer` constants
    Int { tag: u8, value: IntId },
    Float(FloatId),
    Long(LongId),
    Double(DoubleId),
    String(Utf8Id),
    Enum { descriptor: SignatureId, name: Utf8Id },
    Class(SignatureId),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    pub fn tag(&self) -> u8 {
        match self {
            ElementValue::Int { tag, .. } => *tag,
            ElementValue::Float(_) => b'F',
            ElementValue::Long(_) => b'J',
            ElementValue::Double(_) => b'D',
            ElementValue::String(_) => b's',
            ElementValue::Enum { .. } => b'e',
            ElementValue::Class(_) => b'c',
            ElementValue::Annotation(_) => b'@',
            ElementValue::Array(_) => b'[',
        }
    }
}

pub fn is_int_tag(tag: u8) -> bool {
    matches!(tag, b'B' | b'C' | b'I' | b'S' | b'Z')
}

/// Intern the annotations of a class file into the segment pool
pub fn convert_annotations(
    annotations: &[class_file::Annotation],
    constants: &impl ConstantsReader,
    pool: &mut ConstantPool,
) -> Result<Vec<Annotation>, Error> {
    annotations
        .iter()
        .map(|annotation| convert_annotation(annotation, constants, pool))
        .collect()
}

fn convert_annotation(
    annotation: &class_file::Annotation,
    constants: &impl ConstantsReader,
    pool: &mut ConstantPool,
) -> Result<Annotation, Error> {
    let descriptor = pool.signature(constants.utf8(annotation.type_index)?);
    let mut pairs = Vec::with_capacity(annotation.pairs.len());
    for pair in &annotation.pairs {
        let name = pool.utf8(constants.utf8(pair.name_index)?);
        pairs.push((name, convert_element_value(&pair.value, constants, pool)?));
    }
    Ok(Annotation { descriptor, pairs })
}

pub fn convert_element_value(
    value: &class_file::ElementValue,
    constants: &impl ConstantsReader,
    pool: &mut ConstantPool,
) -> Result<ElementValue, Error> {
    use class_file::Constant;
    use class_file::ElementValue as Raw;

    Ok(match value {
        Raw::Const { tag: b's', value } => {
            ElementValue::String(pool.utf16(&constants.utf8_units(Utf8ConstantIndex(*value))?))
        }
        Raw::Const { tag, value } => match (*tag, constants.constant(*value)?) {
            (tag, Constant::Integer(int)) if is_int_tag(tag) => ElementValue::Int {
                tag,
                value: pool.int(*int),
            },
            (b'F', Constant::Float(bits)) => ElementValue::Float(pool.float(*bits)),
            (b'J', Constant::Long(long)) => ElementValue::Long(pool.long(*long)),
            (b'D', Constant::Double(bits)) => ElementValue::Double(pool.double(*bits)),
            (tag, other) => {
                return Err(Error::class_file(format!(
                    "element value tagged '{}' refers to {:?}",
                    tag as char, other
                )))
            }
        },
        Raw::Enum {
            type_name,
            const_name,
        } => ElementValue::Enum {
            descriptor: pool.signature(constants.utf8(*type_name)?),
            name: pool.utf8(constants.utf8(*const_name)?),
        },
        Raw::Class(class) => ElementValue::Class(pool.signature(constants.utf8(*class)?)),
        Raw::Annotation(annotation) => {
            ElementValue::Annotation(convert_annotation(annotation, constants, pool)?)
        }
        Raw::Array(values) => ElementValue::Array(
            values
                .iter()
                .map(|value| convert_element_value(value, constants, pool))
                .collect::<Result<_, Error>>()?,
        ),
    })
}

/// Lower annotations back into class file form
pub fn lower_annotations<W: ConstantsWriter>(
    annotations: &[Annotation],
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<Vec<class_file::Annotation>, Error> {
    annotations
        .iter()
        .map(|annotation| lower_annotation(annotation, pool, writer))
        .collect()
}

fn lower_annotation<W: ConstantsWriter>(
    annotation: &Annotation,
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<class_file::Annotation, Error> {
    let type_index = writer.utf8(&pool.signature_string(annotation.descriptor))?;
    let mut pairs = Vec::with_capacity(annotation.pairs.len());
    for (name, value) in &annotation.pairs {
        pairs.push(ElementValuePair {
            name_index: writer.utf8(pool.utf8_str(*name))?,
            value: lower_element_value(value, pool, writer)?,
        });
    }
    Ok(class_file::Annotation { type_index, pairs })
}

pub fn lower_element_value<W: ConstantsWriter>(
    value: &ElementValue,
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<class_file::ElementValue, Error> {
    use class_file::ElementValue as Raw;

    let constant = |writer: &mut W, key: PoolKey| -> Result<Raw, Error> {
        Ok(Raw::Const {
            tag: value.tag(),
            value: writer.constant_index(key)?,
        })
    };
    Ok(match value {
        ElementValue::Int { value: id, .. } => {
            constant(writer, PoolKey::Integer(pool.int_value(*id)))?
        }
        ElementValue::Float(id) => constant(writer, PoolKey::Float(pool.float_bits(*id)))?,
        ElementValue::Long(id) => constant(writer, PoolKey::Long(pool.long_value(*id)))?,
        ElementValue::Double(id) => constant(writer, PoolKey::Double(pool.double_bits(*id)))?,
        ElementValue::String(utf8) => {
            let key = match pool.unpaired_units(*utf8) {
                Some(units) => PoolKey::Utf8Units(units.to_vec()),
                None => PoolKey::Utf8(pool.utf8_str(*utf8).to_owned()),
            };
            constant(writer, key)?
        }
        ElementValue::Enum { descriptor, name } => Raw::Enum {
            type_name: writer.utf8(&pool.signature_string(*descriptor))?,
            const_name: writer.utf8(pool.utf8_str(*name))?,
        },
        ElementValue::Class(class) => Raw::Class(writer.utf8(&pool.signature_string(*class))?),
        ElementValue::Annotation(annotation) => {
            Raw::Annotation(lower_annotation(annotation, pool, writer)?)
        }
        ElementValue::Array(values) => Raw::Array(
            values
                .iter()
                .map(|value| lower_element_value(value, pool, writer))
                .collect::<Result<_, Error>>()?,
        ),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::class_file::{Constant, ConstantIndex, ConstantsCollector, ConstantsPool};
    use crate::util::{Offset, OffsetVec};

    fn const_index(value: &class_file::ElementValue) -> Option<ConstantIndex> {
        match value {
            class_file::ElementValue::Const { value, .. } => Some(*value),
            _ => None,
        }
    }

    fn constants(entries: Vec<Constant>) -> OffsetVec<Constant> {
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        for entry in entries {
            constants.push(entry);
        }
        constants
    }

    fn utf8(index: u16) -> Utf8ConstantIndex {
        Utf8ConstantIndex(ConstantIndex(index))
    }

    #[test]
    fn values_intern_by_category() {
        // @Marker(level = '\u0007', names = {"a\ud800"}, kind = ElementType.TYPE)
        let constants = constants(vec![
            Constant::Utf8("Lpkg/Marker;".to_owned()),
            Constant::Utf8("level".to_owned()),
            Constant::Integer(7),
            Constant::Utf8("names".to_owned()),
            Constant::Utf8Units(vec![0x61, 0xD800]),
            Constant::Utf8("kind".to_owned()),
            Constant::Utf8("Ljava/lang/annotation/ElementType;".to_owned()),
            Constant::Utf8("TYPE".to_owned()),
        ]);
        let raw = class_file::Annotation {
            type_index: utf8(1),
            pairs: vec![
                ElementValuePair {
                    name_index: utf8(2),
                    value: class_file::ElementValue::Const {
                        tag: b'C',
                        value: ConstantIndex(3),
                    },
                },
                ElementValuePair {
                    name_index: utf8(4),
                    value: class_file::ElementValue::Array(vec![
                        class_file::ElementValue::Const {
                            tag: b's',
                            value: ConstantIndex(5),
                        },
                    ]),
                },
                ElementValuePair {
                    name_index: utf8(6),
                    value: class_file::ElementValue::Enum {
                        type_name: utf8(7),
                        const_name: utf8(8),
                    },
                },
            ],
        };

        let mut pool = ConstantPool::new();
        let converted = convert_annotations(&[raw], &constants, &mut pool).unwrap();
        let annotation = &converted[0];
        assert_eq!(pool.signature_string(annotation.descriptor), "Lpkg/Marker;");
        assert_eq!(
            annotation.pairs[0].1,
            ElementValue::Int {
                tag: b'C',
                value: pool.int(7)
            }
        );
        let string = match &annotation.pairs[1].1 {
            ElementValue::Array(values) => match values.as_slice() {
                [ElementValue::String(string)] => *string,
                _ => panic!("expected a single string"),
            },
            other => panic!("expected an array, got {:?}", other),
        };
        assert_eq!(pool.unpaired_units(string), Some(&[0x61, 0xD800][..]));

        // Lowering puts the unpaired string back as raw units
        let mut collector = ConstantsCollector::new();
        lower_annotations(&converted, &pool, &mut collector).unwrap();
        let mut lowered_pool = ConstantsPool::new(collector, "pkg/Holder").unwrap();
        let lowered = lower_annotations(&converted, &pool, &mut lowered_pool).unwrap();
        let table = lowered_pool.into_offset_vec();
        let names = match &lowered[0].pairs[1].value {
            class_file::ElementValue::Array(values) => const_index(&values[0]).unwrap(),
            other => panic!("expected an array, got {:?}", other),
        };
        assert_eq!(table.utf8_units(Utf8ConstantIndex(names)).unwrap(), vec![0x61, 0xD800]);
    }

    #[test]
    fn mismatched_tags() {
        let constants = constants(vec![Constant::Integer(1)]);
        let mut pool = ConstantPool::new();
        let value = class_file::ElementValue::Const {
            tag: b'J',
            value: ConstantIndex(1),
        };
        let err = convert_element_value(&value, &constants, &mut pool).unwrap_err();
        assert!(err.is_passable());
    }
}
