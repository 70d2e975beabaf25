use super::{invalid_data, AttributeLike, BciMap, ClassConstantIndex, Parse, Serialize};
use crate::errors::{Error, FormatError};
use byteorder::WriteBytesExt;
use std::io::{self, Read};

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.4
///
/// The table is generic in how classes are referenced (`C`) and in how the position of the `new`
/// instruction of an uninitialized object is given (`U`). In a class file, these are constant
/// pool indices and bytecode offsets, but the segment model uses pool handles and instruction
/// indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackMapTable<C, U>(pub Vec<StackMapFrame<C, U>>);

impl AttributeLike for StackMapTable<ClassConstantIndex, u16> {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for StackMapTable<ClassConstantIndex, u16> {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        Vec::parse(reader).map(StackMapTable)
    }
}

impl<C, U> StackMapTable<C, U> {
    pub fn try_map<C2, U2, E>(
        self,
        mut map_class: impl FnMut(C) -> Result<C2, E>,
        mut map_uninitialized: impl FnMut(U) -> Result<U2, E>,
    ) -> Result<StackMapTable<C2, U2>, E> {
        self.0
            .into_iter()
            .map(|frame| frame.try_map(&mut map_class, &mut map_uninitialized))
            .collect::<Result<_, E>>()
            .map(StackMapTable)
    }
}

impl<C> StackMapTable<C, usize> {
    /// Replace the instruction indices of uninitialized types with their bytecode offsets
    ///
    /// Renumbering consumes the table and changes its type, so a table can only ever be renumbered
    /// once. A missing index is an error.
    pub fn renumber(self, bci_map: &BciMap) -> Result<StackMapTable<C, u16>, Error> {
        self.try_map(Ok, |index| {
            let offset = bci_map.offset(index)?;
            u16::try_from(offset).map_err(|_| {
                Error::Format(FormatError::MissingBci {
                    index,
                    len: bci_map.len(),
                })
            })
        })
    }
}

impl<C> StackMapTable<C, u16> {
    /// Replace the bytecode offsets of uninitialized types with instruction indices
    pub fn index(self, bci_map: &BciMap) -> Result<StackMapTable<C, usize>, Error> {
        self.try_map(Ok, |offset| {
            bci_map.index(offset as usize).ok_or_else(|| {
                Error::class_file(format!(
                    "uninitialized type refers to offset {} which is not an instruction",
                    offset
                ))
            })
        })
    }
}

/// Frame in a `StackMapTable`
///
/// | variant                          | frame type | length                                 |
/// |----------------------------------|------------|----------------------------------------|
/// | `Same`                           | 0-63       | 1                                      |
/// | `SameLocals1StackItem`           | 64-127     | 1 + len(stack)                         |
/// | `SameLocals1StackItemExtended`   | 247        | 3 + len(stack)                         |
/// | `Chop`                           | 248-250    | 3                                      |
/// | `SameExtended`                   | 251        | 3                                      |
/// | `Append`                         | 252-254    | 3 + sum of len(locals)                 |
/// | `Full`                           | 255        | 7 + sum of len(locals) + len(stack)    |
///
/// Frame types 128 to 246 are reserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackMapFrame<C, U> {
    /// Same locals as the previous frame and an empty stack (`offset_delta` is at most 63)
    Same { offset_delta: u8 },

    /// Same locals as the previous frame and one stack item (`offset_delta` is at most 63)
    SameLocals1StackItem {
        offset_delta: u8,
        stack: VerificationType<C, U>,
    },

    SameLocals1StackItemExtended {
        offset_delta: u16,
        stack: VerificationType<C, U>,
    },

    /// Like the previous frame, but without the last `k` locals (1 to 3) and an empty stack
    Chop { offset_delta: u16, k: u8 },

    SameExtended { offset_delta: u16 },

    /// Like the previous frame, but with 1 to 3 extra locals and an empty stack
    Append {
        offset_delta: u16,
        locals: Vec<VerificationType<C, U>>,
    },

    /// Frame has exactly the locals and stack specified
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType<C, U>>,
        stack: Vec<VerificationType<C, U>>,
    },
}

pub const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
pub const SAME_FRAME_EXTENDED: u8 = 251;
pub const FULL_FRAME: u8 = 255;

/// Check that a frame type is not one of the reserved ones
pub fn check_frame_type(frame_type: u8) -> Result<u8, Error> {
    match frame_type {
        128..=246 => Err(Error::Format(FormatError::BadFrameType(frame_type))),
        _ => Ok(frame_type),
    }
}

impl<C, U> StackMapFrame<C, U> {
    pub fn frame_type(&self) -> u8 {
        match self {
            StackMapFrame::Same { offset_delta } => *offset_delta,
            StackMapFrame::SameLocals1StackItem { offset_delta, .. } => 64 + *offset_delta,
            StackMapFrame::SameLocals1StackItemExtended { .. } => SAME_LOCALS_1_STACK_ITEM_EXTENDED,
            StackMapFrame::Chop { k, .. } => SAME_FRAME_EXTENDED - *k,
            StackMapFrame::SameExtended { .. } => SAME_FRAME_EXTENDED,
            StackMapFrame::Append { locals, .. } => SAME_FRAME_EXTENDED + locals.len() as u8,
            StackMapFrame::Full { .. } => FULL_FRAME,
        }
    }

    /// Offset delta, whether it is stored in the frame type or after it
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1StackItem { offset_delta, .. } => *offset_delta as u16,
            StackMapFrame::SameLocals1StackItemExtended { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::SameExtended { offset_delta }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    /// Number of bytes the frame takes in a class file
    pub fn length(&self) -> usize {
        fn types_len<C, U>(types: &[VerificationType<C, U>]) -> usize {
            types.iter().map(VerificationType::length).sum()
        }
        match self {
            StackMapFrame::Same { .. } => 1,
            StackMapFrame::SameLocals1StackItem { stack, .. } => 1 + stack.length(),
            StackMapFrame::SameLocals1StackItemExtended { stack, .. } => 3 + stack.length(),
            StackMapFrame::Chop { .. } | StackMapFrame::SameExtended { .. } => 3,
            StackMapFrame::Append { locals, .. } => 3 + types_len(locals),
            StackMapFrame::Full { locals, stack, .. } => 7 + types_len(locals) + types_len(stack),
        }
    }

    pub fn try_map<C2, U2, E>(
        self,
        map_class: &mut impl FnMut(C) -> Result<C2, E>,
        map_uninitialized: &mut impl FnMut(U) -> Result<U2, E>,
    ) -> Result<StackMapFrame<C2, U2>, E> {
        Ok(match self {
            StackMapFrame::Same { offset_delta } => StackMapFrame::Same { offset_delta },
            StackMapFrame::SameLocals1StackItem {
                offset_delta,
                stack,
            } => StackMapFrame::SameLocals1StackItem {
                offset_delta,
                stack: stack.try_map(&mut *map_class, &mut *map_uninitialized)?,
            },
            StackMapFrame::SameLocals1StackItemExtended {
                offset_delta,
                stack,
            } => StackMapFrame::SameLocals1StackItemExtended {
                offset_delta,
                stack: stack.try_map(&mut *map_class, &mut *map_uninitialized)?,
            },
            StackMapFrame::Chop { offset_delta, k } => StackMapFrame::Chop { offset_delta, k },
            StackMapFrame::SameExtended { offset_delta } => {
                StackMapFrame::SameExtended { offset_delta }
            }
            StackMapFrame::Append {
                offset_delta,
                locals,
            } => StackMapFrame::Append {
                offset_delta,
                locals: map_types(locals, &mut *map_class, &mut *map_uninitialized)?,
            },
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => StackMapFrame::Full {
                offset_delta,
                locals: map_types(locals, &mut *map_class, &mut *map_uninitialized)?,
                stack: map_types(stack, &mut *map_class, &mut *map_uninitialized)?,
            },
        })
    }
}

fn map_types<C, U, C2, U2, E>(
    types: Vec<VerificationType<C, U>>,
    map_class: &mut impl FnMut(C) -> Result<C2, E>,
    map_uninitialized: &mut impl FnMut(U) -> Result<U2, E>,
) -> Result<Vec<VerificationType<C2, U2>>, E> {
    types
        .into_iter()
        .map(|ty| ty.try_map(&mut *map_class, &mut *map_uninitialized))
        .collect()
}

impl Serialize for StackMapFrame<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.frame_type().serialize(writer)?;
        match self {
            StackMapFrame::Same { .. } => (),
            StackMapFrame::SameLocals1StackItem { stack, .. } => stack.serialize(writer)?,
            StackMapFrame::SameLocals1StackItemExtended {
                offset_delta,
                stack,
            } => {
                offset_delta.serialize(writer)?;
                stack.serialize(writer)?;
            }
            StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::SameExtended { offset_delta } => offset_delta.serialize(writer)?,
            StackMapFrame::Append {
                offset_delta,
                locals,
            } => {
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Parse for StackMapFrame<ClassConstantIndex, u16> {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        let frame_type = u8::parse(reader)?;
        Ok(match frame_type {
            0..=63 => StackMapFrame::Same {
                offset_delta: frame_type,
            },
            64..=127 => StackMapFrame::SameLocals1StackItem {
                offset_delta: frame_type - 64,
                stack: VerificationType::parse(reader)?,
            },
            128..=246 => {
                return Err(invalid_data(format!(
                    "reserved stack map frame type {}",
                    frame_type
                )))
            }
            SAME_LOCALS_1_STACK_ITEM_EXTENDED => StackMapFrame::SameLocals1StackItemExtended {
                offset_delta: u16::parse(reader)?,
                stack: VerificationType::parse(reader)?,
            },
            248..=250 => StackMapFrame::Chop {
                offset_delta: u16::parse(reader)?,
                k: SAME_FRAME_EXTENDED - frame_type,
            },
            SAME_FRAME_EXTENDED => StackMapFrame::SameExtended {
                offset_delta: u16::parse(reader)?,
            },
            252..=254 => {
                let offset_delta = u16::parse(reader)?;
                let mut locals = vec![];
                for _ in 0..(frame_type - SAME_FRAME_EXTENDED) {
                    locals.push(VerificationType::parse(reader)?);
                }
                StackMapFrame::Append {
                    offset_delta,
                    locals,
                }
            }
            FULL_FRAME => StackMapFrame::Full {
                offset_delta: u16::parse(reader)?,
                locals: Vec::parse(reader)?,
                stack: Vec::parse(reader)?,
            },
        })
    }
}

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    /// `U` locates the `new` instruction that created the object.
    Uninitialized(U),
}

pub const OBJECT_TAG: u8 = 7;
pub const UNINITIALIZED_TAG: u8 = 8;

impl<Cls, U> VerificationType<Cls, U> {
    pub fn tag(&self) -> u8 {
        match self {
            VerificationType::Top => 0,
            VerificationType::Integer => 1,
            VerificationType::Float => 2,
            VerificationType::Double => 3,
            VerificationType::Long => 4,
            VerificationType::Null => 5,
            VerificationType::UninitializedThis => 6,
            VerificationType::Object(_) => OBJECT_TAG,
            VerificationType::Uninitialized(_) => UNINITIALIZED_TAG,
        }
    }

    /// Verification type for a tag without operands
    pub fn from_simple_tag(tag: u8) -> Result<Self, Error> {
        Ok(match tag {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            _ => return Err(Error::Format(FormatError::BadVerificationTag(tag))),
        })
    }

    /// Number of bytes the type takes in a class file
    pub fn length(&self) -> usize {
        match self {
            VerificationType::Object(_) | VerificationType::Uninitialized(_) => 3,
            _ => 1,
        }
    }

    pub fn try_map<Cls2, U2, E>(
        self,
        map_class: &mut impl FnMut(Cls) -> Result<Cls2, E>,
        map_uninitialized: &mut impl FnMut(U) -> Result<U2, E>,
    ) -> Result<VerificationType<Cls2, U2>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(class) => VerificationType::Object(map_class(class)?),
            VerificationType::Uninitialized(position) => {
                VerificationType::Uninitialized(map_uninitialized(position)?)
            }
        })
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            VerificationType::Object(class) => class.serialize(writer)?,
            VerificationType::Uninitialized(offset) => offset.serialize(writer)?,
            _ => (),
        };
        Ok(())
    }
}

impl Parse for VerificationType<ClassConstantIndex, u16> {
    fn parse<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(match u8::parse(reader)? {
            OBJECT_TAG => VerificationType::Object(ClassConstantIndex::parse(reader)?),
            UNINITIALIZED_TAG => VerificationType::Uninitialized(u16::parse(reader)?),
            tag => VerificationType::from_simple_tag(tag)
                .map_err(|_| invalid_data(format!("unknown verification type tag {}", tag)))?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::class_file::ConstantIndex;

    type Frame = StackMapFrame<ClassConstantIndex, u16>;
    type Type = VerificationType<ClassConstantIndex, u16>;

    fn object(index: u16) -> Type {
        VerificationType::Object(ClassConstantIndex(ConstantIndex(index)))
    }

    fn serialized_len(frame: &Frame) -> usize {
        let mut bytes = vec![];
        frame.serialize(&mut bytes).unwrap();
        bytes.len()
    }

    #[test]
    fn length_matches_serialization() {
        let frames: Vec<Frame> = vec![
            StackMapFrame::Same { offset_delta: 0 },
            StackMapFrame::Same { offset_delta: 63 },
            StackMapFrame::SameLocals1StackItem {
                offset_delta: 0,
                stack: VerificationType::Integer,
            },
            StackMapFrame::SameLocals1StackItem {
                offset_delta: 63,
                stack: object(4),
            },
            StackMapFrame::SameLocals1StackItemExtended {
                offset_delta: 64,
                stack: VerificationType::Uninitialized(12),
            },
            StackMapFrame::Chop {
                offset_delta: 5,
                k: 3,
            },
            StackMapFrame::SameExtended { offset_delta: 300 },
            StackMapFrame::Append {
                offset_delta: 2,
                locals: vec![VerificationType::Long, object(9), VerificationType::Top],
            },
            StackMapFrame::Full {
                offset_delta: 1000,
                locals: vec![VerificationType::UninitializedThis, object(3)],
                stack: vec![VerificationType::Uninitialized(42), VerificationType::Null],
            },
        ];
        for frame in &frames {
            assert_eq!(frame.length(), serialized_len(frame), "{:?}", frame);
        }
    }

    #[test]
    fn frame_type_boundaries() {
        let same: Frame = StackMapFrame::Same { offset_delta: 63 };
        let one_stack: Frame = StackMapFrame::SameLocals1StackItem {
            offset_delta: 0,
            stack: VerificationType::Float,
        };
        let extended: Frame = StackMapFrame::SameLocals1StackItemExtended {
            offset_delta: 300,
            stack: VerificationType::Float,
        };
        assert_eq!(same.frame_type(), 63);
        assert_eq!(same.length(), 1);
        assert_eq!(one_stack.frame_type(), 64);
        assert_eq!(one_stack.length(), 2);
        assert_eq!(extended.frame_type(), 247);
        assert_eq!(extended.length(), 4);

        let mut bytes = vec![];
        extended.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![247, 0x01, 0x2c, 2]);
    }

    #[test]
    fn chop_and_append_types() {
        let chop: Frame = StackMapFrame::Chop {
            offset_delta: 1,
            k: 1,
        };
        let append: Frame = StackMapFrame::Append {
            offset_delta: 1,
            locals: vec![VerificationType::Integer; 3],
        };
        assert_eq!(chop.frame_type(), 250);
        assert_eq!(append.frame_type(), 254);
    }

    #[test]
    fn parse_round_trip() {
        let table: StackMapTable<ClassConstantIndex, u16> = StackMapTable(vec![
            StackMapFrame::SameExtended { offset_delta: 300 },
            StackMapFrame::Full {
                offset_delta: 3,
                locals: vec![object(2)],
                stack: vec![VerificationType::Uninitialized(42)],
            },
        ]);
        let mut bytes = vec![];
        table.serialize(&mut bytes).unwrap();
        assert_eq!(StackMapTable::parse_exact(&bytes).unwrap(), table);
    }

    #[test]
    fn reserved_frame_types() {
        assert!(Frame::parse_exact(&[128]).is_err());
        assert!(Frame::parse_exact(&[246, 0, 0]).is_err());
        assert!(matches!(
            check_frame_type(200),
            Err(Error::Format(FormatError::BadFrameType(200)))
        ));
        assert_eq!(check_frame_type(247).unwrap(), 247);
        assert!(Type::parse_exact(&[9]).is_err());
    }

    #[test]
    fn renumbering() {
        let mut bci_map = BciMap::new();
        for length in [3, 1, 3, 1] {
            bci_map.push(length);
        }
        let table: StackMapTable<ClassConstantIndex, usize> = StackMapTable(vec![
            StackMapFrame::SameLocals1StackItem {
                offset_delta: 7,
                stack: VerificationType::Uninitialized(2),
            },
        ]);
        let renumbered = table.clone().renumber(&bci_map).unwrap();
        assert_eq!(
            renumbered.0[0],
            StackMapFrame::SameLocals1StackItem {
                offset_delta: 7,
                stack: VerificationType::Uninitialized(4),
            }
        );
        assert_eq!(renumbered.index(&bci_map).unwrap(), table);

        let missing: StackMapTable<ClassConstantIndex, usize> = StackMapTable(vec![
            StackMapFrame::Full {
                offset_delta: 0,
                locals: vec![],
                stack: vec![VerificationType::Uninitialized(9)],
            },
        ]);
        assert!(matches!(
            missing.renumber(&bci_map),
            Err(Error::Format(FormatError::MissingBci { index: 9, len: 4 }))
        ));
    }
}
