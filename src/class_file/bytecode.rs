use super::{ConstantIndex, Parse, Serialize};
use crate::errors::{Error, FormatError};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::io::{self, Cursor};

pub const BIPUSH: u8 = 16;
pub const SIPUSH: u8 = 17;
pub const LDC: u8 = 18;
pub const LDC_W: u8 = 19;
pub const LDC2_W: u8 = 20;
pub const ALOAD_0: u8 = 42;
pub const IINC: u8 = 132;
pub const GOTO: u8 = 167;
pub const RET: u8 = 169;
pub const TABLESWITCH: u8 = 170;
pub const LOOKUPSWITCH: u8 = 171;
pub const GETSTATIC: u8 = 178;
pub const PUTFIELD: u8 = 181;
pub const INVOKEVIRTUAL: u8 = 182;
pub const INVOKESPECIAL: u8 = 183;
pub const INVOKESTATIC: u8 = 184;
pub const INVOKEINTERFACE: u8 = 185;
pub const INVOKEDYNAMIC: u8 = 186;
pub const NEW: u8 = 187;
pub const NEWARRAY: u8 = 188;
pub const ANEWARRAY: u8 = 189;
pub const CHECKCAST: u8 = 192;
pub const INSTANCEOF: u8 = 193;
pub const WIDE: u8 = 196;
pub const MULTIANEWARRAY: u8 = 197;
pub const GOTO_W: u8 = 200;
pub const JSR_W: u8 = 201;

/// JVM instruction
///
/// Instructions are generic in how they refer to constants (`R`) and to other instructions (`L`).
/// Parsing produces `ConstantIndex` references and absolute bytecode offsets, which are then
/// mapped into the representation needed. Opcodes are kept wherever more than one opcode shares an
/// operand layout, so that the exact instruction can always be reproduced (eg. `goto` and `goto_w`
/// stay distinct).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction<R, L> {
    /// Instruction without operands
    Plain(u8),

    /// Load or store of a local variable, or `ret`
    Local { opcode: u8, index: u16, wide: bool },
    Iinc { index: u16, delta: i16, wide: bool },
    BiPush(i8),
    SiPush(i16),

    /// `newarray` of a primitive type
    NewArray(u8),

    /// `ldc`, `ldc_w`, or `ldc2_w`
    Ldc { opcode: u8, constant: R },
    Field { opcode: u8, field: R },

    /// `invokevirtual`, `invokespecial`, or `invokestatic`
    Invoke { opcode: u8, method: R },
    InvokeInterface { method: R, count: u8 },

    /// `new`, `anewarray`, `checkcast`, or `instanceof`
    Type { opcode: u8, class: R },
    MultiANewArray { class: R, dimensions: u8 },

    /// Conditional branches, `goto`, `jsr`, and their wide variants
    Branch { opcode: u8, target: L },
    TableSwitch { default: L, low: i32, targets: Vec<L> },
    LookupSwitch { default: L, pairs: Vec<(i32, L)> },
}

/// What sort of constant an instruction refers to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RefKind {
    /// Operand of `ldc`, `ldc_w`, or `ldc2_w`
    Constant,
    Field,
    Method,
    InterfaceMethod,
    Class,
}

impl<R, L> Instruction<R, L> {
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Plain(opcode)
            | Instruction::Local { opcode, .. }
            | Instruction::Ldc { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Invoke { opcode, .. }
            | Instruction::Type { opcode, .. }
            | Instruction::Branch { opcode, .. } => *opcode,
            Instruction::Iinc { .. } => IINC,
            Instruction::BiPush(_) => BIPUSH,
            Instruction::SiPush(_) => SIPUSH,
            Instruction::NewArray(_) => NEWARRAY,
            Instruction::InvokeInterface { .. } => INVOKEINTERFACE,
            Instruction::MultiANewArray { .. } => MULTIANEWARRAY,
            Instruction::TableSwitch { .. } => TABLESWITCH,
            Instruction::LookupSwitch { .. } => LOOKUPSWITCH,
        }
    }

    /// Number of bytes taken by the instruction, if it starts at `offset`
    pub fn byte_len(&self, offset: usize) -> usize {
        match self {
            Instruction::Plain(_) => 1,
            Instruction::Local { wide: true, .. } => 4,
            Instruction::Local { wide: false, .. } => 2,
            Instruction::Iinc { wide: true, .. } => 6,
            Instruction::Iinc { wide: false, .. } => 3,
            Instruction::BiPush(_) | Instruction::NewArray(_) => 2,
            Instruction::SiPush(_) => 3,
            Instruction::Ldc { opcode: LDC, .. } => 2,
            Instruction::Ldc { .. } => 3,
            Instruction::Field { .. } | Instruction::Invoke { .. } | Instruction::Type { .. } => 3,
            Instruction::InvokeInterface { .. } => 5,
            Instruction::MultiANewArray { .. } => 4,
            Instruction::Branch {
                opcode: GOTO_W | JSR_W,
                ..
            } => 5,
            Instruction::Branch { .. } => 3,
            Instruction::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len()
            }
            Instruction::LookupSwitch { pairs, .. } => {
                1 + switch_padding(offset) + 8 + 8 * pairs.len()
            }
        }
    }

    /// Map the constant references and labels of the instruction
    pub fn try_map<R2, L2, E>(
        self,
        mut map_ref: impl FnMut(RefKind, R) -> Result<R2, E>,
        mut map_label: impl FnMut(L) -> Result<L2, E>,
    ) -> Result<Instruction<R2, L2>, E> {
        Ok(match self {
            Instruction::Plain(opcode) => Instruction::Plain(opcode),
            Instruction::Local {
                opcode,
                index,
                wide,
            } => Instruction::Local {
                opcode,
                index,
                wide,
            },
            Instruction::Iinc { index, delta, wide } => Instruction::Iinc { index, delta, wide },
            Instruction::BiPush(byte) => Instruction::BiPush(byte),
            Instruction::SiPush(short) => Instruction::SiPush(short),
            Instruction::NewArray(array_type) => Instruction::NewArray(array_type),
            Instruction::Ldc { opcode, constant } => Instruction::Ldc {
                opcode,
                constant: map_ref(RefKind::Constant, constant)?,
            },
            Instruction::Field { opcode, field } => Instruction::Field {
                opcode,
                field: map_ref(RefKind::Field, field)?,
            },
            Instruction::Invoke { opcode, method } => Instruction::Invoke {
                opcode,
                method: map_ref(RefKind::Method, method)?,
            },
            Instruction::InvokeInterface { method, count } => Instruction::InvokeInterface {
                method: map_ref(RefKind::InterfaceMethod, method)?,
                count,
            },
            Instruction::Type { opcode, class } => Instruction::Type {
                opcode,
                class: map_ref(RefKind::Class, class)?,
            },
            Instruction::MultiANewArray { class, dimensions } => Instruction::MultiANewArray {
                class: map_ref(RefKind::Class, class)?,
                dimensions,
            },
            Instruction::Branch { opcode, target } => Instruction::Branch {
                opcode,
                target: map_label(target)?,
            },
            Instruction::TableSwitch {
                default,
                low,
                targets,
            } => Instruction::TableSwitch {
                default: map_label(default)?,
                low,
                targets: targets
                    .into_iter()
                    .map(&mut map_label)
                    .collect::<Result<_, E>>()?,
            },
            Instruction::LookupSwitch { default, pairs } => Instruction::LookupSwitch {
                default: map_label(default)?,
                pairs: pairs
                    .into_iter()
                    .map(|(key, target)| Ok((key, map_label(target)?)))
                    .collect::<Result<_, E>>()?,
            },
        })
    }
}

/// Switch operands are aligned to 4 bytes from the start of the method
fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

/// Number of bytes taken by one instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct InstructionLength(usize);

impl Width for InstructionLength {
    fn width(&self) -> usize {
        self.0
    }
}

/// Mapping between the position of instructions in a method and their bytecode offsets
///
/// Pack200 refers to code positions by instruction index, while class files use bytecode offsets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BciMap(OffsetVec<InstructionLength>);

impl BciMap {
    pub fn new() -> BciMap {
        BciMap::default()
    }

    /// Lay out a sequence of instructions
    pub fn layout<R, L>(instructions: &[Instruction<R, L>]) -> BciMap {
        let mut bci_map = BciMap::new();
        for instruction in instructions {
            bci_map.push(instruction.byte_len(bci_map.code_len()));
        }
        bci_map
    }

    pub fn push(&mut self, length: usize) {
        let _ = self.0.push(InstructionLength(length));
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total length of the code, in bytes
    pub fn code_len(&self) -> usize {
        self.0.offset_len().0
    }

    /// Bytecode offset of the instruction at `index`
    ///
    /// The index one past the last instruction maps to the code length.
    pub fn offset(&self, index: usize) -> Result<usize, Error> {
        self.0
            .offset_of_index(index)
            .map(|Offset(offset)| offset)
            .ok_or(Error::Format(FormatError::MissingBci {
                index,
                len: self.len(),
            }))
    }

    /// Index of the instruction starting exactly at `offset`
    pub fn index(&self, offset: usize) -> Option<usize> {
        self.0.index_of_offset(Offset(offset))
    }
}

/// Parse the bytes of a `Code` attribute into instructions, with labels as instruction indices
pub fn parse_code(code: &[u8]) -> Result<(Vec<Instruction<ConstantIndex, usize>>, BciMap), Error> {
    let mut reader = Cursor::new(code);
    let mut instructions = vec![];
    let mut bci_map = BciMap::new();

    while (reader.position() as usize) < code.len() {
        let offset = reader.position() as usize;
        let instruction = parse_instruction(&mut reader, offset).map_err(|err| {
            Error::class_file(format!("bad instruction at offset {}: {}", offset, err))
        })?;
        bci_map.push(reader.position() as usize - offset);
        instructions.push(instruction);
    }

    let instructions = instructions
        .into_iter()
        .map(|instruction| {
            instruction.try_map(|_, constant| Ok(constant), |target: usize| {
                bci_map.index(target).ok_or_else(|| {
                    Error::class_file(format!("jump to offset {} is not an instruction", target))
                })
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok((instructions, bci_map))
}

fn parse_instruction(
    reader: &mut Cursor<&[u8]>,
    offset: usize,
) -> io::Result<Instruction<ConstantIndex, usize>> {
    let target = |relative: i64| -> io::Result<usize> {
        usize::try_from(offset as i64 + relative)
            .map_err(|_| super::invalid_data("jump before the start of the method"))
    };

    let opcode = u8::parse(reader)?;
    Ok(match opcode {
        0..=15 | 26..=53 | 59..=131 | 133..=152 | 172..=177 | 190 | 191 | 194 | 195 => {
            Instruction::Plain(opcode)
        }
        BIPUSH => Instruction::BiPush(i8::parse(reader)?),
        SIPUSH => Instruction::SiPush(i16::parse(reader)?),
        LDC => Instruction::Ldc {
            opcode,
            constant: ConstantIndex(u8::parse(reader)? as u16),
        },
        LDC_W | LDC2_W => Instruction::Ldc {
            opcode,
            constant: ConstantIndex::parse(reader)?,
        },
        21..=25 | 54..=58 | RET => Instruction::Local {
            opcode,
            index: u8::parse(reader)? as u16,
            wide: false,
        },
        IINC => Instruction::Iinc {
            index: u8::parse(reader)? as u16,
            delta: i8::parse(reader)? as i16,
            wide: false,
        },
        153..=168 | 198 | 199 => Instruction::Branch {
            opcode,
            target: target(i16::parse(reader)? as i64)?,
        },
        GOTO_W | JSR_W => Instruction::Branch {
            opcode,
            target: target(i32::parse(reader)? as i64)?,
        },
        TABLESWITCH => {
            skip_padding(reader, offset)?;
            let default = target(i32::parse(reader)? as i64)?;
            let low = i32::parse(reader)?;
            let high = i32::parse(reader)?;
            let count = high as i64 - low as i64 + 1;
            if count < 0 {
                return Err(super::invalid_data("tableswitch with high < low"));
            }
            let mut targets = vec![];
            for _ in 0..count {
                targets.push(target(i32::parse(reader)? as i64)?);
            }
            Instruction::TableSwitch {
                default,
                low,
                targets,
            }
        }
        LOOKUPSWITCH => {
            skip_padding(reader, offset)?;
            let default = target(i32::parse(reader)? as i64)?;
            let count = i32::parse(reader)?;
            if count < 0 {
                return Err(super::invalid_data("lookupswitch with negative npairs"));
            }
            let mut pairs = vec![];
            for _ in 0..count {
                let key = i32::parse(reader)?;
                pairs.push((key, target(i32::parse(reader)? as i64)?));
            }
            Instruction::LookupSwitch { default, pairs }
        }
        178..=181 => Instruction::Field {
            opcode,
            field: ConstantIndex::parse(reader)?,
        },
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC => Instruction::Invoke {
            opcode,
            method: ConstantIndex::parse(reader)?,
        },
        INVOKEINTERFACE => {
            let method = ConstantIndex::parse(reader)?;
            let count = u8::parse(reader)?;
            if u8::parse(reader)? != 0 {
                return Err(super::invalid_data("invokeinterface without trailing 0"));
            }
            Instruction::InvokeInterface { method, count }
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Instruction::Type {
            opcode,
            class: ConstantIndex::parse(reader)?,
        },
        NEWARRAY => Instruction::NewArray(u8::parse(reader)?),
        MULTIANEWARRAY => Instruction::MultiANewArray {
            class: ConstantIndex::parse(reader)?,
            dimensions: u8::parse(reader)?,
        },
        WIDE => match u8::parse(reader)? {
            IINC => Instruction::Iinc {
                index: u16::parse(reader)?,
                delta: i16::parse(reader)?,
                wide: true,
            },
            opcode @ (21..=25 | 54..=58 | RET) => Instruction::Local {
                opcode,
                index: u16::parse(reader)?,
                wide: true,
            },
            other => {
                return Err(super::invalid_data(format!(
                    "opcode {} cannot be widened",
                    other
                )))
            }
        },
        INVOKEDYNAMIC => return Err(super::invalid_data("invokedynamic")),
        other => return Err(super::invalid_data(format!("unknown opcode {}", other))),
    })
}

fn skip_padding(reader: &mut Cursor<&[u8]>, offset: usize) -> io::Result<()> {
    for _ in 0..switch_padding(offset) {
        let _ = u8::parse(reader)?;
    }
    Ok(())
}

/// Lay out and encode instructions, with labels given as instruction indices
pub fn write_code(instructions: &[Instruction<ConstantIndex, usize>]) -> Result<(Vec<u8>, BciMap), Error> {
    let bci_map = BciMap::layout(instructions);
    let mut bytes = Vec::with_capacity(bci_map.code_len());
    for (index, instruction) in instructions.iter().enumerate() {
        let offset = bci_map.offset(index)?;
        write_instruction(instruction, offset, &bci_map, &mut bytes)?;
    }
    Ok((bytes, bci_map))
}

fn write_instruction<W: WriteBytesExt>(
    instruction: &Instruction<ConstantIndex, usize>,
    offset: usize,
    bci_map: &BciMap,
    writer: &mut W,
) -> Result<(), Error> {
    let relative = |target: usize| -> Result<i64, Error> {
        Ok(bci_map.offset(target)? as i64 - offset as i64)
    };
    let overflow = |target: usize| -> Error {
        Error::BranchOverflow {
            offset,
            target: bci_map.offset(target).unwrap_or(0),
        }
    };

    match instruction {
        Instruction::Plain(opcode) => opcode.serialize(writer)?,
        Instruction::Local {
            opcode,
            index,
            wide: true,
        } => {
            WIDE.serialize(writer)?;
            opcode.serialize(writer)?;
            index.serialize(writer)?;
        }
        Instruction::Local { opcode, index, .. } => {
            opcode.serialize(writer)?;
            narrow(*index as i64, "local variable index")?.serialize(writer)?;
        }
        Instruction::Iinc {
            index,
            delta,
            wide: true,
        } => {
            WIDE.serialize(writer)?;
            IINC.serialize(writer)?;
            index.serialize(writer)?;
            delta.serialize(writer)?;
        }
        Instruction::Iinc { index, delta, .. } => {
            IINC.serialize(writer)?;
            let delta = i8::try_from(*delta)
                .map_err(|_| Error::format(format!("iinc delta {} needs wide", delta)))?;
            narrow(*index as i64, "local variable index")?.serialize(writer)?;
            delta.serialize(writer)?;
        }
        Instruction::BiPush(byte) => {
            BIPUSH.serialize(writer)?;
            byte.serialize(writer)?;
        }
        Instruction::SiPush(short) => {
            SIPUSH.serialize(writer)?;
            short.serialize(writer)?;
        }
        Instruction::NewArray(array_type) => {
            NEWARRAY.serialize(writer)?;
            array_type.serialize(writer)?;
        }
        Instruction::Ldc {
            opcode: LDC,
            constant,
        } => {
            LDC.serialize(writer)?;
            narrow(constant.0 as i64, "ldc constant index")?.serialize(writer)?;
        }
        Instruction::Ldc { opcode, constant }
        | Instruction::Field {
            opcode,
            field: constant,
        }
        | Instruction::Invoke {
            opcode,
            method: constant,
        }
        | Instruction::Type {
            opcode,
            class: constant,
        } => {
            opcode.serialize(writer)?;
            constant.serialize(writer)?;
        }
        Instruction::InvokeInterface { method, count } => {
            INVOKEINTERFACE.serialize(writer)?;
            method.serialize(writer)?;
            count.serialize(writer)?;
            0u8.serialize(writer)?;
        }
        Instruction::MultiANewArray { class, dimensions } => {
            MULTIANEWARRAY.serialize(writer)?;
            class.serialize(writer)?;
            dimensions.serialize(writer)?;
        }
        Instruction::Branch {
            opcode: opcode @ (GOTO_W | JSR_W),
            target,
        } => {
            let jump = i32::try_from(relative(*target)?).map_err(|_| overflow(*target))?;
            opcode.serialize(writer)?;
            jump.serialize(writer)?;
        }
        Instruction::Branch { opcode, target } => {
            let jump = i16::try_from(relative(*target)?).map_err(|_| overflow(*target))?;
            opcode.serialize(writer)?;
            jump.serialize(writer)?;
        }
        Instruction::TableSwitch {
            default,
            low,
            targets,
        } => {
            TABLESWITCH.serialize(writer)?;
            write_padding(writer, offset)?;
            (relative(*default)? as i32).serialize(writer)?;
            low.serialize(writer)?;
            let high = *low as i64 + targets.len() as i64 - 1;
            (high as i32).serialize(writer)?;
            for target in targets {
                (relative(*target)? as i32).serialize(writer)?;
            }
        }
        Instruction::LookupSwitch { default, pairs } => {
            LOOKUPSWITCH.serialize(writer)?;
            write_padding(writer, offset)?;
            (relative(*default)? as i32).serialize(writer)?;
            (pairs.len() as i32).serialize(writer)?;
            for (key, target) in pairs {
                key.serialize(writer)?;
                (relative(*target)? as i32).serialize(writer)?;
            }
        }
    }
    Ok(())
}

fn write_padding<W: WriteBytesExt>(writer: &mut W, offset: usize) -> io::Result<()> {
    for _ in 0..switch_padding(offset) {
        0u8.serialize(writer)?;
    }
    Ok(())
}

fn narrow(value: i64, what: &str) -> Result<u8, Error> {
    u8::try_from(value).map_err(|_| Error::format(format!("{} {} does not fit in a byte", what, value)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn round_trip(code: &[u8]) -> Vec<Instruction<ConstantIndex, usize>> {
        let (instructions, bci_map) = parse_code(code).unwrap();
        assert_eq!(bci_map.code_len(), code.len());
        let (written, _) = write_code(&instructions).unwrap();
        assert_eq!(written, code);
        instructions
    }

    #[test]
    fn simple_method() {
        // aload_0; getfield #2; ifnull +5; iconst_1; ireturn; iconst_0; ireturn
        let code = [0x2a, 0xb4, 0x00, 0x02, 0xc6, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac];
        let instructions = round_trip(&code);
        assert_eq!(
            instructions,
            vec![
                Instruction::Plain(ALOAD_0),
                Instruction::Field {
                    opcode: 180,
                    field: ConstantIndex(2)
                },
                Instruction::Branch {
                    opcode: 198,
                    target: 5
                },
                Instruction::Plain(0x04),
                Instruction::Plain(0xac),
                Instruction::Plain(0x03),
                Instruction::Plain(0xac),
            ]
        );
    }

    #[test]
    fn switch_padding_depends_on_offset() {
        // iload_1; tableswitch (2 bytes padding) default +27, low 0, high 1, targets +23 +25;
        // then iconst_0; ireturn; iconst_1; ireturn; iconst_2; ireturn
        let mut code = vec![0x1b, 0xaa, 0, 0];
        for value in [27i32, 0, 1, 23, 25] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        code.extend_from_slice(&[0x03, 0xac, 0x04, 0xac, 0x05, 0xac]);

        let instructions = round_trip(&code);
        assert_eq!(
            instructions[1],
            Instruction::TableSwitch {
                default: 6,
                low: 0,
                targets: vec![2, 4],
            }
        );
        assert_eq!(instructions[1].byte_len(1), 23);
        assert_eq!(instructions[1].byte_len(3), 21);
    }

    #[test]
    fn wide_instructions() {
        let code = [0xc4, 0x15, 0x01, 0x00, 0xc4, 0x84, 0x00, 0x01, 0xff, 0x38, 0xb1];
        let instructions = round_trip(&code);
        assert_eq!(
            instructions[0],
            Instruction::Local {
                opcode: 0x15,
                index: 256,
                wide: true
            }
        );
        assert_eq!(
            instructions[1],
            Instruction::Iinc {
                index: 1,
                delta: -200,
                wide: true
            }
        );
    }

    #[test]
    fn bad_jump_targets() {
        // goto into the middle of an instruction
        assert!(parse_code(&[0xa7, 0x00, 0x02, 0xb1]).is_err());
        // goto before the method
        assert!(parse_code(&[0xa7, 0xff, 0xff]).is_err());
        assert!(parse_code(&[0xba, 0x00, 0x01, 0x00, 0x00]).is_err());
    }

    #[test]
    fn branch_overflow() {
        let mut instructions = vec![Instruction::Branch {
            opcode: GOTO,
            target: 20_001,
        }];
        for _ in 0..20_000 {
            instructions.push(Instruction::Ldc {
                opcode: LDC_W,
                constant: ConstantIndex(1),
            });
        }
        instructions.push(Instruction::Plain(0xb1));
        assert!(matches!(
            write_code(&instructions),
            Err(Error::BranchOverflow { offset: 0, .. })
        ));

        instructions[0] = Instruction::Branch {
            opcode: GOTO_W,
            target: 20_001,
        };
        assert!(write_code(&instructions).is_ok());
    }

    #[test]
    fn bci_map_lookups() {
        let mut bci_map = BciMap::new();
        bci_map.push(1);
        bci_map.push(3);
        bci_map.push(1);
        assert_eq!(bci_map.offset(2).unwrap(), 4);
        assert_eq!(bci_map.offset(3).unwrap(), 5);
        assert!(bci_map.offset(4).is_err());
        assert_eq!(bci_map.index(1), Some(1));
        assert_eq!(bci_map.index(2), None);
        assert_eq!(bci_map.index(5), Some(3));
    }
}
