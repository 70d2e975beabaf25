//! Bytecode bands
//!
//! Every method body is a run of opcodes in `bc_codes`, ended by 255. Operands go to separate
//! bands by kind, so that similar values end up next to each other. On top of the JVM opcodes,
//! pack200 has opcodes for common patterns:
//!
//!   * 202 to 229: field and method instructions on members of the class itself or of its
//!     superclass, optionally fused with a preceding `aload_0`. Members are numbered within their
//!     class rather than within the whole pool.
//!   * 230 to 232: `invokespecial` of a constructor of the class, its superclass, or the class
//!     created by the last `new`.
//!   * 233 to 239 (and 18 to 20): `ldc` variants typed by the constant they load.

use super::class_bands::ref_index;
use crate::class_file::{
    Instruction, ALOAD_0, GETSTATIC, IINC, INVOKEINTERFACE, INVOKESPECIAL, LDC, LDC2_W, LDC_W,
    LOOKUPSWITCH, MULTIANEWARRAY, NEW, NEWARRAY, PUTFIELD, TABLESWITCH, WIDE,
};
use crate::codec::{capacity_for, check_index, to_i32, BandReader, BandWriter, Coding};
use crate::cp::{argument_slots, ClassId, ClassMembers, ConstantPool};
use crate::errors::{Error, FormatError};
use crate::model::CpRef;
use std::io::Read;

const SELF_LINKER_OP: u8 = 202;
const SELF_LINKER_ALOAD_FLAG: u8 = 7;
const SELF_LINKER_SUPER_FLAG: u8 = 14;
const SELF_LINKER_LAST: u8 = 229;
const INVOKE_THIS_INIT: u8 = 230;
const INVOKE_SUPER_INIT: u8 = 231;
const INVOKE_NEW_INIT: u8 = 232;
const CLDC: u8 = 233;
const ILDC: u8 = 234;
const FLDC: u8 = 235;
const CLDC_W: u8 = 236;
const ILDC_W: u8 = 237;
const FLDC_W: u8 = 238;
const DLDC2_W: u8 = 239;
const REF_ESCAPE: u8 = 253;
const BYTE_ESCAPE: u8 = 254;
const END_MARKER: u8 = 255;

type Insn = Instruction<CpRef, usize>;

/// Operand bands, in the order they follow `bc_codes`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Band {
    CaseCount,
    CaseValue,
    Byte,
    Short,
    Local,
    Label,
    IntRef,
    FloatRef,
    LongRef,
    DoubleRef,
    StringRef,
    ClassRef,
    FieldRef,
    MethodRef,
    IMethodRef,
    ThisField,
    SuperField,
    ThisMethod,
    SuperMethod,
    InitRef,
}

const BAND_COUNT: usize = 20;

const BANDS: [(&str, Coding); BAND_COUNT] = [
    ("bc_case_count", Coding::UNSIGNED5),
    ("bc_case_value", Coding::DELTA5),
    ("bc_byte", Coding::BYTE1),
    ("bc_short", Coding::DELTA5),
    ("bc_local", Coding::UNSIGNED5),
    ("bc_label", Coding::BRANCH5),
    ("bc_intref", Coding::DELTA5),
    ("bc_floatref", Coding::DELTA5),
    ("bc_longref", Coding::DELTA5),
    ("bc_doubleref", Coding::DELTA5),
    ("bc_stringref", Coding::DELTA5),
    ("bc_classref", Coding::UNSIGNED5),
    ("bc_fieldref", Coding::DELTA5),
    ("bc_methodref", Coding::UNSIGNED5),
    ("bc_imethodref", Coding::DELTA5),
    ("bc_thisfield", Coding::UNSIGNED5),
    ("bc_superfield", Coding::UNSIGNED5),
    ("bc_thismethod", Coding::UNSIGNED5),
    ("bc_supermethod", Coding::UNSIGNED5),
    ("bc_initref", Coding::UNSIGNED5),
];

impl Band {
    fn name(self) -> &'static str {
        BANDS[self as usize].0
    }
}

/// Values of the operand bands, consumed front to back when decoding
#[derive(Default)]
struct Operands {
    values: [Vec<i32>; BAND_COUNT],
    positions: [usize; BAND_COUNT],
}

impl Operands {
    fn push(&mut self, band: Band, value: i32) {
        self.values[band as usize].push(value);
    }

    fn push_index(&mut self, band: Band, value: usize) -> Result<(), Error> {
        self.push(band, to_i32(value)?);
        Ok(())
    }

    fn next(&mut self, band: Band) -> Result<i32, Error> {
        let position = &mut self.positions[band as usize];
        let value = self.values[band as usize].get(*position).copied().ok_or_else(|| {
            Error::Format(FormatError::UnexpectedEof {
                band: band.name().to_owned(),
            })
        })?;
        *position += 1;
        Ok(value)
    }

    fn next_index(&mut self, band: Band, len: usize) -> Result<usize, Error> {
        let value = self.next(band)?;
        check_index(band.name(), value, len)
    }
}

/// Class whose method is being coded, which the self-linking opcodes are relative to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodeOwner {
    pub this_class: ClassId,
    pub super_class: Option<ClassId>,
}

/// Opcode from `bc_codes`, with whether it was prefixed by `wide`
#[derive(Copy, Clone, Debug)]
struct Op {
    opcode: u8,
    wide: bool,
}

/// Operand bands used by an opcode (switches use more, depending on their case count)
fn operand_bands(op: Op) -> Result<&'static [Band], Error> {
    use Band::*;
    if op.wide {
        let bands: &'static [Band] = match op.opcode {
            IINC => &[Local, Short],
            21..=25 | 54..=58 | 169 => &[Local],
            other => return Err(Error::Format(FormatError::BadOpcode(other))),
        };
        return Ok(bands);
    }
    let bands: &'static [Band] = match op.opcode {
        0..=15 | 26..=53 | 59..=131 | 133..=152 | 172..=177 | 190 | 191 | 194 | 195 => &[],
        16 => &[Byte],
        17 => &[Short],
        LDC | LDC_W => &[StringRef],
        LDC2_W => &[LongRef],
        21..=25 | 54..=58 | 169 => &[Local],
        IINC => &[Local, Byte],
        153..=168 | 198..=201 => &[Label],
        TABLESWITCH | LOOKUPSWITCH => &[CaseCount],
        178..=181 => &[FieldRef],
        182..=184 => &[MethodRef],
        INVOKEINTERFACE => &[IMethodRef],
        187 | 189 | 192 | 193 => &[ClassRef],
        NEWARRAY => &[Byte],
        MULTIANEWARRAY => &[ClassRef, Byte],
        SELF_LINKER_OP..=SELF_LINKER_LAST => {
            let relative = op.opcode - SELF_LINKER_OP;
            let is_super = relative >= SELF_LINKER_SUPER_FLAG;
            let is_field = relative % SELF_LINKER_ALOAD_FLAG <= PUTFIELD - GETSTATIC;
            match (is_super, is_field) {
                (false, true) => &[ThisField],
                (true, true) => &[SuperField],
                (false, false) => &[ThisMethod],
                (true, false) => &[SuperMethod],
            }
        }
        INVOKE_THIS_INIT..=INVOKE_NEW_INIT => &[InitRef],
        CLDC | CLDC_W => &[ClassRef],
        ILDC | ILDC_W => &[IntRef],
        FLDC | FLDC_W => &[FloatRef],
        DLDC2_W => &[DoubleRef],
        REF_ESCAPE | BYTE_ESCAPE => return Err(Error::unsupported("bytecode escapes")),
        186 => return Err(Error::unsupported("invokedynamic")),
        other => return Err(Error::Format(FormatError::BadOpcode(other))),
    };
    Ok(bands)
}

pub fn read<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    owners: &[CodeOwner],
) -> Result<Vec<Vec<Insn>>, Error> {
    let mut methods = Vec::with_capacity(owners.len());
    let mut counts = [0usize; BAND_COUNT];
    for _ in owners {
        let mut ops = vec![];
        loop {
            let opcode = reader.read_byte("bc_codes")?;
            let op = match opcode {
                END_MARKER => break,
                WIDE => Op {
                    opcode: reader.read_byte("bc_codes")?,
                    wide: true,
                },
                opcode => Op {
                    opcode,
                    wide: false,
                },
            };
            for band in operand_bands(op)? {
                counts[*band as usize] += 1;
            }
            ops.push(op);
        }
        methods.push(ops);
    }

    let mut operands = Operands::default();
    let case_count_band = Band::CaseCount as usize;
    let (name, coding) = BANDS[case_count_band];
    operands.values[case_count_band] =
        reader.read_band(name, coding, counts[case_count_band])?;

    // Switch operands depend on the case counts
    let mut case_counts = operands.values[case_count_band].iter();
    for op in methods.iter().flatten() {
        if matches!(op.opcode, TABLESWITCH | LOOKUPSWITCH) && !op.wide {
            let case_count = case_counts.next().copied().unwrap_or_default();
            let case_count = usize::try_from(case_count)
                .map_err(|_| Error::format(format!("negative case count {}", case_count)))?;
            counts[Band::CaseValue as usize] += if op.opcode == TABLESWITCH {
                1
            } else {
                case_count
            };
            counts[Band::Label as usize] += 1 + case_count;
        }
    }

    for (index, (name, coding)) in BANDS.iter().enumerate().skip(1) {
        operands.values[index] = reader.read_band(name, *coding, counts[index])?;
    }

    let members = ClassMembers::new(pool);
    let mut decoder = Decoder {
        pool,
        members: &members,
        operands,
    };
    let codes = methods
        .iter()
        .zip(owners)
        .map(|(ops, owner)| decoder.decode(ops, *owner))
        .collect::<Result<Vec<_>, Error>>()?;

    log::debug!("Read bytecode bands for {} methods", codes.len());
    Ok(codes)
}

struct Decoder<'a> {
    pool: &'a ConstantPool,
    members: &'a ClassMembers,
    operands: Operands,
}

impl<'a> Decoder<'a> {
    fn decode(&mut self, ops: &[Op], owner: CodeOwner) -> Result<Vec<Insn>, Error> {
        let pool = self.pool;
        let mut instructions = Vec::with_capacity(ops.len());
        let mut new_class: Option<ClassId> = None;

        for op in ops {
            let index = instructions.len();
            let opcode = op.opcode;
            let wide = op.wide;
            let instruction = match opcode {
                IINC => Instruction::Iinc {
                    index: self.local(wide)?,
                    delta: if wide {
                        self.short()?
                    } else {
                        self.byte()? as i8 as i16
                    },
                    wide,
                },
                21..=25 | 54..=58 | 169 => Instruction::Local {
                    opcode,
                    index: self.local(wide)?,
                    wide,
                },
                0..=15 | 26..=53 | 59..=131 | 133..=152 | 172..=177 | 190 | 191 | 194 | 195 => {
                    Instruction::Plain(opcode)
                }
                16 => Instruction::BiPush(self.byte()? as i8),
                17 => Instruction::SiPush(self.short()?),
                LDC | LDC_W => Instruction::Ldc {
                    opcode,
                    constant: CpRef::String(pool.string_id(
                        "bc_stringref",
                        self.operands.next(Band::StringRef)?,
                    )?),
                },
                LDC2_W => Instruction::Ldc {
                    opcode,
                    constant: CpRef::Long(
                        pool.long_id("bc_longref", self.operands.next(Band::LongRef)?)?,
                    ),
                },
                CLDC | CLDC_W => Instruction::Ldc {
                    opcode: if opcode == CLDC { LDC } else { LDC_W },
                    constant: CpRef::Class(self.class(owner)?),
                },
                ILDC | ILDC_W => Instruction::Ldc {
                    opcode: if opcode == ILDC { LDC } else { LDC_W },
                    constant: CpRef::Int(
                        pool.int_id("bc_intref", self.operands.next(Band::IntRef)?)?,
                    ),
                },
                FLDC | FLDC_W => Instruction::Ldc {
                    opcode: if opcode == FLDC { LDC } else { LDC_W },
                    constant: CpRef::Float(
                        pool.float_id("bc_floatref", self.operands.next(Band::FloatRef)?)?,
                    ),
                },
                DLDC2_W => Instruction::Ldc {
                    opcode: LDC2_W,
                    constant: CpRef::Double(
                        pool.double_id("bc_doubleref", self.operands.next(Band::DoubleRef)?)?,
                    ),
                },
                153..=168 | 198..=201 => Instruction::Branch {
                    opcode,
                    target: self.label(index)?,
                },
                TABLESWITCH => {
                    let case_count = self.case_count()?;
                    let low = self.operands.next(Band::CaseValue)?;
                    let default = self.label(index)?;
                    let targets = (0..case_count)
                        .map(|_| self.label(index))
                        .collect::<Result<_, Error>>()?;
                    Instruction::TableSwitch {
                        default,
                        low,
                        targets,
                    }
                }
                LOOKUPSWITCH => {
                    let case_count = self.case_count()?;
                    let keys = (0..case_count)
                        .map(|_| self.operands.next(Band::CaseValue))
                        .collect::<Result<Vec<_>, Error>>()?;
                    let default = self.label(index)?;
                    let mut pairs = Vec::with_capacity(capacity_for(case_count));
                    for key in keys {
                        pairs.push((key, self.label(index)?));
                    }
                    Instruction::LookupSwitch { default, pairs }
                }
                178..=181 => Instruction::Field {
                    opcode,
                    field: CpRef::Field(
                        pool.field_id("bc_fieldref", self.operands.next(Band::FieldRef)?)?,
                    ),
                },
                182..=184 => Instruction::Invoke {
                    opcode,
                    method: CpRef::Method(
                        pool.method_id("bc_methodref", self.operands.next(Band::MethodRef)?)?,
                    ),
                },
                INVOKEINTERFACE => {
                    let method = pool
                        .imethod_id("bc_imethodref", self.operands.next(Band::IMethodRef)?)?;
                    let descriptor = pool.descr_type(pool.imethod_entry(method).descr);
                    let count = u8::try_from(argument_slots(&descriptor)? + 1).map_err(|_| {
                        Error::format(format!("too many arguments in {}", descriptor))
                    })?;
                    Instruction::InvokeInterface {
                        method: CpRef::IMethod(method),
                        count,
                    }
                }
                187 | 189 | 192 | 193 => {
                    let class = self.class(owner)?;
                    if opcode == NEW {
                        new_class = Some(class);
                    }
                    Instruction::Type {
                        opcode,
                        class: CpRef::Class(class),
                    }
                }
                NEWARRAY => Instruction::NewArray(self.byte()?),
                MULTIANEWARRAY => Instruction::MultiANewArray {
                    class: CpRef::Class(self.class(owner)?),
                    dimensions: self.byte()?,
                },
                SELF_LINKER_OP..=SELF_LINKER_LAST => {
                    let relative = opcode - SELF_LINKER_OP;
                    let class = if relative >= SELF_LINKER_SUPER_FLAG {
                        owner.super_class.ok_or_else(|| {
                            Error::format("superclass member used in a class without superclass")
                        })?
                    } else {
                        owner.this_class
                    };
                    if relative % SELF_LINKER_SUPER_FLAG >= SELF_LINKER_ALOAD_FLAG {
                        instructions.push(Instruction::Plain(ALOAD_0));
                    }

                    let origin = GETSTATIC + relative % SELF_LINKER_ALOAD_FLAG;
                    let is_super = relative >= SELF_LINKER_SUPER_FLAG;
                    if origin <= PUTFIELD {
                        let band = if is_super {
                            Band::SuperField
                        } else {
                            Band::ThisField
                        };
                        let fields = self.members.fields(class);
                        let field = fields[self.operands.next_index(band, fields.len())?];
                        Instruction::Field {
                            opcode: origin,
                            field: CpRef::Field(field),
                        }
                    } else {
                        let band = if is_super {
                            Band::SuperMethod
                        } else {
                            Band::ThisMethod
                        };
                        let methods = self.members.methods(class);
                        let method = methods[self.operands.next_index(band, methods.len())?];
                        Instruction::Invoke {
                            opcode: origin,
                            method: CpRef::Method(method),
                        }
                    }
                }
                INVOKE_THIS_INIT..=INVOKE_NEW_INIT => {
                    let class = match opcode {
                        INVOKE_THIS_INIT => Some(owner.this_class),
                        INVOKE_SUPER_INIT => owner.super_class,
                        _ => new_class,
                    }
                    .ok_or_else(|| Error::format(format!("no class for init opcode {}", opcode)))?;
                    let inits = self.members.inits(class);
                    let method = inits[self.operands.next_index(Band::InitRef, inits.len())?];
                    Instruction::Invoke {
                        opcode: INVOKESPECIAL,
                        method: CpRef::Method(method),
                    }
                }
                other => return Err(Error::Format(FormatError::BadOpcode(other))),
            };
            instructions.push(instruction);
        }
        Ok(instructions)
    }

    fn byte(&mut self) -> Result<u8, Error> {
        let value = self.operands.next(Band::Byte)?;
        u8::try_from(value).map_err(|_| Error::format(format!("bc_byte value {}", value)))
    }

    fn short(&mut self) -> Result<i16, Error> {
        let value = self.operands.next(Band::Short)?;
        i16::try_from(value).map_err(|_| Error::format(format!("bc_short value {}", value)))
    }

    fn local(&mut self, wide: bool) -> Result<u16, Error> {
        let limit = if wide { u16::MAX as usize } else { u8::MAX as usize };
        let index = self.operands.next_index(Band::Local, limit + 1)?;
        Ok(index as u16)
    }

    fn label(&mut self, index: usize) -> Result<usize, Error> {
        let delta = self.operands.next(Band::Label)?;
        usize::try_from(index as i64 + delta as i64)
            .map_err(|_| Error::format("branch before the start of the method"))
    }

    fn case_count(&mut self) -> Result<usize, Error> {
        self.operands.next_index(Band::CaseCount, usize::MAX)
    }

    /// Class reference, where 0 means the class itself
    fn class(&mut self, owner: CodeOwner) -> Result<ClassId, Error> {
        match self.operands.next(Band::ClassRef)? {
            0 => Ok(owner.this_class),
            n => self.pool.class_id("bc_classref", n.wrapping_sub(1)),
        }
    }
}

pub fn write(
    writer: &mut BandWriter,
    pool: &ConstantPool,
    codes: &[(CodeOwner, &[Insn])],
) -> Result<(), Error> {
    let members = ClassMembers::new(pool);
    let mut encoder = Encoder {
        pool,
        members: &members,
        codes: vec![],
        operands: Operands::default(),
    };
    for (owner, instructions) in codes {
        encoder.encode(instructions, *owner)?;
    }

    writer.write_band("bc_codes", Coding::BYTE1, &encoder.codes)?;
    for (values, (name, coding)) in encoder.operands.values.iter().zip(BANDS) {
        writer.write_band(name, coding, values)?;
    }
    Ok(())
}

struct Encoder<'a> {
    pool: &'a ConstantPool,
    members: &'a ClassMembers,
    codes: Vec<i32>,
    operands: Operands,
}

impl<'a> Encoder<'a> {
    fn encode(&mut self, instructions: &[Insn], owner: CodeOwner) -> Result<(), Error> {
        let pool = self.pool;
        let mut new_class: Option<ClassId> = None;
        let mut index = 0;
        while index < instructions.len() {
            let instruction = &instructions[index];

            // `aload_0` fused with a following self-linking instruction
            if let (Instruction::Plain(ALOAD_0), Some(next)) =
                (instruction, instructions.get(index + 1))
            {
                if let Some((opcode, band, member)) = self.self_link(next, owner) {
                    self.op(opcode + SELF_LINKER_ALOAD_FLAG);
                    self.operands.push_index(band, member)?;
                    index += 2;
                    continue;
                }
            }
            if let Some((opcode, band, member)) = self.self_link(instruction, owner) {
                self.op(opcode);
                self.operands.push_index(band, member)?;
                index += 1;
                continue;
            }

            match instruction {
                Instruction::Plain(opcode) => self.op(*opcode),
                Instruction::Local {
                    opcode,
                    index: local,
                    wide,
                } => {
                    if *wide {
                        self.op(WIDE);
                    }
                    self.op(*opcode);
                    self.operands.push(Band::Local, *local as i32);
                }
                Instruction::Iinc {
                    index: local,
                    delta,
                    wide,
                } => {
                    if *wide {
                        self.op(WIDE);
                    }
                    self.op(IINC);
                    self.operands.push(Band::Local, *local as i32);
                    if *wide {
                        self.operands.push(Band::Short, *delta as i32);
                    } else {
                        let delta = i8::try_from(*delta)
                            .map_err(|_| Error::class_file(format!("iinc delta {}", delta)))?;
                        self.operands.push(Band::Byte, delta as u8 as i32);
                    }
                }
                Instruction::BiPush(value) => {
                    self.op(16);
                    self.operands.push(Band::Byte, *value as u8 as i32);
                }
                Instruction::SiPush(value) => {
                    self.op(17);
                    self.operands.push(Band::Short, *value as i32);
                }
                Instruction::NewArray(kind) => {
                    self.op(NEWARRAY);
                    self.operands.push(Band::Byte, *kind as i32);
                }
                Instruction::Ldc { opcode, constant } => {
                    let (code, band) = match (*opcode, constant) {
                        (LDC, CpRef::String(_)) => (LDC, Band::StringRef),
                        (LDC_W, CpRef::String(_)) => (LDC_W, Band::StringRef),
                        (LDC, CpRef::Class(_)) => (CLDC, Band::ClassRef),
                        (LDC_W, CpRef::Class(_)) => (CLDC_W, Band::ClassRef),
                        (LDC, CpRef::Int(_)) => (ILDC, Band::IntRef),
                        (LDC_W, CpRef::Int(_)) => (ILDC_W, Band::IntRef),
                        (LDC, CpRef::Float(_)) => (FLDC, Band::FloatRef),
                        (LDC_W, CpRef::Float(_)) => (FLDC_W, Band::FloatRef),
                        (LDC2_W, CpRef::Long(_)) => (LDC2_W, Band::LongRef),
                        (LDC2_W, CpRef::Double(_)) => (DLDC2_W, Band::DoubleRef),
                        _ => {
                            return Err(Error::class_file(format!(
                                "ldc opcode {} cannot load {:?}",
                                opcode, constant
                            )))
                        }
                    };
                    self.op(code);
                    match constant {
                        CpRef::Class(class) => self.class(*class, owner)?,
                        other => self.operands.push_index(band, ref_index(*other))?,
                    }
                }
                Instruction::Field {
                    opcode,
                    field: CpRef::Field(field),
                } => {
                    self.op(*opcode);
                    self.operands.push_index(Band::FieldRef, field.index())?;
                }
                Instruction::Invoke {
                    opcode,
                    method: CpRef::Method(method),
                } => {
                    let entry = pool.method_entry(*method);
                    let init = if *opcode == INVOKESPECIAL && pool.descr_name(entry.descr) == "<init>"
                    {
                        [
                            (INVOKE_THIS_INIT, Some(owner.this_class)),
                            (INVOKE_SUPER_INIT, owner.super_class),
                            (INVOKE_NEW_INIT, new_class),
                        ]
                        .into_iter()
                        .find(|(_, class)| *class == Some(entry.class))
                        .and_then(|(code, _)| {
                            let inits = self.members.inits(entry.class);
                            inits
                                .iter()
                                .position(|init| init == method)
                                .map(|position| (code, position))
                        })
                    } else {
                        None
                    };
                    match init {
                        Some((code, position)) => {
                            self.op(code);
                            self.operands.push_index(Band::InitRef, position)?;
                        }
                        None => {
                            self.op(*opcode);
                            self.operands.push_index(Band::MethodRef, method.index())?;
                        }
                    }
                }
                Instruction::InvokeInterface {
                    method: CpRef::IMethod(method),
                    ..
                } => {
                    self.op(INVOKEINTERFACE);
                    self.operands.push_index(Band::IMethodRef, method.index())?;
                }
                Instruction::Type {
                    opcode,
                    class: CpRef::Class(class),
                } => {
                    if *opcode == NEW {
                        new_class = Some(*class);
                    }
                    self.op(*opcode);
                    self.class(*class, owner)?;
                }
                Instruction::MultiANewArray {
                    class: CpRef::Class(class),
                    dimensions,
                } => {
                    self.op(MULTIANEWARRAY);
                    self.class(*class, owner)?;
                    self.operands.push(Band::Byte, *dimensions as i32);
                }
                Instruction::Branch { opcode, target } => {
                    self.op(*opcode);
                    self.label(index, *target)?;
                }
                Instruction::TableSwitch {
                    default,
                    low,
                    targets,
                } => {
                    self.op(TABLESWITCH);
                    self.operands.push_index(Band::CaseCount, targets.len())?;
                    self.operands.push(Band::CaseValue, *low);
                    self.label(index, *default)?;
                    for target in targets {
                        self.label(index, *target)?;
                    }
                }
                Instruction::LookupSwitch { default, pairs } => {
                    self.op(LOOKUPSWITCH);
                    self.operands.push_index(Band::CaseCount, pairs.len())?;
                    for (key, _) in pairs {
                        self.operands.push(Band::CaseValue, *key);
                    }
                    self.label(index, *default)?;
                    for (_, target) in pairs {
                        self.label(index, *target)?;
                    }
                }
                other => {
                    return Err(Error::unsupported(format!(
                        "instruction {:?} refers to the wrong kind of constant",
                        other
                    )))
                }
            }
            index += 1;
        }
        self.op(END_MARKER);
        Ok(())
    }

    fn op(&mut self, opcode: u8) {
        self.codes.push(opcode as i32);
    }

    fn label(&mut self, index: usize, target: usize) -> Result<(), Error> {
        let delta = to_i32(target)? - to_i32(index)?;
        self.operands.push(Band::Label, delta);
        Ok(())
    }

    fn class(&mut self, class: ClassId, owner: CodeOwner) -> Result<(), Error> {
        let value = if class == owner.this_class {
            0
        } else {
            class.index() + 1
        };
        self.operands.push_index(Band::ClassRef, value)
    }

    /// Self-linking opcode for a field or method instruction on the class or its superclass
    ///
    /// Constructor calls are left to the init opcodes.
    fn self_link(&self, instruction: &Insn, owner: CodeOwner) -> Option<(u8, Band, usize)> {
        let pool = self.pool;
        let (opcode, class, position, bands) = match instruction {
            Instruction::Field {
                opcode,
                field: CpRef::Field(field),
            } => {
                let class = pool.field_entry(*field).class;
                let position = self.members.fields(class).iter().position(|f| f == field)?;
                (*opcode, class, position, (Band::ThisField, Band::SuperField))
            }
            Instruction::Invoke {
                opcode,
                method: CpRef::Method(method),
            } => {
                let entry = pool.method_entry(*method);
                if pool.descr_name(entry.descr) == "<init>" {
                    return None;
                }
                let class = entry.class;
                let position = self.members.methods(class).iter().position(|m| m == method)?;
                (*opcode, class, position, (Band::ThisMethod, Band::SuperMethod))
            }
            _ => return None,
        };

        let relative = opcode - GETSTATIC;
        if class == owner.this_class {
            Some((SELF_LINKER_OP + relative, bands.0, position))
        } else if Some(class) == owner.super_class {
            Some((
                SELF_LINKER_OP + SELF_LINKER_SUPER_FLAG + relative,
                bands.1,
                position,
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::class_file::{GOTO, INVOKESTATIC, INVOKEVIRTUAL};
    use std::io::Cursor;

    fn round_trip(
        pool: &ConstantPool,
        codes: &[(CodeOwner, &[Insn])],
    ) -> (Vec<Vec<Insn>>, Vec<u8>) {
        let mut writer = BandWriter::new();
        write(&mut writer, pool, codes).unwrap();
        let bytes = writer.bands().to_vec();
        let mut reader = BandReader::new(Cursor::new(bytes.clone()));
        reader.set_band_headers(writer.band_headers().to_vec());
        let owners: Vec<CodeOwner> = codes.iter().map(|(owner, _)| *owner).collect();
        (read(&mut reader, pool, &owners).unwrap(), bytes)
    }

    #[test]
    fn constructor_with_self_linking() {
        let mut pool = ConstantPool::new();
        let this_class = pool.class("pkg/Point");
        let object = pool.class("java/lang/Object");
        let object_init = pool.method("java/lang/Object", "<init>", "()V");
        let x = pool.field("pkg/Point", "x", "I");
        let helper = pool.method("pkg/Point", "helper", "()V");
        let builder_init = pool.method("java/lang/StringBuilder", "<init>", "()V");
        let builder = pool.find_class("java/lang/StringBuilder").unwrap();
        let size = pool.imethod("java/util/List", "size", "()I");
        let big = pool.int(100_000);
        let owner = CodeOwner {
            this_class,
            super_class: Some(object),
        };

        let instructions: Vec<Insn> = vec![
            Instruction::Plain(ALOAD_0),
            Instruction::Invoke {
                opcode: INVOKESPECIAL,
                method: CpRef::Method(object_init),
            },
            Instruction::Plain(ALOAD_0),
            Instruction::BiPush(-3),
            Instruction::Field {
                opcode: PUTFIELD,
                field: CpRef::Field(x),
            },
            Instruction::Plain(ALOAD_0),
            Instruction::Invoke {
                opcode: INVOKEVIRTUAL,
                method: CpRef::Method(helper),
            },
            Instruction::Type {
                opcode: NEW,
                class: CpRef::Class(builder),
            },
            Instruction::Plain(0x59),
            Instruction::Invoke {
                opcode: INVOKESPECIAL,
                method: CpRef::Method(builder_init),
            },
            Instruction::Ldc {
                opcode: LDC_W,
                constant: CpRef::Int(big),
            },
            Instruction::Ldc {
                opcode: LDC,
                constant: CpRef::Class(this_class),
            },
            Instruction::InvokeInterface {
                method: CpRef::IMethod(size),
                count: 1,
            },
            Instruction::Iinc {
                index: 300,
                delta: -1000,
                wide: true,
            },
            Instruction::LookupSwitch {
                default: 0,
                pairs: vec![(-1, 2), (7, 16)],
            },
            Instruction::TableSwitch {
                default: 16,
                low: 5,
                targets: vec![0, 15],
            },
            Instruction::Branch {
                opcode: GOTO,
                target: 0,
            },
            Instruction::Plain(0xb1),
        ];

        let (decoded, bytes) = round_trip(&pool, &[(owner, &instructions[..])]);
        assert_eq!(decoded, vec![instructions]);

        // The first opcodes are `aload_0` then the super init, then a plain `aload_0` which is not
        // directly followed by the `putfield`
        assert_eq!(bytes[..3], [ALOAD_0, INVOKE_SUPER_INIT, ALOAD_0]);
        assert!(bytes.contains(&(SELF_LINKER_OP + SELF_LINKER_ALOAD_FLAG + 4)));
        assert!(bytes.contains(&INVOKE_NEW_INIT));
        assert!(bytes.contains(&ILDC_W));
        assert!(bytes.contains(&CLDC));
    }

    #[test]
    fn several_methods() {
        let mut pool = ConstantPool::new();
        let a = pool.class("A");
        let other = pool.method("B", "run", "()V");
        let owner = CodeOwner {
            this_class: a,
            super_class: None,
        };
        let first: Vec<Insn> = vec![
            Instruction::Invoke {
                opcode: INVOKESTATIC,
                method: CpRef::Method(other),
            },
            Instruction::Plain(0xb1),
        ];
        let second: Vec<Insn> = vec![Instruction::Plain(0xb1)];
        let empty: Vec<Insn> = vec![];

        let (decoded, _) = round_trip(
            &pool,
            &[(owner, &first[..]), (owner, &empty[..]), (owner, &second[..])],
        );
        assert_eq!(decoded, vec![first, empty, second]);
    }

    #[test]
    fn bad_opcodes() {
        let pool = ConstantPool::new();
        let owner = CodeOwner {
            this_class: ClassId::from_index(0),
            super_class: None,
        };
        let mut reader = BandReader::new(Cursor::new(vec![245, END_MARKER]));
        assert!(matches!(
            read(&mut reader, &pool, &[owner]),
            Err(Error::Format(FormatError::BadOpcode(245)))
        ));

        let mut reader = BandReader::new(Cursor::new(vec![186, END_MARKER]));
        assert!(matches!(
            read(&mut reader, &pool, &[owner]),
            Err(Error::Unsupported(_))
        ));

        let mut reader = BandReader::new(Cursor::new(vec![0x00, 0x01]));
        assert!(read(&mut reader, &pool, &[owner]).unwrap_err().is_format_error());
    }
}
