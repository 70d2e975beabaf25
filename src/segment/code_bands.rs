use super::ic_bands::{optional_class, optional_index};
use crate::class_file::{
    check_frame_type, StackMapFrame, StackMapTable, VerificationType, FULL_FRAME, OBJECT_TAG,
    SAME_FRAME_EXTENDED, SAME_LOCALS_1_STACK_ITEM_EXTENDED, UNINITIALIZED_TAG,
};
use crate::codec::{capacity_for, BandReader, BandWriter, Coding};
use crate::cp::{ClassId, ConstantPool};
use crate::errors::{Error, FormatError};
use crate::model::{Code, CodeAttribute, ExceptionHandler, LineNumber, LocalVariable};
use std::io::Read;

const STACK_MAP_TABLE: u32 = 1 << 0;
const LINE_NUMBER_TABLE: u32 = 1 << 1;
const LOCAL_VARIABLE_TABLE: u32 = 1 << 2;
const LOCAL_VARIABLE_TYPE_TABLE: u32 = 1 << 3;
const CODE_ATTRIBUTES: u32 =
    STACK_MAP_TABLE | LINE_NUMBER_TABLE | LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE;

type Frame = StackMapFrame<ClassId, usize>;
type Type = VerificationType<ClassId, usize>;

/// Sizes of a method body, as packed into a code header byte
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct CodeSizes {
    max_stack: usize,

    /// Locals beyond the arguments (and `this`)
    max_na_locals: usize,
    handler_count: usize,
}

impl CodeSizes {
    /// Single byte header for small methods, or 0 if the sizes need the long form
    ///
    /// | handlers | header     | stack | locals |
    /// |----------|------------|-------|--------|
    /// | 0        | 1 to 144   | < 12  | < 12   |
    /// | 1        | 145 to 208 | < 8   | < 8    |
    /// | 2        | 209 to 250 | < 7   | < 6    |
    fn header(&self) -> u8 {
        let (base, stack_limit, locals_limit) = match self.handler_count {
            0 => (1, 12, 12),
            1 => (145, 8, 8),
            2 => (209, 7, 6),
            _ => return 0,
        };
        if self.max_stack < stack_limit && self.max_na_locals < locals_limit {
            (base + self.max_stack + stack_limit * self.max_na_locals) as u8
        } else {
            0
        }
    }

    fn from_header(header: u8) -> Option<CodeSizes> {
        let header = header as usize;
        let (base, handler_count, stack_limit) = match header {
            0 => return None,
            1..=144 => (1, 0, 12),
            145..=208 => (145, 1, 8),
            _ => (209, 2, 7),
        };
        let packed = header - base;
        Some(CodeSizes {
            max_stack: packed % stack_limit,
            max_na_locals: packed / stack_limit,
            handler_count,
        })
    }
}

/// Read code headers, exception handlers, and code attributes
///
/// `argument_slots` has one entry per method with code: the local slots taken by the arguments,
/// including `this`. The codes come back without instructions.
pub fn read<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    argument_slots: &[usize],
    all_code_flags: bool,
) -> Result<Vec<Code>, Error> {
    let count = argument_slots.len();
    let headers = reader.read_band("code_headers", Coding::BYTE1, count)?;
    let long_count = headers.iter().filter(|header| **header == 0).count();
    let max_stacks = reader.read_counts("code_max_stack", Coding::UNSIGNED5, long_count)?;
    let max_na_locals = reader.read_counts("code_max_na_locals", Coding::UNSIGNED5, long_count)?;
    let handler_counts = reader.read_counts("code_handler_count", Coding::UNSIGNED5, long_count)?;

    let mut long_forms = max_stacks
        .into_iter()
        .zip(max_na_locals)
        .zip(handler_counts)
        .map(|((max_stack, max_na_locals), handler_count)| CodeSizes {
            max_stack,
            max_na_locals,
            handler_count,
        });
    let mut sizes = Vec::with_capacity(capacity_for(count));
    for header in &headers {
        match CodeSizes::from_header(*header as u8) {
            Some(short_form) => sizes.push(short_form),
            None => sizes.extend(long_forms.next()),
        }
    }

    let handler_count = sizes.iter().map(|sizes| sizes.handler_count).sum();
    let handler_starts = reader.read_counts("code_handler_start_P", Coding::BCI5, handler_count)?;
    let handler_ends = reader.read_band("code_handler_end_PO", Coding::BRANCH5, handler_count)?;
    let handler_catches = reader.read_band("code_handler_catch_PO", Coding::BRANCH5, handler_count)?;
    let handler_classes =
        reader.read_band("code_handler_class_RCN", Coding::UNSIGNED5, handler_count)?;

    let flag_count = if all_code_flags { count } else { long_count };
    let flag_values = reader.read_band("code_flags_lo", Coding::UNSIGNED5, flag_count)?;
    let mut flag_values = flag_values.into_iter();
    let mut flags = Vec::with_capacity(capacity_for(count));
    for header in headers {
        let value = if all_code_flags || header == 0 {
            flag_values.next().unwrap_or_default() as u32
        } else {
            0
        };
        let unknown = value & !CODE_ATTRIBUTES;
        if unknown != 0 {
            return Err(Error::unsupported(format!(
                "code attribute flags {:#x}",
                unknown
            )));
        }
        flags.push(value);
    }

    let with = |bit: u32| flags.iter().filter(|flags| *flags & bit != 0).count();
    let stack_maps = read_stack_maps(reader, pool, with(STACK_MAP_TABLE))?;
    let line_numbers = read_line_numbers(reader, with(LINE_NUMBER_TABLE))?;
    let local_variables =
        read_local_variables(reader, pool, "code_LocalVariableTable", with(LOCAL_VARIABLE_TABLE))?;
    let local_variable_types = read_local_variables(
        reader,
        pool,
        "code_LocalVariableTypeTable",
        with(LOCAL_VARIABLE_TYPE_TABLE),
    )?;

    let mut handlers = handler_starts
        .into_iter()
        .zip(handler_ends)
        .zip(handler_catches)
        .zip(handler_classes);
    let mut stack_maps = stack_maps.into_iter();
    let mut line_numbers = line_numbers.into_iter();
    let mut local_variables = local_variables.into_iter();
    let mut local_variable_types = local_variable_types.into_iter();

    let mut codes = Vec::with_capacity(capacity_for(count));
    for ((sizes, flags), argument_slots) in sizes.into_iter().zip(flags).zip(argument_slots) {
        let mut code_handlers = Vec::with_capacity(capacity_for(sizes.handler_count));
        for (((start, end), catch), class) in handlers.by_ref().take(sizes.handler_count) {
            let end = relative("code_handler_end_PO", start, end)?;
            code_handlers.push(ExceptionHandler {
                start,
                end,
                handler: relative("code_handler_catch_PO", end, catch)?,
                catch_type: optional_class(pool, "code_handler_class_RCN", class)?,
            });
        }

        let mut attributes = vec![];
        if flags & STACK_MAP_TABLE != 0 {
            attributes.extend(stack_maps.next().map(CodeAttribute::StackMapTable));
        }
        if flags & LINE_NUMBER_TABLE != 0 {
            attributes.extend(line_numbers.next().map(CodeAttribute::LineNumberTable));
        }
        if flags & LOCAL_VARIABLE_TABLE != 0 {
            attributes.extend(local_variables.next().map(CodeAttribute::LocalVariableTable));
        }
        if flags & LOCAL_VARIABLE_TYPE_TABLE != 0 {
            attributes.extend(
                local_variable_types
                    .next()
                    .map(CodeAttribute::LocalVariableTypeTable),
            );
        }

        codes.push(Code {
            max_stack: to_u16("code_max_stack", sizes.max_stack)?,
            max_locals: to_u16("code_max_na_locals", sizes.max_na_locals + argument_slots)?,
            instructions: vec![],
            handlers: code_handlers,
            attributes,
        });
    }

    log::debug!("Read code bands for {} methods", codes.len());
    Ok(codes)
}

fn relative(band: &str, base: usize, delta: i32) -> Result<usize, Error> {
    usize::try_from(base as i64 + delta as i64)
        .map_err(|_| Error::format(format!("{} points before the start of the code", band)))
}

fn to_u16(band: &str, value: usize) -> Result<u16, Error> {
    u16::try_from(value).map_err(|_| Error::format(format!("{} value {} is too large", band, value)))
}

fn read_stack_maps<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    count: usize,
) -> Result<Vec<StackMapTable<ClassId, usize>>, Error> {
    let frame_counts = reader.read_counts("code_StackMapTable_N", Coding::UNSIGNED5, count)?;
    let frame_types = reader
        .read_band(
            "code_StackMapTable_frame_T",
            Coding::BYTE1,
            frame_counts.iter().sum(),
        )?
        .into_iter()
        .map(|frame_type| check_frame_type(frame_type as u8))
        .collect::<Result<Vec<u8>, Error>>()?;

    let full_count = frame_types.iter().filter(|t| **t == FULL_FRAME).count();
    let local_counts = reader.read_counts("code_StackMapTable_local_N", Coding::UNSIGNED5, full_count)?;
    let stack_counts = reader.read_counts("code_StackMapTable_stack_N", Coding::UNSIGNED5, full_count)?;
    let offset_count = frame_types
        .iter()
        .filter(|t| **t >= SAME_LOCALS_1_STACK_ITEM_EXTENDED)
        .count();
    let offsets = reader.read_band("code_StackMapTable_offset", Coding::UNSIGNED5, offset_count)?;

    let mut full_sizes = local_counts.iter().zip(&stack_counts);
    let mut type_count = 0;
    for frame_type in &frame_types {
        type_count += match *frame_type {
            64..=127 | SAME_LOCALS_1_STACK_ITEM_EXTENDED => 1,
            252..=254 => (*frame_type - SAME_FRAME_EXTENDED) as usize,
            FULL_FRAME => full_sizes
                .next()
                .map_or(0, |(locals, stack)| locals + stack),
            _ => 0,
        };
    }

    let tags = reader.read_band("code_StackMapTable_T", Coding::BYTE1, type_count)?;
    let object_count = tags.iter().filter(|tag| **tag == OBJECT_TAG as i32).count();
    let uninitialized_count = tags
        .iter()
        .filter(|tag| **tag == UNINITIALIZED_TAG as i32)
        .count();
    let classes = reader.read_band("code_StackMapTable_RC", Coding::UNSIGNED5, object_count)?;
    let positions = reader.read_counts("code_StackMapTable_P", Coding::BCI5, uninitialized_count)?;

    let mut classes = classes.into_iter();
    let mut positions = positions.into_iter();
    let mut types = Vec::with_capacity(tags.len());
    for tag in tags {
        types.push(match tag as u8 {
            OBJECT_TAG => {
                let class = classes.next().unwrap_or_default();
                VerificationType::Object(pool.class_id("code_StackMapTable_RC", class)?)
            }
            UNINITIALIZED_TAG => VerificationType::Uninitialized(positions.next().unwrap_or_default()),
            tag => VerificationType::from_simple_tag(tag)?,
        });
    }

    let mut types = types.into_iter();
    let mut offsets = offsets.into_iter();
    let mut full_sizes = local_counts.into_iter().zip(stack_counts);
    let mut frame_types = frame_types.into_iter();
    let mut tables = Vec::with_capacity(capacity_for(count));
    for frame_count in frame_counts {
        let mut frames = Vec::with_capacity(capacity_for(frame_count));
        for frame_type in frame_types.by_ref().take(frame_count) {
            let mut offset_delta = || -> Result<u16, Error> {
                let delta = offsets.next().unwrap_or_default();
                u16::try_from(delta).map_err(|_| {
                    Error::format(format!("stack map offset delta {} is out of range", delta))
                })
            };
            frames.push(match frame_type {
                0..=63 => StackMapFrame::Same {
                    offset_delta: frame_type,
                },
                64..=127 => StackMapFrame::SameLocals1StackItem {
                    offset_delta: frame_type - 64,
                    stack: next_type(&mut types)?,
                },
                SAME_LOCALS_1_STACK_ITEM_EXTENDED => StackMapFrame::SameLocals1StackItemExtended {
                    offset_delta: offset_delta()?,
                    stack: next_type(&mut types)?,
                },
                248..=250 => StackMapFrame::Chop {
                    offset_delta: offset_delta()?,
                    k: SAME_FRAME_EXTENDED - frame_type,
                },
                SAME_FRAME_EXTENDED => StackMapFrame::SameExtended {
                    offset_delta: offset_delta()?,
                },
                252..=254 => StackMapFrame::Append {
                    offset_delta: offset_delta()?,
                    locals: next_types(&mut types, (frame_type - SAME_FRAME_EXTENDED) as usize)?,
                },
                FULL_FRAME => {
                    let offset_delta = offset_delta()?;
                    let (local_count, stack_count) = full_sizes.next().unwrap_or_default();
                    StackMapFrame::Full {
                        offset_delta,
                        locals: next_types(&mut types, local_count)?,
                        stack: next_types(&mut types, stack_count)?,
                    }
                }
                reserved => return Err(Error::Format(FormatError::BadFrameType(reserved))),
            });
        }
        tables.push(StackMapTable(frames));
    }
    Ok(tables)
}

fn next_type(types: &mut impl Iterator<Item = Type>) -> Result<Type, Error> {
    types
        .next()
        .ok_or_else(|| Error::format("stack map frame is missing verification types"))
}

fn next_types(types: &mut impl Iterator<Item = Type>, count: usize) -> Result<Vec<Type>, Error> {
    (0..count).map(|_| next_type(types)).collect()
}

fn read_line_numbers<R: Read>(
    reader: &mut BandReader<R>,
    count: usize,
) -> Result<Vec<Vec<LineNumber>>, Error> {
    let counts = reader.read_counts("code_LineNumberTable_N", Coding::UNSIGNED5, count)?;
    let total = counts.iter().sum();
    let starts = reader.read_counts("code_LineNumberTable_bci_P", Coding::BCI5, total)?;
    let lines = reader.read_counts("code_LineNumberTable_line", Coding::UNSIGNED5, total)?;

    let mut entries = starts.into_iter().zip(lines);
    let mut tables = Vec::with_capacity(capacity_for(count));
    for count in counts {
        let mut table = Vec::with_capacity(capacity_for(count));
        for (start, line) in entries.by_ref().take(count) {
            table.push(LineNumber {
                start,
                line: to_u16("code_LineNumberTable_line", line)?,
            });
        }
        tables.push(table);
    }
    Ok(tables)
}

fn read_local_variables<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    prefix: &str,
    count: usize,
) -> Result<Vec<Vec<LocalVariable>>, Error> {
    let band = |suffix: &str| format!("{}_{}", prefix, suffix);
    let counts = reader.read_counts(&band("N"), Coding::UNSIGNED5, count)?;
    let total = counts.iter().sum();
    let starts = reader.read_counts(&band("bci_P"), Coding::BCI5, total)?;
    let spans = reader.read_band(&band("span_O"), Coding::BRANCH5, total)?;
    let names = reader.read_band(&band("name_RU"), Coding::UNSIGNED5, total)?;
    let types = reader.read_band(&band("type_RS"), Coding::UNSIGNED5, total)?;
    let slots = reader.read_counts(&band("slot"), Coding::UNSIGNED5, total)?;

    let mut entries = starts.into_iter().zip(spans).zip(names).zip(types).zip(slots);
    let mut tables = Vec::with_capacity(capacity_for(count));
    for count in counts {
        let mut table = Vec::with_capacity(capacity_for(count));
        for ((((start, span), name), signature), slot) in entries.by_ref().take(count) {
            table.push(LocalVariable {
                start,
                end: relative(&band("span_O"), start, span)?,
                name: pool.utf8_id(&band("name_RU"), name)?,
                signature: pool.signature_id(&band("type_RS"), signature)?,
                slot: to_u16(&band("slot"), slot)?,
            });
        }
        tables.push(table);
    }
    Ok(tables)
}

/// Write code headers, exception handlers, and code attributes
///
/// Each code is paired with the local slots taken by the method's arguments, including `this`.
/// Every code gets an entry in `code_flags_lo`.
pub fn write(writer: &mut BandWriter, codes: &[(&Code, usize)]) -> Result<(), Error> {
    let mut headers = vec![];
    let mut max_stacks = vec![];
    let mut max_na_locals = vec![];
    let mut handler_counts = vec![];
    let mut handler_starts = vec![];
    let mut handler_ends = vec![];
    let mut handler_catches = vec![];
    let mut handler_classes = vec![];
    let mut flags = vec![];
    for (code, argument_slots) in codes {
        let sizes = CodeSizes {
            max_stack: code.max_stack as usize,
            max_na_locals: (code.max_locals as usize)
                .checked_sub(*argument_slots)
                .ok_or_else(|| {
                    Error::unsupported(format!(
                        "max_locals {} is below the {} argument slots",
                        code.max_locals, argument_slots
                    ))
                })?,
            handler_count: code.handlers.len(),
        };
        let header = sizes.header();
        headers.push(header as i32);
        if header == 0 {
            max_stacks.push(sizes.max_stack);
            max_na_locals.push(sizes.max_na_locals);
            handler_counts.push(sizes.handler_count);
        }

        for handler in &code.handlers {
            handler_starts.push(handler.start);
            handler_ends.push(difference(handler.end, handler.start)?);
            handler_catches.push(difference(handler.handler, handler.end)?);
            handler_classes.push(optional_index(handler.catch_type.map(ClassId::index)));
        }

        flags.push(
            code.attributes
                .iter()
                .fold(0, |flags, attribute| flags | 1 << attribute.rank()),
        );
    }

    writer.write_band("code_headers", Coding::BYTE1, &headers)?;
    writer.write_indices("code_max_stack", Coding::UNSIGNED5, &max_stacks)?;
    writer.write_indices("code_max_na_locals", Coding::UNSIGNED5, &max_na_locals)?;
    writer.write_indices("code_handler_count", Coding::UNSIGNED5, &handler_counts)?;
    writer.write_indices("code_handler_start_P", Coding::BCI5, &handler_starts)?;
    writer.write_band("code_handler_end_PO", Coding::BRANCH5, &handler_ends)?;
    writer.write_band("code_handler_catch_PO", Coding::BRANCH5, &handler_catches)?;
    writer.write_indices("code_handler_class_RCN", Coding::UNSIGNED5, &handler_classes)?;
    writer.write_band("code_flags_lo", Coding::UNSIGNED5, &flags)?;

    let attributes = || codes.iter().flat_map(|(code, _)| &code.attributes);
    write_stack_maps(
        writer,
        attributes().filter_map(|attribute| match attribute {
            CodeAttribute::StackMapTable(table) => Some(table),
            _ => None,
        }),
    )?;
    write_line_numbers(
        writer,
        attributes().filter_map(|attribute| match attribute {
            CodeAttribute::LineNumberTable(lines) => Some(lines.as_slice()),
            _ => None,
        }),
    )?;
    write_local_variables(
        writer,
        "code_LocalVariableTable",
        attributes().filter_map(|attribute| match attribute {
            CodeAttribute::LocalVariableTable(variables) => Some(variables.as_slice()),
            _ => None,
        }),
    )?;
    write_local_variables(
        writer,
        "code_LocalVariableTypeTable",
        attributes().filter_map(|attribute| match attribute {
            CodeAttribute::LocalVariableTypeTable(variables) => Some(variables.as_slice()),
            _ => None,
        }),
    )?;
    Ok(())
}

fn difference(to: usize, from: usize) -> Result<i32, Error> {
    crate::codec::to_i32(to)?
        .checked_sub(crate::codec::to_i32(from)?)
        .ok_or_else(|| Error::format("code position difference overflows"))
}

fn write_stack_maps<'a>(
    writer: &mut BandWriter,
    tables: impl Iterator<Item = &'a StackMapTable<ClassId, usize>>,
) -> Result<(), Error> {
    let mut frame_counts = vec![];
    let mut frame_types = vec![];
    let mut local_counts = vec![];
    let mut stack_counts = vec![];
    let mut offsets = vec![];
    let mut types: Vec<&Type> = vec![];
    for StackMapTable(frames) in tables {
        frame_counts.push(frames.len());
        for frame in frames {
            let frame_type = frame.frame_type();
            frame_types.push(frame_type as i32);
            if frame_type >= SAME_LOCALS_1_STACK_ITEM_EXTENDED {
                offsets.push(frame.offset_delta() as usize);
            }
            match frame {
                Frame::Same { .. } | Frame::Chop { .. } | Frame::SameExtended { .. } => (),
                Frame::SameLocals1StackItem { stack, .. }
                | Frame::SameLocals1StackItemExtended { stack, .. } => types.push(stack),
                Frame::Append { locals, .. } => types.extend(locals),
                Frame::Full { locals, stack, .. } => {
                    local_counts.push(locals.len());
                    stack_counts.push(stack.len());
                    types.extend(locals);
                    types.extend(stack);
                }
            }
        }
    }

    let tags: Vec<i32> = types.iter().map(|ty| ty.tag() as i32).collect();
    let classes: Vec<usize> = types
        .iter()
        .filter_map(|ty| match ty {
            VerificationType::Object(class) => Some(class.index()),
            _ => None,
        })
        .collect();
    let positions: Vec<usize> = types
        .iter()
        .filter_map(|ty| match ty {
            VerificationType::Uninitialized(position) => Some(*position),
            _ => None,
        })
        .collect();

    writer.write_indices("code_StackMapTable_N", Coding::UNSIGNED5, &frame_counts)?;
    writer.write_band("code_StackMapTable_frame_T", Coding::BYTE1, &frame_types)?;
    writer.write_indices("code_StackMapTable_local_N", Coding::UNSIGNED5, &local_counts)?;
    writer.write_indices("code_StackMapTable_stack_N", Coding::UNSIGNED5, &stack_counts)?;
    writer.write_indices("code_StackMapTable_offset", Coding::UNSIGNED5, &offsets)?;
    writer.write_band("code_StackMapTable_T", Coding::BYTE1, &tags)?;
    writer.write_indices("code_StackMapTable_RC", Coding::UNSIGNED5, &classes)?;
    writer.write_indices("code_StackMapTable_P", Coding::BCI5, &positions)?;
    Ok(())
}

fn write_line_numbers<'a>(
    writer: &mut BandWriter,
    tables: impl Iterator<Item = &'a [LineNumber]>,
) -> Result<(), Error> {
    let mut counts = vec![];
    let mut starts = vec![];
    let mut lines = vec![];
    for table in tables {
        counts.push(table.len());
        for line in table {
            starts.push(line.start);
            lines.push(line.line as usize);
        }
    }
    writer.write_indices("code_LineNumberTable_N", Coding::UNSIGNED5, &counts)?;
    writer.write_indices("code_LineNumberTable_bci_P", Coding::BCI5, &starts)?;
    writer.write_indices("code_LineNumberTable_line", Coding::UNSIGNED5, &lines)?;
    Ok(())
}

fn write_local_variables<'a>(
    writer: &mut BandWriter,
    prefix: &str,
    tables: impl Iterator<Item = &'a [LocalVariable]>,
) -> Result<(), Error> {
    let mut counts = vec![];
    let mut starts = vec![];
    let mut spans = vec![];
    let mut names = vec![];
    let mut types = vec![];
    let mut slots = vec![];
    for table in tables {
        counts.push(table.len());
        for variable in table {
            starts.push(variable.start);
            spans.push(difference(variable.end, variable.start)?);
            names.push(variable.name.index());
            types.push(variable.signature.index());
            slots.push(variable.slot as usize);
        }
    }
    let band = |suffix: &str| format!("{}_{}", prefix, suffix);
    writer.write_indices(&band("N"), Coding::UNSIGNED5, &counts)?;
    writer.write_indices(&band("bci_P"), Coding::BCI5, &starts)?;
    writer.write_band(&band("span_O"), Coding::BRANCH5, &spans)?;
    writer.write_indices(&band("name_RU"), Coding::UNSIGNED5, &names)?;
    writer.write_indices(&band("type_RS"), Coding::UNSIGNED5, &types)?;
    writer.write_indices(&band("slot"), Coding::UNSIGNED5, &slots)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn round_trip(pool: &ConstantPool, codes: &[(&Code, usize)]) -> Vec<Code> {
        let mut writer = BandWriter::new();
        write(&mut writer, codes).unwrap();
        let mut reader = BandReader::new(Cursor::new(writer.bands().to_vec()));
        reader.set_band_headers(writer.band_headers().to_vec());
        let argument_slots: Vec<usize> = codes.iter().map(|(_, slots)| *slots).collect();
        read(&mut reader, pool, &argument_slots, true).unwrap()
    }

    fn code(max_stack: u16, max_locals: u16, handlers: usize) -> Code {
        Code {
            max_stack,
            max_locals,
            instructions: vec![],
            handlers: (0..handlers)
                .map(|n| ExceptionHandler {
                    start: n,
                    end: n + 2,
                    handler: 1,
                    catch_type: None,
                })
                .collect(),
            attributes: vec![],
        }
    }

    #[test]
    fn header_forms() {
        let sizes = |max_stack, max_na_locals, handler_count| CodeSizes {
            max_stack,
            max_na_locals,
            handler_count,
        };
        assert_eq!(sizes(0, 0, 0).header(), 1);
        assert_eq!(sizes(11, 11, 0).header(), 144);
        assert_eq!(sizes(12, 0, 0).header(), 0);
        assert_eq!(sizes(7, 7, 1).header(), 208);
        assert_eq!(sizes(6, 5, 2).header(), 250);
        assert_eq!(sizes(6, 6, 2).header(), 0);
        assert_eq!(sizes(0, 0, 3).header(), 0);
        for header in 1..=250 {
            let decoded = CodeSizes::from_header(header).unwrap();
            assert_eq!(decoded.header(), header);
        }
    }

    #[test]
    fn codes_survive_bands() {
        let mut pool = ConstantPool::new();
        let string = pool.class("java/lang/String");
        let name = pool.utf8("this");
        let signature = pool.signature("Lpkg/A;");

        let mut small = code(2, 3, 1);
        small.handlers[0].catch_type = Some(string);
        small.attributes = vec![
            CodeAttribute::StackMapTable(StackMapTable(vec![
                StackMapFrame::SameExtended { offset_delta: 300 },
                StackMapFrame::SameLocals1StackItem {
                    offset_delta: 3,
                    stack: VerificationType::Uninitialized(42),
                },
                StackMapFrame::Full {
                    offset_delta: 9,
                    locals: vec![VerificationType::Object(string), VerificationType::Long],
                    stack: vec![VerificationType::UninitializedThis],
                },
                StackMapFrame::Chop {
                    offset_delta: 0,
                    k: 2,
                },
                StackMapFrame::Append {
                    offset_delta: 1,
                    locals: vec![VerificationType::Integer, VerificationType::Top],
                },
            ])),
            CodeAttribute::LineNumberTable(vec![
                LineNumber { start: 0, line: 10 },
                LineNumber { start: 4, line: 9 },
            ]),
            CodeAttribute::LocalVariableTable(vec![LocalVariable {
                start: 0,
                end: 7,
                name,
                signature,
                slot: 0,
            }]),
        ];
        let large = code(100, 300, 4);

        let read = round_trip(&pool, &[(&small, 1), (&large, 2)]);
        assert_eq!(read, vec![small, large]);
    }

    #[test]
    fn reserved_frame_type() {
        let pool = ConstantPool::new();
        let mut writer = BandWriter::new();
        writer.write_band("code_headers", Coding::BYTE1, &[1]).unwrap();
        writer.write_band("code_flags_lo", Coding::UNSIGNED5, &[1]).unwrap();
        writer.write_band("code_StackMapTable_N", Coding::UNSIGNED5, &[1]).unwrap();
        writer.write_band("code_StackMapTable_frame_T", Coding::BYTE1, &[200]).unwrap();

        let mut reader = BandReader::new(Cursor::new(writer.bands().to_vec()));
        let err = read(&mut reader, &pool, &[0], true).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadFrameType(200))));
    }

    #[test]
    fn unknown_code_attribute() {
        let pool = ConstantPool::new();
        let mut writer = BandWriter::new();
        writer.write_band("code_headers", Coding::BYTE1, &[1]).unwrap();
        writer.write_band("code_flags_lo", Coding::UNSIGNED5, &[1 << 5]).unwrap();

        let mut reader = BandReader::new(Cursor::new(writer.bands().to_vec()));
        let err = read(&mut reader, &pool, &[0], true).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
