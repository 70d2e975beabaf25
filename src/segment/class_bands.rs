use super::ic_bands::{inner_class_flags, optional_class, optional_index, optional_utf8, LONG_FORM};
use super::metadata_bands::{self, Metadata, MetadataReader, MetadataWriter};
use crate::class_file::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, Version};
use crate::codec::{capacity_for, BandReader, BandWriter, Coding};
use crate::cp::{ClassId, ConstantPool, DescrId};
use crate::errors::Error;
use crate::model::{
    Class, ClassAttribute, CpRef, Field, FieldAttribute, InnerClass, Method, MethodAttribute,
    ValueKind,
};
use std::io::Read;

const ACCESS_MASK: u32 = 0xFFFF;

/// Flag bit of the attribute of the given rank (for classes, fields, and methods)
const fn attribute_bit(rank: u8) -> u32 {
    1 << (17 + rank as u32)
}

const CONSTANT_VALUE: u32 = attribute_bit(0);
const CODE: u32 = attribute_bit(0);
const SOURCE_FILE: u32 = attribute_bit(0);
const EXCEPTIONS: u32 = attribute_bit(1);
const ENCLOSING_METHOD: u32 = attribute_bit(1);
const SIGNATURE: u32 = attribute_bit(2);
const DEPRECATED: u32 = attribute_bit(3);
const VISIBLE_ANNOTATIONS: u32 = attribute_bit(4);
const INVISIBLE_ANNOTATIONS: u32 = attribute_bit(5);
const VISIBLE_PARAMETER_ANNOTATIONS: u32 = attribute_bit(6);
const INVISIBLE_PARAMETER_ANNOTATIONS: u32 = attribute_bit(7);
const ANNOTATION_DEFAULT: u32 = attribute_bit(8);
const INNER_CLASSES: u32 = 1 << 23;
const CLASS_FILE_VERSION: u32 = 1 << 24;

const ANNOTATIONS: u32 = VISIBLE_ANNOTATIONS | INVISIBLE_ANNOTATIONS;
const FIELD_ATTRIBUTES: u32 = CONSTANT_VALUE | SIGNATURE | DEPRECATED | ANNOTATIONS;
const METHOD_ATTRIBUTES: u32 = CODE
    | EXCEPTIONS
    | SIGNATURE
    | DEPRECATED
    | ANNOTATIONS
    | VISIBLE_PARAMETER_ANNOTATIONS
    | INVISIBLE_PARAMETER_ANNOTATIONS
    | ANNOTATION_DEFAULT;
const CLASS_ATTRIBUTES: u32 = SOURCE_FILE
    | ENCLOSING_METHOD
    | SIGNATURE
    | DEPRECATED
    | ANNOTATIONS
    | INNER_CLASSES
    | CLASS_FILE_VERSION;

/// Metadata attributes of classes and fields, in flag bit order
const MEMBER_METADATA: [u32; 2] = [VISIBLE_ANNOTATIONS, INVISIBLE_ANNOTATIONS];

/// Metadata attributes of methods, in flag bit order
const METHOD_METADATA: [u32; 5] = [
    VISIBLE_ANNOTATIONS,
    INVISIBLE_ANNOTATIONS,
    VISIBLE_PARAMETER_ANNOTATIONS,
    INVISIBLE_PARAMETER_ANNOTATIONS,
    ANNOTATION_DEFAULT,
];

/// Classes read from the class bands
///
/// Methods with code do not have their `Code` attribute yet: it is filled in from the code and
/// bytecode bands, which follow.
pub struct ReadClasses {
    pub classes: Vec<Class>,

    /// Class and method index of every method with code, in band order
    pub code_methods: Vec<(usize, usize)>,
}

/// `SourceFile` implied for a class with no explicit one in the bands
///
/// This is the class name without its package, cut at the first `$`, with a `.java` extension.
pub fn predicted_source_file(class_name: &str) -> String {
    let simple = class_name.rsplit('/').next().unwrap_or(class_name);
    let outermost = simple.split('$').next().unwrap_or(simple);
    format!("{}.java", outermost)
}

pub fn read<R: Read>(
    reader: &mut BandReader<R>,
    pool: &mut ConstantPool,
    class_count: usize,
    default_version: Version,
    global_inner_classes: &[InnerClass],
) -> Result<ReadClasses, Error> {
    let this_classes = read_classes(reader, pool, "class_this", Coding::DELTA5, class_count)?;
    let super_classes = read_classes(reader, pool, "class_super", Coding::DELTA5, class_count)?;
    let interface_counts = reader.read_counts("class_interface_count", Coding::DELTA5, class_count)?;
    let interfaces = read_classes(
        reader,
        pool,
        "class_interface",
        Coding::DELTA5,
        interface_counts.iter().sum(),
    )?;
    let field_counts = reader.read_counts("class_field_count", Coding::DELTA5, class_count)?;
    let method_counts = reader.read_counts("class_method_count", Coding::DELTA5, class_count)?;

    let fields = read_fields(reader, pool, field_counts.iter().sum())?;
    let (methods, method_flags) = read_methods(reader, pool, method_counts.iter().sum())?;

    let flags = read_flags(reader, "class_flags_lo", class_count, CLASS_ATTRIBUTES, "class")?;
    let calls = read_attr_calls(reader, "class", &flags, &MEMBER_METADATA)?;
    let source_files = reader.read_band(
        "class_SourceFile_RUN",
        Coding::UNSIGNED5,
        count_with(&flags, SOURCE_FILE),
    )?;
    let enclosing_count = count_with(&flags, ENCLOSING_METHOD);
    let enclosing_classes = read_classes(
        reader,
        pool,
        "class_EnclosingMethod_RC",
        Coding::UNSIGNED5,
        enclosing_count,
    )?;
    let enclosing_methods =
        reader.read_band("class_EnclosingMethod_RDN", Coding::UNSIGNED5, enclosing_count)?;
    let signatures =
        reader.read_band("class_Signature_RS", Coding::UNSIGNED5, count_with(&flags, SIGNATURE))?;
    let mut visible = read_metadata(
        reader,
        "class_RVA",
        Metadata::Annotations,
        &flags,
        VISIBLE_ANNOTATIONS,
        calls[0],
    )?;
    let mut invisible = read_metadata(
        reader,
        "class_RIA",
        Metadata::Annotations,
        &flags,
        INVISIBLE_ANNOTATIONS,
        calls[1],
    )?;
    let inner_class_counts = reader.read_counts(
        "class_InnerClasses_N",
        Coding::UNSIGNED5,
        count_with(&flags, INNER_CLASSES),
    )?;
    let tuple_count = inner_class_counts.iter().sum();
    let tuple_inners = read_classes(
        reader,
        pool,
        "class_InnerClasses_RC",
        Coding::UNSIGNED5,
        tuple_count,
    )?;
    let tuple_flags = reader.read_band("class_InnerClasses_F", Coding::UNSIGNED5, tuple_count)?;
    let explicit_count = tuple_flags.iter().filter(|flags| **flags != 0).count();
    let tuple_outers =
        reader.read_band("class_InnerClasses_outer_RCN", Coding::UNSIGNED5, explicit_count)?;
    let tuple_names =
        reader.read_band("class_InnerClasses_name_RUN", Coding::UNSIGNED5, explicit_count)?;
    let version_count = count_with(&flags, CLASS_FILE_VERSION);
    let minor_versions =
        reader.read_band("class_file_version_minor_H", Coding::UNSIGNED5, version_count)?;
    let major_versions =
        reader.read_band("class_file_version_major_H", Coding::UNSIGNED5, version_count)?;

    let mut interfaces = interfaces.into_iter();
    let mut fields = fields.into_iter();
    let mut methods = methods.into_iter();
    let mut method_flags = method_flags.into_iter();
    let mut source_files = source_files.into_iter();
    let mut enclosing = enclosing_classes.into_iter().zip(enclosing_methods);
    let mut signatures = signatures.into_iter();
    let mut inner_class_counts = inner_class_counts.into_iter();
    let mut tuples = tuple_inners.into_iter().zip(tuple_flags);
    let mut explicit = tuple_outers.into_iter().zip(tuple_names);
    let mut versions = minor_versions.into_iter().zip(major_versions);

    let mut classes = Vec::with_capacity(capacity_for(class_count));
    let mut code_methods = vec![];
    for (index, this_class) in this_classes.into_iter().enumerate() {
        let flags = flags[index];
        let super_class = super_classes[index];

        let mut attributes = vec![];
        if flags & SOURCE_FILE != 0 {
            let source_file = match source_files.next().unwrap_or_default() {
                0 => {
                    let predicted = predicted_source_file(pool.class_name(this_class));
                    pool.utf8(&predicted)
                }
                n => pool.utf8_id("class_SourceFile_RUN", n.wrapping_sub(1))?,
            };
            attributes.push(ClassAttribute::SourceFile(source_file));
        }
        if flags & ENCLOSING_METHOD != 0 {
            if let Some((class, method)) = enclosing.next() {
                let method = match method {
                    0 => None,
                    n => Some(pool.descr_id("class_EnclosingMethod_RDN", n.wrapping_sub(1))?),
                };
                attributes.push(ClassAttribute::EnclosingMethod { class, method });
            }
        }
        if flags & SIGNATURE != 0 {
            let signature = signatures.next().unwrap_or_default();
            attributes.push(ClassAttribute::Signature(
                pool.signature_id("class_Signature_RS", signature)?,
            ));
        }
        if flags & DEPRECATED != 0 {
            attributes.push(ClassAttribute::Deprecated);
        }
        if flags & VISIBLE_ANNOTATIONS != 0 {
            attributes.push(ClassAttribute::VisibleAnnotations(visible.annotations(pool)?));
        }
        if flags & INVISIBLE_ANNOTATIONS != 0 {
            attributes.push(ClassAttribute::InvisibleAnnotations(invisible.annotations(pool)?));
        }

        let inner_classes = if flags & INNER_CLASSES != 0 {
            let count = inner_class_counts.next().unwrap_or_default();
            let mut local = Vec::with_capacity(capacity_for(count));
            for (inner, flags) in tuples.by_ref().take(count) {
                local.push(if flags == 0 {
                    *global_inner_classes
                        .iter()
                        .find(|tuple| tuple.inner == inner)
                        .ok_or_else(|| {
                            Error::format(format!(
                                "no inner class tuple for '{}' to copy",
                                pool.class_name(inner)
                            ))
                        })?
                } else {
                    let (outer, name) = explicit.next().unwrap_or_default();
                    InnerClass {
                        inner,
                        outer: optional_class(pool, "class_InnerClasses_outer_RCN", outer)?,
                        name: optional_utf8(pool, "class_InnerClasses_name_RUN", name)?,
                        flags: inner_class_flags(flags as u32)?,
                    }
                });
            }
            Some(local)
        } else {
            None
        };

        let version = if flags & CLASS_FILE_VERSION != 0 {
            let (minor, major) = versions.next().unwrap_or_default();
            Version {
                minor_version: version_part(minor)?,
                major_version: version_part(major)?,
            }
        } else {
            default_version
        };

        let mut class_methods = vec![];
        for method_index in 0..method_counts[index] {
            if method_flags.next().unwrap_or_default() & CODE != 0 {
                code_methods.push((index, method_index));
            }
            class_methods.extend(methods.next());
        }

        classes.push(Class {
            version,
            access_flags: ClassAccessFlags::from_bits((flags & ACCESS_MASK) as u16).ok_or_else(
                || Error::format(format!("bad class access flags {:#x}", flags & ACCESS_MASK)),
            )?,
            this_class,
            super_class: if super_class == this_class {
                None
            } else {
                Some(super_class)
            },
            interfaces: interfaces.by_ref().take(interface_counts[index]).collect(),
            fields: fields.by_ref().take(field_counts[index]).collect(),
            methods: class_methods,
            attributes,
            inner_classes,
        });
    }

    log::debug!(
        "Read class bands: {} classes, {} methods with code",
        classes.len(),
        code_methods.len()
    );
    Ok(ReadClasses {
        classes,
        code_methods,
    })
}

fn read_fields<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    count: usize,
) -> Result<Vec<Field>, Error> {
    let descrs = read_descrs(reader, pool, "field_descr", Coding::DELTA5, count)?;
    let flags = read_flags(reader, "field_flags_lo", count, FIELD_ATTRIBUTES, "field")?;
    let calls = read_attr_calls(reader, "field", &flags, &MEMBER_METADATA)?;
    let constant_values = reader.read_band(
        "field_ConstantValue_KQ",
        Coding::UNSIGNED5,
        count_with(&flags, CONSTANT_VALUE),
    )?;
    let signatures =
        reader.read_band("field_Signature_RS", Coding::UNSIGNED5, count_with(&flags, SIGNATURE))?;
    let mut visible = read_metadata(
        reader,
        "field_RVA",
        Metadata::Annotations,
        &flags,
        VISIBLE_ANNOTATIONS,
        calls[0],
    )?;
    let mut invisible = read_metadata(
        reader,
        "field_RIA",
        Metadata::Annotations,
        &flags,
        INVISIBLE_ANNOTATIONS,
        calls[1],
    )?;

    let mut constant_values = constant_values.into_iter();
    let mut signatures = signatures.into_iter();
    let mut fields = Vec::with_capacity(capacity_for(count));
    for (descr, flags) in descrs.into_iter().zip(flags) {
        let mut attributes = vec![];
        if flags & CONSTANT_VALUE != 0 {
            let descriptor = pool.descr_type(descr);
            let kind = ValueKind::of_field_descriptor(&descriptor).ok_or_else(|| {
                Error::format(format!("field of type {} cannot have a constant value", descriptor))
            })?;
            let value = constant_values.next().unwrap_or_default();
            attributes.push(FieldAttribute::ConstantValue(value_ref(
                pool,
                kind,
                "field_ConstantValue_KQ",
                value,
            )?));
        }
        if flags & SIGNATURE != 0 {
            let signature = signatures.next().unwrap_or_default();
            attributes.push(FieldAttribute::Signature(
                pool.signature_id("field_Signature_RS", signature)?,
            ));
        }
        if flags & DEPRECATED != 0 {
            attributes.push(FieldAttribute::Deprecated);
        }
        if flags & VISIBLE_ANNOTATIONS != 0 {
            attributes.push(FieldAttribute::VisibleAnnotations(visible.annotations(pool)?));
        }
        if flags & INVISIBLE_ANNOTATIONS != 0 {
            attributes.push(FieldAttribute::InvisibleAnnotations(invisible.annotations(pool)?));
        }
        fields.push(Field {
            access_flags: FieldAccessFlags::from_bits((flags & ACCESS_MASK) as u16).ok_or_else(
                || Error::format(format!("bad field access flags {:#x}", flags & ACCESS_MASK)),
            )?,
            descr,
            attributes,
        });
    }
    Ok(fields)
}

fn read_methods<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    count: usize,
) -> Result<(Vec<Method>, Vec<u32>), Error> {
    let descrs = read_descrs(reader, pool, "method_descr", Coding::MDELTA5, count)?;
    let flags = read_flags(reader, "method_flags_lo", count, METHOD_ATTRIBUTES, "method")?;
    let calls = read_attr_calls(reader, "method", &flags, &METHOD_METADATA)?;
    let exception_counts = reader.read_counts(
        "method_Exceptions_N",
        Coding::UNSIGNED5,
        count_with(&flags, EXCEPTIONS),
    )?;
    let exceptions = read_classes(
        reader,
        pool,
        "method_Exceptions_RC",
        Coding::UNSIGNED5,
        exception_counts.iter().sum(),
    )?;
    let signatures =
        reader.read_band("method_Signature_RS", Coding::UNSIGNED5, count_with(&flags, SIGNATURE))?;
    let mut visible = read_metadata(
        reader,
        "method_RVA",
        Metadata::Annotations,
        &flags,
        VISIBLE_ANNOTATIONS,
        calls[0],
    )?;
    let mut invisible = read_metadata(
        reader,
        "method_RIA",
        Metadata::Annotations,
        &flags,
        INVISIBLE_ANNOTATIONS,
        calls[1],
    )?;
    let mut visible_parameters = read_metadata(
        reader,
        "method_RVPA",
        Metadata::ParameterAnnotations,
        &flags,
        VISIBLE_PARAMETER_ANNOTATIONS,
        calls[2],
    )?;
    let mut invisible_parameters = read_metadata(
        reader,
        "method_RIPA",
        Metadata::ParameterAnnotations,
        &flags,
        INVISIBLE_PARAMETER_ANNOTATIONS,
        calls[3],
    )?;
    let mut defaults = read_metadata(
        reader,
        "method_AD",
        Metadata::AnnotationDefault,
        &flags,
        ANNOTATION_DEFAULT,
        calls[4],
    )?;

    let mut exception_counts = exception_counts.into_iter();
    let mut exceptions = exceptions.into_iter();
    let mut signatures = signatures.into_iter();
    let mut methods = Vec::with_capacity(capacity_for(count));
    for (descr, flags) in descrs.into_iter().zip(&flags) {
        let mut attributes = vec![];
        if flags & EXCEPTIONS != 0 {
            let count = exception_counts.next().unwrap_or_default();
            attributes.push(MethodAttribute::Exceptions(
                exceptions.by_ref().take(count).collect(),
            ));
        }
        if flags & SIGNATURE != 0 {
            let signature = signatures.next().unwrap_or_default();
            attributes.push(MethodAttribute::Signature(
                pool.signature_id("method_Signature_RS", signature)?,
            ));
        }
        if flags & DEPRECATED != 0 {
            attributes.push(MethodAttribute::Deprecated);
        }
        if flags & VISIBLE_ANNOTATIONS != 0 {
            attributes.push(MethodAttribute::VisibleAnnotations(visible.annotations(pool)?));
        }
        if flags & INVISIBLE_ANNOTATIONS != 0 {
            attributes.push(MethodAttribute::InvisibleAnnotations(invisible.annotations(pool)?));
        }
        if flags & VISIBLE_PARAMETER_ANNOTATIONS != 0 {
            attributes.push(MethodAttribute::VisibleParameterAnnotations(
                visible_parameters.parameter_annotations(pool)?,
            ));
        }
        if flags & INVISIBLE_PARAMETER_ANNOTATIONS != 0 {
            attributes.push(MethodAttribute::InvisibleParameterAnnotations(
                invisible_parameters.parameter_annotations(pool)?,
            ));
        }
        if flags & ANNOTATION_DEFAULT != 0 {
            attributes.push(MethodAttribute::AnnotationDefault(defaults.default_value(pool)?));
        }
        methods.push(Method {
            access_flags: MethodAccessFlags::from_bits((flags & ACCESS_MASK) as u16).ok_or_else(
                || Error::format(format!("bad method access flags {:#x}", flags & ACCESS_MASK)),
            )?,
            descr,
            attributes,
        });
    }
    Ok((methods, flags))
}

fn read_classes<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    name: &str,
    coding: Coding,
    count: usize,
) -> Result<Vec<ClassId>, Error> {
    reader
        .read_band(name, coding, count)?
        .into_iter()
        .map(|value| pool.class_id(name, value))
        .collect()
}

fn read_descrs<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    name: &str,
    coding: Coding,
    count: usize,
) -> Result<Vec<DescrId>, Error> {
    reader
        .read_band(name, coding, count)?
        .into_iter()
        .map(|value| pool.descr_id(name, value))
        .collect()
}

/// Read a band of flags, rejecting attribute bits which are not transmitted here
fn read_flags<R: Read>(
    reader: &mut BandReader<R>,
    name: &str,
    count: usize,
    attributes: u32,
    what: &str,
) -> Result<Vec<u32>, Error> {
    let flags = reader.read_band(name, Coding::UNSIGNED5, count)?;
    flags
        .into_iter()
        .map(|flags| {
            let flags = flags as u32;
            let unknown = flags & !(ACCESS_MASK | attributes);
            if unknown != 0 {
                Err(Error::unsupported(format!(
                    "{} attribute flags {:#x}",
                    what, unknown
                )))
            } else {
                Ok(flags)
            }
        })
        .collect()
}

/// Read the `attr_calls` band of a context, giving the total of each metadata attribute
fn read_attr_calls<R: Read>(
    reader: &mut BandReader<R>,
    context: &str,
    flags: &[u32],
    layouts: &[u32],
) -> Result<Vec<usize>, Error> {
    let counts: Vec<usize> = layouts.iter().map(|bit| count_with(flags, *bit)).collect();
    let calls = reader.read_counts(
        &format!("{}_attr_calls", context),
        Coding::UNSIGNED5,
        counts.iter().sum(),
    )?;
    let mut calls = calls.into_iter();
    Ok(counts
        .iter()
        .map(|count| calls.by_ref().take(*count).sum())
        .collect())
}

fn read_metadata<R: Read>(
    reader: &mut BandReader<R>,
    prefix: &str,
    metadata: Metadata,
    flags: &[u32],
    bit: u32,
    calls: usize,
) -> Result<MetadataReader, Error> {
    metadata_bands::read(reader, prefix, metadata, count_with(flags, bit), calls)
}

fn count_with(flags: &[u32], bit: u32) -> usize {
    flags.iter().filter(|flags| *flags & bit != 0).count()
}

fn version_part(value: i32) -> Result<u16, Error> {
    u16::try_from(value).map_err(|_| Error::format(format!("bad class file version {}", value)))
}

/// Reference to a loadable constant of the given kind
pub fn value_ref(pool: &ConstantPool, kind: ValueKind, band: &str, value: i32) -> Result<CpRef, Error> {
    Ok(match kind {
        ValueKind::Int => CpRef::Int(pool.int_id(band, value)?),
        ValueKind::Float => CpRef::Float(pool.float_id(band, value)?),
        ValueKind::Long => CpRef::Long(pool.long_id(band, value)?),
        ValueKind::Double => CpRef::Double(pool.double_id(band, value)?),
        ValueKind::String => CpRef::String(pool.string_id(band, value)?),
    })
}

/// Position of a reference within its pool category
pub fn ref_index(reference: CpRef) -> usize {
    match reference {
        CpRef::Int(id) => id.index(),
        CpRef::Float(id) => id.index(),
        CpRef::Long(id) => id.index(),
        CpRef::Double(id) => id.index(),
        CpRef::String(id) => id.index(),
        CpRef::Class(id) => id.index(),
        CpRef::Field(id) => id.index(),
        CpRef::Method(id) => id.index(),
        CpRef::IMethod(id) => id.index(),
    }
}

pub fn write(
    writer: &mut BandWriter,
    pool: &ConstantPool,
    classes: &[Class],
    default_version: Version,
    global_inner_classes: &[InnerClass],
) -> Result<(), Error> {
    let mut this_classes = vec![];
    let mut super_classes = vec![];
    let mut interface_counts = vec![];
    let mut interfaces = vec![];
    let mut field_counts = vec![];
    let mut method_counts = vec![];
    for class in classes {
        this_classes.push(class.this_class.index());
        super_classes.push(class.super_class.unwrap_or(class.this_class).index());
        interface_counts.push(class.interfaces.len());
        interfaces.extend(class.interfaces.iter().map(|class| class.index()));
        field_counts.push(class.fields.len());
        method_counts.push(class.methods.len());
    }
    writer.write_indices("class_this", Coding::DELTA5, &this_classes)?;
    writer.write_indices("class_super", Coding::DELTA5, &super_classes)?;
    writer.write_indices("class_interface_count", Coding::DELTA5, &interface_counts)?;
    writer.write_indices("class_interface", Coding::DELTA5, &interfaces)?;
    writer.write_indices("class_field_count", Coding::DELTA5, &field_counts)?;
    writer.write_indices("class_method_count", Coding::DELTA5, &method_counts)?;

    write_fields(writer, classes.iter().flat_map(|class| &class.fields))?;
    write_methods(writer, classes.iter().flat_map(|class| &class.methods))?;

    let mut flags = vec![];
    let mut source_files = vec![];
    let mut enclosing_classes = vec![];
    let mut enclosing_methods = vec![];
    let mut signatures = vec![];
    let mut visible = MetadataWriter::new();
    let mut invisible = MetadataWriter::new();
    let mut inner_class_counts = vec![];
    let mut tuple_inners = vec![];
    let mut tuple_flags = vec![];
    let mut tuple_outers = vec![];
    let mut tuple_names = vec![];
    let mut minor_versions = vec![];
    let mut major_versions = vec![];
    for class in classes {
        let mut class_flags = class.access_flags.bits() as u32;
        for attribute in &class.attributes {
            class_flags |= attribute_bit(attribute.rank());
            match attribute {
                ClassAttribute::SourceFile(source_file) => {
                    let predicted = predicted_source_file(class.name(pool));
                    source_files.push(if pool.utf8_str(*source_file) == predicted {
                        0
                    } else {
                        source_file.index() + 1
                    });
                }
                ClassAttribute::EnclosingMethod { class, method } => {
                    enclosing_classes.push(class.index());
                    enclosing_methods.push(optional_index(method.map(DescrId::index)));
                }
                ClassAttribute::Signature(signature) => signatures.push(signature.index()),
                ClassAttribute::Deprecated => (),
                ClassAttribute::VisibleAnnotations(annotations) => visible.annotations(annotations),
                ClassAttribute::InvisibleAnnotations(annotations) => {
                    invisible.annotations(annotations)
                }
            }
        }

        if let Some(local) = &class.inner_classes {
            class_flags |= INNER_CLASSES;
            inner_class_counts.push(local.len());
            for tuple in local {
                tuple_inners.push(tuple.inner.index());
                let global = global_inner_classes
                    .iter()
                    .find(|global| global.inner == tuple.inner);
                if global == Some(tuple) {
                    tuple_flags.push(0);
                } else {
                    tuple_flags.push((tuple.flags.bits() as u32 | LONG_FORM) as i32);
                    tuple_outers.push(optional_index(tuple.outer.map(ClassId::index)));
                    tuple_names.push(optional_index(tuple.name.map(|name| name.index())));
                }
            }
        }

        if class.version != default_version {
            class_flags |= CLASS_FILE_VERSION;
            minor_versions.push(class.version.minor_version as usize);
            major_versions.push(class.version.major_version as usize);
        }
        flags.push(class_flags as i32);
    }

    writer.write_band("class_flags_lo", Coding::UNSIGNED5, &flags)?;
    write_attr_calls(writer, "class", &[&visible, &invisible])?;
    writer.write_indices("class_SourceFile_RUN", Coding::UNSIGNED5, &source_files)?;
    writer.write_indices("class_EnclosingMethod_RC", Coding::UNSIGNED5, &enclosing_classes)?;
    writer.write_indices("class_EnclosingMethod_RDN", Coding::UNSIGNED5, &enclosing_methods)?;
    writer.write_indices("class_Signature_RS", Coding::UNSIGNED5, &signatures)?;
    visible.write(writer, "class_RVA")?;
    invisible.write(writer, "class_RIA")?;
    writer.write_indices("class_InnerClasses_N", Coding::UNSIGNED5, &inner_class_counts)?;
    writer.write_indices("class_InnerClasses_RC", Coding::UNSIGNED5, &tuple_inners)?;
    writer.write_band("class_InnerClasses_F", Coding::UNSIGNED5, &tuple_flags)?;
    writer.write_indices("class_InnerClasses_outer_RCN", Coding::UNSIGNED5, &tuple_outers)?;
    writer.write_indices("class_InnerClasses_name_RUN", Coding::UNSIGNED5, &tuple_names)?;
    writer.write_indices("class_file_version_minor_H", Coding::UNSIGNED5, &minor_versions)?;
    writer.write_indices("class_file_version_major_H", Coding::UNSIGNED5, &major_versions)?;
    Ok(())
}

fn write_fields<'a>(
    writer: &mut BandWriter,
    fields: impl Iterator<Item = &'a Field>,
) -> Result<(), Error> {
    let mut descrs = vec![];
    let mut flags = vec![];
    let mut constant_values = vec![];
    let mut signatures = vec![];
    let mut visible = MetadataWriter::new();
    let mut invisible = MetadataWriter::new();
    for field in fields {
        descrs.push(field.descr.index());
        let mut field_flags = field.access_flags.bits() as u32;
        for attribute in &field.attributes {
            field_flags |= attribute_bit(attribute.rank());
            match attribute {
                FieldAttribute::ConstantValue(value) => constant_values.push(ref_index(*value)),
                FieldAttribute::Signature(signature) => signatures.push(signature.index()),
                FieldAttribute::Deprecated => (),
                FieldAttribute::VisibleAnnotations(annotations) => visible.annotations(annotations),
                FieldAttribute::InvisibleAnnotations(annotations) => {
                    invisible.annotations(annotations)
                }
            }
        }
        flags.push(field_flags as i32);
    }
    writer.write_indices("field_descr", Coding::DELTA5, &descrs)?;
    writer.write_band("field_flags_lo", Coding::UNSIGNED5, &flags)?;
    write_attr_calls(writer, "field", &[&visible, &invisible])?;
    writer.write_indices("field_ConstantValue_KQ", Coding::UNSIGNED5, &constant_values)?;
    writer.write_indices("field_Signature_RS", Coding::UNSIGNED5, &signatures)?;
    visible.write(writer, "field_RVA")?;
    invisible.write(writer, "field_RIA")?;
    Ok(())
}

fn write_methods<'a>(
    writer: &mut BandWriter,
    methods: impl Iterator<Item = &'a Method>,
) -> Result<(), Error> {
    let mut descrs = vec![];
    let mut flags = vec![];
    let mut exception_counts = vec![];
    let mut exceptions = vec![];
    let mut signatures = vec![];
    let mut visible = MetadataWriter::new();
    let mut invisible = MetadataWriter::new();
    let mut visible_parameters = MetadataWriter::new();
    let mut invisible_parameters = MetadataWriter::new();
    let mut defaults = MetadataWriter::new();
    for method in methods {
        descrs.push(method.descr.index());
        let mut method_flags = method.access_flags.bits() as u32;
        for attribute in &method.attributes {
            method_flags |= attribute_bit(attribute.rank());
            match attribute {
                MethodAttribute::Code(_) => (),
                MethodAttribute::Exceptions(classes) => {
                    exception_counts.push(classes.len());
                    exceptions.extend(classes.iter().map(|class| class.index()));
                }
                MethodAttribute::Signature(signature) => signatures.push(signature.index()),
                MethodAttribute::Deprecated => (),
                MethodAttribute::VisibleAnnotations(annotations) => visible.annotations(annotations),
                MethodAttribute::InvisibleAnnotations(annotations) => {
                    invisible.annotations(annotations)
                }
                MethodAttribute::VisibleParameterAnnotations(parameters) => {
                    visible_parameters.parameter_annotations(parameters)
                }
                MethodAttribute::InvisibleParameterAnnotations(parameters) => {
                    invisible_parameters.parameter_annotations(parameters)
                }
                MethodAttribute::AnnotationDefault(value) => defaults.default_value(value),
            }
        }
        flags.push(method_flags as i32);
    }
    writer.write_indices("method_descr", Coding::MDELTA5, &descrs)?;
    writer.write_band("method_flags_lo", Coding::UNSIGNED5, &flags)?;
    write_attr_calls(
        writer,
        "method",
        &[
            &visible,
            &invisible,
            &visible_parameters,
            &invisible_parameters,
            &defaults,
        ],
    )?;
    writer.write_indices("method_Exceptions_N", Coding::UNSIGNED5, &exception_counts)?;
    writer.write_indices("method_Exceptions_RC", Coding::UNSIGNED5, &exceptions)?;
    writer.write_indices("method_Signature_RS", Coding::UNSIGNED5, &signatures)?;
    visible.write(writer, "method_RVA")?;
    invisible.write(writer, "method_RIA")?;
    visible_parameters.write(writer, "method_RVPA")?;
    invisible_parameters.write(writer, "method_RIPA")?;
    defaults.write(writer, "method_AD")?;
    Ok(())
}

/// Write the `attr_calls` band of a context, from its metadata attributes in flag bit order
fn write_attr_calls(
    writer: &mut BandWriter,
    context: &str,
    layouts: &[&MetadataWriter],
) -> Result<(), Error> {
    let calls: Vec<usize> = layouts
        .iter()
        .flat_map(|layout| layout.calls().iter().copied())
        .collect();
    writer.write_indices(&format!("{}_attr_calls", context), Coding::UNSIGNED5, &calls)
}
