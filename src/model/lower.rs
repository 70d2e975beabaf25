use super::{
    lower_annotations, lower_element_value, resolve_inner_classes, Annotation, Class,
    ClassAttribute, Code, CodeAttribute, CpRef, Field, FieldAttribute, InnerClass, Method,
    MethodAttribute,
};
use crate::class_file::{
    self, AnnotationDefault, Annotations, AttributeLike, BytecodeArray, ClassFile, ConstantIndex,
    ConstantValue, ConstantsCollector, ConstantsPool, ConstantsWriter, Deprecated,
    EnclosingMethod, Exceptions, InnerClasses, Instruction, LineNumberTable, LocalVariableTable,
    LocalVariableTypeTable, MemberKind, ParameterAnnotations, PoolKey, Signature, SourceFile, LDC,
};
use crate::cp::{ClassId, ConstantPool};
use crate::errors::Error;
use crate::util::{Offset, OffsetVec};
use std::collections::HashSet;

impl CpRef {
    /// Class file constant this reference turns into
    pub fn pool_key(self, pool: &ConstantPool) -> PoolKey {
        let member = |kind, member: crate::cp::MemberRef| {
            PoolKey::Member(
                kind,
                pool.class_name(member.class).to_owned(),
                pool.descr_name(member.descr).to_owned(),
                pool.descr_type(member.descr),
            )
        };
        match self {
            CpRef::Int(id) => PoolKey::Integer(pool.int_value(id)),
            CpRef::Float(id) => PoolKey::Float(pool.float_bits(id)),
            CpRef::Long(id) => PoolKey::Long(pool.long_value(id)),
            CpRef::Double(id) => PoolKey::Double(pool.double_bits(id)),
            CpRef::String(id) => match pool.unpaired_units(pool.string_utf8(id)) {
                Some(units) => PoolKey::StringUnits(units.to_vec()),
                None => PoolKey::String(pool.string_value(id).to_owned()),
            },
            CpRef::Class(id) => PoolKey::Class(pool.class_name(id).to_owned()),
            CpRef::Field(id) => member(MemberKind::Field, pool.field_entry(id)),
            CpRef::Method(id) => member(MemberKind::Method, pool.method_entry(id)),
            CpRef::IMethod(id) => member(MemberKind::InterfaceMethod, pool.imethod_entry(id)),
        }
    }
}

impl Class {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> &'a str {
        pool.class_name(self.this_class)
    }

    /// Classes named by a `Class` constant of the class file, not counting `InnerClasses`
    pub fn referenced_classes(&self, pool: &ConstantPool) -> Result<HashSet<ClassId>, Error> {
        let mut collector = ConstantsCollector::new();
        self.lower(pool, &[], &mut collector)?;
        Ok(collector
            .class_names()
            .filter_map(|name| pool.find_class(name))
            .collect())
    }

    /// Lower the class into a class file
    ///
    /// This runs twice over the class: once to collect every constant needed (which determines the
    /// implicit `InnerClasses` tuples) and once more against the finished constant pool.
    pub fn to_class_file(
        &self,
        pool: &ConstantPool,
        global_inner_classes: &[InnerClass],
    ) -> Result<ClassFile, Error> {
        let mut collector = ConstantsCollector::new();
        self.lower(pool, &[], &mut collector)?;

        let referenced: HashSet<ClassId> = collector
            .class_names()
            .filter_map(|name| pool.find_class(name))
            .collect();
        let inner_classes = resolve_inner_classes(self, global_inner_classes, &referenced);
        if !inner_classes.is_empty() {
            let _ = lower_inner_classes(&inner_classes, pool, &mut collector)?;
        }

        let mut constants = ConstantsPool::new(collector, self.name(pool))?;
        let mut class_file = self.lower(pool, &inner_classes, &mut constants)?;
        class_file.constants = constants.into_offset_vec();
        Ok(class_file)
    }

    fn lower<W: ConstantsWriter>(
        &self,
        pool: &ConstantPool,
        inner_classes: &[InnerClass],
        writer: &mut W,
    ) -> Result<ClassFile, Error> {
        let this_class = writer.class(self.name(pool))?;
        let super_class = match self.super_class {
            Some(class) => writer.class(pool.class_name(class))?.0,
            None => ConstantIndex::NONE,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|interface| writer.class(pool.class_name(*interface)))
            .collect::<Result<Vec<_>, Error>>()?;
        let fields = self
            .fields
            .iter()
            .map(|field| lower_field(field, pool, writer))
            .collect::<Result<Vec<_>, Error>>()?;
        let methods = self
            .methods
            .iter()
            .map(|method| lower_method(method, pool, writer))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut attributes = vec![];
        for attribute in &self.attributes {
            attributes.push(match attribute {
                ClassAttribute::SourceFile(name) => {
                    let source_file = writer.utf8(pool.utf8_str(*name))?;
                    writer.attribute(&SourceFile { source_file })?
                }
                ClassAttribute::EnclosingMethod { class, method } => {
                    let class = writer.class(pool.class_name(*class))?;
                    let method = match method {
                        Some(descr) => {
                            writer
                                .name_and_type(pool.descr_name(*descr), &pool.descr_type(*descr))?
                                .0
                        }
                        None => ConstantIndex::NONE,
                    };
                    writer.attribute(&EnclosingMethod { class, method })?
                }
                ClassAttribute::Signature(signature) => {
                    lower_signature(pool.signature_string(*signature), writer)?
                }
                ClassAttribute::Deprecated => writer.attribute(&Deprecated)?,
                ClassAttribute::VisibleAnnotations(annotations) => {
                    lower_annotation_attribute::<true, _>(annotations, pool, writer)?
                }
                ClassAttribute::InvisibleAnnotations(annotations) => {
                    lower_annotation_attribute::<false, _>(annotations, pool, writer)?
                }
            });
        }
        if !inner_classes.is_empty() {
            attributes.push(lower_inner_classes(inner_classes, pool, writer)?);
        }

        Ok(ClassFile {
            version: self.version,
            constants: OffsetVec::new_starting_at(Offset(1)),
            access_flags: self.access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

fn lower_inner_classes<W: ConstantsWriter>(
    inner_classes: &[InnerClass],
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<class_file::Attribute, Error> {
    let mut classes = vec![];
    for inner_class in inner_classes {
        let inner = writer.class(pool.class_name(inner_class.inner))?;
        let outer = match inner_class.outer {
            Some(outer) => writer.class(pool.class_name(outer))?.0,
            None => ConstantIndex::NONE,
        };
        let name = match inner_class.name {
            Some(name) => writer.utf8(pool.utf8_str(name))?.0,
            None => ConstantIndex::NONE,
        };
        classes.push(class_file::InnerClass {
            inner_class: inner,
            outer_class: outer,
            inner_name: name,
            access_flags: inner_class.flags,
        });
    }
    writer.attribute(&InnerClasses { classes })
}

fn lower_signature<W: ConstantsWriter>(
    signature: String,
    writer: &mut W,
) -> Result<class_file::Attribute, Error> {
    let signature = writer.utf8(&signature)?;
    writer.attribute(&Signature { signature })
}

fn lower_annotation_attribute<const VISIBLE: bool, W: ConstantsWriter>(
    annotations: &[Annotation],
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<class_file::Attribute, Error>
where
    Annotations<VISIBLE>: AttributeLike,
{
    let annotations = lower_annotations(annotations, pool, writer)?;
    writer.attribute(&Annotations::<VISIBLE>(annotations))
}

fn lower_parameter_annotations<const VISIBLE: bool, W: ConstantsWriter>(
    parameters: &[Vec<Annotation>],
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<class_file::Attribute, Error>
where
    ParameterAnnotations<VISIBLE>: AttributeLike,
{
    let parameters = parameters
        .iter()
        .map(|annotations| lower_annotations(annotations, pool, writer))
        .collect::<Result<_, Error>>()?;
    writer.attribute(&ParameterAnnotations::<VISIBLE>(parameters))
}

fn lower_field<W: ConstantsWriter>(
    field: &Field,
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<class_file::Field, Error> {
    let name_index = writer.utf8(pool.descr_name(field.descr))?;
    let descriptor_index = writer.utf8(&pool.descr_type(field.descr))?;
    let mut attributes = vec![];
    for attribute in &field.attributes {
        attributes.push(match attribute {
            FieldAttribute::ConstantValue(value) => {
                let value = writer.constant_index(value.pool_key(pool))?;
                writer.attribute(&ConstantValue { value })?
            }
            FieldAttribute::Signature(signature) => {
                lower_signature(pool.signature_string(*signature), writer)?
            }
            FieldAttribute::Deprecated => writer.attribute(&Deprecated)?,
            FieldAttribute::VisibleAnnotations(annotations) => {
                lower_annotation_attribute::<true, _>(annotations, pool, writer)?
            }
            FieldAttribute::InvisibleAnnotations(annotations) => {
                lower_annotation_attribute::<false, _>(annotations, pool, writer)?
            }
        });
    }
    Ok(class_file::Field {
        access_flags: field.access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn lower_method<W: ConstantsWriter>(
    method: &Method,
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<class_file::Method, Error> {
    let name_index = writer.utf8(pool.descr_name(method.descr))?;
    let descriptor_index = writer.utf8(&pool.descr_type(method.descr))?;
    let mut attributes = vec![];
    for attribute in &method.attributes {
        attributes.push(match attribute {
            MethodAttribute::Code(code) => {
                let code = lower_code(code, pool, writer)?;
                writer.attribute(&code)?
            }
            MethodAttribute::Exceptions(exceptions) => {
                let exceptions = exceptions
                    .iter()
                    .map(|class| writer.class(pool.class_name(*class)))
                    .collect::<Result<_, Error>>()?;
                writer.attribute(&Exceptions { exceptions })?
            }
            MethodAttribute::Signature(signature) => {
                lower_signature(pool.signature_string(*signature), writer)?
            }
            MethodAttribute::Deprecated => writer.attribute(&Deprecated)?,
            MethodAttribute::VisibleAnnotations(annotations) => {
                lower_annotation_attribute::<true, _>(annotations, pool, writer)?
            }
            MethodAttribute::InvisibleAnnotations(annotations) => {
                lower_annotation_attribute::<false, _>(annotations, pool, writer)?
            }
            MethodAttribute::VisibleParameterAnnotations(parameters) => {
                lower_parameter_annotations::<true, _>(parameters, pool, writer)?
            }
            MethodAttribute::InvisibleParameterAnnotations(parameters) => {
                lower_parameter_annotations::<false, _>(parameters, pool, writer)?
            }
            MethodAttribute::AnnotationDefault(value) => {
                let value = lower_element_value(value, pool, writer)?;
                writer.attribute(&AnnotationDefault(value))?
            }
        });
    }
    Ok(class_file::Method {
        access_flags: method.access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn lower_code<W: ConstantsWriter>(
    code: &Code,
    pool: &ConstantPool,
    writer: &mut W,
) -> Result<class_file::Code, Error> {
    let mut instructions = Vec::with_capacity(code.instructions.len());
    for instruction in &code.instructions {
        let narrow = matches!(instruction, Instruction::Ldc { opcode: LDC, .. });
        let lowered = instruction.clone().try_map(
            |_, constant: CpRef| {
                let key = constant.pool_key(pool);
                if narrow {
                    writer
                        .narrow_constant_index(key)
                        .map(|index| ConstantIndex(index as u16))
                } else {
                    writer.constant_index(key)
                }
            },
            Ok,
        )?;
        instructions.push(lowered);
    }

    // Lay out the bytecode first: every other position is renumbered against it
    let (bytes, bci_map) = class_file::write_code(&instructions)?;
    if bytes.len() > u16::MAX as usize {
        return Err(Error::format(format!(
            "method body of {} bytes is too long",
            bytes.len()
        )));
    }
    let offset = |index: usize| -> Result<u16, Error> { Ok(bci_map.offset(index)? as u16) };

    let mut exception_table = vec![];
    for handler in &code.handlers {
        exception_table.push(class_file::ExceptionHandler {
            start_pc: offset(handler.start)?,
            end_pc: offset(handler.end)?,
            handler_pc: offset(handler.handler)?,
            catch_type: match handler.catch_type {
                Some(class) => writer.class(pool.class_name(class))?.0,
                None => ConstantIndex::NONE,
            },
        });
    }

    let mut attributes = vec![];
    for attribute in &code.attributes {
        attributes.push(match attribute {
            CodeAttribute::StackMapTable(table) => {
                let table = table
                    .clone()
                    .renumber(&bci_map)?
                    .try_map(|class| writer.class(pool.class_name(class)), Ok)?;
                writer.attribute(&table)?
            }
            CodeAttribute::LineNumberTable(lines) => {
                let lines = lines
                    .iter()
                    .map(|line| {
                        Ok(class_file::LineNumber {
                            start_pc: offset(line.start)?,
                            line_number: line.line,
                        })
                    })
                    .collect::<Result<_, Error>>()?;
                writer.attribute(&LineNumberTable { lines })?
            }
            CodeAttribute::LocalVariableTable(variables) => {
                let variables = lower_variables(variables, pool, &offset, writer)?;
                writer.attribute(&LocalVariableTable { variables })?
            }
            CodeAttribute::LocalVariableTypeTable(variables) => {
                let variables = lower_variables(variables, pool, &offset, writer)?;
                writer.attribute(&LocalVariableTypeTable { variables })?
            }
        });
    }

    Ok(class_file::Code {
        max_stack: code.max_stack,
        max_locals: code.max_locals,
        code_array: BytecodeArray(bytes),
        exception_table,
        attributes,
    })
}

fn lower_variables<W: ConstantsWriter>(
    variables: &[super::LocalVariable],
    pool: &ConstantPool,
    offset: &impl Fn(usize) -> Result<u16, Error>,
    writer: &mut W,
) -> Result<Vec<class_file::LocalVariable>, Error> {
    variables
        .iter()
        .map(|variable| {
            let start_pc = offset(variable.start)?;
            let length = offset(variable.end)?
                .checked_sub(start_pc)
                .ok_or_else(|| Error::format("local variable range ends before it starts"))?;
            Ok(class_file::LocalVariable {
                start_pc,
                length,
                name: writer.utf8(pool.utf8_str(variable.name))?,
                descriptor: writer.utf8(&pool.signature_string(variable.signature))?,
                index: variable.slot,
            })
        })
        .collect()
}
