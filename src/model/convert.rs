use super::{
    convert_annotations, convert_element_value, Annotation, Class, ClassAttribute, Code,
    CodeAttribute, CpRef, ExceptionHandler, Field, FieldAttribute, InnerClass, LineNumber,
    LocalVariable, Method, MethodAttribute, ValueKind,
};
use crate::class_file::{
    self, parse_code, AnnotationDefault, Annotations, Attribute, AttributeLike, BciMap,
    ClassConstantIndex, ClassFile, Constant, ConstantIndex, ConstantValue, ConstantsReader,
    Deprecated, EnclosingMethod, Exceptions, InnerClasses, Instruction, LineNumberTable,
    LocalVariableTable, LocalVariableTypeTable, MemberKind, MethodAccessFlags,
    ParameterAnnotations, Parse, RefKind, RuntimeInvisibleAnnotations,
    RuntimeInvisibleParameterAnnotations, RuntimeVisibleAnnotations,
    RuntimeVisibleParameterAnnotations, Signature, SourceFile, StackMapTable, LDC, LDC2_W, LDC_W,
};
use crate::cp::{argument_slots, ConstantPool};
use crate::errors::Error;
use crate::settings::{PackSettings, UnknownAttributeAction};
use crate::util::OffsetVec;

/// Class converted into the segment model, along with the `InnerClasses` tuples it declared
#[derive(Debug)]
pub struct ConvertedClass {
    pub class: Class,
    pub declared_inner_classes: Option<Vec<InnerClass>>,
}

/// Parse a class file and intern everything it refers to into the segment pool
///
/// Errors for which `Error::is_passable` holds mean the class should be transmitted as a plain
/// file instead.
pub fn convert_class(
    bytes: &[u8],
    pool: &mut ConstantPool,
    settings: &PackSettings,
) -> Result<ConvertedClass, Error> {
    let class_file = ClassFile::from_bytes(bytes)?;
    let constants = &class_file.constants;
    let class_name = constants.class_name(class_file.this_class)?.to_owned();
    check_constants(constants)?;

    let mut converter = Converter {
        constants,
        pool,
        settings,
        class_name: &class_name,
    };
    converter.convert(&class_file)
}

/// Reject constant kinds which pack200 cannot transmit, before anything gets interned
fn check_constants(constants: &OffsetVec<Constant>) -> Result<(), Error> {
    for (_, _, constant) in constants {
        match constant {
            Constant::MethodHandle { .. } => return Err(Error::unsupported("method handle constant")),
            Constant::MethodType { .. } => return Err(Error::unsupported("method type constant")),
            Constant::Dynamic { .. } => return Err(Error::unsupported("dynamic constant")),
            Constant::ModuleOrPackage { .. } => {
                return Err(Error::unsupported("module or package constant"))
            }
            _ => (),
        }
    }
    Ok(())
}

struct Converter<'a> {
    constants: &'a OffsetVec<Constant>,
    pool: &'a mut ConstantPool,
    settings: &'a PackSettings,
    class_name: &'a str,
}

const STACK_MAP_TABLE: &str = StackMapTable::<ClassConstantIndex, u16>::NAME;
const VISIBLE_ANNOTATIONS: &str = RuntimeVisibleAnnotations::NAME;
const INVISIBLE_ANNOTATIONS: &str = RuntimeInvisibleAnnotations::NAME;
const VISIBLE_PARAMETER_ANNOTATIONS: &str = RuntimeVisibleParameterAnnotations::NAME;
const INVISIBLE_PARAMETER_ANNOTATIONS: &str = RuntimeInvisibleParameterAnnotations::NAME;

/// Whether the attribute is one dropped by `strip_debug`
fn is_debug_attribute(name: &str) -> bool {
    matches!(
        name,
        SourceFile::NAME
            | LineNumberTable::NAME
            | LocalVariableTable::NAME
            | LocalVariableTypeTable::NAME
    )
}

fn parse_attribute<A: AttributeLike>(attribute: &Attribute) -> Result<A, Error> {
    A::parse_exact(&attribute.info)
        .map_err(|err| Error::class_file(format!("malformed {} attribute: {}", A::NAME, err)))
}

impl<'a> Converter<'a> {
    fn convert(&mut self, class_file: &ClassFile) -> Result<ConvertedClass, Error> {
        let constants = self.constants;
        let this_class = self.pool.class(self.class_name);
        let super_class = match constants.optional_class_name(class_file.super_class)? {
            Some(name) => Some(self.pool.class(name)),
            None => None,
        };
        let mut interfaces = vec![];
        for interface in &class_file.interfaces {
            interfaces.push(self.class(*interface)?);
        }

        let mut fields = vec![];
        for field in &class_file.fields {
            fields.push(self.convert_field(field)?);
        }
        let mut methods = vec![];
        for method in &class_file.methods {
            methods.push(self.convert_method(method)?);
        }

        let mut attributes = vec![];
        let mut declared_inner_classes = None;
        for attribute in &class_file.attributes {
            let name = match self.attribute_name(attribute)? {
                Some(name) => name,
                None => continue,
            };
            attributes.push(match name {
                SourceFile::NAME => {
                    let SourceFile { source_file } = parse_attribute(attribute)?;
                    ClassAttribute::SourceFile(self.pool.utf8(constants.utf8(source_file)?))
                }
                EnclosingMethod::NAME => {
                    let EnclosingMethod { class, method } = parse_attribute(attribute)?;
                    let class = self.class(class)?;
                    let method = if method.is_none() {
                        None
                    } else {
                        let (name, descriptor) = constants
                            .name_and_type(class_file::NameAndTypeConstantIndex(method))?;
                        Some(self.pool.descr(name, descriptor))
                    };
                    ClassAttribute::EnclosingMethod { class, method }
                }
                Signature::NAME => ClassAttribute::Signature(self.signature(attribute)?),
                Deprecated::NAME => {
                    let Deprecated = parse_attribute(attribute)?;
                    ClassAttribute::Deprecated
                }
                VISIBLE_ANNOTATIONS => {
                    ClassAttribute::VisibleAnnotations(self.annotations::<true>(attribute)?)
                }
                INVISIBLE_ANNOTATIONS => {
                    ClassAttribute::InvisibleAnnotations(self.annotations::<false>(attribute)?)
                }
                InnerClasses::NAME => {
                    if declared_inner_classes.is_some() {
                        return Err(Error::unsupported("repeated InnerClasses attribute"));
                    }
                    let InnerClasses { classes } = parse_attribute(attribute)?;
                    let mut tuples = vec![];
                    for inner_class in classes {
                        tuples.push(self.inner_class(&inner_class)?);
                    }
                    declared_inner_classes = Some(tuples);
                    continue;
                }
                other => return Err(self.unknown_attribute(other)),
            });
        }
        check_unique(&mut attributes, ClassAttribute::rank)?;

        Ok(ConvertedClass {
            class: Class {
                version: class_file.version,
                access_flags: class_file.access_flags,
                this_class,
                super_class,
                interfaces,
                fields,
                methods,
                attributes,
                inner_classes: None,
            },
            declared_inner_classes,
        })
    }

    /// Name of an attribute which should be converted, or `None` if it is stripped
    fn attribute_name(&self, attribute: &Attribute) -> Result<Option<&'a str>, Error> {
        let constants = self.constants;
        let name = constants.utf8(attribute.name_index)?;
        if self.settings.strip_debug && is_debug_attribute(name) {
            log::trace!("Stripping {} from {}", name, self.class_name);
            return Ok(None);
        }
        let known = matches!(
            name,
            SourceFile::NAME
                | EnclosingMethod::NAME
                | Signature::NAME
                | Deprecated::NAME
                | InnerClasses::NAME
                | ConstantValue::NAME
                | class_file::Code::NAME
                | Exceptions::NAME
                | STACK_MAP_TABLE
                | LineNumberTable::NAME
                | LocalVariableTable::NAME
                | LocalVariableTypeTable::NAME
                | VISIBLE_ANNOTATIONS
                | INVISIBLE_ANNOTATIONS
                | VISIBLE_PARAMETER_ANNOTATIONS
                | INVISIBLE_PARAMETER_ANNOTATIONS
                | AnnotationDefault::NAME
        );
        if !known && self.settings.unknown_attribute == UnknownAttributeAction::Strip {
            log::debug!("Stripping unknown attribute {} from {}", name, self.class_name);
            return Ok(None);
        }
        Ok(Some(name))
    }

    fn unknown_attribute(&self, name: &str) -> Error {
        Error::UnknownAttribute {
            class: self.class_name.to_owned(),
            attribute: name.to_owned(),
        }
    }

    fn class(&mut self, index: ClassConstantIndex) -> Result<crate::cp::ClassId, Error> {
        let constants = self.constants;
        let name = constants.class_name(index)?;
        Ok(self.pool.class(name))
    }

    fn signature(&mut self, attribute: &Attribute) -> Result<crate::cp::SignatureId, Error> {
        let constants = self.constants;
        let Signature { signature } = parse_attribute(attribute)?;
        Ok(self.pool.signature(constants.utf8(signature)?))
    }

    fn annotations<const VISIBLE: bool>(
        &mut self,
        attribute: &Attribute,
    ) -> Result<Vec<Annotation>, Error>
    where
        Annotations<VISIBLE>: AttributeLike,
    {
        let Annotations(annotations) = parse_attribute::<Annotations<VISIBLE>>(attribute)?;
        convert_annotations(&annotations, self.constants, self.pool)
    }

    fn parameter_annotations<const VISIBLE: bool>(
        &mut self,
        attribute: &Attribute,
    ) -> Result<Vec<Vec<Annotation>>, Error>
    where
        ParameterAnnotations<VISIBLE>: AttributeLike,
    {
        let ParameterAnnotations(parameters) =
            parse_attribute::<ParameterAnnotations<VISIBLE>>(attribute)?;
        parameters
            .iter()
            .map(|annotations| convert_annotations(annotations, self.constants, self.pool))
            .collect()
    }

    fn inner_class(&mut self, inner_class: &class_file::InnerClass) -> Result<InnerClass, Error> {
        let constants = self.constants;
        let inner = self.class(inner_class.inner_class)?;
        let outer = match constants.optional_class_name(inner_class.outer_class)? {
            Some(name) => Some(self.pool.class(name)),
            None => None,
        };
        let name = match constants.optional_utf8(inner_class.inner_name)? {
            Some(name) => Some(self.pool.utf8(name)),
            None => None,
        };
        Ok(InnerClass {
            inner,
            outer,
            name,
            flags: inner_class.access_flags,
        })
    }

    fn convert_field(&mut self, field: &class_file::Field) -> Result<Field, Error> {
        let constants = self.constants;
        let name = constants.utf8(field.name_index)?;
        let descriptor = constants.utf8(field.descriptor_index)?;
        let descr = self.pool.descr(name, descriptor);

        let mut attributes = vec![];
        for attribute in &field.attributes {
            let attribute_name = match self.attribute_name(attribute)? {
                Some(name) => name,
                None => continue,
            };
            attributes.push(match attribute_name {
                ConstantValue::NAME => {
                    let ConstantValue { value } = parse_attribute(attribute)?;
                    let value = self.loadable(value)?;
                    if value.value_kind() != ValueKind::of_field_descriptor(descriptor) {
                        return Err(Error::unsupported(format!(
                            "ConstantValue {:?} on field {} of type {}",
                            value, name, descriptor
                        )));
                    }
                    FieldAttribute::ConstantValue(value)
                }
                Signature::NAME => FieldAttribute::Signature(self.signature(attribute)?),
                Deprecated::NAME => {
                    let Deprecated = parse_attribute(attribute)?;
                    FieldAttribute::Deprecated
                }
                VISIBLE_ANNOTATIONS => {
                    FieldAttribute::VisibleAnnotations(self.annotations::<true>(attribute)?)
                }
                INVISIBLE_ANNOTATIONS => {
                    FieldAttribute::InvisibleAnnotations(self.annotations::<false>(attribute)?)
                }
                other => return Err(self.unknown_attribute(other)),
            });
        }
        check_unique(&mut attributes, FieldAttribute::rank)?;

        Ok(Field {
            access_flags: field.access_flags,
            descr,
            attributes,
        })
    }

    fn convert_method(&mut self, method: &class_file::Method) -> Result<Method, Error> {
        let constants = self.constants;
        let name = constants.utf8(method.name_index)?;
        let descriptor = constants.utf8(method.descriptor_index)?;
        let mut slots = class_file_slots(descriptor)?;
        if !method.access_flags.contains(MethodAccessFlags::STATIC) {
            slots += 1;
        }
        let descr = self.pool.descr(name, descriptor);

        let mut attributes = vec![];
        for attribute in &method.attributes {
            let attribute_name = match self.attribute_name(attribute)? {
                Some(name) => name,
                None => continue,
            };
            attributes.push(match attribute_name {
                class_file::Code::NAME => {
                    let code: class_file::Code = parse_attribute(attribute)?;
                    if (code.max_locals as usize) < slots {
                        return Err(Error::unsupported(format!(
                            "method {}{} has fewer locals than arguments",
                            name, descriptor
                        )));
                    }
                    MethodAttribute::Code(self.convert_code(&code)?)
                }
                Exceptions::NAME => {
                    let Exceptions { exceptions } = parse_attribute(attribute)?;
                    let mut classes = vec![];
                    for exception in exceptions {
                        classes.push(self.class(exception)?);
                    }
                    MethodAttribute::Exceptions(classes)
                }
                Signature::NAME => MethodAttribute::Signature(self.signature(attribute)?),
                Deprecated::NAME => {
                    let Deprecated = parse_attribute(attribute)?;
                    MethodAttribute::Deprecated
                }
                VISIBLE_ANNOTATIONS => {
                    MethodAttribute::VisibleAnnotations(self.annotations::<true>(attribute)?)
                }
                INVISIBLE_ANNOTATIONS => {
                    MethodAttribute::InvisibleAnnotations(self.annotations::<false>(attribute)?)
                }
                VISIBLE_PARAMETER_ANNOTATIONS => MethodAttribute::VisibleParameterAnnotations(
                    self.parameter_annotations::<true>(attribute)?,
                ),
                INVISIBLE_PARAMETER_ANNOTATIONS => MethodAttribute::InvisibleParameterAnnotations(
                    self.parameter_annotations::<false>(attribute)?,
                ),
                AnnotationDefault::NAME => {
                    let AnnotationDefault(value) = parse_attribute(attribute)?;
                    MethodAttribute::AnnotationDefault(convert_element_value(
                        &value,
                        self.constants,
                        self.pool,
                    )?)
                }
                other => return Err(self.unknown_attribute(other)),
            });
        }
        check_unique(&mut attributes, MethodAttribute::rank)?;

        Ok(Method {
            access_flags: method.access_flags,
            descr,
            attributes,
        })
    }

    /// Constant loaded by `ldc` (or used as a `ConstantValue`)
    fn loadable(&mut self, index: ConstantIndex) -> Result<CpRef, Error> {
        let constants = self.constants;
        Ok(match constants.constant(index)? {
            Constant::Integer(value) => CpRef::Int(self.pool.int(*value)),
            Constant::Float(bits) => CpRef::Float(self.pool.float(*bits)),
            Constant::Long(value) => CpRef::Long(self.pool.long(*value)),
            Constant::Double(bits) => CpRef::Double(self.pool.double(*bits)),
            Constant::String(utf8) => {
                CpRef::String(self.pool.string_utf16(&constants.utf8_units(*utf8)?))
            }
            Constant::Class(name) => CpRef::Class(self.pool.class(constants.utf8(*name)?)),
            other => {
                return Err(Error::class_file(format!(
                    "constant {:?} at index {} cannot be loaded",
                    other, index.0
                )))
            }
        })
    }

    fn reference(&mut self, kind: RefKind, index: ConstantIndex) -> Result<CpRef, Error> {
        let constants = self.constants;
        let member = match kind {
            RefKind::Constant => return self.loadable(index),
            RefKind::Class => return Ok(CpRef::Class(self.class(ClassConstantIndex(index))?)),
            RefKind::Field | RefKind::Method | RefKind::InterfaceMethod => {
                constants.member(index)?
            }
        };
        Ok(match (kind, member.kind) {
            (RefKind::Field, MemberKind::Field) => {
                CpRef::Field(self.pool.field(member.class, member.name, member.descriptor))
            }
            (RefKind::Method, MemberKind::Method) => {
                CpRef::Method(self.pool.method(member.class, member.name, member.descriptor))
            }
            (RefKind::InterfaceMethod, MemberKind::InterfaceMethod) => {
                CpRef::IMethod(self.pool.imethod(member.class, member.name, member.descriptor))
            }
            (RefKind::Method, MemberKind::InterfaceMethod) => {
                return Err(Error::unsupported(format!(
                    "interface method {}.{} called without invokeinterface",
                    member.class, member.name
                )))
            }
            _ => {
                return Err(Error::class_file(format!(
                    "instruction expects a {:?} but constant {} is a {:?}",
                    kind, index.0, member.kind
                )))
            }
        })
    }

    fn convert_code(&mut self, code: &class_file::Code) -> Result<Code, Error> {
        let constants = self.constants;
        let (parsed, bci_map) = parse_code(&code.code_array.0)?;

        let mut instructions = Vec::with_capacity(parsed.len());
        for instruction in parsed {
            let instruction = instruction.try_map(|kind, index| self.reference(kind, index), Ok)?;
            check_instruction(&instruction, &*self.pool)?;
            instructions.push(instruction);
        }

        let index = |offset: u16, what: &str| -> Result<usize, Error> {
            bci_map.index(offset as usize).ok_or_else(|| {
                Error::class_file(format!("{} at offset {} is not an instruction", what, offset))
            })
        };

        let mut handlers = vec![];
        for handler in &code.exception_table {
            let catch_type = match constants.optional_class_name(handler.catch_type)? {
                Some(name) => Some(self.pool.class(name)),
                None => None,
            };
            handlers.push(ExceptionHandler {
                start: index(handler.start_pc, "exception range start")?,
                end: index(handler.end_pc, "exception range end")?,
                handler: index(handler.handler_pc, "exception handler")?,
                catch_type,
            });
        }

        let mut attributes = vec![];
        for attribute in &code.attributes {
            let name = match self.attribute_name(attribute)? {
                Some(name) => name,
                None => continue,
            };
            attributes.push(match name {
                STACK_MAP_TABLE => {
                    let table: StackMapTable<ClassConstantIndex, u16> = parse_attribute(attribute)?;
                    let pool = &mut *self.pool;
                    let table = table.index(&bci_map)?.try_map(
                        |class| Ok(pool.class(constants.class_name(class)?)),
                        Ok::<usize, Error>,
                    )?;
                    CodeAttribute::StackMapTable(table)
                }
                LineNumberTable::NAME => {
                    let LineNumberTable { lines } = parse_attribute(attribute)?;
                    let mut converted = vec![];
                    for line in lines {
                        converted.push(LineNumber {
                            start: index(line.start_pc, "line number")?,
                            line: line.line_number,
                        });
                    }
                    CodeAttribute::LineNumberTable(converted)
                }
                LocalVariableTable::NAME => {
                    let LocalVariableTable { variables } = parse_attribute(attribute)?;
                    CodeAttribute::LocalVariableTable(self.variables(&variables, &bci_map)?)
                }
                LocalVariableTypeTable::NAME => {
                    let LocalVariableTypeTable { variables } = parse_attribute(attribute)?;
                    CodeAttribute::LocalVariableTypeTable(self.variables(&variables, &bci_map)?)
                }
                other => return Err(self.unknown_attribute(other)),
            });
        }
        check_unique(&mut attributes, CodeAttribute::rank)?;

        Ok(Code {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            instructions,
            handlers,
            attributes,
        })
    }

    fn variables(
        &mut self,
        variables: &[class_file::LocalVariable],
        bci_map: &BciMap,
    ) -> Result<Vec<LocalVariable>, Error> {
        let constants = self.constants;
        let mut converted = vec![];
        for variable in variables {
            let end_pc = variable.start_pc as usize + variable.length as usize;
            let (start, end) = match (bci_map.index(variable.start_pc as usize), bci_map.index(end_pc)) {
                (Some(start), Some(end)) => (start, end),
                _ => {
                    return Err(Error::class_file(format!(
                        "local variable range {}..{} does not line up with instructions",
                        variable.start_pc, end_pc
                    )))
                }
            };
            converted.push(LocalVariable {
                start,
                end,
                name: self.pool.utf8(constants.utf8(variable.name)?),
                signature: self.pool.signature(constants.utf8(variable.descriptor)?),
                slot: variable.index,
            });
        }
        Ok(converted)
    }
}

/// Argument slots of a descriptor found in a class file, which is the class file's fault if bad
fn class_file_slots(descriptor: &str) -> Result<usize, Error> {
    argument_slots(descriptor)
        .map_err(|_| Error::class_file(format!("malformed method descriptor '{}'", descriptor)))
}

/// Check the parts of an instruction that the bytecode bands do not transmit
fn check_instruction(instruction: &Instruction<CpRef, usize>, pool: &ConstantPool) -> Result<(), Error> {
    match instruction {
        Instruction::Ldc { opcode, constant } => {
            let wide_constant = matches!(constant, CpRef::Long(_) | CpRef::Double(_));
            if (*opcode == LDC2_W) != wide_constant || !matches!(*opcode, LDC | LDC_W | LDC2_W) {
                return Err(Error::class_file(format!(
                    "ldc opcode {} cannot load {:?}",
                    opcode, constant
                )));
            }
        }
        Instruction::InvokeInterface {
            method: CpRef::IMethod(method),
            count,
        } => {
            let descriptor = pool.descr_type(pool.imethod_entry(*method).descr);
            let expected = class_file_slots(&descriptor)? + 1;
            if *count as usize != expected {
                return Err(Error::unsupported(format!(
                    "invokeinterface count {} where {} was expected",
                    count, expected
                )));
            }
        }
        _ => (),
    }
    Ok(())
}

/// Sort attributes into their canonical order, rejecting repeats
fn check_unique<A>(attributes: &mut [A], rank: impl Fn(&A) -> u8) -> Result<(), Error> {
    attributes.sort_by_key(|attribute| rank(attribute));
    if attributes
        .windows(2)
        .any(|pair| rank(&pair[0]) == rank(&pair[1]))
    {
        return Err(Error::unsupported("repeated attribute"));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::class_file::{
        ClassAccessFlags, FieldAccessFlags, Utf8ConstantIndex, Version, ALOAD_0, INVOKESPECIAL,
    };
    use crate::util::Offset;

    /// `pkg/Hello` with a constructor, a static method returning a string, and a constant field
    fn hello_class(pool: &mut ConstantPool) -> Class {
        let object_init = pool.method("java/lang/Object", "<init>", "()V");
        let greeting = pool.string("hello");
        let source_file = pool.utf8("Hello.java");
        let count = pool.int(3);

        let init = Method {
            access_flags: MethodAccessFlags::PUBLIC,
            descr: pool.descr("<init>", "()V"),
            attributes: vec![MethodAttribute::Code(Code {
                max_stack: 1,
                max_locals: 1,
                instructions: vec![
                    Instruction::Plain(ALOAD_0),
                    Instruction::Invoke {
                        opcode: INVOKESPECIAL,
                        method: CpRef::Method(object_init),
                    },
                    Instruction::Plain(177),
                ],
                handlers: vec![],
                attributes: vec![CodeAttribute::LineNumberTable(vec![LineNumber {
                    start: 0,
                    line: 1,
                }])],
            })],
        };
        let greet = Method {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            descr: pool.descr("greet", "(I)Ljava/lang/String;"),
            attributes: vec![MethodAttribute::Code(Code {
                max_stack: 1,
                max_locals: 1,
                instructions: vec![
                    Instruction::Ldc {
                        opcode: LDC,
                        constant: CpRef::String(greeting),
                    },
                    Instruction::Plain(176),
                ],
                handlers: vec![],
                attributes: vec![CodeAttribute::LocalVariableTable(vec![LocalVariable {
                    start: 0,
                    end: 2,
                    name: pool.utf8("times"),
                    signature: pool.signature("I"),
                    slot: 0,
                }])],
            })],
        };

        Class {
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class: pool.class("pkg/Hello"),
            super_class: Some(pool.class("java/lang/Object")),
            interfaces: vec![],
            fields: vec![Field {
                access_flags: FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
                descr: pool.descr("COUNT", "I"),
                attributes: vec![FieldAttribute::ConstantValue(CpRef::Int(count))],
            }],
            methods: vec![init, greet],
            attributes: vec![ClassAttribute::SourceFile(source_file)],
            inner_classes: None,
        }
    }

    fn hello_class_file() -> ClassFile {
        let mut pool = ConstantPool::new();
        hello_class(&mut pool).to_class_file(&pool, &[]).unwrap()
    }

    fn push_utf8(class_file: &mut ClassFile, string: &str) -> Utf8ConstantIndex {
        let Offset(offset) = class_file.constants.push(Constant::Utf8(string.to_owned()));
        Utf8ConstantIndex(ConstantIndex(offset as u16))
    }

    #[test]
    fn conversion_is_idempotent() {
        let bytes = hello_class_file().to_bytes().unwrap();

        let mut pool = ConstantPool::new();
        let converted = convert_class(&bytes, &mut pool, &PackSettings::default()).unwrap();
        assert_eq!(converted.declared_inner_classes, None);
        assert_eq!(converted.class.name(&pool), "pkg/Hello");
        assert_eq!(converted.class.methods.len(), 2);

        let lowered = converted.class.to_class_file(&pool, &[]).unwrap();
        assert_eq!(lowered.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn stripping_debug_attributes() {
        let bytes = hello_class_file().to_bytes().unwrap();
        let settings = PackSettings {
            strip_debug: true,
            ..PackSettings::default()
        };

        let mut pool = ConstantPool::new();
        let class = convert_class(&bytes, &mut pool, &settings).unwrap().class;
        assert!(class.attributes.is_empty());
        for method in &class.methods {
            assert!(method.code().unwrap().attributes.is_empty());
        }
        assert_eq!(class.fields[0].attributes.len(), 1);
    }

    #[test]
    fn unknown_attributes() {
        let mut class_file = hello_class_file();
        let name_index = push_utf8(&mut class_file, "Custom");
        class_file.attributes.push(Attribute {
            name_index,
            info: vec![1, 2, 3],
        });
        let bytes = class_file.to_bytes().unwrap();

        let mut pool = ConstantPool::new();
        match convert_class(&bytes, &mut pool, &PackSettings::default()) {
            Err(Error::UnknownAttribute { class, attribute }) => {
                assert_eq!(class, "pkg/Hello");
                assert_eq!(attribute, "Custom");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }

        let settings = PackSettings {
            unknown_attribute: UnknownAttributeAction::Strip,
            ..PackSettings::default()
        };
        let class = convert_class(&bytes, &mut pool, &settings).unwrap().class;
        assert_eq!(class.attributes.len(), 1);
    }

    #[test]
    fn unsupported_constructs() {
        // Method handles have no band to travel in
        let mut class_file = hello_class_file();
        let _ = class_file.constants.push(Constant::MethodHandle {
            kind: 6,
            member: ConstantIndex(1),
        });
        let bytes = class_file.to_bytes().unwrap();
        let error = convert_class(&bytes, &mut ConstantPool::new(), &PackSettings::default())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(error, Error::Unsupported(_)));
        assert!(error.is_passable());

        // Repeated attributes cannot be reproduced either
        let mut class_file = hello_class_file();
        let deprecated = push_utf8(&mut class_file, Deprecated::NAME);
        for _ in 0..2 {
            class_file.attributes.push(Attribute {
                name_index: deprecated,
                info: vec![],
            });
        }
        let bytes = class_file.to_bytes().unwrap();
        let error = convert_class(&bytes, &mut ConstantPool::new(), &PackSettings::default())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(error, Error::Unsupported(_)));
    }

    #[test]
    fn malformed_method_descriptor() {
        let mut class_file = hello_class_file();
        let descriptor = push_utf8(&mut class_file, "(Ljava/lang/String;[java/lang/Object;)V");
        class_file.methods[1].descriptor_index = descriptor;
        let bytes = class_file.to_bytes().unwrap();
        let error = convert_class(&bytes, &mut ConstantPool::new(), &PackSettings::default())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(error, Error::ClassFile(_)), "{:?}", error);
        assert!(error.is_passable());
    }

    #[test]
    fn string_with_unpaired_surrogate() {
        let mut class_file = hello_class_file();
        let units = vec![0x78, 0xD800, 0x79];
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        for (_, _, constant) in &class_file.constants {
            let _ = constants.push(match constant {
                Constant::Utf8(string) if string == "hello" => Constant::Utf8Units(units.clone()),
                other => other.clone(),
            });
        }
        class_file.constants = constants;
        let bytes = class_file.to_bytes().unwrap();

        let mut pool = ConstantPool::new();
        let class = convert_class(&bytes, &mut pool, &PackSettings::default())
            .unwrap()
            .class;
        let lowered = class.to_class_file(&pool, &[]).unwrap();
        assert!(lowered
            .constants
            .iter()
            .any(|(_, _, constant)| *constant == Constant::Utf8Units(units.clone())));
    }

    #[test]
    fn malformed_class_files() {
        let mut bytes = hello_class_file().to_bytes().unwrap();
        bytes.truncate(bytes.len() - 3);
        let error = convert_class(&bytes, &mut ConstantPool::new(), &PackSettings::default())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(error, Error::ClassFile(_)));
    }
}
