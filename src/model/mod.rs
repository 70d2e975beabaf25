//! Segment-level class model
//!
//! Classes in a segment refer to the shared segment constant pool by handle instead of having a
//! constant pool of their own. Code positions (branch targets, exception ranges, debug tables,
//! uninitialized verification types) are instruction indices rather than bytecode offsets.
//!
//! The packer builds the model from parsed class files (`convert`) and the unpacker lowers it
//! back into class files (`lower`).

mod annotations;
mod convert;
mod inner_classes;
mod lower;

pub use annotations::*;
pub use convert::*;
pub use inner_classes::*;
pub use lower::*;

use crate::class_file::{
    ClassAccessFlags, FieldAccessFlags, Instruction, MethodAccessFlags, StackMapTable, Version,
};
use crate::cp::{
    ClassId, DescrId, DoubleId, FieldId, FloatId, IMethodId, IntId, LongId, MethodId, SignatureId,
    StringId, Utf8Id,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Class {
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassId,

    /// Superclass, or `None` for `java/lang/Object`
    pub super_class: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<ClassAttribute>,

    /// Class-local adjustment to the implicit `InnerClasses` attribute
    ///
    /// `None` keeps the implicit tuples, an empty list removes the attribute, and anything else is
    /// XOR-ed with the implicit tuples (see `resolve_inner_classes`).
    pub inner_classes: Option<Vec<InnerClass>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub descr: DescrId,
    pub attributes: Vec<FieldAttribute>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub descr: DescrId,
    pub attributes: Vec<MethodAttribute>,
}

impl Method {
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|attribute| match attribute {
            MethodAttribute::Code(code) => Some(code),
            _ => None,
        })
    }
}

/// Attributes of a class, in the order they are written
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassAttribute {
    SourceFile(Utf8Id),
    EnclosingMethod {
        class: ClassId,
        method: Option<DescrId>,
    },
    Signature(SignatureId),
    Deprecated,
    VisibleAnnotations(Vec<Annotation>),
    InvisibleAnnotations(Vec<Annotation>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldAttribute {
    ConstantValue(CpRef),
    Signature(SignatureId),
    Deprecated,
    VisibleAnnotations(Vec<Annotation>),
    InvisibleAnnotations(Vec<Annotation>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MethodAttribute {
    Code(Code),
    Exceptions(Vec<ClassId>),
    Signature(SignatureId),
    Deprecated,
    VisibleAnnotations(Vec<Annotation>),
    InvisibleAnnotations(Vec<Annotation>),

    /// One list of annotations per parameter
    VisibleParameterAnnotations(Vec<Vec<Annotation>>),
    InvisibleParameterAnnotations(Vec<Vec<Annotation>>),
    AnnotationDefault(ElementValue),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeAttribute {
    StackMapTable(StackMapTable<ClassId, usize>),
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),

    /// Same as `LocalVariableTable`, but the signatures are generic signatures
    LocalVariableTypeTable(Vec<LocalVariable>),
}

impl ClassAttribute {
    /// Position in the canonical attribute order (also the flag bit, minus 17)
    pub fn rank(&self) -> u8 {
        match self {
            ClassAttribute::SourceFile(_) => 0,
            ClassAttribute::EnclosingMethod { .. } => 1,
            ClassAttribute::Signature(_) => 2,
            ClassAttribute::Deprecated => 3,
            ClassAttribute::VisibleAnnotations(_) => 4,
            ClassAttribute::InvisibleAnnotations(_) => 5,
        }
    }
}

impl FieldAttribute {
    pub fn rank(&self) -> u8 {
        match self {
            FieldAttribute::ConstantValue(_) => 0,
            FieldAttribute::Signature(_) => 2,
            FieldAttribute::Deprecated => 3,
            FieldAttribute::VisibleAnnotations(_) => 4,
            FieldAttribute::InvisibleAnnotations(_) => 5,
        }
    }
}

impl MethodAttribute {
    pub fn rank(&self) -> u8 {
        match self {
            MethodAttribute::Code(_) => 0,
            MethodAttribute::Exceptions(_) => 1,
            MethodAttribute::Signature(_) => 2,
            MethodAttribute::Deprecated => 3,
            MethodAttribute::VisibleAnnotations(_) => 4,
            MethodAttribute::InvisibleAnnotations(_) => 5,
            MethodAttribute::VisibleParameterAnnotations(_) => 6,
            MethodAttribute::InvisibleParameterAnnotations(_) => 7,
            MethodAttribute::AnnotationDefault(_) => 8,
        }
    }
}

impl CodeAttribute {
    pub fn rank(&self) -> u8 {
        match self {
            CodeAttribute::StackMapTable(_) => 0,
            CodeAttribute::LineNumberTable(_) => 1,
            CodeAttribute::LocalVariableTable(_) => 2,
            CodeAttribute::LocalVariableTypeTable(_) => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction<CpRef, usize>>,
    pub handlers: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeAttribute>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First instruction covered
    pub start: usize,

    /// First instruction no longer covered (may be one past the last instruction)
    pub end: usize,
    pub handler: usize,

    /// Class of exceptions caught, or `None` to catch everything
    pub catch_type: Option<ClassId>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineNumber {
    pub start: usize,
    pub line: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start: usize,
    pub end: usize,
    pub name: Utf8Id,
    pub signature: SignatureId,
    pub slot: u16,
}

/// Reference from an instruction (or a `ConstantValue`) into the segment pool
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CpRef {
    Int(IntId),
    Float(FloatId),
    Long(LongId),
    Double(DoubleId),
    String(StringId),
    Class(ClassId),
    Field(FieldId),
    Method(MethodId),
    IMethod(IMethodId),
}

/// Entry of an `InnerClasses` attribute
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InnerClass {
    pub inner: ClassId,
    pub outer: Option<ClassId>,
    pub name: Option<Utf8Id>,
    pub flags: crate::class_file::InnerClassAccessFlags,
}

/// Pool category of a loadable constant
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Float,
    Long,
    Double,
    String,
}

impl ValueKind {
    /// Category of the `ConstantValue` of a field with this descriptor
    pub fn of_field_descriptor(descriptor: &str) -> Option<ValueKind> {
        match descriptor {
            "I" | "S" | "B" | "C" | "Z" => Some(ValueKind::Int),
            "F" => Some(ValueKind::Float),
            "J" => Some(ValueKind::Long),
            "D" => Some(ValueKind::Double),
            "Ljava/lang/String;" => Some(ValueKind::String),
            _ => None,
        }
    }
}

impl CpRef {
    pub fn value_kind(self) -> Option<ValueKind> {
        match self {
            CpRef::Int(_) => Some(ValueKind::Int),
            CpRef::Float(_) => Some(ValueKind::Float),
            CpRef::Long(_) => Some(ValueKind::Long),
            CpRef::Double(_) => Some(ValueKind::Double),
            CpRef::String(_) => Some(ValueKind::String),
            _ => None,
        }
    }
}
