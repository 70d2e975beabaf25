//! Segment constant pool
//!
//! All classes of a segment share one constant pool, split by category (`Utf8`, `Int`, ...,
//! `IMethod`). Within a category, entries are deduplicated by value and are referred to by typed
//! handles. The packer interns entries in first-use order; the unpacker pushes them in the order
//! in which the bands list them.

mod members;
mod signature;

pub use members::*;
pub use signature::*;

use crate::codec::check_index;
use crate::errors::Error;
use std::collections::HashMap;

macro_rules! handles {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
            pub struct $name(u32);

            impl $name {
                /// Position of the entry within its category
                pub fn index(self) -> usize {
                    self.0 as usize
                }

                pub(crate) fn from_index(index: usize) -> $name {
                    $name(index as u32)
                }
            }
        )*
    };
}

handles!(
    /// Handle to a `Utf8` entry (index 0 is always the empty string)
    Utf8Id,
    IntId,
    FloatId,
    LongId,
    DoubleId,
    /// Handle to a `String` entry (a `java.lang.String` literal)
    StringId,
    ClassId,
    /// Handle to a `Signature` entry (a descriptor or generic signature)
    SignatureId,
    /// Handle to a `Descr` entry (name and signature of a member)
    DescrId,
    FieldId,
    MethodId,
    IMethodId,
);

/// Signature broken into its form and class names
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub form: Utf8Id,
    pub classes: Vec<ClassId>,
}

/// Name and type of a member
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Descr {
    pub name: Utf8Id,
    pub signature: SignatureId,
}

/// Field, method, or interface method reference
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub class: ClassId,
    pub descr: DescrId,
}

#[derive(Default, Debug)]
struct Lookup {
    utf8s: HashMap<String, Utf8Id>,
    unpaired: HashMap<Vec<u16>, Utf8Id>,
    ints: HashMap<i32, IntId>,
    floats: HashMap<u32, FloatId>,
    longs: HashMap<i64, LongId>,
    doubles: HashMap<u64, DoubleId>,
    strings: HashMap<Utf8Id, StringId>,
    classes: HashMap<Utf8Id, ClassId>,
    signatures: HashMap<Signature, SignatureId>,
    descrs: HashMap<Descr, DescrId>,
    fields: HashMap<MemberRef, FieldId>,
    methods: HashMap<MemberRef, MethodId>,
    imethods: HashMap<MemberRef, IMethodId>,
}

/// Constant pool of a segment
#[derive(Debug)]
pub struct ConstantPool {
    utf8s: Vec<String>,

    /// UTF-16 units of the `Utf8` entries holding unpaired surrogates
    ///
    /// Their slot in `utf8s` only has a lossy rendering, for messages.
    unpaired: HashMap<Utf8Id, Vec<u16>>,
    ints: Vec<i32>,
    floats: Vec<u32>,
    longs: Vec<i64>,
    doubles: Vec<u64>,
    strings: Vec<Utf8Id>,
    classes: Vec<Utf8Id>,
    signatures: Vec<Signature>,
    descrs: Vec<Descr>,
    fields: Vec<MemberRef>,
    methods: Vec<MemberRef>,
    imethods: Vec<MemberRef>,
    lookup: Lookup,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl ConstantPool {
    /// Empty pool (apart from the empty string)
    pub fn new() -> ConstantPool {
        let mut pool = ConstantPool::empty();
        pool.utf8("");
        pool
    }

    /// Pool without even the empty string, which the unpacker reads from the bands
    pub(crate) fn empty() -> ConstantPool {
        ConstantPool {
            utf8s: vec![],
            unpaired: HashMap::new(),
            ints: vec![],
            floats: vec![],
            longs: vec![],
            doubles: vec![],
            strings: vec![],
            classes: vec![],
            signatures: vec![],
            descrs: vec![],
            fields: vec![],
            methods: vec![],
            imethods: vec![],
            lookup: Lookup::default(),
        }
    }

    // Interning (packer side)

    pub fn utf8(&mut self, value: &str) -> Utf8Id {
        if let Some(id) = self.lookup.utf8s.get(value) {
            return *id;
        }
        self.push_utf8(value.to_owned())
    }

    /// Intern a string given as UTF-16 units, which may include unpaired surrogates
    pub fn utf16(&mut self, units: &[u16]) -> Utf8Id {
        match String::from_utf16(units) {
            Ok(value) => self.utf8(&value),
            Err(_) => match self.lookup.unpaired.get(units) {
                Some(id) => *id,
                None => self.push_utf16(units.to_vec()),
            },
        }
    }

    pub fn int(&mut self, value: i32) -> IntId {
        match self.lookup.ints.get(&value) {
            Some(id) => *id,
            None => self.push_int(value),
        }
    }

    /// Intern a float, given its IEEE 754 bits
    pub fn float(&mut self, bits: u32) -> FloatId {
        match self.lookup.floats.get(&bits) {
            Some(id) => *id,
            None => self.push_float(bits),
        }
    }

    pub fn long(&mut self, value: i64) -> LongId {
        match self.lookup.longs.get(&value) {
            Some(id) => *id,
            None => self.push_long(value),
        }
    }

    /// Intern a double, given its IEEE 754 bits
    pub fn double(&mut self, bits: u64) -> DoubleId {
        match self.lookup.doubles.get(&bits) {
            Some(id) => *id,
            None => self.push_double(bits),
        }
    }

    pub fn string(&mut self, value: &str) -> StringId {
        let utf8 = self.utf8(value);
        self.string_of(utf8)
    }

    pub fn string_utf16(&mut self, units: &[u16]) -> StringId {
        let utf8 = self.utf16(units);
        self.string_of(utf8)
    }

    fn string_of(&mut self, utf8: Utf8Id) -> StringId {
        match self.lookup.strings.get(&utf8) {
            Some(id) => *id,
            None => self.push_string(utf8),
        }
    }

    pub fn class(&mut self, name: &str) -> ClassId {
        let utf8 = self.utf8(name);
        match self.lookup.classes.get(&utf8) {
            Some(id) => *id,
            None => self.push_class(utf8),
        }
    }

    pub fn signature(&mut self, signature: &str) -> SignatureId {
        let (form, class_names) = split_signature(signature);
        let form = self.utf8(&form);
        let classes = class_names.into_iter().map(|name| self.class(name)).collect();
        let signature = Signature { form, classes };
        match self.lookup.signatures.get(&signature) {
            Some(id) => *id,
            None => self.push_signature(signature),
        }
    }

    pub fn descr(&mut self, name: &str, signature: &str) -> DescrId {
        let descr = Descr {
            name: self.utf8(name),
            signature: self.signature(signature),
        };
        match self.lookup.descrs.get(&descr) {
            Some(id) => *id,
            None => self.push_descr(descr),
        }
    }

    pub fn field(&mut self, class: &str, name: &str, descriptor: &str) -> FieldId {
        let member = self.member(class, name, descriptor);
        match self.lookup.fields.get(&member) {
            Some(id) => *id,
            None => self.push_field(member),
        }
    }

    pub fn method(&mut self, class: &str, name: &str, descriptor: &str) -> MethodId {
        let member = self.member(class, name, descriptor);
        match self.lookup.methods.get(&member) {
            Some(id) => *id,
            None => self.push_method(member),
        }
    }

    pub fn imethod(&mut self, class: &str, name: &str, descriptor: &str) -> IMethodId {
        let member = self.member(class, name, descriptor);
        match self.lookup.imethods.get(&member) {
            Some(id) => *id,
            None => self.push_imethod(member),
        }
    }

    fn member(&mut self, class: &str, name: &str, descriptor: &str) -> MemberRef {
        MemberRef {
            class: self.class(class),
            descr: self.descr(name, descriptor),
        }
    }

    // Appending (unpacker side, also used by interning)

    pub(crate) fn push_utf8(&mut self, value: String) -> Utf8Id {
        let id = Utf8Id::from_index(self.utf8s.len());
        self.lookup.utf8s.entry(value.clone()).or_insert(id);
        self.utf8s.push(value);
        id
    }

    /// Append a `Utf8` entry from its UTF-16 units
    pub(crate) fn push_utf16(&mut self, units: Vec<u16>) -> Utf8Id {
        match String::from_utf16(&units) {
            Ok(value) => self.push_utf8(value),
            Err(_) => {
                let id = Utf8Id::from_index(self.utf8s.len());
                self.utf8s.push(String::from_utf16_lossy(&units));
                self.lookup.unpaired.entry(units.clone()).or_insert(id);
                self.unpaired.insert(id, units);
                id
            }
        }
    }

    pub(crate) fn push_int(&mut self, value: i32) -> IntId {
        let id = IntId::from_index(self.ints.len());
        self.lookup.ints.entry(value).or_insert(id);
        self.ints.push(value);
        id
    }

    pub(crate) fn push_float(&mut self, bits: u32) -> FloatId {
        let id = FloatId::from_index(self.floats.len());
        self.lookup.floats.entry(bits).or_insert(id);
        self.floats.push(bits);
        id
    }

    pub(crate) fn push_long(&mut self, value: i64) -> LongId {
        let id = LongId::from_index(self.longs.len());
        self.lookup.longs.entry(value).or_insert(id);
        self.longs.push(value);
        id
    }

    pub(crate) fn push_double(&mut self, bits: u64) -> DoubleId {
        let id = DoubleId::from_index(self.doubles.len());
        self.lookup.doubles.entry(bits).or_insert(id);
        self.doubles.push(bits);
        id
    }

    pub(crate) fn push_string(&mut self, utf8: Utf8Id) -> StringId {
        let id = StringId::from_index(self.strings.len());
        self.lookup.strings.entry(utf8).or_insert(id);
        self.strings.push(utf8);
        id
    }

    pub(crate) fn push_class(&mut self, utf8: Utf8Id) -> ClassId {
        let id = ClassId::from_index(self.classes.len());
        self.lookup.classes.entry(utf8).or_insert(id);
        self.classes.push(utf8);
        id
    }

    pub(crate) fn push_signature(&mut self, signature: Signature) -> SignatureId {
        let id = SignatureId::from_index(self.signatures.len());
        self.lookup.signatures.entry(signature.clone()).or_insert(id);
        self.signatures.push(signature);
        id
    }

    pub(crate) fn push_descr(&mut self, descr: Descr) -> DescrId {
        let id = DescrId::from_index(self.descrs.len());
        self.lookup.descrs.entry(descr).or_insert(id);
        self.descrs.push(descr);
        id
    }

    pub(crate) fn push_field(&mut self, member: MemberRef) -> FieldId {
        let id = FieldId::from_index(self.fields.len());
        self.lookup.fields.entry(member).or_insert(id);
        self.fields.push(member);
        id
    }

    pub(crate) fn push_method(&mut self, member: MemberRef) -> MethodId {
        let id = MethodId::from_index(self.methods.len());
        self.lookup.methods.entry(member).or_insert(id);
        self.methods.push(member);
        id
    }

    pub(crate) fn push_imethod(&mut self, member: MemberRef) -> IMethodId {
        let id = IMethodId::from_index(self.imethods.len());
        self.lookup.imethods.entry(member).or_insert(id);
        self.imethods.push(member);
        id
    }

    // Checked handle construction from band values

    pub fn utf8_id(&self, band: &str, value: i32) -> Result<Utf8Id, Error> {
        check_index(band, value, self.utf8s.len()).map(Utf8Id::from_index)
    }

    pub fn int_id(&self, band: &str, value: i32) -> Result<IntId, Error> {
        check_index(band, value, self.ints.len()).map(IntId::from_index)
    }

    pub fn float_id(&self, band: &str, value: i32) -> Result<FloatId, Error> {
        check_index(band, value, self.floats.len()).map(FloatId::from_index)
    }

    pub fn long_id(&self, band: &str, value: i32) -> Result<LongId, Error> {
        check_index(band, value, self.longs.len()).map(LongId::from_index)
    }

    pub fn double_id(&self, band: &str, value: i32) -> Result<DoubleId, Error> {
        check_index(band, value, self.doubles.len()).map(DoubleId::from_index)
    }

    pub fn string_id(&self, band: &str, value: i32) -> Result<StringId, Error> {
        check_index(band, value, self.strings.len()).map(StringId::from_index)
    }

    pub fn class_id(&self, band: &str, value: i32) -> Result<ClassId, Error> {
        check_index(band, value, self.classes.len()).map(ClassId::from_index)
    }

    pub fn signature_id(&self, band: &str, value: i32) -> Result<SignatureId, Error> {
        check_index(band, value, self.signatures.len()).map(SignatureId::from_index)
    }

    pub fn descr_id(&self, band: &str, value: i32) -> Result<DescrId, Error> {
        check_index(band, value, self.descrs.len()).map(DescrId::from_index)
    }

    pub fn field_id(&self, band: &str, value: i32) -> Result<FieldId, Error> {
        check_index(band, value, self.fields.len()).map(FieldId::from_index)
    }

    pub fn method_id(&self, band: &str, value: i32) -> Result<MethodId, Error> {
        check_index(band, value, self.methods.len()).map(MethodId::from_index)
    }

    pub fn imethod_id(&self, band: &str, value: i32) -> Result<IMethodId, Error> {
        check_index(band, value, self.imethods.len()).map(IMethodId::from_index)
    }

    // Resolution

    pub fn utf8_str(&self, id: Utf8Id) -> &str {
        &self.utf8s[id.index()]
    }

    /// UTF-16 units of an entry, if it is not valid Unicode
    pub fn unpaired_units(&self, id: Utf8Id) -> Option<&[u16]> {
        self.unpaired.get(&id).map(Vec::as_slice)
    }

    /// UTF-16 units of any entry
    pub fn utf16_units(&self, id: Utf8Id) -> Vec<u16> {
        match self.unpaired_units(id) {
            Some(units) => units.to_vec(),
            None => self.utf8_str(id).encode_utf16().collect(),
        }
    }

    pub fn int_value(&self, id: IntId) -> i32 {
        self.ints[id.index()]
    }

    pub fn float_bits(&self, id: FloatId) -> u32 {
        self.floats[id.index()]
    }

    pub fn long_value(&self, id: LongId) -> i64 {
        self.longs[id.index()]
    }

    pub fn double_bits(&self, id: DoubleId) -> u64 {
        self.doubles[id.index()]
    }

    pub fn string_utf8(&self, id: StringId) -> Utf8Id {
        self.strings[id.index()]
    }

    pub fn string_value(&self, id: StringId) -> &str {
        self.utf8_str(self.string_utf8(id))
    }

    pub fn class_utf8(&self, id: ClassId) -> Utf8Id {
        self.classes[id.index()]
    }

    pub fn class_name(&self, id: ClassId) -> &str {
        self.utf8_str(self.class_utf8(id))
    }

    pub fn signature_entry(&self, id: SignatureId) -> &Signature {
        &self.signatures[id.index()]
    }

    /// Full text of a signature
    pub fn signature_string(&self, id: SignatureId) -> String {
        let signature = self.signature_entry(id);
        let classes: Vec<&str> = signature
            .classes
            .iter()
            .map(|class| self.class_name(*class))
            .collect();
        let form = self.utf8_str(signature.form);

        // Class counts are checked when signatures are decoded or interned
        join_signature(form, &classes).unwrap_or_else(|_| form.to_owned())
    }

    pub fn descr_entry(&self, id: DescrId) -> Descr {
        self.descrs[id.index()]
    }

    pub fn descr_name(&self, id: DescrId) -> &str {
        self.utf8_str(self.descr_entry(id).name)
    }

    pub fn descr_type(&self, id: DescrId) -> String {
        self.signature_string(self.descr_entry(id).signature)
    }

    pub fn field_entry(&self, id: FieldId) -> MemberRef {
        self.fields[id.index()]
    }

    pub fn method_entry(&self, id: MethodId) -> MemberRef {
        self.methods[id.index()]
    }

    pub fn imethod_entry(&self, id: IMethodId) -> MemberRef {
        self.imethods[id.index()]
    }

    /// Find an existing `Utf8` entry
    pub fn find_utf8(&self, value: &str) -> Option<Utf8Id> {
        self.lookup.utf8s.get(value).copied()
    }

    /// Find an existing class entry by name
    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        let utf8 = self.lookup.utf8s.get(name)?;
        self.lookup.classes.get(utf8).copied()
    }

    // Category contents, in order

    pub fn utf8s(&self) -> &[String] {
        &self.utf8s
    }

    pub fn ints(&self) -> &[i32] {
        &self.ints
    }

    pub fn floats(&self) -> &[u32] {
        &self.floats
    }

    pub fn longs(&self) -> &[i64] {
        &self.longs
    }

    pub fn doubles(&self) -> &[u64] {
        &self.doubles
    }

    pub fn strings(&self) -> &[Utf8Id] {
        &self.strings
    }

    pub fn classes(&self) -> &[Utf8Id] {
        &self.classes
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn descrs(&self) -> &[Descr] {
        &self.descrs
    }

    pub fn fields(&self) -> &[MemberRef] {
        &self.fields
    }

    pub fn methods(&self) -> &[MemberRef] {
        &self.methods
    }

    pub fn imethods(&self) -> &[MemberRef] {
        &self.imethods
    }
}
