use super::{ClassId, ConstantPool, FieldId, MethodId};
use std::collections::HashMap;

/// Fields and methods of the pool grouped by the class they belong to
///
/// The `this`/`super` and `init` bytecodes refer to members by their position among the members
/// of one class, rather than by their position in the whole pool.
#[derive(Default, Debug)]
pub struct ClassMembers {
    fields: HashMap<ClassId, Vec<FieldId>>,
    methods: HashMap<ClassId, Vec<MethodId>>,
    inits: HashMap<ClassId, Vec<MethodId>>,
}

impl ClassMembers {
    pub fn new(pool: &ConstantPool) -> ClassMembers {
        let mut members = ClassMembers::default();
        for (index, member) in pool.fields().iter().enumerate() {
            members
                .fields
                .entry(member.class)
                .or_default()
                .push(FieldId::from_index(index));
        }
        for (index, member) in pool.methods().iter().enumerate() {
            let id = MethodId::from_index(index);
            members.methods.entry(member.class).or_default().push(id);
            if pool.descr_name(member.descr) == "<init>" {
                members.inits.entry(member.class).or_default().push(id);
            }
        }
        members
    }

    pub fn fields(&self, class: ClassId) -> &[FieldId] {
        self.fields.get(&class).map_or(&[], Vec::as_slice)
    }

    pub fn methods(&self, class: ClassId) -> &[MethodId] {
        self.methods.get(&class).map_or(&[], Vec::as_slice)
    }

    pub fn inits(&self, class: ClassId) -> &[MethodId] {
        self.inits.get(&class).map_or(&[], Vec::as_slice)
    }
}
