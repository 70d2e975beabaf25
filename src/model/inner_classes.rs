use super::{Class, InnerClass};
use crate::cp::ClassId;
use crate::errors::Error;
use std::collections::HashSet;

/// Tuples of the segment-wide inner class list which are relevant to a class
///
/// A tuple is relevant when its outer class is the class itself, or when its inner class is
/// named by one of the class's constants. The tuples describing the outer classes of relevant
/// tuples are relevant too. Tuples come back in the order of the segment-wide list.
pub fn relevant_inner_classes(
    this_class: ClassId,
    global: &[InnerClass],
    referenced: &HashSet<ClassId>,
) -> Vec<InnerClass> {
    let mut included = vec![false; global.len()];
    let mut pending: Vec<ClassId> = vec![];
    for (index, tuple) in global.iter().enumerate() {
        if tuple.outer == Some(this_class) || referenced.contains(&tuple.inner) {
            included[index] = true;
            pending.extend(tuple.outer);
        }
    }

    let mut visited: HashSet<ClassId> = HashSet::new();
    while let Some(outer) = pending.pop() {
        if !visited.insert(outer) {
            continue;
        }
        for (index, tuple) in global.iter().enumerate() {
            if tuple.inner == outer && !included[index] {
                included[index] = true;
                pending.extend(tuple.outer);
            }
        }
    }

    global
        .iter()
        .zip(included)
        .filter(|(_, included)| *included)
        .map(|(tuple, _)| *tuple)
        .collect()
}

/// Tuples of the `InnerClasses` attribute a class ends up with
///
/// Tuples that are only relevant come first, then tuples that are only in the local list.
pub fn resolve_inner_classes(
    class: &Class,
    global: &[InnerClass],
    referenced: &HashSet<ClassId>,
) -> Vec<InnerClass> {
    let relevant = relevant_inner_classes(class.this_class, global, referenced);
    match &class.inner_classes {
        None => relevant,
        Some(local) if local.is_empty() => vec![],
        Some(local) => symmetric_difference(&relevant, local),
    }
}

fn symmetric_difference(relevant: &[InnerClass], local: &[InnerClass]) -> Vec<InnerClass> {
    relevant
        .iter()
        .filter(|tuple| !local.contains(tuple))
        .chain(local.iter().filter(|tuple| !relevant.contains(tuple)))
        .copied()
        .collect()
}

/// Smallest class-local list which makes the class resolve to the tuples of `declared`
///
/// Resolved tuples keep the global order, so a declared order which no local list reproduces
/// comes back in that order instead. Fails when not even the set of tuples can be reproduced.
pub fn local_inner_classes(
    this_class: ClassId,
    declared: Option<&[InnerClass]>,
    global: &[InnerClass],
    referenced: &HashSet<ClassId>,
) -> Result<Option<Vec<InnerClass>>, Error> {
    let relevant = relevant_inner_classes(this_class, global, referenced);
    let declared = declared.unwrap_or(&[]);
    if declared == relevant.as_slice() {
        return Ok(None);
    }
    if declared.is_empty() {
        return Ok(Some(vec![]));
    }

    let delta = symmetric_difference(&relevant, declared);
    let resolved = symmetric_difference(&relevant, &delta);
    if resolved != declared {
        let same_tuples =
            resolved.len() == declared.len() && declared.iter().all(|tuple| resolved.contains(tuple));
        if !same_tuples {
            return Err(Error::unsupported(
                "InnerClasses attribute cannot be reproduced",
            ));
        }
        log::debug!("InnerClasses tuples of class #{} are reordered", this_class.index());
    }
    Ok(if delta.is_empty() { None } else { Some(delta) })
}

/// Predict the outer class and simple name of an inner class from its name
///
/// `pkg/Outer$Inner` is a member class of `pkg/Outer` called `Inner`, `pkg/Outer$1` is anonymous,
/// and `pkg/Outer$1Local` is a local class called `Local`. Names without a `$` separator cannot
/// be predicted.
pub fn predict_inner_class(name: &str) -> Option<(Option<&str>, Option<&str>)> {
    let dollar = name.rfind('$')?;
    let (outer, simple) = (&name[..dollar], &name[dollar + 1..]);
    if outer.is_empty() || outer.ends_with('/') || simple.is_empty() {
        return None;
    }

    let digits = simple.bytes().take_while(u8::is_ascii_digit).count();
    if digits == simple.len() {
        Some((None, None))
    } else if digits > 0 {
        Some((None, Some(&simple[digits..])))
    } else {
        Some((Some(outer), Some(simple)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::class_file::{ClassAccessFlags, InnerClassAccessFlags, Version};
    use crate::cp::ConstantPool;

    fn tuple(pool: &mut ConstantPool, inner: &str, outer: Option<&str>) -> InnerClass {
        let simple = inner.rsplit('$').next().unwrap_or(inner).to_owned();
        InnerClass {
            inner: pool.class(inner),
            outer: outer.map(|outer| pool.class(outer)),
            name: Some(pool.utf8(&simple)),
            flags: InnerClassAccessFlags::PUBLIC | InnerClassAccessFlags::STATIC,
        }
    }

    fn empty_class(this_class: ClassId) -> Class {
        Class {
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::PUBLIC,
            this_class,
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            inner_classes: None,
        }
    }

    #[test]
    fn relevance_follows_outer_classes() {
        let mut pool = ConstantPool::new();
        let a_b = tuple(&mut pool, "p/A$B", Some("p/A"));
        let a_b_c = tuple(&mut pool, "p/A$B$C", Some("p/A$B"));
        let x_y = tuple(&mut pool, "p/X$Y", Some("p/X"));
        let user = pool.class("p/User");
        let a = pool.class("p/A");
        let global = vec![a_b, x_y, a_b_c];

        // `p/User` only mentions `p/A$B$C`, but needs the tuple for its outer class as well
        let referenced: HashSet<ClassId> = [user, a_b_c.inner].into_iter().collect();
        assert_eq!(relevant_inner_classes(user, &global, &referenced), vec![a_b, a_b_c]);

        // Member classes are relevant to their outer class even when not referenced
        let referenced: HashSet<ClassId> = [a].into_iter().collect();
        assert_eq!(relevant_inner_classes(a, &global, &referenced), vec![a_b]);
    }

    #[test]
    fn local_lists() {
        let mut pool = ConstantPool::new();
        let a_b = tuple(&mut pool, "p/A$B", Some("p/A"));
        let a_c = tuple(&mut pool, "p/A$C", Some("p/A"));
        let a = pool.class("p/A");
        let global = vec![a_b];
        let referenced: HashSet<ClassId> = [a].into_iter().collect();

        assert_eq!(
            local_inner_classes(a, Some(&[a_b][..]), &global, &referenced).unwrap(),
            None
        );
        assert_eq!(
            local_inner_classes(a, None, &global, &referenced).unwrap(),
            Some(vec![])
        );
        let local = local_inner_classes(a, Some(&[a_b, a_c][..]), &global, &referenced)
            .unwrap()
            .unwrap();
        assert_eq!(local, vec![a_c]);

        // No local list puts `a_c` first, so the tuples come back in global order
        let local = local_inner_classes(a, Some(&[a_c, a_b][..]), &global, &referenced)
            .unwrap()
            .unwrap();
        assert_eq!(local, vec![a_c]);
        let class_a = Class {
            inner_classes: Some(local),
            ..empty_class(a)
        };
        assert_eq!(resolve_inner_classes(&class_a, &global, &referenced), vec![a_b, a_c]);

        // Repeated tuples cannot be reproduced at all
        assert!(local_inner_classes(a, Some(&[a_b, a_b][..]), &global, &referenced).is_err());
    }

    #[test]
    fn declared_order_differs_from_global() {
        let mut pool = ConstantPool::new();
        let inner = tuple(&mut pool, "p/A$Inner", Some("p/A"));
        let nested = tuple(&mut pool, "p/A$Nested", Some("p/A"));
        let anonymous = InnerClass {
            inner: pool.class("p/A$1"),
            outer: None,
            name: None,
            flags: InnerClassAccessFlags::empty(),
        };
        let a = pool.class("p/A");
        let global = vec![anonymous, nested, inner];
        let referenced: HashSet<ClassId> = [a, anonymous.inner].into_iter().collect();

        let declared = [inner, nested, anonymous];
        let local = local_inner_classes(a, Some(&declared[..]), &global, &referenced).unwrap();
        let class_a = Class {
            inner_classes: local,
            ..empty_class(a)
        };
        let mut resolved = resolve_inner_classes(&class_a, &global, &referenced);
        assert_eq!(resolved, global);
        resolved.sort_by_key(|tuple| declared.iter().position(|declared| declared == tuple));
        assert_eq!(resolved, declared);
    }

    #[test]
    fn predictions() {
        assert_eq!(
            predict_inner_class("pkg/Outer$Inner"),
            Some((Some("pkg/Outer"), Some("Inner")))
        );
        assert_eq!(predict_inner_class("pkg/Outer$12"), Some((None, None)));
        assert_eq!(
            predict_inner_class("pkg/Outer$1Local"),
            Some((None, Some("Local")))
        );
        assert_eq!(
            predict_inner_class("A$B$C"),
            Some((Some("A$B"), Some("C")))
        );
        assert_eq!(predict_inner_class("pkg/Plain"), None);
        assert_eq!(predict_inner_class("pkg/$Odd"), None);
        assert_eq!(predict_inner_class("pkg/Trailing$"), None);
    }
}
