use crate::errors::Error;

/// Split a signature into its form and the class names it mentions
///
/// Every class name follows an `L` and runs up to the next `;` or `<`. The form is the signature
/// with those class names removed, so `(Ljava/lang/String;I)V` has form `(L;I)V` and classes
/// `["java/lang/String"]`. The scan is purely textual: every `L` in the signature starts a class
/// name, even inside a type variable name. `join_signature` undoes it exactly.
pub fn split_signature(signature: &str) -> (String, Vec<&str>) {
    let mut form = String::with_capacity(signature.len());
    let mut classes = vec![];
    let mut rest = signature;

    while let Some(l_pos) = rest.find('L') {
        form.push_str(&rest[..=l_pos]);
        let after_l = &rest[l_pos + 1..];
        let end = after_l.find(|c| c == ';' || c == '<').unwrap_or(after_l.len());
        classes.push(&after_l[..end]);
        rest = &after_l[end..];
    }
    form.push_str(rest);

    (form, classes)
}

/// Number of class names that go into a form
pub fn form_class_count(form: &str) -> usize {
    form.matches('L').count()
}

/// Put class names back into a signature form
pub fn join_signature<S: AsRef<str>>(form: &str, classes: &[S]) -> Result<String, Error> {
    let expected = form_class_count(form);
    if expected != classes.len() {
        return Err(Error::format(format!(
            "signature form '{}' needs {} classes but has {}",
            form,
            expected,
            classes.len()
        )));
    }

    let mut signature = String::with_capacity(form.len() + classes.len() * 16);
    let mut classes = classes.iter();
    for c in form.chars() {
        signature.push(c);
        if c == 'L' {
            if let Some(class) = classes.next() {
                signature.push_str(class.as_ref());
            }
        }
    }
    Ok(signature)
}

/// Number of local variable slots taken by the arguments of a method descriptor
///
/// `long` and `double` arguments take two slots, everything else one.
pub fn argument_slots(descriptor: &str) -> Result<usize, Error> {
    let bad = || Error::format(format!("malformed method descriptor '{}'", descriptor));
    let args = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .map(|(args, _)| args)
        .ok_or_else(bad)?;

    let mut slots = 0;
    let mut chars = args.chars();
    while let Some(c) = chars.next() {
        match c {
            'J' | 'D' => slots += 2,
            'B' | 'C' | 'F' | 'I' | 'S' | 'Z' => slots += 1,
            'L' => {
                chars.by_ref().find(|c| *c == ';').ok_or_else(bad)?;
                slots += 1;
            }
            '[' => {
                let mut element = chars.next().ok_or_else(bad)?;
                while element == '[' {
                    element = chars.next().ok_or_else(bad)?;
                }
                if element == 'L' {
                    chars.by_ref().find(|c| *c == ';').ok_or_else(bad)?;
                }
                slots += 1;
            }
            _ => return Err(bad()),
        }
    }
    Ok(slots)
}
