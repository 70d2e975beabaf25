use crate::class_file::InnerClassAccessFlags;
use crate::codec::{capacity_for, BandReader, BandWriter, Coding};
use crate::cp::{ClassId, ConstantPool, Utf8Id};
use crate::errors::Error;
use crate::model::{predict_inner_class, InnerClass};
use std::io::Read;

/// Flag bit marking a tuple whose outer class and name are transmitted
pub const LONG_FORM: u32 = 1 << 16;

pub fn read<R: Read>(
    reader: &mut BandReader<R>,
    pool: &mut ConstantPool,
    count: usize,
) -> Result<Vec<InnerClass>, Error> {
    let inners = reader.read_band("ic_this_class", Coding::UDELTA5, count)?;
    let flags = reader.read_band("ic_flags", Coding::UNSIGNED5, count)?;
    let long_count = flags
        .iter()
        .filter(|flags| **flags as u32 & LONG_FORM != 0)
        .count();
    let outers = reader.read_band("ic_outer_class", Coding::DELTA5, long_count)?;
    let names = reader.read_band("ic_name", Coding::DELTA5, long_count)?;

    let mut outers = outers.into_iter();
    let mut names = names.into_iter();
    let mut inner_classes = Vec::with_capacity(capacity_for(count));
    for (inner, flags) in inners.into_iter().zip(flags) {
        let inner = pool.class_id("ic_this_class", inner)?;
        let flags = flags as u32;
        let (outer, name) = if flags & LONG_FORM != 0 {
            let outer = outers.next().unwrap_or_default();
            let name = names.next().unwrap_or_default();
            (
                optional_class(pool, "ic_outer_class", outer)?,
                optional_utf8(pool, "ic_name", name)?,
            )
        } else {
            predicted(pool, inner)?
        };
        inner_classes.push(InnerClass {
            inner,
            outer,
            name,
            flags: inner_class_flags(flags)?,
        });
    }

    log::debug!("Read {} inner classes", inner_classes.len());
    Ok(inner_classes)
}

pub fn write(
    writer: &mut BandWriter,
    pool: &ConstantPool,
    inner_classes: &[InnerClass],
) -> Result<(), Error> {
    let mut inners = vec![];
    let mut flags = vec![];
    let mut outers = vec![];
    let mut names = vec![];
    for tuple in inner_classes {
        inners.push(tuple.inner.index());
        if is_predictable(pool, tuple) {
            flags.push(tuple.flags.bits() as i32);
        } else {
            flags.push((tuple.flags.bits() as u32 | LONG_FORM) as i32);
            outers.push(optional_index(tuple.outer.map(ClassId::index)));
            names.push(optional_index(tuple.name.map(Utf8Id::index)));
        }
    }
    writer.write_indices("ic_this_class", Coding::UDELTA5, &inners)?;
    writer.write_band("ic_flags", Coding::UNSIGNED5, &flags)?;
    writer.write_indices("ic_outer_class", Coding::DELTA5, &outers)?;
    writer.write_indices("ic_name", Coding::DELTA5, &names)?;
    Ok(())
}

/// Whether the outer class and name of the tuple follow from the inner class name
fn is_predictable(pool: &ConstantPool, tuple: &InnerClass) -> bool {
    let outer = tuple.outer.map(|outer| pool.class_name(outer));
    let name = tuple.name.map(|name| pool.utf8_str(name));
    predict_inner_class(pool.class_name(tuple.inner)) == Some((outer, name))
}

fn predicted(
    pool: &mut ConstantPool,
    inner: ClassId,
) -> Result<(Option<ClassId>, Option<Utf8Id>), Error> {
    let inner_name = pool.class_name(inner).to_owned();
    let (outer, name) = predict_inner_class(&inner_name).ok_or_else(|| {
        Error::format(format!(
            "outer class and name of '{}' cannot be predicted",
            inner_name
        ))
    })?;
    Ok((outer.map(|outer| pool.class(outer)), name.map(|name| pool.utf8(name))))
}

pub fn inner_class_flags(flags: u32) -> Result<InnerClassAccessFlags, Error> {
    u16::try_from(flags & !LONG_FORM)
        .ok()
        .and_then(InnerClassAccessFlags::from_bits)
        .ok_or_else(|| Error::format(format!("bad inner class flags {:#x}", flags)))
}

/// Index plus one, or zero for `None`
pub fn optional_index(index: Option<usize>) -> usize {
    index.map_or(0, |index| index + 1)
}

pub fn optional_class(pool: &ConstantPool, band: &str, value: i32) -> Result<Option<ClassId>, Error> {
    match value {
        0 => Ok(None),
        n => pool.class_id(band, n.wrapping_sub(1)).map(Some),
    }
}

pub fn optional_utf8(pool: &ConstantPool, band: &str, value: i32) -> Result<Option<Utf8Id>, Error> {
    match value {
        0 => Ok(None),
        n => pool.utf8_id(band, n.wrapping_sub(1)).map(Some),
    }
}
