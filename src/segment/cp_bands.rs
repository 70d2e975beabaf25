use super::header::CpCounts;
use crate::codec::{BandReader, BandWriter, Coding};
use crate::cp::{form_class_count, ConstantPool, Descr, MemberRef, Signature, Utf8Id};
use crate::errors::Error;
use std::io::Read;

/// Strings with at least this many new UTF-16 units get their own band
const BIG_SUFFIX: usize = 256;

pub fn counts(pool: &ConstantPool) -> CpCounts {
    CpCounts {
        utf8: pool.utf8s().len(),
        int: pool.ints().len(),
        float: pool.floats().len(),
        long: pool.longs().len(),
        double: pool.doubles().len(),
        string: pool.strings().len(),
        class: pool.classes().len(),
        signature: pool.signatures().len(),
        descr: pool.descrs().len(),
        field: pool.fields().len(),
        method: pool.methods().len(),
        imethod: pool.imethods().len(),
    }
}

pub fn read<R: Read>(reader: &mut BandReader<R>, counts: &CpCounts) -> Result<ConstantPool, Error> {
    let mut pool = ConstantPool::empty();
    read_utf8s(reader, counts.utf8, &mut pool)?;

    for value in reader.read_band("cp_Int", Coding::UDELTA5, counts.int)? {
        pool.push_int(value);
    }
    for value in reader.read_band("cp_Float", Coding::UDELTA5, counts.float)? {
        pool.push_float(value as u32);
    }
    for value in read_wide(reader, "cp_Long", counts.long)? {
        pool.push_long(value as i64);
    }
    for value in read_wide(reader, "cp_Double", counts.double)? {
        pool.push_double(value);
    }

    for value in reader.read_band("cp_String", Coding::UDELTA5, counts.string)? {
        let utf8 = pool.utf8_id("cp_String", value)?;
        pool.push_string(utf8);
    }
    for value in reader.read_band("cp_Class", Coding::UDELTA5, counts.class)? {
        let utf8 = pool.utf8_id("cp_Class", value)?;
        pool.push_class(utf8);
    }

    let forms = reader
        .read_band("cp_Signature_form", Coding::DELTA5, counts.signature)?
        .into_iter()
        .map(|value| pool.utf8_id("cp_Signature_form", value))
        .collect::<Result<Vec<Utf8Id>, Error>>()?;
    let class_count = forms
        .iter()
        .map(|form| form_class_count(pool.utf8_str(*form)))
        .sum();
    let mut classes = reader
        .read_band("cp_Signature_classes", Coding::UDELTA5, class_count)?
        .into_iter();
    for form in forms {
        let count = form_class_count(pool.utf8_str(form));
        let classes = classes
            .by_ref()
            .take(count)
            .map(|value| pool.class_id("cp_Signature_classes", value))
            .collect::<Result<Vec<_>, Error>>()?;
        pool.push_signature(Signature { form, classes });
    }

    let names = reader.read_band("cp_Descr_name", Coding::DELTA5, counts.descr)?;
    let types = reader.read_band("cp_Descr_type", Coding::UDELTA5, counts.descr)?;
    for (name, signature) in names.into_iter().zip(types) {
        let descr = Descr {
            name: pool.utf8_id("cp_Descr_name", name)?,
            signature: pool.signature_id("cp_Descr_type", signature)?,
        };
        pool.push_descr(descr);
    }

    for member in read_members(reader, &pool, "cp_Field", counts.field)? {
        pool.push_field(member);
    }
    for member in read_members(reader, &pool, "cp_Method", counts.method)? {
        pool.push_method(member);
    }
    for member in read_members(reader, &pool, "cp_Imethod", counts.imethod)? {
        pool.push_imethod(member);
    }

    log::debug!("Read constant pool bands: {:?}", counts);
    Ok(pool)
}

/// Read `Utf8` entries, which are front-coded against the previous entry
///
/// Prefix and suffix lengths count UTF-16 units. The first entry is always the empty string and
/// the second always has an empty prefix, so neither is transmitted.
fn read_utf8s<R: Read>(
    reader: &mut BandReader<R>,
    count: usize,
    pool: &mut ConstantPool,
) -> Result<(), Error> {
    if count == 0 {
        return Err(Error::format("constant pool lacks the empty string"));
    }
    let prefixes = reader.read_counts("cp_Utf8_prefix", Coding::DELTA5, count.saturating_sub(2))?;
    let suffixes = reader.read_counts("cp_Utf8_suffix", Coding::UNSIGNED5, count - 1)?;
    let char_count = suffixes.iter().sum();
    let chars = reader.read_band("cp_Utf8_chars", Coding::CHAR3, char_count)?;
    let big_count = suffixes.iter().filter(|suffix| **suffix == 0).count();
    let big_suffixes = reader.read_counts("cp_Utf8_big_suffix", Coding::DELTA5, big_count)?;
    let mut big_chars = vec![];
    for suffix in big_suffixes {
        big_chars.push(reader.read_band("cp_Utf8_big_chars", Coding::DELTA5, suffix)?);
    }

    pool.push_utf8(String::new());
    let mut chars = chars.into_iter();
    let mut big_chars = big_chars.into_iter();
    let mut previous: Vec<u16> = vec![];
    for index in 1..count {
        let prefix = if index == 1 { 0 } else { prefixes[index - 2] };
        if prefix > previous.len() {
            return Err(Error::format(format!(
                "Utf8 prefix {} is longer than the previous string",
                prefix
            )));
        }

        let suffix = suffixes[index - 1];
        let new_chars: Vec<i32> = if suffix == 0 {
            big_chars.next().unwrap_or_default()
        } else {
            chars.by_ref().take(suffix).collect()
        };

        let mut units = previous[..prefix].to_vec();
        for char in new_chars {
            let unit = u16::try_from(char)
                .map_err(|_| Error::format(format!("{} is not a UTF-16 unit", char)))?;
            units.push(unit);
        }
        pool.push_utf16(units.clone());
        previous = units;
    }
    Ok(())
}

fn read_wide<R: Read>(reader: &mut BandReader<R>, name: &str, count: usize) -> Result<Vec<u64>, Error> {
    let hi = reader.read_band(&format!("{}_hi", name), Coding::UDELTA5, count)?;
    let lo = reader.read_band(&format!("{}_lo", name), Coding::DELTA5, count)?;
    Ok(hi
        .into_iter()
        .zip(lo)
        .map(|(hi, lo)| (hi as u32 as u64) << 32 | lo as u32 as u64)
        .collect())
}

fn read_members<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    name: &str,
    count: usize,
) -> Result<Vec<MemberRef>, Error> {
    let class_band = format!("{}_class", name);
    let desc_band = format!("{}_desc", name);
    let classes = reader.read_band(&class_band, Coding::DELTA5, count)?;
    let descrs = reader.read_band(&desc_band, Coding::UDELTA5, count)?;
    classes
        .into_iter()
        .zip(descrs)
        .map(|(class, descr)| {
            Ok(MemberRef {
                class: pool.class_id(&class_band, class)?,
                descr: pool.descr_id(&desc_band, descr)?,
            })
        })
        .collect()
}

pub fn write(writer: &mut BandWriter, pool: &ConstantPool) -> Result<(), Error> {
    write_utf8s(writer, pool)?;

    writer.write_band("cp_Int", Coding::UDELTA5, pool.ints())?;
    let floats: Vec<i32> = pool.floats().iter().map(|bits| *bits as i32).collect();
    writer.write_band("cp_Float", Coding::UDELTA5, &floats)?;
    let longs: Vec<u64> = pool.longs().iter().map(|value| *value as u64).collect();
    write_wide(writer, "cp_Long", &longs)?;
    write_wide(writer, "cp_Double", pool.doubles())?;

    writer.write_indices("cp_String", Coding::UDELTA5, &indices(pool.strings(), |id| id.index()))?;
    writer.write_indices("cp_Class", Coding::UDELTA5, &indices(pool.classes(), |id| id.index()))?;

    let signatures = pool.signatures();
    writer.write_indices(
        "cp_Signature_form",
        Coding::DELTA5,
        &indices(signatures, |signature| signature.form.index()),
    )?;
    let classes: Vec<usize> = signatures
        .iter()
        .flat_map(|signature| signature.classes.iter().map(|class| class.index()))
        .collect();
    writer.write_indices("cp_Signature_classes", Coding::UDELTA5, &classes)?;

    let descrs = pool.descrs();
    writer.write_indices("cp_Descr_name", Coding::DELTA5, &indices(descrs, |d| d.name.index()))?;
    writer.write_indices(
        "cp_Descr_type",
        Coding::UDELTA5,
        &indices(descrs, |d| d.signature.index()),
    )?;

    write_members(writer, "cp_Field", pool.fields())?;
    write_members(writer, "cp_Method", pool.methods())?;
    write_members(writer, "cp_Imethod", pool.imethods())?;
    Ok(())
}

fn indices<T>(entries: &[T], index: impl Fn(&T) -> usize) -> Vec<usize> {
    entries.iter().map(index).collect()
}

fn write_utf8s(writer: &mut BandWriter, pool: &ConstantPool) -> Result<(), Error> {
    if pool.utf8s().first().map(String::as_str) != Some("") {
        return Err(Error::format("constant pool lacks the empty string"));
    }

    let mut prefixes = vec![];
    let mut suffixes = vec![];
    let mut chars = vec![];
    let mut big_suffixes = vec![];
    let mut big_chars = vec![];
    let mut previous: Vec<u16> = vec![];
    for index in 1..pool.utf8s().len() {
        let units = pool.utf16_units(Utf8Id::from_index(index));
        if units.is_empty() {
            return Err(Error::format("empty string repeated in the constant pool"));
        }

        // At least one new unit, so that a zero suffix can mark a big string
        let prefix = units
            .iter()
            .zip(&previous)
            .take_while(|(a, b)| a == b)
            .count()
            .min(units.len() - 1);
        if index >= 2 {
            prefixes.push(prefix);
        }

        let new_chars = units[prefix..].iter().map(|unit| *unit as i32);
        let suffix = units.len() - prefix;
        if suffix >= BIG_SUFFIX {
            suffixes.push(0);
            big_suffixes.push(suffix);
            big_chars.push(new_chars.collect::<Vec<i32>>());
        } else {
            suffixes.push(suffix);
            chars.extend(new_chars);
        }
        previous = units;
    }

    writer.write_indices("cp_Utf8_prefix", Coding::DELTA5, &prefixes)?;
    writer.write_indices("cp_Utf8_suffix", Coding::UNSIGNED5, &suffixes)?;
    writer.write_band("cp_Utf8_chars", Coding::CHAR3, &chars)?;
    writer.write_indices("cp_Utf8_big_suffix", Coding::DELTA5, &big_suffixes)?;
    for chars in big_chars {
        writer.write_band("cp_Utf8_big_chars", Coding::DELTA5, &chars)?;
    }
    Ok(())
}

fn write_wide(writer: &mut BandWriter, name: &str, values: &[u64]) -> Result<(), Error> {
    let hi: Vec<i32> = values.iter().map(|value| (value >> 32) as u32 as i32).collect();
    let lo: Vec<i32> = values.iter().map(|value| *value as u32 as i32).collect();
    writer.write_band(&format!("{}_hi", name), Coding::UDELTA5, &hi)?;
    writer.write_band(&format!("{}_lo", name), Coding::DELTA5, &lo)?;
    Ok(())
}

fn write_members(writer: &mut BandWriter, name: &str, members: &[MemberRef]) -> Result<(), Error> {
    writer.write_indices(
        &format!("{}_class", name),
        Coding::DELTA5,
        &indices(members, |member| member.class.index()),
    )?;
    writer.write_indices(
        &format!("{}_desc", name),
        Coding::UDELTA5,
        &indices(members, |member| member.descr.index()),
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::FormatError;
    use std::io::Cursor;

    fn round_trip(pool: &ConstantPool) -> ConstantPool {
        let mut writer = BandWriter::new();
        write(&mut writer, pool).unwrap();
        let mut reader = BandReader::new(Cursor::new(writer.bands().to_vec()));
        reader.set_band_headers(writer.band_headers().to_vec());
        read(&mut reader, &counts(pool)).unwrap()
    }

    #[test]
    fn pool_survives_bands() {
        let mut pool = ConstantPool::new();
        pool.utf8("abc");
        pool.utf8("ab");
        pool.utf8("abd");
        pool.utf8("\u{1F600} smile");
        pool.utf8(&"x".repeat(300));
        pool.utf8(&format!("{}y", "x".repeat(300)));
        pool.int(-5);
        pool.int(i32::MAX);
        pool.float(1.5f32.to_bits());
        pool.long(i64::MIN);
        pool.double((-0.25f64).to_bits());
        pool.string("hello");
        pool.method("java/lang/Object", "<init>", "()V");
        pool.field("pkg/A", "map", "Ljava/util/Map;");
        pool.imethod("java/util/List", "get", "(I)Ljava/lang/Object;");

        let read = round_trip(&pool);
        assert_eq!(read.utf8s(), pool.utf8s());
        assert_eq!(read.ints(), pool.ints());
        assert_eq!(read.floats(), pool.floats());
        assert_eq!(read.longs(), pool.longs());
        assert_eq!(read.doubles(), pool.doubles());
        assert_eq!(read.strings(), pool.strings());
        assert_eq!(read.classes(), pool.classes());
        assert_eq!(read.signatures(), pool.signatures());
        assert_eq!(read.descrs(), pool.descrs());
        assert_eq!(read.fields(), pool.fields());
        assert_eq!(read.methods(), pool.methods());
        assert_eq!(read.imethods(), pool.imethods());

        // Lookups work on a pool read back from bands
        assert!(read.find_class("java/util/List").is_some());
    }

    #[test]
    fn truncated_band() {
        let mut pool = ConstantPool::new();
        pool.utf8("some");
        pool.utf8("strings");
        let mut writer = BandWriter::new();
        write(&mut writer, &pool).unwrap();
        let bytes = writer.bands();

        let mut reader = BandReader::new(Cursor::new(bytes[..bytes.len() - 2].to_vec()));
        match read(&mut reader, &counts(&pool)) {
            Err(Error::Format(FormatError::UnexpectedEof { band })) => {
                assert!(band.starts_with("cp_Utf8"), "{}", band)
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unpaired_surrogate() {
        // Two strings: "" and a lone high surrogate
        let mut writer = BandWriter::new();
        writer.write_band("cp_Utf8_suffix", Coding::UNSIGNED5, &[1]).unwrap();
        writer.write_band("cp_Utf8_chars", Coding::CHAR3, &[0xD800]).unwrap();
        let mut reader = BandReader::new(Cursor::new(writer.bands().to_vec()));
        let counts = CpCounts {
            utf8: 2,
            ..CpCounts::default()
        };
        let read = read(&mut reader, &counts).unwrap();
        assert_eq!(read.unpaired_units(Utf8Id::from_index(1)), Some(&[0xD800][..]));
    }

    #[test]
    fn unpaired_surrogates_survive_bands() {
        let mut pool = ConstantPool::new();
        pool.string_utf16(&[0x78, 0xD800, 0x79]);
        pool.utf8("x\u{FFFD}y");
        pool.string_utf16(&[0x78, 0xDC00]);

        let read = round_trip(&pool);
        assert_eq!(read.utf8s(), pool.utf8s());
        assert_eq!(read.strings(), pool.strings());
        for index in 0..pool.utf8s().len() {
            let id = Utf8Id::from_index(index);
            assert_eq!(read.unpaired_units(id), pool.unpaired_units(id));
        }
    }

    #[test]
    fn dangling_class_name() {
        let mut writer = BandWriter::new();
        writer.write_band("cp_Class", Coding::UDELTA5, &[3]).unwrap();
        let mut reader = BandReader::new(Cursor::new(writer.bands().to_vec()));
        let counts = CpCounts {
            utf8: 1,
            class: 1,
            ..CpCounts::default()
        };
        assert!(matches!(
            read(&mut reader, &counts),
            Err(Error::Format(FormatError::DanglingIndex { index: 3, len: 1, .. }))
        ));
    }
}
