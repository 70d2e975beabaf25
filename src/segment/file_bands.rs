use super::header::{ArchiveOptions, SegmentHeader};
use super::{FileContents, SegmentFile};
use crate::codec::{capacity_for, BandReader, BandWriter, Coding};
use crate::cp::ConstantPool;
use crate::errors::Error;
use crate::model::Class;
use std::io::Read;

/// File option bit: the file should be stored deflated
const DEFLATE: u32 = 1 << 0;

/// File option bit: the file is the class at the next class index
const CLASS_STUB: u32 = 1 << 1;

/// Name of the file a class ends up in when it is not given one
pub fn class_file_name(class_name: &str) -> String {
    format!("{}.class", class_name)
}

pub fn read<R: Read>(
    reader: &mut BandReader<R>,
    pool: &ConstantPool,
    header: &SegmentHeader,
    classes: &[Class],
) -> Result<Vec<SegmentFile>, Error> {
    let count = header.file_count;
    let options = header.options;
    let names = reader.read_band("file_name", Coding::UNSIGNED5, count)?;
    let sizes_hi = if options.contains(ArchiveOptions::HAVE_FILE_SIZE_HI) {
        reader.read_band("file_size_hi", Coding::UNSIGNED5, count)?
    } else {
        vec![0; count]
    };
    let sizes_lo = reader.read_band("file_size_lo", Coding::UNSIGNED5, count)?;
    let modtimes = if options.contains(ArchiveOptions::HAVE_FILE_MODTIME) {
        reader.read_band("file_modtime", Coding::DELTA5, count)?
    } else {
        vec![0; count]
    };
    let file_options = if options.contains(ArchiveOptions::HAVE_FILE_OPTIONS) {
        reader.read_band("file_options", Coding::UNSIGNED5, count)?
    } else {
        vec![0; count]
    };
    let deflate_hint = options.contains(ArchiveOptions::DEFLATE_HINT);

    let mut files = Vec::with_capacity(capacity_for(count + classes.len()));
    let mut sizes = Vec::with_capacity(capacity_for(count));
    let mut next_class = 0;
    for index in 0..count {
        let file_options = file_options[index] as u32;
        if file_options & !(DEFLATE | CLASS_STUB) != 0 {
            return Err(Error::unsupported(format!(
                "file options {:#x}",
                file_options
            )));
        }
        let size = (sizes_hi[index] as u32 as u64) << 32 | sizes_lo[index] as u32 as u64;
        let name = pool.utf8_str(pool.utf8_id("file_name", names[index])?);

        let (name, contents) = if file_options & CLASS_STUB != 0 {
            let class = classes.get(next_class).ok_or_else(|| {
                Error::format(format!("class stub {} without a class", name))
            })?;
            if size != 0 {
                return Err(Error::format(format!("class stub {} has contents", name)));
            }
            let name = if name.is_empty() {
                class_file_name(class.name(pool))
            } else {
                name.to_owned()
            };
            next_class += 1;
            (name, FileContents::Class(next_class - 1))
        } else {
            (name.to_owned(), FileContents::Bytes(vec![]))
        };
        sizes.push(size);
        files.push(SegmentFile {
            name,
            modtime: header.archive_modtime.wrapping_add(modtimes[index] as u32),
            deflate: deflate_hint || file_options & DEFLATE != 0,
            contents,
        });
    }

    for (file, size) in files.iter_mut().zip(sizes) {
        if let FileContents::Bytes(bytes) = &mut file.contents {
            let size = usize::try_from(size)
                .map_err(|_| Error::format(format!("file {} is too large", file.name)))?;
            *bytes = reader.read_bytes("file_bits", size)?;
        }
    }

    for (index, class) in classes.iter().enumerate().skip(next_class) {
        files.push(SegmentFile {
            name: class_file_name(class.name(pool)),
            modtime: header.archive_modtime,
            deflate: deflate_hint,
            contents: FileContents::Class(index),
        });
    }

    log::debug!("Read {} files", files.len());
    Ok(files)
}

/// Archive options needed to transmit these files
pub fn options(files: &[SegmentFile], archive_modtime: u32) -> ArchiveOptions {
    let mut options = ArchiveOptions::empty();
    if !files.is_empty() && files.iter().all(|file| file.deflate) {
        options |= ArchiveOptions::DEFLATE_HINT;
    }
    let any_stub = files
        .iter()
        .any(|file| matches!(file.contents, FileContents::Class(_)));
    let any_deflate = files.iter().any(|file| file.deflate);
    if any_stub || (any_deflate && !options.contains(ArchiveOptions::DEFLATE_HINT)) {
        options |= ArchiveOptions::HAVE_FILE_OPTIONS;
    }
    if files.iter().any(|file| file.modtime != archive_modtime) {
        options |= ArchiveOptions::HAVE_FILE_MODTIME;
    }
    if files.iter().any(|file| file.size() > u32::MAX as u64) {
        options |= ArchiveOptions::HAVE_FILE_SIZE_HI;
    }
    options
}

/// Write the file bands, for the options computed by `options`
pub fn write(
    writer: &mut BandWriter,
    pool: &ConstantPool,
    files: &[SegmentFile],
    classes: &[Class],
    archive_modtime: u32,
    options: ArchiveOptions,
) -> Result<(), Error> {
    let mut names = vec![];
    let mut sizes_hi = vec![];
    let mut sizes_lo = vec![];
    let mut modtimes = vec![];
    let mut file_options = vec![];
    let mut next_class = 0;
    for file in files {
        let mut name = file.name.as_str();
        let mut file_option = 0;
        if let FileContents::Class(index) = file.contents {
            if index != next_class {
                return Err(Error::format(format!(
                    "file {} refers to class {} out of order",
                    file.name, index
                )));
            }
            let class = classes
                .get(index)
                .ok_or_else(|| Error::format(format!("file {} has no class", file.name)))?;
            if file.name == class_file_name(class.name(pool)) {
                name = "";
            }
            file_option |= CLASS_STUB;
            next_class += 1;
        }
        if file.deflate && !options.contains(ArchiveOptions::DEFLATE_HINT) {
            file_option |= DEFLATE;
        }

        let name = pool
            .find_utf8(name)
            .ok_or_else(|| Error::format(format!("file name {} is not in the pool", name)))?;
        names.push(name.index());
        let size = file.size();
        sizes_hi.push((size >> 32) as u32 as i32);
        sizes_lo.push(size as u32 as i32);
        modtimes.push(file.modtime.wrapping_sub(archive_modtime) as i32);
        file_options.push(file_option as i32);
    }

    writer.write_indices("file_name", Coding::UNSIGNED5, &names)?;
    if options.contains(ArchiveOptions::HAVE_FILE_SIZE_HI) {
        writer.write_band("file_size_hi", Coding::UNSIGNED5, &sizes_hi)?;
    }
    writer.write_band("file_size_lo", Coding::UNSIGNED5, &sizes_lo)?;
    if options.contains(ArchiveOptions::HAVE_FILE_MODTIME) {
        writer.write_band("file_modtime", Coding::DELTA5, &modtimes)?;
    }
    if options.contains(ArchiveOptions::HAVE_FILE_OPTIONS) {
        writer.write_band("file_options", Coding::UNSIGNED5, &file_options)?;
    }
    for file in files {
        if let FileContents::Bytes(bytes) = &file.contents {
            writer.write_bytes(bytes)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::class_file::{ClassAccessFlags, Version};
    use crate::segment::header::{CpCounts, PackageVersion};
    use std::io::Cursor;

    fn class(pool: &mut ConstantPool, name: &str) -> Class {
        Class {
            version: Version::JAVA8,
            access_flags: ClassAccessFlags::PUBLIC,
            this_class: pool.class(name),
            super_class: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            inner_classes: None,
        }
    }

    fn header(file_count: usize, archive_modtime: u32, options: ArchiveOptions) -> SegmentHeader {
        SegmentHeader {
            version: PackageVersion::JAVA7,
            options,
            archive_size: 0,
            next_count: 0,
            archive_modtime,
            file_count,
            attribute_definition_count: 0,
            cp_counts: CpCounts::default(),
            inner_class_count: 0,
            default_class_version: Version::JAVA8,
            class_count: 0,
            band_headers: vec![],
        }
    }

    fn round_trip(pool: &ConstantPool, files: &[SegmentFile], classes: &[Class]) -> Vec<SegmentFile> {
        let archive_modtime = files.iter().map(|file| file.modtime).max().unwrap_or(0);
        let options = options(files, archive_modtime);
        let mut writer = BandWriter::new();
        write(&mut writer, pool, files, classes, archive_modtime, options).unwrap();

        let mut reader = BandReader::new(Cursor::new(writer.bands().to_vec()));
        reader.set_band_headers(writer.band_headers().to_vec());
        let header = header(files.len(), archive_modtime, options);
        read(&mut reader, pool, &header, classes).unwrap()
    }

    #[test]
    fn files_and_stubs() {
        let mut pool = ConstantPool::new();
        let classes = vec![class(&mut pool, "pkg/A"), class(&mut pool, "pkg/B")];
        pool.utf8("META-INF/MANIFEST.MF");
        pool.utf8("META-INF/");
        pool.utf8("renamed/B.class");

        let files = vec![
            SegmentFile {
                name: "META-INF/".to_owned(),
                modtime: 1_000,
                deflate: false,
                contents: FileContents::Bytes(vec![]),
            },
            SegmentFile {
                name: "META-INF/MANIFEST.MF".to_owned(),
                modtime: 1_200,
                deflate: true,
                contents: FileContents::Bytes(b"Manifest-Version: 1.0\r\n".to_vec()),
            },
            SegmentFile {
                name: "pkg/A.class".to_owned(),
                modtime: 1_100,
                deflate: true,
                contents: FileContents::Class(0),
            },
            SegmentFile {
                name: "renamed/B.class".to_owned(),
                modtime: 1_200,
                deflate: false,
                contents: FileContents::Class(1),
            },
        ];
        assert_eq!(
            options(&files, 1_200),
            ArchiveOptions::HAVE_FILE_OPTIONS | ArchiveOptions::HAVE_FILE_MODTIME
        );
        assert_eq!(round_trip(&pool, &files, &classes), files);
    }

    #[test]
    fn unlisted_classes_get_derived_names() {
        let mut pool = ConstantPool::new();
        let classes = vec![class(&mut pool, "pkg/A")];
        let files = vec![];

        let decoded = round_trip(&pool, &files, &classes);
        assert_eq!(
            decoded,
            vec![SegmentFile {
                name: "pkg/A.class".to_owned(),
                modtime: 0,
                deflate: false,
                contents: FileContents::Class(0),
            }]
        );
    }

    #[test]
    fn deflate_hint_covers_every_file() {
        let mut pool = ConstantPool::new();
        pool.utf8("a.txt");
        let files = vec![SegmentFile {
            name: "a.txt".to_owned(),
            modtime: 5,
            deflate: true,
            contents: FileContents::Bytes(b"abc".to_vec()),
        }];
        assert_eq!(options(&files, 5), ArchiveOptions::DEFLATE_HINT);
        assert_eq!(round_trip(&pool, &files, &[]), files);
    }

    #[test]
    fn stub_without_class() {
        let pool = ConstantPool::new();
        let mut writer = BandWriter::new();
        writer.write_band("file_name", Coding::UNSIGNED5, &[0]).unwrap();
        writer.write_band("file_size_lo", Coding::UNSIGNED5, &[0]).unwrap();
        writer
            .write_band("file_options", Coding::UNSIGNED5, &[CLASS_STUB as i32])
            .unwrap();

        let mut reader = BandReader::new(Cursor::new(writer.bands().to_vec()));
        let header = header(1, 0, ArchiveOptions::HAVE_FILE_OPTIONS);
        assert!(read(&mut reader, &pool, &header, &[])
            .unwrap_err()
            .is_format_error());
    }
}
