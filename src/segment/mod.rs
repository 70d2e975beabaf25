//! Segments of a pack200 archive
//!
//! A segment is a header followed by bands, in a fixed order: constant pool, attribute
//! definitions, inner classes, classes, code, bytecode, and finally files. Each group of bands
//! has a module here with a `read` side and a `write` side. A segment is always decoded in full
//! before any class in it is turned back into a class file.

pub mod attr_definitions;
pub mod bc_bands;
mod builder;
pub mod class_bands;
pub mod code_bands;
pub mod cp_bands;
pub mod file_bands;
pub mod header;
pub mod ic_bands;
pub mod metadata_bands;

pub use builder::*;

use crate::class_file::{MethodAccessFlags, Version};
use crate::codec::{BandReader, BandWriter};
use crate::cp::{argument_slots, ConstantPool};
use crate::errors::Error;
use crate::model::{Class, Code, InnerClass, Method, MethodAttribute};
use bc_bands::CodeOwner;
use class_bands::ReadClasses;
use header::{ArchiveOptions, PackageVersion, SegmentHeader};
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Read, Write};

/// Decoded segment
#[derive(Debug)]
pub struct Segment {
    pub pool: ConstantPool,

    /// Segment-wide `InnerClasses` tuples
    pub inner_classes: Vec<InnerClass>,
    pub classes: Vec<Class>,

    /// Files in archive order, with classes standing in for their class files
    pub files: Vec<SegmentFile>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentFile {
    pub name: String,

    /// Seconds since the Unix epoch
    pub modtime: u32,
    pub deflate: bool,
    pub contents: FileContents,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileContents {
    Bytes(Vec<u8>),

    /// Index into the classes of the segment
    Class(usize),
}

impl SegmentFile {
    /// Number of bytes transmitted in the file bits
    pub fn size(&self) -> u64 {
        match &self.contents {
            FileContents::Bytes(bytes) => bytes.len() as u64,
            FileContents::Class(_) => 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Local slots taken by the arguments of a method, including `this`
fn argument_slots_of(pool: &ConstantPool, method: &Method) -> Result<usize, Error> {
    let slots = argument_slots(&pool.descr_type(method.descr))?;
    if method.access_flags.contains(MethodAccessFlags::STATIC) {
        Ok(slots)
    } else {
        Ok(slots + 1)
    }
}

fn code_owner(class: &Class) -> CodeOwner {
    CodeOwner {
        this_class: class.this_class,
        super_class: class.super_class,
    }
}

impl Segment {
    /// Read one segment
    ///
    /// Reading stops right after the last band of the segment, so further segments can be read
    /// from the same input.
    pub fn read<R: Read>(input: R) -> Result<Segment, Error> {
        let mut reader = BandReader::new(input);
        let header = SegmentHeader::read(&mut reader)?;
        log::info!(
            "Reading segment {}.{} with {} classes and {} files ({} bytes)",
            header.version.major,
            header.version.minor,
            header.class_count,
            header.file_count,
            header.archive_size
        );
        reader.set_band_headers(header.band_headers.clone());

        let mut pool = cp_bands::read(&mut reader, &header.cp_counts)?;
        attr_definitions::read(&mut reader, &pool, header.attribute_definition_count)?;
        let inner_classes = ic_bands::read(&mut reader, &mut pool, header.inner_class_count)?;
        let ReadClasses {
            mut classes,
            code_methods,
        } = class_bands::read(
            &mut reader,
            &mut pool,
            header.class_count,
            header.default_class_version,
            &inner_classes,
        )?;

        let mut slots = Vec::with_capacity(code_methods.len());
        let mut owners = Vec::with_capacity(code_methods.len());
        for (class, method) in &code_methods {
            let class = &classes[*class];
            slots.push(argument_slots_of(&pool, &class.methods[*method])?);
            owners.push(code_owner(class));
        }
        let all_code_flags = header.options.contains(ArchiveOptions::HAVE_ALL_CODE_FLAGS);
        let codes = code_bands::read(&mut reader, &pool, &slots, all_code_flags)?;
        let instructions = bc_bands::read(&mut reader, &pool, &owners)?;
        for ((code, instructions), (class, method)) in
            codes.into_iter().zip(instructions).zip(code_methods)
        {
            let code = Code {
                instructions,
                ..code
            };
            classes[class].methods[method]
                .attributes
                .insert(0, MethodAttribute::Code(code));
        }

        let files = file_bands::read(&mut reader, &pool, &header, &classes)?;
        Ok(Segment {
            pool,
            inner_classes,
            classes,
            files,
        })
    }

    /// Class version most classes have, which the others are recorded against
    fn default_class_version(&self) -> Version {
        let mut counts: HashMap<Version, usize> = HashMap::new();
        for class in &self.classes {
            *counts.entry(class.version).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by_key(|(version, count)| (*count, *version))
            .map_or(Version::JAVA6, |(version, _)| version)
    }

    pub fn write<W: Write>(&self, output: &mut W) -> Result<(), Error> {
        let pool = &self.pool;
        let default_version = self.default_class_version();

        let mut bands = BandWriter::new();
        cp_bands::write(&mut bands, pool)?;
        ic_bands::write(&mut bands, pool, &self.inner_classes)?;
        class_bands::write(
            &mut bands,
            pool,
            &self.classes,
            default_version,
            &self.inner_classes,
        )?;

        let mut codes = vec![];
        let mut instructions = vec![];
        for class in &self.classes {
            for method in &class.methods {
                if let Some(code) = method.code() {
                    let slots = argument_slots_of(pool, method)
                        .map_err(|err| Error::class_file(err.to_string()))?;
                    codes.push((code, slots));
                    instructions.push((code_owner(class), code.instructions.as_slice()));
                }
            }
        }
        code_bands::write(&mut bands, &codes)?;
        bc_bands::write(&mut bands, pool, &instructions)?;

        let archive_modtime = self.files.iter().map(|file| file.modtime).max().unwrap_or(0);
        let mut options = ArchiveOptions::HAVE_FILE_HEADERS
            | ArchiveOptions::HAVE_ALL_CODE_FLAGS
            | file_bands::options(&self.files, archive_modtime);
        file_bands::write(
            &mut bands,
            pool,
            &self.files,
            &self.classes,
            archive_modtime,
            options,
        )?;

        let cp_counts = cp_bands::counts(pool);
        if cp_counts.has_numbers() {
            options |= ArchiveOptions::HAVE_CP_NUMBERS;
        }
        if !bands.band_headers().is_empty() {
            options |= ArchiveOptions::HAVE_SPECIAL_FORMATS;
        }
        let header = SegmentHeader {
            version: PackageVersion::for_classes(self.classes.iter().map(|class| class.version)),
            options,
            archive_size: 0,
            next_count: 0,
            archive_modtime,
            file_count: self.files.len(),
            attribute_definition_count: 0,
            cp_counts,
            inner_class_count: self.inner_classes.len(),
            default_class_version: default_version,
            class_count: self.classes.len(),
            band_headers: bands.band_headers().to_vec(),
        };
        let segment = header.write_segment(bands.bands())?;
        log::info!(
            "Writing segment {}.{} with {} classes and {} files ({} bytes)",
            header.version.major,
            header.version.minor,
            header.class_count,
            header.file_count,
            segment.len()
        );
        output.write_all(&segment)?;
        Ok(())
    }

    /// Bytes of a file, turning classes back into class files
    pub fn contents<'a>(&self, file: &'a SegmentFile) -> Result<Cow<'a, [u8]>, Error> {
        match &file.contents {
            FileContents::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            FileContents::Class(index) => {
                let class = self.classes.get(*index).ok_or_else(|| {
                    Error::format(format!("file {} refers to missing class {}", file.name, index))
                })?;
                let class_file = class.to_class_file(&self.pool, &self.inner_classes)?;
                Ok(Cow::Owned(class_file.to_bytes()?))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::FormatError;
    use std::io::Cursor;

    #[test]
    fn empty_segment() {
        let segment = Segment {
            pool: ConstantPool::new(),
            inner_classes: vec![],
            classes: vec![],
            files: vec![],
        };
        let mut bytes = vec![];
        segment.write(&mut bytes).unwrap();
        assert_eq!(bytes[..4], header::MAGIC);

        let read = Segment::read(Cursor::new(&bytes)).unwrap();
        assert!(read.classes.is_empty());
        assert!(read.files.is_empty());
        assert_eq!(read.pool.utf8s(), &[String::new()]);
    }

    #[test]
    fn counts_beyond_the_input() {
        let huge = i32::MAX as usize;
        for (utf8, class_count) in [(huge, 0), (1, huge)] {
            let header = SegmentHeader {
                version: PackageVersion::JAVA5,
                options: ArchiveOptions::empty(),
                archive_size: 0,
                next_count: 0,
                archive_modtime: 0,
                file_count: 0,
                attribute_definition_count: 0,
                cp_counts: header::CpCounts {
                    utf8,
                    ..header::CpCounts::default()
                },
                inner_class_count: 0,
                default_class_version: Version::JAVA6,
                class_count,
                band_headers: vec![],
            };
            let bytes = header.write_segment(&[]).unwrap();
            match Segment::read(Cursor::new(bytes)) {
                Err(Error::Format(FormatError::UnexpectedEof { .. })) => (),
                other => panic!("unexpected {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn bad_magic() {
        let bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 7, 150];
        match Segment::read(Cursor::new(bytes)) {
            Err(Error::Format(FormatError::BadMagic(magic))) => {
                assert_eq!(magic, [0xCA, 0xFE, 0xBA, 0xBE])
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
