use crate::class_file::Version;
use crate::codec::{BandReader, BandWriter, Coding};
use crate::errors::{Error, FormatError};
use bitflags::bitflags;
use std::io::Read;

/// Bytes at the start of every segment
pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xD0, 0x0D];

bitflags! {
    /// Archive options, from the segment header
    ///
    /// These decide which optional header fields and bands are present in the segment.
    pub struct ArchiveOptions: u32 {
        const HAVE_SPECIAL_FORMATS = 1 << 0;
        const HAVE_CP_NUMBERS = 1 << 1;
        const HAVE_ALL_CODE_FLAGS = 1 << 2;
        const HAVE_CP_EXTRAS = 1 << 3;
        const HAVE_FILE_HEADERS = 1 << 4;
        const DEFLATE_HINT = 1 << 5;
        const HAVE_FILE_MODTIME = 1 << 6;
        const HAVE_FILE_OPTIONS = 1 << 7;
        const HAVE_FILE_SIZE_HI = 1 << 8;
        const HAVE_CLASS_FLAGS_HI = 1 << 9;
        const HAVE_FIELD_FLAGS_HI = 1 << 10;
        const HAVE_METHOD_FLAGS_HI = 1 << 11;
        const HAVE_CODE_FLAGS_HI = 1 << 12;
    }
}

/// Version of the pack200 format
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackageVersion {
    pub major: u32,
    pub minor: u32,
}

impl PackageVersion {
    /// Enough for class files up to Java 5
    pub const JAVA5: PackageVersion = PackageVersion { major: 150, minor: 7 };

    /// Enough for class files up to Java 6
    pub const JAVA6: PackageVersion = PackageVersion { major: 160, minor: 1 };

    /// Enough for class files from Java 7 onwards
    pub const JAVA7: PackageVersion = PackageVersion { major: 170, minor: 1 };

    /// Same layout as `JAVA7`, with constant pool extras allowed
    pub const JAVA8: PackageVersion = PackageVersion { major: 171, minor: 0 };

    const SUPPORTED: [PackageVersion; 4] = [
        PackageVersion::JAVA5,
        PackageVersion::JAVA6,
        PackageVersion::JAVA7,
        PackageVersion::JAVA8,
    ];

    /// Oldest package version that can carry every one of these class file versions
    pub fn for_classes(versions: impl IntoIterator<Item = Version>) -> PackageVersion {
        let newest = versions
            .into_iter()
            .map(|version| version.major_version)
            .max()
            .unwrap_or(0);
        if newest < 50 {
            PackageVersion::JAVA5
        } else if newest == 50 {
            PackageVersion::JAVA6
        } else {
            PackageVersion::JAVA7
        }
    }
}

/// Number of entries in each constant pool category
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CpCounts {
    pub utf8: usize,
    pub int: usize,
    pub float: usize,
    pub long: usize,
    pub double: usize,
    pub string: usize,
    pub class: usize,
    pub signature: usize,
    pub descr: usize,
    pub field: usize,
    pub method: usize,
    pub imethod: usize,
}

impl CpCounts {
    pub fn has_numbers(&self) -> bool {
        self.int + self.float + self.long + self.double > 0
    }
}

/// Segment header
///
/// The header is a sequence of `UNSIGNED5` values, some of which are only present with certain
/// archive options, followed by the band header bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentHeader {
    pub version: PackageVersion,
    pub options: ArchiveOptions,

    /// Number of bytes in the segment after the archive size fields (0 if unknown)
    pub archive_size: u64,

    /// Number of segments that follow, if known
    pub next_count: u32,

    /// Seconds since the Unix epoch, which file modification times are relative to
    pub archive_modtime: u32,
    pub file_count: usize,
    pub attribute_definition_count: usize,
    pub cp_counts: CpCounts,
    pub inner_class_count: usize,

    /// Version given to class files that do not override it
    pub default_class_version: Version,
    pub class_count: usize,
    pub band_headers: Vec<u8>,
}

impl SegmentHeader {
    pub fn read<R: Read>(reader: &mut BandReader<R>) -> Result<SegmentHeader, Error> {
        let magic = reader.read_bytes("archive_magic", 4)?;
        if magic != MAGIC {
            return Err(Error::Format(FormatError::BadMagic([
                magic[0], magic[1], magic[2], magic[3],
            ])));
        }

        let minor = read_u32(reader, "archive_minver")?;
        let major = read_u32(reader, "archive_majver")?;
        let version = PackageVersion { major, minor };
        if !PackageVersion::SUPPORTED.contains(&version) {
            return Err(Error::Format(FormatError::UnsupportedVersion { minor, major }));
        }

        let raw_options = read_u32(reader, "archive_options")?;
        let options = ArchiveOptions::from_bits(raw_options).ok_or_else(|| {
            Error::format(format!("unknown archive options {:#x}", raw_options))
        })?;
        if options.contains(ArchiveOptions::HAVE_CP_EXTRAS) {
            return Err(Error::unsupported("constant pool extras"));
        }
        let flags_hi = ArchiveOptions::HAVE_CLASS_FLAGS_HI
            | ArchiveOptions::HAVE_FIELD_FLAGS_HI
            | ArchiveOptions::HAVE_METHOD_FLAGS_HI
            | ArchiveOptions::HAVE_CODE_FLAGS_HI;
        if options.intersects(flags_hi) {
            return Err(Error::unsupported("high attribute flag words"));
        }

        let mut header = SegmentHeader {
            version,
            options,
            archive_size: 0,
            next_count: 0,
            archive_modtime: 0,
            file_count: 0,
            attribute_definition_count: 0,
            cp_counts: CpCounts::default(),
            inner_class_count: 0,
            default_class_version: Version {
                minor_version: 0,
                major_version: 0,
            },
            class_count: 0,
            band_headers: vec![],
        };

        if options.contains(ArchiveOptions::HAVE_FILE_HEADERS) {
            let size_hi = read_u32(reader, "archive_size_hi")? as u64;
            let size_lo = read_u32(reader, "archive_size_lo")? as u64;
            header.archive_size = size_hi << 32 | size_lo;
            header.next_count = read_u32(reader, "archive_next_count")?;
            header.archive_modtime = read_u32(reader, "archive_modtime")?;
            header.file_count = reader.read_count("file_count")?;
        }

        let mut band_headers_size = 0;
        if options.contains(ArchiveOptions::HAVE_SPECIAL_FORMATS) {
            band_headers_size = reader.read_count("band_headers_size")?;
            header.attribute_definition_count = reader.read_count("attr_definition_count")?;
        }

        let counts = &mut header.cp_counts;
        counts.utf8 = reader.read_count("cp_Utf8_count")?;
        if options.contains(ArchiveOptions::HAVE_CP_NUMBERS) {
            counts.int = reader.read_count("cp_Int_count")?;
            counts.float = reader.read_count("cp_Float_count")?;
            counts.long = reader.read_count("cp_Long_count")?;
            counts.double = reader.read_count("cp_Double_count")?;
        }
        counts.string = reader.read_count("cp_String_count")?;
        counts.class = reader.read_count("cp_Class_count")?;
        counts.signature = reader.read_count("cp_Signature_count")?;
        counts.descr = reader.read_count("cp_Descr_count")?;
        counts.field = reader.read_count("cp_Field_count")?;
        counts.method = reader.read_count("cp_Method_count")?;
        counts.imethod = reader.read_count("cp_Imethod_count")?;

        header.inner_class_count = reader.read_count("ic_count")?;
        header.default_class_version = Version {
            minor_version: read_u16(reader, "default_class_minver")?,
            major_version: read_u16(reader, "default_class_majver")?,
        };
        header.class_count = reader.read_count("class_count")?;
        header.band_headers = reader.read_bytes("band_headers", band_headers_size)?;

        log::debug!(
            "Segment header: version {}.{}, options {:?}, {} classes, {} files",
            header.version.major,
            header.version.minor,
            header.options,
            header.class_count,
            header.file_count
        );
        Ok(header)
    }

    /// Write the header, followed by the band headers and the bands themselves
    ///
    /// The archive size is computed here, so `archive_size` is ignored.
    pub fn write_segment(&self, bands: &[u8]) -> Result<Vec<u8>, Error> {
        let options = self.options;

        let mut prefix = BandWriter::new();
        prefix.write_bytes(&MAGIC)?;
        prefix.write_value(Coding::UNSIGNED5, self.version.minor as i32)?;
        prefix.write_value(Coding::UNSIGNED5, self.version.major as i32)?;
        prefix.write_value(Coding::UNSIGNED5, options.bits() as i32)?;

        let mut rest = BandWriter::new();
        if options.contains(ArchiveOptions::HAVE_FILE_HEADERS) {
            rest.write_value(Coding::UNSIGNED5, self.next_count as i32)?;
            rest.write_value(Coding::UNSIGNED5, self.archive_modtime as i32)?;
            rest.write_count(self.file_count)?;
        }
        if options.contains(ArchiveOptions::HAVE_SPECIAL_FORMATS) {
            rest.write_count(self.band_headers.len())?;
            rest.write_count(self.attribute_definition_count)?;
        }

        let counts = &self.cp_counts;
        rest.write_count(counts.utf8)?;
        if options.contains(ArchiveOptions::HAVE_CP_NUMBERS) {
            rest.write_count(counts.int)?;
            rest.write_count(counts.float)?;
            rest.write_count(counts.long)?;
            rest.write_count(counts.double)?;
        } else if counts.has_numbers() {
            return Err(Error::format("numeric constants need the cp numbers option"));
        }
        rest.write_count(counts.string)?;
        rest.write_count(counts.class)?;
        rest.write_count(counts.signature)?;
        rest.write_count(counts.descr)?;
        rest.write_count(counts.field)?;
        rest.write_count(counts.method)?;
        rest.write_count(counts.imethod)?;

        rest.write_count(self.inner_class_count)?;
        rest.write_value(
            Coding::UNSIGNED5,
            self.default_class_version.minor_version as i32,
        )?;
        rest.write_value(
            Coding::UNSIGNED5,
            self.default_class_version.major_version as i32,
        )?;
        rest.write_count(self.class_count)?;
        rest.write_bytes(&self.band_headers)?;

        let mut output = prefix.bands().to_vec();
        if options.contains(ArchiveOptions::HAVE_FILE_HEADERS) {
            let archive_size = (rest.bands().len() + bands.len()) as u64;
            let mut sizes = BandWriter::new();
            sizes.write_value(Coding::UNSIGNED5, (archive_size >> 32) as u32 as i32)?;
            sizes.write_value(Coding::UNSIGNED5, archive_size as u32 as i32)?;
            output.extend_from_slice(sizes.bands());
        }
        output.extend_from_slice(rest.bands());
        output.extend_from_slice(bands);
        Ok(output)
    }
}

fn read_u32<R: Read>(reader: &mut BandReader<R>, name: &str) -> Result<u32, Error> {
    reader
        .read_value(name, Coding::UNSIGNED5)
        .map(|value| value as u32)
}

fn read_u16<R: Read>(reader: &mut BandReader<R>, name: &str) -> Result<u16, Error> {
    let value = read_u32(reader, name)?;
    u16::try_from(value).map_err(|_| Error::format(format!("{} {} is too large", name, value)))
}
