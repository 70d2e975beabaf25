use std::error::Error as StdError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    ZipError(zip::result::ZipError),

    /// The pack200 stream is malformed
    Format(FormatError),

    /// Input is well formed but uses a feature this codec does not handle
    Unsupported(String),

    /// A class file handed to the packer could not be parsed
    ClassFile(String),

    /// Class carries an attribute the packer does not know how to transmit (only raised when the
    /// unknown attribute action is `error`)
    UnknownAttribute { class: String, attribute: String },

    /// Class file constant pool has more than 65535 slots
    ConstantPoolOverflow { class: String, slots: usize },

    /// Jump offset does not fit in the instruction which encodes it
    BranchOverflow { offset: usize, target: usize },
}

/// Errors in the pack200 stream itself
///
/// These are all fatal for the segment in which they occur.
#[derive(Debug)]
pub enum FormatError {
    /// Segment did not start with `CA FE D0 0D`
    BadMagic([u8; 4]),
    UnsupportedVersion { minor: u32, major: u32 },

    /// Input ended while decoding a band
    UnexpectedEof { band: String },

    /// Band value does not index into the table it refers to
    DanglingIndex { band: String, index: i64, len: usize },

    /// Coding specifier in a band header is not meaningful
    BadCoding(String),

    /// Reserved `StackMapTable` frame type (128 to 246)
    BadFrameType(u8),
    BadVerificationTag(u8),
    BadOpcode(u8),

    /// Instruction index has no entry in the method's offset table
    MissingBci { index: usize, len: usize },

    /// Value is outside of the range representable by the band's coding
    NotEncodable { value: i64, coding: String },

    Other(String),
}

impl Error {
    pub fn format(message: impl Into<String>) -> Self {
        Error::Format(FormatError::Other(message.into()))
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }

    pub fn class_file(message: impl Into<String>) -> Self {
        Error::ClassFile(message.into())
    }

    /// Whether this is a pack200 format error
    pub fn is_format_error(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    /// Whether the packer may pass the offending class through as a plain file
    pub fn is_passable(&self) -> bool {
        matches!(
            self,
            Error::Unsupported(_) | Error::UnknownAttribute { .. } | Error::ClassFile(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "IO error: {}", err),
            Error::ZipError(err) => write!(f, "JAR error: {}", err),
            Error::Format(err) => write!(f, "pack200 format error: {}", err),
            Error::Unsupported(what) => write!(f, "unsupported: {}", what),
            Error::ClassFile(what) => write!(f, "malformed class file: {}", what),
            Error::UnknownAttribute { class, attribute } => {
                write!(f, "unknown attribute '{}' in class '{}'", attribute, class)
            }
            Error::ConstantPoolOverflow { class, slots } => write!(
                f,
                "constant pool of '{}' needs {} slots (at most 65535 allowed)",
                class, slots
            ),
            Error::BranchOverflow { offset, target } => write!(
                f,
                "branch at offset {} cannot reach offset {}",
                offset, target
            ),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::BadMagic(found) => write!(f, "bad segment magic {:02x?}", found),
            FormatError::UnsupportedVersion { minor, major } => {
                write!(f, "unsupported archive version {}.{}", major, minor)
            }
            FormatError::UnexpectedEof { band } => {
                write!(f, "unexpected end of input in band {}", band)
            }
            FormatError::DanglingIndex { band, index, len } => write!(
                f,
                "index {} in band {} is out of bounds (length {})",
                index, band, len
            ),
            FormatError::BadCoding(what) => write!(f, "bad coding: {}", what),
            FormatError::BadFrameType(tag) => write!(f, "reserved stack map frame type {}", tag),
            FormatError::BadVerificationTag(tag) => {
                write!(f, "unknown verification type tag {}", tag)
            }
            FormatError::BadOpcode(opcode) => write!(f, "unknown opcode {}", opcode),
            FormatError::MissingBci { index, len } => write!(
                f,
                "instruction index {} has no bytecode offset (method has {} instructions)",
                index, len
            ),
            FormatError::NotEncodable { value, coding } => {
                write!(f, "value {} cannot be encoded with {}", value, coding)
            }
            FormatError::Other(message) => f.write_str(message),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::ZipError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Error {
        Error::ZipError(err)
    }
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Error {
        Error::Format(err)
    }
}
