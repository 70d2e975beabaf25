use crate::errors::Error;
use std::str::FromStr;

pub struct PackSettings {
    /// Wrap the pack200 stream in gzip
    pub gzip: bool,

    /// Approximate number of input bytes per segment, or `None` to put everything in one segment
    ///
    /// Segments are decoded one at a time, so smaller segments need less memory to unpack but
    /// compress less well (each segment carries its own constant pool).
    pub segment_limit: Option<usize>,

    /// What to do with classes carrying attributes the packer cannot transmit
    pub unknown_attribute: UnknownAttributeAction,

    /// Drop `SourceFile`, `LineNumberTable`, `LocalVariableTable`, and `LocalVariableTypeTable`
    pub strip_debug: bool,

    /// Whether files get the deflate hint
    pub deflate_hint: DeflateHint,

    /// Whether files keep their own modification times
    pub modification_time: ModificationTime,
}

impl Default for PackSettings {
    fn default() -> Self {
        PackSettings {
            gzip: true,
            segment_limit: Some(PackSettings::DEFAULT_SEGMENT_LIMIT),
            unknown_attribute: UnknownAttributeAction::Pass,
            strip_debug: false,
            deflate_hint: DeflateHint::Keep,
            modification_time: ModificationTime::Keep,
        }
    }
}

impl PackSettings {
    pub const DEFAULT_SEGMENT_LIMIT: usize = 1_000_000;
}

pub struct UnpackSettings {
    /// Override the deflate hints recorded in the archive
    pub deflate_hint: DeflateHint,
}

impl Default for UnpackSettings {
    fn default() -> Self {
        UnpackSettings {
            deflate_hint: DeflateHint::Keep,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnknownAttributeAction {
    /// Fail the whole operation
    Error,

    /// Drop the attribute and pack the rest of the class
    Strip,

    /// Transmit the class file unchanged, as a plain file
    Pass,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeflateHint {
    /// Use whatever was recorded for each file
    Keep,
    True,
    False,
}

impl DeflateHint {
    /// Resolve the hint for a file which records `deflated`
    pub fn apply(self, deflated: bool) -> bool {
        match self {
            DeflateHint::Keep => deflated,
            DeflateHint::True => true,
            DeflateHint::False => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModificationTime {
    Keep,

    /// Give every file the latest modification time in its segment
    Latest,
}

macro_rules! from_str_choices {
    ($name:ident { $($text:literal => $variant:ident),* $(,)? }) => {
        impl $name {
            pub const CHOICES: &'static [&'static str] = &[$($text),*];
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Error> {
                match s {
                    $($text => Ok($name::$variant),)*
                    other => Err(Error::unsupported(format!(
                        "'{}' is not one of {:?}",
                        other,
                        $name::CHOICES
                    ))),
                }
            }
        }
    };
}

from_str_choices!(UnknownAttributeAction {
    "error" => Error,
    "strip" => Strip,
    "pass" => Pass,
});

from_str_choices!(DeflateHint {
    "keep" => Keep,
    "true" => True,
    "false" => False,
});

from_str_choices!(ModificationTime {
    "keep" => Keep,
    "latest" => Latest,
});
