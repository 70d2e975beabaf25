use super::{Parse, Serialize};
use byteorder::WriteBytesExt;
use std::io::{Read, Result};

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 5
    pub const JAVA5: Version = Version {
        minor_version: 0,
        major_version: 49,
    };

    /// JVM class file version corresponding to Java SE 6, the first with `StackMapTable`
    pub const JAVA6: Version = Version {
        minor_version: 0,
        major_version: 50,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Version {
    fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let minor_version = u16::parse(reader)?;
        let major_version = u16::parse(reader)?;
        Ok(Version {
            minor_version,
            major_version,
        })
    }
}
