//! Pack200 codec for Java archives
//!
//! Pack200 transmits the class files of a JAR as a set of bands, with a single constant pool
//! shared by every class of a segment. This crate packs JARs into pack200 archives and unpacks
//! them back, reproducing the class files it packed byte for byte.

pub mod archive;
pub mod class_file;
pub mod codec;
pub mod cp;
pub mod errors;
pub mod model;
pub mod segment;
pub mod settings;
pub mod util;

pub use archive::{pack, repack, unpack};
pub use errors::{Error, FormatError};
pub use settings::{
    DeflateHint, ModificationTime, PackSettings, UnknownAttributeAction, UnpackSettings,
};
