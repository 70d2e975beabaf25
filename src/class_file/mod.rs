//! Reading and writing of JVM class files
//!
//! Class files are parsed into a fairly raw form here (attributes stay as bytes until their name
//! has been looked up), which is then turned into the segment model by `crate::model`.

mod access_flags;
mod annotation;
mod attribute;
mod bytecode;
mod class;
mod constants;
mod parse;
mod serialize;
mod stack_map;
mod version;

pub use access_flags::*;
pub use annotation::*;
pub use attribute::*;
pub use bytecode::*;
pub use class::*;
pub use constants::*;
pub use parse::*;
pub use serialize::*;
pub use stack_map::*;
pub use version::*;
