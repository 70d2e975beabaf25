//! Band codec
//!
//! A pack200 segment is mostly a sequence of *bands*: columns of integers which all have the same
//! meaning (eg. every superclass index, every opcode). Each band has a default coding from the
//! `(B, H, S, D)` family, which the first value of the band can override by escaping into the band
//! headers.

mod band;
mod canonical;
mod coding;
mod meta;

pub use band::*;
pub use canonical::*;
pub use coding::*;
pub use meta::*;
