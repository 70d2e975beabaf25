//! The canonical coding table
//!
//! Band headers refer to commonly used codings by their position in this table (1 to 115). Index
//! 0 is reserved for "the default coding of the band".

use super::Coding;

/// Number of entries in the canonical table
pub const CANONICAL_COUNT: usize = 115;

static CANONICAL: [Coding; CANONICAL_COUNT] = [
    Coding::unchecked(1, 256, 0, false),
    Coding::unchecked(1, 256, 1, false),
    Coding::unchecked(1, 256, 0, true),
    Coding::unchecked(1, 256, 1, true),
    Coding::unchecked(2, 256, 0, false),
    Coding::unchecked(2, 256, 1, false),
    Coding::unchecked(2, 256, 0, true),
    Coding::unchecked(2, 256, 1, true),
    Coding::unchecked(3, 256, 0, false),
    Coding::unchecked(3, 256, 1, false),
    Coding::unchecked(3, 256, 0, true),
    Coding::unchecked(3, 256, 1, true),
    Coding::unchecked(4, 256, 0, false),
    Coding::unchecked(4, 256, 1, false),
    Coding::unchecked(4, 256, 0, true),
    Coding::unchecked(4, 256, 1, true),
    Coding::unchecked(5, 4, 0, false),
    Coding::unchecked(5, 4, 1, false),
    Coding::unchecked(5, 4, 2, false),
    Coding::unchecked(5, 16, 0, false),
    Coding::unchecked(5, 16, 1, false),
    Coding::unchecked(5, 16, 2, false),
    Coding::unchecked(5, 32, 0, false),
    Coding::unchecked(5, 32, 1, false),
    Coding::unchecked(5, 32, 2, false),
    Coding::unchecked(5, 64, 0, false),
    Coding::unchecked(5, 64, 1, false),
    Coding::unchecked(5, 64, 2, false),
    Coding::unchecked(5, 128, 0, false),
    Coding::unchecked(5, 128, 1, false),
    Coding::unchecked(5, 128, 2, false),
    Coding::unchecked(5, 4, 0, true),
    Coding::unchecked(5, 4, 1, true),
    Coding::unchecked(5, 4, 2, true),
    Coding::unchecked(5, 16, 0, true),
    Coding::unchecked(5, 16, 1, true),
    Coding::unchecked(5, 16, 2, true),
    Coding::unchecked(5, 32, 0, true),
    Coding::unchecked(5, 32, 1, true),
    Coding::unchecked(5, 32, 2, true),
    Coding::unchecked(5, 64, 0, true),
    Coding::unchecked(5, 64, 1, true),
    Coding::unchecked(5, 64, 2, true),
    Coding::unchecked(5, 128, 0, true),
    Coding::unchecked(5, 128, 1, true),
    Coding::unchecked(5, 128, 2, true),
    Coding::unchecked(2, 192, 0, false),
    Coding::unchecked(2, 224, 0, false),
    Coding::unchecked(2, 240, 0, false),
    Coding::unchecked(2, 248, 0, false),
    Coding::unchecked(2, 252, 0, false),
    Coding::unchecked(2, 8, 0, true),
    Coding::unchecked(2, 8, 1, true),
    Coding::unchecked(2, 16, 0, true),
    Coding::unchecked(2, 16, 1, true),
    Coding::unchecked(2, 32, 0, true),
    Coding::unchecked(2, 32, 1, true),
    Coding::unchecked(2, 64, 0, true),
    Coding::unchecked(2, 64, 1, true),
    Coding::unchecked(2, 128, 0, true),
    Coding::unchecked(2, 128, 1, true),
    Coding::unchecked(2, 192, 0, true),
    Coding::unchecked(2, 192, 1, true),
    Coding::unchecked(2, 224, 0, true),
    Coding::unchecked(2, 224, 1, true),
    Coding::unchecked(2, 240, 0, true),
    Coding::unchecked(2, 240, 1, true),
    Coding::unchecked(2, 248, 0, true),
    Coding::unchecked(2, 248, 1, true),
    Coding::unchecked(3, 192, 0, false),
    Coding::unchecked(3, 224, 0, false),
    Coding::unchecked(3, 240, 0, false),
    Coding::unchecked(3, 248, 0, false),
    Coding::unchecked(3, 252, 0, false),
    Coding::unchecked(3, 8, 0, true),
    Coding::unchecked(3, 8, 1, true),
    Coding::unchecked(3, 16, 0, true),
    Coding::unchecked(3, 16, 1, true),
    Coding::unchecked(3, 32, 0, true),
    Coding::unchecked(3, 32, 1, true),
    Coding::unchecked(3, 64, 0, true),
    Coding::unchecked(3, 64, 1, true),
    Coding::unchecked(3, 128, 0, true),
    Coding::unchecked(3, 128, 1, true),
    Coding::unchecked(3, 192, 0, true),
    Coding::unchecked(3, 192, 1, true),
    Coding::unchecked(3, 224, 0, true),
    Coding::unchecked(3, 224, 1, true),
    Coding::unchecked(3, 240, 0, true),
    Coding::unchecked(3, 240, 1, true),
    Coding::unchecked(3, 248, 0, true),
    Coding::unchecked(3, 248, 1, true),
    Coding::unchecked(4, 192, 0, false),
    Coding::unchecked(4, 224, 0, false),
    Coding::unchecked(4, 240, 0, false),
    Coding::unchecked(4, 248, 0, false),
    Coding::unchecked(4, 252, 0, false),
    Coding::unchecked(4, 8, 0, true),
    Coding::unchecked(4, 8, 1, true),
    Coding::unchecked(4, 16, 0, true),
    Coding::unchecked(4, 16, 1, true),
    Coding::unchecked(4, 32, 0, true),
    Coding::unchecked(4, 32, 1, true),
    Coding::unchecked(4, 64, 0, true),
    Coding::unchecked(4, 64, 1, true),
    Coding::unchecked(4, 128, 0, true),
    Coding::unchecked(4, 128, 1, true),
    Coding::unchecked(4, 192, 0, true),
    Coding::unchecked(4, 192, 1, true),
    Coding::unchecked(4, 224, 0, true),
    Coding::unchecked(4, 224, 1, true),
    Coding::unchecked(4, 240, 0, true),
    Coding::unchecked(4, 240, 1, true),
    Coding::unchecked(4, 248, 0, true),
    Coding::unchecked(4, 248, 1, true),
];

/// Canonical coding at this index
pub fn canonical_coding(index: usize) -> Option<Coding> {
    if index == 0 {
        None
    } else {
        CANONICAL.get(index - 1).copied()
    }
}

/// Index of this coding in the canonical table
pub fn canonical_index(coding: Coding) -> Option<usize> {
    CANONICAL
        .iter()
        .position(|canonical| *canonical == coding)
        .map(|idx| idx + 1)
}
