use std::fmt::{Debug, Error, Formatter};
use std::iter::{Enumerate, FromIterator};
use std::result::Result;
use std::slice::Iter;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// Class files need this in two places:
///
///   - constant pool and indices (most entries have width 1, but `long` and `double` have width 2)
///   - method code, where instructions are addressed by their byte offset but pack200 addresses
///     them by their position in the method
///
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
        }
    }

    /// Length of the `OffsetVec` (aka. number of entries)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current offset size of the `OffsetVec` (aka. offset of the next element to be added)
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));

        offset
    }

    /// Get an entry (and its index) by its offset in the vector
    ///
    /// Note: this uses binary search to find the offset
    pub fn get_offset(&self, offset: Offset) -> OffsetResult<T> {
        match self.entries.binary_search_by_key(&offset, |(off, _)| *off) {
            Err(insert_at) if insert_at == self.entries.len() => OffsetResult::TooLarge,
            Err(insert_at) => OffsetResult::InvalidOffset(insert_at),
            Ok(found_idx) => OffsetResult::Ok(found_idx, &self.entries[found_idx].1),
        }
    }

    /// Offset at which the entry with this position starts
    ///
    /// The position one past the last entry maps to `offset_len`, so that exclusive end positions
    /// (eg. the end of an exception range covering the last instruction) can be looked up too.
    pub fn offset_of_index(&self, index: usize) -> Option<Offset> {
        if index == self.entries.len() {
            Some(self.offset_len)
        } else {
            self.entries.get(index).map(|(offset, _)| *offset)
        }
    }

    /// Position of the entry starting at exactly this offset
    ///
    /// Like `offset_of_index`, `offset_len` maps to the position one past the last entry.
    pub fn index_of_offset(&self, offset: Offset) -> Option<usize> {
        if offset == self.offset_len {
            Some(self.entries.len())
        } else {
            match self.get_offset(offset) {
                OffsetResult::Ok(idx, _) => Some(idx),
                OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => None,
            }
        }
    }

    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        self.into_iter()
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<A: Eq> Eq for OffsetVec<A> {}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

pub enum OffsetResult<'a, T> {
    /// Element was accessed
    Ok(usize, &'a T),

    /// Offset was invalid, and falls in the middle of the element at this index
    InvalidOffset(usize),

    /// Offset is too big
    TooLarge,
}

impl<'a, T> OffsetResult<'a, T> {
    /// Convert to an `Option` and keep only the value found
    pub fn ok(&self) -> Option<&'a T> {
        match self {
            OffsetResult::Ok(_, found) => Some(found),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => None,
        }
    }
}

/// Iterator for borrowed `OffsetVec`
pub struct OffsetVecIter<'a, T>(Enumerate<Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        OffsetVecIter(self.entries.iter().enumerate())
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        for elem in elems {
            offset_vec.push(elem);
        }
        offset_vec
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Pool entry: `long` and `double` take two slots
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Entry {
        Int(i32),
        Long(i64),
    }

    impl Width for Entry {
        fn width(&self) -> usize {
            match self {
                Entry::Int(_) => 1,
                Entry::Long(_) => 2,
            }
        }
    }

    /// Instruction of some encoded length
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    struct Insn(usize);

    impl Width for Insn {
        fn width(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn pool_slots() {
        let mut pool: OffsetVec<Entry> = OffsetVec::new_starting_at(Offset(1));
        assert_eq!(pool.push(Entry::Long(1)), Offset(1));
        assert_eq!(pool.push(Entry::Int(2)), Offset(3));
        assert_eq!(pool.push(Entry::Long(3)), Offset(4));
        assert_eq!(pool.offset_len(), Offset(6));

        assert_eq!(pool.get_offset(Offset(3)).ok(), Some(&Entry::Int(2)));
        assert_eq!(pool.get_offset(Offset(2)).ok(), None);
        assert!(matches!(pool.get_offset(Offset(9)), OffsetResult::TooLarge));
        assert_eq!(
            pool.iter().map(|(o, i, e)| (o, i, *e)).collect::<Vec<_>>(),
            vec![
                (Offset(1), 0, Entry::Long(1)),
                (Offset(3), 1, Entry::Int(2)),
                (Offset(4), 2, Entry::Long(3)),
            ]
        );
    }

    #[test]
    fn instruction_positions() {
        // aload_0, invokespecial, sipush, return
        let code: OffsetVec<Insn> = vec![Insn(1), Insn(3), Insn(3), Insn(1)]
            .into_iter()
            .collect();

        assert_eq!(code.offset_of_index(1), Some(Offset(1)));
        assert_eq!(code.offset_of_index(3), Some(Offset(7)));
        assert_eq!(code.offset_of_index(4), Some(Offset(8)));
        assert_eq!(code.offset_of_index(5), None);

        assert_eq!(code.index_of_offset(Offset(4)), Some(2));
        assert_eq!(code.index_of_offset(Offset(8)), Some(4));
        assert_eq!(code.index_of_offset(Offset(2)), None);
        assert_eq!(code.index_of_offset(Offset(12)), None);
    }
}
