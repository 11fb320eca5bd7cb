use std::fmt;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// The JVM measures both operand stacks and local variables in these terms: `long` and `double`
/// values take two slots while every other value takes one, yet the verifier pushes and pops them
/// as single values.
#[derive(Clone, PartialEq, Eq)]
pub struct OffsetVec<T> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec {
            entries: Vec::new(),
            offset_len: Offset(0),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the widths of all entries
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back, returning the offset it landed at
    pub fn push(&mut self, elem: T) -> Offset {
        let at = self.offset_len;
        self.offset_len = Offset(at.0 + elem.width());
        self.entries.push((at, elem));
        at
    }

    /// Remove the last entry, along with the offset it was at
    pub fn pop(&mut self) -> Option<(Offset, T)> {
        let (at, elem) = self.entries.pop()?;
        self.offset_len = at;
        Some((at, elem))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.offset_len = Offset(0);
    }

    /// Entry counting from the back (so `0` is the last element)
    pub fn get_from_back(&self, depth: usize) -> Option<&T> {
        let index = self.entries.len().checked_sub(depth + 1)?;
        Some(&self.entries[index].1)
    }

    /// Overwrite entries in place
    ///
    /// The replacement must have the same width as the value being replaced, otherwise the offsets
    /// of subsequent entries would be wrong. Entries for which `update` returns `None` are left
    /// untouched.
    pub fn replace_where(&mut self, mut update: impl FnMut(&T) -> Option<T>) {
        for (_, elem) in &mut self.entries {
            if let Some(replacement) = update(elem) {
                debug_assert_eq!(replacement.width(), elem.width());
                *elem = replacement;
            }
        }
    }

    /// Entries from front to back, with their offsets
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Offset, &T)> {
        self.entries.iter().map(|(at, elem)| (*at, elem))
    }
}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(elems: I) -> Self {
        let mut offset_vec = OffsetVec::new();
        for elem in elems {
            offset_vec.push(elem);
        }
        offset_vec
    }
}

impl<T: fmt::Debug> fmt::Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(at, elem)| (at.0, elem)))
            .finish()
    }
}
