use super::{error::TreeError, fast::FastIter, walk::LeafWalk};
use crate::storage::KvPair;

// TREE ITERATOR
// ================================================================================================

/// Ordered cursor over the entries of a tree within a half-open key range.
///
/// Iterators created on the head of a [`MutableTree`](super::MutableTree) with a live fast cache
/// read the fast cache; all others walk the tree. Both observe the tree as of their creation.
///
/// The cursor starts positioned on the first entry. It can be driven either through
/// [`valid`](Self::valid) / [`advance`](Self::advance) / [`key`](Self::key) /
/// [`value`](Self::value), or as a standard [`Iterator`] of `(key, value)` pairs.
///
/// Once an error occurs the cursor becomes invalid and [`error`](Self::error) reports it. When
/// driven as an [`Iterator`], the error is yielded once as an `Err` item and then cleared.
pub struct TreeIterator<'a> {
    source: Source<'a>,
    current: Option<KvPair>,
    error: Option<TreeError>,
}

enum Source<'a> {
    Fast(FastIter<'a>),
    Slow(LeafWalk<'a>),
    Closed,
}

impl<'a> TreeIterator<'a> {
    pub(crate) fn fast(inner: FastIter<'a>) -> Self {
        Self::start(Source::Fast(inner))
    }

    pub(crate) fn slow(inner: LeafWalk<'a>) -> Self {
        Self::start(Source::Slow(inner))
    }

    fn start(source: Source<'a>) -> Self {
        let mut iter = Self { source, current: None, error: None };
        iter.fetch();
        iter
    }

    fn fetch(&mut self) {
        let next = match &mut self.source {
            Source::Fast(inner) => inner.next(),
            Source::Slow(inner) => inner.next(),
            Source::Closed => None,
        };
        match next {
            Some(Ok(entry)) => self.current = Some(entry),
            Some(Err(e)) => {
                self.current = None;
                self.error = Some(e);
                self.source = Source::Closed;
            },
            None => {
                self.current = None;
                self.source = Source::Closed;
            },
        }
    }

    /// Returns true while the cursor is positioned on an entry.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Moves to the next entry. Does nothing on an invalid cursor.
    pub fn advance(&mut self) {
        if self.valid() {
            self.fetch();
        }
    }

    /// Key of the current entry, or `None` on an invalid cursor.
    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(key, _)| key.as_slice())
    }

    /// Value of the current entry, or `None` on an invalid cursor.
    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, value)| value.as_slice())
    }

    /// Releases the underlying cursor. The iterator is invalid afterwards.
    pub fn close(&mut self) {
        self.current = None;
        self.source = Source::Closed;
    }

    /// Returns the error that stopped the iteration, if any.
    pub fn error(&self) -> Option<&TreeError> {
        self.error.as_ref()
    }
}

impl Iterator for TreeIterator<'_> {
    type Item = Result<KvPair, TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.current.take() {
            Some(entry) => {
                self.fetch();
                Some(Ok(entry))
            },
            None => self.error.take().map(Err),
        }
    }
}

impl core::fmt::Debug for TreeIterator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kind = match self.source {
            Source::Fast(_) => "fast",
            Source::Slow(_) => "slow",
            Source::Closed => "closed",
        };
        f.debug_struct("TreeIterator")
            .field("source", &kind)
            .field("key", &self.key().map(hex::encode))
            .field("error", &self.error)
            .finish()
    }
}
