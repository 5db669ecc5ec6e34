//! Fixed-size chunking used by every provider to bound request size.

use crate::error::{Error, Result};

/// Lazy iterator over consecutive, non-overlapping groups of `size` items.
/// Only the final group may be shorter.
#[derive(Debug)]
pub struct Batched<I> {
    inner: I,
    size: usize,
}

/// Split `items` into batches of `size`, preserving order within and across batches.
///
/// Fails with [`Error::InvalidConfig`] when `size` is zero.
pub fn batched<I: IntoIterator>(items: I, size: usize) -> Result<Batched<I::IntoIter>> {
    if size == 0 {
        return Err(Error::InvalidConfig("batch size must be positive".to_string()));
    }
    Ok(Batched { inner: items.into_iter(), size })
}

impl<I: Iterator> Iterator for Batched<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        if batch.is_empty() { None } else { Some(batch) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.inner.size_hint();
        (lo.div_ceil(self.size), hi.map(|h| h.div_ceil(self.size)))
    }
}

impl<I: std::iter::FusedIterator> std::iter::FusedIterator for Batched<I> {}
