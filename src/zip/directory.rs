//! Growable buffer holding the merged central directory.

use crate::error::{MergeError, Result};

use super::structures::{CDFH_MIN_SIZE, CentralHeader};

/// Initial capacity, large enough to skip the first few reallocations.
const INITIAL_CAPACITY: usize = 32 * 1024;

/// Accumulates central directory headers in output order.
///
/// Every entry appended here has already been validated by the loader, so
/// walking the buffer with [`CentralDirectory::entries`] never needs bounds
/// recovery beyond stopping at the end.
#[derive(Debug, Default)]
pub struct CentralDirectory {
    bytes: Vec<u8>,
}

impl CentralDirectory {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable view of everything from `start` to the end of the buffer.
    pub fn tail_mut(&mut self, start: usize) -> &mut [u8] {
        &mut self.bytes[start..]
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .bytes
            .len()
            .checked_add(additional)
            .ok_or(MergeError::OutOfMemory {
                requested: usize::MAX,
            })?;
        if needed <= self.bytes.capacity() {
            return Ok(());
        }
        let mut target = self.bytes.capacity().max(INITIAL_CAPACITY);
        while target < needed {
            target = target.checked_mul(2).unwrap_or(needed);
        }
        self.bytes
            .try_reserve_exact(target - self.bytes.len())
            .map_err(|_| MergeError::OutOfMemory { requested: target })
    }

    /// Append `count` zeroed bytes and return them for filling in.
    pub fn grow(&mut self, count: usize) -> Result<&mut [u8]> {
        self.reserve(count)?;
        let start = self.bytes.len();
        self.bytes.resize(start + count, 0);
        Ok(&mut self.bytes[start..])
    }

    /// Open a gap of `count` zeroed bytes at `offset`, shifting later bytes up.
    pub fn insert_at(&mut self, offset: usize, count: usize) -> Result<&mut [u8]> {
        self.reserve(count)?;
        let old_len = self.bytes.len();
        self.bytes.resize(old_len + count, 0);
        self.bytes.copy_within(offset..old_len, offset + count);
        let gap = &mut self.bytes[offset..offset + count];
        gap.fill(0);
        Ok(gap)
    }

    /// Iterate over the headers in the buffer.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            rest: &self.bytes,
        }
    }
}

/// Iterator over the central headers in a [`CentralDirectory`].
pub struct Entries<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Entries<'a> {
    type Item = CentralHeader<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < CDFH_MIN_SIZE {
            return None;
        }
        let len = CentralHeader(self.rest).total_len();
        if len > self.rest.len() {
            return None;
        }
        let (entry, rest) = self.rest.split_at(len);
        self.rest = rest;
        Some(CentralHeader(entry))
    }
}
