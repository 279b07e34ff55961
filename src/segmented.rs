//! Segmented (variable-length) values.
//!
//! Both shapes here store a flat `values` buffer plus one start offset per
//! logical entry:
//!
//! - [`Strings`]: `values` holds UTF-8 bytes, each entry followed by a NUL
//!   terminator. Because the terminator is always present, the offsets can be
//!   dropped at write time and recovered later by [`recover_offsets`].
//! - [`SegArray`]: `values` holds fixed-width scalars. There is no sentinel, so
//!   offsets are mandatory.

use crate::array::ArrayData;
use crate::dtype::ScalarType;
use crate::error::{Result, StoreError};
use rayon::prelude::*;
use std::ops::Range;

/// Terminator appended after every string entry.
pub const SENTINEL: u8 = 0;

/// Buffers larger than this are scanned for terminators in parallel chunks.
pub const SCAN_CHUNK_BYTES: usize = 1024;

/// Variable-length UTF-8 entries as a `(values, offsets)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Strings {
    values: Vec<u8>,
    offsets: Vec<u64>,
}

impl Strings {
    /// Encode entries: bytes of each entry followed by [`SENTINEL`].
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidArgument`] if an entry contains the
    /// sentinel byte, since that would make offsets-free recovery lossy.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::default();
        for (i, entry) in entries.into_iter().enumerate() {
            let bytes = entry.as_ref().as_bytes();
            if bytes.contains(&SENTINEL) {
                return Err(StoreError::invalid(format!(
                    "string entry {i} contains a NUL byte"
                )));
            }
            out.offsets.push(out.values.len() as u64);
            out.values.extend_from_slice(bytes);
            out.values.push(SENTINEL);
        }
        Ok(out)
    }

    /// Assemble from stored parts, validating that every entry is terminated
    /// and the whole buffer is UTF-8.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidArgument`] describing the first violated
    /// invariant.
    pub fn from_parts(values: Vec<u8>, offsets: Vec<u64>) -> Result<Self> {
        if offsets.is_empty() != values.is_empty() {
            return Err(StoreError::invalid(format!(
                "{} offsets for {} value bytes",
                offsets.len(),
                values.len()
            )));
        }
        if let Some(&first) = offsets.first()
            && first != 0
        {
            return Err(StoreError::invalid("first offset must be 0"));
        }
        let len = values.len() as u64;
        for (i, pair) in offsets.windows(2).enumerate() {
            if pair[1] <= pair[0] || pair[1] >= len {
                return Err(StoreError::invalid(format!(
                    "offset {} ({}) is out of order or out of range",
                    i + 1,
                    pair[1]
                )));
            }
            if values[to_index(pair[1]) - 1] != SENTINEL {
                return Err(StoreError::invalid(format!("entry {i} is not terminated")));
            }
        }
        if values.last().is_some_and(|&b| b != SENTINEL) {
            return Err(StoreError::invalid("last entry is not terminated"));
        }
        std::str::from_utf8(&values)
            .map_err(|e| StoreError::invalid(format!("values are not UTF-8: {e}")))?;
        Ok(Self { values, offsets })
    }

    /// Assemble from a values buffer alone, recovering offsets by scanning
    /// for the terminator.
    ///
    /// # Errors
    /// See [`recover_offsets`] and [`Strings::from_parts`].
    pub fn from_values(values: Vec<u8>) -> Result<Self> {
        let offsets = recover_offsets(&values)?;
        Self::from_parts(values, offsets)
    }

    #[must_use]
    pub fn values(&self) -> &[u8] {
        &self.values
    }

    #[must_use]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Byte range of entry `i` without its terminator.
    fn entry_range(&self, i: usize) -> Option<Range<usize>> {
        let start = to_index(*self.offsets.get(i)?);
        let end = self
            .offsets
            .get(i + 1)
            .map_or(self.values.len(), |&o| to_index(o))
            .checked_sub(1)?;
        (start <= end && end <= self.values.len()).then_some(start..end)
    }

    #[must_use]
    pub fn get(&self, i: usize) -> Option<&str> {
        std::str::from_utf8(self.values.get(self.entry_range(i)?)?).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_owned).collect()
    }

    /// Entries in `range`, rebased to start at offset 0.
    ///
    /// # Panics
    /// Panics if `range` is out of bounds.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        if range.is_empty() {
            return Self::default();
        }
        let start = self.offsets[range.start];
        let end = self
            .offsets
            .get(range.end)
            .map_or(self.values.len() as u64, |&o| o);
        Self {
            values: self.values[to_index(start)..to_index(end)].to_vec(),
            offsets: self.offsets[range].iter().map(|o| o - start).collect(),
        }
    }

    pub fn extend(&mut self, other: &Strings) {
        let base = self.values.len() as u64;
        self.offsets.extend(other.offsets.iter().map(|o| o + base));
        self.values.extend_from_slice(&other.values);
    }
}

/// Derive entry start offsets from a NUL-terminated values buffer.
///
/// Buffers above [`SCAN_CHUNK_BYTES`] are split into chunks scanned in
/// parallel; terminator positions are merged in chunk order, so the result is
/// identical to a sequential scan.
///
/// # Errors
/// Returns [`StoreError::InvalidArgument`] if the buffer does not end with a
/// terminator.
pub fn recover_offsets(values: &[u8]) -> Result<Vec<u64>> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    if values.last() != Some(&SENTINEL) {
        return Err(StoreError::invalid(
            "values buffer does not end with a terminator",
        ));
    }
    let terminators: Vec<usize> = if values.len() <= SCAN_CHUNK_BYTES {
        terminator_positions(values, 0).collect()
    } else {
        values
            .par_chunks(SCAN_CHUNK_BYTES)
            .enumerate()
            .flat_map_iter(|(i, chunk)| terminator_positions(chunk, i * SCAN_CHUNK_BYTES))
            .collect()
    };
    let mut offsets = Vec::with_capacity(terminators.len());
    offsets.push(0);
    offsets.extend(
        terminators[..terminators.len() - 1]
            .iter()
            .map(|&end| (end + 1) as u64),
    );
    Ok(offsets)
}

fn terminator_positions(chunk: &[u8], base: usize) -> impl Iterator<Item = usize> + '_ {
    chunk
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == SENTINEL)
        .map(move |(i, _)| base + i)
}

fn to_index(offset: u64) -> usize {
    usize::try_from(offset).unwrap_or(usize::MAX)
}

/// Variable-length lists of fixed-width scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct SegArray {
    values: Box<ArrayData>,
    offsets: Vec<u64>,
}

impl SegArray {
    /// # Errors
    /// Returns [`StoreError::InvalidArgument`] if `values` is not a scalar
    /// array or the offsets are not a non-decreasing sequence starting at 0
    /// and bounded by the values length.
    pub fn new(values: ArrayData, offsets: Vec<u64>) -> Result<Self> {
        if values.scalar_type().is_none() {
            return Err(StoreError::invalid(format!(
                "segmented array values must be scalar, got {}",
                values.dtype()
            )));
        }
        let len = values.len() as u64;
        if let Some(&first) = offsets.first()
            && first != 0
        {
            return Err(StoreError::invalid("first offset must be 0"));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) || offsets.last().is_some_and(|&o| o > len) {
            return Err(StoreError::invalid(
                "segment offsets must be non-decreasing and within the values",
            ));
        }
        if offsets.is_empty() && len > 0 {
            return Err(StoreError::invalid("values present but no segments"));
        }
        Ok(Self {
            values: Box::new(values),
            offsets,
        })
    }

    /// Build from a list of per-entry vectors.
    ///
    /// # Errors
    /// Propagates [`SegArray::new`] validation (cannot fail for scalar `T`).
    pub fn from_lists<T>(lists: Vec<Vec<T>>) -> Result<Self>
    where
        Vec<T>: Into<ArrayData>,
    {
        let mut offsets = Vec::with_capacity(lists.len());
        let mut flat = Vec::new();
        for list in lists {
            offsets.push(flat.len() as u64);
            flat.extend(list);
        }
        Self::new(flat.into(), offsets)
    }

    #[must_use]
    pub fn empty(item: ScalarType) -> Self {
        Self {
            values: Box::new(ArrayData::empty(item.into())),
            offsets: Vec::new(),
        }
    }

    #[must_use]
    pub fn values(&self) -> &ArrayData {
        &self.values
    }

    #[must_use]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// # Panics
    /// Never: construction guarantees scalar values.
    #[must_use]
    pub fn item_type(&self) -> ScalarType {
        self.values.scalar_type().unwrap_or(ScalarType::Int64)
    }

    fn value_range(&self, range: Range<usize>) -> Range<usize> {
        if range.is_empty() {
            return 0..0;
        }
        let start = to_index(self.offsets[range.start]);
        let end = self
            .offsets
            .get(range.end)
            .map_or(self.values.len(), |&o| to_index(o));
        start..end
    }

    /// Values of entry `i`.
    #[must_use]
    pub fn segment(&self, i: usize) -> Option<ArrayData> {
        (i < self.len()).then(|| self.values.slice(self.value_range(i..i + 1)))
    }

    /// Per-entry lengths.
    #[must_use]
    pub fn lengths(&self) -> Vec<u64> {
        let total = self.values.len() as u64;
        self.offsets
            .iter()
            .enumerate()
            .map(|(i, &start)| self.offsets.get(i + 1).copied().unwrap_or(total) - start)
            .collect()
    }

    /// # Panics
    /// Panics if `range` is out of bounds.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        let values = self.value_range(range.clone());
        let base = values.start as u64;
        Self {
            values: Box::new(self.values.slice(values)),
            offsets: self.offsets[range].iter().map(|o| o - base).collect(),
        }
    }

    /// # Errors
    /// Fails when the item types differ.
    pub fn extend(&mut self, other: SegArray) -> Result<()> {
        let base = self.values.len() as u64;
        self.values.extend(*other.values)?;
        self.offsets.extend(other.offsets.iter().map(|o| o + base));
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (ArrayData, Vec<u64>) {
        (*self.values, self.offsets)
    }
}
