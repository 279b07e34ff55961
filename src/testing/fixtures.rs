//! Datasets for round-trip tests.

use crate::array::ArrayData;
use crate::segmented::{SCAN_CHUNK_BYTES, SegArray};
use crate::store::Collection;

/// `n` short strings whose terminators land well inside one scan chunk.
#[must_use]
pub fn short_strings(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("testing string{i}")).collect()
}

/// `n` strings each longer than one offset-recovery scan chunk, so every
/// terminator is found in a different chunk than the string's start.
#[must_use]
pub fn long_strings(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let mut s = format!("long string {i} ");
            let fill = char::from(b'a' + u8::try_from(i % 26).unwrap_or(0));
            s.extend(std::iter::repeat_n(fill, SCAN_CHUNK_BYTES + 7 * i));
            s
        })
        .collect()
}

/// Four columns of length `n`: signed ints, unsigned ints, floats and
/// strings.
///
/// # Panics
///
/// Never for the generated strings, which contain no NUL.
#[must_use]
pub fn dict_columns(n: usize) -> Collection {
    let ints: Vec<i64> = (0..n as i64).map(|i| i * 3 - 7).collect();
    let uints: Vec<u64> = (0..n as u64).map(|i| i * i).collect();
    let floats: Vec<f64> = (0..n).map(|i| i as f64 / 4.0 - 1.5).collect();
    let mut out = Collection::new();
    out.insert("int_col", ArrayData::Int64(ints));
    out.insert("uint_col", ArrayData::UInt64(uints));
    out.insert("float_col", ArrayData::Float64(floats));
    out.insert(
        "str_col",
        ArrayData::strings(short_strings(n)).unwrap_or_else(|e| panic!("{e}")),
    );
    out
}

/// `n` lists of ascending lengths `0, 1, 2, ...` (empty segments included).
///
/// # Panics
///
/// Never; the generated offsets are always valid.
#[must_use]
pub fn ragged_lists(n: usize) -> ArrayData {
    let lists: Vec<Vec<i64>> = (0..n as i64).map(|i| (0..i).collect()).collect();
    SegArray::from_lists(lists)
        .map(ArrayData::from)
        .unwrap_or_else(|e| panic!("{e}"))
}
