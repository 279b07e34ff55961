//! Assertions over [`ArrayData`] and [`Collection`].

use crate::array::ArrayData;
use crate::store::Collection;
use ordered_float::OrderedFloat;
use std::fmt::Debug;

/// Assert that two arrays have the same type and elements, in order.
///
/// # Panics
///
/// Panics on a type, length or element mismatch, naming the first differing
/// index.
pub fn assert_same_data(actual: &ArrayData, expected: &ArrayData) {
    assert_eq!(
        actual.dtype(),
        expected.dtype(),
        "type mismatch:\n  Expected: {}\n  Actual: {}",
        expected.dtype(),
        actual.dtype()
    );
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch:\n  Expected length: {}\n  Actual length: {}",
        expected.len(),
        actual.len()
    );
    if actual != expected {
        let first = (0..actual.len())
            .find(|&i| actual.slice(i..i + 1) != expected.slice(i..i + 1))
            .unwrap_or(0);
        panic!(
            "data mismatch at index {first}:\n  Expected: {:?}\n  Actual: {:?}",
            expected.slice(first..first + 1),
            actual.slice(first..first + 1)
        );
    }
}

/// Assert that two collections hold the same names, in order, with the same
/// data.
///
/// # Panics
///
/// Panics on the first dataset that differs.
pub fn assert_same_collection(actual: &Collection, expected: &Collection) {
    assert_eq!(actual.names(), expected.names(), "dataset names differ");
    for (name, want) in expected.iter() {
        let got = actual.get(name).unwrap_or_else(|| panic!("missing dataset {name:?}"));
        assert_same_data(got, want);
    }
}

/// Assert that two slices hold the same elements once sorted.
///
/// # Panics
///
/// Panics if the sorted slices differ.
///
/// # Example
///
/// ```
/// use ironshard::testing::assert_sorted_equal;
///
/// assert_sorted_equal(&[3, 1, 2], &[1, 2, 3]);
/// ```
pub fn assert_sorted_equal<T: Debug + Ord + Clone>(actual: &[T], expected: &[T]) {
    let mut a = actual.to_vec();
    let mut e = expected.to_vec();
    a.sort();
    e.sort();
    assert_eq!(a, e, "sorted contents differ");
}

/// [`assert_sorted_equal`] for floats; NaN sorts last and equals NaN.
///
/// # Panics
///
/// Panics if the sorted slices differ.
pub fn assert_sorted_floats_equal(actual: &[f64], expected: &[f64]) {
    let wrap = |v: &[f64]| v.iter().copied().map(OrderedFloat).collect::<Vec<_>>();
    assert_sorted_equal(&wrap(actual), &wrap(expected));
}
