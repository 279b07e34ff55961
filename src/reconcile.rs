//! Cross-shard type reconciliation.
//!
//! Shards of one dataset are written independently and may disagree on the
//! bit width of the same element kind. [`reconcile`] settles that into one
//! logical [`DType`] under a [`Strictness`] policy:
//!
//! - [`Strictness::Strict`] rejects any disagreement.
//! - [`Strictness::Relaxed`] widens: the widest float, the widest unsigned
//!   when every shard is unsigned, the widest signed when every shard is
//!   signed. Mixed signedness promotes to the widest signed width only when it
//!   is strictly wider than every unsigned width, so the cast stays lossless.

use crate::dtype::{DType, ElementKind, ScalarType};
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strictness {
    #[default]
    Strict,
    Relaxed,
}

impl Strictness {
    #[must_use]
    pub fn from_strict(strict: bool) -> Self {
        if strict { Self::Strict } else { Self::Relaxed }
    }
}

/// Settle the per-shard declared types of `dataset` into one logical type.
///
/// # Errors
/// Returns [`StoreError::TypeStrictness`] when the shards disagree on element
/// kind, or on width under [`Strictness::Strict`], or when a relaxed
/// promotion would be lossy. An empty `observed` slice is
/// [`StoreError::DatasetNotFound`].
pub fn reconcile(dataset: &str, observed: &[DType], strictness: Strictness) -> Result<DType> {
    let Some(&first) = observed.first() else {
        return Err(StoreError::DatasetNotFound {
            dataset: dataset.to_owned(),
            location: "any shard".to_owned(),
        });
    };

    if observed.iter().all(|&t| t == first) {
        return Ok(first);
    }

    if let Some(&other) = observed.iter().find(|t| !first.same_family(**t)) {
        return Err(mismatch(
            dataset,
            format!("incompatible element kinds {first} and {other}"),
        ));
    }

    if strictness == Strictness::Strict {
        return Err(mismatch(
            dataset,
            format!(
                "shards declare different widths ({}); read with relaxed strictness to promote",
                distinct_names(observed)
            ),
        ));
    }

    match first {
        DType::Str => Ok(DType::Str),
        DType::Scalar(_) => {
            let items: Vec<ScalarType> = observed.iter().filter_map(scalar_of).collect();
            widen(dataset, &items).map(DType::Scalar)
        }
        DType::List(_) => {
            let items: Vec<ScalarType> = observed.iter().filter_map(scalar_of).collect();
            widen(dataset, &items).map(DType::List)
        }
    }
}

fn scalar_of(t: &DType) -> Option<ScalarType> {
    match *t {
        DType::Scalar(s) | DType::List(s) => Some(s),
        DType::Str => None,
    }
}

fn widest(items: &[ScalarType], kind: ElementKind) -> Option<ScalarType> {
    items
        .iter()
        .copied()
        .filter(|t| t.kind() == kind)
        .max_by_key(|t| t.bits())
}

fn widen(dataset: &str, items: &[ScalarType]) -> Result<ScalarType> {
    let signed = widest(items, ElementKind::SignedInt);
    let unsigned = widest(items, ElementKind::UnsignedInt);

    match (signed, unsigned) {
        (Some(s), None) => Ok(s),
        (None, Some(u)) => Ok(u),
        (Some(s), Some(u)) if s.bits() > u.bits() => Ok(s),
        (Some(s), Some(u)) => Err(mismatch(
            dataset,
            format!("cannot losslessly promote {u} and {s} to one signed type"),
        )),
        (None, None) => {
            let kind = items.first().map(|t| t.kind());
            kind.and_then(|k| widest(items, k))
                .ok_or_else(|| mismatch(dataset, "no observed types"))
        }
    }
}

fn distinct_names(observed: &[DType]) -> String {
    let mut names: Vec<String> = Vec::new();
    for t in observed {
        let name = t.to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names.join(", ")
}

fn mismatch(dataset: &str, detail: impl Into<String>) -> StoreError {
    StoreError::TypeStrictness {
        dataset: dataset.to_owned(),
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ScalarType::*;

    fn scalars(ts: &[ScalarType]) -> Vec<DType> {
        ts.iter().copied().map(DType::Scalar).collect()
    }

    #[test]
    fn identical_types_pass_in_both_modes() {
        let obs = scalars(&[Int32, Int32]);
        assert_eq!(reconcile("a", &obs, Strictness::Strict).unwrap(), Int32.into());
        assert_eq!(reconcile("a", &obs, Strictness::Relaxed).unwrap(), Int32.into());
    }

    #[test]
    fn strict_rejects_width_mismatch() {
        let obs = scalars(&[Float32, Float64]);
        let err = reconcile("floats", &obs, Strictness::Strict).unwrap_err();
        assert!(matches!(err, StoreError::TypeStrictness { .. }));
    }

    #[test]
    fn relaxed_promotes_mixed_integers_to_wide_signed() {
        let obs = scalars(&[UInt32, Int64, UInt16, Int16]);
        assert_eq!(reconcile("ints", &obs, Strictness::Relaxed).unwrap(), Int64.into());
    }

    #[test]
    fn relaxed_rejects_lossy_signed_promotion() {
        let obs = scalars(&[UInt64, Int64]);
        assert!(reconcile("ints", &obs, Strictness::Relaxed).is_err());
        let obs = scalars(&[UInt32, Int32]);
        assert!(reconcile("ints", &obs, Strictness::Relaxed).is_err());
    }

    #[test]
    fn relaxed_keeps_unsigned_when_all_unsigned() {
        let obs = scalars(&[UInt8, UInt32, UInt16]);
        assert_eq!(reconcile("u", &obs, Strictness::Relaxed).unwrap(), UInt32.into());
    }

    #[test]
    fn kind_mismatch_fails_even_when_relaxed() {
        let obs = vec![DType::Str, DType::Scalar(Int64)];
        assert!(reconcile("s", &obs, Strictness::Relaxed).is_err());
        let obs = vec![DType::List(Int64), DType::Scalar(Int64)];
        assert!(reconcile("l", &obs, Strictness::Relaxed).is_err());
        let obs = scalars(&[Float64, Int64]);
        assert!(reconcile("f", &obs, Strictness::Relaxed).is_err());
    }

    #[test]
    fn lists_reconcile_item_type() {
        let obs = vec![DType::List(Int16), DType::List(Int64)];
        assert_eq!(
            reconcile("l", &obs, Strictness::Relaxed).unwrap(),
            DType::List(Int64)
        );
    }
}
