//! Multi-file assembly: cast each shard's contribution to the reconciled
//! type and concatenate in shard order.

use crate::array::ArrayData;
use crate::dtype::{DType, ElementKind, ScalarType};
use crate::error::{Result, StoreError};
use crate::segmented::SegArray;

macro_rules! integer_variants {
    ($mac:ident, $($args:tt)*) => {
        $mac!($($args)*; Int8, i8; Int16, i16; Int32, i32; Int64, i64;
              UInt8, u8; UInt16, u16; UInt32, u32; UInt64, u64)
    };
}

macro_rules! widen_to_i128 {
    ($data:expr; $($variant:ident, $ty:ty);*) => {
        match $data {
            $(ArrayData::$variant(v) => Some(v.iter().map(|&x| i128::from(x)).collect::<Vec<i128>>()),)*
            _ => None,
        }
    };
}

macro_rules! narrow_from_i128 {
    ($target:expr, $wide:expr; $($variant:ident, $ty:ty);*) => {
        match $target {
            $(ScalarType::$variant => $wide
                .iter()
                .map(|&x| <$ty>::try_from(x).ok())
                .collect::<Option<Vec<$ty>>>()
                .map(ArrayData::$variant),)*
            _ => None,
        }
    };
}

fn cast_scalar(data: ArrayData, target: ScalarType) -> Option<ArrayData> {
    if data.scalar_type() == Some(target) {
        return Some(data);
    }
    match target.kind() {
        ElementKind::SignedInt | ElementKind::UnsignedInt => {
            let wide = integer_variants!(widen_to_i128, &data)?;
            integer_variants!(narrow_from_i128, target, wide)
        }
        ElementKind::Float => match (data, target) {
            (ArrayData::Float32(v), ScalarType::Float64) => {
                Some(ArrayData::Float64(v.into_iter().map(f64::from).collect()))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Convert `data` to `target`. Only lossless widenings are accepted.
///
/// # Errors
/// Returns [`StoreError::TypeStrictness`] if the conversion would change a
/// value or cross element kinds.
pub fn cast(dataset: &str, data: ArrayData, target: DType) -> Result<ArrayData> {
    let from = data.dtype();
    if from == target {
        return Ok(data);
    }
    let cast = match (data, target) {
        (data @ ArrayData::Str(_), _) => Some(data).filter(|_| target == DType::Str),
        (ArrayData::List(list), DType::List(item)) => {
            let (values, offsets) = list.into_parts();
            cast_scalar(values, item).and_then(|values| SegArray::new(values, offsets).ok().map(ArrayData::List))
        }
        (data, DType::Scalar(t)) => cast_scalar(data, t),
        _ => None,
    };
    cast.ok_or_else(|| StoreError::TypeStrictness {
        dataset: dataset.to_owned(),
        detail: format!("cannot convert {from} to {target} without loss"),
    })
}

/// Concatenate per-shard parts after casting each to `dtype`.
///
/// The result length is the sum of the part lengths; segmented offsets are
/// rebased so every entry stays addressable.
///
/// # Errors
/// See [`cast`].
pub fn assemble(dataset: &str, parts: Vec<ArrayData>, dtype: DType) -> Result<ArrayData> {
    let expected: usize = parts.iter().map(ArrayData::len).sum();
    let cast_parts = parts
        .into_iter()
        .map(|p| cast(dataset, p, dtype))
        .collect::<Result<Vec<_>>>()?;
    let out = ArrayData::concat(dtype, cast_parts)?;
    debug_assert_eq!(out.len(), expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widens_mixed_integers_to_int64() {
        let parts = vec![
            ArrayData::UInt32(vec![0, 1]),
            ArrayData::Int64(vec![2, 3]),
            ArrayData::UInt16(vec![4]),
            ArrayData::Int16(vec![-5]),
        ];
        let out = assemble("ints", parts, ScalarType::Int64.into()).unwrap();
        assert_eq!(out.as_int64(), Some(&[0, 1, 2, 3, 4, -5][..]));
    }

    #[test]
    fn widens_floats() {
        let parts = vec![ArrayData::Float32(vec![0.5]), ArrayData::Float64(vec![1.25])];
        let out = assemble("f", parts, ScalarType::Float64.into()).unwrap();
        assert_eq!(out.as_float64(), Some(&[0.5, 1.25][..]));
    }

    #[test]
    fn rejects_lossy_cast() {
        let err = cast("x", ArrayData::Int64(vec![-1]), ScalarType::UInt64.into()).unwrap_err();
        assert!(matches!(err, StoreError::TypeStrictness { .. }));
        assert!(cast("x", ArrayData::Float64(vec![1.0]), ScalarType::Float32.into()).is_err());
    }

    #[test]
    fn concatenates_strings_and_lists_in_order() {
        let parts = vec![
            ArrayData::strings(["a", "bb"]).unwrap(),
            ArrayData::strings(Vec::<String>::new()).unwrap(),
            ArrayData::strings(["ccc"]).unwrap(),
        ];
        let out = assemble("s", parts, DType::Str).unwrap();
        assert_eq!(out.as_strings().unwrap().to_vec(), vec!["a", "bb", "ccc"]);

        let lists = vec![
            SegArray::from_lists(vec![vec![1i32], vec![2, 3]]).unwrap().into(),
            SegArray::from_lists(vec![vec![4i64, 5]]).unwrap().into(),
        ];
        let out = assemble("l", lists, DType::List(ScalarType::Int64)).unwrap();
        let out = out.as_list().unwrap();
        assert_eq!(out.offsets(), &[0, 1, 3]);
        assert_eq!(out.values().as_int64(), Some(&[1, 2, 3, 4, 5][..]));
    }
}
