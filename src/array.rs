//! In-memory logical arrays.
//!
//! [`ArrayData`] is the sum type every reader produces and every writer
//! consumes: one variant per fixed-width scalar type, plus [`Strings`] and
//! [`SegArray`] for segmented (variable-length) data. Callers pattern-match on
//! the variant or use the typed accessors (`as_int64`, `as_float64`, ...).

use crate::dtype::{DType, ScalarType};
use crate::error::{Result, StoreError};
use crate::segmented::{SegArray, Strings};
use paste::paste;
use std::ops::Range;

/// Fixed-width element: little-endian byte codec plus text parsing.
pub(crate) trait Element: Copy + ToString {
    const WIDTH: usize;
    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Option<Self>;
    fn parse_text(text: &str) -> Option<Self>;
}

macro_rules! impl_numeric_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Option<Self> {
                    bytes.try_into().ok().map(<$t>::from_le_bytes)
                }

                fn parse_text(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }
            }
        )*
    };
}

impl_numeric_element!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl Element for bool {
    const WIDTH: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    fn read_le(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }
    }

    fn parse_text(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

fn encode_le<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::WIDTH);
    for v in values {
        v.write_le(&mut out);
    }
    out
}

fn decode_le<T: Element>(bytes: &[u8]) -> std::result::Result<Vec<T>, String> {
    if bytes.len() % T::WIDTH != 0 {
        return Err(format!(
            "buffer of {} bytes is not a multiple of the {}-byte element width",
            bytes.len(),
            T::WIDTH
        ));
    }
    bytes
        .chunks_exact(T::WIDTH)
        .enumerate()
        .map(|(i, chunk)| T::read_le(chunk).ok_or_else(|| format!("invalid element at index {i}")))
        .collect()
}

fn parse_all<T: Element>(fields: &[&str]) -> std::result::Result<Vec<T>, String> {
    fields
        .iter()
        .enumerate()
        .map(|(row, f)| T::parse_text(f).ok_or_else(|| format!("row {}: cannot parse {f:?}", row + 1)))
        .collect()
}

/// Invokes `$mac` with `Variant, rust_type, accessor_name;` for every scalar.
macro_rules! for_each_scalar {
    ($mac:ident) => {
        $mac! {
            Int8, i8, int8;
            Int16, i16, int16;
            Int32, i32, int32;
            Int64, i64, int64;
            UInt8, u8, uint8;
            UInt16, u16, uint16;
            UInt32, u32, uint32;
            UInt64, u64, uint64;
            Float32, f32, float32;
            Float64, f64, float64;
            Bool, bool, bool;
        }
    };
}

macro_rules! define_array_data {
    ($($variant:ident, $ty:ty, $name:ident;)*) => {
        /// A logical array of one [`DType`].
        #[derive(Debug, Clone, PartialEq)]
        pub enum ArrayData {
            $($variant(Vec<$ty>),)*
            Str(Strings),
            List(SegArray),
        }

        impl ArrayData {
            #[must_use]
            pub fn len(&self) -> usize {
                match self {
                    $(Self::$variant(v) => v.len(),)*
                    Self::Str(s) => s.len(),
                    Self::List(l) => l.len(),
                }
            }

            #[must_use]
            pub fn dtype(&self) -> DType {
                match self {
                    $(Self::$variant(_) => DType::Scalar(ScalarType::$variant),)*
                    Self::Str(_) => DType::Str,
                    Self::List(l) => DType::List(l.item_type()),
                }
            }

            /// Zero-length array of `dtype`.
            #[must_use]
            pub fn empty(dtype: DType) -> Self {
                match dtype {
                    $(DType::Scalar(ScalarType::$variant) => Self::$variant(Vec::new()),)*
                    DType::Str => Self::Str(Strings::default()),
                    DType::List(t) => Self::List(SegArray::empty(t)),
                }
            }

            /// Copy out the logical elements in `range`.
            ///
            /// # Panics
            /// Panics if `range` is out of bounds.
            #[must_use]
            pub fn slice(&self, range: Range<usize>) -> Self {
                match self {
                    $(Self::$variant(v) => Self::$variant(v[range].to_vec()),)*
                    Self::Str(s) => Self::Str(s.slice(range)),
                    Self::List(l) => Self::List(l.slice(range)),
                }
            }

            /// Append `other`, which must have exactly the same dtype.
            ///
            /// # Errors
            /// Returns [`StoreError::InvalidArgument`] on a dtype mismatch.
            pub fn extend(&mut self, other: ArrayData) -> Result<()> {
                match (self, other) {
                    $((Self::$variant(a), Self::$variant(b)) => a.extend(b),)*
                    (Self::Str(a), Self::Str(b)) => a.extend(&b),
                    (Self::List(a), Self::List(b)) => a.extend(b)?,
                    (a, b) => {
                        return Err(StoreError::invalid(format!(
                            "cannot concatenate {} with {}",
                            a.dtype(),
                            b.dtype()
                        )));
                    }
                }
                Ok(())
            }

            /// Little-endian bytes of a scalar array; `None` for segmented data.
            pub(crate) fn to_le_bytes(&self) -> Option<Vec<u8>> {
                match self {
                    $(Self::$variant(v) => Some(encode_le(v)),)*
                    Self::Str(_) | Self::List(_) => None,
                }
            }

            pub(crate) fn from_le_bytes(
                t: ScalarType,
                bytes: &[u8],
            ) -> std::result::Result<Self, String> {
                match t {
                    $(ScalarType::$variant => decode_le::<$ty>(bytes).map(Self::$variant),)*
                }
            }

            /// Parse text fields into a scalar array of type `t`.
            pub(crate) fn parse_text(
                t: ScalarType,
                fields: &[&str],
            ) -> std::result::Result<Self, String> {
                match t {
                    $(ScalarType::$variant => parse_all::<$ty>(fields).map(Self::$variant),)*
                }
            }

            /// Render every element as text; `None` for nested lists.
            pub(crate) fn to_text(&self) -> Option<Vec<String>> {
                match self {
                    $(Self::$variant(v) => Some(v.iter().map(ToString::to_string).collect()),)*
                    Self::Str(s) => Some(s.to_vec()),
                    Self::List(_) => None,
                }
            }

            paste! {
                $(
                    #[must_use]
                    pub fn [<as_ $name>](&self) -> Option<&[$ty]> {
                        match self {
                            Self::$variant(v) => Some(v),
                            _ => None,
                        }
                    }
                )*
            }
        }

        $(
            impl From<Vec<$ty>> for ArrayData {
                fn from(v: Vec<$ty>) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

for_each_scalar!(define_array_data);

impl ArrayData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar element type, `None` for strings and lists.
    #[must_use]
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self.dtype() {
            DType::Scalar(t) => Some(t),
            DType::Str | DType::List(_) => None,
        }
    }

    /// Build a string array from entries.
    ///
    /// # Errors
    /// Fails if an entry contains the NUL terminator.
    pub fn strings<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Strings::from_entries(entries).map(Self::Str)
    }

    #[must_use]
    pub fn as_strings(&self) -> Option<&Strings> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&SegArray> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Concatenate same-typed parts in order.
    ///
    /// # Errors
    /// Fails if any part does not have dtype `dtype`.
    pub fn concat(dtype: DType, parts: impl IntoIterator<Item = ArrayData>) -> Result<Self> {
        let mut out = Self::empty(dtype);
        for part in parts {
            out.extend(part)?;
        }
        Ok(out)
    }
}

impl From<Strings> for ArrayData {
    fn from(s: Strings) -> Self {
        Self::Str(s)
    }
}

impl From<SegArray> for ArrayData {
    fn from(l: SegArray) -> Self {
        Self::List(l)
    }
}
