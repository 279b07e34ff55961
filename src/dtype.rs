//! Element types of stored datasets.
//!
//! A dataset's declared type is a [`DType`]: a fixed-width scalar, a
//! variable-length UTF-8 string, or a list of scalars. Widths are part of the
//! type so that shards written independently can disagree on them; see
//! [`crate::reconcile`] for how those disagreements are settled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse element family. Two shards of one dataset must agree on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    SignedInt,
    UnsignedInt,
    Float,
    Bool,
    Utf8,
    NestedList,
}

/// Fixed-width scalar element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
}

impl ScalarType {
    pub const ALL: [ScalarType; 11] = [
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
        Self::Bool,
    ];

    #[must_use]
    pub fn kind(self) -> ElementKind {
        match self {
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 => ElementKind::SignedInt,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 => ElementKind::UnsignedInt,
            Self::Float32 | Self::Float64 => ElementKind::Float,
            Self::Bool => ElementKind::Bool,
        }
    }

    /// Declared bit width. Booleans are stored one per byte.
    #[must_use]
    pub fn bits(self) -> u16 {
        match self {
            Self::Int8 | Self::UInt8 | Self::Bool => 8,
            Self::Int16 | Self::UInt16 => 16,
            Self::Int32 | Self::UInt32 | Self::Float32 => 32,
            Self::Int64 | Self::UInt64 | Self::Float64 => 64,
        }
    }

    #[must_use]
    pub fn byte_width(self) -> usize {
        usize::from(self.bits() / 8)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
        }
    }

    /// Parse a type name; `int`, `uint` and `float` are accepted as their
    /// 64-bit forms.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let t = match name.as_str() {
            "int" => Self::Int64,
            "uint" => Self::UInt64,
            "float" | "double" => Self::Float64,
            "boolean" => Self::Bool,
            other => *Self::ALL.iter().find(|t| t.name() == other)?,
        };
        Some(t)
    }

    /// Scalar of `kind` with the given width, if one exists.
    #[must_use]
    pub fn with_width(kind: ElementKind, bits: u16) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.kind() == kind && t.bits() == bits)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Scalar(ScalarType),
    Str,
    List(ScalarType),
}

impl DType {
    #[must_use]
    pub fn kind(self) -> ElementKind {
        match self {
            Self::Scalar(t) => t.kind(),
            Self::Str => ElementKind::Utf8,
            Self::List(_) => ElementKind::NestedList,
        }
    }

    /// Width of the scalar (or list item); strings carry none.
    #[must_use]
    pub fn bits(self) -> Option<u16> {
        match self {
            Self::Scalar(t) | Self::List(t) => Some(t.bits()),
            Self::Str => None,
        }
    }

    #[must_use]
    pub fn is_segmented(self) -> bool {
        matches!(self, Self::Str | Self::List(_))
    }

    /// Whether two declared types belong to the same family, i.e. may be
    /// reconciled by widening. Lists compare their item kinds.
    #[must_use]
    pub fn same_family(self, other: DType) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) | (Self::List(a), Self::List(b)) => {
                integer_family(a.kind()) == integer_family(b.kind())
            }
            (Self::Str, Self::Str) => true,
            _ => false,
        }
    }

    /// Parse `int64`, `str`, `list<float64>` and friends.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let lower = name.to_ascii_lowercase();
        if matches!(lower.as_str(), "str" | "string" | "utf8") {
            return Some(Self::Str);
        }
        if let Some(inner) = lower.strip_prefix("list<").and_then(|s| s.strip_suffix('>')) {
            return ScalarType::from_name(inner).map(Self::List);
        }
        ScalarType::from_name(&lower).map(Self::Scalar)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(t) => write!(f, "{t}"),
            Self::Str => f.write_str("str"),
            Self::List(t) => write!(f, "list<{t}>"),
        }
    }
}

impl From<ScalarType> for DType {
    fn from(t: ScalarType) -> Self {
        Self::Scalar(t)
    }
}

/// Signed and unsigned integers are one family for reconciliation purposes.
fn integer_family(kind: ElementKind) -> ElementKind {
    match kind {
        ElementKind::UnsignedInt => ElementKind::SignedInt,
        other => other,
    }
}
