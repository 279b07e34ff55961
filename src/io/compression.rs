//! Pluggable block filters for the hierarchical container.
//!
//! Every array block of a hierarchical shard is passed through a
//! [`BlockFilter`] before it is written, and the filter's name is recorded in
//! the block's directory entry. Readers look the filter up again per block, so
//! shards written with different filters can be read side by side.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags:
//! - **Gzip** via `flate2` (feature: `compression-gzip`)
//! - **Zstd** via `zstd` (feature: `compression-zstd`)
//!
//! Additional codecs can be added at runtime with [`register_codec`] and
//! referenced as [`BlockFilter::Custom`].
//!
//! ```
//! use ironshard::io::compression::{register_codec, BlockFilter, CompressionCodec};
//! use std::sync::Arc;
//!
//! struct Reverse;
//!
//! impl CompressionCodec for Reverse {
//!     fn name(&self) -> &str { "reverse" }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
//!         Ok(data.iter().rev().copied().collect())
//!     }
//!     fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
//!         Ok(data.iter().rev().copied().collect())
//!     }
//! }
//!
//! register_codec(Arc::new(Reverse));
//! let filter = BlockFilter::Custom("reverse".into());
//! let packed = filter.apply(b"abc").unwrap();
//! assert_eq!(filter.invert(&packed).unwrap(), b"abc");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};

/// Global codec registry.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
    ]
}

fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom codec. A later registration with the same name shadows
/// earlier ones.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// Look up a registered codec by name.
#[must_use]
pub fn codec_by_name(name: &str) -> Option<Arc<dyn CompressionCodec>> {
    get_registry()
        .into_iter()
        .rev()
        .find(|c| c.name().eq_ignore_ascii_case(name))
}

/// Names of every registered codec, built-ins first.
#[must_use]
pub fn available_codecs() -> Vec<String> {
    get_registry().iter().map(|c| c.name().to_owned()).collect()
}

/// Whole-block compression codec.
///
/// Implementations must be `Send + Sync`: shards are written and read on a
/// rayon pool.
pub trait CompressionCodec: Send + Sync {
    /// Name recorded in the directory entry of every block this codec wrote.
    fn name(&self) -> &str;

    /// Signature that compressed output starts with, if any. Used to sanity
    /// check a block before decoding.
    fn magic_bytes(&self) -> Option<&[u8]>;

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// Filter applied to each array block of a hierarchical shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockFilter {
    #[default]
    None,
    Gzip,
    Zstd,
    /// A codec added with [`register_codec`].
    Custom(String),
}

impl BlockFilter {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Custom(name) => name,
        }
    }

    /// Parse a filter name; unknown names become [`BlockFilter::Custom`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Self::None,
            "gzip" | "gz" => Self::Gzip,
            "zstd" | "zst" => Self::Zstd,
            _ => Self::Custom(name.trim().to_owned()),
        }
    }

    fn codec(&self) -> io::Result<Option<Arc<dyn CompressionCodec>>> {
        if *self == Self::None {
            return Ok(None);
        }
        codec_by_name(self.name()).map(Some).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "block filter {:?} is not available (registered: {})",
                    self.name(),
                    available_codecs().join(", ")
                ),
            )
        })
    }

    /// Encode one block.
    ///
    /// # Errors
    /// Fails when the codec is not registered (e.g. its feature is disabled)
    /// or the codec itself fails.
    pub fn apply(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self.codec()? {
            None => Ok(data.to_vec()),
            Some(codec) => codec.compress(data),
        }
    }

    /// Decode one block written with this filter.
    ///
    /// # Errors
    /// Fails when the codec is not registered, the block does not carry the
    /// codec's signature, or decoding fails.
    pub fn invert(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let Some(codec) = self.codec()? else {
            return Ok(data.to_vec());
        };
        if let Some(magic) = codec.magic_bytes()
            && !data.starts_with(magic)
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("block is not {} encoded", codec.name()),
            ));
        }
        codec.decompress(data)
    }
}

impl fmt::Display for BlockFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        zstd::stream::encode_all(data, 3)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        zstd::stream::decode_all(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_filter_is_passthrough() {
        let data = b"plain block";
        assert_eq!(BlockFilter::None.apply(data).unwrap(), data);
        assert_eq!(BlockFilter::None.invert(data).unwrap(), data);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_block_roundtrip() {
        let data = vec![7u8; 4096];
        let packed = BlockFilter::Gzip.apply(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(BlockFilter::Gzip.invert(&packed).unwrap(), data);
    }

    #[cfg(all(feature = "compression-gzip", feature = "compression-zstd"))]
    #[test]
    fn wrong_filter_is_rejected() {
        let packed = BlockFilter::Gzip.apply(b"abc").unwrap();
        assert!(BlockFilter::Zstd.invert(&packed).is_err());
    }

    #[test]
    fn unknown_custom_filter_errors() {
        let filter = BlockFilter::from_name("no-such-codec");
        assert_eq!(filter, BlockFilter::Custom("no-such-codec".into()));
        assert!(filter.apply(b"x").is_err());
    }
}
