//! Physical shard formats behind one `enumerate`/`read`/`write` surface.
//!
//! | Format | Module | Detection |
//! |--------|--------|-----------|
//! | Hierarchical container | [`hier`] | leading [`hier::MAGIC`] |
//! | Apache Parquet | [`parquet`] | leading `PAR1` |
//! | Delimited text | [`csv`] | `**HEADER**` first line, or `.csv`/`.txt`/`.tsv` |
//!
//! Detection is per file, so one read may mix formats. A caller-supplied
//! [`FileFormat`] overrides detection (needed for header-less text files with
//! unusual extensions).

pub mod compression;
pub mod csv;
pub mod glob;
pub mod hier;
pub mod parquet;

use crate::array::ArrayData;
use crate::dtype::DType;
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// How a write treats an existing shard file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteMode {
    /// Replace the shard with exactly the datasets written.
    #[default]
    Truncate,
    /// Add datasets to the shard, creating it if missing.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    Hierarchical,
    Columnar,
    Delimited,
}

impl FileFormat {
    /// Sniff the format of `path` from its first bytes, falling back to its
    /// extension for header-less delimited text.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the file cannot be opened or read and
    /// [`StoreError::Format`] if nothing matches.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut head = [0u8; 16];
        let n = File::open(path)
            .and_then(|mut f| read_prefix(&mut f, &mut head))
            .map_err(|e| StoreError::io(path, e))?;
        let head = &head[..n];

        if head.starts_with(parquet::PARQUET_MAGIC) {
            return Ok(Self::Columnar);
        }
        if head.starts_with(hier::MAGIC) {
            return Ok(Self::Hierarchical);
        }
        if head.starts_with(csv::HEADER_START.as_bytes()) {
            return Ok(Self::Delimited);
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv" | "txt" | "tsv") => Ok(Self::Delimited),
            _ => Err(StoreError::format(
                path,
                "not a recognized shard file (no hierarchical, parquet or delimited header)",
            )),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Hierarchical => "hierarchical",
            Self::Columnar => "parquet",
            Self::Delimited => "delimited",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// One dataset as seen in one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    pub name: String,
    /// `None` for columns whose physical type has no [`DType`] counterpart.
    pub dtype: Option<DType>,
    pub segmented: bool,
    pub len: u64,
    /// Row-major shape of a flattened multi-dimensional dataset. `len` is
    /// this shard's share; the shape describes the whole dataset.
    pub shape: Option<Vec<u64>>,
}

impl DatasetInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, dtype: DType, len: u64) -> Self {
        Self {
            name: name.into(),
            dtype: Some(dtype),
            segmented: dtype.is_segmented(),
            len,
            shape: None,
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: Option<Vec<u64>>) -> Self {
        self.shape = shape;
        self
    }
}

/// An opened shard of any supported format.
#[derive(Debug)]
pub enum ShardDescriptor {
    Hierarchical {
        version: u32,
        shard: hier::HierShard,
    },
    Columnar {
        compression: parquet::Compression,
        shard: parquet::ParquetShard,
    },
    DelimitedWithHeader {
        shard: csv::DelimitedShard,
    },
    DelimitedWithoutHeader {
        shard: csv::DelimitedShard,
    },
}

impl ShardDescriptor {
    /// Open `path`, detecting its format unless `format` is given.
    ///
    /// # Errors
    /// [`StoreError::Io`] for a missing or unreadable file and
    /// [`StoreError::Format`] for a file that does not parse.
    pub fn open(path: &Path, format: Option<FileFormat>, delimiter: &str) -> Result<Self> {
        let format = match format {
            Some(f) => f,
            None => FileFormat::detect(path)?,
        };
        log::debug!("opening {} as {format}", path.display());
        Ok(match format {
            FileFormat::Hierarchical => {
                let shard = hier::HierShard::open(path)?;
                Self::Hierarchical {
                    version: shard.version(),
                    shard,
                }
            }
            FileFormat::Columnar => {
                let shard = parquet::ParquetShard::open(path)?;
                Self::Columnar {
                    compression: shard.compression(),
                    shard,
                }
            }
            FileFormat::Delimited => {
                let shard = csv::DelimitedShard::open(path, delimiter)?;
                if shard.has_header() {
                    Self::DelimitedWithHeader { shard }
                } else {
                    Self::DelimitedWithoutHeader { shard }
                }
            }
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Hierarchical { shard, .. } => shard.path(),
            Self::Columnar { shard, .. } => shard.path(),
            Self::DelimitedWithHeader { shard } | Self::DelimitedWithoutHeader { shard } => {
                shard.path()
            }
        }
    }

    #[must_use]
    pub fn format(&self) -> FileFormat {
        match self {
            Self::Hierarchical { .. } => FileFormat::Hierarchical,
            Self::Columnar { .. } => FileFormat::Columnar,
            Self::DelimitedWithHeader { .. } | Self::DelimitedWithoutHeader { .. } => {
                FileFormat::Delimited
            }
        }
    }

    /// Every top-level dataset in file order.
    ///
    /// # Errors
    /// [`StoreError::Format`] when the shard's metadata is inconsistent.
    pub fn enumerate(&self) -> Result<Vec<DatasetInfo>> {
        match self {
            Self::Hierarchical { shard, .. } => shard.enumerate(),
            Self::Columnar { shard, .. } => Ok(shard.enumerate()),
            Self::DelimitedWithHeader { shard } | Self::DelimitedWithoutHeader { shard } => {
                Ok(shard.enumerate())
            }
        }
    }

    /// Look up one dataset by name. Hierarchical shards also resolve group
    /// components such as `strings/values`.
    ///
    /// # Errors
    /// As for [`ShardDescriptor::enumerate`].
    pub fn info(&self, name: &str) -> Result<Option<DatasetInfo>> {
        match self {
            Self::Hierarchical { shard, .. } => shard.info(name),
            _ => Ok(self.enumerate()?.into_iter().find(|d| d.name == name)),
        }
    }

    /// Read one dataset. `calc_offsets` recomputes string offsets by scanning
    /// for terminators instead of trusting stored ones.
    ///
    /// # Errors
    /// [`StoreError::DatasetNotFound`] when `name` is absent and
    /// [`StoreError::Format`] when its data does not decode.
    pub fn read(&self, name: &str, calc_offsets: bool) -> Result<ArrayData> {
        match self {
            Self::Hierarchical { shard, .. } => shard.read(name, calc_offsets),
            Self::Columnar { shard, .. } => shard.read(name),
            Self::DelimitedWithHeader { shard } | Self::DelimitedWithoutHeader { shard } => {
                shard.read(name)
            }
        }
    }

    /// Human-readable summary of the shard and its datasets.
    ///
    /// # Errors
    /// As for [`ShardDescriptor::enumerate`].
    pub fn describe(&self) -> Result<String> {
        let mut out = String::new();
        let _ = write!(out, "{}: {}", self.path().display(), self.format());
        match self {
            Self::Hierarchical { version, shard } => {
                let _ = write!(out, " (version {version}");
                if let Some(meta) = shard.metadata() {
                    let _ = write!(
                        out,
                        ", locale {} of {}, written by {}",
                        meta.locale, meta.num_locales, meta.writer
                    );
                }
                out.push(')');
            }
            Self::Columnar { compression, shard } => {
                let _ = write!(
                    out,
                    " ({} rows in {} row group(s), {compression})",
                    shard.num_rows(),
                    shard.num_row_groups()
                );
            }
            Self::DelimitedWithHeader { .. } => out.push_str(" (typed header)"),
            Self::DelimitedWithoutHeader { .. } => out.push_str(" (no header)"),
        }
        out.push('\n');
        for info in self.enumerate()? {
            let dtype = info.dtype.map_or_else(|| "unsupported".to_owned(), |t| t.to_string());
            let shape = info
                .shape
                .map(|s| format!(" shape {s:?}"))
                .unwrap_or_default();
            let _ = writeln!(out, "  {:<24} {:<14} {}{shape}", info.name, dtype, info.len);
        }
        Ok(out)
    }
}

/// Write `bytes` to `path` atomically: a temporary sibling is written, then
/// renamed over the target. Parent directories are created as needed.
///
/// # Errors
/// [`StoreError::Io`] naming `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| StoreError::io(path, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io(path, e))?;
    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Reject dataset names the formats cannot address.
pub(crate) fn validate_dataset_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::invalid("dataset name must not be empty"));
    }
    if name.contains('/') {
        return Err(StoreError::invalid(format!(
            "dataset name {name:?} must not contain '/'"
        )));
    }
    Ok(())
}
