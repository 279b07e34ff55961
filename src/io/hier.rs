//! Self-describing hierarchical shard container.
//!
//! Layout:
//!
//! ```text
//! +-------+---------+-----+---------+-----------+--------------------------+
//! | MAGIC | block 0 | ... | block n | directory | dir_off | dir_len | MAGIC |
//! +-------+---------+-----+---------+-----------+--------------------------+
//!                                               |<------ FOOTER_LEN ------>|
//! ```
//!
//! Blocks are little-endian scalar buffers passed through a per-block
//! [`BlockFilter`] and protected by a SHA-256 checksum. The directory is a
//! `postcard` encoding of [`Directory`]: an optional [`FileMetadata`] block
//! plus a flat list of named entries. Group members are addressed as
//! `group/child`, so a string dataset `s` is the group `s` with children
//! `s/values` and (when offsets were saved) `s/segments`.
//!
//! Files without a metadata block are version 0. They were written before
//! groups carried an object type; a group with a `values` child and no type is
//! read as strings.

use crate::array::ArrayData;
use crate::dtype::{DType, ScalarType};
use crate::error::{Result, StoreError};
use crate::io::compression::BlockFilter;
use crate::io::{DatasetInfo, WriteMode, validate_dataset_name, write_atomic};
use crate::segmented::{SegArray, Strings};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const MAGIC: &[u8; 8] = b"\x89ISHARD\n";
pub const CURRENT_VERSION: u32 = 1;
pub const WRITER_ID: &str = concat!("ironshard ", env!("CARGO_PKG_VERSION"));
const FOOTER_LEN: usize = 8 + 8 + MAGIC.len();
const VALUES: &str = "values";
const SEGMENTS: &str = "segments";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub version: u32,
    pub writer: String,
    pub locale: u32,
    pub num_locales: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjType {
    Strings,
    SegArray,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayEntry {
    pub dtype: ScalarType,
    pub len: u64,
    pub offset: u64,
    pub stored_len: u64,
    pub filter: BlockFilter,
    pub checksum: Vec<u8>,
    /// Shape of the whole dataset when it is a flattened multi-dimensional
    /// array; its product is the summed length over all shards.
    pub shape: Option<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub obj_type: Option<ObjType>,
    pub len: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Array(ArrayEntry),
    Group(GroupEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub node: Node,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Directory {
    pub metadata: Option<FileMetadata>,
    pub entries: Vec<Entry>,
}

impl Directory {
    fn get(&self, name: &str) -> Option<&Node> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.node)
    }

    fn occupies(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.name == name || e.name.strip_prefix(name).is_some_and(|r| r.starts_with('/')))
    }
}

/// A parsed hierarchical shard held in memory.
#[derive(Debug)]
pub struct HierShard {
    path: PathBuf,
    bytes: Vec<u8>,
    directory: Directory,
    data_end: usize,
}

impl HierShard {
    /// # Errors
    /// [`StoreError::Io`] if the file cannot be read, [`StoreError::Format`]
    /// if it is not a valid container.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
        Self::parse(path, bytes)
    }

    /// # Errors
    /// [`StoreError::Format`] on bad magic, a truncated footer, an
    /// out-of-range directory or an undecodable directory.
    pub fn parse(path: &Path, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MAGIC.len() + FOOTER_LEN || !bytes.starts_with(MAGIC) {
            return Err(StoreError::format(path, "not a hierarchical shard"));
        }
        let footer = &bytes[bytes.len() - FOOTER_LEN..];
        if &footer[16..] != MAGIC {
            return Err(StoreError::format(path, "truncated hierarchical shard"));
        }
        let dir_off = read_u64(&footer[..8]);
        let dir_len = read_u64(&footer[8..16]);
        let dir_end = bytes.len() - FOOTER_LEN;
        let (Ok(dir_off), Ok(dir_len)) = (usize::try_from(dir_off), usize::try_from(dir_len))
        else {
            return Err(StoreError::format(path, "directory out of range"));
        };
        if dir_off < MAGIC.len() || dir_off.checked_add(dir_len) != Some(dir_end) {
            return Err(StoreError::format(path, "directory out of range"));
        }
        let directory: Directory = postcard::from_bytes(&bytes[dir_off..dir_end])
            .map_err(|e| StoreError::format(path, format!("undecodable directory: {e}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            directory,
            data_end: dir_off,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.directory.metadata.as_ref()
    }

    /// 0 for legacy files without a metadata block.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.metadata().map_or(0, |m| m.version)
    }

    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Top-level datasets (entries without a `/`) in file order.
    ///
    /// # Errors
    /// [`StoreError::Format`] for groups with missing or ill-typed members.
    pub fn enumerate(&self) -> Result<Vec<DatasetInfo>> {
        self.directory
            .entries
            .iter()
            .filter(|e| !e.name.contains('/'))
            .map(|e| self.describe_node(&e.name, &e.node))
            .collect()
    }

    /// Info for any addressable name, including group members.
    ///
    /// # Errors
    /// As for [`HierShard::enumerate`].
    pub fn info(&self, name: &str) -> Result<Option<DatasetInfo>> {
        self.directory
            .get(name)
            .map(|node| self.describe_node(name, node))
            .transpose()
    }

    fn member(&self, group: &str, child: &str) -> Option<&ArrayEntry> {
        match self.directory.get(&format!("{group}/{child}")) {
            Some(Node::Array(a)) => Some(a),
            _ => None,
        }
    }

    fn group_kind(&self, name: &str, group: &GroupEntry) -> Result<(ObjType, &ArrayEntry)> {
        let values = self
            .member(name, VALUES)
            .ok_or_else(|| StoreError::format(&self.path, format!("group {name:?} has no values")))?;
        let kind = group.obj_type.unwrap_or(ObjType::Strings);
        if kind == ObjType::Strings && values.dtype != ScalarType::UInt8 {
            return Err(StoreError::format(
                &self.path,
                format!("string group {name:?} stores {} values", values.dtype),
            ));
        }
        Ok((kind, values))
    }

    fn describe_node(&self, name: &str, node: &Node) -> Result<DatasetInfo> {
        match node {
            Node::Array(a) => {
                Ok(DatasetInfo::new(name, a.dtype.into(), a.len).with_shape(a.shape.clone()))
            }
            Node::Group(g) => {
                let (kind, values) = self.group_kind(name, g)?;
                let segments = self.member(name, SEGMENTS);
                let dtype = match kind {
                    ObjType::Strings => DType::Str,
                    ObjType::SegArray => DType::List(values.dtype),
                };
                let len = match (g.len, segments) {
                    (Some(n), _) => n,
                    (None, Some(s)) => s.len,
                    (None, None) if kind == ObjType::Strings => {
                        let raw = self.block_bytes(values)?;
                        raw.iter().filter(|&&b| b == crate::segmented::SENTINEL).count() as u64
                    }
                    (None, None) => {
                        return Err(StoreError::format(
                            &self.path,
                            format!("list group {name:?} has no segments"),
                        ));
                    }
                };
                Ok(DatasetInfo::new(name, dtype, len))
            }
        }
    }

    fn block_bytes(&self, entry: &ArrayEntry) -> Result<Vec<u8>> {
        let start = usize::try_from(entry.offset).unwrap_or(usize::MAX);
        let len = usize::try_from(entry.stored_len).unwrap_or(usize::MAX);
        let stored = start
            .checked_add(len)
            .filter(|&end| start >= MAGIC.len() && end <= self.data_end)
            .map(|end| &self.bytes[start..end])
            .ok_or_else(|| StoreError::format(&self.path, "block out of range"))?;
        if Sha256::digest(stored).as_slice() != entry.checksum.as_slice() {
            return Err(StoreError::format(&self.path, "block checksum mismatch"));
        }
        entry
            .filter
            .invert(stored)
            .map_err(|e| StoreError::format(&self.path, format!("{} block: {e}", entry.filter)))
    }

    fn read_array(&self, name: &str, entry: &ArrayEntry) -> Result<ArrayData> {
        let raw = self.block_bytes(entry)?;
        let data = ArrayData::from_le_bytes(entry.dtype, &raw)
            .map_err(|e| StoreError::format(&self.path, format!("{name}: {e}")))?;
        if data.len() as u64 != entry.len {
            return Err(StoreError::format(
                &self.path,
                format!("{name}: expected {} elements, found {}", entry.len, data.len()),
            ));
        }
        Ok(data)
    }

    fn read_offsets(&self, name: &str, entry: &ArrayEntry) -> Result<Vec<u64>> {
        let bad = || StoreError::format(&self.path, format!("{name}/{SEGMENTS} is not int64"));
        let data = self.read_array(name, entry)?;
        data.as_int64()
            .ok_or_else(bad)?
            .iter()
            .map(|&o| u64::try_from(o).map_err(|_| bad()))
            .collect()
    }

    /// Read a dataset or group member by name.
    ///
    /// # Errors
    /// [`StoreError::DatasetNotFound`] for an unknown name and
    /// [`StoreError::Format`] for corrupt blocks or inconsistent groups.
    pub fn read(&self, name: &str, calc_offsets: bool) -> Result<ArrayData> {
        let node = self.directory.get(name).ok_or_else(|| StoreError::DatasetNotFound {
            dataset: name.to_owned(),
            location: self.path.display().to_string(),
        })?;
        let group = match node {
            Node::Array(a) => return self.read_array(name, a),
            Node::Group(g) => g,
        };
        let (kind, values) = self.group_kind(name, group)?;
        let segments = self.member(name, SEGMENTS);
        let corrupt = |e: StoreError| StoreError::format(&self.path, format!("{name}: {e}"));
        match kind {
            ObjType::Strings => {
                let bytes = match self.read_array(name, values)? {
                    ArrayData::UInt8(b) => b,
                    other => {
                        return Err(StoreError::format(
                            &self.path,
                            format!("{name}: string values stored as {}", other.dtype()),
                        ));
                    }
                };
                let strings = match segments {
                    Some(seg) if !calc_offsets => {
                        Strings::from_parts(bytes, self.read_offsets(name, seg)?)
                    }
                    _ => Strings::from_values(bytes),
                };
                strings.map(ArrayData::Str).map_err(corrupt)
            }
            ObjType::SegArray => {
                let seg = segments.ok_or_else(|| {
                    StoreError::format(&self.path, format!("list group {name:?} has no segments"))
                })?;
                let offsets = self.read_offsets(name, seg)?;
                SegArray::new(self.read_array(name, values)?, offsets)
                    .map(ArrayData::List)
                    .map_err(corrupt)
            }
        }
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Settings for one hierarchical shard write.
#[derive(Debug, Clone, Default)]
pub struct HierWriteSettings {
    pub filter: BlockFilter,
    /// Persist string offsets. Lists always persist theirs.
    pub save_offsets: bool,
    /// Write a version 0 file: no metadata block, untyped string groups.
    pub legacy: bool,
    pub locale: u32,
    pub num_locales: u32,
    /// Shapes of multi-dimensional datasets, by name.
    pub shapes: HashMap<String, Vec<u64>>,
}

struct ShardBuilder<'a> {
    path: &'a Path,
    buf: Vec<u8>,
    directory: Directory,
    settings: &'a HierWriteSettings,
}

impl ShardBuilder<'_> {
    fn push_block(&mut self, name: String, data: &ArrayData, shape: Option<Vec<u64>>) -> Result<()> {
        let (Some(dtype), Some(raw)) = (data.scalar_type(), data.to_le_bytes()) else {
            return Err(StoreError::invalid(format!("{name}: block must be scalar")));
        };
        let stored = self
            .settings
            .filter
            .apply(&raw)
            .map_err(|e| StoreError::io(self.path, e))?;
        let entry = ArrayEntry {
            dtype,
            len: data.len() as u64,
            offset: self.buf.len() as u64,
            stored_len: stored.len() as u64,
            filter: self.settings.filter.clone(),
            checksum: Sha256::digest(&stored).to_vec(),
            shape,
        };
        self.buf.extend_from_slice(&stored);
        self.directory.entries.push(Entry {
            name,
            node: Node::Array(entry),
        });
        Ok(())
    }

    fn push_group(&mut self, name: &str, obj_type: ObjType, len: usize) {
        let legacy = self.settings.legacy;
        self.directory.entries.push(Entry {
            name: name.to_owned(),
            node: Node::Group(GroupEntry {
                obj_type: (!legacy).then_some(obj_type),
                len: (!legacy).then_some(len as u64),
            }),
        });
    }

    fn push_offsets(&mut self, name: &str, offsets: &[u64]) -> Result<()> {
        let offsets = offsets
            .iter()
            .map(|&o| i64::try_from(o))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| StoreError::invalid(format!("{name}: offsets exceed int64")))?;
        self.push_block(format!("{name}/{SEGMENTS}"), &ArrayData::Int64(offsets), None)
    }

    fn push_dataset(&mut self, name: &str, data: &ArrayData) -> Result<()> {
        match data {
            ArrayData::Str(s) => {
                self.push_group(name, ObjType::Strings, s.len());
                self.push_block(
                    format!("{name}/{VALUES}"),
                    &ArrayData::UInt8(s.values().to_vec()),
                    None,
                )?;
                if self.settings.save_offsets {
                    self.push_offsets(name, s.offsets())?;
                }
                Ok(())
            }
            ArrayData::List(l) => {
                if self.settings.legacy {
                    return Err(StoreError::invalid(format!(
                        "{name}: legacy shards cannot hold list datasets"
                    )));
                }
                self.push_group(name, ObjType::SegArray, l.len());
                self.push_block(format!("{name}/{VALUES}"), l.values(), None)?;
                self.push_offsets(name, l.offsets())
            }
            scalar => {
                let shape = self.settings.shapes.get(name).cloned();
                self.push_block(name.to_owned(), scalar, shape)
            }
        }
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let dir_off = self.buf.len() as u64;
        let dir = postcard::to_allocvec(&self.directory)
            .map_err(|e| StoreError::format(self.path, format!("encoding directory: {e}")))?;
        self.buf.extend_from_slice(&dir);
        self.buf.extend_from_slice(&dir_off.to_le_bytes());
        self.buf.extend_from_slice(&(dir.len() as u64).to_le_bytes());
        self.buf.extend_from_slice(MAGIC);
        Ok(self.buf)
    }
}

/// Write `datasets` to the shard at `path`.
///
/// In [`WriteMode::Append`] the existing blocks and entries are kept and the
/// new datasets are added after them; a missing file is created.
///
/// # Errors
/// [`StoreError::DatasetNameCollision`] if an appended name already exists
/// (as a dataset or a group), [`StoreError::InvalidArgument`] for unusable
/// names, plus I/O and format errors of the existing shard.
pub fn write_shard(
    path: &Path,
    datasets: &[(&str, &ArrayData)],
    mode: WriteMode,
    settings: &HierWriteSettings,
) -> Result<()> {
    let existing = match mode {
        WriteMode::Append if path.exists() => Some(HierShard::open(path)?),
        _ => None,
    };
    let (buf, directory) = match existing {
        Some(shard) => {
            let mut bytes = shard.bytes;
            bytes.truncate(shard.data_end);
            (bytes, shard.directory)
        }
        None => {
            let metadata = (!settings.legacy).then(|| FileMetadata {
                version: CURRENT_VERSION,
                writer: WRITER_ID.to_owned(),
                locale: settings.locale,
                num_locales: settings.num_locales,
            });
            (
                MAGIC.to_vec(),
                Directory {
                    metadata,
                    entries: Vec::new(),
                },
            )
        }
    };

    let mut builder = ShardBuilder {
        path,
        buf,
        directory,
        settings,
    };
    for (name, data) in datasets {
        validate_dataset_name(name)?;
        if builder.directory.occupies(name) {
            return Err(StoreError::DatasetNameCollision {
                dataset: (*name).to_owned(),
                path: path.to_path_buf(),
            });
        }
        builder.push_dataset(name, data)?;
    }
    debug!(
        "{:?} {} dataset(s) to {} with filter {}",
        mode,
        datasets.len(),
        path.display(),
        settings.filter
    );
    write_atomic(path, &builder.finish()?)
}
