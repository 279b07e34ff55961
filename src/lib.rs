//! # Ironshard
//!
//! A **multi-locale dataset persistence** library. A collection of named,
//! typed, one-dimensional arrays is split into contiguous blocks, one per
//! locale, and each block is written to its own shard file. Reads resolve a
//! prefix, glob or file list back to the shards, reconcile the per-shard
//! types and reassemble the arrays in shard order.
//!
//! ## Key Features
//!
//! - **Three shard formats** - a checksummed hierarchical container, Apache
//!   Parquet, and delimited text with a typed header block
//! - **Strings and lists** - variable-length entries stored as a flat value
//!   buffer plus segment offsets
//! - **Type reconciliation** - strict by default, optionally widening integer
//!   and float widths across shards
//! - **Append** - add datasets to existing shards without rewriting them
//! - **Best-effort reads** - skip unreadable shards and report them
//! - **Parallel I/O** - shards are written, opened and decoded on the rayon pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironshard::*;
//!
//! # fn main() -> std::result::Result<(), StoreError> {
//! let mut data = Collection::new();
//! data.insert("ids", ArrayData::Int64((0..1_000).collect()));
//! data.insert("names", ArrayData::strings((0..1_000).map(|i| format!("item {i}")))?);
//!
//! // Four shards: out/items_LOCALE0000 .. out/items_LOCALE0003
//! let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(4);
//! write_collection("out/items", &data, &opts)?;
//!
//! let ids = load("out/items", "ids", &ReadOptions::default())?;
//! assert_eq!(ids.len(), 1_000);
//! println!("{}", ls("out/items_LOCALE0000")?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Shard Naming
//!
//! Shard `i` of prefix `p` is `p_LOCALE<i>` with the index zero-padded to four
//! digits. An extension on the prefix moves after the marker, so `data.csv`
//! becomes `data_LOCALE0000.csv`. Reads accept the bare prefix, a glob such as
//! `out/items_LOCALE*`, or an explicit list of files.
//!
//! ## Configuration
//!
//! [`StoreConfig`] carries store-wide defaults (locale count, strictness,
//! codecs) and can be loaded from the environment or a JSON file. Options are
//! then refined per call with the [`WriteOptions`] and [`ReadOptions`]
//! builders.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: shard resolution, opens and
//! writes at `debug`, skipped shards of a best-effort read at `warn`.
//!
//! ## Feature Flags
//!
//! - `compression-gzip` (default) - gzip block filter
//! - `compression-zstd` (default) - zstd block filter
//!
//! ## Module Overview
//!
//! - [`store`] - read and write orchestration
//! - [`io`] - the shard formats, path resolution and block filters
//! - [`array`], [`segmented`], [`dtype`] - the in-memory data model
//! - [`reconcile`], [`assemble`], [`registry`] - cross-shard typing and
//!   assembly
//! - [`config`], [`error`] - defaults and errors
//! - [`testing`] - assertions and fixtures for tests

pub mod array;
pub mod assemble;
pub mod config;
pub mod dtype;
pub mod error;
pub mod io;
pub mod reconcile;
pub mod registry;
pub mod segmented;
pub mod store;
pub mod testing;

// General re-exports
pub use array::ArrayData;
pub use config::StoreConfig;
pub use dtype::{DType, ElementKind, ScalarType};
pub use error::{PartialReadFailure, Result, ShardFailure, StoreError};
pub use io::compression::BlockFilter;
pub use io::parquet::Compression;
pub use io::{DatasetInfo, FileFormat, ShardDescriptor, WriteMode};
pub use reconcile::Strictness;
pub use segmented::{SegArray, Strings};
pub use store::{
    Collection, ReadOptions, WriteOptions, get_datasets, load, load_all, ls, null_indices, read,
    read_csv, read_hierarchical, read_parquet, write_collection, write_dataset, write_partitioned,
};
