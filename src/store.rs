//! Multi-locale read and write orchestration.
//!
//! # Write path
//!
//! A [`Collection`] is split into `num_locales` contiguous blocks (the first
//! `len % num_locales` blocks get one extra element) and each block is written
//! to its own shard `<prefix>_LOCALE<NNNN>` on the rayon pool. Callers that
//! already hold per-locale data use [`write_partitioned`].
//!
//! # Read path
//!
//! 1. Resolve the sources to shard paths ([`crate::io::glob`]).
//! 2. Open and list every shard in parallel.
//! 3. Apply the error policy: fail fast, or with `allow_errors` skip
//!    unreadable shards.
//! 4. Register datasets across shards and reconcile their types.
//! 5. Read every shard's contribution in parallel.
//! 6. Assemble in shard order.
//!
//! A best-effort read that skipped shards logs a warning and attaches a
//! [`PartialReadFailure`] to the returned [`Collection`].
//!
//! ```no_run
//! use ironshard::{ArrayData, Collection, FileFormat, ReadOptions, WriteOptions};
//! use ironshard::store::{load_all, write_collection};
//!
//! let mut data = Collection::new();
//! data.insert("ids", ArrayData::Int64((0..100).collect()));
//! data.insert("names", ArrayData::strings((0..100).map(|i| format!("n{i}")))?);
//!
//! let opts = WriteOptions::new(FileFormat::Hierarchical).num_locales(4);
//! write_collection("out/data", &data, &opts)?;
//!
//! let back = load_all("out/data", &ReadOptions::default())?;
//! assert_eq!(back.get("ids"), data.get("ids"));
//! # Ok::<(), ironshard::StoreError>(())
//! ```

use crate::array::ArrayData;
use crate::assemble::assemble;
use crate::config::StoreConfig;
use crate::error::{PartialReadFailure, Result, ShardFailure, StoreError};
use crate::io::compression::BlockFilter;
use crate::io::glob::{
    is_glob, locale_index, resolve_expected, resolve_prefix, resolve_sources, split_extension,
    surplus_shards, with_locale,
};
use crate::io::hier::{self, HierWriteSettings};
use crate::io::parquet::{self, Compression, ParquetWriteSettings};
use crate::io::{DatasetInfo, ShardDescriptor, csv};
use crate::reconcile::Strictness;
use crate::registry::DatasetRegistry;
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};

pub use crate::io::{FileFormat, WriteMode};

/// Options for a write.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub format: FileFormat,
    pub mode: WriteMode,
    pub num_locales: usize,
    /// Persist string offsets (hierarchical only).
    pub save_offsets: bool,
    pub compression: Compression,
    pub block_filter: BlockFilter,
    /// Write version 0 hierarchical shards.
    pub legacy: bool,
    pub delimiter: String,
    pub row_group_size: Option<usize>,
}

impl WriteOptions {
    #[must_use]
    pub fn new(format: FileFormat) -> Self {
        Self::from_config(format, &StoreConfig::default())
    }

    #[must_use]
    pub fn from_config(format: FileFormat, cfg: &StoreConfig) -> Self {
        Self {
            format,
            mode: WriteMode::Truncate,
            num_locales: cfg.num_locales,
            save_offsets: true,
            compression: cfg.compression,
            block_filter: cfg.block_filter.clone(),
            legacy: false,
            delimiter: cfg.delimiter.clone(),
            row_group_size: None,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn append(self) -> Self {
        self.mode(WriteMode::Append)
    }

    #[must_use]
    pub fn num_locales(mut self, n: usize) -> Self {
        self.num_locales = n;
        self
    }

    #[must_use]
    pub fn save_offsets(mut self, save: bool) -> Self {
        self.save_offsets = save;
        self
    }

    #[must_use]
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn block_filter(mut self, filter: BlockFilter) -> Self {
        self.block_filter = filter;
        self
    }

    #[must_use]
    pub fn legacy(mut self, legacy: bool) -> Self {
        self.legacy = legacy;
        self
    }

    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    #[must_use]
    pub fn row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = Some(rows);
        self
    }
}

/// Options for a read.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Datasets to read; `None` reads every dataset found.
    pub datasets: Option<Vec<String>>,
    pub strictness: Strictness,
    pub allow_errors: bool,
    /// Recompute string offsets instead of trusting stored ones.
    pub calc_string_offsets: bool,
    /// Skip per-file format detection.
    pub format: Option<FileFormat>,
    pub delimiter: String,
    /// Reject globs that match more than one dataset family.
    pub single_family: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl ReadOptions {
    #[must_use]
    pub fn from_config(cfg: &StoreConfig) -> Self {
        Self {
            datasets: None,
            strictness: Strictness::from_strict(cfg.strict_types),
            allow_errors: cfg.allow_errors,
            calc_string_offsets: false,
            format: None,
            delimiter: cfg.delimiter.clone(),
            single_family: false,
        }
    }

    #[must_use]
    pub fn dataset(mut self, name: impl Into<String>) -> Self {
        self.datasets.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    #[must_use]
    pub fn datasets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.datasets = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strictness = Strictness::from_strict(strict);
        self
    }

    #[must_use]
    pub fn allow_errors(mut self, allow: bool) -> Self {
        self.allow_errors = allow;
        self
    }

    #[must_use]
    pub fn calc_string_offsets(mut self, calc: bool) -> Self {
        self.calc_string_offsets = calc;
        self
    }

    #[must_use]
    pub fn format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    #[must_use]
    pub fn single_family(mut self, single: bool) -> Self {
        self.single_family = single;
        self
    }
}

/// Named datasets in insertion order.
///
/// A scalar dataset may carry a row-major shape, in which case its data is
/// the flattened array.
#[derive(Debug, Default)]
pub struct Collection {
    datasets: Vec<(String, ArrayData)>,
    shapes: HashMap<String, Vec<u64>>,
    partial_failure: Option<PartialReadFailure>,
}

/// Element count of `shape`, or `None` on overflow.
fn shape_len(shape: &[u64]) -> Option<u64> {
    shape.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d))
}

impl Collection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`, returning the replaced data.
    pub fn insert(&mut self, name: impl Into<String>, data: ArrayData) -> Option<ArrayData> {
        let name = name.into();
        self.shapes.remove(&name);
        match self.datasets.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, data)),
            None => {
                self.datasets.push((name, data));
                None
            }
        }
    }

    /// Insert a flattened multi-dimensional array with its row-major
    /// `shape`, returning the replaced data.
    ///
    /// # Errors
    /// [`StoreError::InvalidArgument`] when `data` is not a scalar array, the
    /// shape is empty, or its product differs from the data length.
    pub fn insert_shaped(
        &mut self,
        name: impl Into<String>,
        data: ArrayData,
        shape: Vec<u64>,
    ) -> Result<Option<ArrayData>> {
        let name = name.into();
        if data.scalar_type().is_none() {
            return Err(StoreError::invalid(format!(
                "{name}: only scalar arrays can carry a shape, got {}",
                data.dtype()
            )));
        }
        if shape.is_empty() || shape_len(&shape) != Some(data.len() as u64) {
            return Err(StoreError::invalid(format!(
                "{name}: shape {shape:?} does not match {} elements",
                data.len()
            )));
        }
        let old = self.insert(name.clone(), data);
        self.shapes.insert(name, shape);
        Ok(old)
    }

    /// Row-major shape of `name`, if it was stored as a multi-dimensional
    /// array.
    #[must_use]
    pub fn shape(&self, name: &str) -> Option<&[u64]> {
        self.shapes.get(name).map(Vec::as_slice)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArrayData> {
        self.datasets.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn remove(&mut self, name: &str) -> Option<ArrayData> {
        self.shapes.remove(name);
        let idx = self.datasets.iter().position(|(n, _)| n == name)?;
        Some(self.datasets.remove(idx).1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.datasets.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayData)> {
        self.datasets.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Shards a best-effort read skipped, if any.
    #[must_use]
    pub fn partial_failure(&self) -> Option<&PartialReadFailure> {
        self.partial_failure.as_ref()
    }

    pub fn take_partial_failure(&mut self) -> Option<PartialReadFailure> {
        self.partial_failure.take()
    }
}

impl IntoIterator for Collection {
    type Item = (String, ArrayData);
    type IntoIter = std::vec::IntoIter<(String, ArrayData)>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.into_iter()
    }
}

impl<S: Into<String>> FromIterator<(S, ArrayData)> for Collection {
    fn from_iter<I: IntoIterator<Item = (S, ArrayData)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (name, data) in iter {
            out.insert(name, data);
        }
        out
    }
}

/// Split `len` elements into exactly `parts` contiguous ranges; the first
/// `len % parts` ranges get one extra element and trailing ranges may be
/// empty.
#[must_use]
pub fn split_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1);
    let base = len / parts;
    let rem = len % parts;

    let mut out = Vec::with_capacity(parts);
    let mut start = 0usize;
    for idx in 0..parts {
        let end = start + base + usize::from(idx < rem);
        out.push(start..end);
        start = end;
    }
    out
}

/// Absolute shard paths for a write of `n` locales. An extension on `prefix`
/// is moved after the locale marker (`data.csv` becomes
/// `data_LOCALE0000.csv`).
///
/// # Errors
/// [`StoreError::InvalidArgument`] for a blank prefix or `n == 0`.
pub fn shard_paths(prefix: &str, n: usize) -> Result<Vec<PathBuf>> {
    let (stem, ext) = split_extension(Path::new(prefix));
    resolve_expected(&stem.to_string_lossy(), n, ext.as_deref())
}

type LocaleData = Vec<(String, ArrayData)>;

type Shapes = HashMap<String, Vec<u64>>;

fn validate_write(prefix: &str, opts: &WriteOptions, per_locale: &[LocaleData], shapes: &Shapes) -> Result<()> {
    if prefix.trim().is_empty() {
        return Err(StoreError::invalid("prefix must not be empty"));
    }
    if per_locale.is_empty() {
        return Err(StoreError::invalid("num_locales must be positive"));
    }
    if per_locale.iter().all(Vec::is_empty) {
        return Err(StoreError::invalid("no datasets to write"));
    }
    if let Some(name) = shapes.keys().next()
        && (opts.format != FileFormat::Hierarchical || opts.legacy)
    {
        return Err(StoreError::invalid(format!(
            "{name}: shaped datasets need current hierarchical shards"
        )));
    }
    if opts.format == FileFormat::Delimited {
        if opts.mode == WriteMode::Append {
            return Err(StoreError::invalid(
                "append is not supported for delimited text",
            ));
        }
        if let Some((name, _)) = per_locale
            .iter()
            .flatten()
            .find(|(_, d)| matches!(d, ArrayData::List(_)))
        {
            return Err(StoreError::invalid(format!(
                "{name}: lists cannot be written as delimited text"
            )));
        }
    }
    Ok(())
}

/// Check appended names against the existing shards before touching any.
fn check_append(prefix: &str, paths: &[PathBuf], per_locale: &[LocaleData], opts: &WriteOptions) -> Result<()> {
    match resolve_prefix(prefix) {
        Ok(existing) if existing.len() != paths.len() => {
            return Err(StoreError::invalid(format!(
                "cannot append {} locale(s) to {prefix}, which has {} shard(s)",
                paths.len(),
                existing.len()
            )));
        }
        Ok(_) | Err(StoreError::NotFound { .. }) => {}
        Err(e) => return Err(e),
    }
    paths
        .par_iter()
        .zip(per_locale.par_iter())
        .filter(|(path, _)| path.exists())
        .try_for_each(|(path, datasets)| {
            let shard = ShardDescriptor::open(path, Some(opts.format), &opts.delimiter)?;
            let existing: Vec<DatasetInfo> = shard.enumerate()?;
            match datasets
                .iter()
                .find(|(name, _)| existing.iter().any(|e| e.name == *name))
            {
                Some((name, _)) => Err(StoreError::DatasetNameCollision {
                    dataset: name.clone(),
                    path: path.clone(),
                }),
                None => Ok(()),
            }
        })
}

fn write_shard(
    path: &Path,
    locale: usize,
    num_locales: usize,
    datasets: &LocaleData,
    shapes: &Shapes,
    opts: &WriteOptions,
) -> Result<()> {
    let refs: Vec<(&str, &ArrayData)> = datasets.iter().map(|(n, d)| (n.as_str(), d)).collect();
    match opts.format {
        FileFormat::Hierarchical => {
            let settings = HierWriteSettings {
                filter: opts.block_filter.clone(),
                save_offsets: opts.save_offsets,
                legacy: opts.legacy,
                locale: u32::try_from(locale).unwrap_or(u32::MAX),
                num_locales: u32::try_from(num_locales).unwrap_or(u32::MAX),
                shapes: shapes.clone(),
            };
            hier::write_shard(path, &refs, opts.mode, &settings)
        }
        FileFormat::Columnar => {
            let settings = ParquetWriteSettings {
                compression: opts.compression,
                row_group_size: opts.row_group_size,
            };
            parquet::write_shard(path, &refs, opts.mode, settings)
        }
        FileFormat::Delimited => csv::write_shard(path, &refs, &opts.delimiter),
    }
}

fn write_locales(
    prefix: &str,
    per_locale: Vec<LocaleData>,
    shapes: &Shapes,
    opts: &WriteOptions,
) -> Result<Vec<PathBuf>> {
    validate_write(prefix, opts, &per_locale, shapes)?;
    let paths = shard_paths(prefix, per_locale.len())?;
    if opts.mode == WriteMode::Append {
        check_append(prefix, &paths, &per_locale, opts)?;
    }
    let n = per_locale.len();
    paths
        .par_iter()
        .zip(per_locale.par_iter())
        .enumerate()
        .try_for_each(|(locale, (path, datasets))| write_shard(path, locale, n, datasets, shapes, opts))?;
    if opts.mode == WriteMode::Truncate {
        remove_surplus(prefix, n)?;
    }
    debug!(
        "{:?} {} shard(s) under {prefix} as {}",
        opts.mode,
        paths.len(),
        opts.format
    );
    Ok(paths)
}

/// Delete shards of `prefix` beyond the `n` just written.
fn remove_surplus(prefix: &str, n: usize) -> Result<()> {
    let (stem, ext) = split_extension(Path::new(prefix));
    for path in surplus_shards(&stem, ext.as_deref(), n)? {
        debug!("removing surplus shard {}", path.display());
        std::fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
    }
    Ok(())
}

/// Split every dataset of `data` across `opts.num_locales` shards and write
/// them.
///
/// # Errors
/// [`StoreError::InvalidArgument`] for a blank prefix, no datasets, zero
/// locales, or a combination the format cannot store;
/// [`StoreError::DatasetNameCollision`] when appending an existing name; and
/// the I/O errors of the shard writers. Each shard is replaced atomically.
pub fn write_collection(prefix: &str, data: &Collection, opts: &WriteOptions) -> Result<Vec<PathBuf>> {
    let n = opts.num_locales;
    let mut per_locale: Vec<LocaleData> = (0..n).map(|_| Vec::new()).collect();
    for (name, array) in data.iter() {
        for (locale, range) in split_ranges(array.len(), n).into_iter().enumerate() {
            if let Some(slot) = per_locale.get_mut(locale) {
                slot.push((name.to_owned(), array.slice(range)));
            }
        }
    }
    write_locales(prefix, per_locale, &data.shapes, opts)
}

/// Write a single dataset.
///
/// # Errors
/// As for [`write_collection`].
pub fn write_dataset(prefix: &str, name: &str, data: &ArrayData, opts: &WriteOptions) -> Result<Vec<PathBuf>> {
    let mut collection = Collection::new();
    collection.insert(name, data.clone());
    write_collection(prefix, &collection, opts)
}

/// Write pre-partitioned data: `parts[i]` becomes shard `i`. A dataset may be
/// absent from some parts. `opts.num_locales` is ignored. A shape given in
/// any part describes the whole dataset.
///
/// # Errors
/// As for [`write_collection`].
pub fn write_partitioned(prefix: &str, parts: &[Collection], opts: &WriteOptions) -> Result<Vec<PathBuf>> {
    let per_locale = parts
        .iter()
        .map(|c| c.iter().map(|(n, d)| (n.to_owned(), d.clone())).collect())
        .collect();
    let mut shapes = Shapes::new();
    for part in parts {
        for (name, shape) in &part.shapes {
            shapes.entry(name.clone()).or_insert_with(|| shape.clone());
        }
    }
    write_locales(prefix, per_locale, &shapes, opts)
}

type Opened = (PathBuf, Result<(ShardDescriptor, Vec<DatasetInfo>)>);

/// Locale count recorded by the lowest-numbered hierarchical shard.
fn recorded_locales(opened: &[Opened]) -> Option<usize> {
    opened.iter().find_map(|(_, outcome)| match outcome {
        Ok((ShardDescriptor::Hierarchical { shard, .. }, _)) => shard
            .metadata()
            .and_then(|m| usize::try_from(m.num_locales).ok()),
        _ => None,
    })
}

/// Cross-check a prefix expansion against its recorded locale count. Missing
/// locales become I/O failures naming the expected file; shards numbered past
/// the count are left out.
fn check_shard_set(opened: Vec<Opened>) -> Vec<Opened> {
    let Some(expected) = recorded_locales(&opened) else {
        return opened;
    };
    let mut present = HashSet::new();
    let mut template = None;
    let mut out = Vec::with_capacity(expected);
    for (path, outcome) in opened {
        match locale_index(&path) {
            Some(locale) if locale >= expected => {
                warn!(
                    "ignoring {}: its siblings record only {expected} locale(s)",
                    path.display()
                );
            }
            Some(locale) => {
                present.insert(locale);
                template.get_or_insert_with(|| path.clone());
                out.push((path, outcome));
            }
            None => out.push((path, outcome)),
        }
    }
    if let Some(template) = template {
        for locale in (0..expected).filter(|l| !present.contains(l)) {
            let Some(path) = with_locale(&template, locale) else {
                continue;
            };
            let error = std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("shard missing from a set of {expected}"),
            );
            let failure = StoreError::io(&path, error);
            out.push((path, Err(failure)));
        }
    }
    out.sort_by_key(|(path, _)| locale_index(path));
    out
}

struct OpenShard {
    position: usize,
    shard: ShardDescriptor,
}

fn listing(shard: &ShardDescriptor, wanted: Option<&[String]>) -> Result<Vec<DatasetInfo>> {
    match wanted {
        None => shard.enumerate(),
        Some(names) => names
            .iter()
            .filter_map(|n| shard.info(n).transpose())
            .collect(),
    }
}

/// Split per-shard outcomes under the error policy.
fn apply_policy<T>(
    outcomes: Vec<(PathBuf, Result<T>)>,
    allow_errors: bool,
    failures: &mut Vec<ShardFailure>,
) -> Result<Vec<(PathBuf, T)>> {
    let mut ok = Vec::with_capacity(outcomes.len());
    for (path, outcome) in outcomes {
        match outcome {
            Ok(v) => ok.push((path, v)),
            Err(error) if allow_errors && error.is_shard_local() => {
                debug!("skipping {}: {error}", path.display());
                failures.push(ShardFailure { path, error });
            }
            Err(error) => return Err(error),
        }
    }
    Ok(ok)
}

fn all_failed(failures: Vec<ShardFailure>) -> StoreError {
    failures
        .into_iter()
        .next()
        .map_or_else(|| StoreError::invalid("no shards to read"), |f| f.error)
}

fn describe_sources<S: AsRef<str>>(sources: &[S]) -> String {
    sources.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}

/// Read datasets from shards named by a prefix, a glob, or a list of paths.
///
/// # Errors
/// [`StoreError::InvalidArgument`] for blank inputs, resolution errors,
/// [`StoreError::DatasetNotFound`] for a requested name absent from every
/// shard, [`StoreError::TypeStrictness`] for irreconcilable types, and, unless
/// `allow_errors` is set, the first per-shard I/O or format error. A
/// best-effort read in which every shard failed returns the first failure.
pub fn read<S: AsRef<str>>(sources: &[S], opts: &ReadOptions) -> Result<Collection> {
    if let Some(names) = &opts.datasets
        && names.iter().any(|n| n.trim().is_empty())
    {
        return Err(StoreError::invalid("dataset name must not be empty"));
    }
    let paths = resolve_sources(sources, opts.single_family)?;
    debug!("reading {} shard(s) from {}", paths.len(), describe_sources(sources));

    let wanted = opts.datasets.as_deref();
    let opened: Vec<Opened> = paths
        .par_iter()
        .map(|path| {
            let outcome = ShardDescriptor::open(path, opts.format, &opts.delimiter)
                .and_then(|shard| listing(&shard, wanted).map(|infos| (shard, infos)));
            (path.clone(), outcome)
        })
        .collect();
    let opened = match sources {
        [one] if !is_glob(one.as_ref()) && !Path::new(one.as_ref()).is_file() => check_shard_set(opened),
        _ => opened,
    };

    let mut failures = Vec::new();
    let opened = apply_policy(opened, opts.allow_errors, &mut failures)?;
    if opened.is_empty() {
        return Err(all_failed(failures));
    }

    let mut shards = Vec::with_capacity(opened.len());
    let mut listings = Vec::with_capacity(opened.len());
    for (position, (path, (shard, infos))) in opened.into_iter().enumerate() {
        listings.push((position, path, infos));
        shards.push(OpenShard { position, shard });
    }
    let registry = DatasetRegistry::build(listings)?;

    let selected: Vec<String> = match wanted {
        Some(names) => names.to_vec(),
        None => registry.names().into_iter().map(str::to_owned).collect(),
    };
    let mut dtypes = Vec::with_capacity(selected.len());
    for name in &selected {
        if !registry.contains(name) {
            return Err(StoreError::DatasetNotFound {
                dataset: name.clone(),
                location: describe_sources(sources),
            });
        }
        dtypes.push(registry.resolve_dtype(name, opts.strictness)?);
    }
    let shapes = selected
        .iter()
        .map(|name| -> Result<Option<Vec<u64>>> {
            let recorded = match registry.get(name) {
                Some(entry) => entry.shape()?,
                None => None,
            };
            Ok(recorded.map(|(_, shape)| shape.to_vec()))
        })
        .collect::<Result<Vec<_>>>()?;

    let loaded: Vec<(PathBuf, Result<HashMap<String, ArrayData>>)> = shards
        .par_iter()
        .map(|open| {
            let outcome = selected
                .iter()
                .filter(|name| {
                    registry
                        .get(name)
                        .is_some_and(|e| e.observations.iter().any(|o| o.shard == open.position))
                })
                .map(|name| {
                    open.shard
                        .read(name, opts.calc_string_offsets)
                        .map(|data| (name.clone(), data))
                })
                .collect::<Result<HashMap<_, _>>>();
            (open.shard.path().to_path_buf(), outcome)
        })
        .collect();
    let loaded = apply_policy(loaded, opts.allow_errors, &mut failures)?;
    if loaded.is_empty() {
        return Err(all_failed(failures));
    }

    let mut per_shard: Vec<HashMap<String, ArrayData>> = loaded.into_iter().map(|(_, m)| m).collect();
    let mut out = Collection::new();
    for ((name, dtype), shape) in selected.iter().zip(dtypes).zip(shapes) {
        let parts: Vec<ArrayData> = per_shard.iter_mut().filter_map(|m| m.remove(name)).collect();
        let data = assemble(name, parts, dtype)?;
        match shape {
            Some(shape) if shape_len(&shape) == Some(data.len() as u64) => {
                out.insert(name.clone(), data);
                out.shapes.insert(name.clone(), shape);
            }
            Some(shape) => {
                warn!(
                    "{name}: returning flat data, shape {shape:?} does not fit the {} element(s) read",
                    data.len()
                );
                out.insert(name.clone(), data);
            }
            None => {
                out.insert(name.clone(), data);
            }
        }
    }

    if !failures.is_empty() {
        let report = PartialReadFailure { failures };
        warn!("{report}");
        out.partial_failure = Some(report);
    }
    Ok(out)
}

/// Read every dataset under `prefix` (or glob, or single file).
///
/// # Errors
/// As for [`read`].
pub fn load_all(prefix: &str, opts: &ReadOptions) -> Result<Collection> {
    let opts = ReadOptions {
        datasets: None,
        ..opts.clone()
    };
    read(&[prefix], &opts)
}

/// Read one dataset.
///
/// # Errors
/// As for [`read`].
pub fn load(prefix: &str, dataset: &str, opts: &ReadOptions) -> Result<ArrayData> {
    let opts = opts.clone().datasets([dataset]);
    let mut out = read(&[prefix], &opts)?;
    out.remove(dataset).ok_or_else(|| StoreError::DatasetNotFound {
        dataset: dataset.to_owned(),
        location: prefix.to_owned(),
    })
}

/// [`read`] restricted to hierarchical shards.
///
/// # Errors
/// As for [`read`].
pub fn read_hierarchical<S: AsRef<str>>(sources: &[S], opts: &ReadOptions) -> Result<Collection> {
    read(sources, &opts.clone().format(FileFormat::Hierarchical))
}

/// [`read`] restricted to Parquet shards.
///
/// # Errors
/// As for [`read`].
pub fn read_parquet<S: AsRef<str>>(sources: &[S], opts: &ReadOptions) -> Result<Collection> {
    read(sources, &opts.clone().format(FileFormat::Columnar))
}

/// [`read`] restricted to delimited text shards.
///
/// # Errors
/// As for [`read`].
pub fn read_csv<S: AsRef<str>>(sources: &[S], opts: &ReadOptions) -> Result<Collection> {
    read(sources, &opts.clone().format(FileFormat::Delimited))
}

/// Dataset names of the first shard `path_or_pattern` resolves to.
///
/// # Errors
/// Resolution errors, plus I/O and format errors of that shard.
pub fn get_datasets(path_or_pattern: &str, opts: &ReadOptions) -> Result<Vec<String>> {
    let paths = resolve_sources(&[path_or_pattern], opts.single_family)?;
    let first = paths.first().ok_or_else(|| StoreError::NotFound {
        pattern: path_or_pattern.to_owned(),
    })?;
    let shard = ShardDescriptor::open(first, opts.format, &opts.delimiter)?;
    Ok(shard.enumerate()?.into_iter().map(|d| d.name).collect())
}

/// Human-readable listing of one shard: format, version and datasets.
///
/// `path` may name a shard file or a prefix, in which case the first shard
/// is listed.
///
/// # Errors
/// [`StoreError::InvalidArgument`] for blank input, [`StoreError::Io`]
/// naming `path` when nothing exists there, and [`StoreError::Format`] for
/// unrecognized files.
pub fn ls(path: &str) -> Result<String> {
    if path.trim().is_empty() {
        return Err(StoreError::invalid("path must not be empty"));
    }
    let target = if Path::new(path).exists() {
        PathBuf::from(path)
    } else {
        match resolve_prefix(path) {
            Ok(shards) => shards.into_iter().next().ok_or_else(|| StoreError::NotFound {
                pattern: path.to_owned(),
            })?,
            Err(StoreError::NotFound { .. }) => {
                return Err(StoreError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or shard prefix"),
                ));
            }
            Err(e) => return Err(e),
        }
    };
    ShardDescriptor::open(&target, None, csv::DEFAULT_DELIMITER)?.describe()
}

/// Null mask of a Parquet column across all shards, in shard order.
///
/// # Errors
/// [`StoreError::InvalidArgument`] when a shard is not Parquet, plus the
/// errors of [`read`] (without best-effort skipping).
pub fn null_indices<S: AsRef<str>>(sources: &[S], dataset: &str, opts: &ReadOptions) -> Result<Vec<bool>> {
    let paths = resolve_sources(sources, opts.single_family)?;
    let masks = paths
        .par_iter()
        .map(|path| match ShardDescriptor::open(path, opts.format, &opts.delimiter)? {
            ShardDescriptor::Columnar { shard, .. } => match shard.null_indices(dataset) {
                Err(StoreError::DatasetNotFound { .. }) => Ok(Vec::new()),
                other => other,
            },
            other => Err(StoreError::invalid(format!(
                "{} is {}; null masks exist only for parquet",
                path.display(),
                other.format()
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(masks.concat())
}
