//! Delimited text shards.
//!
//! Layout of a shard written by this crate:
//!
//! ```text
//! **HEADER**
//! int64,str,float64
//! */HEADER/*
//! ids,names,values
//! 0,alpha,0.5
//! ```
//!
//! The three-line header block carries one type name per column. Files
//! without it (e.g. exported from a spreadsheet) are accepted and every column
//! reads as strings. The delimiter is never inferred.
//!
//! Single-byte delimiters go through the `csv` crate, so fields may be quoted.
//! Longer delimiters such as `|*|` split and join literally; a field that
//! contains the delimiter or a line break cannot be written with one.

use crate::array::ArrayData;
use crate::dtype::DType;
use crate::error::{Result, StoreError};
use crate::io::{DatasetInfo, validate_dataset_name, write_atomic};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::debug;
use std::path::{Path, PathBuf};

pub const HEADER_START: &str = "**HEADER**";
pub const HEADER_END: &str = "*/HEADER/*";
pub const DEFAULT_DELIMITER: &str = ",";

/// A delimited shard parsed into memory.
#[derive(Debug, Clone)]
pub struct DelimitedShard {
    path: PathBuf,
    delimiter: String,
    types: Option<Vec<DType>>,
    names: Vec<String>,
    rows: Vec<StringRecord>,
}

/// Split off the header block, returning the declared type names and the
/// remaining text.
fn split_header<'a>(
    path: &Path,
    text: &'a str,
    delimiter: &str,
) -> Result<(Option<Vec<DType>>, &'a str)> {
    let mut lines = text.splitn(4, '\n');
    if lines.next().map(str::trim_end) != Some(HEADER_START) {
        return Ok((None, text));
    }
    let type_line = lines
        .next()
        .ok_or_else(|| StoreError::format(path, "header block has no type line"))?;
    if lines.next().map(str::trim_end) != Some(HEADER_END) {
        return Err(StoreError::format(
            path,
            format!("header block not closed by {HEADER_END}"),
        ));
    }
    let types = type_line
        .trim_end()
        .split(delimiter)
        .map(|name| {
            DType::from_name(name)
                .ok_or_else(|| StoreError::format(path, format!("unknown column type {name:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((Some(types), lines.next().unwrap_or_default()))
}

fn single_byte(delimiter: &str) -> Option<u8> {
    match delimiter.as_bytes() {
        [byte] => Some(*byte),
        _ => None,
    }
}

fn check_delimiter(delimiter: &str) -> Result<()> {
    if delimiter.is_empty() || delimiter.contains(['\n', '\r', '"']) {
        return Err(StoreError::invalid(format!(
            "{delimiter:?} cannot be used as a field delimiter"
        )));
    }
    Ok(())
}

type Table = (Vec<String>, Vec<StringRecord>);

fn parse_quoted(path: &Path, body: &str, delimiter: u8) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(body.as_bytes());
    let names = rdr
        .headers()
        .map_err(|e| StoreError::format(path, e))?
        .iter()
        .map(str::to_owned)
        .collect();
    let rows = rdr
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StoreError::format(path, e))?;
    Ok((names, rows))
}

fn parse_literal(path: &Path, body: &str, delimiter: &str) -> Result<Table> {
    let mut lines = body.lines().filter(|l| !l.is_empty());
    let names: Vec<String> = lines
        .next()
        .map(|h| h.split(delimiter).map(str::to_owned).collect())
        .unwrap_or_default();
    let rows = lines
        .enumerate()
        .map(|(i, line)| {
            let record: StringRecord = line.split(delimiter).collect();
            if record.len() == names.len() {
                Ok(record)
            } else {
                Err(StoreError::format(
                    path,
                    format!("row {}: {} fields, expected {}", i + 1, record.len(), names.len()),
                ))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((names, rows))
}

impl DelimitedShard {
    /// # Errors
    /// [`StoreError::Io`] if the file cannot be read and
    /// [`StoreError::Format`] for a malformed header block, a type line that
    /// disagrees with the column count, or ragged rows.
    pub fn open(path: &Path, delimiter: &str) -> Result<Self> {
        check_delimiter(delimiter)?;
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        let (types, body) = split_header(path, &text, delimiter)?;
        let (names, rows) = match single_byte(delimiter) {
            Some(byte) => parse_quoted(path, body, byte)?,
            None => parse_literal(path, body, delimiter)?,
        };

        if let Some(types) = &types
            && types.len() != names.len()
        {
            return Err(StoreError::format(
                path,
                format!("{} column types declared for {} columns", types.len(), names.len()),
            ));
        }
        debug!(
            "{}: {} column(s), {} row(s), typed header: {}",
            path.display(),
            names.len(),
            rows.len(),
            types.is_some()
        );
        Ok(Self {
            path: path.to_path_buf(),
            delimiter: delimiter.to_owned(),
            types,
            names,
            rows,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    #[must_use]
    pub fn has_header(&self) -> bool {
        self.types.is_some()
    }

    fn dtype(&self, idx: usize) -> DType {
        self.types
            .as_ref()
            .and_then(|t| t.get(idx).copied())
            .unwrap_or(DType::Str)
    }

    #[must_use]
    pub fn enumerate(&self) -> Vec<DatasetInfo> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| DatasetInfo::new(name.clone(), self.dtype(i), self.rows.len() as u64))
            .collect()
    }

    /// # Errors
    /// [`StoreError::DatasetNotFound`] for an unknown column and
    /// [`StoreError::Format`] for fields that do not parse as the declared
    /// type.
    pub fn read(&self, name: &str) -> Result<ArrayData> {
        let idx = self.names.iter().position(|n| n == name).ok_or_else(|| {
            StoreError::DatasetNotFound {
                dataset: name.to_owned(),
                location: self.path.display().to_string(),
            }
        })?;
        let fields: Vec<&str> = self.rows.iter().map(|r| r.get(idx).unwrap_or_default()).collect();
        let column = |e: String| StoreError::format(&self.path, format!("column {name:?}: {e}"));
        match self.dtype(idx) {
            DType::Str => ArrayData::strings(&fields).map_err(|e| column(e.to_string())),
            DType::Scalar(t) => ArrayData::parse_text(t, &fields).map_err(column),
            DType::List(_) => Err(column("list columns are not representable".to_owned())),
        }
    }
}

/// Write `datasets` as the columns of one delimited shard, header block
/// included. Existing files are replaced.
///
/// # Errors
/// [`StoreError::InvalidArgument`] for list datasets, unequal column
/// lengths, an unusable delimiter, or (with a multi-byte delimiter) a field
/// containing the delimiter or a line break, and
/// [`StoreError::Csv`] for writer failures.
pub fn write_shard(path: &Path, datasets: &[(&str, &ArrayData)], delimiter: &str) -> Result<()> {
    check_delimiter(delimiter)?;
    let Some((_, first)) = datasets.first() else {
        return Err(StoreError::invalid("no datasets to write"));
    };
    let rows = first.len();
    let mut columns = Vec::with_capacity(datasets.len());
    for (name, data) in datasets {
        validate_dataset_name(name)?;
        if data.len() != rows {
            return Err(StoreError::invalid(format!(
                "column {name:?} has {} rows, expected {rows}",
                data.len()
            )));
        }
        let text = data.to_text().ok_or_else(|| {
            StoreError::invalid(format!("column {name:?}: lists cannot be written as delimited text"))
        })?;
        columns.push(text);
    }

    let types: Vec<String> = datasets.iter().map(|(_, d)| d.dtype().to_string()).collect();
    let mut out = format!("{HEADER_START}\n{}\n{HEADER_END}\n", types.join(delimiter)).into_bytes();
    let names = datasets.iter().map(|(name, _)| *name);
    let records = (0..rows).map(|row| columns.iter().map(move |c| c[row].as_str()));

    match single_byte(delimiter) {
        Some(byte) => {
            let csv_error = |source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            };
            let mut wtr = WriterBuilder::new().delimiter(byte).from_writer(&mut out);
            wtr.write_record(names).map_err(csv_error)?;
            for record in records {
                wtr.write_record(record).map_err(csv_error)?;
            }
            wtr.flush().map_err(|e| StoreError::io(path, e))?;
        }
        None => {
            write_literal(&mut out, names, delimiter)?;
            for record in records {
                write_literal(&mut out, record, delimiter)?;
            }
        }
    }
    debug!("wrote {} column(s) x {rows} row(s) to {}", datasets.len(), path.display());
    write_atomic(path, &out)
}

fn write_literal<'a>(
    out: &mut Vec<u8>,
    fields: impl Iterator<Item = &'a str>,
    delimiter: &str,
) -> Result<()> {
    for (i, field) in fields.enumerate() {
        if field.contains(delimiter) || field.contains(['\n', '\r']) {
            return Err(StoreError::invalid(format!(
                "field {field:?} cannot be written with delimiter {delimiter:?}"
            )));
        }
        if i > 0 {
            out.extend_from_slice(delimiter.as_bytes());
        }
        out.extend_from_slice(field.as_bytes());
    }
    out.push(b'\n');
    Ok(())
}
