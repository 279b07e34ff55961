//! Columnar shards via Apache Parquet.
//!
//! One column per dataset. Strings map to `Utf8` (and `LargeUtf8` on read),
//! lists of scalars map to `List`/`LargeList`. Files written elsewhere are
//! readable regardless of row-group layout or codec; columns whose Arrow type
//! has no [`DType`] counterpart are listed but cannot be read.
//!
//! Nulls: float nulls read as NaN and string nulls as empty strings. Any other
//! null is a [`StoreError::Format`]; [`ParquetShard::null_indices`] exposes the
//! raw null mask.

use crate::array::ArrayData;
use crate::dtype::{DType, ScalarType};
use crate::error::{Result, StoreError};
use crate::io::{DatasetInfo, WriteMode, validate_dataset_name, write_atomic};
use crate::segmented::{SegArray, Strings};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float32Array, Float64Array, Int8Array, Int16Array,
    Int32Array, Int64Array, ListArray, StringArray, UInt8Array, UInt16Array, UInt32Array,
    UInt64Array, new_empty_array,
};
use arrow::buffer::{OffsetBuffer, ScalarBuffer};
use arrow::datatypes::{
    ArrowNativeType, ArrowPrimitiveType, DataType, Field, Float32Type, Float64Type, Int8Type,
    Int16Type, Int32Type, Int64Type, Schema, SchemaRef, UInt8Type, UInt16Type, UInt32Type,
    UInt64Type,
};
use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{BrotliLevel, Compression as ParquetCodec, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PARQUET_MAGIC: &[u8; 4] = b"PAR1";
const BATCH_SIZE: usize = 64 * 1024;

/// Column chunk codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Brotli,
    Zstd,
    Lz4,
}

impl Compression {
    /// Parse a codec name as used in configuration.
    ///
    /// # Errors
    /// [`StoreError::InvalidArgument`] for unknown names.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "uncompressed" => Self::Uncompressed,
            "snappy" => Self::Snappy,
            "gzip" => Self::Gzip,
            "brotli" => Self::Brotli,
            "zstd" => Self::Zstd,
            "lz4" => Self::Lz4,
            other => {
                return Err(StoreError::invalid(format!(
                    "unknown parquet compression {other:?}"
                )));
            }
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Uncompressed => "uncompressed",
            Self::Snappy => "snappy",
            Self::Gzip => "gzip",
            Self::Brotli => "brotli",
            Self::Zstd => "zstd",
            Self::Lz4 => "lz4",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Compression> for ParquetCodec {
    fn from(c: Compression) -> Self {
        match c {
            Compression::Uncompressed => Self::UNCOMPRESSED,
            Compression::Snappy => Self::SNAPPY,
            Compression::Gzip => Self::GZIP(GzipLevel::default()),
            Compression::Brotli => Self::BROTLI(BrotliLevel::default()),
            Compression::Zstd => Self::ZSTD(ZstdLevel::default()),
            Compression::Lz4 => Self::LZ4_RAW,
        }
    }
}

impl From<ParquetCodec> for Compression {
    fn from(c: ParquetCodec) -> Self {
        match c {
            ParquetCodec::UNCOMPRESSED => Self::Uncompressed,
            ParquetCodec::GZIP(_) => Self::Gzip,
            ParquetCodec::BROTLI(_) => Self::Brotli,
            ParquetCodec::ZSTD(_) => Self::Zstd,
            ParquetCodec::LZ4 | ParquetCodec::LZ4_RAW => Self::Lz4,
            _ => Self::Snappy,
        }
    }
}

fn read_error(path: &Path, e: impl fmt::Display) -> StoreError {
    StoreError::format(path, e)
}

fn write_error(path: &Path, source: parquet::errors::ParquetError) -> StoreError {
    StoreError::Parquet {
        path: path.to_path_buf(),
        source,
    }
}

/// Map an Arrow type onto a dataset type.
#[must_use]
pub fn dtype_of(dt: &DataType) -> Option<DType> {
    let scalar = |dt: &DataType| match dt {
        DataType::Int8 => Some(ScalarType::Int8),
        DataType::Int16 => Some(ScalarType::Int16),
        DataType::Int32 => Some(ScalarType::Int32),
        DataType::Int64 => Some(ScalarType::Int64),
        DataType::UInt8 => Some(ScalarType::UInt8),
        DataType::UInt16 => Some(ScalarType::UInt16),
        DataType::UInt32 => Some(ScalarType::UInt32),
        DataType::UInt64 => Some(ScalarType::UInt64),
        DataType::Float32 => Some(ScalarType::Float32),
        DataType::Float64 => Some(ScalarType::Float64),
        DataType::Boolean => Some(ScalarType::Bool),
        _ => None,
    };
    match dt {
        DataType::Utf8 | DataType::LargeUtf8 => Some(DType::Str),
        DataType::List(item) | DataType::LargeList(item) => {
            scalar(item.data_type()).map(DType::List)
        }
        other => scalar(other).map(DType::Scalar),
    }
}

/// Metadata of an opened Parquet shard. Column data is read on demand.
#[derive(Debug, Clone)]
pub struct ParquetShard {
    path: PathBuf,
    schema: SchemaRef,
    num_rows: u64,
    num_row_groups: usize,
    compression: Compression,
}

impl ParquetShard {
    /// # Errors
    /// [`StoreError::Io`] if the file cannot be opened and
    /// [`StoreError::Format`] if it is not Parquet.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| read_error(path, e))?;
        let meta = builder.metadata();
        let num_row_groups = meta.num_row_groups();
        let compression = (0..num_row_groups)
            .flat_map(|g| meta.row_group(g).columns().first())
            .map(|c| Compression::from(c.compression()))
            .next()
            .unwrap_or_default();
        let num_rows = u64::try_from(meta.file_metadata().num_rows()).unwrap_or(0);
        debug!(
            "{}: {num_rows} rows, {num_row_groups} row group(s), {compression}",
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            schema: builder.schema().clone(),
            num_rows,
            num_row_groups,
            compression,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    #[must_use]
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    #[must_use]
    pub fn num_row_groups(&self) -> usize {
        self.num_row_groups
    }

    /// Codec of the first column chunk, or the default for an empty file.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    #[must_use]
    pub fn enumerate(&self) -> Vec<DatasetInfo> {
        self.schema
            .fields()
            .iter()
            .map(|f| {
                let dtype = dtype_of(f.data_type());
                DatasetInfo {
                    name: f.name().clone(),
                    dtype,
                    segmented: dtype.is_some_and(DType::is_segmented),
                    len: self.num_rows,
                    shape: None,
                }
            })
            .collect()
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.schema
            .index_of(name)
            .map_err(|_| StoreError::DatasetNotFound {
                dataset: name.to_owned(),
                location: self.path.display().to_string(),
            })
    }

    fn read_column(&self, name: &str) -> Result<ArrayRef> {
        let idx = self.column_index(name)?;
        let path = self.path.as_path();
        let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| read_error(path, e))?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), [idx]);
        let reader = builder
            .with_projection(mask)
            .with_batch_size(BATCH_SIZE)
            .build()
            .map_err(|e| read_error(path, e))?;

        let mut chunks: Vec<ArrayRef> = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| read_error(path, e))?;
            chunks.push(Arc::clone(batch.column(0)));
        }
        match chunks.len() {
            0 => Ok(new_empty_array(self.schema.field(idx).data_type())),
            1 => Ok(chunks.swap_remove(0)),
            _ => {
                let refs: Vec<&dyn Array> = chunks.iter().map(AsRef::as_ref).collect();
                arrow::compute::concat(&refs).map_err(|e| read_error(path, e))
            }
        }
    }

    /// # Errors
    /// [`StoreError::DatasetNotFound`] for an unknown column and
    /// [`StoreError::Format`] for unsupported types or disallowed nulls.
    pub fn read(&self, name: &str) -> Result<ArrayData> {
        let column = self.read_column(name)?;
        from_arrow(&self.path, name, column.as_ref())
    }

    /// `true` at every null position of column `name`.
    ///
    /// # Errors
    /// As for [`ParquetShard::read`], minus the null checks.
    pub fn null_indices(&self, name: &str) -> Result<Vec<bool>> {
        let column = self.read_column(name)?;
        Ok((0..column.len()).map(|i| column.is_null(i)).collect())
    }

    fn read_all(&self) -> Result<RecordBatch> {
        let path = self.path.as_path();
        let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .and_then(|b| b.with_batch_size(BATCH_SIZE).build())
            .map_err(|e| read_error(path, e))?;
        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| read_error(path, e))?;
        arrow::compute::concat_batches(&self.schema, &batches).map_err(|e| read_error(path, e))
    }
}

fn non_null<T: ArrowPrimitiveType>(path: &Path, name: &str, a: &dyn Array) -> Result<Vec<T::Native>> {
    if a.null_count() > 0 {
        return Err(StoreError::format(
            path,
            format!("column {name:?} contains {} null(s)", a.null_count()),
        ));
    }
    Ok(a.as_primitive::<T>().values().to_vec())
}

fn nan_for_null<T>(a: &dyn Array, nan: T::Native) -> Vec<T::Native>
where
    T: ArrowPrimitiveType,
{
    a.as_primitive::<T>().iter().map(|v| v.unwrap_or(nan)).collect()
}

fn strings_from<'a>(
    path: &Path,
    name: &str,
    values: impl Iterator<Item = Option<&'a str>>,
) -> Result<ArrayData> {
    Strings::from_entries(values.map(Option::unwrap_or_default))
        .map(ArrayData::Str)
        .map_err(|e| StoreError::format(path, format!("column {name:?}: {e}")))
}

fn list_from<O: arrow::array::OffsetSizeTrait>(
    path: &Path,
    name: &str,
    a: &dyn Array,
) -> Result<ArrayData> {
    let list = a.as_list::<O>();
    let offsets = list.value_offsets();
    let first = offsets.first().map_or(0, |o| o.as_usize());
    let last = offsets.last().map_or(0, |o| o.as_usize());
    let values = list.values().slice(first, last - first);
    let values = from_arrow(path, name, values.as_ref())?;
    let offsets = offsets[..offsets.len().saturating_sub(1)]
        .iter()
        .map(|o| (o.as_usize() - first) as u64)
        .collect();
    SegArray::new(values, offsets)
        .map(ArrayData::List)
        .map_err(|e| StoreError::format(path, format!("column {name:?}: {e}")))
}

/// Decode one Arrow column.
///
/// # Errors
/// [`StoreError::Format`] for unsupported types and disallowed nulls.
pub fn from_arrow(path: &Path, name: &str, a: &dyn Array) -> Result<ArrayData> {
    Ok(match a.data_type() {
        DataType::Int8 => ArrayData::Int8(non_null::<Int8Type>(path, name, a)?),
        DataType::Int16 => ArrayData::Int16(non_null::<Int16Type>(path, name, a)?),
        DataType::Int32 => ArrayData::Int32(non_null::<Int32Type>(path, name, a)?),
        DataType::Int64 => ArrayData::Int64(non_null::<Int64Type>(path, name, a)?),
        DataType::UInt8 => ArrayData::UInt8(non_null::<UInt8Type>(path, name, a)?),
        DataType::UInt16 => ArrayData::UInt16(non_null::<UInt16Type>(path, name, a)?),
        DataType::UInt32 => ArrayData::UInt32(non_null::<UInt32Type>(path, name, a)?),
        DataType::UInt64 => ArrayData::UInt64(non_null::<UInt64Type>(path, name, a)?),
        DataType::Float32 => ArrayData::Float32(nan_for_null::<Float32Type>(a, f32::NAN)),
        DataType::Float64 => ArrayData::Float64(nan_for_null::<Float64Type>(a, f64::NAN)),
        DataType::Boolean => {
            if a.null_count() > 0 {
                return Err(StoreError::format(
                    path,
                    format!("column {name:?} contains {} null(s)", a.null_count()),
                ));
            }
            ArrayData::Bool(a.as_boolean().values().iter().collect())
        }
        DataType::Utf8 => strings_from(path, name, a.as_string::<i32>().iter())?,
        DataType::LargeUtf8 => strings_from(path, name, a.as_string::<i64>().iter())?,
        DataType::List(_) if dtype_of(a.data_type()).is_some() => list_from::<i32>(path, name, a)?,
        DataType::LargeList(_) if dtype_of(a.data_type()).is_some() => {
            list_from::<i64>(path, name, a)?
        }
        other => {
            return Err(StoreError::format(
                path,
                format!("column {name:?} has unsupported type {other}"),
            ));
        }
    })
}

/// Encode one dataset as an Arrow column.
///
/// # Errors
/// [`StoreError::InvalidArgument`] when list offsets overflow `i32`.
pub fn to_arrow(data: &ArrayData) -> Result<ArrayRef> {
    let array: ArrayRef = match data {
        ArrayData::Int8(v) => Arc::new(Int8Array::from(v.clone())),
        ArrayData::Int16(v) => Arc::new(Int16Array::from(v.clone())),
        ArrayData::Int32(v) => Arc::new(Int32Array::from(v.clone())),
        ArrayData::Int64(v) => Arc::new(Int64Array::from(v.clone())),
        ArrayData::UInt8(v) => Arc::new(UInt8Array::from(v.clone())),
        ArrayData::UInt16(v) => Arc::new(UInt16Array::from(v.clone())),
        ArrayData::UInt32(v) => Arc::new(UInt32Array::from(v.clone())),
        ArrayData::UInt64(v) => Arc::new(UInt64Array::from(v.clone())),
        ArrayData::Float32(v) => Arc::new(Float32Array::from(v.clone())),
        ArrayData::Float64(v) => Arc::new(Float64Array::from(v.clone())),
        ArrayData::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
        ArrayData::Str(s) => Arc::new(StringArray::from_iter_values(s.iter())),
        ArrayData::List(l) => {
            let values = to_arrow(l.values())?;
            let total = l.values().len() as u64;
            let offsets = l
                .offsets()
                .iter()
                .copied()
                .chain(std::iter::once(total))
                .map(i32::try_from)
                .collect::<std::result::Result<Vec<i32>, _>>()
                .map_err(|_| StoreError::invalid("list too long for a parquet column"))?;
            let item = Arc::new(Field::new("item", values.data_type().clone(), true));
            let list = ListArray::try_new(
                item,
                OffsetBuffer::new(ScalarBuffer::from(offsets)),
                values,
                None,
            )?;
            Arc::new(list)
        }
    };
    Ok(array)
}

/// Options for a Parquet shard write.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetWriteSettings {
    pub compression: Compression,
    /// Rows per row group; `None` lets the writer decide.
    pub row_group_size: Option<usize>,
}

fn encode(
    path: &Path,
    batch: &RecordBatch,
    compression: Compression,
    row_group_size: Option<usize>,
) -> Result<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(compression.into())
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))
        .map_err(|e| write_error(path, e))?;
    match row_group_size {
        Some(n) if n > 0 && batch.num_rows() > n => {
            let mut start = 0;
            while start < batch.num_rows() {
                let len = n.min(batch.num_rows() - start);
                writer
                    .write(&batch.slice(start, len))
                    .and_then(|()| writer.flush())
                    .map_err(|e| write_error(path, e))?;
                start += len;
            }
        }
        _ => writer.write(batch).map_err(|e| write_error(path, e))?,
    }
    writer.close().map_err(|e| write_error(path, e))?;
    Ok(buf)
}

/// Write `datasets` as the columns of the shard at `path`.
///
/// In [`WriteMode::Append`] the existing columns are kept (including ones of
/// unsupported types) and the file keeps its own codec; every new column must
/// match the existing row count.
///
/// # Errors
/// [`StoreError::DatasetNameCollision`] for an existing column name,
/// [`StoreError::InvalidArgument`] for mismatched lengths or no datasets, and
/// [`StoreError::Parquet`] for encoder failures.
pub fn write_shard(
    path: &Path,
    datasets: &[(&str, &ArrayData)],
    mode: WriteMode,
    settings: ParquetWriteSettings,
) -> Result<()> {
    if datasets.is_empty() {
        return Err(StoreError::invalid("no datasets to write"));
    }
    let existing = match mode {
        WriteMode::Append if path.exists() => {
            let shard = ParquetShard::open(path)?;
            Some((shard.read_all()?, shard.compression()))
        }
        _ => None,
    };

    let (mut fields, mut columns, compression) = match &existing {
        Some((batch, compression)) => (
            batch.schema().fields().iter().cloned().collect::<Vec<_>>(),
            batch.columns().to_vec(),
            *compression,
        ),
        None => (Vec::new(), Vec::new(), settings.compression),
    };
    let rows = existing
        .as_ref()
        .filter(|(b, _)| b.num_columns() > 0)
        .map(|(b, _)| b.num_rows())
        .or_else(|| datasets.first().map(|(_, d)| d.len()))
        .unwrap_or(0);

    for (name, data) in datasets {
        validate_dataset_name(name)?;
        if fields.iter().any(|f| f.name() == *name) {
            return Err(StoreError::DatasetNameCollision {
                dataset: (*name).to_owned(),
                path: path.to_path_buf(),
            });
        }
        if data.len() != rows {
            return Err(StoreError::invalid(format!(
                "column {name:?} has {} rows but {} has {rows}",
                data.len(),
                path.display()
            )));
        }
        let column = to_arrow(data)?;
        fields.push(Arc::new(Field::new(*name, column.data_type().clone(), false)));
        columns.push(column);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    let bytes = encode(path, &batch, compression, settings.row_group_size)?;
    debug!(
        "{mode:?} {} column(s) to {} ({compression})",
        datasets.len(),
        path.display()
    );
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_mapping_roundtrips() {
        for c in [
            Compression::Uncompressed,
            Compression::Snappy,
            Compression::Gzip,
            Compression::Brotli,
            Compression::Zstd,
            Compression::Lz4,
        ] {
            assert_eq!(Compression::from(ParquetCodec::from(c)), c);
            assert_eq!(Compression::from_name(c.name()).unwrap(), c);
        }
        assert!(Compression::from_name("lzma").is_err());
    }

    #[test]
    fn maps_arrow_types() {
        assert_eq!(dtype_of(&DataType::LargeUtf8), Some(DType::Str));
        let item = Arc::new(Field::new("item", DataType::UInt16, true));
        assert_eq!(
            dtype_of(&DataType::LargeList(item)),
            Some(DType::List(ScalarType::UInt16))
        );
        assert_eq!(dtype_of(&DataType::Date32), None);
    }

    #[test]
    fn float_nulls_become_nan() {
        let a = Float64Array::from(vec![Some(1.0), None]);
        let out = from_arrow(Path::new("x"), "f", &a).unwrap();
        let v = out.as_float64().unwrap();
        assert_eq!(v[0], 1.0);
        assert!(v[1].is_nan());

        let ints = Int64Array::from(vec![Some(1), None]);
        assert!(from_arrow(Path::new("x"), "i", &ints).is_err());
    }
}
