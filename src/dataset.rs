//! Lazy Parquet datasets and the operations the pipeline runs over them.
//!
//! A [`ParquetDataset`] only reads file footers when opened. Row data is
//! streamed batch by batch when a terminal operation ([`Dataset::quantile`],
//! [`Dataset::row_count`], [`Dataset::column_range`], [`Dataset::write`]) runs,
//! and [`Dataset::filter`] merely records a predicate for those later scans.

use std::fs::File;
use std::io::Write;

use arrow::array::{ArrayRef, AsArray, BooleanArray};
use arrow::compute::{and, cast, filter_record_batch};
use arrow::datatypes::{DataType, Float64Type, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use camino::{Utf8Path, Utf8PathBuf};
use parquet::arrow::ArrowWriter;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use tracing::debug;

use crate::error::TripError;
use crate::store::{list_partitions, staging_file};

/// The dataframe capability the pipeline depends on.
pub trait Dataset: Sized {
    fn partition_count(&self) -> usize;

    fn row_count(&self) -> Result<u64, TripError>;

    /// Exact `q`-quantile of `column` using linear interpolation between
    /// closest ranks. Nulls and NaNs are ignored.
    fn quantile(&self, column: &str, q: f64) -> Result<f64, TripError>;

    /// Smallest and largest value of `column`, or `None` when no row has one.
    fn column_range(&self, column: &str) -> Result<Option<(f64, f64)>, TripError>;

    fn filter(&self, predicate: Predicate) -> Result<Self, TripError>;

    /// Writes one file per partition to `dir`, named by `naming(partition_index)`.
    fn write(
        &self,
        dir: &Utf8Path,
        naming: &dyn Fn(usize) -> String,
    ) -> Result<WriteSummary, TripError>;
}

/// Keeps rows whose `column` value is strictly greater than `threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    column: String,
    threshold: f64,
}

impl Predicate {
    pub fn greater_than(column: &str, threshold: f64) -> Self {
        Self {
            column: column.to_string(),
            threshold,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Null and NaN values never match.
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray, TripError> {
        let column = batch
            .column_by_name(&self.column)
            .ok_or_else(|| TripError::Arrow(format!("column {} missing from batch", self.column)))?;
        let values = as_f64(column)?;
        let values = values.as_primitive::<Float64Type>();
        Ok(values
            .iter()
            .map(|value| value.map(|value| value > self.threshold))
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    pub files: Vec<WrittenPartition>,
    pub rows: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenPartition {
    pub index: usize,
    pub path: String,
    pub rows: u64,
}

#[derive(Debug, Clone)]
struct Partition {
    path: Utf8PathBuf,
    schema: SchemaRef,
    rows: u64,
}

#[derive(Debug, Clone)]
pub struct ParquetDataset {
    partitions: Vec<Partition>,
    predicates: Vec<Predicate>,
    batch_size: usize,
}

impl ParquetDataset {
    /// Treats every `*.extension` file in `dir` as one partition, in file name order.
    pub fn open(dir: &Utf8Path, extension: &str, batch_size: usize) -> Result<Self, TripError> {
        let files = list_partitions(dir, extension)?;
        if files.is_empty() {
            return Err(TripError::EmptyDataset {
                dir: dir.as_std_path().to_path_buf(),
                extension: extension.to_string(),
            });
        }

        let mut partitions = Vec::with_capacity(files.len());
        for path in files {
            let builder = open_builder(&path)?;
            let schema = builder.schema().clone();
            let rows = builder.metadata().file_metadata().num_rows().max(0) as u64;
            debug!(%path, rows, "opened partition");
            partitions.push(Partition { path, schema, rows });
        }

        Ok(Self {
            partitions,
            predicates: Vec::new(),
            batch_size: batch_size.max(1),
        })
    }

    pub fn partition_paths(&self) -> Vec<&Utf8Path> {
        self.partitions.iter().map(|p| p.path.as_path()).collect()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Checks that `column` exists and is numeric in every partition.
    pub fn validate_column(&self, column: &str) -> Result<(), TripError> {
        for partition in &self.partitions {
            let field = partition.schema.field_with_name(column).map_err(|_| {
                TripError::MissingColumn {
                    column: column.to_string(),
                    partition: partition.path.as_std_path().to_path_buf(),
                }
            })?;
            if !field.data_type().is_numeric() {
                return Err(TripError::NonNumericColumn {
                    column: column.to_string(),
                    partition: partition.path.as_std_path().to_path_buf(),
                    data_type: field.data_type().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Streams the partition's batches after applying every predicate.
    /// `columns == None` reads all columns.
    fn scan<F>(
        &self,
        partition: &Partition,
        columns: Option<&[&str]>,
        mut on_batch: F,
    ) -> Result<(), TripError>
    where
        F: FnMut(RecordBatch) -> Result<(), TripError>,
    {
        let reader = self.reader(partition, columns)?;
        for batch in reader {
            let batch = batch.map_err(|err| parquet_err(&partition.path, err))?;
            let batch = self.apply_predicates(batch)?;
            if batch.num_rows() > 0 {
                on_batch(batch)?;
            }
        }
        Ok(())
    }

    fn reader(
        &self,
        partition: &Partition,
        columns: Option<&[&str]>,
    ) -> Result<ParquetRecordBatchReader, TripError> {
        let builder = open_builder(&partition.path)?.with_batch_size(self.batch_size);
        let builder = match columns {
            Some(columns) => {
                let mut names = columns.to_vec();
                names.extend(self.predicates.iter().map(|p| p.column.as_str()));
                let mut indices = Vec::new();
                for name in names {
                    let index = builder.schema().index_of(name).map_err(|_| {
                        TripError::MissingColumn {
                            column: name.to_string(),
                            partition: partition.path.as_std_path().to_path_buf(),
                        }
                    })?;
                    if !indices.contains(&index) {
                        indices.push(index);
                    }
                }
                let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
                builder.with_projection(mask)
            }
            None => builder,
        };
        builder
            .build()
            .map_err(|err| parquet_err(&partition.path, err))
    }

    fn apply_predicates(&self, batch: RecordBatch) -> Result<RecordBatch, TripError> {
        let mut mask: Option<BooleanArray> = None;
        for predicate in &self.predicates {
            let current = predicate.evaluate(&batch)?;
            mask = Some(match mask {
                Some(previous) => and(&previous, &current).map_err(arrow_err)?,
                None => current,
            });
        }
        match mask {
            Some(mask) => filter_record_batch(&batch, &mask).map_err(arrow_err),
            None => Ok(batch),
        }
    }

    fn for_each_value<F>(&self, column: &str, mut on_value: F) -> Result<(), TripError>
    where
        F: FnMut(f64),
    {
        for partition in &self.partitions {
            self.scan(partition, Some(&[column][..]), |batch| {
                let array = batch
                    .column_by_name(column)
                    .ok_or_else(|| TripError::Arrow(format!("column {column} missing from batch")))?;
                let values = as_f64(array)?;
                for value in values.as_primitive::<Float64Type>().iter().flatten() {
                    if !value.is_nan() {
                        on_value(value);
                    }
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

impl Dataset for ParquetDataset {
    fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn row_count(&self) -> Result<u64, TripError> {
        if self.predicates.is_empty() {
            return Ok(self.partitions.iter().map(|p| p.rows).sum());
        }
        let mut rows = 0u64;
        for partition in &self.partitions {
            self.scan(partition, Some(&[][..]), |batch| {
                rows += batch.num_rows() as u64;
                Ok(())
            })?;
        }
        Ok(rows)
    }

    fn quantile(&self, column: &str, q: f64) -> Result<f64, TripError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(TripError::InvalidQuantile(q));
        }
        self.validate_column(column)?;

        let mut values = Vec::new();
        self.for_each_value(column, |value| values.push(value))?;
        linear_quantile(&mut values, q).ok_or_else(|| TripError::NoValues(column.to_string()))
    }

    fn column_range(&self, column: &str) -> Result<Option<(f64, f64)>, TripError> {
        self.validate_column(column)?;
        let mut range: Option<(f64, f64)> = None;
        self.for_each_value(column, |value| {
            range = Some(match range {
                Some((min, max)) => (min.min(value), max.max(value)),
                None => (value, value),
            });
        })?;
        Ok(range)
    }

    fn filter(&self, predicate: Predicate) -> Result<Self, TripError> {
        self.validate_column(predicate.column())?;
        let mut filtered = self.clone();
        filtered.predicates.push(predicate);
        Ok(filtered)
    }

    fn write(
        &self,
        dir: &Utf8Path,
        naming: &dyn Fn(usize) -> String,
    ) -> Result<WriteSummary, TripError> {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut files = Vec::with_capacity(self.partitions.len());
        let mut total = 0u64;
        for (index, partition) in self.partitions.iter().enumerate() {
            let dest = dir.join(naming(index));
            let write_err = |message: String| TripError::Write {
                path: dest.as_std_path().to_path_buf(),
                message,
            };

            let reader = self.reader(partition, None)?;
            let schema = reader.schema();
            let mut staged = staging_file(&dest)?;
            let mut rows = 0u64;
            {
                let file: &mut File = staged.as_file_mut();
                let mut writer = ArrowWriter::try_new(file, schema, Some(props.clone()))
                    .map_err(|err| write_err(err.to_string()))?;
                for batch in reader {
                    let batch = batch.map_err(|err| parquet_err(&partition.path, err))?;
                    let batch = self.apply_predicates(batch)?;
                    if batch.num_rows() == 0 {
                        continue;
                    }
                    rows += batch.num_rows() as u64;
                    writer
                        .write(&batch)
                        .map_err(|err| write_err(err.to_string()))?;
                }
                writer.close().map_err(|err| write_err(err.to_string()))?;
            }
            staged
                .as_file_mut()
                .flush()
                .map_err(|err| write_err(err.to_string()))?;
            staged
                .persist(dest.as_std_path())
                .map_err(|err| write_err(err.to_string()))?;

            debug!(path = %dest, rows, "wrote partition");
            total += rows;
            files.push(WrittenPartition {
                index,
                path: dest.to_string(),
                rows,
            });
        }

        Ok(WriteSummary { files, rows: total })
    }
}

/// Sorts `values` and interpolates linearly at position `q * (n - 1)`.
pub fn linear_quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let pos = q * (values.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * frac)
}

fn open_builder(path: &Utf8Path) -> Result<ParquetRecordBatchReaderBuilder<File>, TripError> {
    let file = File::open(path.as_std_path()).map_err(|err| parquet_err(path, err))?;
    ParquetRecordBatchReaderBuilder::try_new(file).map_err(|err| parquet_err(path, err))
}

fn as_f64(array: &ArrayRef) -> Result<ArrayRef, TripError> {
    cast(array, &DataType::Float64).map_err(arrow_err)
}

fn parquet_err(path: &Utf8Path, err: impl ToString) -> TripError {
    TripError::Parquet {
        path: path.as_std_path().to_path_buf(),
        message: err.to_string(),
    }
}

fn arrow_err(err: arrow::error::ArrowError) -> TripError {
    TripError::Arrow(err.to_string())
}
