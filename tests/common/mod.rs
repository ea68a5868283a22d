#![allow(dead_code)]

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

/// Writes a trip partition with `VendorID`, `Trip_Distance` and `Payment_Type` columns.
pub fn write_trips(path: &Path, distances: &[Option<f64>]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("VendorID", DataType::Int64, false),
        Field::new("Trip_Distance", DataType::Float64, true),
        Field::new("Payment_Type", DataType::Utf8, false),
    ]));
    let ids: ArrayRef = Arc::new(Int64Array::from(
        (0..distances.len() as i64).collect::<Vec<_>>(),
    ));
    let distance: ArrayRef = Arc::new(Float64Array::from(distances.to_vec()));
    let payment: ArrayRef = Arc::new(StringArray::from(
        distances.iter().map(|_| "CASH").collect::<Vec<_>>(),
    ));
    let batch = RecordBatch::try_new(schema.clone(), vec![ids, distance, payment]).unwrap();

    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

pub fn write_values(path: &Path, values: impl IntoIterator<Item = f64>) {
    let distances: Vec<Option<f64>> = values.into_iter().map(Some).collect();
    write_trips(path, &distances);
}

/// Writes a single-column partition with an arbitrary array.
pub fn write_column(path: &Path, name: &str, array: ArrayRef) {
    let schema = Arc::new(Schema::new(vec![Field::new(
        name,
        array.data_type().clone(),
        true,
    )]));
    let batch = RecordBatch::try_new(schema.clone(), vec![array]).unwrap();
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// All non-null `Trip_Distance` values of one Parquet file, in file order.
pub fn read_distances(path: &Path) -> Vec<f64> {
    let file = File::open(path).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap();
    let mut values = Vec::new();
    for batch in reader {
        let batch = batch.unwrap();
        let column = batch.column_by_name("Trip_Distance").unwrap();
        values.extend(column.as_primitive::<Float64Type>().iter().flatten());
    }
    values
}

pub fn sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values
}
