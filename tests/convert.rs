use std::fs;
use std::path::Path;

use arrow::array::{Array, Int8Array, Int32Array, StringArray};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use criteo_ingest::config::ParquetCompression;
use criteo_ingest::convert::{Converter, ParquetConverter, discover_partitions};
use criteo_ingest::loader::{DatasetLoader, TsvLoader, ValidatedDataset};

fn criteo_row(label: u8, seed: u32) -> String {
    let mut fields = vec![label.to_string()];
    fields.extend((1..=13).map(|i| if i == 5 { String::new() } else { (seed + i).to_string() }));
    fields.extend((1..=26).map(|i| {
        if i == 26 {
            String::new()
        } else {
            format!("{:08x}", seed * 100 + i)
        }
    }));
    fields.join("\t")
}

fn dataset(dir: &Path, name: &str, rows: u32) -> ValidatedDataset {
    let path = dir.join(name);
    let content: String = (0..rows)
        .map(|i| criteo_row((i % 2) as u8, i) + "\n")
        .collect();
    fs::write(&path, content).unwrap();
    TsvLoader::new().load(&path).expect("dataset")
}

fn read_partition(path: &Path) -> Vec<RecordBatch> {
    let file = fs::File::open(path).unwrap();
    ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn partition_preserves_values_and_nulls() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dataset(dir.path(), "day_3.tsv", 6);
    let output = dir.path().join("parquet");

    let partitions = ParquetConverter::default().convert(&dataset, &output).unwrap();
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].file_name(), Some("day_3_0.parquet"));

    let batches = read_partition(&partitions[0].path);
    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    assert_eq!(rows, 6);

    let batch = &batches[0];
    assert_eq!(batch.schema().fields().len(), 40);
    let labels = batch.column(0).as_any().downcast_ref::<Int8Array>().unwrap();
    assert_eq!(labels.value(0), 0);
    assert_eq!(labels.value(1), 1);
    let i1 = batch.column(1).as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(i1.value(4), 5);
    let i5 = batch.column(5).as_any().downcast_ref::<Int32Array>().unwrap();
    assert!(i5.is_null(2));
    let s2 = batch.column(15).as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(s2.value(1), format!("{:08x}", 102));
    let s26 = batch.column(39).as_any().downcast_ref::<StringArray>().unwrap();
    assert!(s26.is_null(0));
}

#[test]
fn rows_are_split_across_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dataset(dir.path(), "day_1.tsv", 10);
    let output = dir.path().join("parquet");

    let converter = ParquetConverter::new(ParquetCompression::Snappy, Some(4), 3);
    let partitions = converter.convert(&dataset, &output).unwrap();
    let names: Vec<_> = partitions
        .iter()
        .map(|partition| partition.file_name().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        ["day_1_0.parquet", "day_1_1.parquet", "day_1_2.parquet"]
    );

    let counts: Vec<usize> = partitions
        .iter()
        .map(|partition| {
            read_partition(&partition.path)
                .iter()
                .map(RecordBatch::num_rows)
                .sum()
        })
        .collect();
    assert_eq!(counts, [4, 4, 2]);

    let last = read_partition(&partitions[2].path);
    let i1 = last[0].column(1).as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(i1.value(0), 9);
}

#[test]
fn existing_partitions_are_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dataset(dir.path(), "day_2.tsv", 8);
    let output = dir.path().join("parquet");
    let converter = ParquetConverter::new(ParquetCompression::Gzip, Some(5), 64);

    let first = converter.convert(&dataset, &output).unwrap();
    let before: Vec<_> = first
        .iter()
        .map(|partition| fs::metadata(&partition.path).unwrap().modified().unwrap())
        .collect();

    let second = converter.convert(&dataset, &output).unwrap();
    assert_eq!(first, second);
    let after: Vec<_> = second
        .iter()
        .map(|partition| fs::metadata(&partition.path).unwrap().modified().unwrap())
        .collect();
    assert_eq!(before, after);

    let leftovers = fs::read_dir(&output)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn discovery_ignores_other_stems_and_orders_by_index() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
        "day_1_10.parquet",
        "day_1_2.parquet",
        "day_1_0.parquet",
        "day_10_0.parquet",
        "day_1_x.parquet",
        "day_1_1.csv",
    ] {
        fs::write(dir.path().join(name), b"").unwrap();
    }

    let found = discover_partitions(dir.path(), "day_1", "parquet").unwrap();
    let indexes: Vec<_> = found.iter().map(|partition| partition.index).collect();
    assert_eq!(indexes, [0, 2, 10]);
}
