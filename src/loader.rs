use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::domain::source_stem;
use crate::error::IngestError;

pub const DENSE_COLUMNS: usize = 13;
pub const SPARSE_COLUMNS: usize = 26;
pub const PROBE_ROWS: usize = 5;
pub const DELIMITER: u8 = b'\t';

pub fn column_names() -> Vec<String> {
    std::iter::once("label".to_string())
        .chain((1..=DENSE_COLUMNS).map(|i| format!("i{i}")))
        .chain((1..=SPARSE_COLUMNS).map(|i| format!("s{i}")))
        .collect()
}

pub fn record_schema() -> SchemaRef {
    let fields = column_names()
        .into_iter()
        .enumerate()
        .map(|(i, name)| match i {
            0 => Field::new(name, DataType::Int8, false),
            i if i <= DENSE_COLUMNS => Field::new(name, DataType::Int32, true),
            _ => Field::new(name, DataType::Utf8, true),
        })
        .collect::<Vec<_>>();
    Arc::new(Schema::new(fields))
}

#[derive(Debug, Clone)]
pub struct ValidatedDataset {
    path: PathBuf,
    stem: String,
    schema: SchemaRef,
}

impl ValidatedDataset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(
        &self,
        batch_size: usize,
    ) -> Result<impl Iterator<Item = Result<RecordBatch, ArrowError>> + use<>, IngestError> {
        let file = File::open(&self.path).map_err(|err| {
            IngestError::Filesystem(format!("open {}: {err}", self.path.display()))
        })?;
        open_reader(file, self.schema.clone(), batch_size)
            .map_err(|err| IngestError::Schema(err.to_string()))
    }
}

fn open_reader(
    file: File,
    schema: SchemaRef,
    batch_size: usize,
) -> Result<impl Iterator<Item = Result<RecordBatch, ArrowError>>, ArrowError> {
    ReaderBuilder::new(schema)
        .with_header(false)
        .with_delimiter(DELIMITER)
        .with_batch_size(batch_size)
        .build(file)
}

pub trait DatasetLoader {
    /// Returns `None` when `path` is not a dataset file; never fails.
    fn load(&self, path: &Path) -> Option<ValidatedDataset>;
}

pub struct TsvLoader {
    probe_rows: usize,
}

impl Default for TsvLoader {
    fn default() -> Self {
        Self {
            probe_rows: PROBE_ROWS,
        }
    }
}

impl TsvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe_rows(probe_rows: usize) -> Self {
        Self {
            probe_rows: probe_rows.max(1),
        }
    }

    fn probe(&self, path: &Path, schema: SchemaRef) -> Result<(), String> {
        let file = File::open(path).map_err(|err| err.to_string())?;
        let mut reader =
            open_reader(file, schema, self.probe_rows).map_err(|err| err.to_string())?;
        match reader.next() {
            Some(Ok(batch)) if batch.num_rows() > 0 => Ok(()),
            Some(Ok(_)) | None => Err("no rows".to_string()),
            Some(Err(err)) => Err(err.to_string()),
        }
    }
}

impl DatasetLoader for TsvLoader {
    fn load(&self, path: &Path) -> Option<ValidatedDataset> {
        let schema = record_schema();
        let Some(stem) = source_stem(path) else {
            tracing::warn!(path = %path.display(), "file has no usable name, skipping");
            return None;
        };
        match self.probe(path, schema.clone()) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "loaded tsv dataset");
                Some(ValidatedDataset {
                    path: path.to_path_buf(),
                    stem,
                    schema,
                })
            }
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "not a tsv dataset file, skipping");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_layout() {
        let schema = record_schema();
        assert_eq!(schema.fields().len(), 1 + DENSE_COLUMNS + SPARSE_COLUMNS);
        assert_eq!(schema.field(0).name(), "label");
        assert_eq!(schema.field(0).data_type(), &DataType::Int8);
        assert!(!schema.field(0).is_nullable());
        assert_eq!(schema.field(13).name(), "i13");
        assert_eq!(schema.field(13).data_type(), &DataType::Int32);
        assert_eq!(schema.field(14).name(), "s1");
        assert_eq!(schema.field(39).name(), "s26");
        assert!(schema.field(39).is_nullable());
    }
}
