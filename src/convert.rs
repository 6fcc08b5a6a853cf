use std::fs;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use regex::Regex;
use tempfile::NamedTempFile;

use crate::config::ParquetCompression;
use crate::domain::{PartitionFile, partition_file_name};
use crate::error::IngestError;
use crate::loader::ValidatedDataset;

pub const PARQUET_EXTENSION: &str = "parquet";

pub trait Converter {
    fn extension(&self) -> &str;

    fn convert(
        &self,
        dataset: &ValidatedDataset,
        output_dir: &Path,
    ) -> Result<Vec<PartitionFile>, IngestError>;
}

#[derive(Debug, Clone)]
pub struct ParquetConverter {
    compression: ParquetCompression,
    max_rows_per_file: Option<usize>,
    batch_size: usize,
}

impl ParquetConverter {
    pub fn new(
        compression: ParquetCompression,
        max_rows_per_file: Option<usize>,
        batch_size: usize,
    ) -> Self {
        Self {
            compression,
            max_rows_per_file: max_rows_per_file.filter(|rows| *rows > 0),
            batch_size: batch_size.max(1),
        }
    }

    fn writer_properties(&self) -> WriterProperties {
        let compression = match self.compression {
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
        };
        WriterProperties::builder()
            .set_compression(compression)
            .build()
    }

    fn open_partition(
        &self,
        dataset: &ValidatedDataset,
        output_dir: &Path,
        index: usize,
    ) -> Result<PartitionWriter, IngestError> {
        let target = output_dir.join(partition_file_name(
            dataset.stem(),
            index,
            PARQUET_EXTENSION,
        ));
        if target.exists() {
            tracing::info!(path = %target.display(), "partition exists, leaving it untouched");
            return Ok(PartitionWriter::Existing);
        }

        let temp = tempfile::Builder::new()
            .prefix(".criteo-ingest-partition")
            .tempfile_in(output_dir)
            .map_err(|err| conversion_error(dataset, err))?;
        let writer = ArrowWriter::try_new(temp, dataset.schema(), Some(self.writer_properties()))
            .map_err(|err| conversion_error(dataset, err))?;
        Ok(PartitionWriter::Writing { writer, target })
    }
}

impl Default for ParquetConverter {
    fn default() -> Self {
        Self::new(
            ParquetCompression::Gzip,
            None,
            crate::config::DEFAULT_BATCH_SIZE,
        )
    }
}

enum PartitionWriter {
    Writing {
        writer: ArrowWriter<NamedTempFile>,
        target: PathBuf,
    },
    Existing,
}

impl PartitionWriter {
    fn write(&mut self, batch: &RecordBatch) -> Result<(), parquet::errors::ParquetError> {
        match self {
            PartitionWriter::Writing { writer, .. } => writer.write(batch),
            PartitionWriter::Existing => Ok(()),
        }
    }

    fn finish(self, dataset: &ValidatedDataset) -> Result<(), IngestError> {
        let PartitionWriter::Writing { writer, target } = self else {
            return Ok(());
        };
        let temp = writer
            .into_inner()
            .map_err(|err| conversion_error(dataset, err))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| conversion_error(dataset, err))?;
        temp.persist(&target)
            .map_err(|err| conversion_error(dataset, err))?;
        tracing::debug!(path = %target.display(), "wrote partition");
        Ok(())
    }
}

impl Converter for ParquetConverter {
    fn extension(&self) -> &str {
        PARQUET_EXTENSION
    }

    fn convert(
        &self,
        dataset: &ValidatedDataset,
        output_dir: &Path,
    ) -> Result<Vec<PartitionFile>, IngestError> {
        tracing::info!(source = %dataset.path().display(), "converting dataset to parquet");
        fs::create_dir_all(output_dir).map_err(|err| conversion_error(dataset, err))?;

        let limit = self.max_rows_per_file.unwrap_or(usize::MAX);
        let mut index = 0usize;
        let mut rows_in_partition = 0usize;
        let mut current: Option<PartitionWriter> = None;

        for batch in dataset.batches(self.batch_size)? {
            let batch = batch.map_err(|err| conversion_error(dataset, err))?;
            let mut offset = 0usize;
            while offset < batch.num_rows() {
                let mut partition = match current.take() {
                    Some(partition) => partition,
                    None => self.open_partition(dataset, output_dir, index)?,
                };
                let take = (limit - rows_in_partition).min(batch.num_rows() - offset);
                partition
                    .write(&batch.slice(offset, take))
                    .map_err(|err| conversion_error(dataset, err))?;
                offset += take;
                rows_in_partition += take;

                if rows_in_partition == limit {
                    partition.finish(dataset)?;
                    index += 1;
                    rows_in_partition = 0;
                } else {
                    current = Some(partition);
                }
            }
        }
        if let Some(partition) = current.take() {
            partition.finish(dataset)?;
        }

        let partitions = discover_partitions(output_dir, dataset.stem(), PARQUET_EXTENSION)?;
        if partitions.is_empty() {
            return Err(conversion_error(
                dataset,
                format!(
                    "expected {} in {}",
                    partition_file_name(dataset.stem(), 0, PARQUET_EXTENSION),
                    output_dir.display()
                ),
            ));
        }
        Ok(partitions)
    }
}

pub fn discover_partitions(
    dir: &Path,
    stem: &str,
    extension: &str,
) -> Result<Vec<PartitionFile>, IngestError> {
    let pattern = format!(
        r"^{}_(\d+)\.{}$",
        regex::escape(stem),
        regex::escape(extension)
    );
    let template = Regex::new(&pattern).map_err(|err| IngestError::Filesystem(err.to_string()))?;

    let entries = fs::read_dir(dir)
        .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut partitions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(index) = template
            .captures(name)
            .and_then(|caps| caps[1].parse::<usize>().ok())
        else {
            continue;
        };
        partitions.push(PartitionFile { index, path });
    }
    partitions.sort_by_key(|partition| partition.index);
    Ok(partitions)
}

fn conversion_error(dataset: &ValidatedDataset, message: impl std::fmt::Display) -> IngestError {
    IngestError::Conversion {
        source_file: dataset.path().display().to_string(),
        message: message.to_string(),
    }
}
