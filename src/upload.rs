use std::fs;

use serde::Serialize;

use crate::domain::{DestinationUrl, PartitionFile, UploadTarget};
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::storage::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded { target: UploadTarget, bytes: u64 },
    Failed { target: UploadTarget, error: String },
}

impl UploadOutcome {
    pub fn target(&self) -> &UploadTarget {
        match self {
            UploadOutcome::Uploaded { target, .. } | UploadOutcome::Failed { target, .. } => {
                target
            }
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

pub trait Uploader {
    fn destination(&self) -> &DestinationUrl;

    /// Pushes one partition file. Storage failures are logged and reported
    /// in the outcome, never returned as errors.
    fn upload(&self, partition: &PartitionFile, sink: &dyn ProgressSink) -> UploadOutcome;
}

#[derive(Debug)]
pub struct ObjectStoreUploader<S: ObjectStore> {
    store: S,
    destination: DestinationUrl,
    delete_after_upload: bool,
}

impl<S: ObjectStore> ObjectStoreUploader<S> {
    pub fn new(store: S, destination: &str) -> Result<Self, IngestError> {
        let destination = DestinationUrl::parse_for_scheme(destination, store.scheme())?;
        Ok(Self {
            store,
            destination,
            delete_after_upload: false,
        })
    }

    pub fn delete_after_upload(mut self, delete: bool) -> Self {
        self.delete_after_upload = delete;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ObjectStore> Uploader for ObjectStoreUploader<S> {
    fn destination(&self) -> &DestinationUrl {
        &self.destination
    }

    fn upload(&self, partition: &PartitionFile, sink: &dyn ProgressSink) -> UploadOutcome {
        let file_name = partition
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| partition.path.display().to_string());
        let target = self.destination.target_for(&file_name);

        tracing::info!(file = %file_name, %target, "uploading partition");
        let total = fs::metadata(&partition.path).map(|meta| meta.len()).ok();
        sink.event(ProgressEvent::Started {
            label: file_name.clone(),
            total,
        });
        let result = self.store.put_file(&target, &partition.path, sink);
        sink.event(ProgressEvent::Finished);

        match result {
            Ok(bytes) => {
                if self.delete_after_upload {
                    if let Err(err) = fs::remove_file(&partition.path) {
                        tracing::warn!(path = %partition.path.display(), error = %err, "failed to remove uploaded partition");
                    }
                }
                UploadOutcome::Uploaded { target, bytes }
            }
            Err(err) => {
                tracing::error!(file = %file_name, %target, error = %err, "unable to upload partition");
                UploadOutcome::Failed {
                    target,
                    error: err.to_string(),
                }
            }
        }
    }
}
