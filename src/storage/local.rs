use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use camino::Utf8PathBuf;

use crate::domain::UploadTarget;
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::storage::{ObjectStore, UPLOAD_CHUNK_SIZE, for_each_chunk};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: Utf8PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn object_path(&self, target: &UploadTarget) -> Result<PathBuf, IngestError> {
        let relative = Path::new(&target.bucket).join(&target.key);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if escapes {
            return Err(IngestError::Storage(format!(
                "object key escapes the store root: {target}"
            )));
        }
        Ok(self.root.as_std_path().join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn scheme(&self) -> &str {
        "file"
    }

    fn put_file(
        &self,
        target: &UploadTarget,
        source: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, IngestError> {
        let destination = self.object_path(target)?;
        let parent = destination
            .parent()
            .ok_or_else(|| IngestError::Storage("invalid object path".to_string()))?;
        fs::create_dir_all(parent).map_err(|err| IngestError::Storage(err.to_string()))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".criteo-ingest-object")
            .tempfile_in(parent)
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        let total = for_each_chunk(source, UPLOAD_CHUNK_SIZE, |chunk| {
            temp.write_all(chunk)
                .map_err(|err| IngestError::Storage(err.to_string()))?;
            sink.event(ProgressEvent::Advanced {
                bytes: chunk.len() as u64,
            });
            Ok(())
        })?;
        temp.persist(&destination)
            .map_err(|err| IngestError::Storage(err.to_string()))?;
        Ok(total)
    }
}
