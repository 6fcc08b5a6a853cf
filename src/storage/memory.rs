use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::domain::UploadTarget;
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::storage::{ObjectStore, UPLOAD_CHUNK_SIZE, for_each_chunk};

type Objects = Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>;

#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    scheme: String,
    chunk_size: usize,
    objects: Objects,
}

impl MemoryObjectStore {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            chunk_size: UPLOAD_CHUNK_SIZE,
            objects: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_names(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| {
                objects
                    .keys()
                    .map(|(bucket, key)| format!("{bucket}/{key}"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn put_file(
        &self,
        target: &UploadTarget,
        source: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, IngestError> {
        let mut data = Vec::new();
        let total = for_each_chunk(source, self.chunk_size, |chunk| {
            data.extend_from_slice(chunk);
            sink.event(ProgressEvent::Advanced {
                bytes: chunk.len() as u64,
            });
            Ok(())
        })?;
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| IngestError::Storage("object map poisoned".to_string()))?;
        objects.insert((target.bucket.clone(), target.key.clone()), data);
        Ok(total)
    }
}
