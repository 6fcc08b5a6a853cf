use std::fs;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;

use criteo_ingest::domain::{PartitionFile, UploadTarget};
use criteo_ingest::error::IngestError;
use criteo_ingest::progress::{NoopProgress, ProgressEvent, ProgressSink};
use criteo_ingest::storage::{LocalObjectStore, MemoryObjectStore, ObjectStore};
use criteo_ingest::upload::{ObjectStoreUploader, UploadOutcome, Uploader};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct BrokenStore;

impl ObjectStore for BrokenStore {
    fn scheme(&self) -> &str {
        "store"
    }

    fn put_file(
        &self,
        _target: &UploadTarget,
        _source: &Path,
        _sink: &dyn ProgressSink,
    ) -> Result<u64, IngestError> {
        Err(IngestError::Storage("connection reset".to_string()))
    }
}

fn partition(dir: &Path, name: &str, content: &[u8]) -> PartitionFile {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    PartitionFile { index: 0, path }
}

#[test]
fn uploads_under_destination_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let part = partition(dir.path(), "day_3_0.parquet", b"0123456789");

    let store = MemoryObjectStore::new("store").with_chunk_size(4);
    let uploader = ObjectStoreUploader::new(store.clone(), "store://bucket/a/b/").unwrap();
    let sink = RecordingSink::default();
    let outcome = uploader.upload(&part, &sink);

    assert_matches!(&outcome, UploadOutcome::Uploaded { bytes: 10, .. });
    assert_eq!(outcome.target().key, "a/b/day_3_0.parquet");
    assert_eq!(store.object_names(), ["bucket/a/b/day_3_0.parquet"]);
    assert_eq!(
        store.get_object("bucket", "a/b/day_3_0.parquet").unwrap(),
        b"0123456789"
    );
    assert!(part.path.exists());

    let events = sink.events.lock().unwrap();
    assert_matches!(
        events.first(),
        Some(ProgressEvent::Started { total: Some(10), .. })
    );
    let deltas: Vec<u64> = events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::Advanced { bytes } => Some(*bytes),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, [4, 4, 2]);
    assert_eq!(events.last(), Some(&ProgressEvent::Finished));
}

#[test]
fn wrong_scheme_fails_before_any_upload() {
    let store = MemoryObjectStore::new("store");
    let result = ObjectStoreUploader::new(store.clone(), "s3://bucket/prefix");
    assert_matches!(result, Err(IngestError::SchemeMismatch { .. }));
    assert!(store.object_names().is_empty());
}

#[test]
fn storage_failure_is_contained_and_file_kept() {
    let dir = tempfile::tempdir().unwrap();
    let part = partition(dir.path(), "day_0_0.parquet", b"data");

    let uploader = ObjectStoreUploader::new(BrokenStore, "store://bucket/prefix")
        .unwrap()
        .delete_after_upload(true);
    let outcome = uploader.upload(&part, &NoopProgress);

    assert_matches!(&outcome, UploadOutcome::Failed { error, .. } if error.contains("connection reset"));
    assert_eq!(outcome.target().to_string(), "bucket/prefix/day_0_0.parquet");
    assert!(part.path.exists());
}

#[test]
fn uploaded_partition_can_be_removed() {
    let dir = tempfile::tempdir().unwrap();
    let part = partition(dir.path(), "day_0_1.parquet", b"data");

    let store = MemoryObjectStore::new("store");
    let uploader = ObjectStoreUploader::new(store.clone(), "store://bucket")
        .unwrap()
        .delete_after_upload(true);
    assert!(uploader.upload(&part, &NoopProgress).is_uploaded());
    assert!(!part.path.exists());
    assert_eq!(store.object_names(), ["bucket/day_0_1.parquet"]);
}

#[test]
fn local_store_writes_under_root() {
    let dir = tempfile::tempdir().unwrap();
    let part = partition(dir.path(), "day_5_0.parquet", b"columnar");
    let root = camino::Utf8PathBuf::from_path_buf(dir.path().join("store")).unwrap();

    let uploader =
        ObjectStoreUploader::new(LocalObjectStore::new(root.clone()), "file://lake/criteo/").unwrap();
    assert!(uploader.upload(&part, &NoopProgress).is_uploaded());
    assert_eq!(
        fs::read(root.join("lake/criteo/day_5_0.parquet")).unwrap(),
        b"columnar"
    );
}

#[test]
fn local_store_refuses_escaping_keys() {
    let root = camino::Utf8PathBuf::from("/tmp/store");
    let store = LocalObjectStore::new(root);
    let target = UploadTarget {
        bucket: "lake".to_string(),
        key: "../../etc/passwd".to_string(),
    };
    assert_matches!(store.object_path(&target), Err(IngestError::Storage(_)));
}
