use std::path::Path;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tokio::runtime::Runtime;

use crate::config::{DEFAULT_PART_SIZE, S3Config};
use crate::domain::UploadTarget;
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::storage::{ObjectStore, for_each_chunk};

const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

pub struct S3ObjectStore {
    runtime: Runtime,
    client: Client,
    part_size: usize,
}

impl S3ObjectStore {
    pub fn new(config: &S3Config) -> Result<Self, IngestError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| IngestError::Storage(err.to_string()))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = runtime.block_on(loader.load());

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(builder.build());

        tracing::debug!(
            region = config.region.as_deref().unwrap_or("default"),
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "s3 client initialized"
        );

        Ok(Self {
            runtime,
            client,
            part_size: config
                .part_size
                .unwrap_or(DEFAULT_PART_SIZE)
                .max(MIN_PART_SIZE),
        })
    }

    fn put_single(
        &self,
        target: &UploadTarget,
        source: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, IngestError> {
        let data = std::fs::read(source)
            .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", source.display())))?;
        let size = data.len() as u64;
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&target.bucket)
                    .key(&target.key)
                    .body(ByteStream::from(data))
                    .send(),
            )
            .map_err(|err| IngestError::Storage(DisplayErrorContext(&err).to_string()))?;
        sink.event(ProgressEvent::Advanced { bytes: size });
        Ok(size)
    }

    fn put_multipart(
        &self,
        target: &UploadTarget,
        source: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, IngestError> {
        let created = self
            .runtime
            .block_on(
                self.client
                    .create_multipart_upload()
                    .bucket(&target.bucket)
                    .key(&target.key)
                    .send(),
            )
            .map_err(|err| IngestError::Storage(DisplayErrorContext(&err).to_string()))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| IngestError::Storage("multipart upload id missing".to_string()))?
            .to_string();

        let mut parts = Vec::new();
        let uploaded = for_each_chunk(source, self.part_size, |chunk| {
            let part_number = parts.len() as i32 + 1;
            let response = self
                .runtime
                .block_on(
                    self.client
                        .upload_part()
                        .bucket(&target.bucket)
                        .key(&target.key)
                        .upload_id(&upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(chunk.to_vec()))
                        .send(),
                )
                .map_err(|err| IngestError::Storage(DisplayErrorContext(&err).to_string()))?;
            parts.push(
                CompletedPart::builder()
                    .e_tag(response.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );
            sink.event(ProgressEvent::Advanced {
                bytes: chunk.len() as u64,
            });
            Ok(())
        });

        let completed = uploaded.and_then(|total| {
            let upload = CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build();
            self.runtime
                .block_on(
                    self.client
                        .complete_multipart_upload()
                        .bucket(&target.bucket)
                        .key(&target.key)
                        .upload_id(&upload_id)
                        .multipart_upload(upload)
                        .send(),
                )
                .map_err(|err| IngestError::Storage(DisplayErrorContext(&err).to_string()))?;
            Ok(total)
        });

        if completed.is_err() {
            let aborted = self.runtime.block_on(
                self.client
                    .abort_multipart_upload()
                    .bucket(&target.bucket)
                    .key(&target.key)
                    .upload_id(&upload_id)
                    .send(),
            );
            if let Err(err) = aborted {
                tracing::warn!(%target, error = %DisplayErrorContext(&err), "failed to abort multipart upload");
            }
        }
        completed
    }
}

impl ObjectStore for S3ObjectStore {
    fn scheme(&self) -> &str {
        "s3"
    }

    fn put_file(
        &self,
        target: &UploadTarget,
        source: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, IngestError> {
        let size = std::fs::metadata(source)
            .map_err(|err| IngestError::Filesystem(format!("stat {}: {err}", source.display())))?
            .len();
        if size <= self.part_size as u64 {
            self.put_single(target, source, sink)
        } else {
            self.put_multipart(target, source, sink)
        }
    }
}
