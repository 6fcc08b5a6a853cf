use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::remote_file_name;
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressSink};

pub const CHUNK_SIZE: usize = 64 * 1024;

pub trait Fetcher {
    fn fetch(
        &self,
        url: &Url,
        destination_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, IngestError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("criteo-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::Http(err.to_string()))?,
        );
        // Archives run to tens of gigabytes; bound the connect phase only.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| IngestError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn stream_to_file(
        &self,
        url: &Url,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), IngestError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|err| IngestError::Http(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download failed".to_string());
            return Err(IngestError::HttpStatus { status, message });
        }

        let parent = destination
            .parent()
            .ok_or_else(|| IngestError::Filesystem("invalid destination path".to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".criteo-ingest-download")
            .tempfile_in(parent)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;

        sink.event(ProgressEvent::Started {
            label: remote_file_name(url).unwrap_or_else(|| url.to_string()),
            total: response.content_length(),
        });
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|err| IngestError::Http(err.to_string()))?;
            if read == 0 {
                break;
            }
            temp.write_all(&buffer[..read])
                .map_err(|err| IngestError::Filesystem(err.to_string()))?;
            sink.event(ProgressEvent::Advanced {
                bytes: read as u64,
            });
        }
        sink.event(ProgressEvent::Finished);

        temp.as_file()
            .sync_all()
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        temp.persist(destination)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &Url,
        destination_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, IngestError> {
        let file_name = remote_file_name(url)
            .ok_or_else(|| IngestError::InvalidSource(format!("{url}: url has no file name")))?;
        let destination = destination_dir.join(&file_name);
        if destination.exists() {
            tracing::info!(path = %destination.display(), "archive already present, skipping download");
            return Ok(destination);
        }

        fs::create_dir_all(destination_dir)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        tracing::info!(%url, "downloading archive");
        self.stream_to_file(url, &destination, sink)?;
        Ok(destination)
    }
}
