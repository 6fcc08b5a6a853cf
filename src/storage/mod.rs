use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::domain::UploadTarget;
use crate::error::IngestError;
use crate::progress::ProgressSink;

pub mod local;
pub mod memory;
pub mod s3;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

pub const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

pub trait ObjectStore {
    fn scheme(&self) -> &str;

    fn put_file(
        &self,
        target: &UploadTarget,
        source: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, IngestError>;
}

pub fn for_each_chunk<F>(path: &Path, chunk_size: usize, mut on_chunk: F) -> Result<u64, IngestError>
where
    F: FnMut(&[u8]) -> Result<(), IngestError>,
{
    let mut file = File::open(path)
        .map_err(|err| IngestError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let filled = fill_buffer(&mut file, &mut buffer)
            .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", path.display())))?;
        if filled == 0 {
            break;
        }
        on_chunk(&buffer[..filled])?;
        total += filled as u64;
        if filled < buffer.len() {
            break;
        }
    }
    Ok(total)
}

fn fill_buffer(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, vec![7u8; 10]).unwrap();

        let mut sizes = Vec::new();
        let total = for_each_chunk(&path, 4, |chunk| {
            sizes.push(chunk.len());
            Ok(())
        })
        .unwrap();

        assert_eq!(total, 10);
        assert_eq!(sizes, vec![4, 4, 2]);
    }
}
