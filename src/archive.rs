use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tar::Archive;
use zip::ZipArchive;

use crate::error::IngestError;

pub trait ArchiveFormat: Send + Sync {
    fn name(&self) -> &str;

    fn extensions(&self) -> &[&str];

    fn unpack(&self, archive: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, IngestError>;
}

pub struct GzipFormat;
pub struct TarFormat;
pub struct TarGzFormat;
pub struct ZipFormat;

impl ArchiveFormat for GzipFormat {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz"]
    }

    fn unpack(&self, archive: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let file_name = archive
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| extraction_error(archive, "archive has no file name"))?;
        let output_name = strip_suffix_ignore_case(file_name, ".gz")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| extraction_error(archive, "cannot derive output name"))?;
        let output = target_dir.join(output_name);

        let input = fs::File::open(archive).map_err(|err| extraction_error(archive, err))?;
        let mut decoder = MultiGzDecoder::new(io::BufReader::new(input));
        let mut temp = tempfile::Builder::new()
            .prefix(".criteo-ingest-gunzip")
            .tempfile_in(target_dir)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        io::copy(&mut decoder, &mut temp).map_err(|err| extraction_error(archive, err))?;
        temp.persist(&output)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        Ok(vec![output])
    }
}

impl ArchiveFormat for TarFormat {
    fn name(&self) -> &str {
        "tar"
    }

    fn extensions(&self) -> &[&str] {
        &[".tar"]
    }

    fn unpack(&self, archive: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let input = fs::File::open(archive).map_err(|err| extraction_error(archive, err))?;
        unpack_tar(archive, io::BufReader::new(input), target_dir)
    }
}

impl ArchiveFormat for TarGzFormat {
    fn name(&self) -> &str {
        "gztar"
    }

    fn extensions(&self) -> &[&str] {
        &[".tar.gz", ".tgz"]
    }

    fn unpack(&self, archive: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let input = fs::File::open(archive).map_err(|err| extraction_error(archive, err))?;
        unpack_tar(
            archive,
            MultiGzDecoder::new(io::BufReader::new(input)),
            target_dir,
        )
    }
}

impl ArchiveFormat for ZipFormat {
    fn name(&self) -> &str {
        "zip"
    }

    fn extensions(&self) -> &[&str] {
        &[".zip"]
    }

    fn unpack(&self, archive: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let file = fs::File::open(archive).map_err(|err| extraction_error(archive, err))?;
        let mut zip = ZipArchive::new(file).map_err(|err| extraction_error(archive, err))?;

        let mut written = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|err| extraction_error(archive, err))?;
            let entry_path = match entry.enclosed_name() {
                Some(path) => target_dir.join(path),
                None => {
                    return Err(extraction_error(
                        archive,
                        "zip entry path traversal detected",
                    ));
                }
            };

            if entry.is_dir() {
                fs::create_dir_all(&entry_path)
                    .map_err(|err| IngestError::Filesystem(err.to_string()))?;
                continue;
            }

            if let Some(parent) = entry_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| IngestError::Filesystem(err.to_string()))?;
            }
            let mut outfile = fs::File::create(&entry_path)
                .map_err(|err| IngestError::Filesystem(err.to_string()))?;
            io::copy(&mut entry, &mut outfile).map_err(|err| extraction_error(archive, err))?;
            written.push(entry_path);
        }
        Ok(written)
    }
}

fn unpack_tar<R: io::Read>(
    archive: &Path,
    reader: R,
    target_dir: &Path,
) -> Result<Vec<PathBuf>, IngestError> {
    let mut tar = Archive::new(reader);
    let entries = tar.entries().map_err(|err| extraction_error(archive, err))?;
    let mut written = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|err| extraction_error(archive, err))?;
        let is_file = entry.header().entry_type().is_file();
        let relative = entry
            .path()
            .map_err(|err| extraction_error(archive, err))?
            .into_owned();
        // `unpack_in` refuses members escaping `target_dir` and returns false.
        let unpacked = entry
            .unpack_in(target_dir)
            .map_err(|err| extraction_error(archive, err))?;
        if !unpacked {
            return Err(extraction_error(
                archive,
                "tar member path traversal detected",
            ));
        }
        if is_file {
            written.push(target_dir.join(relative));
        }
    }
    Ok(written)
}

fn extraction_error(archive: &Path, message: impl std::fmt::Display) -> IngestError {
    IngestError::Extraction {
        archive: archive.display().to_string(),
        message: message.to_string(),
    }
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    if !value.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = value.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

#[derive(Default)]
pub struct FormatRegistry {
    formats: Vec<Box<dyn ArchiveFormat>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TarFormat));
        registry.register(Box::new(TarGzFormat));
        registry.register(Box::new(ZipFormat));
        registry.register(Box::new(GzipFormat));
        registry
    }

    pub fn register(&mut self, format: Box<dyn ArchiveFormat>) {
        self.formats.push(format);
    }

    pub fn names(&self) -> Vec<&str> {
        self.formats.iter().map(|format| format.name()).collect()
    }

    pub fn detect(&self, path: &Path) -> Option<&dyn ArchiveFormat> {
        let file_name = path.file_name()?.to_str()?;
        self.formats
            .iter()
            .filter_map(|format| {
                format
                    .extensions()
                    .iter()
                    .filter(|ext| strip_suffix_ignore_case(file_name, ext).is_some())
                    .map(|ext| ext.len())
                    .max()
                    .map(|len| (len, format.as_ref()))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, format)| format)
    }
}

#[derive(Debug)]
pub struct ExtractedFiles {
    inner: std::vec::IntoIter<PathBuf>,
}

impl Iterator for ExtractedFiles {
    type Item = PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub struct Extractor {
    registry: FormatRegistry,
    staging_root: Option<PathBuf>,
}

impl Extractor {
    pub fn new(registry: FormatRegistry) -> Self {
        Self {
            registry,
            staging_root: None,
        }
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn is_archive(&self, path: &Path) -> bool {
        self.registry.detect(path).is_some()
    }

    pub fn extract(&self, archive: &Path) -> Result<ExtractedFiles, IngestError> {
        let format = self
            .registry
            .detect(archive)
            .ok_or_else(|| IngestError::UnsupportedArchive(archive.display().to_string()))?;
        let target_dir = match &self.staging_root {
            Some(root) => root.clone(),
            None => archive
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        fs::create_dir_all(&target_dir)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;

        tracing::info!(archive = %archive.display(), format = format.name(), "extracting archive");
        let files = format.unpack(archive, &target_dir)?;
        tracing::debug!(count = files.len(), "extracted files");
        Ok(ExtractedFiles {
            inner: files.into_iter(),
        })
    }
}
