use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use reqwest::Url;
use serde::Serialize;

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(Url),
    LocalFile(PathBuf),
    LocalDir(PathBuf),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Remote(url) => write!(f, "{url}"),
            Source::LocalFile(path) | Source::LocalDir(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FromStr for Source {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IngestError::InvalidSource("empty source".to_string()));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|err| IngestError::InvalidSource(format!("{trimmed}: {err}")))?;
            if remote_file_name(&url).is_none() {
                return Err(IngestError::InvalidSource(format!(
                    "{trimmed}: url has no file name"
                )));
            }
            return Ok(Source::Remote(url));
        }
        let path = PathBuf::from(trimmed);
        if path.is_dir() {
            Ok(Source::LocalDir(path))
        } else if path.is_file() {
            Ok(Source::LocalFile(path))
        } else {
            Err(IngestError::InvalidSource(format!(
                "{trimmed}: not a url, file or directory"
            )))
        }
    }
}

pub fn remote_file_name(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationUrl {
    scheme: String,
    bucket: String,
    prefix: String,
}

impl DestinationUrl {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn parse_for_scheme(value: &str, expected: &str) -> Result<Self, IngestError> {
        let parsed: DestinationUrl = value.parse()?;
        if parsed.scheme != expected {
            return Err(IngestError::SchemeMismatch {
                expected: expected.to_string(),
                found: parsed.scheme,
            });
        }
        Ok(parsed)
    }

    pub fn target_for(&self, file_name: &str) -> UploadTarget {
        UploadTarget {
            bucket: self.bucket.clone(),
            key: object_key(&self.prefix, file_name),
        }
    }
}

impl fmt::Display for DestinationUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.prefix)
    }
}

impl FromStr for DestinationUrl {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| IngestError::InvalidDestination(trimmed.to_string()))?;
        let scheme_ok = !scheme.is_empty()
            && scheme
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(IngestError::InvalidDestination(trimmed.to_string()));
        }
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(IngestError::InvalidDestination(format!(
                "{trimmed}: missing bucket"
            )));
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: bucket.to_string(),
            prefix: prefix.trim_start_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UploadTarget {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

pub fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}

pub fn partition_file_name(stem: &str, index: usize, extension: &str) -> String {
    format!("{stem}_{index}.{extension}")
}

pub fn source_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionFile {
    pub index: usize,
    pub path: PathBuf,
}

impl PartitionFile {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_join_normalizes_slashes() {
        assert_eq!(object_key("a/b/", "x.parquet"), "a/b/x.parquet");
        assert_eq!(object_key("/a/b", "x.parquet"), "a/b/x.parquet");
        assert_eq!(object_key("", "x.parquet"), "x.parquet");
    }

    #[test]
    fn destination_without_prefix() {
        let dest: DestinationUrl = "s3://bucket".parse().unwrap();
        assert_eq!(dest.bucket(), "bucket");
        assert_eq!(dest.prefix(), "");
    }
}
