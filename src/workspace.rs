use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::IngestError;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: Utf8PathBuf,
}

impl Workspace {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn downloads_dir(&self) -> Utf8PathBuf {
        self.root.join("downloads")
    }

    pub fn staging_dir(&self) -> Utf8PathBuf {
        self.root.join("staging")
    }

    pub fn output_dir(&self) -> Utf8PathBuf {
        self.root.join("parquet")
    }

    pub fn ensure(&self) -> Result<(), IngestError> {
        for dir in [self.downloads_dir(), self.staging_dir(), self.output_dir()] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| IngestError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let workspace = Workspace::new(Utf8PathBuf::from("/data/criteo"));
        assert!(workspace.downloads_dir().ends_with("criteo/downloads"));
        assert!(workspace.staging_dir().ends_with("criteo/staging"));
        assert!(workspace.output_dir().ends_with("criteo/parquet"));
    }
}
