use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::archive::Extractor;
use crate::convert::Converter;
use crate::domain::Source;
use crate::error::IngestError;
use crate::fetch::Fetcher;
use crate::loader::DatasetLoader;
use crate::progress::ProgressSink;
use crate::upload::{UploadOutcome, Uploader};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub delete_raw_after_convert: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub destination: String,
    pub sources: Vec<SourceReport>,
    pub totals: RunTotals,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.totals.sources_failed == 0 && self.totals.files_failed == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub error: Option<String>,
    pub files: Vec<FileReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub action: FileAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub uploads: Vec<UploadOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Converted,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub sources: usize,
    pub sources_failed: usize,
    pub files_converted: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub partitions: usize,
    pub uploads_succeeded: usize,
    pub uploads_failed: usize,
}

impl RunTotals {
    fn tally(sources: &[SourceReport]) -> Self {
        let mut totals = RunTotals {
            sources: sources.len(),
            ..RunTotals::default()
        };
        for source in sources {
            if source.error.is_some() {
                totals.sources_failed += 1;
            }
            for file in &source.files {
                match file.action {
                    FileAction::Converted => totals.files_converted += 1,
                    FileAction::Skipped => totals.files_skipped += 1,
                    FileAction::Failed => totals.files_failed += 1,
                }
                totals.partitions += file.uploads.len();
                for upload in &file.uploads {
                    if upload.is_uploaded() {
                        totals.uploads_succeeded += 1;
                    } else {
                        totals.uploads_failed += 1;
                    }
                }
            }
        }
        totals
    }
}

pub struct Pipeline<F: Fetcher, L: DatasetLoader, C: Converter, U: Uploader> {
    workspace: Workspace,
    extractor: Extractor,
    fetcher: F,
    loader: L,
    converter: C,
    uploader: U,
    options: RunOptions,
}

impl<F: Fetcher, L: DatasetLoader, C: Converter, U: Uploader> Pipeline<F, L, C, U> {
    pub fn new(
        workspace: Workspace,
        extractor: Extractor,
        fetcher: F,
        loader: L,
        converter: C,
        uploader: U,
        options: RunOptions,
    ) -> Self {
        Self {
            workspace,
            extractor,
            fetcher,
            loader,
            converter,
            uploader,
            options,
        }
    }

    pub fn run(&self, sources: &[Source], sink: &dyn ProgressSink) -> RunReport {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(sources.len());

        for source in sources {
            let mut report = SourceReport {
                source: source.to_string(),
                error: None,
                files: Vec::new(),
            };
            if let Err(err) = self.run_source(source, &mut report, sink) {
                tracing::error!(source = %source, error = %err, "source failed");
                report.error = Some(err.to_string());
            }
            reports.push(report);
        }

        let totals = RunTotals::tally(&reports);
        tracing::info!(
            sources = totals.sources,
            failed = totals.sources_failed,
            converted = totals.files_converted,
            skipped = totals.files_skipped,
            files_failed = totals.files_failed,
            uploads_failed = totals.uploads_failed,
            "run finished"
        );
        RunReport {
            started_at,
            finished_at: Utc::now(),
            destination: self.uploader.destination().to_string(),
            sources: reports,
            totals,
        }
    }

    fn run_source(
        &self,
        source: &Source,
        report: &mut SourceReport,
        sink: &dyn ProgressSink,
    ) -> Result<(), IngestError> {
        self.workspace.ensure()?;

        let inputs = match source {
            Source::Remote(url) => {
                let archive =
                    self.fetcher
                        .fetch(url, self.workspace.downloads_dir().as_std_path(), sink)?;
                vec![archive]
            }
            Source::LocalFile(path) => vec![path.clone()],
            Source::LocalDir(dir) => list_files(dir)?,
        };

        for input in inputs {
            if self.extractor.is_archive(&input) {
                for file in self.extractor.extract(&input)? {
                    report.files.push(self.process_file(&file, true, sink));
                }
            } else {
                report.files.push(self.process_file(&input, false, sink));
            }
        }
        Ok(())
    }

    fn process_file(&self, path: &Path, extracted: bool, sink: &dyn ProgressSink) -> FileReport {
        match self.convert_and_upload(path, extracted, sink) {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "file failed");
                FileReport {
                    path: path.display().to_string(),
                    action: FileAction::Failed,
                    error: Some(err.to_string()),
                    uploads: Vec::new(),
                }
            }
        }
    }

    fn convert_and_upload(
        &self,
        path: &Path,
        extracted: bool,
        sink: &dyn ProgressSink,
    ) -> Result<FileReport, IngestError> {
        let Some(dataset) = self.loader.load(path) else {
            return Ok(FileReport {
                path: path.display().to_string(),
                action: FileAction::Skipped,
                error: None,
                uploads: Vec::new(),
            });
        };

        let partitions = self
            .converter
            .convert(&dataset, self.workspace.output_dir().as_std_path())?;

        // Only staged copies are removed, never a caller's own input file.
        if extracted && self.options.delete_raw_after_convert {
            if let Err(err) = fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove raw file");
            }
        }

        let uploads = partitions
            .iter()
            .map(|partition| self.uploader.upload(partition, sink))
            .collect();
        Ok(FileReport {
            path: path.display().to_string(),
            action: FileAction::Converted,
            error: None,
            uploads,
        })
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
