use std::io::{self, Write};

use serde::Serialize;

use crate::app::{FileAction, RunReport};
use crate::progress::human_bytes;
use crate::upload::UploadOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub fn render_summary(report: &RunReport) -> String {
    let totals = &report.totals;
    let mut out = String::new();
    out.push_str(&format!("criteo-ingest summary -> {}\n", report.destination));
    out.push_str(&format!(
        "  sources: {} ({} failed)\n",
        totals.sources, totals.sources_failed
    ));
    out.push_str(&format!(
        "  files: {} converted, {} skipped, {} failed\n",
        totals.files_converted, totals.files_skipped, totals.files_failed
    ));
    out.push_str(&format!(
        "  uploads: {} of {} partitions ({} failed)\n",
        totals.uploads_succeeded, totals.partitions, totals.uploads_failed
    ));

    for source in &report.sources {
        if let Some(error) = &source.error {
            out.push_str(&format!("  ! {}: {error}\n", source.source));
        }
        for file in &source.files {
            match file.action {
                FileAction::Skipped => {
                    out.push_str(&format!("  - {} (skipped)\n", file.path));
                }
                FileAction::Failed => {
                    let error = file.error.as_deref().unwrap_or("unknown error");
                    out.push_str(&format!("  ! {}: {error}\n", file.path));
                }
                FileAction::Converted => {
                    for upload in &file.uploads {
                        match upload {
                            UploadOutcome::Uploaded { target, bytes } => out.push_str(&format!(
                                "  + {target} ({})\n",
                                human_bytes(*bytes)
                            )),
                            UploadOutcome::Failed { target, error } => {
                                out.push_str(&format!("  ! {target}: {error}\n"))
                            }
                        }
                    }
                }
            }
        }
    }
    out
}
