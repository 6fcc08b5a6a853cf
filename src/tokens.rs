use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::IngestError;
use crate::loader::{DELIMITER, DENSE_COLUMNS, SPARSE_COLUMNS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSets {
    columns: Vec<BTreeSet<String>>,
}

impl Default for TokenSets {
    fn default() -> Self {
        Self {
            columns: vec![BTreeSet::new(); SPARSE_COLUMNS],
        }
    }
}

impl TokenSets {
    pub fn column(&self, column: usize) -> Option<&BTreeSet<String>> {
        column.checked_sub(1).and_then(|i| self.columns.get(i))
    }

    pub fn insert(&mut self, column: usize, token: &str) {
        if let Some(set) = column.checked_sub(1).and_then(|i| self.columns.get_mut(i)) {
            if !set.contains(token) {
                set.insert(token.to_string());
            }
        }
    }

    pub fn merge(&mut self, other: TokenSets) {
        for (mine, theirs) in self.columns.iter_mut().zip(other.columns) {
            if mine.is_empty() {
                *mine = theirs;
            } else {
                mine.extend(theirs);
            }
        }
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(BTreeSet::len).sum()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, tokens)| (format!("s{}", i + 1), serde_json::json!(tokens)))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

pub fn file_tokens(path: &Path) -> Result<TokenSets, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(false)
        .from_path(path)
        .map_err(|err| IngestError::Tokens(format!("open {}: {err}", path.display())))?;

    let mut tokens = TokenSets::default();
    let mut record = csv::ByteRecord::new();
    loop {
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|err| IngestError::Tokens(format!("{}: {err}", path.display())))?;
        if !more {
            break;
        }
        for column in 1..=SPARSE_COLUMNS {
            let Some(field) = record.get(DENSE_COLUMNS + column) else {
                return Err(IngestError::Tokens(format!(
                    "{}: row has {} fields",
                    path.display(),
                    record.len()
                )));
            };
            tokens.insert(column, &String::from_utf8_lossy(field));
        }
    }
    Ok(tokens)
}

pub fn distinct_tokens(files: &[PathBuf], workers: usize) -> Result<TokenSets, IngestError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("tokens-{i}"))
        .build()
        .map_err(|err| IngestError::Tokens(err.to_string()))?;

    pool.install(|| {
        files
            .par_iter()
            .map(|path| {
                tracing::info!(path = %path.display(), "collecting tokens");
                file_tokens(path)
            })
            .try_reduce(TokenSets::default, |mut acc, partial| {
                acc.merge(partial);
                Ok(acc)
            })
    })
}

pub fn resolve_inputs(pattern: &str) -> Result<Vec<PathBuf>, IngestError> {
    let paths = glob::glob(pattern)
        .map_err(|err| IngestError::Tokens(format!("bad pattern {pattern}: {err}")))?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    if paths.is_empty() {
        return Err(IngestError::Tokens(format!(
            "there are no files matching the pattern {pattern}"
        )));
    }
    Ok(paths)
}

pub fn check_output(outfile: &Path) -> Result<(), IngestError> {
    let parent = match outfile.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(IngestError::Tokens(format!(
            "there is no such directory as {}",
            parent.display()
        )));
    }
    if outfile.exists() {
        return Err(IngestError::Tokens(format!(
            "{} already exists",
            outfile.display()
        )));
    }
    Ok(())
}

pub fn write_tokens(outfile: &Path, tokens: &TokenSets) -> Result<(), IngestError> {
    let content = serde_json::to_vec_pretty(&tokens.to_json())
        .map_err(|err| IngestError::Tokens(err.to_string()))?;
    fs::write(outfile, content)
        .map_err(|err| IngestError::Filesystem(format!("write {}: {err}", outfile.display())))
}
