use std::fs;
use std::path::Path;

use assert_matches::assert_matches;

use criteo_ingest::error::IngestError;
use criteo_ingest::tokens::{
    check_output, distinct_tokens, file_tokens, resolve_inputs, write_tokens,
};

fn row(tokens: &[&str]) -> String {
    let mut fields = vec!["1".to_string()];
    fields.extend((1..=13).map(|i| i.to_string()));
    fields.extend((0..26).map(|i| tokens.get(i).copied().unwrap_or("").to_string()));
    fields.join("\t") + "\n"
}

fn write_shard(path: &Path, rows: &[&[&str]]) {
    let content: String = rows.iter().map(|tokens| row(tokens)).collect();
    fs::write(path, content).unwrap();
}

#[test]
fn single_file_distinct_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("day_0.tsv");
    write_shard(&path, &[&["a", "x"], &["a", "y"], &["b", "x"]]);

    let tokens = file_tokens(&path).unwrap();
    let s1: Vec<_> = tokens.column(1).unwrap().iter().cloned().collect();
    assert_eq!(s1, ["a", "b"]);
    let s2: Vec<_> = tokens.column(2).unwrap().iter().cloned().collect();
    assert_eq!(s2, ["x", "y"]);
    // Empty fields count as one token per column.
    assert_eq!(tokens.column(26).unwrap().len(), 1);
}

#[test]
fn every_shard_is_folded_into_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let shards = ["day_0.tsv", "day_1.tsv", "day_2.tsv", "day_3.tsv"];
    for (i, name) in shards.iter().enumerate() {
        let token = format!("t{i}");
        write_shard(&dir.path().join(name), &[&[token.as_str(), "shared"]]);
    }

    let pattern = format!("{}/day_*.tsv", dir.path().display());
    let inputs = resolve_inputs(&pattern).unwrap();
    assert_eq!(inputs.len(), 4);

    let merged = distinct_tokens(&inputs, 3).unwrap();
    let s1: Vec<_> = merged.column(1).unwrap().iter().cloned().collect();
    assert_eq!(s1, ["t0", "t1", "t2", "t3"]);
    assert_eq!(merged.column(2).unwrap().len(), 1);

    let outfile = dir.path().join("tokens.json");
    check_output(&outfile).unwrap();
    write_tokens(&outfile, &merged).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&fs::read(&outfile).unwrap()).unwrap();
    assert_eq!(json["s1"].as_array().unwrap().len(), 4);
    assert_matches!(check_output(&outfile), Err(IngestError::Tokens(_)));
}

#[test]
fn unmatched_glob_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = format!("{}/*.tsv", dir.path().display());
    assert_matches!(resolve_inputs(&pattern), Err(IngestError::Tokens(_)));
}

#[test]
fn short_rows_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.tsv");
    fs::write(&path, "1\t2\t3\n").unwrap();
    assert_matches!(file_tokens(&path), Err(IngestError::Tokens(_)));
}
