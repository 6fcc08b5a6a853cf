pub mod app;
pub mod archive;
pub mod config;
pub mod convert;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod output;
pub mod progress;
pub mod storage;
pub mod tokens;
pub mod upload;
pub mod workspace;
