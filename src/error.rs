use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to read 7z archive: {0}")]
    SevenZ(String),
    #[error("entry not found in archive: {0}")]
    EntryNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<sevenz_rust::Error> for ArchiveError {
    fn from(error: sevenz_rust::Error) -> Self {
        ArchiveError::SevenZ(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog is offline")]
    Offline,
    #[error("catalog request failed: {0}")]
    Http(String),
    #[error("catalog response could not be decoded: {0}")]
    Decode(String),
    #[error("catalog cache error: {0}")]
    Cache(#[from] io::Error),
}

impl From<ureq::Error> for CatalogError {
    fn from(error: ureq::Error) -> Self {
        CatalogError::Http(error.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(error: serde_json::Error) -> Self {
        CatalogError::Decode(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an {0} is already running for this session")]
    Busy(&'static str),
    #[error("failed to start worker: {0}")]
    Spawn(#[from] io::Error),
}
