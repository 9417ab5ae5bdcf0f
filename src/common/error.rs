//! Errors raised while discovering, parsing and stashing sequencer runs.

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("couldn't read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("search root {} does not exist", .0.display())]
    RootNotFound(PathBuf),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error("invalid name pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Error parsing {}: {source}", path.display())]
    Xml {
        path: PathBuf,
        source: serde_xml_rs::Error,
    },

    #[error("Error reading {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("malformed sample sheet {} at line {line}: {message}", path.display())]
    SampleSheet {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("no descriptor parser for {0}")]
    UnsupportedDescriptor(String),

    #[error("unknown sequencer type {0}")]
    UnknownSequencerType(String),

    #[error("no run id could be read from {}", .0.display())]
    MissingRunId(PathBuf),

    #[error("collection {0} does not exist")]
    CollectionNotFound(String),

    #[error("collection {0} already exists")]
    CollectionExists(String),

    #[error("invalid collection path {path}: {reason}")]
    InvalidCollectionPath { path: String, reason: String },

    #[error("corrupt catalog {}: {source}", path.display())]
    Catalog {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
