//! Settings shared by the command line tools, read from a TOML file.
//!
//! ```toml
//! [sequencer]
//! base_dir = "/mnt/sequencers"
//! completion_indicator = "RTAComplete.txt"
//!
//! [grid]
//! vault = "/data/vault"
//! collection_root = "/sequencing"
//! ```

use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub sequencer: SequencerConfig,
    pub grid: GridConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequencerConfig {
    /// Directory scanned for runs when none is given on the command line
    pub base_dir: Option<PathBuf>,
    /// File an instrument writes once a run is finished
    pub completion_indicator: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        SequencerConfig {
            base_dir: None,
            completion_indicator: "RTAComplete.txt".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Local directory backing the grid
    pub vault: PathBuf,
    /// Logical path runs are stored under
    pub collection_root: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            vault: PathBuf::from("./vault"),
            collection_root: "/sequencing".to_owned(),
        }
    }
}

impl IngestConfig {
    pub fn from_path(path: &Path) -> Result<IngestConfig> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        toml::from_str(&text).map_err(|source| Error::Config {
            path: path.to_owned(),
            source,
        })
    }
}
