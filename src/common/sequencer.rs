//! Instrument families, how to recognise a finished run folder for each of
//! them, and where a run is stored once ingested.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    find::{FileFinder, FileType},
    parser::Descriptor,
    run_info_parser::RunInfo,
};

/// Instrument family that produced a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencerType {
    MiSeq,
    MiniSeq,
    NextSeq,
    NextSeq2k,
    NovaSeq,
    NovaSeqXPlus,
    HiSeq,
    ISeq,
    PacBio,
    Nanopore,
    Unknown,
}

use SequencerType::*;

/// Instrument id prefixes, checked in order. Longer prefixes come before
/// the single letters they start with.
const INSTRUMENT_PREFIXES: &[(&str, SequencerType)] = &[
    ("NDX", NextSeq2k),
    ("NS", NextSeq),
    ("MN", MiniSeq),
    ("M", MiSeq),
    ("LH", NovaSeqXPlus),
    ("A", NovaSeq),
    ("FSQ", ISeq),
    ("D", HiSeq),
];

impl SequencerType {
    /// Every family a run can be ingested as
    pub const ALL: [SequencerType; 10] = [
        MiSeq,
        MiniSeq,
        NextSeq,
        NextSeq2k,
        NovaSeq,
        NovaSeqXPlus,
        HiSeq,
        ISeq,
        PacBio,
        Nanopore,
    ];

    /// Infer the family from an instrument id such as `M00001` or `A00111`
    pub fn from_instrument(instrument: &str) -> SequencerType {
        INSTRUMENT_PREFIXES
            .iter()
            .find(|(prefix, _)| instrument.starts_with(prefix))
            .map_or(Unknown, |&(_, sequencer_type)| sequencer_type)
    }

    pub fn tag(self) -> &'static str {
        match self {
            MiSeq => "miseq",
            MiniSeq => "miniseq",
            NextSeq => "nextseq",
            NextSeq2k => "nextseq2k",
            NovaSeq => "novaseq",
            NovaSeqXPlus => "novaseqxplus",
            HiSeq => "hiseq",
            ISeq => "iseq",
            PacBio => "pacbio",
            Nanopore => "nanopore",
            Unknown => "unknown",
        }
    }

    /// Families identified by their instrument id in RunInfo.xml
    pub fn is_illumina(self) -> bool {
        !matches!(self, PacBio | Nanopore | Unknown)
    }

    /// Descriptor files a run folder must contain
    pub fn required_files(self) -> &'static [&'static str] {
        match self {
            PacBio => &["metadata.xml", "subreadset.xml"],
            Nanopore => &["final_summary.txt"],
            Unknown => &[],
            _ => &["RunInfo.xml", "RunParameters.xml", "SampleSheet.csv"],
        }
    }
}

impl fmt::Display for SequencerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SequencerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_lowercase();
        SequencerType::ALL
            .iter()
            .copied()
            .find(|t| t.tag() == tag)
            .ok_or_else(|| Error::UnknownSequencerType(s.to_owned()))
    }
}

/// True when `dir` holds every descriptor `sequencer_type` needs and, for
/// Illumina families, its RunInfo.xml names an instrument of that family.
/// Unreadable descriptors make the folder invalid rather than failing.
pub fn validate_run_dir(dir: &Path, sequencer_type: SequencerType) -> bool {
    let required = sequencer_type.required_files();
    if required.is_empty() || !required.iter().all(|f| dir.join(f).is_file()) {
        return false;
    }

    if !sequencer_type.is_illumina() {
        return true;
    }

    match RunInfo::parse(&dir.join(RunInfo::FILE_NAME)) {
        Ok(run_info) => run_info.sequencer_type() == sequencer_type,
        Err(e) => {
            debug!("{} is not a valid run: {}", dir.display(), e);
            false
        }
    }
}

/// Find completed runs of one family anywhere below `root`. A directory is
/// a run when it contains `completion_indicator` (if given) and passes
/// `validate_run_dir`. Results are in walk order.
pub fn find_sequencer_runs(
    root: &Path,
    sequencer_type: SequencerType,
    completion_indicator: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let mut finder = FileFinder::new(root).file_type(FileType::Dir);
    if let Some(indicator) = completion_indicator {
        let indicator = indicator.to_owned();
        finder = finder.filter(move |dir| dir.join(&indicator).is_file());
    }

    let candidates: Vec<PathBuf> = finder.find()?.collect();
    debug!(
        "{} candidate directories under {}",
        candidates.len(),
        root.display()
    );

    let runs: Vec<PathBuf> = candidates
        .into_par_iter()
        .filter(|dir| validate_run_dir(dir, sequencer_type))
        .collect();

    info!(
        "found {} {} runs under {}",
        runs.len(),
        sequencer_type,
        root.display()
    );
    Ok(runs)
}

/// Grid collection for a run: `<root>/<type>/<date>_<instrument>_<number>_<flowcell>`
/// Anything past the third underscore is kept as part of the flowcell.
pub fn destination_path(
    collection_root: &str,
    sequencer_type: SequencerType,
    run_id: &str,
) -> String {
    let mut parts = run_id.splitn(4, '_');
    let mut next = || parts.next().unwrap_or("");
    let (date, instrument, number, flowcell) = (next(), next(), next(), next());

    format!(
        "{}/{}/{}_{}_{}_{}",
        collection_root.trim_end_matches('/'),
        sequencer_type,
        date,
        instrument,
        number,
        flowcell,
    )
}
