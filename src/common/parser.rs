//! Shared interface of the run descriptor parsers, dispatch by file name,
//! and assembly of everything known about one run directory.

use std::{collections::BTreeMap, fs, path::Path};

use log::{debug, info};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    run_info_parser::RunInfo,
    run_parameters_parser::RunParameters,
    sample_sheet::SampleSheet,
    sequencer::SequencerType,
};

/// A descriptor file found in a run folder
pub trait Descriptor: Sized {
    /// Name the instrument gives the file
    const FILE_NAME: &'static str;

    /// Read and deserialize the file. Fails on I/O errors and on input that
    /// isn't well-formed.
    fn parse(path: &Path) -> Result<Self>;

    /// Whether the parsed contents carry the fields ingestion depends on
    fn validate(&self) -> bool;

    /// `parse` followed by `validate`; invalid contents give `None`
    fn get(path: &Path) -> Result<Option<Self>> {
        let descriptor = Self::parse(path)?;
        if descriptor.validate() {
            Ok(Some(descriptor))
        } else {
            debug!("{} parsed but is not valid", path.display());
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    RunInfo,
    RunParameters,
    SampleSheet,
}

impl DescriptorKind {
    pub fn file_name(self) -> &'static str {
        match self {
            DescriptorKind::RunInfo => RunInfo::FILE_NAME,
            DescriptorKind::RunParameters => RunParameters::FILE_NAME,
            DescriptorKind::SampleSheet => SampleSheet::FILE_NAME,
        }
    }

    /// Pick the parser for a file name, ignoring case
    pub fn from_file_name(name: &str) -> Result<Self> {
        [
            DescriptorKind::RunInfo,
            DescriptorKind::RunParameters,
            DescriptorKind::SampleSheet,
        ]
        .iter()
        .copied()
        .find(|kind| kind.file_name().eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::UnsupportedDescriptor(name.to_owned()))
    }
}

/// Result of `parse_file`; `None` when the file parsed but was not valid
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedDescriptor {
    RunInfo(Option<RunInfo>),
    RunParameters(Option<RunParameters>),
    SampleSheet(Option<SampleSheet>),
}

/// Parse one descriptor, choosing the parser from the file name
pub fn parse_file(path: &Path) -> Result<ParsedDescriptor> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let parsed = match DescriptorKind::from_file_name(&name)? {
        DescriptorKind::RunInfo => ParsedDescriptor::RunInfo(RunInfo::get(path)?),
        DescriptorKind::RunParameters => {
            ParsedDescriptor::RunParameters(RunParameters::get(path)?)
        }
        DescriptorKind::SampleSheet => ParsedDescriptor::SampleSheet(SampleSheet::get(path)?),
    };
    Ok(parsed)
}

/// Parse every supported descriptor directly inside `dir`, keyed by file name
pub fn parse_directory(dir: &Path) -> Result<BTreeMap<String, ParsedDescriptor>> {
    let mut parsed = BTreeMap::new();

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        if DescriptorKind::from_file_name(&name).is_err() {
            continue;
        }
        parsed.insert(name, parse_file(&path)?);
    }

    Ok(parsed)
}

/// Everything the descriptors of one run directory say about it
#[derive(Debug, PartialEq, Serialize)]
pub struct SequencerRunMetadata {
    pub run_info: Option<RunInfo>,
    pub run_parameters: Option<RunParameters>,
    pub sample_sheet: Option<SampleSheet>,
    pub sequencer_type: SequencerType,
    pub projects: Vec<String>,
}

impl SequencerRunMetadata {
    /// The run id from RunInfo.xml, or RunParameters.xml if that's all there is
    pub fn run_id(&self) -> Option<&str> {
        self.run_info
            .as_ref()
            .map(|r| r.run_id.as_str())
            .or_else(|| self.run_parameters.as_ref().map(|p| p.run_id.as_str()))
            .filter(|id| !id.is_empty())
    }
}

fn load<D: Descriptor>(run_dir: &Path) -> Result<Option<D>> {
    let path = run_dir.join(D::FILE_NAME);
    if !path.is_file() {
        debug!("no {} in {}", D::FILE_NAME, run_dir.display());
        return Ok(None);
    }
    D::get(&path)
}

/// Parse the descriptors of a run. Missing or invalid files leave their
/// section empty; a malformed file fails the whole run.
pub fn parse_sequencer_run(run_dir: &Path) -> Result<SequencerRunMetadata> {
    info!("parsing run {}", run_dir.display());

    let run_info: Option<RunInfo> = load(run_dir)?;
    let run_parameters: Option<RunParameters> = load(run_dir)?;
    let sample_sheet: Option<SampleSheet> = load(run_dir)?;

    let sequencer_type = run_info
        .as_ref()
        .map_or(SequencerType::Unknown, RunInfo::sequencer_type);
    let projects = sample_sheet
        .as_ref()
        .map(SampleSheet::projects)
        .unwrap_or_default();

    Ok(SequencerRunMetadata {
        run_info,
        run_parameters,
        sample_sheet,
        sequencer_type,
        projects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const MISEQ_RUN: &str = "test_data/runs/220101_M00001_0001_000000000-A1B2C";
    const NOVASEQ_RUN: &str = "test_data/runs/novaseq/230315_A00111_0042_AHJCWWDSXX";

    #[test]
    fn file_names() {
        assert_eq!(
            DescriptorKind::from_file_name("runinfo.xml").unwrap(),
            DescriptorKind::RunInfo
        );
        assert_eq!(
            DescriptorKind::from_file_name("RUNPARAMETERS.XML").unwrap(),
            DescriptorKind::RunParameters
        );
        assert_eq!(
            DescriptorKind::from_file_name("SampleSheet.csv").unwrap(),
            DescriptorKind::SampleSheet
        );
    }

    #[test]
    #[should_panic(expected = "UnsupportedDescriptor")]
    fn unsupported_file() {
        parse_file(Path::new("test_data/empty_file")).unwrap();
    }

    #[test]
    #[should_panic(expected = "No such file or directory")]
    fn missing_file() {
        parse_file(Path::new("test_data/runs/RunInfo.xml")).unwrap();
    }

    #[test]
    fn parse_single_files() {
        let run = Path::new(MISEQ_RUN);
        match parse_file(&run.join("RunInfo.xml")).unwrap() {
            ParsedDescriptor::RunInfo(Some(info)) => assert_eq!(info.instrument, "M00001"),
            other => panic!("unexpected {:?}", other),
        }
        match parse_file(&run.join("SampleSheet.csv")).unwrap() {
            ParsedDescriptor::SampleSheet(Some(sheet)) => assert_eq!(sheet.version(), 1),
            other => panic!("unexpected {:?}", other),
        }

        let invalid = parse_file(Path::new("test_data/run_info/incomplete_RunInfo.xml"));
        // the name doesn't match any descriptor
        assert!(invalid.is_err());
    }

    #[test]
    fn directory() {
        let parsed = parse_directory(Path::new(MISEQ_RUN)).unwrap();
        let names: Vec<_> = parsed.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["RunInfo.xml", "RunParameters.xml", "SampleSheet.csv"]);
        assert!(matches!(
            parsed["RunParameters.xml"],
            ParsedDescriptor::RunParameters(Some(_))
        ));
    }

    #[test]
    fn miseq_run() {
        let metadata = parse_sequencer_run(Path::new(MISEQ_RUN)).unwrap();
        assert_eq!(metadata.sequencer_type, SequencerType::MiSeq);
        assert_eq!(metadata.projects, vec!["Project1"]);
        assert_eq!(metadata.run_id(), Some("220101_M00001_0001_000000000-A1B2C"));
        assert_eq!(
            metadata.run_parameters.as_ref().unwrap().instrument_type,
            "MiSeq"
        );
    }

    #[test]
    fn novaseq_run() {
        let metadata = parse_sequencer_run(Path::new(NOVASEQ_RUN)).unwrap();
        assert_eq!(metadata.sequencer_type, SequencerType::NovaSeq);
        assert_eq!(metadata.projects, vec!["Project1", "Project2"]);
        assert_eq!(metadata.sample_sheet.as_ref().unwrap().version(), 2);

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["sequencer_type"], "novaseq");
        assert_eq!(json["run_parameters"]["platform"]["platform"], "novaseq");
        assert_eq!(json["sample_sheet"]["version"], 2);
    }

    #[test]
    #[should_panic(expected = "Xml")]
    fn malformed_run() {
        parse_sequencer_run(Path::new("test_data/runs/220103_M00001_0003_000000000-A1B2E"))
            .unwrap();
    }

    #[test]
    fn missing_and_invalid_sections() {
        let dir = tempdir().unwrap();
        fs::copy(
            "test_data/run_info/miseq_RunInfo.xml",
            dir.path().join("RunInfo.xml"),
        )
        .unwrap();
        fs::copy(
            "test_data/sample_sheets/no_samples_SampleSheet.csv",
            dir.path().join("SampleSheet.csv"),
        )
        .unwrap();

        let metadata = parse_sequencer_run(dir.path()).unwrap();
        assert!(metadata.run_info.is_some());
        assert!(metadata.run_parameters.is_none());
        assert!(metadata.sample_sheet.is_none());
        assert!(metadata.projects.is_empty());
        assert_eq!(metadata.sequencer_type, SequencerType::MiSeq);
    }

    #[test]
    fn empty_directory() {
        let dir = tempdir().unwrap();
        let metadata = parse_sequencer_run(dir.path()).unwrap();
        assert_eq!(metadata.sequencer_type, SequencerType::Unknown);
        assert_eq!(metadata.run_id(), None);
        assert!(parse_directory(dir.path()).unwrap().is_empty());
    }
}
