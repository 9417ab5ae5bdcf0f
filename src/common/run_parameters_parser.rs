//! Deserializes `RunParameters.xml`. Each instrument generation names its
//! elements a little differently, so the raw document is read permissively
//! and then normalized into one `RunParameters` struct.

use std::{fs::File, path::Path};

use serde::{de, Deserialize, Serialize};
use serde_xml_rs::from_reader;

use crate::{
    error::{Error, Result},
    parser::Descriptor,
};

/// Normalized contents of RunParameters.xml
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunParameters {
    /// Instrument family as the instrument names it, e.g. `MiSeq` or `NovaSeq`
    pub instrument_type: String,
    pub run_id: String,
    pub experiment_name: Option<String>,
    pub kit_number: Option<String>,
    /// Serial number of the scanner (`ScannerID` or `InstrumentID`)
    pub scanner_id: Option<String>,
    pub rta_version: Option<String>,
    pub application_name: Option<String>,
    pub application_version: Option<String>,
    /// Cycle counts are kept as written; an absent count is an empty string
    pub read1_cycles: String,
    pub read2_cycles: String,
    pub index1_cycles: String,
    pub index2_cycles: String,
    /// Fields only some instrument families write
    pub platform: PlatformParameters,
}

/// Instrument-family specific parameters
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformParameters {
    NovaSeqXPlus,
    NovaSeq {
        workflow_type: Option<String>,
        chemistry_version: Option<String>,
        run_setup_mode: Option<String>,
        flow_cell_mode: Option<String>,
    },
    NextSeq {
        chemistry: Option<String>,
        chemistry_version: Option<String>,
    },
    MiSeq {
        chemistry: Option<String>,
    },
    ISeq,
    Other {
        chemistry: Option<String>,
    },
}

impl Default for PlatformParameters {
    fn default() -> Self {
        PlatformParameters::Other { chemistry: None }
    }
}

impl<'de> Deserialize<'de> for RunParameters {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Raw {
            #[serde(rename = "InstrumentType")]
            instrument_type: Option<String>,
            #[serde(rename = "RunParametersVersion")]
            run_parameters_version: Option<String>,
            #[serde(rename = "RunId", alias = "RunID")]
            run_id: Option<String>,
            #[serde(rename = "ExperimentName")]
            experiment_name: Option<String>,
            #[serde(rename = "SequencingKitNumber")]
            kit_number: Option<String>,
            #[serde(rename = "ScannerID", alias = "InstrumentID", alias = "InstrumentId")]
            scanner_id: Option<String>,
            #[serde(rename = "RTAVersion", alias = "RtaVersion")]
            rta_version: Option<String>,
            #[serde(rename = "Read1NumberOfCycles")]
            read1_cycles: Option<String>,
            #[serde(rename = "Read2NumberOfCycles")]
            read2_cycles: Option<String>,
            #[serde(rename = "IndexRead1NumberOfCycles")]
            index1_cycles: Option<String>,
            #[serde(rename = "IndexRead2NumberOfCycles")]
            index2_cycles: Option<String>,
            #[serde(rename = "Chemistry")]
            chemistry: Option<String>,
            #[serde(rename = "ChemistryVersion")]
            chemistry_version: Option<String>,
            #[serde(rename = "WorkflowType")]
            workflow_type: Option<String>,
            #[serde(rename = "RunSetupMode")]
            run_setup_mode: Option<String>,
            #[serde(rename = "FlowCellMode")]
            flow_cell_mode: Option<String>,
            #[serde(rename = "Setup")]
            setup: Option<Setup>,
        }

        /// Older instruments nest the run setup one level down
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Setup {
            #[serde(rename = "ApplicationName")]
            application_name: Option<String>,
            #[serde(rename = "ApplicationVersion")]
            application_version: Option<String>,
            #[serde(rename = "ExperimentName")]
            experiment_name: Option<String>,
            #[serde(rename = "Read1")]
            read1: Option<String>,
            #[serde(rename = "Read2")]
            read2: Option<String>,
            #[serde(rename = "Index1Read")]
            index1: Option<String>,
            #[serde(rename = "Index2Read")]
            index2: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let setup = raw.setup.unwrap_or_default();

        let instrument_type = raw
            .instrument_type
            .or_else(|| {
                raw.run_parameters_version
                    .as_deref()
                    .and_then(|v| v.split('_').next())
                    .map(str::to_owned)
            })
            .or_else(|| {
                setup
                    .application_name
                    .as_deref()
                    .and_then(|name| name.split_whitespace().next())
                    .map(str::to_owned)
            })
            .unwrap_or_default();

        let platform = match instrument_type.to_lowercase().as_str() {
            "novaseqxplus" => PlatformParameters::NovaSeqXPlus,
            "novaseq" => PlatformParameters::NovaSeq {
                workflow_type: raw.workflow_type,
                chemistry_version: raw.chemistry_version,
                run_setup_mode: raw.run_setup_mode,
                flow_cell_mode: raw.flow_cell_mode,
            },
            "nextseq" => PlatformParameters::NextSeq {
                chemistry: raw.chemistry,
                chemistry_version: raw.chemistry_version,
            },
            "miseq" => PlatformParameters::MiSeq {
                chemistry: raw.chemistry,
            },
            "iseq" => PlatformParameters::ISeq,
            _ => PlatformParameters::Other {
                chemistry: raw.chemistry,
            },
        };

        Ok(RunParameters {
            instrument_type,
            run_id: raw.run_id.unwrap_or_default(),
            experiment_name: raw.experiment_name.or(setup.experiment_name),
            kit_number: raw.kit_number,
            scanner_id: raw.scanner_id,
            rta_version: raw.rta_version,
            application_name: setup.application_name,
            application_version: setup.application_version,
            read1_cycles: raw.read1_cycles.or(setup.read1).unwrap_or_default(),
            read2_cycles: raw.read2_cycles.or(setup.read2).unwrap_or_default(),
            index1_cycles: raw.index1_cycles.or(setup.index1).unwrap_or_default(),
            index2_cycles: raw.index2_cycles.or(setup.index2).unwrap_or_default(),
            platform,
        })
    }
}

impl Descriptor for RunParameters {
    const FILE_NAME: &'static str = "RunParameters.xml";

    fn parse(path: &Path) -> Result<Self> {
        let params_xml = File::open(path).map_err(|e| Error::io(path, e))?;

        from_reader(params_xml).map_err(|source| Error::Xml {
            path: path.to_owned(),
            source,
        })
    }

    fn validate(&self) -> bool {
        !self.instrument_type.is_empty() && !self.run_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_miseq() {
        let path = Path::new("test_data/run_parameters/miseq_RunParameters.xml");
        let actual = RunParameters::parse(path).unwrap();
        let expected = RunParameters {
            instrument_type: "MiSeq".to_owned(),
            run_id: "220101_M00001_0001_000000000-A1B2C".to_owned(),
            experiment_name: Some("Test Run".to_owned()),
            kit_number: None,
            scanner_id: Some("M00001".to_owned()),
            rta_version: Some("2.4.0.3".to_owned()),
            application_name: Some("MiSeq Control Software".to_owned()),
            application_version: Some("4.0.0.1769".to_owned()),
            read1_cycles: "151".to_owned(),
            read2_cycles: "151".to_owned(),
            index1_cycles: "8".to_owned(),
            index2_cycles: "8".to_owned(),
            platform: PlatformParameters::MiSeq {
                chemistry: Some("Amplicon".to_owned()),
            },
        };
        assert_eq!(actual, expected);
        assert!(actual.validate());
    }

    #[test]
    fn parse_nextseq() {
        let path = Path::new("test_data/run_parameters/nextseq_RunParameters.xml");
        let params = RunParameters::get(path).unwrap().unwrap();
        assert_eq!(params.instrument_type, "NextSeq");
        assert_eq!(params.run_id, "220102_NS00001_0001_AHGV7DRXX");
        assert_eq!(params.scanner_id.as_deref(), Some("NS00001"));
        assert_eq!(params.rta_version.as_deref(), Some("2.11.3"));
        assert_eq!(params.experiment_name.as_deref(), Some("NextSeq Test Run"));
        assert_eq!(
            params.platform,
            PlatformParameters::NextSeq {
                chemistry: Some("NextSeq High".to_owned()),
                chemistry_version: None,
            }
        );
        // no cycle counts anywhere in the file
        assert_eq!(params.read1_cycles, "");
        assert_eq!(params.index2_cycles, "");
    }

    #[test]
    fn parse_novaseq() {
        let path = Path::new("test_data/run_parameters/novaseq_RunParameters.xml");
        let params = RunParameters::get(path).unwrap().unwrap();
        assert_eq!(params.instrument_type, "NovaSeq");
        assert_eq!(params.run_id, "230315_A00111_0042_AHJCWWDSXX");
        assert_eq!(params.scanner_id.as_deref(), Some("A00111"));
        assert_eq!(params.rta_version.as_deref(), Some("v3.4.4"));
        assert_eq!(params.kit_number.as_deref(), Some("20028312"));
        assert_eq!(params.read1_cycles, "101");
        assert_eq!(params.index1_cycles, "10");
        assert_eq!(
            params.platform,
            PlatformParameters::NovaSeq {
                workflow_type: Some("NovaSeqXp".to_owned()),
                chemistry_version: Some("1.5".to_owned()),
                run_setup_mode: Some("SequencingRun".to_owned()),
                flow_cell_mode: Some("SP".to_owned()),
            }
        );
    }

    #[test]
    fn missing_run_id_is_invalid() {
        let path = Path::new("test_data/run_parameters/no_run_id_RunParameters.xml");
        let params = RunParameters::parse(path).unwrap();
        assert_eq!(params.instrument_type, "MiSeq");
        assert!(!params.validate());
        assert!(RunParameters::get(path).unwrap().is_none());
    }

    #[test]
    #[should_panic(expected = r#"Xml { path: "test_data/run_parameters/malformed_RunParameters.xml""#)]
    fn malformed_file() {
        let path = Path::new("test_data/run_parameters/malformed_RunParameters.xml");
        RunParameters::parse(path).unwrap();
    }

    #[test]
    #[should_panic(expected = r#"No such file or directory"#)]
    fn no_file() {
        RunParameters::parse(Path::new("test_data/no_RunParameters.xml")).unwrap();
    }
}
