//! Deserializes the `RunInfo.xml` file written by an Illumina instrument into
//! a struct describing the run, its reads and its flowcell.

use std::{fs::File, path::Path};

use serde::{de, Deserialize, Serialize};
use serde_xml_rs::from_reader;

use crate::{
    error::{Error, Result},
    parser::Descriptor,
    sequencer::SequencerType,
};

/// The top-level struct for the contents of RunInfo.xml
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    /// Version number of this file (depends on the sequencer)
    pub version: u32,
    /// Full run id string (date, instrument, number, flowcell)
    pub run_id: String,
    /// Number representing how many runs this instrument has performed
    pub run_number: u64,
    /// Flowcell serial number
    pub flowcell: String,
    /// Instrument serial number/identifier
    pub instrument: String,
    /// The date (and sometimes time) of the run, as written by the instrument
    pub date: String,
    /// Format of the run: number of reads, read lengths, and which are indexes
    pub reads: Vec<Read>,
    /// Flowcell information: number of lanes, surfaces, swaths and tiles
    pub flowcell_layout: FlowcellLayout,
}

/// Deserialize RunInfo, including flattening the inner Run struct
/// into the top level
impl<'de> Deserialize<'de> for RunInfo {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Outer {
            #[serde(rename = "Version", default)]
            version: u32,
            #[serde(rename = "Run", default)]
            run: Inner,
        }

        #[derive(Deserialize, Default)]
        struct Inner {
            #[serde(rename = "Id", default)]
            id: String,
            #[serde(rename = "Number", default)]
            number: u64,
            #[serde(rename = "Flowcell", default)]
            flowcell: String,
            #[serde(rename = "Instrument", default)]
            instrument: String,
            #[serde(rename = "Date", default)]
            date: String,
            #[serde(rename = "Reads", default, deserialize_with = "reads_to_vec")]
            reads: Vec<Read>,
            #[serde(rename = "FlowcellLayout", default)]
            flowcell_layout: FlowcellLayout,
        }

        #[derive(Deserialize)]
        struct Reads {
            #[serde(rename = "Read", default)]
            read: Vec<Read>,
        }

        fn reads_to_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<Read>, D::Error>
        where
            D: de::Deserializer<'de>,
        {
            Ok(Reads::deserialize(deserializer)?.read)
        }

        let helper = Outer::deserialize(deserializer)?;

        Ok(RunInfo {
            version: helper.version,
            run_id: helper.run.id,
            run_number: helper.run.number,
            flowcell: helper.run.flowcell,
            instrument: helper.run.instrument,
            date: helper.run.date,
            reads: helper.run.reads,
            flowcell_layout: helper.run.flowcell_layout,
        })
    }
}

/// Information about one of the reads in a run
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct Read {
    /// Which read this is
    #[serde(rename(deserialize = "Number"))]
    pub number: u32,
    /// How many cycles (e.g. bases) in the read
    #[serde(rename(deserialize = "NumCycles"))]
    pub num_cycles: u32,
    /// Whether or not it is an index read
    #[serde(rename(deserialize = "IsIndexedRead"), deserialize_with = "bool_from_string")]
    pub is_indexed_read: bool,
}

/// Convert from Y or N character to a boolean
fn bool_from_string<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: de::Deserializer<'de>,
{
    match String::deserialize(deserializer)?.as_ref() {
        "Y" => Ok(true),
        "N" => Ok(false),
        other => Err(de::Error::invalid_value(
            de::Unexpected::Str(other),
            &"Y or N",
        )),
    }
}

/// Information about the flowcell used in the run
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FlowcellLayout {
    /// Number of lanes
    #[serde(rename(deserialize = "LaneCount"), default)]
    pub lane_count: u32,
    /// Number of surfaces per lane
    #[serde(rename(deserialize = "SurfaceCount"), default)]
    pub surface_count: u32,
    /// Swathes per surface
    #[serde(rename(deserialize = "SwathCount"), default)]
    pub swath_count: u32,
    /// Number of tiles per swath
    #[serde(rename(deserialize = "TileCount"), default)]
    pub tile_count: u32,
}

impl RunInfo {
    /// Family of the instrument that wrote this run
    pub fn sequencer_type(&self) -> SequencerType {
        SequencerType::from_instrument(&self.instrument)
    }

    /// Sum of the cycles over every read, index reads included
    pub fn total_cycles(&self) -> u32 {
        self.reads.iter().map(|r| r.num_cycles).sum()
    }

    pub fn index_reads(&self) -> Vec<&Read> {
        self.reads.iter().filter(|r| r.is_indexed_read).collect()
    }
}

impl Descriptor for RunInfo {
    const FILE_NAME: &'static str = "RunInfo.xml";

    fn parse(path: &Path) -> Result<Self> {
        let run_xml = File::open(path).map_err(|e| Error::io(path, e))?;

        from_reader(run_xml).map_err(|source| Error::Xml {
            path: path.to_owned(),
            source,
        })
    }

    /// A run is only usable if it can be named: id, flowcell and instrument
    fn validate(&self) -> bool {
        !self.run_id.is_empty() && !self.flowcell.is_empty() && !self.instrument.is_empty()
    }
}
