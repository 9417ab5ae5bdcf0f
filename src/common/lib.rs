pub mod config;
pub mod error;
pub mod find;
pub mod grid;
pub mod ingest;
pub mod parser;
pub mod run_info_parser;
pub mod run_parameters_parser;
pub mod sample_sheet;
pub mod sequencer;

pub use error::{Error, Result};
pub use parser::{parse_sequencer_run, Descriptor, SequencerRunMetadata};
pub use sequencer::SequencerType;
