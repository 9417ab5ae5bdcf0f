//! find_runs lists the completed runs of one instrument family found below a
//! directory, one run folder per line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{value_t, App, Arg};
use env_logger::Env;
use rayon::ThreadPoolBuilder;

use common::sequencer::{find_sequencer_runs, SequencerType};

/// Parses command line arguments and prints the runs found
fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new("find_runs")
        .version(clap::crate_version!())
        .arg(Arg::with_name("root")
            .long("root")
            .help("directory to search for run folders")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("sequencer-type")
            .long("sequencer-type")
            .help("instrument family, e.g. miseq or novaseq")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("completion-indicator")
            .long("completion-indicator")
            .help("file an instrument writes when a run is finished")
            .default_value("RTAComplete.txt")
            .takes_value(true))
        .arg(Arg::with_name("any-state")
            .long("any-state")
            .help("list valid runs whether or not they are finished"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .help("number of threads used to validate run folders")
            .default_value("4")
            .takes_value(true))
        .get_matches();

    let root = value_t!(matches, "root", PathBuf).unwrap_or_else(|e| e.exit());
    let sequencer_type = value_t!(matches, "sequencer-type", SequencerType).unwrap_or_else(|e| e.exit());
    let threads = value_t!(matches, "threads", usize).unwrap_or_else(|e| e.exit());

    let completion_indicator = if matches.is_present("any-state") {
        None
    } else {
        matches.value_of("completion-indicator")
    };

    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Error configuring global threadpool")?;

    let runs = find_sequencer_runs(&root, sequencer_type, completion_indicator)
        .with_context(|| format!("Error searching {} for runs", root.display()))?;

    for run in runs {
        println!("{}", run.display());
    }

    Ok(())
}
