//! parse_run prints what the descriptor files of a run folder say about the
//! run, as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{value_t, App, Arg};
use env_logger::Env;

use common::parser::{parse_directory, parse_sequencer_run};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new("parse_run")
        .version(clap::crate_version!())
        .arg(Arg::with_name("run-path")
            .long("run-path")
            .help("specify path to the sequencing run folder")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("descriptors")
            .long("descriptors")
            .help("print each descriptor file separately instead of the combined run metadata"))
        .get_matches();

    let run_path = value_t!(matches, "run-path", PathBuf).unwrap_or_else(|e| e.exit());
    if !run_path.is_dir() {
        bail!("Could not find run path {}", run_path.display());
    }

    let json = if matches.is_present("descriptors") {
        let parsed = parse_directory(&run_path)
            .with_context(|| format!("Error reading run {}", run_path.display()))?;
        serde_json::to_string_pretty(&parsed)?
    } else {
        let metadata = parse_sequencer_run(&run_path)
            .with_context(|| format!("Error reading run {}", run_path.display()))?;
        serde_json::to_string_pretty(&metadata)?
    };

    println!("{}", json);
    Ok(())
}
