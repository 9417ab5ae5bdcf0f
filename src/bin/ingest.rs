//! ingest finds completed runs and stores them, tagged with their metadata,
//! in a data grid vault. Prints one report per run as JSON and exits with an
//! error if any run failed.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{value_t, values_t, App, Arg};
use env_logger::Env;
use log::info;
use rayon::ThreadPoolBuilder;

use common::{
    config::IngestConfig,
    grid::LocalGrid,
    ingest::Ingestor,
    sequencer::SequencerType,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new("ingest")
        .version(clap::crate_version!())
        .arg(Arg::with_name("config")
            .long("config")
            .help("TOML file with [sequencer] and [grid] settings")
            .takes_value(true))
        .arg(Arg::with_name("root")
            .long("root")
            .help("directory to search for run folders (overrides sequencer.base_dir)")
            .takes_value(true))
        .arg(Arg::with_name("sequencer-type")
            .long("sequencer-type")
            .help("instrument family to ingest; may be repeated")
            .takes_value(true)
            .multiple(true)
            .number_of_values(1)
            .required(true))
        .arg(Arg::with_name("vault")
            .long("vault")
            .help("grid vault directory (overrides grid.vault)")
            .takes_value(true))
        .arg(Arg::with_name("collection-root")
            .long("collection-root")
            .help("logical path runs are stored under (overrides grid.collection_root)")
            .takes_value(true))
        .arg(Arg::with_name("completion-indicator")
            .long("completion-indicator")
            .help("file an instrument writes when a run is finished")
            .takes_value(true))
        .arg(Arg::with_name("any-state")
            .long("any-state")
            .help("ingest valid runs whether or not they are finished"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .help("number of threads used for ingestion")
            .default_value("4")
            .takes_value(true))
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => IngestConfig::from_path(Path::new(path))?,
        None => IngestConfig::default(),
    };
    if let Some(root) = matches.value_of("root") {
        config.sequencer.base_dir = Some(PathBuf::from(root));
    }
    if let Some(vault) = matches.value_of("vault") {
        config.grid.vault = PathBuf::from(vault);
    }
    if let Some(collection_root) = matches.value_of("collection-root") {
        config.grid.collection_root = collection_root.to_owned();
    }
    if let Some(indicator) = matches.value_of("completion-indicator") {
        config.sequencer.completion_indicator = indicator.to_owned();
    }

    let sequencer_types = values_t!(matches, "sequencer-type", SequencerType).unwrap_or_else(|e| e.exit());
    let threads = value_t!(matches, "threads", usize).unwrap_or_else(|e| e.exit());

    let root = config
        .sequencer
        .base_dir
        .clone()
        .ok_or_else(|| anyhow!("No run directory: pass --root or set sequencer.base_dir"))?;
    let completion_indicator = if matches.is_present("any-state") {
        None
    } else {
        Some(config.sequencer.completion_indicator.as_str())
    };

    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Error configuring global threadpool")?;

    let grid = LocalGrid::open(&config.grid.vault)
        .with_context(|| format!("Error opening vault {}", config.grid.vault.display()))?;
    let ingestor = Ingestor::new(&grid, config.grid.collection_root.as_str());

    info!("ingesting {} into {}", root.display(), config.grid.vault.display());
    let reports = ingestor.ingest_all(&root, &sequencer_types, completion_indicator);
    println!("{}", serde_json::to_string_pretty(&reports)?);

    let failed = reports.values().flatten().filter(|r| r.is_failed()).count();
    if failed > 0 {
        bail!("{} runs failed to ingest", failed);
    }
    Ok(())
}
