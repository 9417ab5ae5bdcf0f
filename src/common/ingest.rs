//! Ingestion of discovered runs into a data grid: parse the descriptors,
//! derive the collection path, upload the run folder, then tag it.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    grid::{Avu, Collection, DataGrid, MetadataQuery, SortField, SortOrder},
    parser::parse_sequencer_run,
    sequencer::{destination_path, find_sequencer_runs, SequencerType},
};

pub const STATUS_INGESTED: &str = "ingested";

/// A run that made it into the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub run_path: PathBuf,
    pub run_id: String,
    pub sequencer_type: SequencerType,
    /// Logical path of the new collection
    pub collection: String,
    pub projects: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum IngestReport {
    Ingested(IngestOutcome),
    Failed { run_path: PathBuf, error: String },
}

impl IngestReport {
    pub fn is_failed(&self) -> bool {
        matches!(self, IngestReport::Failed { .. })
    }
}

/// Runs the ingestion steps against one grid
pub struct Ingestor<'a, G: DataGrid> {
    grid: &'a G,
    collection_root: String,
}

impl<'a, G: DataGrid> Ingestor<'a, G> {
    pub fn new(grid: &'a G, collection_root: impl Into<String>) -> Self {
        Ingestor {
            grid,
            collection_root: collection_root.into(),
        }
    }

    /// Ingest one run folder. Errors are logged before they are returned.
    pub fn ingest_run(&self, run_dir: &Path, sequencer_type: SequencerType) -> Result<IngestOutcome> {
        self.try_ingest_run(run_dir, sequencer_type).map_err(|e| {
            error!("failed to ingest {}: {}", run_dir.display(), e);
            e
        })
    }

    fn try_ingest_run(&self, run_dir: &Path, sequencer_type: SequencerType) -> Result<IngestOutcome> {
        let metadata = parse_sequencer_run(run_dir)?;
        let run_id = metadata
            .run_id()
            .ok_or_else(|| Error::MissingRunId(run_dir.to_owned()))?
            .to_owned();

        let collection = destination_path(&self.collection_root, sequencer_type, &run_id);
        info!("uploading {} to {}", run_dir.display(), collection);

        self.grid.put_collection(
            run_dir,
            &collection,
            &[
                Avu::new("sequencer_type", sequencer_type.tag()),
                Avu::new("run_id", run_id.as_str()),
                Avu::new("status", STATUS_INGESTED),
            ],
        )?;

        match &metadata.run_info {
            Some(run_info) => self.grid.add_metadata(
                &collection,
                &[
                    Avu::new("flowcell", run_info.flowcell.as_str()),
                    Avu::new("instrument", run_info.instrument.as_str()),
                    Avu::new("date", run_info.date.as_str()),
                ],
            )?,
            None => warn!("{} has no usable RunInfo.xml, skipping run tags", run_id),
        }

        if !metadata.projects.is_empty() {
            self.grid
                .add_metadata(&collection, &[Avu::new("projects", metadata.projects.join(","))])?;
        }

        info!("ingested {} as {}", run_id, collection);
        Ok(IngestOutcome {
            run_path: run_dir.to_owned(),
            run_id,
            sequencer_type,
            collection,
            projects: metadata.projects,
        })
    }

    /// Discover the completed runs of one family under `root` and ingest each.
    /// A failing run is reported without stopping the others.
    pub fn ingest_runs(
        &self,
        root: &Path,
        sequencer_type: SequencerType,
        completion_indicator: Option<&str>,
    ) -> Result<Vec<IngestReport>> {
        let runs = find_sequencer_runs(root, sequencer_type, completion_indicator)?;

        let reports: Vec<IngestReport> = runs
            .par_iter()
            .map(|run| match self.ingest_run(run, sequencer_type) {
                Ok(outcome) => IngestReport::Ingested(outcome),
                Err(e) => IngestReport::Failed {
                    run_path: run.clone(),
                    error: e.to_string(),
                },
            })
            .collect();

        let failed = reports.iter().filter(|r| r.is_failed()).count();
        info!(
            "{}: {} runs ingested, {} failed",
            sequencer_type,
            reports.len() - failed,
            failed
        );
        Ok(reports)
    }

    /// `ingest_runs` for several families. If discovery itself fails for a
    /// family, that family gets a single failed report for `root`.
    pub fn ingest_all(
        &self,
        root: &Path,
        sequencer_types: &[SequencerType],
        completion_indicator: Option<&str>,
    ) -> BTreeMap<SequencerType, Vec<IngestReport>> {
        sequencer_types
            .iter()
            .map(|&sequencer_type| {
                let reports = self
                    .ingest_runs(root, sequencer_type, completion_indicator)
                    .unwrap_or_else(|e| {
                        error!("{} discovery failed: {}", sequencer_type, e);
                        vec![IngestReport::Failed {
                            run_path: root.to_owned(),
                            error: e.to_string(),
                        }]
                    });
                (sequencer_type, reports)
            })
            .collect()
    }

    pub fn update_run_status(&self, collection: &str, status: &str) -> Result<()> {
        info!("updating status of {} to {}", collection, status);
        self.grid
            .set_metadata(collection, &[Avu::new("status", status)])
    }

    /// Runs with the given status, most recently modified first
    pub fn find_runs_by_status(
        &self,
        status: &str,
        sequencer_type: Option<SequencerType>,
        limit: usize,
    ) -> Result<Vec<Collection>> {
        let mut conditions = vec![Avu::new("status", status)];
        if let Some(sequencer_type) = sequencer_type {
            conditions.push(Avu::new("sequencer_type", sequencer_type.tag()));
        }

        self.grid.query_collections(&MetadataQuery {
            limit,
            sort_by: Some(SortField::ModifyTime),
            order: SortOrder::Desc,
            ..MetadataQuery::new(conditions)
        })
    }
}
