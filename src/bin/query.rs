//! query lists the collections in a grid vault whose metadata matches
//! `name=value` conditions, as JSON.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{value_t, App, Arg};
use env_logger::Env;

use common::grid::{Avu, DataGrid, LocalGrid, MetadataQuery, Operator, SortField, SortOrder};

/// Split `name=value` into a metadata condition
fn parse_condition(arg: &str) -> Result<Avu> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid condition {:?}, expected name=value", arg))?;
    Ok(Avu::new(name.trim(), value.trim()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let matches = App::new("query")
        .version(clap::crate_version!())
        .arg(Arg::with_name("vault")
            .long("vault")
            .help("grid vault directory")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("attr")
            .long("attr")
            .help("metadata condition as name=value; may be repeated")
            .takes_value(true)
            .multiple(true)
            .number_of_values(1))
        .arg(Arg::with_name("or")
            .long("or")
            .help("match collections satisfying any condition instead of all"))
        .arg(Arg::with_name("limit")
            .long("limit")
            .help("maximum number of collections to print")
            .default_value("100")
            .takes_value(true))
        .get_matches();

    let vault = value_t!(matches, "vault", PathBuf).unwrap_or_else(|e| e.exit());
    if !vault.is_dir() {
        bail!("Could not find vault {}", vault.display());
    }
    let limit = value_t!(matches, "limit", usize).unwrap_or_else(|e| e.exit());
    let conditions = matches
        .values_of("attr")
        .into_iter()
        .flatten()
        .map(parse_condition)
        .collect::<Result<Vec<_>>>()?;

    let grid = LocalGrid::open(&vault)
        .with_context(|| format!("Error opening vault {}", vault.display()))?;

    let query = MetadataQuery {
        operator: if matches.is_present("or") { Operator::Or } else { Operator::And },
        limit,
        sort_by: Some(SortField::ModifyTime),
        order: SortOrder::Desc,
        ..MetadataQuery::new(conditions)
    };

    let collections = grid.query_collections(&query)?;
    println!("{}", serde_json::to_string_pretty(&collections)?);
    Ok(())
}
