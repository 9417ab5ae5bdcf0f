//! Collections with attribute/value/unit metadata, the way a data grid stores
//! ingested runs, plus a grid backed by a local vault directory.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Component, Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Attribute, value and optional unit attached to a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avu {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl Avu {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Avu {
            name: name.into(),
            value: value.into(),
            units: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// A condition matches on name and value, and on units only if it has any
    fn satisfies(&self, condition: &Avu) -> bool {
        self.name == condition.name
            && self.value == condition.value
            && (condition.units.is_none() || self.units == condition.units)
    }
}

/// A stored run directory and its metadata. Times are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Logical path in the grid, e.g. `/sequencing/miseq/<run>`
    pub path: String,
    pub name: String,
    pub create_time: u64,
    pub modify_time: u64,
    pub metadata: Vec<Avu>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    CreateTime,
    ModifyTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// How the conditions of a query combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct MetadataQuery {
    pub conditions: Vec<Avu>,
    pub operator: Operator,
    pub limit: usize,
    pub offset: usize,
    pub sort_by: Option<SortField>,
    pub order: SortOrder,
}

impl Default for MetadataQuery {
    fn default() -> Self {
        MetadataQuery {
            conditions: Vec::new(),
            operator: Operator::default(),
            limit: 100,
            offset: 0,
            sort_by: None,
            order: SortOrder::default(),
        }
    }
}

impl MetadataQuery {
    pub fn new(conditions: Vec<Avu>) -> Self {
        MetadataQuery {
            conditions,
            ..MetadataQuery::default()
        }
    }

    /// An empty query matches every collection
    pub fn matches(&self, collection: &Collection) -> bool {
        let hit = |condition: &Avu| collection.metadata.iter().any(|avu| avu.satisfies(condition));
        if self.conditions.is_empty() {
            return true;
        }
        match self.operator {
            Operator::And => self.conditions.iter().all(hit),
            Operator::Or => self.conditions.iter().any(hit),
        }
    }

    fn compare(&self, a: &Collection, b: &Collection) -> Ordering {
        let ord = match self.sort_by {
            Some(SortField::Name) => a.name.cmp(&b.name),
            Some(SortField::CreateTime) => a.create_time.cmp(&b.create_time),
            Some(SortField::ModifyTime) => a.modify_time.cmp(&b.modify_time),
            None => Ordering::Equal,
        }
        .then_with(|| a.path.cmp(&b.path));

        match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

/// Storage for run collections and their metadata
pub trait DataGrid: Sync {
    /// Store a local directory tree as a new collection at `path`
    fn put_collection(&self, local_dir: &Path, path: &str, metadata: &[Avu]) -> Result<Collection>;

    fn collection(&self, path: &str) -> Result<Collection>;

    /// Attach AVUs, skipping any the collection already has
    fn add_metadata(&self, path: &str, avus: &[Avu]) -> Result<()>;

    /// Replace every value of each attribute named in `avus`
    fn set_metadata(&self, path: &str, avus: &[Avu]) -> Result<()>;

    fn remove_metadata(&self, path: &str, names: &[&str]) -> Result<()>;

    fn metadata(&self, path: &str) -> Result<Vec<Avu>> {
        Ok(self.collection(path)?.metadata)
    }

    fn query_collections(&self, query: &MetadataQuery) -> Result<Vec<Collection>>;
}

const CATALOG_FILE: &str = ".catalog.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    collections: BTreeMap<String, Collection>,
    /// Paths whose files are still being copied
    #[serde(skip)]
    pending: BTreeSet<String>,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn push_unique(metadata: &mut Vec<Avu>, avus: &[Avu]) {
    for avu in avus {
        if !metadata.contains(avu) {
            metadata.push(avu.clone());
        }
    }
}

/// A grid kept in a directory on local disk. Collections are copied under
/// the vault at their logical path and the catalog of collections and AVUs
/// is kept in `<vault>/.catalog.json`.
pub struct LocalGrid {
    vault: PathBuf,
    catalog: Mutex<Catalog>,
}

impl LocalGrid {
    /// Open the vault, creating it if needed
    pub fn open(vault: impl Into<PathBuf>) -> Result<LocalGrid> {
        let vault = vault.into();
        fs::create_dir_all(&vault).map_err(|e| Error::io(&vault, e))?;

        let catalog_path = vault.join(CATALOG_FILE);
        let catalog = if catalog_path.is_file() {
            let reader = BufReader::new(
                File::open(&catalog_path).map_err(|e| Error::io(&catalog_path, e))?,
            );
            serde_json::from_reader(reader).map_err(|source| Error::Catalog {
                path: catalog_path.clone(),
                source,
            })?
        } else {
            Catalog::default()
        };

        debug!(
            "opened vault {} with {} collections",
            vault.display(),
            catalog.collections.len()
        );
        Ok(LocalGrid {
            vault,
            catalog: Mutex::new(catalog),
        })
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    /// Where the files of a logical path live on disk. The path must be
    /// absolute and every component a plain name, so it always resolves
    /// inside the vault.
    pub fn local_path(&self, path: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| Error::InvalidCollectionPath {
            path: path.to_owned(),
            reason: reason.to_owned(),
        };

        let relative = Path::new(path.strip_prefix('/').ok_or_else(|| invalid("not absolute"))?);
        if relative.as_os_str().is_empty() {
            return Err(invalid("no collection name"));
        }
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(invalid("only plain names may appear between slashes"));
        }
        Ok(self.vault.join(relative))
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, catalog: &Catalog) -> Result<()> {
        let catalog_path = self.vault.join(CATALOG_FILE);
        let tmp_path = self.vault.join(format!("{}.tmp", CATALOG_FILE));

        let writer = BufWriter::new(File::create(&tmp_path).map_err(|e| Error::io(&tmp_path, e))?);
        serde_json::to_writer_pretty(writer, catalog).map_err(|source| Error::Catalog {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &catalog_path).map_err(|e| Error::io(&catalog_path, e))
    }

    fn update<F>(&self, path: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Collection),
    {
        let mut catalog = self.lock();
        let collection = catalog
            .collections
            .get_mut(path)
            .ok_or_else(|| Error::CollectionNotFound(path.to_owned()))?;
        f(collection);
        collection.modify_time = now();
        self.save(&catalog)
    }

    /// Claim `path` for a new collection. Fails if it is registered, being
    /// copied, or nested with another collection.
    fn reserve(&self, path: &str) -> Result<()> {
        let mut catalog = self.lock();
        if catalog.collections.contains_key(path) || catalog.pending.contains(path) {
            return Err(Error::CollectionExists(path.to_owned()));
        }

        let overlapping = catalog
            .collections
            .keys()
            .chain(catalog.pending.iter())
            .find(|other| Path::new(path).starts_with(other) || Path::new(other).starts_with(path));
        if let Some(other) = overlapping {
            return Err(Error::InvalidCollectionPath {
                path: path.to_owned(),
                reason: format!("overlaps collection {}", other),
            });
        }

        catalog.pending.insert(path.to_owned());
        Ok(())
    }

    /// Drop a reservation and whatever was copied for it
    fn release(&self, path: &str, dest: &Path) {
        self.lock().pending.remove(path);
        match fs::remove_dir_all(dest) {
            Ok(()) => debug!("removed partial copy {}", dest.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("couldn't remove partial copy {}: {}", dest.display(), e),
        }
    }

    /// Copy `local_dir` to `dest`, first clearing files an interrupted
    /// copy left there
    fn replace_tree(&self, local_dir: &Path, dest: &Path) -> Result<u64> {
        if fs::symlink_metadata(dest).is_ok() {
            warn!("clearing stale files in {}", dest.display());
            fs::remove_dir_all(dest).map_err(|e| Error::io(dest, e))?;
        }
        self.copy_tree(local_dir, dest)
    }

    fn copy_tree(&self, local_dir: &Path, dest: &Path) -> Result<u64> {
        let mut copied = 0;
        for entry in WalkDir::new(local_dir) {
            let entry = entry?;
            let rel = match entry.path().strip_prefix(local_dir) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let target = dest.join(rel);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
            } else if entry.path().is_file() {
                fs::copy(entry.path(), &target).map_err(|e| Error::io(entry.path(), e))?;
                copied += 1;
            } else {
                debug!("not copying {}", entry.path().display());
            }
        }
        Ok(copied)
    }
}

impl DataGrid for LocalGrid {
    fn put_collection(&self, local_dir: &Path, path: &str, metadata: &[Avu]) -> Result<Collection> {
        fs::metadata(local_dir).map_err(|e| Error::io(local_dir, e))?;
        let dest = self.local_path(path)?;
        self.reserve(path)?;

        let copied = match self.replace_tree(local_dir, &dest) {
            Ok(copied) => copied,
            Err(e) => {
                self.release(path, &dest);
                return Err(e);
            }
        };
        info!("copied {} files from {} to {}", copied, local_dir.display(), path);

        let created = now();
        let mut collection = Collection {
            path: path.to_owned(),
            name: path.rsplit('/').next().unwrap_or(path).to_owned(),
            create_time: created,
            modify_time: created,
            metadata: Vec::new(),
        };
        push_unique(&mut collection.metadata, metadata);

        let mut catalog = self.lock();
        catalog
            .collections
            .insert(path.to_owned(), collection.clone());
        if let Err(e) = self.save(&catalog) {
            catalog.collections.remove(path);
            drop(catalog);
            self.release(path, &dest);
            return Err(e);
        }
        catalog.pending.remove(path);
        Ok(collection)
    }

    fn collection(&self, path: &str) -> Result<Collection> {
        self.lock()
            .collections
            .get(path)
            .cloned()
            .ok_or_else(|| Error::CollectionNotFound(path.to_owned()))
    }

    fn add_metadata(&self, path: &str, avus: &[Avu]) -> Result<()> {
        self.update(path, |collection| push_unique(&mut collection.metadata, avus))
    }

    fn set_metadata(&self, path: &str, avus: &[Avu]) -> Result<()> {
        self.update(path, |collection| {
            collection
                .metadata
                .retain(|existing| !avus.iter().any(|avu| avu.name == existing.name));
            push_unique(&mut collection.metadata, avus);
        })
    }

    fn remove_metadata(&self, path: &str, names: &[&str]) -> Result<()> {
        self.update(path, |collection| {
            collection
                .metadata
                .retain(|existing| !names.contains(&existing.name.as_str()))
        })
    }

    fn query_collections(&self, query: &MetadataQuery) -> Result<Vec<Collection>> {
        let catalog = self.lock();
        let mut hits: Vec<Collection> = catalog
            .collections
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        drop(catalog);

        hits.sort_by(|a, b| query.compare(a, b));
        Ok(hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}
