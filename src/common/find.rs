//! A `find`-like recursive walker: depth limits, glob names, type filters,
//! excluded directories and an arbitrary predicate, applied in one pass.

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use glob::Pattern;
use log::warn;
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};

/// The kind of filesystem object a search yields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// Regular files, including symlinks that resolve to one
    #[default]
    File,
    /// Directories, including symlinks that resolve to one (never descended)
    Dir,
    /// Any symbolic link
    Symlink,
}

impl FileType {
    fn matches(self, entry: &DirEntry) -> bool {
        let ft = entry.file_type();
        match self {
            FileType::File => ft.is_file() || (ft.is_symlink() && entry.path().is_file()),
            FileType::Dir => ft.is_dir() || (ft.is_symlink() && entry.path().is_dir()),
            FileType::Symlink => ft.is_symlink(),
        }
    }
}

/// Predicate over candidate paths
pub type PathFilter = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Plain search options, for callers that don't need a custom predicate
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub min_depth: usize,
    pub max_depth: Option<usize>,
    pub name_pattern: Option<String>,
    pub file_type: FileType,
    pub exclude_dirs: Vec<String>,
}

/// Builder for a filtered walk below `root`.
///
/// The depth of a candidate is the depth of the directory containing it,
/// so entries directly inside `root` sit at depth 0.
pub struct FileFinder {
    root: PathBuf,
    min_depth: usize,
    max_depth: Option<usize>,
    name_pattern: Option<String>,
    file_type: FileType,
    exclude_dirs: HashSet<String>,
    filter: Option<PathFilter>,
}

impl FileFinder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileFinder {
            root: root.into(),
            min_depth: 0,
            max_depth: None,
            name_pattern: None,
            file_type: FileType::default(),
            exclude_dirs: HashSet::new(),
            filter: None,
        }
    }

    pub fn with_options(root: impl Into<PathBuf>, options: FindOptions) -> Self {
        let mut finder = FileFinder::new(root)
            .min_depth(options.min_depth)
            .file_type(options.file_type)
            .exclude_dirs(options.exclude_dirs);
        finder.max_depth = options.max_depth;
        finder.name_pattern = options.name_pattern;
        finder
    }

    pub fn min_depth(mut self, depth: usize) -> Self {
        self.min_depth = depth;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Glob matched against the entry's file name, e.g. `*.fastq.gz`
    pub fn name_pattern(mut self, pattern: &str) -> Self {
        self.name_pattern = Some(pattern.to_owned());
        self
    }

    pub fn file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    /// Directory names that are neither yielded nor descended into
    pub fn exclude_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_dirs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Start the walk. Fails only if the root is missing or the name pattern
    /// is invalid; unreadable subtrees are skipped with a warning.
    pub fn find(self) -> Result<impl Iterator<Item = PathBuf>> {
        match fs::metadata(&self.root) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::RootNotFound(self.root))
            }
            Err(e) => return Err(Error::io(self.root, e)),
        }

        let pattern = self.name_pattern.as_deref().map(Pattern::new).transpose()?;

        let mut walker = WalkDir::new(&self.root).min_depth(1).sort_by_file_name();
        if let Some(max_depth) = self.max_depth {
            walker = walker.max_depth(max_depth + 1);
        }

        let FileFinder {
            min_depth,
            file_type,
            exclude_dirs,
            filter,
            ..
        } = self;

        let entries = walker
            .into_iter()
            .filter_entry(move |entry| {
                !(FileType::Dir.matches(entry)
                    && exclude_dirs.contains(entry.file_name().to_string_lossy().as_ref()))
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping unreadable path: {}", e);
                    None
                }
            });

        let found = entries
            .filter(move |entry| entry.depth() - 1 >= min_depth)
            .filter(move |entry| match &pattern {
                Some(p) => p.matches(&entry.file_name().to_string_lossy()),
                None => true,
            })
            .filter(move |entry| match &filter {
                Some(f) => f(entry.path()),
                None => true,
            })
            .filter(move |entry| file_type.matches(entry))
            .map(DirEntry::into_path);

        Ok(found)
    }
}

/// Collect every path under `root` matching `options`
pub fn find_files(root: impl AsRef<Path>, options: FindOptions) -> Result<Vec<PathBuf>> {
    Ok(FileFinder::with_options(root.as_ref(), options)
        .find()?
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, File};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap();
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn empty_directory() {
        let dir = tempdir().unwrap();
        assert!(find_files(dir.path(), FindOptions::default()).unwrap().is_empty());

        let dirs = FileFinder::new(dir.path())
            .file_type(FileType::Dir)
            .find()
            .unwrap()
            .count();
        assert_eq!(dirs, 0);
    }

    #[test]
    #[should_panic(expected = "RootNotFound")]
    fn missing_root() {
        let dir = tempdir().unwrap();
        FileFinder::new(dir.path().join("nonexistent")).find().unwrap();
    }

    #[test]
    #[should_panic(expected = "Pattern(PatternError")]
    fn bad_pattern() {
        let dir = tempdir().unwrap();
        FileFinder::new(dir.path()).name_pattern("[").find().unwrap();
    }

    #[test]
    fn depth_limits() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("top.txt"));
        touch(&dir.path().join("a/one.txt"));
        touch(&dir.path().join("a/b/two.txt"));
        touch(&dir.path().join("a/b/c/three.txt"));

        let shallow: Vec<_> = FileFinder::new(dir.path()).max_depth(1).find().unwrap().collect();
        assert_eq!(names(&shallow), vec!["one.txt", "top.txt"]);

        let deep: Vec<_> = FileFinder::new(dir.path()).min_depth(2).find().unwrap().collect();
        assert_eq!(names(&deep), vec!["three.txt", "two.txt"]);

        let only_one: Vec<_> = FileFinder::new(dir.path())
            .min_depth(2)
            .max_depth(2)
            .find()
            .unwrap()
            .collect();
        assert_eq!(names(&only_one), vec!["two.txt"]);
    }

    #[test]
    fn max_depth_never_exceeded() {
        let dir = tempdir().unwrap();
        let mut current = dir.path().to_path_buf();
        for level in 0..15 {
            current = current.join(format!("level_{}", level));
        }
        touch(&current.join("deep_file.txt"));

        for max_depth in 0..15 {
            let found: Vec<_> = FileFinder::new(dir.path())
                .file_type(FileType::Dir)
                .max_depth(max_depth)
                .find()
                .unwrap()
                .collect();
            assert_eq!(found.len(), max_depth + 1);
            for path in found {
                let depth = path.strip_prefix(dir.path()).unwrap().components().count() - 1;
                assert!(depth <= max_depth);
            }
        }

        assert_eq!(FileFinder::new(dir.path()).max_depth(5).find().unwrap().count(), 0);
        let found: Vec<_> = FileFinder::new(dir.path()).max_depth(15).find().unwrap().collect();
        assert_eq!(names(&found), vec!["deep_file.txt"]);
    }

    #[test]
    fn name_pattern() {
        let dir = tempdir().unwrap();
        for i in 0..100 {
            touch(&dir.path().join(format!("file_{}.txt", i)));
        }
        touch(&dir.path().join("file with spaces.txt"));
        touch(&dir.path().join("file[with]brackets.txt"));

        let options = FindOptions {
            name_pattern: Some("*_5*.txt".to_owned()),
            ..FindOptions::default()
        };
        // file_5.txt and file_50.txt through file_59.txt
        assert_eq!(find_files(dir.path(), options).unwrap().len(), 11);

        let found: Vec<_> = FileFinder::new(dir.path())
            .name_pattern("*spaces*")
            .find()
            .unwrap()
            .collect();
        assert_eq!(names(&found), vec!["file with spaces.txt"]);

        assert_eq!(
            FileFinder::new(dir.path()).name_pattern("*with*").find().unwrap().count(),
            2
        );
    }

    #[test]
    fn excluded_dirs_are_pruned() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("keep/a.txt"));
        touch(&dir.path().join("Thumbnail_Images/L001/b.txt"));
        touch(&dir.path().join("keep/Thumbnail_Images/c.txt"));

        let files: Vec<_> = FileFinder::new(dir.path())
            .exclude_dirs(vec!["Thumbnail_Images"])
            .find()
            .unwrap()
            .collect();
        assert_eq!(names(&files), vec!["a.txt"]);

        let dirs: Vec<_> = FileFinder::new(dir.path())
            .file_type(FileType::Dir)
            .exclude_dirs(vec!["Thumbnail_Images"])
            .find()
            .unwrap()
            .collect();
        assert_eq!(names(&dirs), vec!["keep"]);
    }

    #[test]
    fn excluded_dirs_pruned_below_min_depth() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("skip/deeper/a.txt"));
        touch(&dir.path().join("keep/deeper/b.txt"));

        let files: Vec<_> = FileFinder::new(dir.path())
            .min_depth(2)
            .exclude_dirs(vec!["skip"])
            .find()
            .unwrap()
            .collect();
        assert_eq!(names(&files), vec!["b.txt"]);
    }

    #[test]
    fn predicate_order() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("run_a/RTAComplete.txt"));
        touch(&dir.path().join("run_b/notes.txt"));
        touch(&dir.path().join("other/x.txt"));

        // the predicate only sees candidates whose name matched, but it runs
        // before the type check so files named run_* would reach it too
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let found: Vec<_> = FileFinder::new(dir.path())
            .file_type(FileType::Dir)
            .name_pattern("run_*")
            .filter(move |path| {
                counter.fetch_add(1, Ordering::SeqCst);
                path.join("RTAComplete.txt").is_file()
            })
            .find()
            .unwrap()
            .collect();

        assert_eq!(names(&found), vec!["run_a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let dir1 = dir.path().join("dir1");
        let dir2 = dir.path().join("dir2");
        touch(&dir1.join("file1.txt"));
        create_dir_all(&dir2).unwrap();
        symlink(&dir1, dir2.join("link_to_dir1")).unwrap();
        symlink(dir1.join("file1.txt"), dir2.join("link_to_file1.txt")).unwrap();

        assert_eq!(FileFinder::new(dir.path()).find().unwrap().count(), 2);

        let links: Vec<_> = FileFinder::new(dir.path())
            .file_type(FileType::Symlink)
            .find()
            .unwrap()
            .collect();
        assert_eq!(names(&links), vec!["link_to_dir1", "link_to_file1.txt"]);

        let real: Vec<_> = FileFinder::new(dir.path())
            .filter(|path| !path.is_symlink())
            .find()
            .unwrap()
            .collect();
        assert_eq!(names(&real), vec!["file1.txt"]);

        // symlinked directories count as directories but are not walked into
        let dirs: Vec<_> = FileFinder::new(dir.path())
            .file_type(FileType::Dir)
            .find()
            .unwrap()
            .collect();
        assert_eq!(names(&dirs), vec!["dir1", "dir2", "link_to_dir1"]);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subtree_does_not_fail() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let restricted = dir.path().join("restricted");
        touch(&restricted.join("hidden.txt"));
        touch(&dir.path().join("visible.txt"));
        fs::set_permissions(&restricted, fs::Permissions::from_mode(0o300)).unwrap();

        let found: Vec<_> = FileFinder::new(dir.path()).find().unwrap().collect();

        fs::set_permissions(&restricted, fs::Permissions::from_mode(0o700)).unwrap();
        assert!(found.contains(&dir.path().join("visible.txt")));
    }
}
