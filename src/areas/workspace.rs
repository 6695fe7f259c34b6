//! Local directory walking (Tree Collector)
//!
//! [`Workspace::files`] lazily walks the upload root and yields one
//! [`FileEntry`] per non-ignored leaf file. Ignored directories are pruned
//! before they are descended into. Calling it again restarts the walk.

use crate::artifacts::ignore::ignore_spec::IgnoreSpec;
use crate::artifacts::objects::entry_mode::FileMode;
use crate::artifacts::objects::file_entry::FileEntry;
use crate::config::UploadSettings;
use crate::errors::UploadError;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

const IGNORED_PATHS: [&str; 1] = [".git"];

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
    ignore: IgnoreSpec,
    max_file_size: u64,
}

impl Workspace {
    pub fn new(path: Box<Path>, ignore: IgnoreSpec, max_file_size: u64) -> Self {
        Workspace {
            path,
            ignore,
            max_file_size,
        }
    }

    /// Open `root`, compiling the pattern file named in `settings` if the root has one
    pub fn open(root: &Path, settings: &UploadSettings) -> Result<Self, UploadError> {
        if !root.is_dir() {
            return Err(UploadError::Io {
                path: root.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "upload root is not a directory",
                ),
            });
        }

        let ignore = IgnoreSpec::load(&root.join(&settings.ignore_file))
            .map_err(UploadError::IgnoreRules)?;
        debug!(root = ?root, patterns = ignore.len(), "ignore rules loaded");

        Ok(Self::new(
            root.to_path_buf().into_boxed_path(),
            ignore,
            settings.max_file_size,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every non-ignored leaf file below the root, in file name order
    pub fn files(&self) -> impl Iterator<Item = Result<FileEntry, UploadError>> + '_ {
        let root_missing = (!self.path.is_dir()).then(|| UploadError::Io {
            path: self.path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "upload root is missing"),
        });

        let walk = WalkDir::new(&self.path)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry))
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_dir() => None,
                Ok(entry) => Some(self.read_entry(&entry)),
                Err(error) => Some(Err(walk_error(error))),
            });

        root_missing.map(Err).into_iter().chain(walk)
    }

    /// Walk the whole root; the first unreadable file aborts the walk
    pub fn collect(&self) -> Result<Vec<FileEntry>, UploadError> {
        let files = self.files().collect::<Result<Vec<_>, _>>()?;
        debug!(root = ?self.path, files = files.len(), "workspace collected");

        Ok(files)
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if Self::is_ignored(entry.path()) {
            return true;
        }

        match self.relative_path(entry.path()) {
            Some(relative) => {
                let excluded = self.ignore.is_ignored(&relative, entry.file_type().is_dir());
                if excluded {
                    debug!(path = %relative, "excluded by ignore rules");
                }
                excluded
            }
            None => false,
        }
    }

    fn is_ignored(path: &Path) -> bool {
        path.file_name()
            .map(|name| IGNORED_PATHS.contains(&name.to_string_lossy().as_ref()))
            .unwrap_or(false)
    }

    /// `/`-separated path relative to the root, regardless of host conventions
    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.path).ok()?;

        let parts = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>();

        (!parts.is_empty()).then(|| parts.join("/"))
    }

    fn read_entry(&self, entry: &DirEntry) -> Result<FileEntry, UploadError> {
        let path = entry.path();
        let io_error = |source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let relative = self.relative_path(path).ok_or_else(|| {
            io_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path outside the upload root",
            ))
        })?;

        let mode = FileMode::detect(path, entry.file_type());
        let content = match mode {
            FileMode::Symlink => {
                let target = std::fs::read_link(path).map_err(io_error)?;
                Bytes::from(target.to_string_lossy().into_owned())
            }
            FileMode::Regular | FileMode::Executable => {
                let size = entry.metadata().map_err(|e| io_error(e.into()))?.len();
                if size > self.max_file_size {
                    return Err(UploadError::FileTooLarge {
                        path: relative,
                        size,
                        limit: self.max_file_size,
                    });
                }
                Bytes::from(std::fs::read(path).map_err(io_error)?)
            }
        };

        Ok(FileEntry::new(relative, content, mode))
    }
}

fn walk_error(error: walkdir::Error) -> UploadError {
    let path = error.path().map(PathBuf::from).unwrap_or_default();
    let source = match error.into_io_error() {
        Some(source) => source,
        None => std::io::Error::other("file system loop detected"),
    };

    UploadError::Io { path, source }
}
