//! Files gathered from the local directory
//!
//! A [`FileEntry`] is one leaf file of the upload root: its slash-separated path
//! relative to the root, its raw bytes and the mode it will carry in the tree.
//! Entries are immutable and consumed once by blob creation.

use crate::artifacts::objects::entry_mode::FileMode;
use bytes::Bytes;
use derive_new::new;

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct FileEntry {
    /// Path relative to the upload root, always `/`-separated
    path: String,
    /// Raw file bytes (link target for symlinks)
    content: Bytes,
    mode: FileMode,
}

impl FileEntry {
    /// A regular, non-executable file
    pub fn regular(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self::new(path.into(), content.into(), FileMode::Regular)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn into_parts(self) -> (String, Bytes, FileMode) {
        (self.path, self.content, self.mode)
    }
}
