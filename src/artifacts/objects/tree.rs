//! Tree objects
//!
//! A tree maps paths to blob addresses and modes, describing the complete file
//! layout of one commit. New trees are usually built on top of a base tree: the
//! base contributes every path the batch does not mention, and batch entries
//! override base entries by path.
//!
//! ## Format
//!
//! The in-memory store keeps trees as flat, path-sorted manifests and hashes them as
//! `tree <size>\0` followed by `<mode> <path>\0<20-byte-sha1>` per entry.

use crate::artifacts::objects::blob::BlobRef;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Write;

/// A tree the remote has stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRef {
    pub sha: ObjectId,
    /// Tree the entries were folded into, when built incrementally
    pub base_tree: Option<ObjectId>,
    /// The entries supplied when the tree was created
    pub entries: Vec<BlobRef>,
}

/// Flat path-to-blob manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<String, BlobRef>,
}

impl Tree {
    /// Fold `entries` into `base`; entries win on equal paths
    pub fn build<'e>(base: Option<&Tree>, entries: impl IntoIterator<Item = &'e BlobRef>) -> Self {
        let mut tree = base.cloned().unwrap_or_default();

        for entry in entries {
            tree.entries.insert(entry.path.clone(), entry.clone());
        }

        tree
    }

    pub fn get(&self, path: &str) -> Option<&BlobRef> {
        self.entries.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();
        for (path, entry) in &self.entries {
            let header = format!("{:o} {}", entry.mode.as_u32(), path);
            content_bytes.write_all(header.as_bytes())?;
            content_bytes.push(0);
            entry.sha.write_h40_to(&mut content_bytes)?;
        }

        let mut tree_bytes = Vec::new();
        let header = format!("{} {}\0", self.object_type().as_str(), content_bytes.len());
        tree_bytes.write_all(header.as_bytes())?;
        tree_bytes.write_all(&content_bytes)?;

        Ok(Bytes::from(tree_bytes))
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}
