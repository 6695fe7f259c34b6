//! Commit objects and branch refs
//!
//! A commit points at one tree and zero or more parents. A branch ref is the
//! only mutable object involved in an upload: a named pointer that must only
//! ever point at a commit the store already holds.
//!
//! ## Format
//!
//! The in-memory store hashes commits as:
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//!
//! <commit message>
//! ```

use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

/// A commit the remote has stored
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct CommitRef {
    pub sha: ObjectId,
    pub tree: ObjectId,
    /// Empty for a root commit
    pub parents: Vec<ObjectId>,
    pub message: String,
}

impl CommitRef {
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// First line of the message
    pub fn short_message(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Named pointer to a commit
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct BranchRef {
    pub name: BranchName,
    pub head: ObjectId,
}

/// Commit content as hashed by the in-memory store
#[derive(Debug, Clone, new)]
pub struct Commit<'c> {
    tree: &'c ObjectId,
    parents: &'c [ObjectId],
    message: &'c str,
}

impl Packable for Commit<'_> {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut lines = vec![format!("tree {}", self.tree)];
        lines.extend(self.parents.iter().map(|parent| format!("parent {parent}")));
        lines.push(String::new());
        lines.push(self.message.to_string());
        let content = lines.join("\n");

        let mut commit_bytes = Vec::new();
        let header = format!("{} {}\0", self.object_type().as_str(), content.len());
        commit_bytes.write_all(header.as_bytes())?;
        commit_bytes.write_all(content.as_bytes())?;

        Ok(Bytes::from(commit_bytes))
    }
}

impl Object for Commit<'_> {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }
}
