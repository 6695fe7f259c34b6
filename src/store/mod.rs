//! Remote object store abstraction
//!
//! Provides the [`ObjectStore`] trait: the only surface the upload pipeline
//! touches on the remote side. Implementations:
//!
//! - `github`: the GitHub git-data REST API
//! - `memory`: an in-process, content-addressed store (dry runs and tests)
//!
//! `rate_limit` tracks the upstream request budget for the REST client.

pub mod github;
pub mod memory;
pub mod rate_limit;

use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::blob::{BlobPayload, BlobRef};
use crate::artifacts::objects::commit::{BranchRef, CommitRef};
use crate::artifacts::objects::entry_mode::FileMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::TreeRef;
use crate::errors::StoreError;
use anyhow::Context;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Repository address
// ---------------------------------------------------------------------------

/// `owner/name` of a remote repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    owner: String,
    name: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::str::FromStr for RepoSlug {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (owner, name) = s
            .trim()
            .split_once('/')
            .with_context(|| format!("repository must be given as owner/name, got '{s}'"))?;

        if owner.is_empty() || name.is_empty() || name.contains('/') {
            anyhow::bail!("repository must be given as owner/name, got '{s}'");
        }

        Ok(Self::new(owner, name.trim_end_matches(".git")))
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Ref lookup
// ---------------------------------------------------------------------------

/// Outcome of reading a branch ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefLookup {
    /// The branch points at this commit
    Found(ObjectId),
    /// The repository has history, but not this branch
    Missing,
    /// The repository has no commits at all
    EmptyRepository,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Capability interface to a content-addressed remote store.
///
/// Blob creation is idempotent: identical bytes always yield the same sha, so
/// retrying it is safe. `update_ref` is the only call that changes what other
/// clients observe.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the commit a branch points at.
    async fn get_ref(&self, repo: &RepoSlug, branch: &BranchName)
    -> Result<RefLookup, StoreError>;

    /// Create a branch at an existing commit; `Conflict` if the branch exists.
    async fn create_ref(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &ObjectId,
    ) -> Result<BranchRef, StoreError>;

    /// Move a branch to `sha`; `NonFastForward` if it no longer points at `expected`.
    async fn update_ref(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &ObjectId,
        expected: &ObjectId,
    ) -> Result<BranchRef, StoreError>;

    async fn get_commit(&self, repo: &RepoSlug, sha: &ObjectId) -> Result<CommitRef, StoreError>;

    async fn create_blob(
        &self,
        repo: &RepoSlug,
        payload: &BlobPayload,
    ) -> Result<ObjectId, StoreError>;

    /// Create a tree; with a base, paths not in `entries` keep their base blob.
    async fn create_tree(
        &self,
        repo: &RepoSlug,
        base_tree: Option<&ObjectId>,
        entries: &[BlobRef],
    ) -> Result<TreeRef, StoreError>;

    async fn create_commit(
        &self,
        repo: &RepoSlug,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<CommitRef, StoreError>;

    /// Give an empty repository its first, parentless commit holding a README,
    /// and point `branch` at it.
    ///
    /// Runs strictly in order: blob, tree, root commit, ref.
    async fn initialize_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        readme: &str,
        message: &str,
    ) -> Result<CommitRef, StoreError> {
        let blob = self
            .create_blob(repo, &BlobPayload::encode(readme.as_bytes()))
            .await?;
        let entry = BlobRef::new(README_PATH.to_string(), FileMode::Regular, blob);
        let tree = self.create_tree(repo, None, &[entry]).await?;
        let commit = self.create_commit(repo, message, &tree.sha, &[]).await?;
        self.create_ref(repo, branch, &commit.sha).await?;

        Ok(commit)
    }
}

/// Path of the README placed in a bootstrapped repository
pub const README_PATH: &str = "README.md";
