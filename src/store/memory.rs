//! In-process, content-addressed object store
//!
//! Objects are hashed the way git hashes them, so identical content always
//! yields the same sha. The store holds a single repository and enforces the
//! same ordering rules as the remote: a tree may only reference blobs and base
//! trees it already holds, a commit only existing trees and parents, and a ref
//! only an existing commit.
//!
//! Every call is recorded so callers can inspect the order in which an upload
//! touched the store. Blob, tree and commit failures, blob latency and a
//! concurrent writer can be injected.

use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::blob::{Blob, BlobPayload, BlobRef};
use crate::artifacts::objects::commit::{BranchRef, Commit, CommitRef};
use crate::artifacts::objects::entry_mode::FileMode;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeRef};
use crate::errors::StoreError;
use crate::store::{ObjectStore, RefLookup, RepoSlug};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// One call made against a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetRef(String),
    CreateRef(String),
    UpdateRef(String),
    GetCommit(ObjectId),
    CreateBlob,
    CreateTree,
    CreateCommit,
}

impl StoreCall {
    pub fn is_blob(&self) -> bool {
        matches!(self, StoreCall::CreateBlob)
    }
}

#[derive(Debug, Default)]
struct State {
    blobs: HashMap<ObjectId, Bytes>,
    trees: HashMap<ObjectId, Tree>,
    commits: HashMap<ObjectId, CommitRef>,
    refs: BTreeMap<String, ObjectId>,
    calls: Vec<StoreCall>,
    failing_blobs: Vec<Bytes>,
    fail_next_tree: bool,
    fail_next_commit: bool,
    racing_branch: Option<BranchName>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    blob_latency: Option<Duration>,
    blobs_in_flight: AtomicUsize,
    max_blobs_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every blob request for `latency` before answering
    pub fn with_blob_latency(mut self, latency: Duration) -> Self {
        self.blob_latency = Some(latency);
        self
    }

    /// Reject blob creation for any content containing `needle`
    pub fn fail_blobs_containing(&self, needle: impl Into<Bytes>) {
        self.state().failing_blobs.push(needle.into());
    }

    /// Reject the next tree creation
    pub fn fail_next_tree(&self) {
        self.state().fail_next_tree = true;
    }

    /// Reject the next commit creation
    pub fn fail_next_commit(&self) {
        self.state().fail_next_commit = true;
    }

    /// Let another writer advance `branch` right before the next update of it
    pub fn race_next_update(&self, branch: BranchName) {
        self.state().racing_branch = Some(branch);
    }

    /// Commit `files` on top of the current tip of `branch` (or as a root
    /// commit) and move the branch there, bypassing the call log.
    pub fn seed_branch(
        &self,
        branch: &BranchName,
        files: &[(&str, &[u8])],
        message: &str,
    ) -> Result<CommitRef, StoreError> {
        let mut state = self.state();

        let entries = files
            .iter()
            .map(|(path, content)| {
                let sha = state.insert_blob(Bytes::copy_from_slice(content))?;
                Ok(BlobRef::new(path.to_string(), FileMode::Regular, sha))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let parents = state.refs.get(branch.as_ref()).cloned().into_iter().collect::<Vec<_>>();
        let base = match parents.first() {
            Some(parent) => Some(state.lookup_commit(parent)?.tree),
            None => None,
        };
        let tree = state.insert_tree(base.as_ref(), &entries)?;
        let commit = state.insert_commit(message, &tree, &parents)?;
        state.refs.insert(branch.to_string(), commit.sha.clone());

        Ok(commit)
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn branch_head(&self, branch: &BranchName) -> Option<ObjectId> {
        self.state().refs.get(branch.as_ref()).cloned()
    }

    pub fn branches(&self) -> Vec<String> {
        self.state().refs.keys().cloned().collect()
    }

    pub fn commit(&self, sha: &ObjectId) -> Option<CommitRef> {
        self.state().commits.get(sha).cloned()
    }

    pub fn tree(&self, sha: &ObjectId) -> Option<Tree> {
        self.state().trees.get(sha).cloned()
    }

    pub fn blob(&self, sha: &ObjectId) -> Option<Bytes> {
        self.state().blobs.get(sha).cloned()
    }

    pub fn blob_count(&self) -> usize {
        self.state().blobs.len()
    }

    /// Highest number of blob requests observed in flight at once
    pub fn max_concurrent_blobs(&self) -> usize {
        self.max_blobs_in_flight.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: StoreCall) -> MutexGuard<'_, State> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }

    async fn simulate_blob_latency(&self) {
        let in_flight = self.blobs_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_blobs_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(latency) = self.blob_latency {
            tokio::time::sleep(latency).await;
        }

        self.blobs_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Remote {
        status: 502,
        message: format!("injected {what} failure"),
    }
}

fn hashing(error: anyhow::Error) -> StoreError {
    StoreError::Remote {
        status: 500,
        message: error.to_string(),
    }
}

impl State {
    fn insert_blob(&mut self, content: Bytes) -> Result<ObjectId, StoreError> {
        let sha = Blob::new(content.clone()).object_id().map_err(hashing)?;
        self.blobs.entry(sha.clone()).or_insert(content);
        Ok(sha)
    }

    fn insert_tree(
        &mut self,
        base_tree: Option<&ObjectId>,
        entries: &[BlobRef],
    ) -> Result<ObjectId, StoreError> {
        let base = match base_tree {
            Some(sha) => Some(
                self.trees
                    .get(sha)
                    .ok_or_else(|| StoreError::NotFound(format!("base tree {sha}")))?,
            ),
            None => None,
        };

        if let Some(missing) = entries.iter().find(|entry| !self.blobs.contains_key(&entry.sha)) {
            return Err(StoreError::NotFound(format!(
                "blob {} for {}",
                missing.sha, missing.path
            )));
        }

        let tree = Tree::build(base, entries);
        let sha = tree.object_id().map_err(hashing)?;
        self.trees.entry(sha.clone()).or_insert(tree);
        Ok(sha)
    }

    fn insert_commit(
        &mut self,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<CommitRef, StoreError> {
        if !self.trees.contains_key(tree) {
            return Err(StoreError::NotFound(format!("tree {tree}")));
        }
        if let Some(missing) = parents.iter().find(|parent| !self.commits.contains_key(*parent)) {
            return Err(StoreError::NotFound(format!("parent commit {missing}")));
        }

        let sha = Commit::new(tree, parents, message)
            .object_id()
            .map_err(hashing)?;
        let commit = CommitRef::new(sha.clone(), tree.clone(), parents.to_vec(), message.to_string());
        self.commits.insert(sha, commit.clone());
        Ok(commit)
    }

    fn lookup_commit(&self, sha: &ObjectId) -> Result<CommitRef, StoreError> {
        self.commits
            .get(sha)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("commit {sha}")))
    }

    /// Another writer's commit: same tree, one more link in the history
    fn advance_concurrently(&mut self, branch: &BranchName) -> Result<(), StoreError> {
        let Some(head) = self.refs.get(branch.as_ref()).cloned() else {
            return Ok(());
        };
        let tree = self.lookup_commit(&head)?.tree;
        let commit = self.insert_commit("Concurrent update", &tree, &[head])?;

        debug!(%branch, sha = %commit.sha, "concurrent writer moved branch");
        self.refs.insert(branch.to_string(), commit.sha);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_ref(
        &self,
        _repo: &RepoSlug,
        branch: &BranchName,
    ) -> Result<RefLookup, StoreError> {
        let state = self.record(StoreCall::GetRef(branch.to_string()));

        Ok(match state.refs.get(branch.as_ref()) {
            Some(sha) => RefLookup::Found(sha.clone()),
            None if state.refs.is_empty() => RefLookup::EmptyRepository,
            None => RefLookup::Missing,
        })
    }

    async fn create_ref(
        &self,
        _repo: &RepoSlug,
        branch: &BranchName,
        sha: &ObjectId,
    ) -> Result<BranchRef, StoreError> {
        let mut state = self.record(StoreCall::CreateRef(branch.to_string()));

        if state.refs.contains_key(branch.as_ref()) {
            return Err(StoreError::Conflict(format!(
                "create ref {branch}: Reference already exists"
            )));
        }
        state.lookup_commit(sha)?;
        state.refs.insert(branch.to_string(), sha.clone());

        debug!(%branch, %sha, "ref created");
        Ok(BranchRef::new(branch.clone(), sha.clone()))
    }

    async fn update_ref(
        &self,
        _repo: &RepoSlug,
        branch: &BranchName,
        sha: &ObjectId,
        expected: &ObjectId,
    ) -> Result<BranchRef, StoreError> {
        let mut state = self.record(StoreCall::UpdateRef(branch.to_string()));

        if state.racing_branch.as_ref() == Some(branch) {
            state.racing_branch = None;
            state.advance_concurrently(branch)?;
        }

        let current = state
            .refs
            .get(branch.as_ref())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ref {branch}")))?;
        if &current != expected {
            return Err(StoreError::NonFastForward {
                branch: branch.to_string(),
            });
        }
        state.lookup_commit(sha)?;
        state.refs.insert(branch.to_string(), sha.clone());

        debug!(%branch, from = %expected, to = %sha, "ref updated");
        Ok(BranchRef::new(branch.clone(), sha.clone()))
    }

    async fn get_commit(&self, _repo: &RepoSlug, sha: &ObjectId) -> Result<CommitRef, StoreError> {
        self.record(StoreCall::GetCommit(sha.clone())).lookup_commit(sha)
    }

    async fn create_blob(
        &self,
        _repo: &RepoSlug,
        payload: &BlobPayload,
    ) -> Result<ObjectId, StoreError> {
        drop(self.record(StoreCall::CreateBlob));
        self.simulate_blob_latency().await;

        let content = payload
            .decode()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut state = self.state();
        let rejected = state.failing_blobs.iter().any(|needle| {
            !needle.is_empty() && content.windows(needle.len()).any(|w| w == &needle[..])
        });
        if rejected {
            return Err(injected("blob"));
        }

        state.insert_blob(content)
    }

    async fn create_tree(
        &self,
        _repo: &RepoSlug,
        base_tree: Option<&ObjectId>,
        entries: &[BlobRef],
    ) -> Result<TreeRef, StoreError> {
        let mut state = self.record(StoreCall::CreateTree);
        if std::mem::take(&mut state.fail_next_tree) {
            return Err(injected("tree"));
        }
        let sha = state.insert_tree(base_tree, entries)?;

        Ok(TreeRef {
            sha,
            base_tree: base_tree.cloned(),
            entries: entries.to_vec(),
        })
    }

    async fn create_commit(
        &self,
        _repo: &RepoSlug,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<CommitRef, StoreError> {
        let mut state = self.record(StoreCall::CreateCommit);
        if std::mem::take(&mut state.fail_next_commit) {
            return Err(injected("commit"));
        }
        state.insert_commit(message, tree, parents)
    }
}
