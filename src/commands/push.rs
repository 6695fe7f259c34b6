use crate::areas::uploader::Uploader;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::branch_state::BranchState;
use crate::artifacts::objects::blob::{BlobPayload, BlobRef};
use crate::artifacts::objects::commit::CommitRef;
use crate::artifacts::objects::file_entry::FileEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::config::{FailurePolicy, PushMode, PushOptions};
use crate::errors::{BlobFailure, StoreError, UploadError};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Result of one batch commit
#[derive(Debug)]
pub struct PushOutcome {
    /// Branch now pointing at `commit`
    pub branch: BranchName,
    pub commit: CommitRef,
    pub tree: ObjectId,
    /// Blobs placed in the new tree
    pub uploaded: usize,
    /// Files left out under [`FailurePolicy::SkipFailed`]
    pub skipped: Vec<BlobFailure>,
    pub created_branch: bool,
    pub bootstrapped: bool,
}

/// The commit a batch builds on
struct Tip {
    commit: ObjectId,
    tree: ObjectId,
}

impl Uploader {
    /// Upload `files` as one commit on top of the target branch and move the
    /// branch to it.
    ///
    /// Blobs are created concurrently (bounded by the configured concurrency);
    /// the tree, the commit and the ref update follow strictly in that order,
    /// and only once every blob has settled. The ref is never touched when an
    /// earlier stage fails.
    pub async fn push(
        &self,
        files: Vec<FileEntry>,
        options: &PushOptions,
    ) -> Result<PushOutcome, UploadError> {
        let mut bootstrapped = false;
        let mut created_branch = false;

        // the branch to advance and the commit it builds on
        let (target, tip) = match &options.mode {
            PushMode::UpdateExistingBranch { branch, fork_from } => {
                let tip = match (self.resolve_branch(branch).await, fork_from) {
                    (Ok(state), _) => Self::tip_of(state, branch)?,
                    (Err(UploadError::RefNotFound { .. }), _) => {
                        bootstrapped = true;
                        self.bootstrap_tip(branch).await?
                    }
                    (Err(UploadError::BranchNotFound { .. }), Some(from)) => {
                        let tip = Self::tip_of(self.resolve_branch(from).await?, from)?;
                        self.create_branch(branch, &tip.commit).await?;
                        created_branch = true;
                        tip
                    }
                    (Err(error), _) => return Err(error),
                };
                (branch.clone(), tip)
            }
            PushMode::CreateNewBranch { name, from } => {
                let tip = match self.resolve_branch(from).await {
                    Ok(state) => Self::tip_of(state, from)?,
                    Err(UploadError::RefNotFound { .. }) => {
                        bootstrapped = true;
                        self.bootstrap_tip(from).await?
                    }
                    Err(error) => return Err(error),
                };
                let name = name.clone().unwrap_or_else(BranchName::timestamped_now);
                self.create_branch(&name, &tip.commit).await?;
                created_branch = true;
                (name, tip)
            }
        };

        let message = options
            .commit_message
            .clone()
            .unwrap_or_else(|| target.to_string());

        let (mut entries, skipped) = self.upload_blobs(files).await?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        info!(base = %tip.tree, entries = entries.len(), "creating tree");
        let tree = self
            .store()
            .create_tree(self.repo(), Some(&tip.tree), &entries)
            .await
            .map_err(|source| UploadError::TreeCreationFailed {
                base: Some(tip.tree.clone()),
                source,
            })?;

        info!(tree = %tree.sha, parent = %tip.commit, "creating commit");
        let commit = self
            .store()
            .create_commit(
                self.repo(),
                &message,
                &tree.sha,
                std::slice::from_ref(&tip.commit),
            )
            .await
            .map_err(|source| UploadError::CommitCreationFailed {
                tree: tree.sha.clone(),
                source,
            })?;

        info!(branch = %target, from = %tip.commit, to = %commit.sha, "updating ref");
        self.store()
            .update_ref(self.repo(), &target, &commit.sha, &tip.commit)
            .await
            .map_err(|source| UploadError::RefUpdateFailed {
                branch: target.clone(),
                commit: commit.sha.clone(),
                source,
            })?;

        Ok(PushOutcome {
            branch: target,
            tree: tree.sha,
            commit,
            uploaded: entries.len(),
            skipped,
            created_branch,
            bootstrapped,
        })
    }

    fn tip_of(state: BranchState, branch: &BranchName) -> Result<Tip, UploadError> {
        match (state.head_commit, state.head_tree) {
            (Some(commit), Some(tree)) => Ok(Tip { commit, tree }),
            _ => Err(UploadError::Lookup {
                operation: "resolve tip of",
                target: branch.to_string(),
                source: StoreError::NotFound(format!("branch {branch} has no head")),
            }),
        }
    }

    async fn bootstrap_tip(&self, branch: &BranchName) -> Result<Tip, UploadError> {
        let root = self.bootstrap(branch).await?;
        Ok(Tip {
            commit: root.sha,
            tree: root.tree,
        })
    }

    async fn create_branch(&self, branch: &BranchName, at: &ObjectId) -> Result<(), UploadError> {
        info!(%branch, %at, "creating branch");
        self.store()
            .create_ref(self.repo(), branch, at)
            .await
            .map_err(|source| UploadError::RefCreationFailed {
                branch: branch.clone(),
                sha: at.clone(),
                source,
            })?;

        Ok(())
    }

    /// Create every blob, at most `concurrency` at a time, and wait for all of
    /// them before deciding what to do with failures.
    async fn upload_blobs(
        &self,
        files: Vec<FileEntry>,
    ) -> Result<(Vec<BlobRef>, Vec<BlobFailure>), UploadError> {
        let total = files.len();
        let concurrency = self.settings().concurrency.clamp(1, Semaphore::MAX_PERMITS);
        info!(repo = %self.repo(), files = total, concurrency, "creating blobs");

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();

        for file in files {
            let store = Arc::clone(self.store());
            let repo = self.repo().clone();
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let (path, content, mode) = file.into_parts();
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        debug!(%path, size = content.len(), "creating blob");
                        store
                            .create_blob(&repo, &BlobPayload::encode(&content))
                            .await
                    }
                    Err(_) => Err(StoreError::Cancelled),
                };
                (path, mode, result)
            });
        }

        let mut entries = Vec::with_capacity(total);
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let (path, mode, result) = joined?;
            match result {
                Ok(sha) => entries.push(BlobRef::new(path, mode, sha)),
                Err(error) => {
                    warn!(%path, %error, "blob creation failed");
                    failures.push(BlobFailure { path, error });
                }
            }
        }

        if failures.is_empty() {
            return Ok((entries, failures));
        }

        failures.sort_by(|a, b| a.path.cmp(&b.path));
        match self.settings().failure_policy {
            FailurePolicy::SkipFailed if !entries.is_empty() => {
                warn!(
                    skipped = failures.len(),
                    uploaded = entries.len(),
                    "committing without the failed files"
                );
                Ok((entries, failures))
            }
            _ => Err(UploadError::PartialBatchFailure { failures, total }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadSettings;
    use crate::store::RepoSlug;
    use crate::store::memory::{MemoryStore, StoreCall};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    fn branch(name: &str) -> BranchName {
        BranchName::try_parse(name.to_string()).unwrap()
    }

    #[fixture]
    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .seed_branch(&branch("main"), &[("x.txt", b"x"), ("y.txt", b"old")], "init")
            .unwrap();
        store
    }

    fn uploader(store: &Arc<MemoryStore>) -> Uploader {
        Uploader::new(
            store.clone(),
            RepoSlug::new("octo", "hello"),
            UploadSettings::default(),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn stages_run_in_order_after_every_blob(store: Arc<MemoryStore>) {
        let files = vec![
            FileEntry::regular("y.txt", "new"),
            FileEntry::regular("z.txt", "z"),
        ];

        uploader(&store)
            .push(files, &PushOptions::update(branch("main"), "Upload"))
            .await
            .unwrap();

        let calls = store.calls();
        let last_blob = calls.iter().rposition(StoreCall::is_blob).unwrap();
        let tail = calls[last_blob + 1..].to_vec();
        assert_eq!(
            tail,
            vec![
                StoreCall::CreateTree,
                StoreCall::CreateCommit,
                StoreCall::UpdateRef("main".to_string()),
            ]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn unmentioned_base_files_are_inherited(store: Arc<MemoryStore>) {
        let base_tree = store
            .tree(&store.commit(&store.branch_head(&branch("main")).unwrap()).unwrap().tree)
            .unwrap();

        let outcome = uploader(&store)
            .push(
                vec![FileEntry::regular("y.txt", "new")],
                &PushOptions::update(branch("main"), "Upload"),
            )
            .await
            .unwrap();

        let tree = store.tree(&outcome.tree).unwrap();
        assert_eq!(tree.get("x.txt"), base_tree.get("x.txt"));
        assert_ne!(tree.get("y.txt").unwrap().sha, base_tree.get("y.txt").unwrap().sha);
        assert_eq!(outcome.commit.message, "Upload");
    }

    #[rstest]
    #[tokio::test]
    async fn message_defaults_to_branch_name(store: Arc<MemoryStore>) {
        let options = PushOptions::new(
            PushMode::UpdateExistingBranch {
                branch: branch("main"),
                fork_from: None,
            },
            None,
        );

        let outcome = uploader(&store)
            .push(vec![FileEntry::regular("a", "a")], &options)
            .await
            .unwrap();
        assert_eq!(outcome.commit.message, "main");
    }

    #[rstest]
    #[tokio::test]
    async fn missing_branch_forks_from_another(store: Arc<MemoryStore>) {
        let main_tip = store.branch_head(&branch("main")).unwrap();
        let options = PushOptions::new(
            PushMode::UpdateExistingBranch {
                branch: branch("staging"),
                fork_from: Some(branch("main")),
            },
            Some("Upload".to_string()),
        );

        let outcome = uploader(&store)
            .push(vec![FileEntry::regular("a", "a")], &options)
            .await
            .unwrap();

        assert!(outcome.created_branch);
        assert_eq!(outcome.commit.parents, vec![main_tip.clone()]);
        assert_eq!(store.branch_head(&branch("main")), Some(main_tip));
    }

    #[rstest]
    #[tokio::test]
    async fn missing_branch_without_fork_point_fails(store: Arc<MemoryStore>) {
        let error = uploader(&store)
            .push(
                vec![FileEntry::regular("a", "a")],
                &PushOptions::update(branch("staging"), "Upload"),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, UploadError::BranchNotFound { .. }));
        assert!(!store.calls().iter().any(StoreCall::is_blob));
    }

    #[rstest]
    #[case(0)]
    #[case(usize::MAX)]
    #[tokio::test]
    async fn out_of_range_concurrency_is_clamped(
        store: Arc<MemoryStore>,
        #[case] concurrency: usize,
    ) {
        let uploader = Uploader::new(
            store.clone(),
            RepoSlug::new("octo", "hello"),
            UploadSettings {
                concurrency,
                ..UploadSettings::default()
            },
        );

        let outcome = uploader
            .push(
                vec![FileEntry::regular("a", "a"), FileEntry::regular("b", "b")],
                &PushOptions::update(branch("main"), "Upload"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.uploaded, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn skip_failed_never_commits_an_empty_subset(store: Arc<MemoryStore>) {
        store.fail_blobs_containing("bad");
        let uploader = Uploader::new(
            store.clone(),
            RepoSlug::new("octo", "hello"),
            UploadSettings {
                failure_policy: FailurePolicy::SkipFailed,
                ..UploadSettings::default()
            },
        );

        let error = uploader
            .push(
                vec![FileEntry::regular("a", "bad")],
                &PushOptions::update(branch("main"), "Upload"),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, UploadError::PartialBatchFailure { total: 1, .. }));
    }
}
