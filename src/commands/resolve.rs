use crate::areas::uploader::Uploader;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::branch_state::BranchState;
use crate::errors::UploadError;
use crate::store::RefLookup;
use tracing::debug;

impl Uploader {
    /// Look up the tip commit and tree of `branch`.
    ///
    /// Fails with `RefNotFound` when the repository has no commits at all and
    /// with `BranchNotFound` when it has history but not this branch.
    pub async fn resolve_branch(&self, branch: &BranchName) -> Result<BranchState, UploadError> {
        let lookup = self
            .store()
            .get_ref(self.repo(), branch)
            .await
            .map_err(|source| UploadError::Lookup {
                operation: "read ref",
                target: branch.to_string(),
                source,
            })?;

        let head = match lookup {
            RefLookup::Found(head) => head,
            RefLookup::EmptyRepository => {
                return Err(UploadError::RefNotFound {
                    repo: self.repo().clone(),
                });
            }
            RefLookup::Missing => {
                return Err(UploadError::BranchNotFound {
                    repo: self.repo().clone(),
                    branch: branch.clone(),
                });
            }
        };

        let commit = self
            .store()
            .get_commit(self.repo(), &head)
            .await
            .map_err(|source| UploadError::Lookup {
                operation: "read commit",
                target: head.to_string(),
                source,
            })?;

        debug!(%branch, head = %head, tree = %commit.tree, "branch resolved");
        Ok(BranchState::at(head, commit.tree))
    }

    /// [`Uploader::resolve_branch`], reporting an absent branch as state instead of an error
    pub async fn branch_state(&self, branch: &BranchName) -> Result<BranchState, UploadError> {
        match self.resolve_branch(branch).await {
            Err(UploadError::RefNotFound { .. } | UploadError::BranchNotFound { .. }) => {
                Ok(BranchState::absent())
            }
            other => other,
        }
    }
}
