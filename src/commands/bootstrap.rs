use crate::areas::uploader::Uploader;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::commit::CommitRef;
use crate::errors::UploadError;
use crate::store::RepoSlug;
use tracing::info;

pub const BOOTSTRAP_MESSAGE: &str = "Initial commit";

/// README placed in the root commit of an empty repository
pub fn default_readme(repo: &RepoSlug) -> String {
    format!("# {}\n\nRepository initialized by bitpush.\n", repo.name())
}

impl Uploader {
    /// Give an empty repository a parentless root commit and point `branch` at it.
    pub async fn bootstrap(&self, branch: &BranchName) -> Result<CommitRef, UploadError> {
        let readme = self
            .settings()
            .bootstrap_readme
            .clone()
            .unwrap_or_else(|| default_readme(self.repo()));

        info!(repo = %self.repo(), %branch, "repository is empty, creating root commit");
        let commit = self
            .store()
            .initialize_branch(self.repo(), branch, &readme, BOOTSTRAP_MESSAGE)
            .await
            .map_err(|source| UploadError::Bootstrap {
                branch: branch.clone(),
                source,
            })?;

        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadSettings;
    use crate::store::README_PATH;
    use crate::store::memory::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn root_commit_has_no_parents_and_holds_the_readme() {
        let store = Arc::new(MemoryStore::new());
        let repo = RepoSlug::new("octo", "hello");
        let uploader = Uploader::new(store.clone(), repo.clone(), UploadSettings::default());
        let main = BranchName::try_parse("main".to_string()).unwrap();

        let root = uploader.bootstrap(&main).await.unwrap();

        assert!(root.is_root());
        assert_eq!(store.branch_head(&main), Some(root.sha.clone()));
        let tree = store.tree(&root.tree).unwrap();
        let readme = tree.get(README_PATH).unwrap();
        assert_eq!(
            store.blob(&readme.sha).unwrap().as_ref(),
            default_readme(&repo).as_bytes()
        );
    }
}
