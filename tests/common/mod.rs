#![allow(dead_code)]

pub mod file;

use bitpush::areas::uploader::Uploader;
use bitpush::artifacts::branch::branch_name::BranchName;
use bitpush::config::UploadSettings;
use bitpush::store::RepoSlug;
use bitpush::store::memory::MemoryStore;
use std::sync::Arc;

pub fn branch(name: &str) -> BranchName {
    BranchName::try_parse(name.to_string()).expect("valid branch name")
}

pub fn repo() -> RepoSlug {
    RepoSlug::new("octo", "hello-world")
}

pub fn uploader(store: &Arc<MemoryStore>) -> Uploader {
    uploader_with(store, UploadSettings::default())
}

pub fn uploader_with(store: &Arc<MemoryStore>, settings: UploadSettings) -> Uploader {
    Uploader::new(store.clone(), repo(), settings)
}

/// A store whose `main` holds `files` in a single root commit
pub fn seeded_store(files: &[(&str, &[u8])]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .seed_branch(&branch("main"), files, "Initial commit")
        .expect("seed main");
    store
}

/// Sorted paths of the tree `branch` points at
pub fn tree_paths(store: &MemoryStore, branch_name: &str) -> Vec<String> {
    let head = store
        .branch_head(&branch(branch_name))
        .expect("branch exists");
    let commit = store.commit(&head).expect("head commit exists");
    let tree = store.tree(&commit.tree).expect("tree exists");

    tree.paths().map(str::to_string).collect()
}
