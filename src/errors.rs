//! Error types for bitpush
//!
//! [`StoreError`] describes one failed call against the remote store;
//! [`UploadError`] describes which stage of an upload failed and carries the
//! path, branch or sha needed to retry it.

use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::store::RepoSlug;
use std::path::PathBuf;
use thiserror::Error;

/// Failure classes shared by every error in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local file system
    Io,
    /// Credential rejected
    Auth,
    /// Ref, branch or repository absent
    NotFound,
    /// Non-fast-forward update or ref already exists
    Conflict,
    /// Any other remote failure
    Remote,
    /// One or more blob creations failed
    PartialBatch,
}

/// A failed remote store call
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("update of {branch} is not a fast-forward")]
    NonFastForward { branch: String },

    #[error("rate limit exhausted until {reset_at}")]
    RateLimited { reset_at: u64 },

    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Auth { .. } => ErrorKind::Auth,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) | StoreError::NonFastForward { .. } => ErrorKind::Conflict,
            StoreError::RateLimited { .. }
            | StoreError::Remote { .. }
            | StoreError::Transport(_)
            | StoreError::Decode(_)
            | StoreError::Cancelled => ErrorKind::Remote,
        }
    }
}

/// One blob that could not be created
#[derive(Debug)]
pub struct BlobFailure {
    pub path: String,
    pub error: StoreError,
}

impl std::fmt::Display for BlobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.error)
    }
}

/// A failed upload stage
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is {size} bytes, above the {limit} byte blob limit")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("failed to load ignore rules: {0}")]
    IgnoreRules(#[source] anyhow::Error),

    #[error("repository {repo} has no commits")]
    RefNotFound { repo: RepoSlug },

    #[error("branch {branch} not found in {repo}")]
    BranchNotFound { repo: RepoSlug, branch: BranchName },

    #[error("failed to {operation} {target}: {source}")]
    Lookup {
        operation: &'static str,
        target: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to bootstrap {branch}: {source}")]
    Bootstrap {
        branch: BranchName,
        #[source]
        source: StoreError,
    },

    #[error("{} of {total} blobs failed: {}", .failures.len(), format_failures(.failures))]
    PartialBatchFailure {
        failures: Vec<BlobFailure>,
        total: usize,
    },

    #[error("failed to create tree on base {}: {source}", display_base(.base))]
    TreeCreationFailed {
        base: Option<ObjectId>,
        #[source]
        source: StoreError,
    },

    #[error("failed to create commit for tree {tree}: {source}")]
    CommitCreationFailed {
        tree: ObjectId,
        #[source]
        source: StoreError,
    },

    #[error("failed to create branch {branch} at {sha}: {source}")]
    RefCreationFailed {
        branch: BranchName,
        sha: ObjectId,
        #[source]
        source: StoreError,
    },

    #[error("failed to move {branch} to {commit}: {source}")]
    RefUpdateFailed {
        branch: BranchName,
        commit: ObjectId,
        #[source]
        source: StoreError,
    },

    #[error("blob upload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Io { .. } | UploadError::FileTooLarge { .. } => ErrorKind::Io,
            UploadError::IgnoreRules(_) => ErrorKind::Io,
            UploadError::RefNotFound { .. } | UploadError::BranchNotFound { .. } => {
                ErrorKind::NotFound
            }
            UploadError::PartialBatchFailure { .. } => ErrorKind::PartialBatch,
            UploadError::Lookup { source, .. }
            | UploadError::Bootstrap { source, .. }
            | UploadError::TreeCreationFailed { source, .. }
            | UploadError::CommitCreationFailed { source, .. }
            | UploadError::RefCreationFailed { source, .. }
            | UploadError::RefUpdateFailed { source, .. } => source.kind(),
            UploadError::Task(_) => ErrorKind::Remote,
        }
    }

    /// Paths whose blobs failed, empty for every other stage
    pub fn failed_paths(&self) -> Vec<&str> {
        match self {
            UploadError::PartialBatchFailure { failures, .. } => {
                failures.iter().map(|failure| failure.path.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn format_failures(failures: &[BlobFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn display_base(base: &Option<ObjectId>) -> String {
    base.as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "(none)".to_string())
}
