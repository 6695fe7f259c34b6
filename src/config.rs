//! Upload configuration
//!
//! Everything an upload needs is passed in explicitly: the remote endpoint and
//! credential ([`GitHubConfig`]), how blobs are produced and uploaded
//! ([`UploadSettings`]) and what the new commit should update ([`PushOptions`]).

use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::ignore::DEFAULT_IGNORE_FILE;
use derive_new::new;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Environment variable holding the bearer credential
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "GITHUB_API_URL";

/// The remote refuses blobs larger than this
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Requests kept in reserve before self-throttling
pub const DEFAULT_THROTTLE_BUFFER: u64 = 50;

#[derive(Clone, new)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: String,
    #[new(value = "DEFAULT_THROTTLE_BUFFER")]
    pub throttle_buffer: u64,
}

impl GitHubConfig {
    /// Read the credential and endpoint from the environment
    pub fn from_env() -> anyhow::Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| anyhow::anyhow!("{TOKEN_ENV} must be set to a GitHub token"))?;
        let api_url =
            std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Ok(Self::new(api_url, token))
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("throttle_buffer", &self.throttle_buffer)
            .finish()
    }
}

/// What to do when some blobs of a batch cannot be created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Create nothing past the blob stage; report every failed path
    #[default]
    Abort,
    /// Commit the blobs that succeeded and report the skipped paths
    SkipFailed,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Upper bound on blob requests in flight at once
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub max_file_size: u64,
    /// Pattern file name, looked up at the upload root
    pub ignore_file: String,
    /// README content for the root commit of an empty repository
    pub bootstrap_readme: Option<String>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            ignore_file: DEFAULT_IGNORE_FILE.to_string(),
            bootstrap_readme: None,
        }
    }
}

/// Which ref the new commit lands on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMode {
    /// Advance `branch`. When it does not exist yet it is first created at
    /// the tip of `fork_from`.
    UpdateExistingBranch {
        branch: BranchName,
        fork_from: Option<BranchName>,
    },
    /// Fork a new branch off the tip of `from` and commit there, leaving
    /// `from` untouched. Without a name the branch is named after the
    /// current minute.
    CreateNewBranch {
        name: Option<BranchName>,
        from: BranchName,
    },
}

#[derive(Debug, Clone, new)]
pub struct PushOptions {
    pub mode: PushMode,
    /// Defaults to the target branch name when absent
    pub commit_message: Option<String>,
}

impl PushOptions {
    pub fn update(branch: BranchName, commit_message: impl Into<String>) -> Self {
        Self::new(
            PushMode::UpdateExistingBranch {
                branch,
                fork_from: None,
            },
            Some(commit_message.into()),
        )
    }

    pub fn new_branch(name: Option<BranchName>, from: BranchName) -> Self {
        Self::new(PushMode::CreateNewBranch { name, from }, None)
    }
}
