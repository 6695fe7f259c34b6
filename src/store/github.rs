//! GitHub git-data REST backend.
//!
//! Talks to `/repos/{owner}/{repo}/git/*` with a bearer token. Blob content is
//! sent base64-encoded with an explicit `encoding` tag.

use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::blob::{BlobPayload, BlobRef};
use crate::artifacts::objects::commit::{BranchRef, CommitRef};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::TreeRef;
use crate::config::GitHubConfig;
use crate::errors::StoreError;
use crate::store::rate_limit::RateLimitState;
use crate::store::{ObjectStore, README_PATH, RefLookup, RepoSlug};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const ACCEPT_HEADER: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ShaOnly {
    sha: ObjectId,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    full_ref: String,
    object: ShaOnly,
}

impl TryFrom<RefResponse> for BranchRef {
    type Error = StoreError;

    fn try_from(value: RefResponse) -> Result<Self, StoreError> {
        let name = BranchName::try_parse_ref(&value.full_ref)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(BranchRef::new(name, value.object.sha))
    }
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: ObjectId,
    tree: ShaOnly,
    #[serde(default)]
    parents: Vec<ShaOnly>,
    #[serde(default)]
    message: String,
}

impl From<CommitResponse> for CommitRef {
    fn from(value: CommitResponse) -> Self {
        CommitRef::new(
            value.sha,
            value.tree.sha,
            value.parents.into_iter().map(|parent| parent.sha).collect(),
            value.message,
        )
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    commit: CommitResponse,
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    full_name: String,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'r> {
    #[serde(rename = "ref")]
    full_ref: String,
    sha: &'r ObjectId,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'r> {
    sha: &'r ObjectId,
    force: bool,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'r> {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_tree: Option<&'r ObjectId>,
    tree: &'r [BlobRef],
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'r> {
    message: &'r str,
    tree: &'r ObjectId,
    parents: &'r [ObjectId],
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'r> {
    message: &'r str,
    content: String,
    branch: &'r str,
}

#[derive(Debug, Serialize)]
struct CreateRepositoryRequest<'r> {
    name: &'r str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'r str>,
    private: bool,
    auto_init: bool,
}

/// A repository created through [`GitHubStore::create_repository`]
#[derive(Debug, Clone)]
pub struct CreatedRepository {
    pub slug: RepoSlug,
    pub html_url: String,
}

// ---------------------------------------------------------------------------
// Backend struct
// ---------------------------------------------------------------------------

pub struct GitHubStore {
    client: reqwest::Client,
    api_url: Url,
    token: String,
    throttle_buffer: u64,
    rate_limit: RateLimitState,
}

impl GitHubStore {
    pub fn new(config: &GitHubConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bitpush/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("invalid API URL: {}", config.api_url))?;
        if api_url.cannot_be_a_base() {
            anyhow::bail!("API URL cannot carry a path: {api_url}");
        }

        Ok(Self {
            client,
            api_url,
            token: config.token.clone(),
            throttle_buffer: config.throttle_buffer,
            rate_limit: RateLimitState::new(),
        })
    }

    /// `api_url` extended by `segments`, each one percent-encoded
    fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn repo_url<'s>(
        &self,
        repo: &'s RepoSlug,
        segments: impl IntoIterator<Item = &'s str>,
    ) -> Url {
        self.endpoint(["repos", repo.owner(), repo.name()].into_iter().chain(segments))
    }

    fn git_url<'s>(&self, repo: &'s RepoSlug, segments: impl IntoIterator<Item = &'s str>) -> Url {
        self.repo_url(repo, std::iter::once("git").chain(segments))
    }

    /// `git/{kind}/heads/{branch}`; slashes inside the branch stay path separators
    fn ref_url<'s>(&self, repo: &'s RepoSlug, kind: &'s str, branch: &'s BranchName) -> Url {
        self.git_url(repo, [kind, "heads"].into_iter().chain(branch.segments()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, StoreError> {
        self.rate_limit.wait_if_needed(self.throttle_buffer).await;

        let response = request
            .bearer_auth(&self.token)
            .header(ACCEPT, ACCEPT_HEADER)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await?;

        self.rate_limit.observe(response.headers());
        Ok(response)
    }

    async fn error_for(&self, response: Response, what: &str) -> StoreError {
        let status = response.status();
        let message = response
            .json::<ApiMessage>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());

        warn!(%status, what, %message, "upstream API returned non-success");
        classify(status, message, what, &self.rate_limit)
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        what: &str,
    ) -> Result<T, StoreError> {
        if !response.status().is_success() {
            return Err(self.error_for(response, what).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(format!("{what}: {e}")))
    }

    /// Create a repository owned by the authenticated user, without any commits.
    pub async fn create_repository(
        &self,
        name: &str,
        description: Option<&str>,
        private: bool,
    ) -> Result<CreatedRepository, StoreError> {
        let body = CreateRepositoryRequest {
            name,
            description,
            private,
            auto_init: false,
        };
        let request = self
            .client
            .post(self.endpoint(["user", "repos"]))
            .json(&body);

        let response = self.send(request).await?;
        let created: RepositoryResponse = self
            .read_json(response, &format!("create repository {name}"))
            .await?;
        let slug = created
            .full_name
            .parse::<RepoSlug>()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        info!(repo = %slug, "repository created");
        Ok(CreatedRepository {
            slug,
            html_url: created.html_url,
        })
    }
}

/// Map a non-success status onto the store error taxonomy.
fn classify(status: StatusCode, message: String, what: &str, rate: &RateLimitState) -> StoreError {
    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (rate.is_exhausted() || message.to_lowercase().contains("rate limit")));

    match status {
        _ if rate_limited => StoreError::RateLimited {
            reset_at: rate.reset_at(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth {
            status: status.as_u16(),
            message,
        },
        StatusCode::NOT_FOUND => StoreError::NotFound(format!("{what}: {message}")),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            StoreError::Conflict(format!("{what}: {message}"))
        }
        _ => StoreError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ObjectStore for GitHubStore {
    async fn get_ref(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
    ) -> Result<RefLookup, StoreError> {
        let url = self.ref_url(repo, "ref", branch);
        let response = self.send(self.client.get(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(RefLookup::Missing),
            // "Git Repository is empty."
            StatusCode::CONFLICT => Ok(RefLookup::EmptyRepository),
            _ => {
                let found: RefResponse = self
                    .read_json(response, &format!("read ref {branch}"))
                    .await?;
                debug!(%branch, sha = %found.object.sha, "ref resolved");
                Ok(RefLookup::Found(found.object.sha))
            }
        }
    }

    async fn create_ref(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &ObjectId,
    ) -> Result<BranchRef, StoreError> {
        let body = CreateRefRequest {
            full_ref: branch.as_full_ref(),
            sha,
        };
        let request = self.client.post(self.git_url(repo, ["refs"])).json(&body);

        let response = self.send(request).await?;
        let created: RefResponse = self
            .read_json(response, &format!("create ref {branch}"))
            .await?;

        created.try_into()
    }

    async fn update_ref(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &ObjectId,
        expected: &ObjectId,
    ) -> Result<BranchRef, StoreError> {
        // the remote has no compare-and-swap; a non-forced update only succeeds
        // when `sha` descends from the current tip, and `sha`'s parent is `expected`
        debug!(%branch, %sha, %expected, "updating ref without force");
        let body = UpdateRefRequest { sha, force: false };
        let url = self.ref_url(repo, "refs", branch);
        let request = self.client.patch(url).json(&body);

        let response = self.send(request).await?;
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let error = self.error_for(response, &format!("update ref {branch}")).await;
            return Err(match error {
                StoreError::Conflict(message) if message.contains("fast forward") => {
                    StoreError::NonFastForward {
                        branch: branch.to_string(),
                    }
                }
                other => other,
            });
        }

        let updated: RefResponse = self
            .read_json(response, &format!("update ref {branch}"))
            .await?;
        updated.try_into()
    }

    async fn get_commit(&self, repo: &RepoSlug, sha: &ObjectId) -> Result<CommitRef, StoreError> {
        let url = self.git_url(repo, ["commits", sha.as_ref()]);
        let response = self.send(self.client.get(url)).await?;
        let commit: CommitResponse = self
            .read_json(response, &format!("read commit {sha}"))
            .await?;

        Ok(commit.into())
    }

    async fn create_blob(
        &self,
        repo: &RepoSlug,
        payload: &BlobPayload,
    ) -> Result<ObjectId, StoreError> {
        let request = self.client.post(self.git_url(repo, ["blobs"])).json(payload);
        let response = self.send(request).await?;
        let created: ShaOnly = self.read_json(response, "create blob").await?;

        Ok(created.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoSlug,
        base_tree: Option<&ObjectId>,
        entries: &[BlobRef],
    ) -> Result<TreeRef, StoreError> {
        let body = CreateTreeRequest {
            base_tree,
            tree: entries,
        };
        let request = self.client.post(self.git_url(repo, ["trees"])).json(&body);
        let response = self.send(request).await?;
        let created: ShaOnly = self.read_json(response, "create tree").await?;

        Ok(TreeRef {
            sha: created.sha,
            base_tree: base_tree.cloned(),
            entries: entries.to_vec(),
        })
    }

    async fn create_commit(
        &self,
        repo: &RepoSlug,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<CommitRef, StoreError> {
        let body = CreateCommitRequest {
            message,
            tree,
            parents,
        };
        let request = self.client.post(self.git_url(repo, ["commits"])).json(&body);
        let response = self.send(request).await?;
        let created: CommitResponse = self.read_json(response, "create commit").await?;

        Ok(created.into())
    }

    /// The git-data endpoints reject writes to a repository without commits, so
    /// the first commit goes through the contents API instead.
    async fn initialize_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        readme: &str,
        message: &str,
    ) -> Result<CommitRef, StoreError> {
        let body = PutContentsRequest {
            message,
            content: BlobPayload::encode(readme.as_bytes()).content,
            branch: branch.as_ref(),
        };
        let url = self.repo_url(repo, ["contents", README_PATH]);

        let response = self.send(self.client.put(url).json(&body)).await?;
        let created: ContentsResponse = self
            .read_json(response, &format!("initialize {branch}"))
            .await?;

        info!(repo = %repo, %branch, sha = %created.commit.sha, "repository initialized");
        Ok(created.commit.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::entry_mode::FileMode;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn oid(fill: char) -> ObjectId {
        ObjectId::try_parse(fill.to_string().repeat(40)).unwrap()
    }

    fn branch(name: &str) -> BranchName {
        BranchName::try_parse(name.to_string()).unwrap()
    }

    fn store() -> GitHubStore {
        GitHubStore::new(&GitHubConfig::new(
            "https://ghe.example.com/api/v3/".to_string(),
            "t0ken".to_string(),
        ))
        .unwrap()
    }

    #[test]
    fn git_urls_are_rooted_at_the_api() {
        let repo = RepoSlug::new("octo", "hello");
        assert_eq!(
            store().ref_url(&repo, "ref", &branch("main")).as_str(),
            "https://ghe.example.com/api/v3/repos/octo/hello/git/ref/heads/main"
        );
        assert_eq!(
            store().endpoint(["user", "repos"]).as_str(),
            "https://ghe.example.com/api/v3/user/repos"
        );
    }

    #[rstest]
    #[case("fix#12", "/api/v3/repos/octo/hello/git/refs/heads/fix%2312")]
    #[case("100%", "/api/v3/repos/octo/hello/git/refs/heads/100%25")]
    #[case("feature/x", "/api/v3/repos/octo/hello/git/refs/heads/feature/x")]
    fn branch_names_are_encoded_into_the_ref_path(#[case] name: &str, #[case] path: &str) {
        let store = store();
        let repo = RepoSlug::new("octo", "hello");

        let request = store
            .client
            .patch(store.ref_url(&repo, "refs", &branch(name)))
            .build()
            .unwrap();

        assert_eq!(request.url().path(), path);
        assert_eq!(request.url().fragment(), None);
    }

    #[test]
    fn api_url_without_a_path_is_rejected() {
        let config = GitHubConfig::new("mailto:octo@example.com".to_string(), "t0ken".to_string());
        assert!(GitHubStore::new(&config).is_err());
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, "Bad credentials", crate::errors::ErrorKind::Auth)]
    #[case(StatusCode::FORBIDDEN, "Resource not accessible", crate::errors::ErrorKind::Auth)]
    #[case(StatusCode::NOT_FOUND, "Not Found", crate::errors::ErrorKind::NotFound)]
    #[case(StatusCode::UNPROCESSABLE_ENTITY, "Reference already exists", crate::errors::ErrorKind::Conflict)]
    #[case(StatusCode::BAD_GATEWAY, "Server Error", crate::errors::ErrorKind::Remote)]
    #[case(StatusCode::TOO_MANY_REQUESTS, "slow down", crate::errors::ErrorKind::Remote)]
    fn statuses_map_onto_the_taxonomy(
        #[case] status: StatusCode,
        #[case] message: &str,
        #[case] kind: crate::errors::ErrorKind,
    ) {
        let error = classify(status, message.to_string(), "op", &RateLimitState::new());
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn forbidden_with_exhausted_budget_is_rate_limited() {
        let rate = RateLimitState::new();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", "0".parse().unwrap());
        headers.insert("X-RateLimit-Reset", "1700000000".parse().unwrap());
        rate.observe(&headers);

        let error = classify(StatusCode::FORBIDDEN, "Forbidden".to_string(), "op", &rate);
        assert!(matches!(
            error,
            StoreError::RateLimited {
                reset_at: 1_700_000_000
            }
        ));
    }

    #[test]
    fn tree_request_carries_base_and_entries() {
        let base = oid('b');
        let entries = vec![BlobRef::new("a.txt".to_string(), FileMode::Regular, oid('1'))];
        let body = CreateTreeRequest {
            base_tree: Some(&base),
            tree: &entries,
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "base_tree": "b".repeat(40),
                "tree": [{"path": "a.txt", "mode": "100644", "type": "blob", "sha": "1".repeat(40)}],
            })
        );
    }

    #[test]
    fn tree_request_without_base_omits_the_field() {
        let body = CreateTreeRequest {
            base_tree: None,
            tree: &[],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"tree": []})
        );
    }

    #[test]
    fn ref_update_is_never_forced() {
        let sha = oid('c');
        let body = UpdateRefRequest {
            sha: &sha,
            force: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"sha": "c".repeat(40), "force": false})
        );
    }

    #[test]
    fn ref_response_names_the_branch() {
        let json = serde_json::json!({
            "ref": "refs/heads/build-2024-11-15-06-37",
            "node_id": "MDM6UmVm",
            "object": {"type": "commit", "sha": "d".repeat(40)},
        });

        let branch: BranchRef = serde_json::from_value::<RefResponse>(json)
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(branch.name.as_ref(), "build-2024-11-15-06-37");
        assert_eq!(branch.head, oid('d'));
    }

    #[test]
    fn commit_response_maps_parents() {
        let json = serde_json::json!({
            "sha": "a".repeat(40),
            "tree": {"sha": "b".repeat(40), "url": "https://example.com"},
            "parents": [{"sha": "c".repeat(40), "url": "https://example.com"}],
            "message": "Upload",
            "author": {"name": "x"},
        });

        let commit: CommitRef = serde_json::from_value::<CommitResponse>(json).unwrap().into();
        assert_eq!(commit.tree, oid('b'));
        assert_eq!(commit.parents, vec![oid('c')]);
        assert!(!commit.is_root());
    }
}
