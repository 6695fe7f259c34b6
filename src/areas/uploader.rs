use crate::config::UploadSettings;
use crate::store::{ObjectStore, RepoSlug};
use std::sync::Arc;

/// One remote repository plus the store handle and settings used to upload into it.
///
/// Branch resolution, bootstrap and the batch commit are implemented on this
/// type in `commands`.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    repo: RepoSlug,
    settings: UploadSettings,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, repo: RepoSlug, settings: UploadSettings) -> Self {
        Uploader {
            store,
            repo,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn repo(&self) -> &RepoSlug {
        &self.repo
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }
}
