//! Stateful upload components
//!
//! - `uploader`: the remote repository, its store handle and the upload settings
//! - `workspace`: the local directory being uploaded

pub mod uploader;
pub mod workspace;
