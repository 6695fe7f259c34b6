//! Upload a local directory to a remote git object store as one atomic commit.
//!
//! - `areas`: the local workspace and the remote uploader
//! - `artifacts`: files, objects, branch names and ignore rules
//! - `commands`: branch resolution, bootstrap and the batch commit
//! - `store`: the object store capability and its implementations

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod config;
pub mod errors;
pub mod store;
