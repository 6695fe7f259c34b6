//! Remote object types
//!
//! The remote store holds three kinds of content-addressed objects plus refs:
//!
//! - **Blob**: File content (raw bytes)
//! - **Tree**: Path layout (paths, modes, and blob IDs)
//! - **Commit**: Snapshot (tree, parent commits, message)
//! - **Branch ref**: Mutable pointer to a commit

pub mod blob;
pub mod commit;
pub mod entry_mode;
pub mod file_entry;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tree;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;
