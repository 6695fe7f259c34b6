//! Upload data structures
//!
//! - `branch`: Branch names, timestamped upload branches and resolved branch state
//! - `ignore`: Exclusion rules in gitignore syntax
//! - `objects`: Files, blobs, trees, commits and refs as the remote store sees them

pub mod branch;
pub mod ignore;
pub mod objects;
