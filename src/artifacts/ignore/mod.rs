//! Exclusion rules in gitignore syntax
//!
//! - `pattern`: a single compiled rule (glob translated to an anchored regex)
//! - `ignore_spec`: the ordered rule list and the per-path decision

pub mod ignore_spec;
pub mod pattern;

/// Name of the pattern file looked up at the upload root
pub const DEFAULT_IGNORE_FILE: &str = ".gitignore";
