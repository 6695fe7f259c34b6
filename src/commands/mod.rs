//! Upload operations
//!
//! Each module adds an `impl Uploader` block:
//!
//! - `resolve`: read a branch's tip commit and tree
//! - `bootstrap`: give an empty repository its root commit
//! - `push`: upload a file set as one commit and advance a branch to it
//!
//! `resolve` and `bootstrap` supply the base state that `push` builds on.

pub mod bootstrap;
pub mod push;
pub mod resolve;
