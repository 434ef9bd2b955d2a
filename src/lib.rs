#![forbid(unsafe_code)]

//! Library crate backing the `sync_library` binary: mirrors a remote video
//! catalog into a symlink tree that media managers can browse.

pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod materialize;
pub mod naming;
pub mod nfo;
pub mod notify;
pub mod security;
