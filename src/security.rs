#![forbid(unsafe_code)]

//! Shared guard rails for the tubemirror binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. The sweeper deletes files
/// recursively, so running under a dedicated unprivileged user keeps a
/// misconfigured TARGET_FOLDER from doing system-wide damage.
pub fn ensure_not_root(process: &str) -> Result<()> {
    refuse_root(Uid::current(), process)
}

fn refuse_root(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}
