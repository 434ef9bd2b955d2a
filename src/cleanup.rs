#![forbid(unsafe_code)]

//! Reconciliation sweep: find artifacts whose backing video no longer
//! exists, delete them, and prune directories left without live entries.
//!
//! The scan is read-only and produces a [`ScanReport`]; the sweep consumes
//! it. Per-path failures during the sweep are logged and skipped so one
//! stubborn file never aborts the rest of the cleanup.

use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Sidecars that belong to the directory itself, never to a single video.
const PROTECTED_SIDECARS: [&str; 2] = ["tvshow.nfo", "season.nfo"];

/// Result of the read-only orphan scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Files whose backing video or symlink target is gone.
    pub orphans: Vec<PathBuf>,
    /// Directories with no subdirectories and no live symlink left.
    pub empty_dirs: Vec<PathBuf>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.empty_dirs.is_empty()
    }
}

#[derive(Debug, Default)]
struct DirState {
    has_subdir: bool,
    has_live_symlink: bool,
}

/// Counts of what the sweep actually did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub failures: usize,
}

fn has_suffix_ci(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.is_char_boundary(name.len() - suffix.len())
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Length of the per-video extra suffix (`.nfo`, `-poster.jpg` or the
/// subtitle format) when `name` carries one.
fn extra_suffix_len(name: &str, sub_format: &str) -> Option<usize> {
    for suffix in [".nfo", "-poster.jpg", sub_format] {
        if !suffix.is_empty() && has_suffix_ci(name, suffix) {
            return Some(suffix.len());
        }
    }
    None
}

/// Walks the target tree (skipping `.git`) and classifies every file.
///
/// Per-video extras are orphaned when the sibling media file derived by
/// suffix substitution does not exist; any other symlink is orphaned when
/// its target (relative links resolved against the link's directory) is
/// gone. Everything else is left alone.
pub fn scan(root: &Path, sub_format: &str) -> Result<ScanReport> {
    let mut orphans = Vec::new();
    let mut dirs: BTreeMap<PathBuf, DirState> = BTreeMap::new();
    let git_dir = root.join(".git");

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.path() != git_dir)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "skipping unreadable entry during scan");
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            dirs.entry(path.to_path_buf()).or_default();
            if path != root
                && let Some(parent) = path.parent()
            {
                dirs.entry(parent.to_path_buf()).or_default().has_subdir = true;
            }
            continue;
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        if let Some(suffix_len) = extra_suffix_len(name, sub_format) {
            if PROTECTED_SIDECARS.contains(&name) {
                continue;
            }
            let stem = &name[..name.len() - suffix_len];
            let expected_media = path.with_file_name(format!("{stem}.mp4"));
            if !expected_media.exists() {
                debug!(path = %path.display(), "extra file lost its video");
                orphans.push(path.to_path_buf());
            }
        } else if entry.file_type().is_symlink() {
            let target = match fs::read_link(path) {
                Ok(target) => target,
                Err(err) => {
                    warn!(path = %path.display(), %err, "could not read symlink");
                    continue;
                }
            };
            let resolved = if target.is_absolute() {
                target
            } else {
                path.parent().unwrap_or(root).join(target)
            };
            if resolved.exists() {
                if let Some(parent) = path.parent() {
                    dirs.entry(parent.to_path_buf()).or_default().has_live_symlink = true;
                }
            } else {
                debug!(path = %path.display(), target = %resolved.display(), "broken symlink");
                orphans.push(path.to_path_buf());
            }
        } else {
            debug!(path = %path.display(), "not a managed artifact, ignoring");
        }
    }

    let empty_dirs = dirs
        .into_iter()
        .filter(|(path, state)| path != root && !state.has_subdir && !state.has_live_symlink)
        .map(|(path, _)| path)
        .collect();

    Ok(ScanReport {
        orphans,
        empty_dirs,
    })
}

/// Deletes everything the scan flagged, then prunes channel directories left
/// without any playlist subdirectory.
///
/// Directory removal goes through `fs::remove_dir_all`, which removes a
/// symlink itself rather than following it, so a dangling link can never
/// drag the deletion outside the target tree.
pub fn sweep(root: &Path, report: &ScanReport) -> SweepStats {
    let mut stats = SweepStats::default();

    if report.orphans.is_empty() {
        info!("no broken files found");
    } else {
        info!(count = report.orphans.len(), "broken files found, cleaning up");
    }
    for path in &report.orphans {
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted broken file");
                stats.files_removed += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "could not delete broken file");
                stats.failures += 1;
            }
        }
    }

    if report.empty_dirs.is_empty() {
        info!("no empty sub-folders found");
    } else {
        info!(count = report.empty_dirs.len(), "empty sub-folders found, cleaning up");
    }
    for dir in &report.empty_dirs {
        if fs::symlink_metadata(dir).is_err() {
            continue;
        }
        match fs::remove_dir_all(dir) {
            Ok(()) => {
                info!(path = %dir.display(), "deleted empty sub-folder");
                stats.dirs_removed += 1;
            }
            Err(err) => {
                warn!(path = %dir.display(), %err, "could not delete sub-folder");
                stats.failures += 1;
            }
        }
    }

    stats.dirs_removed += prune_empty_channels(root, &mut stats.failures);
    stats
}

/// Final pass: a channel directory with zero remaining subdirectories has no
/// live seasons and gets removed wholesale.
fn prune_empty_channels(root: &Path, failures: &mut usize) -> usize {
    let mut removed = 0;
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(root = %root.display(), %err, "could not list target root");
            *failures += 1;
            return 0;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir || entry.file_name() == ".git" {
            continue;
        }

        let has_subdir = fs::read_dir(&path)
            .map(|mut children| {
                children.any(|child| {
                    child
                        .ok()
                        .and_then(|child| child.file_type().ok())
                        .is_some_and(|t| t.is_dir())
                })
            })
            .unwrap_or(true);

        if !has_subdir {
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "deleted empty channel folder");
                    removed += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "could not delete channel folder");
                    *failures += 1;
                }
            }
        }
    }
    removed
}
