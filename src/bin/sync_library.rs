#![forbid(unsafe_code)]

//! One-shot reconciliation run: fetch the catalog, materialize anything new
//! under the target tree, then (optionally) sweep artifacts whose backing
//! videos disappeared upstream. Designed to run repeatedly from cron; every
//! step is idempotent and keyed off filesystem presence, so an interrupted
//! run is simply resumed by the next one.

use anyhow::{Context, Result, bail};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, error, info, warn};
use tubemirror::catalog::{CatalogClient, Channel, Playlist, Video};
use tubemirror::cleanup;
use tubemirror::config::{Overrides, Settings, load_settings};
use tubemirror::materialize::{Materialized, Materializer, Season};
use tubemirror::notify::Notifier;
use tubemirror::security::ensure_not_root;

#[derive(Debug, Clone)]
struct SyncArgs {
    overrides: Overrides,
}

impl SyncArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut overrides = Overrides::default();
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--env-file=") {
                overrides.env_path = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--target-folder=") {
                overrides.target_folder = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--media-folder=") {
                overrides.media_folder = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--env-file" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--env-file requires a value"))?;
                    overrides.env_path = Some(PathBuf::from(value));
                }
                "--target-folder" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--target-folder requires a value"))?;
                    overrides.target_folder = Some(PathBuf::from(value));
                }
                "--media-folder" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--media-folder requires a value"))?;
                    overrides.media_folder = Some(PathBuf::from(value));
                }
                _ => {
                    bail!(
                        "unknown argument: {arg}\nUsage: sync_library [--env-file <path>] [--target-folder <path>] [--media-folder <path>]"
                    );
                }
            }
        }

        Ok(Self { overrides })
    }
}

/// Counters for the end-of-run summary.
#[derive(Debug, Default, PartialEq, Eq)]
struct RunReport {
    channels: usize,
    new_videos: usize,
    migrated: usize,
    skipped: usize,
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    ensure_not_root("sync_library")?;

    let SyncArgs { overrides } = SyncArgs::parse()?;
    let settings = load_settings(overrides)?;

    fs::create_dir_all(&settings.target_folder).with_context(|| {
        format!(
            "creating target folder {}",
            settings.target_folder.display()
        )
    })?;

    let client = CatalogClient::new(&settings);

    info!("fetching all playlists and channels");
    let playlists = client.list_playlists().context("fetching playlists")?;
    let channels = client.list_channels().context("fetching channels")?;
    ensure_snapshot_nonempty(&channels, &playlists)?;
    info!(
        channels = channels.len(),
        playlists = playlists.len(),
        "catalog snapshot fetched, processing"
    );

    let notifier = Notifier::from_settings(&settings);
    let report = reconcile(
        &settings,
        &channels,
        &playlists,
        |channel_id| client.channel_videos(channel_id),
        |youtube_id| client.video(youtube_id),
        |video| {
            if let Some(notifier) = &notifier {
                notifier.notify_new_video(video);
            }
        },
    )?;
    info!(
        channels = report.channels,
        new_videos = report.new_videos,
        migrated = report.migrated,
        skipped = report.skipped,
        "reconciliation complete"
    );

    if settings.cleanup_deleted_videos {
        info!("checking for broken symlinks and hanging extra files");
        let scan = cleanup::scan(&settings.target_folder, &settings.sub_format)?;
        let stats = cleanup::sweep(&settings.target_folder, &scan);
        info!(
            files_removed = stats.files_removed,
            dirs_removed = stats.dirs_removed,
            failures = stats.failures,
            "cleanup complete"
        );
    }

    if let Some(command) = &settings.postprocess_command {
        run_postprocess(command);
    }

    Ok(())
}

/// An empty snapshot means a misconfigured server or token, never a valid
/// library; bail before touching the tree rather than produce an empty one.
fn ensure_snapshot_nonempty(channels: &[Channel], playlists: &[Playlist]) -> Result<()> {
    if playlists.is_empty() {
        bail!("catalog returned no playlists, nothing to reconcile");
    }
    if channels.is_empty() {
        bail!("catalog returned no channels, nothing to reconcile");
    }
    Ok(())
}

/// Drives the materializer over one catalog snapshot.
///
/// Catalog access is injected so tests can feed an in-memory snapshot:
/// `channel_videos` lists a channel's videos, `lookup_video` resolves a
/// playlist entry, `on_new_video` fires once per first-time materialization.
/// Fetch failures abort the run (a partial catalog must never drive the
/// sweep); per-entity filesystem failures are logged and skipped.
fn reconcile(
    settings: &Settings,
    channels: &[Channel],
    playlists: &[Playlist],
    mut channel_videos: impl FnMut(&str) -> Result<Vec<Video>>,
    mut lookup_video: impl FnMut(&str) -> Result<Option<Video>>,
    mut on_new_video: impl FnMut(&Video),
) -> Result<RunReport> {
    let materializer = Materializer::new(settings);
    let mut report = RunReport::default();

    for channel in channels {
        let name = channel.display_name();
        info!(channel = name, "processing channel");

        let (channel_dir, _) = match materializer.ensure_channel(channel) {
            Ok(result) => result,
            Err(err) => {
                error!(channel = name, %err, "skipping channel");
                report.skipped += 1;
                continue;
            }
        };
        report.channels += 1;

        // Season 1 collects the channel's videos without playlist membership.
        let unassigned = Season::unassigned(channel);
        match materializer.ensure_playlist(&channel_dir, &unassigned) {
            Ok((videos_dir, _)) => {
                let videos = channel_videos(&channel.channel_id)
                    .with_context(|| format!("fetching videos for channel {name}"))?;
                let mut episode = 0;
                for video in &videos {
                    if !video.playlist.is_empty() {
                        match materializer.remove_stale_unassigned(&videos_dir, video) {
                            Ok(true) => report.migrated += 1,
                            Ok(false) => {}
                            Err(err) => {
                                warn!(youtube_id = %video.youtube_id, %err, "could not migrate video")
                            }
                        }
                        continue;
                    }

                    episode += 1;
                    match materializer.materialize_video(&videos_dir, video, episode, unassigned.number)
                    {
                        Ok(Materialized::Created) => {
                            report.new_videos += 1;
                            on_new_video(video);
                        }
                        Ok(Materialized::AlreadyPresent) => {
                            if settings.quick {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(youtube_id = %video.youtube_id, %err, "skipping video");
                            report.skipped += 1;
                        }
                    }
                }
                debug!(
                    channel = name,
                    unassigned = episode,
                    total = videos.len(),
                    "videos not assigned to playlists"
                );
            }
            Err(err) => {
                warn!(channel = name, %err, "skipping unassigned season");
                report.skipped += 1;
            }
        }

        // Every real playlist of this channel becomes season 2, 3, ... in
        // catalog iteration order.
        let mut season_number = 1;
        for playlist in playlists
            .iter()
            .filter(|playlist| playlist.playlist_channel_id == channel.channel_id)
        {
            season_number += 1;
            let season = Season::from_playlist(playlist, season_number);
            let (season_dir, _) = match materializer.ensure_playlist(&channel_dir, &season) {
                Ok(result) => result,
                Err(err) => {
                    warn!(playlist = season.title, %err, "skipping playlist");
                    report.skipped += 1;
                    continue;
                }
            };

            let mut episode = 0;
            for entry in &playlist.playlist_entries {
                let video = match lookup_video(&entry.youtube_id)
                    .with_context(|| format!("looking up video {}", entry.youtube_id))?
                {
                    Some(video) => video,
                    None => {
                        debug!(youtube_id = %entry.youtube_id, "missing video data, skipping entry");
                        continue;
                    }
                };

                episode += 1;
                match materializer.materialize_video(&season_dir, &video, episode, season_number) {
                    Ok(Materialized::Created) => {
                        report.new_videos += 1;
                        on_new_video(&video);
                    }
                    Ok(Materialized::AlreadyPresent) => {
                        if settings.quick {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(youtube_id = %video.youtube_id, %err, "skipping video");
                        report.skipped += 1;
                    }
                }
            }
            debug!(
                playlist = season.title,
                materialized = episode,
                total = playlist.playlist_entries.len(),
                "videos assigned to this playlist"
            );
        }
    }

    Ok(report)
}

/// Post-run hook for downstream automation; the exit status is logged but
/// never inspected.
fn run_postprocess(command: &str) {
    info!(command, "running post-process command");
    match Command::new("sh").arg("-c").arg(command).status() {
        Ok(status) => debug!(%status, "post-process command finished"),
        Err(err) => warn!(%err, "could not run post-process command"),
    }
}
