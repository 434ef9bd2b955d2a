#![forbid(unsafe_code)]

//! Entity materialization: turns catalog records into directories, symlinks
//! and NFO sidecars under the target tree.
//!
//! Everything here is idempotent and keyed purely off filesystem presence: a
//! directory means "channel/playlist already set up", the media symlink means
//! "video already materialized". Sidecars are written once, on first
//! creation; thumbnail symlinks are refreshed on every visit because they can
//! change upstream without the directory ever being recreated.

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::catalog::{Channel, Playlist, Video};
use crate::config::Settings;
use crate::naming;
use crate::nfo;

pub const UNASSIGNED_PLAYLIST_NAME: &str = "Videos";
pub const UNASSIGNED_PLAYLIST_DESC: &str = "Channel's videos not assigned to playlists.";

const CHANNEL_THUMB_NAMES: [&str; 4] = ["poster.jpg", "cover.jpg", "folder.jpg", "banner.jpg"];

/// Outcome of one idempotent materialization step. `AlreadyPresent` is the
/// expected no-op on re-runs; real failures surface as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    Created,
    AlreadyPresent,
}

/// Season-level view shared by real playlists and the synthetic "Videos"
/// pseudo-playlist that collects unassigned videos.
pub struct Season<'a> {
    pub dir_name: String,
    pub title: &'a str,
    pub description: &'a str,
    pub last_refresh: &'a str,
    pub id: &'a str,
    /// Cache ref for `folder.jpg`; the pseudo-playlist borrows the channel's
    /// thumbnail since it has none of its own.
    pub thumbnail: &'a str,
    pub number: u32,
}

impl<'a> Season<'a> {
    /// The pseudo-playlist is always season 1 of its channel.
    pub fn unassigned(channel: &'a Channel) -> Self {
        Season {
            dir_name: UNASSIGNED_PLAYLIST_NAME.to_string(),
            title: UNASSIGNED_PLAYLIST_NAME,
            description: UNASSIGNED_PLAYLIST_DESC,
            last_refresh: "",
            id: "",
            thumbnail: &channel.channel_thumb_url,
            number: 1,
        }
    }

    pub fn from_playlist(playlist: &'a Playlist, number: u32) -> Self {
        Season {
            dir_name: naming::playlist_dir_name(&playlist.playlist_name, &playlist.playlist_id),
            title: playlist.display_name(),
            description: playlist.playlist_description.as_deref().unwrap_or(""),
            last_refresh: &playlist.playlist_last_refresh,
            id: &playlist.playlist_id,
            thumbnail: &playlist.playlist_thumbnail,
            number,
        }
    }
}

pub struct Materializer<'a> {
    settings: &'a Settings,
}

impl<'a> Materializer<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Resolves a catalog thumbnail ref to the local cache, applying the
    /// containerized-layout rewrite. `None` when no cache is configured or
    /// the ref is empty.
    fn cache_path(&self, reference: &str) -> Option<PathBuf> {
        let cache = self.settings.cache_folder.as_ref()?;
        if reference.is_empty() {
            return None;
        }
        let reference = if self.settings.cache_docker {
            reference.strip_prefix("/cache").unwrap_or(reference)
        } else {
            reference
        };
        Some(cache.join(reference.trim_start_matches('/')))
    }

    /// Resolves a catalog `media_url` to the local media store. The catalog
    /// prefixes its own mount point (`/youtube`), which does not exist here.
    pub fn media_path(&self, media_url: &str) -> PathBuf {
        let relative = media_url.strip_prefix("/youtube").unwrap_or(media_url);
        self.settings
            .media_folder
            .join(relative.trim_start_matches('/'))
    }

    /// Removes any previous link at `link` and points it at `source`.
    fn relink(&self, source: &Path, link: &Path) -> Result<()> {
        match fs::remove_file(link) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("removing old link {}", link.display()));
            }
        }
        symlink(source, link).with_context(|| format!("linking {}", link.display()))
    }

    /// Links the four canonical channel images. Returns the `folder.jpg`
    /// path for use as NFO poster art. Individual link failures are logged
    /// and skipped so one bad ref never blocks the channel.
    fn refresh_channel_thumbs(&self, channel_dir: &Path, channel: &Channel) -> Option<PathBuf> {
        let thumb = self.cache_path(&channel.channel_thumb_url);
        let banner = self.cache_path(&channel.channel_banner_url);
        let mut folder_link = None;
        for name in CHANNEL_THUMB_NAMES {
            let source = if name == "banner.jpg" { &banner } else { &thumb };
            let Some(source) = source else {
                debug!(channel = channel.display_name(), name, "no cache ref for image, skipping");
                continue;
            };
            let link = channel_dir.join(name);
            match self.relink(source, &link) {
                Ok(()) => {
                    if name == "folder.jpg" {
                        folder_link = Some(link);
                    }
                }
                Err(err) => warn!(channel = channel.display_name(), name, %err, "thumbnail link failed"),
            }
        }
        folder_link
    }

    /// Creates the channel directory on first sight (plus `tvshow.nfo` when
    /// enabled); on later runs only the thumbnail links are refreshed.
    pub fn ensure_channel(&self, channel: &Channel) -> Result<(PathBuf, Materialized)> {
        let dir_name = naming::channel_dir_name(&channel.channel_name, &channel.channel_id);
        let channel_dir = self.settings.target_folder.join(&dir_name);

        if channel_dir.exists() {
            self.refresh_channel_thumbs(&channel_dir, channel);
            return Ok((channel_dir, Materialized::AlreadyPresent));
        }

        info!(channel = %dir_name, "new channel, setting up resources");
        fs::create_dir_all(&channel_dir)
            .with_context(|| format!("creating channel directory {}", channel_dir.display()))?;
        let folder_link = self.refresh_channel_thumbs(&channel_dir, channel);

        if self.settings.generate_shows_nfo {
            let poster = folder_link
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            let contents = nfo::tvshow_nfo(
                channel.display_name(),
                &dir_name,
                channel.channel_description.as_deref().unwrap_or(""),
                &channel.channel_last_refresh,
                &channel.channel_id,
                &poster,
            );
            let nfo_path = channel_dir.join("tvshow.nfo");
            fs::write(&nfo_path, contents)
                .with_context(|| format!("writing {}", nfo_path.display()))?;
            info!(channel = %dir_name, "generated tvshow.nfo");
        }

        Ok((channel_dir, Materialized::Created))
    }

    fn refresh_season_thumb(&self, season_dir: &Path, season: &Season<'_>) -> Option<PathBuf> {
        let source = self.cache_path(season.thumbnail)?;
        let link = season_dir.join("folder.jpg");
        match self.relink(&source, &link) {
            Ok(()) => Some(link),
            Err(err) => {
                warn!(playlist = season.title, %err, "playlist thumbnail link failed");
                None
            }
        }
    }

    /// Same create-once/refresh-thumbs pattern at the playlist level, with
    /// `season.nfo` as the write-once sidecar.
    pub fn ensure_playlist(
        &self,
        channel_dir: &Path,
        season: &Season<'_>,
    ) -> Result<(PathBuf, Materialized)> {
        let season_dir = channel_dir.join(&season.dir_name);

        if season_dir.exists() {
            self.refresh_season_thumb(&season_dir, season);
            return Ok((season_dir, Materialized::AlreadyPresent));
        }

        info!(playlist = %season.dir_name, "new playlist, setting up resources");
        fs::create_dir_all(&season_dir)
            .with_context(|| format!("creating playlist directory {}", season_dir.display()))?;
        let folder_link = self.refresh_season_thumb(&season_dir, season);

        if self.settings.generate_shows_nfo {
            let poster = folder_link
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            let contents = nfo::season_nfo(
                season.title,
                season.description,
                season.last_refresh,
                season.id,
                season.number,
                &poster,
            );
            let nfo_path = season_dir.join("season.nfo");
            fs::write(&nfo_path, contents)
                .with_context(|| format!("writing {}", nfo_path.display()))?;
            info!(playlist = %season.dir_name, "generated season.nfo");
        }

        Ok((season_dir, Materialized::Created))
    }

    fn refresh_video_poster(&self, season_dir: &Path, base: &str, video: &Video) -> Option<PathBuf> {
        let source = self.cache_path(&video.vid_thumb_url)?;
        let link = season_dir.join(naming::poster_file_name(base));
        match self.relink(&source, &link) {
            Ok(()) => Some(link),
            Err(err) => {
                warn!(youtube_id = %video.youtube_id, %err, "video poster link failed");
                None
            }
        }
    }

    fn link_subtitle(&self, season_dir: &Path, base: &str, video: &Video) {
        let media = self.media_path(&video.media_url);
        let sub_format = &self.settings.sub_format;
        let source = PathBuf::from(format!(
            "{}{}",
            media.with_extension("").display(),
            sub_format
        ));
        if !source.exists() {
            debug!(youtube_id = %video.youtube_id, %sub_format, "no subtitle file, skipping");
            return;
        }
        let link = season_dir.join(naming::subtitle_file_name(base, sub_format));
        match symlink(&source, &link) {
            Ok(()) => debug!(youtube_id = %video.youtube_id, "linked subtitle"),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => warn!(youtube_id = %video.youtube_id, %err, "subtitle link failed"),
        }
    }

    /// Materializes one video into `season_dir`. Gated entirely on the media
    /// symlink: if it already exists the video was handled by a previous run
    /// and only the poster link is refreshed. On first creation the NFO
    /// sidecar and subtitle link are produced as well.
    pub fn materialize_video(
        &self,
        season_dir: &Path,
        video: &Video,
        episode: u32,
        season_number: u32,
    ) -> Result<Materialized> {
        let base = naming::video_base_name(
            video.channel_label(),
            &video.published,
            &video.title,
            &video.youtube_id,
        );
        let media_link = season_dir.join(naming::media_file_name(&base));
        let media_source = self.media_path(&video.media_url);

        match symlink(&media_source, &media_link) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!(youtube_id = %video.youtube_id, link = %media_link.display(), "already materialized");
                self.refresh_video_poster(season_dir, &base, video);
                return Ok(Materialized::AlreadyPresent);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("linking video {}", media_link.display()));
            }
        }

        info!(
            youtube_id = %video.youtube_id,
            title = %naming::truncate_for_log(&video.title, 64),
            "processing new video"
        );

        let poster = self.refresh_video_poster(season_dir, &base, video);

        if self.settings.generate_nfo {
            let poster = poster
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            let contents = nfo::video_nfo(
                &video.title,
                &video.description,
                &video.channel.channel_name,
                &video.published,
                &video.youtube_id,
                &poster,
                episode,
                season_number,
                self.settings.generate_shows_nfo,
            );
            let nfo_path = season_dir.join(naming::nfo_file_name(&base));
            fs::write(&nfo_path, contents)
                .with_context(|| format!("writing {}", nfo_path.display()))?;
        }

        if self.settings.symlink_subs {
            self.link_subtitle(season_dir, &base, video);
        }

        Ok(Materialized::Created)
    }

    /// Membership migration: a video that used to live in the unassigned
    /// pseudo-playlist but now carries a real membership gets its stale link
    /// deleted; the next pass re-materializes it under the real playlist.
    pub fn remove_stale_unassigned(&self, videos_dir: &Path, video: &Video) -> Result<bool> {
        let base = naming::video_base_name(
            video.channel_label(),
            &video.published,
            &video.title,
            &video.youtube_id,
        );
        let link = videos_dir.join(naming::media_file_name(&base));
        match fs::symlink_metadata(&link) {
            Ok(_) => {
                fs::remove_file(&link)
                    .with_context(|| format!("removing stale link {}", link.display()))?;
                info!(
                    youtube_id = %video.youtube_id,
                    link = %link.display(),
                    "video now assigned to playlist, removed unassigned link"
                );
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => {
                Err(err).with_context(|| format!("inspecting stale link {}", link.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{VideoChannel, VideoStats};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        settings: Settings,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let settings = Settings {
            catalog_server: "http://archive".into(),
            catalog_token: "tok".into(),
            media_folder: root.join("media"),
            target_folder: root.join("library"),
            cache_folder: Some(root.join("cache")),
            cache_docker: false,
            notifications_enabled: false,
            notify_url: None,
            generate_nfo: true,
            generate_shows_nfo: true,
            symlink_subs: true,
            sub_format: ".en.vtt".into(),
            quick: true,
            cleanup_deleted_videos: true,
            postprocess_command: None,
        };
        fs::create_dir_all(&settings.media_folder).unwrap();
        fs::create_dir_all(&settings.target_folder).unwrap();
        fs::create_dir_all(settings.cache_folder.as_ref().unwrap().join("channels")).unwrap();
        fs::create_dir_all(settings.cache_folder.as_ref().unwrap().join("videos")).unwrap();
        Fixture {
            _temp: temp,
            settings,
        }
    }

    fn sample_channel() -> Channel {
        Channel {
            channel_id: "abc123".into(),
            channel_name: "Test Channel".into(),
            channel_description: Some("Hello\nWorld".into()),
            channel_thumb_url: "/channels/abc123_thumb.jpg".into(),
            channel_banner_url: "/channels/abc123_banner.jpg".into(),
            channel_last_refresh: "2024-03-01T00:00:00Z".into(),
        }
    }

    fn sample_video(id: &str) -> Video {
        Video {
            youtube_id: id.into(),
            title: "My Video!".into(),
            description: "Hello\nWorld".into(),
            published: "2024-03-05".into(),
            media_url: "/media/x.mp4".into(),
            vid_thumb_url: "/videos/x.jpg".into(),
            stats: VideoStats {
                view_count: 42,
                like_count: 7,
            },
            channel: VideoChannel {
                channel_id: "abc123".into(),
                channel_name: "Test Channel".into(),
            },
            playlist: Vec::new(),
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn seed_cache(fix: &Fixture) {
        let cache = fix.settings.cache_folder.as_ref().unwrap();
        touch(&cache.join("channels/abc123_thumb.jpg"));
        touch(&cache.join("channels/abc123_banner.jpg"));
        touch(&cache.join("videos/x.jpg"));
    }

    #[test]
    fn new_channel_creates_dir_thumbs_and_sidecar() {
        let fix = fixture();
        seed_cache(&fix);
        let materializer = Materializer::new(&fix.settings);
        let (dir, outcome) = materializer.ensure_channel(&sample_channel()).unwrap();
        assert_eq!(outcome, Materialized::Created);
        assert_eq!(dir, fix.settings.target_folder.join("Test Channel"));
        for name in CHANNEL_THUMB_NAMES {
            let link = dir.join(name);
            assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        }
        let banner_target = fs::read_link(dir.join("banner.jpg")).unwrap();
        assert!(banner_target.ends_with("channels/abc123_banner.jpg"));
        let nfo = fs::read_to_string(dir.join("tvshow.nfo")).unwrap();
        assert!(nfo.contains("<plot>Hello&lt;br&gt;\nWorld</plot>"));
        assert!(nfo.contains("<youtubemetadataid>abc123</youtubemetadataid>"));
    }

    #[test]
    fn existing_channel_keeps_sidecar_but_refreshes_thumbs() {
        let fix = fixture();
        seed_cache(&fix);
        let materializer = Materializer::new(&fix.settings);
        let (dir, _) = materializer.ensure_channel(&sample_channel()).unwrap();

        fs::write(dir.join("tvshow.nfo"), "sentinel").unwrap();
        fs::remove_file(dir.join("folder.jpg")).unwrap();

        let (_, outcome) = materializer.ensure_channel(&sample_channel()).unwrap();
        assert_eq!(outcome, Materialized::AlreadyPresent);
        assert_eq!(fs::read_to_string(dir.join("tvshow.nfo")).unwrap(), "sentinel");
        assert!(dir.join("folder.jpg").symlink_metadata().is_ok());
    }

    #[test]
    fn channel_without_cache_still_materializes() {
        let mut fix = fixture();
        fix.settings.cache_folder = None;
        let materializer = Materializer::new(&fix.settings);
        let (dir, outcome) = materializer.ensure_channel(&sample_channel()).unwrap();
        assert_eq!(outcome, Materialized::Created);
        assert!(!dir.join("poster.jpg").exists());
        assert!(dir.join("tvshow.nfo").exists());
    }

    #[test]
    fn unassigned_season_uses_channel_thumbnail() {
        let fix = fixture();
        seed_cache(&fix);
        let materializer = Materializer::new(&fix.settings);
        let channel = sample_channel();
        let (channel_dir, _) = materializer.ensure_channel(&channel).unwrap();
        let season = Season::unassigned(&channel);
        let (season_dir, outcome) = materializer.ensure_playlist(&channel_dir, &season).unwrap();
        assert_eq!(outcome, Materialized::Created);
        assert_eq!(season_dir, channel_dir.join("Videos"));
        let target = fs::read_link(season_dir.join("folder.jpg")).unwrap();
        assert!(target.ends_with("channels/abc123_thumb.jpg"));
        let nfo = fs::read_to_string(season_dir.join("season.nfo")).unwrap();
        assert!(nfo.contains("<seasonnumber>1</seasonnumber>"));
    }

    #[test]
    fn video_materializes_once_with_all_artifacts() {
        let fix = fixture();
        seed_cache(&fix);
        touch(&fix.settings.media_folder.join("media/x.mp4"));
        touch(&fix.settings.media_folder.join("media/x.en.vtt"));
        let materializer = Materializer::new(&fix.settings);
        let channel = sample_channel();
        let (channel_dir, _) = materializer.ensure_channel(&channel).unwrap();
        let (season_dir, _) = materializer
            .ensure_playlist(&channel_dir, &Season::unassigned(&channel))
            .unwrap();

        let video = sample_video("vid1");
        let outcome = materializer
            .materialize_video(&season_dir, &video, 1, 1)
            .unwrap();
        assert_eq!(outcome, Materialized::Created);

        let base = "Test_Channel - 20240305 - My_Video [vid1]";
        let media_link = season_dir.join(format!("{base}.mp4"));
        let target = fs::read_link(&media_link).unwrap();
        assert_eq!(target, fix.settings.media_folder.join("media/x.mp4"));
        assert!(season_dir.join(format!("{base}-poster.jpg")).symlink_metadata().is_ok());
        assert!(season_dir.join(format!("{base}.en.vtt")).symlink_metadata().is_ok());
        let nfo = fs::read_to_string(season_dir.join(format!("{base}.nfo"))).unwrap();
        assert!(nfo.contains("<plot>Hello&lt;br&gt;\nWorld</plot>"));
        assert!(nfo.contains("<season>1</season>"));

        // Second pass is the idempotent no-op path.
        fs::write(season_dir.join(format!("{base}.nfo")), "sentinel").unwrap();
        let outcome = materializer
            .materialize_video(&season_dir, &video, 1, 1)
            .unwrap();
        assert_eq!(outcome, Materialized::AlreadyPresent);
        assert_eq!(
            fs::read_to_string(season_dir.join(format!("{base}.nfo"))).unwrap(),
            "sentinel"
        );
    }

    #[test]
    fn missing_subtitle_is_skipped_quietly() {
        let fix = fixture();
        touch(&fix.settings.media_folder.join("media/x.mp4"));
        let materializer = Materializer::new(&fix.settings);
        let channel = sample_channel();
        let (channel_dir, _) = materializer.ensure_channel(&channel).unwrap();
        let (season_dir, _) = materializer
            .ensure_playlist(&channel_dir, &Season::unassigned(&channel))
            .unwrap();
        let outcome = materializer
            .materialize_video(&season_dir, &sample_video("vid1"), 1, 1)
            .unwrap();
        assert_eq!(outcome, Materialized::Created);
        assert!(
            season_dir
                .join("Test_Channel - 20240305 - My_Video [vid1].en.vtt")
                .symlink_metadata()
                .is_err()
        );
    }

    #[test]
    fn media_path_strips_catalog_mount_prefix() {
        let fix = fixture();
        let materializer = Materializer::new(&fix.settings);
        assert_eq!(
            materializer.media_path("/youtube/media/x.mp4"),
            fix.settings.media_folder.join("media/x.mp4")
        );
        assert_eq!(
            materializer.media_path("/media/x.mp4"),
            fix.settings.media_folder.join("media/x.mp4")
        );
    }

    #[test]
    fn docker_cache_layout_strips_cache_prefix() {
        let mut fix = fixture();
        fix.settings.cache_docker = true;
        let materializer = Materializer::new(&fix.settings);
        let resolved = materializer.cache_path("/cache/channels/a.jpg").unwrap();
        assert_eq!(
            resolved,
            fix.settings.cache_folder.as_ref().unwrap().join("channels/a.jpg")
        );
    }

    #[test]
    fn remove_stale_unassigned_deletes_migrated_link() {
        let fix = fixture();
        let materializer = Materializer::new(&fix.settings);
        let channel = sample_channel();
        let (channel_dir, _) = materializer.ensure_channel(&channel).unwrap();
        let (season_dir, _) = materializer
            .ensure_playlist(&channel_dir, &Season::unassigned(&channel))
            .unwrap();

        let mut video = sample_video("vid1");
        materializer
            .materialize_video(&season_dir, &video, 1, 1)
            .unwrap();
        video.playlist.push("pl1".into());

        let removed = materializer
            .remove_stale_unassigned(&season_dir, &video)
            .unwrap();
        assert!(removed);
        assert!(
            season_dir
                .join("Test_Channel - 20240305 - My_Video [vid1].mp4")
                .symlink_metadata()
                .is_err()
        );
        // Second call is a no-op.
        assert!(!materializer.remove_stale_unassigned(&season_dir, &video).unwrap());
    }
}
