#![forbid(unsafe_code)]

//! NFO sidecar rendering. The XML element set matches what media managers
//! (Jellyfin/Kodi-style) read for shows, seasons and episodes. All catalog
//! text passes through strict entity escaping.

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>\n";

/// Escapes the five XML entities. Empty in, empty out, never fails.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            ch => out.push(ch),
        }
    }
    out
}

/// Converts plain-text newlines into `<br>` line breaks before escaping, so
/// multi-line descriptions keep their shape inside `<plot>`.
pub fn format_description(s: &str) -> String {
    s.replace('\n', "<br>\n")
}

fn escaped_description(s: &str) -> String {
    xml_escape(&format_description(s))
}

/// First `n` bytes of a date string; shorter or oddly encoded input is
/// passed through unchanged.
fn date_prefix(s: &str, n: usize) -> &str {
    s.get(..n).unwrap_or(s)
}

/// Show-level sidecar written once when a channel directory is first created.
pub fn tvshow_nfo(
    title: &str,
    original_title: &str,
    description: &str,
    last_refresh: &str,
    channel_id: &str,
    poster: &str,
) -> String {
    format!(
        "{XML_HEADER}<tvshow>\n\
         \t<plot>{plot}</plot>\n\
         \t<outline>{plot}</outline>\n\
         \t<title>{title}</title>\n\
         \t<originaltitle>{original}</originaltitle>\n\
         \t<year>{year}</year>\n\
         \t<premiered>{date}</premiered>\n\
         \t<releasedate>{date}</releasedate>\n\
         \t<art>\n\t\t<poster>{poster}</poster>\n\t</art>\n\
         \t<youtubemetadataid>{id}</youtubemetadataid>\n\
         </tvshow>",
        plot = escaped_description(description),
        title = xml_escape(title),
        original = xml_escape(original_title),
        year = date_prefix(last_refresh, 4),
        date = date_prefix(last_refresh, 10),
        poster = poster,
        id = channel_id,
    )
}

/// Season-level sidecar written once when a playlist directory is first
/// created.
pub fn season_nfo(
    title: &str,
    description: &str,
    last_refresh: &str,
    playlist_id: &str,
    season_number: u32,
    poster: &str,
) -> String {
    format!(
        "{XML_HEADER}<season>\n\
         \t<plot>{plot}</plot>\n\
         \t<outline>{plot}</outline>\n\
         \t<title>{title}</title>\n\
         \t<year>{year}</year>\n\
         \t<premiered>{date}</premiered>\n\
         \t<releasedate>{date}</releasedate>\n\
         \t<art>\n\t\t<poster>{poster}</poster>\n\t</art>\n\
         \t<seasonnumber>{season}</seasonnumber>\n\
         \t<youtubemetadataid>{id}</youtubemetadataid>\n\
         </season>",
        plot = escaped_description(description),
        title = xml_escape(title),
        year = date_prefix(last_refresh, 4),
        date = date_prefix(last_refresh, 10),
        poster = poster,
        season = season_number,
        id = playlist_id,
    )
}

/// Per-video sidecar written on first materialization only. Uses the
/// `episodedetails` schema when show-level sidecars are enabled, otherwise
/// the standalone `musicvideo` schema.
#[allow(clippy::too_many_arguments)]
pub fn video_nfo(
    title: &str,
    description: &str,
    channel_name: &str,
    published: &str,
    youtube_id: &str,
    poster: &str,
    episode: u32,
    season: u32,
    shows_nfo: bool,
) -> String {
    let tag = if shows_nfo { "episodedetails" } else { "musicvideo" };
    format!(
        "{XML_HEADER}<{tag}>\n\
         \t<plot>{plot}</plot>\n\
         \t<title>{title}</title>\n\
         \t<director>{director}</director>\n\
         \t<year>{year}</year>\n\
         \t<premiered>{date}</premiered>\n\
         \t<releasedate>{date}</releasedate>\n\
         \t<youtubemetadataid>{id}</youtubemetadataid>\n\
         \t<art>\n\t\t<poster>{poster}</poster>\n\t</art>\n\
         \t<episode>{episode}</episode>\n\
         \t<season>{season}</season>\n\
         </{tag}>",
        plot = escaped_description(description),
        title = xml_escape(title),
        director = xml_escape(channel_name),
        year = date_prefix(published, 4),
        date = date_prefix(published, 10),
        id = youtube_id,
        poster = poster,
        episode = episode,
        season = season,
    )
}
