#![forbid(unsafe_code)]

//! Pure naming helpers. Every string that ends up in a path component goes
//! through these, so on-disk names stay deterministic across runs and never
//! depend on collection iteration order.

use chrono::NaiveDate;

/// Maximum number of characters kept from the human-readable title segment of
/// a video file name. The bracketed id carries the uniqueness; the title is
/// only an enrichment.
const TITLE_SEGMENT_MAX: usize = 64;

/// Replaces characters that are illegal or problematic in path components
/// with `_`. Covers `/ \ ? % * : | " < >`, DEL and the C0 control range.
pub fn sanitize(s: &str) -> String {
    s.chars()
        .map(|ch| match ch {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' => '_',
            ch if (ch as u32) < 0x20 || ch as u32 == 0x7F => '_',
            ch => ch,
        })
        .collect()
}

/// Strips everything that is neither a word character nor whitespace, then
/// collapses whitespace runs into a single `_`. Applied only to the
/// human-readable segments of a video file name, never to ids.
pub fn urlify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_whitespace = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            in_whitespace = true;
        } else if ch.is_alphanumeric() || ch == '_' {
            if in_whitespace {
                out.push('_');
                in_whitespace = false;
            }
            out.push(ch);
        }
        // Other punctuation is dropped without breaking a whitespace run.
    }
    if in_whitespace {
        out.push('_');
    }
    out
}

/// Reduces an ISO date or date-time string to `YYYYMMDD`. Validates through
/// chrono when the prefix parses as a date, otherwise falls back to stripping
/// dashes from the first ten characters.
pub fn simplify_date(s: &str) -> String {
    let prefix: String = s.chars().take(10).collect();
    if let Ok(date) = NaiveDate::parse_from_str(&prefix, "%Y-%m-%d") {
        return date.format("%Y%m%d").to_string();
    }
    prefix.replace('-', "")
}

/// Ellipsis truncation for log output only; on-disk names never use this.
pub fn truncate_for_log(s: &str, maxlen: usize) -> String {
    if s.chars().count() <= maxlen {
        return s.to_string();
    }
    let mut out: String = s.chars().take(maxlen.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}

/// Directory name for a channel: sanitized display name, falling back to the
/// stable id when the display name is empty.
pub fn channel_dir_name(display_name: &str, id: &str) -> String {
    let name = if display_name.is_empty() { id } else { display_name };
    sanitize(name)
}

/// Directory name for a playlist, same fallback rule as channels.
pub fn playlist_dir_name(display_name: &str, id: &str) -> String {
    channel_dir_name(display_name, id)
}

/// Base name (no extension) for every artifact belonging to one video.
///
/// The channel segment and published date are immutable catalog fields and
/// the bracketed id makes the name collision-proof and re-derivable, so a
/// re-run can always tell "already materialized" from "new".
pub fn video_base_name(
    channel_name_or_id: &str,
    published: &str,
    title: &str,
    youtube_id: &str,
) -> String {
    let channel = urlify(&sanitize(channel_name_or_id));
    let date = simplify_date(published);
    let title_segment: String = urlify(&sanitize(title))
        .chars()
        .take(TITLE_SEGMENT_MAX)
        .collect();
    if title_segment.is_empty() {
        format!("{channel} - {date} - [{youtube_id}]")
    } else {
        format!("{channel} - {date} - {title_segment} [{youtube_id}]")
    }
}

pub fn media_file_name(base: &str) -> String {
    format!("{base}.mp4")
}

pub fn poster_file_name(base: &str) -> String {
    format!("{base}-poster.jpg")
}

pub fn nfo_file_name(base: &str) -> String {
    format!("{base}.nfo")
}

/// Subtitle file name: the configured suffix (e.g. `.en.vtt`) replaces the
/// media extension.
pub fn subtitle_file_name(base: &str, sub_format: &str) -> String {
    format!("{base}{sub_format}")
}
