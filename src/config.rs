#![forbid(unsafe_code)]

//! Configuration resolution for the sync binary.
//!
//! Settings come from a `.env` file overlaid with process environment
//! variables (environment wins), plus explicit command-line overrides. The
//! result is one immutable [`Settings`] value passed into every component;
//! nothing reads configuration ambiently after startup.

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_SUB_FORMAT: &str = ".en.vtt";

/// Everything the run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the catalog server, e.g. `http://archive:8000`.
    pub catalog_server: String,
    /// Static bearer token for the catalog API.
    pub catalog_token: String,
    /// Local prefix under which the catalog's `media_url` paths resolve.
    pub media_folder: PathBuf,
    /// Root of the symlink tree this tool owns.
    pub target_folder: PathBuf,
    /// Local prefix for cached thumbnail images; `None` disables thumbnail
    /// symlinks entirely.
    pub cache_folder: Option<PathBuf>,
    /// Containerized cache layout: strip the leading `/cache` from thumbnail
    /// refs before prefixing `cache_folder`.
    pub cache_docker: bool,
    pub notifications_enabled: bool,
    /// Webhook endpoint receiving one POST per newly materialized video.
    pub notify_url: Option<String>,
    pub generate_nfo: bool,
    pub generate_shows_nfo: bool,
    pub symlink_subs: bool,
    /// Subtitle suffix substituted for the media extension, e.g. `.en.vtt`.
    pub sub_format: String,
    /// Stop scanning a playlist at the first already-materialized video
    /// (catalog pages are newest-first).
    pub quick: bool,
    pub cleanup_deleted_videos: bool,
    /// Shell command run once after a full run; absent means disabled.
    pub postprocess_command: Option<String>,
}

/// Command-line overrides that take precedence over both the environment and
/// the `.env` file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub env_path: Option<PathBuf>,
    pub target_folder: Option<PathBuf>,
    pub media_folder: Option<PathBuf>,
}

pub fn load_settings(overrides: Overrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings(&file_vars, env_var_string, overrides)
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: Overrides,
) -> Result<Settings> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let catalog_server = lookup("CATALOG_SERVER")
        .map(|value| value.trim_end_matches('/').to_string())
        .ok_or_else(|| anyhow!("CATALOG_SERVER not set"))?;
    let catalog_token = lookup("CATALOG_TOKEN").ok_or_else(|| anyhow!("CATALOG_TOKEN not set"))?;
    let media_folder = overrides
        .media_folder
        .or_else(|| lookup("MEDIA_FOLDER").map(PathBuf::from))
        .ok_or_else(|| anyhow!("MEDIA_FOLDER not set"))?;
    let target_folder = overrides
        .target_folder
        .or_else(|| lookup("TARGET_FOLDER").map(PathBuf::from))
        .ok_or_else(|| anyhow!("TARGET_FOLDER not set"))?;

    let cache_folder = lookup("CACHE_FOLDER")
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);
    let notify_url = lookup("NOTIFY_URL").filter(|value| !value.trim().is_empty());
    let postprocess_command =
        lookup("POSTPROCESS_COMMAND").filter(|value| !value.trim().is_empty());

    let flag = |key: &str, default: bool| {
        lookup(key)
            .map(|value| parse_bool(&value, default))
            .unwrap_or(default)
    };

    Ok(Settings {
        catalog_server,
        catalog_token,
        media_folder,
        target_folder,
        cache_folder,
        cache_docker: flag("CACHE_DOCKER", false),
        notifications_enabled: flag("NOTIFICATIONS_ENABLED", false),
        notify_url,
        generate_nfo: flag("GENERATE_NFO", false),
        generate_shows_nfo: flag("GENERATE_SHOWS_NFO", false),
        symlink_subs: flag("SYMLINK_SUBS", false),
        sub_format: lookup("SUB_FORMAT").unwrap_or_else(|| DEFAULT_SUB_FORMAT.to_string()),
        quick: flag("QUICK", true),
        cleanup_deleted_videos: flag("CLEANUP_DELETED_VIDEOS", false),
        postprocess_command,
    })
}

/// Accepts the usual spellings for boolean env values; anything else keeps
/// the key's default.
fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> Settings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None, Overrides::default()).unwrap()
    }

    const MINIMAL: &str = concat!(
        "CATALOG_SERVER=\"http://archive:8000\"\n",
        "CATALOG_TOKEN=\"secret\"\n",
        "MEDIA_FOLDER=\"/media\"\n",
        "TARGET_FOLDER=\"/library\"\n",
    );

    #[test]
    fn minimal_settings_use_defaults() {
        let settings = settings_from(MINIMAL);
        assert_eq!(settings.catalog_server, "http://archive:8000");
        assert_eq!(settings.catalog_token, "secret");
        assert_eq!(settings.media_folder, PathBuf::from("/media"));
        assert_eq!(settings.target_folder, PathBuf::from("/library"));
        assert!(settings.cache_folder.is_none());
        assert!(!settings.notifications_enabled);
        assert!(!settings.generate_nfo);
        assert!(!settings.cleanup_deleted_videos);
        assert!(settings.quick);
        assert_eq!(settings.sub_format, DEFAULT_SUB_FORMAT);
        assert!(settings.postprocess_command.is_none());
    }

    #[test]
    fn missing_server_is_an_error() {
        let cfg = make_config("CATALOG_TOKEN=\"x\"\n");
        let vars = read_env_file(cfg.path()).unwrap();
        let err = build_settings(&vars, |_| None, Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("CATALOG_SERVER"));
    }

    #[test]
    fn server_trailing_slash_is_trimmed() {
        let settings = settings_from(
            "CATALOG_SERVER=\"http://archive:8000/\"\nCATALOG_TOKEN=\"t\"\nMEDIA_FOLDER=\"/m\"\nTARGET_FOLDER=\"/t\"\n",
        );
        assert_eq!(settings.catalog_server, "http://archive:8000");
    }

    #[test]
    fn flags_and_optional_values_parse() {
        let contents = format!(
            "{MINIMAL}CACHE_FOLDER=\"/cache\"\nCACHE_DOCKER=\"yes\"\nNOTIFICATIONS_ENABLED=\"1\"\nNOTIFY_URL=\"http://hook/notify\"\nGENERATE_NFO=\"true\"\nQUICK=\"off\"\nSUB_FORMAT=\".fr.vtt\"\nPOSTPROCESS_COMMAND=\"touch /tmp/done\"\n"
        );
        let settings = settings_from(&contents);
        assert_eq!(settings.cache_folder, Some(PathBuf::from("/cache")));
        assert!(settings.cache_docker);
        assert!(settings.notifications_enabled);
        assert_eq!(settings.notify_url.as_deref(), Some("http://hook/notify"));
        assert!(settings.generate_nfo);
        assert!(!settings.quick);
        assert_eq!(settings.sub_format, ".fr.vtt");
        assert_eq!(
            settings.postprocess_command.as_deref(),
            Some("touch /tmp/done")
        );
    }

    #[test]
    fn unknown_bool_value_keeps_default() {
        let settings =
            settings_from(&format!("{MINIMAL}QUICK=\"maybe\"\nGENERATE_NFO=\"maybe\"\n"));
        assert!(settings.quick);
        assert!(!settings.generate_nfo);
    }

    #[test]
    fn blank_optional_values_stay_disabled() {
        let settings =
            settings_from(&format!("{MINIMAL}CACHE_FOLDER=\"\"\nNOTIFY_URL=\"  \"\n"));
        assert!(settings.cache_folder.is_none());
        assert!(settings.notify_url.is_none());
    }

    #[test]
    fn environment_wins_over_file() {
        let cfg = make_config(MINIMAL);
        let vars = read_env_file(cfg.path()).unwrap();
        let settings = build_settings(
            &vars,
            |key| {
                if key == "TARGET_FOLDER" {
                    Some("/env-library".to_string())
                } else {
                    None
                }
            },
            Overrides::default(),
        )
        .unwrap();
        assert_eq!(settings.target_folder, PathBuf::from("/env-library"));
    }

    #[test]
    fn overrides_win_over_environment() {
        let cfg = make_config(MINIMAL);
        let vars = read_env_file(cfg.path()).unwrap();
        let settings = build_settings(
            &vars,
            |key| {
                if key == "TARGET_FOLDER" {
                    Some("/env-library".to_string())
                } else {
                    None
                }
            },
            Overrides {
                target_folder: Some(PathBuf::from("/cli-library")),
                media_folder: Some(PathBuf::from("/cli-media")),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.target_folder, PathBuf::from("/cli-library"));
        assert_eq!(settings.media_folder, PathBuf::from("/cli-media"));
    }

    #[test]
    fn read_env_file_handles_export_quotes_and_comments() {
        let cfg = make_config(
            r#"
            export CATALOG_SERVER="http://a"
            CATALOG_TOKEN='tok'
            TARGET_FOLDER =  "/t"
            MEDIA_FOLDER=/m
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("CATALOG_SERVER").unwrap(), "http://a");
        assert_eq!(vars.get("CATALOG_TOKEN").unwrap(), "tok");
        assert_eq!(vars.get("TARGET_FOLDER").unwrap(), "/t");
        assert_eq!(vars.get("MEDIA_FOLDER").unwrap(), "/m");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }
}
