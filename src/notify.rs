#![forbid(unsafe_code)]

//! Outbound notifications: one webhook POST per newly materialized video,
//! carrying an HTML summary. Delivery problems are logged and swallowed;
//! notifications must never fail a run.

use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::Video;
use crate::config::Settings;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct Notifier {
    agent: ureq::Agent,
    url: String,
    server: String,
}

impl Notifier {
    /// Returns a notifier only when notifications are enabled and a webhook
    /// endpoint is configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        if !settings.notifications_enabled {
            return None;
        }
        let Some(url) = settings.notify_url.clone() else {
            warn!("NOTIFICATIONS_ENABLED is set but NOTIFY_URL is missing");
            return None;
        };
        Some(Self {
            agent: ureq::AgentBuilder::new().timeout(NOTIFY_TIMEOUT).build(),
            url,
            server: settings.catalog_server.clone(),
        })
    }

    pub fn notify_new_video(&self, video: &Video) {
        info!(youtube_id = %video.youtube_id, "sending new video notification");
        let payload = json!({
            "title": notification_title(video),
            "body": notification_body(video, &self.server),
            "format": "html",
        });
        if let Err(err) = self.agent.post(&self.url).send_json(payload) {
            warn!(youtube_id = %video.youtube_id, %err, "notification delivery failed");
        }
    }
}

pub fn notification_title(video: &Video) -> String {
    format!("New video from {}", video.channel_label())
}

/// HTML summary of a freshly materialized video: title, date, stats,
/// permalink and description.
pub fn notification_body(video: &Video, server: &str) -> String {
    let video_url = format!("{server}/video/{}", video.youtube_id);
    let mut body = String::new();
    body.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\">\n");
    body.push_str("<head>\n\t<title>");
    body.push_str(&video.title);
    body.push_str("</title>\n</head>\n<body>");
    body.push_str(&format!(
        "\n\n<b>Video Title:</b> {}<br>\n",
        video.title
    ));
    body.push_str(&format!("\n<b>Video Date:</b> {}<br>\n", video.published));
    body.push_str(&format!(
        "\n<b>Video Views:</b> {}<br>\n",
        video.stats.view_count
    ));
    body.push_str(&format!(
        "\n<b>Video Likes:</b> {}<br>\n\n",
        video.stats.like_count
    ));
    body.push_str(&format!(
        "\n<b>Video Link:</b> <a href=\"{video_url}\">{video_url}</a><br>\n"
    ));
    body.push_str(&format!(
        "\n<b>Video Desc.:</b>\n\n<pre>{}</pre></br>\n\n",
        video.description
    ));
    body.push_str("\n</body>\n</html>");
    body
}
