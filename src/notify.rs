use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use crate::config::ReportMode;

/// Pushover truncates messages beyond this; group batches flush before
/// crossing it.
pub const GROUP_MESSAGE_LIMIT: usize = 1023;

const PUSHOVER_API: &str = "https://api.pushover.net/1/messages.json";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub title: String,
    /// May contain HTML markup (links).
    pub message: String,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub priority: i8,
}

/// Push delivery boundary; one call per message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

pub struct PushoverNotifier {
    client: reqwest::Client,
    token: String,
    user: String,
}

impl PushoverNotifier {
    pub fn new(client: reqwest::Client, token: String, user: String) -> Self {
        Self { client, token, user }
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let mut body = json!({
            "token": self.token,
            "user": self.user,
            "title": notification.title,
            "message": notification.message,
            "html": 1,
            "priority": notification.priority,
        });
        if let Some(url) = &notification.image_url {
            body["url"] = json!(url);
            body["url_title"] = json!("Picture");
        } else if let Some(url) = &notification.link_url {
            body["url"] = json!(url);
            body["url_title"] = json!("Listing");
        }

        let response = self.client.post(PUSHOVER_API).json(&body).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Pushover rejected the message: HTTP {}", response.status());
        }
        Ok(())
    }
}

/// Applies a sub-site's reporting mode: forwards immediately, accumulates
/// into capped batches, or swallows. Callers must `flush` at the end of the
/// cycle to drain a partial group batch.
pub struct Reporter<'a> {
    notifier: &'a dyn Notifier,
    mode: ReportMode,
    title: String,
    buffer: String,
}

impl<'a> Reporter<'a> {
    pub fn new(notifier: &'a dyn Notifier, mode: ReportMode, title: &str) -> Self {
        Self {
            notifier,
            mode,
            title: title.to_string(),
            buffer: String::new(),
        }
    }

    pub async fn report(&mut self, notification: Notification) {
        match self.mode {
            ReportMode::Individually => {
                if let Err(e) = self.notifier.send(&notification).await {
                    tracing::error!("Failed to send notification: {}", e);
                }
            }
            ReportMode::Group => {
                let mut line = notification.message;
                if line.len() > GROUP_MESSAGE_LIMIT {
                    let mut cut = GROUP_MESSAGE_LIMIT;
                    while !line.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    line.truncate(cut);
                }
                let needed = line.len() + if self.buffer.is_empty() { 0 } else { 1 };
                if self.buffer.len() + needed > GROUP_MESSAGE_LIMIT {
                    self.flush().await;
                }
                if !self.buffer.is_empty() {
                    self.buffer.push('\n');
                }
                self.buffer.push_str(&line);
            }
            ReportMode::None => {}
        }
    }

    pub async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let notification = Notification {
            title: self.title.clone(),
            message: std::mem::take(&mut self.buffer),
            ..Notification::default()
        };
        if let Err(e) = self.notifier.send(&notification).await {
            tracing::error!("Failed to send group notification: {}", e);
        }
    }
}
