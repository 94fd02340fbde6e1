//! Outbound webhook notifications
//!
//! Discord embeds, Slack blocks, and a generic JSON body for anything else
//! (ntfy, Gotify, Home Assistant, n8n). Delivery failures are logged and
//! swallowed.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use vault_core::{Notification, NotifyConfig, NotifyLevel, NotifyStatus, Notifier};

pub const USER_AGENT: &str = concat!("VaultBackup/", env!("CARGO_PKG_VERSION"));

const DISCORD_GREEN: u32 = 5_763_719;
const DISCORD_AMBER: u32 = 16_705_372;
const DISCORD_RED: u32 = 15_548_997;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Discord {
        url: String,
        username: Option<String>,
        avatar_url: Option<String>,
    },
    Slack {
        url: String,
    },
    Generic {
        url: String,
    },
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discord { .. } => "discord",
            Self::Slack { .. } => "slack",
            Self::Generic { .. } => "webhook",
        }
    }

    fn url(&self) -> &str {
        match self {
            Self::Discord { url, .. } | Self::Slack { url } | Self::Generic { url } => url,
        }
    }

    /// Request body for this provider
    pub fn payload(&self, notification: &Notification, now: DateTime<Utc>) -> Value {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        match self {
            Self::Discord {
                username,
                avatar_url,
                ..
            } => {
                let color = match notification.status {
                    NotifyStatus::Success => DISCORD_GREEN,
                    NotifyStatus::Warning => DISCORD_AMBER,
                    NotifyStatus::Error => DISCORD_RED,
                };
                let mut payload = json!({
                    "embeds": [{
                        "title": notification.title,
                        "description": notification.message,
                        "color": color,
                        "timestamp": timestamp,
                    }]
                });
                if let Some(username) = username {
                    payload["username"] = json!(username);
                }
                if let Some(avatar_url) = avatar_url {
                    payload["avatar_url"] = json!(avatar_url);
                }
                payload
            }
            Self::Slack { .. } => {
                let emoji = match notification.status {
                    NotifyStatus::Success => ":white_check_mark:",
                    NotifyStatus::Warning => ":warning:",
                    NotifyStatus::Error => ":x:",
                };
                json!({
                    "blocks": [
                        {
                            "type": "header",
                            "text": {"type": "plain_text", "text": format!("{emoji} {}", notification.title)},
                        },
                        {
                            "type": "section",
                            "text": {"type": "mrkdwn", "text": notification.message},
                        },
                    ]
                })
            }
            Self::Generic { .. } => json!({
                "title": notification.title,
                "message": notification.message,
                "status": notification.status.as_str(),
                "timestamp": timestamp,
            }),
        }
    }
}

/// Fans a notification out to every configured target
pub struct WebhookNotifier {
    client: reqwest::Client,
    level: NotifyLevel,
    targets: Vec<Target>,
}

impl WebhookNotifier {
    pub fn new(level: NotifyLevel, targets: Vec<Target>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            level,
            targets,
        })
    }

    pub fn from_config(config: &NotifyConfig) -> anyhow::Result<Self> {
        let mut targets = Vec::new();
        if let Some(url) = &config.discord_webhook_url {
            targets.push(Target::Discord {
                url: url.clone(),
                username: config.discord_username.clone(),
                avatar_url: config.discord_avatar_url.clone(),
            });
        }
        if let Some(url) = &config.slack_webhook_url {
            targets.push(Target::Slack { url: url.clone() });
        }
        if let Some(url) = &config.webhook_url {
            targets.push(Target::Generic { url: url.clone() });
        }

        let notifier = Self::new(
            config.level,
            targets,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(
            providers = ?notifier.targets.iter().map(Target::name).collect::<Vec<_>>(),
            level = ?notifier.level,
            "Notifier initialized"
        );
        Ok(notifier)
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    async fn deliver(&self, target: &Target, payload: &Value) -> anyhow::Result<()> {
        self.client
            .post(target.url())
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) {
        if self.targets.is_empty() {
            return;
        }
        if !self.level.permits(notification.status) {
            debug!(
                title = %notification.title,
                level = ?self.level,
                "Notification suppressed by level"
            );
            return;
        }

        let now = Utc::now();
        for target in &self.targets {
            let payload = target.payload(notification, now);
            match self.deliver(target, &payload).await {
                Ok(()) => info!(
                    provider = target.name(),
                    title = %notification.title,
                    status = notification.status.as_str(),
                    "Notification sent"
                ),
                Err(e) => warn!(
                    provider = target.name(),
                    title = %notification.title,
                    error = %e,
                    "Notification delivery failed"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path as UrlPath;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder {
        hits: Arc<Mutex<Vec<(String, HeaderMap, Value)>>>,
    }

    impl Recorder {
        fn hits(&self) -> Vec<(String, HeaderMap, Value)> {
            self.hits.lock().clone()
        }
    }

    /// Local server recording every POST to /hook/{name}; /hook/broken answers 500,
    /// /hook/slow answers after 5s
    async fn recorder() -> (String, Recorder) {
        let recorder = Recorder::default();
        let sink = recorder.clone();
        let app = Router::new().route(
            "/hook/:name",
            post(
                move |UrlPath(name): UrlPath<String>, headers: HeaderMap, Json(body): Json<Value>| {
                    let sink = sink.clone();
                    async move {
                        let status = if name == "broken" {
                            StatusCode::INTERNAL_SERVER_ERROR
                        } else {
                            StatusCode::NO_CONTENT
                        };
                        let slow = name == "slow";
                        sink.hits.lock().push((name, headers, body));
                        if slow {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                        status
                    }
                },
            ),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), recorder)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_discord_payload() {
        let target = Target::Discord {
            url: "http://example.invalid".into(),
            username: Some("Vault Bot".into()),
            avatar_url: None,
        };
        let ok = Notification::new("Vault backup complete", "3 files", NotifyStatus::Success);
        let payload = target.payload(&ok, now());

        assert_eq!(payload["embeds"][0]["title"], "Vault backup complete");
        assert_eq!(payload["embeds"][0]["description"], "3 files");
        assert_eq!(payload["embeds"][0]["color"], DISCORD_GREEN);
        assert_eq!(payload["embeds"][0]["timestamp"], "2024-05-01T08:00:00Z");
        assert_eq!(payload["username"], "Vault Bot");
        assert!(payload.get("avatar_url").is_none());

        let warn = Notification::new("Skipped", "x", NotifyStatus::Warning);
        assert_eq!(target.payload(&warn, now())["embeds"][0]["color"], DISCORD_AMBER);
        let err = Notification::new("Failed", "x", NotifyStatus::Error);
        assert_eq!(target.payload(&err, now())["embeds"][0]["color"], DISCORD_RED);
    }

    #[test]
    fn test_slack_payload() {
        let target = Target::Slack {
            url: "http://example.invalid".into(),
        };
        let err = Notification::new("Vault commit failed", "*hook* rejected", NotifyStatus::Error);
        let payload = target.payload(&err, now());

        assert_eq!(payload["blocks"][0]["type"], "header");
        assert_eq!(payload["blocks"][0]["text"]["text"], ":x: Vault commit failed");
        assert_eq!(payload["blocks"][1]["text"]["type"], "mrkdwn");
        assert_eq!(payload["blocks"][1]["text"]["text"], "*hook* rejected");

        let warn = Notification::new("Skipped", "x", NotifyStatus::Warning);
        assert_eq!(
            target.payload(&warn, now())["blocks"][0]["text"]["text"],
            ":warning: Skipped"
        );
    }

    #[test]
    fn test_generic_payload() {
        let target = Target::Generic {
            url: "http://example.invalid".into(),
        };
        let warn = Notification::new("Skipped", "not initialized", NotifyStatus::Warning);
        assert_eq!(
            target.payload(&warn, now()),
            json!({
                "title": "Skipped",
                "message": "not initialized",
                "status": "warning",
                "timestamp": "2024-05-01T08:00:00Z",
            })
        );
    }

    #[tokio::test]
    async fn test_fans_out_to_every_target() {
        let (base, recorder) = recorder().await;
        let config = NotifyConfig {
            discord_webhook_url: Some(format!("{base}/discord")),
            slack_webhook_url: Some(format!("{base}/slack")),
            webhook_url: Some(format!("{base}/generic")),
            ..NotifyConfig::default()
        };
        let notifier = WebhookNotifier::from_config(&config).unwrap();
        assert_eq!(notifier.targets().len(), 3);

        notifier
            .send(&Notification::new("Vault backup complete", "ok", NotifyStatus::Success))
            .await;

        let hits = recorder.hits();
        let names: Vec<&str> = hits.iter().map(|(name, _, _)| name.as_str()).collect();
        assert_eq!(names, vec!["discord", "slack", "generic"]);
        for (_, headers, _) in &hits {
            assert_eq!(headers["user-agent"], USER_AGENT);
            assert_eq!(headers["content-type"], "application/json");
        }
    }

    #[tokio::test]
    async fn test_level_filter() {
        let (base, recorder) = recorder().await;
        let config = NotifyConfig {
            level: NotifyLevel::Errors,
            webhook_url: Some(format!("{base}/generic")),
            ..NotifyConfig::default()
        };
        let notifier = WebhookNotifier::from_config(&config).unwrap();

        notifier
            .send(&Notification::new("ok", "ok", NotifyStatus::Success))
            .await;
        notifier
            .send(&Notification::new("skipped", "w", NotifyStatus::Warning))
            .await;
        notifier
            .send(&Notification::new("failed", "e", NotifyStatus::Error))
            .await;

        let statuses: Vec<Value> = recorder
            .hits()
            .into_iter()
            .map(|(_, _, body)| body["status"].clone())
            .collect();
        assert_eq!(statuses, vec![json!("warning"), json!("error")]);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let (base, recorder) = recorder().await;
        let notifier = WebhookNotifier::new(
            NotifyLevel::All,
            vec![
                Target::Generic {
                    url: format!("{base}/broken"),
                },
                Target::Generic {
                    url: "http://127.0.0.1:1/unreachable".to_string(),
                },
                Target::Slack {
                    url: format!("{base}/slack"),
                },
            ],
            Duration::from_secs(5),
        )
        .unwrap();

        notifier
            .send(&Notification::new("failed", "e", NotifyStatus::Error))
            .await;

        // Later targets still receive the notification
        let names: Vec<String> = recorder.hits().into_iter().map(|(name, _, _)| name).collect();
        assert_eq!(names, vec!["broken", "slack"]);
    }

    #[tokio::test]
    async fn test_slow_endpoint_is_cut_off_by_timeout() {
        let (base, recorder) = recorder().await;
        let notifier = WebhookNotifier::new(
            NotifyLevel::All,
            vec![
                Target::Generic {
                    url: format!("{base}/slow"),
                },
                Target::Slack {
                    url: format!("{base}/slack"),
                },
            ],
            Duration::from_millis(300),
        )
        .unwrap();

        let started = std::time::Instant::now();
        notifier
            .send(&Notification::new("failed", "e", NotifyStatus::Error))
            .await;

        assert!(started.elapsed() < Duration::from_secs(3));
        let names: Vec<String> = recorder.hits().into_iter().map(|(name, _, _)| name).collect();
        assert_eq!(names, vec!["slow", "slack"]);
    }
}
