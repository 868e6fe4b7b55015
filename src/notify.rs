//! Delivering findings to people.
//!
//! The pipeline hands every admitted finding to a [`NotificationSink`] as a
//! [`NotificationPayload`]. The payload shape is fixed here; how it is put on
//! the wire is up to the sink.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{
    error::DeliveryError,
    finding::{Category, Finding, Severity},
    warehouse::Row
};

/// Rows included in a notification.
pub const EXCERPT_ROWS: usize = 3;

/// Structured notification for one finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    /// Finding fingerprint, doubles as idempotency key
    pub fingerprint:    String,
    pub check:          String,
    pub category:       Category,
    pub severity:       Severity,
    pub title:          String,
    pub body:           String,
    pub recommendation: String,
    pub excerpt:        Vec<Row>,
    pub total_rows:     u64
}

impl NotificationPayload {
    pub fn from_finding(finding: &Finding) -> Self {
        Self {
            fingerprint:    finding.fingerprint.clone(),
            check:          finding.check.clone(),
            category:       finding.category,
            severity:       finding.severity,
            title:          finding.title.clone(),
            body:           finding.body.clone(),
            recommendation: finding.recommendation.clone(),
            excerpt:        finding.sample.iter().take(EXCERPT_ROWS).cloned().collect(),
            total_rows:     finding.total_rows
        }
    }

    fn validate(&self) -> Result<(), DeliveryError> {
        if self.title.trim().is_empty() {
            return Err(DeliveryError::Malformed("finding has no title".to_string()));
        }
        Ok(())
    }
}

/// Acknowledgement from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub channel: String,
    pub status:  Option<u16>
}

/// Delivers a formatted finding to an external channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short channel name for logs and receipts
    fn channel(&self) -> &str;

    async fn notify(&self, payload: &NotificationPayload) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Webhook body layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WebhookStyle {
    /// Slack incoming-webhook message with an attachment
    #[default]
    Slack,
    /// The payload itself as JSON
    Json
}

impl WebhookStyle {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "slack" => Some(Self::Slack),
            "json" | "raw" => Some(Self::Json),
            _ => None
        }
    }
}

/// Posts findings to an HTTP webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url:    String,
    style:  WebhookStyle
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, style: WebhookStyle) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
            style
        }
    }

    fn body(&self, payload: &NotificationPayload) -> Result<Value, DeliveryError> {
        match self.style {
            WebhookStyle::Slack => Ok(slack_message(payload)),
            WebhookStyle::Json => {
                serde_json::to_value(payload).map_err(|e| DeliveryError::Malformed(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn channel(&self) -> &str {
        match self.style {
            WebhookStyle::Slack => "slack",
            WebhookStyle::Json => "webhook"
        }
    }

    async fn notify(&self, payload: &NotificationPayload) -> Result<DeliveryReceipt, DeliveryError> {
        payload.validate()?;
        let body = self.body(payload)?;
        let mut request = self.client.post(&self.url).json(&body);
        if self.style == WebhookStyle::Json {
            request = request.header("Idempotency-Key", payload.fingerprint.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body:   text
            });
        }
        Ok(DeliveryReceipt {
            channel: self.channel().to_string(),
            status:  Some(status.as_u16())
        })
    }
}

/// Writes findings to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn channel(&self) -> &str {
        "log"
    }

    async fn notify(&self, payload: &NotificationPayload) -> Result<DeliveryReceipt, DeliveryError> {
        payload.validate()?;
        info!(
            check = %payload.check,
            category = %payload.category,
            severity = %payload.severity,
            fingerprint = %payload.fingerprint,
            "{}",
            payload.title
        );
        Ok(DeliveryReceipt {
            channel: self.channel().to_string(),
            status:  None
        })
    }
}

fn emoji(payload: &NotificationPayload) -> &'static str {
    match (payload.category, payload.severity) {
        (Category::Problem, Severity::Critical | Severity::High) => "🚨",
        (Category::Problem, _) => "⚠️",
        (Category::Opportunity, _) => "🎉",
        (Category::Informational, _) => "📊",
        (Category::Unclassified, _) => "🔍"
    }
}

fn color(payload: &NotificationPayload) -> &'static str {
    match (payload.category, payload.severity) {
        (Category::Problem, Severity::Critical | Severity::High) => "#FF0000",
        (Category::Problem, _) => "#FFA500",
        (Category::Opportunity, _) => "#00FF00",
        (Category::Informational, _) => "#0000FF",
        (Category::Unclassified, _) => "#808080"
    }
}

/// Slack incoming-webhook message for a finding.
pub fn slack_message(payload: &NotificationPayload) -> Value {
    let mut fields = vec![
        json!({ "title": "Category", "value": capitalize(payload.category.as_str()), "short": true }),
        json!({ "title": "Severity", "value": capitalize(&payload.severity.to_string().to_lowercase()), "short": true }),
        json!({ "title": "Details", "value": payload.body, "short": false }),
        json!({ "title": "Recommendation", "value": payload.recommendation, "short": false })
    ];
    if !payload.excerpt.is_empty() {
        let mut rows = String::from("```\n");
        for row in &payload.excerpt {
            rows.push_str(&serde_json::to_string(row).unwrap_or_default());
            rows.push('\n');
        }
        rows.push_str("```");
        fields.push(json!({
            "title": format!("Sample Results ({} total)", payload.total_rows),
            "value": rows,
            "short": false
        }));
    }
    json!({
        "text": format!("{} {}", emoji(payload), payload.title),
        "attachments": [{
            "color": color(payload),
            "fields": fields,
            "footer": format!("Analytics Sentinel | {} | {}", payload.check, Utc::now().to_rfc3339()),
            "mrkdwn_in": ["fields"]
        }]
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new()
    }
}
