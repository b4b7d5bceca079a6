//! 邮件通知 - 业务能力层
//!
//! 只负责"发一封通知"，发送失败不重试，由调用方记录。

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::DeliveryError;
use crate::models::ObservedRecord;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// 通知发送器
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), DeliveryError>;
}

/// 渲染好的通知内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    /// HTML 正文
    pub body: String,
}

impl NotificationMessage {
    /// 根据查询结果渲染通知
    pub fn for_record(record: &ObservedRecord) -> Self {
        Self {
            subject: format!("签证状态更新通知: {}", record.last_updated_at),
            body: format!(
                "签证状态: {}<br>Case Created: {}<br>Case Last Updated: {}<br>详细信息：{}",
                escape_html(&record.status),
                escape_html(&record.created_at),
                escape_html(&record.last_updated_at),
                escape_html(&record.message),
            ),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// 通过 Resend 发送邮件
pub struct ResendNotifier {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    /// 发件人，形如 `Visa_bot <bot@example.com>`
    from: String,
}

impl ResendNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.resend_api_key.clone(),
            endpoint: RESEND_ENDPOINT.to_string(),
            from: format!("{} <{}>", config.sender_name, config.sender_address),
        }
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), DeliveryError> {
        debug!("发送邮件: {} -> {}", self.from, recipient);

        let email = ResendEmail {
            from: self.from.clone(),
            to: [recipient],
            subject,
            html: body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&email)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("邮件发送成功 (HTTP {})", status.as_u16());
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
