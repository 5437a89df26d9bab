//! 联系人登记（可选）
//!
//! 采集到客户姓名后写一条记录；失败只记日志，不影响对话。
//! - `JsonlContactSink`：JSON Lines 文件，每个客户一行，重复登记时覆盖
//! - `WebhookContactSink`：POST 到外部地址（如表格桥接脚本）

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;

use crate::config::ContactsSection;
use crate::core::RelayError;
use crate::relay::CustomerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactRecord {
    pub customer_id: CustomerId,
    pub display_name: String,
    pub last_message: String,
    pub recorded_at: DateTime<Utc>,
    /// 来源渠道
    pub source: &'static str,
}

#[async_trait]
pub trait ContactSink: Send + Sync {
    async fn record_contact(&self, record: &ContactRecord) -> Result<(), RelayError>;
}

/// 不登记
#[derive(Debug, Default)]
pub struct NoopContactSink;

#[async_trait]
impl ContactSink for NoopContactSink {
    async fn record_contact(&self, _record: &ContactRecord) -> Result<(), RelayError> {
        Ok(())
    }
}

/// JSON Lines 文件登记，按 customer_id 覆盖
#[derive(Debug)]
pub struct JsonlContactSink {
    path: PathBuf,
    /// 读改写期间串行化
    write_lock: Mutex<()>,
}

impl JsonlContactSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

/// 行中的 customer_id；解析失败的行原样保留
fn line_customer(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("customer_id")?.as_str().map(str::to_string)
}

#[async_trait]
impl ContactSink for JsonlContactSink {
    async fn record_contact(&self, record: &ContactRecord) -> Result<(), RelayError> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RelayError::Contact(e.to_string()))?;
            }
        }
        let line = serde_json::to_string(record).map_err(|e| RelayError::Contact(e.to_string()))?;

        let existing = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(RelayError::Contact(e.to_string())),
        };

        let key = record.customer_id.as_str();
        let mut replaced = false;
        let mut content = String::with_capacity(existing.len() + line.len() + 1);
        for old in existing.lines().filter(|l| !l.trim().is_empty()) {
            if line_customer(old).as_deref() == Some(key) {
                if !replaced {
                    content.push_str(&line);
                    content.push('\n');
                    replaced = true;
                }
            } else {
                content.push_str(old);
                content.push('\n');
            }
        }
        if !replaced {
            content.push_str(&line);
            content.push('\n');
        }

        // 先写临时文件再改名
        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| RelayError::Contact(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| RelayError::Contact(e.to_string()))
    }
}

/// HTTP 登记
pub struct WebhookContactSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookContactSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ContactSink for WebhookContactSink {
    async fn record_contact(&self, record: &ContactRecord) -> Result<(), RelayError> {
        let resp = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| RelayError::Contact(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RelayError::Contact(format!("contact webhook returned {}", resp.status())));
        }
        Ok(())
    }
}

/// 按配置选择登记方式：webhook 优先，其次文件，都没有则不登记
pub fn create_contact_sink(section: &ContactsSection, timeout: Duration) -> Arc<dyn ContactSink> {
    if let Some(url) = section.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        match WebhookContactSink::new(url, timeout) {
            Ok(sink) => {
                tracing::info!("Recording contacts via webhook");
                return Arc::new(sink);
            }
            Err(e) => tracing::warn!("Contact webhook unavailable, falling back: {}", e),
        }
    }
    if let Some(path) = &section.jsonl_path {
        tracing::info!("Recording contacts to {:?}", path);
        return Arc::new(JsonlContactSink::new(path.clone()));
    }
    Arc::new(NoopContactSink)
}
