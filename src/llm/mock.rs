//! Mock LLM 客户端（用于测试，无需 API）

use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// 回显最后一条 User 消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 总是失败（模拟 ok=false）
#[derive(Debug, Default)]
pub struct FailingLlmClient;

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        Err("mock failure".to_string())
    }
}

/// 延迟后才返回（用于超时测试）
#[derive(Debug)]
pub struct SlowLlmClient {
    pub delay: Duration,
}

#[async_trait]
impl LlmClient for SlowLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        tokio::time::sleep(self.delay).await;
        Ok("too late".to_string())
    }
}
