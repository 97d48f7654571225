//! OpenAI 兼容客户端
//!
//! 面向 OpenAI 及自托管兼容端点（Ollama、LM Studio 等）。
//! 配置在构造时固定为快照，配置变更通过重建客户端生效。

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tracing::{debug, error};

use crate::config::ModelConfig;
use crate::provider::{
    ChatCompletionRequest, ChatCompletionResponse, ChatProvider, ProviderError, SseDecoder,
    UpstreamEvent, UpstreamEventStream,
};

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    config: ModelConfig,
    client: Client,
}

impl OpenAiClient {
    /// 用配置快照创建客户端
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// 构建完整的 API URL
    ///
    /// 兼容带与不带 `/v1` 的 base_url 写法。
    fn build_url(&self, endpoint: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/{}", base, endpoint)
        } else {
            format!("{}/v1/{}", base, endpoint)
        }
    }

    /// 非空的 API 密钥
    ///
    /// 自托管端点允许无密钥访问，此时不发送认证头。
    fn bearer_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }

    async fn post_completions(
        &self,
        request: &ChatCompletionRequest,
        accept_event_stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = self.build_url("chat/completions");
        debug!(model = %request.model, url = %url, stream = request.stream, "发起补全请求");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if accept_event_stream {
            builder = builder.header("Accept", "text/event-stream");
        }
        if let Some(key) = self.bearer_key() {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let resp = builder
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("上游拒绝请求: {} - {}", status, body);
            return Err(ProviderError::from_http_status(status.as_u16(), &body));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let mut wire_request = request.clone();
        wire_request.stream = false;

        let resp = self.post_completions(&wire_request, false).await?;
        let response = resp
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::from_reqwest_error(&e))?;
        Ok(response)
    }

    async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<UpstreamEventStream, ProviderError> {
        let mut wire_request = request.clone();
        wire_request.stream = true;

        let resp = self.post_completions(&wire_request, true).await?;
        debug!("流式响应开始: status={}", resp.status());

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            let mut body = resp.bytes_stream();

            while let Some(next) = body.next().await {
                match next {
                    Ok(bytes) => match decoder.feed(&bytes) {
                        Ok(events) => {
                            for event in events {
                                let done = matches!(event, UpstreamEvent::Done);
                                yield Ok(event);
                                if done {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Err(e) => {
                        yield Err(ProviderError::from_reqwest_error(&e));
                        return;
                    }
                }
            }

            // 连接收尾时冲出缓冲中的最后一行
            match decoder.finish() {
                Ok(Some(event)) => yield Ok(event),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        };
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        &self.config.provider
    }
}

// ============================================================================
// 测试
// ============================================================================
