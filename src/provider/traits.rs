//! 聊天提供商接口
//!
//! 为上游补全服务定义统一接口，同时支持流式与非流式调用。
//! 流式调用返回类型化事件流，线格式细节不向上层暴露。

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::provider::{ChatCompletionRequest, ChatCompletionResponse, ProviderError, UpstreamEvent};

/// 类型化的上游事件流
///
/// 每个 Item 是一个增量事件或错误。使用 `Pin<Box<...>>`
/// 以支持动态分发和异步迭代。
pub type UpstreamEventStream =
    Pin<Box<dyn Stream<Item = Result<UpstreamEvent, ProviderError>> + Send>>;

/// 聊天补全提供商接口
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// 非流式调用，返回完整补全
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError>;

    /// 流式调用，返回增量事件流
    ///
    /// 事件按上游产出顺序返回；`Done` 或流结束都表示正常完成。
    async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<UpstreamEventStream, ProviderError>;

    /// 提供商名称，用于日志
    fn name(&self) -> &str;
}
