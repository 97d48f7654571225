//! 上游提供商模块
//!
//! OpenAI 兼容线格式、SSE 解码与统一的提供商接口。

mod error;
mod openai;
mod sse;
mod traits;
mod wire;

pub use error::ProviderError;
pub use openai::OpenAiClient;
pub use sse::{SseDecoder, UpstreamEvent};
pub use traits::{ChatProvider, UpstreamEventStream};
pub use wire::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChunkChoice,
    ChunkDelta, CompletionChoice, ResponseMessage, Usage,
};
