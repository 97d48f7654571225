//! OpenAI 兼容线格式
//!
//! 聊天补全的请求与响应结构，流式增量 chunk 用类型化结构
//! 一次性反序列化，后续代码不再探测原始 JSON 字段。

use serde::{Deserialize, Serialize};

// ============================================================================
// 消息与请求
// ============================================================================

/// 聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 角色（system / user / assistant）
    pub role: String,
    /// 消息内容
    pub content: String,
}

impl ChatMessage {
    /// 系统消息
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// 用户消息
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// 助手消息
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// 聊天补全请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// 模型名称
    pub model: String,
    /// 消息列表
    pub messages: Vec<ChatMessage>,
    /// 采样温度
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// 最大 token 数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// 是否流式返回
    #[serde(default)]
    pub stream: bool,
}

// ============================================================================
// 非流式响应
// ============================================================================

/// Token 用量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// 提示词 token 数
    #[serde(default)]
    pub prompt_tokens: u32,
    /// 补全 token 数
    #[serde(default)]
    pub completion_tokens: u32,
    /// 总 token 数
    #[serde(default)]
    pub total_tokens: u32,
}

/// 补全响应中的助手消息
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseMessage {
    /// 角色
    #[serde(default)]
    pub role: String,
    /// 内容（上游可能返回 null）
    #[serde(default)]
    pub content: Option<String>,
}

/// 非流式补全的单个候选
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionChoice {
    /// 助手消息
    #[serde(default)]
    pub message: ResponseMessage,
    /// 结束原因
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// 非流式补全响应
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionResponse {
    /// 实际使用的模型
    #[serde(default)]
    pub model: Option<String>,
    /// 候选列表
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    /// 用量统计
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// 第一个候选的内容，缺失时为空串
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("")
    }

    /// 总 token 数，缺失时为 0
    pub fn total_tokens(&self) -> u32 {
        self.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0)
    }
}

// ============================================================================
// 流式增量
// ============================================================================

/// 流式增量的 delta 部分
///
/// 角色帧只带 `role`，内容帧只带 `content`，
/// 两者都可能为空。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkDelta {
    /// 角色（首帧出现）
    #[serde(default)]
    pub role: Option<String>,
    /// 内容增量
    #[serde(default)]
    pub content: Option<String>,
}

/// 流式增量的单个候选
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkChoice {
    /// 增量内容
    #[serde(default)]
    pub delta: ChunkDelta,
    /// 结束原因（最后一帧出现）
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// 流式补全的一个增量 chunk
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    /// 候选列表
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// 用量统计（部分上游在末帧携带）
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    /// 第一个候选的内容增量
    pub fn content_delta(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }

    /// 第一个候选的结束原因
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first()?.finish_reason.as_deref()
    }
}

// ============================================================================
// 测试
// ============================================================================
