//! 聊天中继错误
//!
//! 四类故障各自独立成员：配置缺失在任何网络调用之前暴露，
//! 未找到映射 404，上游故障以单个终止事件呈现，非法提示词
//! 类型立即拒绝。对外的错误文案保持与既有客户端兼容。

use thiserror::Error;

use crate::provider::ProviderError;

/// 聊天中继错误
#[derive(Debug, Error)]
pub enum RelayError {
    /// 没有可用的模型配置，或缺少提供商必需的 API 密钥
    #[error("Chat service not available. Please check OpenAI configuration.")]
    NotConfigured,

    /// 书籍不存在
    #[error("Book not found")]
    BookNotFound,

    /// 章节下标越界
    #[error("Chapter not found")]
    ChapterNotFound,

    /// 未知的提示词类型
    #[error("Unknown prompt type: {0}")]
    InvalidPromptType(String),

    /// 调用方提交的会话历史无法解析
    #[error("Invalid conversation history: {0}")]
    InvalidHistory(String),

    /// 上游调用失败
    #[error("Failed to process request: {0}")]
    Upstream(#[from] ProviderError),
}

impl RelayError {
    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::NotConfigured => 503,
            RelayError::BookNotFound | RelayError::ChapterNotFound => 404,
            RelayError::InvalidPromptType(_) | RelayError::InvalidHistory(_) => 400,
            RelayError::Upstream(_) => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RelayError::NotConfigured.status_code(), 503);
        assert_eq!(RelayError::BookNotFound.status_code(), 404);
        assert_eq!(RelayError::ChapterNotFound.status_code(), 404);
        assert_eq!(
            RelayError::InvalidPromptType("x".to_string()).status_code(),
            400
        );
        assert_eq!(
            RelayError::InvalidHistory("bad json".to_string()).status_code(),
            400
        );
        assert_eq!(
            RelayError::Upstream(ProviderError::ServerError("500".to_string())).status_code(),
            502
        );
    }

    #[test]
    fn test_messages_keep_client_contract() {
        assert_eq!(RelayError::BookNotFound.to_string(), "Book not found");
        assert_eq!(RelayError::ChapterNotFound.to_string(), "Chapter not found");
        assert!(RelayError::NotConfigured
            .to_string()
            .starts_with("Chat service not available"));
    }
}
