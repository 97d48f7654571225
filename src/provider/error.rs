//! 统一的上游提供商错误类型
//!
//! 按 HTTP 状态与网络故障分类，并提供用户友好的中文错误信息。

use std::error::Error;
use std::fmt;

/// 上游提供商错误
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// 网络错误
    /// 包括连接超时、DNS 解析失败等
    NetworkError(String),

    /// 认证错误
    /// API 密钥无效或权限不足
    AuthenticationError(String),

    /// 限流错误
    /// API 调用频率超限
    RateLimitError(String),

    /// 服务器错误
    /// 5xx 错误
    ServerError(String),

    /// 请求错误
    /// 4xx 错误（除认证和限流外）
    RequestError(String),

    /// 解析错误
    /// JSON 解析失败、响应格式不符合预期
    ParseError(String),

    /// 未知错误
    Unknown(String),
}

impl ProviderError {
    /// 获取用户友好的中文错误信息
    pub fn user_friendly_message(&self) -> String {
        match self {
            ProviderError::NetworkError(msg) => {
                format!("网络连接失败，请检查网络设置后重试。详情：{}", msg)
            }
            ProviderError::AuthenticationError(msg) => {
                format!("上游认证失败，请检查 API 密钥。详情：{}", msg)
            }
            ProviderError::RateLimitError(msg) => {
                format!("请求过于频繁，请稍后重试。详情：{}", msg)
            }
            ProviderError::ServerError(msg) => {
                format!("上游服务暂时不可用，请稍后重试。详情：{}", msg)
            }
            ProviderError::RequestError(msg) => {
                format!("上游拒绝了请求。详情：{}", msg)
            }
            ProviderError::ParseError(msg) => {
                format!("上游响应解析失败。详情：{}", msg)
            }
            ProviderError::Unknown(msg) => {
                format!("发生未知错误。详情：{}", msg)
            }
        }
    }

    /// 获取简短的错误描述
    pub fn short_message(&self) -> &str {
        match self {
            ProviderError::NetworkError(_) => "网络连接失败",
            ProviderError::AuthenticationError(_) => "上游认证失败",
            ProviderError::RateLimitError(_) => "请求过于频繁",
            ProviderError::ServerError(_) => "上游服务器错误",
            ProviderError::RequestError(_) => "上游拒绝请求",
            ProviderError::ParseError(_) => "响应解析失败",
            ProviderError::Unknown(_) => "未知错误",
        }
    }

    /// 从 HTTP 状态码创建错误
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {} - {}", status, truncate_message(body, 200));
        match status {
            401 | 403 => ProviderError::AuthenticationError(detail),
            429 => ProviderError::RateLimitError(detail),
            400 | 404 | 405 | 422 => ProviderError::RequestError(detail),
            500..=599 => ProviderError::ServerError(detail),
            _ => ProviderError::Unknown(detail),
        }
    }

    /// 从 reqwest 错误创建
    pub fn from_reqwest_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::NetworkError("请求超时".to_string())
        } else if err.is_connect() {
            ProviderError::NetworkError("无法连接到服务器".to_string())
        } else if err.is_decode() {
            ProviderError::ParseError("响应解码失败".to_string())
        } else if let Some(status) = err.status() {
            ProviderError::from_http_status(status.as_u16(), &err.to_string())
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_friendly_message())
    }
}

impl Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::from_reqwest_error(&err)
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::ParseError(err.to_string())
    }
}

/// 按字符截断消息到指定长度
fn truncate_message(msg: &str, max_chars: usize) -> String {
    if msg.chars().count() <= max_chars {
        msg.to_string()
    } else {
        let head: String = msg.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
