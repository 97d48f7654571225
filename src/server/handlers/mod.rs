//! HTTP 处理函数
//!
//! 按资源分文件：书籍读取、聊天回合、EPUB 上传。
//! 错误统一经 [`ApiError`] 映射为 JSON 响应。

pub mod books;
pub mod chat;
pub mod upload;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::chat::RelayError;

/// 中继错误到 HTTP 响应的映射
///
/// 状态码由错误类别决定，响应体为 `{"error": ...}`。
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
