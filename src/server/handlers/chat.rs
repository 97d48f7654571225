//! 聊天端点
//!
//! 非流式回合走 `POST /api/chat`，流式回合走
//! `GET /api/chat/stream` 的 SSE。流式端点在进入事件流之前
//! 完成全部输入校验：找不到的书、越界章节与坏历史都以
//! HTTP 状态返回，事件流里只出现中继自己的事件。

use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tracing::info;

use crate::chat::{registry, ChatTurn, RelayError};
use crate::provider::ChatMessage;
use crate::server::handlers::ApiError;
use crate::server::{relay_event_frame, sse_response, AppState, KeepAliveStream};

// ============================================================================
// 请求形状
// ============================================================================

/// 非流式聊天请求体
#[derive(Debug, Deserialize)]
pub struct ChatApiRequest {
    /// 提示词类型
    pub prompt_type: String,
    /// 书籍标识符
    pub book_id: String,
    /// 章节下标（0 起始）
    pub chapter_index: i64,
    /// 读者问题，仅 qa 类型有意义
    #[serde(default)]
    pub question: String,
    /// 会话历史
    #[serde(default)]
    pub conversation_history: Option<Vec<ChatMessage>>,
}

/// 流式聊天的查询参数
///
/// EventSource 只能发 GET，历史以 JSON 编码塞进查询串。
#[derive(Debug, Deserialize)]
pub struct ChatStreamQuery {
    pub prompt_type: String,
    pub book_id: String,
    pub chapter_index: i64,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub conversation_history: Option<String>,
}

// ============================================================================
// 处理函数
// ============================================================================

/// `POST /api/chat` —— 非流式回合
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatApiRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let turn = resolve_turn(
        &state,
        &request.prompt_type,
        &request.book_id,
        request.chapter_index,
        &request.question,
        request.conversation_history.unwrap_or_default(),
    )
    .await?;

    let completion = state.relay().complete(&turn).await?;
    Ok(Json(serde_json::json!({
        "content": completion.content,
        "model_used": completion.model_used,
        "tokens_used": completion.tokens_used,
    })))
}

/// `GET /api/chat/stream` —— 流式回合
pub async fn chat_stream(
    State(state): State<AppState>,
    Query(query): Query<ChatStreamQuery>,
) -> Response {
    let history = match decode_history(query.conversation_history.as_deref()) {
        Ok(history) => history,
        Err(e) => return ApiError(e).into_response(),
    };

    let turn = match resolve_turn(
        &state,
        &query.prompt_type,
        &query.book_id,
        query.chapter_index,
        &query.question,
        history,
    )
    .await
    {
        Ok(turn) => turn,
        Err(e) => return e.into_response(),
    };

    let frames = state.relay().stream(turn).map(|event| relay_event_frame(&event));
    sse_response(KeepAliveStream::new(frames, state.keep_alive))
}

/// `GET /api/chat/prompts` —— 提示词菜单
pub async fn prompts() -> Json<serde_json::Value> {
    let entries: Vec<serde_json::Value> = registry()
        .values()
        .map(|definition| {
            serde_json::json!({
                "kind": definition.kind.as_str(),
                "title": definition.title,
                "description": definition.description,
            })
        })
        .collect();
    Json(serde_json::json!(entries))
}

/// `GET /api/chat/status` —— 配置状态快照，不泄露密钥
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config.get_model_config();
    let configured = config.as_ref().map(|c| c.is_usable()).unwrap_or(false);
    Json(serde_json::json!({
        "configured": configured,
        "provider": config.as_ref().map(|c| c.provider.clone()),
        "model": config.map(|c| c.model),
    }))
}

/// `GET /api/chat/test-stream` —— 与提供商无关的 SSE 自检
///
/// 固定节奏吐出一串 message 帧再收 done，用于排查传输层。
pub async fn test_stream() -> Response {
    const WORDS: [&str; 13] = [
        "这是", "一个", "流式", "测试", "消息", "。", "您", "应该", "看到", "这些", "文字",
        "逐步", "出现。",
    ];

    let frames = async_stream::stream! {
        for (i, word) in WORDS.iter().enumerate() {
            let data = serde_json::json!({ "content": format!("{word} ") });
            yield Bytes::from(format!("id: {}\nevent: message\ndata: {}\n\n", i + 1, data));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let data = serde_json::json!({ "done": true });
        yield Bytes::from(format!("id: {}\nevent: done\ndata: {}\n\n", WORDS.len() + 1, data));
    };
    sse_response(frames)
}

// ============================================================================
// 输入解析
// ============================================================================

/// 解析书籍与章节，构建聊天回合
async fn resolve_turn(
    state: &AppState,
    prompt_type: &str,
    book_id: &str,
    chapter_index: i64,
    question: &str,
    history: Vec<ChatMessage>,
) -> Result<ChatTurn, ApiError> {
    let book = super::books::load_book(state, book_id).await?;
    let index = super::books::checked_index(&book, chapter_index)?;

    info!(book_id, chapter = index, prompt = prompt_type, "聊天回合开始");
    let turn = ChatTurn::for_chapter(prompt_type, &book, index)
        .ok_or(ApiError(RelayError::ChapterNotFound))?
        .with_question(question)
        .with_history(history);
    Ok(turn)
}

/// 解码查询串里的会话历史
///
/// 解析失败与不允许的角色都是调用方输入错误，不归为上游
/// 故障，在进入事件流之前以 400 返回。
fn decode_history(raw: Option<&str>) -> Result<Vec<ChatMessage>, RelayError> {
    match raw {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => {
            let history = serde_json::from_str::<Vec<ChatMessage>>(raw)
                .map_err(|e| RelayError::InvalidHistory(e.to_string()))?;
            for entry in &history {
                if entry.role != "user" && entry.role != "assistant" {
                    return Err(RelayError::InvalidHistory(format!(
                        "不支持的角色: {}",
                        entry.role
                    )));
                }
            }
            Ok(history)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_history_empty_and_absent() {
        assert!(decode_history(None).unwrap().is_empty());
        assert!(decode_history(Some("")).unwrap().is_empty());
        assert!(decode_history(Some("[]")).unwrap().is_empty());
    }

    #[test]
    fn test_decode_history_roundtrip() {
        let history = decode_history(Some(
            r#"[{"role":"user","content":"问"},{"role":"assistant","content":"答"}]"#,
        ))
        .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "答");
    }

    #[test]
    fn test_decode_history_malformed_is_client_error() {
        let err = decode_history(Some("{not json")).unwrap_err();
        assert!(matches!(err, RelayError::InvalidHistory(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_decode_history_rejects_disallowed_role() {
        let err = decode_history(Some(r#"[{"role":"system","content":"越权"}]"#)).unwrap_err();
        assert!(matches!(err, RelayError::InvalidHistory(_)));
        assert_eq!(err.status_code(), 400);
    }
}
