//! SSE 传输
//!
//! 把中继的抽象事件序列编码为 Server-Sent-Events 线格式帧：
//! `Content` 对应 `message` 帧，`Done` 与 `Error` 各对应一个
//! 终止帧。帧产出即冲出，不做内部缓冲；空闲超过设定间隔时
//! 注入注释帧保活，防止中间代理按空闲超时断开连接。

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::chat::RelayEvent;

/// 默认保活间隔
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(20);

// ============================================================================
// 帧编码
// ============================================================================

/// 编码一个 SSE 帧
pub fn encode_frame(event: &str, data: &serde_json::Value) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

/// 保活注释帧
pub fn keep_alive_frame() -> Bytes {
    Bytes::from_static(b": ping\n\n")
}

/// 把一个中继事件编码为线格式帧
pub fn relay_event_frame(event: &RelayEvent) -> Bytes {
    match event {
        RelayEvent::Content(text) => {
            encode_frame("message", &serde_json::json!({ "content": text }))
        }
        RelayEvent::Done => encode_frame("done", &serde_json::json!({ "done": true })),
        RelayEvent::Error(message) => {
            encode_frame("error", &serde_json::json!({ "error": message }))
        }
    }
}

// ============================================================================
// 保活流包装
// ============================================================================

/// 在帧间隙注入保活帧的流包装
///
/// 内部流每产出一帧就重置空闲计时；活跃的流不付保活开销，
/// 安静的流按间隔唤醒连接。
pub struct KeepAliveStream<S> {
    inner: S,
    interval: Duration,
    idle: Pin<Box<tokio::time::Sleep>>,
    finished: bool,
}

impl<S> KeepAliveStream<S> {
    /// 包装内部流
    pub fn new(inner: S, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            idle: Box::pin(tokio::time::sleep(interval)),
            finished: false,
        }
    }
}

impl<S> Stream for KeepAliveStream<S>
where
    S: Stream<Item = Bytes> + Unpin,
{
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(frame)) => {
                this.idle
                    .as_mut()
                    .reset(tokio::time::Instant::now() + this.interval);
                Poll::Ready(Some(frame))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => match this.idle.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.idle
                        .as_mut()
                        .reset(tokio::time::Instant::now() + this.interval);
                    Poll::Ready(Some(keep_alive_frame()))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

// ============================================================================
// 响应构建
// ============================================================================

/// 把帧流包成 SSE 响应
///
/// `X-Accel-Buffering: no` 阻止反向代理缓冲，保证逐帧送达。
pub fn sse_response<S>(frames: S) -> Response
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .unwrap_or_else(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to build streaming response"})),
            )
                .into_response()
        })
}

// ============================================================================
// 测试
// ============================================================================
