//! HTTP 服务
//!
//! axum 路由、应用状态与 SSE 传输。API 无状态可缓存的部分
//! 全部走书籍缓存，聊天回合按请求构建中继。

pub mod handlers;
mod sse;
mod state;

use std::path::Path;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

pub use sse::{
    encode_frame, keep_alive_frame, relay_event_frame, sse_response, KeepAliveStream,
    DEFAULT_KEEP_ALIVE,
};
pub use state::{AppState, ProviderFactory};

/// 上传体积上限（EPUB 很少超过几十 MB）
pub const UPLOAD_LIMIT_BYTES: usize = 100 * 1024 * 1024;

/// 构建路由
///
/// `frontend` 指向打包好的前端目录时挂载静态文件；
/// 不提供也不影响 API 使用。CORS 全放开，与前后端分离的
/// 原始部署方式一致。
pub fn router(state: AppState, frontend: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/api/books", get(handlers::books::list_books))
        .route("/api/books/:book_id", get(handlers::books::book_details))
        .route(
            "/api/books/:book_id/chapters/:chapter_index",
            get(handlers::books::chapter),
        )
        .route("/api/books/:book_id/toc", get(handlers::books::toc))
        .route(
            "/read/:book_id/images/:image_name",
            get(handlers::books::image),
        )
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/chat/stream", get(handlers::chat::chat_stream))
        .route("/api/chat/prompts", get(handlers::chat::prompts))
        .route("/api/chat/status", get(handlers::chat::status))
        .route("/api/chat/test-stream", get(handlers::chat::test_stream))
        .route("/api/upload-book", post(handlers::upload::upload_book))
        // 上传体远超 axum 默认的 2MB，体积限制统一挂在路由层
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(UPLOAD_LIMIT_BYTES))
        .with_state(state);

    if let Some(dir) = frontend {
        info!("挂载前端目录: {}", dir.display());
        let index = ServeFile::new(dir.join("index.html"));
        app = app
            // SPA 路由：阅读页直接回 index.html，由前端接管
            .route_service("/read/:book_id", index.clone())
            .route_service("/read/:book_id/:chapter_index", index.clone())
            .fallback_service(ServeDir::new(dir).fallback(index));
    }

    app.layer(CorsLayer::permissive())
}
