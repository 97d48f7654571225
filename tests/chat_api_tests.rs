//! 聊天 API 集成测试
//!
//! 用临时目录搭建书库与配置，注入假提供商后经完整的
//! axum 路由验证端到端行为：书籍读取、非流式与流式聊天、
//! SSE 线格式与上传入库。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use bookcast_lib::config::{ConfigStore, ModelConfig};
use bookcast_lib::provider::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatProvider,
    ChunkChoice, ChunkDelta, CompletionChoice, ProviderError, ResponseMessage, Usage,
    UpstreamEvent, UpstreamEventStream,
};
use bookcast_lib::server::{router, AppState, UPLOAD_LIMIT_BYTES};

// ============================================================================
// 测试上下文
// ============================================================================

/// 回放脚本事件并统计调用次数的假提供商
struct ScriptedProvider {
    script: Vec<Result<UpstreamEvent, ProviderError>>,
    response: ChatCompletionResponse,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<UpstreamEvent, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            response: sample_response(),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(
        &self,
        _request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    async fn stream(
        &self,
        _request: &ChatCompletionRequest,
    ) -> Result<UpstreamEventStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(futures::stream::iter(self.script.clone())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn sample_response() -> ChatCompletionResponse {
    ChatCompletionResponse {
        model: Some("gpt-4o-mini".to_string()),
        choices: vec![CompletionChoice {
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: Some("这一章讲了启程。".to_string()),
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: Some(Usage {
            prompt_tokens: 80,
            completion_tokens: 10,
            total_tokens: 90,
        }),
    }
}

fn content_chunk(text: &str) -> UpstreamEvent {
    UpstreamEvent::Chunk(ChatCompletionChunk {
        choices: vec![ChunkChoice {
            delta: ChunkDelta {
                role: None,
                content: Some(text.to_string()),
            },
            finish_reason: None,
        }],
        usage: None,
    })
}

/// 测试上下文：临时书库 + 临时配置 + 假提供商
struct TestContext {
    _temp_dir: TempDir,
    provider: Arc<ScriptedProvider>,
    app: Router,
}

impl TestContext {
    fn new(script: Vec<Result<UpstreamEvent, ProviderError>>, configured: bool) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let books_root = temp_dir.path().join("books");
        write_fixture_book(&books_root, "voyage_data");

        let store = ConfigStore::new(temp_dir.path().join("config.json")).with_env_fallback(false);
        if configured {
            store
                .save_model_config(&ModelConfig::default().with_api_key("sk-test"))
                .unwrap();
        }

        let provider = ScriptedProvider::new(script);
        let factory_provider = Arc::clone(&provider);
        let state = AppState::new(&books_root, store, 10, fake_converter())
            .with_provider_factory(Arc::new(move |_| {
                Arc::clone(&factory_provider) as Arc<dyn ChatProvider>
            }));

        Self {
            app: router(state, None),
            _temp_dir: temp_dir,
            provider,
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = self
            .app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    async fn get_raw(&self, uri: &str) -> (StatusCode, Vec<(String, String)>, String) {
        let response = self
            .app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, headers, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn post_json(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }
}

fn write_fixture_book(root: &std::path::Path, dir_name: &str) {
    let book = serde_json::json!({
        "metadata": {
            "title": "远行",
            "authors": ["王五"],
            "publisher": "旅人出版社",
            "description": "一部关于旅行的小说。",
            "subjects": ["小说", "旅行"]
        },
        "spine": [
            {"title": "启程", "href": "ch1.xhtml", "content": "<p>出发</p>", "text": "出发", "order": 0},
            {"title": "途中", "href": "ch2.xhtml", "content": "<p>路上</p>", "text": "路上", "order": 1}
        ],
        "toc": [{"title": "启程", "href": "ch1.xhtml", "children": []}],
        "images": ["cover.jpg"]
    });
    let dir = root.join(dir_name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("book.json"), book.to_string()).unwrap();
}

/// POSIX shell 假转换器，在 EPUB 旁产出 {stem}_data/book.json
fn fake_converter() -> Vec<String> {
    let script = r#"
dir="${0%.epub}_data"
mkdir -p "$dir"
printf '{"metadata":{"title":"新书"},"spine":[{"title":"一","content":"<p>x</p>","text":"x","order":0}],"toc":[],"images":[]}' > "$dir/book.json"
echo "Title: 新书"
echo "Physical Files (Spine): 1"
"#;
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

// ============================================================================
// 书籍读取
// ============================================================================

#[tokio::test]
async fn test_list_books_strips_data_suffix() {
    let ctx = TestContext::new(vec![], true);
    let (status, body) = ctx.get("/api/books").await;

    assert_eq!(status, StatusCode::OK);
    let books = body.as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["id"], "voyage");
    assert_eq!(books[0]["title"], "远行");
    assert_eq!(books[0]["author"], "王五");
    assert_eq!(books[0]["chapters"], 2);
}

#[tokio::test]
async fn test_book_details_and_toc() {
    let ctx = TestContext::new(vec![], true);

    let (status, body) = ctx.get("/api/books/voyage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["title"], "远行");
    assert_eq!(body["chapters"], 2);
    assert_eq!(body["spine"].as_array().unwrap().len(), 2);

    let (status, toc) = ctx.get("/api/books/voyage/toc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toc[0]["title"], "启程");
}

#[tokio::test]
async fn test_unknown_book_is_404() {
    let ctx = TestContext::new(vec![], true);
    let (status, body) = ctx.get("/api/books/nonexistent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Book not found");
}

#[tokio::test]
async fn test_chapter_content_and_bounds() {
    let ctx = TestContext::new(vec![], true);

    let (status, body) = ctx.get("/api/books/voyage/chapters/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "途中");
    assert_eq!(body["text"], "路上");
    assert_eq!(body["book_title"], "远行");
    assert_eq!(body["total_chapters"], 2);

    // 负下标与 == spine 长度都越界
    let (status, _) = ctx.get("/api/books/voyage/chapters/-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = ctx.get("/api/books/voyage/chapters/2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Chapter not found");
}

// ============================================================================
// 非流式聊天
// ============================================================================

#[tokio::test]
async fn test_chat_returns_content_model_and_tokens() {
    let ctx = TestContext::new(vec![], true);
    let (status, body) = ctx
        .post_json(
            "/api/chat",
            serde_json::json!({
                "prompt_type": "summarize",
                "book_id": "voyage",
                "chapter_index": 0
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "这一章讲了启程。");
    assert_eq!(body["model_used"], "gpt-4o-mini");
    assert_eq!(body["tokens_used"], 90);
    assert_eq!(ctx.provider.call_count(), 1);
}

#[tokio::test]
async fn test_chat_without_config_is_503_and_no_upstream_call() {
    let ctx = TestContext::new(vec![], false);
    let (status, body) = ctx
        .post_json(
            "/api/chat",
            serde_json::json!({
                "prompt_type": "summarize",
                "book_id": "voyage",
                "chapter_index": 0
            }),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Chat service not available"));
    assert_eq!(ctx.provider.call_count(), 0);
}

#[tokio::test]
async fn test_chat_invalid_prompt_type_is_400() {
    let ctx = TestContext::new(vec![], true);
    let (status, body) = ctx
        .post_json(
            "/api/chat",
            serde_json::json!({
                "prompt_type": "translate",
                "book_id": "voyage",
                "chapter_index": 0
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("translate"));
    assert_eq!(ctx.provider.call_count(), 0);
}

#[tokio::test]
async fn test_chat_unknown_book_checked_before_upstream() {
    let ctx = TestContext::new(vec![], true);
    let (status, _) = ctx
        .post_json(
            "/api/chat",
            serde_json::json!({
                "prompt_type": "summarize",
                "book_id": "nope",
                "chapter_index": 0
            }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(ctx.provider.call_count(), 0);
}

// ============================================================================
// 流式聊天
// ============================================================================

#[tokio::test]
async fn test_stream_emits_message_frames_then_done() {
    let ctx = TestContext::new(
        vec![
            Ok(content_chunk("Hel")),
            Ok(content_chunk("lo")),
            Ok(content_chunk("")),
            Ok(UpstreamEvent::Done),
        ],
        true,
    );
    let (status, headers, body) = ctx
        .get_raw("/api/chat/stream?prompt_type=summarize&book_id=voyage&chapter_index=0")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers
        .iter()
        .any(|(k, v)| k == "content-type" && v == "text/event-stream"));
    assert!(headers
        .iter()
        .any(|(k, v)| k == "x-accel-buffering" && v == "no"));

    // 空增量被丢弃，不产生空 message 帧
    assert_eq!(
        body,
        "event: message\ndata: {\"content\":\"Hel\"}\n\n\
         event: message\ndata: {\"content\":\"lo\"}\n\n\
         event: done\ndata: {\"done\":true}\n\n"
    );
}

#[tokio::test]
async fn test_stream_upstream_failure_is_single_error_frame() {
    let ctx = TestContext::new(
        vec![
            Ok(content_chunk("部分")),
            Err(ProviderError::ServerError("HTTP 500".to_string())),
        ],
        true,
    );
    let (status, _, body) = ctx
        .get_raw("/api/chat/stream?prompt_type=summarize&book_id=voyage&chapter_index=0")
        .await;

    assert_eq!(status, StatusCode::OK);
    let frames: Vec<&str> = body.split("\n\n").filter(|s| !s.is_empty()).collect();
    assert_eq!(frames.len(), 2);
    assert!(frames[0].starts_with("event: message\n"));
    assert!(frames[1].starts_with("event: error\n"));
    assert!(frames[1].contains("Failed to process request"));
}

#[tokio::test]
async fn test_stream_without_config_is_error_event_without_upstream_call() {
    let ctx = TestContext::new(vec![Ok(content_chunk("x"))], false);
    let (status, _, body) = ctx
        .get_raw("/api/chat/stream?prompt_type=summarize&book_id=voyage&chapter_index=0")
        .await;

    assert_eq!(status, StatusCode::OK);
    let frames: Vec<&str> = body.split("\n\n").filter(|s| !s.is_empty()).collect();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].starts_with("event: error\n"));
    assert_eq!(ctx.provider.call_count(), 0);
}

#[tokio::test]
async fn test_stream_bad_history_is_400_before_streaming() {
    let ctx = TestContext::new(vec![], true);
    let (status, _, body) = ctx
        .get_raw(
            "/api/chat/stream?prompt_type=qa&book_id=voyage&chapter_index=0\
             &question=why&conversation_history=%7Bbroken",
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid conversation history"));
    assert_eq!(ctx.provider.call_count(), 0);
}

#[tokio::test]
async fn test_stream_disallowed_history_role_is_400_before_streaming() {
    let ctx = TestContext::new(vec![Ok(content_chunk("x"))], true);
    // conversation_history = [{"role":"system","content":"x"}]
    let (status, _, body) = ctx
        .get_raw(
            "/api/chat/stream?prompt_type=qa&book_id=voyage&chapter_index=0&question=why\
             &conversation_history=%5B%7B%22role%22%3A%22system%22%2C%22content%22%3A%22x%22%7D%5D",
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid conversation history"));
    assert_eq!(ctx.provider.call_count(), 0);
}

#[tokio::test]
async fn test_stream_book_not_found_is_404() {
    let ctx = TestContext::new(vec![], true);
    let (status, _, _) = ctx
        .get_raw("/api/chat/stream?prompt_type=summarize&book_id=nope&chapter_index=0")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// 辅助端点
// ============================================================================

#[tokio::test]
async fn test_prompts_lists_all_six_kinds_in_order() {
    let ctx = TestContext::new(vec![], true);
    let (status, body) = ctx.get("/api/chat/prompts").await;

    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec!["summarize", "notes", "qa", "analysis", "critical", "connection"]
    );
}

#[tokio::test]
async fn test_status_reflects_configuration_without_leaking_key() {
    let ctx = TestContext::new(vec![], true);
    let (_, body) = ctx.get("/api/chat/status").await;
    assert_eq!(body["configured"], true);
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["model"], "gpt-4o-mini");
    assert!(body.get("api_key").is_none());

    let ctx = TestContext::new(vec![], false);
    let (_, body) = ctx.get("/api/chat/status").await;
    assert_eq!(body["configured"], false);
}

// ============================================================================
// 上传入库
// ============================================================================

#[tokio::test]
async fn test_upload_ingests_and_invalidates_cache() {
    let ctx = TestContext::new(vec![], true);

    // 先把旧列表装进缓存
    let (_, body) = ctx.get("/api/books").await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let boundary = "bookcast-test-boundary";
    let payload = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"epub_file\"; filename=\"journey.epub\"\r\n\
         Content-Type: application/epub+zip\r\n\r\n\
         fake-epub-bytes\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::post("/api/upload-book")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(payload))
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["book_id"], "journey");
    assert_eq!(body["book_info"]["title"], "新书");

    // 缓存已清空，列表里出现新书
    let (_, body) = ctx.get("/api/books").await;
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["journey", "voyage"]);
}

#[tokio::test]
async fn test_upload_body_over_limit_is_413() {
    let ctx = TestContext::new(vec![], true);

    let request = Request::post("/api/upload-book")
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=bookcast-test-boundary",
        )
        .body(Body::from(vec![0u8; UPLOAD_LIMIT_BYTES + 1]))
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_rejects_non_epub() {
    let ctx = TestContext::new(vec![], true);

    let boundary = "bookcast-test-boundary";
    let payload = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"epub_file\"; filename=\"notes.txt\"\r\n\r\n\
         plain text\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::post("/api/upload-book")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(payload))
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
