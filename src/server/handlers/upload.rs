//! EPUB 上传端点
//!
//! 接收 multipart 表单中的 `epub_file` 字段，交给入库器
//! 调用外部转换器。入库成功后清空书籍缓存，保证下一次
//! 列表就能看到新书。

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, info};

use crate::library::IngestError;
use crate::server::AppState;

/// 表单字段名
const EPUB_FIELD: &str = "epub_file";

/// `POST /api/upload-book`
pub async fn upload_book(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &format!("无法读取上传表单: {e}"))
            }
        };
        if field.name() != Some(EPUB_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &format!("读取上传内容失败: {e}"))
            }
        };

        return match state.ingestor.ingest(&filename, &data).await {
            Ok(ingested) => {
                // 新书落盘后清空缓存，后续列表反映最新磁盘内容
                state.cache.invalidate_all();
                let title = ingested
                    .report
                    .title
                    .clone()
                    .unwrap_or_else(|| filename.clone());
                info!(book_id = %ingested.id, %title, "EPUB 上传入库成功");
                Json(serde_json::json!({
                    "message": format!("Book '{title}' processed successfully!"),
                    "book_id": ingested.id,
                    "book_info": ingested.report,
                }))
                .into_response()
            }
            Err(e) => {
                error!("EPUB 上传处理失败: {}", e);
                let status = match e {
                    IngestError::NotAnEpub => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                error_response(status, &e.to_string())
            }
        };
    }

    error_response(
        StatusCode::BAD_REQUEST,
        &format!("缺少上传字段 {EPUB_FIELD}"),
    )
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
