//! 书籍读取端点
//!
//! 全部为缓存书籍数据的透传读取：列表、详情、章节、目录
//! 与图片。章节寻址以 spine 下标为准，越界一律 404。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use crate::chat::RelayError;
use crate::library::{Book, BookSummary};
use crate::server::handlers::ApiError;
use crate::server::AppState;

/// `GET /api/books` —— 书库列表
pub async fn list_books(State(state): State<AppState>) -> Json<Vec<BookSummary>> {
    let mut books = Vec::new();
    for id in state.library.list_ids() {
        // 损坏的书在加载时被折叠为 None，跳过而不是整列表失败
        if let Some(book) = state.cache.get(&id).await {
            books.push(BookSummary::from_book(id, &book));
        }
    }
    debug!(count = books.len(), "返回书库列表");
    Json(books)
}

/// `GET /api/books/:book_id` —— 书籍详情与 spine 概览
pub async fn book_details(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let book = load_book(&state, &book_id).await?;

    let spine: Vec<serde_json::Value> = book
        .spine
        .iter()
        .map(|ch| {
            serde_json::json!({
                "title": ch.title,
                "href": ch.href,
                "order": ch.order,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "id": book_id,
        "metadata": {
            "title": book.metadata.title,
            "authors": book.metadata.authors,
            "language": book.metadata.language,
            "identifier": book.metadata.identifiers.first().cloned().unwrap_or_default(),
            "publisher": book.metadata.publisher,
            "description": book.metadata.description,
            "subjects": book.metadata.subjects,
        },
        "toc": book.toc,
        "spine": spine,
        "chapters": book.chapter_count(),
        "images": book.images,
    })))
}

/// `GET /api/books/:book_id/chapters/:chapter_index` —— 单章内容
pub async fn chapter(
    State(state): State<AppState>,
    Path((book_id, chapter_index)): Path<(String, i64)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let book = load_book(&state, &book_id).await?;
    let index = checked_index(&book, chapter_index)?;
    let chapter = &book.spine[index];

    Ok(Json(serde_json::json!({
        "index": index,
        "title": chapter.title,
        "href": chapter.href,
        "content": chapter.content,
        "text": chapter.text,
        "word_count": chapter.word_count(),
        "book_title": book.metadata.title,
        "total_chapters": book.chapter_count(),
    })))
}

/// `GET /api/books/:book_id/toc` —— 目录树
pub async fn toc(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let book = load_book(&state, &book_id).await?;
    Ok(Json(serde_json::json!(book.toc)))
}

/// `GET /read/:book_id/images/:image_name` —— 书内图片
pub async fn image(
    State(state): State<AppState>,
    Path((book_id, image_name)): Path<(String, String)>,
) -> Response {
    let Some(path) = state.library.image_path(&book_id, &image_name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Image not found" })),
        )
            .into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, guess_content_type(&image_name))],
            bytes,
        )
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Image not found" })),
        )
            .into_response(),
    }
}

/// 从缓存取书，未知标识符映射 404
pub(crate) async fn load_book(state: &AppState, book_id: &str) -> Result<Arc<Book>, ApiError> {
    state
        .cache
        .get(book_id)
        .await
        .ok_or_else(|| ApiError(RelayError::BookNotFound))
}

/// 校验章节下标
///
/// 负数与 `>= spine 长度` 都是 404；合法范围内转为 usize。
pub(crate) fn checked_index(book: &Book, chapter_index: i64) -> Result<usize, ApiError> {
    usize::try_from(chapter_index)
        .ok()
        .filter(|i| *i < book.chapter_count())
        .ok_or(ApiError(RelayError::ChapterNotFound))
}

/// 按扩展名推断图片的 Content-Type
fn guess_content_type(name: &str) -> &'static str {
    let extension = name.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_chapter_book() -> Book {
        serde_json::from_str(
            r#"{"metadata":{"title":"书"},
                "spine":[{"title":"一","order":0},{"title":"二","order":1}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_checked_index_bounds() {
        let book = two_chapter_book();
        assert!(checked_index(&book, -1).is_err());
        assert!(checked_index(&book, 2).is_err());
        assert_eq!(checked_index(&book, 0).unwrap(), 0);
        assert_eq!(checked_index(&book, 1).unwrap(), 1);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("cover.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("figure.png"), "image/png");
        assert_eq!(guess_content_type("diagram.svg"), "image/svg+xml");
        assert_eq!(guess_content_type("unknown.dat"), "application/octet-stream");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }
}
