//! 书库磁盘加载
//!
//! 从书库根目录读取转换器产出的 `book.json`。标识符到目录的
//! 解析依次探测 `{id}` 与 `{id}_data` 两种命名，调用方不感知
//! 具体命名方式。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::library::Book;

/// 书籍数据文件名
pub const BOOK_FILE: &str = "book.json";

/// 书籍目录的历史命名后缀
pub const DATA_DIR_SUFFIX: &str = "_data";

// ============================================================================
// 加载器接口
// ============================================================================

/// 书籍加载接口
///
/// 缓存未命中时调用。实现必须把加载失败折叠为 `None`，
/// 损坏或缺失的书不允许让调用方崩溃。
pub trait BookLoader: Send + Sync {
    /// 按标识符加载书籍，找不到或损坏时返回 `None`
    fn load(&self, id: &str) -> Option<Arc<Book>>;
}

// ============================================================================
// 磁盘书库
// ============================================================================

/// 磁盘书库
///
/// 根目录下每本书一个目录，目录内有 `book.json` 与 `images/`。
#[derive(Debug, Clone)]
pub struct DiskLibrary {
    root: PathBuf,
}

impl DiskLibrary {
    /// 创建书库，`root` 为书籍目录的父目录
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 书库根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 将标识符解析为书籍目录
    ///
    /// 依次探测 `{id}` 与 `{id}_data`，以内含 `book.json` 为准。
    /// 含路径分隔符或 `..` 的标识符直接拒绝。
    pub fn resolve_dir(&self, id: &str) -> Option<PathBuf> {
        let id = sanitize_component(id)?;
        for name in [id.to_string(), format!("{id}{DATA_DIR_SUFFIX}")] {
            let dir = self.root.join(&name);
            if dir.join(BOOK_FILE).is_file() {
                return Some(dir);
            }
        }
        None
    }

    /// 解析书籍图片的磁盘路径
    pub fn image_path(&self, id: &str, image_name: &str) -> Option<PathBuf> {
        let dir = self.resolve_dir(id)?;
        let name = sanitize_component(image_name)?;
        let path = dir.join("images").join(name);
        path.is_file().then_some(path)
    }

    /// 扫描根目录，返回排序后的书籍标识符
    ///
    /// 目录名的 `_data` 后缀会被剥掉，两种命名产生同一标识符。
    pub fn list_ids(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("书库目录不可读 {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(BOOK_FILE).is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(|name| {
                name.strip_suffix(DATA_DIR_SUFFIX)
                    .map(str::to_string)
                    .unwrap_or(name)
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl BookLoader for DiskLibrary {
    fn load(&self, id: &str) -> Option<Arc<Book>> {
        let dir = self.resolve_dir(id)?;
        let path = dir.join(BOOK_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("读取书籍失败 {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Book>(&raw) {
            Ok(book) => {
                debug!("加载书籍 {} ({} 章)", id, book.spine.len());
                Some(Arc::new(book))
            }
            Err(e) => {
                warn!("解析书籍失败 {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// 拒绝带路径语义的名字，返回可安全拼接的单段组件
fn sanitize_component(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return None;
    }
    Some(trimmed)
}

// ============================================================================
// 测试
// ============================================================================
