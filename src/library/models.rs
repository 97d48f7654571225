//! 书籍数据模型
//!
//! 对应外部转换器产出的 `book.json` 结构。书籍对象加载后
//! 不可变，由缓存以 `Arc<Book>` 在请求间共享。

use serde::{Deserialize, Serialize};

// ============================================================================
// 元数据
// ============================================================================

/// 书籍元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    /// 书名
    #[serde(default)]
    pub title: String,
    /// 作者列表（保持原始顺序）
    #[serde(default)]
    pub authors: Vec<String>,
    /// 语言代码
    #[serde(default)]
    pub language: Option<String>,
    /// 标识符（ISBN 等）
    #[serde(default)]
    pub identifiers: Vec<String>,
    /// 出版社
    #[serde(default)]
    pub publisher: Option<String>,
    /// 简介
    #[serde(default)]
    pub description: Option<String>,
    /// 主题 / 关键词
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl BookMetadata {
    /// 作者展示串，缺失时回退为「未知作者」
    pub fn authors_display(&self) -> String {
        if self.authors.is_empty() {
            "未知作者".to_string()
        } else {
            self.authors.join(", ")
        }
    }

    /// 出版社展示串，缺失时回退为「未知出版社」
    pub fn publisher_display(&self) -> String {
        match self.publisher.as_deref() {
            Some(p) if !p.trim().is_empty() => p.to_string(),
            _ => "未知出版社".to_string(),
        }
    }

    /// 简介展示串，缺失时回退为「暂无简介」
    pub fn description_display(&self) -> String {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => "暂无简介".to_string(),
        }
    }

    /// 主题展示串，缺失时回退为「未分类」
    pub fn subjects_display(&self) -> String {
        if self.subjects.is_empty() {
            "未分类".to_string()
        } else {
            self.subjects.join(", ")
        }
    }
}

// ============================================================================
// 章节与目录
// ============================================================================

/// 章节内容
///
/// `order` 即该章在 spine 中的下标，加载后不再变化。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// 章节标题
    #[serde(default)]
    pub title: String,
    /// 源文件路径
    #[serde(default)]
    pub href: String,
    /// 渲染后的 HTML 内容
    #[serde(default)]
    pub content: String,
    /// 加载时抽取的纯文本
    #[serde(default)]
    pub text: String,
    /// 在 spine 中的序号（0 起始）
    #[serde(default)]
    pub order: usize,
}

impl Chapter {
    /// 按空白切分的词数统计
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// 目录条目（树形，子节点递归）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    /// 条目标题
    #[serde(default)]
    pub title: String,
    /// 跳转目标
    #[serde(default)]
    pub href: String,
    /// 子条目
    #[serde(default)]
    pub children: Vec<TocEntry>,
}

// ============================================================================
// 书籍
// ============================================================================

/// 完整书籍对象
///
/// spine 顺序在加载时固定，是章节寻址的唯一依据
/// （0 起始、连续下标）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// 元数据
    #[serde(default)]
    pub metadata: BookMetadata,
    /// 阅读顺序的章节序列
    #[serde(default)]
    pub spine: Vec<Chapter>,
    /// 目录树
    #[serde(default)]
    pub toc: Vec<TocEntry>,
    /// 图片资源文件名
    #[serde(default)]
    pub images: Vec<String>,
}

impl Book {
    /// 按 spine 下标取章节
    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.spine.get(index)
    }

    /// 章节总数
    pub fn chapter_count(&self) -> usize {
        self.spine.len()
    }
}

/// 书库列表项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSummary {
    /// 书籍标识符
    pub id: String,
    /// 书名
    pub title: String,
    /// 第一作者
    pub author: String,
    /// 全部作者
    pub authors: Vec<String>,
    /// 章节数
    pub chapters: usize,
    /// 图片数
    pub image_count: usize,
}

impl BookSummary {
    /// 从书籍对象构建列表项
    pub fn from_book(id: impl Into<String>, book: &Book) -> Self {
        Self {
            id: id.into(),
            title: book.metadata.title.clone(),
            author: book
                .metadata
                .authors
                .first()
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            authors: book.metadata.authors.clone(),
            chapters: book.spine.len(),
            image_count: book.images.len(),
        }
    }
}

// ============================================================================
// 测试
// ============================================================================
