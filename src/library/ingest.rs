//! 书籍入库
//!
//! 接收上传的 EPUB 字节，在临时目录调用外部转换器产出
//! `{stem}_data` 目录，再整体搬入书库根目录。转换器的
//! 标准输出按行解析出书籍概要信息。

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::library::DATA_DIR_SUFFIX;

// ============================================================================
// 错误定义
// ============================================================================

/// 入库错误
#[derive(Debug, Error)]
pub enum IngestError {
    /// 上传的不是 EPUB 文件
    #[error("请上传有效的 EPUB 文件")]
    NotAnEpub,

    /// 文件读写失败
    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    /// 转换器退出码非零
    #[error("EPUB 转换失败: {0}")]
    ConverterFailed(String),

    /// 转换器没有产出书籍目录
    #[error("转换器未产出书籍数据目录")]
    MissingOutput,

    /// 后台任务异常退出
    #[error("后台任务异常退出: {0}")]
    TaskFailed(String),
}

// ============================================================================
// 入库结果
// ============================================================================

/// 从转换器标准输出解析出的书籍概要
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConverterReport {
    /// 书名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 作者
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    /// 章节数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapters: Option<String>,
    /// 图片数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<String>,
    /// 入库后的目录名
    pub data_folder: String,
}

/// 入库成功的结果
#[derive(Debug, Clone)]
pub struct IngestedBook {
    /// 书籍标识符（目录名去掉后缀）
    pub id: String,
    /// 概要信息
    pub report: ConverterReport,
}

// ============================================================================
// 入库器
// ============================================================================

/// EPUB 入库器
///
/// `converter` 为外部转换命令的 argv 前缀，实际调用时
/// 追加 EPUB 文件路径作为最后一个参数。
pub struct EpubIngestor {
    root: PathBuf,
    converter: Vec<String>,
}

impl EpubIngestor {
    /// 创建入库器
    pub fn new(root: impl Into<PathBuf>, converter: Vec<String>) -> Self {
        Self {
            root: root.into(),
            converter,
        }
    }

    /// 处理一次上传
    ///
    /// `filename` 为客户端提交的原始文件名，只用于校验扩展名
    /// 和推导书籍标识符。
    pub async fn ingest(&self, filename: &str, data: &[u8]) -> Result<IngestedBook, IngestError> {
        if !filename.to_lowercase().ends_with(".epub") {
            return Err(IngestError::NotAnEpub);
        }
        if self.converter.is_empty() {
            return Err(IngestError::ConverterFailed("未配置转换命令".to_string()));
        }

        let stem = sanitize_stem(filename);
        info!("处理 EPUB 上传: {} -> {}", filename, stem);

        // 独立的临时目录，转换器在其中就地产出 {stem}_data
        let staging = std::env::temp_dir().join(format!("bookcast-upload-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging).await?;

        let result = self.run_in_staging(&staging, &stem, data).await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!("清理临时目录失败 {}: {}", staging.display(), e);
        }
        result
    }

    async fn run_in_staging(
        &self,
        staging: &Path,
        stem: &str,
        data: &[u8],
    ) -> Result<IngestedBook, IngestError> {
        let epub_path = staging.join(format!("{stem}.epub"));
        tokio::fs::write(&epub_path, data).await?;

        let output = Command::new(&self.converter[0])
            .args(&self.converter[1..])
            .arg(&epub_path)
            .current_dir(staging)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(IngestError::ConverterFailed(stderr));
        }

        let folder_name = format!("{stem}{DATA_DIR_SUFFIX}");
        let produced = staging.join(&folder_name);
        if !produced.is_dir() {
            return Err(IngestError::MissingOutput);
        }

        // 旧目录整体替换，保证重复上传拿到最新内容
        let final_path = self.root.join(&folder_name);
        if final_path.exists() {
            tokio::fs::remove_dir_all(&final_path).await?;
        }
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::task::spawn_blocking(move || copy_dir_recursive(&produced, &final_path))
            .await
            .map_err(|e| IngestError::TaskFailed(e.to_string()))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut report = parse_converter_output(&stdout);
        report.data_folder = folder_name;

        info!("书籍入库完成: {}", stem);
        Ok(IngestedBook {
            id: stem.to_string(),
            report,
        })
    }
}

/// 从原始文件名推导书籍标识符
///
/// 仅保留字母数字与 `-`、`_`，推导结果为空时用时间戳兜底。
fn sanitize_stem(filename: &str) -> String {
    let base = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let safe: String = base
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if safe.is_empty() {
        format!("book_{}", Utc::now().timestamp())
    } else {
        safe
    }
}

/// 按行解析转换器标准输出
fn parse_converter_output(stdout: &str) -> ConverterReport {
    let mut report = ConverterReport::default();
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Title:") {
            report.title = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Authors:") {
            report.authors = Some(rest.trim().to_string());
        } else if line.starts_with("Physical Files") {
            if let Some(value) = line.splitn(2, ':').nth(1) {
                report.chapters = Some(value.trim().to_string());
            }
        } else if let Some(rest) = line.strip_prefix("Images extracted:") {
            report.images = Some(rest.trim().to_string());
        }
    }
    report
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

// ============================================================================
// 测试
// ============================================================================
