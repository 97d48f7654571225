//! 书库模块
//!
//! 书籍数据模型、磁盘加载、LRU 缓存与 EPUB 入库。

mod cache;
mod ingest;
mod loader;
mod models;

pub use cache::BookCache;
pub use ingest::{ConverterReport, EpubIngestor, IngestError, IngestedBook};
pub use loader::{BookLoader, DiskLibrary, BOOK_FILE, DATA_DIR_SUFFIX};
pub use models::{Book, BookMetadata, BookSummary, Chapter, TocEntry};
