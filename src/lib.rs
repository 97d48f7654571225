//! bookcast —— 电子书阅读与 AI 聊天中继服务
//!
//! 提供解析后电子书内容的 HTTP 读取接口，并把上游语言模型
//! 的增量回复以 SSE 实时转发给浏览器。核心是有界的书籍 LRU
//! 缓存与按序无延迟的流式聊天中继；EPUB 解析由外部转换器
//! 完成，本服务只读取其落盘产物。

pub mod chat;
pub mod config;
pub mod library;
pub mod provider;
pub mod server;
