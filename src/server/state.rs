//! 应用状态
//!
//! 书库、缓存、配置存储与提供商工厂的显式注入点。
//! 中继按请求从配置存储取快照构建，不存在进程级单例。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatRelay;
use crate::config::{ConfigStore, ModelConfig};
use crate::library::{BookCache, DiskLibrary, EpubIngestor};
use crate::provider::{ChatProvider, OpenAiClient};
use crate::server::DEFAULT_KEEP_ALIVE;

/// 由配置快照构建提供商的工厂
///
/// 测试通过注入工厂替换真实的 HTTP 客户端。
pub type ProviderFactory = Arc<dyn Fn(ModelConfig) -> Arc<dyn ChatProvider> + Send + Sync>;

/// 应用状态
///
/// 可廉价克隆，所有字段为共享句柄。书籍缓存是唯一跨请求
/// 共享的可变状态，其余均为请求本地。
#[derive(Clone)]
pub struct AppState {
    /// 磁盘书库
    pub library: Arc<DiskLibrary>,
    /// 书籍缓存
    pub cache: Arc<BookCache>,
    /// 模型配置存储
    pub config: Arc<ConfigStore>,
    /// EPUB 入库器
    pub ingestor: Arc<EpubIngestor>,
    /// 流式响应的保活间隔
    pub keep_alive: Duration,
    provider_factory: ProviderFactory,
}

impl AppState {
    /// 构建应用状态
    ///
    /// # 参数
    /// - `books_root`: 书库根目录
    /// - `config`: 模型配置存储
    /// - `cache_capacity`: 缓存的最大书籍数
    /// - `converter`: 外部 EPUB 转换命令的 argv 前缀
    pub fn new(
        books_root: impl Into<PathBuf>,
        config: ConfigStore,
        cache_capacity: usize,
        converter: Vec<String>,
    ) -> Self {
        let books_root = books_root.into();
        let library = Arc::new(DiskLibrary::new(&books_root));
        Self {
            cache: Arc::new(BookCache::new(library.clone(), cache_capacity)),
            ingestor: Arc::new(EpubIngestor::new(books_root, converter)),
            library,
            config: Arc::new(config),
            keep_alive: DEFAULT_KEEP_ALIVE,
            provider_factory: Arc::new(|config| {
                Arc::new(OpenAiClient::new(config)) as Arc<dyn ChatProvider>
            }),
        }
    }

    /// 替换提供商工厂
    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = factory;
        self
    }

    /// 调整保活间隔
    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// 用当前配置快照构建一个中继
    ///
    /// 配置编辑后的下一个回合自动拿到新快照，无需重启进程。
    pub fn relay(&self) -> ChatRelay {
        let config = self.config.get_model_config();
        let provider = (self.provider_factory)(config.clone().unwrap_or_default());
        ChatRelay::new(provider, config)
    }
}
