//! 书籍内存缓存
//!
//! 有界 LRU 缓存，按标识符缓存已加载的书籍对象，
//! 未命中时调用加载器。同一标识符的并发未命中通过
//! 单航道闸门合并为一次磁盘读取。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::library::{Book, BookLoader};

// ============================================================================
// LRU 状态
// ============================================================================

/// LRU 内部状态
///
/// 访问顺序由 `access_order` 维护，队首最旧。
struct LruState {
    /// 书籍存储（标识符 -> 书籍）
    entries: HashMap<String, Arc<Book>>,
    /// 有序标识符列表（用于 LRU 驱逐）
    access_order: VecDeque<String>,
    /// 最大缓存数量
    max_size: usize,
}

impl LruState {
    fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size),
            access_order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// 命中时返回书籍并晋升为最新
    fn touch(&mut self, id: &str) -> Option<Arc<Book>> {
        let book = self.entries.get(id).cloned()?;
        self.promote(id);
        Some(book)
    }

    /// 插入书籍，已满时先驱逐最旧条目
    fn insert(&mut self, id: &str, book: Arc<Book>) {
        if self.entries.contains_key(id) {
            self.entries.insert(id.to_string(), book);
            self.promote(id);
            return;
        }

        while self.entries.len() >= self.max_size {
            self.evict_oldest();
        }

        self.entries.insert(id.to_string(), book);
        self.access_order.push_back(id.to_string());
    }

    fn promote(&mut self, id: &str) {
        if let Some(pos) = self.access_order.iter().position(|i| i == id) {
            self.access_order.remove(pos);
        }
        self.access_order.push_back(id.to_string());
    }

    /// 驱逐最久未访问的书籍
    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.access_order.pop_front() {
            self.entries.remove(&oldest);
            debug!("驱逐最久未访问的书籍: {}", oldest);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
    }
}

// ============================================================================
// 书籍缓存
// ============================================================================

/// 书籍缓存
///
/// 线程安全，支持并发读取。磁盘加载在锁外进行，
/// 驱逐与插入只持锁做内存操作。
pub struct BookCache {
    /// 未命中时的加载器
    loader: Arc<dyn BookLoader>,
    /// LRU 状态
    state: RwLock<LruState>,
    /// 单航道闸门（标识符 -> 加载锁）
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl BookCache {
    /// 创建缓存
    ///
    /// # 参数
    /// - `loader`: 未命中时调用的加载器
    /// - `capacity`: 最大缓存书籍数，最小取 1
    pub fn new(loader: Arc<dyn BookLoader>, capacity: usize) -> Self {
        Self {
            loader,
            state: RwLock::new(LruState::new(capacity.max(1))),
            in_flight: DashMap::new(),
        }
    }

    /// 获取书籍
    ///
    /// 命中时晋升为最新并直接返回；未命中时经单航道闸门
    /// 调用加载器。找不到或损坏的书返回 `None`，绝不恐慌。
    pub async fn get(&self, id: &str) -> Option<Arc<Book>> {
        if let Some(book) = self.state.write().touch(id) {
            return Some(book);
        }

        let gate = self
            .in_flight
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _permit = gate.lock().await;

        // 等闸门期间可能已被其他请求装入
        if let Some(book) = self.state.write().touch(id) {
            self.in_flight.remove(id);
            return Some(book);
        }

        let loader = Arc::clone(&self.loader);
        let key = id.to_string();
        let loaded = match tokio::task::spawn_blocking(move || loader.load(&key)).await {
            Ok(result) => result,
            Err(e) => {
                warn!("书籍加载任务异常退出: {}", e);
                None
            }
        };

        if let Some(book) = &loaded {
            self.state.write().insert(id, Arc::clone(book));
        }
        self.in_flight.remove(id);
        loaded
    }

    /// 清空全部缓存条目
    ///
    /// 新书入库后调用，保证后续列表反映磁盘上的最新内容。
    pub fn invalidate_all(&self) {
        let mut state = self.state.write();
        let count = state.len();
        state.clear();
        info!("书籍缓存已清空（{} 项）", count);
    }

    /// 当前缓存数量
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.state.read().len() == 0
    }

    /// 最大缓存数量
    pub fn capacity(&self) -> usize {
        self.state.read().max_size
    }

    /// 某书是否已驻留（不晋升）
    pub fn contains(&self, id: &str) -> bool {
        self.state.read().contains(id)
    }
}

// ============================================================================
// 测试
// ============================================================================


// ============================================================================
// 属性测试
// ============================================================================
