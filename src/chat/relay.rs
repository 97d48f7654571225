//! 聊天中继
//!
//! 编排一次聊天回合：校验配置、装配消息、发起上游补全，
//! 并把增量内容按原始顺序转发给调用方。流式路径由生产者
//! 任务读上游、消费者经有界通道取事件，慢客户端不会让
//! 上游增量在内存里无限堆积。

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chat::{build_messages, RelayError};
use crate::config::ModelConfig;
use crate::library::Book;
use crate::provider::{
    ChatCompletionRequest, ChatMessage, ChatProvider, UpstreamEvent,
};

/// 生产者与消费者之间的事件缓冲容量
const EVENT_BUFFER: usize = 32;

// ============================================================================
// 回合与事件
// ============================================================================

/// 一次聊天回合的全部输入
///
/// 请求级生命周期，响应完成或出错后即丢弃，不做持久化。
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// 提示词类型标识
    pub prompt_type: String,
    /// 章节纯文本
    pub chapter_text: String,
    /// 章节标题
    pub chapter_title: String,
    /// 章节序号（1 起始，用于展示）
    pub chapter_num: usize,
    /// 章节总数
    pub total_chapters: usize,
    /// 书名
    pub book_title: String,
    /// 作者展示串
    pub authors: String,
    /// 出版社展示串
    pub publisher: String,
    /// 简介展示串
    pub description: String,
    /// 主题展示串
    pub subjects: String,
    /// 读者问题，仅 qa 类型有意义
    pub question: String,
    /// 会话历史，仅 qa 类型会被拼接
    pub history: Vec<ChatMessage>,
}

impl ChatTurn {
    /// 从书籍与章节下标构建回合
    ///
    /// 下标越界返回 `None`。元数据的缺省回退与展示格式
    /// 在这里一次定型。
    pub fn for_chapter(
        prompt_type: impl Into<String>,
        book: &Book,
        chapter_index: usize,
    ) -> Option<Self> {
        let chapter = book.chapter(chapter_index)?;
        Some(Self {
            prompt_type: prompt_type.into(),
            chapter_text: chapter.text.clone(),
            chapter_title: chapter.title.clone(),
            chapter_num: chapter_index + 1,
            total_chapters: book.chapter_count(),
            book_title: book.metadata.title.clone(),
            authors: book.metadata.authors_display(),
            publisher: book.metadata.publisher_display(),
            description: book.metadata.description_display(),
            subjects: book.metadata.subjects_display(),
            question: String::new(),
            history: Vec::new(),
        })
    }

    /// 设置读者问题
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }

    /// 设置会话历史
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// 中继对外产出的事件
///
/// `Done` 与 `Error` 均为终止事件，之后不再有任何事件。
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// 一段增量内容
    Content(String),
    /// 正常完成
    Done,
    /// 失败，携带错误描述
    Error(String),
}

/// 中继事件流
pub type RelayEventStream = Pin<Box<dyn Stream<Item = RelayEvent> + Send>>;

/// 非流式回合的结果
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    /// 完整回复内容
    pub content: String,
    /// 实际使用的模型
    pub model_used: String,
    /// 总 token 数，上游未提供时为 0
    pub tokens_used: u32,
}

// ============================================================================
// 聊天中继
// ============================================================================

/// 聊天中继
///
/// 依赖在构造时显式注入：一个提供商句柄和一份配置快照。
/// 配置变更通过重建中继生效，中继自身不持有可变状态。
pub struct ChatRelay {
    provider: Arc<dyn ChatProvider>,
    config: Option<ModelConfig>,
}

impl ChatRelay {
    /// 创建中继
    ///
    /// `config` 为 `None` 表示没有任何配置来源，回合会在
    /// 校验阶段直接失败，不发起上游调用。
    pub fn new(provider: Arc<dyn ChatProvider>, config: Option<ModelConfig>) -> Self {
        Self { provider, config }
    }

    /// 校验并取出可用配置
    ///
    /// 配置缺失或云端提供商缺少密钥都算未配置，
    /// 在任何网络调用之前暴露。
    fn usable_config(&self) -> Result<&ModelConfig, RelayError> {
        self.config
            .as_ref()
            .filter(|c| c.is_usable())
            .ok_or(RelayError::NotConfigured)
    }

    /// 装配最终的消息列表
    ///
    /// 基础顺序为 `[system, user]`；qa 类型且历史非空时拼为
    /// `[system] + history + [user]`。其他类型即使带了历史也
    /// 会被忽略，这是有意的策略而非遗漏。
    fn assemble_messages(&self, turn: &ChatTurn) -> Result<Vec<ChatMessage>, RelayError> {
        let (system, user) = build_messages(turn)?;

        let mut messages = Vec::with_capacity(turn.history.len() + 2);
        messages.push(system);
        if turn.prompt_type == "qa" && !turn.history.is_empty() {
            for entry in &turn.history {
                if entry.role != "user" && entry.role != "assistant" {
                    return Err(RelayError::InvalidHistory(format!(
                        "不支持的角色: {}",
                        entry.role
                    )));
                }
            }
            messages.extend(turn.history.iter().cloned());
        }
        messages.push(user);
        Ok(messages)
    }

    /// 完成校验与装配，产出上游请求
    fn prepare(&self, turn: &ChatTurn, stream: bool) -> Result<ChatCompletionRequest, RelayError> {
        let config = self.usable_config()?;
        let messages = self.assemble_messages(turn)?;
        Ok(ChatCompletionRequest {
            model: config.model.clone(),
            messages,
            temperature: Some(config.temperature),
            max_tokens: Some(config.max_tokens),
            stream,
        })
    }

    /// 非流式回合
    ///
    /// 供不能消费事件流的客户端使用，直接返回上游的完整
    /// 回复与用量统计。
    pub async fn complete(&self, turn: &ChatTurn) -> Result<ChatCompletion, RelayError> {
        let request = self.prepare(turn, false)?;
        info!(
            prompt = %turn.prompt_type,
            model = %request.model,
            book = %turn.book_title,
            "发起非流式聊天回合"
        );

        let response = self.provider.complete(&request).await?;
        Ok(ChatCompletion {
            content: response.content().to_string(),
            model_used: response
                .model
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            tokens_used: response.total_tokens(),
        })
    }

    /// 流式回合
    ///
    /// 返回的事件流以 `Content*` 后接一个终止事件结束。
    /// 校验或装配失败时流只含一个 `Error`，不发起上游调用。
    /// 调用方丢弃事件流即视为取消，生产者任务随之停止消费
    /// 上游并释放连接。
    pub fn stream(&self, turn: ChatTurn) -> RelayEventStream {
        let request = match self.prepare(&turn, true) {
            Ok(request) => request,
            Err(e) => {
                warn!(prompt = %turn.prompt_type, "聊天回合未通过校验: {}", e);
                let message = e.to_string();
                return Box::pin(futures::stream::once(async move {
                    RelayEvent::Error(message)
                }));
            }
        };

        info!(
            prompt = %turn.prompt_type,
            model = %request.model,
            book = %turn.book_title,
            "发起流式聊天回合"
        );

        let (tx, mut rx) = mpsc::channel::<RelayEvent>(EVENT_BUFFER);
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            pump_upstream(provider, request, tx).await;
        });

        Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                let terminal = !matches!(event, RelayEvent::Content(_));
                yield event;
                if terminal {
                    return;
                }
            }
        })
    }
}

/// 生产者任务：读上游流，把事件写入有界通道
///
/// 发送失败说明下游已断开，此时立即返回以丢弃上游连接，
/// 不把取消当作成功记录。
async fn pump_upstream(
    provider: Arc<dyn ChatProvider>,
    request: ChatCompletionRequest,
    tx: mpsc::Sender<RelayEvent>,
) {
    let mut upstream = match provider.stream(&request).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("上游流建立失败: {}", e.short_message());
            let _ = tx
                .send(RelayEvent::Error(RelayError::Upstream(e).to_string()))
                .await;
            return;
        }
    };

    let mut forwarded = 0usize;
    while let Some(next) = upstream.next().await {
        match next {
            Ok(UpstreamEvent::Chunk(chunk)) => {
                // 角色帧与空增量直接跳过，不转发空 Content
                let text = chunk.content_delta().unwrap_or("");
                if text.is_empty() {
                    continue;
                }
                if tx.send(RelayEvent::Content(text.to_string())).await.is_err() {
                    debug!(forwarded, "下游已断开，停止消费上游流");
                    return;
                }
                forwarded += 1;
            }
            Ok(UpstreamEvent::Done) => break,
            Err(e) => {
                warn!(forwarded, "上游流中途失败: {}", e.short_message());
                let _ = tx
                    .send(RelayEvent::Error(RelayError::Upstream(e).to_string()))
                    .await;
                return;
            }
        }
    }

    debug!(forwarded, "上游流正常结束");
    let _ = tx.send(RelayEvent::Done).await;
}

// ============================================================================
// 测试
// ============================================================================
