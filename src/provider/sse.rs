//! 上游 SSE 流解码
//!
//! OpenAI 兼容上游以 SSE 行帧返回增量：
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hello"}}]}
//! data: [DONE]
//! ```
//!
//! 网络层的字节块边界与行边界无关，解码器按行重组后
//! 把 `data:` 载荷解析为类型化事件。

use crate::provider::{ChatCompletionChunk, ProviderError};

/// 从上游流解出的类型化事件
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// 一个增量 chunk
    Chunk(ChatCompletionChunk),
    /// 流结束标记（`data: [DONE]`）
    Done,
}

/// SSE 行缓冲解码器
///
/// 逐块喂入字节，内部缓冲未闭合的行。行边界是 ASCII 换行，
/// 多字节字符不会跨行，整行再做 UTF-8 处理是安全的。
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// 创建解码器
    pub fn new() -> Self {
        Self::default()
    }

    /// 喂入一个字节块，返回解出的事件序列
    ///
    /// 载荷不是合法 JSON 时返回解析错误，调用方应终止流。
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<UpstreamEvent>, ProviderError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = Self::parse_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// 流收尾，冲出缓冲中最后一个未带换行的行
    pub fn finish(&mut self) -> Result<Option<UpstreamEvent>, ProviderError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let line: Vec<u8> = self.buffer.drain(..).collect();
        let line = String::from_utf8_lossy(&line);
        Self::parse_line(&line)
    }

    /// 解析单行
    ///
    /// 空行、注释行与 `data:` 之外的字段（`event:`、`id:` 等）
    /// 一律跳过。
    fn parse_line(line: &str) -> Result<Option<UpstreamEvent>, ProviderError> {
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with(':') {
            return Ok(None);
        }

        let data = match trimmed.strip_prefix("data:") {
            Some(rest) => rest.trim_start(),
            None => return Ok(None),
        };

        if data == "[DONE]" {
            return Ok(Some(UpstreamEvent::Done));
        }

        let chunk: ChatCompletionChunk = serde_json::from_str(data)
            .map_err(|e| ProviderError::ParseError(format!("无效的流式数据帧: {}", e)))?;
        Ok(Some(UpstreamEvent::Chunk(chunk)))
    }
}

// ============================================================================
// 测试
// ============================================================================
