//! 聊天模块
//!
//! 提示词注册表、消息装配与聊天中继。

mod error;
mod prompts;
mod relay;

pub use error::RelayError;
pub use prompts::{build_messages, registry, PromptDefinition, PromptKind};
pub use relay::{ChatCompletion, ChatRelay, ChatTurn, RelayEvent, RelayEventStream};
