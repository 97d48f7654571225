//! 配置管理模块
//!
//! 提供模型配置的类型定义与 JSON 文件持久化，
//! 并支持环境变量回退。

mod store;
mod types;

pub use store::{ConfigError, ConfigStore};
pub use types::ModelConfig;
