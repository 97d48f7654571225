//! 模型配置类型
//!
//! 定义上游聊天模型的连接配置，提供 serde 默认值、参数校验
//! 以及环境变量回退构建。

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConfigError;

// ============================================================================
// 模型配置
// ============================================================================

/// 模型配置
///
/// 描述一次聊天调用所使用的上游提供商与模型参数。
/// 配置对核心逻辑只读，每个请求取一次快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 提供商标识（openai / ollama / local）
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API 基础地址
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API 密钥
    ///
    /// 本地提供商允许为空；openai 缺失密钥视为未配置。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// 模型名称
    #[serde(default = "default_model")]
    pub model: String,

    /// 采样温度，范围 [0, 2]
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// 单次回复的最大 token 数
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    32_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl ModelConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置提供商
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// 设置基础地址
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 设置 API 密钥
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// 设置模型名称
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// 设置采样温度
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// 设置最大 token 数
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// 当前提供商是否必须携带 API 密钥
    ///
    /// 只有云端 openai 强制要求；ollama / local 等自托管提供商可匿名访问。
    pub fn requires_api_key(&self) -> bool {
        self.provider.eq_ignore_ascii_case("openai")
    }

    /// 配置是否可用于发起上游请求
    pub fn is_usable(&self) -> bool {
        if self.requires_api_key() {
            self.api_key
                .as_deref()
                .map(|k| !k.trim().is_empty())
                .unwrap_or(false)
        } else {
            true
        }
    }

    /// 校验参数范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "base_url",
                reason: "不能为空".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "model",
                reason: "不能为空".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidField {
                field: "temperature",
                reason: format!("必须在 [0, 2] 范围内，当前为 {}", self.temperature),
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidField {
                field: "max_tokens",
                reason: "必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    /// 从环境变量构建配置
    ///
    /// 仅当 `OPENAI_API_KEY` 非空时返回配置；其余变量缺省时
    /// 使用默认值，解析失败的数值变量同样回退默认值。
    /// 取值越界的配置整体视为未配置。
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;

        let mut config = Self::default().with_api_key(api_key);
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        if let Ok(raw) = std::env::var("OPENAI_TEMPERATURE") {
            if let Ok(value) = raw.parse::<f64>() {
                config.temperature = value;
            }
        }
        if let Ok(raw) = std::env::var("OPENAI_MAX_TOKENS") {
            if let Ok(value) = raw.parse::<u32>() {
                config.max_tokens = value;
            }
        }
        if let Err(e) = config.validate() {
            warn!("环境变量配置无效，忽略: {}", e);
            return None;
        }
        Some(config)
    }
}

// ============================================================================
// 测试
// ============================================================================
