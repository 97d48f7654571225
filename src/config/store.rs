//! 配置存储
//!
//! 将模型配置持久化为 JSON 文件，读取顺序为内存快照、
//! 配置文件、环境变量；环境变量命中后写回文件。

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;

// ============================================================================
// 错误定义
// ============================================================================

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 无法定位系统配置目录
    #[error("无法定位系统配置目录")]
    ConfigDirUnavailable,

    /// 文件读写失败
    #[error("配置文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 解析失败
    #[error("配置文件解析失败: {0}")]
    Parse(#[from] serde_json::Error),

    /// 字段取值非法
    #[error("配置项 {field} 无效: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

// ============================================================================
// 配置存储
// ============================================================================

/// 配置存储
///
/// 线程安全；多个请求并发读取时共享同一份内存快照。
pub struct ConfigStore {
    /// 配置文件路径
    path: PathBuf,
    /// 内存中的当前配置
    current: RwLock<Option<ModelConfig>>,
    /// 是否允许环境变量回退
    env_fallback: bool,
}

impl ConfigStore {
    /// 使用指定文件路径创建存储
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
            env_fallback: true,
        }
    }

    /// 使用系统配置目录下的默认路径创建存储
    ///
    /// 路径为 `{config_dir}/bookcast/config.json`。
    pub fn with_default_path() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir()
            .map(|d| d.join("bookcast"))
            .ok_or(ConfigError::ConfigDirUnavailable)?;
        Ok(Self::new(dir.join("config.json")))
    }

    /// 关闭环境变量回退
    pub fn with_env_fallback(mut self, enabled: bool) -> Self {
        self.env_fallback = enabled;
        self
    }

    /// 配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 获取当前模型配置
    ///
    /// 返回的配置不保证可用（密钥可能缺失），可用性由调用方
    /// 通过 [`ModelConfig::is_usable`] 判断。两个来源都没有
    /// 配置时返回 `None`。
    pub fn get_model_config(&self) -> Option<ModelConfig> {
        if let Some(config) = self.current.read().clone() {
            return Some(config);
        }

        if let Some(config) = self.load_from_file() {
            *self.current.write() = Some(config.clone());
            return Some(config);
        }

        if self.env_fallback {
            if let Some(config) = ModelConfig::from_env() {
                info!("从环境变量加载模型配置，写回配置文件");
                if let Err(e) = self.save_model_config(&config) {
                    warn!("写回环境变量配置失败: {}", e);
                    *self.current.write() = Some(config.clone());
                }
                return Some(config);
            }
        }

        None
    }

    /// 保存模型配置
    ///
    /// 先校验参数范围，再写文件并更新内存快照。
    pub fn save_model_config(&self, config: &ModelConfig) -> Result<(), ConfigError> {
        config.validate()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, json)?;
        *self.current.write() = Some(config.clone());
        debug!("模型配置已保存: {}", self.path.display());
        Ok(())
    }

    /// 丢弃内存快照，下次读取时重新走文件与环境变量
    pub fn reset(&self) {
        *self.current.write() = None;
    }

    fn load_from_file(&self) -> Option<ModelConfig> {
        if !self.path.exists() {
            return None;
        }
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<ModelConfig>(&raw) {
                Ok(config) => {
                    if let Err(e) = config.validate() {
                        warn!("配置文件参数无效，忽略: {}", e);
                        return None;
                    }
                    debug!("从文件加载模型配置: {}", self.path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("配置文件解析失败，忽略: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("配置文件读取失败，忽略: {}", e);
                None
            }
        }
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(dir.path().join("config.json")).with_env_fallback(false)
    }

    #[test]
    fn test_save_then_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let config = ModelConfig::default()
            .with_api_key("sk-test")
            .with_model("gpt-4o");
        store.save_model_config(&config).unwrap();

        assert_eq!(store.get_model_config(), Some(config));
    }

    #[test]
    fn test_get_reads_file_written_by_other_store() {
        let dir = TempDir::new().unwrap();
        let config = ModelConfig::default().with_api_key("sk-other");
        store_in(&dir).save_model_config(&config).unwrap();

        let fresh = store_in(&dir);
        assert_eq!(fresh.get_model_config(), Some(config));
    }

    #[test]
    fn test_missing_file_yields_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).get_model_config(), None);
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let store = ConfigStore::new(path).with_env_fallback(false);
        assert_eq!(store.get_model_config(), None);
    }

    #[test]
    fn test_out_of_range_file_config_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_key":"sk-bad","temperature":5.0,"max_tokens":0}"#,
        )
        .unwrap();

        let store = ConfigStore::new(path).with_env_fallback(false);
        assert_eq!(store.get_model_config(), None);
    }

    #[test]
    fn test_save_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let bad = ModelConfig::default().with_temperature(3.0);
        assert!(store.save_model_config(&bad).is_err());
        assert_eq!(store.get_model_config(), None);
    }

    #[test]
    fn test_reset_drops_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let config = ModelConfig::default().with_api_key("sk-reset");
        store.save_model_config(&config).unwrap();

        std::fs::remove_file(store.path()).unwrap();
        assert_eq!(store.get_model_config(), Some(config));

        store.reset();
        assert_eq!(store.get_model_config(), None);
    }
}
