// 配置模块
// 运行时配置从TOML文件加载，文件缺失时可以回退到默认值

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod runtime_config;

pub use runtime_config::RuntimeConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// 配置管理器
pub struct ConfigManager {
    config_path: PathBuf,
    config: RuntimeConfig,
    loaded: bool,
}

impl ConfigManager {
    /// 默认路径 `page_runtime.toml`
    pub fn new() -> Self {
        Self::with_path("page_runtime.toml")
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            config: RuntimeConfig::default(),
            loaded: false,
        }
    }

    /// 加载并校验配置文件
    pub fn load(&mut self) -> Result<(), ConfigError> {
        self.config = load_from_path(&self.config_path)?;
        self.loaded = true;
        log::info!("配置已加载: {}", self.config_path.display());
        Ok(())
    }

    /// 加载失败时使用默认配置
    pub fn load_or_default(&mut self) -> &Self {
        if let Err(e) = self.load() {
            log::warn!("Failed to load config, using defaults: {}", e);
            self.config = RuntimeConfig::default();
            self.loaded = true;
        }
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// 保存当前配置
    pub fn save(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        let toml_str = toml::to_string_pretty(&self.config)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.config_path, toml_str)?;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 从文件读取运行时配置
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    RuntimeConfig::from_toml_str(&content)
}
