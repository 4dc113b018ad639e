// 运行时配置结构
// 所有字段都有默认值，配置文件只需要写出要覆盖的字段

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// 运行时配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 页面位图缓存容量
    pub page_cache_capacity: usize,
    /// 缩略图缓存容量
    pub thumbnail_cache_capacity: usize,
    /// 两次实际渲染之间的最小间隔（毫秒）
    pub min_frame_interval_ms: f64,
    /// 驱动事件循环的帧间隔（毫秒）
    pub frame_interval_ms: u64,
    /// 记录事件总线调试历史
    pub event_debug: bool,
    /// 调试历史容量
    pub event_history_size: usize,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            page_cache_capacity: 20,
            thumbnail_cache_capacity: 100,
            min_frame_interval_ms: 16.0,
            frame_interval_ms: 16,
            event_debug: false,
            event_history_size: 100,
            log_level: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_cache_capacity == 0 {
            return Err(ConfigError::Invalid("page_cache_capacity must be at least 1".to_string()));
        }
        if self.thumbnail_cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "thumbnail_cache_capacity must be at least 1".to_string(),
            ));
        }
        if !self.min_frame_interval_ms.is_finite() || self.min_frame_interval_ms < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_frame_interval_ms must be a non-negative number, got {}",
                self.min_frame_interval_ms
            )));
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid("frame_interval_ms must be at least 1".to_string()));
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!("Unknown log level '{}'", self.log_level)));
        }
        Ok(())
    }

    /// 解析后的日志级别，无法识别时回退到 Info
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn with_page_cache_capacity(mut self, capacity: usize) -> Self {
        self.page_cache_capacity = capacity;
        self
    }

    pub fn with_thumbnail_cache_capacity(mut self, capacity: usize) -> Self {
        self.thumbnail_cache_capacity = capacity;
        self
    }

    pub fn with_min_frame_interval(mut self, interval_ms: f64) -> Self {
        self.min_frame_interval_ms = interval_ms;
        self
    }

    pub fn with_frame_interval(mut self, interval_ms: u64) -> Self {
        self.frame_interval_ms = interval_ms;
        self
    }

    pub fn with_event_debug(mut self, enabled: bool) -> Self {
        self.event_debug = enabled;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}
