// 外部依赖
#[macro_use]
extern crate lazy_static;

// 核心模块
pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod rendering;
pub mod state;

// 重新导出主要类型
pub use app::AppRuntime;
pub use config::{ConfigError, ConfigManager, RuntimeConfig};
pub use crate::core::{EventLoop, ModuleRegistry, ModuleSpec, RenderLruCache, RenderedPage, Unsubscribe};
pub use error::{CacheError, EventBusError, ModuleError, RenderError, RuntimeError, StateError};
pub use events::{topics, EventBus, EventPriority, ListenerOptions};
pub use rendering::{RenderCallback, RenderManager, RenderManagerConfig};
pub use state::{paths, StateAdapter, StatePath, StateStore};

/// 库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 初始化日志系统
///
/// `RUST_LOG` 环境变量优先于传入的级别；重复初始化时忽略
pub fn init_logging(level: log::LevelFilter) {
    use std::io::Write;

    let result = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    if result.is_err() {
        log::debug!("日志系统已初始化，忽略重复初始化");
    }
}
