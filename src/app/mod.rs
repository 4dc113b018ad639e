/// 应用运行时装配
///
/// 组件之间不通过全局单例互相查找，而是由 `AppRuntime` 创建并显式传递。

pub mod runtime;

pub use runtime::{create_event_bus, create_page_cache, create_store, AppRuntime, SharedPageCache};
