use chrono::{DateTime, Utc};
use serde_json::Value;
use std::rc::Rc;

/// 事件监听器
pub type Listener = Rc<dyn Fn(&Value)>;

/// 全局监听器（兼容广播），参数为主题和载荷
pub type GlobalListener = Rc<dyn Fn(&str, &Value)>;

/// 运行时内置的事件主题
pub mod topics {
    /// 状态变更的兼容广播，载荷 `{path, value, oldValue}`
    pub const STATE_CHANGED: &str = "state:changed";
    /// 状态树重置
    pub const STATE_RESET: &str = "state:reset";
    /// 状态树从快照恢复
    pub const STATE_RESTORED: &str = "state:restored";
    /// 文档加载完成
    pub const DOCUMENT_LOADED: &str = "document:loaded";
    /// 页面位图渲染完成
    pub const PAGE_RENDERED: &str = "page:rendered";
    /// 绘图工具切换
    pub const TOOL_CHANGED: &str = "tool:changed";
}

/// 监听器优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Low = -100,
    Normal = 0,
    High = 100,
    Critical = 1000,
}

impl EventPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventPriority::Critical => "Critical",
            EventPriority::High => "High",
            EventPriority::Normal => "Normal",
            EventPriority::Low => "Low",
        }
    }
}

impl From<EventPriority> for i32 {
    fn from(priority: EventPriority) -> Self {
        priority as i32
    }
}

/// 注册选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// 数值越大越先执行，相同优先级按注册顺序
    pub priority: i32,
    /// 一次性监听器：在普通监听器之后执行并移除
    pub once: bool,
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn once() -> Self {
        Self {
            priority: 0,
            once: true,
        }
    }

    pub fn with_priority(mut self, priority: impl Into<i32>) -> Self {
        self.priority = priority.into();
        self
    }
}

/// 发布选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    /// 同步分发；为false时推迟到微任务
    pub sync: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self { sync: true }
    }
}

impl EmitOptions {
    pub fn deferred() -> Self {
        Self { sync: false }
    }
}

/// 调试模式下的事件记录
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub topic: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    /// 分发时的监听器数量（含一次性监听器）
    pub listener_count: usize,
}

/// 事件总线统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventBusStats {
    pub total_events_published: u64,
    pub total_events_processed: u64,
    pub handler_errors: u64,
}
