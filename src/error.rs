// 运行时错误处理
//
// 本文件定义了运行时各子系统的错误类型：
// - StateError：状态树路径写入错误
// - EventBusError：事件等待超时、通道取消
// - RenderError：动画驱动失败
// - CacheError：渲染缓存配置错误
// - ModuleError：模块依赖图错误（循环依赖、工厂失败）
// - RuntimeError：应用运行时装配失败（配置、缓存、模块）
//
// 监听器/订阅者的panic不会出现在这里：它们在分发点被捕获并记录日志，
// 不会传播给调用方。

use thiserror::Error;

/// 状态树错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// 空路径不能作为写入目标
    #[error("State path must not be empty")]
    EmptyPath,

    /// 数组段不是合法索引
    #[error("Segment '{segment}' of path '{path}' is not a valid array index")]
    InvalidIndex { path: String, segment: String },

    /// 数组索引越界
    #[error("Index {index} out of range (len {len}) at path '{path}'")]
    IndexOutOfRange { path: String, index: usize, len: usize },

    /// 标量值无法继续写入子路径
    #[error("Cannot write through scalar value at path '{path}'")]
    NotAContainer { path: String },

    /// 类型化路径的序列化/反序列化失败
    #[error("Value at path '{path}' has unexpected shape: {message}")]
    Conversion { path: String, message: String },
}

/// 事件总线错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// 等待事件超时
    #[error("Timed out after {timeout_ms}ms waiting for '{topic}'")]
    Timeout { topic: String, timeout_ms: u64 },

    /// 等待方在事件到达前被丢弃
    #[error("Wait for '{topic}' was cancelled")]
    Cancelled { topic: String },
}

/// 渲染错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// 动画函数在帧内panic
    #[error("Animator panicked at progress {progress:.3}: {message}")]
    AnimatorPanicked { progress: f64, message: String },

    /// 动画在完成前被取消（事件循环被丢弃）
    #[error("Animation was cancelled before completion")]
    AnimationCancelled,
}

/// 渲染缓存错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache '{name}' requires a non-zero capacity")]
    ZeroCapacity { name: String },
}

/// 模块注册表错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// 依赖图中存在环
    #[error("Circular dependency detected at module '{module}'")]
    CircularDependency { module: String },

    /// 模块工厂返回失败
    #[error("Factory for module '{module}' failed: {message}")]
    FactoryFailed { module: String, message: String },

    /// 工厂请求了未初始化的依赖
    #[error("Module '{module}' requested dependency '{dependency}' which is not available")]
    MissingDependency { module: String, dependency: String },
}

impl StateError {
    /// 是否可恢复
    ///
    /// 路径错误都是调用方的编程错误，但不会破坏状态树，调用方可以继续运行
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StateError::EmptyPath)
    }
}

impl EventBusError {
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

impl ModuleError {
    /// 创建工厂失败错误
    pub fn factory(module: impl Into<String>, message: impl Into<String>) -> Self {
        ModuleError::FactoryFailed {
            module: module.into(),
            message: message.into(),
        }
    }

    /// 配置类错误（依赖环）必须终止启动
    pub fn is_recoverable(&self) -> bool {
        match self {
            ModuleError::CircularDependency { .. } => false,
            ModuleError::MissingDependency { .. } => false,
            ModuleError::FactoryFailed { .. } => true,
        }
    }

    /// 出错的模块名
    pub fn module(&self) -> &str {
        match self {
            ModuleError::CircularDependency { module }
            | ModuleError::FactoryFailed { module, .. }
            | ModuleError::MissingDependency { module, .. } => module,
        }
    }
}

/// 运行时装配错误
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Module(#[from] ModuleError),
}

pub type StateResult<T> = Result<T, StateError>;
pub type ModuleResult<T> = Result<T, ModuleError>;
