/// 状态管理相关类型定义

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::rc::Rc;

/// 状态订阅回调
///
/// 参数为订阅路径上的当前值（路径不存在时为 `None`）和触发通知的变更路径。
/// 通配符订阅者收到整棵状态树。
pub type StateCallback = Rc<dyn Fn(Option<&Value>, &str)>;

/// 类型化状态路径
///
/// 在点分隔路径上附带值类型，读写时通过serde转换
pub struct StatePath<T> {
    path: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StatePath<T> {
    pub const fn new(path: &'static str) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.path
    }
}

impl<T> Clone for StatePath<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StatePath<T> {}

impl<T> std::fmt::Debug for StatePath<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StatePath({})", self.path)
    }
}

/// 整棵状态树的快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// 状态数据
    pub data: Value,
    /// 快照时的状态版本
    pub version: u64,
    /// 快照时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateSnapshot {
    pub fn new(data: Value, version: u64) -> Self {
        Self {
            data,
            version,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 获取快照中的字段
    pub fn get_field(&self, field_path: &str) -> Option<&Value> {
        super::path::resolve(&self.data, field_path)
    }
}

/// 状态存储统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// 实际改变状态树的写入
    pub writes: u64,
    /// 因值未变化而跳过的写入
    pub skipped_writes: u64,
    /// 微任务刷新次数
    pub flushes: u64,
    /// 回调调用次数
    pub notifications: u64,
    /// 回调panic次数
    pub subscriber_errors: u64,
}
