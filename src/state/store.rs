/// 状态存储实现

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::{Rc, Weak};

use super::path::{self, WILDCARD};
use super::schema;
use super::types::{StateCallback, StatePath, StateSnapshot, StoreStats};
use crate::core::event_loop::EventLoop;
use crate::core::guard::catch_callback_panic;
use crate::core::subscription::Unsubscribe;
use crate::error::{StateError, StateResult};
use crate::events::{topics, EventBus};

struct Subscriber {
    id: u64,
    callback: StateCallback,
}

/// 本轮待通知路径（去重，保持首次标记顺序）
#[derive(Default)]
struct PendingPaths {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl PendingPaths {
    fn insert(&mut self, path: &str) {
        if self.seen.insert(path.to_string()) {
            self.order.push(path.to_string());
        }
    }

    fn take(&mut self) -> Vec<String> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }
}

struct StoreInner {
    tree: RefCell<Value>,
    defaults: Value,
    // BTreeMap保证reset/restore时按路径顺序通知，父路径先于子路径
    subscribers: RefCell<BTreeMap<String, Vec<Subscriber>>>,
    pending: RefCell<PendingPaths>,
    flush_scheduled: Cell<bool>,
    version: Cell<u64>,
    next_id: Cell<u64>,
    stats: RefCell<StoreStats>,
    bus: EventBus,
    event_loop: EventLoop,
}

/// 状态存储
///
/// 路径寻址的状态树，写入后在同一个微任务中批量通知订阅者；
/// 每次实际变更同时以 `state:changed` 主题在事件总线上广播，供尚未迁移到直接订阅的组件使用。
#[derive(Clone)]
pub struct StateStore {
    inner: Rc<StoreInner>,
}

impl StateStore {
    /// 使用默认状态结构创建
    pub fn new(bus: EventBus) -> Self {
        Self::with_defaults(bus, schema::default_state())
    }

    /// 使用自定义默认状态创建
    pub fn with_defaults(bus: EventBus, defaults: Value) -> Self {
        let event_loop = bus.event_loop().clone();
        Self {
            inner: Rc::new(StoreInner {
                tree: RefCell::new(defaults.clone()),
                defaults,
                subscribers: RefCell::new(BTreeMap::new()),
                pending: RefCell::new(PendingPaths::default()),
                flush_scheduled: Cell::new(false),
                version: Cell::new(0),
                next_id: Cell::new(1),
                stats: RefCell::new(StoreStats::default()),
                bus,
                event_loop,
            }),
        }
    }

    fn downgrade(&self) -> Weak<StoreInner> {
        Rc::downgrade(&self.inner)
    }

    fn from_weak(weak: &Weak<StoreInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// 读取路径上的值（深拷贝），空路径返回整棵树
    pub fn get(&self, path: &str) -> Option<Value> {
        path::resolve(&self.inner.tree.borrow(), path).cloned()
    }

    /// 读取路径上的值（实时引用）
    ///
    /// 只读约定：持有期间不能写入状态，否则写入会因借用冲突而panic
    pub fn get_ref(&self, path: &str) -> Option<Ref<'_, Value>> {
        Ref::filter_map(self.inner.tree.borrow(), |tree| path::resolve(tree, path)).ok()
    }

    pub fn has(&self, path: &str) -> bool {
        path::resolve(&self.inner.tree.borrow(), path).is_some()
    }

    /// 写入值
    ///
    /// 新值与当前值深度相等时不写入、不通知，返回 `Ok(false)`
    pub fn set(&self, path: &str, value: Value) -> StateResult<bool> {
        if path.is_empty() {
            return Err(StateError::EmptyPath);
        }

        let old = {
            let tree = self.inner.tree.borrow();
            let current = path::resolve(&tree, path);
            if current == Some(&value) {
                self.inner.stats.borrow_mut().skipped_writes += 1;
                return Ok(false);
            }
            current.cloned()
        };

        path::write(&mut self.inner.tree.borrow_mut(), path, value.clone())?;
        self.record_write();
        self.mark_dirty(path);

        self.inner.bus.emit(
            topics::STATE_CHANGED,
            json!({ "path": path, "value": value, "oldValue": old }),
        );
        Ok(true)
    }

    /// 读-改-写
    pub fn update(&self, path: &str, f: impl FnOnce(Option<Value>) -> Value) -> StateResult<bool> {
        let next = f(self.get(path));
        self.set(path, next)
    }

    /// 批量写入
    ///
    /// 所有写入先在状态树副本上按顺序执行，全部成功后才替换状态树；
    /// 任何一条失败时返回错误，状态树、版本和通知都不受影响。
    /// 未变化的路径被跳过；所有通知在同一次刷新中送达，订阅者被调用时所有写入都已生效。返回实际变化的路径。
    pub fn batch<I, P>(&self, updates: I) -> StateResult<Vec<String>>
    where
        I: IntoIterator<Item = (P, Value)>,
        P: Into<String>,
    {
        let mut scratch = self.inner.tree.borrow().clone();
        let mut changes = Vec::new();
        let mut skipped = 0u64;

        for (path, value) in updates {
            let path = path.into();
            let current = path::resolve(&scratch, &path);
            if current == Some(&value) {
                skipped += 1;
                continue;
            }
            let old = current.cloned();
            path::write(&mut scratch, &path, value.clone())?;
            changes.push((path, value, old));
        }

        *self.inner.tree.borrow_mut() = scratch;
        self.inner.stats.borrow_mut().skipped_writes += skipped;
        for (path, _, _) in &changes {
            self.record_write();
            self.mark_dirty(path);
        }

        for (path, value, old) in &changes {
            self.inner.bus.emit(
                topics::STATE_CHANGED,
                json!({ "path": path, "value": value, "oldValue": old }),
            );
        }

        Ok(changes.into_iter().map(|(path, _, _)| path).collect())
    }

    fn record_write(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
        self.inner.stats.borrow_mut().writes += 1;
    }

    /// 标记路径待通知，本轮第一次标记时安排微任务刷新
    fn mark_dirty(&self, path: &str) {
        self.inner.pending.borrow_mut().insert(path);

        if !self.inner.flush_scheduled.replace(true) {
            let weak = self.downgrade();
            self.inner.event_loop.queue_microtask(move || {
                if let Some(store) = Self::from_weak(&weak) {
                    store.flush();
                }
            });
        }
    }

    /// 刷新本轮所有待通知路径
    fn flush(&self) {
        self.inner.flush_scheduled.set(false);
        let paths = self.inner.pending.borrow_mut().take();
        if paths.is_empty() {
            return;
        }

        self.inner.stats.borrow_mut().flushes += 1;
        log::trace!("状态刷新: {:?}", paths);

        for changed in &paths {
            self.notify_path(changed);
        }
    }

    fn callbacks_for(&self, path: &str) -> Vec<StateCallback> {
        self.inner
            .subscribers
            .borrow()
            .get(path)
            .map(|list| list.iter().map(|s| s.callback.clone()).collect())
            .unwrap_or_default()
    }

    /// 通知顺序：精确路径 → 祖先路径（由近及远）→ 通配符
    fn notify_path(&self, changed: &str) {
        let exact = self.callbacks_for(changed);
        if !exact.is_empty() {
            let value = self.get(changed);
            self.invoke_all(&exact, changed, value.as_ref(), changed);
        }

        for ancestor in path::ancestors(changed) {
            let callbacks = self.callbacks_for(ancestor);
            if !callbacks.is_empty() {
                let value = self.get(ancestor);
                self.invoke_all(&callbacks, ancestor, value.as_ref(), changed);
            }
        }

        let wildcard = self.callbacks_for(WILDCARD);
        if !wildcard.is_empty() {
            let tree = self.get("");
            self.invoke_all(&wildcard, WILDCARD, tree.as_ref(), changed);
        }
    }

    fn invoke_all(&self, callbacks: &[StateCallback], subscribed: &str, value: Option<&Value>, changed: &str) {
        for callback in callbacks {
            self.inner.stats.borrow_mut().notifications += 1;
            if let Err(message) = catch_callback_panic(|| callback(value, changed)) {
                self.inner.stats.borrow_mut().subscriber_errors += 1;
                log::error!(
                    "状态订阅者执行失败 (订阅路径: {}, 变更路径: {}): {}",
                    subscribed,
                    changed,
                    message
                );
            }
        }
    }

    /// 订阅路径（`"*"` 订阅所有变更）
    pub fn subscribe<F>(&self, path: &str, callback: F) -> Unsubscribe
    where
        F: Fn(Option<&Value>, &str) + 'static,
    {
        self.subscribe_shared(path, Rc::new(callback))
    }

    /// 订阅路径（共享回调）
    ///
    /// 同一回调在同一路径上只注册一次，重复订阅返回指向已有注册的句柄
    pub fn subscribe_shared(&self, path: &str, callback: StateCallback) -> Unsubscribe {
        let id = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            let list = subscribers.entry(path.to_string()).or_default();
            match list.iter().find(|s| Rc::ptr_eq(&s.callback, &callback)) {
                Some(existing) => {
                    log::debug!("回调已订阅路径 {}，忽略重复订阅", path);
                    existing.id
                }
                None => {
                    let id = self.inner.next_id.get();
                    self.inner.next_id.set(id + 1);
                    list.push(Subscriber { id, callback });
                    id
                }
            }
        };

        let weak = self.downgrade();
        let path = path.to_string();
        Unsubscribe::new(move || {
            if let Some(store) = Self::from_weak(&weak) {
                store.remove_subscriber(&path, id);
            }
        })
    }

    fn remove_subscriber(&self, path: &str, id: u64) {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        if let Some(list) = subscribers.get_mut(path) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subscribers.remove(path);
            }
        }
    }

    /// 读取类型化路径
    pub fn get_typed<T: DeserializeOwned>(&self, path: &StatePath<T>) -> StateResult<Option<T>> {
        match self.get_ref(path.as_str()) {
            Some(value) => T::deserialize(&*value)
                .map(Some)
                .map_err(|e| StateError::Conversion {
                    path: path.as_str().to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// 写入类型化路径
    pub fn set_typed<T: Serialize>(&self, path: &StatePath<T>, value: &T) -> StateResult<bool> {
        let value = serde_json::to_value(value).map_err(|e| StateError::Conversion {
            path: path.as_str().to_string(),
            message: e.to_string(),
        })?;
        self.set(path.as_str(), value)
    }

    /// 订阅类型化路径，值无法转换时收到 `None`
    pub fn subscribe_typed<T, F>(&self, path: &StatePath<T>, callback: F) -> Unsubscribe
    where
        T: DeserializeOwned + 'static,
        F: Fn(Option<T>) + 'static,
    {
        let typed_path = path.as_str();
        self.subscribe(typed_path, move |value, _| {
            let converted = value.and_then(|value| match T::deserialize(value) {
                Ok(converted) => Some(converted),
                Err(e) => {
                    log::warn!("路径 {} 的值无法转换: {}", typed_path, e);
                    None
                }
            });
            callback(converted);
        })
    }

    /// 重置为默认状态，并同步通知所有订阅者
    pub fn reset(&self) {
        *self.inner.tree.borrow_mut() = self.inner.defaults.clone();
        self.inner.pending.borrow_mut().take();
        self.inner.version.set(self.inner.version.get() + 1);

        let registrations: Vec<(String, Vec<StateCallback>)> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(path, list)| (path.clone(), list.iter().map(|s| s.callback.clone()).collect()))
            .collect();

        for (subscribed, callbacks) in &registrations {
            let value = if subscribed == WILDCARD {
                self.get("")
            } else {
                self.get(subscribed)
            };
            self.invoke_all(callbacks, subscribed, value.as_ref(), subscribed);
        }

        log::info!("状态已重置，通知 {} 个订阅路径", registrations.len());
        self.inner.bus.emit(topics::STATE_RESET, Value::Null);
    }

    /// 整棵树的快照
    pub fn get_snapshot(&self) -> StateSnapshot {
        StateSnapshot::new(self.inner.tree.borrow().clone(), self.inner.version.get())
    }

    /// 从快照恢复，为每个有订阅者的路径安排通知
    pub fn restore(&self, snapshot: &StateSnapshot) {
        *self.inner.tree.borrow_mut() = snapshot.data.clone();
        self.inner.version.set(self.inner.version.get() + 1);

        let paths: Vec<String> = self.inner.subscribers.borrow().keys().cloned().collect();
        let mut scheduled = false;
        for subscribed in paths.iter().filter(|p| p.as_str() != WILDCARD) {
            self.mark_dirty(subscribed);
            scheduled = true;
        }
        // 只有通配符订阅者时，以根路径触发一次通知
        if !scheduled && paths.iter().any(|p| p == WILDCARD) {
            self.mark_dirty("");
        }

        self.inner.bus.emit(
            topics::STATE_RESTORED,
            json!({ "version": snapshot.version }),
        );
    }

    /// 状态版本，每次实际变更递增
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.inner.subscribers.borrow().get(path).map_or(0, Vec::len)
    }

    /// 本轮等待刷新的路径
    pub fn pending_paths(&self) -> Vec<String> {
        self.inner.pending.borrow().order.clone()
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.stats.borrow().clone()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }
}
