use futures::channel::oneshot;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;

use super::event_types::{
    EmitOptions, EventBusStats, EventRecord, GlobalListener, Listener, ListenerOptions,
};
use crate::core::event_loop::{EventLoop, TimerId};
use crate::core::guard::catch_callback_panic;
use crate::core::subscription::Unsubscribe;
use crate::error::EventBusError;

/// 调试历史默认容量
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

struct Registration {
    id: u64,
    callback: Listener,
    priority: i32,
}

struct BusInner {
    event_loop: EventLoop,
    // 按优先级降序排列，相同优先级保持注册顺序
    listeners: RefCell<HashMap<String, Vec<Registration>>>,
    once_listeners: RefCell<HashMap<String, Vec<Registration>>>,
    // 兼容广播：接收所有主题
    global_listeners: RefCell<Vec<(u64, GlobalListener)>>,
    history: RefCell<VecDeque<EventRecord>>,
    history_limit: usize,
    debug: Cell<bool>,
    stats: RefCell<EventBusStats>,
    next_id: Cell<u64>,
}

/// 事件总线 - 基于主题的发布订阅
///
/// 克隆得到的是同一条总线的句柄
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl EventBus {
    pub fn new(event_loop: EventLoop) -> Self {
        Self::with_history_limit(event_loop, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(event_loop: EventLoop, history_limit: usize) -> Self {
        Self {
            inner: Rc::new(BusInner {
                event_loop,
                listeners: RefCell::new(HashMap::new()),
                once_listeners: RefCell::new(HashMap::new()),
                global_listeners: RefCell::new(Vec::new()),
                history: RefCell::new(VecDeque::with_capacity(history_limit)),
                history_limit,
                debug: Cell::new(false),
                stats: RefCell::new(EventBusStats::default()),
                next_id: Cell::new(1),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        id
    }

    /// 订阅主题
    pub fn on<F>(&self, topic: &str, callback: F, options: ListenerOptions) -> Unsubscribe
    where
        F: Fn(&Value) + 'static,
    {
        self.on_shared(topic, Rc::new(callback), options)
    }

    /// 订阅主题（共享回调，可用 `off` 按标识移除）
    pub fn on_shared(&self, topic: &str, callback: Listener, options: ListenerOptions) -> Unsubscribe {
        let id = self.next_id();
        let registration = Registration {
            id,
            callback,
            priority: options.priority,
        };

        {
            let map = if options.once {
                &self.inner.once_listeners
            } else {
                &self.inner.listeners
            };
            let mut map = map.borrow_mut();
            let list = map.entry(topic.to_string()).or_default();
            let position = list
                .iter()
                .position(|existing| existing.priority < registration.priority)
                .unwrap_or(list.len());
            list.insert(position, registration);
        }

        let weak = Rc::downgrade(&self.inner);
        let topic = topic.to_string();
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                EventBus { inner }.remove_by_id(&topic, id);
            }
        })
    }

    /// 一次性订阅
    pub fn once<F>(&self, topic: &str, callback: F) -> Unsubscribe
    where
        F: Fn(&Value) + 'static,
    {
        self.on(topic, callback, ListenerOptions::once())
    }

    /// 订阅所有主题（兼容广播）
    pub fn on_any<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&str, &Value) + 'static,
    {
        let id = self.next_id();
        self.inner
            .global_listeners
            .borrow_mut()
            .push((id, Rc::new(callback)));

        let weak = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.global_listeners.borrow_mut().retain(|(gid, _)| *gid != id);
            }
        })
    }

    fn remove_by_id(&self, topic: &str, id: u64) -> bool {
        let mut removed = false;
        for map in [&self.inner.listeners, &self.inner.once_listeners] {
            let mut map = map.borrow_mut();
            if let Some(list) = map.get_mut(topic) {
                let before = list.len();
                list.retain(|registration| registration.id != id);
                removed |= list.len() != before;
                if list.is_empty() {
                    map.remove(topic);
                }
            }
        }
        removed
    }

    /// 按回调标识移除监听器
    pub fn off(&self, topic: &str, callback: &Listener) -> bool {
        let mut removed = false;
        for map in [&self.inner.listeners, &self.inner.once_listeners] {
            let mut map = map.borrow_mut();
            if let Some(list) = map.get_mut(topic) {
                let before = list.len();
                list.retain(|registration| !Rc::ptr_eq(&registration.callback, callback));
                removed |= list.len() != before;
                if list.is_empty() {
                    map.remove(topic);
                }
            }
        }
        removed
    }

    /// 移除主题的所有监听器
    pub fn off_all(&self, topic: &str) {
        self.inner.listeners.borrow_mut().remove(topic);
        self.inner.once_listeners.borrow_mut().remove(topic);
    }

    /// 同步发布事件
    pub fn emit(&self, topic: &str, payload: Value) {
        self.emit_with(topic, payload, EmitOptions::default());
    }

    /// 发布事件
    ///
    /// 异步发布推迟到微任务，同一轮内多次异步发布按调用顺序分发
    pub fn emit_with(&self, topic: &str, payload: Value, options: EmitOptions) {
        self.inner.stats.borrow_mut().total_events_published += 1;

        if options.sync {
            self.dispatch(topic, &payload);
        } else {
            let bus = self.clone();
            let topic = topic.to_string();
            self.inner
                .event_loop
                .queue_microtask(move || bus.dispatch(&topic, &payload));
        }
    }

    /// 批量发布：在同一个微任务内按顺序分发
    pub fn emit_batch(&self, events: Vec<(String, Value)>) {
        if events.is_empty() {
            return;
        }
        self.inner.stats.borrow_mut().total_events_published += events.len() as u64;

        let bus = self.clone();
        self.inner.event_loop.queue_microtask(move || {
            for (topic, payload) in &events {
                bus.dispatch(topic, payload);
            }
        });
    }

    /// 分发单个事件：普通监听器 → 一次性监听器 → 兼容广播
    fn dispatch(&self, topic: &str, payload: &Value) {
        let regular: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .get(topic)
            .map(|list| list.iter().map(|r| r.callback.clone()).collect())
            .unwrap_or_default();
        let once: Vec<Listener> = self
            .inner
            .once_listeners
            .borrow_mut()
            .remove(topic)
            .map(|list| list.into_iter().map(|r| r.callback).collect())
            .unwrap_or_default();

        if self.inner.debug.get() {
            self.record(topic, payload, regular.len() + once.len());
        }

        for callback in regular.iter().chain(once.iter()) {
            if let Err(message) = catch_callback_panic(|| callback(payload)) {
                self.inner.stats.borrow_mut().handler_errors += 1;
                log::error!("事件 {} 的监听器执行失败: {}", topic, message);
            }
        }

        let global: Vec<GlobalListener> = self
            .inner
            .global_listeners
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in global {
            if let Err(message) = catch_callback_panic(|| callback(topic, payload)) {
                self.inner.stats.borrow_mut().handler_errors += 1;
                log::error!("事件 {} 的全局监听器执行失败: {}", topic, message);
            }
        }

        self.inner.stats.borrow_mut().total_events_processed += 1;
    }

    fn record(&self, topic: &str, payload: &Value, listener_count: usize) {
        let mut history = self.inner.history.borrow_mut();
        if history.len() >= self.inner.history_limit {
            history.pop_front();
        }
        if self.inner.history_limit > 0 {
            history.push_back(EventRecord {
                topic: topic.to_string(),
                payload: payload.clone(),
                timestamp: chrono::Utc::now(),
                listener_count,
            });
        }
    }

    /// 等待主题的下一个事件
    ///
    /// `timeout_ms > 0` 时超时返回 `EventBusError::Timeout`，并移除挂起的监听器
    pub fn wait_for(
        &self,
        topic: &str,
        timeout_ms: u64,
    ) -> impl Future<Output = Result<Value, EventBusError>> {
        let (sender, receiver) = oneshot::channel::<Result<Value, EventBusError>>();
        let sender = Rc::new(RefCell::new(Some(sender)));
        let timer: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));

        let listener: Listener = {
            let sender = sender.clone();
            let timer = timer.clone();
            let event_loop = self.inner.event_loop.clone();
            Rc::new(move |payload: &Value| {
                if let Some(id) = timer.take() {
                    event_loop.clear_timeout(id);
                }
                if let Some(sender) = sender.borrow_mut().take() {
                    let _ = sender.send(Ok(payload.clone()));
                }
            })
        };
        self.on_shared(topic, listener.clone(), ListenerOptions::once());

        if timeout_ms > 0 {
            let bus = self.clone();
            let topic = topic.to_string();
            let id = self.inner.event_loop.set_timeout(timeout_ms as f64, move || {
                bus.off(&topic, &listener);
                if let Some(sender) = sender.borrow_mut().take() {
                    log::debug!("等待事件 {} 超时 ({}ms)", topic, timeout_ms);
                    let _ = sender.send(Err(EventBusError::Timeout { topic, timeout_ms }));
                }
            });
            timer.set(Some(id));
        }

        let topic = topic.to_string();
        async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(EventBusError::Cancelled { topic }),
            }
        }
    }

    /// 主题上的监听器数量（含一次性监听器）
    pub fn listener_count(&self, topic: &str) -> usize {
        let regular = self.inner.listeners.borrow().get(topic).map_or(0, Vec::len);
        let once = self.inner.once_listeners.borrow().get(topic).map_or(0, Vec::len);
        regular + once
    }

    pub fn has_listeners(&self, topic: &str) -> bool {
        self.listener_count(topic) > 0
    }

    /// 开启/关闭调试历史
    pub fn set_debug(&self, enabled: bool) {
        self.inner.debug.set(enabled);
        if !enabled {
            self.inner.history.borrow_mut().clear();
        }
    }

    pub fn is_debug(&self) -> bool {
        self.inner.debug.get()
    }

    /// 调试历史（旧 → 新）
    pub fn history(&self) -> Vec<EventRecord> {
        self.inner.history.borrow().iter().cloned().collect()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// 获取统计信息
    pub fn stats(&self) -> EventBusStats {
        self.inner.stats.borrow().clone()
    }

    /// 重置统计信息
    pub fn reset_stats(&self) {
        *self.inner.stats.borrow_mut() = EventBusStats::default();
    }
}
