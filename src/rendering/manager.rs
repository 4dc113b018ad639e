/// 渲染管理器实现

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::core::event_loop::EventLoop;
use crate::core::guard::catch_callback_panic;

/// 渲染回调，参数为帧时间戳（毫秒）
pub type RenderCallback = Rc<dyn Fn(f64)>;

/// 渲染管理器配置
#[derive(Debug, Clone)]
pub struct RenderManagerConfig {
    /// 两次实际渲染之间的最小间隔（毫秒）
    pub min_frame_interval_ms: f64,
}

impl Default for RenderManagerConfig {
    fn default() -> Self {
        Self {
            min_frame_interval_ms: 16.0,
        }
    }
}

/// 渲染统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    /// 实际执行的帧
    pub frames_rendered: u64,
    /// 因最小间隔被跳过的帧
    pub frames_skipped: u64,
    /// 执行的回调数（去重后）
    pub callbacks_executed: u64,
    /// 回调panic次数
    pub callback_errors: u64,
    /// 强制渲染次数
    pub forced_renders: u64,
    /// 最近一帧回调耗时
    pub last_frame_duration: Duration,
}

pub(super) struct RenderInner {
    pub(super) event_loop: EventLoop,
    pending: RefCell<Vec<RenderCallback>>,
    frame_scheduled: Cell<bool>,
    last_render: Cell<Option<f64>>,
    min_frame_interval: Cell<f64>,
    stats: RefCell<RenderStats>,
}

/// 渲染管理器
///
/// 把一帧内到达的所有重绘请求合并为一次回调执行：
/// 同一回调在一帧内最多执行一次，不同回调按提交顺序执行。
#[derive(Clone)]
pub struct RenderManager {
    pub(super) inner: Rc<RenderInner>,
}

impl RenderManager {
    pub fn new(event_loop: EventLoop, config: RenderManagerConfig) -> Self {
        Self {
            inner: Rc::new(RenderInner {
                event_loop,
                pending: RefCell::new(Vec::new()),
                frame_scheduled: Cell::new(false),
                last_render: Cell::new(None),
                min_frame_interval: Cell::new(config.min_frame_interval_ms.max(0.0)),
                stats: RefCell::new(RenderStats::default()),
            }),
        }
    }

    pub(super) fn downgrade(&self) -> Weak<RenderInner> {
        Rc::downgrade(&self.inner)
    }

    pub(super) fn from_weak(weak: &Weak<RenderInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// 请求在下一帧渲染
    pub fn request_render(&self, callback: RenderCallback) {
        self.inner.pending.borrow_mut().push(callback);
        self.schedule_frame();
    }

    fn schedule_frame(&self) {
        if self.inner.frame_scheduled.replace(true) {
            return;
        }

        let weak = self.downgrade();
        self.inner.event_loop.request_animation_frame(move |timestamp| {
            if let Some(manager) = Self::from_weak(&weak) {
                manager.on_frame(timestamp);
            }
        });
    }

    fn on_frame(&self, timestamp: f64) {
        self.inner.frame_scheduled.set(false);

        if let Some(last) = self.inner.last_render.get() {
            if timestamp - last < self.inner.min_frame_interval.get() {
                self.inner.stats.borrow_mut().frames_skipped += 1;
                // 只有仍有待处理回调时才继续调度，避免空转
                if !self.inner.pending.borrow().is_empty() {
                    self.schedule_frame();
                }
                return;
            }
        }

        self.execute(timestamp);
    }

    fn execute(&self, timestamp: f64) {
        let batch = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if batch.is_empty() {
            return;
        }

        let mut unique: Vec<RenderCallback> = Vec::with_capacity(batch.len());
        for callback in batch {
            if !unique.iter().any(|seen| Rc::ptr_eq(seen, &callback)) {
                unique.push(callback);
            }
        }

        let started = Instant::now();
        let mut errors = 0u64;
        for callback in &unique {
            if let Err(message) = catch_callback_panic(|| callback(timestamp)) {
                errors += 1;
                log::error!("渲染回调执行失败 (帧时间 {:.1}ms): {}", timestamp, message);
            }
        }

        self.inner.last_render.set(Some(timestamp));
        let mut stats = self.inner.stats.borrow_mut();
        stats.frames_rendered += 1;
        stats.callbacks_executed += unique.len() as u64;
        stats.callback_errors += errors;
        stats.last_frame_duration = started.elapsed();
    }

    /// 立即同步渲染，不经过帧调度
    pub fn force_render(&self, callback: &RenderCallback) {
        let timestamp = self.inner.event_loop.now();
        self.inner.stats.borrow_mut().forced_renders += 1;

        if let Err(message) = catch_callback_panic(|| callback(timestamp)) {
            self.inner.stats.borrow_mut().callback_errors += 1;
            log::error!("强制渲染回调执行失败: {}", message);
        }
        self.inner.last_render.set(Some(timestamp));
    }

    /// 丢弃待处理回调；已调度的帧仍会触发，但没有工作可做
    pub fn cancel_pending(&self) {
        let dropped = std::mem::take(&mut *self.inner.pending.borrow_mut()).len();
        if dropped > 0 {
            log::debug!("取消 {} 个待渲染回调", dropped);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn is_frame_scheduled(&self) -> bool {
        self.inner.frame_scheduled.get()
    }

    pub fn set_min_frame_interval(&self, interval_ms: f64) {
        self.inner.min_frame_interval.set(interval_ms.max(0.0));
    }

    pub fn min_frame_interval(&self) -> f64 {
        self.inner.min_frame_interval.get()
    }

    pub fn stats(&self) -> RenderStats {
        self.inner.stats.borrow().clone()
    }

    pub fn reset_stats(&self) {
        *self.inner.stats.borrow_mut() = RenderStats::default();
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RenderManager {
        RenderManager::new(EventLoop::new(), RenderManagerConfig::default())
    }

    fn counter() -> (Rc<Cell<u32>>, RenderCallback) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, Rc::new(move |_: f64| c.set(c.get() + 1)))
    }

    #[test]
    fn test_requests_in_one_frame_are_coalesced() {
        let manager = manager();
        let (count, redraw) = counter();

        for _ in 0..5 {
            manager.request_render(redraw.clone());
        }
        assert_eq!(count.get(), 0);
        assert!(manager.is_frame_scheduled());
        assert_eq!(manager.event_loop().step_frame(16.0), 1);

        assert_eq!(count.get(), 1);
        assert_eq!(manager.stats().frames_rendered, 1);
        assert_eq!(manager.stats().callbacks_executed, 1);
        assert!(!manager.is_frame_scheduled());
    }

    #[test]
    fn test_distinct_callbacks_run_in_submission_order() {
        let manager = manager();
        let order = Rc::new(RefCell::new(Vec::new()));

        let callbacks: Vec<RenderCallback> = ["page", "overlay", "thumbnails"]
            .into_iter()
            .map(|name| {
                let o = order.clone();
                Rc::new(move |_: f64| o.borrow_mut().push(name)) as RenderCallback
            })
            .collect();

        manager.request_render(callbacks[1].clone());
        manager.request_render(callbacks[0].clone());
        manager.request_render(callbacks[1].clone());
        manager.request_render(callbacks[2].clone());
        manager.event_loop().step_frame(16.0);

        assert_eq!(*order.borrow(), vec!["overlay", "page", "thumbnails"]);
    }

    #[test]
    fn test_request_during_frame_runs_next_frame() {
        let manager = manager();
        let event_loop = manager.event_loop().clone();
        let hits = Rc::new(Cell::new(0));

        // 回调在执行中为自己再次请求渲染
        let slot: Rc<RefCell<Option<RenderCallback>>> = Rc::new(RefCell::new(None));
        let weak = manager.downgrade();
        let (h, s) = (hits.clone(), slot.clone());
        let redraw: RenderCallback = Rc::new(move |_: f64| {
            h.set(h.get() + 1);
            let again = s.borrow().clone();
            if let (Some(manager), Some(again)) = (RenderManager::from_weak(&weak), again) {
                if h.get() < 2 {
                    manager.request_render(again);
                }
            }
        });
        *slot.borrow_mut() = Some(redraw.clone());

        manager.request_render(redraw);
        event_loop.step_frame(16.0);
        assert_eq!(hits.get(), 1);
        assert_eq!(manager.pending_count(), 1);
        assert!(manager.is_frame_scheduled());

        event_loop.step_frame(16.0);
        assert_eq!(hits.get(), 2);
        assert!(!manager.is_frame_scheduled());
        assert_eq!(manager.stats().frames_rendered, 2);

        slot.borrow_mut().take();
    }

    #[test]
    fn test_frame_below_min_interval_is_skipped_not_dropped() {
        let manager = manager();
        let event_loop = manager.event_loop().clone();
        let (count, redraw) = counter();

        manager.request_render(redraw.clone());
        event_loop.step_frame(16.0);
        assert_eq!(count.get(), 1);

        manager.request_render(redraw.clone());
        event_loop.step_frame(5.0);
        assert_eq!(count.get(), 1);
        assert_eq!(manager.stats().frames_skipped, 1);
        assert!(manager.is_frame_scheduled());

        event_loop.step_frame(16.0);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_skipped_frame_without_work_does_not_reschedule() {
        let manager = manager();
        let event_loop = manager.event_loop().clone();
        let (_, redraw) = counter();

        manager.request_render(redraw.clone());
        event_loop.step_frame(16.0);

        manager.request_render(redraw);
        manager.cancel_pending();
        event_loop.step_frame(1.0);

        assert_eq!(manager.stats().frames_skipped, 1);
        assert!(!manager.is_frame_scheduled());
        assert!(!event_loop.has_pending_frame());
    }

    #[test]
    fn test_cancel_pending_leaves_frame_with_nothing_to_do() {
        let manager = manager();
        let (count, redraw) = counter();

        manager.request_render(redraw);
        manager.cancel_pending();
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(manager.event_loop().step_frame(16.0), 1);

        assert_eq!(count.get(), 0);
        assert_eq!(manager.stats().frames_rendered, 0);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_frame() {
        let manager = manager();
        let (count, redraw) = counter();

        manager.request_render(Rc::new(|_: f64| panic!("canvas lost")));
        manager.request_render(redraw);
        manager.event_loop().step_frame(16.0);

        assert_eq!(count.get(), 1);
        assert_eq!(manager.stats().callback_errors, 1);
    }

    #[test]
    fn test_force_render_is_synchronous() {
        let manager = manager();
        let (count, redraw) = counter();

        manager.force_render(&redraw);
        assert_eq!(count.get(), 1);
        assert_eq!(manager.stats().forced_renders, 1);
        assert!(!manager.is_frame_scheduled());
    }

    #[test]
    fn test_callback_receives_frame_timestamp() {
        let manager = manager();
        let seen = Rc::new(Cell::new(0.0));
        let s = seen.clone();

        manager.request_render(Rc::new(move |timestamp: f64| s.set(timestamp)));
        manager.event_loop().step_frame(33.0);
        assert_eq!(seen.get(), 33.0);
    }
}
