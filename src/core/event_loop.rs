/// 协作式事件循环
///
/// 运行时所有延迟执行都经过这里：
/// - 微任务队列 (状态通知刷新、异步事件分发)
/// - 动画帧回调 (渲染调度、动画驱动)
/// - 一次性定时器 (防抖/节流包装、等待超时)
///
/// 单线程模型：所有句柄都是 `Rc`，不能跨线程。时钟以毫秒为单位，
/// 测试中通过 `advance`/`step_frame` 手动推进，生产环境由 `drive` 按真实时间推进。

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use super::guard::catch_callback_panic;

/// 微任务/定时器任务
pub type Task = Box<dyn FnOnce()>;
/// 帧回调，参数为帧时间戳（毫秒）
pub type FrameTask = Box<dyn FnOnce(f64)>;

/// 动画帧句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

/// 定时器句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Timer {
    id: u64,
    deadline: f64,
    task: Task,
}

struct LoopInner {
    clock: Cell<f64>,
    microtasks: RefCell<VecDeque<Task>>,
    frames: RefCell<Vec<(FrameId, FrameTask)>>,
    timers: RefCell<Vec<Timer>>,
    next_id: Cell<u64>,
    frame_count: Cell<u64>,
    draining: Cell<bool>,
}

/// 事件循环句柄（克隆共享同一个循环）
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(LoopInner {
                clock: Cell::new(0.0),
                microtasks: RefCell::new(VecDeque::new()),
                frames: RefCell::new(Vec::new()),
                timers: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
                frame_count: Cell::new(0),
                draining: Cell::new(false),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        id
    }

    /// 当前时钟（毫秒）
    pub fn now(&self) -> f64 {
        self.inner.clock.get()
    }

    /// 已执行的帧数
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count.get()
    }

    /// 加入微任务队列
    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.inner.microtasks.borrow_mut().push_back(Box::new(task));
    }

    /// 微任务检查点：清空队列（执行期间新加入的任务也在本轮执行）
    pub fn run_microtasks(&self) -> usize {
        if self.inner.draining.replace(true) {
            return 0;
        }

        let mut executed = 0;
        loop {
            let task = self.inner.microtasks.borrow_mut().pop_front();
            let Some(task) = task else { break };
            if let Err(message) = catch_callback_panic(task) {
                log::error!("微任务执行失败: {}", message);
            }
            executed += 1;
        }

        self.inner.draining.set(false);
        executed
    }

    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.borrow().len()
    }

    /// 请求下一帧回调
    pub fn request_animation_frame(&self, callback: impl FnOnce(f64) + 'static) -> FrameId {
        let id = FrameId(self.next_id());
        self.inner.frames.borrow_mut().push((id, Box::new(callback)));
        id
    }

    /// 取消尚未执行的帧回调
    pub fn cancel_animation_frame(&self, id: FrameId) -> bool {
        let mut frames = self.inner.frames.borrow_mut();
        let before = frames.len();
        frames.retain(|(frame_id, _)| *frame_id != id);
        frames.len() != before
    }

    pub fn has_pending_frame(&self) -> bool {
        !self.inner.frames.borrow().is_empty()
    }

    /// 设置一次性定时器
    pub fn set_timeout(&self, delay_ms: f64, task: impl FnOnce() + 'static) -> TimerId {
        let id = self.next_id();
        let deadline = self.now() + delay_ms.max(0.0);
        self.inner.timers.borrow_mut().push(Timer {
            id,
            deadline,
            task: Box::new(task),
        });
        TimerId(id)
    }

    /// 清除定时器，已触发或不存在时返回false
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let mut timers = self.inner.timers.borrow_mut();
        let before = timers.len();
        timers.retain(|timer| timer.id != id.0);
        timers.len() != before
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// 推进时钟，按截止时间顺序触发到期定时器
    pub fn advance(&self, ms: f64) {
        let target = self.now() + ms.max(0.0);
        self.run_microtasks();

        loop {
            let next = {
                let mut timers = self.inner.timers.borrow_mut();
                let due = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.deadline <= target)
                    .min_by(|(_, a), (_, b)| {
                        a.deadline.total_cmp(&b.deadline).then(a.id.cmp(&b.id))
                    })
                    .map(|(index, _)| index);
                due.map(|index| timers.remove(index))
            };

            let Some(timer) = next else { break };
            if timer.deadline > self.now() {
                self.inner.clock.set(timer.deadline);
            }
            if let Err(message) = catch_callback_panic(timer.task) {
                log::error!("定时器 {} 执行失败: {}", timer.id, message);
            }
            self.run_microtasks();
        }

        self.inner.clock.set(target);
    }

    /// 执行一帧：帧开始前已请求的回调全部执行，帧内新请求的回调留到下一帧
    pub fn run_frame(&self) -> usize {
        self.run_microtasks();

        let batch = std::mem::take(&mut *self.inner.frames.borrow_mut());
        let frame = self.inner.frame_count.get() + 1;
        self.inner.frame_count.set(frame);
        let timestamp = self.now();

        let count = batch.len();
        for (id, callback) in batch {
            if let Err(message) = catch_callback_panic(|| callback(timestamp)) {
                log::error!("帧 {} 回调 {:?} 执行失败: {}", frame, id, message);
            }
            self.run_microtasks();
        }

        count
    }

    /// 一个显示帧：推进时钟后执行帧回调
    pub fn step_frame(&self, frame_ms: f64) -> usize {
        self.advance(frame_ms);
        self.run_frame()
    }

    /// 按真实时间驱动事件循环
    ///
    /// 每个tick把时钟同步到流逝的时间、触发定时器并执行一帧。
    /// `max_frames` 为 `None` 时永不返回。
    pub async fn drive(&self, frame_interval: Duration, max_frames: Option<u64>) {
        let start = tokio::time::Instant::now();
        let base = self.now();
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut frames = 0u64;
        loop {
            ticker.tick().await;

            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            let delta = (base + elapsed_ms - self.now()).max(0.0);
            self.advance(delta);
            self.run_frame();

            frames += 1;
            if max_frames.is_some_and(|max| frames >= max) {
                log::debug!("事件循环驱动结束，共 {} 帧", frames);
                break;
            }
        }
    }
}
