/// 防抖/节流渲染请求包装
///
/// 包装函数本身不渲染，只决定何时调用 `request_render`，
/// 因此包装后的请求同样受帧合并和最小帧间隔约束。

use std::cell::Cell;
use std::rc::Rc;

use super::manager::{RenderCallback, RenderManager};
use crate::core::event_loop::TimerId;

/// 渲染请求触发器
pub type RenderTrigger = Rc<dyn Fn()>;

impl RenderManager {
    /// 防抖：最后一次触发后 `delay_ms` 内没有新触发才请求渲染
    pub fn create_debounced_render(&self, callback: RenderCallback, delay_ms: f64) -> RenderTrigger {
        let manager = self.clone();
        let timer: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));

        Rc::new(move || {
            let event_loop = manager.event_loop();
            if let Some(id) = timer.take() {
                event_loop.clear_timeout(id);
            }

            let weak = manager.downgrade();
            let callback = callback.clone();
            let fired = timer.clone();
            let id = event_loop.set_timeout(delay_ms, move || {
                fired.set(None);
                if let Some(manager) = RenderManager::from_weak(&weak) {
                    manager.request_render(callback);
                }
            });
            timer.set(Some(id));
        })
    }

    /// 节流：每个 `interval_ms` 窗口最多请求一次渲染，窗口内的触发合并为一次尾部请求
    pub fn create_throttled_render(&self, callback: RenderCallback, interval_ms: f64) -> RenderTrigger {
        let manager = self.clone();
        let last_run: Rc<Cell<Option<f64>>> = Rc::new(Cell::new(None));
        let trailing: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));

        Rc::new(move || {
            let event_loop = manager.event_loop();
            let now = event_loop.now();

            let elapsed = last_run.get().map(|last| now - last);
            if elapsed.map_or(true, |elapsed| elapsed >= interval_ms) {
                last_run.set(Some(now));
                manager.request_render(callback.clone());
                return;
            }

            if trailing.get().is_some() {
                return;
            }

            let remaining = interval_ms - elapsed.unwrap_or(0.0);
            let weak = manager.downgrade();
            let callback = callback.clone();
            let last_run = last_run.clone();
            let pending = trailing.clone();
            let id = event_loop.set_timeout(remaining, move || {
                pending.set(None);
                if let Some(manager) = RenderManager::from_weak(&weak) {
                    last_run.set(Some(manager.event_loop().now()));
                    manager.request_render(callback);
                }
            });
            trailing.set(Some(id));
        })
    }
}
