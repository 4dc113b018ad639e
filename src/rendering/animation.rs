/// 基于帧的动画驱动

use futures::channel::oneshot;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use super::manager::{RenderInner, RenderManager};
use crate::core::guard::catch_callback_panic;
use crate::error::RenderError;

type Animator = Box<dyn FnMut(f64, f64) -> bool>;

struct Animation {
    animator: RefCell<Animator>,
    start: f64,
    duration_ms: f64,
    done: Cell<Option<oneshot::Sender<Result<(), RenderError>>>>,
}

impl Animation {
    fn progress(&self, timestamp: f64) -> f64 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        ((timestamp - self.start) / self.duration_ms).clamp(0.0, 1.0)
    }

    fn finish(&self, result: Result<(), RenderError>) {
        if let Some(sender) = self.done.take() {
            let _ = sender.send(result);
        }
    }
}

impl RenderManager {
    /// 逐帧驱动动画
    ///
    /// 每帧以 `(progress, timestamp)` 调用 `animator`，progress 到达 1 或返回 `false` 时结束。
    /// animator panic 时以 `RenderError::AnimatorPanicked` 结束；
    /// 事件循环在动画完成前被丢弃时以 `RenderError::AnimationCancelled` 结束。
    pub fn animate<F>(&self, animator: F, duration_ms: f64) -> impl Future<Output = Result<(), RenderError>>
    where
        F: FnMut(f64, f64) -> bool + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let animation = Rc::new(Animation {
            animator: RefCell::new(Box::new(animator)),
            start: self.event_loop().now(),
            duration_ms,
            done: Cell::new(Some(sender)),
        });

        schedule_step(self.downgrade(), self, animation);

        async move { receiver.await.unwrap_or(Err(RenderError::AnimationCancelled)) }
    }
}

fn schedule_step(weak: Weak<RenderInner>, manager: &RenderManager, animation: Rc<Animation>) {
    manager.event_loop().request_animation_frame(move |timestamp| {
        let Some(manager) = RenderManager::from_weak(&weak) else {
            return;
        };

        let progress = animation.progress(timestamp);
        let outcome = {
            let mut animator = animation.animator.borrow_mut();
            catch_callback_panic(|| (*animator)(progress, timestamp))
        };

        match outcome {
            Ok(keep_going) if keep_going && progress < 1.0 => {
                schedule_step(weak, &manager, animation);
            }
            Ok(_) => animation.finish(Ok(())),
            Err(message) => {
                log::error!("动画在进度 {:.3} 处失败: {}", progress, message);
                animation.finish(Err(RenderError::AnimatorPanicked { progress, message }));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::super::manager::RenderManagerConfig;
    use super::*;
    use crate::core::event_loop::EventLoop;
    use futures::FutureExt;

    fn manager() -> RenderManager {
        RenderManager::new(EventLoop::new(), RenderManagerConfig::default())
    }

    #[test]
    fn test_animation_runs_until_complete() {
        let manager = manager();
        let progress = Rc::new(RefCell::new(Vec::new()));
        let p = progress.clone();

        let mut done = Box::pin(manager.animate(
            move |value, _| {
                p.borrow_mut().push(value);
                true
            },
            100.0,
        ));

        for _ in 0..3 {
            manager.event_loop().step_frame(25.0);
        }
        assert!(done.as_mut().now_or_never().is_none());

        manager.event_loop().step_frame(25.0);
        assert_eq!(done.now_or_never(), Some(Ok(())));
        assert_eq!(*progress.borrow(), vec![0.25, 0.5, 0.75, 1.0]);
        assert!(!manager.event_loop().has_pending_frame());
    }

    #[test]
    fn test_animator_can_stop_early() {
        let manager = manager();
        let frames = Rc::new(Cell::new(0));
        let f = frames.clone();

        let done = manager.animate(
            move |value, _| {
                f.set(f.get() + 1);
                value < 0.5
            },
            100.0,
        );
        for _ in 0..6 {
            manager.event_loop().step_frame(25.0);
        }

        assert_eq!(frames.get(), 2);
        assert_eq!(done.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_panicking_animator_rejects() {
        let manager = manager();
        let done = manager.animate(|_, _| panic!("bad easing"), 100.0);
        manager.event_loop().step_frame(25.0);

        match done.now_or_never() {
            Some(Err(RenderError::AnimatorPanicked { progress, message })) => {
                assert_eq!(progress, 0.25);
                assert!(message.contains("bad easing"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_dropped_manager_cancels_animation() {
        let event_loop = EventLoop::new();
        let manager = RenderManager::new(event_loop.clone(), RenderManagerConfig::default());
        let done = manager.animate(|_, _| true, 100.0);

        drop(manager);
        event_loop.step_frame(25.0);
        assert_eq!(done.now_or_never(), Some(Err(RenderError::AnimationCancelled)));
    }
}
