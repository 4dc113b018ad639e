/// 回调隔离
///
/// 监听器、订阅者和渲染回调都通过这里执行：单个回调panic时被捕获并转成
/// 错误消息，由调用方记录日志后继续分发给其余回调。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// 执行回调并捕获panic
pub fn catch_callback_panic<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

/// 从panic载荷中提取可读消息
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
