/// 取消订阅句柄
///
/// `on`/`subscribe` 返回此句柄；调用 `unsubscribe` 移除对应的那一条注册。
/// 丢弃句柄不会取消订阅。
pub struct Unsubscribe {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Unsubscribe {
    pub fn new(remove: impl FnOnce() + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// 不对应任何注册的空句柄（例如重复注册被忽略时）
    pub fn noop() -> Self {
        Self { remove: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
