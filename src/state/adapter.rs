/// 状态适配器
///
/// 为只关心状态树某一分支的组件提供带前缀的读写视图，
/// 例如绘图工具只看到 `drawing.*`，写入 `lineWidth` 即写入 `drawing.lineWidth`。

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::store::StateStore;
use crate::core::subscription::Unsubscribe;
use crate::error::{StateError, StateResult};

#[derive(Clone)]
pub struct StateAdapter {
    store: StateStore,
    prefix: String,
}

impl StateAdapter {
    pub fn new(store: StateStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 相对路径转换为完整路径，空相对路径指向前缀本身
    pub fn full_path(&self, key: &str) -> String {
        match (self.prefix.is_empty(), key.is_empty()) {
            (true, _) => key.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}.{}", self.prefix, key),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(&self.full_path(key))
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StateResult<Option<T>> {
        let path = self.full_path(key);
        match self.store.get_ref(&path) {
            Some(value) => T::deserialize(&*value)
                .map(Some)
                .map_err(|e| StateError::Conversion {
                    path: path.clone(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn set(&self, key: &str, value: Value) -> StateResult<bool> {
        self.store.set(&self.full_path(key), value)
    }

    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) -> StateResult<bool> {
        let path = self.full_path(key);
        let value = serde_json::to_value(value).map_err(|e| StateError::Conversion {
            path: path.clone(),
            message: e.to_string(),
        })?;
        self.store.set(&path, value)
    }

    /// 批量写入，键为相对路径
    pub fn batch<I, K>(&self, updates: I) -> StateResult<Vec<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let updates: Vec<(String, Value)> = updates
            .into_iter()
            .map(|(key, value)| (self.full_path(key.as_ref()), value))
            .collect();
        self.store.batch(updates)
    }

    pub fn subscribe<F>(&self, key: &str, callback: F) -> Unsubscribe
    where
        F: Fn(Option<&Value>, &str) + 'static,
    {
        self.store.subscribe(&self.full_path(key), callback)
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_loop::EventLoop;
    use crate::events::EventBus;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_prefixed_reads_and_writes() {
        let store = StateStore::new(EventBus::new(EventLoop::new()));
        let drawing = StateAdapter::new(store.clone(), "drawing");

        assert_eq!(drawing.full_path("lineWidth"), "drawing.lineWidth");
        assert_eq!(drawing.full_path(""), "drawing");

        drawing.set("lineWidth", json!(6.0)).unwrap();
        assert_eq!(store.get("drawing.lineWidth"), Some(json!(6.0)));
        assert_eq!(drawing.get_as::<f64>("lineWidth"), Ok(Some(6.0)));
        assert_eq!(drawing.get_as::<f64>("missing"), Ok(None));

        drawing.set_as("currentTool", &"highlighter").unwrap();
        assert_eq!(store.get("drawing.currentTool"), Some(json!("highlighter")));
    }

    #[test]
    fn test_prefixed_subscription_and_batch() {
        let event_loop = EventLoop::new();
        let store = StateStore::new(EventBus::new(event_loop.clone()));
        let ui = StateAdapter::new(store, "ui");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        ui.subscribe("", move |_, changed| s.borrow_mut().push(changed.to_string()));

        let changed = ui
            .batch([("sidebarVisible", json!(false)), ("activePanel", json!("outline"))])
            .unwrap();
        assert_eq!(changed, vec!["ui.sidebarVisible", "ui.activePanel"]);

        event_loop.run_microtasks();
        assert_eq!(*seen.borrow(), vec!["ui.sidebarVisible", "ui.activePanel"]);
    }

    #[test]
    fn test_unprefixed_adapter_watches_whole_tree() {
        let event_loop = EventLoop::new();
        let store = StateStore::new(EventBus::new(event_loop.clone()));
        let root = StateAdapter::new(store.clone(), "");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        root.subscribe("", move |tree, changed| {
            s.borrow_mut().push((changed.to_string(), tree.map(|t| t["page"]["totalPages"].clone())));
        });

        store.set("page.totalPages", json!(12)).unwrap();
        event_loop.run_microtasks();
        assert_eq!(*seen.borrow(), vec![("page.totalPages".to_string(), Some(json!(12)))]);
    }
}
