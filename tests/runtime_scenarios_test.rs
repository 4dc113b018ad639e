use futures::FutureExt;
use page_runtime::core::module_registry::ModuleDeps;
use page_runtime::core::render_cache::Releasable;
use page_runtime::{
    paths, topics, AppRuntime, EventBus, EventLoop, ListenerOptions, ModuleError, ModuleRegistry,
    ModuleSpec, RenderCallback, RenderLruCache, RenderManager, RenderManagerConfig, RenderedPage,
    RuntimeConfig, StateStore,
};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct TrackedBitmap {
    page: u32,
    released: Rc<RefCell<Vec<u32>>>,
}

impl Releasable for TrackedBitmap {
    fn release(&mut self) {
        self.released.borrow_mut().push(self.page);
    }
}

fn bitmap(page: u32, released: &Rc<RefCell<Vec<u32>>>) -> RenderedPage {
    RenderedPage::new(
        Box::new(TrackedBitmap {
            page,
            released: released.clone(),
        }),
        612,
        792,
        1.0,
    )
}

#[test]
fn test_equal_write_produces_no_notification() {
    let event_loop = EventLoop::new();
    let store = StateStore::new(EventBus::new(event_loop.clone()));
    let calls = Rc::new(Cell::new(0));

    let c = calls.clone();
    store.subscribe("canvas.currentZoom", move |_, _| c.set(c.get() + 1));

    store.set("canvas.currentZoom", json!(1.0)).unwrap();
    event_loop.run_microtasks();
    assert_eq!(calls.get(), 0);

    store.set("canvas.currentZoom", json!({"level": 2})).unwrap();
    store.set("canvas.currentZoom", json!({"level": 2})).unwrap();
    event_loop.run_microtasks();
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_batch_observers_see_all_writes() {
    let event_loop = EventLoop::new();
    let store = StateStore::new(EventBus::new(event_loop.clone()));
    let seen = Rc::new(RefCell::new(Vec::new()));

    let observer = store.clone();
    let s = seen.clone();
    store.subscribe("document.fileName", move |_, _| {
        s.borrow_mut().push((
            observer.get("document.fileName"),
            observer.get("page.totalPages"),
        ));
    });

    store
        .batch([
            ("document.fileName", json!("report.pdf")),
            ("page.totalPages", json!(42)),
        ])
        .unwrap();
    event_loop.run_microtasks();

    assert_eq!(*seen.borrow(), vec![(Some(json!("report.pdf")), Some(json!(42)))]);
}

#[test]
fn test_ancestor_propagation() {
    let event_loop = EventLoop::new();
    let store = StateStore::with_defaults(EventBus::new(event_loop.clone()), json!({}));
    let received = Rc::new(RefCell::new(None));

    let r = received.clone();
    store.subscribe("a", move |value, changed| {
        *r.borrow_mut() = Some((value.cloned(), changed.to_string()));
    });

    store.set("a.b.c", json!(1)).unwrap();
    event_loop.run_microtasks();

    assert_eq!(
        *received.borrow(),
        Some((Some(json!({"b": {"c": 1}})), "a.b.c".to_string()))
    );
}

#[test]
fn test_rapid_slider_drag_delivers_final_value_once() {
    let event_loop = EventLoop::new();
    let store = StateStore::new(EventBus::new(event_loop.clone()));
    let renderer = RenderManager::new(event_loop.clone(), RenderManagerConfig::default());

    let widths = Rc::new(RefCell::new(Vec::new()));
    let renders = Rc::new(Cell::new(0));

    let w = widths.clone();
    let r = renders.clone();
    let redraw: RenderCallback = Rc::new(move |_: f64| r.set(r.get() + 1));
    let scheduler = renderer.clone();
    store.subscribe_typed(&paths::LINE_WIDTH, move |width| {
        w.borrow_mut().push(width);
        scheduler.request_render(redraw.clone());
    });

    for step in 1..=50 {
        store.set_typed(&paths::LINE_WIDTH, &(step as f64 * 0.5)).unwrap();
    }
    event_loop.step_frame(16.0);

    assert_eq!(*widths.borrow(), vec![Some(25.0)]);
    assert_eq!(renders.get(), 1);
}

#[test]
fn test_render_coalescing() {
    let event_loop = EventLoop::new();
    let renderer = RenderManager::new(event_loop.clone(), RenderManagerConfig::default());
    let calls = Rc::new(Cell::new(0));

    let c = calls.clone();
    let redraw: RenderCallback = Rc::new(move |_: f64| c.set(c.get() + 1));
    for _ in 0..5 {
        renderer.request_render(redraw.clone());
    }
    event_loop.step_frame(16.0);
    event_loop.step_frame(16.0);

    assert_eq!(calls.get(), 1);
    assert_eq!(renderer.stats().frames_rendered, 1);
}

#[test]
fn test_lru_eviction_order_and_release() {
    let released = Rc::new(RefCell::new(Vec::new()));
    let mut cache = RenderLruCache::new("pages", 2).unwrap();

    cache.set("1", bitmap(1, &released));
    cache.set("2", bitmap(2, &released));
    assert!(cache.get("1").is_some());
    cache.set("3", bitmap(3, &released));

    assert!(!cache.contains("2"));
    assert!(cache.contains("1"));
    assert!(cache.contains("3"));
    assert_eq!(*released.borrow(), vec![2]);

    cache.clear();
    let mut all = released.borrow().clone();
    all.sort();
    assert_eq!(all, vec![1, 2, 3]);
    assert_eq!(cache.stats().releases, 3);
}

#[test]
fn test_module_topological_order_and_cycle() {
    let registry = ModuleRegistry::new();
    let unit = |_: &ModuleDeps| Ok(Rc::new(()));

    registry.register("A", ModuleSpec::new(unit).with_deps(&["B"]));
    registry.register("B", ModuleSpec::new(unit).with_deps(&["C"]));
    registry.register("C", ModuleSpec::new(unit));
    assert_eq!(registry.resolve_dependencies().unwrap(), vec!["C", "B", "A"]);

    let cyclic = ModuleRegistry::new();
    cyclic.register("A", ModuleSpec::new(unit).with_deps(&["B"]));
    cyclic.register("B", ModuleSpec::new(unit).with_deps(&["A"]));
    assert!(matches!(
        cyclic.resolve_dependencies(),
        Err(ModuleError::CircularDependency { .. })
    ));
}

#[test]
fn test_dependent_module_boot_order() {
    let registry = ModuleRegistry::new();
    let boot = Rc::new(RefCell::new(Vec::new()));

    let b = boot.clone();
    registry.register(
        "render",
        ModuleSpec::new(move |_| {
            b.borrow_mut().push("render");
            Ok(Rc::new(1u8))
        })
        .with_deps(&["store"])
        .auto_init(true),
    );
    let b = boot.clone();
    registry.register(
        "store",
        ModuleSpec::new(move |_| {
            b.borrow_mut().push("store");
            Ok(Rc::new(2u8))
        })
        .auto_init(true),
    );

    registry.init_all().unwrap();
    assert_eq!(*boot.borrow(), vec!["store", "render"]);
}

#[test]
fn test_wait_for_state_change_on_bus() {
    let runtime = AppRuntime::new(RuntimeConfig::default()).unwrap();
    let waiting = runtime.bus().wait_for(topics::STATE_CHANGED, 1000);

    runtime.store().set_typed(&paths::CURRENT_TOOL, &"eraser".to_string()).unwrap();

    let payload: Value = waiting.now_or_never().unwrap().unwrap();
    assert_eq!(payload["path"], json!("drawing.currentTool"));
    assert_eq!(payload["value"], json!("eraser"));
    assert_eq!(payload["oldValue"], json!("pen"));
}

#[test]
fn test_priority_listeners_see_document_load_first() {
    let runtime = AppRuntime::new(RuntimeConfig::default()).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));

    for (name, priority) in [("sidebar", 0), ("viewer", 100), ("status", -100)] {
        let o = order.clone();
        runtime.bus().on(
            topics::DOCUMENT_LOADED,
            move |_| o.borrow_mut().push(name),
            ListenerOptions::new().with_priority(priority),
        );
    }
    runtime.bus().emit(topics::DOCUMENT_LOADED, json!({"pages": 3}));

    assert_eq!(*order.borrow(), vec!["viewer", "sidebar", "status"]);
}
