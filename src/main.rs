// 运行时演示程序
//
// 用法: page_runtime [config.toml]
// 注册一个页面查看器模块和一个工具栏模块，模拟翻页、缩放动画和工具切换，
// 由tokio按配置的帧间隔驱动事件循环。

use serde_json::json;
use std::cell::RefCell;
use std::env;
use std::rc::Rc;

use page_runtime::app::runtime::module_names;
use page_runtime::app::SharedPageCache;
use page_runtime::core::render_cache::Releasable;
use page_runtime::core::subscription::Unsubscribe;
use page_runtime::{
    config, init_logging, paths, topics, AppRuntime, EventBus, EventPriority, ListenerOptions,
    ModuleSpec, RenderCallback, RenderLruCache, RenderManager, RenderedPage, RuntimeConfig,
    StateStore,
};

/// 模拟的页面位图
struct DemoBitmap {
    page: u32,
}

impl Releasable for DemoBitmap {
    fn release(&mut self) {
        log::debug!("释放第 {} 页位图", self.page);
    }
}

/// 页面查看器：页码或缩放变化时请求重绘，重绘时把位图放入缓存
struct PageViewer {
    redraw: RenderCallback,
    _subscriptions: Vec<Unsubscribe>,
}

impl PageViewer {
    fn new(
        store: Rc<StateStore>,
        renderer: Rc<RenderManager>,
        bus: Rc<EventBus>,
        cache: Rc<SharedPageCache>,
    ) -> Self {
        let redraw: RenderCallback = {
            let store = store.clone();
            Rc::new(move |timestamp: f64| {
                let page = store.get_typed(&paths::CURRENT_PAGE).ok().flatten().unwrap_or(1);
                let zoom = store.get_typed(&paths::ZOOM).ok().flatten().unwrap_or(1.0);
                let key = RenderLruCache::<RenderedPage>::page_key(page, zoom, 0);

                let cached = cache.borrow_mut().get(&key).is_some();
                if !cached {
                    let width = (612.0 * zoom) as u32;
                    let height = (792.0 * zoom) as u32;
                    cache
                        .borrow_mut()
                        .set(key.clone(), RenderedPage::new(Box::new(DemoBitmap { page }), width, height, zoom));
                }
                log::info!("[{:.0}ms] 绘制第 {} 页 (缩放 {:.2})", timestamp, page, zoom);
                bus.emit(topics::PAGE_RENDERED, json!({"key": key, "cached": cached}));
            })
        };

        let mut subscriptions = Vec::new();
        for path in [paths::CURRENT_PAGE.as_str(), paths::ZOOM.as_str()] {
            let renderer = renderer.clone();
            let redraw = redraw.clone();
            subscriptions.push(store.subscribe(path, move |_, _| renderer.request_render(redraw.clone())));
        }

        Self {
            redraw,
            _subscriptions: subscriptions,
        }
    }
}

/// 工具栏：记录工具切换
struct Toolbar {
    tools: Rc<RefCell<Vec<String>>>,
}

fn register_demo_modules(runtime: &AppRuntime) {
    runtime.modules().register(
        "pageViewer",
        ModuleSpec::new(|deps| {
            let store = deps.get::<StateStore>(module_names::STATE_STORE)?;
            let renderer = deps.get::<RenderManager>(module_names::RENDER_MANAGER)?;
            let bus = deps.get::<EventBus>(module_names::EVENT_BUS)?;
            let cache = deps.get::<SharedPageCache>(module_names::PAGE_CACHE)?;
            Ok(Rc::new(PageViewer::new(store, renderer, bus, cache)))
        })
        .with_deps(&[
            module_names::STATE_STORE,
            module_names::RENDER_MANAGER,
            module_names::EVENT_BUS,
            module_names::PAGE_CACHE,
        ])
        .auto_init(true),
    );

    runtime.modules().register(
        "toolbar",
        ModuleSpec::new(|deps| {
            let store = deps.get::<StateStore>(module_names::STATE_STORE)?;
            let viewer = deps.get::<PageViewer>("pageViewer")?;
            let tools = Rc::new(RefCell::new(Vec::new()));

            let t = tools.clone();
            let renderer = deps.get::<RenderManager>(module_names::RENDER_MANAGER)?;
            let bus = deps.get::<EventBus>(module_names::EVENT_BUS)?;
            store.subscribe_typed(&paths::CURRENT_TOOL, move |tool: Option<String>| {
                if let Some(tool) = tool {
                    bus.emit(topics::TOOL_CHANGED, json!({ "tool": &tool }));
                    t.borrow_mut().push(tool);
                }
                renderer.request_render(viewer.redraw.clone());
            });
            Ok(Rc::new(Toolbar { tools }))
        })
        .with_deps(&[
            module_names::STATE_STORE,
            module_names::RENDER_MANAGER,
            module_names::EVENT_BUS,
            "pageViewer",
        ])
        .auto_init(true),
    );
}

/// 在事件循环上安排一段模拟的用户操作
fn schedule_demo_script(runtime: &AppRuntime) {
    let event_loop = runtime.event_loop();

    let store = runtime.store().clone();
    let bus = runtime.bus().clone();
    event_loop.set_timeout(50.0, move || {
        if let Err(e) = store.batch([
            ("document.fileName", json!("demo.pdf")),
            ("document.isLoaded", json!(true)),
            ("page.totalPages", json!(12)),
        ]) {
            log::warn!("写入文档状态失败: {}", e);
            return;
        }
        bus.emit(topics::DOCUMENT_LOADED, json!({"fileName": "demo.pdf", "pages": 12}));
    });

    for (delay, page) in [(200.0, 2u32), (210.0, 3), (220.0, 4), (600.0, 5)] {
        let store = runtime.store().clone();
        event_loop.set_timeout(delay, move || {
            if let Err(e) = store.set_typed(&paths::CURRENT_PAGE, &page) {
                log::warn!("跳转到第 {} 页失败: {}", page, e);
            }
        });
    }

    let store = runtime.store().clone();
    let renderer = runtime.renderer().clone();
    event_loop.set_timeout(800.0, move || {
        let store = store.clone();
        let zooming = renderer.animate(
            move |progress, _| {
                match store.set_typed(&paths::ZOOM, &(1.0 + progress)) {
                    Ok(_) => true,
                    Err(e) => {
                        log::warn!("写入缩放比例失败，停止动画: {}", e);
                        false
                    }
                }
            },
            400.0,
        );
        tokio::task::spawn_local(async move {
            match zooming.await {
                Ok(()) => log::info!("缩放动画完成"),
                Err(e) => log::warn!("缩放动画失败: {}", e),
            }
        });
    });

    let store = runtime.store().clone();
    event_loop.set_timeout(1400.0, move || {
        if let Err(e) = store.set_typed(&paths::CURRENT_TOOL, &"highlighter".to_string()) {
            log::warn!("切换工具失败: {}", e);
        }
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match env::args().nth(1) {
        Some(path) => config::load_from_path(path)?,
        None => RuntimeConfig::default(),
    };
    init_logging(config.log_level_filter());
    log::info!("page_runtime v{}", page_runtime::VERSION);

    let runtime = AppRuntime::new(config)?;
    register_demo_modules(&runtime);

    runtime.bus().on(
        topics::DOCUMENT_LOADED,
        |payload| log::info!("文档已加载: {}", payload),
        ListenerOptions::new(),
    );
    runtime.bus().on(
        topics::TOOL_CHANGED,
        |payload| log::info!("工具切换: {}", payload["tool"]),
        ListenerOptions::new().with_priority(EventPriority::High),
    );

    let order = runtime.start()?;
    log::info!("模块初始化顺序: {:?}", order);
    schedule_demo_script(&runtime);

    let tokio_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&tokio_runtime, runtime.run(Some(120)));

    if let Some(toolbar) = runtime.modules().get::<Toolbar>("toolbar") {
        log::info!("工具切换记录: {:?}", toolbar.tools.borrow());
    }
    let cache_stats = runtime.page_cache().borrow().stats().clone();
    log::info!(
        "页面缓存: {} 条, 命中率 {:.1}%",
        runtime.page_cache().borrow().len(),
        cache_stats.hit_rate() * 100.0
    );
    runtime.shutdown();
    Ok(())
}
