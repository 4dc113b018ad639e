use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::core::event_loop::EventLoop;
use crate::core::module_registry::ModuleRegistry;
use crate::core::render_cache::{RenderLruCache, RenderedPage};
use crate::error::{CacheError, ModuleResult, RuntimeError};
use crate::events::EventBus;
use crate::rendering::{RenderManager, RenderManagerConfig};
use crate::state::StateStore;

/// 共享的页面位图缓存
pub type SharedPageCache = Rc<RefCell<RenderLruCache<RenderedPage>>>;

/// 核心组件在模块注册表中的名字
pub mod module_names {
    pub const EVENT_LOOP: &str = "eventLoop";
    pub const EVENT_BUS: &str = "eventBus";
    pub const STATE_STORE: &str = "stateStore";
    pub const RENDER_MANAGER: &str = "renderManager";
    pub const PAGE_CACHE: &str = "pageCache";
    pub const THUMBNAIL_CACHE: &str = "thumbnailCache";
}

/// 按配置创建事件总线
pub fn create_event_bus(event_loop: &EventLoop, config: &RuntimeConfig) -> EventBus {
    let bus = EventBus::with_history_limit(event_loop.clone(), config.event_history_size);
    bus.set_debug(config.event_debug);
    bus
}

/// 创建状态存储（使用默认状态结构）
pub fn create_store(bus: &EventBus) -> StateStore {
    StateStore::new(bus.clone())
}

pub fn create_page_cache(name: &str, capacity: usize) -> Result<SharedPageCache, CacheError> {
    Ok(Rc::new(RefCell::new(RenderLruCache::new(name, capacity)?)))
}

/// 应用运行时
///
/// 持有事件循环、事件总线、状态存储、渲染管理器、页面缓存和模块注册表。
/// 核心组件在创建时以固定名字提供给模块注册表，功能模块通过依赖名获取它们。
pub struct AppRuntime {
    config: RuntimeConfig,
    event_loop: EventLoop,
    bus: EventBus,
    store: StateStore,
    renderer: RenderManager,
    page_cache: SharedPageCache,
    thumbnail_cache: SharedPageCache,
    modules: ModuleRegistry,
}

impl AppRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let event_loop = EventLoop::new();
        let bus = create_event_bus(&event_loop, &config);
        let store = create_store(&bus);
        let renderer = RenderManager::new(
            event_loop.clone(),
            RenderManagerConfig {
                min_frame_interval_ms: config.min_frame_interval_ms,
            },
        );
        let page_cache = create_page_cache("pages", config.page_cache_capacity)?;
        let thumbnail_cache = create_page_cache("thumbnails", config.thumbnail_cache_capacity)?;

        let modules = ModuleRegistry::new();
        modules.provide(module_names::EVENT_LOOP, Rc::new(event_loop.clone()));
        modules.provide(module_names::EVENT_BUS, Rc::new(bus.clone()));
        modules.provide(module_names::STATE_STORE, Rc::new(store.clone()));
        modules.provide(module_names::RENDER_MANAGER, Rc::new(renderer.clone()));
        modules.provide(module_names::PAGE_CACHE, Rc::new(page_cache.clone()));
        modules.provide(module_names::THUMBNAIL_CACHE, Rc::new(thumbnail_cache.clone()));

        log::info!(
            "运行时已创建 (页面缓存: {}, 缩略图缓存: {}, 最小帧间隔: {}ms)",
            config.page_cache_capacity,
            config.thumbnail_cache_capacity,
            config.min_frame_interval_ms
        );

        Ok(Self {
            config,
            event_loop,
            bus,
            store,
            renderer,
            page_cache,
            thumbnail_cache,
            modules,
        })
    }

    /// 初始化所有自动启动的模块，返回初始化顺序
    pub fn start(&self) -> ModuleResult<Vec<String>> {
        let order = self.modules.init_all()?;
        // 模块工厂里的写入和事件在启动阶段就送达
        self.event_loop.run_microtasks();
        log::info!("运行时启动完成，已初始化模块: {:?}", order);
        Ok(order)
    }

    /// 按配置的帧间隔驱动事件循环
    pub async fn run(&self, max_frames: Option<u64>) {
        let interval = Duration::from_millis(self.config.frame_interval_ms);
        self.event_loop.drive(interval, max_frames).await;
    }

    /// 丢弃待渲染回调并释放所有缓存的位图
    pub fn shutdown(&self) {
        self.renderer.cancel_pending();
        self.page_cache.borrow_mut().clear();
        self.thumbnail_cache.borrow_mut().clear();

        let render_stats = self.renderer.stats();
        let store_stats = self.store.stats();
        log::info!(
            "运行时关闭: 渲染帧 {}, 跳过帧 {}, 状态写入 {}, 通知 {}",
            render_stats.frames_rendered,
            render_stats.frames_skipped,
            store_stats.writes,
            store_stats.notifications
        );
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn renderer(&self) -> &RenderManager {
        &self.renderer
    }

    pub fn page_cache(&self) -> &SharedPageCache {
        &self.page_cache
    }

    pub fn thumbnail_cache(&self) -> &SharedPageCache {
        &self.thumbnail_cache
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }
}
