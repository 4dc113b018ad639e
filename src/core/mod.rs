pub mod event_loop;
pub mod guard;
pub mod module_registry;
pub mod render_cache;
pub mod subscription;

pub use event_loop::{EventLoop, FrameId, TimerId};
pub use guard::catch_callback_panic;
pub use module_registry::{
    ModuleDeps, ModuleFactory, ModuleInstance, ModulePhase, ModuleRegistry, ModuleSpec,
};
pub use render_cache::{CacheStats, CacheValue, Releasable, RenderLruCache, RenderedPage};
pub use subscription::Unsubscribe;
