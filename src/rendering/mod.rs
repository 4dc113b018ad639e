/// 渲染调度模块
///
/// 负责把重绘请求合并到动画帧，并提供防抖/节流包装和逐帧动画驱动

pub mod animation;
pub mod manager;
pub mod wrappers;

pub use manager::{RenderCallback, RenderManager, RenderManagerConfig, RenderStats};
pub use wrappers::RenderTrigger;
