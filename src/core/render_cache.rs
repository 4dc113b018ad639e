/// 渲染产物LRU缓存
///
/// 缓存页面位图等昂贵的渲染结果。容量在创建时固定，超出时淘汰最久未使用的条目；
/// 条目持有的原生资源在淘汰、覆盖、删除或清空时同步释放。

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use crate::error::CacheError;

/// 可释放资源能力
///
/// 位图、纹理等持有原生句柄的产物实现此trait
pub trait Releasable {
    fn release(&mut self);
}

/// 缓存值
///
/// 缓存只通过 `releasable` 探测产物是否持有需要释放的资源，其余内容对缓存不透明
pub trait CacheValue {
    fn releasable(&mut self) -> Option<&mut dyn Releasable> {
        None
    }
}

/// 已渲染页面
pub struct RenderedPage {
    /// 位图句柄（由外部PDF渲染引擎提供）
    pub bitmap: Option<Box<dyn Releasable>>,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

impl RenderedPage {
    pub fn new(bitmap: Box<dyn Releasable>, width: u32, height: u32, scale: f64) -> Self {
        Self {
            bitmap: Some(bitmap),
            width,
            height,
            scale,
        }
    }
}

impl CacheValue for RenderedPage {
    fn releasable(&mut self) -> Option<&mut dyn Releasable> {
        match self.bitmap.as_mut() {
            Some(bitmap) => Some(&mut **bitmap),
            None => None,
        }
    }
}

/// 缓存统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub releases: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Slot<V> {
    value: V,
    tick: u64,
}

/// LRU渲染缓存
///
/// `order` 以访问序号为键，第一个元素即最久未使用的条目
pub struct RenderLruCache<V: CacheValue> {
    name: String,
    capacity: usize,
    entries: HashMap<String, Slot<V>>,
    order: BTreeMap<u64, String>,
    tick: u64,
    stats: CacheStats,
}

impl<V: CacheValue> RenderLruCache<V> {
    /// 创建缓存，容量为0视为配置错误
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self, CacheError> {
        let name = name.into();
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity { name });
        }

        Ok(Self {
            name,
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            tick: 0,
            stats: CacheStats::default(),
        })
    }

    /// 生成确定性的组合键
    pub fn make_key<I, T>(parts: I) -> String
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        parts
            .into_iter()
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// 页面位图键：页面ID + 缩放 + 旋转
    pub fn page_key(page_id: impl Display, scale: f64, rotation: u16) -> String {
        Self::make_key([page_id.to_string(), format!("{:.3}", scale), rotation.to_string()])
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn release_value(name: &str, stats: &mut CacheStats, key: &str, value: &mut V) {
        if let Some(resource) = value.releasable() {
            resource.release();
            stats.releases += 1;
            log::trace!("缓存 {} 释放条目 {} 的资源", name, key);
        }
    }

    /// 读取条目，命中时提升为最近使用
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some(slot) => {
                self.order.remove(&slot.tick);
                slot.tick = tick;
                self.order.insert(tick, key.to_string());
                self.stats.hits += 1;
                Some(&slot.value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// 读取条目但不改变使用顺序
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 插入或覆盖条目，然后淘汰超出容量的最旧条目
    ///
    /// 被覆盖的旧值同样会释放资源
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        let tick = self.next_tick();

        match self.entries.get_mut(&key) {
            Some(slot) => {
                let mut old = std::mem::replace(&mut slot.value, value);
                self.order.remove(&slot.tick);
                slot.tick = tick;
                Self::release_value(&self.name, &mut self.stats, &key, &mut old);
            }
            None => {
                self.entries.insert(key.clone(), Slot { value, tick });
            }
        }
        self.order.insert(tick, key);

        while self.entries.len() > self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.order.pop_first() else {
            return false;
        };
        if let Some(mut slot) = self.entries.remove(&key) {
            Self::release_value(&self.name, &mut self.stats, &key, &mut slot.value);
            self.stats.evictions += 1;
            log::debug!("缓存 {} 淘汰条目 {}", self.name, key);
        }
        true
    }

    /// 删除条目并释放资源
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(mut slot) => {
                self.order.remove(&slot.tick);
                Self::release_value(&self.name, &mut self.stats, key, &mut slot.value);
                true
            }
            None => false,
        }
    }

    /// 释放所有条目的资源后清空
    pub fn clear(&mut self) {
        for (key, slot) in self.entries.iter_mut() {
            Self::release_value(&self.name, &mut self.stats, key, &mut slot.value);
        }
        self.entries.clear();
        self.order.clear();
        log::debug!("缓存 {} 已清空", self.name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 键列表，从最久未使用到最近使用
    pub fn keys(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<V: CacheValue> Drop for RenderLruCache<V> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.clear();
        }
    }
}
