/// 模块注册表
///
/// 提供统一的模块启动管理:
/// - 按名称注册模块及其依赖
/// - 深度优先拓扑排序解析初始化顺序（依赖环是致命配置错误）
/// - 惰性单例：工厂只调用一次，依赖先于模块初始化
/// - 外部模块：未注册的名称按命名约定在外部提供的实例中查找

use once_cell::unsync::OnceCell;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{ModuleError, ModuleResult};

/// 模块实例
pub type ModuleInstance = Rc<dyn Any>;

/// 模块工厂
pub type ModuleFactory = Box<dyn Fn(&ModuleDeps) -> ModuleResult<ModuleInstance>>;

/// 模块阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulePhase {
    /// 已注册，未初始化
    Registered,
    /// 正在初始化
    Initializing,
    /// 已初始化
    Ready,
    /// 工厂失败
    Failed,
}

/// 模块注册信息
pub struct ModuleSpec {
    /// 依赖的模块名
    pub deps: Vec<String>,
    /// 模块工厂
    pub factory: ModuleFactory,
    /// 是否在 `init_all` 中自动初始化
    pub auto_init: bool,
}

impl ModuleSpec {
    /// 由类型化工厂创建注册信息
    pub fn new<T, F>(factory: F) -> Self
    where
        T: Any,
        F: Fn(&ModuleDeps) -> ModuleResult<Rc<T>> + 'static,
    {
        Self {
            deps: Vec::new(),
            factory: Box::new(move |deps| factory(deps).map(|instance| instance as ModuleInstance)),
            auto_init: false,
        }
    }

    pub fn with_deps(mut self, deps: &[&str]) -> Self {
        self.deps = deps.iter().map(|dep| dep.to_string()).collect();
        self
    }

    pub fn auto_init(mut self, auto_init: bool) -> Self {
        self.auto_init = auto_init;
        self
    }
}

/// 传给工厂的已初始化依赖
pub struct ModuleDeps {
    module: String,
    instances: HashMap<String, ModuleInstance>,
}

impl ModuleDeps {
    /// 按类型获取依赖实例
    pub fn get<T: Any>(&self, name: &str) -> ModuleResult<Rc<T>> {
        self.instances
            .get(name)
            .cloned()
            .and_then(|instance| instance.downcast::<T>().ok())
            .ok_or_else(|| ModuleError::MissingDependency {
                module: self.module.clone(),
                dependency: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

struct ModuleDescriptor {
    name: String,
    deps: Vec<String>,
    factory: ModuleFactory,
    auto_init: bool,
    instance: OnceCell<ModuleInstance>,
    phase: Cell<ModulePhase>,
}

/// 模块注册表
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RefCell<HashMap<String, Rc<ModuleDescriptor>>>,
    /// 注册顺序，拓扑排序从这里开始遍历
    order: RefCell<Vec<String>>,
    external: RefCell<HashMap<String, ModuleInstance>>,
    initializing: RefCell<Vec<String>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册模块，重复注册同名模块时忽略并警告
    pub fn register(&self, name: impl Into<String>, spec: ModuleSpec) -> bool {
        let name = name.into();
        let mut modules = self.modules.borrow_mut();
        if modules.contains_key(&name) {
            log::warn!("模块 {} 已注册，忽略重复注册", name);
            return false;
        }

        modules.insert(
            name.clone(),
            Rc::new(ModuleDescriptor {
                name: name.clone(),
                deps: spec.deps,
                factory: spec.factory,
                auto_init: spec.auto_init,
                instance: OnceCell::new(),
                phase: Cell::new(ModulePhase::Registered),
            }),
        );
        self.order.borrow_mut().push(name.clone());
        log::debug!("模块 {} 注册成功", name);
        true
    }

    /// 提供外部创建的模块实例
    pub fn provide<T: Any>(&self, name: impl Into<String>, instance: Rc<T>) {
        self.external.borrow_mut().insert(name.into(), instance as ModuleInstance);
    }

    /// 解析全局初始化顺序（依赖在前）
    pub fn resolve_dependencies(&self) -> ModuleResult<Vec<String>> {
        let modules = self.modules.borrow();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();
        let mut resolved = Vec::with_capacity(modules.len());

        for name in self.order.borrow().iter() {
            Self::visit(name, &modules, &mut visited, &mut visiting, &mut resolved)?;
        }

        Ok(resolved)
    }

    fn visit(
        name: &str,
        modules: &HashMap<String, Rc<ModuleDescriptor>>,
        visited: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        resolved: &mut Vec<String>,
    ) -> ModuleResult<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if visiting.contains(name) {
            log::error!("检测到模块循环依赖: {}", name);
            return Err(ModuleError::CircularDependency { module: name.to_string() });
        }
        // 外部模块不参与排序
        let Some(descriptor) = modules.get(name) else {
            return Ok(());
        };

        visiting.insert(name.to_string());
        for dep in &descriptor.deps {
            Self::visit(dep, modules, visited, visiting, resolved)?;
        }
        visiting.remove(name);
        visited.insert(name.to_string());
        resolved.push(name.to_string());
        Ok(())
    }

    /// 初始化模块（先初始化依赖），返回单例实例
    ///
    /// 未注册的名称视为外部模块，找不到时返回 `Ok(None)`
    pub fn init_module(&self, name: &str) -> ModuleResult<Option<ModuleInstance>> {
        let descriptor = self.modules.borrow().get(name).cloned();
        let Some(descriptor) = descriptor else {
            return Ok(self.lookup_external(name));
        };

        if let Some(instance) = descriptor.instance.get() {
            return Ok(Some(instance.clone()));
        }
        if self.initializing.borrow().iter().any(|pending| pending == name) {
            log::error!("模块 {} 初始化时检测到循环依赖", name);
            return Err(ModuleError::CircularDependency { module: name.to_string() });
        }

        self.initializing.borrow_mut().push(name.to_string());
        descriptor.phase.set(ModulePhase::Initializing);
        let result = self.build(&descriptor);
        self.initializing.borrow_mut().retain(|pending| pending != name);

        match result {
            Ok(instance) => {
                let instance = descriptor.instance.get_or_init(|| instance).clone();
                descriptor.phase.set(ModulePhase::Ready);
                log::info!("模块 {} 初始化成功", name);
                Ok(Some(instance))
            }
            Err(e) => {
                descriptor.phase.set(ModulePhase::Failed);
                log::error!("模块 {} 初始化失败: {}", name, e);
                Err(e)
            }
        }
    }

    fn build(&self, descriptor: &ModuleDescriptor) -> ModuleResult<ModuleInstance> {
        let mut instances = HashMap::with_capacity(descriptor.deps.len());
        for dep in &descriptor.deps {
            match self.init_module(dep)? {
                Some(instance) => {
                    instances.insert(dep.clone(), instance);
                }
                None => log::warn!("模块 {} 的依赖 {} 不可用", descriptor.name, dep),
            }
        }

        let deps = ModuleDeps {
            module: descriptor.name.clone(),
            instances,
        };
        (descriptor.factory)(&deps)
    }

    /// 按命名约定查找外部模块：原名，然后PascalCase名
    fn lookup_external(&self, name: &str) -> Option<ModuleInstance> {
        let external = self.external.borrow();
        let found = external
            .get(name)
            .or_else(|| external.get(&pascal_case(name)))
            .cloned();

        if found.is_some() {
            log::debug!("模块 {} 由外部提供", name);
        } else {
            log::warn!("模块 {} 未注册且没有外部实例", name);
        }
        found
    }

    /// 解析顺序后初始化所有自动初始化模块，返回已初始化的模块名
    pub fn init_all(&self) -> ModuleResult<Vec<String>> {
        let order = self.resolve_dependencies()?;
        let mut initialized = Vec::new();

        for name in order {
            let auto_init = self
                .modules
                .borrow()
                .get(&name)
                .map(|descriptor| descriptor.auto_init)
                .unwrap_or(false);
            if auto_init {
                self.init_module(&name)?;
                initialized.push(name);
            }
        }

        log::info!("自动初始化 {} 个模块", initialized.len());
        Ok(initialized)
    }

    /// 获取已初始化（或外部提供）的模块实例
    pub fn get<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        let instance = match self.modules.borrow().get(name) {
            Some(descriptor) => descriptor.instance.get().cloned(),
            None => self.external.borrow().get(name).cloned(),
        };
        instance.and_then(|instance| instance.downcast::<T>().ok())
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.phase(name) == Some(ModulePhase::Ready)
    }

    pub fn phase(&self, name: &str) -> Option<ModulePhase> {
        self.modules.borrow().get(name).map(|descriptor| descriptor.phase.get())
    }

    /// 已注册的模块名（注册顺序）
    pub fn names(&self) -> Vec<String> {
        self.order.borrow().clone()
    }
}

fn pascal_case(name: &str) -> String {
    name.split(|c: char| c == '-' || c == '_' || c == '.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    fn recording(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> ModuleSpec {
        let log = log.clone();
        ModuleSpec::new(move |_deps| {
            log.borrow_mut().push(name);
            Ok(Rc::new(Named(name)))
        })
    }

    #[test]
    fn test_resolves_chain_in_dependency_order() {
        let registry = ModuleRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        registry.register("A", recording(&log, "A").with_deps(&["B"]));
        registry.register("B", recording(&log, "B").with_deps(&["C"]));
        registry.register("C", recording(&log, "C"));

        assert_eq!(registry.resolve_dependencies().unwrap(), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let registry = ModuleRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        registry.register("A", recording(&log, "A").with_deps(&["B"]));
        registry.register("B", recording(&log, "B").with_deps(&["A"]));

        match registry.resolve_dependencies() {
            Err(ModuleError::CircularDependency { module }) => {
                assert!(module == "A" || module == "B");
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
        assert!(registry.init_module("A").is_err());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let registry = ModuleRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        assert!(registry.register("store", recording(&log, "first")));
        assert!(!registry.register("store", recording(&log, "second")));

        registry.init_module("store").unwrap();
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(registry.names(), vec!["store"]);
    }

    #[test]
    fn test_factory_runs_once_with_dependencies() {
        let registry = ModuleRegistry::new();
        let calls = Rc::new(Cell::new(0));

        registry.register("store", ModuleSpec::new(|_| Ok(Rc::new(41u32))));
        let c = calls.clone();
        registry.register(
            "render",
            ModuleSpec::new(move |deps| {
                c.set(c.get() + 1);
                let store = deps.get::<u32>("store")?;
                Ok(Rc::new(*store + 1))
            })
            .with_deps(&["store"]),
        );

        registry.init_module("render").unwrap();
        registry.init_module("render").unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(registry.get::<u32>("render").map(|v| *v), Some(42));
        assert!(registry.is_initialized("store"));
        assert_eq!(registry.get::<String>("render"), None);
    }

    #[test]
    fn test_init_all_respects_auto_init_and_order() {
        let registry = ModuleRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        registry.register("render", recording(&log, "render").with_deps(&["store"]).auto_init(true));
        registry.register("store", recording(&log, "store").auto_init(true));
        registry.register("printer", recording(&log, "printer"));

        let initialized = registry.init_all().unwrap();

        assert_eq!(initialized, vec!["store", "render"]);
        assert_eq!(*log.borrow(), vec!["store", "render"]);
        assert_eq!(registry.phase("printer"), Some(ModulePhase::Registered));
    }

    #[test]
    fn test_external_module_lookup_by_convention() {
        let registry = ModuleRegistry::new();
        registry.provide("PdfEngine", Rc::new(Named("engine")));
        registry.register(
            "viewer",
            ModuleSpec::new(|deps| {
                let engine = deps.get::<Named>("pdf-engine")?;
                Ok(Rc::new(Named(engine.0)))
            })
            .with_deps(&["pdf-engine"]),
        );

        let viewer = registry.init_module("viewer").unwrap();
        assert!(viewer.is_some());
        assert_eq!(registry.get::<Named>("viewer").map(|n| n.0), Some("engine"));
        assert!(registry.init_module("unknown").unwrap().is_none());
    }

    #[test]
    fn test_factory_failure_marks_module_failed() {
        let registry = ModuleRegistry::new();
        registry.register(
            "broken",
            ModuleSpec::new(|_| -> ModuleResult<Rc<u8>> { Err(ModuleError::factory("broken", "no canvas")) }),
        );

        assert!(registry.init_module("broken").is_err());
        assert_eq!(registry.phase("broken"), Some(ModulePhase::Failed));
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("pdf-engine"), "PdfEngine");
        assert_eq!(pascal_case("renderManager"), "RenderManager");
        assert_eq!(pascal_case("page_cache"), "PageCache");
    }
}
