//! Module registry, dependency ordering and lifecycle dispatch.
//!
//! Modules are registered in any order. [`ModuleSystem::link`] runs every
//! link callback, resolves dependency names, orders the modules so each one
//! comes after everything it depends on, and stably sorts the init, start and
//! update callbacks by that order. A module's own callbacks of one kind keep
//! their registration order.
//!
//! Any link failure is final: the system stays [`SystemState::Failed`] and no
//! further callbacks run.

mod dependencies;
mod module;
mod registry;

pub use dependencies::{Dependencies, DependencyArray, DependencyList, SingleDependency};
pub use module::{LinkFn, Module, Thunk};
pub use registry::{ModuleId, NameToModule};

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;

use log::{debug, info};
use thiserror_no_std::Error;

use crate::logger::Logger;

/// Error types for module system operations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    /// Two modules share a name
    #[error("Duplicate module name '{name}'")]
    DuplicateName { name: &'static str },

    /// More modules than the system reserved room for
    #[error("Module capacity exceeded (max: {max})")]
    CapacityExceeded { max: usize },

    /// Registration or a second link after the first link
    #[error("Module system already linked")]
    AlreadyLinked,

    /// A link callback returned failure
    #[error("Link failed for module '{module}'")]
    LinkRejected { module: &'static str },

    /// A dependency name matched no registered module
    #[error("Module '{module}' has unresolved dependencies")]
    UnresolvedDependencies { module: &'static str },

    /// The dependency graph has a cycle
    #[error("Dependency loop detected at module '{module}'")]
    DependencyLoop { module: &'static str },

    /// Link has not succeeded
    #[error("Module system is not ready")]
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    /// Accepting modules; `link` not yet attempted.
    Registering,
    /// Linked and sorted. Lifecycle callbacks run.
    Ready,
    /// Link failed. Terminal.
    Failed,
}

struct ModuleRecord {
    name: &'static str,
    dependencies: Option<Box<dyn Dependencies>>,
    sorted_index: Option<usize>,
}

struct Callback<F> {
    module: ModuleId,
    f: F,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unsorted,
    Visiting,
    Sorted,
}

/// The coordinator that owns every registered module's callbacks.
pub struct ModuleSystem {
    logger: Rc<dyn Logger>,
    capacity: usize,
    state: SystemState,
    poisoned: Option<SystemError>,
    modules: Vec<ModuleRecord>,
    names: NameToModule,
    link_fns: Vec<Callback<LinkFn>>,
    init_fns: Vec<Callback<Thunk>>,
    start_fns: Vec<Callback<Thunk>>,
    update_fns: Vec<Callback<Thunk>>,
}

impl ModuleSystem {
    /// Create a system with room for `capacity` modules.
    pub fn new(logger: Rc<dyn Logger>, capacity: usize) -> Self {
        Self {
            logger,
            capacity,
            state: SystemState::Registering,
            poisoned: None,
            modules: Vec::with_capacity(capacity),
            names: NameToModule::default(),
            link_fns: Vec::new(),
            init_fns: Vec::new(),
            start_fns: Vec::new(),
            update_fns: Vec::new(),
        }
    }

    /// Take ownership of `module`'s callbacks. Used by [`Module::register`].
    ///
    /// A rejected module also poisons the system so a later `link` fails.
    pub(crate) fn add_module(&mut self, module: Module) -> Result<ModuleId, SystemError> {
        if self.state != SystemState::Registering {
            return Err(SystemError::AlreadyLinked);
        }
        if self.modules.len() >= self.capacity {
            return Err(self.poison(SystemError::CapacityExceeded { max: self.capacity }));
        }

        let id = ModuleId::new(self.modules.len());
        let Module {
            name,
            dependencies,
            handle,
            link,
            init,
            start,
            update,
        } = module;
        if !self.names.insert(name, id, handle) {
            return Err(self.poison(SystemError::DuplicateName { name }));
        }

        self.modules.push(ModuleRecord {
            name,
            dependencies,
            sorted_index: None,
        });
        self.link_fns
            .extend(link.into_iter().map(|f| Callback { module: id, f }));
        self.init_fns
            .extend(init.into_iter().map(|f| Callback { module: id, f }));
        self.start_fns
            .extend(start.into_iter().map(|f| Callback { module: id, f }));
        self.update_fns
            .extend(update.into_iter().map(|f| Callback { module: id, f }));
        debug!("Registered module '{}' as {}", name, id);
        Ok(id)
    }

    fn poison(&mut self, err: SystemError) -> SystemError {
        self.poisoned.get_or_insert(err);
        err
    }

    fn fail(&mut self, err: SystemError) -> Result<(), SystemError> {
        self.state = SystemState::Failed;
        Err(err)
    }

    /// Run link callbacks, resolve dependencies and order the modules.
    pub fn link(&mut self) -> Result<(), SystemError> {
        if self.state != SystemState::Registering {
            return Err(SystemError::AlreadyLinked);
        }

        if let Some(err) = self.poisoned {
            match err {
                SystemError::DuplicateName { name } => self
                    .logger
                    .logf(format_args!("Duplicate module name '{}'.", name)),
                other => self.logger.logf(format_args!("{}.", other)),
            }
            return self.fail(err);
        }

        // Link callbacks run in registration order, before dependency edges
        // are known.
        let mut rejected = None;
        for callback in &mut self.link_fns {
            if !(callback.f)(&self.names) {
                rejected = Some(callback.module);
                break;
            }
        }
        if let Some(id) = rejected {
            let module = self.modules[id.index()].name;
            self.logger
                .logf(format_args!("Link failed for module '{}'.", module));
            return self.fail(SystemError::LinkRejected { module });
        }

        let mut unresolved = None;
        for record in &mut self.modules {
            let Some(deps) = record.dependencies.as_mut() else {
                continue;
            };
            if !deps.resolve(&self.names) {
                for missing in deps.unresolved() {
                    self.logger.logf(format_args!(
                        "Module '{}' depends on unknown module '{}'.",
                        record.name, missing
                    ));
                }
                unresolved.get_or_insert(record.name);
            }
        }
        if let Some(module) = unresolved {
            return self.fail(SystemError::UnresolvedDependencies { module });
        }

        let order = match self.topological_order() {
            Ok(order) => order,
            Err(module) => {
                self.logger
                    .logf(format_args!("Dependency loop detected at module '{}'.", module));
                return self.fail(SystemError::DependencyLoop { module });
            }
        };

        let mut ranks = alloc::vec![0; self.modules.len()];
        for (rank, id) in order.iter().enumerate() {
            ranks[id.index()] = rank;
            self.modules[id.index()].sorted_index = Some(rank);
        }
        // Stable: a module's callbacks of one kind keep their order.
        self.init_fns.sort_by_key(|cb| ranks[cb.module.index()]);
        self.start_fns.sort_by_key(|cb| ranks[cb.module.index()]);
        self.update_fns.sort_by_key(|cb| ranks[cb.module.index()]);

        self.state = SystemState::Ready;
        debug!("Module order: {:?}", self.sorted_names());
        Ok(())
    }

    /// Depth-first order over resolved dependencies. On a cycle, returns the
    /// name of the module reached while still being visited.
    fn topological_order(&self) -> Result<Vec<ModuleId>, &'static str> {
        let mut marks = alloc::vec![Mark::Unsorted; self.modules.len()];
        let mut order = Vec::with_capacity(self.modules.len());
        for idx in 0..self.modules.len() {
            self.visit(idx, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        idx: usize,
        marks: &mut [Mark],
        order: &mut Vec<ModuleId>,
    ) -> Result<(), &'static str> {
        match marks[idx] {
            Mark::Sorted => return Ok(()),
            Mark::Visiting => return Err(self.modules[idx].name),
            Mark::Unsorted => {}
        }
        marks[idx] = Mark::Visiting;
        if let Some(deps) = &self.modules[idx].dependencies {
            for slot in 0..deps.num_depends_on() {
                if let Some(dep) = deps.depends_on(slot) {
                    self.visit(dep.index(), marks, order)?;
                }
            }
        }
        marks[idx] = Mark::Sorted;
        order.push(ModuleId::new(idx));
        Ok(())
    }

    /// Run init callbacks in dependency order. Skipped unless linked.
    pub fn init(&mut self) {
        if self.state != SystemState::Ready {
            return;
        }
        for callback in &mut self.init_fns {
            (callback.f)();
        }
    }

    /// Run start callbacks in dependency order. Skipped unless linked.
    pub fn start(&mut self) {
        if self.state != SystemState::Ready {
            return;
        }
        for callback in &mut self.start_fns {
            (callback.f)();
        }
    }

    /// One pass over the update callbacks. Returns how many ran.
    pub fn update(&mut self) -> Result<usize, SystemError> {
        if self.state != SystemState::Ready {
            return Err(SystemError::NotReady);
        }
        for callback in &mut self.update_fns {
            (callback.f)();
        }
        Ok(self.update_fns.len())
    }

    /// Link, then init and start.
    pub fn setup(&mut self) -> Result<(), SystemError> {
        self.link()?;
        self.init();
        self.start();
        info!("Module system ready with {} modules", self.modules.len());
        Ok(())
    }

    pub fn is_ok(&self) -> bool {
        self.state == SystemState::Ready
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn logger(&self) -> &Rc<dyn Logger> {
        &self.logger
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn names(&self) -> &NameToModule {
        &self.names
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.names.id(name)
    }

    pub fn module_name(&self, id: ModuleId) -> Option<&'static str> {
        self.modules.get(id.index()).map(|record| record.name)
    }

    /// Position in execution order. `None` until linked.
    pub fn sorted_index(&self, id: ModuleId) -> Option<usize> {
        self.modules.get(id.index())?.sorted_index
    }

    /// Module names in execution order. Empty until linked.
    pub fn sorted_names(&self) -> Vec<&'static str> {
        let mut sorted: Vec<_> = self
            .modules
            .iter()
            .filter_map(|record| Some((record.sorted_index?, record.name)))
            .collect();
        sorted.sort_unstable_by_key(|&(rank, _)| rank);
        sorted.into_iter().map(|(_, name)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloc::format;
    use alloc::string::String;
    use core::cell::RefCell;

    use crate::logger::MemoryLogger;

    fn system(capacity: usize) -> (ModuleSystem, Rc<MemoryLogger>) {
        let logger = Rc::new(MemoryLogger::new());
        (ModuleSystem::new(logger.clone(), capacity), logger)
    }

    type Trace = Rc<RefCell<Vec<String>>>;

    /// A module that records each phase it runs into `trace`.
    fn traced(name: &'static str, trace: &Trace) -> Module {
        let (init, start, update) = (trace.clone(), trace.clone(), trace.clone());
        Module::new(name)
            .on_init(move || init.borrow_mut().push(format!("Init {name}")))
            .on_start(move || start.borrow_mut().push(format!("Start {name}")))
            .on_update(move || update.borrow_mut().push(format!("Update {name}")))
    }

    #[test]
    fn test_modules_sorted_after_dependencies() {
        let (mut system, logger) = system(8);
        let trace = Trace::default();
        traced("C", &trace).depends_on("B").register(&mut system).unwrap();
        traced("A", &trace).register(&mut system).unwrap();
        traced("B", &trace).depends_on("A").register(&mut system).unwrap();

        system.link().unwrap();
        assert!(system.is_ok());
        assert_eq!(system.sorted_names(), ["A", "B", "C"]);
        let index = |name| system.sorted_index(system.module_id(name).unwrap());
        assert_eq!((index("A"), index("B"), index("C")), (Some(0), Some(1), Some(2)));

        system.init();
        assert_eq!(*trace.borrow(), ["Init A", "Init B", "Init C"]);
        assert!(logger.is_empty());
    }

    #[test]
    fn test_independent_modules_keep_registration_order() {
        let (mut system, _) = system(8);
        let trace = Trace::default();
        traced("test1", &trace).register(&mut system).unwrap();
        traced("test3", &trace).depends_on("test2").register(&mut system).unwrap();
        traced("test2", &trace).register(&mut system).unwrap();
        traced("test4", &trace).register(&mut system).unwrap();
        system.setup().unwrap();
        assert_eq!(system.sorted_names(), ["test1", "test2", "test3", "test4"]);
        assert_eq!(system.update(), Ok(4));
        assert_eq!(trace.borrow().len(), 12);
        assert_eq!(trace.borrow()[8..], ["Update test1", "Update test2", "Update test3", "Update test4"]);
    }

    #[test]
    fn test_cycle_fails_link_and_logs_once() {
        let (mut system, logger) = system(8);
        let trace = Trace::default();
        traced("test2", &trace).depends_on("test1").register(&mut system).unwrap();
        traced("test1", &trace).depends_on("test3").register(&mut system).unwrap();
        traced("test3", &trace).depends_on("test2").register(&mut system).unwrap();

        assert_eq!(
            system.setup(),
            Err(SystemError::DependencyLoop { module: "test2" })
        );
        assert!(!system.is_ok());
        assert_eq!(system.state(), SystemState::Failed);
        assert_eq!(logger.lines(), ["Dependency loop detected at module 'test2'."]);

        system.init();
        system.start();
        assert_eq!(system.update(), Err(SystemError::NotReady));
        assert!(trace.borrow().is_empty());
        assert_eq!(system.sorted_index(ModuleId::new(0)), None);
    }

    #[test]
    fn test_three_module_cycle_any_rotation() {
        for rotation in 0..3 {
            let (mut system, logger) = system(4);
            let edges = [("A", "C"), ("B", "A"), ("C", "B")];
            for step in 0..3 {
                let (name, dep) = edges[(rotation + step) % 3];
                Module::new(name).depends_on(dep).register(&mut system).unwrap();
            }
            assert!(matches!(
                system.link(),
                Err(SystemError::DependencyLoop { .. })
            ));
            assert_eq!(logger.len(), 1);
            assert!(logger.lines()[0].starts_with("Dependency loop detected at module '"));
        }
    }

    #[test]
    fn test_callbacks_of_one_module_keep_order() {
        let (mut system, _) = system(4);
        let trace = Trace::default();
        let (a, b, c) = (trace.clone(), trace.clone(), trace.clone());
        Module::new("late")
            .depends_on("early")
            .on_init(move || a.borrow_mut().push("late 1".into()))
            .on_init(move || b.borrow_mut().push("late 2".into()))
            .register(&mut system)
            .unwrap();
        Module::new("early")
            .on_init(move || c.borrow_mut().push("early".into()))
            .register(&mut system)
            .unwrap();
        system.setup().unwrap();
        assert_eq!(*trace.borrow(), ["early", "late 1", "late 2"]);
    }

    #[test]
    fn test_unknown_dependency_is_fatal() {
        let (mut system, logger) = system(4);
        Module::new("display")
            .depends_on_all(["wifi", "fonts"])
            .register(&mut system)
            .unwrap();
        Module::new("wifi").register(&mut system).unwrap();

        assert_eq!(
            system.link(),
            Err(SystemError::UnresolvedDependencies { module: "display" })
        );
        assert_eq!(
            logger.lines(),
            ["Module 'display' depends on unknown module 'fonts'."]
        );
        assert_eq!(system.link(), Err(SystemError::AlreadyLinked));
    }

    #[test]
    fn test_link_callback_can_reject() {
        let (mut system, logger) = system(4);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        Module::new("first")
            .on_link(move |_| {
                log.borrow_mut().push("first");
                true
            })
            .register(&mut system)
            .unwrap();
        Module::new("picky")
            .on_link(|modules| modules.contains("absent"))
            .register(&mut system)
            .unwrap();

        assert_eq!(
            system.setup(),
            Err(SystemError::LinkRejected { module: "picky" })
        );
        assert_eq!(*seen.borrow(), ["first"]);
        assert_eq!(logger.lines(), ["Link failed for module 'picky'."]);
    }

    #[test]
    fn test_link_callback_fetches_shared_handle() {
        let (mut system, _) = system(4);
        let found = Rc::new(RefCell::new(None));
        let slot = found.clone();
        Module::new("consumer")
            .on_link(move |modules| {
                *slot.borrow_mut() = modules.get::<u32>("provider");
                slot.borrow().is_some()
            })
            .register(&mut system)
            .unwrap();
        Module::new("provider")
            .with_handle(Rc::new(42u32))
            .register(&mut system)
            .unwrap();
        system.setup().unwrap();
        assert_eq!(found.borrow().as_deref(), Some(&42));
    }

    #[test]
    fn test_duplicate_name_poisons_link() {
        let (mut system, logger) = system(4);
        Module::new("wifi").register(&mut system).unwrap();
        assert_eq!(
            Module::new("wifi").register(&mut system),
            Err(SystemError::DuplicateName { name: "wifi" })
        );
        assert_eq!(system.len(), 1);
        assert_eq!(
            system.link(),
            Err(SystemError::DuplicateName { name: "wifi" })
        );
        assert_eq!(logger.lines(), ["Duplicate module name 'wifi'."]);
    }

    #[test]
    fn test_capacity_and_late_registration() {
        let (mut system, _) = system(1);
        Module::new("only").register(&mut system).unwrap();
        assert_eq!(
            Module::new("extra").register(&mut system),
            Err(SystemError::CapacityExceeded { max: 1 })
        );
        assert!(system.setup().is_err());

        let (mut system, _) = self::system(2);
        Module::new("only").register(&mut system).unwrap();
        system.setup().unwrap();
        assert_eq!(
            Module::new("late").register(&mut system),
            Err(SystemError::AlreadyLinked)
        );
    }

    #[test]
    fn test_dependency_order_holds_for_random_graphs() {
        const NAMES: [&str; 10] = ["m0", "m1", "m2", "m3", "m4", "m5", "m6", "m7", "m8", "m9"];
        let mut seed = 0x9e37_79b9u32;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        for _ in 0..20 {
            // Edges only point from higher to lower names, so the graph is
            // acyclic; registration order is shuffled.
            let mut edges: Vec<(usize, usize)> = Vec::new();
            for from in 1..NAMES.len() {
                for to in 0..from {
                    if next() % 4 == 0 {
                        edges.push((from, to));
                    }
                }
            }
            let mut order: Vec<usize> = (0..NAMES.len()).collect();
            for i in (1..order.len()).rev() {
                order.swap(i, next() as usize % (i + 1));
            }

            let (mut system, _) = system(NAMES.len());
            for &m in &order {
                let deps: Vec<&'static str> = edges
                    .iter()
                    .filter(|&&(from, _)| from == m)
                    .map(|&(_, to)| NAMES[to])
                    .collect();
                Module::new(NAMES[m])
                    .depends_on_all(deps)
                    .register(&mut system)
                    .unwrap();
            }
            system.link().unwrap();

            let rank = |m: usize| {
                system
                    .sorted_index(system.module_id(NAMES[m]).unwrap())
                    .unwrap()
            };
            for &(from, to) in &edges {
                assert!(rank(from) > rank(to));
            }
        }
    }
}
