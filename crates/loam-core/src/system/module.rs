use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;

use super::{
    Dependencies, DependencyList, ModuleId, ModuleSystem, NameToModule, SingleDependency,
    SystemError,
};

/// Init, start and update callback.
pub type Thunk = Box<dyn FnMut()>;

/// Link callback. Returning `false` fails the whole link.
pub type LinkFn = Box<dyn FnMut(&NameToModule) -> bool>;

/// A named unit of functionality, built up and then handed to a
/// [`ModuleSystem`] with [`Module::register`].
///
/// ```ignore
/// let id = Module::new("display")
///     .depends_on("wifi")
///     .on_init(|| info!("display up"))
///     .register(&mut system)?;
/// ```
pub struct Module {
    pub(super) name: &'static str,
    pub(super) dependencies: Option<Box<dyn Dependencies>>,
    pub(super) handle: Option<Rc<dyn Any>>,
    pub(super) link: Vec<LinkFn>,
    pub(super) init: Vec<Thunk>,
    pub(super) start: Vec<Thunk>,
    pub(super) update: Vec<Thunk>,
}

impl Module {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            dependencies: None,
            handle: None,
            link: Vec::new(),
            init: Vec::new(),
            start: Vec::new(),
            update: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add one dependency on top of any already declared.
    pub fn depends_on(mut self, name: &'static str) -> Self {
        let single = SingleDependency::new(name);
        let deps: Box<dyn Dependencies> = match self.dependencies.take() {
            Some(previous) => Box::new(single.with_previous(previous)),
            None => Box::new(single),
        };
        self.dependencies = Some(deps);
        self
    }

    /// Add several dependencies on top of any already declared.
    pub fn depends_on_all<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        let list = DependencyList::new(names);
        let deps: Box<dyn Dependencies> = match self.dependencies.take() {
            Some(previous) => Box::new(list.with_previous(previous)),
            None => Box::new(list),
        };
        self.dependencies = Some(deps);
        self
    }

    /// Replace the declaration with a prebuilt one.
    pub fn with_dependencies<D>(mut self, dependencies: D) -> Self
    where
        D: Dependencies + 'static,
    {
        self.dependencies = Some(Box::new(dependencies));
        self
    }

    /// Share `handle` with other modules through [`NameToModule::get`].
    pub fn with_handle<T: Any>(mut self, handle: Rc<T>) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn on_link<F>(mut self, f: F) -> Self
    where
        F: FnMut(&NameToModule) -> bool + 'static,
    {
        self.link.push(Box::new(f));
        self
    }

    pub fn on_init<F>(mut self, f: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.init.push(Box::new(f));
        self
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.start.push(Box::new(f));
        self
    }

    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.update.push(Box::new(f));
        self
    }

    pub fn register(self, system: &mut ModuleSystem) -> Result<ModuleId, SystemError> {
        system.add_module(self)
    }
}

impl core::fmt::Debug for Module {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("link", &self.link.len())
            .field("init", &self.init.len())
            .field("start", &self.start.len())
            .field("update", &self.update.len())
            .finish_non_exhaustive()
    }
}
