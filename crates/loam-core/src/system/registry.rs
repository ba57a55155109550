use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use core::any::Any;
use core::fmt;

/// Stable handle to a registered module: its registration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(usize);

impl ModuleId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entry {
    id: ModuleId,
    handle: Option<Rc<dyn Any>>,
}

/// Name lookup handed to link callbacks and dependency resolution.
#[derive(Default)]
pub struct NameToModule {
    entries: BTreeMap<&'static str, Entry>,
}

impl NameToModule {
    /// Returns `false` without inserting if `name` is taken.
    pub(crate) fn insert(
        &mut self,
        name: &'static str,
        id: ModuleId,
        handle: Option<Rc<dyn Any>>,
    ) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name, Entry { id, handle });
        true
    }

    pub fn id(&self, name: &str) -> Option<ModuleId> {
        self.entries.get(name).map(|entry| entry.id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The shared handle `name` registered, if it is an `Rc<T>`.
    pub fn get<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        let handle = self.entries.get(name)?.handle.clone()?;
        handle.downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

impl fmt::Debug for NameToModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, entry)| (name, entry.id)))
            .finish()
    }
}
