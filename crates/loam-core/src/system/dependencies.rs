//! Named references from one module to the modules it needs.
//!
//! A declaration is resolved once against the live [`NameToModule`] during
//! link. Missing names make the declaration fail but never stop the other
//! names from resolving, so diagnostics can list every missing module.
//!
//! Declarations chain: each variant can wrap a `previous` declaration that
//! resolves first and whose predecessors come first in
//! [`Dependencies::depends_on`]. This lets a module add its own names on top
//! of a prebuilt set.

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::{ModuleId, NameToModule};

pub trait Dependencies {
    /// Look every name up. Returns `true` only if all names, including the
    /// chained declaration's, were found.
    fn resolve(&mut self, modules: &NameToModule) -> bool;

    /// Result of the last [`resolve`](Self::resolve).
    fn is_resolved(&self) -> bool;

    /// Number of predecessor slots, chain included.
    fn num_depends_on(&self) -> usize;

    /// Resolved predecessor in slot `idx`. `None` for an empty or unresolved
    /// slot.
    fn depends_on(&self, idx: usize) -> Option<ModuleId>;

    /// Names that failed to resolve, chain first.
    fn unresolved(&self) -> Vec<&'static str>;
}

#[derive(Default)]
struct Chain {
    previous: Option<Box<dyn Dependencies>>,
}

impl Chain {
    fn resolve(&mut self, modules: &NameToModule) -> bool {
        self.previous
            .as_mut()
            .is_none_or(|previous| previous.resolve(modules))
    }

    fn is_resolved(&self) -> bool {
        self.previous
            .as_ref()
            .is_none_or(|previous| previous.is_resolved())
    }

    fn len(&self) -> usize {
        self.previous
            .as_ref()
            .map_or(0, |previous| previous.num_depends_on())
    }

    fn depends_on(&self, idx: usize) -> Option<ModuleId> {
        self.previous.as_ref()?.depends_on(idx)
    }

    fn unresolved(&self) -> Vec<&'static str> {
        self.previous
            .as_ref()
            .map(|previous| previous.unresolved())
            .unwrap_or_default()
    }
}

/// `None` names resolve to an empty slot.
fn lookup(modules: &NameToModule, name: Option<&'static str>, slot: &mut Option<ModuleId>) -> bool {
    match name {
        Some(name) => {
            *slot = modules.id(name);
            slot.is_some()
        }
        None => {
            *slot = None;
            true
        }
    }
}

/// Exactly one named dependency.
pub struct SingleDependency {
    name: &'static str,
    resolved: Option<ModuleId>,
    ok: bool,
    chain: Chain,
}

impl SingleDependency {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            resolved: None,
            ok: false,
            chain: Chain::default(),
        }
    }

    pub fn with_previous(mut self, previous: Box<dyn Dependencies>) -> Self {
        self.chain.previous = Some(previous);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Dependencies for SingleDependency {
    fn resolve(&mut self, modules: &NameToModule) -> bool {
        let chained = self.chain.resolve(modules);
        let own = lookup(modules, Some(self.name), &mut self.resolved);
        self.ok = chained && own;
        self.ok
    }

    fn is_resolved(&self) -> bool {
        self.ok && self.chain.is_resolved()
    }

    fn num_depends_on(&self) -> usize {
        self.chain.len() + 1
    }

    fn depends_on(&self, idx: usize) -> Option<ModuleId> {
        let chained = self.chain.len();
        if idx < chained {
            self.chain.depends_on(idx)
        } else if idx == chained {
            self.resolved
        } else {
            None
        }
    }

    fn unresolved(&self) -> Vec<&'static str> {
        let mut missing = self.chain.unresolved();
        if self.resolved.is_none() {
            missing.push(self.name);
        }
        missing
    }
}

/// A fixed number of dependency slots, some possibly empty.
pub struct DependencyArray<const N: usize> {
    names: [Option<&'static str>; N],
    resolved: [Option<ModuleId>; N],
    ok: bool,
    chain: Chain,
}

impl<const N: usize> DependencyArray<N> {
    pub fn new(names: [Option<&'static str>; N]) -> Self {
        Self {
            names,
            resolved: [None; N],
            ok: false,
            chain: Chain::default(),
        }
    }

    pub fn with_previous(mut self, previous: Box<dyn Dependencies>) -> Self {
        self.chain.previous = Some(previous);
        self
    }
}

impl<const N: usize> Dependencies for DependencyArray<N> {
    fn resolve(&mut self, modules: &NameToModule) -> bool {
        let mut ok = self.chain.resolve(modules);
        for (name, slot) in self.names.iter().zip(self.resolved.iter_mut()) {
            ok &= lookup(modules, *name, slot);
        }
        self.ok = ok;
        ok
    }

    fn is_resolved(&self) -> bool {
        self.ok && self.chain.is_resolved()
    }

    fn num_depends_on(&self) -> usize {
        self.chain.len() + N
    }

    fn depends_on(&self, idx: usize) -> Option<ModuleId> {
        let chained = self.chain.len();
        if idx < chained {
            self.chain.depends_on(idx)
        } else {
            self.resolved.get(idx - chained).copied().flatten()
        }
    }

    fn unresolved(&self) -> Vec<&'static str> {
        let mut missing = self.chain.unresolved();
        missing.extend(
            self.names
                .iter()
                .zip(self.resolved.iter())
                .filter_map(|(name, slot)| match (name, slot) {
                    (Some(name), None) => Some(*name),
                    _ => None,
                }),
        );
        missing
    }
}

/// A dependency list sized at runtime.
#[derive(Default)]
pub struct DependencyList {
    names: Vec<&'static str>,
    resolved: Vec<Option<ModuleId>>,
    ok: bool,
    chain: Chain,
}

impl DependencyList {
    pub fn new<I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        let names: Vec<_> = names.into_iter().collect();
        Self {
            resolved: alloc::vec![None; names.len()],
            names,
            ok: false,
            chain: Chain::default(),
        }
    }

    pub fn with_previous(mut self, previous: Box<dyn Dependencies>) -> Self {
        self.chain.previous = Some(previous);
        self
    }

    pub fn push(&mut self, name: &'static str) {
        self.names.push(name);
        self.resolved.push(None);
        self.ok = false;
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Dependencies for DependencyList {
    fn resolve(&mut self, modules: &NameToModule) -> bool {
        let mut ok = self.chain.resolve(modules);
        for (name, slot) in self.names.iter().zip(self.resolved.iter_mut()) {
            ok &= lookup(modules, Some(*name), slot);
        }
        self.ok = ok;
        ok
    }

    fn is_resolved(&self) -> bool {
        self.ok && self.chain.is_resolved()
    }

    fn num_depends_on(&self) -> usize {
        self.chain.len() + self.names.len()
    }

    fn depends_on(&self, idx: usize) -> Option<ModuleId> {
        let chained = self.chain.len();
        if idx < chained {
            self.chain.depends_on(idx)
        } else {
            self.resolved.get(idx - chained).copied().flatten()
        }
    }

    fn unresolved(&self) -> Vec<&'static str> {
        let mut missing = self.chain.unresolved();
        missing.extend(
            self.names
                .iter()
                .zip(self.resolved.iter())
                .filter(|(_, slot)| slot.is_none())
                .map(|(name, _)| *name),
        );
        missing
    }
}
