//! # Typed module registry.
//!
//! Modules self-register here when the host is assembled. Discovery then
//! confirms that a candidate file is a module by looking its qualified name up
//! in the catalog: a file with no registered [`Loadable`](crate::Loadable) is
//! simply not a module. Nothing is parsed or executed to find out.

use std::collections::HashMap;

use super::loadable::ModuleRef;

#[derive(Default, Clone)]
pub struct ModuleCatalog {
    modules: HashMap<String, ModuleRef>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under its own name, returning any module it replaced.
    pub fn register(&mut self, module: ModuleRef) -> Option<ModuleRef> {
        self.modules.insert(module.name().to_string(), module)
    }

    /// Builder-style [`ModuleCatalog::register`].
    pub fn with(mut self, module: ModuleRef) -> Self {
        self.register(module);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRef> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Sorted registered names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl FromIterator<ModuleRef> for ModuleCatalog {
    fn from_iter<I: IntoIterator<Item = ModuleRef>>(iter: I) -> Self {
        let mut catalog = ModuleCatalog::new();
        for module in iter {
            catalog.register(module);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostContext, ModuleError, ModuleFn};

    #[test]
    fn later_registration_replaces_earlier() {
        let a: ModuleRef = ModuleFn::arc("x.a", 1, |_h: HostContext| async { Ok::<_, ModuleError>(()) });
        let b: ModuleRef = ModuleFn::arc("x.a", 9, |_h: HostContext| async { Ok::<_, ModuleError>(()) });

        let mut catalog = ModuleCatalog::new().with(a);
        assert!(catalog.register(b).is_some());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("x.a").map(|m| m.priority()), Some(9));
        assert_eq!(catalog.names(), vec!["x.a"]);
    }
}
