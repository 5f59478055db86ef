//! # Discovery: find module files and confirm they expose an entry point.
//!
//! Walks a root directory (sorted by file name, so discovery order is stable)
//! and turns each candidate file into a [`ModuleDescriptor`]:
//!
//! ```text
//! root/moderation/ban.rs ──► qualified "moderation.ban"
//!   ├─ hidden / `_`-prefixed file or directory   → not a candidate
//!   ├─ wrong extension                           → not a candidate
//!   ├─ stem or qualified name in Config::ignore  → not a candidate
//!   ├─ no Loadable registered under that name    → not a module (silently excluded)
//!   └─ otherwise                                 → Discovered, tier = override or Loadable::priority
//! ```
//!
//! ## Rules
//! - Candidate code is never executed here.
//! - An unreadable root fails fast with [`RuntimeError::Configuration`].
//! - An unreadable entry below the root is logged and skipped.

use std::path::{Component, Path};

use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

use crate::core::Config;
use crate::error::RuntimeError;
use crate::modules::{ModuleCatalog, ModuleDescriptor};

const PRIVATE_PREFIX: char = '_';

/// Discovers modules below `root`, in walk order.
pub fn discover(
    root: &Path,
    catalog: &ModuleCatalog,
    cfg: &Config,
) -> Result<Vec<ModuleDescriptor>, RuntimeError> {
    std::fs::read_dir(root).map_err(|e| RuntimeError::Configuration {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_private(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(desc) = inspect(root, entry.path(), catalog, cfg) {
            found.push(desc);
        }
    }

    debug!(root = %root.display(), modules = found.len(), "discovery finished");
    Ok(found)
}

/// Discovers modules below every root, roots in the given order.
pub fn discover_all<P: AsRef<Path>>(
    roots: &[P],
    catalog: &ModuleCatalog,
    cfg: &Config,
) -> Result<Vec<ModuleDescriptor>, RuntimeError> {
    let mut all = Vec::new();
    for root in roots {
        all.extend(discover(root.as_ref(), catalog, cfg)?);
    }
    Ok(all)
}

fn inspect(
    root: &Path,
    path: &Path,
    catalog: &ModuleCatalog,
    cfg: &Config,
) -> Option<ModuleDescriptor> {
    if path.extension().and_then(|e| e.to_str()) != Some(cfg.extension.as_str()) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let qualified = qualified_name(root, path)?;

    if cfg.is_ignored(stem, &qualified) {
        trace!(module = %qualified, "ignored by configuration");
        return None;
    }

    let Some(module) = catalog.get(&qualified) else {
        trace!(path = %path.display(), "no entry point registered; not a module");
        return None;
    };

    let tier = cfg.tier_for(&qualified, module.priority());
    Some(ModuleDescriptor::new(path, qualified, tier))
}

/// `root/a/b/c.rs` → `"a.b.c"`. `None` for non-UTF-8 components.
fn qualified_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?.with_extension("");
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}

fn is_private(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with(PRIVATE_PREFIX) || name.starts_with('.'))
        .unwrap_or(true)
}
