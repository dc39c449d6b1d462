//! Global-binding extraction
//!
//! Static analysis over compiled units: which external names does a function
//! body (including its nested function bodies) read, write, or delete? The
//! answer determines the filtered globals subset a function capsule carries.

use ferry_bytecode::{CodeUnit, Operand};
use ferry_runtime::{Module, ModuleRegistry};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Weak};

/// Memoizing extractor of global-binding sets
///
/// Units are immutable once compiled, so the per-unit result is cached
/// forever, keyed by unit identity and held weakly so the cache never keeps
/// a unit alive. The single lock is scoped to each check-or-insert, not to
/// the extraction walk itself.
#[derive(Debug)]
pub struct GlobalsCache {
    cache: Mutex<FxHashMap<u64, (Weak<CodeUnit>, Arc<FxHashSet<String>>)>>,
}

impl GlobalsCache {
    /// Create an empty cache
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cache: Mutex::new(FxHashMap::default()),
        })
    }

    /// Number of live cached entries
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .values()
            .filter(|(unit, _)| unit.upgrade().is_some())
            .count()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all globals read, written, or deleted by `unit`, recursing
    /// into nested units held as constants
    pub fn extract(&self, unit: &Arc<CodeUnit>) -> Arc<FxHashSet<String>> {
        if let Some((cached_unit, names)) = self.cache.lock().get(&unit.unit_id) {
            if cached_unit.upgrade().is_some() {
                return Arc::clone(names);
            }
        }

        let mut names = FxHashSet::default();
        collect_global_names(unit, &mut names);
        let names = Arc::new(names);

        let mut cache = self.cache.lock();
        cache.retain(|_, (unit, _)| unit.upgrade().is_some());
        cache.insert(unit.unit_id, (Arc::downgrade(unit), Arc::clone(&names)));
        names
    }
}

/// Single pass over the instruction stream collecting name operands of the
/// three global-referencing instructions.
fn collect_global_names(unit: &CodeUnit, out: &mut FxHashSet<String>) {
    for instruction in unit.instructions() {
        // A unit that fails to decode contributes nothing; execution of the
        // same unit will surface the malformed stream as a runtime error.
        let Ok(instruction) = instruction else {
            log::warn!(
                "global extraction: malformed instruction stream in unit '{}'",
                unit.qualname
            );
            break;
        };
        if !instruction.opcode.is_global_op() {
            continue;
        }
        if let Operand::U16(index) = instruction.operand {
            if let Some(name) = unit.name_at(index) {
                out.insert(name.to_string());
            }
        }
    }

    for nested in unit.nested_units() {
        collect_global_names(nested, out);
    }
}

/// Find currently imported submodules used by a unit
///
/// `import pkg.sub; use pkg.sub.X` binds only `pkg` as a global: `sub` is
/// reached by attribute access and never appears in a global-referencing
/// instruction. Such submodules must still be shipped, or the reconstructed
/// function fails at its first `pkg.sub` access. Detection: every name in
/// the unit's name table that resolves as an attribute of a loaded module
/// nested under one of the function's top-level dependencies marks that
/// module as used.
pub fn find_imported_submodules(
    unit: &CodeUnit,
    top_level_deps: &[Arc<Module>],
    registry: &ModuleRegistry,
) -> Vec<Arc<Module>> {
    let mut found: Vec<Arc<Module>> = Vec::new();
    collect_submodules(unit, top_level_deps, registry, &mut found);
    found
}

fn collect_submodules(
    unit: &CodeUnit,
    top_level_deps: &[Arc<Module>],
    registry: &ModuleRegistry,
    out: &mut Vec<Arc<Module>>,
) {
    for name in &unit.names {
        for (module_name, module) in registry.snapshot() {
            if module.is_entry {
                continue;
            }
            let is_dependency = top_level_deps.iter().any(|dep| {
                module_name == dep.name || module_name.starts_with(&format!("{}.", dep.name))
            });
            if !is_dependency {
                continue;
            }
            if module.get(name).is_some() {
                if !out.iter().any(|m| m.object_id == module.object_id) {
                    out.push(module);
                }
                break;
            }
        }
    }

    for nested in unit.nested_units() {
        collect_submodules(nested, top_level_deps, registry, out);
    }
}
