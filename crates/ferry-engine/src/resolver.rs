//! Reference resolution
//!
//! Decides, per named object, whether it can cross the wire as a lookup path
//! (reference encoding) or must be captured by value. Reference encoding is
//! the only option for stdlib-style definitions; by-value capture is the
//! fallback for everything interactively or locally defined, and can be
//! forced per module through [`ByValuePolicy`].

use ferry_runtime::module::ENTRY_MODULE;
use ferry_runtime::{lookup_path, Module, ModuleOrigin, ModuleRegistry, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Process-default by-value policy set, shared by engines that don't carry
/// their own.
static GLOBAL_POLICY: Lazy<Arc<ByValuePolicy>> = Lazy::new(ByValuePolicy::new);

/// The set of modules whose functions and classes are captured by value even
/// though they would resolve by reference
///
/// Registering a module under active development lets workers pick up new
/// definitions without re-installing it on every node. The set is empty at
/// process start and does not persist across restarts.
#[derive(Debug)]
pub struct ByValuePolicy {
    set: Mutex<FxHashSet<String>>,
}

impl ByValuePolicy {
    /// Create an empty policy set
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            set: Mutex::new(FxHashSet::default()),
        })
    }

    /// The process-wide default policy set
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_POLICY)
    }

    /// Register a module for by-value capture. Idempotent.
    pub fn register(&self, module: &Module) {
        self.set.lock().insert(module.name.clone());
    }

    /// Unregister a module, restoring reference resolution. Idempotent.
    pub fn unregister(&self, module: &Module) {
        self.set.lock().remove(&module.name);
    }

    /// True when `module_name` is registered
    pub fn contains(&self, module_name: &str) -> bool {
        self.set.lock().contains(module_name)
    }
}

/// Outcome of a resolution decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Transmit a lookup path; the destination must be able to import it
    Reference {
        /// Owning module name
        module: String,
        /// Dotted path of the object inside the module
        qualname: String,
    },
    /// Transmit enough data to reconstruct the object
    Value,
}

/// Decides reference-vs-value per named object
///
/// Pure given the current registry state; the result can differ across calls
/// if modules load or unload concurrently, and no synchronization is
/// attempted against that.
pub struct ReferenceResolver {
    registry: Arc<ModuleRegistry>,
    policy: Arc<ByValuePolicy>,
}

impl ReferenceResolver {
    /// Create a resolver over a module registry and policy set
    pub fn new(registry: Arc<ModuleRegistry>, policy: Arc<ByValuePolicy>) -> Self {
        Self { registry, policy }
    }

    /// The policy set this resolver consults
    pub fn policy(&self) -> &Arc<ByValuePolicy> {
        &self.policy
    }

    /// Decide how `obj` should cross the wire
    ///
    /// `name` overrides the object's own derived name (its qualified name
    /// for functions and classes). With no derivable name the object cannot
    /// be referenced and the result is [`Resolution::Value`].
    pub fn decide(&self, obj: &Value, name: Option<&str>) -> Resolution {
        let name = match name.map(str::to_string).or_else(|| derived_name(obj)) {
            Some(name) => name,
            None => return Resolution::Value,
        };

        let module_name = match self.which_module(obj, &name) {
            Some(module_name) => module_name,
            None => return Resolution::Value,
        };

        if module_name == ENTRY_MODULE {
            return Resolution::Value;
        }

        let module = match self.registry.get(&module_name) {
            Some(module) => module,
            // Declared owner is not loaded here; nothing to reference.
            None => return Resolution::Value,
        };

        if module.is_entry || self.policy.contains(&module_name) {
            return Resolution::Value;
        }

        match module.origin {
            // Constructed ad hoc; not locatable from a stable position.
            ModuleOrigin::Synthetic => Resolution::Value,
            ModuleOrigin::Source(_) | ModuleOrigin::Frozen => Resolution::Reference {
                module: module_name,
                qualname: name,
            },
        }
    }

    /// Find the module an object belongs to
    ///
    /// Prefers the object's declared module attribute. Otherwise scans a
    /// snapshot of the registry for a module whose lookup of `name` is the
    /// object itself (by identity), stopping at the first match. Lookup
    /// errors from candidate modules are swallowed: a broken third-party
    /// module must not fail resolution of unrelated objects.
    fn which_module(&self, obj: &Value, name: &str) -> Option<String> {
        if let Some(declared) = declared_module(obj) {
            return Some(declared);
        }

        for (module_name, module) in self.registry.snapshot() {
            if module.is_entry {
                continue;
            }
            match lookup_path(&module, name) {
                Ok(found) if found.is(obj) => return Some(module_name),
                Ok(_) => {}
                Err(err) => {
                    log::trace!(
                        "module scan: lookup of '{name}' in '{module_name}' failed: {err}"
                    );
                }
            }
        }
        None
    }
}

fn derived_name(obj: &Value) -> Option<String> {
    match obj {
        Value::Function(func) => Some(func.qualname.clone()),
        Value::Class(class) => Some(class.qualname.clone()),
        Value::Native(native) => Some(native.name.clone()),
        _ => None,
    }
}

fn declared_module(obj: &Value) -> Option<String> {
    match obj {
        Value::Function(func) => func.module.clone(),
        Value::Class(class) => class.module.clone(),
        Value::Native(native) => Some(native.module.clone()),
        _ => None,
    }
}
