//! Modules and the loaded-module registry
//!
//! A module is a named namespace. The registry is the process's table of
//! loaded modules: the space the reference resolver scans when deciding
//! whether an object is importable on the other side.

use crate::class::ClassObject;
use crate::error::RuntimeError;
use crate::value::{next_object_id, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Conventional name of the transient entry-point module
pub const ENTRY_MODULE: &str = "__main__";

/// Shared mutable name → value map
///
/// A function's global namespace and its defining module's dict are the same
/// structure, and usually the same instance.
#[derive(Debug)]
pub struct Namespace {
    /// Unique object ID
    pub object_id: u64,
    map: Mutex<FxHashMap<String, Value>>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            map: Mutex::new(FxHashMap::default()),
        })
    }

    /// Value bound under `name`
    pub fn get(&self, name: &str) -> Option<Value> {
        self.map.lock().get(name).cloned()
    }

    /// Bind `name`
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.map.lock().insert(name.into(), value);
    }

    /// Remove a binding
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.map.lock().remove(name)
    }

    /// True when `name` is bound
    pub fn contains(&self, name: &str) -> bool {
        self.map.lock().contains_key(name)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// True when no names are bound
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Drop every binding
    pub fn clear(&self) {
        self.map.lock().clear();
    }

    /// Snapshot of the bindings, sorted by name for deterministic iteration
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<_> = self
            .map
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

/// Where a module came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Loaded from a source file at this path
    Source(String),
    /// Shipped with the runtime; no source path, but stably importable
    Frozen,
    /// Constructed ad hoc at runtime; not locatable from a stable position
    Synthetic,
}

/// A loaded module
#[derive(Debug)]
pub struct Module {
    /// Unique object ID
    pub object_id: u64,
    /// Dotted module name
    pub name: String,
    /// The module's dict
    pub namespace: Arc<Namespace>,
    /// Where the module came from
    pub origin: ModuleOrigin,
    /// True for the transient entry-point context
    pub is_entry: bool,
}

impl Module {
    /// Create a module
    pub fn new(name: impl Into<String>, origin: ModuleOrigin) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            object_id: next_object_id(),
            is_entry: name == ENTRY_MODULE,
            name,
            namespace: Namespace::new(),
            origin,
        })
    }

    /// Create the transient entry-point module
    pub fn entry() -> Arc<Self> {
        Self::new(ENTRY_MODULE, ModuleOrigin::Synthetic)
    }

    /// Shorthand for a namespace lookup
    pub fn get(&self, name: &str) -> Option<Value> {
        self.namespace.get(name)
    }

    /// Shorthand for a namespace binding
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.namespace.set(name, value);
    }
}

/// The process's loaded-module table
///
/// Scan iteration works over a snapshot of the table so that resolver scans
/// are not invalidated by concurrent loads. Snapshot order is not a
/// contract.
#[derive(Debug)]
pub struct ModuleRegistry {
    modules: Mutex<FxHashMap<String, Arc<Module>>>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            modules: Mutex::new(FxHashMap::default()),
        })
    }

    /// Register a module under its name
    pub fn insert(&self, module: Arc<Module>) {
        self.modules.lock().insert(module.name.clone(), module);
    }

    /// Create, register, and return a module
    pub fn install(&self, name: impl Into<String>, origin: ModuleOrigin) -> Arc<Module> {
        let module = Module::new(name, origin);
        self.insert(Arc::clone(&module));
        module
    }

    /// Module registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        self.modules.lock().get(name).cloned()
    }

    /// Remove a module
    pub fn remove(&self, name: &str) -> Option<Arc<Module>> {
        self.modules.lock().remove(name)
    }

    /// True when `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.modules.lock().contains_key(name)
    }

    /// Snapshot of the table
    pub fn snapshot(&self) -> Vec<(String, Arc<Module>)> {
        self.modules
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    /// Resolve a dotted qualified name inside a registered module
    pub fn resolve_path(&self, module_name: &str, qualname: &str) -> Result<Value, RuntimeError> {
        let module = self
            .get(module_name)
            .ok_or_else(|| RuntimeError::ModuleNotLoaded(module_name.to_string()))?;
        lookup_path(&module, qualname)
    }
}

/// Attribute traversal of a dotted qualified name, starting at a module
///
/// Each path segment is looked up on the current object: module namespaces,
/// class bodies (bases included), instance fields, and function attributes
/// are traversable.
pub fn lookup_path(module: &Arc<Module>, qualname: &str) -> Result<Value, RuntimeError> {
    let mut current = Value::Module(Arc::clone(module));
    for segment in qualname.split('.') {
        current = attr_of(&current, segment)?;
    }
    Ok(current)
}

fn attr_of(value: &Value, name: &str) -> Result<Value, RuntimeError> {
    let found = match value {
        Value::Module(module) => module.get(name),
        Value::Class(class) => class_attr(class, name),
        Value::Instance(instance) => instance
            .get_field(name)
            .or_else(|| class_attr(&instance.class, name)),
        Value::Function(func) => func.get_prop(name),
        _ => None,
    };
    found.ok_or_else(|| RuntimeError::UndefinedAttribute {
        type_name: value.type_name(),
        name: name.to_string(),
    })
}

fn class_attr(class: &Arc<ClassObject>, name: &str) -> Option<Value> {
    class.lookup(name)
}
