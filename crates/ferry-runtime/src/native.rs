//! Native function registry
//!
//! Native functions are opaque to serialization: only their identifying
//! (module, name) key crosses the wire, and the destination resolves the key
//! against its own registry.

use crate::error::RuntimeError;
use crate::value::{next_object_id, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Signature of a native implementation
pub type NativeFn = fn(&[Value]) -> Result<Value, RuntimeError>;

/// A function backed by native code
pub struct NativeFunction {
    /// Unique object ID
    pub object_id: u64,
    /// Module the native is registered under
    pub module: String,
    /// Name the native is registered under
    pub name: String,
    /// The implementation
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("module", &self.module)
            .field("name", &self.name)
            .finish()
    }
}

impl NativeFunction {
    /// Invoke the native implementation
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        (self.func)(args)
    }
}

/// Per-process table of native functions, keyed by (module, name)
#[derive(Debug)]
pub struct NativeRegistry {
    entries: Mutex<FxHashMap<(String, String), Arc<NativeFunction>>>,
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(FxHashMap::default()),
        })
    }

    /// Register a native implementation, returning its function object
    pub fn register(
        &self,
        module: impl Into<String>,
        name: impl Into<String>,
        func: NativeFn,
    ) -> Arc<NativeFunction> {
        let module = module.into();
        let name = name.into();
        let native = Arc::new(NativeFunction {
            object_id: next_object_id(),
            module: module.clone(),
            name: name.clone(),
            func,
        });
        self.entries
            .lock()
            .insert((module, name), Arc::clone(&native));
        native
    }

    /// Look up a registered native
    pub fn get(&self, module: &str, name: &str) -> Option<Arc<NativeFunction>> {
        self.entries
            .lock()
            .get(&(module.to_string(), name.to_string()))
            .cloned()
    }
}
