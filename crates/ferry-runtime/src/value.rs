//! Value representation
//!
//! Ferry values are cheap-clone handles: atoms are stored inline and every
//! heap object lives behind an `Arc`. Heap objects carry a process-unique
//! object id assigned at allocation, which is what identity-keyed tables
//! (serialization memo, class tracker) key on.

use crate::class::{ClassObject, Instance};
use crate::module::Module;
use crate::native::NativeFunction;
use crate::object::{
    BoundMethod, CaptureCell, DictObject, Function, ListObject, LockObject, LoggerHandle,
    MappingView, Property, TextStream, WeakSetObject,
};
use ferry_bytecode::CodeUnit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global counter for generating unique object IDs
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique object ID
pub(crate) fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// Null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Immutable byte buffer
    Bytes(Arc<[u8]>),
    /// Distinguished marker standing in for the contents of an empty
    /// capture cell in serialized state. Never observable by executing code:
    /// restoring a sentinel leaves the cell empty.
    EmptySentinel,
    /// Mutable list
    List(Arc<ListObject>),
    /// Mutable string-keyed mapping
    Dict(Arc<DictObject>),
    /// Compiled unit
    Unit(Arc<CodeUnit>),
    /// Bytecode-backed function
    Function(Arc<Function>),
    /// Native (opaque) function
    Native(Arc<NativeFunction>),
    /// Class object (plain, enum, or singleton)
    Class(Arc<ClassObject>),
    /// Instance of a class
    Instance(Arc<Instance>),
    /// Closure capture cell
    Cell(Arc<CaptureCell>),
    /// Loaded module
    Module(Arc<Module>),
    /// (receiver, method) pair
    BoundMethod(Arc<BoundMethod>),
    /// Getter/setter descriptor
    Property(Arc<Property>),
    /// In-memory text stream
    Stream(Arc<TextStream>),
    /// Named diagnostic-channel singleton
    Logger(Arc<LoggerHandle>),
    /// Synchronization primitive
    Lock(Arc<LockObject>),
    /// Weak container over instances
    WeakSet(Arc<WeakSetObject>),
    /// Live view over a dict
    MappingView(Arc<MappingView>),
}

/// Type tag of a value
///
/// Used as the dispatch key of the per-type strategy registry and for
/// namespacing identity ids (unit ids and object ids are separate counters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    EmptySentinel,
    List,
    Dict,
    Unit,
    Function,
    Native,
    Class,
    Instance,
    Cell,
    Module,
    BoundMethod,
    Property,
    Stream,
    Logger,
    Lock,
    WeakSet,
    MappingView,
}

impl Value {
    /// Create a string value
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Create a byte-buffer value
    pub fn bytes(b: impl AsRef<[u8]>) -> Self {
        Value::Bytes(Arc::from(b.as_ref()))
    }

    /// Create a list value from elements
    pub fn list(elements: Vec<Value>) -> Self {
        Value::List(Arc::new(ListObject::new(elements)))
    }

    /// Create an empty dict value
    pub fn dict() -> Self {
        Value::Dict(Arc::new(DictObject::new()))
    }

    /// Type tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::EmptySentinel => ValueKind::EmptySentinel,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
            Value::Unit(_) => ValueKind::Unit,
            Value::Function(_) => ValueKind::Function,
            Value::Native(_) => ValueKind::Native,
            Value::Class(_) => ValueKind::Class,
            Value::Instance(_) => ValueKind::Instance,
            Value::Cell(_) => ValueKind::Cell,
            Value::Module(_) => ValueKind::Module,
            Value::BoundMethod(_) => ValueKind::BoundMethod,
            Value::Property(_) => ValueKind::Property,
            Value::Stream(_) => ValueKind::Stream,
            Value::Logger(_) => ValueKind::Logger,
            Value::Lock(_) => ValueKind::Lock,
            Value::WeakSet(_) => ValueKind::WeakSet,
            Value::MappingView(_) => ValueKind::MappingView,
        }
    }

    /// Human-readable type name
    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
            ValueKind::EmptySentinel => "empty-cell sentinel",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
            ValueKind::Unit => "unit",
            ValueKind::Function => "function",
            ValueKind::Native => "native function",
            ValueKind::Class => "class",
            ValueKind::Instance => "instance",
            ValueKind::Cell => "cell",
            ValueKind::Module => "module",
            ValueKind::BoundMethod => "bound method",
            ValueKind::Property => "property",
            ValueKind::Stream => "stream",
            ValueKind::Logger => "logger",
            ValueKind::Lock => "lock",
            ValueKind::WeakSet => "weak set",
            ValueKind::MappingView => "mapping view",
        }
    }

    /// Identity of the underlying heap object, if the value has one
    ///
    /// Atoms (null, bool, int, float) and strings have no identity: they are
    /// encoded inline and compared structurally. Unit ids and object ids come
    /// from separate counters, so identity must always be paired with
    /// [`Value::kind`] when used as a table key.
    pub fn identity(&self) -> Option<u64> {
        match self {
            Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Bytes(_)
            | Value::EmptySentinel => None,
            Value::List(o) => Some(o.object_id),
            Value::Dict(o) => Some(o.object_id),
            Value::Unit(u) => Some(u.unit_id),
            Value::Function(o) => Some(o.object_id),
            Value::Native(o) => Some(o.object_id),
            Value::Class(o) => Some(o.object_id),
            Value::Instance(o) => Some(o.object_id),
            Value::Cell(o) => Some(o.object_id),
            Value::Module(o) => Some(o.object_id),
            Value::BoundMethod(o) => Some(o.object_id),
            Value::Property(o) => Some(o.object_id),
            Value::Stream(o) => Some(o.object_id),
            Value::Logger(o) => Some(o.object_id),
            Value::Lock(o) => Some(o.object_id),
            Value::WeakSet(o) => Some(o.object_id),
            Value::MappingView(o) => Some(o.object_id),
        }
    }

    /// Identity comparison
    ///
    /// Heap objects compare by object identity; atoms and strings compare
    /// structurally. This is the comparison the reference resolver uses when
    /// scanning modules for an owning binding.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::EmptySentinel, Value::EmptySentinel) => true,
            _ => {
                self.kind() == other.kind()
                    && match (self.identity(), other.identity()) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    }
            }
        }
    }

    /// True for null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Extract an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_identity_is_structural() {
        assert!(Value::Int(42).is(&Value::Int(42)));
        assert!(!Value::Int(42).is(&Value::Int(43)));
        assert!(Value::str("a").is(&Value::str("a")));
        assert!(Value::Null.is(&Value::Null));
        assert!(!Value::Null.is(&Value::Bool(false)));
    }

    #[test]
    fn test_heap_identity_is_referential() {
        let list = Value::list(vec![Value::Int(1)]);
        let same = list.clone();
        let other = Value::list(vec![Value::Int(1)]);
        assert!(list.is(&same));
        assert!(!list.is(&other));
    }

    #[test]
    fn test_object_ids_unique() {
        let a = Value::list(vec![]);
        let b = Value::list(vec![]);
        assert_ne!(a.identity(), b.identity());
    }
}
