//! Heap object model
//!
//! Functions, closure cells, containers, and the small catalog of
//! runtime-internal object types the serialization engine has hand-written
//! strategies for (streams, loggers, locks, descriptors, weak sets, mapping
//! views).

use crate::module::Namespace;
use crate::value::{next_object_id, Value};
use crate::RuntimeError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};

use crate::class::Instance;
use ferry_bytecode::CodeUnit;

/// Closure capture cell
///
/// An ownership-shared mutable container binding one captured variable
/// between a nested function and its enclosing scope. Every function closing
/// over the same variable holds the same cell. An empty cell (`None`) is a
/// distinct observable state: a captured variable that has not been assigned
/// yet.
#[derive(Debug)]
pub struct CaptureCell {
    /// Unique object ID
    pub object_id: u64,
    slot: Mutex<Option<Value>>,
}

impl CaptureCell {
    /// Create an empty cell
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            slot: Mutex::new(None),
        })
    }

    /// Create a cell holding a value
    pub fn with_value(value: Value) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            slot: Mutex::new(Some(value)),
        })
    }

    /// Current contents, if any
    pub fn get(&self) -> Option<Value> {
        self.slot.lock().clone()
    }

    /// Replace the contents
    pub fn set(&self, value: Value) {
        *self.slot.lock() = Some(value);
    }

    /// Empty the cell
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    /// True when the cell holds no value
    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Bytecode-backed function object
///
/// The compiled unit is immutable; everything else is the function's
/// execution context. `globals` and `cells` are deliberately not part of the
/// ordinary attribute surface; they are replaced wholesale on state
/// restore, never assigned through `props`.
#[derive(Debug)]
pub struct Function {
    /// Unique object ID
    pub object_id: u64,
    /// Compiled body
    pub unit: Arc<CodeUnit>,
    /// Function name
    pub name: String,
    /// Dotted qualified name within the defining module
    pub qualname: String,
    /// Name of the defining module, if any
    pub module: Option<String>,
    /// Shared global namespace the function executes against
    pub globals: Arc<Namespace>,
    /// Ordered closure cells, one per free name of the unit
    cells: Mutex<Vec<Arc<CaptureCell>>>,
    /// Open instance-attribute map
    props: Mutex<Vec<(String, Value)>>,
}

impl Function {
    /// Create a function over a unit, executing against `globals`
    pub fn new(unit: Arc<CodeUnit>, globals: Arc<Namespace>, module: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            name: unit.name.clone(),
            qualname: unit.qualname.clone(),
            unit,
            module,
            globals,
            cells: Mutex::new(Vec::new()),
            props: Mutex::new(Vec::new()),
        })
    }

    /// Create an empty shell: correct unit and names, fresh empty namespace,
    /// no cells. Used by the reconstruction path, which fills the execution
    /// context separately.
    pub fn shell(
        unit: Arc<CodeUnit>,
        name: String,
        qualname: String,
        module: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            unit,
            name,
            qualname,
            module,
            globals: Namespace::new(),
            cells: Mutex::new(Vec::new()),
            props: Mutex::new(Vec::new()),
        })
    }

    /// Snapshot of the ordered closure-cell list
    pub fn cells(&self) -> Vec<Arc<CaptureCell>> {
        self.cells.lock().clone()
    }

    /// Replace the closure-cell list wholesale
    pub fn set_cells(&self, cells: Vec<Arc<CaptureCell>>) {
        *self.cells.lock() = cells;
    }

    /// Get an attribute
    pub fn get_prop(&self, name: &str) -> Option<Value> {
        self.props
            .lock()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    /// Set an attribute
    pub fn set_prop(&self, name: &str, value: Value) {
        let mut props = self.props.lock();
        if let Some(entry) = props.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value;
        } else {
            props.push((name.to_string(), value));
        }
    }

    /// Snapshot of all attributes in insertion order
    pub fn props(&self) -> Vec<(String, Value)> {
        self.props.lock().clone()
    }
}

/// (receiver, method) pair produced by attribute lookup on an instance
#[derive(Debug)]
pub struct BoundMethod {
    /// Unique object ID
    pub object_id: u64,
    /// The instance or class the method was looked up on
    pub receiver: Value,
    /// Attribute name the method was found under
    pub name: String,
    /// The resolved function
    pub func: Arc<Function>,
}

impl BoundMethod {
    /// Bind `func` to `receiver` under `name`
    pub fn new(receiver: Value, name: impl Into<String>, func: Arc<Function>) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            receiver,
            name: name.into(),
            func,
        })
    }
}

/// Getter/setter descriptor
#[derive(Debug)]
pub struct Property {
    /// Unique object ID
    pub object_id: u64,
    /// Getter function value, if any
    pub getter: Option<Value>,
    /// Setter function value, if any
    pub setter: Option<Value>,
}

impl Property {
    /// Create a property descriptor
    pub fn new(getter: Option<Value>, setter: Option<Value>) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            getter,
            setter,
        })
    }
}

/// Mutable list
#[derive(Debug)]
pub struct ListObject {
    /// Unique object ID
    pub object_id: u64,
    elements: Mutex<Vec<Value>>,
}

impl ListObject {
    /// Create a list from elements
    pub fn new(elements: Vec<Value>) -> Self {
        Self {
            object_id: next_object_id(),
            elements: Mutex::new(elements),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.elements.lock().is_empty()
    }

    /// Element at index
    pub fn get(&self, index: usize) -> Option<Value> {
        self.elements.lock().get(index).cloned()
    }

    /// Append an element
    pub fn push(&self, value: Value) {
        self.elements.lock().push(value);
    }

    /// Snapshot of the elements
    pub fn snapshot(&self) -> Vec<Value> {
        self.elements.lock().clone()
    }
}

/// Mutable string-keyed mapping, insertion-ordered
///
/// Insertion order is preserved so encoding the same dict twice produces the
/// same byte stream.
#[derive(Debug)]
pub struct DictObject {
    /// Unique object ID
    pub object_id: u64,
    entries: Mutex<Vec<(String, Value)>>,
}

impl DictObject {
    /// Create an empty dict
    pub fn new() -> Self {
        Self {
            object_id: next_object_id(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Create a dict from ordered entries
    pub fn from_entries(entries: Vec<(String, Value)>) -> Self {
        Self {
            object_id: next_object_id(),
            entries: Mutex::new(entries),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Value under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Insert or replace, preserving the original position on replace
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            entries.push((key, value));
        }
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|(k, _)| k == key)?;
        Some(entries.remove(pos).1)
    }

    /// Snapshot of entries in insertion order
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.entries.lock().clone()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(k, _)| k.clone()).collect()
    }
}

impl Default for DictObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Opened for reading
    Read,
    /// Opened for writing
    Write,
}

/// In-memory text stream
///
/// Read-mode streams can be serialized by their remaining content;
/// write-mode streams are refused by policy.
#[derive(Debug)]
pub struct TextStream {
    /// Unique object ID
    pub object_id: u64,
    /// Stream direction
    pub mode: StreamMode,
    buffer: Mutex<String>,
    cursor: Mutex<usize>,
    closed: Mutex<bool>,
}

impl TextStream {
    /// Open a read-mode stream over `content`
    pub fn open_read(content: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            mode: StreamMode::Read,
            buffer: Mutex::new(content.into()),
            cursor: Mutex::new(0),
            closed: Mutex::new(false),
        })
    }

    /// Open an empty write-mode stream
    pub fn open_write() -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            mode: StreamMode::Write,
            buffer: Mutex::new(String::new()),
            cursor: Mutex::new(0),
            closed: Mutex::new(false),
        })
    }

    /// Read everything from the cursor to the end, advancing the cursor
    pub fn read_to_end(&self) -> Result<String, RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::ClosedStream);
        }
        let buffer = self.buffer.lock();
        let mut cursor = self.cursor.lock();
        let out = buffer[*cursor..].to_string();
        *cursor = buffer.len();
        Ok(out)
    }

    /// Remaining content without advancing the cursor
    pub fn peek_remaining(&self) -> Result<String, RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::ClosedStream);
        }
        let buffer = self.buffer.lock();
        let cursor = self.cursor.lock();
        Ok(buffer[*cursor..].to_string())
    }

    /// Append to a write-mode stream
    pub fn write(&self, text: &str) -> Result<(), RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::ClosedStream);
        }
        if self.mode != StreamMode::Write {
            return Err(RuntimeError::TypeMismatch {
                expected: "write-mode stream",
                got: "read-mode stream",
            });
        }
        self.buffer.lock().push_str(text);
        Ok(())
    }

    /// Close the stream
    pub fn close(&self) {
        *self.closed.lock() = true;
    }

    /// True once closed
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

/// Process-wide logger table; one handle per name.
static LOGGER_TABLE: Lazy<Mutex<FxHashMap<String, Arc<LoggerHandle>>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

/// Named diagnostic-channel singleton
///
/// `LoggerHandle::get` returns the same handle for the same name for the
/// process lifetime, which is the property serialization relies on:
/// reconstructing a logger by name yields the destination's singleton.
#[derive(Debug)]
pub struct LoggerHandle {
    /// Unique object ID
    pub object_id: u64,
    /// Channel name
    pub name: String,
}

impl LoggerHandle {
    /// Get or create the singleton handle for `name`
    pub fn get(name: &str) -> Arc<Self> {
        let mut table = LOGGER_TABLE.lock();
        if let Some(handle) = table.get(name) {
            return Arc::clone(handle);
        }
        let handle = Arc::new(Self {
            object_id: next_object_id(),
            name: name.to_string(),
        });
        table.insert(name.to_string(), Arc::clone(&handle));
        handle
    }

    /// Emit an info-level message on this channel
    pub fn info(&self, message: &str) {
        log::info!(target: "ferry::channel", "[{}] {}", self.name, message);
    }

    /// Emit a debug-level message on this channel
    pub fn debug(&self, message: &str) {
        log::debug!(target: "ferry::channel", "[{}] {}", self.name, message);
    }
}

/// Synchronization primitive
///
/// Lock state is process-local; serialization always reconstructs a fresh
/// unlocked lock.
#[derive(Debug)]
pub struct LockObject {
    /// Unique object ID
    pub object_id: u64,
    locked: Mutex<bool>,
}

impl LockObject {
    /// Create an unlocked lock
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            locked: Mutex::new(false),
        })
    }

    /// Try to take the lock; false if already held
    pub fn try_acquire(&self) -> bool {
        let mut locked = self.locked.lock();
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    /// Release the lock
    pub fn release(&self) {
        *self.locked.lock() = false;
    }

    /// True while held
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

/// Weak container over instances
///
/// Members do not keep their instances alive; dead entries are purged on
/// access. Serialization captures the members still live at encode time.
#[derive(Debug)]
pub struct WeakSetObject {
    /// Unique object ID
    pub object_id: u64,
    items: Mutex<Vec<Weak<Instance>>>,
}

impl WeakSetObject {
    /// Create an empty weak set
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            items: Mutex::new(Vec::new()),
        })
    }

    /// Add an instance
    pub fn add(&self, instance: &Arc<Instance>) {
        let mut items = self.items.lock();
        if items
            .iter()
            .any(|w| w.upgrade().is_some_and(|i| i.object_id == instance.object_id))
        {
            return;
        }
        items.push(Arc::downgrade(instance));
    }

    /// Live members, purging dead entries
    pub fn live(&self) -> Vec<Arc<Instance>> {
        let mut items = self.items.lock();
        items.retain(|w| w.upgrade().is_some());
        items.iter().filter_map(|w| w.upgrade()).collect()
    }
}

/// Which projection of a dict a view exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Key view
    Keys,
    /// Value view
    Values,
    /// (key, value) pair view
    Items,
}

/// Live view over a dict
#[derive(Debug)]
pub struct MappingView {
    /// Unique object ID
    pub object_id: u64,
    /// The dict being viewed
    pub target: Arc<DictObject>,
    /// Projection
    pub kind: ViewKind,
}

impl MappingView {
    /// Create a view over `target`
    pub fn new(target: Arc<DictObject>, kind: ViewKind) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            target,
            kind,
        })
    }

    /// Materialize the view's current contents
    pub fn materialize(&self) -> Vec<Value> {
        let entries = self.target.snapshot();
        match self.kind {
            ViewKind::Keys => entries.into_iter().map(|(k, _)| Value::str(k)).collect(),
            ViewKind::Values => entries.into_iter().map(|(_, v)| v).collect(),
            ViewKind::Items => entries
                .into_iter()
                .map(|(k, v)| Value::list(vec![Value::str(k), v]))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassKind, ClassObject};

    #[test]
    fn test_cell_states() {
        let cell = CaptureCell::empty();
        assert!(cell.is_empty());
        cell.set(Value::Int(5));
        assert!(!cell.is_empty());
        assert_eq!(cell.get().unwrap().as_int(), Some(5));
        cell.clear();
        assert!(cell.is_empty());
    }

    #[test]
    fn test_cell_sharing() {
        let cell = CaptureCell::with_value(Value::Int(1));
        let alias = Arc::clone(&cell);
        alias.set(Value::Int(2));
        assert_eq!(cell.get().unwrap().as_int(), Some(2));
    }

    #[test]
    fn test_dict_insertion_order() {
        let dict = DictObject::new();
        dict.insert("b", Value::Int(2));
        dict.insert("a", Value::Int(1));
        dict.insert("b", Value::Int(3)); // replace keeps position
        assert_eq!(dict.keys(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(dict.get("b").unwrap().as_int(), Some(3));
    }

    #[test]
    fn test_read_stream() {
        let stream = TextStream::open_read("abc");
        assert_eq!(stream.peek_remaining().unwrap(), "abc");
        assert_eq!(stream.read_to_end().unwrap(), "abc");
        assert_eq!(stream.read_to_end().unwrap(), "");
    }

    #[test]
    fn test_closed_stream() {
        let stream = TextStream::open_read("abc");
        stream.close();
        assert!(matches!(
            stream.read_to_end(),
            Err(RuntimeError::ClosedStream)
        ));
    }

    #[test]
    fn test_write_stream_rejects_reads_direction() {
        let stream = TextStream::open_read("abc");
        assert!(stream.write("x").is_err());
        let out = TextStream::open_write();
        out.write("x").unwrap();
    }

    #[test]
    fn test_logger_singleton() {
        let a = LoggerHandle::get("worker.io");
        let b = LoggerHandle::get("worker.io");
        let c = LoggerHandle::get("worker.net");
        assert_eq!(a.object_id, b.object_id);
        assert_ne!(a.object_id, c.object_id);
    }

    #[test]
    fn test_lock() {
        let lock = LockObject::new();
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(lock.try_acquire());
    }

    #[test]
    fn test_weak_set_drops_dead_members() {
        let class = ClassObject::new(ClassKind::Plain, "C", "C", None, vec![]);
        let set = WeakSetObject::new();
        let keep = Instance::new(&class);
        set.add(&keep);
        {
            let transient = Instance::new(&class);
            set.add(&transient);
            assert_eq!(set.live().len(), 2);
        }
        assert_eq!(set.live().len(), 1);
    }

    #[test]
    fn test_mapping_view_is_live() {
        let dict = Arc::new(DictObject::new());
        dict.insert("a", Value::Int(1));
        let view = MappingView::new(Arc::clone(&dict), ViewKind::Keys);
        assert_eq!(view.materialize().len(), 1);
        dict.insert("b", Value::Int(2));
        assert_eq!(view.materialize().len(), 2);
    }
}
