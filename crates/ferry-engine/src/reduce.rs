//! Dispatch override layer
//!
//! Every outgoing object passes [`reducer_override`] before any per-type
//! table lookup: type objects route through the resolver and the identity
//! tracker, function objects through the resolver and the state capsule.
//! Everything else falls to the [`StrategyTable`]: hand-written reductions
//! for a fixed catalog of runtime-internal types. The table activates only
//! when the override declines, preserving the backend's built-in handling of
//! ordinary data.

use crate::capsule;
use crate::error::EncodeError;
use crate::resolver::Resolution;
use crate::skeleton::extract_class_members;
use crate::Engine;
use ferry_bytecode::Constant;
use ferry_runtime::module::ENTRY_MODULE;
use ferry_runtime::{ClassKind, ClassObject, Function, StreamMode, Value, ValueKind, ViewKind};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Constructor tag of a rebuild frame; the decoder's closed vocabulary
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctor {
    /// Body-less dynamic class shell
    SkeletonClass = 0x01,
    /// Member-bearing enum shell
    SkeletonEnum = 0x02,
    /// Empty function shell
    FunctionShell = 0x03,
    /// Native function by registry key
    NativeFunction = 0x04,
    /// Compiled unit from its tables
    CodeUnit = 0x05,
    /// Fresh empty capture cell
    NewCell = 0x06,
    /// Read-mode stream from its remaining content
    ReadStream = 0x07,
    /// Logger singleton by name
    GetLogger = 0x08,
    /// Fresh unlocked lock
    NewLock = 0x09,
    /// Attribute lookup on a reconstructed receiver
    GetAttr = 0x0A,
    /// Getter/setter descriptor
    Property = 0x0B,
    /// View over a reconstructed dict
    MappingView = 0x0C,
    /// Weak set from its live members
    WeakSet = 0x0D,
    /// By-value module from its name
    Module = 0x0E,
}

impl Ctor {
    /// Byte representation
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a byte, if valid
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::SkeletonClass),
            0x02 => Some(Self::SkeletonEnum),
            0x03 => Some(Self::FunctionShell),
            0x04 => Some(Self::NativeFunction),
            0x05 => Some(Self::CodeUnit),
            0x06 => Some(Self::NewCell),
            0x07 => Some(Self::ReadStream),
            0x08 => Some(Self::GetLogger),
            0x09 => Some(Self::NewLock),
            0x0A => Some(Self::GetAttr),
            0x0B => Some(Self::Property),
            0x0C => Some(Self::MappingView),
            0x0D => Some(Self::WeakSet),
            0x0E => Some(Self::Module),
            _ => None,
        }
    }

    /// Constructor name, for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Self::SkeletonClass => "skeleton-class",
            Self::SkeletonEnum => "skeleton-enum",
            Self::FunctionShell => "function-shell",
            Self::NativeFunction => "native-function",
            Self::CodeUnit => "code-unit",
            Self::NewCell => "new-cell",
            Self::ReadStream => "read-stream",
            Self::GetLogger => "get-logger",
            Self::NewLock => "new-lock",
            Self::GetAttr => "get-attr",
            Self::Property => "property",
            Self::MappingView => "mapping-view",
            Self::WeakSet => "weak-set",
            Self::Module => "module",
        }
    }
}

/// Restore-procedure tag of a rebuild frame
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restore {
    /// Apply a function capsule's state to a shell
    FunctionState = 0x01,
    /// Fill a class skeleton's body
    ClassBody = 0x02,
    /// Set (or leave empty) a cell's contents
    CellContents = 0x03,
    /// Update a by-value module's namespace
    ModuleNamespace = 0x04,
}

impl Restore {
    /// Byte representation
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a byte, if valid
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::FunctionState),
            0x02 => Some(Self::ClassBody),
            0x03 => Some(Self::CellContents),
            0x04 => Some(Self::ModuleNamespace),
            _ => None,
        }
    }
}

/// A reduction: how one object crosses the wire
///
/// This pair (constructor plus arguments, optionally followed by state and
/// a restore procedure) is the sole protocol boundary between strategies
/// and the backend. The backend records it on encode and, on decode, invokes
/// the constructor and then the restore procedure.
#[derive(Debug)]
pub enum Reduce {
    /// Reference encoding: a lookup path the destination must resolve
    ByName {
        /// Owning module
        module: String,
        /// Dotted path inside the module; empty for the module object itself
        qualname: String,
    },
    /// Value encoding: constructor arguments plus optional two-phase state
    Rebuild {
        /// Constructor tag
        ctor: Ctor,
        /// Constructor arguments (arbitrary values, encoded recursively)
        args: Vec<Value>,
        /// State applied after the object is memoized, with its restore
        /// procedure
        state: Option<(Value, Restore)>,
    },
}

/// A hand-written reduction strategy
pub type ReduceFn = fn(&Engine, &Value) -> Result<Reduce, EncodeError>;

/// Per-type registry of reduction strategies
#[derive(Debug)]
pub struct StrategyTable {
    entries: FxHashMap<ValueKind, ReduceFn>,
}

impl StrategyTable {
    /// An empty table: every non-ordinary object becomes unsupported
    pub fn empty() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// The built-in catalog of runtime-internal types
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        table.register(ValueKind::Cell, cell_reduce);
        table.register(ValueKind::Unit, unit_reduce);
        table.register(ValueKind::Module, module_reduce);
        table.register(ValueKind::Native, native_reduce);
        table.register(ValueKind::Stream, stream_reduce);
        table.register(ValueKind::Logger, logger_reduce);
        table.register(ValueKind::Lock, lock_reduce);
        table.register(ValueKind::BoundMethod, bound_method_reduce);
        table.register(ValueKind::Property, property_reduce);
        table.register(ValueKind::WeakSet, weakset_reduce);
        table.register(ValueKind::MappingView, mapping_view_reduce);
        table
    }

    /// Register or replace the strategy for a kind
    pub fn register(&mut self, kind: ValueKind, strategy: ReduceFn) {
        self.entries.insert(kind, strategy);
    }

    /// Strategy for a kind, if one is registered
    pub fn get(&self, kind: ValueKind) -> Option<ReduceFn> {
        self.entries.get(&kind).copied()
    }
}

/// Type-agnostic reduction hook, consulted before the strategy table
///
/// Dispatches on capability, not exact type: any class object, whatever its
/// flavor within the closed {plain, enum, singleton} tag set, routes
/// through class reduction, and any bytecode-backed function through
/// function reduction. Returns `None` to decline, handing the object to the
/// per-type table.
pub fn reducer_override(engine: &Engine, value: &Value) -> Option<Result<Reduce, EncodeError>> {
    match value {
        Value::Class(class) => Some(class_reduce(engine, class, value)),
        Value::Function(func) => Some(function_reduce(engine, func, value)),
        _ => None,
    }
}

fn class_reduce(
    engine: &Engine,
    class: &Arc<ClassObject>,
    value: &Value,
) -> Result<Reduce, EncodeError> {
    let decision = engine.resolver().decide(value, None);

    if class.kind == ClassKind::Singleton {
        return match decision {
            Resolution::Reference { module, qualname } => Ok(Reduce::ByName { module, qualname }),
            Resolution::Value => Err(EncodeError::UnresolvableSingleton(class.qualname.clone())),
        };
    }

    match decision {
        Resolution::Reference { module, qualname } => Ok(Reduce::ByName { module, qualname }),
        Resolution::Value => dynamic_class_reduce(engine, class),
    }
}

/// Save a class that can't be referenced as a module attribute
fn dynamic_class_reduce(engine: &Engine, class: &Arc<ClassObject>) -> Result<Reduce, EncodeError> {
    let tracking_id = engine.tracker.id_for(class);
    let module_arg = match &class.module {
        Some(module) => Value::str(module),
        None => Value::Null,
    };
    let bases = Value::list(
        class
            .bases
            .iter()
            .map(|base| Value::Class(Arc::clone(base)))
            .collect(),
    );
    let body = pairs_value(extract_class_members(class));

    if class.is_enum() {
        let members: Vec<Value> = class
            .enum_members()
            .into_iter()
            .map(|(name, member)| {
                let raw = match &member {
                    Value::Instance(instance) => {
                        instance.get_field("value").unwrap_or(Value::Null)
                    }
                    other => other.clone(),
                };
                Value::list(vec![Value::str(name), raw])
            })
            .collect();
        return Ok(Reduce::Rebuild {
            ctor: Ctor::SkeletonEnum,
            args: vec![
                Value::str(&class.name),
                Value::str(&class.qualname),
                module_arg,
                bases,
                Value::list(members),
                Value::bytes(tracking_id.as_bytes()),
            ],
            state: Some((body, Restore::ClassBody)),
        });
    }

    Ok(Reduce::Rebuild {
        ctor: Ctor::SkeletonClass,
        args: vec![
            Value::str(&class.name),
            Value::str(&class.qualname),
            module_arg,
            bases,
            Value::bytes(tracking_id.as_bytes()),
        ],
        state: Some((body, Restore::ClassBody)),
    })
}

fn function_reduce(
    engine: &Engine,
    func: &Arc<Function>,
    value: &Value,
) -> Result<Reduce, EncodeError> {
    // Entry-context functions are always dynamic; no point scanning.
    if func.module.as_deref() == Some(ENTRY_MODULE) {
        return dynamic_function_reduce(engine, func);
    }
    match engine.resolver().decide(value, None) {
        Resolution::Reference { module, qualname } => Ok(Reduce::ByName { module, qualname }),
        Resolution::Value => dynamic_function_reduce(engine, func),
    }
}

/// Reduce a function that is not reachable via attribute lookup
fn dynamic_function_reduce(engine: &Engine, func: &Arc<Function>) -> Result<Reduce, EncodeError> {
    if func.unit.is_coroutine() {
        return Err(EncodeError::RefusedCoroutine(func.qualname.clone()));
    }

    let state = capsule::capture(func, &engine.globals_cache, &engine.registry);
    let state_value = Value::list(vec![
        pairs_value(state.props),
        pairs_value(state.globals),
        Value::list(state.cells.into_iter().map(Value::Cell).collect()),
        Value::list(state.submodules.into_iter().map(Value::Module).collect()),
    ]);

    Ok(Reduce::Rebuild {
        ctor: Ctor::FunctionShell,
        args: vec![
            Value::Unit(Arc::clone(&func.unit)),
            Value::str(&func.name),
            Value::str(&func.qualname),
            match &func.module {
                Some(module) => Value::str(module),
                None => Value::Null,
            },
        ],
        state: Some((state_value, Restore::FunctionState)),
    })
}

// ===== Per-type strategies (the fixed runtime-internal catalog) =====

fn cell_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::Cell(cell) = value else {
        unreachable!()
    };
    // An empty cell is carried as the distinguished sentinel, never omitted:
    // the destination must distinguish "cell holding null" from "empty".
    let contents = cell.get().unwrap_or(Value::EmptySentinel);
    Ok(Reduce::Rebuild {
        ctor: Ctor::NewCell,
        args: vec![],
        state: Some((contents, Restore::CellContents)),
    })
}

fn unit_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::Unit(unit) = value else {
        unreachable!()
    };
    let constants: Vec<Value> = unit
        .constants
        .iter()
        .map(|constant| match constant {
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(f) => Value::Float(*f),
            Constant::Str(s) => Value::str(s),
            Constant::Unit(nested) => Value::Unit(Arc::clone(nested)),
        })
        .collect();
    Ok(Reduce::Rebuild {
        ctor: Ctor::CodeUnit,
        args: vec![
            Value::str(&unit.name),
            Value::str(&unit.qualname),
            Value::Int(unit.param_count as i64),
            Value::Int(unit.local_count as i64),
            Value::Int(unit.flags as i64),
            Value::list(unit.names.iter().map(Value::str).collect()),
            Value::list(unit.free_names.iter().map(Value::str).collect()),
            Value::list(constants),
            Value::bytes(&unit.code),
        ],
        state: None,
    })
}

fn module_reduce(engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::Module(module) = value else {
        unreachable!()
    };
    let by_value = module.is_entry
        || module.origin == ferry_runtime::ModuleOrigin::Synthetic
        || engine.resolver().policy().contains(&module.name)
        || !engine.registry.contains(&module.name);
    if !by_value {
        return Ok(Reduce::ByName {
            module: module.name.clone(),
            qualname: String::new(),
        });
    }
    Ok(Reduce::Rebuild {
        ctor: Ctor::Module,
        args: vec![Value::str(&module.name)],
        state: Some((pairs_value(module.namespace.snapshot()), Restore::ModuleNamespace)),
    })
}

fn native_reduce(engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::Native(native) = value else {
        unreachable!()
    };
    // Narrow capsule path: only the identifying registry key crosses the
    // wire; natives have no closures or globals to capture.
    match engine.resolver().decide(value, None) {
        Resolution::Reference { module, qualname } => Ok(Reduce::ByName { module, qualname }),
        Resolution::Value => Ok(Reduce::Rebuild {
            ctor: Ctor::NativeFunction,
            args: vec![Value::str(&native.module), Value::str(&native.name)],
            state: None,
        }),
    }
}

fn stream_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::Stream(stream) = value else {
        unreachable!()
    };
    if stream.is_closed() {
        return Err(EncodeError::ClosedStream);
    }
    if stream.mode == StreamMode::Write {
        return Err(EncodeError::RefusedWriteStream);
    }
    let content = stream
        .peek_remaining()
        .map_err(|_| EncodeError::ClosedStream)?;
    Ok(Reduce::Rebuild {
        ctor: Ctor::ReadStream,
        args: vec![Value::str(content)],
        state: None,
    })
}

fn logger_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::Logger(logger) = value else {
        unreachable!()
    };
    Ok(Reduce::Rebuild {
        ctor: Ctor::GetLogger,
        args: vec![Value::str(&logger.name)],
        state: None,
    })
}

fn lock_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    // Held/unheld is process-local state; the destination gets a fresh lock.
    Ok(Reduce::Rebuild {
        ctor: Ctor::NewLock,
        args: vec![],
        state: None,
    })
}

fn bound_method_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::BoundMethod(method) = value else {
        unreachable!()
    };
    // Captured as "attribute lookup on the receiver": rebinding at the
    // destination picks up the reconstructed class's method.
    Ok(Reduce::Rebuild {
        ctor: Ctor::GetAttr,
        args: vec![method.receiver.clone(), Value::str(&method.name)],
        state: None,
    })
}

fn property_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::Property(property) = value else {
        unreachable!()
    };
    Ok(Reduce::Rebuild {
        ctor: Ctor::Property,
        args: vec![
            property.getter.clone().unwrap_or(Value::Null),
            property.setter.clone().unwrap_or(Value::Null),
        ],
        state: None,
    })
}

fn weakset_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::WeakSet(set) = value else {
        unreachable!()
    };
    Ok(Reduce::Rebuild {
        ctor: Ctor::WeakSet,
        args: vec![Value::list(
            set.live().into_iter().map(Value::Instance).collect(),
        )],
        state: None,
    })
}

fn mapping_view_reduce(_engine: &Engine, value: &Value) -> Result<Reduce, EncodeError> {
    let Value::MappingView(view) = value else {
        unreachable!()
    };
    let kind = match view.kind {
        ViewKind::Keys => 0,
        ViewKind::Values => 1,
        ViewKind::Items => 2,
    };
    Ok(Reduce::Rebuild {
        ctor: Ctor::MappingView,
        args: vec![Value::Dict(Arc::clone(&view.target)), Value::Int(kind)],
        state: None,
    })
}

/// Enum members encode as attribute lookup on their (tracked) class
pub(crate) fn enum_member_reduce(value: &Value) -> Option<Reduce> {
    let Value::Instance(instance) = value else {
        return None;
    };
    if !instance.class.is_enum() {
        return None;
    }
    let name = instance.get_field("name")?.as_str()?.to_string();
    let registered = instance.class.get_own_member(&name)?;
    if !registered.is(value) {
        return None;
    }
    Some(Reduce::Rebuild {
        ctor: Ctor::GetAttr,
        args: vec![Value::Class(Arc::clone(&instance.class)), Value::str(name)],
        state: None,
    })
}

/// Pack ordered (name, value) pairs as a list of two-element lists
pub(crate) fn pairs_value(pairs: Vec<(String, Value)>) -> Value {
    Value::list(
        pairs
            .into_iter()
            .map(|(name, value)| Value::list(vec![Value::str(name), value]))
            .collect(),
    )
}
