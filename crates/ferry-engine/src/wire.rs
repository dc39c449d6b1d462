//! Wire backend
//!
//! The generic object encoder the reduction strategies plug into. Ordinary
//! data (atoms, strings, lists, dicts, instances) is encoded directly;
//! everything else is routed through the dispatch override layer and the
//! strategy table, and lands on the wire as a rebuild or by-name frame.
//!
//! Every heap object is memoized by identity: its first occurrence carries a
//! memo-slot frame, later occurrences a slot reference, so shared objects
//! decode shared and cycles terminate. Rebuild frames memoize the shell
//! *between* constructor arguments and state, which is what makes
//! self-referential closures and method-closes-over-class cycles decodable.
//!
//! Payload framing follows the runtime's module format: magic, version, and
//! a crc32 checksum over the payload.

use crate::capsule;
use crate::error::{DecodeError, EncodeError};
use crate::reduce::{self, Ctor, Reduce, Restore};
use crate::skeleton::{self, ClassShape};
use crate::tracker::TrackingId;
use crate::{DecodeContext, Engine};
use ferry_bytecode::{BytecodeReader, BytecodeWriter, Constant, UnitBuilder};
use ferry_runtime::interp::load_attr;
use ferry_runtime::{
    CaptureCell, ClassKind, ClassObject, DictObject, Instance, ListObject, LockObject,
    LoggerHandle, MappingView, TextStream, Value, ValueKind, ViewKind, WeakSetObject,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Magic number for Ferry capsule payloads
pub const MAGIC: [u8; 4] = *b"FRYC";

/// Current payload format version
pub const VERSION: u32 = 1;

/// Wire tags
pub(crate) mod tag {
    pub const NULL: u8 = 0x00;
    pub const TRUE: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const INT: u8 = 0x03;
    pub const FLOAT: u8 = 0x04;
    pub const STR: u8 = 0x05;
    pub const BYTES: u8 = 0x06;
    pub const EMPTY_SENTINEL: u8 = 0x07;
    pub const LIST: u8 = 0x10;
    pub const DICT: u8 = 0x11;
    pub const INSTANCE: u8 = 0x12;
    pub const MEMO_GET: u8 = 0x20;
    pub const MEMO_PUT: u8 = 0x21;
    pub const REBUILD: u8 = 0x30;
    pub const BY_NAME: u8 = 0x31;
}

/// Encode a value graph into a transmittable payload
pub fn encode(engine: &Engine, value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut writer = BytecodeWriter::new();
    writer.emit_raw(&MAGIC);
    writer.emit_u32(VERSION);
    let checksum_offset = writer.offset();
    writer.emit_u32(0);

    let mut session = EncodeSession {
        engine,
        writer,
        memo: FxHashMap::default(),
        next_memo: 0,
    };
    session.encode_value(value)?;

    let mut writer = session.writer;
    let payload_start = checksum_offset + 4;
    let checksum = crc32fast::hash(&writer.buffer()[payload_start..]);
    writer.patch_u32(checksum_offset, checksum);
    Ok(writer.into_bytes())
}

/// Reconstruct a value graph from a payload
pub fn decode(ctx: &DecodeContext, bytes: &[u8]) -> Result<Value, DecodeError> {
    let mut reader = BytecodeReader::new(bytes);
    let magic = reader.read_bytes(4)?;
    if magic != MAGIC {
        return Err(DecodeError::InvalidMagic);
    }
    let version = reader.read_u32()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let stored_checksum = reader.read_u32()?;
    let payload = &bytes[reader.position()..];
    let actual = crc32fast::hash(payload);
    if stored_checksum != actual {
        return Err(DecodeError::ChecksumMismatch {
            expected: stored_checksum,
            actual,
        });
    }

    let mut session = DecodeSession {
        ctx,
        reader,
        memo: Vec::new(),
    };
    let value = session.decode_value()?;
    let remaining = session.reader.remaining();
    if remaining != 0 {
        return Err(DecodeError::TrailingBytes(remaining));
    }
    Ok(value)
}

/// Per-call encode state: the writer and the identity memo
struct EncodeSession<'e> {
    engine: &'e Engine,
    writer: BytecodeWriter,
    memo: FxHashMap<(ValueKind, u64), u32>,
    next_memo: u32,
}

impl EncodeSession<'_> {
    /// Depth-first recursive walk; no I/O, no retries.
    fn encode_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        // Atoms encode inline every time.
        match value {
            Value::Null => {
                self.writer.emit_u8(tag::NULL);
                return Ok(());
            }
            Value::Bool(b) => {
                self.writer.emit_u8(if *b { tag::TRUE } else { tag::FALSE });
                return Ok(());
            }
            Value::Int(i) => {
                self.writer.emit_u8(tag::INT);
                self.writer.emit_i64(*i);
                return Ok(());
            }
            Value::Float(f) => {
                self.writer.emit_u8(tag::FLOAT);
                self.writer.emit_f64(*f);
                return Ok(());
            }
            Value::Str(s) => {
                self.writer.emit_u8(tag::STR);
                self.writer.emit_string(s);
                return Ok(());
            }
            Value::Bytes(b) => {
                self.writer.emit_u8(tag::BYTES);
                self.writer.emit_u32(b.len() as u32);
                self.writer.emit_raw(b);
                return Ok(());
            }
            Value::EmptySentinel => {
                self.writer.emit_u8(tag::EMPTY_SENTINEL);
                return Ok(());
            }
            _ => {}
        }

        let key = (value.kind(), value.identity().expect("heap value"));
        if let Some(id) = self.memo.get(&key) {
            self.writer.emit_u8(tag::MEMO_GET);
            self.writer.emit_u32(*id);
            return Ok(());
        }

        // Built-in handling of ordinary containers and instances.
        match value {
            Value::List(list) => {
                self.writer.emit_u8(tag::LIST);
                self.note_memo(key);
                let elements = list.snapshot();
                self.writer.emit_u32(elements.len() as u32);
                for element in &elements {
                    self.encode_value(element)?;
                }
                Ok(())
            }
            Value::Dict(dict) => {
                self.writer.emit_u8(tag::DICT);
                self.note_memo(key);
                let entries = dict.snapshot();
                self.writer.emit_u32(entries.len() as u32);
                for (name, entry) in &entries {
                    self.writer.emit_string(name);
                    self.encode_value(entry)?;
                }
                Ok(())
            }
            Value::Instance(instance) => {
                // Enum members are attribute lookups on their class, not
                // field dumps.
                if let Some(reduction) = reduce::enum_member_reduce(value) {
                    return self.emit_reduce(key, reduction);
                }
                self.writer.emit_u8(tag::INSTANCE);
                self.encode_value(&Value::Class(Arc::clone(&instance.class)))?;
                self.note_memo(key);
                let fields = instance.fields();
                self.writer.emit_u32(fields.len() as u32);
                for (name, field) in &fields {
                    self.writer.emit_string(name);
                    self.encode_value(field)?;
                }
                Ok(())
            }
            _ => {
                let reduction = match reduce::reducer_override(self.engine, value) {
                    Some(reduction) => reduction?,
                    None => match self.engine.strategies.get(value.kind()) {
                        Some(strategy) => strategy(self.engine, value)?,
                        None => {
                            return Err(EncodeError::Unsupported {
                                type_name: value.type_name(),
                                name: best_name(value),
                            })
                        }
                    },
                };
                self.emit_reduce(key, reduction)
            }
        }
    }

    /// Allocate the next memo slot for `key` and mark it in the stream
    fn note_memo(&mut self, key: (ValueKind, u64)) {
        let id = self.next_memo;
        self.next_memo += 1;
        self.memo.insert(key, id);
        self.writer.emit_u8(tag::MEMO_PUT);
        self.writer.emit_u32(id);
    }

    fn emit_reduce(&mut self, key: (ValueKind, u64), reduction: Reduce) -> Result<(), EncodeError> {
        match reduction {
            Reduce::ByName { module, qualname } => {
                self.writer.emit_u8(tag::BY_NAME);
                self.writer.emit_string(&module);
                self.writer.emit_string(&qualname);
                self.note_memo(key);
                Ok(())
            }
            Reduce::Rebuild { ctor, args, state } => {
                self.writer.emit_u8(tag::REBUILD);
                self.writer.emit_u8(ctor.to_u8());
                self.writer.emit_u32(args.len() as u32);
                for arg in &args {
                    self.encode_value(arg)?;
                }
                // Memoize between arguments and state: state may already
                // reference the object under construction.
                self.note_memo(key);
                match state {
                    None => self.writer.emit_u8(0),
                    Some((state_value, restore)) => {
                        self.writer.emit_u8(1);
                        self.writer.emit_u8(restore.to_u8());
                        self.encode_value(&state_value)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn best_name(value: &Value) -> String {
    match value {
        Value::Function(func) => func.qualname.clone(),
        Value::Class(class) => class.qualname.clone(),
        Value::Native(native) => native.name.clone(),
        Value::Module(module) => module.name.clone(),
        _ => "<anonymous>".to_string(),
    }
}

/// Per-call decode state: the reader and the memo table, scoped to this
/// destination process
struct DecodeSession<'c> {
    ctx: &'c DecodeContext,
    reader: BytecodeReader<'c>,
    memo: Vec<Value>,
}

impl DecodeSession<'_> {
    fn decode_value(&mut self) -> Result<Value, DecodeError> {
        let offset = self.reader.position();
        let tag_byte = self.reader.read_u8()?;
        match tag_byte {
            tag::NULL => Ok(Value::Null),
            tag::TRUE => Ok(Value::Bool(true)),
            tag::FALSE => Ok(Value::Bool(false)),
            tag::INT => Ok(Value::Int(self.reader.read_i64()?)),
            tag::FLOAT => Ok(Value::Float(self.reader.read_f64()?)),
            tag::STR => Ok(Value::str(self.reader.read_string()?)),
            tag::BYTES => {
                let len = self.reader.read_u32()? as usize;
                Ok(Value::bytes(self.reader.read_bytes(len)?))
            }
            tag::EMPTY_SENTINEL => Ok(Value::EmptySentinel),

            tag::LIST => {
                let list = Arc::new(ListObject::new(Vec::new()));
                let value = Value::List(Arc::clone(&list));
                self.expect_memo_put(value.clone())?;
                let count = self.reader.read_u32()?;
                for _ in 0..count {
                    list.push(self.decode_value()?);
                }
                Ok(value)
            }
            tag::DICT => {
                let dict = Arc::new(DictObject::new());
                let value = Value::Dict(Arc::clone(&dict));
                self.expect_memo_put(value.clone())?;
                let count = self.reader.read_u32()?;
                for _ in 0..count {
                    let name = self.reader.read_string()?;
                    dict.insert(name, self.decode_value()?);
                }
                Ok(value)
            }
            tag::INSTANCE => {
                let class_value = self.decode_value()?;
                let Value::Class(class) = &class_value else {
                    return Err(DecodeError::BadFrame {
                        ctor: "instance",
                        detail: "expected a class value",
                    });
                };
                let instance = Instance::new(class);
                let value = Value::Instance(Arc::clone(&instance));
                self.expect_memo_put(value.clone())?;
                let count = self.reader.read_u32()?;
                for _ in 0..count {
                    let name = self.reader.read_string()?;
                    instance.set_field(name, self.decode_value()?);
                }
                Ok(value)
            }

            tag::MEMO_GET => {
                let id = self.reader.read_u32()?;
                self.memo
                    .get(id as usize)
                    .cloned()
                    .ok_or(DecodeError::MemoMissing(id))
            }

            tag::REBUILD => {
                let ctor_byte = self.reader.read_u8()?;
                let ctor = Ctor::from_u8(ctor_byte)
                    .ok_or(DecodeError::UnknownConstructor(ctor_byte))?;
                let arg_count = self.reader.read_u32()?;
                let mut args = Vec::with_capacity(arg_count as usize);
                for _ in 0..arg_count {
                    args.push(self.decode_value()?);
                }
                let (value, apply_state) = self.construct(ctor, args)?;
                self.expect_memo_put(value.clone())?;
                let has_state = self.reader.read_u8()?;
                if has_state != 0 {
                    let restore_byte = self.reader.read_u8()?;
                    let restore = Restore::from_u8(restore_byte)
                        .ok_or(DecodeError::UnknownRestore(restore_byte))?;
                    let state = self.decode_value()?;
                    if apply_state {
                        apply_restore(restore, &value, state)?;
                    }
                }
                Ok(value)
            }

            tag::BY_NAME => {
                let module = self.reader.read_string()?;
                let qualname = self.reader.read_string()?;
                let value = if qualname.is_empty() {
                    self.ctx
                        .registry
                        .get(&module)
                        .map(Value::Module)
                        .ok_or_else(|| DecodeError::UnresolvableReference {
                            module: module.clone(),
                            qualname,
                        })?
                } else {
                    self.ctx
                        .registry
                        .resolve_path(&module, &qualname)
                        .map_err(|_| DecodeError::UnresolvableReference {
                            module: module.clone(),
                            qualname,
                        })?
                };
                self.expect_memo_put(value.clone())?;
                Ok(value)
            }

            other => Err(DecodeError::UnknownTag { tag: other, offset }),
        }
    }

    /// Consume the memo-slot frame that follows every memoizable object and
    /// bind the slot. Slots must appear in allocation order.
    fn expect_memo_put(&mut self, value: Value) -> Result<(), DecodeError> {
        let offset = self.reader.position();
        let tag_byte = self.reader.read_u8()?;
        if tag_byte != tag::MEMO_PUT {
            return Err(DecodeError::UnknownTag {
                tag: tag_byte,
                offset,
            });
        }
        let id = self.reader.read_u32()?;
        if id as usize != self.memo.len() {
            return Err(DecodeError::MemoOutOfOrder {
                expected: self.memo.len() as u32,
                got: id,
            });
        }
        self.memo.push(value);
        Ok(())
    }

    /// Invoke a constructor. Returns the built value and whether state
    /// should still be applied (`false` when the identity tracker already
    /// held the object and SKELETON/FILL are skipped).
    fn construct(&mut self, ctor: Ctor, args: Vec<Value>) -> Result<(Value, bool), DecodeError> {
        let mut args = ArgReader::new(ctor, args);
        match ctor {
            Ctor::SkeletonClass => {
                let name = args.string()?;
                let qualname = args.string()?;
                let module = args.optional_string()?;
                let bases = args.class_list()?;
                let id = args.tracking_id()?;
                let shape = ClassShape {
                    kind: ClassKind::Plain,
                    name,
                    qualname,
                    module,
                    bases,
                    members: vec![],
                };
                let (class, fresh) = skeleton::begin(&self.ctx.tracker, shape, id)?;
                Ok((Value::Class(class), fresh))
            }
            Ctor::SkeletonEnum => {
                let name = args.string()?;
                let qualname = args.string()?;
                let module = args.optional_string()?;
                let bases = args.class_list()?;
                let members = args.pairs()?;
                let id = args.tracking_id()?;
                let shape = ClassShape {
                    kind: ClassKind::Enum,
                    name,
                    qualname,
                    module,
                    bases,
                    members,
                };
                let (class, fresh) = skeleton::begin(&self.ctx.tracker, shape, id)?;
                Ok((Value::Class(class), fresh))
            }
            Ctor::FunctionShell => {
                let unit = args.unit()?;
                let name = args.string()?;
                let qualname = args.string()?;
                let module = args.optional_string()?;
                let shell = capsule::make_shell(unit, name, qualname, module);
                Ok((Value::Function(shell), true))
            }
            Ctor::NativeFunction => {
                let module = args.string()?;
                let name = args.string()?;
                let native = self.ctx.natives.get(&module, &name).ok_or(
                    DecodeError::UnknownNative {
                        module,
                        name,
                    },
                )?;
                Ok((Value::Native(native), true))
            }
            Ctor::CodeUnit => {
                let name = args.string()?;
                let qualname = args.string()?;
                let param_count = args.int()? as usize;
                let local_count = args.int()? as usize;
                let unit_flags = args.int()? as u32;
                let names = args.string_list()?;
                let free_names = args.string_list()?;
                let constants = args.list()?;
                let code = args.bytes()?;

                let mut builder = UnitBuilder::new(name)
                    .qualname(qualname)
                    .arity(param_count, local_count)
                    .flags(unit_flags);
                for table_name in &names {
                    builder.name_index(table_name);
                }
                for free_name in free_names {
                    builder.free_name(free_name);
                }
                for constant in constants {
                    builder.constant(match constant {
                        Value::Null => Constant::Null,
                        Value::Bool(b) => Constant::Bool(b),
                        Value::Int(i) => Constant::Int(i),
                        Value::Float(f) => Constant::Float(f),
                        Value::Str(s) => Constant::Str(s.to_string()),
                        Value::Unit(nested) => Constant::Unit(nested),
                        _ => {
                            return Err(DecodeError::BadFrame {
                                ctor: "code-unit",
                                detail: "unsupported constant kind",
                            })
                        }
                    });
                }
                builder.code.emit_raw(&code);
                Ok((Value::Unit(builder.build()), true))
            }
            Ctor::NewCell => Ok((Value::Cell(CaptureCell::empty()), true)),
            Ctor::ReadStream => {
                let content = args.string()?;
                Ok((Value::Stream(TextStream::open_read(content)), true))
            }
            Ctor::GetLogger => {
                let name = args.string()?;
                Ok((Value::Logger(LoggerHandle::get(&name)), true))
            }
            Ctor::NewLock => Ok((Value::Lock(LockObject::new()), true)),
            Ctor::GetAttr => {
                let receiver = args.value()?;
                let name = args.string()?;
                Ok((load_attr(&receiver, &name)?, true))
            }
            Ctor::Property => {
                let getter = args.optional_value()?;
                let setter = args.optional_value()?;
                Ok((
                    Value::Property(ferry_runtime::Property::new(getter, setter)),
                    true,
                ))
            }
            Ctor::MappingView => {
                let target = match args.value()? {
                    Value::Dict(dict) => dict,
                    _ => {
                        return Err(DecodeError::BadFrame {
                            ctor: "mapping-view",
                            detail: "expected a dict value",
                        })
                    }
                };
                let kind = match args.int()? {
                    0 => ViewKind::Keys,
                    1 => ViewKind::Values,
                    2 => ViewKind::Items,
                    _ => {
                        return Err(DecodeError::BadFrame {
                            ctor: "mapping-view",
                            detail: "unknown view kind",
                        })
                    }
                };
                Ok((Value::MappingView(MappingView::new(target, kind)), true))
            }
            Ctor::WeakSet => {
                let members = args.list()?;
                let set = WeakSetObject::new();
                for member in &members {
                    match member {
                        Value::Instance(instance) => set.add(instance),
                        _ => {
                            return Err(DecodeError::BadFrame {
                                ctor: "weak-set",
                                detail: "expected instance members",
                            })
                        }
                    }
                }
                Ok((Value::WeakSet(set), true))
            }
            Ctor::Module => {
                let name = args.string()?;
                let module = match self.ctx.registry.get(&name) {
                    Some(existing) => existing,
                    None => self
                        .ctx
                        .registry
                        .install(name, ferry_runtime::ModuleOrigin::Synthetic),
                };
                Ok((Value::Module(module), true))
            }
        }
    }
}

/// Apply a restore procedure to a freshly constructed object
fn apply_restore(restore: Restore, value: &Value, state: Value) -> Result<(), DecodeError> {
    match restore {
        Restore::FunctionState => {
            let Value::Function(func) = value else {
                return Err(DecodeError::BadFrame {
                    ctor: "function-shell",
                    detail: "state target is not a function",
                });
            };
            let parts = expect_list(&state, "function-shell")?;
            if parts.len() != 4 {
                return Err(DecodeError::BadFrame {
                    ctor: "function-shell",
                    detail: "state must have four parts",
                });
            }
            let props = pairs_from(&parts[0], "function-shell")?;
            let globals = pairs_from(&parts[1], "function-shell")?;
            let mut cells = Vec::new();
            for cell in expect_list(&parts[2], "function-shell")? {
                match cell {
                    Value::Cell(cell) => cells.push(cell),
                    _ => {
                        return Err(DecodeError::BadFrame {
                            ctor: "function-shell",
                            detail: "cell list holds a non-cell",
                        })
                    }
                }
            }
            // Part four, the shipped submodules, needs no application step:
            // decoding it already installed them at this destination.
            capsule::apply_state(
                func,
                capsule::FunctionState {
                    props,
                    globals,
                    cells,
                    submodules: vec![],
                },
            );
            Ok(())
        }
        Restore::ClassBody => {
            let Value::Class(class) = value else {
                return Err(DecodeError::BadFrame {
                    ctor: "skeleton-class",
                    detail: "state target is not a class",
                });
            };
            skeleton::commit(class, pairs_from(&state, "skeleton-class")?);
            Ok(())
        }
        Restore::CellContents => {
            let Value::Cell(cell) = value else {
                return Err(DecodeError::BadFrame {
                    ctor: "new-cell",
                    detail: "state target is not a cell",
                });
            };
            // The sentinel means the cell stays empty.
            if !matches!(state, Value::EmptySentinel) {
                cell.set(state);
            }
            Ok(())
        }
        Restore::ModuleNamespace => {
            let Value::Module(module) = value else {
                return Err(DecodeError::BadFrame {
                    ctor: "module",
                    detail: "state target is not a module",
                });
            };
            for (name, entry) in pairs_from(&state, "module")? {
                module.set(name, entry);
            }
            Ok(())
        }
    }
}

fn expect_list(value: &Value, ctor: &'static str) -> Result<Vec<Value>, DecodeError> {
    match value {
        Value::List(list) => Ok(list.snapshot()),
        _ => Err(DecodeError::BadFrame {
            ctor,
            detail: "expected a list",
        }),
    }
}

fn pairs_from(value: &Value, ctor: &'static str) -> Result<Vec<(String, Value)>, DecodeError> {
    let mut pairs = Vec::new();
    for entry in expect_list(value, ctor)? {
        let entry = expect_list(&entry, ctor)?;
        let [name, value] = entry.as_slice() else {
            return Err(DecodeError::BadFrame {
                ctor,
                detail: "expected (name, value) pairs",
            });
        };
        let Some(name) = name.as_str() else {
            return Err(DecodeError::BadFrame {
                ctor,
                detail: "pair name is not a string",
            });
        };
        pairs.push((name.to_string(), value.clone()));
    }
    Ok(pairs)
}

/// Typed cursor over a rebuild frame's decoded arguments
struct ArgReader {
    ctor: Ctor,
    args: std::vec::IntoIter<Value>,
}

impl ArgReader {
    fn new(ctor: Ctor, args: Vec<Value>) -> Self {
        Self {
            ctor,
            args: args.into_iter(),
        }
    }

    fn bad(&self, detail: &'static str) -> DecodeError {
        DecodeError::BadFrame {
            ctor: self.ctor.name(),
            detail,
        }
    }

    fn value(&mut self) -> Result<Value, DecodeError> {
        self.args.next().ok_or_else(|| self.bad("missing argument"))
    }

    fn optional_value(&mut self) -> Result<Option<Value>, DecodeError> {
        Ok(match self.value()? {
            Value::Null => None,
            other => Some(other),
        })
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        match self.value()? {
            Value::Str(s) => Ok(s.to_string()),
            _ => Err(self.bad("expected a string argument")),
        }
    }

    fn optional_string(&mut self) -> Result<Option<String>, DecodeError> {
        match self.value()? {
            Value::Null => Ok(None),
            Value::Str(s) => Ok(Some(s.to_string())),
            _ => Err(self.bad("expected a string or null argument")),
        }
    }

    fn int(&mut self) -> Result<i64, DecodeError> {
        self.value()?
            .as_int()
            .ok_or_else(|| self.bad("expected an integer argument"))
    }

    fn bytes(&mut self) -> Result<Arc<[u8]>, DecodeError> {
        match self.value()? {
            Value::Bytes(bytes) => Ok(bytes),
            _ => Err(self.bad("expected a bytes argument")),
        }
    }

    fn list(&mut self) -> Result<Vec<Value>, DecodeError> {
        match self.value()? {
            Value::List(list) => Ok(list.snapshot()),
            _ => Err(self.bad("expected a list argument")),
        }
    }

    fn string_list(&mut self) -> Result<Vec<String>, DecodeError> {
        self.list()?
            .into_iter()
            .map(|item| match item {
                Value::Str(s) => Ok(s.to_string()),
                _ => Err(self.bad("expected a list of strings")),
            })
            .collect()
    }

    fn class_list(&mut self) -> Result<Vec<Arc<ClassObject>>, DecodeError> {
        self.list()?
            .into_iter()
            .map(|item| match item {
                Value::Class(class) => Ok(class),
                _ => Err(self.bad("expected a list of classes")),
            })
            .collect()
    }

    fn pairs(&mut self) -> Result<Vec<(String, Value)>, DecodeError> {
        let raw = self.value()?;
        pairs_from(&raw, self.ctor.name())
    }

    fn unit(&mut self) -> Result<Arc<ferry_bytecode::CodeUnit>, DecodeError> {
        match self.value()? {
            Value::Unit(unit) => Ok(unit),
            _ => Err(self.bad("expected a compiled unit argument")),
        }
    }

    fn tracking_id(&mut self) -> Result<TrackingId, DecodeError> {
        let bytes = self.bytes()?;
        let bytes: [u8; 16] = bytes
            .as_ref()
            .try_into()
            .map_err(|_| self.bad("tracking id must be 16 bytes"))?;
        Ok(TrackingId::from_bytes(bytes))
    }
}
