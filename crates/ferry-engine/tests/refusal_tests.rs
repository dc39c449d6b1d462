//! Refusal and hard-failure tests
//!
//! Objects the engine will not serialize fail loudly and completely: no
//! partial output on encode, no half-built graphs on decode.

use ferry_engine::{decode, DecodeContext, DecodeError, EncodeError, Engine};
use ferry_runtime::module::ENTRY_MODULE;
use ferry_runtime::{
    Function, Module, ModuleRegistry, Namespace, NativeRegistry, RuntimeError, TextStream, Value,
};
use ferry_bytecode::{unit::flags, UnitBuilder};
use std::sync::Arc;

fn source_engine() -> Engine {
    let registry = ModuleRegistry::new();
    registry.insert(Module::entry());
    Engine::isolated(registry)
}

fn worker_context() -> DecodeContext {
    DecodeContext::new(ModuleRegistry::new(), NativeRegistry::new())
}

#[test]
fn test_read_stream_roundtrips() {
    let stream = TextStream::open_read("abc");
    let engine = source_engine();
    let payload = engine.encode(&Value::Stream(stream)).unwrap();

    let Value::Stream(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a stream");
    };
    assert_eq!(restored.read_to_end().unwrap(), "abc");
}

#[test]
fn test_consumed_stream_ships_empty_remainder() {
    let stream = TextStream::open_read("abcdef");
    assert_eq!(stream.read_to_end().unwrap(), "abcdef");

    // Capture is of the remaining content, which is now empty.
    let engine = source_engine();
    let payload = engine.encode(&Value::Stream(stream)).unwrap();
    let Value::Stream(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a stream");
    };
    assert_eq!(restored.read_to_end().unwrap(), "");
}

#[test]
fn test_write_stream_refused() {
    let stream = TextStream::open_write();
    stream.write("pending output").unwrap();
    let engine = source_engine();
    assert!(matches!(
        engine.encode(&Value::Stream(stream)),
        Err(EncodeError::RefusedWriteStream)
    ));
}

#[test]
fn test_closed_stream_refused() {
    let stream = TextStream::open_read("abc");
    stream.close();
    let engine = source_engine();
    assert!(matches!(
        engine.encode(&Value::Stream(stream)),
        Err(EncodeError::ClosedStream)
    ));
}

#[test]
fn test_coroutine_function_refused() {
    let mut builder = UnitBuilder::new("pump")
        .qualname("stream.<locals>.pump")
        .arity(0, 0)
        .flags(flags::COROUTINE);
    builder.code.emit_const_i32(0);
    builder.code.emit_return();
    let func = Function::new(
        builder.build(),
        Namespace::new(),
        Some(ENTRY_MODULE.to_string()),
    );

    let engine = source_engine();
    let err = engine.encode(&Value::Function(func)).unwrap_err();
    assert!(matches!(err, EncodeError::RefusedCoroutine(ref name) if name.contains("pump")));
}

#[test]
fn test_refusal_produces_no_partial_output() {
    // A list whose second element is refused: the whole encode fails.
    let good = Value::Int(1);
    let bad = Value::Stream(TextStream::open_write());
    let engine = source_engine();
    assert!(engine.encode(&Value::list(vec![good, bad])).is_err());
}

#[test]
fn test_unknown_native_fails_decode() {
    let registry = ModuleRegistry::new();
    let natives = NativeRegistry::new();
    fn stub(_: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::Null)
    }
    let native = natives.register("accel", "fma", stub);
    let engine = Engine::isolated(registry);
    let payload = engine.encode(&Value::Native(native)).unwrap();

    // Destination has no "accel.fma" native registered.
    let ctx = worker_context();
    assert!(matches!(
        decode(&ctx, &payload),
        Err(DecodeError::UnknownNative { .. })
    ));
}

#[test]
fn test_native_resolves_through_destination_registry() {
    let registry = ModuleRegistry::new();
    let natives = NativeRegistry::new();
    fn double(args: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))
    }
    let native = natives.register("accel", "double", double);
    let engine = Engine::isolated(registry);
    let payload = engine.encode(&Value::Native(native)).unwrap();

    let dest_natives = NativeRegistry::new();
    dest_natives.register("accel", "double", double);
    let ctx = DecodeContext::new(ModuleRegistry::new(), dest_natives);
    let Value::Native(restored) = decode(&ctx, &payload).unwrap() else {
        panic!("expected a native function");
    };
    assert_eq!(restored.call(&[Value::Int(21)]).unwrap().as_int(), Some(42));
}

#[test]
fn test_truncated_payload_fails() {
    let engine = source_engine();
    let payload = engine.encode(&Value::str("hello")).unwrap();
    let ctx = worker_context();
    assert!(decode(&ctx, &payload[..payload.len() - 2]).is_err());
}

#[test]
fn test_version_mismatch_fails() {
    let engine = source_engine();
    let mut payload = engine.encode(&Value::Int(1)).unwrap();
    payload[4..8].copy_from_slice(&99u32.to_le_bytes());
    let ctx = worker_context();
    assert!(matches!(
        decode(&ctx, &payload),
        Err(DecodeError::UnsupportedVersion(99))
    ));
}

#[test]
fn test_module_scan_errors_do_not_leak() {
    // A registry full of modules that cannot satisfy the lookup; resolution
    // must quietly fall back to by-value, and the encode must succeed.
    let registry = ModuleRegistry::new();
    registry.insert(Module::entry());
    registry.install("empty_one", ferry_runtime::ModuleOrigin::Frozen);
    registry.install("empty_two", ferry_runtime::ModuleOrigin::Frozen);

    let mut builder = UnitBuilder::new("loose").arity(0, 0);
    builder.code.emit_const_i32(3);
    builder.code.emit_return();
    // No declared module: forces the scan path.
    let func = Function::new(builder.build(), Namespace::new(), None);

    let engine = Engine::isolated(registry);
    let payload = engine.encode(&Value::Function(func)).unwrap();
    let Value::Function(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a function");
    };
    assert_eq!(
        ferry_runtime::call_function(&restored, &[]).unwrap().as_int(),
        Some(3)
    );
}
