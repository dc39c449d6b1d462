//! Closure capture round-trip tests
//!
//! Functions are reconstructed from their compiled unit plus a captured
//! execution context. These tests validate the context half: cell sharing,
//! the empty-cell boundary, self-reference, and persistence of mutation
//! across calls on the reconstructed side.

use ferry_engine::{decode, DecodeContext, Engine};
use ferry_runtime::module::ENTRY_MODULE;
use ferry_runtime::{
    call_function, CaptureCell, Function, Module, ModuleRegistry, Namespace, NativeRegistry, Value,
};
use ferry_bytecode::{Opcode, UnitBuilder};
use std::sync::Arc;

fn source_engine() -> Engine {
    let registry = ModuleRegistry::new();
    registry.insert(Module::entry());
    Engine::isolated(registry)
}

fn worker_context() -> DecodeContext {
    DecodeContext::new(ModuleRegistry::new(), NativeRegistry::new())
}

/// A counter body: cell += 1, return the new value.
fn counter_function(qualname: &str) -> Arc<Function> {
    let mut builder = UnitBuilder::new("tick").qualname(qualname).arity(0, 0);
    builder.free_name("count");
    builder.code.emit_load_captured(0);
    builder.code.emit_const_i32(1);
    builder.code.emit_opcode(Opcode::Iadd);
    builder.code.emit_opcode(Opcode::Dup);
    builder.code.emit_store_captured(0);
    builder.code.emit_return();
    Function::new(
        builder.build(),
        Namespace::new(),
        Some(ENTRY_MODULE.to_string()),
    )
}

#[test]
fn test_counter_closure_scenario() {
    // A function nested in another, closing over a counter initialized to 5.
    let counter = counter_function("make_counter.<locals>.tick");
    counter.set_cells(vec![CaptureCell::with_value(Value::Int(5))]);

    let engine = source_engine();
    let payload = engine.encode(&Value::Function(counter)).unwrap();

    let ctx = worker_context();
    let Value::Function(restored) = decode(&ctx, &payload).unwrap() else {
        panic!("expected a function");
    };

    // Observes 5, and further increments persist across calls.
    assert_eq!(call_function(&restored, &[]).unwrap().as_int(), Some(6));
    assert_eq!(call_function(&restored, &[]).unwrap().as_int(), Some(7));
    assert_eq!(call_function(&restored, &[]).unwrap().as_int(), Some(8));
}

#[test]
fn test_shared_cell_stays_shared() {
    // Two functions sharing one cell still share one cell afterwards.
    let cell = CaptureCell::with_value(Value::Int(0));
    let first = counter_function("pair.<locals>.first");
    first.set_cells(vec![Arc::clone(&cell)]);
    let second = counter_function("pair.<locals>.second");
    second.set_cells(vec![cell]);

    let engine = source_engine();
    let payload = engine
        .encode(&Value::list(vec![
            Value::Function(first),
            Value::Function(second),
        ]))
        .unwrap();

    let ctx = worker_context();
    let Value::List(pair) = decode(&ctx, &payload).unwrap() else {
        panic!("expected a list");
    };
    let (Value::Function(first), Value::Function(second)) =
        (pair.get(0).unwrap(), pair.get(1).unwrap())
    else {
        panic!("expected two functions");
    };

    assert!(Arc::ptr_eq(&first.cells()[0], &second.cells()[0]));

    // Mutation through one is visible through the other.
    assert_eq!(call_function(&first, &[]).unwrap().as_int(), Some(1));
    assert_eq!(call_function(&second, &[]).unwrap().as_int(), Some(2));
}

#[test]
fn test_empty_cell_roundtrips_empty() {
    let func = counter_function("boundary.<locals>.tick");
    func.set_cells(vec![CaptureCell::empty()]);

    let engine = source_engine();
    let payload = engine.encode(&Value::Function(func)).unwrap();

    let ctx = worker_context();
    let Value::Function(restored) = decode(&ctx, &payload).unwrap() else {
        panic!("expected a function");
    };
    let cells = restored.cells();
    assert_eq!(cells.len(), 1);
    // Empty, not sentinel-valued.
    assert!(cells[0].is_empty());
    assert!(cells[0].get().is_none());
}

#[test]
fn test_cell_holding_null_is_not_empty() {
    let func = counter_function("nullcell.<locals>.tick");
    func.set_cells(vec![CaptureCell::with_value(Value::Null)]);

    let engine = source_engine();
    let payload = engine.encode(&Value::Function(func)).unwrap();

    let Value::Function(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a function");
    };
    let cells = restored.cells();
    assert!(!cells[0].is_empty());
    assert!(cells[0].get().unwrap().is_null());
}

#[test]
fn test_self_referential_closure() {
    // body: return captured cell contents, i.e. the function itself.
    let mut builder = UnitBuilder::new("me").qualname("fix.<locals>.me").arity(0, 0);
    builder.free_name("me");
    builder.code.emit_load_captured(0);
    builder.code.emit_return();
    let func = Function::new(
        builder.build(),
        Namespace::new(),
        Some(ENTRY_MODULE.to_string()),
    );
    let cell = CaptureCell::with_value(Value::Function(Arc::clone(&func)));
    func.set_cells(vec![cell]);

    let engine = source_engine();
    let payload = engine.encode(&Value::Function(func)).unwrap();

    let Value::Function(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a function");
    };
    let result = call_function(&restored, &[]).unwrap();
    let Value::Function(inner) = result else {
        panic!("expected the function itself");
    };
    assert!(Arc::ptr_eq(&restored, &inner));
}

#[test]
fn test_filtered_globals_travel() {
    // body: return threshold (a global).
    let mut builder = UnitBuilder::new("read_threshold")
        .qualname("cfg.<locals>.read_threshold")
        .arity(0, 0);
    let name = builder.name_index("threshold");
    builder.code.emit_load_global(name);
    builder.code.emit_return();
    let func = Function::new(
        builder.build(),
        Namespace::new(),
        Some(ENTRY_MODULE.to_string()),
    );
    func.globals.set("threshold", Value::Int(12));
    func.globals.set("unreferenced", Value::str("stays home"));

    let engine = source_engine();
    let payload = engine.encode(&Value::Function(func)).unwrap();

    let Value::Function(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a function");
    };
    assert_eq!(call_function(&restored, &[]).unwrap().as_int(), Some(12));
    // Only the referenced subset crossed the wire.
    assert!(restored.globals.get("unreferenced").is_none());
}

#[test]
fn test_function_props_travel() {
    let func = counter_function("tagged.<locals>.tick");
    func.set_cells(vec![CaptureCell::with_value(Value::Int(0))]);
    func.set_prop("origin", Value::str("notebook"));

    let engine = source_engine();
    let payload = engine.encode(&Value::Function(func)).unwrap();

    let Value::Function(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a function");
    };
    assert_eq!(restored.get_prop("origin").unwrap().as_str(), Some("notebook"));
}
