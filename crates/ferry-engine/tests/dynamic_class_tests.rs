//! Dynamic class and enum reconstruction tests
//!
//! Classes without a stable importable identity are rebuilt through the
//! skeleton/fill sequence and deduped per destination process via tracking
//! ids.

use ferry_engine::{decode, make_enum_member, DecodeContext, Engine};
use ferry_runtime::interp::load_attr;
use ferry_runtime::module::ENTRY_MODULE;
use ferry_runtime::{
    call_value, CaptureCell, ClassKind, ClassObject, Function, Instance, Module, ModuleRegistry,
    Namespace, NativeRegistry, Value,
};
use ferry_bytecode::UnitBuilder;
use std::sync::Arc;

fn source_engine() -> Engine {
    let registry = ModuleRegistry::new();
    registry.insert(Module::entry());
    Engine::isolated(registry)
}

fn worker_context() -> DecodeContext {
    DecodeContext::new(ModuleRegistry::new(), NativeRegistry::new())
}

/// A class defined inside a function, with a method `m` returning the class
/// through its closure cell.
fn class_with_self_returning_method() -> Arc<ClassObject> {
    let class = ClassObject::new(
        ClassKind::Plain,
        "C",
        "factory.<locals>.C",
        Some(ENTRY_MODULE.to_string()),
        vec![],
    );

    let mut builder = UnitBuilder::new("m")
        .qualname("factory.<locals>.C.m")
        .arity(1, 1);
    builder.free_name("C");
    builder.code.emit_load_captured(0);
    builder.code.emit_return();
    let method = Function::new(
        builder.build(),
        Namespace::new(),
        Some(ENTRY_MODULE.to_string()),
    );
    method.set_cells(vec![CaptureCell::with_value(Value::Class(Arc::clone(
        &class,
    )))]);
    class.set_member("m", Value::Function(method));
    class
}

#[test]
fn test_method_returns_reconstructed_class() {
    let class = class_with_self_returning_method();
    let instance = Instance::new(&class);

    let engine = source_engine();
    let payload = engine.encode(&Value::Instance(instance)).unwrap();

    let Value::Instance(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected an instance");
    };

    // Call .m() on the reconstructed instance; the result must be the
    // reconstructed class itself, cycle intact.
    let method = load_attr(&Value::Instance(Arc::clone(&restored)), "m").unwrap();
    let Value::Class(returned) = call_value(&method, &[]).unwrap() else {
        panic!("expected a class");
    };
    assert!(Arc::ptr_eq(&returned, &restored.class));
}

#[test]
fn test_two_instances_share_one_class_in_stream() {
    let class = class_with_self_returning_method();
    let a = Instance::new(&class);
    let b = Instance::new(&class);

    let engine = source_engine();
    let payload = engine
        .encode(&Value::list(vec![Value::Instance(a), Value::Instance(b)]))
        .unwrap();

    let Value::List(pair) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a list");
    };
    let (Value::Instance(a), Value::Instance(b)) = (pair.get(0).unwrap(), pair.get(1).unwrap())
    else {
        panic!("expected two instances");
    };
    assert!(Arc::ptr_eq(&a.class, &b.class));
}

#[test]
fn test_dedup_across_separate_payloads() {
    let class = class_with_self_returning_method();
    let engine = source_engine();

    let first = engine
        .encode(&Value::Instance(Instance::new(&class)))
        .unwrap();
    let second = engine
        .encode(&Value::Instance(Instance::new(&class)))
        .unwrap();

    // One destination process: both payloads decode through one tracker.
    let ctx = worker_context();
    let Value::Instance(a) = decode(&ctx, &first).unwrap() else {
        panic!("expected an instance");
    };
    let Value::Instance(b) = decode(&ctx, &second).unwrap() else {
        panic!("expected an instance");
    };
    assert!(Arc::ptr_eq(&a.class, &b.class));
}

#[test]
fn test_separate_destinations_get_separate_classes() {
    let class = class_with_self_returning_method();
    let engine = source_engine();
    let payload = engine
        .encode(&Value::Instance(Instance::new(&class)))
        .unwrap();

    let Value::Instance(a) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected an instance");
    };
    let Value::Instance(b) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected an instance");
    };
    // Registries are scoped per destination; no cross-process sharing.
    assert!(!Arc::ptr_eq(&a.class, &b.class));
}

#[test]
fn test_class_with_base() {
    let base = ClassObject::new(
        ClassKind::Plain,
        "Base",
        "factory.<locals>.Base",
        Some(ENTRY_MODULE.to_string()),
        vec![],
    );
    base.set_member("kind", Value::str("base"));
    let derived = ClassObject::new(
        ClassKind::Plain,
        "Derived",
        "factory.<locals>.Derived",
        Some(ENTRY_MODULE.to_string()),
        vec![Arc::clone(&base)],
    );
    derived.set_member("extra", Value::Int(1));

    let engine = source_engine();
    let payload = engine.encode(&Value::Class(derived)).unwrap();

    let Value::Class(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a class");
    };
    assert_eq!(restored.bases.len(), 1);
    assert_eq!(restored.bases[0].name, "Base");
    // Inherited member reachable through the reconstructed base.
    assert_eq!(restored.lookup("kind").unwrap().as_str(), Some("base"));
    assert_eq!(restored.lookup("extra").unwrap().as_int(), Some(1));
}

#[test]
fn test_enum_roundtrip() {
    let color = ClassObject::new(
        ClassKind::Enum,
        "Color",
        "palette.<locals>.Color",
        Some(ENTRY_MODULE.to_string()),
        vec![],
    );
    make_enum_member(&color, "RED", Value::Int(1));
    make_enum_member(&color, "BLUE", Value::Int(2));

    let engine = source_engine();
    let payload = engine.encode(&Value::Class(Arc::clone(&color))).unwrap();

    let Value::Class(restored) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a class");
    };
    assert!(restored.is_enum());
    assert_eq!(restored.enum_member_names(), vec!["RED", "BLUE"]);

    let Value::Instance(red) = restored.get_own_member("RED").unwrap() else {
        panic!("member is not an instance");
    };
    assert!(Arc::ptr_eq(&red.class, &restored));
    assert_eq!(red.get_field("value").unwrap().as_int(), Some(1));
}

#[test]
fn test_enum_member_identity_preserved() {
    let color = ClassObject::new(
        ClassKind::Enum,
        "Color",
        "palette.<locals>.Color",
        Some(ENTRY_MODULE.to_string()),
        vec![],
    );
    let red = make_enum_member(&color, "RED", Value::Int(1));
    make_enum_member(&color, "BLUE", Value::Int(2));

    // Ship the member twice alongside its class; each occurrence must
    // resolve to the single member attached to the reconstructed class.
    let engine = source_engine();
    let payload = engine
        .encode(&Value::list(vec![
            Value::Instance(Arc::clone(&red)),
            Value::Instance(red),
            Value::Class(color),
        ]))
        .unwrap();

    let Value::List(items) = decode(&worker_context(), &payload).unwrap() else {
        panic!("expected a list");
    };
    let (Value::Instance(first), Value::Instance(second), Value::Class(class)) =
        (items.get(0).unwrap(), items.get(1).unwrap(), items.get(2).unwrap())
    else {
        panic!("expected members and class");
    };
    assert!(Arc::ptr_eq(&first, &second));
    let Value::Instance(attached) = class.get_own_member("RED").unwrap() else {
        panic!("expected the attached member");
    };
    assert!(Arc::ptr_eq(&first, &attached));
}

#[test]
fn test_importable_class_goes_by_reference() {
    let registry = ModuleRegistry::new();
    let shapes = registry.install("shapes", ferry_runtime::ModuleOrigin::Source("shapes.fy".into()));
    let class = ClassObject::new(
        ClassKind::Plain,
        "Circle",
        "Circle",
        Some("shapes".to_string()),
        vec![],
    );
    shapes.set("Circle", Value::Class(Arc::clone(&class)));
    let engine = Engine::isolated(registry);

    let payload = engine.encode(&Value::Class(class)).unwrap();

    // The destination has its own definition under the same path.
    let dest_registry = ModuleRegistry::new();
    let dest_shapes =
        dest_registry.install("shapes", ferry_runtime::ModuleOrigin::Source("shapes.fy".into()));
    let dest_class = ClassObject::new(
        ClassKind::Plain,
        "Circle",
        "Circle",
        Some("shapes".to_string()),
        vec![],
    );
    dest_shapes.set("Circle", Value::Class(Arc::clone(&dest_class)));

    let ctx = DecodeContext::new(dest_registry, NativeRegistry::new());
    let Value::Class(restored) = decode(&ctx, &payload).unwrap() else {
        panic!("expected a class");
    };
    assert!(Arc::ptr_eq(&restored, &dest_class));
}

#[test]
fn test_singleton_class_must_be_importable() {
    let registry = ModuleRegistry::new();
    registry.insert(Module::entry());
    let engine = Engine::isolated(registry);

    let singleton = ClassObject::new(
        ClassKind::Singleton,
        "Marker",
        "Marker",
        Some(ENTRY_MODULE.to_string()),
        vec![],
    );
    assert!(engine.encode(&Value::Class(singleton)).is_err());
}
