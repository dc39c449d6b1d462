//! Function state capture and restore
//!
//! A function's transmissible state splits in two: ordinary attributes,
//! applied by plain insertion, and the execution context (the filtered
//! globals subset and the ordered closure-cell list) which is not
//! ordinary-assignable and is cleared-and-repopulated wholesale. The capsule
//! carries only the globals the compiled body actually references, never the
//! full enclosing namespace.

use crate::globals::{find_imported_submodules, GlobalsCache};
use ferry_bytecode::CodeUnit;
use ferry_runtime::{CaptureCell, Function, Module, ModuleRegistry, Value};
use std::sync::Arc;

/// A function's captured execution state
#[derive(Debug)]
pub struct FunctionState {
    /// Ordinary attributes, in insertion order
    pub props: Vec<(String, Value)>,
    /// Referenced globals present at capture time, sorted by name
    pub globals: Vec<(String, Value)>,
    /// Ordered closure cells
    pub cells: Vec<Arc<CaptureCell>>,
    /// Implicitly used submodules that must be importable (or shipped) for
    /// the function to run at the destination
    pub submodules: Vec<Arc<Module>>,
}

/// Capture `func`'s minimal execution context
pub fn capture(
    func: &Function,
    cache: &GlobalsCache,
    registry: &ModuleRegistry,
) -> FunctionState {
    let referenced = cache.extract(&func.unit);
    let mut names: Vec<&String> = referenced.iter().collect();
    names.sort();

    let globals: Vec<(String, Value)> = names
        .into_iter()
        .filter_map(|name| func.globals.get(name).map(|value| (name.clone(), value)))
        .collect();

    let cells = func.cells();

    // Top-level dependencies for submodule detection: every module reachable
    // from the filtered globals or the closure cells.
    let mut deps: Vec<Arc<Module>> = Vec::new();
    let mut note_dep = |value: &Value| {
        if let Value::Module(module) = value {
            if !deps.iter().any(|m| m.object_id == module.object_id) {
                deps.push(Arc::clone(module));
            }
        }
    };
    for (_, value) in &globals {
        note_dep(value);
    }
    for cell in &cells {
        if let Some(value) = cell.get() {
            note_dep(&value);
        }
    }

    let submodules = find_imported_submodules(&func.unit, &deps, registry);

    FunctionState {
        props: func.props(),
        globals,
        cells,
        submodules,
    }
}

/// Build an empty function shell: correct compiled unit and names, fresh
/// empty namespace, no cells
///
/// The decoder registers the shell in its memo table before any state is
/// applied; a function whose cells reference the function itself resolves
/// through that registration.
pub fn make_shell(
    unit: Arc<CodeUnit>,
    name: String,
    qualname: String,
    module: Option<String>,
) -> Arc<Function> {
    Function::shell(unit, name, qualname, module)
}

/// Apply captured state to a shell
///
/// Attributes go through ordinary insertion. The namespace is cleared and
/// repopulated, and the cell list replaced wholesale; neither is reachable
/// through the attribute surface. Shipped submodules need no application
/// step here: decoding them already installed them at the destination.
pub fn apply_state(func: &Function, state: FunctionState) {
    for (name, value) in state.props {
        func.set_prop(&name, value);
    }

    func.globals.clear();
    for (name, value) in state.globals {
        func.globals.set(name, value);
    }

    func.set_cells(state.cells);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_bytecode::UnitBuilder;
    use ferry_runtime::{ModuleOrigin, Namespace};

    fn counter_function() -> Arc<Function> {
        let mut builder = UnitBuilder::new("tick").arity(0, 0);
        builder.free_name("count");
        let limit = builder.name_index("limit");
        builder.code.emit_load_global(limit);
        builder.code.emit_load_captured(0);
        builder.code.emit_return();
        let func = Function::new(builder.build(), Namespace::new(), None);
        func.set_cells(vec![CaptureCell::with_value(Value::Int(5))]);
        func
    }

    #[test]
    fn test_capture_filters_globals() {
        let registry = ModuleRegistry::new();
        let cache = GlobalsCache::new();
        let func = counter_function();
        func.globals.set("limit", Value::Int(10));
        func.globals.set("unrelated", Value::Int(99));

        let state = capture(&func, &cache, &registry);
        assert_eq!(state.globals.len(), 1);
        assert_eq!(state.globals[0].0, "limit");
        assert_eq!(state.cells.len(), 1);
    }

    #[test]
    fn test_capture_skips_absent_globals() {
        let registry = ModuleRegistry::new();
        let cache = GlobalsCache::new();
        let func = counter_function(); // "limit" referenced but unbound
        let state = capture(&func, &cache, &registry);
        assert!(state.globals.is_empty());
    }

    #[test]
    fn test_capture_detects_submodules() {
        let registry = ModuleRegistry::new();
        let pkg = registry.install("pkg", ModuleOrigin::Source("pkg/init.fy".into()));
        let sub = registry.install("pkg.sub", ModuleOrigin::Source("pkg/sub.fy".into()));
        sub.set("Widget", Value::Int(0));

        let mut builder = UnitBuilder::new("f").arity(0, 0);
        let pkg_name = builder.name_index("pkg");
        builder.code.emit_load_global(pkg_name);
        let widget = builder.name_index("Widget");
        builder.code.emit_load_attr(widget);
        builder.code.emit_return();
        let func = Function::new(builder.build(), Namespace::new(), None);
        func.globals.set("pkg", Value::Module(Arc::clone(&pkg)));

        let cache = GlobalsCache::new();
        let state = capture(&func, &cache, &registry);
        assert_eq!(state.submodules.len(), 1);
        assert_eq!(state.submodules[0].name, "pkg.sub");
    }

    #[test]
    fn test_shell_then_apply_roundtrip() {
        let registry = ModuleRegistry::new();
        let cache = GlobalsCache::new();
        let func = counter_function();
        func.globals.set("limit", Value::Int(10));
        func.set_prop("origin", Value::str("interactive"));

        let state = capture(&func, &cache, &registry);
        let shell = make_shell(
            Arc::clone(&func.unit),
            func.name.clone(),
            func.qualname.clone(),
            None,
        );
        assert!(shell.globals.is_empty());
        assert!(shell.cells().is_empty());

        apply_state(&shell, state);
        assert_eq!(shell.globals.get("limit").unwrap().as_int(), Some(10));
        assert_eq!(shell.cells().len(), 1);
        assert_eq!(shell.get_prop("origin").unwrap().as_str(), Some("interactive"));
    }

    #[test]
    fn test_apply_clears_stale_namespace() {
        let func = counter_function();
        func.globals.set("stale", Value::Int(1));
        let state = FunctionState {
            props: vec![],
            globals: vec![("fresh".to_string(), Value::Int(2))],
            cells: vec![],
            submodules: vec![],
        };
        apply_state(&func, state);
        assert!(func.globals.get("stale").is_none());
        assert_eq!(func.globals.get("fresh").unwrap().as_int(), Some(2));
    }
}
