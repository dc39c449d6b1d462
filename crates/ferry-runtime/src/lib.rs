//! Ferry runtime object model
//!
//! This crate defines the heap objects a Ferry process works with (values,
//! functions and their closure cells, dynamically defined classes and enums,
//! instances, modules and the loaded-module registry) together with a small
//! stack interpreter that executes compiled units. The serialization engine
//! in `ferry-engine` operates entirely over these types.

pub mod class;
pub mod error;
pub mod interp;
pub mod module;
pub mod native;
pub mod object;
pub mod value;

pub use class::{ClassKind, ClassObject, Instance};
pub use error::RuntimeError;
pub use interp::{call_function, call_value};
pub use module::{lookup_path, Module, ModuleOrigin, ModuleRegistry, Namespace};
pub use native::{NativeFn, NativeFunction, NativeRegistry};
pub use object::{
    BoundMethod, CaptureCell, DictObject, Function, ListObject, LockObject, LoggerHandle,
    MappingView, Property, StreamMode, TextStream, ViewKind, WeakSetObject,
};
pub use value::{Value, ValueKind};
