//! Ferry capsule serialization engine
//!
//! Serializes runtime objects, including dynamically defined functions,
//! classes, and enumerations that lack a stable importable identity, into a
//! transmittable payload, and reconstructs equivalent objects in a separate
//! process of the same runtime. Built for distributing interactively defined
//! code to worker processes.
//!
//! The engine decides per named object whether to transmit a lookup path
//! (reference encoding) or a full reconstruction recipe (value encoding),
//! captures function execution context (filtered globals and closure cells),
//! rebuilds dynamic classes through cycle-safe two-phase construction, and
//! dedups repeated reconstructions of the same dynamic type via a weak
//! identity tracker.
//!
//! ```
//! use ferry_engine::{DecodeContext, Engine};
//! use ferry_runtime::{ModuleRegistry, NativeRegistry, Value};
//!
//! let registry = ModuleRegistry::new();
//! let engine = Engine::new(std::sync::Arc::clone(&registry));
//! let payload = engine.encode(&Value::Int(42)).unwrap();
//!
//! let ctx = DecodeContext::new(ModuleRegistry::new(), NativeRegistry::new());
//! let restored = ferry_engine::decode(&ctx, &payload).unwrap();
//! assert_eq!(restored.as_int(), Some(42));
//! ```

pub mod capsule;
pub mod config;
pub mod error;
pub mod globals;
pub mod reduce;
pub mod resolver;
pub mod skeleton;
pub mod summary;
pub mod tracker;
pub mod wire;

use ferry_runtime::{Module, ModuleRegistry, NativeRegistry, Value};
use std::sync::Arc;

pub use config::{serializer_choice, SerializerChoice, SERIALIZER_ENV};
pub use error::{DecodeError, EncodeError};
pub use globals::GlobalsCache;
pub use reduce::{Ctor, Reduce, ReduceFn, Restore, StrategyTable};
pub use resolver::{ByValuePolicy, ReferenceResolver, Resolution};
pub use skeleton::{ClassShape, make_enum_member};
pub use summary::{inspect, PayloadSummary};
pub use tracker::{ClassTracker, TrackingId};

/// Encode-side context: the registries the serialization strategies consult
///
/// Everything here is an explicit object rather than an ambient singleton,
/// so isolated engines are testable. All registries start empty and live for
/// the process lifetime; only the by-value policy defaults to the shared
/// process-wide set.
#[derive(Debug)]
pub struct Engine {
    /// The process's loaded-module table
    pub registry: Arc<ModuleRegistry>,
    /// Modules forced to by-value capture
    pub policy: Arc<ByValuePolicy>,
    /// Weak identity registry for dynamic types
    pub tracker: Arc<ClassTracker>,
    /// Memoized global-binding extraction
    pub globals_cache: Arc<GlobalsCache>,
    /// Per-type strategy registry
    pub strategies: StrategyTable,
}

impl Engine {
    /// Create an engine over a module registry, sharing the process-wide
    /// by-value policy
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self::with_policy(registry, ByValuePolicy::global())
    }

    /// Create an engine with a private by-value policy (isolated from the
    /// process-wide set); used by tests and embedded pools
    pub fn isolated(registry: Arc<ModuleRegistry>) -> Self {
        Self::with_policy(registry, ByValuePolicy::new())
    }

    /// Create an engine with an explicit policy set
    pub fn with_policy(registry: Arc<ModuleRegistry>, policy: Arc<ByValuePolicy>) -> Self {
        Self {
            registry,
            policy,
            tracker: ClassTracker::new(),
            globals_cache: GlobalsCache::new(),
            strategies: StrategyTable::with_defaults(),
        }
    }

    /// A reference resolver over this engine's registry and policy
    pub fn resolver(&self) -> ReferenceResolver {
        ReferenceResolver::new(Arc::clone(&self.registry), Arc::clone(&self.policy))
    }

    /// Register or replace a reduction strategy
    pub fn register_strategy(&mut self, kind: ferry_runtime::ValueKind, strategy: ReduceFn) {
        self.strategies.register(kind, strategy);
    }

    /// Encode a value graph into a transmittable payload
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        wire::encode(self, value)
    }
}

/// Decode-side context, scoped to one destination process
#[derive(Debug)]
pub struct DecodeContext {
    /// The destination's loaded-module table
    pub registry: Arc<ModuleRegistry>,
    /// The destination's dynamic-type tracker
    pub tracker: Arc<ClassTracker>,
    /// The destination's native-function registry
    pub natives: Arc<NativeRegistry>,
}

impl DecodeContext {
    /// Create a decode context with a fresh tracker
    pub fn new(registry: Arc<ModuleRegistry>, natives: Arc<NativeRegistry>) -> Self {
        Self {
            registry,
            tracker: ClassTracker::new(),
            natives,
        }
    }

    /// Reuse an existing tracker, so that payloads decoded earlier in this
    /// process dedup against this one
    pub fn with_tracker(mut self, tracker: Arc<ClassTracker>) -> Self {
        self.tracker = tracker;
        self
    }
}

/// Reconstruct a value graph from a payload
pub fn decode(ctx: &DecodeContext, bytes: &[u8]) -> Result<Value, DecodeError> {
    wire::decode(ctx, bytes)
}

/// Register a module in the process-wide by-value set
///
/// All of the module's functions and classes are subsequently captured by
/// value, so they load in worker processes where the module is not
/// importable. Especially useful while developing a module in a distributed
/// environment: restarting the client with new source is enough, without
/// re-installing the module on every worker. Idempotent.
pub fn register_by_value(module: &Module) {
    ByValuePolicy::global().register(module);
}

/// Remove a module from the process-wide by-value set. Idempotent.
pub fn unregister_by_value(module: &Module) {
    ByValuePolicy::global().unregister(module);
}
