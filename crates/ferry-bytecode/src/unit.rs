//! Compiled code units
//!
//! A [`CodeUnit`] is the immutable compiled body of a Ferry function: its
//! instruction bytes plus the tables those instructions index into. Nested
//! function bodies are held as constants of the enclosing unit, which is the
//! property static analysis relies on to recurse into them.

use crate::encoder::InstructionIter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global counter for generating unique unit IDs
static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

fn generate_unit_id() -> u64 {
    NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Unit flags
pub mod flags {
    /// The unit is a cooperative coroutine body. Coroutine functions are
    /// refused by the serialization engine rather than partially captured.
    pub const COROUTINE: u32 = 1 << 0;
    /// The unit accepts trailing variadic arguments
    pub const VARIADIC: u32 = 1 << 1;
}

/// A constant held in a unit's constant table
#[derive(Debug, Clone)]
pub enum Constant {
    /// Null constant
    Null,
    /// Boolean constant
    Bool(bool),
    /// Integer constant
    Int(i64),
    /// Float constant
    Float(f64),
    /// String constant
    Str(String),
    /// A nested compiled unit (the body of an inner function)
    Unit(Arc<CodeUnit>),
}

/// The immutable compiled body of a function
///
/// Units are compiled once and never mutated afterwards; every unit carries
/// a process-unique `unit_id` so identity-keyed caches can key on it without
/// keeping the unit alive.
#[derive(Debug)]
pub struct CodeUnit {
    /// Process-unique identity (assigned at construction)
    pub unit_id: u64,
    /// Function name
    pub name: String,
    /// Dotted qualified name within the defining module
    pub qualname: String,
    /// Number of parameters (populated into the first locals)
    pub param_count: usize,
    /// Number of local variable slots (including parameters)
    pub local_count: usize,
    /// Unit flags (see [`flags`])
    pub flags: u32,
    /// Name table indexed by global/attribute instructions
    pub names: Vec<String>,
    /// Names of captured variables, in cell order
    pub free_names: Vec<String>,
    /// Constant table indexed by `LOAD_CONST` / `MAKE_CLOSURE`
    pub constants: Vec<Constant>,
    /// Instruction bytes
    pub code: Vec<u8>,
}

impl CodeUnit {
    /// Iterate over the unit's instructions
    pub fn instructions(&self) -> InstructionIter<'_> {
        InstructionIter::new(&self.code)
    }

    /// Look up a name-table entry
    pub fn name_at(&self, index: u16) -> Option<&str> {
        self.names.get(index as usize).map(|s| s.as_str())
    }

    /// Look up a constant-table entry
    pub fn constant_at(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// True when the unit body is a coroutine
    pub fn is_coroutine(&self) -> bool {
        self.flags & flags::COROUTINE != 0
    }

    /// Iterate over nested units held in the constant table
    pub fn nested_units(&self) -> impl Iterator<Item = &Arc<CodeUnit>> {
        self.constants.iter().filter_map(|c| match c {
            Constant::Unit(unit) => Some(unit),
            _ => None,
        })
    }
}

/// Builder for assembling a [`CodeUnit`]
///
/// Interns names and constants on first use and exposes the underlying
/// [`crate::BytecodeWriter`] for instruction emission.
pub struct UnitBuilder {
    name: String,
    qualname: String,
    param_count: usize,
    local_count: usize,
    flags: u32,
    names: Vec<String>,
    free_names: Vec<String>,
    constants: Vec<Constant>,
    /// Instruction writer; emit through this
    pub code: crate::BytecodeWriter,
}

impl UnitBuilder {
    /// Start building a unit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            qualname: name.clone(),
            name,
            param_count: 0,
            local_count: 0,
            flags: 0,
            names: Vec::new(),
            free_names: Vec::new(),
            constants: Vec::new(),
            code: crate::BytecodeWriter::new(),
        }
    }

    /// Set the dotted qualified name
    pub fn qualname(mut self, qualname: impl Into<String>) -> Self {
        self.qualname = qualname.into();
        self
    }

    /// Set parameter and local slot counts
    pub fn arity(mut self, param_count: usize, local_count: usize) -> Self {
        self.param_count = param_count;
        self.local_count = local_count.max(param_count);
        self
    }

    /// Set unit flags
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Declare a captured variable, returning its cell index
    pub fn free_name(&mut self, name: impl Into<String>) -> u16 {
        self.free_names.push(name.into());
        (self.free_names.len() - 1) as u16
    }

    /// Intern a name-table entry, returning its index
    pub fn name_index(&mut self, name: &str) -> u16 {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return pos as u16;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u16
    }

    /// Add a constant, returning its index
    pub fn constant(&mut self, constant: Constant) -> u32 {
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    /// Finish the unit
    pub fn build(self) -> Arc<CodeUnit> {
        Arc::new(CodeUnit {
            unit_id: generate_unit_id(),
            name: self.name,
            qualname: self.qualname,
            param_count: self.param_count,
            local_count: self.local_count,
            flags: self.flags,
            names: self.names,
            free_names: self.free_names,
            constants: self.constants,
            code: self.code.into_bytes(),
        })
    }
}
