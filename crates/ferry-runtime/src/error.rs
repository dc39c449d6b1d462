//! Runtime error types

use ferry_bytecode::DecodeError;
use thiserror::Error;

/// Errors raised while executing compiled units or manipulating runtime
/// objects
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Name not bound in the function's global namespace
    #[error("Undefined global '{0}'")]
    UndefinedGlobal(String),

    /// Attribute missing on the receiver
    #[error("{type_name} has no attribute '{name}'")]
    UndefinedAttribute {
        /// Receiver type
        type_name: &'static str,
        /// Attribute name
        name: String,
    },

    /// Module not present in the registry
    #[error("Module '{0}' is not loaded")]
    ModuleNotLoaded(String),

    /// Callee is not a callable value
    #[error("Value of type {0} is not callable")]
    NotCallable(&'static str),

    /// Wrong number of arguments
    #[error("Expected {expected} arguments, got {got}")]
    ArityMismatch {
        /// Declared parameter count
        expected: usize,
        /// Arguments supplied
        got: usize,
    },

    /// Captured-cell index outside the function's cell list
    #[error("Capture index {0} out of range")]
    CaptureOutOfRange(u16),

    /// Read of an empty capture cell
    #[error("Captured variable read before assignment")]
    EmptyCell,

    /// Local slot index outside the frame
    #[error("Local index {0} out of range")]
    LocalOutOfRange(u16),

    /// Constant-table index out of range
    #[error("Constant index {0} out of range")]
    ConstantOutOfRange(u32),

    /// Name-table index out of range
    #[error("Name index {0} out of range")]
    NameOutOfRange(u16),

    /// Operand stack underflow
    #[error("Operand stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// Operand types don't fit the instruction
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// What the instruction needed
        expected: &'static str,
        /// What was on the stack
        got: &'static str,
    },

    /// Jump target outside the code buffer
    #[error("Jump target {0} out of bounds")]
    BadJumpTarget(i64),

    /// Malformed instruction stream
    #[error("Bad instruction: {0}")]
    BadInstruction(#[from] DecodeError),

    /// Call depth exceeded
    #[error("Recursion limit exceeded")]
    RecursionLimit,

    /// Operation on a closed stream
    #[error("Stream is closed")]
    ClosedStream,
}
