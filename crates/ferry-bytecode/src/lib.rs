//! Bytecode definitions for the Ferry runtime
//!
//! This crate defines the instruction set executed by the Ferry interpreter,
//! the binary reader/writer used to assemble and walk instruction streams,
//! and [`CodeUnit`], the immutable compiled body of a function.

pub mod encoder;
pub mod opcode;
pub mod unit;

pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError, Instruction, InstructionIter};
pub use opcode::{Opcode, Operand, OperandKind};
pub use unit::{CodeUnit, Constant, UnitBuilder};
