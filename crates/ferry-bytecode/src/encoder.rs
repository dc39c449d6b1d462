//! Bytecode encoding and decoding utilities
//!
//! This module provides tools for assembling Ferry instruction streams and
//! walking them back instruction by instruction.

use crate::opcode::{Opcode, Operand, OperandKind};
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#04x} at offset {1}")]
    InvalidOpcode(u8, usize),
}

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary
/// buffer. All multi-byte values are little-endian.
pub struct BytecodeWriter {
    /// Internal buffer containing the bytecode
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float (little-endian)
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a length-prefixed UTF-8 string (u32 length + bytes)
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit raw bytes without a length prefix
    pub fn emit_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Reserve space for an i32 to be patched later, returning its offset
    pub fn reserve_i32(&mut self) -> usize {
        let offset = self.offset();
        self.emit_i32(0);
        offset
    }

    /// Patch a previously reserved i32 slot
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Patch a u32 slot
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    // ===== Opcode Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit CONST_I32 with an immediate value
    pub fn emit_const_i32(&mut self, value: i32) {
        self.emit_opcode(Opcode::ConstI32);
        self.emit_i32(value);
    }

    /// Emit LOAD_CONST with a constant-table index
    pub fn emit_load_const(&mut self, index: u32) {
        self.emit_opcode(Opcode::LoadConst);
        self.emit_u32(index);
    }

    /// Emit LOAD_LOCAL
    pub fn emit_load_local(&mut self, index: u16) {
        self.emit_opcode(Opcode::LoadLocal);
        self.emit_u16(index);
    }

    /// Emit STORE_LOCAL
    pub fn emit_store_local(&mut self, index: u16) {
        self.emit_opcode(Opcode::StoreLocal);
        self.emit_u16(index);
    }

    /// Emit LOAD_GLOBAL with a name-table index
    pub fn emit_load_global(&mut self, name_index: u16) {
        self.emit_opcode(Opcode::LoadGlobal);
        self.emit_u16(name_index);
    }

    /// Emit STORE_GLOBAL with a name-table index
    pub fn emit_store_global(&mut self, name_index: u16) {
        self.emit_opcode(Opcode::StoreGlobal);
        self.emit_u16(name_index);
    }

    /// Emit DELETE_GLOBAL with a name-table index
    pub fn emit_delete_global(&mut self, name_index: u16) {
        self.emit_opcode(Opcode::DeleteGlobal);
        self.emit_u16(name_index);
    }

    /// Emit LOAD_CAPTURED
    pub fn emit_load_captured(&mut self, cell_index: u16) {
        self.emit_opcode(Opcode::LoadCaptured);
        self.emit_u16(cell_index);
    }

    /// Emit STORE_CAPTURED
    pub fn emit_store_captured(&mut self, cell_index: u16) {
        self.emit_opcode(Opcode::StoreCaptured);
        self.emit_u16(cell_index);
    }

    /// Emit LOAD_ATTR with a name-table index
    pub fn emit_load_attr(&mut self, name_index: u16) {
        self.emit_opcode(Opcode::LoadAttr);
        self.emit_u16(name_index);
    }

    /// Emit STORE_ATTR with a name-table index
    pub fn emit_store_attr(&mut self, name_index: u16) {
        self.emit_opcode(Opcode::StoreAttr);
        self.emit_u16(name_index);
    }

    /// Emit MAKE_CLOSURE referencing a nested unit constant
    pub fn emit_make_closure(&mut self, unit_const_index: u32, capture_count: u16) {
        self.emit_opcode(Opcode::MakeClosure);
        self.emit_u32(unit_const_index);
        self.emit_u16(capture_count);
    }

    /// Emit CALL with an argument count
    pub fn emit_call(&mut self, arg_count: u16) {
        self.emit_opcode(Opcode::Call);
        self.emit_u16(arg_count);
    }

    /// Emit RETURN
    pub fn emit_return(&mut self) {
        self.emit_opcode(Opcode::Return);
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytecode reader for decoding binary streams
///
/// Bounds-checked cursor over a byte slice. Used both for instruction
/// streams and for the wire format built on top of this crate.
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new reader over a byte slice
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of bytes left to read
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// True when the whole buffer has been consumed
    pub fn is_at_end(&self) -> bool {
        self.position >= self.buffer.len()
    }

    /// Move the cursor to an absolute position
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.buffer.len());
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        if self.position + count > self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let slice = &self.buffer[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Read a 64-bit float (little-endian)
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Read a length-prefixed string (u32 length + UTF-8 bytes)
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.position;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.take(count)?.to_vec())
    }

    /// Read an opcode byte
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, self.position - 1))
    }
}

/// A decoded instruction: offset, opcode, and operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the opcode within the stream
    pub offset: usize,
    /// The opcode
    pub opcode: Opcode,
    /// Decoded operand (layout per [`Opcode::operand_kind`])
    pub operand: Operand,
}

/// Iterator over the instructions of a code buffer
///
/// Yields `Err` once and then stops if the stream is malformed.
pub struct InstructionIter<'a> {
    reader: BytecodeReader<'a>,
    failed: bool,
}

impl<'a> InstructionIter<'a> {
    /// Create an iterator over raw instruction bytes
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            reader: BytecodeReader::new(code),
            failed: false,
        }
    }

    fn read_instruction(&mut self) -> Result<Instruction, DecodeError> {
        let offset = self.reader.position();
        let opcode = self.reader.read_opcode()?;
        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::U16 => Operand::U16(self.reader.read_u16()?),
            OperandKind::U32 => Operand::U32(self.reader.read_u32()?),
            OperandKind::I32 => Operand::I32(self.reader.read_i32()?),
            OperandKind::U32U16 => {
                let index = self.reader.read_u32()?;
                let count = self.reader.read_u16()?;
                Operand::U32U16(index, count)
            }
        };
        Ok(Instruction {
            offset,
            opcode,
            operand,
        })
    }
}

impl<'a> Iterator for InstructionIter<'a> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_at_end() {
            return None;
        }
        let result = self.read_instruction();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_emission() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_u32(0xABCD_EF01);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], 0x42);
        assert_eq!(bytes[1], 0x34); // Little-endian
        assert_eq!(bytes[2], 0x12);
        assert_eq!(bytes[3], 0x01);
    }

    #[test]
    fn test_reader_primitives() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_i32(-42);
        writer.emit_i64(-1_000_000_000_000);
        writer.emit_f64(3.25);

        let bytes = writer.buffer();
        let mut reader = BytecodeReader::new(bytes);
        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_i32().unwrap(), -42);
        assert_eq!(reader.read_i64().unwrap(), -1_000_000_000_000);
        assert_eq!(reader.read_f64().unwrap(), 3.25);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_reader_bounds_checking() {
        let bytes = vec![0x01];
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert!(matches!(
            reader.read_u8(),
            Err(DecodeError::UnexpectedEnd(1))
        ));
    }

    #[test]
    fn test_string_roundtrip() {
        let mut writer = BytecodeWriter::new();
        writer.emit_string("hello");
        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_string().unwrap(), "hello");
    }

    #[test]
    fn test_instruction_iter() {
        let mut writer = BytecodeWriter::new();
        writer.emit_load_captured(0);
        writer.emit_const_i32(1);
        writer.emit_opcode(Opcode::Iadd);
        writer.emit_store_captured(0);
        writer.emit_return();

        let code = writer.into_bytes();
        let instrs: Vec<Instruction> = InstructionIter::new(&code)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(instrs.len(), 5);
        assert_eq!(instrs[0].opcode, Opcode::LoadCaptured);
        assert_eq!(instrs[0].operand, Operand::U16(0));
        assert_eq!(instrs[1].opcode, Opcode::ConstI32);
        assert_eq!(instrs[1].operand, Operand::I32(1));
        assert_eq!(instrs[4].opcode, Opcode::Return);
    }

    #[test]
    fn test_instruction_iter_invalid_opcode() {
        let code = vec![Opcode::Nop.to_u8(), 0xFF];
        let mut iter = InstructionIter::new(&code);
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next().unwrap(),
            Err(DecodeError::InvalidOpcode(0xFF, 1))
        ));
        assert!(iter.next().is_none()); // iterator fuses after failure
    }

    #[test]
    fn test_instruction_iter_truncated_operand() {
        let code = vec![Opcode::LoadGlobal.to_u8(), 0x01]; // missing one byte
        let mut iter = InstructionIter::new(&code);
        assert!(matches!(
            iter.next().unwrap(),
            Err(DecodeError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_make_closure_operands() {
        let mut writer = BytecodeWriter::new();
        writer.emit_make_closure(7, 2);
        let code = writer.into_bytes();
        let instr = InstructionIter::new(&code).next().unwrap().unwrap();
        assert_eq!(instr.opcode, Opcode::MakeClosure);
        assert_eq!(instr.operand, Operand::U32U16(7, 2));
    }

    #[test]
    fn test_jump_patching() {
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::JmpIfFalse);
        let patch_offset = writer.reserve_i32();
        writer.emit_const_i32(42);

        let jump_target = writer.offset();
        let jump_offset = jump_target as i32 - (patch_offset as i32 + 4);
        writer.patch_i32(patch_offset, jump_offset);

        let instr = InstructionIter::new(writer.buffer()).next().unwrap().unwrap();
        assert_eq!(instr.operand, Operand::I32(jump_offset));
    }
}
