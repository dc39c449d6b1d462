//! Payload inspection
//!
//! Structural walk over an encoded payload without reconstructing any
//! objects: counts frames per constructor and reports memo traffic. Used by
//! pool diagnostics to answer "what is actually inside this capsule?"
//! without needing the defining modules loaded.

use crate::error::DecodeError;
use crate::reduce::Ctor;
use crate::wire::{tag, MAGIC, VERSION};
use ferry_bytecode::BytecodeReader;
use serde::Serialize;
use std::collections::BTreeMap;

/// What an encoded payload contains
#[derive(Debug, Default, Serialize)]
pub struct PayloadSummary {
    /// Payload format version
    pub version: u32,
    /// Total payload size in bytes (header included)
    pub total_bytes: usize,
    /// Atom frames (null, bool, int, float, str, bytes, sentinel)
    pub atoms: usize,
    /// Container frames (lists, dicts, instances)
    pub containers: usize,
    /// By-name (reference) frames
    pub references: usize,
    /// Rebuild frames per constructor name
    pub rebuilds: BTreeMap<String, usize>,
    /// Memo-slot reuse count
    pub memo_hits: usize,
}

impl PayloadSummary {
    /// JSON rendering, for log lines and tooling
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Inspect a payload without reconstructing it
pub fn inspect(bytes: &[u8]) -> Result<PayloadSummary, DecodeError> {
    let mut reader = BytecodeReader::new(bytes);
    let magic = reader.read_bytes(4)?;
    if magic != MAGIC {
        return Err(DecodeError::InvalidMagic);
    }
    let version = reader.read_u32()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let _checksum = reader.read_u32()?;

    let mut summary = PayloadSummary {
        version,
        total_bytes: bytes.len(),
        ..PayloadSummary::default()
    };
    walk(&mut reader, &mut summary)?;
    Ok(summary)
}

fn walk(reader: &mut BytecodeReader<'_>, summary: &mut PayloadSummary) -> Result<(), DecodeError> {
    let offset = reader.position();
    let tag_byte = reader.read_u8()?;
    match tag_byte {
        tag::NULL | tag::TRUE | tag::FALSE | tag::EMPTY_SENTINEL => {
            summary.atoms += 1;
        }
        tag::INT => {
            summary.atoms += 1;
            reader.read_i64()?;
        }
        tag::FLOAT => {
            summary.atoms += 1;
            reader.read_f64()?;
        }
        tag::STR => {
            summary.atoms += 1;
            reader.read_string()?;
        }
        tag::BYTES => {
            summary.atoms += 1;
            let len = reader.read_u32()? as usize;
            reader.read_bytes(len)?;
        }
        tag::LIST => {
            summary.containers += 1;
            skip_memo_put(reader)?;
            let count = reader.read_u32()?;
            for _ in 0..count {
                walk(reader, summary)?;
            }
        }
        tag::DICT => {
            summary.containers += 1;
            skip_memo_put(reader)?;
            let count = reader.read_u32()?;
            for _ in 0..count {
                reader.read_string()?;
                walk(reader, summary)?;
            }
        }
        tag::INSTANCE => {
            summary.containers += 1;
            walk(reader, summary)?; // class
            skip_memo_put(reader)?;
            let count = reader.read_u32()?;
            for _ in 0..count {
                reader.read_string()?;
                walk(reader, summary)?;
            }
        }
        tag::MEMO_GET => {
            summary.memo_hits += 1;
            reader.read_u32()?;
        }
        tag::REBUILD => {
            let ctor_byte = reader.read_u8()?;
            let ctor =
                Ctor::from_u8(ctor_byte).ok_or(DecodeError::UnknownConstructor(ctor_byte))?;
            *summary.rebuilds.entry(ctor.name().to_string()).or_default() += 1;
            let arg_count = reader.read_u32()?;
            for _ in 0..arg_count {
                walk(reader, summary)?;
            }
            skip_memo_put(reader)?;
            if reader.read_u8()? != 0 {
                reader.read_u8()?; // restore tag
                walk(reader, summary)?;
            }
        }
        tag::BY_NAME => {
            summary.references += 1;
            reader.read_string()?;
            reader.read_string()?;
            skip_memo_put(reader)?;
        }
        other => return Err(DecodeError::UnknownTag { tag: other, offset }),
    }
    Ok(())
}

fn skip_memo_put(reader: &mut BytecodeReader<'_>) -> Result<(), DecodeError> {
    let offset = reader.position();
    let tag_byte = reader.read_u8()?;
    if tag_byte != tag::MEMO_PUT {
        return Err(DecodeError::UnknownTag {
            tag: tag_byte,
            offset,
        });
    }
    reader.read_u32()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Engine;
    use ferry_runtime::{ModuleRegistry, Value};

    #[test]
    fn test_inspect_counts_frames() {
        let engine = Engine::isolated(ModuleRegistry::new());
        let shared = Value::list(vec![Value::Int(1)]);
        let value = Value::list(vec![shared.clone(), shared, Value::str("x")]);
        let bytes = engine.encode(&value).unwrap();

        let summary = inspect(&bytes).unwrap();
        assert_eq!(summary.version, VERSION);
        assert_eq!(summary.containers, 2); // outer + inner list, shared once
        assert_eq!(summary.memo_hits, 1);
        assert_eq!(summary.atoms, 2); // the int and the string
        assert!(summary.rebuilds.is_empty());
        assert!(summary.to_json().contains("\"memo_hits\":1"));
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(matches!(inspect(b"nope"), Err(DecodeError::Frame(_)) | Err(DecodeError::InvalidMagic)));
    }
}
