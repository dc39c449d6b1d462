//! Engine error types
//!
//! Encoding and decoding fail hard: there are no retries and no partial
//! output. The one deliberate exception is module-scan errors during
//! reference resolution, which are swallowed by the resolver (an unrelated
//! object must not fail to serialize because a third-party module's lookup
//! misbehaves).

use ferry_runtime::RuntimeError;
use thiserror::Error;

/// Errors raised while encoding a value graph
#[derive(Debug, Error)]
pub enum EncodeError {
    /// No reference path, no value strategy, not a recognized dynamic-type
    /// or function shape
    #[error("Cannot serialize {type_name} '{name}'")]
    Unsupported {
        /// Type of the offending object
        type_name: &'static str,
        /// Best available name for the offending object
        name: String,
    },

    /// Coroutine functions are refused rather than partially captured
    #[error("Cannot serialize coroutine function '{0}'")]
    RefusedCoroutine(String),

    /// Write-mode streams are refused by policy
    #[error("Cannot serialize streams in write mode")]
    RefusedWriteStream,

    /// Streams must be open to capture their remaining content
    #[error("Cannot serialize closed streams")]
    ClosedStream,

    /// A singleton-kind class must be importable by reference
    #[error("Singleton class '{0}' is not importable from any loaded module")]
    UnresolvableSingleton(String),
}

/// Errors raised while reconstructing a value graph
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload does not start with the expected magic
    #[error("Invalid payload magic")]
    InvalidMagic,

    /// Payload written by an incompatible engine version
    #[error("Unsupported payload version {0}")]
    UnsupportedVersion(u32),

    /// Payload bytes do not match the recorded checksum
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum recorded in the header
        expected: u32,
        /// Checksum of the received payload
        actual: u32,
    },

    /// Truncated or malformed frame
    #[error("Frame error: {0}")]
    Frame(#[from] ferry_bytecode::DecodeError),

    /// Unknown wire tag
    #[error("Unknown wire tag {tag:#04x} at offset {offset}")]
    UnknownTag {
        /// The unrecognized tag byte
        tag: u8,
        /// Offset of the tag in the payload
        offset: usize,
    },

    /// Unknown constructor tag in a rebuild frame
    #[error("Unknown constructor tag {0:#04x}")]
    UnknownConstructor(u8),

    /// Unknown restore-procedure tag in a rebuild frame
    #[error("Unknown restore tag {0:#04x}")]
    UnknownRestore(u8),

    /// Memo slots must be allocated in stream order
    #[error("Memo id {got} out of order (expected {expected})")]
    MemoOutOfOrder {
        /// Next slot the decoder would allocate
        expected: u32,
        /// Slot id carried by the frame
        got: u32,
    },

    /// Reference to a memo slot that was never filled
    #[error("Memo id {0} not present")]
    MemoMissing(u32),

    /// A rebuild frame's arguments don't fit its constructor
    #[error("Malformed {ctor} frame: {detail}")]
    BadFrame {
        /// Constructor name
        ctor: &'static str,
        /// What was wrong
        detail: &'static str,
    },

    /// Tracking-id collision with an incompatible class shape
    #[error("Tracking id {id} already bound to an incompatible type")]
    TrackerConflict {
        /// Hex form of the colliding tracking id
        id: String,
    },

    /// A by-reference object's path does not resolve in this process
    #[error("Cannot import '{qualname}' from module '{module}'")]
    UnresolvableReference {
        /// Module the path starts in
        module: String,
        /// Dotted path inside the module
        qualname: String,
    },

    /// A native capsule names a native this process has not registered
    #[error("Native function '{module}.{name}' is not registered")]
    UnknownNative {
        /// Module key
        module: String,
        /// Name key
        name: String,
    },

    /// Payload contains bytes after the root value
    #[error("{0} trailing bytes after root value")]
    TrailingBytes(usize),

    /// Runtime failure while rebuilding objects
    #[error("Runtime error during reconstruction: {0}")]
    Runtime(#[from] RuntimeError),
}
