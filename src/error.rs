//! Crate-level error types: decoding, linking, and execution traps.

use thiserror::Error;

/// What went wrong while reading the binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("bad magic header")]
    BadMagic,
    #[error("unsupported version")]
    BadVersion,
    #[error("unknown section id")]
    BadSectionId,
    #[error("malformed LEB128 integer")]
    BadLeb,
    #[error("invalid value type")]
    BadValueType,
    #[error("invalid or unsupported opcode")]
    BadOpcode,
    #[error("invalid UTF-8 in name")]
    BadUtf8,
    #[error("duplicate section")]
    DuplicateSection,
    #[error("section payload length mismatch")]
    OversizedSection,
    #[error("malformed section contents")]
    MalformedSection,
}

/// Decode failure with the byte offset at which it was detected.
/// No partially built module escapes a failed decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub offset: usize,
}

impl DecodeError {
    pub(crate) fn new(kind: DecodeErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

/// Instantiation failure: unresolved or mismatched imports, malformed module
/// structure noticed while wiring the instance, out-of-bounds active
/// segments, or a trapping start function.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("missing import: {module}.{name}")]
    MissingImport { module: String, name: String },

    #[error("import kind mismatch: {module}.{name}")]
    KindMismatch { module: String, name: String },

    #[error("signature mismatch ({context})")]
    SignatureMismatch { context: &'static str },

    #[error("limits mismatch: {module}.{name}")]
    LimitsMismatch { module: String, name: String },

    #[error("global mutability mismatch: {module}.{name}")]
    MutabilityMismatch { module: String, name: String },

    #[error("element segment initialization out of bounds")]
    ElemOutOfBounds,

    #[error("data segment initialization out of bounds")]
    DataOutOfBounds,

    #[error("trap while running start function")]
    StartTrapped(#[source] Trap),

    #[error("export not found: {0}")]
    MissingExport(String),

    #[error("export is not a function: {0}")]
    NotAFunction(String),

    #[error("malformed module: {0}")]
    Malformed(&'static str),
}

/// Abrupt termination of an invocation. The owning instance stays usable
/// for later invokes.
#[derive(Debug, Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,
    #[error("out of bounds memory access")]
    OutOfBoundsMemory,
    #[error("out of bounds table access")]
    OutOfBoundsTable,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,
    #[error("undefined table element")]
    UndefinedElement,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("call stack exhausted")]
    StackOverflow,
    #[error("host error")]
    Host(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Raised when executing a module that structural validation would have
    /// rejected (stack underflow, type-confused operands, bad indices).
    #[error("invalid module: {0}")]
    InvalidModule(&'static str),
}

impl Trap {
    /// Stable identifier used by external harnesses to assert on trap kinds.
    pub fn name(&self) -> &'static str {
        match self {
            Trap::Unreachable => "Unreachable",
            Trap::OutOfBoundsMemory => "OutOfBoundsMemory",
            Trap::OutOfBoundsTable => "OutOfBoundsTable",
            Trap::DivideByZero => "DivideByZero",
            Trap::IntegerOverflow => "IntegerOverflow",
            Trap::InvalidConversionToInteger => "InvalidConversionToInteger",
            Trap::UndefinedElement => "UndefinedElement",
            Trap::IndirectCallTypeMismatch => "IndirectCallTypeMismatch",
            Trap::StackOverflow => "StackOverflow",
            Trap::Host(_) => "Host",
            Trap::InvalidModule(_) => "InvalidModule",
        }
    }

    /// Wrap an arbitrary host-side error into a trap.
    pub fn host<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Trap::Host(err.into())
    }
}

/// Umbrella error for the engine facade.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Trap(#[from] Trap),
}
