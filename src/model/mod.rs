//! Static module model: types, decoded instructions, and the module IR
//! produced by the binary decoder. Everything here is immutable after
//! decoding.

pub mod instr;
pub mod module;
pub mod types;

pub use instr::{BlockType, Expr, Instr, MemArg};
pub use module::{
    CodeBody, ConstExpr, DataSegment, ElementSegment, Global, LocalDecl, Module, SegmentMode,
};
pub use types::{
    Export, ExportDesc, FuncAddr, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc,
    Limits, MemIdx, MemoryType, RefType, TableIdx, TableType, TypeIdx, ValType, Value,
};
