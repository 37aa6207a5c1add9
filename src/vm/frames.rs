//! Call frame and the branch signal threaded through structured control
//! flow.

use std::sync::Arc;

use crate::model::Value;
use crate::runtime::ModuleInstance;

/// Per-invocation frame: the executing instance and the flat locals vector
/// (parameters first, declared locals zero-initialized after them).
#[derive(Debug)]
pub struct Frame {
    pub inst: Arc<ModuleInstance>,
    pub locals: Vec<Value>,
}

/// How an instruction sequence ended. `Branch(depth)` unwinds outward one
/// label at a time: the enclosing construct consumes depth 0 and re-raises
/// anything deeper after decrementing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Fell off the end of the sequence.
    Next,
    /// A `br`-family instruction targeting the label at this depth.
    Branch(u32),
    /// An explicit `return`; unwinds the whole call frame.
    Return,
}
