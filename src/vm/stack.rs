//! Operand stack with typed pops. Type confusion or underflow only occurs
//! for modules that validation would reject, so those paths report
//! `Trap::InvalidModule`.

use crate::error::Trap;
use crate::model::{FuncAddr, Value};

#[derive(Debug, Default)]
pub struct ValueStack {
    stack: Vec<Value>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    #[inline]
    pub fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    #[inline]
    pub fn push_bool(&mut self, b: bool) {
        self.stack.push(Value::I32(b as i32));
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Value, Trap> {
        self.stack
            .pop()
            .ok_or(Trap::InvalidModule("operand stack underflow"))
    }

    pub fn pop_i32(&mut self) -> Result<i32, Trap> {
        match self.pop()? {
            Value::I32(v) => Ok(v),
            _ => Err(Trap::InvalidModule("expected i32 operand")),
        }
    }

    pub fn pop_i64(&mut self) -> Result<i64, Trap> {
        match self.pop()? {
            Value::I64(v) => Ok(v),
            _ => Err(Trap::InvalidModule("expected i64 operand")),
        }
    }

    pub fn pop_f32_bits(&mut self) -> Result<u32, Trap> {
        match self.pop()? {
            Value::F32(bits) => Ok(bits),
            _ => Err(Trap::InvalidModule("expected f32 operand")),
        }
    }

    pub fn pop_f64_bits(&mut self) -> Result<u64, Trap> {
        match self.pop()? {
            Value::F64(bits) => Ok(bits),
            _ => Err(Trap::InvalidModule("expected f64 operand")),
        }
    }

    pub fn pop_f32(&mut self) -> Result<f32, Trap> {
        self.pop_f32_bits().map(f32::from_bits)
    }

    pub fn pop_f64(&mut self) -> Result<f64, Trap> {
        self.pop_f64_bits().map(f64::from_bits)
    }

    pub fn pop_funcref(&mut self) -> Result<Option<FuncAddr>, Trap> {
        match self.pop()? {
            Value::FuncRef(r) => Ok(r),
            _ => Err(Trap::InvalidModule("expected funcref operand")),
        }
    }

    /// Restore the stack to a label's entry height while keeping the top
    /// `arity` values: the effect of branching out of a block.
    pub fn unwind_to(&mut self, height: usize, arity: usize) -> Result<(), Trap> {
        let len = self.stack.len();
        if len < height + arity {
            return Err(Trap::InvalidModule("operand stack underflow on branch"));
        }
        self.stack.drain(height..len - arity);
        Ok(())
    }
}
