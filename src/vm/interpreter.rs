//! The evaluation core. Walks the decoded expression tree of a function
//! body against an operand stack. Structured control flow is executed by
//! recursion: every block entry records the stack height and result arity
//! of its label, and `br` unwinds through `Flow::Branch` until the target
//! label consumes it. Calls recurse through the executor under an explicit
//! depth bound.

use std::sync::Arc;

use crate::error::Trap;
use crate::model::{BlockType, Expr, FuncAddr, FuncType, Instr, Value};
use crate::runtime::{FuncInstance, MemAddr, MemoryInstance, Store};

use super::frames::{Flow, Frame};
use super::numeric as num;
use super::stack::ValueStack;

/// Run the function at `func_addr` with the given arguments. The caller is
/// responsible for argument arity/type checking at the public boundary;
/// internal call sites pop exactly what the callee's signature demands.
pub fn invoke(
    store: &mut Store,
    func_addr: FuncAddr,
    args: &[Value],
    max_call_depth: usize,
) -> Result<Option<Value>, Trap> {
    let mut exec = Executor { store, depth: 0, max_depth: max_call_depth };
    exec.call(func_addr, args.to_vec())
}

struct Executor<'s> {
    store: &'s mut Store,
    depth: usize,
    max_depth: usize,
}

/// Effective address: i32 base reinterpreted unsigned, widened, plus the
/// u32 immediate offset. Cannot wrap in u64.
#[inline]
fn ea(base: i32, offset: u32) -> u64 {
    base as u32 as u64 + offset as u64
}

impl Executor<'_> {
    fn call(&mut self, func_addr: FuncAddr, args: Vec<Value>) -> Result<Option<Value>, Trap> {
        if self.depth >= self.max_depth {
            return Err(Trap::StackOverflow);
        }
        self.depth += 1;
        let result = self.call_inner(func_addr, args);
        self.depth -= 1;
        result
    }

    fn call_inner(&mut self, func_addr: FuncAddr, args: Vec<Value>) -> Result<Option<Value>, Trap> {
        let func = self
            .store
            .get_func(func_addr)
            .cloned()
            .ok_or(Trap::InvalidModule("bad function address"))?;

        match func {
            FuncInstance::Host { ty, f } => {
                if ty.params.len() != args.len() {
                    return Err(Trap::InvalidModule("host call arity"));
                }
                let ret = (f.as_ref())(&args)?;
                check_host_return(&ty, ret)
            }
            FuncInstance::Wasm { type_idx, def_index, module } => {
                let inst = self
                    .store
                    .instance(module)
                    .ok_or(Trap::InvalidModule("bad module index"))?;
                let fty = inst
                    .func_type(type_idx)
                    .ok_or(Trap::InvalidModule("bad type index"))?
                    .clone();
                if fty.params.len() != args.len() {
                    return Err(Trap::InvalidModule("call arity"));
                }
                if fty.results.len() > 1 {
                    return Err(Trap::InvalidModule("multi-value results unsupported"));
                }
                let body = inst
                    .code_body(def_index)
                    .ok_or(Trap::InvalidModule("missing code body"))?;

                let mut locals = args;
                locals.reserve(body.local_count());
                for decl in &body.locals {
                    for _ in 0..decl.count {
                        locals.push(Value::default_for(decl.val_type));
                    }
                }

                let mut frame = Frame { inst: Arc::clone(&inst), locals };
                let mut stack = ValueStack::new();
                // The function body is the outermost label; any branch that
                // reaches it, and the implicit end, both mean "return".
                let _ = self.exec_expr(&mut frame, &mut stack, &body.expr)?;

                match fty.results.first() {
                    None => Ok(None),
                    Some(&rt) => {
                        let v = stack.pop()?;
                        if v.ty() != rt {
                            return Err(Trap::InvalidModule("result type"));
                        }
                        Ok(Some(v))
                    }
                }
            }
        }
    }

    /// The memory at index 0 of the executing instance.
    fn mem_addr(&self, frame: &Frame) -> Result<MemAddr, Trap> {
        frame
            .inst
            .memories
            .first()
            .copied()
            .ok_or(Trap::InvalidModule("module has no memory"))
    }

    fn memory<'a>(&'a mut self, frame: &Frame) -> Result<&'a mut MemoryInstance, Trap> {
        let addr = self.mem_addr(frame)?;
        self.store
            .get_memory_mut(addr)
            .ok_or(Trap::InvalidModule("bad memory address"))
    }

    /// Number of results the label of a block with this type carries.
    fn block_arity(&self, frame: &Frame, ty: BlockType) -> Result<usize, Trap> {
        match ty {
            BlockType::Empty => Ok(0),
            BlockType::Value(_) => Ok(1),
            BlockType::Type(idx) => {
                let ft = frame
                    .inst
                    .func_type(idx)
                    .ok_or(Trap::InvalidModule("bad block type index"))?;
                if !ft.params.is_empty() || ft.results.len() > 1 {
                    return Err(Trap::InvalidModule("unsupported block signature"));
                }
                Ok(ft.results.len())
            }
        }
    }

    /// Execute a block/loop/if body under a fresh label.
    fn enter_block(
        &mut self,
        frame: &mut Frame,
        stack: &mut ValueStack,
        body: &Expr,
        arity: usize,
        is_loop: bool,
    ) -> Result<Flow, Trap> {
        let entry = stack.len();
        loop {
            match self.exec_expr(frame, stack, body)? {
                Flow::Next => {
                    stack.unwind_to(entry, arity)?;
                    return Ok(Flow::Next);
                }
                Flow::Branch(0) => {
                    if is_loop {
                        // Branching to a loop label re-enters the loop; its
                        // label carries no values.
                        stack.unwind_to(entry, 0)?;
                        continue;
                    }
                    stack.unwind_to(entry, arity)?;
                    return Ok(Flow::Next);
                }
                Flow::Branch(n) => return Ok(Flow::Branch(n - 1)),
                Flow::Return => return Ok(Flow::Return),
            }
        }
    }

    /// Pop arguments per the callee signature and dispatch the call.
    fn do_call(&mut self, stack: &mut ValueStack, func_addr: FuncAddr) -> Result<(), Trap> {
        let fty = self.store.func_type(func_addr)?;
        let mut args = Vec::with_capacity(fty.params.len());
        for _ in 0..fty.params.len() {
            args.push(stack.pop()?);
        }
        args.reverse();
        for (v, t) in args.iter().zip(&fty.params) {
            if v.ty() != *t {
                return Err(Trap::InvalidModule("call argument type"));
            }
        }
        if let Some(v) = self.call(func_addr, args)? {
            stack.push(v);
        }
        Ok(())
    }

    fn exec_expr(
        &mut self,
        frame: &mut Frame,
        stack: &mut ValueStack,
        expr: &Expr,
    ) -> Result<Flow, Trap> {
        for instr in &expr.instrs {
            match instr {
                /* ----- control ----- */
                Instr::Unreachable => return Err(Trap::Unreachable),
                Instr::Nop => {}

                Instr::Block { ty, body } => {
                    let arity = self.block_arity(frame, *ty)?;
                    match self.enter_block(frame, stack, body, arity, false)? {
                        Flow::Next => {}
                        flow => return Ok(flow),
                    }
                }
                Instr::Loop { ty, body } => {
                    let arity = self.block_arity(frame, *ty)?;
                    match self.enter_block(frame, stack, body, arity, true)? {
                        Flow::Next => {}
                        flow => return Ok(flow),
                    }
                }
                Instr::If { ty, then_body, else_body } => {
                    let arity = self.block_arity(frame, *ty)?;
                    let cond = stack.pop_i32()?;
                    let taken = if cond != 0 {
                        Some(then_body)
                    } else {
                        else_body.as_ref()
                    };
                    if let Some(body) = taken {
                        match self.enter_block(frame, stack, body, arity, false)? {
                            Flow::Next => {}
                            flow => return Ok(flow),
                        }
                    }
                }

                Instr::Br(depth) => return Ok(Flow::Branch(*depth)),
                Instr::BrIf(depth) => {
                    if stack.pop_i32()? != 0 {
                        return Ok(Flow::Branch(*depth));
                    }
                }
                Instr::BrTable { targets, default } => {
                    let i = stack.pop_i32()? as u32 as usize;
                    let depth = targets.get(i).copied().unwrap_or(*default);
                    return Ok(Flow::Branch(depth));
                }
                Instr::Return => return Ok(Flow::Return),

                Instr::Call(idx) => {
                    let addr = *frame
                        .inst
                        .funcs
                        .get(*idx as usize)
                        .ok_or(Trap::InvalidModule("call index out of range"))?;
                    self.do_call(stack, addr)?;
                }
                Instr::CallIndirect { type_idx, table } => {
                    let taddr = *frame
                        .inst
                        .tables
                        .get(*table as usize)
                        .ok_or(Trap::InvalidModule("module has no table"))?;
                    let i = stack.pop_i32()? as u32;
                    let slot = self
                        .store
                        .get_table(taddr)
                        .ok_or(Trap::InvalidModule("bad table address"))?
                        .get(i)?;
                    let addr = slot.ok_or(Trap::UndefinedElement)?;
                    let expected: FuncType = frame
                        .inst
                        .func_type(*type_idx)
                        .ok_or(Trap::InvalidModule("bad type index"))?
                        .clone();
                    let actual = self.store.func_type(addr)?;
                    if actual != expected {
                        return Err(Trap::IndirectCallTypeMismatch);
                    }
                    self.do_call(stack, addr)?;
                }

                /* ----- parametric ----- */
                Instr::Drop => {
                    stack.pop()?;
                }
                Instr::Select => {
                    let cond = stack.pop_i32()?;
                    let v2 = stack.pop()?;
                    let v1 = stack.pop()?;
                    if v1.ty() != v2.ty() {
                        return Err(Trap::InvalidModule("select operand types differ"));
                    }
                    stack.push(if cond != 0 { v1 } else { v2 });
                }

                /* ----- variables ----- */
                Instr::LocalGet(idx) => {
                    let v = *frame
                        .locals
                        .get(*idx as usize)
                        .ok_or(Trap::InvalidModule("local index out of range"))?;
                    stack.push(v);
                }
                Instr::LocalSet(idx) => {
                    let v = stack.pop()?;
                    let slot = frame
                        .locals
                        .get_mut(*idx as usize)
                        .ok_or(Trap::InvalidModule("local index out of range"))?;
                    *slot = v;
                }
                Instr::LocalTee(idx) => {
                    let v = stack.pop()?;
                    let slot = frame
                        .locals
                        .get_mut(*idx as usize)
                        .ok_or(Trap::InvalidModule("local index out of range"))?;
                    *slot = v;
                    stack.push(v);
                }
                Instr::GlobalGet(idx) => {
                    let addr = *frame
                        .inst
                        .globals
                        .get(*idx as usize)
                        .ok_or(Trap::InvalidModule("global index out of range"))?;
                    let g = self
                        .store
                        .get_global(addr)
                        .ok_or(Trap::InvalidModule("bad global address"))?;
                    stack.push(g.get());
                }
                Instr::GlobalSet(idx) => {
                    let v = stack.pop()?;
                    let addr = *frame
                        .inst
                        .globals
                        .get(*idx as usize)
                        .ok_or(Trap::InvalidModule("global index out of range"))?;
                    let g = self
                        .store
                        .get_global_mut(addr)
                        .ok_or(Trap::InvalidModule("bad global address"))?;
                    if !g.ty().mutable {
                        // Unreachable in any module that passes validation.
                        return Err(Trap::Unreachable);
                    }
                    g.set(v)
                        .map_err(|_| Trap::InvalidModule("global value type"))?;
                }

                /* ----- memory loads ----- */
                Instr::I32Load(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u32(a)?;
                    stack.push(Value::I32(v as i32));
                }
                Instr::I64Load(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u64(a)?;
                    stack.push(Value::I64(v as i64));
                }
                Instr::F32Load(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let bits = self.memory(frame)?.load_u32(a)?;
                    stack.push(Value::F32(bits));
                }
                Instr::F64Load(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let bits = self.memory(frame)?.load_u64(a)?;
                    stack.push(Value::F64(bits));
                }
                Instr::I32Load8S(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u8(a)?;
                    stack.push(Value::I32(v as i8 as i32));
                }
                Instr::I32Load8U(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u8(a)?;
                    stack.push(Value::I32(v as i32));
                }
                Instr::I32Load16S(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u16(a)?;
                    stack.push(Value::I32(v as i16 as i32));
                }
                Instr::I32Load16U(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u16(a)?;
                    stack.push(Value::I32(v as i32));
                }
                Instr::I64Load8S(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u8(a)?;
                    stack.push(Value::I64(v as i8 as i64));
                }
                Instr::I64Load8U(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u8(a)?;
                    stack.push(Value::I64(v as i64));
                }
                Instr::I64Load16S(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u16(a)?;
                    stack.push(Value::I64(v as i16 as i64));
                }
                Instr::I64Load16U(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u16(a)?;
                    stack.push(Value::I64(v as i64));
                }
                Instr::I64Load32S(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u32(a)?;
                    stack.push(Value::I64(v as i32 as i64));
                }
                Instr::I64Load32U(m) => {
                    let a = ea(stack.pop_i32()?, m.offset);
                    let v = self.memory(frame)?.load_u32(a)?;
                    stack.push(Value::I64(v as i64));
                }

                /* ----- memory stores ----- */
                Instr::I32Store(m) => {
                    let v = stack.pop_i32()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u32(a, v as u32)?;
                }
                Instr::I64Store(m) => {
                    let v = stack.pop_i64()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u64(a, v as u64)?;
                }
                Instr::F32Store(m) => {
                    let bits = stack.pop_f32_bits()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u32(a, bits)?;
                }
                Instr::F64Store(m) => {
                    let bits = stack.pop_f64_bits()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u64(a, bits)?;
                }
                Instr::I32Store8(m) => {
                    let v = stack.pop_i32()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u8(a, v as u8)?;
                }
                Instr::I32Store16(m) => {
                    let v = stack.pop_i32()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u16(a, v as u16)?;
                }
                Instr::I64Store8(m) => {
                    let v = stack.pop_i64()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u8(a, v as u8)?;
                }
                Instr::I64Store16(m) => {
                    let v = stack.pop_i64()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u16(a, v as u16)?;
                }
                Instr::I64Store32(m) => {
                    let v = stack.pop_i64()?;
                    let a = ea(stack.pop_i32()?, m.offset);
                    self.memory(frame)?.store_u32(a, v as u32)?;
                }

                /* ----- memory management ----- */
                Instr::MemorySize => {
                    let pages = self.memory(frame)?.size_pages();
                    stack.push(Value::I32(pages as i32));
                }
                Instr::MemoryGrow => {
                    let delta = stack.pop_i32()? as u32;
                    let m = self.memory(frame)?;
                    match m.grow(delta) {
                        Some(prev) => stack.push(Value::I32(prev as i32)),
                        None => stack.push(Value::I32(-1)),
                    }
                }
                Instr::MemoryInit(data_idx) => {
                    let len = stack.pop_i32()? as u32 as u64;
                    let src = stack.pop_i32()? as u32 as u64;
                    let dest = stack.pop_i32()? as u32 as u64;
                    let mem = self.mem_addr(frame)?;
                    let data = *frame
                        .inst
                        .data_segments
                        .get(*data_idx as usize)
                        .ok_or(Trap::InvalidModule("data index out of range"))?;
                    self.store.memory_init(mem, data, dest, src, len)?;
                }
                Instr::DataDrop(data_idx) => {
                    let data = *frame
                        .inst
                        .data_segments
                        .get(*data_idx as usize)
                        .ok_or(Trap::InvalidModule("data index out of range"))?;
                    self.store.data_drop(data)?;
                }
                Instr::MemoryCopy => {
                    let len = stack.pop_i32()? as u32 as u64;
                    let src = stack.pop_i32()? as u32 as u64;
                    let dest = stack.pop_i32()? as u32 as u64;
                    self.memory(frame)?.copy_within(dest, src, len)?;
                }
                Instr::MemoryFill => {
                    let len = stack.pop_i32()? as u32 as u64;
                    let val = stack.pop_i32()? as u8;
                    let dest = stack.pop_i32()? as u32 as u64;
                    self.memory(frame)?.fill(dest, val, len)?;
                }

                /* ----- bulk table ----- */
                Instr::TableInit { elem, table } => {
                    let len = stack.pop_i32()? as u32;
                    let src = stack.pop_i32()? as u32;
                    let dest = stack.pop_i32()? as u32;
                    let taddr = *frame
                        .inst
                        .tables
                        .get(*table as usize)
                        .ok_or(Trap::InvalidModule("table index out of range"))?;
                    let eaddr = *frame
                        .inst
                        .elem_segments
                        .get(*elem as usize)
                        .ok_or(Trap::InvalidModule("element index out of range"))?;
                    self.store.table_init(taddr, eaddr, dest, src, len)?;
                }
                Instr::ElemDrop(elem) => {
                    let eaddr = *frame
                        .inst
                        .elem_segments
                        .get(*elem as usize)
                        .ok_or(Trap::InvalidModule("element index out of range"))?;
                    self.store.elem_drop(eaddr)?;
                }
                Instr::TableCopy { dst, src } => {
                    let len = stack.pop_i32()? as u32;
                    let s = stack.pop_i32()? as u32;
                    let d = stack.pop_i32()? as u32;
                    let daddr = *frame
                        .inst
                        .tables
                        .get(*dst as usize)
                        .ok_or(Trap::InvalidModule("table index out of range"))?;
                    let saddr = *frame
                        .inst
                        .tables
                        .get(*src as usize)
                        .ok_or(Trap::InvalidModule("table index out of range"))?;
                    self.store.table_copy(daddr, saddr, d, s, len)?;
                }

                /* ----- constants ----- */
                Instr::I32Const(v) => stack.push(Value::I32(*v)),
                Instr::I64Const(v) => stack.push(Value::I64(*v)),
                Instr::F32Const(bits) => stack.push(Value::F32(*bits)),
                Instr::F64Const(bits) => stack.push(Value::F64(*bits)),

                /* ----- i32 comparison ----- */
                Instr::I32Eqz => {
                    let v = stack.pop_i32()?;
                    stack.push_bool(v == 0);
                }
                Instr::I32Eq => num::cmp_i32(stack, |a, b| a == b)?,
                Instr::I32Ne => num::cmp_i32(stack, |a, b| a != b)?,
                Instr::I32LtS => num::cmp_i32(stack, |a, b| a < b)?,
                Instr::I32LtU => num::cmp_u32(stack, |a, b| a < b)?,
                Instr::I32GtS => num::cmp_i32(stack, |a, b| a > b)?,
                Instr::I32GtU => num::cmp_u32(stack, |a, b| a > b)?,
                Instr::I32LeS => num::cmp_i32(stack, |a, b| a <= b)?,
                Instr::I32LeU => num::cmp_u32(stack, |a, b| a <= b)?,
                Instr::I32GeS => num::cmp_i32(stack, |a, b| a >= b)?,
                Instr::I32GeU => num::cmp_u32(stack, |a, b| a >= b)?,

                /* ----- i64 comparison ----- */
                Instr::I64Eqz => {
                    let v = stack.pop_i64()?;
                    stack.push_bool(v == 0);
                }
                Instr::I64Eq => num::cmp_i64(stack, |a, b| a == b)?,
                Instr::I64Ne => num::cmp_i64(stack, |a, b| a != b)?,
                Instr::I64LtS => num::cmp_i64(stack, |a, b| a < b)?,
                Instr::I64LtU => num::cmp_u64(stack, |a, b| a < b)?,
                Instr::I64GtS => num::cmp_i64(stack, |a, b| a > b)?,
                Instr::I64GtU => num::cmp_u64(stack, |a, b| a > b)?,
                Instr::I64LeS => num::cmp_i64(stack, |a, b| a <= b)?,
                Instr::I64LeU => num::cmp_u64(stack, |a, b| a <= b)?,
                Instr::I64GeS => num::cmp_i64(stack, |a, b| a >= b)?,
                Instr::I64GeU => num::cmp_u64(stack, |a, b| a >= b)?,

                /* ----- float comparison ----- */
                Instr::F32Eq => num::cmp_f32(stack, |a, b| a == b)?,
                Instr::F32Ne => num::cmp_f32(stack, |a, b| a != b)?,
                Instr::F32Lt => num::cmp_f32(stack, |a, b| a < b)?,
                Instr::F32Gt => num::cmp_f32(stack, |a, b| a > b)?,
                Instr::F32Le => num::cmp_f32(stack, |a, b| a <= b)?,
                Instr::F32Ge => num::cmp_f32(stack, |a, b| a >= b)?,
                Instr::F64Eq => num::cmp_f64(stack, |a, b| a == b)?,
                Instr::F64Ne => num::cmp_f64(stack, |a, b| a != b)?,
                Instr::F64Lt => num::cmp_f64(stack, |a, b| a < b)?,
                Instr::F64Gt => num::cmp_f64(stack, |a, b| a > b)?,
                Instr::F64Le => num::cmp_f64(stack, |a, b| a <= b)?,
                Instr::F64Ge => num::cmp_f64(stack, |a, b| a >= b)?,

                /* ----- i32 arithmetic ----- */
                Instr::I32Clz => num::unop_i32(stack, |v| v.leading_zeros() as i32)?,
                Instr::I32Ctz => num::unop_i32(stack, |v| v.trailing_zeros() as i32)?,
                Instr::I32Popcnt => num::unop_i32(stack, |v| v.count_ones() as i32)?,
                Instr::I32Add => num::binop_i32(stack, |a, b| Ok(a.wrapping_add(b)))?,
                Instr::I32Sub => num::binop_i32(stack, |a, b| Ok(a.wrapping_sub(b)))?,
                Instr::I32Mul => num::binop_i32(stack, |a, b| Ok(a.wrapping_mul(b)))?,
                Instr::I32DivS => num::binop_i32(stack, num::div_s_i32)?,
                Instr::I32DivU => num::binop_i32(stack, num::div_u_i32)?,
                Instr::I32RemS => num::binop_i32(stack, num::rem_s_i32)?,
                Instr::I32RemU => num::binop_i32(stack, num::rem_u_i32)?,
                Instr::I32And => num::binop_i32(stack, |a, b| Ok(a & b))?,
                Instr::I32Or => num::binop_i32(stack, |a, b| Ok(a | b))?,
                Instr::I32Xor => num::binop_i32(stack, |a, b| Ok(a ^ b))?,
                Instr::I32Shl => num::binop_i32(stack, |a, b| Ok(a.wrapping_shl(b as u32)))?,
                Instr::I32ShrS => num::binop_i32(stack, |a, b| Ok(a.wrapping_shr(b as u32)))?,
                Instr::I32ShrU => {
                    num::binop_i32(stack, |a, b| Ok((a as u32).wrapping_shr(b as u32) as i32))?
                }
                Instr::I32Rotl => num::binop_i32(stack, |a, b| Ok(a.rotate_left(b as u32 % 32)))?,
                Instr::I32Rotr => num::binop_i32(stack, |a, b| Ok(a.rotate_right(b as u32 % 32)))?,

                /* ----- i64 arithmetic ----- */
                Instr::I64Clz => num::unop_i64(stack, |v| v.leading_zeros() as i64)?,
                Instr::I64Ctz => num::unop_i64(stack, |v| v.trailing_zeros() as i64)?,
                Instr::I64Popcnt => num::unop_i64(stack, |v| v.count_ones() as i64)?,
                Instr::I64Add => num::binop_i64(stack, |a, b| Ok(a.wrapping_add(b)))?,
                Instr::I64Sub => num::binop_i64(stack, |a, b| Ok(a.wrapping_sub(b)))?,
                Instr::I64Mul => num::binop_i64(stack, |a, b| Ok(a.wrapping_mul(b)))?,
                Instr::I64DivS => num::binop_i64(stack, num::div_s_i64)?,
                Instr::I64DivU => num::binop_i64(stack, num::div_u_i64)?,
                Instr::I64RemS => num::binop_i64(stack, num::rem_s_i64)?,
                Instr::I64RemU => num::binop_i64(stack, num::rem_u_i64)?,
                Instr::I64And => num::binop_i64(stack, |a, b| Ok(a & b))?,
                Instr::I64Or => num::binop_i64(stack, |a, b| Ok(a | b))?,
                Instr::I64Xor => num::binop_i64(stack, |a, b| Ok(a ^ b))?,
                Instr::I64Shl => num::binop_i64(stack, |a, b| Ok(a.wrapping_shl(b as u32)))?,
                Instr::I64ShrS => num::binop_i64(stack, |a, b| Ok(a.wrapping_shr(b as u32)))?,
                Instr::I64ShrU => {
                    num::binop_i64(stack, |a, b| Ok((a as u64).wrapping_shr(b as u32) as i64))?
                }
                Instr::I64Rotl => {
                    num::binop_i64(stack, |a, b| Ok(a.rotate_left(b as u64 as u32 % 64)))?
                }
                Instr::I64Rotr => {
                    num::binop_i64(stack, |a, b| Ok(a.rotate_right(b as u64 as u32 % 64)))?
                }

                /* ----- f32 arithmetic ----- */
                Instr::F32Abs => num::unop_f32(stack, f32::abs)?,
                Instr::F32Neg => num::unop_f32(stack, |v| -v)?,
                Instr::F32Ceil => num::unop_f32(stack, f32::ceil)?,
                Instr::F32Floor => num::unop_f32(stack, f32::floor)?,
                Instr::F32Trunc => num::unop_f32(stack, f32::trunc)?,
                Instr::F32Nearest => num::unop_f32(stack, num::nearest_f32)?,
                Instr::F32Sqrt => num::unop_f32(stack, f32::sqrt)?,
                Instr::F32Add => num::binop_f32(stack, |a, b| a + b)?,
                Instr::F32Sub => num::binop_f32(stack, |a, b| a - b)?,
                Instr::F32Mul => num::binop_f32(stack, |a, b| a * b)?,
                Instr::F32Div => num::binop_f32(stack, |a, b| a / b)?,
                Instr::F32Min => num::binop_f32(stack, num::fmin_f32)?,
                Instr::F32Max => num::binop_f32(stack, num::fmax_f32)?,
                Instr::F32Copysign => num::binop_f32(stack, f32::copysign)?,

                /* ----- f64 arithmetic ----- */
                Instr::F64Abs => num::unop_f64(stack, f64::abs)?,
                Instr::F64Neg => num::unop_f64(stack, |v| -v)?,
                Instr::F64Ceil => num::unop_f64(stack, f64::ceil)?,
                Instr::F64Floor => num::unop_f64(stack, f64::floor)?,
                Instr::F64Trunc => num::unop_f64(stack, f64::trunc)?,
                Instr::F64Nearest => num::unop_f64(stack, num::nearest_f64)?,
                Instr::F64Sqrt => num::unop_f64(stack, f64::sqrt)?,
                Instr::F64Add => num::binop_f64(stack, |a, b| a + b)?,
                Instr::F64Sub => num::binop_f64(stack, |a, b| a - b)?,
                Instr::F64Mul => num::binop_f64(stack, |a, b| a * b)?,
                Instr::F64Div => num::binop_f64(stack, |a, b| a / b)?,
                Instr::F64Min => num::binop_f64(stack, num::fmin_f64)?,
                Instr::F64Max => num::binop_f64(stack, num::fmax_f64)?,
                Instr::F64Copysign => num::binop_f64(stack, f64::copysign)?,

                /* ----- conversions ----- */
                Instr::I32WrapI64 => {
                    let v = stack.pop_i64()?;
                    stack.push(Value::I32(v as i32));
                }
                Instr::I32TruncF32S => {
                    let x = stack.pop_f32()?;
                    stack.push(Value::I32(num::trunc_f32_to_i32_s(x)?));
                }
                Instr::I32TruncF32U => {
                    let x = stack.pop_f32()?;
                    stack.push(Value::I32(num::trunc_f32_to_i32_u(x)?));
                }
                Instr::I32TruncF64S => {
                    let x = stack.pop_f64()?;
                    stack.push(Value::I32(num::trunc_f64_to_i32_s(x)?));
                }
                Instr::I32TruncF64U => {
                    let x = stack.pop_f64()?;
                    stack.push(Value::I32(num::trunc_f64_to_i32_u(x)?));
                }
                Instr::I64ExtendI32S => {
                    let v = stack.pop_i32()?;
                    stack.push(Value::I64(v as i64));
                }
                Instr::I64ExtendI32U => {
                    let v = stack.pop_i32()?;
                    stack.push(Value::I64(v as u32 as i64));
                }
                Instr::I64TruncF32S => {
                    let x = stack.pop_f32()?;
                    stack.push(Value::I64(num::trunc_f32_to_i64_s(x)?));
                }
                Instr::I64TruncF32U => {
                    let x = stack.pop_f32()?;
                    stack.push(Value::I64(num::trunc_f32_to_i64_u(x)?));
                }
                Instr::I64TruncF64S => {
                    let x = stack.pop_f64()?;
                    stack.push(Value::I64(num::trunc_f64_to_i64_s(x)?));
                }
                Instr::I64TruncF64U => {
                    let x = stack.pop_f64()?;
                    stack.push(Value::I64(num::trunc_f64_to_i64_u(x)?));
                }
                Instr::F32ConvertI32S => {
                    let v = stack.pop_i32()?;
                    stack.push(Value::from_f32(v as f32));
                }
                Instr::F32ConvertI32U => {
                    let v = stack.pop_i32()?;
                    stack.push(Value::from_f32(v as u32 as f32));
                }
                Instr::F32ConvertI64S => {
                    let v = stack.pop_i64()?;
                    stack.push(Value::from_f32(v as f32));
                }
                Instr::F32ConvertI64U => {
                    let v = stack.pop_i64()?;
                    stack.push(Value::from_f32(v as u64 as f32));
                }
                Instr::F32DemoteF64 => {
                    let x = stack.pop_f64()?;
                    stack.push(Value::from_f32(x as f32));
                }
                Instr::F64ConvertI32S => {
                    let v = stack.pop_i32()?;
                    stack.push(Value::from_f64(v as f64));
                }
                Instr::F64ConvertI32U => {
                    let v = stack.pop_i32()?;
                    stack.push(Value::from_f64(v as u32 as f64));
                }
                Instr::F64ConvertI64S => {
                    let v = stack.pop_i64()?;
                    stack.push(Value::from_f64(v as f64));
                }
                Instr::F64ConvertI64U => {
                    let v = stack.pop_i64()?;
                    stack.push(Value::from_f64(v as u64 as f64));
                }
                Instr::F64PromoteF32 => {
                    let x = stack.pop_f32()?;
                    stack.push(Value::from_f64(x as f64));
                }
                Instr::I32ReinterpretF32 => {
                    let bits = stack.pop_f32_bits()?;
                    stack.push(Value::I32(bits as i32));
                }
                Instr::I64ReinterpretF64 => {
                    let bits = stack.pop_f64_bits()?;
                    stack.push(Value::I64(bits as i64));
                }
                Instr::F32ReinterpretI32 => {
                    let v = stack.pop_i32()?;
                    stack.push(Value::F32(v as u32));
                }
                Instr::F64ReinterpretI64 => {
                    let v = stack.pop_i64()?;
                    stack.push(Value::F64(v as u64));
                }

                /* ----- sign extension ----- */
                Instr::I32Extend8S => num::unop_i32(stack, |v| v as i8 as i32)?,
                Instr::I32Extend16S => num::unop_i32(stack, |v| v as i16 as i32)?,
                Instr::I64Extend8S => num::unop_i64(stack, |v| v as i8 as i64)?,
                Instr::I64Extend16S => num::unop_i64(stack, |v| v as i16 as i64)?,
                Instr::I64Extend32S => num::unop_i64(stack, |v| v as i32 as i64)?,

                /* ----- references ----- */
                Instr::RefNull => stack.push(Value::FuncRef(None)),
                Instr::RefIsNull => {
                    let r = stack.pop_funcref()?;
                    stack.push_bool(r.is_none());
                }
                Instr::RefFunc(idx) => {
                    let addr = *frame
                        .inst
                        .funcs
                        .get(*idx as usize)
                        .ok_or(Trap::InvalidModule("function index out of range"))?;
                    stack.push(Value::FuncRef(Some(addr)));
                }
            }
        }
        Ok(Flow::Next)
    }
}

/// Validate what a host function handed back against its declared type.
fn check_host_return(ty: &FuncType, ret: Option<Value>) -> Result<Option<Value>, Trap> {
    match (ret, ty.results.first()) {
        (None, None) => Ok(None),
        (Some(v), Some(&rt)) if v.ty() == rt => Ok(Some(v)),
        (Some(_), Some(_)) => Err(Trap::host("host function returned a value of the wrong type")),
        (Some(_), None) => Err(Trap::host("host function returned an unexpected value")),
        (None, Some(_)) => Err(Trap::host("host function returned no value")),
    }
}
