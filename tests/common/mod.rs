//! Shared test support: a small wasm binary assembler. Tests describe
//! modules with the builder and feed the emitted bytes to the engine.

#![allow(dead_code)]

/// Value type bytes as they appear in the binary format.
pub mod vt {
    pub const I32: u8 = 0x7F;
    pub const I64: u8 = 0x7E;
    pub const F32: u8 = 0x7D;
    pub const F64: u8 = 0x7C;
    pub const FUNCREF: u8 = 0x70;
}

/// Block type bytes.
pub mod bt {
    pub const EMPTY: u8 = 0x40;
    pub const I32: u8 = 0x7F;
    pub const I64: u8 = 0x7E;
    pub const F32: u8 = 0x7D;
    pub const F64: u8 = 0x7C;
}

pub fn uleb(mut v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub fn sleb(mut v: i64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (v == 0 && sign_clear) || (v == -1 && !sign_clear) {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

fn name(s: &str) -> Vec<u8> {
    let mut out = uleb(s.len() as u64);
    out.extend_from_slice(s.as_bytes());
    out
}

/// Instruction-stream builder for function bodies and expressions.
#[derive(Default, Clone)]
pub struct Body {
    bytes: Vec<u8>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    fn imm_u(mut self, v: u32) -> Self {
        self.bytes.extend(uleb(v as u64));
        self
    }

    /* constants */
    pub fn i32_const(mut self, v: i32) -> Self {
        self.bytes.push(0x41);
        self.bytes.extend(sleb(v as i64));
        self
    }
    pub fn i64_const(mut self, v: i64) -> Self {
        self.bytes.push(0x42);
        self.bytes.extend(sleb(v));
        self
    }
    pub fn f32_const(mut self, v: f32) -> Self {
        self.bytes.push(0x43);
        self.bytes.extend_from_slice(&v.to_bits().to_le_bytes());
        self
    }
    pub fn f64_const(mut self, v: f64) -> Self {
        self.bytes.push(0x44);
        self.bytes.extend_from_slice(&v.to_bits().to_le_bytes());
        self
    }

    /* variables */
    pub fn local_get(self, idx: u32) -> Self {
        self.op(0x20).imm_u(idx)
    }
    pub fn local_set(self, idx: u32) -> Self {
        self.op(0x21).imm_u(idx)
    }
    pub fn local_tee(self, idx: u32) -> Self {
        self.op(0x22).imm_u(idx)
    }
    pub fn global_get(self, idx: u32) -> Self {
        self.op(0x23).imm_u(idx)
    }
    pub fn global_set(self, idx: u32) -> Self {
        self.op(0x24).imm_u(idx)
    }

    /* control */
    pub fn unreachable(self) -> Self {
        self.op(0x00)
    }
    pub fn nop(self) -> Self {
        self.op(0x01)
    }
    pub fn block(mut self, block_type: u8, inner: Body) -> Self {
        self.bytes.push(0x02);
        self.bytes.push(block_type);
        self.bytes.extend(inner.bytes);
        self.bytes.push(0x0B);
        self
    }
    pub fn loop_(mut self, block_type: u8, inner: Body) -> Self {
        self.bytes.push(0x03);
        self.bytes.push(block_type);
        self.bytes.extend(inner.bytes);
        self.bytes.push(0x0B);
        self
    }
    pub fn if_else(mut self, block_type: u8, then: Body, els: Option<Body>) -> Self {
        self.bytes.push(0x04);
        self.bytes.push(block_type);
        self.bytes.extend(then.bytes);
        if let Some(els) = els {
            self.bytes.push(0x05);
            self.bytes.extend(els.bytes);
        }
        self.bytes.push(0x0B);
        self
    }
    pub fn br(self, depth: u32) -> Self {
        self.op(0x0C).imm_u(depth)
    }
    pub fn br_if(self, depth: u32) -> Self {
        self.op(0x0D).imm_u(depth)
    }
    pub fn br_table(mut self, targets: &[u32], default: u32) -> Self {
        self.bytes.push(0x0E);
        self.bytes.extend(uleb(targets.len() as u64));
        for t in targets {
            self.bytes.extend(uleb(*t as u64));
        }
        self.bytes.extend(uleb(default as u64));
        self
    }
    pub fn ret(self) -> Self {
        self.op(0x0F)
    }
    pub fn call(self, func: u32) -> Self {
        self.op(0x10).imm_u(func)
    }
    pub fn call_indirect(self, type_idx: u32) -> Self {
        self.op(0x11).imm_u(type_idx).imm_u(0)
    }

    /* parametric */
    pub fn drop_(self) -> Self {
        self.op(0x1A)
    }
    pub fn select(self) -> Self {
        self.op(0x1B)
    }

    /* memory: opcode + align hint + offset */
    pub fn mem(self, opcode: u8, align: u32, offset: u32) -> Self {
        self.op(opcode).imm_u(align).imm_u(offset)
    }
    pub fn i32_load(self, offset: u32) -> Self {
        self.mem(0x28, 2, offset)
    }
    pub fn i64_load(self, offset: u32) -> Self {
        self.mem(0x29, 3, offset)
    }
    pub fn f32_load(self, offset: u32) -> Self {
        self.mem(0x2A, 2, offset)
    }
    pub fn f64_load(self, offset: u32) -> Self {
        self.mem(0x2B, 3, offset)
    }
    pub fn i32_load8_u(self, offset: u32) -> Self {
        self.mem(0x2D, 0, offset)
    }
    pub fn i32_store(self, offset: u32) -> Self {
        self.mem(0x36, 2, offset)
    }
    pub fn i64_store(self, offset: u32) -> Self {
        self.mem(0x37, 3, offset)
    }
    pub fn f32_store(self, offset: u32) -> Self {
        self.mem(0x38, 2, offset)
    }
    pub fn f64_store(self, offset: u32) -> Self {
        self.mem(0x39, 3, offset)
    }
    pub fn i32_store8(self, offset: u32) -> Self {
        self.mem(0x3A, 0, offset)
    }
    pub fn memory_size(self) -> Self {
        self.op(0x3F).imm_u(0)
    }
    pub fn memory_grow(self) -> Self {
        self.op(0x40).imm_u(0)
    }

    /* bulk memory */
    pub fn memory_init(self, data: u32) -> Self {
        self.op(0xFC).imm_u(8).imm_u(data).imm_u(0)
    }
    pub fn data_drop(self, data: u32) -> Self {
        self.op(0xFC).imm_u(9).imm_u(data)
    }
    pub fn memory_copy(self) -> Self {
        self.op(0xFC).imm_u(10).imm_u(0).imm_u(0)
    }
    pub fn memory_fill(self) -> Self {
        self.op(0xFC).imm_u(11).imm_u(0)
    }
    pub fn table_init(self, elem: u32) -> Self {
        self.op(0xFC).imm_u(12).imm_u(elem).imm_u(0)
    }
    pub fn elem_drop(self, elem: u32) -> Self {
        self.op(0xFC).imm_u(13).imm_u(elem)
    }
    pub fn table_copy(self) -> Self {
        self.op(0xFC).imm_u(14).imm_u(0).imm_u(0)
    }

    /* references */
    pub fn ref_null(self) -> Self {
        self.op(0xD0).op(0x70)
    }
    pub fn ref_is_null(self) -> Self {
        self.op(0xD1)
    }
    pub fn ref_func(self, func: u32) -> Self {
        self.op(0xD2).imm_u(func)
    }

    /// Close the body with `end` and yield the raw bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.bytes.push(0x0B);
        self.bytes
    }
}

/// Module assembler. Sections are emitted in id order with correct sizes.
#[derive(Default)]
pub struct ModuleBuilder {
    types: Vec<Vec<u8>>,
    imports: Vec<Vec<u8>>,
    imported_funcs: u32,
    func_types: Vec<u32>,
    tables: Vec<Vec<u8>>,
    memories: Vec<Vec<u8>>,
    globals: Vec<Vec<u8>>,
    exports: Vec<Vec<u8>>,
    start: Option<u32>,
    elements: Vec<Vec<u8>>,
    codes: Vec<Vec<u8>>,
    data: Vec<Vec<u8>>,
    data_count: Option<u32>,
}

fn limits(min: u32, max: Option<u32>) -> Vec<u8> {
    let mut out = Vec::new();
    match max {
        None => {
            out.push(0x00);
            out.extend(uleb(min as u64));
        }
        Some(max) => {
            out.push(0x01);
            out.extend(uleb(min as u64));
            out.extend(uleb(max as u64));
        }
    }
    out
}

/// `i32.const <v>` `end`, the usual offset expression.
pub fn const_i32(v: i32) -> Vec<u8> {
    let mut out = vec![0x41];
    out.extend(sleb(v as i64));
    out.push(0x0B);
    out
}

/// `global.get <idx>` `end`.
pub fn const_global_get(idx: u32) -> Vec<u8> {
    let mut out = vec![0x23];
    out.extend(uleb(idx as u64));
    out.push(0x0B);
    out
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function type; returns its type index.
    pub fn ty(&mut self, params: &[u8], results: &[u8]) -> u32 {
        let mut entry = vec![0x60];
        entry.extend(uleb(params.len() as u64));
        entry.extend_from_slice(params);
        entry.extend(uleb(results.len() as u64));
        entry.extend_from_slice(results);
        self.types.push(entry);
        (self.types.len() - 1) as u32
    }

    /// Import a function; returns its function index.
    pub fn import_func(&mut self, module: &str, field: &str, type_idx: u32) -> u32 {
        let mut entry = name(module);
        entry.extend(name(field));
        entry.push(0x00);
        entry.extend(uleb(type_idx as u64));
        self.imports.push(entry);
        self.imported_funcs += 1;
        self.imported_funcs - 1
    }

    pub fn import_table(&mut self, module: &str, field: &str, min: u32, max: Option<u32>) {
        let mut entry = name(module);
        entry.extend(name(field));
        entry.push(0x01);
        entry.push(0x70);
        entry.extend(limits(min, max));
        self.imports.push(entry);
    }

    pub fn import_memory(&mut self, module: &str, field: &str, min: u32, max: Option<u32>) {
        let mut entry = name(module);
        entry.extend(name(field));
        entry.push(0x02);
        entry.extend(limits(min, max));
        self.imports.push(entry);
    }

    pub fn import_global(&mut self, module: &str, field: &str, val_type: u8, mutable: bool) {
        let mut entry = name(module);
        entry.extend(name(field));
        entry.push(0x03);
        entry.push(val_type);
        entry.push(mutable as u8);
        self.imports.push(entry);
    }

    /// Define a function; returns its function index (imports included).
    pub fn func(&mut self, type_idx: u32, locals: &[(u32, u8)], body: Body) -> u32 {
        self.func_types.push(type_idx);

        let mut code = uleb(locals.len() as u64);
        for (count, ty) in locals {
            code.extend(uleb(*count as u64));
            code.push(*ty);
        }
        code.extend(body.finish());

        let mut entry = uleb(code.len() as u64);
        entry.extend(code);
        self.codes.push(entry);

        self.imported_funcs + (self.func_types.len() - 1) as u32
    }

    pub fn table(&mut self, min: u32, max: Option<u32>) {
        let mut entry = vec![0x70];
        entry.extend(limits(min, max));
        self.tables.push(entry);
    }

    pub fn memory(&mut self, min: u32, max: Option<u32>) {
        self.memories.push(limits(min, max));
    }

    /// Define a global with a raw init expression (see `const_i32`).
    pub fn global(&mut self, val_type: u8, mutable: bool, init: &[u8]) {
        let mut entry = vec![val_type, mutable as u8];
        entry.extend_from_slice(init);
        self.globals.push(entry);
    }

    fn export(&mut self, field: &str, kind: u8, idx: u32) {
        let mut entry = name(field);
        entry.push(kind);
        entry.extend(uleb(idx as u64));
        self.exports.push(entry);
    }

    pub fn export_func(&mut self, field: &str, idx: u32) {
        self.export(field, 0x00, idx);
    }

    pub fn export_table(&mut self, field: &str, idx: u32) {
        self.export(field, 0x01, idx);
    }

    pub fn export_memory(&mut self, field: &str, idx: u32) {
        self.export(field, 0x02, idx);
    }

    pub fn export_global(&mut self, field: &str, idx: u32) {
        self.export(field, 0x03, idx);
    }

    pub fn start(&mut self, func: u32) {
        self.start = Some(func);
    }

    /// Active element segment on table 0 (flag 0).
    pub fn element_active(&mut self, offset: i32, funcs: &[u32]) {
        let mut entry = uleb(0);
        entry.extend(const_i32(offset));
        entry.extend(uleb(funcs.len() as u64));
        for f in funcs {
            entry.extend(uleb(*f as u64));
        }
        self.elements.push(entry);
    }

    /// Passive element segment (flag 1).
    pub fn element_passive(&mut self, funcs: &[u32]) {
        let mut entry = uleb(1);
        entry.push(0x00); // elemkind: funcref
        entry.extend(uleb(funcs.len() as u64));
        for f in funcs {
            entry.extend(uleb(*f as u64));
        }
        self.elements.push(entry);
    }

    /// Active data segment on memory 0 (flag 0).
    pub fn data_active(&mut self, offset: i32, bytes: &[u8]) {
        let mut entry = uleb(0);
        entry.extend(const_i32(offset));
        entry.extend(uleb(bytes.len() as u64));
        entry.extend_from_slice(bytes);
        self.data.push(entry);
    }

    /// Passive data segment (flag 1).
    pub fn data_passive(&mut self, bytes: &[u8]) {
        let mut entry = uleb(1);
        entry.extend(uleb(bytes.len() as u64));
        entry.extend_from_slice(bytes);
        self.data.push(entry);
    }

    /// Emit a data-count section (required before bulk data instructions
    /// by the format; the engine cross-checks it).
    pub fn data_count(&mut self, n: u32) {
        self.data_count = Some(n);
    }

    fn section(out: &mut Vec<u8>, id: u8, payload: Vec<u8>) {
        out.push(id);
        out.extend(uleb(payload.len() as u64));
        out.extend(payload);
    }

    fn vec_section(out: &mut Vec<u8>, id: u8, entries: &[Vec<u8>]) {
        if entries.is_empty() {
            return;
        }
        let mut payload = uleb(entries.len() as u64);
        for e in entries {
            payload.extend_from_slice(e);
        }
        Self::section(out, id, payload);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        Self::vec_section(&mut out, 1, &self.types);
        Self::vec_section(&mut out, 2, &self.imports);
        if !self.func_types.is_empty() {
            let mut payload = uleb(self.func_types.len() as u64);
            for t in &self.func_types {
                payload.extend(uleb(*t as u64));
            }
            Self::section(&mut out, 3, payload);
        }
        Self::vec_section(&mut out, 4, &self.tables);
        Self::vec_section(&mut out, 5, &self.memories);
        Self::vec_section(&mut out, 6, &self.globals);
        Self::vec_section(&mut out, 7, &self.exports);
        if let Some(s) = self.start {
            Self::section(&mut out, 8, uleb(s as u64));
        }
        Self::vec_section(&mut out, 9, &self.elements);
        if let Some(n) = self.data_count {
            Self::section(&mut out, 12, uleb(n as u64));
        }
        Self::vec_section(&mut out, 10, &self.codes);
        Self::vec_section(&mut out, 11, &self.data);
        out
    }
}
