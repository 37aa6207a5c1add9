//! tidewasm: the core of a WebAssembly execution engine.
//!
//! The crate consumes a `.wasm` byte sequence and a host import registry,
//! and exposes module decoding, instantiation, exported-function
//! invocation, and host-import registration. Supported surface:
//! WebAssembly 1.0 plus the bulk-memory instructions and funcref-only
//! reference types. Multi-value results, SIMD, threads, and exception
//! handling are out of scope.
//!
//! ```
//! use tidewasm::{Engine, Value};
//!
//! // (module (func (export "add") (param i32 i32) (result i32)
//! //   local.get 0 local.get 1 i32.add))
//! let wasm: &[u8] = &[
//!     0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, 0x01, 0x07, 0x01,
//!     0x60, 0x02, 0x7F, 0x7F, 0x01, 0x7F, 0x03, 0x02, 0x01, 0x00, 0x07,
//!     0x07, 0x01, 0x03, b'a', b'd', b'd', 0x00, 0x00, 0x0A, 0x09, 0x01,
//!     0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B,
//! ];
//! let mut engine = Engine::new();
//! let instance = engine.instantiate(wasm).unwrap();
//! let sum = engine
//!     .invoke(instance, "add", &[Value::I32(2), Value::I32(3)])
//!     .unwrap();
//! assert_eq!(sum, Some(Value::I32(5)));
//! ```

pub mod binary;
pub mod error;
pub mod host;
pub mod model;
pub mod runtime;
pub mod vm;

use std::sync::Arc;

use model::{ConstExpr, ExportDesc, ImportDesc};
use runtime::{
    DataInstance, ElemInstance, FuncInstance, GlobalInstance, ModuleInstance, TableInstance,
};

pub use error::{DecodeError, DecodeErrorKind, Error, LinkError, Trap};
pub use host::{HostFunc, ImportResolver, Linker};
pub use model::{
    FuncAddr, FuncType, GlobalType, Limits, MemoryType, Module, RefType, TableType, ValType,
    Value,
};
pub use runtime::{
    ExternVal, GlobalAddr, InstanceHandle, MemAddr, MemoryInstance, Store, TableAddr,
};

/// Default bound on call recursion; exceeding it traps with
/// `Trap::StackOverflow` instead of overflowing the host stack.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum nested call depth per invocation.
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_call_depth: DEFAULT_MAX_CALL_DEPTH }
    }
}

/// Decode a binary module.
pub fn decode(bytes: &[u8]) -> Result<Module, DecodeError> {
    let module = binary::sections::parse_module_from_bytes(bytes)?;
    tracing::debug!(
        target: "wasm.decode",
        types = module.types.len(),
        funcs = module.codes.len(),
        imports = module.imports.len(),
        "module decoded"
    );
    Ok(module)
}

/// Evaluate a constant expression against the (partially built) instance
/// index spaces.
fn eval_const(
    store: &Store,
    globals: &[runtime::GlobalAddr],
    funcs: &[FuncAddr],
    expr: &ConstExpr,
) -> Result<Value, LinkError> {
    match expr {
        ConstExpr::I32(v) => Ok(Value::I32(*v)),
        ConstExpr::I64(v) => Ok(Value::I64(*v)),
        ConstExpr::F32(bits) => Ok(Value::F32(*bits)),
        ConstExpr::F64(bits) => Ok(Value::F64(*bits)),
        ConstExpr::GlobalGet(idx) => {
            let addr = *globals
                .get(*idx as usize)
                .ok_or(LinkError::Malformed("global index in constant expression"))?;
            let g = store
                .get_global(addr)
                .ok_or(LinkError::Malformed("bad global address"))?;
            if g.ty().mutable {
                return Err(LinkError::Malformed(
                    "constant expression reads a mutable global",
                ));
            }
            Ok(g.get())
        }
        ConstExpr::RefNull => Ok(Value::FuncRef(None)),
        ConstExpr::RefFunc(idx) => funcs
            .get(*idx as usize)
            .map(|a| Value::FuncRef(Some(*a)))
            .ok_or(LinkError::Malformed(
                "function index in constant expression",
            )),
    }
}

/// Instantiate a decoded module against an import resolver, using the
/// default call-depth bound for the start function.
pub fn instantiate(
    store: &mut Store,
    module: Arc<Module>,
    resolver: &impl ImportResolver,
) -> Result<InstanceHandle, LinkError> {
    instantiate_inner(store, module, resolver, DEFAULT_MAX_CALL_DEPTH)
}

fn instantiate_inner(
    store: &mut Store,
    module: Arc<Module>,
    resolver: &impl ImportResolver,
    max_call_depth: usize,
) -> Result<InstanceHandle, LinkError> {
    // Reserve the instance slot: defined functions back-reference it.
    let handle = store.alloc_module(ModuleInstance {
        module: Arc::clone(&module),
        ..Default::default()
    });
    let module_index = handle.0;

    let mut funcs: Vec<FuncAddr> = Vec::with_capacity(module.total_funcs() as usize);
    let mut tables: Vec<runtime::TableAddr> = Vec::with_capacity(module.total_tables() as usize);
    let mut memories: Vec<runtime::MemAddr> = Vec::with_capacity(module.total_memories() as usize);
    let mut globals: Vec<runtime::GlobalAddr> =
        Vec::with_capacity(module.total_globals() as usize);

    // 1) Resolve imports in declaration order.
    for imp in &module.imports {
        let missing = || LinkError::MissingImport {
            module: imp.module.clone(),
            name: imp.name.clone(),
        };
        let kind_mismatch = || LinkError::KindMismatch {
            module: imp.module.clone(),
            name: imp.name.clone(),
        };
        let resolved = resolver.resolve(&imp.module, &imp.name).ok_or_else(missing)?;
        match &imp.desc {
            ImportDesc::Func(type_idx) => {
                let declared = module
                    .func_type(*type_idx)
                    .ok_or(LinkError::Malformed("import type index"))?;
                let addr = match resolved {
                    ExternVal::Func(a) => a,
                    _ => return Err(kind_mismatch()),
                };
                let actual = store
                    .func_type(addr)
                    .map_err(|_| LinkError::Malformed("bad function address"))?;
                if actual != *declared {
                    return Err(LinkError::SignatureMismatch { context: "function import" });
                }
                funcs.push(addr);
            }
            ImportDesc::Table(tt) => {
                let addr = match resolved {
                    ExternVal::Table(a) => a,
                    _ => return Err(kind_mismatch()),
                };
                let t = store
                    .get_table(addr)
                    .ok_or(LinkError::Malformed("bad table address"))?;
                let provided = Limits::new(t.size(), t.max());
                if !provided.satisfies(&tt.limits) {
                    return Err(LinkError::LimitsMismatch {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                    });
                }
                tables.push(addr);
            }
            ImportDesc::Memory(mt) => {
                let addr = match resolved {
                    ExternVal::Memory(a) => a,
                    _ => return Err(kind_mismatch()),
                };
                let m = store
                    .get_memory(addr)
                    .ok_or(LinkError::Malformed("bad memory address"))?;
                let provided = Limits::new(m.size_pages(), m.max_pages());
                if !provided.satisfies(&mt.limits) {
                    return Err(LinkError::LimitsMismatch {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                    });
                }
                memories.push(addr);
            }
            ImportDesc::Global(gt) => {
                let addr = match resolved {
                    ExternVal::Global(a) => a,
                    _ => return Err(kind_mismatch()),
                };
                let g = store
                    .get_global(addr)
                    .ok_or(LinkError::Malformed("bad global address"))?;
                if g.ty().val_type != gt.val_type {
                    return Err(LinkError::SignatureMismatch { context: "global import type" });
                }
                if g.ty().mutable != gt.mutable {
                    return Err(LinkError::MutabilityMismatch {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                    });
                }
                globals.push(addr);
            }
        }
    }

    // 2) Define module functions.
    for (def_index, type_idx) in module.func_type_indices.iter().enumerate() {
        if module.func_type(*type_idx).is_none() {
            return Err(LinkError::Malformed("function type index"));
        }
        funcs.push(store.alloc_func(FuncInstance::Wasm {
            type_idx: *type_idx,
            def_index,
            module: module_index,
        }));
    }

    // 3) Define tables and memories.
    for tt in &module.tables {
        tables.push(store.alloc_table(TableInstance::new(tt)));
    }
    for mt in &module.memories {
        memories.push(store.alloc_memory(MemoryInstance::new(mt)));
    }

    // 4) Evaluate global initializers in declaration order.
    for glob in &module.globals {
        let init = eval_const(store, &globals, &funcs, &glob.init)?;
        if init.ty() != glob.ty.val_type {
            return Err(LinkError::Malformed("global initializer type"));
        }
        globals.push(store.alloc_global(GlobalInstance::new(glob.ty, init)));
    }

    // 5) Element segments: resolve items, apply active ones, keep passive
    // ones alive for `table.init`.
    let mut elem_segments: Vec<runtime::ElemAddr> = Vec::with_capacity(module.elements.len());
    for seg in &module.elements {
        let items: Vec<Option<FuncAddr>> = seg
            .items
            .iter()
            .map(|item| match item {
                Some(fi) => funcs
                    .get(*fi as usize)
                    .map(|a| Some(*a))
                    .ok_or(LinkError::Malformed("element function index")),
                None => Ok(None),
            })
            .collect::<Result<_, _>>()?;

        let addr = match seg.mode {
            model::SegmentMode::Active { index, offset } => {
                let taddr = *tables
                    .get(index as usize)
                    .ok_or(LinkError::Malformed("element table index"))?;
                let base = match eval_const(store, &globals, &funcs, &offset)? {
                    Value::I32(v) => v as u32,
                    _ => return Err(LinkError::Malformed("element offset type")),
                };
                let t = store
                    .get_table_mut(taddr)
                    .ok_or(LinkError::Malformed("bad table address"))?;
                t.init_from(&items, base, 0, items.len() as u32)
                    .map_err(|_| LinkError::ElemOutOfBounds)?;
                store.alloc_elem(ElemInstance::dropped())
            }
            model::SegmentMode::Passive => store.alloc_elem(ElemInstance::new(items)),
            model::SegmentMode::Declarative => store.alloc_elem(ElemInstance::dropped()),
        };
        elem_segments.push(addr);
    }

    // 6) Data segments, after elements.
    let mut data_segments: Vec<runtime::DataAddr> = Vec::with_capacity(module.data.len());
    for seg in &module.data {
        let addr = match seg.mode {
            model::SegmentMode::Active { index, offset } => {
                let maddr = *memories
                    .get(index as usize)
                    .ok_or(LinkError::Malformed("data memory index"))?;
                let base = match eval_const(store, &globals, &funcs, &offset)? {
                    Value::I32(v) => v as u32 as u64,
                    _ => return Err(LinkError::Malformed("data offset type")),
                };
                let m = store
                    .get_memory_mut(maddr)
                    .ok_or(LinkError::Malformed("bad memory address"))?;
                m.write_bytes(base, &seg.bytes)
                    .map_err(|_| LinkError::DataOutOfBounds)?;
                store.alloc_data(DataInstance::dropped())
            }
            model::SegmentMode::Passive => store.alloc_data(DataInstance::new(seg.bytes.clone())),
            model::SegmentMode::Declarative => store.alloc_data(DataInstance::dropped()),
        };
        data_segments.push(addr);
    }

    // 7) Export map.
    let mut exports = std::collections::HashMap::new();
    for ex in &module.exports {
        let value = match ex.desc {
            ExportDesc::Func(i) => ExternVal::Func(
                *funcs
                    .get(i as usize)
                    .ok_or(LinkError::Malformed("export function index"))?,
            ),
            ExportDesc::Table(i) => ExternVal::Table(
                *tables
                    .get(i as usize)
                    .ok_or(LinkError::Malformed("export table index"))?,
            ),
            ExportDesc::Memory(i) => ExternVal::Memory(
                *memories
                    .get(i as usize)
                    .ok_or(LinkError::Malformed("export memory index"))?,
            ),
            ExportDesc::Global(i) => ExternVal::Global(
                *globals
                    .get(i as usize)
                    .ok_or(LinkError::Malformed("export global index"))?,
            ),
        };
        exports.insert(ex.name.clone(), value);
    }

    tracing::debug!(
        target: "wasm.link",
        imports = module.imports.len(),
        funcs = funcs.len(),
        start = module.start.is_some(),
        "instance linked"
    );

    // 8) Commit the instance, then run the start function against it.
    let start_addr = match module.start {
        Some(idx) => Some(
            *funcs
                .get(idx as usize)
                .ok_or(LinkError::Malformed("start function index"))?,
        ),
        None => None,
    };
    store.replace_module(
        module_index,
        ModuleInstance {
            funcs,
            tables,
            memories,
            globals,
            data_segments,
            elem_segments,
            exports,
            module: Arc::clone(&module),
        },
    );

    if let Some(addr) = start_addr {
        let fty = store
            .func_type(addr)
            .map_err(|_| LinkError::Malformed("bad function address"))?;
        if !fty.params.is_empty() || !fty.results.is_empty() {
            store.replace_module(module_index, ModuleInstance::default());
            return Err(LinkError::Malformed("start function signature"));
        }
        if let Err(trap) = vm::invoke(store, addr, &[], max_call_depth) {
            // The instance is discarded; applied segments stay applied.
            store.replace_module(module_index, ModuleInstance::default());
            return Err(LinkError::StartTrapped(trap));
        }
    }

    Ok(handle)
}

fn do_invoke(
    store: &mut Store,
    instance: InstanceHandle,
    name: &str,
    args: &[Value],
    max_call_depth: usize,
) -> Result<Option<Value>, Error> {
    let inst = store
        .instance(instance.0)
        .ok_or(LinkError::Malformed("bad instance handle"))?;
    let addr = match inst.resolve_export(name) {
        Some(ExternVal::Func(addr)) => addr,
        Some(_) => return Err(LinkError::NotAFunction(name.to_string()).into()),
        None => return Err(LinkError::MissingExport(name.to_string()).into()),
    };

    let fty = store.func_type(addr)?;
    if fty.params.len() != args.len() {
        return Err(LinkError::SignatureMismatch { context: "invoke argument count" }.into());
    }
    for (v, t) in args.iter().zip(&fty.params) {
        if v.ty() != *t {
            return Err(LinkError::SignatureMismatch { context: "invoke argument type" }.into());
        }
    }
    if fty.results.len() > 1 {
        return Err(LinkError::SignatureMismatch { context: "multi-value result" }.into());
    }

    tracing::trace!(target: "wasm.invoke", name, args = args.len(), "invoking export");
    Ok(vm::invoke(store, addr, args, max_call_depth)?)
}

/// Invoke an exported function with checked arguments.
pub fn invoke_export(
    store: &mut Store,
    instance: InstanceHandle,
    name: &str,
    args: &[Value],
) -> Result<Option<Value>, Error> {
    do_invoke(store, instance, name, args, DEFAULT_MAX_CALL_DEPTH)
}

/// The engine facade: a Store, a Linker, and the host-facing operations.
#[derive(Debug, Default)]
pub struct Engine {
    store: Store,
    linker: Linker,
    config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self { config, ..Default::default() }
    }

    /// Register a host function import.
    pub fn register_func<F>(&mut self, module: &str, name: &str, ty: FuncType, f: F) -> FuncAddr
    where
        F: Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync + 'static,
    {
        self.linker.func(&mut self.store, module, name, ty, f)
    }

    /// Register a memory import; returns its address for direct host access.
    pub fn register_memory(&mut self, module: &str, name: &str, ty: MemoryType) -> MemAddr {
        self.linker.memory(&mut self.store, module, name, ty)
    }

    /// Register a table import.
    pub fn register_table(&mut self, module: &str, name: &str, ty: TableType) -> TableAddr {
        self.linker.table(&mut self.store, module, name, ty)
    }

    /// Register a global import.
    pub fn register_global(
        &mut self,
        module: &str,
        name: &str,
        ty: GlobalType,
        init: Value,
    ) -> Result<GlobalAddr, Error> {
        Ok(self.linker.global(&mut self.store, module, name, ty, init)?)
    }

    /// Re-export an existing external value under a new import coordinate
    /// (instance-to-instance linking).
    pub fn define(&mut self, module: &str, name: &str, value: ExternVal) {
        self.linker.define(module, name, value);
    }

    /// Decode and instantiate a module.
    pub fn instantiate(&mut self, bytes: &[u8]) -> Result<InstanceHandle, Error> {
        let module = decode(bytes)?;
        Ok(instantiate_inner(
            &mut self.store,
            Arc::new(module),
            &self.linker,
            self.config.max_call_depth,
        )?)
    }

    /// Invoke an exported function.
    pub fn invoke(
        &mut self,
        instance: InstanceHandle,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>, Error> {
        do_invoke(
            &mut self.store,
            instance,
            name,
            args,
            self.config.max_call_depth,
        )
    }

    /// Look up an export by name.
    pub fn get_export(&self, instance: InstanceHandle, name: &str) -> Option<ExternVal> {
        self.store.instance(instance.0)?.resolve_export(name)
    }

    /// Direct host access to a linear memory (string marshalling).
    pub fn memory(&self, addr: MemAddr) -> Option<&MemoryInstance> {
        self.store.get_memory(addr)
    }

    /// Mutable host access to a linear memory.
    pub fn memory_mut(&mut self, addr: MemAddr) -> Option<&mut MemoryInstance> {
        self.store.get_memory_mut(addr)
    }

    /// The value of a global (for example, an exported one).
    pub fn global(&self, addr: GlobalAddr) -> Option<Value> {
        self.store.get_global(addr).map(|g| g.get())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }
}
