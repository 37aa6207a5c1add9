//! Instance records: functions, module instances, runtime segment
//! instances, and the external-value handle used by exports and imports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::host::HostFunc;
use crate::model::{FuncAddr, FuncType, Module, TypeIdx};

use super::{DataAddr, ElemAddr, GlobalAddr, MemAddr, TableAddr};

/// A function instance: a module-defined body or a host-provided callable.
#[derive(Clone)]
pub enum FuncInstance {
    /// Defined in a module: type index plus the index into the module's
    /// code bodies, and the owning instance in the Store.
    Wasm {
        type_idx: TypeIdx,
        def_index: usize,
        module: usize,
    },
    /// Host function: external callable with a known signature.
    Host { ty: FuncType, f: Arc<HostFunc> },
}

impl std::fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuncInstance::Wasm { type_idx, def_index, module } => f
                .debug_struct("Wasm")
                .field("type_idx", type_idx)
                .field("def_index", def_index)
                .field("module", module)
                .finish(),
            FuncInstance::Host { ty, .. } => f.debug_struct("Host").field("ty", ty).finish(),
        }
    }
}

/// External value: a runtime address paired with its kind. The currency of
/// imports, exports, and the host registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternVal {
    Func(FuncAddr),
    Table(TableAddr),
    Memory(MemAddr),
    Global(GlobalAddr),
}

impl ExternVal {
    /// Short kind label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ExternVal::Func(_) => "func",
            ExternVal::Table(_) => "table",
            ExternVal::Memory(_) => "memory",
            ExternVal::Global(_) => "global",
        }
    }
}

/// Runtime state of a data segment. Dropping empties the byte view; a
/// later `memory.init` against it only traps when the range is non-empty.
#[derive(Debug, Clone, Default)]
pub struct DataInstance {
    bytes: Vec<u8>,
    dropped: bool,
}

impl DataInstance {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, dropped: false }
    }

    /// An already-dropped segment (active segments after application).
    pub fn dropped() -> Self {
        Self { bytes: Vec::new(), dropped: true }
    }

    pub fn bytes(&self) -> &[u8] {
        if self.dropped {
            &[]
        } else {
            &self.bytes
        }
    }

    pub fn drop_bytes(&mut self) {
        self.dropped = true;
        self.bytes = Vec::new();
    }
}

/// Runtime state of an element segment with its items resolved to Store
/// function addresses.
#[derive(Debug, Clone, Default)]
pub struct ElemInstance {
    items: Vec<Option<FuncAddr>>,
    dropped: bool,
}

impl ElemInstance {
    pub fn new(items: Vec<Option<FuncAddr>>) -> Self {
        Self { items, dropped: false }
    }

    /// An already-dropped segment (active and declarative segments).
    pub fn dropped() -> Self {
        Self { items: Vec::new(), dropped: true }
    }

    pub fn items(&self) -> &[Option<FuncAddr>] {
        if self.dropped {
            &[]
        } else {
            &self.items
        }
    }

    pub fn drop_items(&mut self) {
        self.dropped = true;
        self.items = Vec::new();
    }
}

/// A module instance: the runtime addresses of everything in the module's
/// index spaces (imports first, then definitions), the export map, and the
/// decoded IR. Frozen once instantiation commits it to the Store.
#[derive(Debug, Clone, Default)]
pub struct ModuleInstance {
    pub funcs: Vec<FuncAddr>,
    pub tables: Vec<TableAddr>,
    pub memories: Vec<MemAddr>,
    pub globals: Vec<GlobalAddr>,
    pub data_segments: Vec<DataAddr>,
    pub elem_segments: Vec<ElemAddr>,

    pub exports: HashMap<String, ExternVal>,

    pub module: Arc<Module>,
}

impl ModuleInstance {
    /// Resolve an export name to its external value.
    pub fn resolve_export(&self, name: &str) -> Option<ExternVal> {
        self.exports.get(name).copied()
    }

    /// Code body by definition index.
    pub fn code_body(&self, def_index: usize) -> Option<&crate::model::CodeBody> {
        self.module.codes.get(def_index)
    }

    /// Function type by type-section index.
    pub fn func_type(&self, type_idx: TypeIdx) -> Option<&FuncType> {
        self.module.func_type(type_idx)
    }
}
