//! Host import registry. The embedder registers functions, memories,
//! tables, and globals under (namespace, name) pairs; instantiation
//! resolves a module's imports against the registry and checks
//! kinds/signatures/limits.

pub mod func;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::LinkError;
use crate::model::{FuncType, GlobalType, MemoryType, TableType, Value};
use crate::runtime::{
    ExternVal, FuncInstance, GlobalAddr, GlobalInstance, MemAddr, MemoryInstance, Store,
    TableAddr, TableInstance,
};

pub use func::HostFunc;

/// Resolves an import coordinate to an external value. Implemented by
/// `Linker`; embedders with their own lookup scheme can implement it
/// directly.
pub trait ImportResolver {
    fn resolve(&self, module: &str, name: &str) -> Option<ExternVal>;
}

/// The default registry: a flat map from (namespace, name) to a runtime
/// address. Registration helpers allocate the backing object in the Store.
#[derive(Debug, Default)]
pub struct Linker {
    defs: HashMap<(String, String), ExternVal>,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-allocated external value (for example, an export
    /// taken from another instance).
    pub fn define(&mut self, module: &str, name: &str, value: ExternVal) {
        self.defs
            .insert((module.to_string(), name.to_string()), value);
    }

    /// Register a host function with the given signature.
    pub fn func<F>(
        &mut self,
        store: &mut Store,
        module: &str,
        name: &str,
        ty: FuncType,
        f: F,
    ) -> crate::model::FuncAddr
    where
        F: Fn(&[Value]) -> Result<Option<Value>, crate::error::Trap> + Send + Sync + 'static,
    {
        let addr = store.alloc_func(FuncInstance::Host { ty, f: Arc::new(f) });
        self.define(module, name, ExternVal::Func(addr));
        addr
    }

    /// Register a fresh memory with the given limits.
    pub fn memory(
        &mut self,
        store: &mut Store,
        module: &str,
        name: &str,
        ty: MemoryType,
    ) -> MemAddr {
        let addr = store.alloc_memory(MemoryInstance::new(&ty));
        self.define(module, name, ExternVal::Memory(addr));
        addr
    }

    /// Register a fresh table with the given limits.
    pub fn table(
        &mut self,
        store: &mut Store,
        module: &str,
        name: &str,
        ty: TableType,
    ) -> TableAddr {
        let addr = store.alloc_table(TableInstance::new(&ty));
        self.define(module, name, ExternVal::Table(addr));
        addr
    }

    /// Register a global with the given type and initial value.
    pub fn global(
        &mut self,
        store: &mut Store,
        module: &str,
        name: &str,
        ty: GlobalType,
        init: Value,
    ) -> Result<GlobalAddr, LinkError> {
        if init.ty() != ty.val_type {
            return Err(LinkError::Malformed("global init value type"));
        }
        let addr = store.alloc_global(GlobalInstance::new(ty, init));
        self.define(module, name, ExternVal::Global(addr));
        Ok(addr)
    }
}

impl ImportResolver for Linker {
    fn resolve(&self, module: &str, name: &str) -> Option<ExternVal> {
        self.defs
            .get(&(module.to_string(), name.to_string()))
            .copied()
    }
}
