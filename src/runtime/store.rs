//! Central store for all runtime objects. Owns function, table, memory,
//! global, segment, and module instances; everything refers to everything
//! else by index, which keeps the module/function ownership cycle out of
//! the type system.

use std::sync::Arc;

use crate::error::Trap;
use crate::model::{FuncAddr, FuncType};

use super::{
    global::GlobalInstance,
    instances::{DataInstance, ElemInstance, FuncInstance, ModuleInstance},
    memory::MemoryInstance,
    table::TableInstance,
    DataAddr, ElemAddr, GlobalAddr, InstanceHandle, MemAddr, TableAddr,
};

#[derive(Debug, Default)]
pub struct Store {
    pub(crate) funcs: Vec<FuncInstance>,
    pub(crate) tables: Vec<TableInstance>,
    pub(crate) mems: Vec<MemoryInstance>,
    pub(crate) globals: Vec<GlobalInstance>,
    pub(crate) datas: Vec<DataInstance>,
    pub(crate) elems: Vec<ElemInstance>,
    pub(crate) modules: Vec<Arc<ModuleInstance>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /* ----- allocation ----- */

    pub fn alloc_func(&mut self, f: FuncInstance) -> FuncAddr {
        self.funcs.push(f);
        self.funcs.len() - 1
    }

    pub fn alloc_table(&mut self, t: TableInstance) -> TableAddr {
        self.tables.push(t);
        self.tables.len() - 1
    }

    pub fn alloc_memory(&mut self, m: MemoryInstance) -> MemAddr {
        self.mems.push(m);
        self.mems.len() - 1
    }

    pub fn alloc_global(&mut self, g: GlobalInstance) -> GlobalAddr {
        self.globals.push(g);
        self.globals.len() - 1
    }

    pub fn alloc_data(&mut self, d: DataInstance) -> DataAddr {
        self.datas.push(d);
        self.datas.len() - 1
    }

    pub fn alloc_elem(&mut self, e: ElemInstance) -> ElemAddr {
        self.elems.push(e);
        self.elems.len() - 1
    }

    /// Reserve an instance slot. Function instances refer to their module
    /// by this index, so it must be fixed before functions are allocated;
    /// the finished instance is committed with `replace_module`.
    pub fn alloc_module(&mut self, m: ModuleInstance) -> InstanceHandle {
        self.modules.push(Arc::new(m));
        InstanceHandle(self.modules.len() - 1)
    }

    /// Commit (or, on a failed start function, clear) a reserved slot.
    pub(crate) fn replace_module(&mut self, idx: usize, m: ModuleInstance) {
        if let Some(slot) = self.modules.get_mut(idx) {
            *slot = Arc::new(m);
        }
    }

    /* ----- access ----- */

    pub fn instance(&self, idx: usize) -> Option<Arc<ModuleInstance>> {
        self.modules.get(idx).cloned()
    }

    pub fn get_func(&self, addr: FuncAddr) -> Option<&FuncInstance> {
        self.funcs.get(addr)
    }

    pub fn get_table(&self, addr: TableAddr) -> Option<&TableInstance> {
        self.tables.get(addr)
    }

    pub fn get_table_mut(&mut self, addr: TableAddr) -> Option<&mut TableInstance> {
        self.tables.get_mut(addr)
    }

    pub fn get_memory(&self, addr: MemAddr) -> Option<&MemoryInstance> {
        self.mems.get(addr)
    }

    pub fn get_memory_mut(&mut self, addr: MemAddr) -> Option<&mut MemoryInstance> {
        self.mems.get_mut(addr)
    }

    pub fn get_global(&self, addr: GlobalAddr) -> Option<&GlobalInstance> {
        self.globals.get(addr)
    }

    pub fn get_global_mut(&mut self, addr: GlobalAddr) -> Option<&mut GlobalInstance> {
        self.globals.get_mut(addr)
    }

    pub fn get_data(&self, addr: DataAddr) -> Option<&DataInstance> {
        self.datas.get(addr)
    }

    pub fn get_elem(&self, addr: ElemAddr) -> Option<&ElemInstance> {
        self.elems.get(addr)
    }

    /// The signature of any function, host or module-defined.
    pub fn func_type(&self, addr: FuncAddr) -> Result<FuncType, Trap> {
        match self.funcs.get(addr) {
            Some(FuncInstance::Host { ty, .. }) => Ok(ty.clone()),
            Some(FuncInstance::Wasm { type_idx, module, .. }) => {
                let inst = self
                    .modules
                    .get(*module)
                    .ok_or(Trap::InvalidModule("bad module index"))?;
                inst.func_type(*type_idx)
                    .cloned()
                    .ok_or(Trap::InvalidModule("bad type index"))
            }
            None => Err(Trap::InvalidModule("bad function address")),
        }
    }

    /* ----- bulk operations that touch two objects at once ----- */

    /// `memory.init`: copy from a data segment into a memory.
    pub fn memory_init(
        &mut self,
        mem: MemAddr,
        data: DataAddr,
        dest: u64,
        src: u64,
        len: u64,
    ) -> Result<(), Trap> {
        let bytes = self
            .datas
            .get(data)
            .ok_or(Trap::InvalidModule("bad data segment address"))?
            .bytes()
            .to_vec();
        let m = self
            .mems
            .get_mut(mem)
            .ok_or(Trap::InvalidModule("bad memory address"))?;
        m.init_from(&bytes, dest, src, len)
    }

    /// `data.drop`.
    pub fn data_drop(&mut self, data: DataAddr) -> Result<(), Trap> {
        self.datas
            .get_mut(data)
            .ok_or(Trap::InvalidModule("bad data segment address"))?
            .drop_bytes();
        Ok(())
    }

    /// `table.init`: copy from an element segment into a table.
    pub fn table_init(
        &mut self,
        table: TableAddr,
        elem: ElemAddr,
        dest: u32,
        src: u32,
        len: u32,
    ) -> Result<(), Trap> {
        let seg = self
            .elems
            .get(elem)
            .ok_or(Trap::InvalidModule("bad element segment address"))?;
        let items = seg.items().to_vec();
        let t = self
            .tables
            .get_mut(table)
            .ok_or(Trap::InvalidModule("bad table address"))?;
        t.init_from(&items, dest, src, len)
    }

    /// `elem.drop`.
    pub fn elem_drop(&mut self, elem: ElemAddr) -> Result<(), Trap> {
        self.elems
            .get_mut(elem)
            .ok_or(Trap::InvalidModule("bad element segment address"))?
            .drop_items();
        Ok(())
    }

    /// `table.copy`, possibly across two tables. Ranges are checked before
    /// the first write; overlap within one table is handled by buffering.
    pub fn table_copy(
        &mut self,
        dst: TableAddr,
        src: TableAddr,
        dest: u32,
        src_idx: u32,
        len: u32,
    ) -> Result<(), Trap> {
        let src_items: Vec<Option<FuncAddr>> = {
            let s = self
                .tables
                .get(src)
                .ok_or(Trap::InvalidModule("bad table address"))?;
            let end = src_idx as u64 + len as u64;
            if end > s.size() as u64 {
                return Err(Trap::OutOfBoundsTable);
            }
            (src_idx..src_idx + len)
                .map(|i| s.get(i))
                .collect::<Result<_, _>>()?
        };
        let d = self
            .tables
            .get_mut(dst)
            .ok_or(Trap::InvalidModule("bad table address"))?;
        d.init_from(&src_items, dest, 0, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Limits, MemoryType};

    #[test]
    fn memory_init_respects_dropped_segments() {
        let mut store = Store::new();
        let mem = store.alloc_memory(MemoryInstance::new(&MemoryType {
            limits: Limits::new(1, None),
        }));
        let data = store.alloc_data(DataInstance::new(vec![9, 8, 7]));

        store.memory_init(mem, data, 0, 0, 3).unwrap();
        assert_eq!(store.get_memory(mem).unwrap().load_u8(1).unwrap(), 8);

        store.data_drop(data).unwrap();
        // Zero-length init from a dropped segment succeeds.
        store.memory_init(mem, data, 0, 0, 0).unwrap();
        // Non-empty range traps.
        assert!(store.memory_init(mem, data, 0, 0, 1).is_err());
    }
}
