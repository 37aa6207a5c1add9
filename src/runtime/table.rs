//! Table instance: a bounds-checked vector of function references.
//! Tables are sized at instantiation and do not grow.

use crate::error::Trap;
use crate::model::{FuncAddr, TableType};

#[derive(Debug, Clone)]
pub struct TableInstance {
    elems: Vec<Option<FuncAddr>>,
    max: Option<u32>,
}

impl TableInstance {
    /// Create a table from its declared type; elements default to null.
    pub fn new(ty: &TableType) -> Self {
        Self {
            elems: vec![None; ty.limits.min as usize],
            max: ty.limits.max,
        }
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }

    pub fn get(&self, idx: u32) -> Result<Option<FuncAddr>, Trap> {
        self.elems
            .get(idx as usize)
            .copied()
            .ok_or(Trap::OutOfBoundsTable)
    }

    pub fn set(&mut self, idx: u32, val: Option<FuncAddr>) -> Result<(), Trap> {
        let slot = self
            .elems
            .get_mut(idx as usize)
            .ok_or(Trap::OutOfBoundsTable)?;
        *slot = val;
        Ok(())
    }

    /// `table.init`: copy resolved segment items into the table. Both
    /// ranges are checked before the first write.
    pub fn init_from(
        &mut self,
        items: &[Option<FuncAddr>],
        dest: u32,
        src: u32,
        len: u32,
    ) -> Result<(), Trap> {
        let src_end = (src as u64 + len as u64) as usize;
        if src_end > items.len() {
            return Err(Trap::OutOfBoundsTable);
        }
        let dest_end = (dest as u64 + len as u64) as usize;
        if dest_end > self.elems.len() {
            return Err(Trap::OutOfBoundsTable);
        }
        self.elems[dest as usize..dest_end].copy_from_slice(&items[src as usize..src_end]);
        Ok(())
    }
}
