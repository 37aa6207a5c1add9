//! Sections: ids, headers, payload decoders, and the top-level module
//! parser. Standard sections may arrive in any order but at most once;
//! custom sections are skipped; unknown ids fail.

use super::{
    code,
    cursor::Cursor,
    leb128,
    reader::{read_name, read_vec},
    Result,
};
use crate::error::{DecodeError, DecodeErrorKind};
use crate::model::{
    CodeBody, ConstExpr, DataSegment, ElementSegment, Export, ExportDesc, FuncIdx, FuncType,
    Global, GlobalType, Import, ImportDesc, Limits, LocalDecl, MemoryType, Module, SegmentMode,
    TableType, TypeIdx,
};

/// Standard section identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            12 => SectionId::DataCount,
            _ => return None,
        })
    }
}

/// Header describing a section's id, payload length, and payload offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: SectionId,
    pub payload_len: u32,
    pub payload_offset: usize,
}

/// Read a section header: id byte plus ULEB128 payload length.
pub fn read_section_header(cur: &mut Cursor) -> Result<SectionHeader> {
    let id_offset = cur.offset();
    let id_byte = cur.read_u8()?;
    let id = SectionId::from_byte(id_byte)
        .ok_or(DecodeError::new(DecodeErrorKind::BadSectionId, id_offset))?;
    let payload_len = leb128::read_uleb_u32(cur)?;
    Ok(SectionHeader {
        id,
        payload_len,
        payload_offset: cur.offset(),
    })
}

fn malformed(cur: &Cursor) -> DecodeError {
    DecodeError::new(DecodeErrorKind::MalformedSection, cur.offset())
}

/* ---------- Type decoding helpers ---------- */

fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    let tag = cur.read_u8()?;
    match tag {
        0x00 => Ok(Limits::new(leb128::read_uleb_u32(cur)?, None)),
        0x01 => {
            let min = leb128::read_uleb_u32(cur)?;
            let max = leb128::read_uleb_u32(cur)?;
            if max < min {
                return Err(malformed(cur));
            }
            Ok(Limits::new(min, Some(max)))
        }
        _ => Err(malformed(cur)),
    }
}

fn read_func_type(cur: &mut Cursor) -> Result<FuncType> {
    let form = cur.read_u8()?;
    if form != 0x60 {
        return Err(malformed(cur));
    }
    let params = read_vec(cur, code::read_val_type)?;
    let results = read_vec(cur, code::read_val_type)?;
    Ok(FuncType { params, results })
}

fn read_ref_type(cur: &mut Cursor) -> Result<crate::model::RefType> {
    let b = cur.read_u8()?;
    match b {
        0x70 => Ok(crate::model::RefType::FuncRef),
        _ => Err(DecodeError::new(
            DecodeErrorKind::BadValueType,
            cur.offset(),
        )),
    }
}

fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    let elem = read_ref_type(cur)?;
    let limits = read_limits(cur)?;
    Ok(TableType { elem, limits })
}

fn read_memory_type(cur: &mut Cursor) -> Result<MemoryType> {
    Ok(MemoryType { limits: read_limits(cur)? })
}

fn read_global_type(cur: &mut Cursor) -> Result<GlobalType> {
    let val_type = code::read_val_type(cur)?;
    let mutable = match cur.read_u8()? {
        0x00 => false,
        0x01 => true,
        _ => return Err(malformed(cur)),
    };
    Ok(GlobalType { val_type, mutable })
}

/* ---------- Section readers ---------- */

fn read_type_section(cur: &mut Cursor) -> Result<Vec<FuncType>> {
    read_vec(cur, read_func_type)
}

fn read_import_section(cur: &mut Cursor) -> Result<(Vec<Import>, u32, u32, u32, u32)> {
    let mut funcs = 0u32;
    let mut tables = 0u32;
    let mut mems = 0u32;
    let mut globals = 0u32;

    let imports = read_vec(cur, |c| {
        let module = read_name(c)?;
        let name = read_name(c)?;
        let desc = match c.read_u8()? {
            0x00 => {
                funcs += 1;
                ImportDesc::Func(leb128::read_uleb_u32(c)?)
            }
            0x01 => {
                tables += 1;
                ImportDesc::Table(read_table_type(c)?)
            }
            0x02 => {
                mems += 1;
                ImportDesc::Memory(read_memory_type(c)?)
            }
            0x03 => {
                globals += 1;
                ImportDesc::Global(read_global_type(c)?)
            }
            _ => return Err(malformed(c)),
        };
        Ok(Import { module, name, desc })
    })?;
    Ok((imports, funcs, tables, mems, globals))
}

fn read_function_section(cur: &mut Cursor) -> Result<Vec<TypeIdx>> {
    read_vec(cur, leb128::read_uleb_u32)
}

fn read_table_section(cur: &mut Cursor) -> Result<Vec<TableType>> {
    read_vec(cur, read_table_type)
}

fn read_memory_section(cur: &mut Cursor) -> Result<Vec<MemoryType>> {
    read_vec(cur, read_memory_type)
}

fn read_global_section(cur: &mut Cursor) -> Result<Vec<Global>> {
    read_vec(cur, |c| {
        let ty = read_global_type(c)?;
        let init = code::decode_const_expr(c)?;
        Ok(Global { ty, init })
    })
}

fn read_export_section(cur: &mut Cursor) -> Result<Vec<Export>> {
    read_vec(cur, |c| {
        let name = read_name(c)?;
        let desc = match c.read_u8()? {
            0x00 => ExportDesc::Func(leb128::read_uleb_u32(c)?),
            0x01 => ExportDesc::Table(leb128::read_uleb_u32(c)?),
            0x02 => ExportDesc::Memory(leb128::read_uleb_u32(c)?),
            0x03 => ExportDesc::Global(leb128::read_uleb_u32(c)?),
            _ => return Err(malformed(c)),
        };
        Ok(Export { name, desc })
    })
}

/// Element item list encoded as function indices.
fn read_elem_func_indices(cur: &mut Cursor) -> Result<Vec<Option<FuncIdx>>> {
    Ok(read_vec(cur, leb128::read_uleb_u32)?
        .into_iter()
        .map(Some)
        .collect())
}

/// Element item list encoded as constant expressions (`ref.func`/`ref.null`).
fn read_elem_exprs(cur: &mut Cursor) -> Result<Vec<Option<FuncIdx>>> {
    read_vec(cur, |c| match code::decode_const_expr(c)? {
        ConstExpr::RefFunc(idx) => Ok(Some(idx)),
        ConstExpr::RefNull => Ok(None),
        _ => Err(malformed(c)),
    })
}

/// Element kind byte used by the non-expression encodings; funcref only.
fn read_elem_kind(cur: &mut Cursor) -> Result<()> {
    match cur.read_u8()? {
        0x00 => Ok(()),
        _ => Err(malformed(cur)),
    }
}

/// All eight element segment encodings of the bulk-memory format.
fn read_element_section(cur: &mut Cursor) -> Result<Vec<ElementSegment>> {
    read_vec(cur, |c| {
        let flags = leb128::read_uleb_u32(c)?;
        let (mode, items) = match flags {
            0 => {
                let offset = code::decode_const_expr(c)?;
                (SegmentMode::Active { index: 0, offset }, read_elem_func_indices(c)?)
            }
            1 => {
                read_elem_kind(c)?;
                (SegmentMode::Passive, read_elem_func_indices(c)?)
            }
            2 => {
                let index = leb128::read_uleb_u32(c)?;
                let offset = code::decode_const_expr(c)?;
                read_elem_kind(c)?;
                (SegmentMode::Active { index, offset }, read_elem_func_indices(c)?)
            }
            3 => {
                read_elem_kind(c)?;
                (SegmentMode::Declarative, read_elem_func_indices(c)?)
            }
            4 => {
                let offset = code::decode_const_expr(c)?;
                (SegmentMode::Active { index: 0, offset }, read_elem_exprs(c)?)
            }
            5 => {
                read_ref_type(c)?;
                (SegmentMode::Passive, read_elem_exprs(c)?)
            }
            6 => {
                let index = leb128::read_uleb_u32(c)?;
                let offset = code::decode_const_expr(c)?;
                read_ref_type(c)?;
                (SegmentMode::Active { index, offset }, read_elem_exprs(c)?)
            }
            7 => {
                read_ref_type(c)?;
                (SegmentMode::Declarative, read_elem_exprs(c)?)
            }
            _ => return Err(malformed(c)),
        };
        Ok(ElementSegment { mode, items })
    })
}

fn read_code_section(cur: &mut Cursor) -> Result<Vec<CodeBody>> {
    let count = leb128::read_uleb_u32(cur)? as usize;
    let mut out = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        let body_size = leb128::read_uleb_u32(cur)? as usize;
        let body_offset = cur.offset();
        let body_bytes = cur.read_bytes(body_size)?;
        let mut sub = Cursor::new(body_bytes);

        let locals = read_vec(&mut sub, |c| {
            let count = leb128::read_uleb_u32(c)?;
            let val_type = code::read_val_type(c)?;
            Ok(LocalDecl { count, val_type })
        })?;
        // Guard against local-count blowups before allocation happens later.
        let total: u64 = locals.iter().map(|d| d.count as u64).sum();
        if total > u32::MAX as u64 {
            return Err(DecodeError::new(DecodeErrorKind::MalformedSection, body_offset));
        }

        let expr = code::decode_expr(&mut sub)?;
        if !sub.is_eof() {
            return Err(DecodeError::new(
                DecodeErrorKind::OversizedSection,
                body_offset + sub.offset(),
            ));
        }
        out.push(CodeBody { locals, expr });
    }
    Ok(out)
}

fn read_data_section(cur: &mut Cursor) -> Result<Vec<DataSegment>> {
    read_vec(cur, |c| {
        let flags = leb128::read_uleb_u32(c)?;
        let mode = match flags {
            0 => SegmentMode::Active { index: 0, offset: code::decode_const_expr(c)? },
            1 => SegmentMode::Passive,
            2 => {
                let index = leb128::read_uleb_u32(c)?;
                SegmentMode::Active { index, offset: code::decode_const_expr(c)? }
            }
            _ => return Err(malformed(c)),
        };
        let bytes = super::reader::read_len_prefixed_bytes(c)?;
        Ok(DataSegment { mode, bytes })
    })
}

/* ---------- Top-level module parser ---------- */

const MAGIC: u32 = 0x6D73_6100; // "\0asm" little-endian
const VERSION: u32 = 0x0000_0001;

/// Parse a complete module from raw bytes.
pub fn parse_module_from_bytes(bytes: &[u8]) -> Result<Module> {
    let mut cur = Cursor::new(bytes);

    if cur.read_u32_le().map_err(|_| DecodeError::new(DecodeErrorKind::BadMagic, 0))? != MAGIC {
        return Err(DecodeError::new(DecodeErrorKind::BadMagic, 0));
    }
    if cur.read_u32_le().map_err(|_| DecodeError::new(DecodeErrorKind::BadVersion, 4))? != VERSION
    {
        return Err(DecodeError::new(DecodeErrorKind::BadVersion, 4));
    }

    let mut module = Module::default();
    let mut seen = [false; 13];

    while !cur.is_eof() {
        let header = read_section_header(&mut cur)?;
        let payload = cur.read_bytes(header.payload_len as usize)?;
        let mut pcur = Cursor::new(payload);

        if header.id == SectionId::Custom {
            // Name plus arbitrary payload, both ignored.
            let _ = read_name(&mut pcur);
            continue;
        }

        let idx = header.id as usize;
        if seen[idx] {
            return Err(DecodeError::new(
                DecodeErrorKind::DuplicateSection,
                header.payload_offset,
            ));
        }
        seen[idx] = true;

        match header.id {
            SectionId::Type => module.types = read_type_section(&mut pcur)?,
            SectionId::Import => {
                let (imports, f, t, m, g) = read_import_section(&mut pcur)?;
                module.imports = imports;
                module.imported_funcs = f;
                module.imported_tables = t;
                module.imported_memories = m;
                module.imported_globals = g;
            }
            SectionId::Function => module.func_type_indices = read_function_section(&mut pcur)?,
            SectionId::Table => module.tables = read_table_section(&mut pcur)?,
            SectionId::Memory => {
                module.memories = read_memory_section(&mut pcur)?;
                if module.memories.len() + module.imported_memories as usize > 1 {
                    return Err(DecodeError::new(
                        DecodeErrorKind::MalformedSection,
                        header.payload_offset,
                    ));
                }
            }
            SectionId::Global => module.globals = read_global_section(&mut pcur)?,
            SectionId::Export => module.exports = read_export_section(&mut pcur)?,
            SectionId::Start => module.start = Some(leb128::read_uleb_u32(&mut pcur)?),
            SectionId::Element => module.elements = read_element_section(&mut pcur)?,
            SectionId::Code => module.codes = read_code_section(&mut pcur)?,
            SectionId::Data => module.data = read_data_section(&mut pcur)?,
            SectionId::DataCount => {
                module.data_count = Some(leb128::read_uleb_u32(&mut pcur)?)
            }
            SectionId::Custom => unreachable!(),
        }

        // Offset within the payload translates back to an absolute offset.
        if pcur.remaining() != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::OversizedSection,
                header.payload_offset + pcur.offset(),
            ));
        }
    }

    if module.func_type_indices.len() != module.codes.len() {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedSection,
            cur.offset(),
        ));
    }
    if let Some(n) = module.data_count {
        if n as usize != module.data.len() {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedSection,
                cur.offset(),
            ));
        }
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_ok() {
        let data = [1u8, 0x03, 0xAA, 0xBB, 0xCC];
        let mut c = Cursor::new(&data);
        let h = read_section_header(&mut c).unwrap();
        assert_eq!(h.id, SectionId::Type);
        assert_eq!(h.payload_len, 3);
        assert_eq!(h.payload_offset, 2);
    }

    #[test]
    fn empty_module_parses() {
        let bytes = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        let m = parse_module_from_bytes(&bytes).unwrap();
        assert!(m.types.is_empty());
        assert!(m.codes.is_empty());
    }

    #[test]
    fn bad_magic_rejected() {
        let bytes = [0x00, 0x61, 0x73, 0x6E, 0x01, 0x00, 0x00, 0x00];
        let err = parse_module_from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::BadMagic);
    }

    #[test]
    fn bad_version_rejected() {
        let bytes = [0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00];
        let err = parse_module_from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::BadVersion);
    }

    #[test]
    fn duplicate_section_rejected() {
        // Two empty type sections.
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x01, 0x00, // type section, 0 entries
            0x01, 0x01, 0x00, // type section again
        ];
        let err = parse_module_from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::DuplicateSection);
    }

    #[test]
    fn custom_section_skipped() {
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x00, 0x06, 0x04, b'n', b'a', b'm', b'e', 0xFF, // custom "name" + junk
        ];
        assert!(parse_module_from_bytes(&bytes).is_ok());
    }
}
