//! Expression decoder: turns raw instruction bytes into the materialized
//! `Instr`/`Expr` tree, and decodes the constant expressions used by
//! global initializers and segment offsets.

use super::{cursor::Cursor, leb128, Result};
use crate::error::{DecodeError, DecodeErrorKind};
use crate::model::{BlockType, ConstExpr, Expr, Instr, MemArg, ValType};

/// Maximum block nesting the decoder accepts. Bounds decode recursion and,
/// transitively, interpreter recursion per call frame.
pub const MAX_BLOCK_NESTING: usize = 256;

/// Structural opcodes the decoder dispatches on.
pub mod op {
    pub const UNREACHABLE: u8 = 0x00;
    pub const NOP: u8 = 0x01;
    pub const BLOCK: u8 = 0x02;
    pub const LOOP: u8 = 0x03;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0B;
    pub const BR: u8 = 0x0C;
    pub const BR_IF: u8 = 0x0D;
    pub const BR_TABLE: u8 = 0x0E;
    pub const RETURN: u8 = 0x0F;
    pub const CALL: u8 = 0x10;
    pub const CALL_INDIRECT: u8 = 0x11;

    pub const DROP: u8 = 0x1A;
    pub const SELECT: u8 = 0x1B;

    pub const LOCAL_GET: u8 = 0x20;
    pub const LOCAL_SET: u8 = 0x21;
    pub const LOCAL_TEE: u8 = 0x22;
    pub const GLOBAL_GET: u8 = 0x23;
    pub const GLOBAL_SET: u8 = 0x24;

    pub const MEMORY_SIZE: u8 = 0x3F;
    pub const MEMORY_GROW: u8 = 0x40;

    pub const I32_CONST: u8 = 0x41;
    pub const I64_CONST: u8 = 0x42;
    pub const F32_CONST: u8 = 0x43;
    pub const F64_CONST: u8 = 0x44;

    pub const REF_NULL: u8 = 0xD0;
    pub const REF_IS_NULL: u8 = 0xD1;
    pub const REF_FUNC: u8 = 0xD2;

    /// Prefix byte for the bulk-memory instruction group.
    pub const PREFIX_FC: u8 = 0xFC;

    // 0xFC sub-opcodes.
    pub const MEMORY_INIT: u32 = 8;
    pub const DATA_DROP: u32 = 9;
    pub const MEMORY_COPY: u32 = 10;
    pub const MEMORY_FILL: u32 = 11;
    pub const TABLE_INIT: u32 = 12;
    pub const ELEM_DROP: u32 = 13;
    pub const TABLE_COPY: u32 = 14;

    /// Heap type immediate of `ref.null`.
    pub const HEAPTYPE_FUNC: u8 = 0x70;
}

fn bad_opcode(cur: &Cursor) -> DecodeError {
    DecodeError::new(DecodeErrorKind::BadOpcode, cur.offset())
}

pub(crate) fn read_val_type(cur: &mut Cursor) -> Result<ValType> {
    let b = cur.read_u8()?;
    match b {
        0x7F => Ok(ValType::I32),
        0x7E => Ok(ValType::I64),
        0x7D => Ok(ValType::F32),
        0x7C => Ok(ValType::F64),
        0x70 => Ok(ValType::FuncRef),
        _ => Err(DecodeError::new(
            DecodeErrorKind::BadValueType,
            cur.offset(),
        )),
    }
}

/// Block type: 0x40 (empty), an inline value type, or an SLEB33-encoded
/// non-negative type index.
fn read_block_type(cur: &mut Cursor) -> Result<BlockType> {
    match cur.peek_u8()? {
        0x40 => {
            cur.read_u8()?;
            Ok(BlockType::Empty)
        }
        0x7F | 0x7E | 0x7D | 0x7C | 0x70 => Ok(BlockType::Value(read_val_type(cur)?)),
        _ => {
            let idx = leb128::read_sleb_i33(cur)?;
            if idx < 0 {
                return Err(DecodeError::new(
                    DecodeErrorKind::BadValueType,
                    cur.offset(),
                ));
            }
            Ok(BlockType::Type(idx as u32))
        }
    }
}

fn read_memarg(cur: &mut Cursor) -> Result<MemArg> {
    let align = leb128::read_uleb_u32(cur)?;
    let offset = leb128::read_uleb_u32(cur)?;
    Ok(MemArg { align, offset })
}

/// How a nested instruction sequence was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End,
    Else,
}

/// Decode a function-level expression: instructions up to the closing `end`.
pub fn decode_expr(cur: &mut Cursor) -> Result<Expr> {
    let (expr, term) = decode_block(cur, 0)?;
    match term {
        Terminator::End => Ok(expr),
        Terminator::Else => Err(bad_opcode(cur)),
    }
}

fn decode_block(cur: &mut Cursor, depth: usize) -> Result<(Expr, Terminator)> {
    if depth > MAX_BLOCK_NESTING {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedSection,
            cur.offset(),
        ));
    }
    let mut instrs = Vec::new();
    loop {
        let opcode = cur.read_u8()?;
        let instr = match opcode {
            op::END => return Ok((Expr::new(instrs), Terminator::End)),
            op::ELSE => return Ok((Expr::new(instrs), Terminator::Else)),

            op::UNREACHABLE => Instr::Unreachable,
            op::NOP => Instr::Nop,
            op::BLOCK => {
                let ty = read_block_type(cur)?;
                let (body, term) = decode_block(cur, depth + 1)?;
                if term != Terminator::End {
                    return Err(bad_opcode(cur));
                }
                Instr::Block { ty, body }
            }
            op::LOOP => {
                let ty = read_block_type(cur)?;
                let (body, term) = decode_block(cur, depth + 1)?;
                if term != Terminator::End {
                    return Err(bad_opcode(cur));
                }
                Instr::Loop { ty, body }
            }
            op::IF => {
                let ty = read_block_type(cur)?;
                let (then_body, term) = decode_block(cur, depth + 1)?;
                let else_body = match term {
                    Terminator::End => None,
                    Terminator::Else => {
                        let (e, term2) = decode_block(cur, depth + 1)?;
                        if term2 != Terminator::End {
                            return Err(bad_opcode(cur));
                        }
                        Some(e)
                    }
                };
                Instr::If { ty, then_body, else_body }
            }
            op::BR => Instr::Br(leb128::read_uleb_u32(cur)?),
            op::BR_IF => Instr::BrIf(leb128::read_uleb_u32(cur)?),
            op::BR_TABLE => {
                let targets = super::reader::read_vec(cur, leb128::read_uleb_u32)?;
                let default = leb128::read_uleb_u32(cur)?;
                Instr::BrTable { targets: targets.into_boxed_slice(), default }
            }
            op::RETURN => Instr::Return,
            op::CALL => Instr::Call(leb128::read_uleb_u32(cur)?),
            op::CALL_INDIRECT => {
                let type_idx = leb128::read_uleb_u32(cur)?;
                let table = leb128::read_uleb_u32(cur)?;
                Instr::CallIndirect { type_idx, table }
            }

            op::DROP => Instr::Drop,
            op::SELECT => Instr::Select,

            op::LOCAL_GET => Instr::LocalGet(leb128::read_uleb_u32(cur)?),
            op::LOCAL_SET => Instr::LocalSet(leb128::read_uleb_u32(cur)?),
            op::LOCAL_TEE => Instr::LocalTee(leb128::read_uleb_u32(cur)?),
            op::GLOBAL_GET => Instr::GlobalGet(leb128::read_uleb_u32(cur)?),
            op::GLOBAL_SET => Instr::GlobalSet(leb128::read_uleb_u32(cur)?),

            0x28 => Instr::I32Load(read_memarg(cur)?),
            0x29 => Instr::I64Load(read_memarg(cur)?),
            0x2A => Instr::F32Load(read_memarg(cur)?),
            0x2B => Instr::F64Load(read_memarg(cur)?),
            0x2C => Instr::I32Load8S(read_memarg(cur)?),
            0x2D => Instr::I32Load8U(read_memarg(cur)?),
            0x2E => Instr::I32Load16S(read_memarg(cur)?),
            0x2F => Instr::I32Load16U(read_memarg(cur)?),
            0x30 => Instr::I64Load8S(read_memarg(cur)?),
            0x31 => Instr::I64Load8U(read_memarg(cur)?),
            0x32 => Instr::I64Load16S(read_memarg(cur)?),
            0x33 => Instr::I64Load16U(read_memarg(cur)?),
            0x34 => Instr::I64Load32S(read_memarg(cur)?),
            0x35 => Instr::I64Load32U(read_memarg(cur)?),

            0x36 => Instr::I32Store(read_memarg(cur)?),
            0x37 => Instr::I64Store(read_memarg(cur)?),
            0x38 => Instr::F32Store(read_memarg(cur)?),
            0x39 => Instr::F64Store(read_memarg(cur)?),
            0x3A => Instr::I32Store8(read_memarg(cur)?),
            0x3B => Instr::I32Store16(read_memarg(cur)?),
            0x3C => Instr::I64Store8(read_memarg(cur)?),
            0x3D => Instr::I64Store16(read_memarg(cur)?),
            0x3E => Instr::I64Store32(read_memarg(cur)?),

            op::MEMORY_SIZE => {
                let _mem = leb128::read_uleb_u32(cur)?;
                Instr::MemorySize
            }
            op::MEMORY_GROW => {
                let _mem = leb128::read_uleb_u32(cur)?;
                Instr::MemoryGrow
            }

            op::I32_CONST => Instr::I32Const(leb128::read_sleb_i32(cur)?),
            op::I64_CONST => Instr::I64Const(leb128::read_sleb_i64(cur)?),
            op::F32_CONST => {
                let b = cur.read_bytes(4)?;
                Instr::F32Const(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            op::F64_CONST => {
                let b = cur.read_bytes(8)?;
                Instr::F64Const(u64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }

            0x45 => Instr::I32Eqz,
            0x46 => Instr::I32Eq,
            0x47 => Instr::I32Ne,
            0x48 => Instr::I32LtS,
            0x49 => Instr::I32LtU,
            0x4A => Instr::I32GtS,
            0x4B => Instr::I32GtU,
            0x4C => Instr::I32LeS,
            0x4D => Instr::I32LeU,
            0x4E => Instr::I32GeS,
            0x4F => Instr::I32GeU,

            0x50 => Instr::I64Eqz,
            0x51 => Instr::I64Eq,
            0x52 => Instr::I64Ne,
            0x53 => Instr::I64LtS,
            0x54 => Instr::I64LtU,
            0x55 => Instr::I64GtS,
            0x56 => Instr::I64GtU,
            0x57 => Instr::I64LeS,
            0x58 => Instr::I64LeU,
            0x59 => Instr::I64GeS,
            0x5A => Instr::I64GeU,

            0x5B => Instr::F32Eq,
            0x5C => Instr::F32Ne,
            0x5D => Instr::F32Lt,
            0x5E => Instr::F32Gt,
            0x5F => Instr::F32Le,
            0x60 => Instr::F32Ge,

            0x61 => Instr::F64Eq,
            0x62 => Instr::F64Ne,
            0x63 => Instr::F64Lt,
            0x64 => Instr::F64Gt,
            0x65 => Instr::F64Le,
            0x66 => Instr::F64Ge,

            0x67 => Instr::I32Clz,
            0x68 => Instr::I32Ctz,
            0x69 => Instr::I32Popcnt,
            0x6A => Instr::I32Add,
            0x6B => Instr::I32Sub,
            0x6C => Instr::I32Mul,
            0x6D => Instr::I32DivS,
            0x6E => Instr::I32DivU,
            0x6F => Instr::I32RemS,
            0x70 => Instr::I32RemU,
            0x71 => Instr::I32And,
            0x72 => Instr::I32Or,
            0x73 => Instr::I32Xor,
            0x74 => Instr::I32Shl,
            0x75 => Instr::I32ShrS,
            0x76 => Instr::I32ShrU,
            0x77 => Instr::I32Rotl,
            0x78 => Instr::I32Rotr,

            0x79 => Instr::I64Clz,
            0x7A => Instr::I64Ctz,
            0x7B => Instr::I64Popcnt,
            0x7C => Instr::I64Add,
            0x7D => Instr::I64Sub,
            0x7E => Instr::I64Mul,
            0x7F => Instr::I64DivS,
            0x80 => Instr::I64DivU,
            0x81 => Instr::I64RemS,
            0x82 => Instr::I64RemU,
            0x83 => Instr::I64And,
            0x84 => Instr::I64Or,
            0x85 => Instr::I64Xor,
            0x86 => Instr::I64Shl,
            0x87 => Instr::I64ShrS,
            0x88 => Instr::I64ShrU,
            0x89 => Instr::I64Rotl,
            0x8A => Instr::I64Rotr,

            0x8B => Instr::F32Abs,
            0x8C => Instr::F32Neg,
            0x8D => Instr::F32Ceil,
            0x8E => Instr::F32Floor,
            0x8F => Instr::F32Trunc,
            0x90 => Instr::F32Nearest,
            0x91 => Instr::F32Sqrt,
            0x92 => Instr::F32Add,
            0x93 => Instr::F32Sub,
            0x94 => Instr::F32Mul,
            0x95 => Instr::F32Div,
            0x96 => Instr::F32Min,
            0x97 => Instr::F32Max,
            0x98 => Instr::F32Copysign,

            0x99 => Instr::F64Abs,
            0x9A => Instr::F64Neg,
            0x9B => Instr::F64Ceil,
            0x9C => Instr::F64Floor,
            0x9D => Instr::F64Trunc,
            0x9E => Instr::F64Nearest,
            0x9F => Instr::F64Sqrt,
            0xA0 => Instr::F64Add,
            0xA1 => Instr::F64Sub,
            0xA2 => Instr::F64Mul,
            0xA3 => Instr::F64Div,
            0xA4 => Instr::F64Min,
            0xA5 => Instr::F64Max,
            0xA6 => Instr::F64Copysign,

            0xA7 => Instr::I32WrapI64,
            0xA8 => Instr::I32TruncF32S,
            0xA9 => Instr::I32TruncF32U,
            0xAA => Instr::I32TruncF64S,
            0xAB => Instr::I32TruncF64U,
            0xAC => Instr::I64ExtendI32S,
            0xAD => Instr::I64ExtendI32U,
            0xAE => Instr::I64TruncF32S,
            0xAF => Instr::I64TruncF32U,
            0xB0 => Instr::I64TruncF64S,
            0xB1 => Instr::I64TruncF64U,
            0xB2 => Instr::F32ConvertI32S,
            0xB3 => Instr::F32ConvertI32U,
            0xB4 => Instr::F32ConvertI64S,
            0xB5 => Instr::F32ConvertI64U,
            0xB6 => Instr::F32DemoteF64,
            0xB7 => Instr::F64ConvertI32S,
            0xB8 => Instr::F64ConvertI32U,
            0xB9 => Instr::F64ConvertI64S,
            0xBA => Instr::F64ConvertI64U,
            0xBB => Instr::F64PromoteF32,
            0xBC => Instr::I32ReinterpretF32,
            0xBD => Instr::I64ReinterpretF64,
            0xBE => Instr::F32ReinterpretI32,
            0xBF => Instr::F64ReinterpretI64,

            0xC0 => Instr::I32Extend8S,
            0xC1 => Instr::I32Extend16S,
            0xC2 => Instr::I64Extend8S,
            0xC3 => Instr::I64Extend16S,
            0xC4 => Instr::I64Extend32S,

            op::REF_NULL => {
                let heap = cur.read_u8()?;
                if heap != op::HEAPTYPE_FUNC {
                    return Err(DecodeError::new(
                        DecodeErrorKind::BadValueType,
                        cur.offset(),
                    ));
                }
                Instr::RefNull
            }
            op::REF_IS_NULL => Instr::RefIsNull,
            op::REF_FUNC => Instr::RefFunc(leb128::read_uleb_u32(cur)?),

            op::PREFIX_FC => {
                let sub = leb128::read_uleb_u32(cur)?;
                match sub {
                    op::MEMORY_INIT => {
                        let data = leb128::read_uleb_u32(cur)?;
                        let _mem = leb128::read_uleb_u32(cur)?;
                        Instr::MemoryInit(data)
                    }
                    op::DATA_DROP => Instr::DataDrop(leb128::read_uleb_u32(cur)?),
                    op::MEMORY_COPY => {
                        let _dst = leb128::read_uleb_u32(cur)?;
                        let _src = leb128::read_uleb_u32(cur)?;
                        Instr::MemoryCopy
                    }
                    op::MEMORY_FILL => {
                        let _mem = leb128::read_uleb_u32(cur)?;
                        Instr::MemoryFill
                    }
                    op::TABLE_INIT => {
                        let elem = leb128::read_uleb_u32(cur)?;
                        let table = leb128::read_uleb_u32(cur)?;
                        Instr::TableInit { elem, table }
                    }
                    op::ELEM_DROP => Instr::ElemDrop(leb128::read_uleb_u32(cur)?),
                    op::TABLE_COPY => {
                        let dst = leb128::read_uleb_u32(cur)?;
                        let src = leb128::read_uleb_u32(cur)?;
                        Instr::TableCopy { dst, src }
                    }
                    _ => return Err(bad_opcode(cur)),
                }
            }

            _ => return Err(bad_opcode(cur)),
        };
        instrs.push(instr);
    }
}

/// Decode a constant expression: one producing instruction plus `end`.
pub fn decode_const_expr(cur: &mut Cursor) -> Result<ConstExpr> {
    let opcode = cur.read_u8()?;
    let value = match opcode {
        op::I32_CONST => ConstExpr::I32(leb128::read_sleb_i32(cur)?),
        op::I64_CONST => ConstExpr::I64(leb128::read_sleb_i64(cur)?),
        op::F32_CONST => {
            let b = cur.read_bytes(4)?;
            ConstExpr::F32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        op::F64_CONST => {
            let b = cur.read_bytes(8)?;
            ConstExpr::F64(u64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
        }
        op::GLOBAL_GET => ConstExpr::GlobalGet(leb128::read_uleb_u32(cur)?),
        op::REF_NULL => {
            let heap = cur.read_u8()?;
            if heap != op::HEAPTYPE_FUNC {
                return Err(DecodeError::new(
                    DecodeErrorKind::BadValueType,
                    cur.offset(),
                ));
            }
            ConstExpr::RefNull
        }
        op::REF_FUNC => ConstExpr::RefFunc(leb128::read_uleb_u32(cur)?),
        _ => return Err(bad_opcode(cur)),
    };
    if cur.read_u8()? != op::END {
        return Err(bad_opcode(cur));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_flat_body() {
        // local.get 0, local.get 1, i32.add, end
        let bytes = [0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B];
        let mut c = Cursor::new(&bytes);
        let e = decode_expr(&mut c).unwrap();
        assert_eq!(
            e.instrs,
            vec![Instr::LocalGet(0), Instr::LocalGet(1), Instr::I32Add]
        );
        assert!(c.is_eof());
    }

    #[test]
    fn decodes_nested_if_else() {
        // if (result i32) i32.const 1 else i32.const 2 end, end
        let bytes = [0x04, 0x7F, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0B, 0x0B];
        let mut c = Cursor::new(&bytes);
        let e = decode_expr(&mut c).unwrap();
        match &e.instrs[0] {
            Instr::If { ty, then_body, else_body } => {
                assert_eq!(*ty, BlockType::Value(ValType::I32));
                assert_eq!(then_body.instrs, vec![Instr::I32Const(1)]);
                assert_eq!(
                    else_body.as_ref().unwrap().instrs,
                    vec![Instr::I32Const(2)]
                );
            }
            other => panic!("unexpected instr: {other:?}"),
        }
    }

    #[test]
    fn decodes_br_table() {
        // br_table 2 targets (0 1) default 0, end
        let bytes = [0x0E, 0x02, 0x00, 0x01, 0x00, 0x0B];
        let mut c = Cursor::new(&bytes);
        let e = decode_expr(&mut c).unwrap();
        assert_eq!(
            e.instrs[0],
            Instr::BrTable { targets: vec![0, 1].into_boxed_slice(), default: 0 }
        );
    }

    #[test]
    fn rejects_unknown_opcode() {
        let bytes = [0xF5, 0x0B];
        let mut c = Cursor::new(&bytes);
        assert_eq!(
            decode_expr(&mut c).unwrap_err().kind,
            DecodeErrorKind::BadOpcode
        );
    }

    #[test]
    fn rejects_stray_else() {
        let bytes = [0x05, 0x0B];
        let mut c = Cursor::new(&bytes);
        assert!(decode_expr(&mut c).is_err());
    }

    #[test]
    fn const_expr_forms() {
        let mut c = Cursor::new(&[0x41, 0x2A, 0x0B]);
        assert_eq!(decode_const_expr(&mut c).unwrap(), ConstExpr::I32(42));
        let mut c = Cursor::new(&[0x23, 0x03, 0x0B]);
        assert_eq!(decode_const_expr(&mut c).unwrap(), ConstExpr::GlobalGet(3));
        let mut c = Cursor::new(&[0xD0, 0x70, 0x0B]);
        assert_eq!(decode_const_expr(&mut c).unwrap(), ConstExpr::RefNull);
        let mut c = Cursor::new(&[0xD2, 0x01, 0x0B]);
        assert_eq!(decode_const_expr(&mut c).unwrap(), ConstExpr::RefFunc(1));
    }
}
