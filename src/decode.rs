use crate::ast::*;
use crate::byte_iter::ByteIter;
use crate::error::*;
use crate::memory::{LoadOp, StoreOp};
use crate::numeric::NumOp;
use crate::value::{ValType, Value, F32, F64};

pub const MAGIC_HEADER: &[u8; 4] = b"\0asm";
pub const VERSION: u32 = 1;
pub const MAX_LOCALS: u64 = 50000;
/// Deepest allowed nesting of `block`, `loop` and `if` within one function.
pub const MAX_NESTING: usize = 1024;

const SECTION_START: u8 = 8;
const SECTION_CODE: u8 = 10;
const SECTION_LAST: u8 = 11;

macro_rules! assert_not_empty {
    ($it:expr) => { if $it.empty() { return compile(UNEXPECTED_END); } };
}

/// Decodes a binary module. Custom sections are skipped.
pub fn decode(bytes: &[u8]) -> Result<Module, Error> {
    if bytes.len() < 4 || &bytes[0..4] != MAGIC_HEADER { return compile(NO_MAGIC_HEADER); }
    if bytes.len() < 8 { return compile(UNEXPECTED_END); }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != VERSION { return compile(UNKNOWN_BINARY_VERSION); }

    let mut decoder = Decoder::default();
    let mut it = ByteIter::new(bytes, 8);
    let mut last_id = 0u8;
    while !it.empty() {
        let id = it.read_u8()?;
        let len = it.read_u32()? as usize;
        if !it.has_n_left(len) { return compile(UNEXPECTED_END); }
        let mut section = ByteIter::new(it.read_bytes(len)?, 0);
        match id {
            0 => continue,
            SECTION_START if last_id == SECTION_START => return compile(MULTIPLE_START),
            1..=SECTION_LAST if id <= last_id => return compile(SECTION_OUT_OF_ORDER),
            1..=SECTION_LAST => last_id = id,
            _ => return compile(INVALID_SECTION_ID),
        }
        decoder.section(id, &mut section)?;
        if !section.empty() { return compile(SECTION_SIZE_MISMATCH); }
    }
    decoder.finish()
}

#[derive(Default)]
struct Decoder {
    module: Module,
    func_types: Vec<u32>,
    code_seen: bool,
}

impl Decoder {
    fn section(&mut self, id: u8, it: &mut ByteIter) -> Result<(), Error> {
        match id {
            1 => self.parse_type_section(it),
            2 => self.parse_import_section(it),
            3 => self.parse_function_section(it),
            4 => self.parse_table_section(it),
            5 => self.parse_memory_section(it),
            6 => self.parse_global_section(it),
            7 => self.parse_export_section(it),
            SECTION_START => self.parse_start_section(it),
            9 => self.parse_element_section(it),
            SECTION_CODE => self.parse_code_section(it),
            _ => self.parse_data_section(it),
        }
    }

    fn finish(self) -> Result<Module, Error> {
        if !self.code_seen && !self.func_types.is_empty() { return compile(FUNC_CODE_INCONSISTENT); }
        Ok(self.module)
    }

    fn parse_type_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.module.types = it.read_vec(|it| {
            if it.read_u8()? != 0x60 { return compile(INVALID_VALUE_TYPE); }
            let params = it.read_vec(read_val_type)?;
            let results = it.read_vec(read_val_type)?;
            Ok(FuncType { params, results })
        })?;
        Ok(())
    }

    fn parse_import_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.module.imports = it.read_vec(|it| {
            assert_not_empty!(it);
            let module = it.read_name()?;
            let field = it.read_name()?;
            let desc = match it.read_u8()? {
                0 => ImportDesc::Func(it.read_u32()?),
                1 => ImportDesc::Table(read_table_type(it)?),
                2 => ImportDesc::Memory(read_limits(it)?),
                3 => ImportDesc::Global(read_global_type(it)?),
                _ => return compile(MALFORMED_IMPORT_KIND),
            };
            Ok(Import { module, field, desc })
        })?;
        Ok(())
    }

    fn parse_function_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.func_types = it.read_vec(|it| it.read_u32())?;
        Ok(())
    }

    fn parse_table_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.module.tables = it.read_vec(read_table_type)?;
        Ok(())
    }

    fn parse_memory_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.module.memories = it.read_vec(read_limits)?;
        Ok(())
    }

    fn parse_global_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.module.globals = it.read_vec(|it| {
            let ty = read_global_type(it)?;
            let init = read_const_expr(it)?;
            Ok(Global { ty, init })
        })?;
        Ok(())
    }

    fn parse_export_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.module.exports = it.read_vec(|it| {
            assert_not_empty!(it);
            let name = it.read_name()?;
            let kind = it.read_u8()?;
            let idx = it.read_u32()?;
            let desc = match kind {
                0 => ExportDesc::Func(idx),
                1 => ExportDesc::Table(idx),
                2 => ExportDesc::Memory(idx),
                3 => ExportDesc::Global(idx),
                _ => return compile(MALFORMED_IMPORT_KIND),
            };
            Ok(Export { name, desc })
        })?;
        Ok(())
    }

    fn parse_start_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        if self.module.start.is_some() { return compile(MULTIPLE_START); }
        self.module.start = Some(it.read_u32()?);
        Ok(())
    }

    fn parse_element_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.module.elems = it.read_vec(|it| {
            let table = it.read_u32()?;
            let offset = read_const_expr(it)?;
            let funcs = it.read_vec(|it| it.read_u32())?;
            Ok(ElemSegment { table, offset, funcs })
        })?;
        Ok(())
    }

    fn parse_code_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.code_seen = true;
        let n_bodies = it.read_u32()? as usize;
        if n_bodies != self.func_types.len() { return compile(FUNC_CODE_INCONSISTENT); }

        let mut funcs = Vec::with_capacity(n_bodies);
        for &type_idx in &self.func_types {
            let size = it.read_u32()? as usize;
            let mut body_it = ByteIter::new(it.read_bytes(size)?, 0);

            let decls = body_it.read_vec(|it| Ok((it.read_u32()?, read_val_type(it)?)))?;
            let total: u64 = decls.iter().map(|(n, _)| *n as u64).sum();
            if total > MAX_LOCALS { return compile(TOO_MANY_LOCALS); }
            let locals = decls.into_iter()
                .flat_map(|(n, ty)| std::iter::repeat(ty).take(n as usize))
                .collect();

            let body = read_expr(&mut body_it)?;
            if !body_it.empty() { return compile(SECTION_SIZE_MISMATCH); }
            funcs.push(Function { type_idx, locals, body });
        }
        self.module.funcs = funcs;
        Ok(())
    }

    fn parse_data_section(&mut self, it: &mut ByteIter) -> Result<(), Error> {
        self.module.data = it.read_vec(|it| {
            let memory = it.read_u32()?;
            let offset = read_const_expr(it)?;
            let len = it.read_u32()? as usize;
            let bytes = it.read_bytes(len)?.to_vec();
            Ok(DataSegment { memory, offset, bytes })
        })?;
        Ok(())
    }
}

// ---------------- Helper Functions ----------------

fn read_val_type(it: &mut ByteIter) -> Result<ValType, Error> {
    ValType::from_byte(it.read_u8()?).ok_or(Error::compile(INVALID_VALUE_TYPE))
}

fn read_limits(it: &mut ByteIter) -> Result<Limits, Error> {
    let flags = it.read_u8()?;
    let min = it.read_u32()?;
    let max = match flags {
        0 => None,
        1 => Some(it.read_u32()?),
        _ => return compile(INT_TOO_LARGE),
    };
    Ok(Limits { min, max })
}

fn read_table_type(it: &mut ByteIter) -> Result<Limits, Error> {
    if it.read_u8()? != 0x70 { return compile(MALFORMED_REF_TYPE); }
    read_limits(it)
}

fn read_global_type(it: &mut ByteIter) -> Result<GlobalType, Error> {
    let ty = read_val_type(it)?;
    let mutable = match it.read_u8()? {
        0 => false,
        1 => true,
        _ => return compile(INVALID_MUTABILITY),
    };
    Ok(GlobalType { ty, mutable })
}

fn read_const_expr(it: &mut ByteIter) -> Result<ConstExpr, Error> {
    let expr = match it.read_u8()? {
        0x41 => ConstExpr::I32(it.read_i32()?),
        0x42 => ConstExpr::I64(it.read_i64()?),
        0x43 => ConstExpr::F32(F32::from_bits(it.read_f32_bits()?)),
        0x44 => ConstExpr::F64(F64::from_bits(it.read_f64_bits()?)),
        0x23 => ConstExpr::GlobalGet(it.read_u32()?),
        _ => return compile(CONST_EXP_REQUIRED),
    };
    if it.read_u8()? != 0x0b { return compile(END_EXPECTED); }
    Ok(expr)
}

fn read_block_type(it: &mut ByteIter) -> Result<BlockType, Error> {
    match it.read_u8()? {
        0x40 => Ok(BlockType::Empty),
        b => ValType::from_byte(b).map(BlockType::Value).ok_or(Error::compile(INVALID_VALUE_TYPE)),
    }
}

fn read_mem_arg(it: &mut ByteIter) -> Result<MemArg, Error> {
    let align = it.read_u32()?;
    let offset = it.read_u32()? as i64;
    Ok(MemArg { align, offset })
}

fn read_zero_flag(it: &mut ByteIter) -> Result<(), Error> {
    if it.read_u8()? != 0 { return compile(ZERO_FLAG_EXPECTED); }
    Ok(())
}

/// A structured instruction whose body is still being read.
enum Open {
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else(BlockType, Vec<Instr>),
}

/// Reads a function body up to and including its final `end`. Nested blocks
/// are kept on an explicit stack, bounded by [`MAX_NESTING`].
fn read_expr(it: &mut ByteIter) -> Result<Vec<Instr>, Error> {
    let mut open: Vec<(Open, Vec<Instr>)> = Vec::new();
    let mut out = Vec::new();
    loop {
        let op = it.read_u8()?;
        let instr = match op {
            0x02..=0x04 => {
                let bt = read_block_type(it)?;
                if open.len() >= MAX_NESTING { return compile(NESTING_TOO_DEEP); }
                let kind = match op {
                    0x02 => Open::Block(bt),
                    0x03 => Open::Loop(bt),
                    _ => Open::If(bt),
                };
                open.push((kind, std::mem::take(&mut out)));
                continue;
            }
            0x05 => match open.pop() {
                Some((Open::If(bt), parent)) => {
                    open.push((Open::Else(bt, std::mem::take(&mut out)), parent));
                    continue;
                }
                _ => return compile(END_EXPECTED),
            },
            0x0b => match open.pop() {
                None => return Ok(out),
                Some((kind, parent)) => {
                    let body = std::mem::replace(&mut out, parent);
                    match kind {
                        Open::Block(bt) => Instr::Block(bt, body),
                        Open::Loop(bt) => Instr::Loop(bt, body),
                        Open::If(bt) => Instr::If(bt, body, Vec::new()),
                        Open::Else(bt, then) => Instr::If(bt, then, body),
                    }
                }
            },
            _ => read_instr(it, op)?,
        };
        out.push(instr);
    }
}

/// Reads the immediates of a non-structured instruction.
fn read_instr(it: &mut ByteIter, op: u8) -> Result<Instr, Error> {
    Ok(match op {
        0x00 => Instr::Unreachable,
        0x01 => Instr::Nop,
        0x0c => Instr::Br(it.read_u32()?),
        0x0d => Instr::BrIf(it.read_u32()?),
        0x0e => {
            let targets = it.read_vec(|it| it.read_u32())?;
            Instr::BrTable(targets, it.read_u32()?)
        }
        0x0f => Instr::Return,
        0x10 => Instr::Call(it.read_u32()?),
        0x11 => {
            let type_idx = it.read_u32()?;
            read_zero_flag(it)?;
            Instr::CallIndirect(type_idx)
        }
        0x1a => Instr::Drop,
        0x1b => Instr::Select,
        0x20 => Instr::LocalGet(it.read_u32()?),
        0x21 => Instr::LocalSet(it.read_u32()?),
        0x22 => Instr::LocalTee(it.read_u32()?),
        0x23 => Instr::GlobalGet(it.read_u32()?),
        0x24 => Instr::GlobalSet(it.read_u32()?),
        0x28..=0x35 => Instr::Load(LoadOp::ALL[(op - 0x28) as usize], read_mem_arg(it)?),
        0x36..=0x3e => Instr::Store(StoreOp::ALL[(op - 0x36) as usize], read_mem_arg(it)?),
        0x3f => { read_zero_flag(it)?; Instr::MemorySize }
        0x40 => { read_zero_flag(it)?; Instr::MemoryGrow }
        0x41 => Instr::Const(Value::I32(it.read_i32()?)),
        0x42 => Instr::Const(Value::I64(it.read_i64()?)),
        0x43 => Instr::Const(Value::F32(F32::from_bits(it.read_f32_bits()?))),
        0x44 => Instr::Const(Value::F64(F64::from_bits(it.read_f64_bits()?))),
        _ => Instr::Num(NumOp::from_opcode(op).ok_or(Error::compile(ILLEGAL_OP))?),
    })
}
