//! Decoded module representation. Function bodies keep their structured
//! control flow here; `flatten` lowers them for execution.

use crate::memory::{LoadOp, StoreOp};
use crate::numeric::NumOp;
use crate::value::{ValType, Value, F32, F64};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: impl Into<Vec<ValType>>, results: impl Into<Vec<ValType>>) -> Self {
        Self { params: params.into(), results: results.into() }
    }
}

impl Display for FuncType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let join = |tys: &[ValType]| tys.iter().map(|t| t.name()).collect::<Vec<_>>().join(" ");
        write!(f, "[{}] -> [{}]", join(&self.params), join(&self.results))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    /// Whether an object with these limits can stand in for an import declaring `required`.
    pub fn satisfies(&self, required: &Limits) -> bool {
        if self.min < required.min { return false; }
        match (required.max, self.max) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(want), Some(have)) => have <= want,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub ty: ValType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    Func(u32),
    Table(Limits),
    Memory(Limits),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExportDesc {
    Func(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
}

/// Initialiser of a global or a segment offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(F32),
    F64(F64),
    GlobalGet(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub type_idx: u32,
    pub locals: Vec<ValType>,
    pub body: Vec<Instr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElemSegment {
    pub table: u32,
    pub offset: ConstExpr,
    pub funcs: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    pub memory: u32,
    pub offset: ConstExpr,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
}

impl BlockType {
    pub fn arity(self) -> u32 {
        match self {
            BlockType::Empty => 0,
            BlockType::Value(_) => 1,
        }
    }
}

/// Static part of a memory access. The offset is kept signed and wide so an
/// out-of-range value is reported when the access executes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemArg {
    pub align: u32,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Unreachable,
    /// Explicit trap, produced by hosts that synthesise bodies.
    Trap,
    Nop,
    Block(BlockType, Vec<Instr>),
    Loop(BlockType, Vec<Instr>),
    /// `if` with its then-arm and (possibly empty) else-arm.
    If(BlockType, Vec<Instr>, Vec<Instr>),
    Br(u32),
    BrIf(u32),
    BrTable(Vec<u32>, u32),
    Return,
    Call(u32),
    CallIndirect(u32),
    Drop,
    Select,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    Load(LoadOp, MemArg),
    Store(StoreOp, MemArg),
    MemorySize,
    MemoryGrow,
    Const(Value),
    Num(NumOp),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub funcs: Vec<Function>,
    pub tables: Vec<Limits>,
    pub memories: Vec<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elems: Vec<ElemSegment>,
    pub data: Vec<DataSegment>,
}

impl Module {
    /// Type indices of imported functions, in import order.
    pub fn imported_funcs(&self) -> impl Iterator<Item = u32> + '_ {
        self.imports.iter().filter_map(|i| match i.desc {
            ImportDesc::Func(ty) => Some(ty),
            _ => None,
        })
    }

    pub fn imported_globals(&self) -> impl Iterator<Item = &GlobalType> + '_ {
        self.imports.iter().filter_map(|i| match &i.desc {
            ImportDesc::Global(g) => Some(g),
            _ => None,
        })
    }

    pub fn num_imported_funcs(&self) -> usize { self.imported_funcs().count() }

    pub fn num_imported_tables(&self) -> usize {
        self.imports.iter().filter(|i| matches!(i.desc, ImportDesc::Table(_))).count()
    }

    pub fn num_imported_memories(&self) -> usize {
        self.imports.iter().filter(|i| matches!(i.desc, ImportDesc::Memory(_))).count()
    }

    pub fn num_imported_globals(&self) -> usize { self.imported_globals().count() }

    /// Type index of function `idx` in the function index space (imports first).
    pub fn func_type_idx(&self, idx: u32) -> Option<u32> {
        let imported = self.num_imported_funcs();
        let idx = idx as usize;
        if idx < imported {
            self.imported_funcs().nth(idx)
        } else {
            self.funcs.get(idx - imported).map(|f| f.type_idx)
        }
    }

    pub fn func_type(&self, idx: u32) -> Option<&FuncType> {
        self.func_type_idx(idx).and_then(|t| self.types.get(t as usize))
    }

    /// Type of global `idx` in the global index space (imports first).
    pub fn global_type(&self, idx: u32) -> Option<GlobalType> {
        let imported = self.num_imported_globals();
        let idx = idx as usize;
        if idx < imported {
            self.imported_globals().nth(idx).copied()
        } else {
            self.globals.get(idx - imported).map(|g| g.ty)
        }
    }
}
