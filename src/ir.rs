//! Flat instruction stream executed by the interpreter. Structured control
//! flow is lowered to blocks with precomputed end offsets plus the
//! administrative `BrUnless`, `Goto` and `CallExtern` forms.

use crate::ast::FuncType;
use crate::memory::{LoadOp, StoreOp};
use crate::numeric::NumOp;
use crate::value::{ValType, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Unreachable,
    Trap,
    Nop,
    /// Opens a label; branches to it continue after the matching `End` at `end`.
    Block { arity: u32, end: usize },
    /// Opens a label whose branch target is this instruction.
    Loop,
    /// Closes the innermost label.
    End,
    /// Pops an i32 and jumps to the offset when it is zero.
    BrUnless(usize),
    Goto(usize),
    Br(u32),
    BrIf(u32),
    BrTable { targets: Box<[u32]>, default: u32 },
    Return,
    /// Call of a function defined by the same module.
    Call(u32),
    /// Call of an imported function.
    CallExtern(u32),
    /// Indirect call through table 0, checked against the type index.
    CallIndirect(u32),
    Drop,
    Select,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    Load(LoadOp, i64),
    Store(StoreOp, i64),
    MemorySize,
    MemoryGrow,
    Const(Value),
    Num(NumOp),
}

/// A function body ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatFunc {
    pub ty: FuncType,
    /// Declared locals, excluding parameters.
    pub locals: Vec<ValType>,
    pub code: Vec<Op>,
}
