#![allow(dead_code)]

use flatwasm::ast::{self, BlockType, Export, ExportDesc, Function, Instr, MemArg};
use flatwasm::numeric::{IBinOp, IRelOp, NumOp};
use flatwasm::{Error, FuncType, Imports, Instance, Module, ValType, Value};
use std::rc::Rc;

pub fn sig(params: &[ValType], results: &[ValType]) -> FuncType {
    FuncType::new(params.to_vec(), results.to_vec())
}

pub fn func(type_idx: u32, locals: &[ValType], body: Vec<Instr>) -> Function {
    Function { type_idx, locals: locals.to_vec(), body }
}

pub fn export_func(name: &str, idx: u32) -> Export {
    Export { name: name.to_string(), desc: ExportDesc::Func(idx) }
}

pub fn export(name: &str, desc: ExportDesc) -> Export {
    Export { name: name.to_string(), desc }
}

pub fn i32c(v: i32) -> Instr { Instr::Const(Value::I32(v)) }
pub fn i64c(v: i64) -> Instr { Instr::Const(Value::I64(v)) }
pub fn get(i: u32) -> Instr { Instr::LocalGet(i) }
pub fn i32bin(op: IBinOp) -> Instr { Instr::Num(NumOp::I32Binary(op)) }
pub fn i64bin(op: IBinOp) -> Instr { Instr::Num(NumOp::I64Binary(op)) }
pub fn i32rel(op: IRelOp) -> Instr { Instr::Num(NumOp::I32Compare(op)) }
pub fn mem(offset: i64) -> MemArg { MemArg { align: 0, offset } }
pub fn result(ty: ValType) -> BlockType { BlockType::Value(ty) }

pub fn build(module: ast::Module, imports: &Imports) -> Result<Instance, Error> {
    let module = Rc::new(Module::from_ast(module)?);
    Instance::new(&module, imports)
}

/// `add(i32, i32) -> i32`
pub fn add_module() -> ast::Module {
    ast::Module {
        types: vec![sig(&[ValType::I32, ValType::I32], &[ValType::I32])],
        funcs: vec![func(0, &[], vec![get(0), get(1), i32bin(IBinOp::Add)])],
        exports: vec![export_func("add", 0)],
        ..Default::default()
    }
}

/// Naive recursive `fib(i32) -> i32`.
pub fn fib_module() -> ast::Module {
    let body = vec![
        get(0), i32c(2), i32rel(IRelOp::LtS),
        Instr::If(
            result(ValType::I32),
            vec![get(0)],
            vec![
                get(0), i32c(1), i32bin(IBinOp::Sub), Instr::Call(0),
                get(0), i32c(2), i32bin(IBinOp::Sub), Instr::Call(0),
                i32bin(IBinOp::Add),
            ],
        ),
    ];
    ast::Module {
        types: vec![sig(&[ValType::I32], &[ValType::I32])],
        funcs: vec![func(0, &[], body)],
        exports: vec![export_func("fib", 0)],
        ..Default::default()
    }
}
