use crate::ast::{self, ConstExpr, ExportDesc, FuncType, ImportDesc, Instr, Limits};
use crate::decode::{decode, MAX_NESTING};
use crate::error::*;
use crate::flatten::flatten;
use crate::ir::FlatFunc;
use crate::memory::Memory;
use crate::value::ValType;
use log::debug;
use std::collections::HashSet;
use std::rc::Rc;

/// A decoded, statically checked module with flattened function bodies.
/// Immutable and shareable between any number of instances.
#[derive(Debug)]
pub struct Module {
    ast: ast::Module,
    code: Vec<Rc<FlatFunc>>,
}

impl Module {
    pub fn compile(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_ast(decode(bytes)?)
    }

    /// Checks and flattens an already decoded module.
    pub fn from_ast(ast: ast::Module) -> Result<Self, Error> {
        Checker::new(&ast)?.check()?;
        let imported = ast.num_imported_funcs() as u32;
        let code = ast.funcs.iter()
            .map(|f| {
                let ty = ast.types.get(f.type_idx as usize).ok_or(Error::compile(UNKNOWN_TYPE))?;
                flatten(f, ty, imported).map(Rc::new)
            })
            .collect::<Result<Vec<_>, Error>>()?;
        debug!("compiled module: {} types, {} imports, {} functions, {} exports",
            ast.types.len(), ast.imports.len(), code.len(), ast.exports.len());
        Ok(Self { ast, code })
    }

    pub fn ast(&self) -> &ast::Module { &self.ast }
    pub fn types(&self) -> &[FuncType] { &self.ast.types }
    pub fn imports(&self) -> &[ast::Import] { &self.ast.imports }
    pub fn exports(&self) -> &[ast::Export] { &self.ast.exports }

    /// Flattened bodies of the locally defined functions.
    pub fn code(&self) -> &[Rc<FlatFunc>] { &self.code }

    /// Signature of an exported function.
    pub fn export_func_type(&self, name: &str) -> Option<&FuncType> {
        self.ast.exports.iter()
            .find(|e| e.name == name)
            .and_then(|e| match e.desc {
                ExportDesc::Func(idx) => self.ast.func_type(idx),
                _ => None,
            })
    }
}

/// Index-space and static-construct checks. Operand typing is left to the
/// producer of the module; these checks only reject what would make
/// instantiation or execution ill-defined.
struct Checker<'a> {
    ast: &'a ast::Module,
    n_funcs: u32,
    n_tables: u32,
    n_memories: u32,
    n_globals: u32,
    n_imported_globals: u32,
}

impl<'a> Checker<'a> {
    fn new(ast: &'a ast::Module) -> Result<Self, Error> {
        let n_tables = (ast.num_imported_tables() + ast.tables.len()) as u32;
        let n_memories = (ast.num_imported_memories() + ast.memories.len()) as u32;
        if n_tables > 1 { return compile(MULTIPLE_TABLES); }
        if n_memories > 1 { return compile(MULTIPLE_MEMORIES); }
        Ok(Self {
            ast,
            n_funcs: (ast.num_imported_funcs() + ast.funcs.len()) as u32,
            n_tables,
            n_memories,
            n_globals: (ast.num_imported_globals() + ast.globals.len()) as u32,
            n_imported_globals: ast.num_imported_globals() as u32,
        })
    }

    fn check(&self) -> Result<(), Error> {
        let ast = self.ast;
        for import in &ast.imports {
            match &import.desc {
                ImportDesc::Func(ty) => self.type_idx(*ty)?,
                ImportDesc::Table(limits) => check_limits(limits, None)?,
                ImportDesc::Memory(limits) => check_limits(limits, Some(Memory::MAX_PAGES))?,
                ImportDesc::Global(g) if g.mutable => return compile(MUT_GLOBAL_IMPORT),
                ImportDesc::Global(_) => {}
            }
        }
        for limits in &ast.tables { check_limits(limits, None)?; }
        for limits in &ast.memories { check_limits(limits, Some(Memory::MAX_PAGES))?; }
        for global in &ast.globals {
            self.const_expr(&global.init, global.ty.ty)?;
        }

        let mut names = HashSet::new();
        for export in &ast.exports {
            if !names.insert(export.name.as_str()) { return compile(DUP_EXPORT_NAME); }
            match export.desc {
                ExportDesc::Func(idx) => self.func_idx(idx)?,
                ExportDesc::Table(idx) if idx >= self.n_tables => return compile(UNKNOWN_TABLE),
                ExportDesc::Memory(idx) if idx >= self.n_memories => return compile(UNKNOWN_MEMORY),
                ExportDesc::Global(idx) => match ast.global_type(idx) {
                    None => return compile(UNKNOWN_GLOBAL),
                    Some(g) if g.mutable => return compile(MUT_GLOBAL_EXPORT),
                    Some(_) => {}
                },
                _ => {}
            }
        }

        if let Some(start) = ast.start {
            let ty = ast.func_type(start).ok_or(Error::compile(UNKNOWN_FUNC))?;
            if !ty.params.is_empty() || !ty.results.is_empty() { return compile(START_FUNC); }
        }

        for seg in &ast.elems {
            if seg.table >= self.n_tables { return compile(UNKNOWN_TABLE); }
            self.const_expr(&seg.offset, ValType::I32)?;
            for &f in &seg.funcs { self.func_idx(f)?; }
        }
        for seg in &ast.data {
            if seg.memory >= self.n_memories { return compile(UNKNOWN_MEMORY); }
            self.const_expr(&seg.offset, ValType::I32)?;
        }

        for func in &ast.funcs {
            let ty = ast.types.get(func.type_idx as usize).ok_or(Error::compile(UNKNOWN_TYPE))?;
            let n_locals = ty.params.len() + func.locals.len();
            self.body(&func.body, n_locals, 0)?;
        }
        Ok(())
    }

    fn type_idx(&self, idx: u32) -> Result<(), Error> {
        if idx as usize >= self.ast.types.len() { return compile(UNKNOWN_TYPE); }
        Ok(())
    }

    fn func_idx(&self, idx: u32) -> Result<(), Error> {
        if idx >= self.n_funcs { return compile(UNKNOWN_FUNC); }
        Ok(())
    }

    fn const_expr(&self, expr: &ConstExpr, expected: ValType) -> Result<(), Error> {
        let ty = match expr {
            ConstExpr::I32(_) => ValType::I32,
            ConstExpr::I64(_) => ValType::I64,
            ConstExpr::F32(_) => ValType::F32,
            ConstExpr::F64(_) => ValType::F64,
            // Only imported globals are initialised before local initialisers run.
            ConstExpr::GlobalGet(idx) if *idx >= self.n_imported_globals => return compile(UNKNOWN_GLOBAL),
            ConstExpr::GlobalGet(idx) => self.ast.global_type(*idx).ok_or(Error::compile(UNKNOWN_GLOBAL))?.ty,
        };
        if ty != expected { return compile(TYPE_MISMATCH); }
        Ok(())
    }

    fn body(&self, instrs: &[Instr], n_locals: usize, depth: u32) -> Result<(), Error> {
        if depth as usize > MAX_NESTING { return compile(NESTING_TOO_DEEP); }
        let label = |d: u32| if d > depth { compile(UNKNOWN_LABEL) } else { Ok(()) };
        let memory = || if self.n_memories == 0 { compile(UNKNOWN_MEMORY) } else { Ok(()) };
        let local = |i: u32| if i as usize >= n_locals { compile(UNKNOWN_LOCAL) } else { Ok(()) };
        for instr in instrs {
            match instr {
                Instr::Block(_, body) | Instr::Loop(_, body) => self.body(body, n_locals, depth + 1)?,
                Instr::If(_, then, alternate) => {
                    self.body(then, n_locals, depth + 1)?;
                    self.body(alternate, n_locals, depth + 1)?;
                }
                Instr::Br(d) | Instr::BrIf(d) => label(*d)?,
                Instr::BrTable(targets, default) => {
                    for &d in targets.iter().chain(std::iter::once(default)) { label(d)?; }
                }
                Instr::Call(idx) => self.func_idx(*idx)?,
                Instr::CallIndirect(ty) => {
                    self.type_idx(*ty)?;
                    if self.n_tables == 0 { return compile(UNKNOWN_TABLE); }
                }
                Instr::LocalGet(i) | Instr::LocalSet(i) | Instr::LocalTee(i) => local(*i)?,
                Instr::GlobalGet(i) => {
                    if *i >= self.n_globals { return compile(UNKNOWN_GLOBAL); }
                }
                Instr::GlobalSet(i) => match self.ast.global_type(*i) {
                    None => return compile(UNKNOWN_GLOBAL),
                    Some(g) if !g.mutable => return compile(GLOBAL_IS_IMMUTABLE),
                    Some(_) => {}
                },
                Instr::Load(..) | Instr::Store(..) | Instr::MemorySize | Instr::MemoryGrow => memory()?,
                _ => {}
            }
        }
        Ok(())
    }
}

fn check_limits(limits: &Limits, cap: Option<u32>) -> Result<(), Error> {
    if let Some(max) = limits.max {
        if limits.min > max { return compile(MIN_GREATER_THAN_MAX); }
    }
    if let Some(cap) = cap {
        if limits.min > cap || limits.max.is_some_and(|m| m > cap) { return compile(MEMORY_SIZE_LIMIT); }
    }
    Ok(())
}
