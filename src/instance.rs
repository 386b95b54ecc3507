use crate::ast::{ConstExpr, ExportDesc, ImportDesc, Limits};
use crate::error::*;
use crate::exec::Executor;
use crate::func::{Func, FuncInst};
use crate::global::Global;
use crate::memory::Memory;
use crate::module::Module;
use crate::table::Table;
use crate::value::Value;
use log::{debug, trace};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Anything a module can import or export.
#[derive(Clone, Debug)]
pub enum Extern {
    Func(Func),
    Table(Rc<RefCell<Table>>),
    Memory(Rc<RefCell<Memory>>),
    Global(Rc<Global>),
    /// A bare value, importable as an immutable global.
    Value(Value),
}

impl Extern {
    pub fn memory(memory: Memory) -> Self { Extern::Memory(Rc::new(RefCell::new(memory))) }
    pub fn table(table: Table) -> Self { Extern::Table(Rc::new(RefCell::new(table))) }
    pub fn global(value: Value, mutable: bool) -> Self { Extern::Global(Rc::new(Global::new(value, mutable))) }

    pub fn kind(&self) -> &'static str {
        match self {
            Extern::Func(_) => "func",
            Extern::Table(_) => "table",
            Extern::Memory(_) => "memory",
            Extern::Global(_) | Extern::Value(_) => "global",
        }
    }

    pub fn as_func(&self) -> Option<&Func> {
        if let Extern::Func(f) = self { Some(f) } else { None }
    }
}

impl From<Func> for Extern { fn from(f: Func) -> Self { Extern::Func(f) } }
impl From<Value> for Extern { fn from(v: Value) -> Self { Extern::Value(v) } }
impl From<Memory> for Extern { fn from(m: Memory) -> Self { Extern::memory(m) } }
impl From<Table> for Extern { fn from(t: Table) -> Self { Extern::table(t) } }
impl From<Rc<Global>> for Extern { fn from(g: Rc<Global>) -> Self { Extern::Global(g) } }

/// Import object: `module name -> field name -> value`.
#[derive(Clone, Debug, Default)]
pub struct Imports {
    modules: HashMap<String, HashMap<String, Extern>>,
}

impl Imports {
    pub fn new() -> Self { Self::default() }

    pub fn define(mut self, module: &str, field: &str, value: impl Into<Extern>) -> Self {
        self.insert(module, field, value);
        self
    }

    pub fn insert(&mut self, module: &str, field: &str, value: impl Into<Extern>) {
        self.modules.entry(module.to_string()).or_default().insert(field.to_string(), value.into());
    }

    /// Makes every export of `instance` importable under `module`.
    pub fn register(&mut self, module: &str, instance: &Instance) {
        for (name, value) in instance.exports() {
            self.insert(module, name, value.clone());
        }
    }

    pub fn get(&self, module: &str, field: &str) -> Option<&Extern> {
        self.modules.get(module).and_then(|m| m.get(field))
    }
}

/// Runtime state of one instantiation. Index spaces list imports first,
/// then local definitions, in declaration order.
#[derive(Debug)]
pub struct ModuleInstance {
    pub module: Rc<Module>,
    pub funcs: Vec<Func>,
    pub tables: Vec<Rc<RefCell<Table>>>,
    pub memories: Vec<Rc<RefCell<Memory>>>,
    pub globals: Vec<Rc<Global>>,
    /// Instances whose functions were imported, directly or as elements of an
    /// imported table, kept alive alongside this one.
    deps: Vec<Rc<ModuleInstance>>,
}

impl ModuleInstance {
    pub fn dependencies(&self) -> usize { self.deps.len() }
}

/// An instantiated module and its exports.
#[derive(Debug)]
pub struct Instance {
    inner: Rc<ModuleInstance>,
    exports: Vec<(String, Extern)>,
    by_name: HashMap<String, usize>,
}

#[derive(Default)]
struct Resolved {
    funcs: Vec<Func>,
    tables: Vec<Rc<RefCell<Table>>>,
    memories: Vec<Rc<RefCell<Memory>>>,
    globals: Vec<Rc<Global>>,
    deps: Vec<Rc<ModuleInstance>>,
}

impl Resolved {
    fn keep_owner(&mut self, func: &Func) {
        if let FuncInst::Wasm { module, .. } = func.inner() {
            if let Some(owner) = module.upgrade() {
                if !self.deps.iter().any(|d| Rc::ptr_eq(d, &owner)) { self.deps.push(owner); }
            }
        }
    }
}

fn incompatible<T>() -> Result<T, Error> { link(INCOMPATIBLE_IMPORT) }

fn eval_const(expr: &ConstExpr, globals: &[Rc<Global>]) -> Result<Value, Error> {
    Ok(match *expr {
        ConstExpr::I32(v) => Value::I32(v),
        ConstExpr::I64(v) => Value::I64(v),
        ConstExpr::F32(v) => Value::F32(v),
        ConstExpr::F64(v) => Value::F64(v),
        ConstExpr::GlobalGet(idx) => globals.get(idx as usize)
            .ok_or_else(|| Error::internal(UNKNOWN_GLOBAL))?
            .get(),
    })
}

fn eval_offset(expr: &ConstExpr, globals: &[Rc<Global>]) -> Result<u32, Error> {
    match eval_const(expr, globals)? {
        Value::I32(v) => Ok(v as u32),
        other => Err(Error::internal(format!("segment offset must be i32, found {}", other.ty()))),
    }
}

impl Instance {
    /// Links `module` against `imports`, allocates its state, initialises
    /// segments and runs the start function. No instance is produced when any
    /// step fails.
    pub fn new(module: &Rc<Module>, imports: &Imports) -> Result<Self, Error> {
        let ast = module.ast();
        debug!("instantiating module with {} imports", ast.imports.len());
        let mut r = Self::resolve_imports(module, imports)?;

        for limits in &ast.tables {
            r.tables.push(Rc::new(RefCell::new(Table::new(limits.min, limits.max)?)));
        }
        for limits in &ast.memories {
            r.memories.push(Rc::new(RefCell::new(Memory::new(limits.min, limits.max)?)));
        }
        for global in &ast.globals {
            let value = eval_const(&global.init, &r.globals)?;
            r.globals.push(Rc::new(Global::new(value, global.ty.mutable)));
        }

        let Resolved { mut funcs, tables, memories, globals, deps } = r;
        let inner = Rc::new_cyclic(|this| {
            funcs.extend(module.code().iter().map(|code| Func::wasm(code.clone(), this.clone())));
            ModuleInstance { module: module.clone(), funcs, tables, memories, globals, deps }
        });

        Self::init_segments(&inner)?;

        if let Some(start) = ast.start {
            let func = inner.funcs.get(start as usize).ok_or_else(|| Error::internal(UNKNOWN_FUNC))?;
            debug!("running start function {}", start);
            Executor::new().call(func, &[])?;
        }

        let exports = ast.exports.iter()
            .map(|e| {
                let value = match e.desc {
                    ExportDesc::Func(i) => inner.funcs.get(i as usize).cloned().map(Extern::Func),
                    ExportDesc::Table(i) => inner.tables.get(i as usize).cloned().map(Extern::Table),
                    ExportDesc::Memory(i) => inner.memories.get(i as usize).cloned().map(Extern::Memory),
                    ExportDesc::Global(i) => inner.globals.get(i as usize).cloned().map(Extern::Global),
                };
                value.map(|v| (e.name.clone(), v))
                    .ok_or_else(|| Error::internal(format!("export {} refers to a missing item", e.name)))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let by_name = exports.iter().enumerate().map(|(i, (name, _))| (name.clone(), i)).collect();
        debug!("instantiated module with {} exports", exports.len());
        Ok(Self { inner, exports, by_name })
    }

    fn resolve_imports(module: &Rc<Module>, imports: &Imports) -> Result<Resolved, Error> {
        let ast = module.ast();
        let mut r = Resolved::default();
        for import in &ast.imports {
            trace!("resolving import {}.{}", import.module, import.field);
            let value = imports.get(&import.module, &import.field)
                .ok_or_else(|| Error::link(format!("unknown import {}.{}", import.module, import.field)))?;
            match (&import.desc, value) {
                (ImportDesc::Func(ty), Extern::Func(f)) => {
                    let expected = ast.types.get(*ty as usize).ok_or_else(|| Error::internal(UNKNOWN_TYPE))?;
                    if f.ty() != expected { return incompatible(); }
                    r.keep_owner(f);
                    r.funcs.push(f.clone());
                }
                (ImportDesc::Table(want), Extern::Table(t)) => {
                    let have = { let t = t.borrow(); Limits { min: t.size(), max: t.maximum() } };
                    if !have.satisfies(want) { return incompatible(); }
                    for f in t.borrow().elements() { r.keep_owner(&f); }
                    r.tables.push(t.clone());
                }
                (ImportDesc::Memory(want), Extern::Memory(m)) => {
                    let have = { let m = m.borrow(); Limits { min: m.size(), max: m.maximum() } };
                    if !have.satisfies(want) { return incompatible(); }
                    r.memories.push(m.clone());
                }
                (ImportDesc::Global(want), Extern::Global(g)) => {
                    if g.ty() != want.ty || g.is_mutable() != want.mutable { return incompatible(); }
                    r.globals.push(g.clone());
                }
                (ImportDesc::Global(want), Extern::Value(v)) => {
                    if v.ty() != want.ty || want.mutable { return incompatible(); }
                    r.globals.push(Rc::new(Global::new(*v, false)));
                }
                _ => return incompatible(),
            }
        }
        Ok(r)
    }

    /// Writes element and data segments once every one of them is known to fit.
    fn init_segments(inner: &Rc<ModuleInstance>) -> Result<(), Error> {
        let ast = inner.module.ast();
        let mut elems = Vec::with_capacity(ast.elems.len());
        for seg in &ast.elems {
            let offset = eval_offset(&seg.offset, &inner.globals)?;
            let table = inner.tables.get(seg.table as usize).ok_or_else(|| Error::internal(UNKNOWN_TABLE))?;
            if offset as u64 + seg.funcs.len() as u64 > table.borrow().size() as u64 { return link(ELEM_SEG_DNF); }
            elems.push((table, offset, &seg.funcs));
        }
        let mut data = Vec::with_capacity(ast.data.len());
        for seg in &ast.data {
            let offset = eval_offset(&seg.offset, &inner.globals)?;
            let memory = inner.memories.get(seg.memory as usize).ok_or_else(|| Error::internal(UNKNOWN_MEMORY))?;
            if !memory.borrow().fits(offset as u64, seg.bytes.len()) { return link(DATA_SEG_DNF); }
            data.push((memory, offset, &seg.bytes));
        }

        for (table, offset, funcs) in elems {
            let mut table = table.borrow_mut();
            for (i, &f) in funcs.iter().enumerate() {
                let func = inner.funcs.get(f as usize).ok_or_else(|| Error::internal(UNKNOWN_FUNC))?;
                table.set(offset + i as u32, Some(func.clone()))?;
            }
        }
        for (memory, offset, bytes) in data {
            memory.borrow_mut().write_bytes(offset, bytes)?;
        }
        Ok(())
    }

    pub fn module(&self) -> &Rc<Module> { &self.inner.module }

    pub fn module_instance(&self) -> &Rc<ModuleInstance> { &self.inner }

    /// Exports in declaration order.
    pub fn exports(&self) -> impl Iterator<Item = (&str, &Extern)> {
        self.exports.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn export(&self, name: &str) -> Option<&Extern> {
        self.by_name.get(name).map(|&i| &self.exports[i].1)
    }

    pub fn func(&self, name: &str) -> Option<Func> {
        match self.export(name)? {
            Extern::Func(f) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn memory(&self, name: &str) -> Option<Rc<RefCell<Memory>>> {
        match self.export(name)? {
            Extern::Memory(m) => Some(m.clone()),
            _ => None,
        }
    }

    pub fn table(&self, name: &str) -> Option<Rc<RefCell<Table>>> {
        match self.export(name)? {
            Extern::Table(t) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn global(&self, name: &str) -> Option<Rc<Global>> {
        match self.export(name)? {
            Extern::Global(g) => Some(g.clone()),
            _ => None,
        }
    }

    /// Calls the exported function `name`.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Vec<Value>, Error> {
        match self.export(name) {
            Some(Extern::Func(f)) => f.call(args),
            Some(_) => Err(Error::Type(NOT_A_FUNCTION)),
            None => Err(Error::Type(UNKNOWN_EXPORT)),
        }
    }
}
