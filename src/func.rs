use crate::ast::FuncType;
use crate::error::Error;
use crate::exec::{Executor, Tracer};
use crate::instance::ModuleInstance;
use crate::ir::FlatFunc;
use crate::value::Value;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

pub type HostCallback = dyn Fn(&[Value]) -> Result<Vec<Value>, Error>;

pub enum FuncInst {
    /// Function defined by a module. The module link is weak, so a function
    /// outliving its instance traps when called.
    Wasm { code: Rc<FlatFunc>, module: Weak<ModuleInstance> },
    Host { ty: FuncType, callback: Rc<HostCallback> },
}

/// Cheaply clonable handle to a function instance.
#[derive(Clone)]
pub struct Func(Rc<FuncInst>);

impl Func {
    /// Wraps a host closure. It receives arguments matching `ty.params` and
    /// must return values matching `ty.results`; returning an error traps.
    pub fn host(ty: FuncType, callback: impl Fn(&[Value]) -> Result<Vec<Value>, Error> + 'static) -> Self {
        Func(Rc::new(FuncInst::Host { ty, callback: Rc::new(callback) }))
    }

    pub(crate) fn wasm(code: Rc<FlatFunc>, module: Weak<ModuleInstance>) -> Self {
        Func(Rc::new(FuncInst::Wasm { code, module }))
    }

    pub fn ty(&self) -> &FuncType {
        match &*self.0 {
            FuncInst::Wasm { code, .. } => &code.ty,
            FuncInst::Host { ty, .. } => ty,
        }
    }

    pub fn inner(&self) -> &FuncInst { &self.0 }

    pub fn is_host(&self) -> bool { matches!(&*self.0, FuncInst::Host { .. }) }

    /// Whether both handles refer to the same function instance.
    pub fn ptr_eq(&self, other: &Func) -> bool { Rc::ptr_eq(&self.0, &other.0) }

    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>, Error> {
        Executor::new().call(self, args)
    }

    /// Like [`Func::call`], reporting every executed instruction to `tracer`.
    pub fn call_traced(&self, args: &[Value], tracer: &mut dyn Tracer) -> Result<Vec<Value>, Error> {
        Executor::new().with_tracer(tracer).call(self, args)
    }
}

impl Debug for Func {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_host() { "host" } else { "wasm" };
        write!(f, "Func({} {})", kind, self.ty())
    }
}
