#![deny(unsafe_code)]

pub mod ast;
mod byte_iter;
pub mod decode;
pub mod error;
pub mod exec;
pub mod flatten;
pub mod func;
pub mod global;
pub mod instance;
pub mod ir;
mod leb128;
pub mod memory;
pub mod module;
pub mod numeric;
pub mod table;
pub mod value;

pub use ast::FuncType;
pub use error::Error;
pub use exec::{Executor, Label, Tracer};
pub use func::Func;
pub use global::Global;
pub use instance::{Extern, Imports, Instance, ModuleInstance};
pub use memory::{Memory, MemoryDescriptor};
pub use module::Module;
pub use table::{Table, TableDescriptor};
pub use value::{ValType, Value, F32, F64};

use std::rc::Rc;

/// What to instantiate: raw module bytes or an already compiled module.
pub enum Source<'a> {
    Bytes(&'a [u8]),
    Module(Rc<Module>),
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(bytes: &'a [u8]) -> Self { Source::Bytes(bytes) }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Source<'a> {
    fn from(bytes: &'a [u8; N]) -> Self { Source::Bytes(bytes) }
}

impl<'a> From<&'a Vec<u8>> for Source<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self { Source::Bytes(bytes) }
}

impl From<Rc<Module>> for Source<'_> {
    fn from(module: Rc<Module>) -> Self { Source::Module(module) }
}

impl From<&Rc<Module>> for Source<'_> {
    fn from(module: &Rc<Module>) -> Self { Source::Module(module.clone()) }
}

/// Result of [`instantiate`]: the instance and the module it came from.
#[derive(Debug)]
pub struct Instantiated {
    pub instance: Instance,
    pub module: Rc<Module>,
}

/// Decodes, checks and flattens a binary module.
pub fn compile(bytes: &[u8]) -> Result<Module, Error> {
    Module::compile(bytes)
}

/// Compiles `source` if needed, then links and instantiates it. Fails with
/// `Error::Compile`, `Error::Link` or, when the start function traps, `Error::Trap`.
pub fn instantiate<'a>(source: impl Into<Source<'a>>, imports: &Imports) -> Result<Instantiated, Error> {
    let module = match source.into() {
        Source::Bytes(bytes) => Rc::new(Module::compile(bytes)?),
        Source::Module(module) => module,
    };
    let instance = Instance::new(&module, imports)?;
    Ok(Instantiated { instance, module })
}
