use crate::error::*;
use crate::value::{ValType, Value};
use std::cell::Cell;

/// A global variable shared by reference between instances and the host.
#[derive(Debug)]
pub struct Global {
    ty: ValType,
    mutable: bool,
    value: Cell<Value>,
}

impl Global {
    pub fn new(value: Value, mutable: bool) -> Self {
        Self { ty: value.ty(), mutable, value: Cell::new(value) }
    }

    pub fn ty(&self) -> ValType { self.ty }
    pub fn is_mutable(&self) -> bool { self.mutable }
    pub fn get(&self) -> Value { self.value.get() }

    /// Host-side write; rejects immutable globals and values of another type.
    pub fn set(&self, value: Value) -> Result<(), Error> {
        if !self.mutable { return Err(Error::Type(GLOBAL_IS_IMMUTABLE)); }
        if value.ty() != self.ty { return Err(Error::Type(ARG_TYPE_MISMATCH)); }
        self.value.set(value);
        Ok(())
    }

    /// Write from validated code, where mutability and type are already known to hold.
    pub(crate) fn set_unchecked(&self, value: Value) { self.value.set(value) }
}
