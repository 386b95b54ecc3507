use crate::error::*;
use crate::func::Func;
use crate::memory::try_resize;
use serde::Deserialize;

/// Host-side `{initial, maximum, element}` description of a table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableDescriptor {
    pub initial: u32,
    #[serde(default)]
    pub maximum: Option<u32>,
    #[serde(default)]
    pub element: Option<String>,
}

/// Function references addressed by index, used by `call_indirect`.
#[derive(Debug, Clone)]
pub struct Table {
    elements: Vec<Option<Func>>,
    maximum: Option<u32>,
}

impl Table {
    /// Capacity bound applied when no maximum is declared.
    pub const DEFAULT_MAXIMUM: u32 = 10_000_000;

    pub fn new(initial: u32, maximum: Option<u32>) -> Result<Self, Error> {
        let limit = maximum.unwrap_or(Self::DEFAULT_MAXIMUM);
        if initial > limit {
            let msg = if maximum.is_some() { TABLE_INITIAL_ABOVE_MAX } else { TABLE_FULL };
            return Err(Error::Range(msg));
        }
        Ok(Self { elements: vec![None; initial as usize], maximum })
    }

    /// Builds a table from a host descriptor such as `{"initial": 2, "element": "anyfunc"}`.
    pub fn from_descriptor(descriptor: &serde_json::Value) -> Result<Self, Error> {
        if !descriptor.is_object() { return Err(Error::Type(DESCRIPTOR_NOT_OBJECT)); }
        let desc: TableDescriptor = serde_json::from_value(descriptor.clone())
            .map_err(|_| Error::Type(INVALID_DESCRIPTOR))?;
        match desc.element.as_deref() {
            None | Some("anyfunc") | Some("funcref") => {}
            Some(_) => return Err(Error::Type(INVALID_DESCRIPTOR)),
        }
        Self::new(desc.initial, desc.maximum)
    }

    pub fn size(&self) -> u32 { self.elements.len() as u32 }
    pub fn maximum(&self) -> Option<u32> { self.maximum }

    /// Effective capacity bound: the declared maximum or the default sentinel.
    pub fn limit(&self) -> u32 { self.maximum.unwrap_or(Self::DEFAULT_MAXIMUM) }

    /// Element at `idx`; `None` for an empty slot or an index past the end.
    pub fn get(&self, idx: u32) -> Option<Func> {
        self.elements.get(idx as usize).cloned().flatten()
    }

    /// Occupied slots in index order.
    pub fn elements(&self) -> impl Iterator<Item = Func> + '_ {
        self.elements.iter().flatten().cloned()
    }

    /// Writes a slot, extending the table with empty slots when `idx` is past
    /// the end but below the capacity bound.
    pub fn set(&mut self, idx: u32, func: Option<Func>) -> Result<(), Error> {
        if idx >= self.limit() { return Err(Error::Range(TABLE_INDEX_ABOVE_MAX)); }
        let i = idx as usize;
        if i >= self.elements.len() {
            self.elements.resize(i + 1, None);
        }
        self.elements[i] = func;
        Ok(())
    }

    /// Appends an element and returns its index.
    pub fn push(&mut self, func: Func) -> Result<u32, Error> {
        let idx = self.size();
        if idx >= self.limit() { return Err(Error::Range(TABLE_FULL)); }
        self.elements.push(Some(func));
        Ok(idx)
    }

    /// Adds `delta` empty slots and returns the previous size, or `None` when
    /// the capacity bound would be exceeded or the slots cannot be allocated.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old = self.size();
        let new = old.checked_add(delta).filter(|&n| n <= self.limit())?;
        try_resize(&mut self.elements, new as usize, None)?;
        Some(old)
    }
}
