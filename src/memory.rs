use crate::error::*;
use crate::value::{ValType, Value, F32, F64};
use serde::Deserialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadOp {
    I32Load, I64Load, F32Load, F64Load,
    I32Load8S, I32Load8U, I32Load16S, I32Load16U,
    I64Load8S, I64Load8U, I64Load16S, I64Load16U, I64Load32S, I64Load32U,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreOp {
    I32Store, I64Store, F32Store, F64Store,
    I32Store8, I32Store16,
    I64Store8, I64Store16, I64Store32,
}

impl LoadOp {
    /// Opcodes 0x28..=0x35 in order.
    pub const ALL: [LoadOp; 14] = [
        LoadOp::I32Load, LoadOp::I64Load, LoadOp::F32Load, LoadOp::F64Load,
        LoadOp::I32Load8S, LoadOp::I32Load8U, LoadOp::I32Load16S, LoadOp::I32Load16U,
        LoadOp::I64Load8S, LoadOp::I64Load8U, LoadOp::I64Load16S, LoadOp::I64Load16U,
        LoadOp::I64Load32S, LoadOp::I64Load32U,
    ];

    pub fn width(self) -> usize {
        use LoadOp::*;
        match self {
            I32Load8S | I32Load8U | I64Load8S | I64Load8U => 1,
            I32Load16S | I32Load16U | I64Load16S | I64Load16U => 2,
            I32Load | F32Load | I64Load32S | I64Load32U => 4,
            I64Load | F64Load => 8,
        }
    }

    pub fn result_type(self) -> ValType {
        use LoadOp::*;
        match self {
            I32Load | I32Load8S | I32Load8U | I32Load16S | I32Load16U => ValType::I32,
            I64Load | I64Load8S | I64Load8U | I64Load16S | I64Load16U | I64Load32S | I64Load32U => ValType::I64,
            F32Load => ValType::F32,
            F64Load => ValType::F64,
        }
    }
}

impl StoreOp {
    /// Opcodes 0x36..=0x3e in order.
    pub const ALL: [StoreOp; 9] = [
        StoreOp::I32Store, StoreOp::I64Store, StoreOp::F32Store, StoreOp::F64Store,
        StoreOp::I32Store8, StoreOp::I32Store16,
        StoreOp::I64Store8, StoreOp::I64Store16, StoreOp::I64Store32,
    ];

    pub fn width(self) -> usize {
        use StoreOp::*;
        match self {
            I32Store8 | I64Store8 => 1,
            I32Store16 | I64Store16 => 2,
            I32Store | F32Store | I64Store32 => 4,
            I64Store | F64Store => 8,
        }
    }

    pub fn operand_type(self) -> ValType {
        use StoreOp::*;
        match self {
            I32Store | I32Store8 | I32Store16 => ValType::I32,
            I64Store | I64Store8 | I64Store16 | I64Store32 => ValType::I64,
            F32Store => ValType::F32,
            F64Store => ValType::F64,
        }
    }
}

/// Host-side `{initial, maximum}` description of a memory, in pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MemoryDescriptor {
    pub initial: u32,
    #[serde(default)]
    pub maximum: Option<u32>,
}

macro_rules! impl_unsigned {
    ($type:ty, $size:literal, $load_name:ident, $store_name:ident) => {
        #[inline(always)]
        pub fn $load_name(&self, addr: u32, offset: i64) -> Result<$type, Error> {
            let ea = self.effective_address(addr, offset, $size)?;
            let mut raw = [0u8; $size];
            raw.copy_from_slice(&self.data[ea..ea + $size]);
            Ok(<$type>::from_le_bytes(raw))
        }
        #[inline(always)]
        pub fn $store_name(&mut self, addr: u32, offset: i64, v: $type) -> Result<(), Error> {
            let ea = self.effective_address(addr, offset, $size)?;
            self.data[ea..ea + $size].copy_from_slice(&v.to_le_bytes());
            Ok(())
        }
    };
}

macro_rules! impl_signed_load {
    ($name:ident, $target:ty, $source:ident) => {
        #[inline(always)]
        pub fn $name(&self, addr: u32, offset: i64) -> Result<$target, Error> {
            Ok(self.$source(addr, offset)? as $target)
        }
    };
}

/// Linear memory: a zero-initialised byte buffer sized in 64 KiB pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
    pages: u32,
    maximum: Option<u32>,
}

impl Memory {
    pub const MAX_PAGES: u32 = 65536;
    pub const PAGE_SIZE: usize = 65536;

    pub fn new(initial: u32, maximum: Option<u32>) -> Result<Self, Error> {
        if let Some(max) = maximum {
            if initial > max { return Err(Error::Range(MEMORY_INITIAL_ABOVE_MAX)); }
            if max > Self::MAX_PAGES { return Err(Error::Range(MEMORY_SIZE_LIMIT)); }
        }
        if initial > Self::MAX_PAGES { return Err(Error::Range(MEMORY_SIZE_LIMIT)); }
        let data = vec![0; initial as usize * Self::PAGE_SIZE];
        Ok(Self { data, pages: initial, maximum })
    }

    /// Builds a memory from a host descriptor such as `{"initial": 1, "maximum": 2}`.
    pub fn from_descriptor(descriptor: &serde_json::Value) -> Result<Self, Error> {
        if !descriptor.is_object() { return Err(Error::Type(DESCRIPTOR_NOT_OBJECT)); }
        let desc: MemoryDescriptor = serde_json::from_value(descriptor.clone())
            .map_err(|_| Error::Type(INVALID_DESCRIPTOR))?;
        Self::new(desc.initial, desc.maximum)
    }

    /// Current size in pages.
    pub fn size(&self) -> u32 { self.pages }
    pub fn maximum(&self) -> Option<u32> { self.maximum }
    pub fn byte_len(&self) -> usize { self.data.len() }
    pub fn data(&self) -> &[u8] { &self.data }
    pub fn data_mut(&mut self) -> &mut [u8] { &mut self.data }

    /// Grows by `delta` pages and returns the previous size, or `None` when the
    /// new size would exceed the maximum or cannot be allocated. New pages are zeroed.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let limit = self.maximum.unwrap_or(Self::MAX_PAGES).min(Self::MAX_PAGES);
        let old = self.pages;
        let new = old.checked_add(delta).filter(|&n| n <= limit)?;
        try_resize(&mut self.data, new as usize * Self::PAGE_SIZE, 0)?;
        self.pages = new;
        Some(old)
    }

    /// Validates the static `offset` and returns `addr + offset` when
    /// `width` bytes starting there lie inside the buffer.
    #[inline]
    pub fn effective_address(&self, addr: u32, offset: i64, width: usize) -> Result<usize, Error> {
        if offset < 0 { return trap(OFFSET_NEGATIVE); }
        if offset > u32::MAX as i64 { return trap(OFFSET_TOO_LARGE); }
        let ea = addr as u64 + offset as u64;
        if ea + width as u64 > self.data.len() as u64 { return trap(OOB_MEMORY_ACCESS); }
        Ok(ea as usize)
    }

    impl_unsigned!(u8,  1, load_u8, store_u8);    impl_unsigned!(u16, 2, load_u16, store_u16);
    impl_unsigned!(u32, 4, load_u32, store_u32);  impl_unsigned!(u64, 8, load_u64, store_u64);
    impl_signed_load!(load_i8,  i8,  load_u8);    impl_signed_load!(load_i16, i16, load_u16);
    impl_signed_load!(load_i32, i32, load_u32);   impl_signed_load!(load_i64, i64, load_u64);

    #[inline(always)]
    pub fn load_f32(&self, addr: u32, offset: i64) -> Result<F32, Error> {
        Ok(F32::from_bits(self.load_u32(addr, offset)?))
    }
    #[inline(always)]
    pub fn store_f32(&mut self, addr: u32, offset: i64, v: F32) -> Result<(), Error> {
        self.store_u32(addr, offset, v.to_bits())
    }
    #[inline(always)]
    pub fn load_f64(&self, addr: u32, offset: i64) -> Result<F64, Error> {
        Ok(F64::from_bits(self.load_u64(addr, offset)?))
    }
    #[inline(always)]
    pub fn store_f64(&mut self, addr: u32, offset: i64, v: F64) -> Result<(), Error> {
        self.store_u64(addr, offset, v.to_bits())
    }

    pub fn load(&self, op: LoadOp, addr: u32, offset: i64) -> Result<Value, Error> {
        use LoadOp::*;
        Ok(match op {
            I32Load => Value::I32(self.load_i32(addr, offset)?),
            I64Load => Value::I64(self.load_i64(addr, offset)?),
            F32Load => Value::F32(self.load_f32(addr, offset)?),
            F64Load => Value::F64(self.load_f64(addr, offset)?),
            I32Load8S => Value::I32(self.load_i8(addr, offset)? as i32),
            I32Load8U => Value::I32(self.load_u8(addr, offset)? as i32),
            I32Load16S => Value::I32(self.load_i16(addr, offset)? as i32),
            I32Load16U => Value::I32(self.load_u16(addr, offset)? as i32),
            I64Load8S => Value::I64(self.load_i8(addr, offset)? as i64),
            I64Load8U => Value::I64(self.load_u8(addr, offset)? as i64),
            I64Load16S => Value::I64(self.load_i16(addr, offset)? as i64),
            I64Load16U => Value::I64(self.load_u16(addr, offset)? as i64),
            I64Load32S => Value::I64(self.load_i32(addr, offset)? as i64),
            I64Load32U => Value::I64(self.load_u32(addr, offset)? as i64),
        })
    }

    /// Stores `value`, narrowing integers to the access width.
    pub fn store(&mut self, op: StoreOp, addr: u32, offset: i64, value: Value) -> Result<(), Error> {
        use StoreOp::*;
        match (op, value) {
            (I32Store, Value::I32(v)) => self.store_u32(addr, offset, v as u32),
            (I64Store, Value::I64(v)) => self.store_u64(addr, offset, v as u64),
            (F32Store, Value::F32(v)) => self.store_f32(addr, offset, v),
            (F64Store, Value::F64(v)) => self.store_f64(addr, offset, v),
            (I32Store8, Value::I32(v)) => self.store_u8(addr, offset, v as u8),
            (I32Store16, Value::I32(v)) => self.store_u16(addr, offset, v as u16),
            (I64Store8, Value::I64(v)) => self.store_u8(addr, offset, v as u8),
            (I64Store16, Value::I64(v)) => self.store_u16(addr, offset, v as u16),
            (I64Store32, Value::I64(v)) => self.store_u32(addr, offset, v as u32),
            (op, v) => Err(Error::internal(format!(
                "expected value of type {} on top of the stack, found {}", op.operand_type(), v.ty()
            ))),
        }
    }

    /// True when `len` bytes starting at `offset` lie inside the buffer.
    pub fn fits(&self, offset: u64, len: usize) -> bool {
        offset.checked_add(len as u64).is_some_and(|end| end <= self.data.len() as u64)
    }

    pub fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        if !self.fits(offset as u64, bytes.len()) { return trap(OOB_MEMORY_ACCESS); }
        let start = offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_bytes(&self, offset: u32, len: usize) -> Result<&[u8], Error> {
        if !self.fits(offset as u64, len) { return trap(OOB_MEMORY_ACCESS); }
        let start = offset as usize;
        Ok(&self.data[start..start + len])
    }
}

/// Resizes `buf` to `len`, filling new slots with `fill`. Returns `None`
/// instead of aborting when the allocation fails.
pub(crate) fn try_resize<T: Clone>(buf: &mut Vec<T>, len: usize, fill: T) -> Option<()> {
    buf.try_reserve_exact(len.saturating_sub(buf.len())).ok()?;
    buf.resize(len, fill);
    Some(())
}
