use crate::error::*;
use crate::value::{ValType, Value, F32, F64};
use paste::paste;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IUnOp { Clz, Ctz, Popcnt, Extend8S, Extend16S, Extend32S }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IBinOp { Add, Sub, Mul, DivS, DivU, RemS, RemU, And, Or, Xor, Shl, ShrS, ShrU, Rotl, Rotr }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IRelOp { Eq, Ne, LtS, LtU, GtS, GtU, LeS, LeU, GeS, GeU }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FUnOp { Abs, Neg, Ceil, Floor, Trunc, Nearest, Sqrt }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FBinOp { Add, Sub, Mul, Div, Min, Max, Copysign }

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FRelOp { Eq, Ne, Lt, Gt, Le, Ge }

/// Conversions, listed in opcode order starting at 0xa7.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CvtOp {
    I32WrapI64,
    I32TruncF32S, I32TruncF32U, I32TruncF64S, I32TruncF64U,
    I64ExtendI32S, I64ExtendI32U,
    I64TruncF32S, I64TruncF32U, I64TruncF64S, I64TruncF64U,
    F32ConvertI32S, F32ConvertI32U, F32ConvertI64S, F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S, F64ConvertI32U, F64ConvertI64S, F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32, I64ReinterpretF64, F32ReinterpretI32, F64ReinterpretI64,
}

/// Every numeric instruction, grouped by operand type and shape.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NumOp {
    I32Eqz,
    I64Eqz,
    I32Unary(IUnOp),
    I64Unary(IUnOp),
    F32Unary(FUnOp),
    F64Unary(FUnOp),
    I32Binary(IBinOp),
    I64Binary(IBinOp),
    F32Binary(FBinOp),
    F64Binary(FBinOp),
    I32Compare(IRelOp),
    I64Compare(IRelOp),
    F32Compare(FRelOp),
    F64Compare(FRelOp),
    Convert(CvtOp),
}

impl IRelOp {
    pub const ALL: [IRelOp; 10] = [
        IRelOp::Eq, IRelOp::Ne, IRelOp::LtS, IRelOp::LtU, IRelOp::GtS,
        IRelOp::GtU, IRelOp::LeS, IRelOp::LeU, IRelOp::GeS, IRelOp::GeU,
    ];
}

impl FRelOp {
    pub const ALL: [FRelOp; 6] = [FRelOp::Eq, FRelOp::Ne, FRelOp::Lt, FRelOp::Gt, FRelOp::Le, FRelOp::Ge];
}

impl IBinOp {
    pub const ALL: [IBinOp; 15] = [
        IBinOp::Add, IBinOp::Sub, IBinOp::Mul, IBinOp::DivS, IBinOp::DivU,
        IBinOp::RemS, IBinOp::RemU, IBinOp::And, IBinOp::Or, IBinOp::Xor,
        IBinOp::Shl, IBinOp::ShrS, IBinOp::ShrU, IBinOp::Rotl, IBinOp::Rotr,
    ];
}

impl FUnOp {
    pub const ALL: [FUnOp; 7] = [
        FUnOp::Abs, FUnOp::Neg, FUnOp::Ceil, FUnOp::Floor, FUnOp::Trunc, FUnOp::Nearest, FUnOp::Sqrt,
    ];
}

impl FBinOp {
    pub const ALL: [FBinOp; 7] = [
        FBinOp::Add, FBinOp::Sub, FBinOp::Mul, FBinOp::Div, FBinOp::Min, FBinOp::Max, FBinOp::Copysign,
    ];
}

impl CvtOp {
    pub const ALL: [CvtOp; 25] = [
        CvtOp::I32WrapI64,
        CvtOp::I32TruncF32S, CvtOp::I32TruncF32U, CvtOp::I32TruncF64S, CvtOp::I32TruncF64U,
        CvtOp::I64ExtendI32S, CvtOp::I64ExtendI32U,
        CvtOp::I64TruncF32S, CvtOp::I64TruncF32U, CvtOp::I64TruncF64S, CvtOp::I64TruncF64U,
        CvtOp::F32ConvertI32S, CvtOp::F32ConvertI32U, CvtOp::F32ConvertI64S, CvtOp::F32ConvertI64U,
        CvtOp::F32DemoteF64,
        CvtOp::F64ConvertI32S, CvtOp::F64ConvertI32U, CvtOp::F64ConvertI64S, CvtOp::F64ConvertI64U,
        CvtOp::F64PromoteF32,
        CvtOp::I32ReinterpretF32, CvtOp::I64ReinterpretF64, CvtOp::F32ReinterpretI32, CvtOp::F64ReinterpretI64,
    ];

    pub fn operand_type(self) -> ValType {
        use CvtOp::*;
        match self {
            I32WrapI64 | F32ConvertI64S | F32ConvertI64U | F64ConvertI64S | F64ConvertI64U
            | F64ReinterpretI64 => ValType::I64,
            I64ExtendI32S | I64ExtendI32U | F32ConvertI32S | F32ConvertI32U | F64ConvertI32S
            | F64ConvertI32U | F32ReinterpretI32 => ValType::I32,
            I32TruncF32S | I32TruncF32U | I64TruncF32S | I64TruncF32U | F64PromoteF32
            | I32ReinterpretF32 => ValType::F32,
            I32TruncF64S | I32TruncF64U | I64TruncF64S | I64TruncF64U | F32DemoteF64
            | I64ReinterpretF64 => ValType::F64,
        }
    }
}

impl NumOp {
    /// Maps a single-byte opcode in `0x45..=0xc4` to its numeric instruction.
    pub fn from_opcode(op: u8) -> Option<NumOp> {
        const I_UN: [IUnOp; 3] = [IUnOp::Clz, IUnOp::Ctz, IUnOp::Popcnt];
        let at = |base: u8| (op - base) as usize;
        Some(match op {
            0x45 => NumOp::I32Eqz,
            0x46..=0x4f => NumOp::I32Compare(IRelOp::ALL[at(0x46)]),
            0x50 => NumOp::I64Eqz,
            0x51..=0x5a => NumOp::I64Compare(IRelOp::ALL[at(0x51)]),
            0x5b..=0x60 => NumOp::F32Compare(FRelOp::ALL[at(0x5b)]),
            0x61..=0x66 => NumOp::F64Compare(FRelOp::ALL[at(0x61)]),
            0x67..=0x69 => NumOp::I32Unary(I_UN[at(0x67)]),
            0x6a..=0x78 => NumOp::I32Binary(IBinOp::ALL[at(0x6a)]),
            0x79..=0x7b => NumOp::I64Unary(I_UN[at(0x79)]),
            0x7c..=0x8a => NumOp::I64Binary(IBinOp::ALL[at(0x7c)]),
            0x8b..=0x91 => NumOp::F32Unary(FUnOp::ALL[at(0x8b)]),
            0x92..=0x98 => NumOp::F32Binary(FBinOp::ALL[at(0x92)]),
            0x99..=0x9f => NumOp::F64Unary(FUnOp::ALL[at(0x99)]),
            0xa0..=0xa6 => NumOp::F64Binary(FBinOp::ALL[at(0xa0)]),
            0xa7..=0xbf => NumOp::Convert(CvtOp::ALL[at(0xa7)]),
            0xc0 => NumOp::I32Unary(IUnOp::Extend8S),
            0xc1 => NumOp::I32Unary(IUnOp::Extend16S),
            0xc2 => NumOp::I64Unary(IUnOp::Extend8S),
            0xc3 => NumOp::I64Unary(IUnOp::Extend16S),
            0xc4 => NumOp::I64Unary(IUnOp::Extend32S),
            _ => return None,
        })
    }

    /// Number of operands consumed.
    pub fn arity(self) -> usize {
        match self {
            NumOp::I32Eqz | NumOp::I64Eqz | NumOp::Convert(_) => 1,
            NumOp::I32Unary(_) | NumOp::I64Unary(_) | NumOp::F32Unary(_) | NumOp::F64Unary(_) => 1,
            _ => 2,
        }
    }
}

fn type_mismatch(expected: ValType, found: Value) -> Error {
    Error::internal(format!("expected value of type {} on top of the stack, found {}", expected, found.ty()))
}

pub(crate) fn underflow(expected: usize, found: usize) -> Error {
    Error::internal(format!("expected {} values on the stack, found {}", expected, found))
}

macro_rules! typed_pop {
    ($($variant:ident => $ty:ty),*) => { paste! { $(
        #[inline]
        pub fn [<pop_ $variant:lower>](stack: &mut Vec<Value>) -> Result<$ty, Error> {
            match stack.pop() {
                Some(Value::$variant(v)) => Ok(v),
                Some(other) => Err(type_mismatch(ValType::$variant, other)),
                None => Err(underflow(1, 0)),
            }
        }
    )* } };
}

typed_pop!(I32 => i32, I64 => i64, F32 => F32, F64 => F64);

macro_rules! int_ops {
    ($int:ident, $uint:ident, $bits:literal) => { paste! {
        pub fn [<$int _unary>](op: IUnOp, a: $int) -> $int {
            match op {
                IUnOp::Clz => a.leading_zeros() as $int,
                IUnOp::Ctz => a.trailing_zeros() as $int,
                IUnOp::Popcnt => a.count_ones() as $int,
                IUnOp::Extend8S => a as i8 as $int,
                IUnOp::Extend16S => a as i16 as $int,
                IUnOp::Extend32S => a as i32 as $int,
            }
        }

        pub fn [<$int _binary>](op: IBinOp, a: $int, b: $int) -> Result<$int, Error> {
            let (ua, ub) = (a as $uint, b as $uint);
            Ok(match op {
                IBinOp::Add => a.wrapping_add(b),
                IBinOp::Sub => a.wrapping_sub(b),
                IBinOp::Mul => a.wrapping_mul(b),
                IBinOp::DivS => {
                    if b == 0 { return trap(DIVIDE_BY_ZERO); }
                    if a == $int::MIN && b == -1 { return trap(INTEGER_OVERFLOW); }
                    a / b
                }
                IBinOp::DivU => {
                    if b == 0 { return trap(DIVIDE_BY_ZERO); }
                    (ua / ub) as $int
                }
                IBinOp::RemS => {
                    if b == 0 { return trap(DIVIDE_BY_ZERO); }
                    a.wrapping_rem(b)
                }
                IBinOp::RemU => {
                    if b == 0 { return trap(DIVIDE_BY_ZERO); }
                    (ua % ub) as $int
                }
                IBinOp::And => a & b,
                IBinOp::Or => a | b,
                IBinOp::Xor => a ^ b,
                IBinOp::Shl => a.wrapping_shl((ub % $bits) as u32),
                IBinOp::ShrS => a.wrapping_shr((ub % $bits) as u32),
                IBinOp::ShrU => ua.wrapping_shr((ub % $bits) as u32) as $int,
                IBinOp::Rotl => ua.rotate_left((ub % $bits) as u32) as $int,
                IBinOp::Rotr => ua.rotate_right((ub % $bits) as u32) as $int,
            })
        }

        pub fn [<$int _compare>](op: IRelOp, a: $int, b: $int) -> bool {
            let (ua, ub) = (a as $uint, b as $uint);
            match op {
                IRelOp::Eq => a == b,
                IRelOp::Ne => a != b,
                IRelOp::LtS => a < b,
                IRelOp::LtU => ua < ub,
                IRelOp::GtS => a > b,
                IRelOp::GtU => ua > ub,
                IRelOp::LeS => a <= b,
                IRelOp::LeU => ua <= ub,
                IRelOp::GeS => a >= b,
                IRelOp::GeU => ua >= ub,
            }
        }
    } };
}

int_ops!(i32, u32, 32);
int_ops!(i64, u64, 64);

// A NaN operand is returned unchanged: the left operand wins, then the right.
// NaNs produced by the arithmetic itself become the canonical NaN.
macro_rules! float_ops {
    ($name:ident, $float:ident) => { paste! {
        pub fn [<$float _unary>](op: FUnOp, a: $name) -> $name {
            match op {
                FUnOp::Abs => a.with_sign(false),
                FUnOp::Neg => a.with_sign(!a.is_sign_negative()),
                _ if a.is_nan() => a,
                FUnOp::Ceil => $name::from_result(a.to_float().ceil()),
                FUnOp::Floor => $name::from_result(a.to_float().floor()),
                FUnOp::Trunc => $name::from_result(a.to_float().trunc()),
                FUnOp::Nearest => $name::from_result(a.to_float().round_ties_even()),
                FUnOp::Sqrt => $name::from_result(a.to_float().sqrt()),
            }
        }

        pub fn [<$float _binary>](op: FBinOp, a: $name, b: $name) -> $name {
            let (x, y) = (a.to_float(), b.to_float());
            match op {
                FBinOp::Copysign => a.with_sign(b.is_sign_negative()),
                _ if a.is_nan() => a,
                _ if b.is_nan() => b,
                FBinOp::Add => $name::from_result(x + y),
                FBinOp::Sub => $name::from_result(x - y),
                FBinOp::Mul => $name::from_result(x * y),
                FBinOp::Div => $name::from_result(x / y),
                FBinOp::Min if x == 0.0 && y == 0.0 => if a.is_sign_negative() { a } else { b },
                FBinOp::Max if x == 0.0 && y == 0.0 => if a.is_sign_negative() { b } else { a },
                FBinOp::Min => $name::from_result(x.min(y)),
                FBinOp::Max => $name::from_result(x.max(y)),
            }
        }

        /// IEEE comparison: any NaN operand makes everything but `ne` false.
        pub fn [<$float _compare>](op: FRelOp, a: $name, b: $name) -> bool {
            let (x, y) = (a.to_float(), b.to_float());
            match op {
                FRelOp::Eq => x == y,
                FRelOp::Ne => x != y,
                FRelOp::Lt => x < y,
                FRelOp::Gt => x > y,
                FRelOp::Le => x <= y,
                FRelOp::Ge => x >= y,
            }
        }
    } };
}

float_ops!(F32, f32);
float_ops!(F64, f64);

/// Truncates toward zero, trapping when the result is not representable in
/// the half-open range `[lo, hi)`.
fn trunc_in_range(x: f64, lo: f64, hi: f64) -> Result<f64, Error> {
    if x.is_nan() { return trap(INVALID_CONV_TO_INT); }
    let t = x.trunc();
    if !(t >= lo && t < hi) { return trap(INTEGER_OVERFLOW); }
    Ok(t)
}

const I32_RANGE: (f64, f64) = (-2147483648.0, 2147483648.0);
const U32_RANGE: (f64, f64) = (0.0, 4294967296.0);
const I64_RANGE: (f64, f64) = (-9223372036854775808.0, 9223372036854775808.0);
const U64_RANGE: (f64, f64) = (0.0, 18446744073709551616.0);

pub fn demote(v: F64) -> F32 {
    match v {
        F64::Nan { negative, payload } => F32::Nan {
            negative,
            payload: (payload >> 29) as u32 | F32::CANONICAL_PAYLOAD,
        },
        F64::Inf { negative } => F32::Inf { negative },
        F64::Num(x) => F32::from_float(x as f32),
    }
}

pub fn promote(v: F32) -> F64 {
    match v {
        F32::Nan { negative, payload } => F64::Nan {
            negative,
            payload: ((payload as u64) << 29) | F64::CANONICAL_PAYLOAD,
        },
        F32::Inf { negative } => F64::Inf { negative },
        F32::Num(x) => F64::Num(x as f64),
    }
}

pub fn convert(op: CvtOp, v: Value) -> Result<Value, Error> {
    use CvtOp::*;
    let trunc = |x: f64, (lo, hi): (f64, f64)| trunc_in_range(x, lo, hi);
    Ok(match (op, v) {
        (I32WrapI64, Value::I64(x)) => Value::I32(x as i32),
        (I32TruncF32S, Value::F32(x)) => Value::I32(trunc(x.to_float() as f64, I32_RANGE)? as i32),
        (I32TruncF32U, Value::F32(x)) => Value::I32(trunc(x.to_float() as f64, U32_RANGE)? as u32 as i32),
        (I32TruncF64S, Value::F64(x)) => Value::I32(trunc(x.to_float(), I32_RANGE)? as i32),
        (I32TruncF64U, Value::F64(x)) => Value::I32(trunc(x.to_float(), U32_RANGE)? as u32 as i32),
        (I64ExtendI32S, Value::I32(x)) => Value::I64(x as i64),
        (I64ExtendI32U, Value::I32(x)) => Value::I64(x as u32 as i64),
        (I64TruncF32S, Value::F32(x)) => Value::I64(trunc(x.to_float() as f64, I64_RANGE)? as i64),
        (I64TruncF32U, Value::F32(x)) => Value::I64(trunc(x.to_float() as f64, U64_RANGE)? as u64 as i64),
        (I64TruncF64S, Value::F64(x)) => Value::I64(trunc(x.to_float(), I64_RANGE)? as i64),
        (I64TruncF64U, Value::F64(x)) => Value::I64(trunc(x.to_float(), U64_RANGE)? as u64 as i64),
        (F32ConvertI32S, Value::I32(x)) => Value::F32(F32::from_float(x as f32)),
        (F32ConvertI32U, Value::I32(x)) => Value::F32(F32::from_float(x as u32 as f32)),
        (F32ConvertI64S, Value::I64(x)) => Value::F32(F32::from_float(x as f32)),
        (F32ConvertI64U, Value::I64(x)) => Value::F32(F32::from_float(x as u64 as f32)),
        (F32DemoteF64, Value::F64(x)) => Value::F32(demote(x)),
        (F64ConvertI32S, Value::I32(x)) => Value::F64(F64::from_float(x as f64)),
        (F64ConvertI32U, Value::I32(x)) => Value::F64(F64::from_float(x as u32 as f64)),
        (F64ConvertI64S, Value::I64(x)) => Value::F64(F64::from_float(x as f64)),
        (F64ConvertI64U, Value::I64(x)) => Value::F64(F64::from_float(x as u64 as f64)),
        (F64PromoteF32, Value::F32(x)) => Value::F64(promote(x)),
        (I32ReinterpretF32, Value::F32(x)) => Value::I32(x.reinterpret()),
        (I64ReinterpretF64, Value::F64(x)) => Value::I64(x.reinterpret()),
        (F32ReinterpretI32, Value::I32(x)) => Value::F32(F32::from_reinterpret(x)),
        (F64ReinterpretI64, Value::I64(x)) => Value::F64(F64::from_reinterpret(x)),
        (op, v) => return Err(type_mismatch(op.operand_type(), v)),
    })
}

/// Pops the operands of `op` from `stack`, evaluates it and pushes the result.
pub fn execute(op: NumOp, stack: &mut Vec<Value>) -> Result<(), Error> {
    let arity = op.arity();
    if stack.len() < arity { return Err(underflow(arity, stack.len())); }

    macro_rules! binary {
        ($pop:ident, $f:ident, $inner:expr) => {{
            let rhs = $pop(stack)?;
            let lhs = $pop(stack)?;
            $f($inner, lhs, rhs)
        }};
    }

    let result = match op {
        NumOp::I32Eqz => Value::I32((pop_i32(stack)? == 0) as i32),
        NumOp::I64Eqz => Value::I32((pop_i64(stack)? == 0) as i32),
        NumOp::I32Unary(u) => Value::I32(i32_unary(u, pop_i32(stack)?)),
        NumOp::I64Unary(u) => Value::I64(i64_unary(u, pop_i64(stack)?)),
        NumOp::F32Unary(u) => Value::F32(f32_unary(u, pop_f32(stack)?)),
        NumOp::F64Unary(u) => Value::F64(f64_unary(u, pop_f64(stack)?)),
        NumOp::I32Binary(o) => Value::I32(binary!(pop_i32, i32_binary, o)?),
        NumOp::I64Binary(o) => Value::I64(binary!(pop_i64, i64_binary, o)?),
        NumOp::F32Binary(o) => Value::F32(binary!(pop_f32, f32_binary, o)),
        NumOp::F64Binary(o) => Value::F64(binary!(pop_f64, f64_binary, o)),
        NumOp::I32Compare(r) => Value::I32(binary!(pop_i32, i32_compare, r) as i32),
        NumOp::I64Compare(r) => Value::I32(binary!(pop_i64, i64_compare, r) as i32),
        NumOp::F32Compare(r) => Value::I32(binary!(pop_f32, f32_compare, r) as i32),
        NumOp::F64Compare(r) => Value::I32(binary!(pop_f64, f64_compare, r) as i32),
        NumOp::Convert(c) => {
            let v = stack.pop().ok_or_else(|| underflow(1, 0))?;
            convert(c, v)?
        }
    };
    stack.push(result);
    Ok(())
}
