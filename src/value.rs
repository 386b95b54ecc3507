use std::fmt::{Display, Formatter};

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValType {
    I32 = 0x7f,
    I64 = 0x7e,
    F32 = 0x7d,
    F64 = 0x7c,
}

impl ValType {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x7f => Some(ValType::I32),
            0x7e => Some(ValType::I64),
            0x7d => Some(ValType::F32),
            0x7c => Some(ValType::F64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        }
    }
}

impl Display for ValType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}

/// Generates a float wrapper that keeps NaN payloads and infinities as explicit
/// tagged cases so reinterpretation reproduces the exact bit pattern.
macro_rules! tagged_float {
    ($name:ident, $float:ty, $bits:ty, $int:ty, $sign:expr, $exp:expr, $mantissa:expr) => {
        #[derive(Debug, Clone, Copy)]
        pub enum $name {
            /// Finite value, including both zeroes and subnormals.
            Num($float),
            Inf { negative: bool },
            Nan { negative: bool, payload: $bits },
        }

        impl $name {
            pub const SIGN_MASK: $bits = $sign;
            pub const EXP_MASK: $bits = $exp;
            pub const PAYLOAD_MASK: $bits = $mantissa;
            /// Quiet bit only: the payload of the canonical NaN.
            pub const CANONICAL_PAYLOAD: $bits = ($mantissa >> 1) + 1;

            #[inline]
            pub fn from_bits(bits: $bits) -> Self {
                let negative = bits & Self::SIGN_MASK != 0;
                if bits & Self::EXP_MASK != Self::EXP_MASK {
                    return $name::Num(<$float>::from_bits(bits));
                }
                match bits & Self::PAYLOAD_MASK {
                    0 => $name::Inf { negative },
                    payload => $name::Nan { negative, payload },
                }
            }

            #[inline]
            pub fn to_bits(self) -> $bits {
                let sign = |negative: bool| if negative { Self::SIGN_MASK } else { 0 };
                match self {
                    $name::Num(v) => v.to_bits(),
                    $name::Inf { negative } => sign(negative) | Self::EXP_MASK,
                    $name::Nan { negative, payload } => {
                        sign(negative) | Self::EXP_MASK | (payload & Self::PAYLOAD_MASK)
                    }
                }
            }

            #[inline]
            pub fn from_float(v: $float) -> Self { Self::from_bits(v.to_bits()) }

            #[inline]
            pub fn to_float(self) -> $float { <$float>::from_bits(self.to_bits()) }

            /// Positive NaN with the given payload; a zero payload yields the canonical NaN.
            pub fn nan(payload: $bits) -> Self {
                let payload = payload & Self::PAYLOAD_MASK;
                let payload = if payload == 0 { Self::CANONICAL_PAYLOAD } else { payload };
                $name::Nan { negative: false, payload }
            }

            pub fn canonical_nan() -> Self { Self::nan(Self::CANONICAL_PAYLOAD) }

            pub fn infinity(negative: bool) -> Self { $name::Inf { negative } }

            /// Wraps a freshly computed native result. NaNs produced by the host FPU
            /// carry platform-specific bits, so they collapse to the canonical NaN.
            #[inline]
            pub fn from_result(v: $float) -> Self {
                if v.is_nan() { Self::canonical_nan() } else { Self::from_float(v) }
            }

            #[inline]
            pub fn is_nan(self) -> bool { matches!(self, $name::Nan { .. }) }

            #[inline]
            pub fn is_infinite(self) -> bool { matches!(self, $name::Inf { .. }) }

            #[inline]
            pub fn is_sign_negative(self) -> bool { self.to_bits() & Self::SIGN_MASK != 0 }

            pub fn payload(self) -> Option<$bits> {
                match self {
                    $name::Nan { payload, .. } => Some(payload),
                    _ => None,
                }
            }

            /// Integer with the same bit pattern.
            #[inline]
            pub fn reinterpret(self) -> $int { self.to_bits() as $int }

            #[inline]
            pub fn from_reinterpret(v: $int) -> Self { Self::from_bits(v as $bits) }

            #[inline]
            pub fn with_sign(self, negative: bool) -> Self {
                let bits = self.to_bits() & !Self::SIGN_MASK;
                Self::from_bits(if negative { bits | Self::SIGN_MASK } else { bits })
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool { self.to_bits() == other.to_bits() }
        }

        impl Eq for $name {}

        impl From<$float> for $name {
            fn from(v: $float) -> Self { Self::from_float(v) }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                match self {
                    $name::Num(v) => write!(f, "{}", v),
                    $name::Inf { negative: true } => f.write_str("-inf"),
                    $name::Inf { negative: false } => f.write_str("inf"),
                    $name::Nan { negative, payload } => {
                        write!(f, "{}nan:0x{:x}", if *negative { "-" } else { "" }, payload)
                    }
                }
            }
        }
    };
}

tagged_float!(F32, f32, u32, i32, 0x8000_0000, 0x7f80_0000, 0x007f_ffff);
tagged_float!(F64, f64, u64, i64, 0x8000_0000_0000_0000, 0x7ff0_0000_0000_0000, 0x000f_ffff_ffff_ffff);

/// A typed operand. Equality is bit-pattern equality, so NaNs with the same
/// payload compare equal; IEEE comparison lives in the numeric opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(F32),
    F64(F64),
}

impl Value {
    pub fn ty(&self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }

    pub fn default_for(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(F32::Num(0.0)),
            ValType::F64 => Value::F64(F64::Num(0.0)),
        }
    }

    #[inline] pub fn as_i32(self) -> Option<i32> { if let Value::I32(v) = self { Some(v) } else { None } }
    #[inline] pub fn as_i64(self) -> Option<i64> { if let Value::I64(v) = self { Some(v) } else { None } }
    #[inline] pub fn as_f32(self) -> Option<F32> { if let Value::F32(v) = self { Some(v) } else { None } }
    #[inline] pub fn as_f64(self) -> Option<F64> { if let Value::F64(v) = self { Some(v) } else { None } }

    /// Raw bits, zero-extended to 64.
    pub fn to_bits(self) -> u64 {
        match self {
            Value::I32(v) => v as u32 as u64,
            Value::I64(v) => v as u64,
            Value::F32(v) => v.to_bits() as u64,
            Value::F64(v) => v.to_bits(),
        }
    }

    pub fn from_bits(ty: ValType, bits: u64) -> Self {
        match ty {
            ValType::I32 => Value::I32(bits as u32 as i32),
            ValType::I64 => Value::I64(bits as i64),
            ValType::F32 => Value::F32(F32::from_bits(bits as u32)),
            ValType::F64 => Value::F64(F64::from_bits(bits)),
        }
    }
}

impl From<i32> for Value { fn from(v: i32) -> Self { Value::I32(v) } }
impl From<u32> for Value { fn from(v: u32) -> Self { Value::I32(v as i32) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::I64(v) } }
impl From<u64> for Value { fn from(v: u64) -> Self { Value::I64(v as i64) } }
impl From<f32> for Value { fn from(v: f32) -> Self { Value::F32(F32::from_float(v)) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::F64(F64::from_float(v)) } }
impl From<F32> for Value { fn from(v: F32) -> Self { Value::F32(v) } }
impl From<F64> for Value { fn from(v: F64) -> Self { Value::F64(v) } }

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{}:i32", v),
            Value::I64(v) => write!(f, "{}:i64", v),
            Value::F32(v) => write!(f, "{}:f32", v),
            Value::F64(v) => write!(f, "{}:f64", v),
        }
    }
}
