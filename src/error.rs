use std::borrow::Cow;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or statically invalid module.
    Compile(Cow<'static, str>),
    /// Import resolution failure.
    Link(Cow<'static, str>),
    /// Runtime trap.
    Trap(&'static str),
    /// Host API misuse (bad descriptor, wrong argument count or type).
    Type(&'static str),
    /// Host-supplied limits out of range.
    Range(&'static str),
    /// Invariant violation from upstream (malformed flattened IR).
    Internal(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Compile(s) | Error::Link(s) => f.write_str(s),
            Error::Trap(s) | Error::Type(s) | Error::Range(s) => f.write_str(s),
            Error::Internal(s) => write!(f, "internal error: {}", s),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    #[inline]
    pub fn compile(msg: impl Into<Cow<'static, str>>) -> Self { Error::Compile(msg.into()) }
    #[inline]
    pub fn link(msg: impl Into<Cow<'static, str>>) -> Self { Error::Link(msg.into()) }
    #[inline]
    pub fn trap(msg: &'static str) -> Self { Error::Trap(msg) }
    #[inline]
    pub fn internal(msg: impl Into<String>) -> Self { Error::Internal(msg.into()) }

    pub fn is_trap(&self) -> bool { matches!(self, Error::Trap(_)) }
}

#[inline(always)]
pub fn compile<T>(msg: &'static str) -> Result<T, Error> { Err(Error::Compile(Cow::Borrowed(msg))) }
#[inline(always)]
pub fn link<T>(msg: &'static str) -> Result<T, Error> { Err(Error::Link(Cow::Borrowed(msg))) }
#[inline(always)]
pub fn trap<T>(msg: &'static str) -> Result<T, Error> { Err(Error::Trap(msg)) }

// Compile errors
pub const CONST_EXP_REQUIRED: &str = "constant expression required";
pub const DUP_EXPORT_NAME: &str = "duplicate export name";
pub const END_EXPECTED: &str = "END opcode expected";
pub const FUNC_CODE_INCONSISTENT: &str = "function and code section have inconsistent lengths";
pub const ILLEGAL_OP: &str = "illegal opcode";
pub const INT_TOO_LARGE: &str = "integer too large";
pub const INT_TOO_LONG: &str = "integer representation too long";
pub const INVALID_MUTABILITY: &str = "invalid mutability";
pub const INVALID_SECTION_ID: &str = "invalid section id";
pub const INVALID_UTF8: &str = "invalid UTF-8 encoding";
pub const INVALID_VALUE_TYPE: &str = "invalid value type";
pub const MALFORMED_IMPORT_KIND: &str = "malformed import kind";
pub const MALFORMED_REF_TYPE: &str = "malformed reference type";
pub const MEMORY_SIZE_LIMIT: &str = "memory size must be at most 65536 pages (4GiB)";
pub const MIN_GREATER_THAN_MAX: &str = "size minimum must not be greater than maximum";
pub const MULTIPLE_MEMORIES: &str = "multiple memories";
pub const MULTIPLE_START: &str = "multiple start functions";
pub const MULTIPLE_TABLES: &str = "multiple tables";
pub const NESTING_TOO_DEEP: &str = "blocks nested too deeply";
pub const MUT_GLOBAL_EXPORT: &str = "mutable globals cannot be exported";
pub const MUT_GLOBAL_IMPORT: &str = "mutable globals cannot be imported";
pub const NO_MAGIC_HEADER: &str = "magic header not detected";
pub const SECTION_OUT_OF_ORDER: &str = "unexpected content after last section";
pub const SECTION_SIZE_MISMATCH: &str = "section size mismatch";
pub const START_FUNC: &str = "start function must have type [] -> []";
pub const TOO_MANY_LOCALS: &str = "too many locals";
pub const TYPE_MISMATCH: &str = "type mismatch";
pub const UNEXPECTED_END: &str = "unexpected end";
pub const UNKNOWN_BINARY_VERSION: &str = "unknown binary version";
pub const UNKNOWN_FUNC: &str = "unknown function";
pub const UNKNOWN_GLOBAL: &str = "unknown global";
pub const UNKNOWN_LABEL: &str = "unknown label";
pub const UNKNOWN_LOCAL: &str = "unknown local";
pub const UNKNOWN_MEMORY: &str = "unknown memory";
pub const UNKNOWN_TABLE: &str = "unknown table";
pub const UNKNOWN_TYPE: &str = "unknown type";
pub const ZERO_FLAG_EXPECTED: &str = "zero flag expected";
// Traps
pub const DIVIDE_BY_ZERO: &str = "integer divide by zero";
pub const FUNC_NO_IMPL: &str = "function has no implementation";
pub const INDIRECT_CALL_MISMATCH: &str = "indirect call type mismatch";
pub const INTEGER_OVERFLOW: &str = "integer overflow";
pub const INVALID_CONV_TO_INT: &str = "invalid conversion to integer";
pub const OFFSET_NEGATIVE: &str = "offset must be positive";
pub const OFFSET_TOO_LARGE: &str = "offset must be less than or equal to 0xffffffff";
pub const OOB_MEMORY_ACCESS: &str = "memory access out of bounds";
pub const STACK_EXHAUSTED: &str = "call stack exhausted";
pub const TRAPPED: &str = "trap";
pub const UNDEF_ELEM: &str = "undefined element";
pub const UNINITIALIZED_ELEM: &str = "uninitialized element";
pub const UNREACHABLE: &str = "unreachable";
// Host API errors
pub const ARG_TYPE_MISMATCH: &str = "argument type does not match the function signature";
pub const DESCRIPTOR_NOT_OBJECT: &str = "descriptor must be an object";
pub const GLOBAL_IS_IMMUTABLE: &str = "global is immutable";
pub const INVALID_DESCRIPTOR: &str = "descriptor has an invalid shape";
pub const INVALID_NUM_ARG: &str = "invalid number of arguments";
pub const MEMORY_INITIAL_ABOVE_MAX: &str = "initial memory can not be higher than the maximum";
pub const NOT_A_FUNCTION: &str = "export is not a function";
pub const RESULT_TYPE_MISMATCH: &str = "host function returned values that do not match its signature";
pub const TABLE_FULL: &str = "table has reached its maximum size";
pub const TABLE_INITIAL_ABOVE_MAX: &str = "initial number can not be higher than the maximum";
pub const TABLE_INDEX_ABOVE_MAX: &str = "table index is beyond the maximum size";
pub const UNKNOWN_EXPORT: &str = "unknown export";
// Link errors
pub const DATA_SEG_DNF: &str = "data segment does not fit";
pub const ELEM_SEG_DNF: &str = "elements segment does not fit";
pub const INCOMPATIBLE_IMPORT: &str = "incompatible import type";
