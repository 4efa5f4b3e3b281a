/// Reasons a strict decode can fail. Any of these on persisted data means corruption.
#[derive(thiserror::Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodeError {
    #[error("expected a list")]
    NotAList,

    #[error("expected {expected} elements, found {found}")]
    Arity { expected: usize, found: usize },

    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    #[error("input is truncated")]
    Truncated,

    #[error("unexpected trailing bytes")]
    TrailingBytes,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown atom tag {0:#04x}")]
    UnknownTag(u8),

    #[error("unknown variant id {0}")]
    UnknownVariant(u64),

    #[error("atom has an invalid length")]
    Length,

    #[error("lists are nested too deeply")]
    TooDeep,
}
