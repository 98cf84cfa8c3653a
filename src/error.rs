//! The error taxonomy of the compiler (spec §7).
//!
//! All errors abort the pipeline at the point of detection; none are
//! recovered locally. [`Error::Parse`] wraps the front end's `pest` error so
//! that callers still get `pest`'s pretty span-based formatting for free.

use crate::parser::Rule;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] pest::error::Error<Rule>),

    #[error("function `{name}` {kind} {found}, but a previous use {kind} {expected}")]
    ArityMismatch {
        name: String,
        kind: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("multi-assignment has only {names} receiving name(s) for {values} expression(s)")]
    TooFewReceivers { names: usize, values: usize },

    #[error("variable `{name}` is used before it is ever assigned")]
    UseBeforeInit { name: String },

    #[error("`{name}` is a reserved built-in name and cannot be declared")]
    ReservedName { name: String },

    #[error("immediate value {value} does not fit in a 16-bit signed word")]
    ImmediateOutOfRange { value: i64 },

    #[error("label `{name}` has its position set twice")]
    DuplicateLabelPosition { name: String },

    #[error("opcode `{0:?}` is not a jump and cannot be negated")]
    NonNegatableJump(crate::opcode::Opcode),

    #[error("opcode `{op:?}` has no variant for operand shapes {shape}")]
    UnsupportedOperand { op: crate::opcode::Opcode, shape: String },
}
