//! Error types.
//!
//! Three disjoint classes: [`DefinitionError`] is raised while a field list is
//! being built and never at run time; [`MatchError`] is the single outcome of a
//! match where no case applied; [`ConstructError`] aborts a construction.
//! Ordinary match failures ("try the next case") are not errors at all.

use crate::field::Kind;
use std::fmt;

/// Source coordinates of a match or construct call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    /// Location of the caller (propagated through `#[track_caller]` functions).
    #[track_caller]
    pub fn caller() -> Self {
        std::panic::Location::caller().into()
    }
}

impl From<&'static std::panic::Location<'static>> for SourceLoc {
    fn from(loc: &'static std::panic::Location<'static>) -> Self {
        SourceLoc {
            file: loc.file(),
            line: loc.line(),
            column: loc.column(),
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A malformed field specification, detected when the field list is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("unknown qualifier: {0}")]
    UnknownQualifier(String),
    #[error("{0} qualifier given more than once")]
    DuplicateQualifier(&'static str),
    #[error("qualifier {qualifier} cannot be used on a {kind} field")]
    QualifierNotAllowed { qualifier: String, kind: Kind },
    #[error("integer width {0} outside 1..=64")]
    IntWidth(i64),
    #[error("string width {0} must be a positive multiple of 8 or -1")]
    TextWidth(i64),
    #[error("bitstring width {0} must be >= 0 or -1")]
    BitsWidth(i64),
    #[error("a bitstring field cannot match a literal")]
    LiteralOnBitstring,
    #[error("literal does not fit a {0} field")]
    LiteralKind(Kind),
    #[error("qualifier {0} is only valid in a match")]
    MatchOnly(String),
    #[error("constant width: {0}")]
    ConstWidth(EvalError),
}

/// No case of a match applied to the input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("no matching case at {loc}")]
    NoMatch { loc: SourceLoc },
}

impl MatchError {
    pub fn loc(&self) -> SourceLoc {
        match self {
            MatchError::NoMatch { loc } => *loc,
        }
    }
}

/// Failure evaluating a runtime width expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("unbound variable {0}")]
    Unbound(String),
    #[error("variable {0} is not an integer")]
    NotAnInteger(String),
    #[error("arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivideByZero,
}

/// Why a construct call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructFailure {
    #[error("value {value} out of range for {width}-bit {} field", signedness(.signed))]
    OutOfRange { value: i128, width: u32, signed: bool },
    #[error("integer width {0} outside 1..=64")]
    IntWidth(i64),
    #[error("string width {0} must be a positive multiple of 8")]
    TextWidth(i64),
    #[error("string is {actual} bits long, field declares {declared}")]
    TextLength { declared: i64, actual: u64 },
    #[error("bitstring width {0} must be positive")]
    BitsWidth(i64),
    #[error("bitstring is {actual} bits long, field declares {declared}")]
    BitsLength { declared: i64, actual: u64 },
    #[error("{kind} field cannot take a {value} value")]
    ValueKind { kind: Kind, value: &'static str },
    #[error("width: {0}")]
    Width(#[from] EvalError),
    #[error("no value for {0}")]
    MissingValue(String),
}

fn signedness(signed: &bool) -> &'static str {
    if *signed {
        "signed"
    } else {
        "unsigned"
    }
}

/// A construct call aborted; no partial output is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("construct error at {loc}: field {field}: {reason}")]
pub struct ConstructError {
    pub reason: ConstructFailure,
    /// Index of the offending field in the field list.
    pub field: usize,
    pub loc: SourceLoc,
}

/// Out-of-range access on a bit cursor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitsError {
    #[error("bit range {offset}+{len} exceeds buffer of {available} bits")]
    OutOfRange { offset: u64, len: u64, available: u64 },
    #[error("bit index {index} out of range for length {len}")]
    Index { index: u64, len: u64 },
}
