//! Field descriptors: kind, width, endianness, signedness, and the pattern a
//! field is matched against.
//!
//! A [`FieldSpec`] can only be obtained through its validating constructors, so
//! any spec the engines see has a well-formed qualifier set and, when its width
//! is constant, a legal width. Width checks that depend on run-time values are
//! left to the engines.

use crate::codec::Endian;
use crate::error::{DefinitionError, EvalError};
use crate::value::{Bindings, Value};
use std::fmt;
use std::ops;
use std::str::FromStr;
use std::sync::Arc;

/// What a field decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int,
    Text,
    Bits,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Int => "int",
            Kind::Text => "string",
            Kind::Bits => "bitstring",
        })
    }
}

/// A field qualifier, as written after the width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    Int,
    String,
    Bitstring,
    Signed,
    Unsigned,
    BigEndian,
    LittleEndian,
    NativeEndian,
    /// Bind the field's start offset (in bits, relative to the matched input). Match only.
    SaveOffsetTo(String),
}

impl Qualifier {
    pub fn name(&self) -> &'static str {
        match self {
            Qualifier::Int => "int",
            Qualifier::String => "string",
            Qualifier::Bitstring => "bitstring",
            Qualifier::Signed => "signed",
            Qualifier::Unsigned => "unsigned",
            Qualifier::BigEndian => "bigendian",
            Qualifier::LittleEndian => "littleendian",
            Qualifier::NativeEndian => "nativeendian",
            Qualifier::SaveOffsetTo(_) => "save_offset_to",
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::SaveOffsetTo(name) => write!(f, "save_offset_to({})", name),
            q => f.write_str(q.name()),
        }
    }
}

impl FromStr for Qualifier {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "int" => Qualifier::Int,
            "string" => Qualifier::String,
            "bitstring" => Qualifier::Bitstring,
            "signed" => Qualifier::Signed,
            "unsigned" => Qualifier::Unsigned,
            "bigendian" => Qualifier::BigEndian,
            "littleendian" => Qualifier::LittleEndian,
            "nativeendian" => Qualifier::NativeEndian,
            _ => {
                let arg = s
                    .strip_prefix("save_offset_to")
                    .map(str::trim_start)
                    .and_then(|rest| rest.strip_prefix('('))
                    .and_then(|rest| rest.strip_suffix(')'))
                    .map(str::trim)
                    .filter(|name| !name.is_empty());
                match arg {
                    Some(name) => Qualifier::SaveOffsetTo(name.to_string()),
                    None => return Err(DefinitionError::UnknownQualifier(s.to_string())),
                }
            }
        })
    }
}

/// Integer arithmetic over earlier bindings, used for run-time widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidthExpr {
    Lit(i64),
    Var(String),
    Neg(Box<WidthExpr>),
    Add(Box<WidthExpr>, Box<WidthExpr>),
    Sub(Box<WidthExpr>, Box<WidthExpr>),
    Mul(Box<WidthExpr>, Box<WidthExpr>),
    Div(Box<WidthExpr>, Box<WidthExpr>),
}

impl WidthExpr {
    pub fn var(name: impl Into<String>) -> Self {
        WidthExpr::Var(name.into())
    }

    pub fn eval(&self, env: &Bindings<'_>) -> Result<i64, EvalError> {
        self.eval_with(&mut |name| match env.get(name) {
            None => Err(EvalError::Unbound(name.to_string())),
            Some(v) => v.as_i64().ok_or_else(|| EvalError::NotAnInteger(name.to_string())),
        })
    }

    /// Value of a variable-free expression; `None` when a variable occurs.
    pub fn fold(&self) -> Option<Result<i64, EvalError>> {
        if self.has_vars() {
            return None;
        }
        Some(self.eval_with(&mut |name| Err(EvalError::Unbound(name.to_string()))))
    }

    pub fn has_vars(&self) -> bool {
        match self {
            WidthExpr::Lit(_) => false,
            WidthExpr::Var(_) => true,
            WidthExpr::Neg(e) => e.has_vars(),
            WidthExpr::Add(a, b) | WidthExpr::Sub(a, b) | WidthExpr::Mul(a, b) | WidthExpr::Div(a, b) => {
                a.has_vars() || b.has_vars()
            }
        }
    }

    fn eval_with(&self, lookup: &mut dyn FnMut(&str) -> Result<i64, EvalError>) -> Result<i64, EvalError> {
        match self {
            WidthExpr::Lit(v) => Ok(*v),
            WidthExpr::Var(name) => lookup(name),
            WidthExpr::Neg(e) => e.eval_with(lookup)?.checked_neg().ok_or(EvalError::Overflow),
            WidthExpr::Add(a, b) => a
                .eval_with(lookup)?
                .checked_add(b.eval_with(lookup)?)
                .ok_or(EvalError::Overflow),
            WidthExpr::Sub(a, b) => a
                .eval_with(lookup)?
                .checked_sub(b.eval_with(lookup)?)
                .ok_or(EvalError::Overflow),
            WidthExpr::Mul(a, b) => a
                .eval_with(lookup)?
                .checked_mul(b.eval_with(lookup)?)
                .ok_or(EvalError::Overflow),
            WidthExpr::Div(a, b) => {
                let x = a.eval_with(lookup)?;
                let y = b.eval_with(lookup)?;
                if y == 0 {
                    return Err(EvalError::DivideByZero);
                }
                x.checked_div(y).ok_or(EvalError::Overflow)
            }
        }
    }
}

impl From<i64> for WidthExpr {
    fn from(v: i64) -> Self {
        WidthExpr::Lit(v)
    }
}

impl From<i32> for WidthExpr {
    fn from(v: i32) -> Self {
        WidthExpr::Lit(v as i64)
    }
}

impl From<&str> for WidthExpr {
    fn from(name: &str) -> Self {
        WidthExpr::var(name)
    }
}

macro_rules! width_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<T: Into<WidthExpr>> ops::$trait<T> for WidthExpr {
            type Output = WidthExpr;

            fn $method(self, rhs: T) -> WidthExpr {
                WidthExpr::$variant(Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

width_op!(Add, add, Add);
width_op!(Sub, sub, Sub);
width_op!(Mul, mul, Mul);
width_op!(Div, div, Div);

impl ops::Neg for WidthExpr {
    type Output = WidthExpr;

    fn neg(self) -> WidthExpr {
        WidthExpr::Neg(Box::new(self))
    }
}

/// Field width in bits. `-1` means "all remaining bits" (strings and bitstrings only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Width {
    Const(i64),
    /// Computed at call time.
    Dynamic(WidthExpr),
}

/// The "rest of the input" width.
pub const REST: i64 = -1;

impl From<i64> for Width {
    fn from(w: i64) -> Self {
        Width::Const(w)
    }
}

impl From<i32> for Width {
    fn from(w: i32) -> Self {
        Width::Const(w as i64)
    }
}

impl From<WidthExpr> for Width {
    fn from(e: WidthExpr) -> Self {
        match e.fold() {
            Some(Ok(w)) => Width::Const(w),
            _ => Width::Dynamic(e),
        }
    }
}

/// A validated field descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    kind: Kind,
    width: Width,
    endian: Endian,
    signed: bool,
    save_offset_to: Option<String>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &'static str) -> Result<(), DefinitionError> {
    if slot.is_some() {
        return Err(DefinitionError::DuplicateQualifier(what));
    }
    *slot = Some(value);
    Ok(())
}

fn check_const_width(kind: Kind, w: i64) -> Result<(), DefinitionError> {
    match kind {
        Kind::Int if !(1..=64).contains(&w) => Err(DefinitionError::IntWidth(w)),
        Kind::Text if w != REST && (w <= 0 || w % 8 != 0) => Err(DefinitionError::TextWidth(w)),
        Kind::Bits if w < 0 && w != REST => Err(DefinitionError::BitsWidth(w)),
        _ => Ok(()),
    }
}

impl FieldSpec {
    /// Build a descriptor from a width and a qualifier list.
    ///
    /// At most one type, one signedness and one endianness qualifier may be
    /// given; endianness and signedness are only allowed on integers. The type
    /// defaults to `int`, big endian, unsigned.
    pub fn new<Q>(width: impl Into<Width>, qualifiers: Q) -> Result<Self, DefinitionError>
    where
        Q: IntoIterator<Item = Qualifier>,
    {
        let mut kind = None;
        let mut endian = None;
        let mut signed = None;
        let mut save_offset_to = None;
        for q in qualifiers {
            let name = q.name();
            match q {
                Qualifier::Int => set_once(&mut kind, Kind::Int, "type")?,
                Qualifier::String => set_once(&mut kind, Kind::Text, "type")?,
                Qualifier::Bitstring => set_once(&mut kind, Kind::Bits, "type")?,
                Qualifier::Signed => set_once(&mut signed, (true, name), "signedness")?,
                Qualifier::Unsigned => set_once(&mut signed, (false, name), "signedness")?,
                Qualifier::BigEndian => set_once(&mut endian, (Endian::Big, name), "endianness")?,
                Qualifier::LittleEndian => set_once(&mut endian, (Endian::Little, name), "endianness")?,
                Qualifier::NativeEndian => set_once(&mut endian, (Endian::Native, name), "endianness")?,
                Qualifier::SaveOffsetTo(var) => set_once(&mut save_offset_to, var, "save_offset_to")?,
            }
        }
        let kind = kind.unwrap_or(Kind::Int);
        if kind != Kind::Int {
            if let Some(name) = endian.map(|(_, n)| n).or(signed.map(|(_, n)| n)) {
                return Err(DefinitionError::QualifierNotAllowed {
                    qualifier: name.to_string(),
                    kind,
                });
            }
        }
        let width = width.into();
        match &width {
            Width::Const(w) => check_const_width(kind, *w)?,
            Width::Dynamic(expr) => {
                if let Some(Err(err)) = expr.fold() {
                    return Err(DefinitionError::ConstWidth(err));
                }
            }
        }
        Ok(FieldSpec {
            kind,
            width,
            endian: endian.map(|(e, _)| e).unwrap_or_default(),
            signed: signed.map(|(s, _)| s).unwrap_or(false),
            save_offset_to,
        })
    }

    /// Like [`new`](Self::new), with qualifiers written as a comma-separated list
    /// (`"littleendian, signed"`).
    pub fn parse(width: impl Into<Width>, qualifiers: &str) -> Result<Self, DefinitionError> {
        let qualifiers = qualifiers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Qualifier>, _>>()?;
        FieldSpec::new(width, qualifiers)
    }

    /// Unsigned big-endian integer.
    pub fn int(width: impl Into<Width>) -> Result<Self, DefinitionError> {
        FieldSpec::new(width, [Qualifier::Int])
    }

    pub fn int_with(width: impl Into<Width>, endian: Endian, signed: bool) -> Result<Self, DefinitionError> {
        let endian = match endian {
            Endian::Big => Qualifier::BigEndian,
            Endian::Little => Qualifier::LittleEndian,
            Endian::Native => Qualifier::NativeEndian,
        };
        let sign = if signed { Qualifier::Signed } else { Qualifier::Unsigned };
        FieldSpec::new(width, [endian, sign])
    }

    pub fn text(width: impl Into<Width>) -> Result<Self, DefinitionError> {
        FieldSpec::new(width, [Qualifier::String])
    }

    pub fn bits(width: impl Into<Width>) -> Result<Self, DefinitionError> {
        FieldSpec::new(width, [Qualifier::Bitstring])
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn width(&self) -> &Width {
        &self.width
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn save_offset_to(&self) -> Option<&str> {
        self.save_offset_to.as_deref()
    }

    /// Match this field and bind it to `name`.
    pub fn bind(self, name: impl Into<String>) -> MatchField {
        MatchField::from_parts(self, Pattern::Bind(name.into()))
    }

    /// Match this field and discard it.
    pub fn skip(self) -> MatchField {
        MatchField::from_parts(self, Pattern::Wildcard)
    }

    /// Match this field only if it equals `lit`.
    pub fn literal(self, lit: impl Into<Literal>) -> Result<MatchField, DefinitionError> {
        MatchField::new(self, Pattern::Literal(lit.into()))
    }
}

/// A constant a field can be compared with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i128),
    Text(Vec<u8>),
}

impl Literal {
    pub(crate) fn matches(&self, value: &Value<'_>) -> bool {
        match self {
            Literal::Int(i) => value.as_int() == Some(*i),
            Literal::Text(t) => value.as_bytes() == Some(t.as_slice()),
        }
    }
}

macro_rules! literal_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Literal {
            fn from(v: $t) -> Self {
                Literal::Int(v as i128)
            }
        })*
    };
}

literal_from_int!(u8, u16, u32, u64, i8, i16, i32, i64, i128);

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Text(v.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Literal {
    fn from(v: &[u8]) -> Self {
        Literal::Text(v.to_vec())
    }
}

impl From<Vec<u8>> for Literal {
    fn from(v: Vec<u8>) -> Self {
        Literal::Text(v)
    }
}

/// What to do with an extracted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Wildcard,
    Bind(String),
    Literal(Literal),
}

/// Per-field predicate run right after the field binds.
pub type Check = Arc<dyn Fn(&Bindings<'_>) -> bool + Send + Sync>;

/// A field of a match case: descriptor, pattern and optional check.
#[derive(Clone)]
pub struct MatchField {
    spec: FieldSpec,
    pattern: Pattern,
    check: Option<Check>,
}

impl MatchField {
    /// Pair a descriptor with a pattern. Bitstring fields only accept binds and
    /// wildcards; literals must agree with the field kind.
    pub fn new(spec: FieldSpec, pattern: Pattern) -> Result<Self, DefinitionError> {
        if let Pattern::Literal(lit) = &pattern {
            match (spec.kind, lit) {
                (Kind::Bits, _) => return Err(DefinitionError::LiteralOnBitstring),
                (Kind::Int, Literal::Int(_)) | (Kind::Text, Literal::Text(_)) => {}
                (kind, _) => return Err(DefinitionError::LiteralKind(kind)),
            }
        }
        Ok(MatchField::from_parts(spec, pattern))
    }

    fn from_parts(spec: FieldSpec, pattern: Pattern) -> Self {
        MatchField {
            spec,
            pattern,
            check: None,
        }
    }

    /// Add a predicate over the bindings so far (this field included).
    pub fn check<F>(mut self, f: F) -> Self
    where
        F: Fn(&Bindings<'_>) -> bool + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(f));
        self
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub(crate) fn passes_check(&self, bindings: &Bindings<'_>) -> bool {
        self.check.as_ref().map_or(true, |f| f(bindings))
    }
}

impl fmt::Debug for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchField")
            .field("spec", &self.spec)
            .field("pattern", &self.pattern)
            .field("check", &self.check.is_some())
            .finish()
    }
}
