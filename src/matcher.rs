//! Match engine: try an ordered list of cases against one input and commit to
//! the first whose fields and guard all succeed.
//!
//! Each case starts from the original input. Fields are extracted left to
//! right; a short input, an out-of-policy run-time width, a literal mismatch or
//! a failed check abandons the case and moves to the next one. These failures
//! are ordinary control flow, reported only through `tracing` at trace level.
//! If no case applies the caller gets [`MatchError::NoMatch`] with the call
//! site's location.
//!
//! A case's result sees bindings that borrow from the input (`'a`), so it may
//! return sub-bitstrings or the unmatched tail.
//!
//! ```
//! use bitmatch::{bitmatch, BitCursor, Case, FieldSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cases = [Case::new(
//!     [FieldSpec::int(8)?.bind("x"), FieldSpec::int(16)?.bind("y")],
//!     |b| (b.u64("x"), b.u64("y")),
//! )];
//! let out = bitmatch(BitCursor::from_bytes(&[1, 2, 3]), &cases)?;
//! assert_eq!(out, (Some(1), Some(0x0203)));
//! # Ok(())
//! # }
//! ```

use crate::bits::BitCursor;
use crate::codec::{extract_bits, extract_int, extract_text};
use crate::error::{EvalError, MatchError, SourceLoc};
use crate::field::{Kind, MatchField, Pattern, Width, REST};
use crate::value::{Bindings, Value};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

type Guard<'c> = dyn Fn(&Bindings<'_>) -> bool + Send + Sync + 'c;
type Action<'c, 'a, R> = dyn Fn(&Bindings<'a>) -> R + Send + Sync + 'c;

/// One candidate layout: fields, optional tail binding, optional guard, result.
///
/// `'c` bounds the fields and closures, `'a` is the input the case runs on.
pub struct Case<'c, 'a, R> {
    fields: Cow<'c, [MatchField]>,
    rest: Option<Cow<'c, str>>,
    guard: Option<Box<Guard<'c>>>,
    result: Box<Action<'c, 'a, R>>,
}

impl<'c, 'a, R> Case<'c, 'a, R> {
    pub fn new<I, F>(fields: I, result: F) -> Self
    where
        I: IntoIterator<Item = MatchField>,
        F: Fn(&Bindings<'a>) -> R + Send + Sync + 'c,
    {
        Case::from_fields(Cow::Owned(fields.into_iter().collect()), result)
    }

    /// A case over fields kept elsewhere, e.g. a field list parsed once.
    pub fn borrowed<F>(fields: &'c [MatchField], result: F) -> Self
    where
        F: Fn(&Bindings<'a>) -> R + Send + Sync + 'c,
    {
        Case::from_fields(Cow::Borrowed(fields), result)
    }

    fn from_fields<F>(fields: Cow<'c, [MatchField]>, result: F) -> Self
    where
        F: Fn(&Bindings<'a>) -> R + Send + Sync + 'c,
    {
        Case {
            fields,
            rest: None,
            guard: None,
            result: Box::new(result),
        }
    }

    /// Bind whatever input remains after the last field to `name`.
    pub fn rest(mut self, name: impl Into<Cow<'c, str>>) -> Self {
        self.rest = Some(name.into());
        self
    }

    /// Only commit when `guard` holds over the bindings.
    pub fn guard<G>(mut self, guard: G) -> Self
    where
        G: Fn(&Bindings<'_>) -> bool + Send + Sync + 'c,
    {
        self.guard = Some(Box::new(guard));
        self
    }

    pub fn fields(&self) -> &[MatchField] {
        &self.fields
    }
}

impl<R> fmt::Debug for Case<'_, '_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("fields", &self.fields)
            .field("rest", &self.rest)
            .field("guard", &self.guard.is_some())
            .finish()
    }
}

/// Why a case was abandoned.
#[derive(Debug)]
enum Failure {
    Short { field: usize, need: u64, have: u64 },
    Width { field: usize, width: i64 },
    Eval { field: usize, err: EvalError },
    Literal { field: usize },
    Check { field: usize },
    Guard,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Short { field, need, have } => {
                write!(f, "field {}: needs {} bits, {} remain", field, need, have)
            }
            Failure::Width { field, width } => write!(f, "field {}: width {} not allowed", field, width),
            Failure::Eval { field, err } => write!(f, "field {}: width: {}", field, err),
            Failure::Literal { field } => write!(f, "field {}: literal mismatch", field),
            Failure::Check { field } => write!(f, "field {}: check failed", field),
            Failure::Guard => f.write_str("guard is false"),
        }
    }
}

enum Attempt<'a> {
    Matched(Bindings<'a>),
    Failed(Failure),
}

/// How many bits a field takes: a fixed count or the rest of the input.
enum Take {
    Bits(u64),
    Rest,
}

fn resolve_width(index: usize, field: &MatchField, bindings: &Bindings<'_>) -> Result<Take, Failure> {
    let spec = field.spec();
    match spec.width() {
        Width::Const(w) => match spec.kind() {
            Kind::Int if (1..=64).contains(w) => Ok(Take::Bits(*w as u64)),
            Kind::Text if *w > 0 && w % 8 == 0 => Ok(Take::Bits(*w as u64)),
            Kind::Bits if *w >= 0 => Ok(Take::Bits(*w as u64)),
            Kind::Text | Kind::Bits if *w == REST => Ok(Take::Rest),
            kind => unreachable!("{} field with unvalidated constant width {}", kind, w),
        },
        Width::Dynamic(expr) => {
            let w = expr.eval(bindings).map_err(|err| Failure::Eval { field: index, err })?;
            let ok = match spec.kind() {
                Kind::Int => (1..=64).contains(&w),
                Kind::Text => w >= 0 && w % 8 == 0,
                Kind::Bits => w >= 0,
            };
            if ok {
                Ok(Take::Bits(w as u64))
            } else {
                Err(Failure::Width { field: index, width: w })
            }
        }
    }
}

fn extract_field<'a>(
    index: usize,
    field: &MatchField,
    cur: BitCursor<'a>,
    bindings: &Bindings<'a>,
) -> Result<(Value<'a>, BitCursor<'a>), Failure> {
    let spec = field.spec();
    let bits = match resolve_width(index, field, bindings)? {
        Take::Bits(n) => Some(n),
        Take::Rest => None,
    };
    let short = || Failure::Short {
        field: index,
        need: bits.unwrap_or(0),
        have: cur.len(),
    };
    match spec.kind() {
        Kind::Int => {
            let width = bits.unwrap_or(0) as u32;
            extract_int(cur, width, spec.endian(), spec.is_signed()).ok_or_else(short)
        }
        Kind::Text => extract_text(cur, bits).map(|(t, rest)| (Value::Text(t), rest)).ok_or_else(short),
        Kind::Bits => extract_bits(cur, bits).map(|(b, rest)| (Value::Bits(b), rest)).ok_or_else(short),
    }
}

fn attempt<'a, R>(case: &Case<'_, 'a, R>, input: BitCursor<'a>) -> Attempt<'a> {
    let mut bindings = Bindings::new();
    let mut cur = input;
    for (index, field) in case.fields.iter().enumerate() {
        if let Some(name) = field.spec().save_offset_to() {
            bindings.insert(name, Value::Unsigned(cur.offset() - input.offset()));
        }
        let (value, rest) = match extract_field(index, field, cur, &bindings) {
            Ok(v) => v,
            Err(f) => return Attempt::Failed(f),
        };
        match field.pattern() {
            Pattern::Wildcard => {}
            Pattern::Bind(name) => bindings.insert(name.as_str(), value),
            Pattern::Literal(lit) => {
                if !lit.matches(&value) {
                    return Attempt::Failed(Failure::Literal { field: index });
                }
            }
        }
        if !field.passes_check(&bindings) {
            return Attempt::Failed(Failure::Check { field: index });
        }
        cur = rest;
    }
    if let Some(name) = &case.rest {
        bindings.insert(&**name, Value::Bits(cur));
    }
    if let Some(guard) = &case.guard {
        if !guard(&bindings) {
            return Attempt::Failed(Failure::Guard);
        }
    }
    Attempt::Matched(bindings)
}

fn run_cases<'a, R>(
    cases: &[Case<'_, 'a, R>],
    input: BitCursor<'a>,
    loc: SourceLoc,
    profile: &[CaseProfile],
) -> Result<R, MatchError> {
    for (i, case) in cases.iter().enumerate() {
        if let Some(p) = profile.get(i) {
            p.attempts.fetch_add(1, Ordering::Relaxed);
        }
        match attempt(case, input) {
            Attempt::Matched(bindings) => {
                tracing::trace!(target: "bitmatch::matcher", case = i, %loc, "case matched");
                if let Some(p) = profile.get(i) {
                    p.commits.fetch_add(1, Ordering::Relaxed);
                }
                return Ok((case.result)(&bindings));
            }
            Attempt::Failed(reason) => {
                tracing::trace!(target: "bitmatch::matcher", case = i, %reason, "case failed");
            }
        }
    }
    tracing::debug!(target: "bitmatch::matcher", cases = cases.len(), bits = input.len(), %loc, "no matching case");
    Err(MatchError::NoMatch { loc })
}

/// Match `input` against `cases` once. The caller's location is reported on failure.
#[track_caller]
pub fn bitmatch<'a, R>(input: BitCursor<'a>, cases: &[Case<'_, 'a, R>]) -> Result<R, MatchError> {
    run_cases(cases, input, SourceLoc::caller(), &[])
}

/// Attempt and commit counters for one case; only kept with the
/// `match_profile` feature.
#[derive(Debug, Default)]
pub struct CaseProfile {
    pub attempts: AtomicU64,
    pub commits: AtomicU64,
}

/// A reusable case list bound to the place it was created. It runs on any
/// input that outlives `'a`.
pub struct Matcher<'c, 'a, R> {
    cases: Vec<Case<'c, 'a, R>>,
    loc: SourceLoc,
    profile: Vec<CaseProfile>,
}

impl<'c, 'a, R> Matcher<'c, 'a, R> {
    #[track_caller]
    pub fn new(cases: impl IntoIterator<Item = Case<'c, 'a, R>>) -> Self {
        let cases: Vec<_> = cases.into_iter().collect();
        let profile = if cfg!(feature = "match_profile") {
            cases.iter().map(|_| CaseProfile::default()).collect()
        } else {
            Vec::new()
        };
        Matcher {
            profile,
            cases,
            loc: SourceLoc::caller(),
        }
    }

    pub fn loc(&self) -> SourceLoc {
        self.loc
    }

    pub fn cases(&self) -> &[Case<'c, 'a, R>] {
        &self.cases
    }

    pub fn run(&self, input: BitCursor<'a>) -> Result<R, MatchError> {
        run_cases(&self.cases, input, self.loc, &self.profile)
    }

    /// `(attempts, commits)` per case since creation or the last reset.
    #[cfg(feature = "match_profile")]
    pub fn profile(&self) -> Vec<(u64, u64)> {
        self.profile
            .iter()
            .map(|p| (p.attempts.load(Ordering::Relaxed), p.commits.load(Ordering::Relaxed)))
            .collect()
    }

    #[cfg(feature = "match_profile")]
    pub fn reset_profile(&self) {
        for p in &self.profile {
            p.attempts.store(0, Ordering::Relaxed);
            p.commits.store(0, Ordering::Relaxed);
        }
    }
}

impl<R> fmt::Debug for Matcher<'_, '_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("cases", &self.cases)
            .field("loc", &self.loc)
            .finish()
    }
}
