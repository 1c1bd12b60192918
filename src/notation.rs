//! Textual field lists, parsed with PEST.
//!
//! ```text
//! version : 4 ; hdrlen : 4 ; tos : 8 ; length : 16 : bigendian ;
//! options : (hdrlen - 5) * 32 : bitstring ; ..payload
//! ```
//!
//! Each field is `pattern : width [: qualifier, ...]`. A pattern is `_`, a
//! name, an integer literal (`42`, `-3`, `0x8100`, `0b101`) or a string
//! literal (`"GIF"`, with `\xHH` escapes). A width is an integer or an
//! arithmetic expression over names bound by earlier fields. A trailing
//! `..name` binds the unmatched tail.
//!
//! [`parse_fields`] gives match fields; [`parse_layout`] reads the same notation
//! for construction, where names are looked up in a value map at build time.

use crate::bits::Bitstring;
use crate::construct::{Construct, ConstructField};
use crate::error::{ConstructError, ConstructFailure, DefinitionError, SourceLoc};
use crate::field::{FieldSpec, Literal, MatchField, Pattern, Qualifier, WidthExpr};
use crate::matcher::Case;
use crate::value::{Bindings, Value};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "notation.pest"]
struct FieldListParser;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotationError {
    #[error("Parse error: {0}")]
    Syntax(String),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error("bad literal: {0}")]
    Literal(String),
    #[error("a wildcard has no value to construct")]
    Wildcard,
    #[error("..{0} is only valid in a match")]
    Rest(String),
}

enum RawPattern {
    Wildcard,
    Name(String),
    Literal(Literal),
}

struct RawField {
    pattern: RawPattern,
    spec: FieldSpec,
}

/// Fields and tail binding of one case.
#[derive(Debug, Clone)]
pub struct FieldList {
    pub fields: Vec<MatchField>,
    pub rest: Option<String>,
}

impl FieldList {
    /// Turn the list into a match case producing `result`.
    pub fn into_case<'c, 'a, R, F>(self, result: F) -> Case<'c, 'a, R>
    where
        F: Fn(&Bindings<'a>) -> R + Send + Sync + 'c,
    {
        let case = Case::new(self.fields, result);
        match self.rest {
            Some(name) => case.rest(name),
            None => case,
        }
    }

    /// A case borrowing this list, for lists parsed once and matched often.
    pub fn case<'c, 'a, R, F>(&'c self, result: F) -> Case<'c, 'a, R>
    where
        F: Fn(&Bindings<'a>) -> R + Send + Sync + 'c,
    {
        let case = Case::borrowed(&self.fields, result);
        match &self.rest {
            Some(name) => case.rest(name.as_str()),
            None => case,
        }
    }
}

/// Parse a field list for matching.
pub fn parse_fields(source: &str) -> Result<FieldList, NotationError> {
    let (raw, rest) = parse_raw(source)?;
    let fields = raw
        .into_iter()
        .map(|f| {
            let pattern = match f.pattern {
                RawPattern::Wildcard => Pattern::Wildcard,
                RawPattern::Name(n) => Pattern::Bind(n),
                RawPattern::Literal(l) => Pattern::Literal(l),
            };
            MatchField::new(f.spec, pattern)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FieldList { fields, rest })
}

/// Where a constructed field's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Literal(Literal),
    Name(String),
}

/// A parsed field list for construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    fields: Vec<(FieldSpec, Source)>,
}

/// Parse a field list for construction. Wildcards, tails and match-only
/// qualifiers are rejected.
pub fn parse_layout(source: &str) -> Result<Layout, NotationError> {
    let (raw, rest) = parse_raw(source)?;
    if let Some(name) = rest {
        return Err(NotationError::Rest(name));
    }
    let fields = raw
        .into_iter()
        .map(|f| {
            if f.spec.save_offset_to().is_some() {
                return Err(DefinitionError::MatchOnly("save_offset_to".to_string()).into());
            }
            let source = match f.pattern {
                RawPattern::Wildcard => return Err(NotationError::Wildcard),
                RawPattern::Name(n) => Source::Name(n),
                RawPattern::Literal(l) => Source::Literal(l),
            };
            Ok((f.spec, source))
        })
        .collect::<Result<Vec<_>, NotationError>>()?;
    Ok(Layout { fields })
}

fn literal_value(lit: &Literal) -> Value<'static> {
    match lit {
        Literal::Int(i) if *i >= 0 => Value::Unsigned(*i as u64),
        Literal::Int(i) => Value::Signed(*i as i64),
        Literal::Text(t) => Value::Text(t.clone()),
    }
}

impl Layout {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Construct with names resolved from `values`, which also serve as the
    /// environment for run-time widths.
    #[track_caller]
    pub fn build<'a>(&self, values: &Bindings<'a>) -> Result<Bitstring, ConstructError> {
        let mut construct = Construct::new().with_env(values.clone());
        for (index, (spec, source)) in self.fields.iter().enumerate() {
            let value = match source {
                Source::Literal(lit) => literal_value(lit),
                Source::Name(name) => match values.get(name) {
                    Some(v) => v.clone(),
                    None => {
                        return Err(ConstructError {
                            reason: ConstructFailure::MissingValue(name.clone()),
                            field: index,
                            loc: SourceLoc::caller(),
                        })
                    }
                },
            };
            construct.push(ConstructField::from_parts(spec.clone(), value));
        }
        construct.build()
    }
}

fn parse_raw(source: &str) -> Result<(Vec<RawField>, Option<String>), NotationError> {
    let pairs = FieldListParser::parse(Rule::field_list, source).map_err(|e| NotationError::Syntax(e.to_string()))?;
    let list = pairs
        .into_iter()
        .next()
        .ok_or_else(|| NotationError::Syntax("empty parse".to_string()))?;
    let mut fields = Vec::new();
    let mut rest = None;
    for inner in list.into_inner() {
        match inner.as_rule() {
            Rule::field => fields.push(build_field(inner)?),
            Rule::rest => rest = inner.into_inner().next().map(|p| p.as_str().to_string()),
            _ => {}
        }
    }
    Ok((fields, rest))
}

fn build_field(pair: Pair<Rule>) -> Result<RawField, NotationError> {
    let mut pattern = None;
    let mut width = None;
    let mut qualifiers = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::pattern => pattern = Some(build_pattern(inner)?),
            Rule::expr => width = Some(build_expr(inner)?),
            Rule::qualifiers => {
                for q in inner.into_inner() {
                    let text: String = q.into_inner().map(|p| p.as_str()).collect::<Vec<_>>().join("(");
                    let text = if text.contains('(') { format!("{})", text) } else { text };
                    qualifiers.push(text.parse::<Qualifier>()?);
                }
            }
            _ => {}
        }
    }
    let pattern = pattern.ok_or_else(|| NotationError::Syntax("field: missing pattern".to_string()))?;
    let width = width.ok_or_else(|| NotationError::Syntax("field: missing width".to_string()))?;
    Ok(RawField {
        pattern,
        spec: FieldSpec::new(width, qualifiers)?,
    })
}

fn build_pattern(pair: Pair<Rule>) -> Result<RawPattern, NotationError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| NotationError::Syntax("pattern: empty".to_string()))?;
    Ok(match inner.as_rule() {
        Rule::wildcard => RawPattern::Wildcard,
        Rule::ident => RawPattern::Name(inner.as_str().to_string()),
        Rule::integer => RawPattern::Literal(Literal::Int(parse_int(inner.as_str())?)),
        Rule::string => {
            let body = inner.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            RawPattern::Literal(Literal::Text(unescape(body)?))
        }
        r => return Err(NotationError::Syntax(format!("pattern: unexpected {:?}", r))),
    })
}

/// Integer literal in the range of either `u64` or `i64`.
fn parse_int(s: &str) -> Result<i128, NotationError> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, s),
    };
    let (radix, digits) = if let Some(d) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, d)
    } else if let Some(d) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, d)
    } else {
        (10, digits)
    };
    let magnitude = i128::from_str_radix(digits, radix).map_err(|_| NotationError::Literal(s.to_string()))?;
    let v = if negative { -magnitude } else { magnitude };
    if v < i64::MIN as i128 || v > u64::MAX as i128 {
        return Err(NotationError::Literal(s.to_string()));
    }
    Ok(v)
}

fn unescape(body: &str) -> Result<Vec<u8>, NotationError> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('"') => out.push(b'"'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let b = u8::from_str_radix(&hex, 16).map_err(|_| NotationError::Literal(format!("\\x{}", hex)))?;
                out.push(b);
            }
            Some(other) => return Err(NotationError::Literal(format!("\\{}", other))),
            None => return Err(NotationError::Literal("trailing backslash".to_string())),
        }
    }
    Ok(out)
}

fn build_expr(pair: Pair<Rule>) -> Result<WidthExpr, NotationError> {
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| NotationError::Syntax("expr: empty".to_string()))?;
    let mut acc = build_term(first)?;
    while let (Some(op), Some(rhs)) = (inner.next(), inner.next()) {
        let rhs = build_term(rhs)?;
        acc = match op.as_str() {
            "+" => acc + rhs,
            _ => acc - rhs,
        };
    }
    Ok(acc)
}

fn build_term(pair: Pair<Rule>) -> Result<WidthExpr, NotationError> {
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| NotationError::Syntax("term: empty".to_string()))?;
    let mut acc = build_factor(first)?;
    while let (Some(op), Some(rhs)) = (inner.next(), inner.next()) {
        let rhs = build_factor(rhs)?;
        acc = match op.as_str() {
            "*" => acc * rhs,
            _ => acc / rhs,
        };
    }
    Ok(acc)
}

fn build_factor(pair: Pair<Rule>) -> Result<WidthExpr, NotationError> {
    let mut negate = false;
    let mut atom = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::neg => negate = true,
            Rule::atom => atom = Some(build_atom(inner)?),
            _ => {}
        }
    }
    let atom = atom.ok_or_else(|| NotationError::Syntax("factor: empty".to_string()))?;
    Ok(if negate { -atom } else { atom })
}

fn build_atom(pair: Pair<Rule>) -> Result<WidthExpr, NotationError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| NotationError::Syntax("atom: empty".to_string()))?;
    match inner.as_rule() {
        Rule::uint => {
            let v = parse_int(inner.as_str())?;
            i64::try_from(v)
                .map(WidthExpr::Lit)
                .map_err(|_| NotationError::Literal(inner.as_str().to_string()))
        }
        Rule::ident => Ok(WidthExpr::var(inner.as_str())),
        Rule::expr => build_expr(inner),
        r => Err(NotationError::Syntax(format!("atom: unexpected {:?}", r))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Kind, Width};

    #[test]
    fn width_expression_folds_constants() {
        let list = parse_fields("x : 2 * (3 + 1) ; y : -1 : bitstring").unwrap();
        assert_eq!(list.fields[0].spec().width(), &Width::Const(8));
        assert_eq!(list.fields[1].spec().width(), &Width::Const(-1));
        assert_eq!(list.fields[1].spec().kind(), Kind::Bits);
    }

    #[test]
    fn qualifier_with_argument() {
        let list = parse_fields("x : 8 : save_offset_to(at), signed").unwrap();
        assert_eq!(list.fields[0].spec().save_offset_to(), Some("at"));
        assert!(list.fields[0].spec().is_signed());
    }

    #[test]
    fn int_literal_range() {
        assert_eq!(parse_int("0xffffffffffffffff").unwrap(), u64::MAX as i128);
        assert!(parse_int("0x1ffffffffffffffff").is_err());
        assert_eq!(parse_int("-0b101").unwrap(), -5);
    }

    #[test]
    fn escapes() {
        assert_eq!(unescape(r#"a\x00\"b"#).unwrap(), b"a\x00\"b".to_vec());
        assert!(unescape(r"\q").is_err());
    }
}
