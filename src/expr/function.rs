use crate::catalog::types::{Value, ValueType};
use crate::error::AtError;
use compact_str::CompactString;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use std::fmt;

pub type HostFn = fn(&[Value]) -> Result<Value, AtError>;

/// SQL shape of a system function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlShape {
    /// `NAME(arg0, arg1, ...)`
    Simple(CompactString),
    /// Text with `#N` placeholders replaced by the N-th argument.
    Template(CompactString),
    /// `CAST(arg0 AS type)`
    Cast(CompactString),
}

#[derive(Clone)]
pub struct SysFunction {
    pub name: CompactString,
    pub shape: SqlShape,
    pub result: ValueType,
    /// In-memory implementation; absent for aggregates that exist only in SQL.
    pub host: Option<HostFn>,
}

impl PartialEq for SysFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.shape == other.shape && self.result == other.result
    }
}

impl fmt::Debug for SysFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysFunction")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("result", &self.result)
            .finish()
    }
}

impl SysFunction {
    pub fn simple(
        name: impl Into<CompactString>,
        sql_name: impl Into<CompactString>,
        result: ValueType,
    ) -> Self {
        Self {
            name: name.into(),
            shape: SqlShape::Simple(sql_name.into()),
            result,
            host: None,
        }
    }

    pub fn template(
        name: impl Into<CompactString>,
        template: impl Into<CompactString>,
        result: ValueType,
    ) -> Self {
        Self {
            name: name.into(),
            shape: SqlShape::Template(template.into()),
            result,
            host: None,
        }
    }

    pub fn cast(
        name: impl Into<CompactString>,
        sql_type: impl Into<CompactString>,
        result: ValueType,
    ) -> Self {
        Self {
            name: name.into(),
            shape: SqlShape::Cast(sql_type.into()),
            result,
            host: None,
        }
    }

    pub fn with_host(mut self, host: HostFn) -> Self {
        self.host = Some(host);
        self
    }

    pub fn call_host(&self, args: &[Value]) -> Result<Value, AtError> {
        match self.host {
            Some(f) => f(args),
            None => Err(AtError::internal(format!(
                "function '{}' has no in-memory implementation",
                self.name
            ))),
        }
    }
}

/// Splits a `#N` template into literal text and argument references.
pub(crate) enum TemplatePart<'a> {
    Text(&'a str),
    Arg(usize),
}

pub(crate) fn parse_template(template: &str) -> Vec<TemplatePart<'_>> {
    let mut parts = Vec::new();
    let bytes = template.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
            if start < i {
                parts.push(TemplatePart::Text(&template[start..i]));
            }
            let mut j = i + 1;
            let mut index = 0usize;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                index = index * 10 + usize::from(bytes[j] - b'0');
                j += 1;
            }
            parts.push(TemplatePart::Arg(index));
            start = j;
            i = j;
        } else {
            i += 1;
        }
    }
    if start < bytes.len() {
        parts.push(TemplatePart::Text(&template[start..]));
    }
    parts
}

fn arg(args: &[Value], index: usize) -> Result<&Value, AtError> {
    args.get(index)
        .ok_or_else(|| AtError::internal(format!("missing function argument #{index}")))
}

fn text_fn(args: &[Value], f: impl FnOnce(&str) -> Value) -> Result<Value, AtError> {
    Ok(f(arg(args, 0)?.as_text()?))
}

fn host_length(args: &[Value]) -> Result<Value, AtError> {
    text_fn(args, |s| Value::Integer(s.chars().count() as i64))
}

fn host_upper(args: &[Value]) -> Result<Value, AtError> {
    text_fn(args, |s| Value::text(s.to_uppercase()))
}

fn host_lower(args: &[Value]) -> Result<Value, AtError> {
    text_fn(args, |s| Value::text(s.to_lowercase()))
}

fn host_starts_with(args: &[Value]) -> Result<Value, AtError> {
    let s = arg(args, 0)?.as_text()?;
    Ok(Value::Boolean(s.starts_with(arg(args, 1)?.as_text()?)))
}

fn host_ends_with(args: &[Value]) -> Result<Value, AtError> {
    let s = arg(args, 0)?.as_text()?;
    Ok(Value::Boolean(s.ends_with(arg(args, 1)?.as_text()?)))
}

fn host_contains(args: &[Value]) -> Result<Value, AtError> {
    let s = arg(args, 0)?.as_text()?;
    Ok(Value::Boolean(s.contains(arg(args, 1)?.as_text()?)))
}

fn host_replace(args: &[Value]) -> Result<Value, AtError> {
    let s = arg(args, 0)?.as_text()?;
    let from = arg(args, 1)?.as_text()?;
    let to = arg(args, 2)?.as_text()?;
    Ok(Value::text(s.replace(from, to)))
}

fn char_range(s: &str, start: i64, end: Option<i64>) -> Result<Value, AtError> {
    let len = s.chars().count() as i64;
    let end = end.unwrap_or(len);
    if start < 0 || end < start || end > len {
        return Err(AtError::internal(format!(
            "substr range {start}..{end} out of bounds for length {len}"
        )));
    }
    let out: String = s
        .chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect();
    Ok(Value::text(out))
}

fn host_substr1(args: &[Value]) -> Result<Value, AtError> {
    char_range(arg(args, 0)?.as_text()?, arg(args, 1)?.as_integer()?, None)
}

fn host_substr2(args: &[Value]) -> Result<Value, AtError> {
    char_range(
        arg(args, 0)?.as_text()?,
        arg(args, 1)?.as_integer()?,
        Some(arg(args, 2)?.as_integer()?),
    )
}

// SQL LIKE with `%` and `_` wildcards.
fn like_match(s: &[char], p: &[char]) -> bool {
    match p.split_first() {
        None => s.is_empty(),
        Some((&'%', rest)) => (0..=s.len()).any(|i| like_match(&s[i..], rest)),
        Some((&'_', rest)) => !s.is_empty() && like_match(&s[1..], rest),
        Some((c, rest)) => s.first() == Some(c) && like_match(&s[1..], rest),
    }
}

fn host_like(args: &[Value]) -> Result<Value, AtError> {
    let s: Vec<char> = arg(args, 0)?.as_text()?.chars().collect();
    let p: Vec<char> = arg(args, 1)?.as_text()?.chars().collect();
    Ok(Value::Boolean(like_match(&s, &p)))
}

fn host_abs(args: &[Value]) -> Result<Value, AtError> {
    match arg(args, 0)? {
        Value::Integer(v) => v
            .checked_abs()
            .map(Value::Integer)
            .ok_or(AtError::Overflow { op: "abs" }),
        Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
        other => Err(AtError::type_mismatch("number", other.type_name())),
    }
}

fn host_sign(args: &[Value]) -> Result<Value, AtError> {
    match arg(args, 0)? {
        Value::Integer(v) => Ok(Value::Integer(v.signum())),
        Value::Decimal(d) => Ok(Value::Integer(if d.is_zero() {
            0
        } else if d.is_sign_negative() {
            -1
        } else {
            1
        })),
        other => Err(AtError::type_mismatch("number", other.type_name())),
    }
}

fn host_ceil(args: &[Value]) -> Result<Value, AtError> {
    Ok(Value::Decimal(arg(args, 0)?.as_decimal()?.ceil()))
}

fn host_floor(args: &[Value]) -> Result<Value, AtError> {
    Ok(Value::Decimal(arg(args, 0)?.as_decimal()?.floor()))
}

fn host_round(args: &[Value]) -> Result<Value, AtError> {
    let d = arg(args, 0)?.as_decimal()?;
    let digits = arg(args, 1)?.as_integer()?;
    let digits = u32::try_from(digits).map_err(|_| AtError::type_mismatch("digits >= 0", digits.to_string()))?;
    Ok(Value::Decimal(d.round_dp_with_strategy(
        digits,
        RoundingStrategy::MidpointAwayFromZero,
    )))
}

fn host_trunc(args: &[Value]) -> Result<Value, AtError> {
    let d = arg(args, 0)?.as_decimal()?.trunc();
    i64::try_from(d)
        .map(Value::Integer)
        .map_err(|_| AtError::Overflow { op: "trunc" })
}

fn host_pow(args: &[Value]) -> Result<Value, AtError> {
    let base = arg(args, 0)?.as_integer()?;
    let exp = arg(args, 1)?.as_integer()?;
    let exp = u32::try_from(exp).map_err(|_| AtError::type_mismatch("exponent >= 0", exp.to_string()))?;
    base.checked_pow(exp)
        .map(Value::Integer)
        .ok_or(AtError::Overflow { op: "pow" })
}

fn host_sqrt(args: &[Value]) -> Result<Value, AtError> {
    let d: Decimal = arg(args, 0)?.as_decimal()?;
    d.sqrt()
        .map(Value::Decimal)
        .ok_or_else(|| AtError::type_mismatch("non-negative decimal", d.to_string()))
}

fn host_least(args: &[Value]) -> Result<Value, AtError> {
    args.iter()
        .filter(|v| !v.is_null())
        .min()
        .cloned()
        .ok_or_else(|| AtError::internal("least() without arguments"))
}

fn host_greatest(args: &[Value]) -> Result<Value, AtError> {
    args.iter()
        .filter(|v| !v.is_null())
        .max()
        .cloned()
        .ok_or_else(|| AtError::internal("greatest() without arguments"))
}

fn host_coalesce(args: &[Value]) -> Result<Value, AtError> {
    Ok(args
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}

fn host_to_text(args: &[Value]) -> Result<Value, AtError> {
    match arg(args, 0)? {
        Value::Text(s) => Ok(Value::Text(s.clone())),
        other => Ok(Value::text(other.to_string())),
    }
}

/// Built-in function by name and argument count.
pub fn lookup(name: &str, arity: usize) -> Option<SysFunction> {
    use ValueType::{Boolean, Decimal as Dec, Integer, Text};
    let f = match (name, arity) {
        ("length", 1) => SysFunction::simple(name, "LENGTH", Integer).with_host(host_length),
        ("upper", 1) => SysFunction::simple(name, "UPPER", Text).with_host(host_upper),
        ("lower", 1) => SysFunction::simple(name, "LOWER", Text).with_host(host_lower),
        ("starts_with", 2) => {
            SysFunction::template(name, "(LEFT(#0, LENGTH(#1)) = #1)", Boolean)
                .with_host(host_starts_with)
        }
        ("ends_with", 2) => SysFunction::template(name, "(RIGHT(#0, LENGTH(#1)) = #1)", Boolean)
            .with_host(host_ends_with),
        ("contains", 2) => {
            SysFunction::template(name, "(STRPOS(#0, #1) > 0)", Boolean).with_host(host_contains)
        }
        ("like", 2) => {
            SysFunction::template(name, "((#0) LIKE (#1))", Boolean).with_host(host_like)
        }
        ("replace", 3) => {
            SysFunction::template(name, "REPLACE(#0, #1, #2)", Text).with_host(host_replace)
        }
        ("sub", 2) => {
            SysFunction::template(name, "SUBSTR(#0, (#1) + 1)", Text).with_host(host_substr1)
        }
        ("sub", 3) => SysFunction::template(name, "SUBSTR(#0, (#1) + 1, (#2) - (#1))", Text)
            .with_host(host_substr2),
        ("abs", 1) => SysFunction::simple(name, "ABS", Integer).with_host(host_abs),
        ("sign", 1) => SysFunction::simple(name, "SIGN", Integer).with_host(host_sign),
        ("ceil", 1) => SysFunction::simple(name, "CEIL", Dec).with_host(host_ceil),
        ("floor", 1) => SysFunction::simple(name, "FLOOR", Dec).with_host(host_floor),
        ("round", 2) => {
            SysFunction::template(name, "ROUND(#0, (#1)::INT)", Dec).with_host(host_round)
        }
        ("to_integer", 1) => {
            SysFunction::template(name, "TRUNC(#0)::BIGINT", Integer).with_host(host_trunc)
        }
        ("pow", 2) => SysFunction::simple(name, "POW", Integer).with_host(host_pow),
        ("sqrt", 1) => SysFunction::simple(name, "SQRT", Dec).with_host(host_sqrt),
        ("min", _) if arity >= 2 => {
            SysFunction::simple(name, "LEAST", Integer).with_host(host_least)
        }
        ("max", _) if arity >= 2 => {
            SysFunction::simple(name, "GREATEST", Integer).with_host(host_greatest)
        }
        ("coalesce", _) if arity >= 1 => {
            SysFunction::simple(name, "COALESCE", ValueType::Unit).with_host(host_coalesce)
        }
        ("to_text", 1) => SysFunction::cast(name, "TEXT", Text).with_host(host_to_text),
        ("sum", 1) => SysFunction::template(name, "COALESCE(SUM(#0), 0)", Integer),
        ("count", 0) => SysFunction::template(name, "COUNT(*)", Integer),
        ("count", 1) => SysFunction::simple(name, "COUNT", Integer),
        ("min", 1) => SysFunction::simple(name, "MIN", Integer),
        ("max", 1) => SysFunction::simple(name, "MAX", Integer),
        _ => return None,
    };
    Some(f)
}

/// Built-in with an explicit result type, for polymorphic functions.
pub fn lookup_typed(name: &str, arity: usize, result: ValueType) -> Option<SysFunction> {
    lookup(name, arity).map(|mut f| {
        f.result = result;
        f
    })
}
