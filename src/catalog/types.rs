use crate::error::AtError;
use compact_str::CompactString;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Static type of an expression node or a result column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValueType {
    Unit,
    Boolean,
    Integer,
    Decimal,
    Text,
    ByteArray,
    Rowid,
    Json,
    Entity(CompactString),
    Nullable(Box<ValueType>),
    Tuple(Vec<ValueType>),
    Struct(CompactString),
    List(Box<ValueType>),
    Map(Box<ValueType>, Box<ValueType>),
}

impl ValueType {
    pub fn nullable(inner: ValueType) -> Self {
        match inner {
            ValueType::Nullable(_) => inner,
            other => ValueType::Nullable(Box::new(other)),
        }
    }

    pub fn entity(name: impl Into<CompactString>) -> Self {
        ValueType::Entity(name.into())
    }

    pub fn list(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn map(key: ValueType, value: ValueType) -> Self {
        ValueType::Map(Box::new(key), Box::new(value))
    }

    /// Decimal or nullable decimal; values of this type get the rounding wrapper.
    pub fn is_decimal(&self) -> bool {
        match self {
            ValueType::Decimal => true,
            ValueType::Nullable(inner) => inner.is_decimal(),
            _ => false,
        }
    }

    pub fn non_null(&self) -> &ValueType {
        match self {
            ValueType::Nullable(inner) => inner.non_null(),
            other => other,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Unit => write!(f, "unit"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Integer => write!(f, "integer"),
            ValueType::Decimal => write!(f, "decimal"),
            ValueType::Text => write!(f, "text"),
            ValueType::ByteArray => write!(f, "byte_array"),
            ValueType::Rowid => write!(f, "rowid"),
            ValueType::Json => write!(f, "json"),
            ValueType::Entity(name) => write!(f, "{name}"),
            ValueType::Nullable(inner) => write!(f, "{inner}?"),
            ValueType::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            ValueType::Struct(name) => write!(f, "{name}"),
            ValueType::List(elem) => write!(f, "list<{elem}>"),
            ValueType::Map(key, value) => write!(f, "map<{key},{value}>"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Text(CompactString),
    ByteArray(Vec<u8>),
    Rowid(i64),
    Json(CompactString),
    Entity {
        entity: CompactString,
        rowid: i64,
    },
    Tuple(Vec<Value>),
    Struct {
        name: CompactString,
        fields: Vec<Value>,
    },
    List(Vec<Value>),
    /// Entries in insertion order, keys unique.
    Map(Vec<(Value, Value)>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Value {
    pub fn text(s: impl Into<CompactString>) -> Self {
        Value::Text(s.into())
    }

    pub fn entity(entity: impl Into<CompactString>, rowid: i64) -> Self {
        Value::Entity {
            entity: entity.into(),
            rowid,
        }
    }

    /// Builds a map keeping each key at its first position; a repeated key
    /// replaces the earlier value.
    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (key, value) in entries {
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => out.push((key, value)),
            }
        }
        Value::Map(out)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::ByteArray(_) => "byte_array",
            Value::Rowid(_) => "rowid",
            Value::Json(_) => "json",
            Value::Entity { .. } => "entity",
            Value::Tuple(_) => "tuple",
            Value::Struct { .. } => "struct",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Result<bool, AtError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(AtError::type_mismatch("boolean", other.type_name())),
        }
    }

    pub fn as_integer(&self) -> Result<i64, AtError> {
        match self {
            Value::Integer(v) | Value::Rowid(v) => Ok(*v),
            other => Err(AtError::type_mismatch("integer", other.type_name())),
        }
    }

    pub fn as_decimal(&self) -> Result<Decimal, AtError> {
        match self {
            Value::Decimal(d) => Ok(*d),
            Value::Integer(v) => Ok(Decimal::from(*v)),
            other => Err(AtError::type_mismatch("decimal", other.type_name())),
        }
    }

    pub fn as_text(&self) -> Result<&str, AtError> {
        match self {
            Value::Text(s) | Value::Json(s) => Ok(s.as_str()),
            other => Err(AtError::type_mismatch("text", other.type_name())),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], AtError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(AtError::type_mismatch("list", other.type_name())),
        }
    }

    pub fn as_map(&self) -> Result<&[(Value, Value)], AtError> {
        match self {
            Value::Map(entries) => Ok(entries),
            other => Err(AtError::type_mismatch("map", other.type_name())),
        }
    }

    /// Row id carried by an entity or rowid value.
    pub fn as_rowid(&self) -> Result<i64, AtError> {
        match self {
            Value::Rowid(v) | Value::Entity { rowid: v, .. } => Ok(*v),
            other => Err(AtError::type_mismatch("rowid", other.type_name())),
        }
    }

    /// Element at `index` of a tuple or struct value.
    pub fn field(&self, index: usize) -> Result<&Value, AtError> {
        let items = match self {
            Value::Tuple(items) => items,
            Value::Struct { fields, .. } => fields,
            other => return Err(AtError::type_mismatch("tuple", other.type_name())),
        };
        items
            .get(index)
            .ok_or_else(|| AtError::internal(format!("field index {index} out of range")))
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Decimal(_) => 3,
            Value::Rowid(_) => 4,
            Value::Entity { .. } => 5,
            Value::Text(_) => 6,
            Value::Json(_) => 7,
            Value::ByteArray(_) => 8,
            Value::Tuple(_) => 9,
            Value::Struct { .. } => 10,
            Value::List(_) => 11,
            Value::Map(_) => 12,
        }
    }
}

/// Normalizes a decimal to the output scale used by the rounding wrapper.
pub fn round_decimal(value: Decimal, frac_digits: u32) -> Decimal {
    value
        .round_dp_with_strategy(frac_digits, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Rowid(a), Value::Rowid(b)) => a.cmp(b),
            (
                Value::Entity {
                    entity: ea,
                    rowid: ra,
                },
                Value::Entity {
                    entity: eb,
                    rowid: rb,
                },
            ) => ea.cmp(eb).then(ra.cmp(rb)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Json(a), Value::Json(b)) => a.cmp(b),
            (Value::ByteArray(a), Value::ByteArray(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            (
                Value::Struct {
                    name: na,
                    fields: fa,
                },
                Value::Struct {
                    name: nb,
                    fields: fb,
                },
            ) => na.cmp(nb).then_with(|| fa.cmp(fb)),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(v) | Value::Rowid(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Json(s) => write!(f, "{s}"),
            Value::ByteArray(bytes) => {
                write!(f, "x\"")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                write!(f, "\"")
            }
            Value::Entity { entity, rowid } => write!(f, "{entity}[{rowid}]"),
            Value::Tuple(items) | Value::List(items) | Value::Struct { fields: items, .. } => {
                let (open, close) = match self {
                    Value::List(_) => ("[", "]"),
                    _ => ("(", ")"),
                };
                if let Value::Struct { name, .. } = self {
                    write!(f, "{name}")?;
                }
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{close}")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.into())
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}
