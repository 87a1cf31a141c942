use crate::catalog::schema::EntityRef;
use crate::catalog::types::Value;
use crate::error::AtError;
use crate::expr::decl::DeclExpr;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldFlags {
    /// Excluded from the visible result; still usable for sorting and grouping.
    pub omit: bool,
    pub sort: Option<Order>,
    pub group: bool,
    pub aggregate: bool,
}

impl FieldFlags {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn omitted(mut self) -> Self {
        self.omit = true;
        self
    }

    pub fn sorted(mut self, order: Order) -> Self {
        self.sort = Some(order);
        self
    }

    pub fn grouped(mut self) -> Self {
        self.group = true;
        self
    }

    pub fn aggregated(mut self) -> Self {
        self.aggregate = true;
        self
    }

    /// Whether the field contributes any SQL at all.
    pub fn is_emitted(&self) -> bool {
        !self.omit || self.sort.is_some() || self.group
    }
}

/// Builds one logical value from several raw columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combiner {
    Tuple,
    Struct { name: CompactString, size: usize },
}

impl Combiner {
    pub fn combine(&self, values: Vec<Value>) -> Result<Value, AtError> {
        match self {
            Combiner::Tuple => Ok(Value::Tuple(values)),
            Combiner::Struct { name, size } => {
                if values.len() != *size {
                    return Err(AtError::internal(format!(
                        "to_struct:values_size:{size}:{}",
                        values.len()
                    )));
                }
                Ok(Value::Struct {
                    name: name.clone(),
                    fields: values,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// One SQL column.
    Expr(DeclExpr),
    /// Fixed list of SQL columns merged by a combiner.
    Compound {
        exprs: Vec<DeclExpr>,
        combiner: Combiner,
    },
    /// Evaluated once per execution; contributes no SQL column.
    Host(DeclExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionField {
    pub flags: FieldFlags,
    pub value: FieldValue,
}

impl ProjectionField {
    pub fn new(value: FieldValue, flags: FieldFlags) -> Self {
        Self { flags, value }
    }

    pub fn expr(expr: DeclExpr) -> Self {
        Self::new(FieldValue::Expr(expr), FieldFlags::plain())
    }

    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Shapes the visible field values of one row into the query's row value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowDecoder {
    Simple,
    Tuple,
    Struct { name: CompactString },
}

impl RowDecoder {
    pub fn for_field_count(count: usize) -> Self {
        if count == 1 {
            RowDecoder::Simple
        } else {
            RowDecoder::Tuple
        }
    }

    pub fn decode(&self, mut values: Vec<Value>) -> Result<Value, AtError> {
        match self {
            RowDecoder::Simple => {
                if values.len() != 1 {
                    return Err(AtError::internal(format!(
                        "simple row decoder got {} values",
                        values.len()
                    )));
                }
                Ok(values.remove(0))
            }
            RowDecoder::Tuple => Ok(Value::Tuple(values)),
            RowDecoder::Struct { name } => Ok(Value::Struct {
                name: name.clone(),
                fields: values,
            }),
        }
    }
}

/// Resolved at-expression over entities.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub from: Vec<EntityRef>,
    pub fields: Vec<ProjectionField>,
    pub filter: Option<DeclExpr>,
    pub limit: Option<DeclExpr>,
    pub offset: Option<DeclExpr>,
    pub decoder: Option<RowDecoder>,
}

impl QueryPlan {
    pub fn new(from: Vec<EntityRef>) -> Self {
        Self {
            from,
            fields: Vec::new(),
            filter: None,
            limit: None,
            offset: None,
            decoder: None,
        }
    }

    pub fn field(mut self, field: ProjectionField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn select(self, expr: DeclExpr) -> Self {
        self.field(ProjectionField::expr(expr))
    }

    pub fn where_(mut self, filter: DeclExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: DeclExpr) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: DeclExpr) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn decoder(mut self, decoder: RowDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn row_decoder(&self) -> RowDecoder {
        self.decoder.clone().unwrap_or_else(|| {
            RowDecoder::for_field_count(self.fields.iter().filter(|f| !f.flags.omit).count())
        })
    }

    pub fn is_summarized(&self) -> bool {
        self.fields
            .iter()
            .any(|f| f.flags.group || f.flags.aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::{Combiner, FieldFlags, Order, RowDecoder};
    use crate::catalog::types::Value;

    #[test]
    fn flags_decide_emission() {
        assert!(FieldFlags::plain().is_emitted());
        assert!(!FieldFlags::plain().omitted().is_emitted());
        assert!(FieldFlags::plain().omitted().sorted(Order::Desc).is_emitted());
        assert!(FieldFlags::plain().omitted().grouped().is_emitted());
    }

    #[test]
    fn struct_combiner_checks_size() {
        let c = Combiner::Struct {
            name: "point".into(),
            size: 2,
        };
        assert!(c.combine(vec![Value::Integer(1)]).is_err());
        assert_eq!(
            c.combine(vec![Value::Integer(1), Value::Integer(2)])
                .expect("struct"),
            Value::Struct {
                name: "point".into(),
                fields: vec![Value::Integer(1), Value::Integer(2)],
            }
        );
    }

    #[test]
    fn decoder_choice_follows_field_count() {
        assert_eq!(RowDecoder::for_field_count(1), RowDecoder::Simple);
        assert_eq!(RowDecoder::for_field_count(0), RowDecoder::Tuple);
        assert!(RowDecoder::Simple.decode(vec![]).is_err());
        assert_eq!(
            RowDecoder::Tuple
                .decode(vec![Value::Integer(1), Value::text("a")])
                .expect("tuple"),
            Value::Tuple(vec![Value::Integer(1), Value::text("a")])
        );
    }
}
