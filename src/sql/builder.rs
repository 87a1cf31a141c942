use crate::catalog::types::{Value, ValueType};
use crate::error::AtError;
use crate::sql::alias::TableAlias;
use crate::sql::{ParameterizedSql, SqlParam};

/// Accumulates statement text together with its ordered bind parameters.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    sql: String,
    params: Vec<SqlParam>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn append(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub fn append_integer(&mut self, value: i64) {
        self.sql.push_str(&value.to_string());
    }

    /// Quoted identifier. Names come from trusted metadata and are not escaped.
    pub fn append_name(&mut self, name: &str) {
        self.sql.push('"');
        self.sql.push_str(name);
        self.sql.push('"');
    }

    pub fn append_column(&mut self, alias: &TableAlias, column: &str) {
        self.sql.push_str(&alias.name);
        self.sql.push('.');
        self.append_name(column);
    }

    pub fn append_param(&mut self, ty: ValueType, value: Value) {
        self.sql.push('?');
        self.params.push(SqlParam { ty, value });
    }

    pub fn append_builder(&mut self, other: &SqlBuilder) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params.iter().cloned());
    }

    /// Appends `sep` only when something was already written.
    pub fn append_sep(&mut self, sep: &str) {
        if !self.is_empty() {
            self.sql.push_str(sep);
        }
    }

    pub fn append_list<T, F>(&mut self, items: &[T], sep: &str, mut f: F) -> Result<(), AtError>
    where
        F: FnMut(&mut SqlBuilder, &T) -> Result<(), AtError>,
    {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            f(self, item)?;
        }
        Ok(())
    }

    pub fn build(self, max_params: usize) -> Result<ParameterizedSql, AtError> {
        if self.params.len() > max_params {
            return Err(AtError::TooManyParams {
                count: self.params.len(),
                max: max_params,
            });
        }
        Ok(ParameterizedSql {
            sql: self.sql,
            params: self.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SqlBuilder;
    use crate::catalog::schema::EntityDef;
    use crate::catalog::types::{Value, ValueType};
    use crate::error::AtErrorCode;
    use crate::sql::alias::TableAlias;
    use std::sync::Arc;

    #[test]
    fn builder_quotes_names_and_collects_params() {
        let alias = TableAlias::new("A00", Arc::new(EntityDef::new("user")));
        let mut b = SqlBuilder::new();
        b.append_sep(" AND ");
        b.append("SELECT ");
        b.append_column(&alias, "name");
        b.append(" FROM ");
        b.append_name("user");
        b.append(" A00 WHERE ");
        b.append_param(ValueType::Integer, Value::Integer(18));
        let sql = b.build(10).expect("build");
        assert_eq!(sql.sql, r#"SELECT A00."name" FROM "user" A00 WHERE ?"#);
        assert_eq!(sql.params.len(), 1);
        assert_eq!(sql.params[0].value, Value::Integer(18));
    }

    #[test]
    fn sub_builder_splices_text_and_params() {
        let mut inner = SqlBuilder::new();
        inner.append("x = ");
        inner.append_param(ValueType::Text, Value::text("a"));
        let mut outer = SqlBuilder::new();
        outer.append_param(ValueType::Integer, Value::Integer(1));
        outer.append_sep(", ");
        outer.append_builder(&inner);
        let sql = outer.build(10).expect("build");
        assert_eq!(sql.sql, "?, x = ?");
        assert_eq!(
            sql.params.iter().map(|p| p.value.clone()).collect::<Vec<_>>(),
            vec![Value::Integer(1), Value::text("a")]
        );
    }

    #[test]
    fn list_helper_separates_items() {
        let mut b = SqlBuilder::new();
        b.append_list(&["a", "b", "c"], ", ", |b, name| {
            b.append_name(name);
            Ok(())
        })
        .expect("list");
        assert_eq!(b.build(0).expect("build").sql, r#""a", "b", "c""#);
    }

    #[test]
    fn too_many_params_is_rejected() {
        let mut b = SqlBuilder::new();
        for i in 0..3 {
            b.append_param(ValueType::Integer, Value::Integer(i));
        }
        let err = b.build(2).expect_err("limit");
        assert_eq!(err.code(), AtErrorCode::TooManyParams);
        assert_eq!(err.detailed_code(), "sql:too_many_params:3");
    }
}
