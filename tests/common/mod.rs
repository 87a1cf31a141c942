#![allow(dead_code)]

use atexpr::catalog::types::{Row, Value, ValueType};
use atexpr::{AtError, ParameterizedSql, SqlExecutor};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

/// Routes compiled SQL logs to the test output when `RUST_LOG` asks for them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct SqliteExecutor {
    pub conn: Connection,
    pub statements: Vec<String>,
}

impl SqliteExecutor {
    pub fn in_memory() -> Self {
        Self::new(Connection::open_in_memory().expect("sqlite"))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            statements: Vec::new(),
        }
    }

    pub fn batch(&self, sql: &str) {
        self.conn.execute_batch(sql).expect("batch");
    }
}

fn backend(err: rusqlite::Error) -> AtError {
    AtError::Backend(err.to_string())
}

fn bind(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(v) | Value::Rowid(v) => SqlValue::Integer(*v),
        Value::Entity { rowid, .. } => SqlValue::Integer(*rowid),
        Value::Decimal(d) => SqlValue::Text(d.to_string()),
        Value::Text(s) | Value::Json(s) => SqlValue::Text(s.to_string()),
        Value::ByteArray(b) => SqlValue::Blob(b.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn decode(raw: ValueRef<'_>, ty: &ValueType) -> Result<Value, AtError> {
    if let ValueRef::Null = raw {
        return Ok(Value::Null);
    }
    let mismatch = || AtError::type_mismatch(ty.to_string(), format!("{:?}", raw.data_type()));
    Ok(match ty {
        ValueType::Nullable(inner) => decode(raw, inner)?,
        ValueType::Boolean => Value::Boolean(raw.as_i64().map_err(|_| mismatch())? != 0),
        ValueType::Integer => Value::Integer(raw.as_i64().map_err(|_| mismatch())?),
        ValueType::Rowid => Value::Rowid(raw.as_i64().map_err(|_| mismatch())?),
        ValueType::Entity(name) => Value::entity(name.clone(), raw.as_i64().map_err(|_| mismatch())?),
        ValueType::Decimal => match raw {
            ValueRef::Integer(v) => Value::Decimal(Decimal::from(v)),
            ValueRef::Real(f) => Value::Decimal(Decimal::try_from(f).map_err(|_| mismatch())?),
            ValueRef::Text(t) => Value::Decimal(
                std::str::from_utf8(t)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(mismatch)?,
            ),
            _ => return Err(mismatch()),
        },
        ValueType::ByteArray => Value::ByteArray(raw.as_blob().map_err(|_| mismatch())?.to_vec()),
        _ => Value::text(raw.as_str().map_err(|_| mismatch())?),
    })
}

impl SqlExecutor for SqliteExecutor {
    fn query(
        &mut self,
        sql: &ParameterizedSql,
        columns: &[ValueType],
        consumer: &mut dyn FnMut(Row) -> Result<(), AtError>,
    ) -> Result<(), AtError> {
        self.statements.push(sql.sql.clone());
        let mut stmt = self.conn.prepare(&sql.sql).map_err(backend)?;
        let mut rows = stmt
            .query(params_from_iter(sql.params.iter().map(|p| bind(&p.value))))
            .map_err(backend)?;
        while let Some(row) = rows.next().map_err(backend)? {
            let mut values = Vec::with_capacity(columns.len());
            for (i, ty) in columns.iter().enumerate() {
                values.push(decode(row.get_ref(i).map_err(backend)?, ty)?);
            }
            consumer(Row::from_values(values))?;
        }
        Ok(())
    }

    fn execute(&mut self, sql: &ParameterizedSql) -> Result<u64, AtError> {
        self.statements.push(sql.sql.clone());
        let changed = self
            .conn
            .execute(
                &sql.sql,
                params_from_iter(sql.params.iter().map(|p| bind(&p.value))),
            )
            .map_err(backend)?;
        Ok(changed as u64)
    }
}

pub const SCHEMA: &str = r#"
CREATE TABLE "user" ("rowid" INTEGER PRIMARY KEY, "name" TEXT NOT NULL, "age" INTEGER NOT NULL);
CREATE TABLE "pet" ("rowid" INTEGER PRIMARY KEY, "owner" INTEGER NOT NULL, "name" TEXT NOT NULL);
INSERT INTO "user" VALUES (1, 'Alice', 34), (2, 'Carol', 17), (3, 'Dave', 52), (4, 'Erin', 29), (5, 'Fay', 12);
INSERT INTO "pet" VALUES (1, 1, 'rex'), (2, 3, 'tom'), (3, 1, 'max'), (4, 3, 'kit'), (5, 1, 'bob');
"#;
