use crate::error::AtError;
use crate::expr::decl::TableExpr;
use crate::expr::function::{SqlShape, TemplatePart, parse_template};
use crate::expr::reduced::ReducedExpr;
use crate::sql::alias::{AliasRegistry, TableAlias};
use crate::sql::builder::SqlBuilder;

pub fn resolve_table(table: &TableExpr, reg: &mut AliasRegistry) -> Result<TableAlias, AtError> {
    match table {
        TableExpr::Entity(entity_ref) => reg.get_alias(entity_ref),
        TableExpr::Relation { base, attr, target } => {
            let base = resolve_table(base, reg)?;
            reg.get_relation_alias(&base, attr, target)
        }
    }
}

/// Dry walk that registers every join the expression will need.
pub fn touch_aliases(expr: &ReducedExpr, reg: &mut AliasRegistry) -> Result<(), AtError> {
    match expr {
        ReducedExpr::Constant { .. } | ReducedExpr::Tuple { .. } => Ok(()),
        ReducedExpr::Table(table) | ReducedExpr::Rowid(table) => {
            resolve_table(table, reg).map(|_| ())
        }
        ReducedExpr::Attr { base, .. } => resolve_table(base, reg).map(|_| ()),
        ReducedExpr::Binary { left, right, .. } => {
            touch_aliases(left, reg)?;
            touch_aliases(right, reg)
        }
        ReducedExpr::Unary { expr, .. } | ReducedExpr::Round { expr, .. } => {
            touch_aliases(expr, reg)
        }
        ReducedExpr::In {
            key, alternatives, ..
        } => {
            touch_aliases(key, reg)?;
            alternatives.iter().try_for_each(|a| touch_aliases(a, reg))
        }
        ReducedExpr::Case { cases, default, .. } => {
            for case in cases {
                touch_aliases(&case.cond, reg)?;
                touch_aliases(&case.expr, reg)?;
            }
            match default {
                Some(d) => touch_aliases(d, reg),
                None => Ok(()),
            }
        }
        ReducedExpr::Call { args, .. } => args.iter().try_for_each(|a| touch_aliases(a, reg)),
    }
}

pub fn emit_sql(
    expr: &ReducedExpr,
    reg: &mut AliasRegistry,
    b: &mut SqlBuilder,
) -> Result<(), AtError> {
    match expr {
        ReducedExpr::Constant { value, ty } => {
            b.append_param(ty.clone(), value.clone());
            Ok(())
        }
        ReducedExpr::Tuple { values, element } => {
            b.append("(");
            if values.is_empty() {
                // empty tuples are not valid SQL
                b.append("NULL");
            }
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    b.append(", ");
                }
                b.append_param(element.clone(), value.clone());
            }
            b.append(")");
            Ok(())
        }
        ReducedExpr::Table(table) | ReducedExpr::Rowid(table) => {
            let alias = resolve_table(table, reg)?;
            b.append_column(&alias, &alias.entity.rowid_column);
            Ok(())
        }
        ReducedExpr::Attr { base, attr } => {
            let alias = resolve_table(base, reg)?;
            b.append_column(&alias, &attr.sql_column);
            Ok(())
        }
        ReducedExpr::Binary { op, left, right } => {
            b.append("(");
            emit_sql(left, reg, b)?;
            b.append(" ");
            b.append(op.sql());
            b.append(" ");
            emit_sql(right, reg, b)?;
            b.append(")");
            Ok(())
        }
        ReducedExpr::Unary { op, expr } => {
            b.append("(");
            b.append(op.sql());
            emit_sql(expr, reg, b)?;
            b.append(")");
            Ok(())
        }
        ReducedExpr::In {
            key,
            alternatives,
            not,
        } => {
            b.append("(");
            emit_sql(key, reg, b)?;
            b.append(if *not { " NOT IN (" } else { " IN (" });
            for (i, alt) in alternatives.iter().enumerate() {
                if i > 0 {
                    b.append(", ");
                }
                emit_sql(alt, reg, b)?;
            }
            b.append("))");
            Ok(())
        }
        ReducedExpr::Case { cases, default, .. } => {
            b.append("CASE");
            for case in cases {
                b.append(" WHEN ");
                emit_sql(&case.cond, reg, b)?;
                b.append(" THEN ");
                emit_sql(&case.expr, reg, b)?;
            }
            if let Some(default) = default {
                b.append(" ELSE ");
                emit_sql(default, reg, b)?;
            }
            b.append(" END");
            Ok(())
        }
        ReducedExpr::Call { function, args } => match &function.shape {
            SqlShape::Simple(name) => {
                b.append(name);
                b.append("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        b.append(", ");
                    }
                    emit_sql(arg, reg, b)?;
                }
                b.append(")");
                Ok(())
            }
            SqlShape::Template(template) => {
                for part in parse_template(template) {
                    match part {
                        TemplatePart::Text(text) => b.append(text),
                        TemplatePart::Arg(index) => {
                            let arg = args.get(index).ok_or_else(|| {
                                AtError::internal(format!(
                                    "function '{}' template refers to argument #{index} of {}",
                                    function.name,
                                    args.len()
                                ))
                            })?;
                            emit_sql(arg, reg, b)?;
                        }
                    }
                }
                Ok(())
            }
            SqlShape::Cast(sql_type) => {
                let arg = args.first().ok_or_else(|| {
                    AtError::internal(format!("cast '{}' without argument", function.name))
                })?;
                b.append("CAST(");
                emit_sql(arg, reg, b)?;
                b.append(" AS ");
                b.append(sql_type);
                b.append(")");
                Ok(())
            }
        },
        ReducedExpr::Round { expr, digits } => {
            b.append("ROUND(");
            emit_sql(expr, reg, b)?;
            b.append(", ");
            b.append_integer(i64::from(*digits));
            b.append(")");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{emit_sql, touch_aliases};
    use crate::catalog::schema::{Attribute, EntityDef, EntityRef};
    use crate::catalog::types::{Value, ValueType};
    use crate::expr::decl::{DeclExpr, TableExpr, WhenCase};
    use crate::expr::function;
    use crate::expr::ops::{BinaryOp, UnaryOp};
    use crate::expr::reduce::{ReduceContext, reduce};
    use crate::sql::alias::AliasRegistry;
    use crate::sql::builder::SqlBuilder;
    use std::sync::Arc;

    struct Fixture {
        from: Vec<EntityRef>,
        user: Arc<EntityDef>,
        pet: Arc<EntityDef>,
    }

    fn fixture() -> Fixture {
        let user = Arc::new(
            EntityDef::new("user")
                .with_attribute(Attribute::new("name", ValueType::Text))
                .with_attribute(Attribute::new("balance", ValueType::Decimal)),
        );
        let pet = Arc::new(
            EntityDef::new("pet")
                .with_attribute(Attribute::new("name", ValueType::Text))
                .with_attribute(Attribute::relation("owner", "user")),
        );
        Fixture {
            from: vec![EntityRef::new(pet.clone(), 0)],
            user,
            pet,
        }
    }

    fn render(fx: &Fixture, e: &DeclExpr, params: &[Value]) -> (String, Vec<Value>, usize) {
        let red = reduce(e, &ReduceContext::new(params)).expect("reduce");
        let mut reg = AliasRegistry::new(&fx.from).expect("registry");
        touch_aliases(&red, &mut reg).expect("touch");
        reg.seal();
        let joins = reg.snapshot_from_info().join_count();
        let mut b = SqlBuilder::new();
        emit_sql(&red, &mut reg, &mut b).expect("emit");
        let sql = b.build(100).expect("build");
        let values = sql.param_values();
        (sql.sql, values, joins)
    }

    fn pet_table(fx: &Fixture) -> TableExpr {
        TableExpr::entity(fx.from[0].clone())
    }

    fn owner_table(fx: &Fixture) -> TableExpr {
        TableExpr::relation(
            pet_table(fx),
            fx.pet.attribute("owner").expect("owner").clone(),
            fx.user.clone(),
        )
    }

    #[test]
    fn binary_and_relation_attribute() {
        let fx = fixture();
        let owner_name = DeclExpr::attr(
            owner_table(&fx),
            fx.user.attribute("name").expect("name").clone(),
        );
        let e = DeclExpr::binary(BinaryOp::Eq, owner_name, DeclExpr::text("Bob"));
        let (sql, params, joins) = render(&fx, &e, &[]);
        assert_eq!(sql, r#"(A01."name" = ?)"#);
        assert_eq!(params, vec![Value::text("Bob")]);
        assert_eq!(joins, 1);
    }

    #[test]
    fn short_circuited_branch_pulls_no_join() {
        let fx = fixture();
        let owner_name = DeclExpr::attr(
            owner_table(&fx),
            fx.user.attribute("name").expect("name").clone(),
        );
        let e = DeclExpr::param(0, ValueType::Boolean).or(DeclExpr::binary(
            BinaryOp::Eq,
            owner_name,
            DeclExpr::text("Bob"),
        ));
        let (sql, _, joins) = render(&fx, &e, &[Value::Boolean(true)]);
        assert_eq!(sql, "?");
        assert_eq!(joins, 0);
    }

    #[test]
    fn in_case_and_unary_shapes() {
        let fx = fixture();
        let name = DeclExpr::attr(
            pet_table(&fx),
            fx.pet.attribute("name").expect("name").clone(),
        );
        let e = DeclExpr::in_list(
            name.clone(),
            vec![DeclExpr::text("a"), DeclExpr::text("b")],
            true,
        );
        assert_eq!(render(&fx, &e, &[]).0, r#"(A00."name" NOT IN (?, ?))"#);

        let e = DeclExpr::unary(
            UnaryOp::Not,
            DeclExpr::binary(BinaryOp::Eq, name.clone(), DeclExpr::text("x")),
        );
        assert_eq!(render(&fx, &e, &[]).0, r#"(NOT (A00."name" = ?))"#);

        let e = DeclExpr::when(
            ValueType::Integer,
            Some(name),
            vec![WhenCase {
                conds: vec![DeclExpr::text("rex")],
                expr: DeclExpr::integer(1),
            }],
            Some(DeclExpr::integer(0)),
        );
        assert_eq!(
            render(&fx, &e, &[]).0,
            r#"CASE WHEN (A00."name" = ?) THEN ? ELSE ? END"#
        );
    }

    #[test]
    fn keyed_when_with_several_candidates_emits_in() {
        let fx = fixture();
        let name = DeclExpr::attr(
            pet_table(&fx),
            fx.pet.attribute("name").expect("name").clone(),
        );
        let e = DeclExpr::when(
            ValueType::Integer,
            Some(name),
            vec![
                WhenCase {
                    conds: vec![DeclExpr::text("rex"), DeclExpr::text("max")],
                    expr: DeclExpr::integer(1),
                },
                WhenCase {
                    conds: vec![DeclExpr::text("tom")],
                    expr: DeclExpr::integer(2),
                },
            ],
            Some(DeclExpr::integer(0)),
        );
        let (sql, params, _) = render(&fx, &e, &[]);
        assert_eq!(
            sql,
            r#"CASE WHEN (A00."name" IN (?, ?)) THEN ? WHEN (A00."name" = ?) THEN ? ELSE ? END"#
        );
        assert_eq!(
            params,
            vec![
                Value::text("rex"),
                Value::text("max"),
                Value::Integer(1),
                Value::text("tom"),
                Value::Integer(2),
                Value::Integer(0),
            ]
        );
    }

    #[test]
    fn function_templates_and_rounding() {
        let fx = fixture();
        let name = DeclExpr::attr(
            pet_table(&fx),
            fx.pet.attribute("name").expect("name").clone(),
        );
        let f = function::lookup("starts_with", 2).expect("fn");
        let e = DeclExpr::call(f, vec![name.clone(), DeclExpr::text("r")]);
        assert_eq!(
            render(&fx, &e, &[]).0,
            r#"(LEFT(A00."name", LENGTH(?)) = ?)"#
        );

        let f = function::lookup("to_text", 1).expect("fn");
        let e = DeclExpr::call(f, vec![name]);
        assert_eq!(render(&fx, &e, &[]).0, r#"CAST(A00."name" AS TEXT)"#);

        let balance = DeclExpr::attr(
            owner_table(&fx),
            fx.user.attribute("balance").expect("balance").clone(),
        );
        let (sql, _, _) = render(&fx, &balance, &[]);
        assert_eq!(sql, r#"ROUND(A01."balance", 20)"#);
    }

    #[test]
    fn array_param_expands_to_tuple() {
        let fx = fixture();
        let e = DeclExpr::array_param(0, ValueType::Integer);
        let (sql, params, _) = render(
            &fx,
            &e,
            &[Value::List(vec![Value::Integer(1), Value::Integer(2)])],
        );
        assert_eq!(sql, "(?, ?)");
        assert_eq!(params.len(), 2);
    }
}
