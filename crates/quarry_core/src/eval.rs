//! Statement evaluation against a set of stored relations.

use crate::error::{CoreError, CoreResult};
use crate::relation::{NamedRows, Relation};
use crate::script::{Atom, Body, ColumnSpec, Expr, Query, Statement, Term, WriteKind};
use crate::value::DataValue;
use std::collections::{BTreeMap, BTreeSet};

/// Query parameters, bound to `$name` references.
pub type Params = BTreeMap<String, DataValue>;

/// Stored relations by name.
pub type Relations = BTreeMap<String, Relation>;

type Bindings = BTreeMap<String, DataValue>;

fn resolve(expr: &Expr, params: &Params) -> CoreResult<DataValue> {
    match expr {
        Expr::Const(v) => Ok(v.clone()),
        Expr::Param(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::eval(format!("parameter '${name}' not provided"))),
        Expr::List(items) => Ok(DataValue::List(
            items
                .iter()
                .map(|e| resolve(e, params))
                .collect::<CoreResult<Vec<_>>>()?,
        )),
    }
}

fn term_value(term: &Term, bindings: &Bindings, params: &Params) -> CoreResult<DataValue> {
    match term {
        Term::Var(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::eval(format!("variable '{name}' is unbound in comparison"))),
        Term::Ignore => Err(CoreError::eval("'_' cannot be used in a comparison")),
        Term::Expr(e) => resolve(e, params),
    }
}

/// Evaluates a read-only statement. Writes are planned separately.
pub fn evaluate(stmt: &Statement, relations: &Relations, params: &Params) -> CoreResult<NamedRows> {
    match stmt {
        Statement::Query(q) => evaluate_query(q, relations, params),
        Statement::ListRelations => Ok(NamedRows::new(
            ["name", "arity", "n_keys", "n_non_keys"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            relations
                .values()
                .map(|r| {
                    vec![
                        DataValue::Str(r.name().to_string()),
                        DataValue::Int(r.arity() as i64),
                        DataValue::Int(r.keys().len() as i64),
                        DataValue::Int(r.values().len() as i64),
                    ]
                })
                .collect(),
        )),
        Statement::ListColumns(name) => {
            let rel = relations
                .get(name)
                .ok_or_else(|| CoreError::relation_not_found(name))?;
            let n_keys = rel.keys().len();
            Ok(NamedRows::new(
                vec!["column".into(), "is_key".into(), "index".into()],
                rel.columns()
                    .enumerate()
                    .map(|(i, col)| {
                        vec![
                            DataValue::Str(col.clone()),
                            DataValue::Bool(i < n_keys),
                            DataValue::Int(i as i64),
                        ]
                    })
                    .collect(),
            ))
        }
        Statement::Create { .. } | Statement::Remove(_) => Ok(NamedRows::status_ok()),
    }
}

/// Evaluates the rule and options of a query, ignoring any write target.
pub fn evaluate_query(q: &Query, relations: &Relations, params: &Params) -> CoreResult<NamedRows> {
    let mut seen = BTreeSet::new();
    for var in &q.head {
        if !seen.insert(var) {
            return Err(CoreError::eval(format!("duplicate head variable '{var}'")));
        }
    }

    let result: BTreeSet<Vec<DataValue>> = match &q.body {
        Body::Inline(expr) => inline_rows(expr, q.head.len(), params)?,
        Body::Rule(atoms) => rule_rows(&q.head, atoms, relations, params)?,
    };
    let mut rows: Vec<Vec<DataValue>> = result.into_iter().collect();

    if let Some((col, desc)) = &q.order {
        let idx = q
            .head
            .iter()
            .position(|h| h == col)
            .ok_or_else(|| CoreError::eval(format!("cannot order by unknown column '{col}'")))?;
        rows.sort_by(|a, b| {
            let ord = a[idx].cmp(&b[idx]);
            if *desc {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    let rows = rows
        .into_iter()
        .skip(q.offset.unwrap_or(0))
        .take(q.limit.unwrap_or(usize::MAX))
        .collect();
    Ok(NamedRows::new(q.head.clone(), rows))
}

fn inline_rows(expr: &Expr, arity: usize, params: &Params) -> CoreResult<BTreeSet<Vec<DataValue>>> {
    let DataValue::List(rows) = resolve(expr, params)? else {
        return Err(CoreError::eval("inline rule body must be a list of rows"));
    };
    rows.into_iter()
        .map(|row| match row {
            DataValue::List(values) if values.len() == arity => Ok(values),
            DataValue::List(values) => Err(CoreError::eval(format!(
                "row has {} values but the head has {arity} variables",
                values.len()
            ))),
            other => Err(CoreError::eval(format!("expected a row, found {other}"))),
        })
        .collect()
}

fn rule_rows(
    head: &[String],
    atoms: &[Atom],
    relations: &Relations,
    params: &Params,
) -> CoreResult<BTreeSet<Vec<DataValue>>> {
    let mut bound: BTreeSet<&str> = BTreeSet::new();
    for atom in atoms {
        match atom {
            Atom::Stored { args, .. } => {
                for arg in args {
                    if let Term::Var(v) = arg {
                        bound.insert(v);
                    }
                }
            }
            Atom::Compare { lhs, rhs, .. } => {
                for term in [lhs, rhs] {
                    if let Term::Var(v) = term {
                        if !bound.contains(v.as_str()) {
                            return Err(CoreError::eval(format!(
                                "variable '{v}' must be bound by a relation before it is compared"
                            )));
                        }
                    }
                }
            }
        }
    }
    if let Some(var) = head.iter().find(|v| !bound.contains(v.as_str())) {
        return Err(CoreError::eval(format!("head variable '{var}' is not bound in the body")));
    }

    let mut frontier: Vec<Bindings> = vec![Bindings::new()];
    for atom in atoms {
        frontier = match atom {
            Atom::Stored { name, args } => {
                let rel = relations
                    .get(name)
                    .ok_or_else(|| CoreError::relation_not_found(name))?;
                if args.len() != rel.arity() {
                    return Err(CoreError::eval(format!(
                        "relation '{name}' has arity {}, but {} arguments were given",
                        rel.arity(),
                        args.len()
                    )));
                }
                let consts = args
                    .iter()
                    .map(|a| match a {
                        Term::Expr(e) => resolve(e, params).map(Some),
                        _ => Ok(None),
                    })
                    .collect::<CoreResult<Vec<_>>>()?;

                let mut next = Vec::new();
                for bindings in &frontier {
                    'tuples: for tuple in rel.tuples() {
                        let mut extended = bindings.clone();
                        for ((arg, constant), value) in args.iter().zip(&consts).zip(tuple) {
                            match (arg, constant) {
                                (Term::Var(v), _) => match extended.get(v) {
                                    Some(existing) if *existing != value => continue 'tuples,
                                    Some(_) => {}
                                    None => {
                                        extended.insert(v.clone(), value);
                                    }
                                },
                                (_, Some(c)) if *c != value => continue 'tuples,
                                _ => {}
                            }
                        }
                        next.push(extended);
                    }
                }
                next
            }
            Atom::Compare { lhs, op, rhs } => {
                let mut next = Vec::with_capacity(frontier.len());
                for bindings in frontier {
                    let l = term_value(lhs, &bindings, params)?;
                    let r = term_value(rhs, &bindings, params)?;
                    if op.holds(&l, &r) {
                        next.push(bindings);
                    }
                }
                next
            }
        };
    }

    Ok(frontier
        .into_iter()
        .map(|b| head.iter().map(|v| b[v].clone()).collect())
        .collect())
}

/// Checks an optional `{keys => values}` layout against a relation.
pub fn check_spec(spec: Option<&ColumnSpec>, rel: &Relation) -> CoreResult<()> {
    match spec {
        Some(spec) if spec.keys != rel.keys() || spec.values != rel.values() => {
            Err(CoreError::eval(format!(
                "column spec does not match relation '{}' {{{} => {}}}",
                rel.name(),
                rel.keys().join(", "),
                rel.values().join(", ")
            )))
        }
        _ => Ok(()),
    }
}

/// Applies a mutating statement to `relations`.
///
/// All validation happens before the first change, so a failed statement
/// leaves `relations` untouched.
pub fn apply(stmt: &Statement, relations: &mut Relations, params: &Params) -> CoreResult<NamedRows> {
    match stmt {
        Statement::Create { name, spec } => {
            if relations.contains_key(name) {
                return Err(CoreError::RelationExists { name: name.clone() });
            }
            let rel = Relation::new(name, spec.keys.clone(), spec.values.clone())?;
            relations.insert(name.clone(), rel);
        }
        Statement::Remove(names) => {
            if let Some(missing) = names.iter().find(|n| !relations.contains_key(*n)) {
                return Err(CoreError::relation_not_found(missing));
            }
            for name in names {
                relations.remove(name);
            }
        }
        Statement::Query(q) => {
            let Some(write) = &q.write else {
                return evaluate_query(q, relations, params);
            };
            let result = evaluate_query(q, relations, params)?;
            let rel = relations
                .get_mut(&write.relation)
                .ok_or_else(|| CoreError::relation_not_found(&write.relation))?;
            check_spec(write.spec.as_ref(), rel)?;
            match write.kind {
                WriteKind::Put => {
                    let positions = rel.column_positions(&result.headers, false)?;
                    for row in result.rows {
                        rel.put(positions.iter().map(|&i| row[i].clone()).collect());
                    }
                }
                WriteKind::Rm => {
                    let positions = rel.column_positions(&result.headers, true)?;
                    for row in result.rows {
                        let key: Vec<DataValue> = positions.iter().map(|&i| row[i].clone()).collect();
                        rel.remove(&key);
                    }
                }
            }
        }
        Statement::ListRelations | Statement::ListColumns(_) => {
            return evaluate(stmt, relations, params)
        }
    }
    Ok(NamedRows::status_ok())
}
