//! Lowers an AST [`Statement`] into a [`CompiledProgram`] the VM can run,
//! resolving table names against the catalog and determining the
//! statement's row-description column list.

use std::sync::Arc;

use crate::ast::{Expression, SelectColumn, Statement};
use crate::catalog::{self, TableDefinition};
use crate::error::CompileError;
use crate::pager::Pager;

#[derive(Debug, Clone)]
pub struct FromSource {
    pub table: TableDefinition,
    pub alias: Option<String>,
}

impl FromSource {
    fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table.name)
    }
}

#[derive(Debug, Clone)]
pub enum ProgramKind {
    CreateTable {
        name: String,
        if_not_exists: bool,
        raw_text: String,
    },
    Insert {
        root_page: crate::pager::PageNum,
        table_columns: Vec<String>,
        assignments: Vec<(String, Expression)>,
        returning: Vec<String>,
    },
    Select {
        sources: Vec<FromSource>,
        filter: Option<Expression>,
        projected: Vec<usize>,
    },
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub columns: Vec<String>,
    pub kind: ProgramKind,
}

/// The flattened list of `(qualifier, column_name)` a SELECT's combined
/// FROM sources expose, in cartesian-product column order.
pub(crate) fn joined_columns(sources: &[FromSource]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for src in sources {
        for col in &src.table.columns {
            out.push((src.label().to_string(), col.name.clone()));
        }
    }
    out
}

pub(crate) fn resolve_ident(name: &str, joined: &[(String, String)]) -> Result<usize, CompileError> {
    if let Some((qualifier, column)) = name.split_once('.') {
        joined
            .iter()
            .position(|(q, c)| q == qualifier && c == column)
            .ok_or_else(|| CompileError::UnknownColumn(name.to_string()))
    } else {
        joined
            .iter()
            .position(|(_, c)| c == name)
            .ok_or_else(|| CompileError::UnknownColumn(name.to_string()))
    }
}

/// Walks an expression tree and validates every `Ident` resolves against
/// the joined column environment; used both for WHERE filters and INSERT
/// value expressions (which see no columns, only literals).
fn check_idents(expr: &Expression, joined: &[(String, String)]) -> Result<(), CompileError> {
    match expr {
        Expression::Ident { name } => resolve_ident(name, joined).map(|_| ()),
        Expression::BasicLiteral { .. } => Ok(()),
        Expression::BinaryOp { left, right, .. } => {
            check_idents(left, joined)?;
            check_idents(right, joined)
        }
    }
}

pub fn compile(stmt: &Statement, pager: &Arc<Pager>) -> Result<CompiledProgram, CompileError> {
    match stmt {
        Statement::CreateTable(ct) => Ok(CompiledProgram {
            columns: Vec::new(),
            kind: ProgramKind::CreateTable {
                name: ct.name.clone(),
                if_not_exists: ct.if_not_exists,
                raw_text: ct.raw_text.clone(),
            },
        }),

        Statement::Insert(ins) => {
            let table = catalog::get_table_definition(pager, &ins.table)?;
            for (col, expr) in &ins.values {
                if !table.columns.iter().any(|c| &c.name == col) {
                    return Err(CompileError::UnknownColumn(col.clone()));
                }
                check_idents(expr, &[])?;
            }

            let returning: Vec<String> = ins
                .returning
                .iter()
                .flat_map(|sc| match sc {
                    SelectColumn::Star => table.columns.iter().map(|c| c.name.clone()).collect(),
                    SelectColumn::Name(n) => vec![n.clone()],
                })
                .collect();

            Ok(CompiledProgram {
                columns: returning.clone(),
                kind: ProgramKind::Insert {
                    root_page: table.root_page,
                    table_columns: table.columns.iter().map(|c| c.name.clone()).collect(),
                    assignments: ins.values.clone(),
                    returning,
                },
            })
        }

        Statement::Select(sel) => {
            if sel.from.is_empty() {
                return Err(CompileError::EmptyFromList);
            }
            let mut sources = Vec::with_capacity(sel.from.len());
            for item in &sel.from {
                let table = catalog::get_table_definition(pager, &item.name)?;
                sources.push(FromSource {
                    table,
                    alias: item.alias.clone(),
                });
            }
            let joined = joined_columns(&sources);

            if let Some(filter) = &sel.filter {
                check_idents(filter, &joined)?;
            }

            let mut columns = Vec::new();
            let mut projected = Vec::new();
            for sc in &sel.columns {
                match sc {
                    SelectColumn::Star => {
                        for (i, (_, name)) in joined.iter().enumerate() {
                            columns.push(name.clone());
                            projected.push(i);
                        }
                    }
                    SelectColumn::Name(n) => {
                        let idx = resolve_ident(n, &joined)?;
                        columns.push(joined[idx].1.clone());
                        projected.push(idx);
                    }
                }
            }

            Ok(CompiledProgram {
                columns,
                kind: ProgramKind::Select {
                    sources,
                    filter: sel.filter.clone(),
                    projected,
                },
            })
        }

        Statement::Begin => Ok(CompiledProgram {
            columns: Vec::new(),
            kind: ProgramKind::Begin,
        }),
        Statement::Commit => Ok(CompiledProgram {
            columns: Vec::new(),
            kind: ProgramKind::Commit,
        }),
        Statement::Rollback => Ok(CompiledProgram {
            columns: Vec::new(),
            kind: ProgramKind::Rollback,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::create_table;

    #[test]
    fn select_star_projects_every_joined_column() {
        let pager = Arc::new(Pager::in_memory(4096));
        create_table(&pager, "foo", "CREATE TABLE foo (a int, b text)").unwrap();
        let stmt = crate::parser::parse_statement("SELECT * FROM foo").unwrap();
        let prog = compile(&stmt, &pager).unwrap();
        assert_eq!(prog.columns, vec!["a", "b"]);
    }

    #[test]
    fn select_unknown_column_is_a_compile_error() {
        let pager = Arc::new(Pager::in_memory(4096));
        create_table(&pager, "foo", "CREATE TABLE foo (a int)").unwrap();
        let stmt = crate::parser::parse_statement("SELECT missing FROM foo").unwrap();
        let err = compile(&stmt, &pager).unwrap_err();
        assert!(matches!(err, CompileError::UnknownColumn(_)));
    }

    #[test]
    fn select_from_missing_table_is_a_catalog_error() {
        let pager = Arc::new(Pager::in_memory(4096));
        let stmt = crate::parser::parse_statement("SELECT * FROM missing").unwrap();
        let err = compile(&stmt, &pager).unwrap_err();
        assert!(matches!(err, CompileError::Catalog(_)));
    }

    #[test]
    fn insert_arity_checked_against_table_columns() {
        let pager = Arc::new(Pager::in_memory(4096));
        create_table(&pager, "foo", "CREATE TABLE foo (a int)").unwrap();
        let stmt = crate::parser::parse_statement("INSERT INTO foo (bogus) VALUES (1)").unwrap();
        let err = compile(&stmt, &pager).unwrap_err();
        assert!(matches!(err, CompileError::UnknownColumn(_)));
    }
}
