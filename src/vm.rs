//! Bytecode VM: executes one [`CompiledProgram`] per instance, publishing
//! rows through a bounded channel and signaling completion separately.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::ast::{BinaryOperator, Expression, LiteralKind};
use crate::catalog;
use crate::compiler::{CompiledProgram, ProgramKind};
use crate::error::RuntimeError;
use crate::pager::Pager;
use crate::record::{decode_page_records, decode_record, encode_page_records, encode_record, Value};

const OUTPUT_CAPACITY: usize = 16;

/// One item delivered on a program's `Output` channel.
#[derive(Debug)]
pub enum RowMessage {
    Row(Vec<Value>),
    Error(RuntimeError),
}

/// A running VM for one prepared statement, owned by the connection for
/// the lifetime of one execute.
pub struct ProgramInstance {
    output: mpsc::Receiver<RowMessage>,
    exit: oneshot::Receiver<()>,
    cancel: CancellationToken,
}

impl ProgramInstance {
    /// Reads the next row, or `None` once the program has finished and
    /// closed its output channel.
    pub async fn next(&mut self) -> Option<RowMessage> {
        self.output.recv().await
    }

    /// Cooperatively cancels the running program; it is checked before each
    /// page fetch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the VM's main routine has returned, however it ended.
    pub async fn wait_exit(&mut self) {
        let _ = (&mut self.exit).await;
    }
}

/// Spawns `program` as a fresh tokio task and returns a handle to its
/// output stream. `write_lock` serializes CREATE TABLE / INSERT against
/// every other writer sharing this pager.
pub fn spawn(
    pager: Arc<Pager>,
    write_lock: Arc<Mutex<()>>,
    program: CompiledProgram,
) -> ProgramInstance {
    let (tx, rx) = mpsc::channel(OUTPUT_CAPACITY);
    let (exit_tx, exit_rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        run(pager, write_lock, program, tx, task_cancel).await;
        let _ = exit_tx.send(());
    });

    ProgramInstance {
        output: rx,
        exit: exit_rx,
        cancel,
    }
}

async fn run(
    pager: Arc<Pager>,
    write_lock: Arc<Mutex<()>>,
    program: CompiledProgram,
    tx: mpsc::Sender<RowMessage>,
    cancel: CancellationToken,
) {
    let result = match program.kind {
        ProgramKind::CreateTable {
            name,
            if_not_exists,
            raw_text,
        } => run_create_table(&pager, &write_lock, &name, if_not_exists, &raw_text).await,
        ProgramKind::Insert {
            root_page,
            table_columns,
            assignments,
            returning,
        } => {
            run_insert(
                &pager,
                &write_lock,
                root_page,
                &table_columns,
                &assignments,
                &returning,
                &tx,
            )
            .await
        }
        ProgramKind::Select {
            sources,
            filter,
            projected,
        } => run_select(&pager, &sources, &filter, &projected, &tx, &cancel).await,
        ProgramKind::Begin | ProgramKind::Commit | ProgramKind::Rollback => Ok(()),
    };

    if let Err(e) = result {
        let _ = tx.send(RowMessage::Error(e)).await;
    }
}

async fn run_create_table(
    pager: &Arc<Pager>,
    write_lock: &Arc<Mutex<()>>,
    name: &str,
    if_not_exists: bool,
    raw_text: &str,
) -> Result<(), RuntimeError> {
    let _guard = write_lock.lock().await;
    match catalog::create_table(pager, name, raw_text) {
        Ok(_) => pager.flush(),
        Err(e) if if_not_exists && matches!(e, crate::error::CatalogError::TableAlreadyExists(_)) => {
            Ok(())
        }
        Err(e) => Err(RuntimeError::Page(e.to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_insert(
    pager: &Arc<Pager>,
    write_lock: &Arc<Mutex<()>>,
    root_page: crate::pager::PageNum,
    table_columns: &[String],
    assignments: &[(String, Expression)],
    returning: &[String],
    tx: &mpsc::Sender<RowMessage>,
) -> Result<(), RuntimeError> {
    let mut row = vec![Value::Null; table_columns.len()];
    for (col, expr) in assignments {
        let idx = table_columns
            .iter()
            .position(|c| c == col)
            .ok_or_else(|| RuntimeError::UnknownOperator(format!("column {col}")))?;
        row[idx] = eval_literal(expr)?;
    }

    {
        let _guard = write_lock.lock().await;
        let page = pager.read_page(root_page);
        let mut records = decode_page_records(&page)?;
        records.push(encode_record(&row));
        let mut body = encode_page_records(&records);
        body.resize(pager.page_size() as usize, 0);
        pager.write_page(root_page, body);
        pager.flush()?;
    }

    if !returning.is_empty() {
        let out_row: Vec<Value> = returning
            .iter()
            .map(|col| {
                let idx = table_columns.iter().position(|c| c == col).unwrap();
                row[idx].clone()
            })
            .collect();
        let _ = tx.send(RowMessage::Row(out_row)).await;
    }
    Ok(())
}

async fn run_select(
    pager: &Arc<Pager>,
    sources: &[crate::compiler::FromSource],
    filter: &Option<Expression>,
    projected: &[usize],
    tx: &mpsc::Sender<RowMessage>,
    cancel: &CancellationToken,
) -> Result<(), RuntimeError> {
    let mut table_rows = Vec::with_capacity(sources.len());
    for src in sources {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        let page = pager.read_page(src.table.root_page);
        let records = decode_page_records(&page)?;
        let mut rows = Vec::with_capacity(records.len());
        for raw in records {
            rows.push(decode_record(&raw)?);
        }
        table_rows.push(rows);
    }

    let joined = crate::compiler::joined_columns(sources);
    let lookup = |name: &str| crate::compiler::resolve_ident(name, &joined).ok();

    cartesian_emit(&table_rows, &mut Vec::new(), filter, projected, &lookup, tx, cancel).await
}

/// Recursively walks the cartesian product of every FROM source's rows,
/// evaluating the filter once a full combination is assembled.
fn cartesian_emit<'a>(
    remaining: &'a [Vec<Vec<Value>>],
    acc: &'a mut Vec<Value>,
    filter: &'a Option<Expression>,
    projected: &'a [usize],
    lookup: &'a dyn Fn(&str) -> Option<usize>,
    tx: &'a mpsc::Sender<RowMessage>,
    cancel: &'a CancellationToken,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), RuntimeError>> + 'a>> {
    Box::pin(async move {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        let Some((rows, rest)) = remaining.split_first() else {
            let keep = match filter {
                Some(expr) => eval_row_expr_with_columns(expr, acc, lookup)?.as_bool()?,
                None => true,
            };
            if keep {
                let projected_row: Vec<Value> = projected.iter().map(|&i| acc[i].clone()).collect();
                if tx.send(RowMessage::Row(projected_row)).await.is_err() {
                    return Err(RuntimeError::Cancelled);
                }
            }
            return Ok(());
        };

        for row in rows {
            let start = acc.len();
            acc.extend(row.iter().cloned());
            cartesian_emit(rest, acc, filter, projected, lookup, tx, cancel).await?;
            acc.truncate(start);
        }
        Ok(())
    })
}

/// Evaluates an expression with no column environment (INSERT value
/// expressions see literals only).
fn eval_literal(expr: &Expression) -> Result<Value, RuntimeError> {
    eval_row_expr(expr, &[])
}

fn eval_row_expr(expr: &Expression, row: &[Value]) -> Result<Value, RuntimeError> {
    match expr {
        Expression::Ident { name } => Err(RuntimeError::UnknownOperator(format!(
            "identifier {name} has no column environment here"
        ))),
        Expression::BasicLiteral { text, kind } => Ok(match kind {
            LiteralKind::String => Value::Text(text.clone()),
            LiteralKind::Number => Value::Int(
                text.parse::<i64>()
                    .map_err(|_| RuntimeError::TypeMismatch { op: "literal".into() })?,
            ),
            LiteralKind::Boolean => Value::Bool(text.eq_ignore_ascii_case("true")),
            LiteralKind::Null => Value::Null,
        }),
        Expression::BinaryOp { left, op, right } => {
            let l = eval_row_expr(left, row)?;
            if let Some(short) = short_circuit(*op, &l)? {
                return Ok(short);
            }
            let r = eval_row_expr(right, row)?;
            eval_binary(*op, l, r)
        }
    }
}

fn eval_row_expr_with_columns(
    expr: &Expression,
    row: &[Value],
    lookup: &dyn Fn(&str) -> Option<usize>,
) -> Result<Value, RuntimeError> {
    match expr {
        Expression::Ident { name } => {
            let idx = lookup(name)
                .ok_or_else(|| RuntimeError::UnknownOperator(format!("unknown column {name}")))?;
            Ok(row[idx].clone())
        }
        Expression::BasicLiteral { .. } => eval_row_expr(expr, row),
        Expression::BinaryOp { left, op, right } => {
            let l = eval_row_expr_with_columns(left, row, lookup)?;
            if let Some(short) = short_circuit(*op, &l)? {
                return Ok(short);
            }
            let r = eval_row_expr_with_columns(right, row, lookup)?;
            eval_binary(*op, l, r)
        }
    }
}

/// For `And`/`Or`, the left value alone can decide the result without
/// evaluating the right side at all.
fn short_circuit(op: BinaryOperator, l: &Value) -> Result<Option<Value>, RuntimeError> {
    match op {
        BinaryOperator::And | BinaryOperator::Or => {
            let b = l.as_bool()?;
            let decided = (op == BinaryOperator::And && !b) || (op == BinaryOperator::Or && b);
            Ok(decided.then_some(Value::Bool(b)))
        }
        _ => Ok(None),
    }
}

fn eval_binary(op: BinaryOperator, l: Value, r: Value) -> Result<Value, RuntimeError> {
    use BinaryOperator::*;
    match op {
        Add | Sub | Mul | Div => {
            let (Value::Int(a), Value::Int(b)) = (&l, &r) else {
                return Err(RuntimeError::TypeMismatch { op: op.symbol().into() });
            };
            Ok(Value::Int(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => {
                    if *b == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    a / b
                }
                _ => unreachable!(),
            }))
        }
        Eq | NotEq => {
            if std::mem::discriminant(&l) != std::mem::discriminant(&r) {
                return Err(RuntimeError::TypeMismatch { op: op.symbol().into() });
            }
            let eq = l == r;
            Ok(Value::Bool(if op == Eq { eq } else { !eq }))
        }
        Lt | LtEq | Gt | GtEq => {
            let ordering = match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Text(a), Value::Text(b)) => a.cmp(b),
                _ => return Err(RuntimeError::TypeMismatch { op: op.symbol().into() }),
            };
            Ok(Value::Bool(match op {
                Lt => ordering.is_lt(),
                LtEq => ordering.is_le(),
                Gt => ordering.is_gt(),
                GtEq => ordering.is_ge(),
                _ => unreachable!(),
            }))
        }
        And | Or => {
            let (Value::Bool(a), Value::Bool(b)) = (&l, &r) else {
                return Err(RuntimeError::TypeMismatch { op: op.symbol().into() });
            };
            Ok(Value::Bool(if op == And { *a && *b } else { *a || *b }))
        }
    }
}

impl Value {
    fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(RuntimeError::TypeMismatch {
                op: "WHERE filter".into(),
            }),
        }
    }
}
