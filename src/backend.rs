//! Owns the pager, prepares and compiles statements against the catalog,
//! and launches program instances. The backend retains no handle to a
//! program instance after `exec` returns it; ownership transfers to the
//! caller.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::ast::Statement;
use crate::compiler::{self, CompiledProgram};
use crate::error::TinyDbError;
use crate::pager::Pager;
use crate::parser;
use crate::vm::{self, ProgramInstance};

/// A parsed-and-compiled statement, reusable across many `exec` calls.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub statement: Statement,
    pub columns: Vec<String>,
    pub program: CompiledProgram,
}

impl PreparedStatement {
    pub fn returns_rows(&self) -> bool {
        self.statement.returns_rows()
    }
}

/// The single shared handle to one open database file. Cloned cheaply
/// (everything behind `Arc`) and handed to every connection.
#[derive(Clone)]
pub struct Backend {
    pager: Arc<Pager>,
    write_lock: Arc<Mutex<()>>,
}

impl Backend {
    pub fn new(pager: Arc<Pager>) -> Self {
        Self {
            pager,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Hands a pager handle to a new connection. All connections share the
    /// same underlying pager; this exists to mirror the interface boundary
    /// the spec draws between backend and connection.
    pub fn new_pager(&self) -> Arc<Pager> {
        self.pager.clone()
    }

    /// Parses `sql`, resolves tables via the catalog, and compiles it.
    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement, TinyDbError> {
        let statement = parser::parse_statement(sql).map_err(TinyDbError::Parse)?;
        let program = compiler::compile(&statement, &self.pager)?;
        Ok(PreparedStatement {
            columns: program.columns.clone(),
            statement,
            program,
        })
    }

    /// Starts a fresh program instance for `prepared`. The instance runs on
    /// its own task; this call returns immediately.
    pub fn exec(&self, prepared: &PreparedStatement) -> ProgramInstance {
        vm::spawn(self.pager.clone(), self.write_lock.clone(), prepared.program.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::vm::RowMessage;

    fn backend() -> Backend {
        Backend::new(Arc::new(Pager::in_memory(4096)))
    }

    #[tokio::test]
    async fn create_insert_select_round_trip() {
        let backend = backend();

        let create = backend.prepare("CREATE TABLE foo (name text)").unwrap();
        let mut inst = backend.exec(&create);
        inst.wait_exit().await;

        let insert = backend.prepare("INSERT INTO foo (name) VALUES ('bar')").unwrap();
        let mut inst = backend.exec(&insert);
        inst.wait_exit().await;

        let select = backend.prepare("SELECT name FROM foo").unwrap();
        assert_eq!(select.columns, vec!["name".to_string()]);
        let mut inst = backend.exec(&select);
        let row = inst.next().await.unwrap();
        match row {
            RowMessage::Row(values) => assert_eq!(values, vec![Value::Text("bar".into())]),
            RowMessage::Error(e) => panic!("unexpected error: {e}"),
        }
        assert!(inst.next().await.is_none());
    }

    #[tokio::test]
    async fn select_from_missing_table_fails_at_prepare() {
        let backend = backend();
        let err = backend.prepare("SELECT * FROM missing").unwrap_err();
        assert!(matches!(err, TinyDbError::Compile(_)));
    }

    #[tokio::test]
    async fn malformed_sql_fails_at_prepare() {
        let backend = backend();
        let err = backend.prepare("SELEKT * FROM foo").unwrap_err();
        assert!(matches!(err, TinyDbError::Parse(_)));
    }
}
