use thiserror::Error;

/// Failure while parsing a token stream into an AST.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("parse error at character {position}, parsed: {committed}")]
    At { position: usize, committed: String },
    #[error("invalid tsql program")]
    NoMatch,
    #[error("column count does not match value count in INSERT")]
    InsertArityMismatch,
}

/// Failure resolving a table name against the schema page.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("no such table: {0}")]
    TableNotFound(String),
    #[error("schema row for table {0} is malformed: {1}")]
    MalformedSchemaRow(String, String),
    #[error("table {0} already exists")]
    TableAlreadyExists(String),
}

/// Failure lowering an AST statement into bytecode.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("unknown column {0}")]
    UnknownColumn(String),
    #[error("SELECT FROM list must not be empty")]
    EmptyFromList,
}

/// Failure during bytecode execution.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("type mismatch evaluating operator {op}")]
    TypeMismatch { op: String },
    #[error("unknown operator {0}")]
    UnknownOperator(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("record field count {found} does not match column count {expected}")]
    FieldCountMismatch { found: usize, expected: usize },
    #[error("page I/O error: {0}")]
    Page(String),
    #[error("execution was cancelled")]
    Cancelled,
}

/// Failure in the wire protocol itself, always fatal to the connection.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("unknown control byte {0:#04x}")]
    UnknownControl(u8),
    #[error("payload length {len} exceeds max_recv_size {max}")]
    PayloadTooLarge { len: u32, max: u32 },
    #[error("Next received with no executing program")]
    NoActiveProgram {},
    #[error("no prepared statement named {0:?}")]
    UnknownStatement(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// The union of every error this crate can raise, as delivered to a client
/// or logged by the server.
#[derive(Debug, Clone, Error)]
pub enum TinyDbError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TinyDbError {
    /// Whether a connection can recover and keep serving commands after this
    /// error. Parse/catalog/compile failures are local to the one command
    /// that produced them (`Prepare` never ran); a `Runtime` error ends the
    /// in-flight program but the connection keeps going. Only protocol
    /// errors (bad control byte, oversized payload, `Next` with nothing
    /// running) are fatal to the connection itself.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TinyDbError::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, TinyDbError>;
