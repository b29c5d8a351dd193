//! Typed statement and expression nodes produced by the parser.

use crate::lexer::TokenKind;

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralKind {
    String,
    Number,
    Boolean,
    Null,
}

impl LiteralKind {
    pub fn from_token_kind(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::String => Some(LiteralKind::String),
            TokenKind::Number => Some(LiteralKind::Number),
            TokenKind::Boolean => Some(LiteralKind::Boolean),
            TokenKind::Null => Some(LiteralKind::Null),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Ident {
        name: String,
    },
    BasicLiteral {
        text: String,
        kind: LiteralKind,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    pub offset: usize,
    pub primary_key: bool,
    pub default_value: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    Star,
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub name: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDefinition>,
    pub raw_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub values: Vec<(String, Expression)>,
    pub returning: Vec<SelectColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub from: Vec<FromItem>,
    pub columns: Vec<SelectColumn>,
    pub filter: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStatement),
    Insert(InsertStatement),
    Select(SelectStatement),
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    /// Whether executing this statement can change the on-disk schema or data.
    pub fn mutates(&self) -> bool {
        matches!(self, Statement::CreateTable(_) | Statement::Insert(_))
    }

    /// Whether executing this statement produces a row stream the client
    /// must drain with `Next`.
    pub fn returns_rows(&self) -> bool {
        match self {
            Statement::Select(_) => true,
            Statement::Insert(ins) => !ins.returning.is_empty(),
            _ => false,
        }
    }
}
