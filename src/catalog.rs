//! Resolves table names to their column definitions and root page by
//! scanning the page 1 schema record stream, with a process-wide cache
//! invalidated on schema mutation.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::ast::{ColumnDefinition, Statement};
use crate::error::CatalogError;
use crate::pager::{Pager, PageNum, SCHEMA_ROOT_PAGENUM};
use crate::parser;
use crate::record::{decode_page_records, decode_record, encode_record, encode_page_records, Value};

pub const SCHEMA_TABLE_NAME: &str = "sqlite_schema";
const SCHEMA_TBL_NAME_COLIDX: usize = 2;
const SCHEMA_ROOTPAGE_COLIDX: usize = 3;
const SCHEMA_SQL_COLIDX: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub raw_text: String,
    pub columns: Vec<ColumnDefinition>,
    pub root_page: PageNum,
}

// Keyed by (database identity, table name) so multiple open pagers in tests
// don't cross-contaminate each other's cached definitions.
static CACHE: Lazy<RwLock<HashMap<(usize, String), TableDefinition>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn pager_key(pager: &Pager) -> usize {
    pager as *const Pager as usize
}

/// Resolves `name` against the schema page, consulting (and populating) the
/// process-wide cache.
pub fn get_table_definition(pager: &Pager, name: &str) -> Result<TableDefinition, CatalogError> {
    let key = (pager_key(pager), name.to_string());
    if let Some(def) = CACHE.read().get(&key) {
        return Ok(def.clone());
    }

    let def = scan_schema_for(pager, name)?;
    CACHE.write().insert(key, def.clone());
    Ok(def)
}

/// Drops every cached definition for `pager`. Called after any
/// schema-mutating statement commits.
pub fn invalidate(pager: &Pager) {
    let key = pager_key(pager);
    CACHE.write().retain(|(k, _), _| *k != key);
}

fn scan_schema_for(pager: &Pager, name: &str) -> Result<TableDefinition, CatalogError> {
    let page = pager.read_page(SCHEMA_ROOT_PAGENUM);
    let body = &page[100..];
    let records = decode_page_records(body)
        .map_err(|e| CatalogError::MalformedSchemaRow(name.to_string(), e.to_string()))?;

    for raw in records {
        let fields = decode_record(&raw)
            .map_err(|e| CatalogError::MalformedSchemaRow(name.to_string(), e.to_string()))?;
        let Value::Text(tbl_name) = &fields[SCHEMA_TBL_NAME_COLIDX] else {
            return Err(CatalogError::MalformedSchemaRow(
                name.to_string(),
                "tbl_name column is not text".into(),
            ));
        };
        if tbl_name != name {
            continue;
        }

        let root_page = match &fields[SCHEMA_ROOTPAGE_COLIDX] {
            Value::Int(i) => *i as PageNum,
            _ => {
                return Err(CatalogError::MalformedSchemaRow(
                    name.to_string(),
                    "root_page column is not an integer".into(),
                ))
            }
        };
        let Value::Text(raw_text) = &fields[SCHEMA_SQL_COLIDX] else {
            return Err(CatalogError::MalformedSchemaRow(
                name.to_string(),
                "sql column is not text".into(),
            ));
        };

        let stmt = parser::parse_statement(raw_text).map_err(|e| {
            CatalogError::MalformedSchemaRow(name.to_string(), e.to_string())
        })?;
        let Statement::CreateTable(ct) = stmt else {
            return Err(CatalogError::MalformedSchemaRow(
                name.to_string(),
                "sql column did not parse as CREATE TABLE".into(),
            ));
        };

        return Ok(TableDefinition {
            name: name.to_string(),
            raw_text: raw_text.clone(),
            columns: ct.columns,
            root_page,
        });
    }

    Err(CatalogError::TableNotFound(name.to_string()))
}

/// Appends a new schema row describing `name`'s table, allocates its root
/// page, and invalidates the cache. Returns the allocated root page number.
pub fn create_table(
    pager: &Arc<Pager>,
    name: &str,
    raw_text: &str,
) -> Result<PageNum, CatalogError> {
    if scan_schema_for(pager, name).is_ok() {
        return Err(CatalogError::TableAlreadyExists(name.to_string()));
    }

    let root_page = pager.allocate_page();
    let row = encode_record(&[
        Value::Text("table".to_string()),
        Value::Text(name.to_string()),
        Value::Text(name.to_string()),
        Value::Int(root_page as i64),
        Value::Text(raw_text.to_string()),
    ]);

    let mut page1 = pager.read_page(SCHEMA_ROOT_PAGENUM);
    let mut records = decode_page_records(&page1[100..]).unwrap_or_default();
    records.push(row);
    let mut body = encode_page_records(&records);
    body.resize(pager.page_size() as usize - 100, 0);
    page1.truncate(100);
    page1.extend_from_slice(&body);
    pager.write_page(SCHEMA_ROOT_PAGENUM, page1);

    invalidate(pager);
    Ok(root_page)
}
