use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::pager::Pager;

pub mod ast;
pub mod backend;
pub mod catalog;
pub mod compiler;
pub mod config;
pub mod connection;
pub mod error;
pub mod lexer;
pub mod pager;
pub mod parser;
pub mod protocol;
pub mod record;
pub mod scanner;
pub mod server;
pub mod vm;

/// Opens the configured data file and drives the accept loop until the
/// process is killed.
pub async fn run_server(config: Config) -> Result<()> {
    let pager = Arc::new(Pager::open(&config.data_directory, config.page_size)?);
    server::run(&config.addr, pager, config.max_recv_size).await
}
