//! Per-connection request/response state machine: multiplexes Parse /
//! Execute / Query / Next over one TCP connection against a prepared
//! statement cache and at most one in-flight program instance.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::backend::{Backend, PreparedStatement};
use crate::error::{ProtocolError, TinyDbError};
use crate::protocol::{self, Codec, Command, Response};
use crate::vm::{ProgramInstance, RowMessage};

/// Owns the socket framing and the per-connection execution state: a
/// client-named prepared-statement cache and the currently streaming
/// program, if any.
pub struct Connection {
    backend: Backend,
    framed: Framed<TcpStream, Codec>,
    prepared: std::collections::HashMap<Vec<u8>, PreparedStatement>,
    proc: Option<ProgramInstance>,
}

const UNNAMED: &[u8] = b"(unnamed)";

impl Connection {
    pub fn new(socket: TcpStream, backend: Backend, max_recv_size: u32) -> Self {
        Self {
            backend,
            framed: Framed::new(socket, Codec::new(max_recv_size)),
            prepared: std::collections::HashMap::new(),
            proc: None,
        }
    }

    /// Drives the connection until the client disconnects or an
    /// unrecoverable error terminates it.
    pub async fn run(mut self) {
        loop {
            let cmd = match self.framed.next().await {
                Some(Ok(cmd)) => cmd,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "closing connection after a protocol error");
                    break;
                }
                None => break,
            };

            match self.dispatch(cmd).await {
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "closing connection after a fatal error");
                    break;
                }
            }
        }
    }

    /// Handles one command. Recoverable errors are written back as `E` and
    /// swallowed (`Ok(())`); unrecoverable ones propagate to terminate the
    /// connection.
    async fn dispatch(&mut self, cmd: Command) -> Result<(), TinyDbError> {
        tracing::debug!(control = %(cmd.control as char), "dispatching command");

        let result = match cmd.control {
            protocol::PARSE => self.handle_parse(cmd.payload).await,
            protocol::EXECUTE => self.handle_execute(cmd.payload).await,
            protocol::QUERY => self.handle_query(cmd.payload).await,
            protocol::NEXT => self.handle_next().await,
            protocol::DESCRIBE | protocol::BIND => Ok(()),
            other => Err(TinyDbError::Protocol(ProtocolError::UnknownControl(other))),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "command failed, connection stays open");
                self.send(Response::Error(e.to_string())).await?;
                Ok(())
            }
            Err(e) => {
                let _ = self.send(Response::Error(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn send(&mut self, resp: Response) -> Result<(), TinyDbError> {
        self.framed
            .send(resp)
            .await
            .map_err(|e| TinyDbError::Protocol(ProtocolError::Io(e.to_string())))
    }

    async fn handle_parse(&mut self, mut payload: Bytes) -> Result<(), TinyDbError> {
        let sql = protocol::read_string(&mut payload)?;
        let name = protocol::read_bytes(&mut payload)?;
        let prepared = self.backend.prepare(&sql)?;
        self.prepared.insert(name.to_vec(), prepared);
        self.send(Response::Completed).await
    }

    async fn handle_query(&mut self, mut payload: Bytes) -> Result<(), TinyDbError> {
        let sql = protocol::read_string(&mut payload)?;
        let prepared = self.backend.prepare(&sql)?;
        self.start_execution(prepared).await
    }

    async fn handle_execute(&mut self, mut payload: Bytes) -> Result<(), TinyDbError> {
        let name = protocol::read_bytes(&mut payload)?;
        let key = if name.is_empty() { UNNAMED.to_vec() } else { name.to_vec() };
        let prepared = self
            .prepared
            .get(&key)
            .cloned()
            .ok_or_else(|| TinyDbError::Protocol(ProtocolError::UnknownStatement(String::from_utf8_lossy(&key).into_owned())))?;
        self.start_execution(prepared).await
    }

    async fn start_execution(&mut self, prepared: PreparedStatement) -> Result<(), TinyDbError> {
        let mut instance = self.backend.exec(&prepared);

        if prepared.returns_rows() {
            self.send(Response::RowDescription(prepared.columns.clone())).await?;
            self.proc = Some(instance);
            Ok(())
        } else {
            instance.wait_exit().await;
            self.send(Response::Completed).await
        }
    }

    async fn handle_next(&mut self) -> Result<(), TinyDbError> {
        let Some(instance) = self.proc.as_mut() else {
            return Err(TinyDbError::Protocol(ProtocolError::NoActiveProgram {}));
        };

        match instance.next().await {
            Some(RowMessage::Row(values)) => {
                let strings = values.iter().map(protocol::value_to_wire_string).collect();
                self.send(Response::RowData(strings)).await
            }
            Some(RowMessage::Error(e)) => {
                self.proc = None;
                Err(TinyDbError::Runtime(e))
            }
            None => {
                self.proc = None;
                self.send(Response::Completed).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_key_constant_matches_the_query_command_contract() {
        assert_eq!(UNNAMED, b"(unnamed)");
    }
}
