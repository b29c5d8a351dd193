//! TCP accept loop: one task per connection, each owning its own
//! [`crate::connection::Connection`] against the shared [`Backend`].

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

use crate::backend::Backend;
use crate::connection::Connection;
use crate::pager::Pager;

pub async fn run(addr: &str, pager: Arc<Pager>, max_recv_size: u32) -> Result<()> {
    let backend = Backend::new(pager);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::info!(%peer, "accepted connection");
        let backend = backend.clone();

        tokio::spawn(async move {
            let conn = Connection::new(socket, backend, max_recv_size);
            conn.run().await;
            tracing::info!(%peer, "connection closed");
        });
    }
}
