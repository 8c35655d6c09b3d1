//! TCP accept loop and the session table.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use basalt_core::Db;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::session::{self, SessionHandle};

/// Live sessions, keyed by peer address.
#[derive(Default)]
pub struct Sessions {
    inner: RwLock<HashMap<SocketAddr, Arc<SessionHandle>>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, handle: Arc<SessionHandle>) {
        self.inner.write().await.insert(handle.peer(), handle);
    }

    pub(crate) async fn remove(&self, peer: &SocketAddr) {
        self.inner.write().await.remove(peer);
    }

    /// Number of connected clients.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Total bytes queued toward all clients. The hook for slow-client
    /// policies; none is enforced here.
    pub async fn queued_bytes(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .map(|handle| handle.write_queue_size())
            .sum()
    }
}

/// Binds `addr` and runs the accept loop forever.
pub async fn run(addr: SocketAddr, db: Arc<Db>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, db).await
}

/// Runs the accept loop on an already-bound listener.
pub async fn serve(listener: TcpListener, db: Arc<Db>) -> std::io::Result<()> {
    let sessions = Arc::new(Sessions::new());
    info!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");
        tokio::spawn(session::handle(
            stream,
            peer,
            Arc::clone(&db),
            Arc::clone(&sessions),
        ));
    }
}
