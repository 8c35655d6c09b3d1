//! Per-connection session.
//!
//! Three cooperating tasks drive each client:
//!
//! - the reader parses requests, executes them on a blocking thread,
//!   and pushes encoded reply frames onto the session's frame channel;
//! - the queue task buffers frames in a FIFO, tracking the queued byte
//!   count, and hands them to the writer as it becomes ready;
//! - the writer task writes frames to the socket.
//!
//! Teardown is a cascade: the reader dropping its channel drains the
//! queue, which closes the writer channel, which ends the writer. The
//! session is then removed from the server's session table.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use basalt_core::Db;
use basalt_protocol::{parse_request, send_reply, Reply};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::server::Sessions;

/// Initial read buffer capacity.
const BUF_CAPACITY: usize = 4096;

/// Read buffer ceiling. A client that accumulates this much without
/// completing a request is disconnected.
const MAX_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Observable state of one session.
pub struct SessionHandle {
    peer: SocketAddr,
    write_queue_size: AtomicUsize,
}

impl SessionHandle {
    /// The client's address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Bytes currently buffered for this client. A server-side policy
    /// can watch this to drop or disconnect slow consumers.
    pub fn write_queue_size(&self) -> usize {
        self.write_queue_size.load(Ordering::Relaxed)
    }
}

/// Drives one client connection to completion.
pub(crate) async fn handle(
    stream: TcpStream,
    peer: SocketAddr,
    db: Arc<Db>,
    sessions: Arc<Sessions>,
) {
    let (reader, writer) = stream.into_split();
    let handle = Arc::new(SessionHandle {
        peer,
        write_queue_size: AtomicUsize::new(0),
    });
    sessions.insert(Arc::clone(&handle)).await;

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::channel(1);
    let queue = tokio::spawn(queue_frames(frame_rx, out_tx, Arc::clone(&handle)));
    let writer = tokio::spawn(write_frames(out_rx, writer));

    if let Err(e) = read_loop(reader, &db, &frame_tx).await {
        debug!(%peer, error = %e, "session read failed");
    }

    drop(frame_tx);
    let _ = queue.await;
    let _ = writer.await;
    sessions.remove(&peer).await;
    debug!(%peer, "session closed");
}

/// Parses and executes requests until disconnect or a framing error.
async fn read_loop(
    mut reader: OwnedReadHalf,
    db: &Arc<Db>,
    frames: &mpsc::UnboundedSender<Bytes>,
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    loop {
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }

        // drain every complete request the buffer holds; replies go
        // out in arrival order
        loop {
            match parse_request(&buf) {
                Ok(Some((request, consumed))) => {
                    buf.advance(consumed);
                    if request.argv.is_empty() {
                        if request.inline {
                            // a bare newline from an interactive client
                            continue;
                        }
                        if send_protocol_error(frames, "missing command").await.is_err() {
                            return Ok(());
                        }
                        continue;
                    }

                    let reply = {
                        let db = Arc::clone(db);
                        let argv = request.argv;
                        tokio::task::spawn_blocking(move || db.execute(&argv))
                            .await
                            .unwrap_or_else(|e| Reply::Error(format!("internal error: {e}")))
                    };
                    if send_reply(reply, frames).await.is_err() {
                        // writer side is gone
                        return Ok(());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // the stream position is unrecoverable after a
                    // framing error, so the reply is followed by close
                    let _ = send_protocol_error(frames, &e.to_string()).await;
                    return Ok(());
                }
            }
        }

        if buf.len() > MAX_BUF_SIZE {
            let _ = send_protocol_error(frames, "request too large").await;
            return Ok(());
        }
    }
}

async fn send_protocol_error(
    frames: &mpsc::UnboundedSender<Bytes>,
    reason: &str,
) -> Result<(), ()> {
    send_reply(Reply::Error(format!("Protocol error: {reason}")), frames).await
}

/// Buffers outbound frames while the writer is busy, maintaining the
/// queued byte count on the session handle.
async fn queue_frames(
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    out: mpsc::Sender<Bytes>,
    handle: Arc<SessionHandle>,
) {
    let mut queue: VecDeque<Bytes> = VecDeque::new();
    loop {
        if queue.is_empty() {
            match rx.recv().await {
                Some(frame) => enqueue(&mut queue, &handle, frame),
                None => break,
            }
        }

        // the queue has a frame: either the writer takes it or more
        // input arrives, whichever is ready first
        tokio::select! {
            permit = out.reserve() => {
                let Ok(permit) = permit else { break };
                if let Some(frame) = queue.pop_front() {
                    handle.write_queue_size.fetch_sub(frame.len(), Ordering::Relaxed);
                    permit.send(frame);
                }
            }
            more = rx.recv() => {
                match more {
                    Some(frame) => enqueue(&mut queue, &handle, frame),
                    None => break,
                }
            }
        }
    }

    // input closed: flush what remains
    for frame in queue {
        handle.write_queue_size.fetch_sub(frame.len(), Ordering::Relaxed);
        if out.send(frame).await.is_err() {
            break;
        }
    }
}

fn enqueue(queue: &mut VecDeque<Bytes>, handle: &SessionHandle, frame: Bytes) {
    handle.write_queue_size.fetch_add(frame.len(), Ordering::Relaxed);
    queue.push_back(frame);
}

async fn write_frames(mut rx: mpsc::Receiver<Bytes>, mut writer: OwnedWriteHalf) {
    while let Some(frame) = rx.recv().await {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
}
