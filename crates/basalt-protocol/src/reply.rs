//! Reply values and their wire encoding.
//!
//! A command produces a [`Reply`], which the session turns into one or
//! more wire frames pushed onto its outbound channel. Most replies
//! encode into a single frame. A [`Reply::Stream`] encodes its header
//! immediately and then one frame per item as the producer delivers
//! them, so a large multi-bulk reply never has to be materialized in
//! memory.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;

/// A command reply.
#[derive(Debug)]
pub enum Reply {
    /// Single-line status reply, e.g. `+OK`.
    Simple(&'static str),

    /// Command error, encoded as `-ERR <msg>`.
    Error(String),

    /// Engine read/write failure, encoded as `-IOERR <msg>`.
    IoError(String),

    /// Signed integer reply, e.g. `:42`.
    Integer(i64),

    /// Bulk reply. `None` encodes as the nil bulk `$-1`.
    Bulk(Option<Bytes>),

    /// Multi-bulk reply. `None` encodes as the nil multi-bulk `*-1`.
    Array(Option<Vec<Reply>>),

    /// Multi-bulk reply of known size whose items arrive lazily.
    /// The producer must deliver exactly `size` items.
    Stream {
        size: i64,
        items: mpsc::Receiver<Reply>,
    },

    /// Pre-encoded bytes, written verbatim.
    Raw(Bytes),
}

/// Encodes `reply` and pushes the resulting frame(s) onto `sink`.
///
/// Returns `Err` when the session's outbound channel is gone, which
/// means the connection is being torn down and the remaining items can
/// be dropped.
pub async fn send_reply(reply: Reply, sink: &mpsc::UnboundedSender<Bytes>) -> Result<(), ()> {
    match reply {
        Reply::Stream { size, mut items } => {
            let mut head = BytesMut::new();
            put_header(&mut head, b'*', size);
            sink.send(head.freeze()).map_err(drop)?;

            while let Some(item) = items.recv().await {
                let mut frame = BytesMut::new();
                encode_into(&item, &mut frame);
                sink.send(frame.freeze()).map_err(drop)?;
            }
            Ok(())
        }
        other => {
            let mut frame = BytesMut::new();
            encode_into(&other, &mut frame);
            sink.send(frame.freeze()).map_err(drop)
        }
    }
}

/// Serializes a non-streamed reply into `dst`.
///
/// Streams are only valid at the top level of a reply and are handled
/// by [`send_reply`]; one showing up nested is a handler bug and is
/// encoded as an empty multi-bulk.
fn encode_into(reply: &Reply, dst: &mut BytesMut) {
    match reply {
        Reply::Simple(s) => {
            dst.put_u8(b'+');
            dst.put_slice(s.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Reply::Error(msg) => {
            dst.put_slice(b"-ERR ");
            dst.put_slice(msg.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Reply::IoError(msg) => {
            dst.put_slice(b"-IOERR ");
            dst.put_slice(msg.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Reply::Integer(n) => {
            put_header(dst, b':', *n);
        }
        Reply::Bulk(None) => dst.put_slice(b"$-1\r\n"),
        Reply::Bulk(Some(data)) => {
            put_header(dst, b'$', data.len() as i64);
            dst.put_slice(data);
            dst.put_slice(b"\r\n");
        }
        Reply::Array(None) => dst.put_slice(b"*-1\r\n"),
        Reply::Array(Some(items)) => {
            put_header(dst, b'*', items.len() as i64);
            for item in items {
                encode_into(item, dst);
            }
        }
        Reply::Stream { .. } => {
            debug_assert!(false, "nested stream reply");
            dst.put_slice(b"*0\r\n");
        }
        Reply::Raw(bytes) => dst.put_slice(bytes),
    }
}

/// Writes `<prefix><n>\r\n` using stack-based integer formatting.
fn put_header(dst: &mut BytesMut, prefix: u8, n: i64) {
    let mut buf = itoa::Buffer::new();
    dst.put_u8(prefix);
    dst.put_slice(buf.format(n).as_bytes());
    dst.put_slice(b"\r\n");
}
