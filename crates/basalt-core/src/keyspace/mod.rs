//! The encoded keyspace: per-type command logic.
//!
//! Each submodule implements one value family's commands on top of the
//! codec and the engine facade. Reads open a scan, seek to the family
//! prefix of the user key, and step forward while the prefix holds.
//! Writes stage every mutation, including the meta counter update, in
//! the command's write batch so the whole command commits atomically.

use std::sync::mpsc as std_mpsc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::codec::{self, Meta};
use crate::engine::PointRead;
use crate::error::CommandError;
use basalt_protocol::Reply;

pub mod generic;
pub mod hash;
pub mod list;
pub mod set;
pub mod string;
pub mod zset;

/// Channel capacity between a streamed-reply producer and the encoder.
pub(crate) const STREAM_BUFFER: usize = 64;

/// Runs a streamed-reply producer on the runtime's blocking pool and
/// waits for the reply size it reports before scanning.
///
/// The producer must send exactly one size (or error) on its first
/// channel before emitting items on the second; the size it reports
/// and the number of items it delivers must agree.
///
/// Commands already execute on blocking-pool threads, which keep the
/// runtime handle, so the producer lands in the same bounded pool
/// instead of growing an unmanaged thread per call.
pub(crate) fn stream_reply<F>(produce: F) -> Result<Reply, CommandError>
where
    F: FnOnce(std_mpsc::SyncSender<Result<i64, CommandError>>, mpsc::Sender<Reply>)
        + Send
        + 'static,
{
    let (size_tx, size_rx) = std_mpsc::sync_channel(1);
    let (item_tx, item_rx) = mpsc::channel(STREAM_BUFFER);

    // detached: the producer finishes on its own or bails out when the
    // receiving side goes away
    let _ = tokio::task::spawn_blocking(move || produce(size_tx, item_tx));

    let size = size_rx
        .recv()
        .map_err(|_| CommandError::Io("reply stream setup failed".into()))??;
    Ok(Reply::Stream {
        size,
        items: item_rx,
    })
}

/// Loads and decodes the meta entry of a user key, if present.
pub(crate) fn load_meta<R: PointRead>(
    store: &R,
    user: &[u8],
) -> Result<Option<Meta>, CommandError> {
    match store.read(&codec::meta_key(user))? {
        None => Ok(None),
        Some(raw) => Meta::decode(&raw).map(Some),
    }
}

/// Normalizes a user-supplied `start..end` pair against a collection of
/// `len` elements.
///
/// Negative indices count from the end; `end` is clamped to the last
/// element. Returns `None` when the resulting range is empty.
pub(crate) fn normalize_range(len: u64, start: i64, end: i64) -> Option<(u64, u64)> {
    let len = i64::try_from(len).ok()?;
    if len == 0 {
        return None;
    }
    let mut start = if start < 0 { start + len } else { start };
    let end = if end < 0 { end + len } else { end };
    let end = end.min(len - 1);
    if start < 0 {
        start = 0;
    }
    if start > end || start >= len {
        return None;
    }
    Some((start as u64, end as u64))
}

/// Parses a signed 64-bit integer argument.
pub(crate) fn parse_int(raw: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::InvalidInt)
}

/// Parses a float argument. NaN is rejected at the boundary so the
/// order-preserving score encoding never sees one.
pub(crate) fn parse_float(raw: &[u8]) -> Result<f64, CommandError> {
    let val: f64 = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::InvalidFloat)?;
    if val.is_nan() {
        return Err(CommandError::InvalidFloat);
    }
    Ok(val)
}

/// A score range endpoint: the value plus whether it is exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

/// Parses a score range endpoint: `-inf`, `+inf`, a float, or any of
/// those behind a `(` prefix marking the bound exclusive.
pub(crate) fn parse_score_bound(raw: &[u8]) -> Result<ScoreBound, CommandError> {
    let (exclusive, rest) = match raw.split_first() {
        Some((b'(', rest)) => (true, rest),
        _ => (false, raw),
    };
    Ok(ScoreBound {
        value: parse_float(rest)?,
        exclusive,
    })
}

/// Formats a float the way the wire protocol expects: integral values
/// without a decimal point, everything else in shortest round-trip
/// form.
pub(crate) fn format_float(val: f64) -> String {
    if val.is_infinite() {
        return if val > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if val == val.trunc() && val >= i64::MIN as f64 && val <= i64::MAX as f64 {
        return format!("{}", val as i64);
    }
    format!("{val}")
}

/// Formatted float as a bulk reply payload.
pub(crate) fn float_bulk(val: f64) -> Bytes {
    Bytes::from(format_float(val))
}
