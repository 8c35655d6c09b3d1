//! Commands that work across value families: key lifecycle, type
//! inspection, and the handful of connection-level commands.

use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::warn;

use crate::codec::{self, tag, Meta};
use crate::command::{require_batch, Db};
use crate::engine::{Engine, WriteBatch};
use crate::error::CommandError;
use basalt_protocol::Reply;

pub(crate) fn ping(_db: &Db, _args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    Ok(Reply::Simple("PONG"))
}

pub(crate) fn echo(_db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    Ok(Reply::Bulk(Some(args[0].clone())))
}

/// Seconds and microseconds since the epoch, as two bulks.
pub(crate) fn time(_db: &Db, _args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CommandError::Io(e.to_string()))?;
    Ok(Reply::Array(Some(vec![
        Reply::Bulk(Some(Bytes::from(now.as_secs().to_string()))),
        Reply::Bulk(Some(Bytes::from((now.subsec_micros()).to_string()))),
    ])))
}

/// There is a single logical database, so SELECT just acknowledges.
pub(crate) fn select(_db: &Db, _args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    Ok(Reply::Simple("OK"))
}

pub(crate) fn exists(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let present = db.engine().get(&codec::meta_key(&args[0]))?.is_some();
    Ok(Reply::Integer(i64::from(present)))
}

pub(crate) fn type_(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    match db.engine().get(&codec::meta_key(&args[0]))? {
        None => Ok(Reply::Simple("none")),
        Some(raw) => Ok(Reply::Simple(Meta::decode(&raw)?.type_name())),
    }
}

/// Glob scan over the whole meta family. O(total keys); large results
/// get a log line since there is no cursor-based alternative here.
pub(crate) fn keys(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let pattern = std::str::from_utf8(&args[0]).map_err(|_| CommandError::InvalidPattern)?;
    let matcher = globset::GlobBuilder::new(pattern)
        .build()
        .map_err(|_| CommandError::InvalidPattern)?
        .compile_matcher();

    let view = db.engine().view();
    let mut scan = view.scan();
    scan.seek(&[tag::META_KEY]);

    let mut out = Vec::new();
    while scan.valid() {
        let Some(key) = scan.key() else { break };
        if key.first() != Some(&tag::META_KEY) {
            break;
        }
        let user = &key[1..];
        if matcher.is_match(Path::new(std::ffi::OsStr::from_bytes(user))) {
            out.push(Reply::Bulk(Some(Bytes::copy_from_slice(user))));
        }
        scan.advance();
    }

    if out.len() > 10_000 {
        warn!(matched = out.len(), "KEYS matched a large result set");
    }
    Ok(Reply::Array(Some(out)))
}

pub(crate) fn del(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let mut deleted = 0i64;
    let mut seen: Vec<&Bytes> = Vec::with_capacity(args.len());
    for key in args {
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        if purge_key(db.engine(), key, wb)? {
            deleted += 1;
        }
    }
    Ok(Reply::Integer(deleted))
}

/// Placeholder for the serialization commands, whose bodies are
/// intentionally absent.
pub(crate) fn reserved(_db: &Db, _args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    Err(CommandError::NotSupported)
}

/// Stages deletion of a user key and every payload entry belonging to
/// it, whatever its family. Returns whether the key existed.
///
/// A meta entry with an unknown discriminator is reported as invalid
/// data and left intact.
pub(crate) fn purge_key(
    engine: &Engine,
    user: &[u8],
    wb: &mut WriteBatch,
) -> Result<bool, CommandError> {
    let meta_key = codec::meta_key(user);
    let Some(raw) = engine.get_nofill(&meta_key)? else {
        return Ok(false);
    };
    match Meta::decode(&raw)? {
        Meta::String { .. } => wb.delete(codec::string_key(user)),
        Meta::Hash { .. } => delete_family(wb, codec::hash_prefix(user))?,
        Meta::List { .. } => delete_family(wb, codec::list_prefix(user))?,
        Meta::Set { .. } => delete_family(wb, codec::set_prefix(user))?,
        Meta::ZSet { .. } => {
            delete_family(wb, codec::zset_prefix(user))?;
            delete_family(wb, codec::zscore_prefix(user))?;
        }
    }
    wb.delete(meta_key);
    Ok(true)
}

/// Stages a range delete covering every key that starts with `prefix`.
fn delete_family(wb: &mut WriteBatch, prefix: Vec<u8>) -> Result<(), CommandError> {
    let end = codec::prefix_successor(&prefix).ok_or(CommandError::InvalidData)?;
    wb.delete_range(prefix, end);
    Ok(())
}
