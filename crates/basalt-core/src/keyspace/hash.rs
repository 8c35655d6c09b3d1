//! Hash commands.
//!
//! Fields live at `HashKey ‖ len(key) ‖ key ‖ field`, so one scan
//! bounded by the prefix visits exactly this hash's fields in field
//! byte order. The meta entry carries the field count, maintained by
//! every write in the same batch.

use std::collections::HashMap;

use bytes::Bytes;

use crate::codec::{self, Meta};
use crate::command::{require_batch, Db};
use crate::engine::{PointRead, WriteBatch};
use crate::error::CommandError;
use crate::keyspace;
use basalt_protocol::Reply;

/// Loads the field count, or `None` when the key does not exist.
fn load_hash<R: PointRead>(store: &R, user: &[u8]) -> Result<Option<u64>, CommandError> {
    match keyspace::load_meta(store, user)? {
        None => Ok(None),
        Some(Meta::Hash { count }) => Ok(Some(count)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn put_meta(wb: &mut WriteBatch, user: &[u8], count: u64) {
    if count == 0 {
        wb.delete(codec::meta_key(user));
    } else {
        wb.put(codec::meta_key(user), Meta::Hash { count }.encode());
    }
}

pub(crate) fn hset(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (key, field, value) = (&args[0], &args[1], &args[2]);

    let count = load_hash(db.engine(), key)?.unwrap_or(0);
    let is_new = db.engine().get(&codec::hash_field_key(key, field))?.is_none();

    wb.put(codec::hash_field_key(key, field), value);
    if is_new {
        put_meta(wb, key, count + 1);
    }
    Ok(Reply::Integer(i64::from(is_new)))
}

/// The existence re-check happens under the key lock, so two racing
/// HSETNX calls cannot both claim the field.
pub(crate) fn hsetnx(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (key, field, value) = (&args[0], &args[1], &args[2]);

    let count = load_hash(db.engine(), key)?.unwrap_or(0);
    if db.engine().get(&codec::hash_field_key(key, field))?.is_some() {
        return Ok(Reply::Integer(0));
    }

    wb.put(codec::hash_field_key(key, field), value);
    put_meta(wb, key, count + 1);
    Ok(Reply::Integer(1))
}

pub(crate) fn hmset(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];
    if args[1..].len() % 2 != 0 {
        return Err(CommandError::WrongArity("hmset".into()));
    }

    // last assignment wins for a field named twice in one call
    let mut fields: HashMap<&Bytes, &Bytes> = HashMap::new();
    for pair in args[1..].chunks_exact(2) {
        fields.insert(&pair[0], &pair[1]);
    }

    let mut count = load_hash(db.engine(), key)?.unwrap_or(0);
    for (field, value) in fields {
        if db.engine().get(&codec::hash_field_key(key, field))?.is_none() {
            count += 1;
        }
        wb.put(codec::hash_field_key(key, field), value);
    }
    put_meta(wb, key, count);
    Ok(Reply::Simple("OK"))
}

pub(crate) fn hget(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    if load_hash(&view, &args[0])?.is_none() {
        return Ok(Reply::Bulk(None));
    }
    let value = view.get(&codec::hash_field_key(&args[0], &args[1]))?;
    Ok(Reply::Bulk(value.map(Bytes::from)))
}

pub(crate) fn hmget(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    let exists = load_hash(&view, &args[0])?.is_some();

    let mut out = Vec::with_capacity(args.len() - 1);
    for field in &args[1..] {
        let value = if exists {
            view.get(&codec::hash_field_key(&args[0], field))?
        } else {
            None
        };
        out.push(Reply::Bulk(value.map(Bytes::from)));
    }
    Ok(Reply::Array(Some(out)))
}

pub(crate) fn hexists(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    if load_hash(&view, &args[0])?.is_none() {
        return Ok(Reply::Integer(0));
    }
    let present = view.get(&codec::hash_field_key(&args[0], &args[1]))?.is_some();
    Ok(Reply::Integer(i64::from(present)))
}

pub(crate) fn hincrby(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (key, field) = (&args[0], &args[1]);
    let delta = keyspace::parse_int(&args[2])?;

    let count = load_hash(db.engine(), key)?.unwrap_or(0);
    let current = db.engine().get(&codec::hash_field_key(key, field))?;
    let is_new = current.is_none();
    let current = match current {
        None => 0,
        Some(raw) => keyspace::parse_int(&raw)?,
    };
    let next = current.checked_add(delta).ok_or(CommandError::InvalidInt)?;

    wb.put(codec::hash_field_key(key, field), next.to_string());
    if is_new {
        put_meta(wb, key, count + 1);
    }
    Ok(Reply::Integer(next))
}

pub(crate) fn hincrbyfloat(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (key, field) = (&args[0], &args[1]);
    let delta = keyspace::parse_float(&args[2])?;

    let count = load_hash(db.engine(), key)?.unwrap_or(0);
    let current = db.engine().get(&codec::hash_field_key(key, field))?;
    let is_new = current.is_none();
    let current = match current {
        None => 0.0,
        Some(raw) => keyspace::parse_float(&raw)?,
    };
    let next = current + delta;
    if !next.is_finite() {
        return Err(CommandError::InvalidFloat);
    }

    let formatted = keyspace::format_float(next);
    wb.put(codec::hash_field_key(key, field), formatted.as_bytes());
    if is_new {
        put_meta(wb, key, count + 1);
    }
    Ok(Reply::Bulk(Some(Bytes::from(formatted))))
}

pub(crate) fn hdel(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];
    let Some(count) = load_hash(db.engine(), key)? else {
        return Ok(Reply::Integer(0));
    };

    let mut removed = 0u64;
    let mut seen: Vec<&Bytes> = Vec::with_capacity(args.len() - 1);
    for field in &args[1..] {
        if seen.contains(&field) {
            continue;
        }
        seen.push(field);
        let field_key = codec::hash_field_key(key, field);
        if db.engine().get(&field_key)?.is_some() {
            wb.delete(field_key);
            removed += 1;
        }
    }
    if removed > 0 {
        put_meta(wb, key, count.saturating_sub(removed));
    }
    Ok(Reply::Integer(removed as i64))
}

pub(crate) fn hlen(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let count = load_hash(db.engine(), &args[0])?.unwrap_or(0);
    Ok(Reply::Integer(count as i64))
}

pub(crate) fn hkeys(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    stream_entries(db, &args[0], Part::Fields)
}

pub(crate) fn hvals(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    stream_entries(db, &args[0], Part::Values)
}

pub(crate) fn hgetall(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    stream_entries(db, &args[0], Part::Both)
}

#[derive(Clone, Copy)]
enum Part {
    Fields,
    Values,
    Both,
}

/// Streams a hash's entries without materializing them.
///
/// The producer owns a point-in-time view, reads the count, and hands
/// the reply size back before it starts scanning, so the size in the
/// multi-bulk header and the number of streamed items agree even while
/// writers are active.
fn stream_entries(db: &Db, user: &Bytes, part: Part) -> Result<Reply, CommandError> {
    let engine = db.engine().clone();
    let user = user.clone();

    keyspace::stream_reply(move |size_tx, item_tx| {
        let view = engine.view();
        let count = match load_hash(&view, &user) {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                let _ = size_tx.send(Err(e));
                return;
            }
        };
        let size = match part {
            Part::Both => count * 2,
            _ => count,
        };
        if size_tx.send(Ok(size as i64)).is_err() || count == 0 {
            return;
        }

        let prefix = codec::hash_prefix(&user);
        let mut scan = view.scan();
        scan.seek(&prefix);
        while scan.valid() {
            let Some(key) = scan.key() else { break };
            if !key.starts_with(&prefix) {
                break;
            }
            let field = Bytes::copy_from_slice(&key[prefix.len()..]);
            let value = Bytes::copy_from_slice(scan.value().unwrap_or_default());

            let send = |item: Bytes| item_tx.blocking_send(Reply::Bulk(Some(item)));
            let delivered = match part {
                Part::Fields => send(field).is_ok(),
                Part::Values => send(value).is_ok(),
                Part::Both => send(field).is_ok() && send(value).is_ok(),
            };
            if !delivered {
                return;
            }
            scan.advance();
        }
    })
}
