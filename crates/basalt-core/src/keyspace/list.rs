//! List commands.
//!
//! Elements occupy the index interval `[head, tail)` and the indices
//! grow outward: LPUSH allocates `head - 1`, RPUSH allocates `tail`.
//! Nothing rebalances; a list that only ever grows on one side simply
//! walks that direction. The biased index encoding keeps scan order
//! equal to index order.

use bytes::Bytes;

use crate::codec::{self, Meta};
use crate::command::{require_batch, Db};
use crate::engine::{PointRead, WriteBatch};
use crate::error::CommandError;
use crate::keyspace;
use basalt_protocol::Reply;

/// Loads `(count, head, tail)`, or `None` when the key does not exist.
fn load_list<R: PointRead>(
    store: &R,
    user: &[u8],
) -> Result<Option<(u64, i64, i64)>, CommandError> {
    match keyspace::load_meta(store, user)? {
        None => Ok(None),
        Some(Meta::List { count, head, tail }) => Ok(Some((count, head, tail))),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn put_meta(wb: &mut WriteBatch, user: &[u8], count: u64, head: i64, tail: i64) {
    if count == 0 {
        wb.delete(codec::meta_key(user));
    } else {
        wb.put(
            codec::meta_key(user),
            Meta::List { count, head, tail }.encode(),
        );
    }
}

pub(crate) fn lpush(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    push(db, args, wb, true, false)
}

pub(crate) fn lpushx(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    push(db, args, wb, true, true)
}

pub(crate) fn rpush(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    push(db, args, wb, false, false)
}

pub(crate) fn rpushx(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    push(db, args, wb, false, true)
}

fn push(
    db: &Db,
    args: &[Bytes],
    wb: Option<&mut WriteBatch>,
    front: bool,
    require_existing: bool,
) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];

    let (mut count, mut head, mut tail) = match load_list(db.engine(), key)? {
        Some(meta) => meta,
        None if require_existing => return Ok(Reply::Integer(0)),
        None => (0, 0, 0),
    };

    for value in &args[1..] {
        if front {
            head -= 1;
            wb.put(codec::list_elem_key(key, head), value);
        } else {
            wb.put(codec::list_elem_key(key, tail), value);
            tail += 1;
        }
        count += 1;
    }
    put_meta(wb, key, count, head, tail);
    Ok(Reply::Integer(count as i64))
}

pub(crate) fn lpop(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    pop(db, args, wb, true)
}

pub(crate) fn rpop(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    pop(db, args, wb, false)
}

fn pop(
    db: &Db,
    args: &[Bytes],
    wb: Option<&mut WriteBatch>,
    front: bool,
) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];

    let Some((count, head, tail)) = load_list(db.engine(), key)? else {
        return Ok(Reply::Bulk(None));
    };
    if count == 0 {
        return Ok(Reply::Bulk(None));
    }

    let index = if front { head } else { tail - 1 };
    let elem_key = codec::list_elem_key(key, index);
    let value = db
        .engine()
        .get(&elem_key)?
        .ok_or(CommandError::InvalidData)?;
    wb.delete(elem_key);

    if front {
        put_meta(wb, key, count - 1, head + 1, tail);
    } else {
        put_meta(wb, key, count - 1, head, tail - 1);
    }
    Ok(Reply::Bulk(Some(Bytes::from(value))))
}

/// Pops the tail of `source` and pushes it onto the head of
/// `destination` in one batch, with both key locks held. When the two
/// names are the same key this rotates the list.
pub(crate) fn rpoplpush(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (source, dest) = (&args[0], &args[1]);

    let Some((src_count, src_head, src_tail)) = load_list(db.engine(), source)? else {
        return Ok(Reply::Bulk(None));
    };
    if src_count == 0 {
        return Ok(Reply::Bulk(None));
    }

    let elem_key = codec::list_elem_key(source, src_tail - 1);
    let value = db
        .engine()
        .get(&elem_key)?
        .ok_or(CommandError::InvalidData)?;
    wb.delete(elem_key);

    // the rotation case must see the source's post-pop bookkeeping,
    // not the stale meta entry
    let (mut count, mut head, tail) = if dest == source {
        (src_count - 1, src_head, src_tail - 1)
    } else {
        load_list(db.engine(), dest)?.unwrap_or((0, 0, 0))
    };

    head -= 1;
    wb.put(codec::list_elem_key(dest, head), &value);
    count += 1;
    put_meta(wb, dest, count, head, tail);

    if dest != source {
        put_meta(wb, source, src_count - 1, src_head, src_tail - 1);
    }
    Ok(Reply::Bulk(Some(Bytes::from(value))))
}

pub(crate) fn llen(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let count = load_list(db.engine(), &args[0])?.map_or(0, |(count, _, _)| count);
    Ok(Reply::Integer(count as i64))
}

pub(crate) fn lrange(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let key = &args[0];
    let start = keyspace::parse_int(&args[1])?;
    let end = keyspace::parse_int(&args[2])?;

    let view = db.engine().view();
    let Some((count, head, _)) = load_list(&view, key)? else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let Some((start, end)) = keyspace::normalize_range(count, start, end) else {
        return Ok(Reply::Array(Some(vec![])));
    };

    let prefix = codec::list_prefix(key);
    let wanted = (end - start + 1) as usize;
    let mut out = Vec::with_capacity(wanted);

    let mut scan = view.scan();
    scan.seek(&codec::list_elem_key(key, head + start as i64));
    while scan.valid() && out.len() < wanted {
        let Some(k) = scan.key() else { break };
        if !k.starts_with(&prefix) {
            break;
        }
        out.push(Reply::Bulk(Some(Bytes::copy_from_slice(
            scan.value().unwrap_or_default(),
        ))));
        scan.advance();
    }
    Ok(Reply::Array(Some(out)))
}
