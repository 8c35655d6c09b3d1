//! Set commands.
//!
//! Members are keys with empty values, so membership is a point read
//! and the member scan yields a set's members in byte order. The
//! algebra commands exploit that ordering: union is a k-way merge of
//! the per-source scans, intersection probes against the
//! smallest-cardinality source, difference probes the first source's
//! scan against the rest.

use bytes::Bytes;
use rand::Rng;

use crate::codec::{self, Meta};
use crate::command::{require_batch, Db};
use crate::engine::{PointRead, View, WriteBatch};
use crate::error::CommandError;
use crate::keyspace::{self, generic};
use basalt_protocol::Reply;

/// Loads the cardinality, or `None` when the key does not exist.
fn load_set<R: PointRead>(store: &R, user: &[u8]) -> Result<Option<u64>, CommandError> {
    match keyspace::load_meta(store, user)? {
        None => Ok(None),
        Some(Meta::Set { card }) => Ok(Some(card)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn put_meta(wb: &mut WriteBatch, user: &[u8], card: u64) {
    if card == 0 {
        wb.delete(codec::meta_key(user));
    } else {
        wb.put(codec::meta_key(user), Meta::Set { card }.encode());
    }
}

pub(crate) fn sadd(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];
    let mut card = load_set(db.engine(), key)?.unwrap_or(0);

    let mut added = 0i64;
    let mut seen: Vec<&Bytes> = Vec::with_capacity(args.len() - 1);
    for member in &args[1..] {
        if seen.contains(&member) {
            continue;
        }
        seen.push(member);
        let member_key = codec::set_member_key(key, member);
        if db.engine().get(&member_key)?.is_none() {
            wb.put(member_key, b"");
            card += 1;
            added += 1;
        }
    }
    if added > 0 {
        put_meta(wb, key, card);
    }
    Ok(Reply::Integer(added))
}

pub(crate) fn srem(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];
    let Some(card) = load_set(db.engine(), key)? else {
        return Ok(Reply::Integer(0));
    };

    let mut removed = 0u64;
    let mut seen: Vec<&Bytes> = Vec::with_capacity(args.len() - 1);
    for member in &args[1..] {
        if seen.contains(&member) {
            continue;
        }
        seen.push(member);
        let member_key = codec::set_member_key(key, member);
        if db.engine().get(&member_key)?.is_some() {
            wb.delete(member_key);
            removed += 1;
        }
    }
    if removed > 0 {
        put_meta(wb, key, card.saturating_sub(removed));
    }
    Ok(Reply::Integer(removed as i64))
}

pub(crate) fn sismember(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    if load_set(&view, &args[0])?.is_none() {
        return Ok(Reply::Integer(0));
    }
    let present = view
        .get(&codec::set_member_key(&args[0], &args[1]))?
        .is_some();
    Ok(Reply::Integer(i64::from(present)))
}

pub(crate) fn scard(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let card = load_set(db.engine(), &args[0])?.unwrap_or(0);
    Ok(Reply::Integer(card as i64))
}

/// Streams the members without materializing them, like the hash
/// scans: the producer owns a point-in-time view and reports the
/// cardinality before scanning.
pub(crate) fn smembers(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let engine = db.engine().clone();
    let user = args[0].clone();

    keyspace::stream_reply(move |size_tx, item_tx| {
        let view = engine.view();
        let card = match load_set(&view, &user) {
            Ok(card) => card.unwrap_or(0),
            Err(e) => {
                let _ = size_tx.send(Err(e));
                return;
            }
        };
        if size_tx.send(Ok(card as i64)).is_err() || card == 0 {
            return;
        }

        let mut members = MemberScan::new(&view, &user);
        while let Some(member) = members.current() {
            let item = Reply::Bulk(Some(Bytes::copy_from_slice(member)));
            if item_tx.blocking_send(item).is_err() {
                return;
            }
            members.advance();
        }
    })
}

pub(crate) fn spop(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];
    let Some(card) = load_set(db.engine(), key)? else {
        return Ok(Reply::Bulk(None));
    };
    if card == 0 {
        return Ok(Reply::Bulk(None));
    }

    // walk to a uniformly chosen rank; there is no random-access way
    // into an ordered scan
    let target = rand::rng().random_range(0..card);
    let view = db.engine().view();
    let mut members = MemberScan::new(&view, key);
    for _ in 0..target {
        members.advance();
    }
    let Some(member) = members.current() else {
        return Err(CommandError::InvalidData);
    };
    let member = Bytes::copy_from_slice(member);

    wb.delete(codec::set_member_key(key, &member));
    put_meta(wb, key, card - 1);
    Ok(Reply::Bulk(Some(member)))
}

pub(crate) fn smove(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (source, dest, member) = (&args[0], &args[1], &args[2]);

    let Some(src_card) = load_set(db.engine(), source)? else {
        return Ok(Reply::Integer(0));
    };
    let dest_card = load_set(db.engine(), dest)?;

    if db
        .engine()
        .get(&codec::set_member_key(source, member))?
        .is_none()
    {
        return Ok(Reply::Integer(0));
    }
    if dest == source {
        return Ok(Reply::Integer(1));
    }

    wb.delete(codec::set_member_key(source, member));
    put_meta(wb, source, src_card - 1);

    let dest_key = codec::set_member_key(dest, member);
    let mut dest_card = dest_card.unwrap_or(0);
    if db.engine().get(&dest_key)?.is_none() {
        wb.put(dest_key, b"");
        dest_card += 1;
    }
    put_meta(wb, dest, dest_card);
    Ok(Reply::Integer(1))
}

pub(crate) fn sunion(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    Ok(members_reply(union(&view, args)?))
}

pub(crate) fn sinter(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    Ok(members_reply(inter(&view, args)?))
}

pub(crate) fn sdiff(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    Ok(members_reply(diff(&view, args)?))
}

pub(crate) fn sunionstore(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    store(db, args, wb, union)
}

pub(crate) fn sinterstore(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    store(db, args, wb, inter)
}

pub(crate) fn sdiffstore(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    store(db, args, wb, diff)
}

/// Shared body of the STORE variants: compute from a pre-write view,
/// replace the destination wholesale, all in one batch.
fn store(
    db: &Db,
    args: &[Bytes],
    wb: Option<&mut WriteBatch>,
    op: fn(&View<'_>, &[Bytes]) -> Result<Vec<Bytes>, CommandError>,
) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let dest = &args[0];

    let view = db.engine().view();
    let members = op(&view, &args[1..])?;

    generic::purge_key(db.engine(), dest, wb)?;
    for member in &members {
        wb.put(codec::set_member_key(dest, member), b"");
    }
    if !members.is_empty() {
        put_meta(wb, dest, members.len() as u64);
    }
    Ok(Reply::Integer(members.len() as i64))
}

fn members_reply(members: Vec<Bytes>) -> Reply {
    Reply::Array(Some(
        members.into_iter().map(|m| Reply::Bulk(Some(m))).collect(),
    ))
}

/// Bounded scan over one set's members.
struct MemberScan<'a> {
    scan: crate::engine::Scan<'a>,
    prefix: Vec<u8>,
}

impl<'a> MemberScan<'a> {
    fn new(view: &'a View<'_>, user: &[u8]) -> Self {
        let prefix = codec::set_prefix(user);
        let mut scan = view.scan();
        scan.seek(&prefix);
        Self { scan, prefix }
    }

    fn current(&self) -> Option<&[u8]> {
        let key = self.scan.key()?;
        key.starts_with(&self.prefix)
            .then(|| &key[self.prefix.len()..])
    }

    fn advance(&mut self) {
        self.scan.advance();
    }
}

/// Verifies a source is a set and returns its cardinality. Missing
/// keys act as empty sets.
fn source_card(view: &View<'_>, user: &[u8]) -> Result<u64, CommandError> {
    Ok(load_set(view, user)?.unwrap_or(0))
}

/// K-way merge over the sorted member scans of every source.
fn union(view: &View<'_>, sources: &[Bytes]) -> Result<Vec<Bytes>, CommandError> {
    let mut scans = Vec::with_capacity(sources.len());
    for source in sources {
        if source_card(view, source)? > 0 {
            scans.push(MemberScan::new(view, source));
        }
    }

    let mut out = Vec::new();
    loop {
        let Some(min) = scans
            .iter()
            .filter_map(|scan| scan.current())
            .min()
            .map(Bytes::copy_from_slice)
        else {
            break;
        };
        for scan in &mut scans {
            if scan.current() == Some(&min[..]) {
                scan.advance();
            }
        }
        out.push(min);
    }
    Ok(out)
}

/// The smallest-cardinality source drives the probe.
fn inter(view: &View<'_>, sources: &[Bytes]) -> Result<Vec<Bytes>, CommandError> {
    let mut cards = Vec::with_capacity(sources.len());
    for source in sources {
        cards.push(source_card(view, source)?);
    }
    if cards.iter().any(|&c| c == 0) {
        return Ok(Vec::new());
    }
    let driver = cards
        .iter()
        .enumerate()
        .min_by_key(|(_, &c)| c)
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut out = Vec::new();
    let mut members = MemberScan::new(view, &sources[driver]);
    'member: while let Some(member) = members.current() {
        for (i, source) in sources.iter().enumerate() {
            if i == driver {
                continue;
            }
            if view.get(&codec::set_member_key(source, member))?.is_none() {
                members.advance();
                continue 'member;
            }
        }
        out.push(Bytes::copy_from_slice(member));
        members.advance();
    }
    Ok(out)
}

/// Members of the first source present in none of the rest.
fn diff(view: &View<'_>, sources: &[Bytes]) -> Result<Vec<Bytes>, CommandError> {
    let Some((first, rest)) = sources.split_first() else {
        return Ok(Vec::new());
    };
    if source_card(view, first)? == 0 {
        // still surface a wrong type on the remaining sources
        for source in rest {
            source_card(view, source)?;
        }
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut members = MemberScan::new(view, first);
    'member: while let Some(member) = members.current() {
        for source in rest {
            if source_card(view, source)? > 0
                && view.get(&codec::set_member_key(source, member))?.is_some()
            {
                members.advance();
                continue 'member;
            }
        }
        out.push(Bytes::copy_from_slice(member));
        members.advance();
    }
    Ok(out)
}
