//! Sorted-set commands.
//!
//! Two families stay in bijection: the primary maps member to encoded
//! score, the secondary keys `(score, member)` pairs with empty values
//! so a scan visits members in score order, ties broken by member
//! bytes. Every mutation touches both families in the same batch.

use std::collections::HashMap;

use bytes::Bytes;

use crate::codec::{self, Meta};
use crate::command::{require_batch, Db};
use crate::engine::{PointRead, View, WriteBatch};
use crate::error::CommandError;
use crate::keyspace::{self, generic, ScoreBound};
use basalt_protocol::Reply;

/// Loads the cardinality, or `None` when the key does not exist.
fn load_zset<R: PointRead>(store: &R, user: &[u8]) -> Result<Option<u64>, CommandError> {
    match keyspace::load_meta(store, user)? {
        None => Ok(None),
        Some(Meta::ZSet { card }) => Ok(Some(card)),
        Some(_) => Err(CommandError::WrongType),
    }
}

fn put_meta(wb: &mut WriteBatch, user: &[u8], card: u64) {
    if card == 0 {
        wb.delete(codec::meta_key(user));
    } else {
        wb.put(codec::meta_key(user), Meta::ZSet { card }.encode());
    }
}

/// Reads a member's score through the primary family.
fn member_score<R: PointRead>(
    store: &R,
    user: &[u8],
    member: &[u8],
) -> Result<Option<f64>, CommandError> {
    match store.read(&codec::zset_member_key(user, member))? {
        None => Ok(None),
        Some(raw) => codec::decode_score(&raw).map(Some),
    }
}

/// Stages both halves of one member entry.
fn put_member(wb: &mut WriteBatch, user: &[u8], member: &[u8], score: f64) {
    wb.put(codec::zset_member_key(user, member), codec::encode_score(score));
    wb.put(codec::zscore_key(user, score, member), b"");
}

/// Stages removal of both halves of one member entry.
fn delete_member(wb: &mut WriteBatch, user: &[u8], member: &[u8], score: f64) {
    wb.delete(codec::zset_member_key(user, member));
    wb.delete(codec::zscore_key(user, score, member));
}

pub(crate) fn zadd(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];
    if args[1..].len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }

    // last score wins for a member named twice in one call
    let mut pairs: Vec<(&Bytes, f64)> = Vec::with_capacity(args[1..].len() / 2);
    for chunk in args[1..].chunks_exact(2) {
        let score = keyspace::parse_float(&chunk[0])?;
        let member = &chunk[1];
        if let Some(existing) = pairs.iter_mut().find(|(m, _)| *m == member) {
            existing.1 = score;
        } else {
            pairs.push((member, score));
        }
    }

    let mut card = load_zset(db.engine(), key)?.unwrap_or(0);
    let mut added = 0i64;
    for (member, score) in pairs {
        match member_score(db.engine(), key, member)? {
            Some(old) if old == score => {}
            Some(old) => {
                wb.delete(codec::zscore_key(key, old, member));
                put_member(wb, key, member, score);
            }
            None => {
                put_member(wb, key, member, score);
                card += 1;
                added += 1;
            }
        }
    }
    if added > 0 {
        put_meta(wb, key, card);
    }
    Ok(Reply::Integer(added))
}

pub(crate) fn zrem(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];
    let Some(card) = load_zset(db.engine(), key)? else {
        return Ok(Reply::Integer(0));
    };

    let mut removed = 0u64;
    let mut seen: Vec<&Bytes> = Vec::with_capacity(args.len() - 1);
    for member in &args[1..] {
        if seen.contains(&member) {
            continue;
        }
        seen.push(member);
        if let Some(score) = member_score(db.engine(), key, member)? {
            delete_member(wb, key, member, score);
            removed += 1;
        }
    }
    if removed > 0 {
        put_meta(wb, key, card.saturating_sub(removed));
    }
    Ok(Reply::Integer(removed as i64))
}

pub(crate) fn zincrby(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (key, member) = (&args[0], &args[2]);
    let delta = keyspace::parse_float(&args[1])?;

    let card = load_zset(db.engine(), key)?.unwrap_or(0);
    let old = member_score(db.engine(), key, member)?;
    let next = old.unwrap_or(0.0) + delta;
    if next.is_nan() {
        return Err(CommandError::NanScore);
    }

    if let Some(old) = old {
        wb.delete(codec::zscore_key(key, old, member));
    } else {
        put_meta(wb, key, card + 1);
    }
    put_member(wb, key, member, next);
    Ok(Reply::Bulk(Some(keyspace::float_bulk(next))))
}

pub(crate) fn zscore(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    if load_zset(&view, &args[0])?.is_none() {
        return Ok(Reply::Bulk(None));
    }
    let score = member_score(&view, &args[0], &args[1])?;
    Ok(Reply::Bulk(score.map(keyspace::float_bulk)))
}

pub(crate) fn zcard(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let card = load_zset(db.engine(), &args[0])?.unwrap_or(0);
    Ok(Reply::Integer(card as i64))
}

pub(crate) fn zrange(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    rank_range(db, args, false)
}

pub(crate) fn zrevrange(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    rank_range(db, args, true)
}

/// ZRANGE and ZREVRANGE share everything but direction. The engine
/// only promises a forward scan, so the reverse variant walks the
/// mirrored forward range and flips the result.
fn rank_range(db: &Db, args: &[Bytes], rev: bool) -> Result<Reply, CommandError> {
    let key = &args[0];
    let start = keyspace::parse_int(&args[1])?;
    let end = keyspace::parse_int(&args[2])?;
    let withscores = match &args[3..] {
        [] => false,
        [opt] if opt.eq_ignore_ascii_case(b"withscores") => true,
        _ => return Err(CommandError::Syntax),
    };

    let view = db.engine().view();
    let Some(card) = load_zset(&view, key)? else {
        return Ok(Reply::Array(Some(vec![])));
    };
    let Some((start, end)) = keyspace::normalize_range(card, start, end) else {
        return Ok(Reply::Array(Some(vec![])));
    };

    let (fwd_start, fwd_end) = if rev {
        (card - 1 - end, card - 1 - start)
    } else {
        (start, end)
    };

    let mut entries = collect_rank_range(&view, key, fwd_start, fwd_end)?;
    if rev {
        entries.reverse();
    }
    Ok(entries_reply(entries, withscores))
}

pub(crate) fn zrangebyscore(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    score_range(db, args, false)
}

pub(crate) fn zrevrangebyscore(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    score_range(db, args, true)
}

fn score_range(db: &Db, args: &[Bytes], rev: bool) -> Result<Reply, CommandError> {
    let key = &args[0];
    // the reverse form takes its bounds as max first
    let (min, max) = if rev {
        (
            keyspace::parse_score_bound(&args[2])?,
            keyspace::parse_score_bound(&args[1])?,
        )
    } else {
        (
            keyspace::parse_score_bound(&args[1])?,
            keyspace::parse_score_bound(&args[2])?,
        )
    };
    let (withscores, limit) = parse_range_options(&args[3..])?;

    let view = db.engine().view();
    if load_zset(&view, key)?.is_none() {
        return Ok(Reply::Array(Some(vec![])));
    }

    let mut entries = collect_score_range(&view, key, min, max)?;
    if rev {
        entries.reverse();
    }
    Ok(entries_reply(apply_limit(entries, limit), withscores))
}

pub(crate) fn zcount(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let key = &args[0];
    let min = keyspace::parse_score_bound(&args[1])?;
    let max = keyspace::parse_score_bound(&args[2])?;

    let view = db.engine().view();
    if load_zset(&view, key)?.is_none() {
        return Ok(Reply::Integer(0));
    }
    let entries = collect_score_range(&view, key, min, max)?;
    Ok(Reply::Integer(entries.len() as i64))
}

pub(crate) fn zremrangebyscore(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let key = &args[0];
    let min = keyspace::parse_score_bound(&args[1])?;
    let max = keyspace::parse_score_bound(&args[2])?;

    let view = db.engine().view();
    let Some(card) = load_zset(&view, key)? else {
        return Ok(Reply::Integer(0));
    };

    let entries = collect_score_range(&view, key, min, max)?;
    for (member, score) in &entries {
        delete_member(wb, key, member, *score);
    }
    let removed = entries.len() as u64;
    if removed > 0 {
        put_meta(wb, key, card.saturating_sub(removed));
    }
    Ok(Reply::Integer(removed as i64))
}

pub(crate) fn zrank(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    rank(db, args, false)
}

pub(crate) fn zrevrank(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    rank(db, args, true)
}

/// A member's rank is the number of secondary entries ordered before
/// its `(score, member)` pair.
fn rank(db: &Db, args: &[Bytes], rev: bool) -> Result<Reply, CommandError> {
    let (key, member) = (&args[0], &args[1]);

    let view = db.engine().view();
    let Some(card) = load_zset(&view, key)? else {
        return Ok(Reply::Bulk(None));
    };
    let Some(score) = member_score(&view, key, member)? else {
        return Ok(Reply::Bulk(None));
    };

    let target = codec::zscore_key(key, score, member);
    let prefix = codec::zscore_prefix(key);
    let mut scan = view.scan();
    scan.seek(&prefix);

    let mut rank = 0u64;
    while scan.valid() {
        let Some(entry) = scan.key() else { break };
        if !entry.starts_with(&prefix) || entry == &target[..] {
            break;
        }
        rank += 1;
        scan.advance();
    }

    let rank = if rev { card - 1 - rank } else { rank };
    Ok(Reply::Integer(rank as i64))
}

pub(crate) fn zunionstore(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    combine_store(db, args, wb, true)
}

pub(crate) fn zinterstore(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    combine_store(db, args, wb, false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Min,
    Max,
}

impl Aggregate {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Aggregate::Sum => {
                let sum = a + b;
                // +inf plus -inf; the merged member keeps a usable score
                if sum.is_nan() {
                    0.0
                } else {
                    sum
                }
            }
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

/// Shared body of ZUNIONSTORE and ZINTERSTORE: merge the weighted
/// sources, then replace the destination wholesale in one batch.
fn combine_store(
    db: &Db,
    args: &[Bytes],
    wb: Option<&mut WriteBatch>,
    union: bool,
) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let dest = &args[0];
    let numkeys = keyspace::parse_int(&args[1])?;
    if numkeys <= 0 {
        return Err(CommandError::Syntax);
    }
    let numkeys = numkeys as usize;
    if args.len() < 2 + numkeys {
        return Err(CommandError::Syntax);
    }
    let sources = &args[2..2 + numkeys];

    let mut weights = vec![1.0; numkeys];
    let mut aggregate = Aggregate::Sum;
    let mut rest = &args[2 + numkeys..];
    while let Some(opt) = rest.first() {
        if opt.eq_ignore_ascii_case(b"weights") {
            if rest.len() < 1 + numkeys {
                return Err(CommandError::Syntax);
            }
            for (slot, raw) in weights.iter_mut().zip(&rest[1..1 + numkeys]) {
                *slot = keyspace::parse_float(raw)?;
            }
            rest = &rest[1 + numkeys..];
        } else if opt.eq_ignore_ascii_case(b"aggregate") {
            let Some(which) = rest.get(1) else {
                return Err(CommandError::Syntax);
            };
            aggregate = if which.eq_ignore_ascii_case(b"sum") {
                Aggregate::Sum
            } else if which.eq_ignore_ascii_case(b"min") {
                Aggregate::Min
            } else if which.eq_ignore_ascii_case(b"max") {
                Aggregate::Max
            } else {
                return Err(CommandError::Syntax);
            };
            rest = &rest[2..];
        } else {
            return Err(CommandError::Syntax);
        }
    }

    let view = db.engine().view();
    let mut merged: HashMap<Bytes, f64> = HashMap::new();
    for (i, source) in sources.iter().enumerate() {
        let entries = source_entries(&view, source, weights[i])?;
        if union {
            for (member, score) in entries {
                merged
                    .entry(member)
                    .and_modify(|slot| *slot = aggregate.apply(*slot, score))
                    .or_insert(score);
            }
        } else if i == 0 {
            merged = entries.into_iter().collect();
        } else {
            let theirs: HashMap<Bytes, f64> = entries.into_iter().collect();
            merged = merged
                .into_iter()
                .filter_map(|(member, score)| {
                    theirs
                        .get(&member)
                        .map(|other| (member, aggregate.apply(score, *other)))
                })
                .collect();
        }
        if !union && merged.is_empty() {
            break;
        }
    }

    generic::purge_key(db.engine(), dest, wb)?;
    for (member, score) in &merged {
        put_member(wb, dest, member, *score);
    }
    if !merged.is_empty() {
        put_meta(wb, dest, merged.len() as u64);
    }
    Ok(Reply::Integer(merged.len() as i64))
}

/// Reads a source for the combine commands. Sorted sets contribute
/// their scores, plain sets score 1.0, missing keys nothing.
fn source_entries(
    view: &View<'_>,
    user: &[u8],
    weight: f64,
) -> Result<Vec<(Bytes, f64)>, CommandError> {
    let weighted = |score: f64| {
        let w = score * weight;
        if w.is_nan() {
            0.0
        } else {
            w
        }
    };

    match keyspace::load_meta(view, user)? {
        None => Ok(Vec::new()),
        Some(Meta::ZSet { .. }) => {
            let prefix = codec::zset_prefix(user);
            let mut scan = view.scan();
            scan.seek(&prefix);
            let mut out = Vec::new();
            while scan.valid() {
                let Some(key) = scan.key() else { break };
                if !key.starts_with(&prefix) {
                    break;
                }
                let member = Bytes::copy_from_slice(&key[prefix.len()..]);
                let score = codec::decode_score(scan.value().unwrap_or_default())?;
                out.push((member, weighted(score)));
                scan.advance();
            }
            Ok(out)
        }
        Some(Meta::Set { .. }) => {
            let prefix = codec::set_prefix(user);
            let mut scan = view.scan();
            scan.seek(&prefix);
            let mut out = Vec::new();
            while scan.valid() {
                let Some(key) = scan.key() else { break };
                if !key.starts_with(&prefix) {
                    break;
                }
                out.push((
                    Bytes::copy_from_slice(&key[prefix.len()..]),
                    weighted(1.0),
                ));
                scan.advance();
            }
            Ok(out)
        }
        Some(_) => Err(CommandError::WrongType),
    }
}

/// Splits a secondary-index key into its score and member parts.
fn split_score_entry(key: &[u8], prefix_len: usize) -> Result<(f64, &[u8]), CommandError> {
    if key.len() < prefix_len + 8 {
        return Err(CommandError::InvalidData);
    }
    let score = codec::decode_score(&key[prefix_len..prefix_len + 8])?;
    Ok((score, &key[prefix_len + 8..]))
}

/// Collects the secondary entries with rank in `start..=end`.
fn collect_rank_range(
    view: &View<'_>,
    user: &[u8],
    start: u64,
    end: u64,
) -> Result<Vec<(Bytes, f64)>, CommandError> {
    let prefix = codec::zscore_prefix(user);
    let mut scan = view.scan();
    scan.seek(&prefix);

    let mut out = Vec::with_capacity((end - start + 1) as usize);
    let mut pos = 0u64;
    while scan.valid() && pos <= end {
        let Some(key) = scan.key() else { break };
        if !key.starts_with(&prefix) {
            break;
        }
        if pos >= start {
            let (score, member) = split_score_entry(key, prefix.len())?;
            out.push((Bytes::copy_from_slice(member), score));
        }
        pos += 1;
        scan.advance();
    }
    Ok(out)
}

/// Collects the secondary entries whose score falls inside the bounds.
fn collect_score_range(
    view: &View<'_>,
    user: &[u8],
    min: ScoreBound,
    max: ScoreBound,
) -> Result<Vec<(Bytes, f64)>, CommandError> {
    let prefix = codec::zscore_prefix(user);
    let mut scan = view.scan();
    scan.seek(&codec::zscore_seek(user, min.value));

    let mut out = Vec::new();
    while scan.valid() {
        let Some(key) = scan.key() else { break };
        if !key.starts_with(&prefix) {
            break;
        }
        let (score, member) = split_score_entry(key, prefix.len())?;
        if score < min.value || (min.exclusive && score == min.value) {
            scan.advance();
            continue;
        }
        if score > max.value || (max.exclusive && score == max.value) {
            break;
        }
        out.push((Bytes::copy_from_slice(member), score));
        scan.advance();
    }
    Ok(out)
}

fn parse_range_options(args: &[Bytes]) -> Result<(bool, Option<(i64, i64)>), CommandError> {
    let mut withscores = false;
    let mut limit = None;
    let mut i = 0;
    while i < args.len() {
        if args[i].eq_ignore_ascii_case(b"withscores") {
            withscores = true;
            i += 1;
        } else if args[i].eq_ignore_ascii_case(b"limit") {
            let (Some(offset), Some(count)) = (args.get(i + 1), args.get(i + 2)) else {
                return Err(CommandError::Syntax);
            };
            limit = Some((keyspace::parse_int(offset)?, keyspace::parse_int(count)?));
            i += 3;
        } else {
            return Err(CommandError::Syntax);
        }
    }
    Ok((withscores, limit))
}

fn apply_limit(entries: Vec<(Bytes, f64)>, limit: Option<(i64, i64)>) -> Vec<(Bytes, f64)> {
    let Some((offset, count)) = limit else {
        return entries;
    };
    if offset < 0 {
        return Vec::new();
    }
    let skipped = entries.into_iter().skip(offset as usize);
    if count < 0 {
        skipped.collect()
    } else {
        skipped.take(count as usize).collect()
    }
}

fn entries_reply(entries: Vec<(Bytes, f64)>, withscores: bool) -> Reply {
    let mut out = Vec::with_capacity(entries.len() * if withscores { 2 } else { 1 });
    for (member, score) in entries {
        out.push(Reply::Bulk(Some(member)));
        if withscores {
            out.push(Reply::Bulk(Some(keyspace::float_bulk(score))));
        }
    }
    Reply::Array(Some(out))
}

/// Key-lookup override for the combine commands: the destination plus
/// the `numkeys` sources, deduplicated.
pub(crate) fn combine_keys(args: &[Bytes]) -> Vec<Bytes> {
    let mut keys = Vec::with_capacity(args.len().min(8));
    if let Some(dest) = args.first() {
        keys.push(dest.clone());
    }
    if args.len() > 2 {
        if let Ok(n) = keyspace::parse_int(&args[1]) {
            if n > 0 {
                for source in args.iter().skip(2).take(n as usize) {
                    if !keys.contains(source) {
                        keys.push(source.clone());
                    }
                }
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use crate::command::testutil::*;

    fn members(reply: basalt_protocol::Reply) -> Vec<bytes::Bytes> {
        array(reply).into_iter().map(|r| bulk(r).unwrap()).collect()
    }

    #[test]
    fn zadd_then_zscore() {
        let (_dir, db) = test_db();
        assert_eq!(int(run(&db, &["zadd", "z", "1.5", "m"])), 1);
        assert_eq!(bulk(run(&db, &["zscore", "z", "m"])).unwrap(), "1.5");
    }

    #[test]
    fn zadd_update_rescores_without_counting() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "m"]);
        assert_eq!(int(run(&db, &["zadd", "z", "2", "m"])), 0);
        assert_eq!(bulk(run(&db, &["zscore", "z", "m"])).unwrap(), "2");
        assert_eq!(int(run(&db, &["zcard", "z"])), 1);
        // the stale secondary entry must be gone
        assert_eq!(members(run(&db, &["zrangebyscore", "z", "1", "1"])).len(), 0);
    }

    #[test]
    fn zadd_duplicate_member_last_score_wins() {
        let (_dir, db) = test_db();
        assert_eq!(int(run(&db, &["zadd", "z", "1", "m", "5", "m"])), 1);
        assert_eq!(bulk(run(&db, &["zscore", "z", "m"])).unwrap(), "5");
        assert_eq!(int(run(&db, &["zcard", "z"])), 1);
    }

    #[test]
    fn zadd_odd_pairs_is_syntax_error() {
        let (_dir, db) = test_db();
        let msg = error(run(&db, &["zadd", "z", "1", "a", "2"]));
        assert!(msg.contains("syntax error"));
    }

    #[test]
    fn zadd_rejects_nan_score() {
        let (_dir, db) = test_db();
        let msg = error(run(&db, &["zadd", "z", "nan", "m"]));
        assert!(msg.contains("not a valid float"));
    }

    #[test]
    fn zrem_removes_and_deletes_empty() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2", "b"]);
        assert_eq!(int(run(&db, &["zrem", "z", "a", "ghost"])), 1);
        assert_eq!(int(run(&db, &["zrem", "z", "b"])), 1);
        assert_eq!(int(run(&db, &["exists", "z"])), 0);
    }

    #[test]
    fn zincrby_accumulates_and_reports() {
        let (_dir, db) = test_db();
        assert_eq!(bulk(run(&db, &["zincrby", "z", "3", "m"])).unwrap(), "3");
        assert_eq!(bulk(run(&db, &["zincrby", "z", "-1.5", "m"])).unwrap(), "1.5");
        assert_eq!(int(run(&db, &["zcard", "z"])), 1);
        assert_eq!(members(run(&db, &["zrangebyscore", "z", "1.5", "1.5"])), ["m"]);
    }

    #[test]
    fn zincrby_nan_result_errors() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "inf", "m"]);
        let msg = error(run(&db, &["zincrby", "z", "-inf", "m"]));
        assert!(msg.contains("NaN"));
    }

    #[test]
    fn zrange_orders_by_score_then_member() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "2", "b", "1", "a", "1", "aa"]);
        assert_eq!(members(run(&db, &["zrange", "z", "0", "-1"])), ["a", "aa", "b"]);
        assert_eq!(members(run(&db, &["zrange", "z", "-2", "-1"])), ["aa", "b"]);
        assert!(members(run(&db, &["zrange", "z", "5", "9"])).is_empty());
    }

    #[test]
    fn zrange_withscores_interleaves() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2.5", "b"]);
        assert_eq!(
            members(run(&db, &["zrange", "z", "0", "-1", "WITHSCORES"])),
            ["a", "1", "b", "2.5"]
        );
    }

    #[test]
    fn zrange_unknown_option_is_syntax_error() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a"]);
        let msg = error(run(&db, &["zrange", "z", "0", "-1", "NOSUCH"]));
        assert!(msg.contains("syntax error"));
    }

    #[test]
    fn zrevrange_mirrors_zrange() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(members(run(&db, &["zrevrange", "z", "0", "-1"])), ["c", "b", "a"]);
        assert_eq!(members(run(&db, &["zrevrange", "z", "0", "1"])), ["c", "b"]);
    }

    #[test]
    fn zrangebyscore_basic_and_infinite_bounds() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2", "b", "1.5", "c"]);
        assert_eq!(members(run(&db, &["zrangebyscore", "z", "1", "2"])), ["a", "c", "b"]);
        assert_eq!(
            members(run(&db, &["zrangebyscore", "z", "-inf", "+inf"])),
            ["a", "c", "b"]
        );
    }

    #[test]
    fn zrangebyscore_exclusive_bounds() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(members(run(&db, &["zrangebyscore", "z", "(1", "3"])), ["b", "c"]);
        assert_eq!(members(run(&db, &["zrangebyscore", "z", "(1", "(3"])), ["b"]);
    }

    #[test]
    fn zrangebyscore_limit() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2", "b", "3", "c", "4", "d"]);
        assert_eq!(
            members(run(&db, &["zrangebyscore", "z", "-inf", "+inf", "LIMIT", "1", "2"])),
            ["b", "c"]
        );
        assert_eq!(
            members(run(&db, &["zrangebyscore", "z", "-inf", "+inf", "LIMIT", "2", "-1"])),
            ["c", "d"]
        );
    }

    #[test]
    fn zrevrangebyscore_swaps_bounds() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(members(run(&db, &["zrevrangebyscore", "z", "3", "1"])), ["c", "b", "a"]);
        assert_eq!(
            members(run(&db, &["zrevrangebyscore", "z", "+inf", "(1"])),
            ["c", "b"]
        );
    }

    #[test]
    fn zcount_counts_in_bounds() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(int(run(&db, &["zcount", "z", "1", "2"])), 2);
        assert_eq!(int(run(&db, &["zcount", "z", "(1", "+inf"])), 2);
        assert_eq!(int(run(&db, &["zcount", "missing", "-inf", "+inf"])), 0);
    }

    #[test]
    fn zremrangebyscore_removes_span() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a", "2", "b", "3", "c"]);
        assert_eq!(int(run(&db, &["zremrangebyscore", "z", "1", "2"])), 2);
        assert_eq!(members(run(&db, &["zrange", "z", "0", "-1"])), ["c"]);
        assert_eq!(int(run(&db, &["zremrangebyscore", "z", "-inf", "+inf"])), 1);
        assert_eq!(int(run(&db, &["exists", "z"])), 0);
    }

    #[test]
    fn zrank_and_zrevrank() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "10", "a", "20", "b", "30", "c"]);
        assert_eq!(int(run(&db, &["zrank", "z", "a"])), 0);
        assert_eq!(int(run(&db, &["zrank", "z", "c"])), 2);
        assert_eq!(int(run(&db, &["zrevrank", "z", "c"])), 0);
        assert_eq!(int(run(&db, &["zrevrank", "z", "a"])), 2);
        assert!(bulk(run(&db, &["zrank", "z", "ghost"])).is_none());
        assert!(bulk(run(&db, &["zrank", "missing", "a"])).is_none());
    }

    #[test]
    fn zunionstore_sums_by_default() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z1", "1", "a", "2", "b"]);
        run(&db, &["zadd", "z2", "10", "b", "20", "c"]);
        assert_eq!(int(run(&db, &["zunionstore", "dest", "2", "z1", "z2"])), 3);
        assert_eq!(
            members(run(&db, &["zrange", "dest", "0", "-1", "WITHSCORES"])),
            ["a", "1", "b", "12", "c", "20"]
        );
    }

    #[test]
    fn zunionstore_weights_and_aggregate() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z1", "1", "a", "2", "b"]);
        run(&db, &["zadd", "z2", "3", "b"]);
        assert_eq!(
            int(run(
                &db,
                &["zunionstore", "dest", "2", "z1", "z2", "WEIGHTS", "10", "1", "AGGREGATE", "MAX"],
            )),
            2
        );
        assert_eq!(
            members(run(&db, &["zrange", "dest", "0", "-1", "WITHSCORES"])),
            ["a", "10", "b", "20"]
        );
    }

    #[test]
    fn zinterstore_keeps_common_members() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z1", "1", "a", "2", "b"]);
        run(&db, &["zadd", "z2", "10", "b", "20", "c"]);
        assert_eq!(int(run(&db, &["zinterstore", "dest", "2", "z1", "z2"])), 1);
        assert_eq!(
            members(run(&db, &["zrange", "dest", "0", "-1", "WITHSCORES"])),
            ["b", "12"]
        );
    }

    #[test]
    fn combine_accepts_plain_sets_at_score_one() {
        let (_dir, db) = test_db();
        run(&db, &["sadd", "s", "a", "b"]);
        run(&db, &["zadd", "z", "5", "b"]);
        assert_eq!(int(run(&db, &["zunionstore", "dest", "2", "s", "z"])), 2);
        assert_eq!(
            members(run(&db, &["zrange", "dest", "0", "-1", "WITHSCORES"])),
            ["a", "1", "b", "6"]
        );
    }

    #[test]
    fn combine_replaces_destination() {
        let (_dir, db) = test_db();
        run(&db, &["set", "dest", "old"]);
        run(&db, &["zadd", "z", "1", "a"]);
        assert_eq!(int(run(&db, &["zunionstore", "dest", "1", "z"])), 1);
        assert_eq!(simple(run(&db, &["type", "dest"])), "zset");
    }

    #[test]
    fn combine_bad_shapes_are_syntax_errors() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "1", "a"]);
        for argv in [
            vec!["zunionstore", "dest", "0", "z"],
            vec!["zunionstore", "dest", "2", "z"],
            vec!["zunionstore", "dest", "1", "z", "WEIGHTS"],
            vec!["zunionstore", "dest", "1", "z", "AGGREGATE", "median"],
            vec!["zunionstore", "dest", "1", "z", "BOGUS"],
        ] {
            let msg = error(run(&db, &argv));
            assert!(msg.contains("syntax error"), "{argv:?}: {msg}");
        }
    }

    #[test]
    fn zset_commands_reject_other_families() {
        let (_dir, db) = test_db();
        run(&db, &["set", "s", "v"]);
        for argv in [
            vec!["zadd", "s", "1", "m"],
            vec!["zscore", "s", "m"],
            vec!["zrange", "s", "0", "-1"],
            vec!["zcard", "s"],
        ] {
            let msg = error(run(&db, &argv));
            assert!(msg.contains("wrong kind of value"), "{argv:?}: {msg}");
        }
    }

    #[test]
    fn negative_scores_order_before_positive() {
        let (_dir, db) = test_db();
        run(&db, &["zadd", "z", "-1.5", "neg", "0", "zero", "1.5", "pos"]);
        assert_eq!(
            members(run(&db, &["zrange", "z", "0", "-1"])),
            ["neg", "zero", "pos"]
        );
        assert_eq!(
            members(run(&db, &["zrangebyscore", "z", "-inf", "0"])),
            ["neg", "zero"]
        );
    }
}
