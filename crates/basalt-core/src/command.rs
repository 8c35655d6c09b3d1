//! The command table and dispatcher.
//!
//! Every command is described by a [`CommandSpec`]: its handler, arity,
//! whether it writes, and where its key arguments sit. The dispatcher
//! validates the request against the descriptor, takes the key locks
//! for write commands, runs the handler with a staged write batch, and
//! commits the batch only when the handler succeeds.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use tracing::warn;

use crate::engine::{Engine, WriteBatch};
use crate::error::CommandError;
use crate::keyspace::{generic, hash, list, set, string, zset};
use crate::lockring::LockRing;
use basalt_protocol::Reply;

/// A command handler. Write commands receive the batch they stage
/// into; read commands receive `None`.
pub type Handler = fn(&Db, &[Bytes], Option<&mut WriteBatch>) -> Result<Reply, CommandError>;

/// Static description of one command.
pub struct CommandSpec {
    /// Lowercase command name.
    pub name: &'static str,
    handler: Handler,
    /// Non-negative: exactly this many arguments after the name.
    /// Negative: at least the absolute value.
    pub arity: i32,
    /// Whether a write batch is allocated, key locks taken, and the
    /// batch committed on success.
    pub writes: bool,
    /// Index of the first key argument, -1 for none.
    pub first_key: i32,
    /// Index of the last key argument, -1 for "to the end".
    pub last_key: i32,
    /// Stride between key arguments; 0 and 1 mean consecutive.
    pub key_step: i32,
    /// Override for commands whose key set is not a simple stride.
    key_lookup: Option<fn(&[Bytes]) -> Vec<Bytes>>,
}

impl CommandSpec {
    const fn new(name: &'static str, handler: Handler, arity: i32, writes: bool) -> Self {
        Self {
            name,
            handler,
            arity,
            writes,
            first_key: 0,
            last_key: 0,
            key_step: 0,
            key_lookup: None,
        }
    }

    const fn keys(mut self, first: i32, last: i32, step: i32) -> Self {
        self.first_key = first;
        self.last_key = last;
        self.key_step = step;
        self
    }

    const fn no_keys(mut self) -> Self {
        self.first_key = -1;
        self
    }

    const fn lookup(mut self, f: fn(&[Bytes]) -> Vec<Bytes>) -> Self {
        self.key_lookup = Some(f);
        self
    }

    fn arity_ok(&self, given: usize) -> bool {
        if self.arity < 0 {
            given >= self.arity.unsigned_abs() as usize
        } else {
            given == self.arity as usize
        }
    }

    /// Extracts the deduplicated key set from the arguments.
    pub fn command_keys(&self, args: &[Bytes]) -> Vec<Bytes> {
        if let Some(lookup) = self.key_lookup {
            return lookup(args);
        }
        if self.first_key < 0 {
            return Vec::new();
        }
        let first = self.first_key as usize;
        if args.len() <= first {
            return Vec::new();
        }
        let last = if self.last_key < 0 {
            args.len() - 1
        } else {
            (self.last_key as usize).min(args.len() - 1)
        };
        let step = self.key_step.max(1) as usize;

        let mut keys: Vec<Bytes> = Vec::new();
        let mut i = first;
        while i <= last {
            if !keys.contains(&args[i]) {
                keys.push(args[i].clone());
            }
            i += step;
        }
        keys
    }
}

/// Every command the server understands, in the order of the wire
/// vocabulary. Only append; the dispatcher indexes these by name.
fn table() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("del", generic::del, -1, true).keys(0, -1, 1),
        CommandSpec::new("echo", generic::echo, 1, false).no_keys(),
        CommandSpec::new("exists", generic::exists, 1, false),
        CommandSpec::new("get", string::get, 1, false),
        CommandSpec::new("hdel", hash::hdel, -2, true),
        CommandSpec::new("hexists", hash::hexists, 2, false),
        CommandSpec::new("hget", hash::hget, 2, false),
        CommandSpec::new("hgetall", hash::hgetall, 1, false),
        CommandSpec::new("hincrby", hash::hincrby, 3, true),
        CommandSpec::new("hincrbyfloat", hash::hincrbyfloat, 3, true),
        CommandSpec::new("hkeys", hash::hkeys, 1, false),
        CommandSpec::new("hlen", hash::hlen, 1, false),
        CommandSpec::new("hmget", hash::hmget, -2, false),
        CommandSpec::new("hmset", hash::hmset, -3, true),
        CommandSpec::new("hset", hash::hset, 3, true),
        CommandSpec::new("hsetnx", hash::hsetnx, 3, true),
        CommandSpec::new("hvals", hash::hvals, 1, false),
        CommandSpec::new("keys", generic::keys, 1, false).no_keys(),
        CommandSpec::new("llen", list::llen, 1, false),
        CommandSpec::new("lpush", list::lpush, -2, true),
        CommandSpec::new("lpushx", list::lpushx, 2, true),
        CommandSpec::new("rpush", list::rpush, -2, true),
        CommandSpec::new("rpushx", list::rpushx, 2, true),
        CommandSpec::new("lpop", list::lpop, 1, true),
        CommandSpec::new("rpop", list::rpop, 1, true),
        CommandSpec::new("rpoplpush", list::rpoplpush, 2, true).keys(0, 1, 1),
        CommandSpec::new("lrange", list::lrange, 3, false),
        CommandSpec::new("ping", generic::ping, 0, false).no_keys(),
        CommandSpec::new("append", string::append, 2, true),
        CommandSpec::new("set", string::set, 2, true),
        CommandSpec::new("sadd", set::sadd, -2, true),
        CommandSpec::new("scard", set::scard, 1, false),
        CommandSpec::new("sismember", set::sismember, 2, false),
        CommandSpec::new("smembers", set::smembers, 1, false),
        CommandSpec::new("smove", set::smove, 3, true).keys(0, 1, 1),
        CommandSpec::new("spop", set::spop, 1, true),
        CommandSpec::new("srem", set::srem, -2, true),
        CommandSpec::new("sunion", set::sunion, -1, false).keys(0, -1, 1),
        CommandSpec::new("sunionstore", set::sunionstore, -2, true).keys(0, -1, 1),
        CommandSpec::new("sinter", set::sinter, -1, false).keys(0, -1, 1),
        CommandSpec::new("sinterstore", set::sinterstore, -2, true).keys(0, -1, 1),
        CommandSpec::new("sdiff", set::sdiff, -1, false).keys(0, -1, 1),
        CommandSpec::new("sdiffstore", set::sdiffstore, -2, true).keys(0, -1, 1),
        CommandSpec::new("time", generic::time, 0, false).no_keys(),
        CommandSpec::new("type", generic::type_, 1, false),
        CommandSpec::new("zadd", zset::zadd, -3, true),
        CommandSpec::new("zcard", zset::zcard, 1, false),
        CommandSpec::new("zincrby", zset::zincrby, 3, true),
        CommandSpec::new("zrange", zset::zrange, -3, false),
        CommandSpec::new("zrem", zset::zrem, -2, true),
        CommandSpec::new("zrevrange", zset::zrevrange, -3, false),
        CommandSpec::new("zrangebyscore", zset::zrangebyscore, -3, false),
        CommandSpec::new("zrevrangebyscore", zset::zrevrangebyscore, -3, false),
        CommandSpec::new("zremrangebyscore", zset::zremrangebyscore, 3, true),
        CommandSpec::new("zcount", zset::zcount, 3, false),
        CommandSpec::new("zscore", zset::zscore, 2, false),
        CommandSpec::new("zrank", zset::zrank, 2, false),
        CommandSpec::new("zrevrank", zset::zrevrank, 2, false),
        CommandSpec::new("zunionstore", zset::zunionstore, -3, true).lookup(zset::combine_keys),
        CommandSpec::new("zinterstore", zset::zinterstore, -3, true).lookup(zset::combine_keys),
        CommandSpec::new("restore", generic::reserved, 3, true),
        CommandSpec::new("dump", generic::reserved, 1, false),
        CommandSpec::new("migrate", generic::reserved, 5, true).keys(2, 2, 0),
        CommandSpec::new("select", generic::select, 1, false).no_keys(),
    ]
}

/// The server's shared state: one engine handle, the key lockring, and
/// the immutable command table.
pub struct Db {
    engine: Engine,
    locks: LockRing,
    commands: HashMap<&'static str, CommandSpec>,
}

impl Db {
    /// Opens the store at `path` and builds the command table.
    pub fn open(path: &Path) -> Result<Self, rocksdb::Error> {
        Ok(Self {
            engine: Engine::open(path)?,
            locks: LockRing::default(),
            commands: table().into_iter().map(|spec| (spec.name, spec)).collect(),
        })
    }

    /// The underlying engine handle.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Runs one request through its whole lifecycle: lookup, arity
    /// check, key locks, handler, batch commit, reply.
    ///
    /// This blocks on engine reads and writes; callers on an async
    /// runtime should move it onto a blocking thread.
    pub fn execute(&self, argv: &[Bytes]) -> Reply {
        let Some(raw_name) = argv.first() else {
            return error_reply(CommandError::UnknownCommand(String::new()));
        };
        let name = raw_name.to_ascii_lowercase();
        let Some(spec) = std::str::from_utf8(&name)
            .ok()
            .and_then(|name| self.commands.get(name))
        else {
            let shown = String::from_utf8_lossy(raw_name).into_owned();
            return error_reply(CommandError::UnknownCommand(shown));
        };

        let args = &argv[1..];
        if !spec.arity_ok(args.len()) {
            return error_reply(CommandError::WrongArity(spec.name.into()));
        }

        // writers hold their key locks across the batch commit; readers
        // rely on snapshot views instead
        let _locks = spec
            .writes
            .then(|| self.locks.lock_keys(&spec.command_keys(args)));
        let mut batch = if spec.writes {
            Some(WriteBatch::default())
        } else {
            None
        };

        match (spec.handler)(self, args, batch.as_mut()) {
            Ok(reply) => {
                if let Some(batch) = batch {
                    if let Err(e) = self.engine.commit(batch) {
                        warn!(command = spec.name, error = %e, "batch commit failed");
                        return error_reply(e);
                    }
                }
                reply
            }
            Err(e) => error_reply(e),
        }
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

/// Maps a command error onto its wire shape.
fn error_reply(err: CommandError) -> Reply {
    match err {
        CommandError::Io(msg) => Reply::IoError(msg),
        other => Reply::Error(other.to_string()),
    }
}

/// Unwraps the batch inside a write handler. The table guarantees it
/// is present for every handler marked `writes`.
pub(crate) fn require_batch(
    wb: Option<&mut WriteBatch>,
) -> Result<&mut WriteBatch, CommandError> {
    wb.ok_or_else(|| CommandError::Io("write command dispatched without a batch".into()))
}
