//! String commands.

use bytes::Bytes;

use crate::codec::{self, Meta};
use crate::command::{require_batch, Db};
use crate::engine::WriteBatch;
use crate::error::CommandError;
use crate::keyspace::{self, generic};
use basalt_protocol::Reply;

pub(crate) fn get(db: &Db, args: &[Bytes], _wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let view = db.engine().view();
    match keyspace::load_meta(&view, &args[0])? {
        None => Ok(Reply::Bulk(None)),
        Some(Meta::String { .. }) => {
            let payload = view
                .get(&codec::string_key(&args[0]))?
                .ok_or(CommandError::InvalidData)?;
            Ok(Reply::Bulk(Some(Bytes::from(payload))))
        }
        Some(_) => Err(CommandError::WrongType),
    }
}

/// SET overwrites whatever the key held before. A prior value of a
/// different family is purged in the same batch so no payload entries
/// leak.
pub(crate) fn set(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (key, value) = (&args[0], &args[1]);

    match keyspace::load_meta(db.engine(), key)? {
        None | Some(Meta::String { .. }) => {}
        Some(_) => {
            generic::purge_key(db.engine(), key, wb)?;
        }
    }

    wb.put(codec::string_key(key), value);
    wb.put(
        codec::meta_key(key),
        Meta::String {
            len: value.len() as u64,
        }
        .encode(),
    );
    Ok(Reply::Simple("OK"))
}

pub(crate) fn append(db: &Db, args: &[Bytes], wb: Option<&mut WriteBatch>) -> Result<Reply, CommandError> {
    let wb = require_batch(wb)?;
    let (key, suffix) = (&args[0], &args[1]);

    let mut payload = match keyspace::load_meta(db.engine(), key)? {
        None => Vec::new(),
        Some(Meta::String { .. }) => db
            .engine()
            .get(&codec::string_key(key))?
            .ok_or(CommandError::InvalidData)?,
        Some(_) => return Err(CommandError::WrongType),
    };
    payload.extend_from_slice(suffix);
    let len = payload.len() as u64;

    wb.put(codec::string_key(key), payload);
    wb.put(codec::meta_key(key), Meta::String { len }.encode());
    Ok(Reply::Integer(len as i64))
}
