//! The engine facade: a thin contract over the ordered store.
//!
//! Everything the type operators need from RocksDB goes through this
//! module: point gets, forward ordered scans, point-in-time views, and
//! atomic write batches. Scans use read options that skip block-cache
//! population so iteration-heavy commands do not evict hot blocks.
//!
//! `Engine` is a cheap-clone handle; clones share the same database.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{BlockBasedOptions, Cache, DBRawIterator, Options, ReadOptions, Snapshot, DB};

pub use rocksdb::WriteBatch;

use crate::error::CommandError;

/// Block cache size for the store.
const BLOCK_CACHE_BYTES: usize = 128 * 1024 * 1024;

/// Bloom filter bits per key.
const BLOOM_BITS_PER_KEY: f64 = 10.0;

/// Handle to the ordered store.
#[derive(Clone)]
pub struct Engine {
    db: Arc<DB>,
}

impl Engine {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, rocksdb::Error> {
        let cache = Cache::new_lru_cache(BLOCK_CACHE_BYTES);
        let mut block = BlockBasedOptions::default();
        block.set_block_cache(&cache);
        block.set_bloom_filter(BLOOM_BITS_PER_KEY, false);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_block_based_table_factory(&block);

        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Point read of one key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CommandError> {
        self.db.get(key).map_err(Into::into)
    }

    /// Point read that does not populate the block cache. Used when the
    /// value is about to be deleted or is read once during a sweep.
    pub fn get_nofill(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CommandError> {
        self.db
            .get_opt(key, &scan_read_options())
            .map_err(Into::into)
    }

    /// Starts a forward ordered scan over the live store.
    pub fn scan(&self) -> Scan<'_> {
        Scan {
            it: self.db.raw_iterator_opt(scan_read_options()),
        }
    }

    /// Captures a point-in-time view. Every read through the view,
    /// including scans, observes the same snapshot of the store.
    pub fn view(&self) -> View<'_> {
        View {
            snap: self.db.snapshot(),
        }
    }

    /// Applies a batch atomically. All puts and deletes staged in the
    /// batch become visible together or not at all.
    pub fn commit(&self, batch: WriteBatch) -> Result<(), CommandError> {
        self.db.write(batch).map_err(Into::into)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

/// The point-read surface shared by [`Engine`] (live state) and
/// [`View`] (a snapshot). Lets callers that only need gets work
/// against either.
pub trait PointRead {
    /// Point read of one key.
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CommandError>;
}

impl PointRead for Engine {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CommandError> {
        self.get(key)
    }
}

impl PointRead for View<'_> {
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CommandError> {
        self.get(key)
    }
}

/// A point-in-time view of the store.
pub struct View<'a> {
    snap: Snapshot<'a>,
}

impl View<'_> {
    /// Point read against this view.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CommandError> {
        self.snap.get(key).map_err(Into::into)
    }

    /// Forward ordered scan bound to this view.
    pub fn scan(&self) -> Scan<'_> {
        Scan {
            it: self.snap.raw_iterator_opt(scan_read_options()),
        }
    }
}

/// A forward ordered iterator over encoded keys.
pub struct Scan<'a> {
    it: DBRawIterator<'a>,
}

impl Scan<'_> {
    /// Positions at the first key >= `key`.
    pub fn seek(&mut self, key: &[u8]) {
        self.it.seek(key);
    }

    /// Whether the iterator currently points at an entry.
    pub fn valid(&self) -> bool {
        self.it.valid()
    }

    /// Current key, if valid.
    pub fn key(&self) -> Option<&[u8]> {
        self.it.key()
    }

    /// Current value, if valid.
    pub fn value(&self) -> Option<&[u8]> {
        self.it.value()
    }

    /// Steps to the next entry in order.
    pub fn advance(&mut self) {
        self.it.next();
    }
}

/// Read options for scans and sweep reads: skip block-cache fill.
fn scan_read_options() -> ReadOptions {
    let mut opts = ReadOptions::default();
    opts.fill_cache(false);
    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let engine = Engine::open(dir.path()).expect("open engine");
        (dir, engine)
    }

    #[test]
    fn put_get_round_trip() {
        let (_dir, engine) = open_temp();
        let mut batch = WriteBatch::default();
        batch.put(b"k", b"v");
        engine.commit(batch).unwrap();

        assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(engine.get(b"missing").unwrap(), None);
    }

    #[test]
    fn batch_is_atomic_per_commit() {
        let (_dir, engine) = open_temp();
        let mut batch = WriteBatch::default();
        batch.put(b"a", b"1");
        batch.put(b"b", b"2");
        batch.delete(b"a");
        engine.commit(batch).unwrap();

        assert_eq!(engine.get(b"a").unwrap(), None);
        assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn scan_yields_keys_in_order() {
        let (_dir, engine) = open_temp();
        let mut batch = WriteBatch::default();
        for key in [&b"c"[..], b"a", b"b"] {
            batch.put(key, b"");
        }
        engine.commit(batch).unwrap();

        let mut scan = engine.scan();
        scan.seek(b"a");
        let mut seen = Vec::new();
        while scan.valid() {
            seen.push(scan.key().unwrap_or_default().to_vec());
            scan.advance();
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn seek_lands_on_first_key_at_or_after() {
        let (_dir, engine) = open_temp();
        let mut batch = WriteBatch::default();
        batch.put(b"b", b"");
        batch.put(b"d", b"");
        engine.commit(batch).unwrap();

        let mut scan = engine.scan();
        scan.seek(b"c");
        assert!(scan.valid());
        assert_eq!(scan.key(), Some(&b"d"[..]));
    }

    #[test]
    fn delete_range_removes_span() {
        let (_dir, engine) = open_temp();
        let mut batch = WriteBatch::default();
        for key in [&b"p1"[..], b"p2", b"p3", b"q1"] {
            batch.put(key, b"");
        }
        engine.commit(batch).unwrap();

        let mut batch = WriteBatch::default();
        batch.delete_range(b"p", b"q");
        engine.commit(batch).unwrap();

        assert_eq!(engine.get(b"p2").unwrap(), None);
        assert_eq!(engine.get(b"q1").unwrap(), Some(b"".to_vec()));
    }

    #[test]
    fn view_is_stable_across_writes() {
        let (_dir, engine) = open_temp();
        let mut batch = WriteBatch::default();
        batch.put(b"k", b"old");
        engine.commit(batch).unwrap();

        let view = engine.view();
        let mut batch = WriteBatch::default();
        batch.put(b"k", b"new");
        engine.commit(batch).unwrap();

        assert_eq!(view.get(b"k").unwrap(), Some(b"old".to_vec()));
        assert_eq!(engine.get(b"k").unwrap(), Some(b"new".to_vec()));

        let mut scan = view.scan();
        scan.seek(b"k");
        assert_eq!(scan.value(), Some(&b"old"[..]));
    }
}
