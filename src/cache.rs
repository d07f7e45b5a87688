//! Durable cache of retrieval results.
//!
//! One in-memory map keyed by (representation, query item), guarded by a
//! single coarse lock; the workload is read-heavy once warm, so per-entry
//! locking buys nothing. Disk layout is one JSON file per representation
//! holding all of its entries. [`RetrievalCache::sync_with_disk`] merges
//! whatever is on disk into memory additively (freshly computed in-memory
//! entries are never replaced) and then rewrites every file in full while
//! still holding the lock, so concurrent flushes serialize.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::EvalError;
use crate::types::{ItemId, RankedResult};

type CacheMap = HashMap<String, HashMap<ItemId, RankedResult>>;

pub struct RetrievalCache {
    dir: PathBuf,
    inner: Mutex<CacheMap>,
}

impl RetrievalCache {
    /// Open a cache rooted at `dir`, loading every readable record.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, EvalError> {
        let cache = Self {
            dir: dir.into(),
            inner: Mutex::new(HashMap::new()),
        };
        fs::create_dir_all(&cache.dir)?;
        cache.sync_with_disk()?;
        Ok(cache)
    }

    /// Look up an entry, trusting it only when its first-`n` slice has
    /// exactly `n` items. Shorter entries are treated as absent and will
    /// be recomputed by the caller.
    pub fn lookup(&self, representation: &str, item: &str, n: usize) -> Option<RankedResult> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let full = inner.get(representation)?.get(item)?;
        let head = &full[..full.len().min(n)];
        (head.len() == n).then(|| head.to_vec())
    }

    /// Insert or replace an entry. Last writer wins when two workers raced
    /// on the same key; both computed the same thing, so only the work is
    /// wasted.
    pub fn insert(&self, representation: &str, item: &str, result: RankedResult) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entry(representation.to_string())
            .or_default()
            .insert(item.to_string(), result);
    }

    /// Number of cached entries for one representation.
    pub fn entry_count(&self, representation: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.get(representation).map_or(0, HashMap::len)
    }

    /// Merge disk state into memory, then flush memory back out.
    ///
    /// Disk entries are additive: a key already in memory keeps its
    /// in-memory value. Corrupt or unreadable files are logged and
    /// skipped. Files are rewritten only when memory already held entries
    /// before the merge; a cold open is a pure load.
    pub fn sync_with_disk(&self) -> Result<(), EvalError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let had_entries = inner.values().any(|entries| !entries.is_empty());

        for (representation, entries) in read_records(&self.dir)? {
            let slot = inner.entry(representation).or_default();
            for (item, result) in entries {
                slot.entry(item).or_insert(result);
            }
        }

        if had_entries {
            for (representation, entries) in inner.iter() {
                let path = record_path(&self.dir, representation);
                let file = File::create(&path)?;
                serde_json::to_writer(BufWriter::new(file), entries)?;
            }
            debug!(representations = inner.len(), "retrieval cache flushed");
        }
        Ok(())
    }
}

fn record_path(dir: &Path, representation: &str) -> PathBuf {
    dir.join(format!("{representation}.json"))
}

fn read_records(dir: &Path) -> Result<Vec<(String, HashMap<ItemId, RankedResult>)>, EvalError> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(representation) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %path.display(), %err, "unreadable cache record, skipping");
                continue;
            }
        };
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(entries) => records.push((representation.to_string(), entries)),
            Err(err) => {
                warn!(path = %path.display(), %err, "corrupt cache record, skipping");
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScoredItem;

    fn result(ids: &[(&str, f32)]) -> RankedResult {
        ids.iter()
            .map(|(id, s)| ScoredItem::new(*id, *s))
            .collect()
    }

    #[test]
    fn lookup_trusts_only_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RetrievalCache::open(dir.path()).unwrap();
        cache.insert("rep", "q", result(&[("a", 0.9), ("b", 0.5), ("c", 0.1)]));

        // Truncation to a smaller n is a hit.
        assert_eq!(cache.lookup("rep", "q", 2).unwrap().len(), 2);
        assert_eq!(cache.lookup("rep", "q", 3).unwrap().len(), 3);
        // A stored entry shorter than the requested n is treated as absent.
        assert!(cache.lookup("rep", "q", 4).is_none());
        assert!(cache.lookup("rep", "other", 1).is_none());
        assert!(cache.lookup("other", "q", 1).is_none());
    }

    #[test]
    fn disk_merge_is_additive_and_memory_wins() {
        let dir = tempfile::tempdir().unwrap();

        let first = RetrievalCache::open(dir.path()).unwrap();
        first.insert("rep", "q", result(&[("a", 0.9)]));
        first.insert("rep", "r", result(&[("b", 0.8)]));
        first.sync_with_disk().unwrap();

        let second = RetrievalCache::open(dir.path()).unwrap();
        // Fresh in-memory value for "q" must survive the merge.
        second.insert("rep", "q", result(&[("z", 1.0)]));
        second.sync_with_disk().unwrap();

        assert_eq!(
            second.lookup("rep", "q", 1).unwrap()[0].id,
            "z".to_string()
        );
        // Entry only present on disk was merged in.
        assert_eq!(
            second.lookup("rep", "r", 1).unwrap()[0].id,
            "b".to_string()
        );
    }

    #[test]
    fn corrupt_record_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"[[[").unwrap();

        let cache = RetrievalCache::open(dir.path()).unwrap();
        assert_eq!(cache.entry_count("broken"), 0);

        // The cache stays usable and can flush over the bad file.
        cache.insert("broken", "q", result(&[("a", 1.0)]));
        cache.sync_with_disk().unwrap();
        let reopened = RetrievalCache::open(dir.path()).unwrap();
        assert_eq!(reopened.entry_count("broken"), 1);
    }

    #[test]
    fn flush_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RetrievalCache::open(dir.path()).unwrap();
        cache.insert("rep", "q", result(&[("a", 0.9), ("b", 0.5)]));

        cache.sync_with_disk().unwrap();
        let first = std::fs::read(dir.path().join("rep.json")).unwrap();
        cache.sync_with_disk().unwrap();
        let second = std::fs::read(dir.path().join("rep.json")).unwrap();
        assert_eq!(first, second);
    }
}
