use std::collections::BTreeMap;
use std::collections::Bound;
use std::collections::VecDeque;
use std::iter::once;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use log::debug;

use crate::backend_err;
use crate::error::Error;
use crate::error::Result;
use crate::store::KeyValue;
use crate::store::ReadOption;
use crate::store::Scan;
use crate::store::Store;

/// Number of queued writes that triggers an implicit flush.
const DEFAULT_FLUSH_LIMIT: usize = 128;

/// An in-memory store backend over a `BTreeMap`, with the keys kept in
/// lexicographical order.
///
/// Writes are queued in a pending buffer and become visible on flush, either
/// the explicit `flush_puts` or the implicit one at the buffer limit.
/// `batch_delete` is not atomic: keys before the first missing one stay
/// deleted. A zero or negative `prefix` limit means unbounded. Both
/// `ReadOption::Reverse` and `ReadOption::KeysOnly` are honored.
#[derive(Debug)]
pub struct Memory {
    inner: Arc<Inner>,
    flush_limit: usize,
}

#[derive(Debug)]
struct Inner {
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    pending: Mutex<Vec<KeyValue>>,
    closed: AtomicBool,
}

impl Inner {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(backend_err!("store is closed"));
        }
        Ok(())
    }

    // Drains the pending buffer under the data lock, so readers observe
    // either none or all of the queued writes.
    fn flush(&self) -> Result<()> {
        let mut data = self.data.lock()?;
        let mut pending = self.pending.lock()?;
        for (key, value) in pending.drain(..) {
            data.insert(key, value);
        }
        Ok(())
    }
}

impl Memory {
    pub fn new() -> Memory {
        Memory::with_flush_limit(DEFAULT_FLUSH_LIMIT)
    }

    /// A memory store that flushes implicitly once `limit` writes are queued.
    pub fn with_flush_limit(limit: usize) -> Memory {
        let inner = Inner {
            data: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };
        Memory { inner: Arc::new(inner), flush_limit: limit.max(1) }
    }

    fn snapshot_prefix(
        &self,
        prefix: &[u8],
        limit: i64,
        options: &[ReadOption],
    ) -> Result<VecDeque<KeyValue>> {
        self.inner.check_open()?;
        let keys_only = options.contains(&ReadOption::KeysOnly);
        let data = self.inner.data.lock()?;
        let entries = data.range(prefix_range(prefix)).map(|(k, v)| {
            if keys_only {
                (k.clone(), Vec::new())
            } else {
                (k.clone(), v.clone())
            }
        });
        let mut deque: VecDeque<KeyValue> = if options.contains(&ReadOption::Reverse) {
            entries.rev().collect()
        } else {
            entries.collect()
        };
        if limit > 0 && deque.len() > limit as usize {
            deque.truncate(limit as usize);
        }
        Ok(deque)
    }
}

#[async_trait]
impl Store for Memory {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.check_open()?;
        let full = {
            let mut pending = self.inner.pending.lock()?;
            pending.push((key.to_vec(), value.to_vec()));
            pending.len() >= self.flush_limit
        };
        if full {
            debug!("pending buffer reached {} entries, flushing", self.flush_limit);
            self.inner.flush()?;
        }
        Ok(())
    }

    async fn flush_puts(&self) -> Result<()> {
        self.inner.check_open()?;
        self.inner.flush()
    }

    async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.inner.check_open()?;
        let data = self.inner.data.lock()?;
        match data.get(key) {
            Some(value) => Ok(value.clone()),
            None => Err(Error::NotFound),
        }
    }

    fn batch_get(&self, keys: Vec<Vec<u8>>) -> Scan {
        let inner = Arc::clone(&self.inner);
        // One lookup per poll: keys behind a missing one are never touched,
        // and a scan outliving close fails on its next poll.
        let entries = keys.into_iter().map(move |key| {
            inner.check_open()?;
            let data = inner.data.lock()?;
            match data.get(&key) {
                Some(value) => Ok((key, value.clone())),
                None => Err(Error::NotFound),
            }
        });
        Scan::new(Box::pin(stream::iter(entries)))
    }

    fn prefix(&self, prefix: &[u8], limit: i64, options: &[ReadOption]) -> Scan {
        // The matching range is snapshotted up front so the scan never
        // holds the data lock; closing the handle still fails the scan on
        // its next poll.
        match self.snapshot_prefix(prefix, limit, options) {
            Ok(deque) => {
                let inner = Arc::clone(&self.inner);
                let entries = deque.into_iter().map(move |kv| {
                    inner.check_open()?;
                    Ok(kv)
                });
                Scan::new(Box::pin(stream::iter(entries)))
            }
            Err(err) => Scan::new(Box::pin(stream::iter(once(Err(err))))),
        }
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.check_open()?;
        let mut data = self.inner.data.lock()?;
        match data.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound),
        }
    }

    async fn batch_delete(&self, keys: Vec<Vec<u8>>) -> Result<()> {
        self.inner.check_open()?;
        let mut data = self.inner.data.lock()?;
        for key in &keys {
            if data.remove(key.as_slice()).is_none() {
                return Err(Error::NotFound);
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(backend_err!("store is closed"));
        }
        self.inner.pending.lock()?.clear();
        self.inner.data.lock()?.clear();
        debug!("memory store closed");
        Ok(())
    }
}

// Since keys are in lexicographic order the prefix scan range starts at the
// prefix itself and ends right before the next sibling, e.g. `app` covers
// `apple` and everything else below `apq`.
fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.to_vec());
    let breaker = prefix.iter().rposition(|&b| b != 0xff);
    let end = match breaker {
        None => Bound::Unbounded,
        Some(i) => {
            Bound::Excluded(prefix.iter().take(i).copied().chain(once(prefix[i] + 1)).collect())
        }
    };
    (start, end)
}
