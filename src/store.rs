use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;

use crate::error::Result;

pub mod etcd;
pub mod memory;

/// A key/value entry as stored. Keys and values are opaque byte strings,
/// no encoding is imposed by the contract.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Backend specific read tweaks for `prefix`. Options are order independent;
/// a backend documents which ones it honors and ignores the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadOption {
    /// Yield entries in descending key order.
    Reverse,
    /// Yield keys only, with empty values.
    KeysOnly,
}

/// One open handle to a backend key/value space.
///
/// A handle owns a pending-write buffer and zero or more live scans, and
/// moves through `Open -> (any number of operations) -> Closed`. Once closed
/// it cannot be reopened; construct a new handle instead. A read on a handle
/// observes every write previously flushed through the same handle.
#[async_trait]
pub trait Store: Send + Sync {
    /// Queues a write into the pending buffer. Queued writes are not
    /// guaranteed durable or visible to readers until `flush_puts` returns;
    /// a backend may also flush implicitly once its buffer hits a
    /// backend-defined limit.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Commits every queued write as a single logical unit. On failure the
    /// whole flush must be treated as failed: which writes landed is
    /// undefined and the caller has to re-derive required state.
    async fn flush_puts(&self) -> Result<()>;

    /// Gets the value of a given key. Returns `Error::NotFound` if the key
    /// does not exist.
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Gets a batch of keys lazily, yielding one result per input key in
    /// the exact input order. The first missing key terminates the scan
    /// with `Error::NotFound` after all prior results were delivered; keys
    /// after it are never fetched.
    fn batch_get(&self, keys: Vec<Vec<u8>>) -> Scan;

    /// Scans entries whose key starts with `prefix`, bounded by `limit`.
    /// Each backend documents its zero and negative limit behavior rather
    /// than silently reinterpreting it.
    fn prefix(&self, prefix: &[u8], limit: i64, options: &[ReadOption]) -> Scan;

    /// Deletes a given key. Returns `Error::NotFound` if the key does not
    /// exist.
    async fn delete(&self, key: &[u8]) -> Result<()>;

    /// Deletes a set of keys. Atomicity across the batch is backend
    /// defined, but a missing key is an error, never a silent skip.
    async fn batch_delete(&self, keys: Vec<Vec<u8>>) -> Result<()>;

    /// Closes the underlying engine and releases any resources currently
    /// held by this handle, including outstanding scans. Every subsequent
    /// operation on the handle fails with `Error::Backend`.
    async fn close(&self) -> Result<()>;
}

/// A lazy, non restartable sequence of scan results.
///
/// The scan is fused on its first error: after yielding `Err` it yields
/// nothing more. Dropping a partially consumed scan releases whatever
/// backend resources it holds.
pub struct Scan {
    inner: BoxStream<'static, Result<KeyValue>>,
    done: bool,
}

impl Scan {
    pub fn new(inner: BoxStream<'static, Result<KeyValue>>) -> Scan {
        Scan { inner, done: false }
    }

    /// Pulls the next entry, `None` once the scan is exhausted or has
    /// already yielded an error.
    pub async fn try_next(&mut self) -> Option<Result<KeyValue>> {
        self.next().await
    }
}

impl Stream for Scan {
    type Item = Result<KeyValue>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let polled = this.inner.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => this.done = true,
            _ => {}
        }
        polled
    }
}

/// The set of in-tree store backends. Networked backends are constructed
/// out of tree from a parsed connection descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Memory,
}

pub fn new_store(typ: StoreType) -> Result<Box<dyn Store>> {
    match typ {
        StoreType::Memory => Ok(Box::new(memory::Memory::new())),
    }
}
