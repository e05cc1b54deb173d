//! Key-value persistence for the chain organization store.
//!
//! The store is five fixed columns written through ordered batches. A
//! backend supplies point reads, ordered prefix scans and atomic batch
//! commits; everything richer (height indexes, work accounting) lives in
//! the chain layer.

use std::fmt;

use smallvec::SmallVec;

pub mod memory;

#[cfg(feature = "fjall")]
pub mod fjall;

/// Backend failure surfaced to the chain layer, which treats it as
/// store corruption.
#[derive(Debug)]
pub struct StoreError {
    backend: &'static str,
    message: String,
}

impl StoreError {
    pub fn new(backend: &'static str, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.message)
    }
}

impl std::error::Error for StoreError {}

/// The column families of the chain organization store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Column {
    /// Header hash to indexed header record.
    Header,
    /// Candidate chain height to header hash.
    CandidateIndex,
    /// Confirmed chain height to header hash.
    ConfirmedIndex,
    /// Transaction hash to unconfirmed transaction record.
    Transaction,
    /// Singleton bookkeeping values (chain tops).
    Meta,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Header,
        Column::CandidateIndex,
        Column::ConfirmedIndex,
        Column::Transaction,
        Column::Meta,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Header => "header",
            Column::CandidateIndex => "candidate_index",
            Column::ConfirmedIndex => "confirmed_index",
            Column::Transaction => "transaction",
            Column::Meta => "meta",
        }
    }

    /// Stable position of the column within [`Column::ALL`].
    pub fn position(self) -> usize {
        self as usize
    }
}

/// A staged batch key. Nothing in this store keys on more than a
/// 32-byte hash plus a short tag, so keys stay inline.
#[derive(Clone, Debug)]
pub struct WriteKey(SmallVec<[u8; 36]>);

impl WriteKey {
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<&[u8]> for WriteKey {
    fn from(bytes: &[u8]) -> Self {
        Self(SmallVec::from_slice(bytes))
    }
}

impl<const N: usize> From<[u8; N]> for WriteKey {
    fn from(bytes: [u8; N]) -> Self {
        Self(SmallVec::from_slice(&bytes))
    }
}

/// One staged mutation.
#[derive(Clone, Debug)]
pub enum WriteOp {
    Put(Column, WriteKey, Vec<u8>),
    Delete(Column, WriteKey),
}

/// Ordered mutations applied as one atomic unit. A reorganization is a
/// single batch, so readers never observe a half-rewritten index.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: impl Into<WriteKey>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put(column, key.into(), value.into()));
    }

    pub fn delete(&mut self, column: Column, key: impl Into<WriteKey>) {
        self.ops.push(WriteOp::Delete(column, key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WriteOp> {
        self.ops.iter()
    }
}

/// Storage backends the chain store can run on. Batches apply atomically
/// and in staging order; point reads may race a commit and see either
/// side of it, never a torn write.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError>;
    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError>;
}
