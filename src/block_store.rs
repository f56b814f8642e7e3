/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for the pluggable content-addressable store that holds block payloads.
//!
//! The repository never stores block payloads itself. Hash files only map block indices to
//! [`ContentHash`]es, and the payloads are kept in a `BlockStore` supplied by the library user, keyed by
//! those hashes.
//!
//! # Lifecycle
//!
//! A block store moves through the following states:
//!
//! ```text
//! create ──► close ──► open ──► start ⇄ stop ──► close ──► destroy
//! ```
//!
//! Every operation other than the lifecycle calls fails with
//! [`IllegalState`](BlockStoreError::IllegalState) unless the store is started. `close` and `destroy`
//! are idempotent, and `destroy` removes all persisted data.
//!
//! # Transactions
//!
//! [`begin`](BlockStore::begin) returns a fresh [`TransactionId`]. `put` and `replace` calls that carry
//! a transaction id are invisible to `get` until the transaction is
//! [committed](BlockStore::commit), and are discarded if it is [rolled back](BlockStore::rollback).
//!
//! # Hot data
//!
//! Stores may be configured to evict data eagerly ("hot data"). With hot data enabled,
//! [`replace`](BlockStore::replace) removes the old key as part of the call. Otherwise, the old key stays
//! readable until it is deleted or compacted separately.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::data_types::ContentHash;

/// Identifier of an open block store transaction. Always greater than 0.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Create a new `TransactionId` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

pub trait BlockStore {
    /* ↓↓↓ Lifecycle ↓↓↓ */

    fn create(&mut self) -> Result<(), BlockStoreError>;
    fn open(&mut self) -> Result<(), BlockStoreError>;
    fn start(&mut self) -> Result<(), BlockStoreError>;
    fn stop(&mut self) -> Result<(), BlockStoreError>;
    fn close(&mut self) -> Result<(), BlockStoreError>;
    fn destroy(&mut self) -> Result<(), BlockStoreError>;

    /* ↓↓↓ Transactions ↓↓↓ */

    fn begin(&mut self) -> Result<TransactionId, BlockStoreError>;
    fn commit(&mut self, tx: TransactionId) -> Result<(), BlockStoreError>;
    fn rollback(&mut self, tx: TransactionId) -> Result<(), BlockStoreError>;

    /* ↓↓↓ Data ↓↓↓ */

    /// Store `data` under `key`. Returns `true` if the key was newly inserted, and `false` if it already
    /// existed, in which case the call is a refresh.
    ///
    /// `data` may be `None` only to refresh an existing key.
    fn put(
        &mut self,
        key: &ContentHash,
        data: Option<&[u8]>,
        tx: Option<TransactionId>,
    ) -> Result<bool, BlockStoreError>;

    /// Get the data stored under `key`.
    ///
    /// `min_len` is the caller's buffer budget. If the stored record is longer, fails with
    /// [`BufferTooSmall`](BlockStoreError::BufferTooSmall), and the caller should retry with the
    /// returned `actual_len`.
    fn get(&self, key: &ContentHash, min_len: usize) -> Result<Vec<u8>, BlockStoreError>;

    /// Delete `key`. Deleting an absent key is not an error.
    fn del(&mut self, key: &ContentHash) -> Result<(), BlockStoreError>;

    /// Store `data` under `new_key` like [`put`](Self::put), then, if hot data is enabled, delete
    /// `old_key`.
    fn replace(
        &mut self,
        old_key: &ContentHash,
        new_key: &ContentHash,
        data: &[u8],
        tx: Option<TransactionId>,
    ) -> Result<bool, BlockStoreError>;
}

/// Error returned by a [`BlockStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockStoreError {
    NotFound,
    BufferTooSmall { actual_len: usize },
    InvalidTransactionId { tx: TransactionId },
    IllegalState { reason: &'static str },
}

impl Display for BlockStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockStoreError::NotFound => write!(f, "Key not found in block store"),
            BlockStoreError::BufferTooSmall { actual_len } => {
                write!(f, "Buffer too small, record is {} bytes long", actual_len)
            }
            BlockStoreError::InvalidTransactionId { tx } => {
                write!(f, "Unknown transaction id {}", tx.int())
            }
            BlockStoreError::IllegalState { reason } => {
                write!(f, "Block store in illegal state: {}", reason)
            }
        }
    }
}

impl std::error::Error for BlockStoreError {}
