//! A volatile, in-memory implementation of [`BlockStore`].

use std::collections::{BTreeMap, HashMap};

use lineage_rs::{
    block_store::{BlockStore, BlockStoreError, TransactionId},
    types::data_types::ContentHash,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Uncreated,
    Closed,
    Open,
    Started,
}

/// A write that becomes visible when its transaction commits.
enum Staged {
    Put(ContentHash, Vec<u8>),
    Evict(ContentHash),
}

pub(crate) struct MemBlockStore {
    state: State,
    hot_data: bool,
    blocks: HashMap<ContentHash, Vec<u8>>,
    transactions: BTreeMap<TransactionId, Vec<Staged>>,
    next_transaction: u64,
}

impl MemBlockStore {
    /// Create a store that is already created, opened, and started.
    pub(crate) fn started(hot_data: bool) -> MemBlockStore {
        let mut store = MemBlockStore::new(hot_data);
        store.create().unwrap();
        store.open().unwrap();
        store.start().unwrap();
        store
    }

    /// Create a store in the uncreated state.
    pub(crate) fn new(hot_data: bool) -> MemBlockStore {
        MemBlockStore {
            state: State::Uncreated,
            hot_data,
            blocks: HashMap::new(),
            transactions: BTreeMap::new(),
            next_transaction: 1,
        }
    }

    pub(crate) fn contains(&self, key: &ContentHash) -> bool {
        self.blocks.contains_key(key)
    }

    fn transition(
        &mut self,
        from: &[State],
        to: State,
        reason: &'static str,
    ) -> Result<(), BlockStoreError> {
        if from.contains(&self.state) {
            self.state = to;
            Ok(())
        } else {
            Err(BlockStoreError::IllegalState { reason })
        }
    }

    fn check_started(&self) -> Result<(), BlockStoreError> {
        if self.state == State::Started {
            Ok(())
        } else {
            Err(BlockStoreError::IllegalState {
                reason: "the block store is not started",
            })
        }
    }

    fn staged(&mut self, tx: TransactionId) -> Result<&mut Vec<Staged>, BlockStoreError> {
        self.transactions
            .get_mut(&tx)
            .ok_or(BlockStoreError::InvalidTransactionId { tx })
    }

    fn is_staged(&self, key: &ContentHash) -> bool {
        self.transactions.values().flatten().any(|staged| match staged {
            Staged::Put(staged_key, _) => staged_key == key,
            Staged::Evict(_) => false,
        })
    }
}

impl BlockStore for MemBlockStore {
    fn create(&mut self) -> Result<(), BlockStoreError> {
        self.transition(&[State::Uncreated], State::Closed, "the block store already exists")
    }

    fn open(&mut self) -> Result<(), BlockStoreError> {
        self.transition(&[State::Closed], State::Open, "the block store is not closed")
    }

    fn start(&mut self) -> Result<(), BlockStoreError> {
        self.transition(&[State::Open], State::Started, "the block store is not open")
    }

    fn stop(&mut self) -> Result<(), BlockStoreError> {
        self.transition(&[State::Started], State::Open, "the block store is not started")
    }

    fn close(&mut self) -> Result<(), BlockStoreError> {
        if self.state != State::Uncreated {
            self.state = State::Closed;
        }
        self.transactions.clear();
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), BlockStoreError> {
        self.transition(
            &[State::Uncreated, State::Closed],
            State::Uncreated,
            "the block store must be closed before it is destroyed",
        )?;
        self.blocks.clear();
        Ok(())
    }

    fn begin(&mut self) -> Result<TransactionId, BlockStoreError> {
        self.check_started()?;
        let tx = TransactionId::new(self.next_transaction);
        self.next_transaction += 1;
        self.transactions.insert(tx, Vec::new());
        Ok(tx)
    }

    fn commit(&mut self, tx: TransactionId) -> Result<(), BlockStoreError> {
        self.check_started()?;
        let staged = self
            .transactions
            .remove(&tx)
            .ok_or(BlockStoreError::InvalidTransactionId { tx })?;
        for write in staged {
            match write {
                Staged::Put(key, data) => {
                    self.blocks.entry(key).or_insert(data);
                }
                Staged::Evict(key) => {
                    self.blocks.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn rollback(&mut self, tx: TransactionId) -> Result<(), BlockStoreError> {
        self.check_started()?;
        self.transactions
            .remove(&tx)
            .map(|_| ())
            .ok_or(BlockStoreError::InvalidTransactionId { tx })
    }

    fn put(
        &mut self,
        key: &ContentHash,
        data: Option<&[u8]>,
        tx: Option<TransactionId>,
    ) -> Result<bool, BlockStoreError> {
        self.check_started()?;
        if self.blocks.contains_key(key) || self.is_staged(key) {
            return Ok(false);
        }
        let Some(data) = data else {
            return Err(BlockStoreError::NotFound);
        };

        match tx {
            Some(tx) => self.staged(tx)?.push(Staged::Put(key.clone(), data.to_vec())),
            None => {
                self.blocks.insert(key.clone(), data.to_vec());
            }
        }
        Ok(true)
    }

    fn get(&self, key: &ContentHash, min_len: usize) -> Result<Vec<u8>, BlockStoreError> {
        self.check_started()?;
        let data = self.blocks.get(key).ok_or(BlockStoreError::NotFound)?;
        if data.len() > min_len {
            return Err(BlockStoreError::BufferTooSmall {
                actual_len: data.len(),
            });
        }
        Ok(data.clone())
    }

    fn del(&mut self, key: &ContentHash) -> Result<(), BlockStoreError> {
        self.check_started()?;
        self.blocks.remove(key);
        Ok(())
    }

    fn replace(
        &mut self,
        old_key: &ContentHash,
        new_key: &ContentHash,
        data: &[u8],
        tx: Option<TransactionId>,
    ) -> Result<bool, BlockStoreError> {
        let inserted = self.put(new_key, Some(data), tx)?;
        if self.hot_data && old_key != new_key {
            match tx {
                Some(tx) => self.staged(tx)?.push(Staged::Evict(old_key.clone())),
                None => {
                    self.blocks.remove(old_key);
                }
            }
        }
        Ok(inserted)
    }
}
