/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Rules and predicates that help with maintaining the invariant properties of the repository.
//!
//! # Invariants
//!
//! The repository maintains the following invariants across every
//! [top-level updater method](super::accessors::internal::Repository#impl-Repository<K>-1):
//! 1. **Single root**: exactly one snapshot is the root. It wraps the ROOT file, has no parent, and can
//!    never be deleted.
//! 2. **Single writer per branch**: every hash file is owned by exactly one entity. A device owns
//!    exactly one writable file; a snapshot owns exactly one sealed file.
//! 3. **Sealed is final**: a sealed hash file never becomes writable again, and its mapping never
//!    changes except through [reconciliation](crate::reconciliation).
//! 4. **Acyclic lineage**: following parent links from any file always reaches the ROOT file.
//! 5. **Geometry**: a device's size is always a positive multiple of its block size. A device's block
//!    size never changes.
//!
//! # Methods
//!
//! Like the [`Repository`](super::accessors::internal::Repository)'s updaters, the methods in this
//! module either check **whether** an update may be applied ([`check_name`], [`check_size`],
//! [`check_geometry`], [`check_unused_entity`], [`check_unused_file`], [`snapshot_deletable`]) or
//! decide **what** update to apply ([`resize_needs_new_file`]).

use std::collections::BTreeMap;

use crate::types::{
    data_types::{ContentHash, EntityId, FileId},
    hash_file::HashFileHeader,
    lineage::Snapshot,
};

use super::{
    accessors::{
        internal::{LineageId, RepositoryError},
        public::RepositoryView,
    },
    pluggables::KVGet,
};

/// Check that a user-supplied entity name is non-empty.
pub fn check_name(name: &str) -> Result<(), RepositoryError> {
    if name.is_empty() {
        Err(RepositoryError::InvalidArgument {
            reason: "name must not be empty",
        })
    } else {
        Ok(())
    }
}

/// Check that `size` is a valid device size for a device with `block_size`: positive and a multiple
/// of the block size.
pub fn check_size(size: u64, block_size: u32) -> Result<(), RepositoryError> {
    if size == 0 || block_size == 0 || size % block_size as u64 != 0 {
        Err(RepositoryError::InvalidSize { size, block_size })
    } else {
        Ok(())
    }
}

/// Check the geometry of a new repository.
///
/// `block_size` must be positive, `cluster_size` must be a positive multiple of `block_size`, and
/// `hash_size` must be between 1 and 32 bytes.
pub fn check_geometry(
    block_size: u32,
    cluster_size: u32,
    hash_size: u32,
) -> Result<(), RepositoryError> {
    if block_size == 0 {
        return Err(RepositoryError::InvalidArgument {
            reason: "block size must be positive",
        });
    }
    if cluster_size == 0 || cluster_size % block_size != 0 {
        return Err(RepositoryError::InvalidArgument {
            reason: "cluster size must be a positive multiple of the block size",
        });
    }
    if !(1..=32).contains(&hash_size) {
        return Err(RepositoryError::InvalidArgument {
            reason: "hash size must be between 1 and 32 bytes",
        });
    }
    Ok(())
}

/// Check that no snapshot or device, live or deleted, already uses `uuid`.
pub fn check_unused_entity<S: KVGet>(
    view: &RepositoryView<S>,
    uuid: &EntityId,
) -> Result<(), RepositoryError> {
    if view.contains_snapshot(uuid)? || view.contains_device(uuid)? {
        Err(RepositoryError::DuplicateId {
            id: LineageId::Entity(*uuid),
        })
    } else {
        Ok(())
    }
}

/// Check that no hash file already uses `file`.
pub fn check_unused_file<S: KVGet>(
    view: &RepositoryView<S>,
    file: &FileId,
) -> Result<(), RepositoryError> {
    if view.contains_file(file)? {
        Err(RepositoryError::DuplicateId {
            id: LineageId::File(*file),
        })
    } else {
        Ok(())
    }
}

/// Decide whether `snapshot` should be marked as deleted.
///
/// Returns `Ok(false)` if it already is, and fails with
/// [`IllegalState`](RepositoryError::IllegalState) if it is the root snapshot.
pub fn snapshot_deletable(snapshot: &Snapshot) -> Result<bool, RepositoryError> {
    if snapshot.root {
        return Err(RepositoryError::IllegalState {
            reason: "the root snapshot cannot be deleted",
        });
    }
    Ok(!snapshot.deleted)
}

/// Decide whether resizing the file described by `header` to `new_size` has to seal the file and
/// continue in a fresh fork instead of resizing in place.
///
/// A fresh file is needed when shrinking would leave entries of the file's own mapping at or beyond
/// the new size: those entries must not reappear if the device is grown again.
pub fn resize_needs_new_file(
    header: &HashFileHeader,
    entries: &BTreeMap<u64, ContentHash>,
    new_size: u64,
) -> bool {
    if new_size >= header.size {
        return false;
    }
    let first_stranded = new_size.div_ceil(header.block_size as u64);
    entries.range(first_stranded..).next().is_some()
}
