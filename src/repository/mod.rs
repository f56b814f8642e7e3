//! The persistent state of a replica.
//!
//! # The Repository
//!
//! A repository is a tree of [hash files](crate::types::hash_file) rooted at a single, empty, sealed
//! ROOT file. Every other file is a fork of exactly one parent file. Files are owned by business
//! entities:
//! 1. **Snapshots** own sealed files. A snapshot's file never changes after the snapshot is taken.
//! 2. **Devices** own exactly one writable file each: the head of their branch. Writes to a device go
//!    to that file only.
//!
//! Taking a snapshot of a device seals the device's file, hands it to the new snapshot, and gives the
//! device a fresh fork of it. Repeated snapshots therefore form a chain of sealed files under each
//! device, and reads that miss in a device's file continue up that chain. The rules that keep this
//! structure consistent are implemented in [`invariants`].
//!
//! # Pluggable persistence
//!
//! - The repository is kept in persistent storage, most probably in the host's filesystem.
//! - Library users get to choose how exactly this is done.
//! - The repository merely requires that whatever the user provides as a persistence mechanism
//!   implements the abstract functionality of a key-value store with atomic, batched writes and
//!   ordered prefix scans.
//! - This abstract functionality is made concrete by the traits defined in the [`pluggables`] module.
//!
//! The documentation for the [`variables`] submodule lists everything the repository stores.
//!
//! # Accessing the Repository
//!
//! - Implementations of the pluggable persistence traits get wrapped inside repository
//!   [`accessors`].
//! - These put the repository's variables in the right places in the KVStore and provide methods for
//!   reading and writing them, both from code internal to this library and from user code.

pub mod accessors;

pub mod invariants;

pub mod parameters;

pub mod pluggables;

pub mod variables;
