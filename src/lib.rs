/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A versioned, copy-on-write repository of virtual block devices, replicated over several nodes.
//!
//! Devices can be written, snapshotted, cloned, resized, and deleted. The block-to-content mapping of
//! every version of a device is stored in a [hash file](types::hash_file); taking a snapshot seals the
//! device's hash file and gives the device a fresh one that reads through to it. Block payloads are
//! not stored by this library: they live in a user-supplied, content-addressable
//! [block store](block_store).
//!
//! Replicas of a repository converge through the [reconciliation](reconciliation) protocol, which
//! propagates the newest version of every hash file after a replica (re)joins the quorum.
//!
//! ## Where to start
//! - [`repository`]: the persistent state of a replica and the operations on it.
//! - [`node`]: building and running a replica.
//! - [`events`]: what a running replica reports to its user.

pub mod types;

pub mod repository;

pub mod block_store;

pub mod networking;

pub mod reconciliation;

pub mod events;

pub(crate) mod event_bus;

pub mod logging;

pub mod node;
