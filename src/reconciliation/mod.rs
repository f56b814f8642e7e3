//! Protocol that brings the hash files of a replica up to date with the rest of the quorum.
//!
//! Replicas apply the same creates, snapshots, clones, resizes, and deletes (coordinated outside of
//! this library), so they agree on which hash files exist and how they are related. What they may
//! disagree on is the *content* of those files: a replica that was offline misses the writes made in
//! the meantime. Reconciliation fixes exactly that, and nothing else:
//! - A file that some peer holds at a strictly greater [version](crate::types::data_types::FileVersion)
//!   is replaced by that peer's copy.
//! - A file that is writable locally but sealed on every peer that reports it, and that this replica
//!   is not the designated writer of, is sealed. If the file was also behind, it is sealed once the
//!   newer copy has been applied.
//! - A file that a peer reports but the local lineage does not contain is logged and skipped.
//! - Writability is never handed out by reconciliation.
//!
//! The protocol has two sides, each running in its own thread:
//! 1. The [client](client), which drives passes whenever the replica's [membership] says so.
//! 2. The [server](server), which answers peers' requests from a consistent view of the repository.
//!
//! The decision procedure of a pass is the pure function [`plan::plan_reconciliation`].

pub mod messages;

pub mod plan;

pub mod membership;

pub(crate) mod client;

pub(crate) mod server;
