//! Pluggable peer-to-peer (P2P) networking.
//!
//! The reconciliation protocol only needs to send a message to a specific peer and to receive messages
//! from any peer. The library user provides both through an implementation of the [`Network`]
//! trait. Everything above it (splitting incoming messages by kind, waiting for responses with a
//! deadline) is implemented in this module.
//!
//! [`Network`]: network::Network

pub mod network;

pub mod messages;

pub(crate) mod receiving;

pub(crate) mod sending;
