//! Functions and types for sending messages to the P2P network.

use crate::types::data_types::NodeId;

use super::{messages::Message, network::Network};

/// Handle for sending messages to the [`Network`].
///
/// It can be used to send instances of any type that implement the [`Into<Message>`] trait.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn send<S: Into<Message>>(&mut self, peer: NodeId, msg: S) {
        self.network.send(peer, msg.into())
    }
}
