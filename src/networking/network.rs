use crate::types::data_types::NodeId;

use super::messages::Message;

/// Transport between the replicas of a repository.
///
/// Implementations decide how nodes find and connect to each other. Which peers are online is not
/// the network's concern: the node learns that through
/// [`Node::update_membership`](crate::node::Node::update_membership).
pub trait Network: Clone + Send {
    /// Send a message to the specified peer without blocking. Messages to unreachable peers may be
    /// dropped silently.
    fn send(&mut self, peer: NodeId, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(NodeId, Message)>;
}
