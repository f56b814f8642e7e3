//! The state of this replica in the quorum that serves the repository.
//!
//! Membership is decided outside of this library (for example, by a cluster manager that tracks which
//! nodes are online). The library user feeds every change into the running node through
//! [`Node::update_membership`](crate::node::Node::update_membership), and the node uses it to decide
//! when to reconcile and with whom.
//!
//! The allowed transitions are:
//!
//! ```text
//! Unregistered ──► Synchronizing ──► UpToDate ⇄ Late
//! ```
//!
//! Any state may also go back to `Unregistered`, and re-announcing the current state (for example, to
//! report a different set of online peers) is always allowed.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use crate::types::data_types::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MembershipState {
    /// The replica is not part of the quorum.
    Unregistered,

    /// The replica has joined the quorum and is catching up through some external mechanism.
    Synchronizing,

    /// The replica is a full member. Entering this state triggers a reconciliation pass.
    UpToDate,

    /// The replica is a member but is known to have missed updates.
    Late,
}

impl MembershipState {
    /// Check whether a replica in this state may move to `next`.
    pub fn can_transition_to(&self, next: MembershipState) -> bool {
        use MembershipState::*;
        matches!(
            (self, next),
            (_, Unregistered)
                | (Unregistered, Synchronizing)
                | (Synchronizing, Synchronizing)
                | (Synchronizing, UpToDate)
                | (UpToDate, UpToDate)
                | (UpToDate, Late)
                | (Late, Late)
                | (Late, UpToDate)
        )
    }
}

/// The membership of this replica together with the peers that are currently online.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub state: MembershipState,
    /// Online peers. Never contains the local node.
    pub peers: BTreeSet<NodeId>,
}

impl Membership {
    pub(crate) fn new() -> Membership {
        Membership {
            state: MembershipState::Unregistered,
            peers: BTreeSet::new(),
        }
    }

    /// Check whether moving from `self` to `next` should start a reconciliation pass: either the replica
    /// is entering `UpToDate`, or it is already up to date and a peer came online.
    pub fn triggers_reconciliation(&self, next: &Membership) -> bool {
        next.state == MembershipState::UpToDate
            && (self.state != MembershipState::UpToDate || !next.peers.is_subset(&self.peers))
    }
}

#[derive(Debug)]
pub enum MembershipError {
    InvalidTransition {
        from: MembershipState,
        to: MembershipState,
    },
    /// The node's threads have shut down.
    NodeStopped,
}

impl Display for MembershipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MembershipError::InvalidTransition { from, to } => {
                write!(f, "Invalid membership transition from {:?} to {:?}", from, to)
            }
            MembershipError::NodeStopped => write!(f, "The node has stopped"),
        }
    }
}

impl std::error::Error for MembershipError {}
