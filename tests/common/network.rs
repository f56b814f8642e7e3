use std::{
    collections::{HashMap, HashSet},
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use lineage_rs::{
    networking::{messages::Message, network::Network},
    types::data_types::NodeId,
};

/// A mock network stub which passes messages from and to threads using channels.
///
/// Every stub of a mock network shares one set of offline nodes. Messages sent by or to an offline
/// node are silently dropped, which is how tests simulate unreachable peers.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_node_id: NodeId,
    all_peers: HashMap<NodeId, Sender<(NodeId, Message)>>,
    inbox: Arc<Mutex<Receiver<(NodeId, Message)>>>,
    offline: Arc<Mutex<HashSet<NodeId>>>,
}

impl NetworkStub {
    /// Make `node` unreachable (`offline == true`) or reachable again.
    pub(crate) fn set_offline(&self, node: NodeId, offline: bool) {
        let mut offline_nodes = self.offline.lock().unwrap();
        if offline {
            offline_nodes.insert(node);
        } else {
            offline_nodes.remove(&node);
        }
    }

    fn reachable(&self, peer: &NodeId) -> bool {
        let offline_nodes = self.offline.lock().unwrap();
        !offline_nodes.contains(&self.my_node_id) && !offline_nodes.contains(peer)
    }
}

impl Network for NetworkStub {
    fn send(&mut self, peer: NodeId, message: Message) {
        if !self.reachable(&peer) {
            return;
        }
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.my_node_id, message));
        }
    }

    fn recv(&mut self) -> Option<(NodeId, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = NodeId>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let offline = Arc::new(Mutex::new(HashSet::new()));
    let peer_and_inboxes: Vec<(NodeId, Receiver<(NodeId, Message)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(my_node_id, inbox)| NetworkStub {
            my_node_id,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
            offline: offline.clone(),
        })
        .collect()
}
