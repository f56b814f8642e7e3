//! Tests of the reconciliation protocol between running nodes connected by a mock network.
//!
//! Every test replays the same sequence of creates on each node, on behalf of the node that
//! initiated them, to stand in for the distributed transaction coordinator that normally does this.
//! The nodes then diverge, and reconciliation has to bring them back together.

use std::{thread, time::Duration};

use log::LevelFilter;

use lineage_rs::{
    reconciliation::membership::{Membership, MembershipState},
    repository::accessors::internal::RepositoryError,
    types::{
        data_types::{FileVersion, NodeId},
        lineage::Device,
    },
};

mod common;

use common::{
    fixtures::{entity_id, hash, node_id, BLOCK_SIZE},
    logging::{log_with_context, setup_logger},
    network::mock_network,
    node::{wait_until, TestNode},
};

const DEVICE_SIZE: u64 = 8 * BLOCK_SIZE as u64;

const TIMEOUT: Duration = Duration::from_secs(15);

fn start_nodes(n: u8) -> Vec<TestNode> {
    setup_logger(LevelFilter::Info);
    let node_ids: Vec<NodeId> = (1..=n).map(node_id).collect();
    mock_network(node_ids.clone().into_iter())
        .into_iter()
        .zip(node_ids)
        .map(|(network, node_id)| TestNode::new(node_id, network))
        .collect()
}

/// Create the same device on every node in `nodes`, on behalf of `creator`.
fn replay_create_device(nodes: &[&TestNode], creator: NodeId, uuid: u8) -> Device {
    let mut devices: Vec<Device> = nodes
        .iter()
        .map(|node| {
            let root = node.root().uuid;
            node.repository()
                .on_behalf_of(creator, |repository| {
                    repository.create_device(&root, "device", "", DEVICE_SIZE, entity_id(uuid))
                })
                .unwrap()
        })
        .collect();
    let device = devices.remove(0);
    assert!(devices.iter().all(|other| other.file_id == device.file_id));
    device
}

fn write(node: &TestNode, device: &Device, block: u64, content: u8) {
    node.repository()
        .write_hash(&device.uuid, block * BLOCK_SIZE as u64, hash(content))
        .unwrap();
}

fn peers_of(node: &TestNode, nodes: &[TestNode]) -> Vec<NodeId> {
    nodes
        .iter()
        .map(TestNode::node_id)
        .filter(|peer| *peer != node.node_id())
        .collect()
}

/// Tests that three replicas holding divergent versions of the same file all end up with the newest
/// version, and that a file that only one replica holds is left alone.
#[test]
fn convergence_test() {
    let mut nodes = start_nodes(3);
    let all: Vec<&TestNode> = nodes.iter().collect();
    let device = replay_create_device(&all, node_id(1), 1);
    let file = device.file_id;

    // 1. Diverge: node 1 is ahead, node 2 is behind with different content, node 3 is untouched.
    log_with_context(None, "Writing divergent versions of the device's file.");
    write(&nodes[0], &device, 0, 1);
    write(&nodes[0], &device, 1, 2);
    write(&nodes[0], &device, 5, 3);
    write(&nodes[1], &device, 7, 9);

    // 2. Node 3 creates a device of its own that nobody else knows about.
    let local_only = nodes[2]
        .repository()
        .create_device(&nodes[2].root().uuid, "local", "", DEVICE_SIZE, entity_id(2))
        .unwrap();
    write(&nodes[2], &local_only, 0, 4);
    let local_only_before = nodes[2].hash_file(&local_only.file_id);

    // 3. Bring every node online.
    log_with_context(None, "Bringing every node online.");
    for i in 0..nodes.len() {
        let peers = peers_of(&nodes[i], &nodes);
        nodes[i].come_online(&peers);
    }

    wait_until(TIMEOUT, || {
        nodes
            .iter()
            .all(|node| node.version_of(&file) == FileVersion::new(3))
    });
    for node in &nodes {
        node.wait_for_complete_pass(0, TIMEOUT);
    }

    // 4. Every replica holds the same mapping as the most recent one.
    let newest = nodes[0].hash_file(&file);
    for node in &nodes[1..] {
        let copy = node.hash_file(&file);
        assert_eq!(copy.entries(), newest.entries());
        assert_eq!(copy.header.version, newest.header.version);
        assert_eq!(copy.header.node_id, node_id(1));
        // Reconciliation never hands out write access, nor takes it away from a live file.
        assert!(copy.header.writable);
        assert!(node
            .reconciled_files()
            .iter()
            .any(|event| event.file == file && event.source == node_id(1)));
    }
    assert!(nodes[0].reconciled_files().is_empty());

    // 5. The file only node 3 holds is untouched.
    assert_eq!(nodes[2].hash_file(&local_only.file_id), local_only_before);
}

/// Tests that a replica that missed a snapshot seals the device file that everybody else sealed, but
/// only once every online peer has answered.
#[test]
fn seal_abandoned_file_test() {
    let mut nodes = start_nodes(3);
    let all: Vec<&TestNode> = nodes.iter().collect();
    let device = replay_create_device(&all, node_id(1), 1);
    let abandoned = device.file_id;

    // 1. Nodes 1 and 3 take a snapshot of the device that node 2 misses.
    for i in [0, 2] {
        nodes[i]
            .repository()
            .on_behalf_of(node_id(1), |repository| {
                repository.create_snapshot(&device.uuid, "s1", "", entity_id(10))
            })
            .unwrap();
        assert!(!nodes[i].is_writable(&abandoned));
    }
    assert!(nodes[1].is_writable(&abandoned));

    // 2. With node 3 unreachable, node 2 must not seal anything.
    log_with_context(None, "Bringing node 2 online with node 3 unreachable.");
    nodes[1].network().set_offline(node_id(3), true);
    let peers = peers_of(&nodes[1], &nodes);
    nodes[1].come_online(&peers);

    wait_until(TIMEOUT, || !nodes[1].passes().is_empty());
    let first_pass = nodes[1].passes()[0].clone();
    assert!(!first_pass.complete);
    assert_eq!(first_pass.files_sealed, 0);
    assert!(nodes[1].is_writable(&abandoned));

    // 3. Once node 3 is back, a retry seals the abandoned file without bumping its version.
    log_with_context(None, "Making node 3 reachable again.");
    nodes[1].network().set_offline(node_id(3), false);
    nodes[1].wait_for_complete_pass(1, TIMEOUT);

    assert!(!nodes[1].is_writable(&abandoned));
    assert_eq!(nodes[1].version_of(&abandoned), FileVersion::init());
    wait_until(TIMEOUT, || {
        nodes[1]
            .sealed_files()
            .iter()
            .any(|event| event.file == abandoned)
    });
}

/// Tests that a replica that missed both the writes to a device and the snapshot that sealed them
/// catches up to the sealed copy and seals it in the same pass, so the stale head stops taking writes.
#[test]
fn stale_abandoned_file_is_fetched_and_sealed_test() {
    let mut nodes = start_nodes(3);
    let all: Vec<&TestNode> = nodes.iter().collect();
    let device = replay_create_device(&all, node_id(1), 1);
    let abandoned = device.file_id;

    // 1. Nodes 1 and 3 write to the device and snapshot it. Node 2 misses all of it.
    for i in [0, 2] {
        write(&nodes[i], &device, 0, 1);
        write(&nodes[i], &device, 1, 2);
        nodes[i]
            .repository()
            .on_behalf_of(node_id(1), |repository| {
                repository.create_snapshot(&device.uuid, "s1", "", entity_id(10))
            })
            .unwrap();
    }
    assert_eq!(nodes[1].version_of(&abandoned), FileVersion::init());
    assert!(nodes[1].is_writable(&abandoned));

    // 2. Node 2 comes online.
    log_with_context(None, "Bringing node 2 online behind its peers.");
    let peers = peers_of(&nodes[1], &nodes);
    nodes[1].come_online(&peers);
    nodes[1].wait_for_complete_pass(0, TIMEOUT);

    // 3. The file was fetched, and the first complete pass sealed it.
    let pass = nodes[1]
        .passes()
        .into_iter()
        .find(|pass| pass.complete)
        .unwrap();
    assert_eq!(pass.files_sealed, 1);
    assert!(nodes[1]
        .reconciled_files()
        .iter()
        .any(|event| event.file == abandoned && event.new_version == FileVersion::new(2)));
    assert_eq!(nodes[1].version_of(&abandoned), FileVersion::new(2));
    assert!(!nodes[1].is_writable(&abandoned));
    assert_eq!(
        nodes[1].hash_file(&abandoned).entries(),
        nodes[0].hash_file(&abandoned).entries()
    );

    // 4. The stale head no longer accepts writes.
    assert!(matches!(
        nodes[1]
            .repository()
            .write_hash(&device.uuid, 0, hash(3)),
        Err(RepositoryError::NotWritable { file }) if file == abandoned
    ));
}

/// Tests that an unreachable peer does not stop the files that other peers can serve from being
/// reconciled, and that the pass is retried until the peer is reached.
#[test]
fn unreachable_peer_test() {
    let mut nodes = start_nodes(3);
    let all: Vec<&TestNode> = nodes.iter().collect();
    let device = replay_create_device(&all, node_id(1), 1);
    let file = device.file_id;

    write(&nodes[0], &device, 0, 1);
    write(&nodes[0], &device, 1, 2);

    nodes[0].network().set_offline(node_id(3), true);
    let peers = peers_of(&nodes[1], &nodes);
    nodes[1].come_online(&peers);

    // Node 1 answers, so the file is reconciled even though node 3 does not.
    wait_until(TIMEOUT, || nodes[1].version_of(&file) == FileVersion::new(2));
    wait_until(TIMEOUT, || !nodes[1].passes().is_empty());
    let first_pass = nodes[1].passes()[0].clone();
    assert!(!first_pass.complete);
    assert_eq!(first_pass.files_reconciled, 1);

    // Retries keep failing while node 3 is unreachable.
    thread::sleep(Duration::from_millis(800));
    assert!(nodes[1].passes().iter().all(|pass| !pass.complete));

    nodes[0].network().set_offline(node_id(3), false);
    let retried = nodes[1].passes().len();
    nodes[1].wait_for_complete_pass(retried, TIMEOUT);
    assert_eq!(nodes[1].version_of(&file), FileVersion::new(2));
}

/// Tests that a newly online peer with a newer file triggers a pass on an up to date replica.
#[test]
fn new_peer_triggers_reconciliation_test() {
    let mut nodes = start_nodes(2);
    let all: Vec<&TestNode> = nodes.iter().collect();
    let device = replay_create_device(&all, node_id(2), 1);
    let file = device.file_id;
    write(&nodes[1], &device, 4, 7);

    // Node 1 is up to date, but alone.
    nodes[0].come_online(&[]);
    nodes[0].wait_for_complete_pass(0, TIMEOUT);
    assert_eq!(nodes[0].version_of(&file), FileVersion::init());

    // Node 2 comes online.
    let passes = nodes[0].passes().len();
    nodes[0].set_peers(&[node_id(2)]);
    nodes[0].wait_for_complete_pass(passes, TIMEOUT);
    assert_eq!(nodes[0].version_of(&file), FileVersion::new(1));
    assert_eq!(
        nodes[0].hash_file(&file).entries(),
        nodes[1].hash_file(&file).entries()
    );
}

#[test]
fn membership_transitions_test() {
    assert!(MembershipState::Unregistered.can_transition_to(MembershipState::Synchronizing));
    assert!(!MembershipState::Unregistered.can_transition_to(MembershipState::UpToDate));
    assert!(MembershipState::UpToDate.can_transition_to(MembershipState::Late));
    assert!(MembershipState::Late.can_transition_to(MembershipState::UpToDate));
    assert!(MembershipState::Late.can_transition_to(MembershipState::Unregistered));
    assert!(!MembershipState::Late.can_transition_to(MembershipState::Synchronizing));

    let up_to_date = Membership {
        state: MembershipState::UpToDate,
        peers: [node_id(2)].into(),
    };
    let more_peers = Membership {
        state: MembershipState::UpToDate,
        peers: [node_id(2), node_id(3)].into(),
    };
    let late = Membership {
        state: MembershipState::Late,
        peers: [node_id(2)].into(),
    };
    assert!(up_to_date.triggers_reconciliation(&more_peers));
    assert!(!more_peers.triggers_reconciliation(&up_to_date));
    assert!(late.triggers_reconciliation(&up_to_date));
    assert!(!up_to_date.triggers_reconciliation(&late));
}
