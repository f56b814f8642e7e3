use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use lineage_rs::{
    events::{EndReconciliationEvent, ReconcileFileEvent, SealFileEvent},
    node::{Configuration, Node, NodeSpec},
    reconciliation::membership::MembershipState,
    repository::accessors::internal::Repository,
    types::{
        data_types::{FileId, FileVersion, NodeId},
        hash_file::HashFile,
        lineage::Snapshot,
    },
};

use super::{
    fixtures::parameters,
    logging::{first_seven_base64_chars, log_with_context},
    mem_db::MemDB,
    network::NetworkStub,
};

/// Things the test nodes will have in common:
/// - Repository parameters.
/// - Configuration (apart from the node id).
///
/// Things that they will differ in:
/// - Node id.
/// - Network instance.
/// - KVStore.
pub(crate) struct TestNode {
    node: Node<MemDB>,
    root: Snapshot,
    network: NetworkStub,
    reconciled: Arc<Mutex<Vec<ReconcileFileEvent>>>,
    passes: Arc<Mutex<Vec<EndReconciliationEvent>>>,
    sealed: Arc<Mutex<Vec<SealFileEvent>>>,
}

impl TestNode {
    pub(crate) fn new(node_id: NodeId, network: NetworkStub) -> TestNode {
        let kv_store = MemDB::new();
        let root = Node::initialize(kv_store.clone(), &parameters(), node_id).unwrap();

        let reconciled = Arc::new(Mutex::new(Vec::new()));
        let passes = Arc::new(Mutex::new(Vec::new()));
        let sealed = Arc::new(Mutex::new(Vec::new()));

        let configuration = Configuration::builder()
            .node_id(node_id)
            .list_versions_timeout(Duration::from_millis(300))
            .fetch_file_timeout(Duration::from_millis(300))
            .reconciliation_retry_interval(Duration::from_millis(200))
            .log_events(false)
            .build();

        let node = NodeSpec::builder()
            .kv_store(kv_store)
            .network(network.clone())
            .configuration(configuration)
            .on_reconcile_file(reconcile_file_handler(node_id, reconciled.clone()))
            .on_end_reconciliation(end_reconciliation_handler(node_id, passes.clone()))
            .on_seal_file(seal_file_handler(sealed.clone()))
            .build()
            .start()
            .unwrap();

        TestNode {
            node,
            root,
            network,
            reconciled,
            passes,
            sealed,
        }
    }

    pub(crate) fn node_id(&self) -> NodeId {
        self.node.node_id()
    }

    pub(crate) fn root(&self) -> &Snapshot {
        &self.root
    }

    pub(crate) fn network(&self) -> &NetworkStub {
        &self.network
    }

    pub(crate) fn repository(&self) -> MutexGuard<'_, Repository<MemDB>> {
        self.node.repository()
    }

    /// Join the quorum and go straight to up to date with `peers` online.
    pub(crate) fn come_online(&mut self, peers: &[NodeId]) {
        self.node
            .update_membership(MembershipState::Synchronizing, [])
            .unwrap();
        self.node
            .update_membership(MembershipState::UpToDate, peers.iter().copied())
            .unwrap();
    }

    pub(crate) fn set_peers(&mut self, peers: &[NodeId]) {
        self.node
            .update_membership(MembershipState::UpToDate, peers.iter().copied())
            .unwrap();
    }

    pub(crate) fn version_of(&self, file: &FileId) -> FileVersion {
        self.node
            .repository_camera()
            .view()
            .header(file)
            .unwrap()
            .version
    }

    pub(crate) fn hash_file(&self, file: &FileId) -> HashFile {
        self.node.repository_camera().view().hash_file(file).unwrap()
    }

    pub(crate) fn is_writable(&self, file: &FileId) -> bool {
        self.node
            .repository_camera()
            .view()
            .header(file)
            .unwrap()
            .writable
    }

    pub(crate) fn reconciled_files(&self) -> Vec<ReconcileFileEvent> {
        self.reconciled.lock().unwrap().clone()
    }

    pub(crate) fn passes(&self) -> Vec<EndReconciliationEvent> {
        self.passes.lock().unwrap().clone()
    }

    pub(crate) fn sealed_files(&self) -> Vec<SealFileEvent> {
        self.sealed.lock().unwrap().clone()
    }

    /// Poll until a reconciliation pass that began after `since` completes, or panic after `timeout`.
    pub(crate) fn wait_for_complete_pass(&self, since: usize, timeout: Duration) {
        wait_until(timeout, || {
            self.passes
                .lock()
                .unwrap()
                .iter()
                .skip(since)
                .any(|pass| pass.complete)
        });
    }
}

/// Poll `condition` until it holds, or panic after `timeout`.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            panic!("Condition did not hold within {:?}", timeout);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn reconcile_file_handler(
    node_id: NodeId,
    reconciled: Arc<Mutex<Vec<ReconcileFileEvent>>>,
) -> impl Fn(&ReconcileFileEvent) + Send + 'static {
    move |reconcile_file_event| {
        log_with_context(
            Some(node_id),
            &format!(
                "Reconciled File, file: {}, source: {}, version: {} -> {}",
                first_seven_base64_chars(&reconcile_file_event.file.bytes()),
                first_seven_base64_chars(&reconcile_file_event.source.bytes()),
                reconcile_file_event.old_version,
                reconcile_file_event.new_version,
            ),
        );
        reconciled
            .lock()
            .unwrap()
            .push(reconcile_file_event.clone());
    }
}

fn end_reconciliation_handler(
    node_id: NodeId,
    passes: Arc<Mutex<Vec<EndReconciliationEvent>>>,
) -> impl Fn(&EndReconciliationEvent) + Send + 'static {
    move |end_reconciliation_event| {
        log_with_context(
            Some(node_id),
            &format!(
                "Ended Reconciliation, files reconciled: {}, files sealed: {}, complete: {}",
                end_reconciliation_event.files_reconciled,
                end_reconciliation_event.files_sealed,
                end_reconciliation_event.complete,
            ),
        );
        passes.lock().unwrap().push(end_reconciliation_event.clone());
    }
}

fn seal_file_handler(
    sealed: Arc<Mutex<Vec<SealFileEvent>>>,
) -> impl Fn(&SealFileEvent) + Send + 'static {
    move |seal_file_event| sealed.lock().unwrap().push(seal_file_event.clone())
}
