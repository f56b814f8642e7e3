/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and initialize a replica of a repository.
//!
//! A repository is replicated on several processes. In our terminology, these processes are called
//! 'nodes', and each node is uniquely identified by a [`NodeId`].
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the node](NodeSpec) with:
//!   1. `NodeSpec::builder` to construct a `NodeSpecBuilder`,
//!   2. The setters of the `NodeSpecBuilder`, and
//!   3. The `NodeSpecBuilder::build` method to construct a [`NodeSpec`],
//! - The function to [start](NodeSpec::start) a [`Node`] given its specification,
//! - The function to [initialize](Node::initialize) the node's [repository](crate::repository),
//! - [The type](Node) which keeps the node alive.
//!
//! ## Starting a node
//!
//! Here is an example that demonstrates how to build and start running a node using the builder pattern:
//!
//! ```ignore
//! Node::initialize(kv_store.clone(), &parameters, node_id)?;
//!
//! let mut node =
//!     NodeSpec::builder()
//!     .kv_store(kv_store)
//!     .network(network)
//!     .configuration(configuration)
//!     .on_reconcile_file(reconcile_file_handler)
//!     .build()
//!     .start()?;
//!
//! node.update_membership(MembershipState::Synchronizing, [])?;
//! node.update_membership(MembershipState::UpToDate, online_peers)?;
//! ```
//!
//! ### Required setters
//!
//! The required setters are for providing the trait implementations required to run a node:
//! - `.kv_store(...)`
//! - `.network(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from [crate::events]:
//! - `.on_created(...)`
//! - `.on_deleted(...)`
//! - `.on_changed(...)`
//! - `.on_seal_file(...)`
//! - `.on_start_reconciliation(...)`
//! - `.on_reconcile_file(...)`
//! - `.on_end_reconciliation(...)`
//! - `.on_receive_list_versions(...)`
//! - `.on_receive_fetch_file(...)`
//! - `.on_update_membership(...)`
//!
//! The node's [configuration](Configuration) can also be defined using the builder pattern, for example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .node_id(node_id)
//!     .list_versions_timeout(Duration::from_secs(3))
//!     .fetch_file_timeout(Duration::from_secs(10))
//!     .reconciliation_retry_interval(Duration::from_secs(30))
//!     .log_events(true)
//!     .build()
//! ```

use std::collections::BTreeSet;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use typed_builder::TypedBuilder;

use crate::event_bus::*;
use crate::events::*;
use crate::networking::{network::Network, receiving::start_polling};
use crate::reconciliation::{
    client::{ReconciliationClient, ReconciliationClientConfiguration},
    membership::{Membership, MembershipError, MembershipState},
    server::ReconciliationServer,
};
use crate::repository::{
    accessors::{
        internal::{Repository, RepositoryError},
        public::RepositoryCamera,
    },
    parameters::RepositoryParameters,
    pluggables::KVStore,
};
use crate::types::{data_types::NodeId, lineage::Snapshot};

/// Stores the user-defined parameters required to start the node, that is:
/// 1. The node's [id](NodeId). It must be the id the repository was [initialized](Node::initialize)
///    with.
/// 2. The list versions timeout: how long a reconciliation pass waits for peers to list their file
///    versions.
/// 3. The fetch file timeout: how long a reconciliation pass waits for a single peer to send a file.
/// 4. The reconciliation retry interval: how long to wait before repeating a pass that could not
///    finish, for example because a peer was unreachable.
/// 5. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Log Events
///
/// The node logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.node_id(...)`
    - `.list_versions_timeout(...)`
    - `.fetch_file_timeout(...)`
    - `.reconciliation_retry_interval(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the id of the local node. Required."))]
    pub node_id: NodeId,
    #[builder(setter(doc = "Set the timeout for collecting the peers' version lists. Required."))]
    pub list_versions_timeout: Duration,
    #[builder(setter(doc = "Set the timeout for receiving one file from one peer. Required."))]
    pub fetch_file_timeout: Duration,
    #[builder(setter(doc = "Set the time to wait before retrying an incomplete reconciliation pass. Required."))]
    pub reconciliation_retry_interval: Duration,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl From<&Configuration> for ReconciliationClientConfiguration {
    fn from(configuration: &Configuration) -> Self {
        ReconciliationClientConfiguration {
            list_versions_timeout: configuration.list_versions_timeout,
            fetch_file_timeout: configuration.fetch_file_timeout,
            retry_interval: configuration.reconciliation_retry_interval,
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [`Node`].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [NodeSpec]. On the builder call the following methods to construct a valid [NodeSpec].

    Required:
    - `.kv_store(...)`
    - `.network(...)`
    - `.configuration(...)`

    Optional:
    - `.on_created(...)`
    - `.on_deleted(...)`
    - `.on_changed(...)`
    - `.on_seal_file(...)`
    - `.on_start_reconciliation(...)`
    - `.on_reconcile_file(...)`
    - `.on_end_reconciliation(...)`
    - `.on_receive_list_versions(...)`
    - `.on_receive_fetch_file(...)`
    - `.on_update_membership(...)`
"))]
pub struct NodeSpec<K: KVStore, N: Network + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the implementation of the node's Key-Value store. The argument must implement the [KVStore](crate::repository::pluggables::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a node. Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&CreatedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CreatedEvent>),
    doc = "Register a handler closure to be invoked after a snapshot or device is created. Optional."))]
    on_created: Option<HandlerPtr<CreatedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DeletedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DeletedEvent>),
    doc = "Register a handler closure to be invoked after a snapshot or device is deleted. Optional."))]
    on_deleted: Option<HandlerPtr<DeletedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ChangedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ChangedEvent>),
    doc = "Register a handler closure to be invoked after a field of a snapshot or device changes. Optional."))]
    on_changed: Option<HandlerPtr<ChangedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SealFileEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SealFileEvent>),
    doc = "Register a handler closure to be invoked after a hash file is sealed. Optional."))]
    on_seal_file: Option<HandlerPtr<SealFileEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartReconciliationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartReconciliationEvent>),
    doc = "Register a handler closure to be invoked after the node starts a reconciliation pass. Optional."))]
    on_start_reconciliation: Option<HandlerPtr<StartReconciliationEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReconcileFileEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReconcileFileEvent>),
    doc = "Register a handler closure to be invoked after the node replaces a hash file with a newer copy from a peer. Optional."))]
    on_reconcile_file: Option<HandlerPtr<ReconcileFileEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndReconciliationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndReconciliationEvent>),
    doc = "Register a handler closure to be invoked after the node finishes a reconciliation pass. Optional."))]
    on_end_reconciliation: Option<HandlerPtr<EndReconciliationEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveListVersionsEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveListVersionsEvent>),
    doc = "Register a handler closure to be invoked after the node receives a request to list its file versions. Optional."))]
    on_receive_list_versions: Option<HandlerPtr<ReceiveListVersionsEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveFetchFileEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveFetchFileEvent>),
    doc = "Register a handler closure to be invoked after the node receives a request for a hash file. Optional."))]
    on_receive_fetch_file: Option<HandlerPtr<ReceiveFetchFileEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateMembershipEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateMembershipEvent>),
    doc = "Register a handler closure to be invoked after the node's membership state changes. Optional."))]
    on_update_membership: Option<HandlerPtr<UpdateMembershipEvent>>,
}

impl<K: KVStore, N: Network + 'static> NodeSpec<K, N> {
    /// Starts all threads and channels associated with running a node, and returns the handles to them
    /// in a [`Node`] struct.
    ///
    /// The repository in `kv_store` must have been [initialized](Node::initialize) with the node id in
    /// the configuration. Otherwise, this fails with
    /// [`NotInitialized`](RepositoryError::NotInitialized) or
    /// [`IllegalState`](RepositoryError::IllegalState), and no thread is started.
    pub fn start(self) -> Result<Node<K>, RepositoryError> {
        let mut repository = Repository::new(self.kv_store.clone());
        if repository.node_id()? != self.configuration.node_id {
            return Err(RepositoryError::IllegalState {
                reason: "the repository was initialized with a different node id",
            });
        }

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_created,
            self.on_deleted,
            self.on_changed,
            self.on_seal_file,
            self.on_start_reconciliation,
            self.on_reconcile_file,
            self.on_end_reconciliation,
            self.on_receive_list_versions,
            self.on_receive_fetch_file,
            self.on_update_membership,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };
        repository.set_event_publisher(event_publisher.clone());
        let repository = Arc::new(Mutex::new(repository));

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, requests, responses) =
            start_polling(self.network.clone(), poller_shutdown_receiver);

        let (server_shutdown, server_shutdown_receiver) = mpsc::channel();
        let server = ReconciliationServer::new(
            RepositoryCamera::new(self.kv_store.clone()),
            requests,
            self.network.clone(),
            server_shutdown_receiver,
            event_publisher.clone(),
        )
        .start();

        let (membership_updates, membership_updates_receiver) = mpsc::channel();
        let (client_shutdown, client_shutdown_receiver) = mpsc::channel();
        let client = ReconciliationClient::new(
            (&self.configuration).into(),
            repository.clone(),
            RepositoryCamera::new(self.kv_store.clone()),
            responses,
            self.network,
            membership_updates_receiver,
            client_shutdown_receiver,
            event_publisher.clone(),
        )
        .start();

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
                let event_bus =
                    start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
                (Some(event_bus), Some(event_bus_shutdown))
            }
            None => (None, None),
        };

        Ok(Node {
            node_id: self.configuration.node_id,
            repository,
            repository_camera: RepositoryCamera::new(self.kv_store),
            membership: Membership::new(),
            membership_updates,
            event_publisher,
            poller: Some(poller),
            poller_shutdown,
            client: Some(client),
            client_shutdown,
            server: Some(server),
            server_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// A handle to the background threads of a running node. When this value is dropped, all background
/// threads are gracefully shut down.
pub struct Node<K: KVStore> {
    node_id: NodeId,
    repository: Arc<Mutex<Repository<K>>>,
    repository_camera: RepositoryCamera<K>,
    membership: Membership,
    membership_updates: Sender<Membership>,
    event_publisher: Option<Sender<Event>>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    client: Option<JoinHandle<()>>,
    client_shutdown: Sender<()>,
    server: Option<JoinHandle<()>>,
    server_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore> Node<K> {
    /// Initializes the repository in `kv_store` with `parameters`, as replica `node_id`. Returns the
    /// root snapshot.
    ///
    /// Every node of a repository must be initialized with the same `parameters`.
    pub fn initialize(
        kv_store: K,
        parameters: &RepositoryParameters,
        node_id: NodeId,
    ) -> Result<Snapshot, RepositoryError> {
        let mut repository = Repository::new(kv_store);
        repository.initialize(parameters, node_id)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Lock the [`Repository`] for reading and writing.
    ///
    /// Every mutation of the repository goes through this lock, including the ones made by
    /// reconciliation. Hold it only as long as needed, and use a [camera](Self::repository_camera)
    /// for reads that do not have to be followed by a write.
    pub fn repository(&self) -> MutexGuard<'_, Repository<K>> {
        self.repository
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a [`RepositoryCamera`] which can be used to peek into the repository without taking the
    /// mutation lock.
    pub fn repository_camera(&self) -> &RepositoryCamera<K> {
        &self.repository_camera
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Inform the node of its new membership `state` and of the `peers` that are online.
    ///
    /// `peers` may include the local node, which is ignored. Entering
    /// [`UpToDate`](MembershipState::UpToDate), or a new peer coming online while up to date, starts a
    /// reconciliation pass.
    pub fn update_membership(
        &mut self,
        state: MembershipState,
        peers: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), MembershipError> {
        let old = self.membership.state;
        if !old.can_transition_to(state) {
            return Err(MembershipError::InvalidTransition {
                from: old,
                to: state,
            });
        }

        let peers: BTreeSet<NodeId> = peers
            .into_iter()
            .filter(|peer| *peer != self.node_id)
            .collect();
        let update = Membership { state, peers };
        self.membership_updates
            .send(update.clone())
            .map_err(|_| MembershipError::NodeStopped)?;
        self.membership = update;

        if old != state {
            Event::publish(
                &self.event_publisher,
                Event::UpdateMembership(UpdateMembershipEvent {
                    timestamp: SystemTime::now(),
                    old,
                    new: state,
                }),
            );
        }

        Ok(())
    }
}

impl<K: KVStore> Drop for Node<K> {
    fn drop(&mut self) {
        // The order of thread shutdown in this function is important. The client and server threads
        // receive messages from the poller, and assume that the poller lives longer than them.

        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }

        let _ = self.client_shutdown.send(());
        if let Some(client) = self.client.take() {
            let _ = client.join();
        }

        let _ = self.server_shutdown.send(());
        if let Some(server) = self.server.take() {
            let _ = server.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}
