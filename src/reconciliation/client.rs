//! Implements the [`ReconciliationClient`], the thread that drives reconciliation passes.
//!
//! ## When passes run
//!
//! The client watches the replica's [membership](super::membership). A pass starts when the replica
//! enters [`UpToDate`](MembershipState::UpToDate), or when it is up to date and a new peer comes
//! online. A pass that could not finish everything it planned (a peer did not answer, or no source
//! could deliver a file) is repeated after the configured retry interval, for as long as the replica
//! stays up to date.
//!
//! ## A single pass
//!
//! 1. Send a [`ListVersionsRequest`] to every online peer, and collect the answers until all peers
//!    have answered or the list versions timeout elapses.
//! 2. Compute a [`Plan`](super::plan::Plan) from the local reports and the answers.
//! 3. Log every file reported by a peer but missing from the local lineage. These are skipped: they
//!    point at a create or delete that this replica missed, which reconciliation does not repair.
//! 4. Fetch every planned file from its sources, best first, and apply the first copy that is newer
//!    than the local one. Each file is applied in one write under the repository lock.
//! 5. If every online peer answered in step 1, seal the planned abandoned files. With only part of
//!    the answers, the replica cannot know that nobody still writes to a file, so sealing waits.
//!    A file whose fetch did not reach the newest version is not sealed either, so that the sealed
//!    copy is always the newest one.
//!
//! The client checks for the shutdown signal between files, so a node that is stopping never leaves
//! a file half updated.

use std::{
    collections::BTreeSet,
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    events::{EndReconciliationEvent, Event, ReconcileFileEvent, StartReconciliationEvent},
    networking::{
        network::Network,
        receiving::{ReconciliationClientStub, ReconciliationResponseReceiveError},
        sending::SenderHandle,
    },
    repository::{
        accessors::{
            internal::{Repository, RepositoryError},
            public::RepositoryCamera,
        },
        pluggables::KVStore,
    },
    types::data_types::{EntityId, NodeId},
};

use super::{
    membership::{Membership, MembershipState},
    messages::{FetchFileRequest, ListVersionsRequest, ReconciliationResponse},
    plan::{plan_reconciliation, Fetch},
};

/// Immutable parameters that define the behaviour of the [`ReconciliationClient`].
pub(crate) struct ReconciliationClientConfiguration {
    pub(crate) list_versions_timeout: Duration,
    pub(crate) fetch_file_timeout: Duration,
    pub(crate) retry_interval: Duration,
}

pub(crate) struct ReconciliationClient<N: Network + 'static, K: KVStore> {
    config: ReconciliationClientConfiguration,
    repository: Arc<Mutex<Repository<K>>>,
    repository_camera: RepositoryCamera<K>,
    receiver: ReconciliationClientStub,
    sender: SenderHandle<N>,
    membership: Membership,
    membership_updates: Receiver<Membership>,
    next_pass: Option<Instant>,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
}

/// How a pass ended.
enum PassOutcome {
    Complete,
    Incomplete,
    Stopped,
}

impl<N: Network + 'static, K: KVStore> ReconciliationClient<N, K> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: ReconciliationClientConfiguration,
        repository: Arc<Mutex<Repository<K>>>,
        repository_camera: RepositoryCamera<K>,
        responses: Receiver<(NodeId, ReconciliationResponse)>,
        network: N,
        membership_updates: Receiver<Membership>,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            repository,
            repository_camera,
            receiver: ReconciliationClientStub::new(responses),
            sender: SenderHandle::new(network),
            membership: Membership::new(),
            membership_updates,
            next_pass: None,
            shutdown_signal,
            event_publisher,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            if self.should_stop() {
                return;
            }

            match self.membership_updates.recv_timeout(Duration::from_millis(10)) {
                Ok(update) => self.on_membership_update(update),
                Err(RecvTimeoutError::Timeout) => (),
                // The node drops this channel only while shutting down.
                Err(RecvTimeoutError::Disconnected) => return,
            }

            let due = matches!(self.next_pass, Some(at) if Instant::now() >= at);
            if !due || self.membership.state != MembershipState::UpToDate {
                continue;
            }

            match self.reconcile() {
                Ok(PassOutcome::Complete) => self.next_pass = None,
                Ok(PassOutcome::Incomplete) => {
                    self.next_pass = Some(Instant::now() + self.config.retry_interval)
                }
                Ok(PassOutcome::Stopped) => return,
                Err(err) => {
                    log::warn!("Reconciliation pass failed: {}", err);
                    self.next_pass = Some(Instant::now() + self.config.retry_interval)
                }
            }
        })
    }

    fn should_stop(&self) -> bool {
        match self.shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }

    fn on_membership_update(&mut self, update: Membership) {
        if self.membership.triggers_reconciliation(&update) {
            self.next_pass = Some(Instant::now());
        } else if update.state != MembershipState::UpToDate {
            self.next_pass = None;
        }
        self.membership = update;
    }

    fn lock_repository(&self) -> MutexGuard<'_, Repository<K>> {
        self.repository
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one reconciliation pass against the currently online peers.
    fn reconcile(&mut self) -> Result<PassOutcome, RepositoryError> {
        let peers = self.membership.peers.clone();
        let repository = self.repository_camera.view().repository_id()?;

        Event::publish(
            &self.event_publisher,
            Event::StartReconciliation(StartReconciliationEvent {
                timestamp: SystemTime::now(),
                peers: peers.iter().copied().collect(),
            }),
        );

        // 1. Collect the peers' version lists.
        if self.receiver.discard_pending().is_err() {
            return Ok(PassOutcome::Stopped);
        }
        for peer in &peers {
            self.sender.send(*peer, ListVersionsRequest { repository });
        }
        let deadline = Instant::now() + self.config.list_versions_timeout;
        let lists = match self.receiver.recv_version_lists(&peers, &repository, deadline) {
            Ok(lists) => lists,
            Err(ReconciliationResponseReceiveError::Disconnected) => {
                return Ok(PassOutcome::Stopped)
            }
            Err(ReconciliationResponseReceiveError::Timeout) => Default::default(),
        };
        let all_answered = lists.len() == peers.len();
        for peer in peers.iter().filter(|peer| !lists.contains_key(peer)) {
            log::warn!("Peer {} did not list its versions in time", peer);
        }

        // 2. Plan.
        let plan = {
            let view = self.repository_camera.view();
            plan_reconciliation(&view.file_versions()?, &view.designated_files()?, &lists)
        };

        // 3. Topology errors.
        for missing in &plan.missing {
            let err = RepositoryError::MissingFileInLineage {
                file: missing.file,
                reported_by: missing.reported_by,
            };
            log::warn!("Skipping file during reconciliation: {}", err);
        }

        // 4. Fetch newer versions.
        let mut complete = all_answered;
        let mut files_reconciled = 0;
        let mut behind = BTreeSet::new();
        for fetch in &plan.fetches {
            if self.should_stop() {
                return Ok(PassOutcome::Stopped);
            }
            match self.fetch_file(&repository, fetch) {
                FetchOutcome::Reached => files_reconciled += 1,
                FetchOutcome::Partial => {
                    files_reconciled += 1;
                    complete = false;
                    behind.insert(fetch.file);
                }
                FetchOutcome::Failed => {
                    complete = false;
                    behind.insert(fetch.file);
                }
                FetchOutcome::Stopped => return Ok(PassOutcome::Stopped),
            }
        }

        // 5. Seal abandoned files. A file still behind its peers is sealed by a later pass.
        let mut files_sealed = 0;
        if all_answered {
            for file in plan.seals.iter().filter(|file| !behind.contains(*file)) {
                if self.lock_repository().seal_abandoned_file(file)? {
                    files_sealed += 1;
                }
            }
        } else if !plan.seals.is_empty() {
            log::debug!(
                "Not sealing {} abandoned files until every peer answers",
                plan.seals.len()
            );
        }

        Event::publish(
            &self.event_publisher,
            Event::EndReconciliation(EndReconciliationEvent {
                timestamp: SystemTime::now(),
                files_reconciled,
                files_sealed,
                complete,
            }),
        );

        if complete {
            Ok(PassOutcome::Complete)
        } else {
            Ok(PassOutcome::Incomplete)
        }
    }

    /// Fetch `fetch.file` from its sources, best first, and apply the first copy that is newer than the
    /// local one.
    fn fetch_file(&mut self, repository: &EntityId, fetch: &Fetch) -> FetchOutcome {
        for source in &fetch.sources {
            self.sender.send(
                *source,
                FetchFileRequest {
                    repository: *repository,
                    file: fetch.file,
                },
            );
            let deadline = Instant::now() + self.config.fetch_file_timeout;
            let response = match self
                .receiver
                .recv_file(*source, repository, &fetch.file, deadline)
            {
                Ok(response) => response,
                Err(ReconciliationResponseReceiveError::Timeout) => {
                    log::warn!("Timed out fetching file {} from {}", fetch.file, source);
                    continue;
                }
                Err(ReconciliationResponseReceiveError::Disconnected) => {
                    return FetchOutcome::Stopped
                }
            };

            let Some(hash_file) = response.hash_file else {
                log::warn!("Peer {} no longer holds file {}", source, fetch.file);
                continue;
            };
            if hash_file.file_id() != fetch.file || hash_file.header.version <= fetch.local_version {
                continue;
            }

            let new_version = hash_file.header.version;
            let applied = self.lock_repository().apply_reconciled_file(hash_file);
            match applied {
                Ok(Some(old_version)) => {
                    Event::publish(
                        &self.event_publisher,
                        Event::ReconcileFile(ReconcileFileEvent {
                            timestamp: SystemTime::now(),
                            file: fetch.file,
                            source: *source,
                            old_version,
                            new_version,
                        }),
                    );
                    return if new_version >= fetch.target_version {
                        FetchOutcome::Reached
                    } else {
                        FetchOutcome::Partial
                    };
                }
                // The local copy caught up on its own in the meantime.
                Ok(None) => return FetchOutcome::Reached,
                Err(err) => {
                    log::warn!(
                        "Rejected file {} fetched from {}: {}",
                        fetch.file,
                        source,
                        err
                    );
                }
            }
        }

        FetchOutcome::Failed
    }
}

enum FetchOutcome {
    /// The local copy is at least at the target version.
    Reached,
    /// The local copy was updated, but to a version below the target.
    Partial,
    /// No source delivered a usable copy.
    Failed,
    Stopped,
}
