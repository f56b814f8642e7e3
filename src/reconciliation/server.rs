/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implements the [`ReconciliationServer`], the half of the reconciliation protocol that answers
//! peers' questions about the local replica.
//!
//! The server answers two kinds of request:
//! 1. [`ListVersionsRequest`]: with a [`FileVersionReport`](crate::types::lineage::FileVersionReport)
//!    for every hash file the replica holds.
//! 2. [`FetchFileRequest`]: with the complete hash file (header and mapping), or with `None` if the
//!    replica does not hold it.
//!
//! The server reads through a [`RepositoryCamera`], so it never waits for the mutation lock. Every
//! answer is read from a single view, so a fetched file is never a mix of two versions.
//!
//! Requests about a repository other than the local one are ignored.
//!
//! The client side of this protocol is explained [here](crate::reconciliation::client).

use std::{
    sync::mpsc::{Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::SystemTime,
};

use crate::{
    events::{Event, ReceiveFetchFileEvent, ReceiveListVersionsEvent},
    networking::{
        network::Network,
        receiving::{ReconciliationRequestReceiveError, ReconciliationServerStub},
        sending::SenderHandle,
    },
    repository::{
        accessors::{internal::RepositoryError, public::RepositoryCamera},
        pluggables::KVStore,
    },
    types::data_types::NodeId,
};

use super::messages::{
    FetchFileRequest, FetchFileResponse, ListVersionsRequest, ListVersionsResponse,
    ReconciliationRequest,
};

pub(crate) struct ReconciliationServer<N: Network + 'static, K: KVStore> {
    repository_camera: RepositoryCamera<K>,
    receiver: ReconciliationServerStub,
    sender: SenderHandle<N>,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network + 'static, K: KVStore> ReconciliationServer<N, K> {
    pub(crate) fn new(
        repository_camera: RepositoryCamera<K>,
        requests: Receiver<(NodeId, ReconciliationRequest)>,
        network: N,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            repository_camera,
            receiver: ReconciliationServerStub::new(requests),
            sender: SenderHandle::new(network),
            shutdown_signal,
            event_publisher,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => (),
            }

            match self.receiver.recv_request() {
                Ok((origin, request)) => {
                    if let Err(err) = self.on_receive_request(origin, request) {
                        log::warn!(
                            "Failed to answer a reconciliation request from {}: {}",
                            origin,
                            err
                        );
                    }
                }
                Err(ReconciliationRequestReceiveError::NotAvailable) => thread::yield_now(),
                Err(ReconciliationRequestReceiveError::Disconnected) => return,
            }
        })
    }

    fn on_receive_request(
        &mut self,
        origin: NodeId,
        request: ReconciliationRequest,
    ) -> Result<(), RepositoryError> {
        let view = self.repository_camera.view();
        let repository = view.repository_id()?;

        match request {
            ReconciliationRequest::ListVersions(ListVersionsRequest {
                repository: requested,
            }) => {
                if requested != repository {
                    return Ok(());
                }

                Event::publish(
                    &self.event_publisher,
                    Event::ReceiveListVersions(ReceiveListVersionsEvent {
                        timestamp: SystemTime::now(),
                        origin,
                    }),
                );

                let reports = view.file_versions()?;
                self.sender.send(
                    origin,
                    ListVersionsResponse {
                        repository,
                        reports,
                    },
                );
            }

            ReconciliationRequest::FetchFile(FetchFileRequest {
                repository: requested,
                file,
            }) => {
                if requested != repository {
                    return Ok(());
                }

                Event::publish(
                    &self.event_publisher,
                    Event::ReceiveFetchFile(ReceiveFetchFileEvent {
                        timestamp: SystemTime::now(),
                        origin,
                        file,
                    }),
                );

                let hash_file = if view.contains_file(&file)? {
                    Some(view.hash_file(&file)?)
                } else {
                    None
                };
                self.sender.send(
                    origin,
                    FetchFileResponse {
                        repository,
                        file,
                        hash_file,
                    },
                );
            }
        }

        Ok(())
    }
}
