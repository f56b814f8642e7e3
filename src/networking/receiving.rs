//! Functions and types for receiving messages from the P2P network.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Instant,
};

use crate::{
    reconciliation::messages::{
        FetchFileResponse, ReconciliationRequest, ReconciliationResponse,
    },
    types::{
        data_types::{EntityId, FileId, NodeId},
        lineage::FileVersionReport,
    },
};

use super::{messages::Message, network::Network};

/// Spawn the poller thread, which polls the [`Network`] for messages and distributes them into receiver
/// handles.
///
/// The kinds of messages that the poller polls are:
/// 1. Reconciliation requests (processed by
///    [`ReconciliationServer`](crate::reconciliation::server::ReconciliationServer)), and
/// 2. Reconciliation responses (processed by
///    [`ReconciliationClient`](crate::reconciliation::client::ReconciliationClient)).
pub(crate) fn start_polling<N: Network + 'static>(
    mut network: N,
    shutdown_signal: Receiver<()>,
) -> (
    JoinHandle<()>,
    Receiver<(NodeId, ReconciliationRequest)>,
    Receiver<(NodeId, ReconciliationResponse)>,
) {
    let (to_request_receiver, request_receiver) = mpsc::channel();
    let (to_response_receiver, response_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        if let Some((origin, msg)) = network.recv() {
            match msg {
                Message::ReconciliationRequest(request) => {
                    let _ = to_request_receiver.send((origin, request));
                }
                Message::ReconciliationResponse(response) => {
                    let _ = to_response_receiver.send((origin, response));
                }
            }
        } else {
            thread::yield_now()
        }
    });

    (poller_thread, request_receiver, response_receiver)
}

/// A receiving end for reconciliation responses.
///
/// Responses that do not match what the caller is currently waiting for (for example, a late answer
/// to a request that already timed out) are discarded.
pub(crate) struct ReconciliationClientStub {
    responses: Receiver<(NodeId, ReconciliationResponse)>,
}

impl ReconciliationClientStub {
    pub(crate) fn new(
        responses: Receiver<(NodeId, ReconciliationResponse)>,
    ) -> ReconciliationClientStub {
        ReconciliationClientStub { responses }
    }

    /// Discard every response that has already arrived.
    pub(crate) fn discard_pending(&self) -> Result<(), ReconciliationResponseReceiveError> {
        loop {
            match self.responses.try_recv() {
                Ok(_) => (),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(ReconciliationResponseReceiveError::Disconnected)
                }
            }
        }
    }

    /// Collect the version lists of `peers` for `repository`, until every peer has answered or the
    /// deadline is reached.
    ///
    /// Reaching the deadline is not an error: the lists received so far are returned, and the peers
    /// missing from the returned map are the ones that did not answer in time.
    pub(crate) fn recv_version_lists(
        &self,
        peers: &BTreeSet<NodeId>,
        repository: &EntityId,
        deadline: Instant,
    ) -> Result<BTreeMap<NodeId, Vec<FileVersionReport>>, ReconciliationResponseReceiveError> {
        let mut lists = BTreeMap::new();
        while lists.len() < peers.len() && Instant::now() < deadline {
            match self.responses.recv_timeout(deadline - Instant::now()) {
                Ok((sender, ReconciliationResponse::ListVersions(response))) => {
                    if peers.contains(&sender) && response.repository == *repository {
                        lists.insert(sender, response.reports);
                    }
                }
                Ok(_) => (),
                Err(RecvTimeoutError::Timeout) => thread::yield_now(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ReconciliationResponseReceiveError::Disconnected)
                }
            }
        }

        Ok(lists)
    }

    /// Receive the [`FetchFileResponse`] for `file` from `peer`. Waits for the response until the
    /// deadline is reached, and if no response is received it returns
    /// [`ReconciliationResponseReceiveError::Timeout`].
    pub(crate) fn recv_file(
        &self,
        peer: NodeId,
        repository: &EntityId,
        file: &FileId,
        deadline: Instant,
    ) -> Result<FetchFileResponse, ReconciliationResponseReceiveError> {
        while Instant::now() < deadline {
            match self.responses.recv_timeout(deadline - Instant::now()) {
                Ok((sender, ReconciliationResponse::FetchFile(response))) => {
                    if sender == peer
                        && response.repository == *repository
                        && response.file == *file
                    {
                        return Ok(response);
                    }
                }
                Ok(_) => (),
                Err(RecvTimeoutError::Timeout) => thread::yield_now(),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ReconciliationResponseReceiveError::Disconnected)
                }
            }
        }

        Err(ReconciliationResponseReceiveError::Timeout)
    }
}

#[derive(Debug)]
pub enum ReconciliationResponseReceiveError {
    Disconnected,
    Timeout,
}

/// A receiving end for reconciliation requests. The [`ReconciliationServerStub::recv_request`] method
/// returns the received request.
pub(crate) struct ReconciliationServerStub {
    requests: Receiver<(NodeId, ReconciliationRequest)>,
}

impl ReconciliationServerStub {
    pub(crate) fn new(
        requests: Receiver<(NodeId, ReconciliationRequest)>,
    ) -> ReconciliationServerStub {
        ReconciliationServerStub { requests }
    }

    /// Receive a [`ReconciliationRequest`] if available, else return
    /// [`ReconciliationRequestReceiveError::NotAvailable`].
    pub(crate) fn recv_request(
        &self,
    ) -> Result<(NodeId, ReconciliationRequest), ReconciliationRequestReceiveError> {
        match self.requests.try_recv() {
            Ok((origin, request)) => Ok((origin, request)),
            // The poller shuts down after the server, so this only happens if the poller panicked.
            Err(TryRecvError::Disconnected) => Err(ReconciliationRequestReceiveError::Disconnected),
            Err(TryRecvError::Empty) => Err(ReconciliationRequestReceiveError::NotAvailable),
        }
    }
}

#[derive(Debug)]
pub enum ReconciliationRequestReceiveError {
    Disconnected,
    NotAvailable,
}
