//! Exhaustive enumeration of every message variant that travels between replicas.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::reconciliation::messages::{
    FetchFileRequest, FetchFileResponse, ListVersionsRequest, ListVersionsResponse,
    ReconciliationRequest, ReconciliationResponse,
};

/// All message variants used by the repository.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    /// Handled by the [reconciliation server](crate::reconciliation::server).
    ReconciliationRequest(ReconciliationRequest),

    /// Handled by the [reconciliation driver](crate::reconciliation::client).
    ReconciliationResponse(ReconciliationResponse),
}

impl From<ListVersionsRequest> for Message {
    fn from(value: ListVersionsRequest) -> Self {
        Message::ReconciliationRequest(ReconciliationRequest::ListVersions(value))
    }
}

impl From<FetchFileRequest> for Message {
    fn from(value: FetchFileRequest) -> Self {
        Message::ReconciliationRequest(ReconciliationRequest::FetchFile(value))
    }
}

impl From<ListVersionsResponse> for Message {
    fn from(value: ListVersionsResponse) -> Self {
        Message::ReconciliationResponse(ReconciliationResponse::ListVersions(value))
    }
}

impl From<FetchFileResponse> for Message {
    fn from(value: FetchFileResponse) -> Self {
        Message::ReconciliationResponse(ReconciliationResponse::FetchFile(value))
    }
}
