/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas as part of the reconciliation
//! protocol.
//!
//! Every message carries the id of the repository it is about, so that nodes that serve more than
//! one repository over the same network can tell them apart.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    data_types::{EntityId, FileId},
    hash_file::HashFile,
    lineage::FileVersionReport,
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ReconciliationRequest {
    ListVersions(ListVersionsRequest),
    FetchFile(FetchFileRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ReconciliationResponse {
    ListVersions(ListVersionsResponse),
    FetchFile(FetchFileResponse),
}

/// "List your file versions."
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ListVersionsRequest {
    pub repository: EntityId,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ListVersionsResponse {
    pub repository: EntityId,
    /// One report per hash file held by the responder, sealed or not.
    pub reports: Vec<FileVersionReport>,
}

/// "Send me the full mapping of `file`."
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FetchFileRequest {
    pub repository: EntityId,
    pub file: FileId,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FetchFileResponse {
    pub repository: EntityId,
    pub file: FileId,
    /// `None` if the responder does not hold `file`.
    pub hash_file: Option<HashFile>,
}
