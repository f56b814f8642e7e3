/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the node's
//! [configuration](crate::node::Configuration).
//!
//! The repository logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReconcileFile](crate::events::ReconcileFileEvent) is printed:
//!
//! ```text
//! ReconcileFile, 1701329264, Id5u7f6, fNGCJyk, 3, 7
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the id of the file.
//! - The fourth value is the first seven characters of the Base64 encoding of the id of the node the
//!   file was fetched from.
//! - The fifth and sixth values are the local version of the file before and after the update.

use crate::events::*;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const CREATED: &str = "Created";
pub const DELETED: &str = "Deleted";
pub const CHANGED: &str = "Changed";
pub const SEAL_FILE: &str = "SealFile";

pub const START_RECONCILIATION: &str = "StartReconciliation";
pub const RECONCILE_FILE: &str = "ReconcileFile";
pub const END_RECONCILIATION: &str = "EndReconciliation";
pub const RECEIVE_LIST_VERSIONS: &str = "ReceiveListVersions";
pub const RECEIVE_FETCH_FILE: &str = "ReceiveFetchFile";
pub const UPDATE_MEMBERSHIP: &str = "UpdateMembership";

pub(crate) trait Logger {
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for CreatedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |created_event: &CreatedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                CREATED,
                secs_since_unix_epoch(created_event.timestamp),
                entity_kind(&created_event.entity),
                first_seven_base64_chars(&created_event.entity.uuid().bytes()),
                first_seven_base64_chars(&created_event.file.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for DeletedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |deleted_event: &DeletedEvent| {
            log::info!(
                "{}, {}, {}, {}",
                DELETED,
                secs_since_unix_epoch(deleted_event.timestamp),
                entity_kind(&deleted_event.entity),
                first_seven_base64_chars(&deleted_event.entity.uuid().bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ChangedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |changed_event: &ChangedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                CHANGED,
                secs_since_unix_epoch(changed_event.timestamp),
                entity_kind(&changed_event.entity),
                first_seven_base64_chars(&changed_event.entity.uuid().bytes()),
                field_name(&changed_event.field),
                field_value(&changed_event.old),
                field_value(&changed_event.new)
            )
        };
        Box::new(logger)
    }
}

impl Logger for SealFileEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |seal_file_event: &SealFileEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SEAL_FILE,
                secs_since_unix_epoch(seal_file_event.timestamp),
                first_seven_base64_chars(&seal_file_event.file.bytes()),
                seal_file_event.version
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartReconciliationEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_reconciliation_event: &StartReconciliationEvent| {
            log::info!(
                "{}, {}, {}",
                START_RECONCILIATION,
                secs_since_unix_epoch(start_reconciliation_event.timestamp),
                start_reconciliation_event.peers.len()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReconcileFileEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reconcile_file_event: &ReconcileFileEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECONCILE_FILE,
                secs_since_unix_epoch(reconcile_file_event.timestamp),
                first_seven_base64_chars(&reconcile_file_event.file.bytes()),
                first_seven_base64_chars(&reconcile_file_event.source.bytes()),
                reconcile_file_event.old_version,
                reconcile_file_event.new_version
            )
        };
        Box::new(logger)
    }
}

impl Logger for EndReconciliationEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |end_reconciliation_event: &EndReconciliationEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                END_RECONCILIATION,
                secs_since_unix_epoch(end_reconciliation_event.timestamp),
                end_reconciliation_event.files_reconciled,
                end_reconciliation_event.files_sealed,
                end_reconciliation_event.complete
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveListVersionsEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_list_versions_event: &ReceiveListVersionsEvent| {
            log::info!(
                "{}, {}, {}",
                RECEIVE_LIST_VERSIONS,
                secs_since_unix_epoch(receive_list_versions_event.timestamp),
                first_seven_base64_chars(&receive_list_versions_event.origin.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveFetchFileEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_fetch_file_event: &ReceiveFetchFileEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_FETCH_FILE,
                secs_since_unix_epoch(receive_fetch_file_event.timestamp),
                first_seven_base64_chars(&receive_fetch_file_event.origin.bytes()),
                first_seven_base64_chars(&receive_fetch_file_event.file.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateMembershipEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_membership_event: &UpdateMembershipEvent| {
            log::info!(
                "{}, {}, {:?}, {:?}",
                UPDATE_MEMBERSHIP,
                secs_since_unix_epoch(update_membership_event.timestamp),
                update_membership_event.old,
                update_membership_event.new
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Events emitted before the Unix Epoch are printed at 0.
fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn entity_kind(entity: &EntityRef) -> &'static str {
    match entity {
        EntityRef::Snapshot(_) => "Snapshot",
        EntityRef::Device(_) => "Device",
    }
}

fn field_name(field: &Field) -> String {
    match field {
        Field::Size => String::from("Size"),
        Field::FileId => String::from("FileId"),
        Field::Parent => String::from("Parent"),
        Field::Property(key) => format!("Property({})", key),
    }
}

fn field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Size(size) => size.to_string(),
        FieldValue::FileId(file) => first_seven_base64_chars(&file.bytes()),
        FieldValue::Parent(uuid) => first_seven_base64_chars(&uuid.bytes()),
        FieldValue::Property(Some(value)) => value.clone(),
        FieldValue::Property(None) => String::from("-"),
    }
}
