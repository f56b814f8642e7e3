//! Definitions of the events emitted by the repository and the reconciliation protocol, for event
//! handling and logging.
//!
//! Note: an event for a given action indicates that the action has been completed.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::reconciliation::membership::MembershipState;
use crate::types::data_types::{EntityId, FileId, FileVersion, NodeId};

#[derive(Clone, Debug)]
pub enum Event {
    // Events that change the lineage.
    Created(CreatedEvent),
    Deleted(DeletedEvent),
    Changed(ChangedEvent),
    SealFile(SealFileEvent),
    // Reconciliation events.
    StartReconciliation(StartReconciliationEvent),
    ReconcileFile(ReconcileFileEvent),
    EndReconciliation(EndReconciliationEvent),
    ReceiveListVersions(ReceiveListVersionsEvent),
    ReceiveFetchFile(ReceiveFetchFileEvent),
    UpdateMembership(UpdateMembershipEvent),
}

impl Event {
    /// Send `event` to the event bus, if there is one. A closed event bus drops the event.
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// The business entity an event is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityRef {
    Snapshot(EntityId),
    Device(EntityId),
}

impl EntityRef {
    pub fn uuid(&self) -> EntityId {
        match self {
            EntityRef::Snapshot(uuid) | EntityRef::Device(uuid) => *uuid,
        }
    }
}

/// The field of an entity that a [`ChangedEvent`] is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Size,
    FileId,
    Parent,
    Property(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Size(u64),
    FileId(FileId),
    Parent(EntityId),
    /// `None` if the property was not set.
    Property(Option<String>),
}

#[derive(Clone, Debug)]
pub struct CreatedEvent {
    pub timestamp: SystemTime,
    pub entity: EntityRef,
    pub file: FileId,
}

#[derive(Clone, Debug)]
pub struct DeletedEvent {
    pub timestamp: SystemTime,
    pub entity: EntityRef,
}

#[derive(Clone, Debug)]
pub struct ChangedEvent {
    pub timestamp: SystemTime,
    pub entity: EntityRef,
    pub field: Field,
    pub old: FieldValue,
    pub new: FieldValue,
}

#[derive(Clone, Debug)]
pub struct SealFileEvent {
    pub timestamp: SystemTime,
    pub file: FileId,
    pub version: FileVersion,
}

#[derive(Clone, Debug)]
pub struct StartReconciliationEvent {
    pub timestamp: SystemTime,
    pub peers: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct ReconcileFileEvent {
    pub timestamp: SystemTime,
    pub file: FileId,
    pub source: NodeId,
    pub old_version: FileVersion,
    pub new_version: FileVersion,
}

#[derive(Clone, Debug)]
pub struct EndReconciliationEvent {
    pub timestamp: SystemTime,
    pub files_reconciled: u64,
    pub files_sealed: u64,
    /// Whether every peer answered and every fetch succeeded. If not, the pass will be retried.
    pub complete: bool,
}

#[derive(Clone, Debug)]
pub struct ReceiveListVersionsEvent {
    pub timestamp: SystemTime,
    pub origin: NodeId,
}

#[derive(Clone, Debug)]
pub struct ReceiveFetchFileEvent {
    pub timestamp: SystemTime,
    pub origin: NodeId,
    pub file: FileId,
}

#[derive(Clone, Debug)]
pub struct UpdateMembershipEvent {
    pub timestamp: SystemTime,
    pub old: MembershipState,
    pub new: MembershipState,
}
