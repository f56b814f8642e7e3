/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives [events](crate::events) from the rest of the node and dispatches them to
//! registered handlers.
//!
//! Handlers come from two sources:
//! 1. The user-supplied closures registered through the optional `on_*` setters of
//!    [`NodeSpec`](crate::node::NodeSpec).
//! 2. The default [loggers](crate::logging), if the node's configuration enables `log_events`.
//!
//! If neither source supplies a handler, no event bus thread is started and events are not published
//! at all.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// Pointer to a user-defined or default handler for an event type.
pub(crate) struct EventHandlers {
    pub(crate) created_handlers: Vec<HandlerPtr<CreatedEvent>>,
    pub(crate) deleted_handlers: Vec<HandlerPtr<DeletedEvent>>,
    pub(crate) changed_handlers: Vec<HandlerPtr<ChangedEvent>>,
    pub(crate) seal_file_handlers: Vec<HandlerPtr<SealFileEvent>>,
    pub(crate) start_reconciliation_handlers: Vec<HandlerPtr<StartReconciliationEvent>>,
    pub(crate) reconcile_file_handlers: Vec<HandlerPtr<ReconcileFileEvent>>,
    pub(crate) end_reconciliation_handlers: Vec<HandlerPtr<EndReconciliationEvent>>,
    pub(crate) receive_list_versions_handlers: Vec<HandlerPtr<ReceiveListVersionsEvent>>,
    pub(crate) receive_fetch_file_handlers: Vec<HandlerPtr<ReceiveFetchFileEvent>>,
    pub(crate) update_membership_handlers: Vec<HandlerPtr<UpdateMembershipEvent>>,
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        created_handler: Option<HandlerPtr<CreatedEvent>>,
        deleted_handler: Option<HandlerPtr<DeletedEvent>>,
        changed_handler: Option<HandlerPtr<ChangedEvent>>,
        seal_file_handler: Option<HandlerPtr<SealFileEvent>>,
        start_reconciliation_handler: Option<HandlerPtr<StartReconciliationEvent>>,
        reconcile_file_handler: Option<HandlerPtr<ReconcileFileEvent>>,
        end_reconciliation_handler: Option<HandlerPtr<EndReconciliationEvent>>,
        receive_list_versions_handler: Option<HandlerPtr<ReceiveListVersionsEvent>>,
        receive_fetch_file_handler: Option<HandlerPtr<ReceiveFetchFileEvent>>,
        update_membership_handler: Option<HandlerPtr<UpdateMembershipEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            created_handlers: handlers(log_events, created_handler),
            deleted_handlers: handlers(log_events, deleted_handler),
            changed_handlers: handlers(log_events, changed_handler),
            seal_file_handlers: handlers(log_events, seal_file_handler),
            start_reconciliation_handlers: handlers(log_events, start_reconciliation_handler),
            reconcile_file_handlers: handlers(log_events, reconcile_file_handler),
            end_reconciliation_handlers: handlers(log_events, end_reconciliation_handler),
            receive_list_versions_handlers: handlers(log_events, receive_list_versions_handler),
            receive_fetch_file_handlers: handlers(log_events, receive_fetch_file_handler),
            update_membership_handlers: handlers(log_events, update_membership_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.created_handlers.is_empty()
            && self.deleted_handlers.is_empty()
            && self.changed_handlers.is_empty()
            && self.seal_file_handlers.is_empty()
            && self.start_reconciliation_handlers.is_empty()
            && self.reconcile_file_handlers.is_empty()
            && self.end_reconciliation_handlers.is_empty()
            && self.receive_list_versions_handlers.is_empty()
            && self.receive_fetch_file_handlers.is_empty()
            && self.update_membership_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::Created(created_event) => self
                .created_handlers
                .iter()
                .for_each(|handler| handler(&created_event)),

            Event::Deleted(deleted_event) => self
                .deleted_handlers
                .iter()
                .for_each(|handler| handler(&deleted_event)),

            Event::Changed(changed_event) => self
                .changed_handlers
                .iter()
                .for_each(|handler| handler(&changed_event)),

            Event::SealFile(seal_file_event) => self
                .seal_file_handlers
                .iter()
                .for_each(|handler| handler(&seal_file_event)),

            Event::StartReconciliation(start_reconciliation_event) => self
                .start_reconciliation_handlers
                .iter()
                .for_each(|handler| handler(&start_reconciliation_event)),

            Event::ReconcileFile(reconcile_file_event) => self
                .reconcile_file_handlers
                .iter()
                .for_each(|handler| handler(&reconcile_file_event)),

            Event::EndReconciliation(end_reconciliation_event) => self
                .end_reconciliation_handlers
                .iter()
                .for_each(|handler| handler(&end_reconciliation_event)),

            Event::ReceiveListVersions(receive_list_versions_event) => self
                .receive_list_versions_handlers
                .iter()
                .for_each(|handler| handler(&receive_list_versions_event)),

            Event::ReceiveFetchFile(receive_fetch_file_event) => self
                .receive_fetch_file_handlers
                .iter()
                .for_each(|handler| handler(&receive_fetch_file_event)),

            Event::UpdateMembership(update_membership_event) => self
                .update_membership_handlers
                .iter()
                .for_each(|handler| handler(&update_membership_event)),
        }
    }
}

fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(handler) = user_handler {
        handlers.push(handler);
    }
    handlers
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(Duration::from_millis(10)) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
