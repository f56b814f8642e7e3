//! Types and traits that are used across multiple components of the repository.
//!
//! Types specific to a single component, for example the messages of the reconciliation protocol, can
//! be found in that component's module, e.g., [`crate::reconciliation::messages`].

pub mod crypto_primitives;

pub mod data_types;

pub mod hash_file;

pub mod lineage;
