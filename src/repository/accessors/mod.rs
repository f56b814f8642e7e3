//! Types for reading and writing the repository.
//!
//! There are three accessors:
//! 1. [`internal::Repository`]: the read-and-write handle through which every mutation of the
//!    repository happens. There is exactly one per replica.
//! 2. [`public::RepositoryCamera`] and [`public::RepositoryView`]: read-only handles that can be shared
//!    with other threads, e.g., the [reconciliation server](crate::reconciliation::server).
//! 3. [`write_batch::RepositoryWriteBatch`]: a typed wrapper around the user's
//!    [`WriteBatch`](super::pluggables::WriteBatch) that forms the keys of every repository variable.

pub mod internal;

pub mod public;

pub mod write_batch;
