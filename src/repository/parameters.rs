//! Parameters that a repository is initialized with.

use typed_builder::TypedBuilder;

use crate::types::data_types::EntityId;

/// Identity and geometry of a new repository.
///
/// Every replica of a repository must be initialized with the same `RepositoryParameters`, otherwise
/// the replicas will derive different [`FileId`](crate::types::data_types::FileId)s for the same
/// files and [reconciliation](crate::reconciliation) can not match them up.
///
/// ## Validation
///
/// Parameters are validated by [`Repository::initialize`](super::accessors::internal::Repository::initialize):
/// - `block_size` must be positive.
/// - `cluster_size` must be a positive multiple of `block_size`.
/// - `hash_size` must be between 1 and 32.
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct RepositoryParameters {
    #[builder(setter(doc = "Set the id of the repository. Required."))]
    pub(crate) repository: EntityId,
    #[builder(setter(into, doc = "Set the name of the owner of the repository. Required."))]
    pub(crate) owner: String,
    #[builder(setter(doc = "Set the id of the root snapshot. Required."))]
    pub(crate) root_snapshot: EntityId,
    #[builder(
        default = 4096,
        setter(doc = "Set the number of bytes per block. Defaults to 4096.")
    )]
    pub(crate) block_size: u32,
    #[builder(
        default = 65536,
        setter(doc = "Set the number of bytes per cluster. Defaults to 65536.")
    )]
    pub(crate) cluster_size: u32,
    #[builder(
        default = 32,
        setter(doc = "Set the number of bytes per content hash. Defaults to 32.")
    )]
    pub(crate) hash_size: u32,
}

impl RepositoryParameters {
    pub fn repository(&self) -> EntityId {
        self.repository
    }

    pub fn root_snapshot(&self) -> EntityId {
        self.root_snapshot
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }
}
