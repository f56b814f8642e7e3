//! Ids and parameters shared by the tests.

use lineage_rs::{
    repository::{accessors::internal::Repository, parameters::RepositoryParameters},
    types::{
        data_types::{ContentHash, EntityId, NodeId},
        lineage::Snapshot,
    },
};

use super::mem_db::MemDB;

pub(crate) const BLOCK_SIZE: u32 = 512;

pub(crate) const HASH_SIZE: u32 = 16;

pub(crate) fn node_id(n: u8) -> NodeId {
    NodeId::new([n; 32])
}

pub(crate) fn entity_id(n: u8) -> EntityId {
    EntityId::new([n; 16])
}

pub(crate) fn parameters() -> RepositoryParameters {
    RepositoryParameters::builder()
        .repository(entity_id(0xAA))
        .owner("tests")
        .root_snapshot(entity_id(0xBB))
        .block_size(BLOCK_SIZE)
        .cluster_size(BLOCK_SIZE * 8)
        .hash_size(HASH_SIZE)
        .build()
}

/// Create a repository on a fresh [`MemDB`], initialized as replica `node`, and return it with its root
/// snapshot.
pub(crate) fn initialized_repository(node: NodeId) -> (Repository<MemDB>, Snapshot) {
    let mut repository = Repository::new(MemDB::new());
    let root = repository.initialize(&parameters(), node).unwrap();
    (repository, root)
}

/// A content hash of the right length whose every byte is `n`.
pub(crate) fn hash(n: u8) -> ContentHash {
    ContentHash::new(vec![n; HASH_SIZE as usize])
}
