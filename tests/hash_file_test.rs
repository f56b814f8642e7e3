//! Tests of a single [`HashFile`] and of lookups through chains of materialized hash files.

use std::collections::BTreeMap;

use lineage_rs::types::{
    data_types::{ContentHash, EntityId, FileId, FileVersion},
    hash_file::{
        Detached, HashFile, HashFileError, HashFileFlags, HashFileHeader, Lookup, LookupResult,
    },
};

mod common;

use common::fixtures::{entity_id, hash, node_id, BLOCK_SIZE, HASH_SIZE};

const DEVICE_SIZE: u64 = 4 * BLOCK_SIZE as u64;

fn root() -> HashFile {
    HashFile::new(HashFileHeader::root(
        &entity_id(0xAA),
        node_id(1),
        BLOCK_SIZE,
        BLOCK_SIZE * 8,
        HASH_SIZE,
    ))
}

fn file_id(n: u8) -> FileId {
    FileId::new([n; 32])
}

/// Fork a device-sized writable file off `parent`.
fn fork(parent: &HashFile, n: u8) -> HashFile {
    let mut file = parent.fork(file_id(n), EntityId::new([n; 16]), node_id(1));
    if file.header.size == 0 {
        file.header.set_size(DEVICE_SIZE);
    }
    file
}

fn index(files: &[&HashFile]) -> BTreeMap<FileId, HashFile> {
    files
        .iter()
        .map(|file| (file.file_id(), (*file).clone()))
        .collect()
}

#[test]
fn root_file_test() {
    let root = root();

    assert!(root.header.is_root());
    assert_eq!(root.header.parent_id, root.file_id());
    assert_eq!(root.file_id(), FileId::root(&entity_id(0xAA)));
    assert_eq!(root.header.size, 0);
    assert!(root.header.flags.contains(HashFileFlags::ROOT));
    assert!(!root.header.writable);

    // The ROOT file has no valid offsets at all.
    assert!(matches!(
        root.read_hash(0, true, false, &Detached),
        Err(HashFileError::OutOfRange { offset: 0, size: 0, .. })
    ));
}

#[test]
fn fork_test() {
    let root = root();
    let mut parent = fork(&root, 1);
    parent.write_hash(0, hash(1)).unwrap();
    parent.seal();

    let child = parent.fork(file_id(2), entity_id(2), node_id(3));

    assert_eq!(child.header.parent_id, parent.file_id());
    assert_eq!(child.header.size, parent.header.size);
    assert_eq!(child.header.block_size, parent.header.block_size);
    assert_eq!(child.header.version, FileVersion::init());
    assert_eq!(child.header.node_id, node_id(3));
    assert!(child.header.writable);
    assert!(!child.header.flags.contains(HashFileFlags::ROOT));
    assert!(child.entries().is_empty());
}

#[test]
fn write_and_read_test() {
    let mut file = fork(&root(), 1);

    file.write_hash(0, hash(1)).unwrap();
    file.write_hash(BLOCK_SIZE as u64 + 7, hash(2)).unwrap();
    assert_eq!(file.header.version, FileVersion::new(2));

    // Any offset inside a block addresses that block.
    assert_eq!(
        file.read_hash(BLOCK_SIZE as u64 - 1, false, false, &Detached),
        Ok(Some(Lookup::Hash(hash(1))))
    );
    assert_eq!(
        file.read_hash(BLOCK_SIZE as u64, false, false, &Detached),
        Ok(Some(Lookup::Hash(hash(2))))
    );

    // Overwriting is allowed while the file is writable.
    file.write_hash(0, hash(3)).unwrap();
    assert_eq!(
        file.read_hash(0, false, false, &Detached),
        Ok(Some(Lookup::Hash(hash(3))))
    );

    // Unmapped offsets inside the file are misses, not errors.
    assert_eq!(
        file.read_hash(3 * BLOCK_SIZE as u64, false, false, &Detached),
        Ok(None)
    );
}

#[test]
fn write_errors_test() {
    let mut file = fork(&root(), 1);

    assert_eq!(
        file.write_hash(DEVICE_SIZE, hash(1)),
        Err(HashFileError::OutOfRange {
            file: file_id(1),
            offset: DEVICE_SIZE,
            size: DEVICE_SIZE,
        })
    );
    assert!(matches!(
        file.write_hash(0, ContentHash::new(vec![1; 3])),
        Err(HashFileError::InvalidArgument { .. })
    ));
    assert_eq!(file.header.version, FileVersion::init());

    file.seal();
    assert_eq!(
        file.write_hash(0, hash(1)),
        Err(HashFileError::NotWritable { file: file_id(1) })
    );

    // Sealing is one-way and idempotent.
    file.seal();
    assert!(!file.header.writable);
}

#[test]
fn recursive_lookup_test() {
    let root = root();

    let mut first = fork(&root, 1);
    first.write_hash(BLOCK_SIZE as u64, hash(1)).unwrap();
    first.seal();
    let mut second = fork(&first, 2);
    second.write_hash(2 * BLOCK_SIZE as u64, hash(2)).unwrap();
    second.seal();
    let third = fork(&second, 3);

    let ancestors = index(&[&root, &first, &second]);

    assert_eq!(
        third.read_hash(BLOCK_SIZE as u64, false, false, &ancestors),
        Ok(None)
    );
    assert_eq!(
        third.read_hash(BLOCK_SIZE as u64, true, true, &ancestors),
        Ok(Some(Lookup::Extended(LookupResult {
            hash: hash(1),
            source_file_id: first.file_id(),
            is_source_current: false,
        })))
    );
    assert_eq!(
        third
            .read_hash(2 * BLOCK_SIZE as u64, true, true, &ancestors)
            .unwrap()
            .unwrap()
            .extended()
            .unwrap()
            .source_file_id,
        second.file_id()
    );

    // Walking past the ROOT file ends in a miss.
    assert_eq!(third.read_hash(0, true, false, &ancestors), Ok(None));

    // Without the ancestors, a recursive miss cannot be resolved.
    assert_eq!(
        third.read_hash(BLOCK_SIZE as u64, true, false, &Detached),
        Err(HashFileError::UnknownFile {
            file: second.file_id()
        })
    );
}

#[test]
fn extended_lookup_in_current_file_test() {
    let mut file = fork(&root(), 1);
    file.write_hash(0, hash(9)).unwrap();

    let found = file.read_hash(0, true, true, &Detached).unwrap().unwrap();
    let extended = found.extended().unwrap();
    assert!(extended.is_source_current);
    assert_eq!(extended.source_file_id, file.file_id());
    assert_eq!(found.hash(), &hash(9));
}

#[test]
fn ancestry_limit_test() {
    let root = root();
    let mut parent = fork(&root, 1);
    parent.write_hash(0, hash(1)).unwrap();
    parent.write_hash(3 * BLOCK_SIZE as u64, hash(2)).unwrap();
    parent.seal();

    let mut child = fork(&parent, 2);
    let ancestors = index(&[&root, &parent]);

    // Shrink: offsets beyond the new size are out of range.
    child.header.set_size(2 * BLOCK_SIZE as u64);
    assert!(!child.header.flags.contains(HashFileFlags::PARTIAL));
    assert!(matches!(
        child.read_hash(3 * BLOCK_SIZE as u64, true, false, &ancestors),
        Err(HashFileError::OutOfRange { .. })
    ));

    // Grow back: the parent's stale entry beyond the smallest size must not reappear.
    child.header.set_size(DEVICE_SIZE);
    assert!(child.header.flags.contains(HashFileFlags::PARTIAL));
    assert_eq!(child.header.ancestry_limit, 2 * BLOCK_SIZE as u64);
    assert_eq!(
        child.read_hash(3 * BLOCK_SIZE as u64, true, false, &ancestors),
        Ok(None)
    );

    // Offsets below the smallest size still resolve through the parent.
    assert_eq!(
        child.read_hash(0, true, false, &ancestors),
        Ok(Some(Lookup::Hash(hash(1))))
    );
}
