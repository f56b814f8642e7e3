//! The decision half of a reconciliation pass: given what this replica holds and what its peers
//! report, which files must be fetched, which must be sealed, and which reports are inconsistent
//! with the local lineage.
//!
//! [`plan_reconciliation`] does no I/O, so the whole decision procedure can be tested without a
//! network or a repository.
//!
//! ## Fetch source order
//!
//! For every file that some peer holds at a strictly greater version than this replica, the plan
//! lists the peers to fetch it from, best first:
//! 1. The peers that report the maximum version. Among these, the file's creator (the `node_id` in
//!    its header) comes first if it is one of them, and the rest follow in ascending [`NodeId`] order.
//! 2. The peers that report a version greater than the local one but less than the maximum, highest
//!    version first, ties in ascending [`NodeId`] order. Fetching from these still makes progress
//!    if every peer in the first group is unreachable.
//!
//! ## Sealing abandoned files
//!
//! A file is planned for sealing if all of the following hold:
//! 1. It is writable locally.
//! 2. At least one peer reports it, and every peer that reports it reports it sealed.
//! 3. It is not one of this replica's designated files.
//!
//! A file can be planned for both fetching and sealing. The seal then applies to the fetched copy,
//! so it must only be applied once the fetch has reached the target version.
//!
//! Files that no peer reports are never touched.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{
    data_types::{FileId, FileVersion, NodeId},
    lineage::FileVersionReport,
};

/// What a reconciliation pass should do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    /// Files to fetch, in ascending file id order.
    pub fetches: Vec<Fetch>,

    /// Writable local files to seal, in ascending order. Seals of files also in `fetches` apply to the
    /// fetched copy.
    pub seals: Vec<FileId>,

    /// Files reported by peers that this replica's lineage index does not contain.
    pub missing: Vec<MissingFile>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.fetches.is_empty() && self.seals.is_empty() && self.missing.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetch {
    pub file: FileId,
    pub local_version: FileVersion,
    /// The maximum version reported by any peer.
    pub target_version: FileVersion,
    /// Peers to try, best first. Never empty.
    pub sources: Vec<NodeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissingFile {
    pub file: FileId,
    /// The smallest id among the peers that reported the file.
    pub reported_by: NodeId,
}

/// Compute the [`Plan`] for one reconciliation pass.
///
/// `local` is this replica's report for every file it holds, `designated` the files this replica is
/// the designated writer of, and `peers` the reports received from each peer that answered.
pub fn plan_reconciliation(
    local: &[FileVersionReport],
    designated: &BTreeSet<FileId>,
    peers: &BTreeMap<NodeId, Vec<FileVersionReport>>,
) -> Plan {
    let local: BTreeMap<FileId, &FileVersionReport> =
        local.iter().map(|report| (report.file_id, report)).collect();

    // file -> (peer -> report), both in ascending order.
    let mut reported: BTreeMap<FileId, BTreeMap<NodeId, &FileVersionReport>> = BTreeMap::new();
    for (peer, reports) in peers {
        for report in reports {
            reported
                .entry(report.file_id)
                .or_default()
                .insert(*peer, report);
        }
    }

    let mut plan = Plan::default();
    for (file, reporters) in &reported {
        let Some(local_report) = local.get(file) else {
            if let Some(reported_by) = reporters.keys().next() {
                plan.missing.push(MissingFile {
                    file: *file,
                    reported_by: *reported_by,
                });
            }
            continue;
        };

        let newer: Vec<(&NodeId, &&FileVersionReport)> = reporters
            .iter()
            .filter(|(_, report)| report.version > local_report.version)
            .collect();

        if let Some(target_version) = newer.iter().map(|(_, report)| report.version).max() {
            plan.fetches.push(Fetch {
                file: *file,
                local_version: local_report.version,
                target_version,
                sources: order_sources(&newer, target_version, &local_report.node_id),
            });
        }

        // Judged against the state after the fetch above, which keeps the local writable flag.
        if local_report.writable
            && reporters.values().all(|report| !report.writable)
            && !designated.contains(file)
        {
            plan.seals.push(*file);
        }
    }

    plan
}

fn order_sources(
    newer: &[(&NodeId, &&FileVersionReport)],
    target_version: FileVersion,
    creator: &NodeId,
) -> Vec<NodeId> {
    let mut sources: Vec<(FileVersion, NodeId)> = newer
        .iter()
        .map(|(peer, report)| (report.version, **peer))
        .collect();

    // Highest version first, then ascending node id, except that the creator wins among the peers at
    // the target version.
    sources.sort_by(|(version_a, peer_a), (version_b, peer_b)| {
        version_b.cmp(version_a).then_with(|| {
            if *version_a == target_version {
                (peer_a != creator)
                    .cmp(&(peer_b != creator))
                    .then_with(|| peer_a.cmp(peer_b))
            } else {
                peer_a.cmp(peer_b)
            }
        })
    });

    sources.into_iter().map(|(_, peer)| peer).collect()
}
