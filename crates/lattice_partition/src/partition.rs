//! Per-partition state records and role predicates.
//!
//! Every partition record is guarded by its own mutex. The role predicates
//! are pure over the locked record and the local node id; the balance engine
//! mutates placement fields through the same lock and the core never mutates
//! them itself.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::tree::IndexTree;
use crate::types::{LegacyState, NodeId, VersionState, NODE_NONE};

/// One partition's state record. Everything besides `id` lives behind the
/// lock.
#[derive(Debug)]
pub struct Partition {
    id: u32,
    lock: Mutex<PartitionInner>,
}

impl Partition {
    pub(crate) fn new(
        id: u32,
        version_state: VersionState,
        tree: Arc<IndexTree>,
        sub_tree: Option<Arc<IndexTree>>,
    ) -> Self {
        Self {
            id,
            lock: Mutex::new(PartitionInner {
                replicas: Vec::new(),
                origin: NODE_NONE,
                target: NODE_NONE,
                pending_emigrations: 0,
                pending_immigrations: 0,
                dupls: Vec::new(),
                cluster_key: 0,
                version_state,
                n_tombstones: 0,
                current_outgoing_ldt_version: 0,
                tree,
                sub_tree,
            }),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Lock the record. Holds must stay short: no I/O, nothing heavier than
    /// refcount traffic under the lock.
    pub fn lock(&self) -> MutexGuard<'_, PartitionInner> {
        self.lock.lock()
    }

    /// Timed acquisition, used by the migration sender so a contended
    /// partition aborts the attempt instead of stalling the migration thread.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, PartitionInner>> {
        self.lock.try_lock_for(timeout)
    }
}

/// Lock-guarded partition state.
///
/// Placement fields (`replicas`, `origin`, `target`, migration counts,
/// duplicate set, versions, `cluster_key`) are written by the balance engine;
/// the core reads them for routing, reservations, and introspection.
#[derive(Debug)]
pub struct PartitionInner {
    /// Replica list; element 0 is the eventual master. May transiently hold
    /// more entries than the namespace replication factor mid-rebalance.
    pub replicas: Vec<NodeId>,
    /// On the eventual master: the acting master currently serving writes
    /// while this node catches up. On a prole: the immigration source.
    pub origin: NodeId,
    /// Non-zero when this node is acting master, emigrating to the eventual
    /// master named here.
    pub target: NodeId,
    pub pending_emigrations: u32,
    /// The partition is stable only when this reaches zero.
    pub pending_immigrations: u32,
    /// Peers holding divergent copies that need duplicate-resolution reads.
    pub dupls: Vec<NodeId>,
    /// Cluster epoch stamped on every reservation handed out.
    pub cluster_key: u64,
    pub version_state: VersionState,
    /// Delete markers, counted separately from live records.
    pub n_tombstones: u64,
    pub current_outgoing_ldt_version: u64,
    /// Primary index tree. The record's reference keeps the tree alive; each
    /// reservation clones one more.
    pub tree: Arc<IndexTree>,
    /// Secondary sub-record tree, present only with large-data-type support.
    pub sub_tree: Option<Arc<IndexTree>>,
}

impl PartitionInner {
    /// Index of `node` in the replica list, if present.
    pub fn self_index(&self, node: NodeId) -> Option<usize> {
        self.replicas.iter().position(|&n| n == node)
    }

    pub fn is_eventual_master(&self, node: NodeId) -> bool {
        self.self_index(node) == Some(0)
    }

    pub fn is_prole(&self, node: NodeId) -> bool {
        matches!(self.self_index(node), Some(ix) if ix > 0)
    }

    /// True when this node serves writes for a partition whose eventual
    /// master is elsewhere.
    pub fn is_acting_master(&self) -> bool {
        self.target != NODE_NONE
    }

    /// True when this node is currently authoritative for writes.
    pub fn is_working_master(&self, node: NodeId) -> bool {
        (self.is_eventual_master(node) && self.origin == NODE_NONE) || self.is_acting_master()
    }

    /// Best node to handle a read or write of this partition.
    pub fn best_node(&self, node: NodeId, is_read: bool) -> NodeId {
        let self_ix = self.self_index(node);
        let is_eventual_master = self_ix == Some(0);
        let is_prole = matches!(self_ix, Some(ix) if ix > 0);
        let is_working_master =
            (is_eventual_master && self.origin == NODE_NONE) || self.is_acting_master();

        if is_working_master {
            return node;
        }

        if is_eventual_master {
            return self.origin; // acting master elsewhere
        }

        // A prole may serve reads once it is no longer immigrating.
        if is_read && is_prole && self.origin == NODE_NONE {
            return node;
        }

        // Eventual master as a last resort.
        self.replicas.first().copied().unwrap_or(NODE_NONE)
    }

    /// Replica role index this node advertises to clients, if any.
    ///
    /// The replica list can transiently exceed `replication_factor` during a
    /// rebalance; the bound keeps a dying replica from advertising itself.
    pub fn replica_self_index(&self, node: NodeId, replication_factor: usize) -> Option<usize> {
        if self.is_working_master(node) {
            return Some(0);
        }

        match self.self_index(node) {
            Some(ix) if ix > 0 && self.origin == NODE_NONE && ix < replication_factor => Some(ix),
            _ => None,
        }
    }

    /// Single-character state code used by the info surface.
    pub fn state_char(&self, node: NodeId) -> char {
        match &self.version_state {
            VersionState::Legacy { state, .. } => match state {
                LegacyState::Undef => 'U',
                LegacyState::Sync => 'S',
                LegacyState::Desync => 'D',
                LegacyState::Zombie => 'Z',
                LegacyState::Absent => 'A',
            },
            VersionState::Modern { version, .. } => {
                if self.self_index(node).is_some() {
                    if self.pending_immigrations == 0 {
                        'S'
                    } else {
                        'D'
                    }
                } else if version.is_null() {
                    'A'
                } else {
                    'Z'
                }
            }
        }
    }

    /// Replica list with the local node filtered out.
    pub fn other_replicas(&self, node: NodeId) -> Vec<NodeId> {
        self.replicas
            .iter()
            .copied()
            .filter(|&n| n != node)
            .collect()
    }
}
