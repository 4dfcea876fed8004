//! Namespace-level partition table lifecycle and replica statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::partition::{Partition, PartitionInner};
use crate::replica_map::ClientReplicaMap;
use crate::tree::{Arena, IndexTree, TreeShared};
use crate::types::{ClusterProtocol, NodeId, VersionState, NODE_NONE, N_PARTITIONS};

/// Static configuration for one namespace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub name: String,
    /// Current replication factor. The balance engine may change it per
    /// rebalance, never above `cfg_replication_factor`.
    pub replication_factor: usize,
    /// Configured upper bound; sizes the client replica map set.
    pub cfg_replication_factor: usize,
    /// Enables the secondary sub-record tree per partition.
    pub ldt_enabled: bool,
    /// Sprigs per index tree; must be a power of two.
    pub n_sprigs: usize,
}

/// Sprig roots written by a durable shutdown. Partition `pid`'s roots occupy
/// offsets `pid * n_sprigs ..` in each array.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NamespaceRoots {
    pub tree_roots: Vec<u64>,
    pub sub_tree_roots: Vec<u64>,
}

/// Per-role replica statistics accumulated across the partition table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplicaStats {
    pub n_master_objects: u64,
    pub n_master_sub_objects: u64,
    pub n_master_tombstones: u64,
    pub n_prole_objects: u64,
    pub n_prole_sub_objects: u64,
    pub n_prole_tombstones: u64,
    pub n_non_replica_objects: u64,
    pub n_non_replica_sub_objects: u64,
    pub n_non_replica_tombstones: u64,
}

/// One namespace's partition table, trees, and client replica maps.
#[derive(Debug)]
pub struct Namespace {
    name: String,
    self_node: NodeId,
    protocol: ClusterProtocol,
    replication_factor: AtomicUsize,
    cfg_replication_factor: usize,
    ldt_enabled: bool,
    tree_shared: TreeShared,
    arena: Arc<Arena>,
    partitions: Vec<Partition>,
    replica_maps: Vec<ClientReplicaMap>,
}

impl Namespace {
    /// Cold-start construction: fresh trees for every partition.
    pub fn cold_start(
        config: NamespaceConfig,
        protocol: ClusterProtocol,
        self_node: NodeId,
        arena: Arc<Arena>,
    ) -> anyhow::Result<Arc<Self>> {
        Self::build(config, protocol, self_node, arena, None)
    }

    /// Warm-resume construction: trees rebuilt from persisted sprig roots.
    pub fn warm_resume(
        config: NamespaceConfig,
        protocol: ClusterProtocol,
        self_node: NodeId,
        arena: Arc<Arena>,
        roots: NamespaceRoots,
    ) -> anyhow::Result<Arc<Self>> {
        Self::build(config, protocol, self_node, arena, Some(roots))
    }

    fn build(
        config: NamespaceConfig,
        protocol: ClusterProtocol,
        self_node: NodeId,
        arena: Arc<Arena>,
        roots: Option<NamespaceRoots>,
    ) -> anyhow::Result<Arc<Self>> {
        if self_node == NODE_NONE {
            bail!("self node id must be non-zero");
        }
        if config.replication_factor == 0 {
            bail!("replication_factor must be at least 1");
        }
        if config.cfg_replication_factor < config.replication_factor {
            bail!(
                "cfg_replication_factor {} is below replication_factor {}",
                config.cfg_replication_factor,
                config.replication_factor
            );
        }
        if !config.n_sprigs.is_power_of_two() {
            bail!("n_sprigs {} is not a power of two", config.n_sprigs);
        }

        let tree_shared = TreeShared {
            n_sprigs: config.n_sprigs,
        };
        let n_roots = N_PARTITIONS * config.n_sprigs;

        if let Some(roots) = &roots {
            if roots.tree_roots.len() != n_roots {
                bail!(
                    "expected {} tree roots, got {}",
                    n_roots,
                    roots.tree_roots.len()
                );
            }
            if config.ldt_enabled && roots.sub_tree_roots.len() != n_roots {
                bail!(
                    "expected {} sub-tree roots, got {}",
                    n_roots,
                    roots.sub_tree_roots.len()
                );
            }
        }

        let mut partitions = Vec::with_capacity(N_PARTITIONS);

        for pid in 0..N_PARTITIONS {
            let (tree, sub_tree) = match &roots {
                None => {
                    let tree = IndexTree::create(&tree_shared, &arena);
                    let sub_tree = config
                        .ldt_enabled
                        .then(|| IndexTree::create(&tree_shared, &arena));
                    (tree, sub_tree)
                }
                Some(roots) => {
                    let off = pid * config.n_sprigs;
                    let tree = IndexTree::resume(
                        &tree_shared,
                        &arena,
                        &roots.tree_roots[off..off + config.n_sprigs],
                    )?;
                    let sub_tree = if config.ldt_enabled {
                        Some(IndexTree::resume(
                            &tree_shared,
                            &arena,
                            &roots.sub_tree_roots[off..off + config.n_sprigs],
                        )?)
                    } else {
                        None
                    };
                    (tree, sub_tree)
                }
            };

            partitions.push(Partition::new(
                pid as u32,
                VersionState::initial(protocol),
                tree,
                sub_tree,
            ));
        }

        let replica_maps = (0..config.cfg_replication_factor)
            .map(|_| ClientReplicaMap::new())
            .collect();

        info!(
            namespace = %config.name,
            cold_start = roots.is_none(),
            "partition table ready"
        );

        Ok(Arc::new(Self {
            name: config.name,
            self_node,
            protocol,
            replication_factor: AtomicUsize::new(config.replication_factor),
            cfg_replication_factor: config.cfg_replication_factor,
            ldt_enabled: config.ldt_enabled,
            tree_shared,
            arena,
            partitions,
            replica_maps,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn self_node(&self) -> NodeId {
        self.self_node
    }

    pub fn protocol(&self) -> ClusterProtocol {
        self.protocol
    }

    pub fn ldt_enabled(&self) -> bool {
        self.ldt_enabled
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor.load(Ordering::Relaxed)
    }

    /// Balance-engine hook: install the replication factor decided for the
    /// current rebalance. Clamped to the configured bound.
    pub fn set_replication_factor(&self, n: usize) {
        self.replication_factor
            .store(n.min(self.cfg_replication_factor), Ordering::Relaxed);
    }

    pub fn cfg_replication_factor(&self) -> usize {
        self.cfg_replication_factor
    }

    pub fn tree_shared(&self) -> &TreeShared {
        &self.tree_shared
    }

    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    pub fn partition(&self, pid: u32) -> &Partition {
        &self.partitions[pid as usize]
    }

    pub(crate) fn replica_maps(&self) -> &[ClientReplicaMap] {
        &self.replica_maps
    }

    /// The replica map for one role index.
    pub fn replica_map(&self, repl_ix: usize) -> &ClientReplicaMap {
        &self.replica_maps[repl_ix]
    }

    /// Durable shutdown. Every partition lock is taken and leaked so no new
    /// reservation can start while the process exits; tree roots are parked
    /// in the arena and returned for persistence.
    pub fn shutdown(&self) -> NamespaceRoots {
        let n_sprigs = self.tree_shared.n_sprigs;
        let mut roots = NamespaceRoots {
            tree_roots: vec![0; N_PARTITIONS * n_sprigs],
            sub_tree_roots: if self.ldt_enabled {
                vec![0; N_PARTITIONS * n_sprigs]
            } else {
                Vec::new()
            },
        };

        for (pid, p) in self.partitions.iter().enumerate() {
            let guard = p.lock();
            let off = pid * n_sprigs;

            guard.tree.shutdown(&mut roots.tree_roots[off..off + n_sprigs]);

            if let Some(sub_tree) = &guard.sub_tree {
                sub_tree.shutdown(&mut roots.sub_tree_roots[off..off + n_sprigs]);
            }

            parking_lot::MutexGuard::leak(guard);
        }

        info!(namespace = %self.name, "partition table shut down");
        roots
    }

    /// Accumulate object/tombstone statistics per replica role.
    pub fn replica_stats(&self) -> ReplicaStats {
        let mut stats = ReplicaStats::default();

        for p in &self.partitions {
            let inner = p.lock();

            let (objects, sub_objects, tombstones) = if inner.is_working_master(self.self_node) {
                (
                    &mut stats.n_master_objects,
                    &mut stats.n_master_sub_objects,
                    &mut stats.n_master_tombstones,
                )
            } else if inner.self_index(self.self_node).is_some() {
                (
                    &mut stats.n_prole_objects,
                    &mut stats.n_prole_sub_objects,
                    &mut stats.n_prole_tombstones,
                )
            } else {
                (
                    &mut stats.n_non_replica_objects,
                    &mut stats.n_non_replica_sub_objects,
                    &mut stats.n_non_replica_tombstones,
                )
            };

            accumulate(&inner, self.ldt_enabled, objects, sub_objects, tombstones);
        }

        stats
    }

    /// Prole probe for the legacy map surface: none when this node is the
    /// working master, else the best read node.
    pub(crate) fn prole_node(&self, pid: u32) -> NodeId {
        let inner = self.partition(pid).lock();

        if inner.best_node(self.self_node, false) == self.self_node {
            return NODE_NONE;
        }

        inner.best_node(self.self_node, true)
    }
}

fn accumulate(
    inner: &PartitionInner,
    ldt_enabled: bool,
    objects: &mut u64,
    sub_objects: &mut u64,
    tombstones: &mut u64,
) {
    *objects += inner.tree.size().saturating_sub(inner.n_tombstones);

    if ldt_enabled {
        if let Some(sub_tree) = &inner.sub_tree {
            *sub_objects += sub_tree.size();
        }
    }

    *tombstones += inner.n_tombstones;
}
