//! Shared builders for partition-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lattice_partition::{
    Arena, ClusterProtocol, Namespace, NamespaceConfig, NodeId, PartitionVersion, VersionState,
};

pub const NODE_A: NodeId = 0x1111;
pub const NODE_B: NodeId = 0x2222;
pub const NODE_C: NodeId = 0x3333;

pub fn test_config(name: &str) -> NamespaceConfig {
    NamespaceConfig {
        name: name.to_string(),
        replication_factor: 2,
        cfg_replication_factor: 2,
        ldt_enabled: false,
        n_sprigs: 4,
    }
}

/// Cold-start a modern-protocol namespace viewed from `self_node`.
pub fn modern_namespace(name: &str, self_node: NodeId) -> Arc<Namespace> {
    Namespace::cold_start(
        test_config(name),
        ClusterProtocol::Modern,
        self_node,
        Arena::new(),
    )
    .expect("cold start")
}

/// Cold-start a legacy-protocol namespace viewed from `self_node`.
pub fn legacy_namespace(name: &str, self_node: NodeId) -> Arc<Namespace> {
    Namespace::cold_start(
        test_config(name),
        ClusterProtocol::Legacy,
        self_node,
        Arena::new(),
    )
    .expect("cold start")
}

/// Install a placement for `pid` the way the balance engine would.
pub fn set_placement(ns: &Namespace, pid: u32, replicas: &[NodeId], origin: NodeId, target: NodeId) {
    let mut inner = ns.partition(pid).lock();
    inner.replicas = replicas.to_vec();
    inner.origin = origin;
    inner.target = target;
}

/// Give `pid` a non-null modern data version.
pub fn set_modern_version(ns: &Namespace, pid: u32, ckey: u64) {
    let mut inner = ns.partition(pid).lock();
    if let VersionState::Modern { version, .. } = &mut inner.version_state {
        *version = PartitionVersion {
            ckey,
            ..Default::default()
        };
    }
}

/// Unique scratch path for tests that persist arena state.
pub fn scratch_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("lattice-{}-{}.json", name, std::process::id()))
}
