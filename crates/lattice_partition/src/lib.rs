//! Per-node partition state and reservation core for the Lattice store.
//!
//! A namespace's key space is divided into a fixed set of partitions, each
//! replicated across several nodes with one acting as master. This crate
//! keeps the node-local view of every partition's replication state, hands
//! out reservations that pin a partition's index trees for the duration of
//! an operation, routes requests to the node that should handle them, and
//! publishes the per-role ownership bitmaps clients consume.
//!
//! The cluster membership layer and the partition balance engine are external
//! collaborators: they mutate partition records through the same per-partition
//! locks and drive the replica-map updates, while this crate never decides
//! placement itself.

mod info;
mod namespace;
mod partition;
mod replica_map;
mod reservation;
mod tree;
mod types;

pub use info::{all_maps_str, master_map_str, partition_info_str, prole_map_str};
pub use namespace::{Namespace, NamespaceConfig, NamespaceRoots, ReplicaStats};
pub use partition::{Partition, PartitionInner};
pub use replica_map::ClientReplicaMap;
pub use reservation::{Reservation, ReserveError};
pub use tree::{Arena, IndexTree, TreeError, TreeShared};
pub use types::{
    ClusterProtocol, LegacyState, NodeId, PartitionVersion, VersionInfo, VersionState,
    CLIENT_B64MAP_BYTES, CLIENT_BITMAP_BYTES, NODE_NONE, N_PARTITIONS,
};
