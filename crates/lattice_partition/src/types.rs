//! Shared types for the partition core.
//!
//! These types are kept in a small, dependency-light module because they are
//! used by the partition table, the reservation manager, and the client-facing
//! replica maps alike.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical node identifier within the cluster.
pub type NodeId = u64;

/// Sentinel node id meaning "none/unset".
pub const NODE_NONE: NodeId = 0;

/// Fixed number of partitions a namespace's key space is divided into.
pub const N_PARTITIONS: usize = 4096;

/// Bytes in a client partition bitmap (one bit per partition, MSB first).
pub const CLIENT_BITMAP_BYTES: usize = N_PARTITIONS / 8;

/// Bytes in the Base64 rendering of a client partition bitmap.
pub const CLIENT_B64MAP_BYTES: usize = ((CLIENT_BITMAP_BYTES + 2) / 3) * 4;

/// Clustering protocol generation, fixed at namespace construction.
///
/// Selects which version bookkeeping every partition record carries. All role
/// predicates dispatch on the record's [`VersionState`] variant; there is no
/// process-global mode switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterProtocol {
    /// Enumerated per-partition states plus 128-bit version-tree paths.
    Legacy,
    /// Opaque partition versions assigned by the balance engine.
    Modern,
}

/// Opaque partition version assigned by the balance engine (modern protocol).
///
/// The zero value means "no data for this partition on this node".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionVersion {
    pub ckey: u64,
    pub family: u32,
    pub subset: bool,
    pub evade: bool,
}

impl PartitionVersion {
    pub fn is_null(&self) -> bool {
        self.ckey == 0
    }
}

impl fmt::Display for PartitionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}.{:x}", self.ckey, self.family)?;
        if self.subset {
            f.write_str("s")?;
        }
        if self.evade {
            f.write_str("e")?;
        }
        Ok(())
    }
}

/// Enumerated partition state (legacy protocol).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyState {
    Undef,
    Sync,
    Desync,
    Zombie,
    Absent,
}

/// Legacy version identity: instance id plus a 128-bit version-tree path.
///
/// The zero value means "no data".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub iid: u64,
    pub vtp: [u64; 2],
}

impl VersionInfo {
    pub fn is_null(&self) -> bool {
        self.iid == 0 && self.vtp == [0, 0]
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}-{:x}-{:x}", self.iid, self.vtp[0], self.vtp[1])
    }
}

/// Per-record version bookkeeping, tagged by protocol generation.
///
/// The balance engine writes these fields under the partition lock; the core
/// only reads them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionState {
    Legacy {
        state: LegacyState,
        version_info: VersionInfo,
        primary_version_info: VersionInfo,
    },
    Modern {
        version: PartitionVersion,
        final_version: PartitionVersion,
    },
}

impl VersionState {
    /// Initial state for a freshly constructed partition record.
    pub fn initial(protocol: ClusterProtocol) -> Self {
        match protocol {
            ClusterProtocol::Legacy => VersionState::Legacy {
                state: LegacyState::Absent,
                version_info: VersionInfo::default(),
                primary_version_info: VersionInfo::default(),
            },
            ClusterProtocol::Modern => VersionState::Modern {
                version: PartitionVersion::default(),
                final_version: PartitionVersion::default(),
            },
        }
    }

    /// True when this node has no data version for the partition.
    pub fn is_null(&self) -> bool {
        match self {
            VersionState::Legacy { version_info, .. } => version_info.is_null(),
            VersionState::Modern { version, .. } => version.is_null(),
        }
    }
}
