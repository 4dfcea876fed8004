//! Read-only operator info formatters.
//!
//! Every formatter walks partition records under lock and never mutates.
//! Rows share the `<ns>:<payload>;` shape with the trailing semicolon
//! stripped.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};

use crate::namespace::Namespace;
use crate::types::{VersionState, CLIENT_BITMAP_BYTES, N_PARTITIONS};

/// Master-role ownership map per namespace: `<ns>:<b64map>;…`.
pub fn master_map_str(namespaces: &[Arc<Namespace>]) -> String {
    let mut out = String::new();

    for ns in namespaces {
        out.push_str(&format!("{}:{};", ns.name(), ns.replica_map(0).b64map()));
    }

    out.pop();
    out
}

/// All replica-role maps per namespace:
/// `<ns>:<replication_factor>,<b64map[0]>,<b64map[1]>,…;…`.
pub fn all_maps_str(namespaces: &[Arc<Namespace>]) -> String {
    let mut out = String::new();

    for ns in namespaces {
        let replication_factor = ns.replication_factor();
        out.push_str(&format!("{}:{}", ns.name(), replication_factor));

        for repl_ix in 0..replication_factor {
            out.push(',');
            out.push_str(&ns.replica_map(repl_ix).b64map());
        }

        out.push(';');
    }

    out.pop();
    out
}

/// Prole ownership map per namespace, synthesized by probing every
/// partition. Retained for clients that predate the per-role maps.
pub fn prole_map_str(namespaces: &[Arc<Namespace>]) -> String {
    let mut out = String::new();

    for ns in namespaces {
        let mut bitmap = [0u8; CLIENT_BITMAP_BYTES];

        for pid in 0..N_PARTITIONS as u32 {
            if ns.prole_node(pid) == ns.self_node() {
                bitmap[(pid >> 3) as usize] |= 0x80 >> (pid & 7);
            }
        }

        out.push_str(&format!(
            "{}:{};",
            ns.name(),
            general_purpose::STANDARD.encode(bitmap)
        ));
    }

    out.pop();
    out
}

/// Per-partition state dump: a header row followed by one row per partition.
pub fn partition_info_str(namespaces: &[Arc<Namespace>]) -> String {
    let mut out = String::from(
        "namespace:partition:state:replica:n_dupl:origin:target:emigrates:immigrates:\
         records:sub_records:tombstones:ldt_version:version:final_version;",
    );

    for ns in namespaces {
        for pid in 0..N_PARTITIONS as u32 {
            let inner = ns.partition(pid).lock();

            let state = inner.state_char(ns.self_node());
            let replica = inner
                .self_index(ns.self_node())
                .unwrap_or(inner.replicas.len());
            let records = inner.tree.size();
            let sub_records = if ns.ldt_enabled() {
                inner.sub_tree.as_ref().map_or(0, |t| t.size())
            } else {
                0
            };
            let (version, final_version) = version_columns(&inner.version_state);

            out.push_str(&format!(
                "{}:{}:{}:{}:{}:{:x}:{:x}:{}:{}:{}:{}:{}:{:x}:{}:{};",
                ns.name(),
                pid,
                state,
                replica,
                inner.dupls.len(),
                inner.origin,
                inner.target,
                inner.pending_emigrations,
                inner.pending_immigrations,
                records,
                sub_records,
                inner.n_tombstones,
                inner.current_outgoing_ldt_version,
                version,
                final_version,
            ));
        }
    }

    out.pop();
    out
}

fn version_columns(version_state: &VersionState) -> (String, String) {
    match version_state {
        VersionState::Modern {
            version,
            final_version,
        } => (version.to_string(), final_version.to_string()),
        VersionState::Legacy {
            version_info,
            primary_version_info,
            ..
        } => (version_info.to_string(), primary_version_info.to_string()),
    }
}
