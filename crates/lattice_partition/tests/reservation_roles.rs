//! Reservation routing across the partition roles a node can hold: working
//! master, eventual master with an acting master elsewhere, acting master,
//! settled prole, and non-replica.

mod common;

use common::{modern_namespace, set_modern_version, set_placement, NODE_A, NODE_B, NODE_C};
use lattice_partition::ReserveError;

#[test]
fn working_master_reserves_reads_and_writes() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 7, &[NODE_A, NODE_B], 0, 0);
    set_modern_version(&ns, 7, 0xab);
    ns.partition(7).lock().cluster_key = 0x55;

    let rsv = ns.reserve_write(7).expect("write reserve");
    assert_eq!(rsv.pid(), 7);
    assert_eq!(rsv.cluster_key(), 0x55);
    assert!(!rsv.reject_repl_write());
    assert!(rsv.dupl_nodes().is_empty());

    let rsv = ns.reserve_read(7).expect("read reserve");
    assert_eq!(rsv.cluster_key(), 0x55);

    assert_eq!(ns.writable_node(7), NODE_A);
    assert_eq!(ns.proxyee_redirect(7), None);

    assert!(ns.update_replica_maps(7));
    assert!(ns.is_partition_queryable(7));
    assert_eq!(ns.partition(7).lock().state_char(NODE_A), 'S');
}

#[test]
fn eventual_master_redirects_to_acting_master() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 3, &[NODE_A, NODE_B], NODE_B, 0);
    {
        let mut inner = ns.partition(3).lock();
        inner.cluster_key = 0x66;
        inner.pending_immigrations = 1;
    }

    let err = ns.reserve_read(3).unwrap_err();
    assert_eq!(
        err,
        ReserveError::NotOwner {
            pid: 3,
            node: NODE_B,
            cluster_key: 0x66
        }
    );
    assert!(ns.reserve_write(3).is_err());

    assert_eq!(ns.writable_node(3), NODE_B);
    assert_eq!(ns.proxyee_redirect(3), Some(NODE_B));

    ns.update_replica_maps(3);
    assert!(!ns.is_partition_queryable(3));
    assert_eq!(ns.partition(3).lock().state_char(NODE_A), 'D');
}

#[test]
fn acting_master_serves_writes_from_prole_slot() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 11, &[NODE_B, NODE_A], 0, NODE_B);
    set_modern_version(&ns, 11, 0xcd);

    let rsv = ns.reserve_write(11).expect("acting master writes");
    assert!(!rsv.reject_repl_write());

    assert_eq!(ns.partition(11).lock().self_index(NODE_A), Some(1));
    assert_eq!(ns.replica_self_index(11), Some(0));

    assert!(ns.update_replica_maps(11));
    assert!(ns.is_partition_queryable(11));
}

#[test]
fn settled_prole_serves_reads_but_redirects_writes() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 20, &[NODE_B, NODE_A], 0, 0);
    set_modern_version(&ns, 20, 0xef);

    let rsv = ns.reserve_read(20).expect("prole read");
    assert!(!rsv.reject_repl_write());

    match ns.reserve_write(20) {
        Err(ReserveError::NotOwner { node, .. }) => assert_eq!(node, NODE_B),
        other => panic!("expected NotOwner, got {:?}", other.map(|_| ())),
    }

    ns.update_replica_maps(20);
    assert!(!ns.is_partition_queryable(20));
    assert!(ns.replica_map(1).is_set(20));
}

#[test]
fn non_replica_redirects_everything() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 30, &[NODE_B, NODE_C], 0, 0);

    for result in [ns.reserve_read(30), ns.reserve_write(30)] {
        match result {
            Err(ReserveError::NotOwner { node, .. }) => assert_eq!(node, NODE_B),
            other => panic!("expected NotOwner, got {:?}", other.map(|_| ())),
        }
    }

    assert_eq!(ns.other_replicas(30), vec![NODE_B, NODE_C]);
    assert_eq!(ns.partition(30).lock().state_char(NODE_A), 'A');
}

#[test]
fn xdr_read_requires_a_data_version() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 40, &[NODE_B, NODE_C], 0, 0);

    let err = ns.reserve_xdr_read(40).unwrap_err();
    assert_eq!(err, ReserveError::NoData { pid: 40 });

    // A zombie (non-replica with data) still ships.
    set_modern_version(&ns, 40, 0x99);
    ns.reserve_xdr_read(40).expect("zombie xdr read");
    assert_eq!(ns.partition(40).lock().state_char(NODE_A), 'Z');
}

#[test]
fn fresh_partition_rejects_replica_writes() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 50, &[NODE_A, NODE_B], 0, 0);

    // No version assigned yet: the reservation succeeds for the working
    // master but replication writes are rejected.
    let rsv = ns.reserve_write(50).expect("write reserve");
    assert!(rsv.reject_repl_write());
}

#[test]
fn reservation_snapshots_duplicate_set() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 60, &[NODE_A, NODE_B], 0, 0);
    ns.partition(60).lock().dupls = vec![NODE_B, NODE_C];

    let rsv = ns.reserve_write(60).expect("write reserve");
    assert_eq!(rsv.dupl_nodes(), &[NODE_B, NODE_C]);

    // Later balance mutations do not touch the snapshot.
    ns.partition(60).lock().dupls.clear();
    assert_eq!(rsv.dupl_nodes(), &[NODE_B, NODE_C]);

    let again = rsv.reserve_again();
    assert_eq!(again.dupl_nodes(), &[NODE_B, NODE_C]);
    assert_eq!(again.cluster_key(), rsv.cluster_key());
}

#[test]
fn query_reserves_only_on_the_working_master() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 0, &[NODE_A, NODE_B], 0, 0);
    set_placement(&ns, 1, &[NODE_B, NODE_A], 0, 0);
    set_placement(&ns, 2, &[NODE_B, NODE_C], 0, 0);

    assert!(ns.reserve_query(0).is_ok());
    assert!(ns.reserve_query(1).is_err());
    assert!(ns.reserve_query(2).is_err());

    let reservations = ns.prereserve_query();
    assert_eq!(reservations.len(), lattice_partition::N_PARTITIONS);
    assert!(reservations[0].is_some());
    assert!(reservations[1].is_none());
    assert!(reservations[2].is_none());

    // Unconfigured partitions have an empty replica list and reserve nowhere.
    assert!(reservations[100].is_none());
}
