//! Timed migrate reservations under partition lock contention, with real
//! threads holding the lock.

mod common;

use std::thread;
use std::time::Duration;

use common::{modern_namespace, set_placement, NODE_A, NODE_B};
use lattice_partition::ReserveError;

#[test]
fn migrate_reserves_regardless_of_role() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 5, &[NODE_B, NODE_A], 0, 0);

    // Prole, non-replica, even unconfigured partitions reserve for migration.
    let rsv = ns.reserve_migrate(5);
    assert_eq!(rsv.pid(), 5);
    let _ = ns.reserve_migrate(6);
}

#[test]
fn timed_migrate_wins_when_lock_frees_in_time() {
    let ns = modern_namespace("kv", NODE_A);

    thread::scope(|scope| {
        let holder_ns = ns.clone();
        scope.spawn(move || {
            let guard = holder_ns.partition(9).lock();
            thread::sleep(Duration::from_millis(100));
            drop(guard);
        });

        // Give the holder time to take the lock first.
        thread::sleep(Duration::from_millis(20));

        let rsv = ns
            .reserve_migrate_timeout(9, Duration::from_secs(5))
            .expect("lock freed within budget");
        assert_eq!(rsv.pid(), 9);
    });
}

#[test]
fn timed_migrate_expires_under_a_held_lock() {
    let ns = modern_namespace("kv", NODE_A);

    thread::scope(|scope| {
        let holder_ns = ns.clone();
        scope.spawn(move || {
            let guard = holder_ns.partition(9).lock();
            thread::sleep(Duration::from_millis(500));
            drop(guard);
        });

        thread::sleep(Duration::from_millis(50));

        let err = ns
            .reserve_migrate_timeout(9, Duration::from_millis(50))
            .unwrap_err();
        assert_eq!(err, ReserveError::Timeout { pid: 9 });
    });

    // The holder released on exit; an untimed reserve goes through.
    let _ = ns.reserve_migrate(9);
}

#[test]
fn reservation_moves_between_threads() {
    let ns = modern_namespace("kv", NODE_A);
    set_placement(&ns, 17, &[NODE_A, NODE_B], 0, 0);
    ns.partition(17).lock().cluster_key = 0x77;

    let rsv = ns.reserve_write(17).expect("write reserve");

    // Hand-off transfers the single release obligation with the value.
    let handle = thread::spawn(move || {
        assert_eq!(rsv.cluster_key(), 0x77);
        drop(rsv);
    });
    handle.join().expect("join");
}
