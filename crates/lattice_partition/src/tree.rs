//! Arena-resident, sprig-sharded index trees.
//!
//! The partition core treats trees as opaque refcounted handles: a partition
//! record keeps one strong reference, every reservation clones one more, and
//! the balance engine may swap the record's handle while outstanding
//! reservations keep the replaced tree alive. `Arena` stands in for the
//! persistent memory the durable-shutdown path writes sprig roots into, so a
//! warm resume can rebuild a tree from its roots alone.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tree geometry shared by every partition tree in a namespace.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TreeShared {
    /// Sprigs (sub-trees) per tree; must be a power of two.
    pub n_sprigs: usize,
}

/// Errors surfaced while resuming a tree from persisted roots.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("expected {expected} sprig roots, got {got}")]
    RootCountMismatch { expected: usize, got: usize },
    #[error("sprig root {root:#x} is not present in the arena")]
    UnknownRoot { root: u64 },
}

/// Slot store standing in for the persistent arena trees live in.
///
/// Durable shutdown parks each sprig's contents in a slot and hands back the
/// slot id as that sprig's root; resume looks the slots up again. Root id 0
/// is reserved for "empty sprig".
#[derive(Debug)]
pub struct Arena {
    slots: Mutex<HashMap<u64, Vec<u64>>>,
    next_root: AtomicU64,
}

#[derive(Serialize, Deserialize)]
struct ArenaSnapshot {
    next_root: u64,
    slots: Vec<(u64, Vec<u64>)>,
}

impl Arena {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            next_root: AtomicU64::new(1),
        })
    }

    /// Load an arena previously written with [`Arena::save`].
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Arc<Self>> {
        let data = fs::read(path.as_ref()).context("read arena file")?;
        let snapshot: ArenaSnapshot =
            serde_json::from_slice(&data).context("decode arena file")?;
        Ok(Arc::new(Self {
            next_root: AtomicU64::new(snapshot.next_root.max(1)),
            slots: Mutex::new(snapshot.slots.into_iter().collect()),
        }))
    }

    /// Persist the arena so a later process can warm-resume from it.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let snapshot = ArenaSnapshot {
            next_root: self.next_root.load(Ordering::Relaxed),
            slots: self
                .slots
                .lock()
                .iter()
                .map(|(root, digests)| (*root, digests.clone()))
                .collect(),
        };
        let data = serde_json::to_vec_pretty(&snapshot).context("serialize arena")?;
        fs::write(path.as_ref(), data).context("write arena file")?;
        Ok(())
    }

    fn park(&self, digests: Vec<u64>) -> u64 {
        if digests.is_empty() {
            return 0;
        }
        let root = self.next_root.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(root, digests);
        root
    }

    fn resume(&self, root: u64) -> Result<Vec<u64>, TreeError> {
        if root == 0 {
            return Ok(Vec::new());
        }
        self.slots
            .lock()
            .get(&root)
            .cloned()
            .ok_or(TreeError::UnknownRoot { root })
    }
}

/// One partition's record index: digest sets sharded across sprigs, with a
/// relaxed element counter serving `size` probes.
#[derive(Debug)]
pub struct IndexTree {
    shared: TreeShared,
    arena: Arc<Arena>,
    sprigs: Vec<Mutex<BTreeSet<u64>>>,
    n_elements: AtomicU64,
}

impl IndexTree {
    /// Create an empty tree in `arena`.
    pub fn create(shared: &TreeShared, arena: &Arc<Arena>) -> Arc<Self> {
        let sprigs = (0..shared.n_sprigs)
            .map(|_| Mutex::new(BTreeSet::new()))
            .collect();
        Arc::new(Self {
            shared: *shared,
            arena: arena.clone(),
            sprigs,
            n_elements: AtomicU64::new(0),
        })
    }

    /// Rebuild a tree from the sprig roots a durable shutdown wrote out.
    pub fn resume(
        shared: &TreeShared,
        arena: &Arc<Arena>,
        roots: &[u64],
    ) -> Result<Arc<Self>, TreeError> {
        if roots.len() != shared.n_sprigs {
            return Err(TreeError::RootCountMismatch {
                expected: shared.n_sprigs,
                got: roots.len(),
            });
        }

        let mut sprigs = Vec::with_capacity(shared.n_sprigs);
        let mut n_elements = 0u64;

        for &root in roots {
            let digests = arena.resume(root)?;
            n_elements += digests.len() as u64;
            sprigs.push(Mutex::new(digests.into_iter().collect()));
        }

        Ok(Arc::new(Self {
            shared: *shared,
            arena: arena.clone(),
            sprigs,
            n_elements: AtomicU64::new(n_elements),
        }))
    }

    /// Durable shutdown: park every sprig in the arena and write the sprig
    /// roots out. `roots_out` must span exactly `n_sprigs` slots.
    pub fn shutdown(&self, roots_out: &mut [u64]) {
        assert_eq!(roots_out.len(), self.shared.n_sprigs);

        for (sprig, root_out) in self.sprigs.iter().zip(roots_out) {
            let digests: Vec<u64> = sprig.lock().iter().copied().collect();
            *root_out = self.arena.park(digests);
        }
    }

    /// Element count, tombstoned records included.
    pub fn size(&self) -> u64 {
        self.n_elements.load(Ordering::Relaxed)
    }

    /// Insert a record digest; returns false when already present.
    pub fn insert(&self, digest: u64) -> bool {
        let inserted = self.sprig_for(digest).lock().insert(digest);
        if inserted {
            self.n_elements.fetch_add(1, Ordering::Relaxed);
        }
        inserted
    }

    /// Remove a record digest; returns false when absent.
    pub fn remove(&self, digest: u64) -> bool {
        let removed = self.sprig_for(digest).lock().remove(&digest);
        if removed {
            self.n_elements.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    // Sprig selection uses the digest's top bits so each sprig holds a
    // contiguous digest range.
    fn sprig_for(&self, digest: u64) -> &Mutex<BTreeSet<u64>> {
        let bits = self.shared.n_sprigs.trailing_zeros();
        let ix = if bits == 0 {
            0
        } else {
            (digest >> (64 - bits)) as usize
        };
        &self.sprigs[ix]
    }
}
