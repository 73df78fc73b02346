//! Shared memory pool with policy-driven eviction.
//!
//! Under Hybrid both scheduling classes charge footprints here, so the pool
//! is the single mutual-exclusion region crossed per tick. Eviction only
//! ever considers residents marked evictable (backgrounded or completed);
//! running tasks are pinned by their class and can never be selected.

use std::sync::Mutex;

use crate::budget::ResourceBudget;
use crate::errors::SubmitError;
use crate::types::{MemUnits, TaskId, Tick};

/// Which resident to reclaim first when memory runs short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Reclaim the resident idle the longest.
    #[default]
    LeastRecentlyUsed,
    /// Reclaim the resident with the biggest footprint.
    LargestFootprint,
}

#[derive(Debug, Clone)]
struct Resident {
    task: TaskId,
    footprint: MemUnits,
    last_active: Tick,
    evictable: bool,
}

/// A memory reclaim performed during a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted {
    pub task: TaskId,
    pub freed: MemUnits,
}

struct PoolState {
    budget: ResourceBudget,
    residents: Vec<Resident>,
    policy: EvictionPolicy,
}

/// Capacity-bounded memory shared by all scheduling classes.
pub struct MemoryPool {
    inner: Mutex<PoolState>,
}

impl MemoryPool {
    pub fn new(capacity: MemUnits, policy: EvictionPolicy) -> Self {
        MemoryPool {
            inner: Mutex::new(PoolState {
                budget: ResourceBudget::new(capacity),
                residents: Vec::new(),
                policy,
            }),
        }
    }

    /// Charge `footprint` for `task`, evicting residents as needed.
    ///
    /// Returns the reclaims performed, in eviction order, so the caller can
    /// record the corresponding events and finalize victim states. Fails
    /// with `AdmissionRejected` if the footprint can never fit, or with
    /// `ResourceExhausted` if it would fit but the reclaimable set cannot
    /// cover it. On failure nothing is evicted or charged.
    pub fn charge(
        &self,
        task: TaskId,
        footprint: MemUnits,
        now: Tick,
    ) -> Result<Vec<Evicted>, SubmitError> {
        let mut st = self.inner.lock().unwrap();

        if footprint > st.budget.capacity() {
            return Err(SubmitError::AdmissionRejected {
                needed: footprint,
                available: st.budget.capacity(),
            });
        }

        let reclaimable: MemUnits = st
            .residents
            .iter()
            .filter(|r| r.evictable)
            .map(|r| r.footprint)
            .sum();
        if st.budget.available() + reclaimable < footprint {
            return Err(SubmitError::ResourceExhausted {
                needed: footprint,
                available: st.budget.available() + reclaimable,
            });
        }

        let mut evicted = Vec::new();
        while st.budget.available() < footprint {
            let idx = pick_victim(&st).expect("reclaimable set verified above");
            let victim = st.residents.remove(idx);
            st.budget.release(victim.footprint);
            evicted.push(Evicted {
                task: victim.task,
                freed: victim.footprint,
            });
        }

        let charged = st.budget.try_charge(footprint);
        assert!(charged, "charge must succeed after eviction");
        st.residents.push(Resident {
            task,
            footprint,
            last_active: now,
            evictable: false,
        });
        Ok(evicted)
    }

    /// Release a resident's memory. Returns the freed footprint, or 0 if
    /// the task was not resident.
    pub fn release(&self, task: TaskId) -> MemUnits {
        let mut st = self.inner.lock().unwrap();
        let Some(idx) = st.residents.iter().position(|r| r.task == task) else {
            return 0;
        };
        let resident = st.residents.remove(idx);
        st.budget.release(resident.footprint);
        resident.footprint
    }

    /// Refresh a resident's least-recently-used key.
    pub fn touch(&self, task: TaskId, now: Tick) {
        let mut st = self.inner.lock().unwrap();
        if let Some(r) = st.residents.iter_mut().find(|r| r.task == task) {
            r.last_active = now;
        }
    }

    /// Mark a resident eligible (or ineligible) for eviction.
    pub fn set_evictable(&self, task: TaskId, evictable: bool) {
        let mut st = self.inner.lock().unwrap();
        if let Some(r) = st.residents.iter_mut().find(|r| r.task == task) {
            r.evictable = evictable;
        }
    }

    pub fn allocated(&self) -> MemUnits {
        self.inner.lock().unwrap().budget.allocated()
    }

    pub fn capacity(&self) -> MemUnits {
        self.inner.lock().unwrap().budget.capacity()
    }

    pub fn available(&self) -> MemUnits {
        self.inner.lock().unwrap().budget.available()
    }

    /// Total footprint currently marked evictable.
    pub fn reclaimable(&self) -> MemUnits {
        self.inner
            .lock()
            .unwrap()
            .residents
            .iter()
            .filter(|r| r.evictable)
            .map(|r| r.footprint)
            .sum()
    }
}

/// Select the next victim index, or None if nothing is evictable.
/// Ties resolve to the earliest resident, keeping eviction deterministic.
fn pick_victim(st: &PoolState) -> Option<usize> {
    let candidates = st
        .residents
        .iter()
        .enumerate()
        .filter(|(_, r)| r.evictable);
    match st.policy {
        EvictionPolicy::LeastRecentlyUsed => {
            candidates.min_by_key(|(i, r)| (r.last_active, *i)).map(|(i, _)| i)
        }
        EvictionPolicy::LargestFootprint => candidates
            .max_by(|(ai, a), (bi, b)| a.footprint.cmp(&b.footprint).then(bi.cmp(ai)))
            .map(|(i, _)| i),
    }
}
