//! Realization partitioning.
//!
//! The first `n` ids are split into one contiguous shard per worker with
//! array-split semantics (sizes differ by at most one, earlier shards take
//! the remainder), then each shard is cut into consecutive batches of at most
//! `batch_size` ids. Equal inputs always give the same plan.

use std::fmt;

use ef_core::RealizationId;
use serde::{Deserialize, Serialize};

use crate::{BatchError, BatchResult};

/// (worker, batch index) address of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchKey {
    pub worker: usize,
    pub batch: usize,
}

impl BatchKey {
    pub fn new(worker: usize, batch: usize) -> Self {
        Self { worker, batch }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank{}_batch{}", self.worker, self.batch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub key: BatchKey,
    pub realizations: Vec<RealizationId>,
}

/// The realizations assigned to one worker, already cut into batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerShard {
    pub worker: usize,
    pub batches: Vec<Batch>,
}

impl WorkerShard {
    pub fn realization_count(&self) -> usize {
        self.batches.iter().map(|b| b.realizations.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    requested: usize,
    batch_size: usize,
    shards: Vec<WorkerShard>,
}

#[derive(Serialize)]
struct PlanInputs<'a> {
    realizations: &'a [RealizationId],
    workers: usize,
    batch_size: usize,
}

impl BatchPlan {
    /// Plan `requested` realizations from `available` over `workers` workers.
    pub fn new(
        available: &[RealizationId],
        requested: usize,
        workers: usize,
        batch_size: usize,
    ) -> BatchResult<Self> {
        if requested > available.len() {
            return Err(BatchError::NotEnoughRealizations {
                requested,
                available: available.len(),
            });
        }
        if workers == 0 {
            return Err(BatchError::NoWorkers);
        }
        if batch_size == 0 {
            return Err(BatchError::EmptyBatchSize);
        }

        let selected = &available[..requested];
        let shards = split_even(selected, workers)
            .into_iter()
            .enumerate()
            .map(|(worker, shard)| WorkerShard {
                worker,
                batches: shard
                    .chunks(batch_size)
                    .enumerate()
                    .map(|(batch, ids)| Batch {
                        key: BatchKey::new(worker, batch),
                        realizations: ids.to_vec(),
                    })
                    .collect(),
            })
            .collect();

        Ok(Self {
            requested,
            batch_size,
            shards,
        })
    }

    pub fn workers(&self) -> usize {
        self.shards.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn shards(&self) -> &[WorkerShard] {
        &self.shards
    }

    pub fn shard(&self, worker: usize) -> Option<&WorkerShard> {
        self.shards.get(worker)
    }

    /// Every batch, worker-major.
    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.shards.iter().flat_map(|s| s.batches.iter())
    }

    pub fn batch_keys(&self) -> Vec<BatchKey> {
        self.batches().map(|b| b.key).collect()
    }

    pub fn expected_batch_count(&self) -> usize {
        self.shards.iter().map(|s| s.batches.len()).sum()
    }

    /// The selected realizations in plan order.
    pub fn realization_ids(&self) -> Vec<RealizationId> {
        self.batches()
            .flat_map(|b| b.realizations.iter().cloned())
            .collect()
    }

    pub fn realization_count(&self) -> usize {
        self.requested
    }

    /// Hash of the inputs that determine this plan.
    pub fn fingerprint(&self) -> BatchResult<String> {
        let realizations = self.realization_ids();
        Ok(ef_store::content_hash(&PlanInputs {
            realizations: &realizations,
            workers: self.workers(),
            batch_size: self.batch_size,
        })?)
    }
}

/// Split `items` into `parts` contiguous slices whose lengths differ by at
/// most one; the first `len % parts` slices get the extra element.
pub fn split_even<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;
    let mut out = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        out.push(&items[start..start + len]);
        start += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ef_core::numbered_realizations;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn ten_over_three_workers_is_four_three_three() {
        let ids = numbered_realizations(10);
        let sizes: Vec<usize> = split_even(&ids, 3).iter().map(|s| s.len()).collect();
        assert_eq!(sizes, [4, 3, 3]);
    }

    #[test]
    fn eight_over_two_workers_with_cap_five() {
        let ids = numbered_realizations(8);
        let plan = BatchPlan::new(&ids, 8, 2, 5).unwrap();

        assert_eq!(plan.expected_batch_count(), 2);
        let w0 = plan.shard(0).unwrap();
        let w1 = plan.shard(1).unwrap();
        assert_eq!(w0.batches.len(), 1);
        assert_eq!(w1.batches.len(), 1);
        assert_eq!(w0.batches[0].key, BatchKey::new(0, 0));
        assert_eq!(w1.batches[0].key, BatchKey::new(1, 0));
        assert_eq!(w0.batches[0].realizations, ids[..4]);
        assert_eq!(w1.batches[0].realizations, ids[4..]);
    }

    #[test]
    fn last_batch_in_shard_may_be_short() {
        let ids = numbered_realizations(23);
        let plan = BatchPlan::new(&ids, 23, 2, 5).unwrap();
        let sizes: Vec<Vec<usize>> = plan
            .shards()
            .iter()
            .map(|s| s.batches.iter().map(|b| b.realizations.len()).collect())
            .collect();
        assert_eq!(sizes, [vec![5, 5, 2], vec![5, 5, 1]]);
        assert_eq!(plan.expected_batch_count(), 6);
    }

    #[test]
    fn only_the_first_n_ids_are_used() {
        let ids = numbered_realizations(10);
        let plan = BatchPlan::new(&ids, 3, 1, 10).unwrap();
        assert_eq!(plan.realization_ids(), ids[..3]);
    }

    #[test]
    fn more_workers_than_realizations_leaves_empty_shards() {
        let ids = numbered_realizations(2);
        let plan = BatchPlan::new(&ids, 2, 4, 10).unwrap();
        assert_eq!(plan.workers(), 4);
        assert_eq!(plan.expected_batch_count(), 2);
        assert!(plan.shard(3).unwrap().batches.is_empty());
    }

    #[test]
    fn configuration_errors() {
        let ids = numbered_realizations(5);
        assert!(matches!(
            BatchPlan::new(&ids, 6, 1, 1),
            Err(BatchError::NotEnoughRealizations {
                requested: 6,
                available: 5
            })
        ));
        assert!(matches!(
            BatchPlan::new(&ids, 5, 0, 1),
            Err(BatchError::NoWorkers)
        ));
        assert!(matches!(
            BatchPlan::new(&ids, 5, 1, 0),
            Err(BatchError::EmptyBatchSize)
        ));
    }

    #[test]
    fn fingerprint_tracks_inputs() {
        let ids = numbered_realizations(6);
        let a = BatchPlan::new(&ids, 6, 2, 2).unwrap();
        let b = BatchPlan::new(&ids, 6, 2, 2).unwrap();
        let c = BatchPlan::new(&ids, 6, 3, 2).unwrap();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    proptest! {
        #[test]
        fn plan_covers_selection_exactly_once(
            available in 0_usize..60,
            workers in 1_usize..9,
            batch_size in 1_usize..12,
            take in 0.0_f64..=1.0,
        ) {
            let ids = numbered_realizations(available);
            let requested = ((available as f64) * take).floor() as usize;
            let plan = BatchPlan::new(&ids, requested, workers, batch_size).unwrap();
            let again = BatchPlan::new(&ids, requested, workers, batch_size).unwrap();
            prop_assert_eq!(&plan, &again);

            let assigned = plan.realization_ids();
            prop_assert_eq!(&assigned[..], &ids[..requested]);
            let unique: HashSet<_> = assigned.iter().collect();
            prop_assert_eq!(unique.len(), requested);

            let sizes: Vec<usize> = plan.shards().iter().map(|s| s.realization_count()).collect();
            let max = sizes.iter().copied().max().unwrap_or(0);
            let min = sizes.iter().copied().min().unwrap_or(0);
            prop_assert!(max - min <= 1);
            prop_assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
            prop_assert!(plan.batches().all(|b| !b.realizations.is_empty() && b.realizations.len() <= batch_size));
        }
    }
}
