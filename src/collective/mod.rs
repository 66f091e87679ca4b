//! Worker collectives for the distributed column-partitioned grower.
//!
//! Each worker only sees a subset of feature columns, so two reductions keep
//! the workers in lockstep: per-node best candidates are combined with the
//! better-of-two [`SplitEntry`] merge, and row re-routing decisions are
//! combined as a bitwise-OR over a row bitmap ("this row deviates from its
//! node's default child"). [`SingleWorker`] is the identity collective;
//! [`SharedCollective`] runs the same protocol between threads of one
//! process, which is what the multi-worker tests use.

use std::sync::{Arc, Condvar, Mutex};

use crate::training::SplitEntry;

/// Synchronous allreduce operations between workers.
pub trait Collective: Send + Sync {
    fn rank(&self) -> usize;
    fn num_workers(&self) -> usize;

    /// Combine `words` across workers with bitwise OR; every worker returns
    /// with the combined value.
    fn allreduce_bitor(&self, words: &mut [u32]);

    /// Combine candidate splits element-wise with the monotone best-of merge.
    fn allreduce_splits(&self, entries: &mut [SplitEntry]);
}

/// The trivial one-worker collective.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleWorker;

impl Collective for SingleWorker {
    fn rank(&self) -> usize {
        0
    }

    fn num_workers(&self) -> usize {
        1
    }

    fn allreduce_bitor(&self, _words: &mut [u32]) {}

    fn allreduce_splits(&self, _entries: &mut [SplitEntry]) {}
}

// =============================================================================
// BitMap
// =============================================================================

/// Compact row bitmap packed into `u32` words, reducible with bitwise OR.
#[derive(Debug, Clone, Default)]
pub struct BitMap {
    data: Vec<u32>,
}

impl BitMap {
    pub fn from_bools(flags: &[bool]) -> Self {
        let mut data = vec![0u32; flags.len().div_ceil(32)];
        for (i, &flag) in flags.iter().enumerate() {
            if flag {
                data[i >> 5] |= 1 << (i & 31);
            }
        }
        Self { data }
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        (self.data[i >> 5] >> (i & 31)) & 1 != 0
    }

    #[inline]
    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.data
    }
}

// =============================================================================
// SharedCollective
// =============================================================================

struct Round<T> {
    generation: u64,
    arrived: usize,
    buf: Vec<T>,
    result: Vec<T>,
}

impl<T> Default for Round<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            arrived: 0,
            buf: Vec::new(),
            result: Vec::new(),
        }
    }
}

struct Shared {
    num_workers: usize,
    words: (Mutex<Round<u32>>, Condvar),
    splits: (Mutex<Round<SplitEntry>>, Condvar),
}

/// In-process collective connecting `num_workers` threads.
///
/// All workers must call the same sequence of operations; each call blocks
/// until every worker of the round has contributed.
pub struct SharedCollective {
    shared: Arc<Shared>,
    rank: usize,
}

impl SharedCollective {
    /// One handle per worker, all connected to the same channel.
    pub fn create(num_workers: usize) -> Vec<SharedCollective> {
        assert!(num_workers >= 1);
        let shared = Arc::new(Shared {
            num_workers,
            words: (Mutex::new(Round::default()), Condvar::new()),
            splits: (Mutex::new(Round::default()), Condvar::new()),
        });
        (0..num_workers)
            .map(|rank| SharedCollective {
                shared: Arc::clone(&shared),
                rank,
            })
            .collect()
    }

    fn allreduce<T, F>(
        pair: &(Mutex<Round<T>>, Condvar),
        num_workers: usize,
        data: &mut [T],
        combine: F,
    ) where
        T: Copy,
        F: Fn(&mut T, &T),
    {
        let (mutex, cv) = pair;
        let mut round = mutex.lock().unwrap();
        let generation = round.generation;

        if round.arrived == 0 {
            round.buf.clear();
            round.buf.extend_from_slice(data);
        } else {
            assert_eq!(
                round.buf.len(),
                data.len(),
                "workers disagree on allreduce length"
            );
            for (acc, x) in round.buf.iter_mut().zip(data.iter()) {
                combine(acc, x);
            }
        }
        round.arrived += 1;

        if round.arrived == num_workers {
            round.result = std::mem::take(&mut round.buf);
            round.arrived = 0;
            round.generation += 1;
            cv.notify_all();
        } else {
            while round.generation == generation {
                round = cv.wait(round).unwrap();
            }
        }
        data.copy_from_slice(&round.result);
    }
}

impl Collective for SharedCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_workers(&self) -> usize {
        self.shared.num_workers
    }

    fn allreduce_bitor(&self, words: &mut [u32]) {
        Self::allreduce(&self.shared.words, self.shared.num_workers, words, |a, b| {
            *a |= *b
        });
    }

    fn allreduce_splits(&self, entries: &mut [SplitEntry]) {
        Self::allreduce(
            &self.shared.splits,
            self.shared.num_workers,
            entries,
            |a, b| {
                a.update_entry(b);
            },
        );
    }
}
