//! Completed-voxel counter shared by the workers of one run.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

#[derive(Debug, Clone)]
pub struct Progress {
    total: usize,
    every: usize,
    done: Arc<AtomicUsize>,
}

impl Progress {
    /// Log roughly every tenth of the run.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            every: (total / 10).max(1),
            done: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Count one finished voxel and return the new total.
    pub fn inc(&self) -> usize {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.every == 0 || done == self.total {
            info!(done, total = self.total, "voxels fitted");
        }
        done
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
