//! Bounded fan-out of independent per-asset work.
//!
//! Hashing and export run one job per asset on a rayon pool. Progress is
//! reported over an `mpsc` channel so the caller can render it however it
//! likes.

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use crate::error::Result;

/// Update messages sent while a batch runs.
#[derive(Debug, Clone)]
pub enum TaskProgress {
    Started {
        total: usize,
    },
    /// One job finished, successfully or not.
    Finished {
        current: usize,
        total: usize,
        item: String,
        error: Option<String>,
    },
    Completed {
        succeeded: usize,
        failed: usize,
    },
}

impl TaskProgress {
    /// Progress percentage (0-100) for `Finished` updates.
    pub fn percent(&self) -> Option<u8> {
        match *self {
            TaskProgress::Finished { current, total, .. } if total > 0 => {
                Some(((current as f64 / total as f64) * 100.0).min(100.0) as u8)
            }
            _ => None,
        }
    }
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// A pool with `threads` workers; 0 uses rayon's default.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lumio-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `work` over every item. Results come back in input order; one
    /// failure does not stop the others.
    pub fn run<T, R, L, F>(
        &self,
        items: &[T],
        label: L,
        progress: Option<&mpsc::Sender<TaskProgress>>,
        work: F,
    ) -> Vec<Result<R>>
    where
        T: Sync,
        R: Send,
        L: Fn(&T) -> String + Sync,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let total = items.len();
        if let Some(tx) = progress {
            let _ = tx.send(TaskProgress::Started { total });
        }

        let done = AtomicUsize::new(0);
        let results: Vec<Result<R>> = self.pool.install(|| {
            items
                .par_iter()
                .map_with(progress.cloned(), |tx, item| {
                    let result = work(item);
                    let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Err(e) = &result {
                        tracing::warn!(item = %label(item), error = %e, "Task failed");
                    }
                    if let Some(tx) = tx {
                        let _ = tx.send(TaskProgress::Finished {
                            current,
                            total,
                            item: label(item),
                            error: result.as_ref().err().map(ToString::to_string),
                        });
                    }
                    result
                })
                .collect()
        });

        let failed = results.iter().filter(|r| r.is_err()).count();
        if let Some(tx) = progress {
            let _ = tx.send(TaskProgress::Completed {
                succeeded: total - failed,
                failed,
            });
        }
        results
    }
}
