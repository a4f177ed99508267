//! A bounded worker pool that processes rows out of order and delivers the
//! results in order.

use crate::config::BatchOptions;
use crate::error::{MmpError, Result};
use crossbeam::channel::bounded;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::*;

/// Cooperative cancellation shared between the caller and the engine.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MmpError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The per-row work of a batch.
///
/// `compute` runs on a worker thread. An `Err` from it is fatal and halts
/// the batch; row-level failures belong in `Output`.
pub trait RowTask: Sync {
    type Row: Send;
    type Output: Send;

    fn compute(&self, index: usize, row: Self::Row) -> Result<Self::Output>;

    /// Runs exactly once for every row handed to a worker, whether it was
    /// computed, failed or skipped after cancellation.
    fn cleanup(&self, _index: usize) {}
}

struct RowGuard<'a, T: RowTask> {
    task: &'a T,
    index: usize,
}

impl<T: RowTask> Drop for RowGuard<'_, T> {
    fn drop(&mut self) {
        self.task.cleanup(self.index);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Rows delivered to the `finished` callback.
    pub rows: usize,
}

pub struct BatchEngine {
    options: BatchOptions,
    cancel: CancellationToken,
}

impl BatchEngine {
    pub fn new(options: BatchOptions, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `task` over `rows` and hand every output to `finished` in row
    /// order.
    ///
    /// At most `queue_capacity` rows are between dispatch and delivery at any
    /// time, so a slow row holds back the producer instead of letting results
    /// pile up behind it. On cancellation or a fatal error, rows already
    /// delivered stay delivered and the error is returned.
    pub fn run<T, I, F>(&self, task: &T, rows: I, mut finished: F) -> Result<BatchSummary>
    where
        T: RowTask,
        I: IntoIterator<Item = T::Row>,
        I::IntoIter: Send,
        F: FnMut(usize, T::Output) -> Result<()>,
    {
        let threads = self.options.threads.max(1);
        let capacity = self.options.queue_capacity.max(1);
        info!("Starting batch with {threads} workers, queue capacity {capacity}");

        let (job_tx, job_rx) = bounded::<(usize, T::Row)>(capacity);
        let (result_tx, result_rx) = bounded::<(usize, Result<T::Output>)>(capacity);
        // One credit per row between dispatch and in-order delivery.
        let (credit_tx, credit_rx) = bounded::<()>(capacity);
        for _ in 0..capacity {
            let _ = credit_tx.send(());
        }
        let mut credit_tx = Some(credit_tx);
        let halt = AtomicBool::new(false);
        let cancel = &self.cancel;
        let stopped = || cancel.is_cancelled() || halt.load(Ordering::SeqCst);

        let mut delivered = 0;
        let mut failure: Option<MmpError> = None;
        thread::scope(|scope| {
            let rows = rows.into_iter();
            scope.spawn(move || {
                for (index, row) in rows.enumerate() {
                    if credit_rx.recv().is_err() || stopped() {
                        break;
                    }
                    if job_tx.send((index, row)).is_err() {
                        break;
                    }
                }
            });

            for worker in 0..threads {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let stopped = &stopped;
                scope.spawn(move || {
                    for (index, row) in job_rx.iter() {
                        let _guard = RowGuard { task, index };
                        let output = if stopped() {
                            Err(MmpError::Cancelled)
                        } else {
                            task.compute(index, row)
                        };
                        if result_tx.send((index, output)).is_err() {
                            break;
                        }
                    }
                    trace!("Worker {worker} finished");
                });
            }
            drop(job_rx);
            drop(result_tx);

            let mut pending = BTreeMap::new();
            for (index, output) in result_rx.iter() {
                if failure.is_some() {
                    continue;
                }
                if cancel.is_cancelled() {
                    failure = Some(MmpError::Cancelled);
                } else {
                    match output {
                        Ok(output) => {
                            pending.insert(index, output);
                        }
                        Err(err) => {
                            error!("Row {index} failed, halting batch: {err}");
                            failure = Some(err);
                        }
                    }
                }
                while failure.is_none() {
                    let Some(output) = pending.remove(&delivered) else {
                        break;
                    };
                    if let Err(err) = finished(delivered, output) {
                        failure = Some(err);
                        break;
                    }
                    delivered += 1;
                    if let Some(credits) = &credit_tx {
                        let _ = credits.send(());
                    }
                }
                if failure.is_some() {
                    halt.store(true, Ordering::SeqCst);
                    // Wakes a producer waiting for credit.
                    credit_tx = None;
                }
            }
        });

        if failure.is_none() && self.cancel.is_cancelled() {
            failure = Some(MmpError::Cancelled);
        }
        match failure {
            Some(err) => {
                warn!("Batch stopped after {delivered} rows: {err}");
                Err(err)
            }
            None => {
                info!("Batch finished, {delivered} rows");
                Ok(BatchSummary { rows: delivered })
            }
        }
    }
}
