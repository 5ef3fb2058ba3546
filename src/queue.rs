//! Serial job queue with coalescing of pending submissions.
//!
//! A [`JobQueue`] runs one job at a time on a background tokio task, in
//! submission order. Before a new payload is appended it is offered to a
//! caller-supplied merge function together with each job that has not started
//! yet; the first non-`None` answer replaces that job's payload and the new
//! submission joins it instead of creating another entry. All submitters of a
//! merged entry observe the same outcome.
//!
//! The queue knows nothing about what jobs do. Thumbnail generation uses it
//! with "same photo replaces the pending request" as the merge rule.
//!
//! ```text
//! submit(A)  ─┐
//! submit(B)  ─┼─► [A][B] ──► worker ──► processor(A) … processor(B)
//! submit(B') ─┘      ▲
//!                    └── merge(B', B) = Some(B') → [A][B'] (two waiters)
//! ```

use futures::future::BoxFuture;
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{Notify, oneshot};

/// `merge(new, pending)`: `Some(merged)` folds the new submission into the
/// pending job; `None` keeps them separate.
pub type MergeFn<J> = dyn Fn(&J, &J) -> Option<J> + Send + Sync;

/// Runs one job to completion.
pub type ProcessFn<J, T, E> = dyn Fn(J) -> BoxFuture<'static, Result<T, E>> + Send + Sync;

#[derive(Error, Debug)]
pub enum JobError<E> {
    #[error("job failed: {0}")]
    Failed(Arc<E>),
    /// The job panicked or the queue shut down before it ran.
    #[error("job abandoned before completion")]
    Abandoned,
}

impl<E> JobError<E> {
    /// The processor's error, if the job ran and failed.
    pub fn failure(&self) -> Option<&E> {
        match self {
            JobError::Failed(e) => Some(e),
            JobError::Abandoned => None,
        }
    }
}

impl<E> Clone for JobError<E> {
    fn clone(&self) -> Self {
        match self {
            JobError::Failed(e) => JobError::Failed(Arc::clone(e)),
            JobError::Abandoned => JobError::Abandoned,
        }
    }
}

type Outcome<T, E> = Result<T, JobError<E>>;

struct Entry<J, T, E> {
    payload: J,
    waiters: Vec<oneshot::Sender<Outcome<T, E>>>,
}

struct State<J, T, E> {
    pending: VecDeque<Entry<J, T, E>>,
    closed: bool,
}

struct Shared<J, T, E> {
    state: Mutex<State<J, T, E>>,
    notify: Notify,
}

impl<J, T, E> Shared<J, T, E> {
    fn lock(&self) -> MutexGuard<'_, State<J, T, E>> {
        // State stays consistent across a panic: every mutation is a single push/pop
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Completion handle for one submission.
pub struct JobHandle<T, E> {
    rx: oneshot::Receiver<Outcome<T, E>>,
}

impl<T, E> JobHandle<T, E> {
    /// Wait for the job (or the job this submission was merged into).
    pub async fn result(self) -> Outcome<T, E> {
        self.rx.await.unwrap_or(Err(JobError::Abandoned))
    }
}

/// Serial, coalescing job queue. See the [module docs](self).
pub struct JobQueue<J, T, E> {
    shared: Arc<Shared<J, T, E>>,
    merge: Box<MergeFn<J>>,
}

impl<J, T, E> JobQueue<J, T, E>
where
    J: Send + 'static,
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Create a queue and spawn its worker on the current tokio runtime.
    pub fn new<M, P>(merge: M, processor: P) -> Self
    where
        M: Fn(&J, &J) -> Option<J> + Send + Sync + 'static,
        P: Fn(J) -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        });
        let processor: Arc<ProcessFn<J, T, E>> = Arc::new(processor);
        tokio::spawn(run_worker(Arc::clone(&shared), processor));
        Self {
            shared,
            merge: Box::new(merge),
        }
    }

    /// Queue `payload`, merging it into a pending job when possible.
    pub fn submit(&self, payload: J) -> JobHandle<T, E> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.shared.lock();

        let merged = state
            .pending
            .iter()
            .enumerate()
            .find_map(|(i, entry)| (self.merge)(&payload, &entry.payload).map(|m| (i, m)));

        match merged {
            Some((index, merged_payload)) => {
                debug!("Merged submission into pending job #{}", index);
                let entry = &mut state.pending[index];
                entry.payload = merged_payload;
                entry.waiters.push(tx);
            }
            None => {
                state.pending.push_back(Entry {
                    payload,
                    waiters: vec![tx],
                });
                self.shared.notify.notify_one();
            }
        }

        JobHandle { rx }
    }

    /// Number of jobs waiting to start.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }
}

impl<J, T, E> Drop for JobQueue<J, T, E> {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_one();
    }
}

async fn next_entry<J, T, E>(shared: &Shared<J, T, E>) -> Option<Entry<J, T, E>> {
    loop {
        let notified = shared.notify.notified();
        {
            let mut state = shared.lock();
            if let Some(entry) = state.pending.pop_front() {
                return Some(entry);
            }
            if state.closed {
                return None;
            }
        }
        notified.await;
    }
}

/// Drains the queue one entry at a time until it is closed and empty.
async fn run_worker<J, T, E>(shared: Arc<Shared<J, T, E>>, processor: Arc<ProcessFn<J, T, E>>)
where
    J: Send + 'static,
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    while let Some(entry) = next_entry(&shared).await {
        // A separate task isolates panics in the processor from the worker
        let outcome = match tokio::spawn(processor(entry.payload)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(JobError::Failed(Arc::new(e))),
            Err(join_error) => {
                warn!("Queued job did not complete: {}", join_error);
                Err(JobError::Abandoned)
            }
        };

        for waiter in entry.waiters {
            // Submitter may have stopped waiting
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Semaphore, mpsc};

    #[derive(Debug, Clone, PartialEq)]
    struct Job {
        key: u32,
        value: &'static str,
    }

    fn job(key: u32, value: &'static str) -> Job {
        Job { key, value }
    }

    fn same_key(new: &Job, pending: &Job) -> Option<Job> {
        (new.key == pending.key).then(|| new.clone())
    }

    /// Queue whose jobs announce their start and then wait for a permit.
    struct Gated {
        queue: JobQueue<Job, &'static str, String>,
        started: mpsc::UnboundedReceiver<Job>,
        gate: Arc<Semaphore>,
        runs: Arc<AtomicUsize>,
    }

    fn gated_queue() -> Gated {
        let (tx, started) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let processor = {
            let gate = Arc::clone(&gate);
            let runs = Arc::clone(&runs);
            move |j: Job| {
                let tx = tx.clone();
                let gate = Arc::clone(&gate);
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(j.clone());
                    gate.acquire().await.unwrap().forget();
                    match j.value {
                        "fail" => Err(format!("job {} failed", j.key)),
                        "panic" => panic!("processor blew up"),
                        v => Ok(v),
                    }
                }
                .boxed()
            }
        };

        Gated {
            queue: JobQueue::new(same_key, processor),
            started,
            gate,
            runs,
        }
    }

    #[tokio::test]
    async fn pending_submissions_merge_into_one_run() {
        let mut q = gated_queue();
        let first = q.queue.submit(job(1, "a"));
        assert_eq!(q.started.recv().await.unwrap(), job(1, "a"));

        let older = q.queue.submit(job(2, "old"));
        let newer = q.queue.submit(job(2, "new"));
        assert_eq!(q.queue.pending_len(), 1);

        q.gate.add_permits(2);
        assert_eq!(first.result().await.unwrap(), "a");
        assert_eq!(older.result().await.unwrap(), "new");
        assert_eq!(newer.result().await.unwrap(), "new");
        assert_eq!(q.started.recv().await.unwrap(), job(2, "new"));
        assert_eq!(q.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn running_job_is_never_merged_into() {
        let mut q = gated_queue();
        let running = q.queue.submit(job(1, "first"));
        q.started.recv().await.unwrap();

        let again = q.queue.submit(job(1, "second"));
        assert_eq!(q.queue.pending_len(), 1);

        q.gate.add_permits(2);
        assert_eq!(running.result().await.unwrap(), "first");
        assert_eq!(again.result().await.unwrap(), "second");
        assert_eq!(q.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_jobs_run_in_submission_order() {
        let mut q = gated_queue();
        let handles: Vec<_> = [(1, "a"), (2, "b"), (3, "c")]
            .into_iter()
            .map(|(k, v)| q.queue.submit(job(k, v)))
            .collect();

        q.gate.add_permits(3);
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(q.started.recv().await.unwrap().key);
        }
        assert_eq!(order, vec![1, 2, 3]);
        for handle in handles {
            assert!(handle.result().await.is_ok());
        }
    }

    #[tokio::test]
    async fn failure_reaches_only_its_submitter_and_queue_continues() {
        let q = gated_queue();
        let bad = q.queue.submit(job(1, "fail"));
        let good = q.queue.submit(job(2, "ok"));
        q.gate.add_permits(2);

        let err = bad.result().await.unwrap_err();
        assert_eq!(err.failure().map(String::as_str), Some("job 1 failed"));
        assert_eq!(good.result().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn panicking_job_is_abandoned_and_queue_continues() {
        let q = gated_queue();
        let boom = q.queue.submit(job(1, "panic"));
        let after = q.queue.submit(job(2, "fine"));
        q.gate.add_permits(2);

        assert!(matches!(boom.result().await, Err(JobError::Abandoned)));
        assert_eq!(after.result().await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn merged_waiters_share_a_failure() {
        let mut q = gated_queue();
        let blocker = q.queue.submit(job(9, "x"));
        q.started.recv().await.unwrap();

        let a = q.queue.submit(job(5, "ok"));
        let b = q.queue.submit(job(5, "fail"));
        q.gate.add_permits(2);

        blocker.result().await.unwrap();
        assert!(a.result().await.unwrap_err().failure().is_some());
        assert!(b.result().await.unwrap_err().failure().is_some());
    }

    #[tokio::test]
    async fn queued_jobs_finish_after_queue_is_dropped() {
        let q = gated_queue();
        let handle = q.queue.submit(job(1, "late"));
        let gate = Arc::clone(&q.gate);
        drop(q.queue);

        gate.add_permits(1);
        assert_eq!(handle.result().await.unwrap(), "late");
    }
}
