//! Request de-duplication for spawned jobs.
//!
//! The first caller for a key spawns the job; later callers for the same
//! key get a clone of the same [`Shared`] future. Jobs run on the tokio
//! runtime, so a caller that stops waiting (for example a renderer whose
//! frame budget ran out) does not cancel the work.
//!
//! Every caller names a [`JobOwner`]. [`InFlight::cancel_owner`] aborts a job
//! only once no other owner is still interested in it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cutline_common::{CutlineError, CutlineResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::AbortHandle;

/// Errors are shared between every waiter, hence the `Arc`.
pub type JobResult<T> = Result<T, Arc<CutlineError>>;

pub type SharedJob<T> = Shared<BoxFuture<'static, JobResult<T>>>;

/// Who asked for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobOwner(u64);

impl JobOwner {
    /// Owner of requests that do not name one.
    pub const SHARED: JobOwner = JobOwner(0);

    /// A fresh owner, distinct from every other.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        JobOwner(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

struct Entry<T: Clone> {
    id: u64,
    job: SharedJob<T>,
    abort: AbortHandle,
    owners: HashSet<JobOwner>,
}

struct Jobs<K, T: Clone> {
    next_id: u64,
    entries: HashMap<K, Entry<T>>,
}

/// At most one running job per key.
pub struct InFlight<K, T: Clone> {
    jobs: Arc<Mutex<Jobs<K, T>>>,
}

impl<K, T> Default for InFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> InFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Jobs {
                next_id: 0,
                entries: HashMap::new(),
            })),
        }
    }

    /// Join the running job for `key`, or spawn `start()` as a new one.
    ///
    /// The job should publish its result (cache insert, metadata update)
    /// before it returns; the key is released only after that.
    pub fn join_or_start<F, Fut>(&self, key: K, owner: JobOwner, start: F) -> SharedJob<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CutlineResult<T>> + Send + 'static,
    {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = jobs.entries.get_mut(&key) {
            entry.owners.insert(owner);
            return entry.job.clone();
        }

        let id = jobs.next_id;
        jobs.next_id += 1;

        let registry = Arc::clone(&self.jobs);
        let release_key = key.clone();
        let work = start();
        let handle = tokio::spawn(async move {
            let result = work.await;
            let mut jobs = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if jobs.entries.get(&release_key).map(|e| e.id) == Some(id) {
                jobs.entries.remove(&release_key);
            }
            result
        });
        let abort = handle.abort_handle();

        let job: SharedJob<T> = async move {
            match handle.await {
                Ok(result) => result.map_err(Arc::new),
                Err(e) if e.is_cancelled() => Err(Arc::new(CutlineError::decode("job cancelled"))),
                Err(e) => Err(Arc::new(CutlineError::decode(format!("job panicked: {e}")))),
            }
        }
        .boxed()
        .shared();

        jobs.entries.insert(
            key,
            Entry {
                id,
                job: job.clone(),
                abort,
                owners: HashSet::from([owner]),
            },
        );
        job
    }

    pub fn is_running(&self, key: &K) -> bool {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `owner`'s interest in every running job and abort the jobs no
    /// one else is waiting for. Returns how many were aborted.
    pub fn cancel_owner(&self, owner: JobOwner) -> usize {
        let drained: Vec<Entry<T>> = {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            let orphaned: Vec<K> = jobs
                .entries
                .iter_mut()
                .filter_map(|(key, entry)| {
                    (entry.owners.remove(&owner) && entry.owners.is_empty()).then(|| key.clone())
                })
                .collect();
            orphaned
                .iter()
                .filter_map(|key| jobs.entries.remove(key))
                .collect()
        };
        for entry in &drained {
            entry.abort.abort();
        }
        drained.len()
    }

    /// Abort every running job. Waiters see a decode error.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry<T>> = {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            jobs.entries.drain().map(|(_, e)| e).collect()
        };
        for entry in &drained {
            entry.abort.abort();
        }
        drained.len()
    }
}
