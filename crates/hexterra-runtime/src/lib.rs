//! Chunk generation workers and the message protocol that drives them.
#![forbid(unsafe_code)]

mod job;
mod messages;

pub use job::{GenerationError, generate_chunk};
pub use messages::{GenerateJob, RequestId, WorkerId, WorkerRequest, WorkerResponse};

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use hexterra_world::{HexCell, TerrainContext};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("worker {0} does not exist")]
    UnknownWorker(WorkerId),
    #[error("worker {0} has shut down")]
    Disconnected(WorkerId),
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("a worker pool needs at least one worker")]
    NoWorkers,
    #[error("failed to start worker threads: {0}")]
    Build(#[from] ThreadPoolBuildError),
}

/// Whatever can carry requests to numbered workers.
pub trait WorkDispatcher {
    fn worker_count(&self) -> usize;
    fn send(&self, worker: WorkerId, request: WorkerRequest) -> Result<(), DispatchError>;

    /// Sends `Reset` to every worker, reporting the first failure after trying all.
    fn reset(&self, context: Arc<TerrainContext>) -> Result<(), DispatchError> {
        let mut first_err = None;
        for worker in 0..self.worker_count() {
            if let Err(e) = self.send(worker, WorkerRequest::Reset(Arc::clone(&context))) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

struct Counters {
    queued: AtomicUsize,
    inflight: AtomicUsize,
}

pub struct WorkerPool {
    senders: Vec<Sender<WorkerRequest>>,
    res_rx: Receiver<WorkerResponse>,
    counters: Arc<Counters>,
    _pool: Arc<ThreadPool>,
}

impl WorkerPool {
    /// One per core, leaving a core for the coordinating thread.
    pub fn default_worker_count() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .saturating_sub(1)
            .max(1)
    }

    pub fn new(context: Arc<TerrainContext>, workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("hexterra-gen-{i}"))
                .build()?,
        );
        let (res_tx, res_rx) = unbounded::<WorkerResponse>();
        let counters = Arc::new(Counters {
            queued: AtomicUsize::new(0),
            inflight: AtomicUsize::new(0),
        });
        let mut senders = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, rx) = unbounded::<WorkerRequest>();
            senders.push(tx);
            let res_tx = res_tx.clone();
            let counters = Arc::clone(&counters);
            let ctx = Arc::clone(&context);
            pool.spawn(move || {
                Worker {
                    id: worker,
                    ctx,
                    local: Vec::new(),
                    counters,
                }
                .run(rx, res_tx);
            });
        }
        log::info!(target: "worker", "started {} generation workers", workers);
        Ok(Self {
            senders,
            res_rx,
            counters,
            _pool: pool,
        })
    }

    pub fn drain_responses(&self) -> Vec<WorkerResponse> {
        self.res_rx.try_iter().collect()
    }

    /// Blocks up to `timeout` for the next response.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerResponse> {
        match self.res_rx.recv_timeout(timeout) {
            Ok(res) => Some(res),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// (queued, inflight) job counts across all workers.
    pub fn queue_debug_counts(&self) -> (usize, usize) {
        (
            self.counters.queued.load(Ordering::Relaxed),
            self.counters.inflight.load(Ordering::Relaxed),
        )
    }
}

impl WorkDispatcher for WorkerPool {
    fn worker_count(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, worker: WorkerId, request: WorkerRequest) -> Result<(), DispatchError> {
        let tx = self
            .senders
            .get(worker)
            .ok_or(DispatchError::UnknownWorker(worker))?;
        let is_job = matches!(request, WorkerRequest::Generate(_));
        if is_job {
            self.counters.queued.fetch_add(1, Ordering::Relaxed);
        }
        if tx.send(request).is_err() {
            if is_job {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
            }
            return Err(DispatchError::Disconnected(worker));
        }
        Ok(())
    }
}

struct Worker {
    id: WorkerId,
    ctx: Arc<TerrainContext>,
    local: Vec<GenerateJob>,
    counters: Arc<Counters>,
}

impl Worker {
    fn run(mut self, rx: Receiver<WorkerRequest>, tx: Sender<WorkerResponse>) {
        loop {
            if self.local.is_empty() {
                match rx.recv() {
                    Ok(msg) => self.apply(msg),
                    Err(_) => break,
                }
            }
            // Take everything already waiting so cancels and priority bumps land first.
            let mut closed = false;
            loop {
                match rx.try_recv() {
                    Ok(msg) => self.apply(msg),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
            if closed {
                break;
            }
            if let Some(job) = self.next_job() {
                let out = self.execute(job);
                if tx.send(out).is_err() {
                    break;
                }
            }
        }
        let dropped = self.local.len();
        if dropped > 0 {
            self.counters.queued.fetch_sub(dropped, Ordering::Relaxed);
        }
        log::debug!(target: "worker", "worker {} exiting ({} queued jobs dropped)", self.id, dropped);
    }

    fn apply(&mut self, msg: WorkerRequest) {
        match msg {
            WorkerRequest::Generate(job) => {
                if job.generation < self.ctx.generation() {
                    self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
                self.local.push(job);
            }
            WorkerRequest::Cancel { request_id } => {
                if let Some(pos) = self.local.iter().position(|j| j.request_id == request_id) {
                    self.local.swap_remove(pos);
                    self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                    log::trace!(target: "worker", "worker {} dropped queued {}", self.id, request_id);
                }
            }
            WorkerRequest::Reprioritize {
                request_id,
                priority,
            } => {
                if let Some(job) = self.local.iter_mut().find(|j| j.request_id == request_id) {
                    job.priority = priority;
                }
            }
            WorkerRequest::Reset(ctx) => {
                let generation = ctx.generation();
                let before = self.local.len();
                self.local.retain(|j| j.generation >= generation);
                let dropped = before - self.local.len();
                if dropped > 0 {
                    self.counters.queued.fetch_sub(dropped, Ordering::Relaxed);
                }
                self.ctx = ctx;
                log::debug!(target: "worker", "worker {} adopted terrain generation {}", self.id, generation);
            }
        }
    }

    fn next_job(&mut self) -> Option<GenerateJob> {
        let best = self
            .local
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.priority
                    .total_cmp(&b.priority)
                    .then_with(|| b.request_id.cmp(&a.request_id))
            })
            .map(|(i, _)| i)?;
        Some(self.local.swap_remove(best))
    }

    fn execute(&self, job: GenerateJob) -> WorkerResponse {
        self.execute_with(job, generate_chunk)
    }

    fn execute_with<F>(&self, job: GenerateJob, generate: F) -> WorkerResponse
    where
        F: FnOnce(&TerrainContext, &GenerateJob) -> Result<Vec<HexCell>, GenerationError>,
    {
        self.counters.queued.fetch_sub(1, Ordering::Relaxed);
        self.counters.inflight.fetch_add(1, Ordering::Relaxed);
        let t0 = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| generate(&self.ctx, &job)));
        let elapsed_ms = t0.elapsed().as_millis().min(u128::from(u32::MAX)) as u32;
        self.counters.inflight.fetch_sub(1, Ordering::Relaxed);
        let GenerateJob {
            request_id,
            key,
            generation,
            ..
        } = job;
        match result {
            Ok(Ok(cells)) => WorkerResponse::Generated {
                request_id,
                worker: self.id,
                key,
                generation,
                cells,
                elapsed_ms,
            },
            Ok(Err(e)) => WorkerResponse::Error {
                request_id,
                worker: self.id,
                key,
                generation,
                message: e.to_string(),
            },
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                WorkerResponse::Error {
                    request_id,
                    worker: self.id,
                    key,
                    generation,
                    message: format!("generation panicked: {message}"),
                }
            }
        }
    }
}
