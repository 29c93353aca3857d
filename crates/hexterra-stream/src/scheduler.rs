//! Decides which chunks exist around a moving subject and feeds the workers.
//!
//! The scheduler is single-writer: everything here runs on the coordinating
//! thread, and workers only see `WorkerRequest`s and answer with
//! `WorkerResponse`s. A result is applied only while its request is still
//! pending and only if it was produced under the current terrain generation.

use std::sync::Arc;

use hashbrown::HashMap;
use hexterra_runtime::{
    GenerateJob, RequestId, WorkDispatcher, WorkerId, WorkerPool, WorkerRequest, WorkerResponse,
};
use hexterra_world::worldgen::Streaming;
use hexterra_world::{ChunkKey, HexCell, TerrainContext};

use crate::sink::{ChunkEvent, ChunkMeshBuilder, ChunkObserver, GeometryHandle};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamSettings {
    pub load_distance: f64,
    pub unload_distance: f64,
    pub max_concurrent_loads: usize,
}

impl StreamSettings {
    pub fn from_config(cfg: &Streaming) -> Self {
        Self {
            load_distance: cfg.load_distance,
            unload_distance: cfg.unload_distance,
            max_concurrent_loads: cfg.max_concurrent_loads.max(1),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from_config(&Streaming::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    Unloaded,
    /// Pending, waiting for a free generation slot.
    Queued,
    /// Pending and handed to a worker.
    Assigned(WorkerId),
    Loaded,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingRequest {
    pub request_id: RequestId,
    pub key: ChunkKey,
    pub priority: f32,
    pub placeholder: Option<GeometryHandle>,
    pub requested_at: u64,
    pub assigned_worker: Option<WorkerId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChunkRecord {
    pub key: ChunkKey,
    /// None while the mesh hand-off has not succeeded.
    pub geometry: Option<GeometryHandle>,
    /// Kept only until a hand-off succeeds.
    pub cells: Option<Arc<[HexCell]>>,
    pub loaded_at: u64,
    /// Tick of the last request that touched this chunk; reconcile unloads
    /// the least recently used first.
    pub last_used: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    Refreshed,
    Raised,
    AlreadyPending,
    Created(RequestId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub requested: usize,
    pub unloaded: usize,
    pub canceled: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub requested: u64,
    pub dispatched: u64,
    pub loaded: u64,
    pub unloaded: u64,
    pub canceled: u64,
    pub failed: u64,
    pub stale: u64,
    pub mesh_failures: u64,
    pub reconciles: u64,
    pub reconfigures: u64,
}

fn clamp_priority(priority: f32) -> f32 {
    if priority.is_nan() {
        0.0
    } else {
        priority.clamp(0.0, 1.0)
    }
}

pub struct ChunkScheduler<D, M> {
    ctx: Arc<TerrainContext>,
    dispatcher: D,
    mesher: M,
    observers: Vec<Box<dyn ChunkObserver>>,
    settings: StreamSettings,
    loaded: HashMap<ChunkKey, ChunkRecord>,
    pending: HashMap<ChunkKey, PendingRequest>,
    by_request: HashMap<RequestId, ChunkKey>,
    next_request: u64,
    tick: u64,
    assigned: usize,
    next_worker: usize,
    reconciled_once: bool,
    ready: bool,
    warned_hysteresis: bool,
    stats: SchedulerStats,
}

impl<D: WorkDispatcher, M: ChunkMeshBuilder> ChunkScheduler<D, M> {
    pub fn new(ctx: Arc<TerrainContext>, dispatcher: D, mesher: M, settings: StreamSettings) -> Self {
        let settings = StreamSettings {
            max_concurrent_loads: settings.max_concurrent_loads.max(1),
            ..settings
        };
        Self {
            ctx,
            dispatcher,
            mesher,
            observers: Vec::new(),
            settings,
            loaded: HashMap::new(),
            pending: HashMap::new(),
            by_request: HashMap::new(),
            next_request: 0,
            tick: 0,
            assigned: 0,
            next_worker: 0,
            reconciled_once: false,
            ready: false,
            warned_hysteresis: false,
            stats: SchedulerStats::default(),
        }
    }

    pub fn add_observer(&mut self, observer: impl ChunkObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn context(&self) -> &Arc<TerrainContext> {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn mesher(&self) -> &M {
        &self.mesher
    }

    pub fn mesher_mut(&mut self) -> &mut M {
        &mut self.mesher
    }

    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    /// Replaces distances and the concurrency cap; takes effect on the next pass.
    pub fn apply_settings(&mut self, settings: StreamSettings) {
        self.settings = StreamSettings {
            max_concurrent_loads: settings.max_concurrent_loads.max(1),
            ..settings
        };
        self.warned_hysteresis = false;
    }

    pub fn request_chunk(&mut self, key: ChunkKey, priority: f32) -> RequestOutcome {
        let priority = clamp_priority(priority);
        self.tick += 1;
        if let Some(rec) = self.loaded.get_mut(&key) {
            rec.last_used = self.tick;
            return RequestOutcome::Refreshed;
        }
        if let Some(req) = self.pending.get_mut(&key) {
            if priority <= req.priority {
                return RequestOutcome::AlreadyPending;
            }
            req.priority = priority;
            if let Some(worker) = req.assigned_worker {
                let msg = WorkerRequest::Reprioritize {
                    request_id: req.request_id,
                    priority,
                };
                if let Err(e) = self.dispatcher.send(worker, msg) {
                    log::debug!(target: "stream", "reprioritize {} on worker {}: {}", req.request_id, worker, e);
                }
            }
            return RequestOutcome::Raised;
        }

        self.next_request += 1;
        let request_id = RequestId(self.next_request);
        let placeholder = self.mesher.placeholder(key);
        self.pending.insert(
            key,
            PendingRequest {
                request_id,
                key,
                priority,
                placeholder,
                requested_at: self.tick,
                assigned_worker: None,
            },
        );
        self.by_request.insert(request_id, key);
        self.stats.requested += 1;
        log::trace!(target: "stream", "requested chunk {} as {} (priority {:.3})", key, request_id, priority);
        RequestOutcome::Created(request_id)
    }

    /// Hands queued requests to workers until the concurrency cap is reached.
    /// Returns how many were dispatched.
    pub fn admit_work(&mut self) -> usize {
        let workers = self.dispatcher.worker_count();
        let capacity = self.settings.max_concurrent_loads.saturating_sub(self.assigned);
        if workers == 0 || capacity == 0 {
            return 0;
        }
        let mut queue: Vec<(f32, u64, RequestId, ChunkKey)> = self
            .pending
            .values()
            .filter(|r| r.assigned_worker.is_none())
            .map(|r| (r.priority, r.requested_at, r.request_id, r.key))
            .collect();
        queue.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let grid = *self.ctx.grid();
        let generation = self.ctx.generation();
        let mut admitted = 0;
        let mut failures = 0;
        for (priority, _, request_id, key) in queue {
            if admitted >= capacity || failures >= workers {
                break;
            }
            let worker = self.next_worker % workers;
            self.next_worker = (worker + 1) % workers;
            let (origin_x, origin_z) = grid.chunk_origin(key);
            let job = GenerateJob {
                request_id,
                key,
                origin_x,
                origin_z,
                chunk_cells: grid.chunk_cells(),
                priority,
                generation,
            };
            match self.dispatcher.send(worker, WorkerRequest::Generate(job)) {
                Ok(()) => {
                    if let Some(req) = self.pending.get_mut(&key) {
                        req.assigned_worker = Some(worker);
                    }
                    self.assigned += 1;
                    self.stats.dispatched += 1;
                    admitted += 1;
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    log::warn!(target: "stream", "could not dispatch chunk {} to worker {}: {}", key, worker, e);
                }
            }
        }
        if admitted > 0 {
            log::debug!(
                target: "stream",
                "admitted {} jobs ({} assigned, {} queued)",
                admitted,
                self.assigned,
                self.pending.len() - self.assigned
            );
        }
        admitted
    }

    /// Applies a worker response, dropping it if it belongs to an older terrain generation.
    pub fn handle_response(&mut self, response: WorkerResponse) -> bool {
        if response.generation() != self.ctx.generation() {
            self.stats.stale += 1;
            log::debug!(
                target: "stream",
                "dropping {} from generation {} (current {})",
                response.request_id(),
                response.generation(),
                self.ctx.generation()
            );
            return false;
        }
        match response {
            WorkerResponse::Generated {
                request_id,
                worker,
                cells,
                elapsed_ms,
                ..
            } => {
                log::trace!(target: "stream", "worker {} finished {} in {}ms", worker, request_id, elapsed_ms);
                self.on_worker_result(request_id, cells)
            }
            WorkerResponse::Error {
                request_id, message, ..
            } => self.on_worker_error(request_id, &message),
        }
    }

    pub fn on_worker_result(&mut self, request_id: RequestId, cells: Vec<HexCell>) -> bool {
        let Some(&key) = self.by_request.get(&request_id) else {
            self.stats.stale += 1;
            log::debug!(target: "stream", "discarding result for {} (no longer pending)", request_id);
            return false;
        };
        self.remove_pending(key);
        self.tick += 1;
        let cells: Arc<[HexCell]> = cells.into();
        let (geometry, retained) = match self.mesher.build(key, &cells) {
            Ok(handle) => (Some(handle), None),
            Err(e) => {
                self.stats.mesh_failures += 1;
                log::warn!(target: "stream", "mesh hand-off for chunk {} failed: {}", key, e);
                (None, Some(cells))
            }
        };
        let meshed = geometry.is_some();
        self.loaded.insert(
            key,
            ChunkRecord {
                key,
                geometry,
                cells: retained,
                loaded_at: self.tick,
                last_used: self.tick,
            },
        );
        self.stats.loaded += 1;
        self.emit(ChunkEvent::Loaded { key, meshed });
        self.admit_work();
        self.check_ready();
        true
    }

    /// The chunk goes back to unloaded; a later pass may request it again.
    pub fn on_worker_error(&mut self, request_id: RequestId, message: &str) -> bool {
        let Some(&key) = self.by_request.get(&request_id) else {
            self.stats.stale += 1;
            log::debug!(target: "stream", "discarding error for {} (no longer pending)", request_id);
            return false;
        };
        self.remove_pending(key);
        self.stats.failed += 1;
        log::warn!(target: "stream", "generation of chunk {} failed: {}", key, message);
        self.emit(ChunkEvent::Failed {
            key,
            request_id,
            message: message.to_string(),
        });
        self.admit_work();
        self.check_ready();
        true
    }

    pub fn reconcile(
        &mut self,
        subject_x: f64,
        subject_z: f64,
        load_distance: f64,
        unload_distance: f64,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if !(subject_x.is_finite() && subject_z.is_finite()) {
            log::warn!(target: "stream", "ignoring non-finite subject position ({}, {})", subject_x, subject_z);
            return report;
        }
        let load = if load_distance.is_finite() && load_distance > 0.0 {
            load_distance
        } else {
            0.0
        };
        let unload = if unload_distance >= load {
            unload_distance
        } else {
            if !self.warned_hysteresis {
                self.warned_hysteresis = true;
                log::warn!(
                    target: "stream",
                    "unload distance {} is below load distance {}; using {}",
                    unload_distance,
                    load,
                    load
                );
            }
            load
        };

        let grid = *self.ctx.grid();
        let mut far_loaded: Vec<(u64, ChunkKey)> = self
            .loaded
            .values()
            .filter(|r| grid.distance_to_center(r.key, subject_x, subject_z) > unload)
            .map(|r| (r.last_used, r.key))
            .collect();
        far_loaded.sort_unstable();
        for (_, key) in far_loaded {
            if self.release_loaded(key) {
                report.unloaded += 1;
            }
        }
        let far_pending: Vec<ChunkKey> = self
            .pending
            .keys()
            .copied()
            .filter(|&k| grid.distance_to_center(k, subject_x, subject_z) > unload)
            .collect();
        for key in far_pending {
            if self.cancel_pending(key) {
                report.canceled += 1;
            }
        }

        if load > 0.0 {
            for (key, dist) in grid.keys_within(subject_x, subject_z, load) {
                let priority = (1.0 - dist / load) as f32;
                if let RequestOutcome::Created(_) = self.request_chunk(key, priority) {
                    report.requested += 1;
                }
            }
        }

        self.reconciled_once = true;
        self.stats.reconciles += 1;
        self.admit_work();
        self.check_ready();
        if report != ReconcileReport::default() {
            log::debug!(
                target: "stream",
                "reconcile at ({:.1}, {:.1}): +{} requested, -{} unloaded, {} canceled",
                subject_x,
                subject_z,
                report.requested,
                report.unloaded,
                report.canceled
            );
        }
        report
    }

    /// Reconciles using the configured distances.
    pub fn reconcile_around(&mut self, subject_x: f64, subject_z: f64) -> ReconcileReport {
        let StreamSettings {
            load_distance,
            unload_distance,
            ..
        } = self.settings;
        self.reconcile(subject_x, subject_z, load_distance, unload_distance)
    }

    pub fn unload(&mut self, key: ChunkKey) -> bool {
        self.release_loaded(key)
    }

    pub fn cancel(&mut self, key: ChunkKey) -> bool {
        let canceled = self.cancel_pending(key);
        if canceled {
            self.admit_work();
            self.check_ready();
        }
        canceled
    }

    /// Offers retained cells again to the mesh builder. Returns how many succeeded.
    pub fn retry_mesh_handoffs(&mut self) -> usize {
        let waiting: Vec<ChunkKey> = self
            .loaded
            .values()
            .filter(|r| r.geometry.is_none() && r.cells.is_some())
            .map(|r| r.key)
            .collect();
        let mut meshed = Vec::new();
        for key in waiting {
            let Some(rec) = self.loaded.get_mut(&key) else {
                continue;
            };
            let Some(cells) = rec.cells.as_deref() else {
                continue;
            };
            match self.mesher.build(key, cells) {
                Ok(handle) => {
                    rec.geometry = Some(handle);
                    rec.cells = None;
                    meshed.push(key);
                }
                Err(e) => {
                    self.stats.mesh_failures += 1;
                    log::debug!(target: "stream", "mesh retry for chunk {} failed: {}", key, e);
                }
            }
        }
        for &key in &meshed {
            self.emit(ChunkEvent::Meshed { key });
        }
        meshed.len()
    }

    pub fn is_terrain_ready(&self) -> bool {
        self.ready
    }

    /// Drops every chunk and request, then switches all workers to `ctx`.
    pub fn reconfigure(&mut self, ctx: Arc<TerrainContext>) {
        let pending: Vec<ChunkKey> = self.pending.keys().copied().collect();
        for key in pending {
            self.cancel_pending(key);
        }
        let loaded: Vec<ChunkKey> = self.loaded.keys().copied().collect();
        for key in loaded {
            self.release_loaded(key);
        }
        log::info!(
            target: "stream",
            "terrain reconfigured: generation {} -> {} (seed {})",
            self.ctx.generation(),
            ctx.generation(),
            ctx.seed()
        );
        if let Err(e) = self.dispatcher.reset(Arc::clone(&ctx)) {
            log::warn!(target: "stream", "failed to reset every worker: {}", e);
        }
        self.ctx = ctx;
        self.next_worker = 0;
        self.reconciled_once = false;
        self.ready = false;
        self.stats.reconfigures += 1;
    }

    pub fn state_of(&self, key: ChunkKey) -> ChunkState {
        if self.loaded.contains_key(&key) {
            return ChunkState::Loaded;
        }
        match self.pending.get(&key) {
            Some(PendingRequest {
                assigned_worker: Some(w),
                ..
            }) => ChunkState::Assigned(*w),
            Some(_) => ChunkState::Queued,
            None => ChunkState::Unloaded,
        }
    }

    pub fn record(&self, key: ChunkKey) -> Option<&ChunkRecord> {
        self.loaded.get(&key)
    }

    pub fn pending_request(&self, key: ChunkKey) -> Option<&PendingRequest> {
        self.pending.get(&key)
    }

    pub fn loaded_keys(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.loaded.keys().copied()
    }

    pub fn pending_keys(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.pending.keys().copied()
    }

    pub fn loaded_len(&self) -> usize {
        self.loaded.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn assigned_len(&self) -> usize {
        self.assigned
    }

    pub fn unassigned_len(&self) -> usize {
        self.pending.len() - self.assigned
    }

    pub fn is_loaded(&self, key: ChunkKey) -> bool {
        self.loaded.contains_key(&key)
    }

    pub fn is_pending(&self, key: ChunkKey) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    fn remove_pending(&mut self, key: ChunkKey) -> Option<PendingRequest> {
        let req = self.pending.remove(&key)?;
        self.by_request.remove(&req.request_id);
        if req.assigned_worker.is_some() {
            self.assigned -= 1;
        }
        if let Some(handle) = req.placeholder {
            self.mesher.release(key, handle);
        }
        Some(req)
    }

    fn cancel_pending(&mut self, key: ChunkKey) -> bool {
        let Some(req) = self.remove_pending(key) else {
            return false;
        };
        if let Some(worker) = req.assigned_worker {
            let msg = WorkerRequest::Cancel {
                request_id: req.request_id,
            };
            if let Err(e) = self.dispatcher.send(worker, msg) {
                log::debug!(target: "stream", "cancel {} on worker {}: {}", req.request_id, worker, e);
            }
        }
        self.stats.canceled += 1;
        self.emit(ChunkEvent::Canceled {
            key,
            request_id: req.request_id,
        });
        true
    }

    fn release_loaded(&mut self, key: ChunkKey) -> bool {
        let Some(rec) = self.loaded.remove(&key) else {
            return false;
        };
        if let Some(handle) = rec.geometry {
            self.mesher.release(key, handle);
        }
        self.stats.unloaded += 1;
        self.emit(ChunkEvent::Unloaded { key });
        true
    }

    fn check_ready(&mut self) {
        if self.ready || !self.reconciled_once || !self.pending.is_empty() {
            return;
        }
        self.ready = true;
        log::info!(
            target: "stream",
            "terrain ready: {} chunks loaded (generation {})",
            self.loaded.len(),
            self.ctx.generation()
        );
        self.emit(ChunkEvent::TerrainReady {
            generation: self.ctx.generation(),
        });
    }

    fn emit(&mut self, event: ChunkEvent) {
        for observer in self.observers.iter_mut() {
            observer.on_event(&event);
        }
    }
}

impl<M: ChunkMeshBuilder> ChunkScheduler<WorkerPool, M> {
    /// Applies every response the pool has produced so far.
    pub fn pump(&mut self) -> usize {
        let responses = self.dispatcher.drain_responses();
        let n = responses.len();
        for response in responses {
            self.handle_response(response);
        }
        n
    }
}
