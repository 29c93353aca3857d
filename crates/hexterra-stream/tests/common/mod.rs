#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::Arc;

use hexterra_runtime::{
    DispatchError, GenerateJob, WorkDispatcher, WorkerId, WorkerRequest, WorkerResponse,
    generate_chunk,
};
use hexterra_stream::{
    ChunkMeshBuilder, ChunkScheduler, GeometryHandle, MeshError, NullMeshBuilder, StreamSettings,
};
use hexterra_world::{ChunkKey, HexCell, TerrainConfig, TerrainContext};

/// Records every request instead of running it.
pub struct RecordingDispatcher {
    workers: usize,
    sent: RefCell<Vec<(WorkerId, WorkerRequest)>>,
}

impl RecordingDispatcher {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            sent: RefCell::new(Vec::new()),
        }
    }

    pub fn take(&self) -> Vec<(WorkerId, WorkerRequest)> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn take_jobs(&self) -> Vec<GenerateJob> {
        self.take()
            .into_iter()
            .filter_map(|(_, req)| match req {
                WorkerRequest::Generate(job) => Some(job),
                _ => None,
            })
            .collect()
    }
}

impl WorkDispatcher for RecordingDispatcher {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn send(&self, worker: WorkerId, request: WorkerRequest) -> Result<(), DispatchError> {
        if worker >= self.workers {
            return Err(DispatchError::UnknownWorker(worker));
        }
        self.sent.borrow_mut().push((worker, request));
        Ok(())
    }
}

/// Fails the first `failures` builds, then behaves like `NullMeshBuilder`.
pub struct FlakyMesher {
    pub failures: usize,
    pub inner: NullMeshBuilder,
}

impl ChunkMeshBuilder for FlakyMesher {
    fn build(&mut self, key: ChunkKey, cells: &[HexCell]) -> Result<GeometryHandle, MeshError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(MeshError::Failed("gpu busy".into()));
        }
        self.inner.build(key, cells)
    }

    fn release(&mut self, key: ChunkKey, handle: GeometryHandle) {
        self.inner.release(key, handle);
    }
}

pub fn config(seed: u64) -> TerrainConfig {
    let mut cfg = TerrainConfig::default();
    cfg.seed = seed;
    cfg.grid.chunk_cells = 8;
    cfg
}

pub fn context(seed: u64) -> Arc<TerrainContext> {
    Arc::new(TerrainContext::from_config(&config(seed)).unwrap())
}

pub fn settings(load: f64, unload: f64, cap: usize) -> StreamSettings {
    StreamSettings {
        load_distance: load,
        unload_distance: unload,
        max_concurrent_loads: cap,
    }
}

pub type TestScheduler<M = NullMeshBuilder> = ChunkScheduler<RecordingDispatcher, M>;

pub fn scheduler(workers: usize, settings: StreamSettings) -> TestScheduler {
    ChunkScheduler::new(
        context(42),
        RecordingDispatcher::new(workers),
        NullMeshBuilder::default(),
        settings,
    )
}

pub fn generated(ctx: &TerrainContext, job: &GenerateJob) -> WorkerResponse {
    WorkerResponse::Generated {
        request_id: job.request_id,
        worker: 0,
        key: job.key,
        generation: job.generation,
        cells: generate_chunk(ctx, job).unwrap(),
        elapsed_ms: 0,
    }
}

/// Plays the workers' part until nothing new is dispatched.
pub fn finish_all<M: ChunkMeshBuilder>(s: &mut TestScheduler<M>) -> usize {
    let mut applied = 0;
    loop {
        let jobs = s.dispatcher().take_jobs();
        if jobs.is_empty() {
            return applied;
        }
        for job in jobs {
            let ctx = Arc::clone(s.context());
            if s.handle_response(generated(&ctx, &job)) {
                applied += 1;
            }
        }
    }
}
