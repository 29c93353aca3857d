use std::fmt;
use std::sync::Arc;

use hexterra_world::{ChunkKey, HexCell, TerrainContext};

pub type WorkerId = usize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerateJob {
    pub request_id: RequestId,
    pub key: ChunkKey,
    pub origin_x: f64,
    pub origin_z: f64,
    pub chunk_cells: u32,
    pub priority: f32,
    /// Context generation the job was issued under.
    pub generation: u64,
}

/// Scheduler to worker.
pub enum WorkerRequest {
    Generate(GenerateJob),
    /// Advisory: drops the job if it is still queued on the worker.
    Cancel { request_id: RequestId },
    /// Advisory: reorders the worker's local queue.
    Reprioritize { request_id: RequestId, priority: f32 },
    /// Adopt a new terrain context; queued jobs from older generations are dropped.
    Reset(Arc<TerrainContext>),
}

impl fmt::Debug for WorkerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRequest::Generate(job) => f.debug_tuple("Generate").field(job).finish(),
            WorkerRequest::Cancel { request_id } => f
                .debug_struct("Cancel")
                .field("request_id", request_id)
                .finish(),
            WorkerRequest::Reprioritize {
                request_id,
                priority,
            } => f
                .debug_struct("Reprioritize")
                .field("request_id", request_id)
                .field("priority", priority)
                .finish(),
            WorkerRequest::Reset(ctx) => f
                .debug_struct("Reset")
                .field("generation", &ctx.generation())
                .finish(),
        }
    }
}

/// Worker to scheduler.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerResponse {
    Generated {
        request_id: RequestId,
        worker: WorkerId,
        key: ChunkKey,
        generation: u64,
        cells: Vec<HexCell>,
        elapsed_ms: u32,
    },
    Error {
        request_id: RequestId,
        worker: WorkerId,
        key: ChunkKey,
        generation: u64,
        message: String,
    },
}

impl WorkerResponse {
    pub fn request_id(&self) -> RequestId {
        match self {
            WorkerResponse::Generated { request_id, .. } | WorkerResponse::Error { request_id, .. } => {
                *request_id
            }
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            WorkerResponse::Generated { generation, .. } | WorkerResponse::Error { generation, .. } => {
                *generation
            }
        }
    }
}
