//! Chunk streaming around a moving subject.
#![forbid(unsafe_code)]

pub mod scheduler;
pub mod sink;

pub use scheduler::{
    ChunkRecord, ChunkScheduler, ChunkState, PendingRequest, ReconcileReport, RequestOutcome,
    SchedulerStats, StreamSettings,
};
pub use sink::{ChunkEvent, ChunkMeshBuilder, ChunkObserver, GeometryHandle, MeshError, NullMeshBuilder};
