//! Seams toward the mesh/render side and lifecycle listeners.

use crossbeam_channel::Sender;
use hexterra_runtime::RequestId;
use hexterra_world::{ChunkKey, HexCell};

/// Opaque id of geometry owned by the mesh collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GeometryHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("mesh builder is unavailable")]
    Unavailable,
    #[error("mesh build failed: {0}")]
    Failed(String),
}

pub trait ChunkMeshBuilder {
    /// Optional stand-in shown while the chunk is pending.
    fn placeholder(&mut self, _key: ChunkKey) -> Option<GeometryHandle> {
        None
    }

    fn build(&mut self, key: ChunkKey, cells: &[HexCell]) -> Result<GeometryHandle, MeshError>;

    fn release(&mut self, key: ChunkKey, handle: GeometryHandle);
}

/// Hands out sequential handles without building anything.
#[derive(Debug, Default)]
pub struct NullMeshBuilder {
    next: u64,
    live: usize,
}

impl NullMeshBuilder {
    pub fn live(&self) -> usize {
        self.live
    }
}

impl ChunkMeshBuilder for NullMeshBuilder {
    fn build(&mut self, _key: ChunkKey, _cells: &[HexCell]) -> Result<GeometryHandle, MeshError> {
        self.next += 1;
        self.live += 1;
        Ok(GeometryHandle(self.next))
    }

    fn release(&mut self, _key: ChunkKey, _handle: GeometryHandle) {
        self.live = self.live.saturating_sub(1);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChunkEvent {
    Loaded { key: ChunkKey, meshed: bool },
    /// A retried hand-off finally produced geometry.
    Meshed { key: ChunkKey },
    Unloaded { key: ChunkKey },
    Canceled { key: ChunkKey, request_id: RequestId },
    Failed {
        key: ChunkKey,
        request_id: RequestId,
        message: String,
    },
    /// First load pass for this terrain generation has settled.
    TerrainReady { generation: u64 },
}

pub trait ChunkObserver {
    fn on_event(&mut self, event: &ChunkEvent);
}

impl ChunkObserver for Sender<ChunkEvent> {
    fn on_event(&mut self, event: &ChunkEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.send(event.clone());
    }
}
