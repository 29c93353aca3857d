use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hexterra_runtime::{
    GenerateJob, RequestId, WorkDispatcher, WorkerPool, WorkerRequest, WorkerResponse,
};
use hexterra_world::{ChunkKey, TerrainConfig, TerrainContext};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Generate { priority: f32 },
    Cancel { back: usize },
    Reprioritize { back: usize, priority: f32 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0.0f32..1.0).prop_map(|priority| Op::Generate { priority }),
        1 => (0usize..8).prop_map(|back| Op::Cancel { back }),
        1 => (0usize..8, 0.0f32..2.0).prop_map(|(back, priority)| Op::Reprioritize { back, priority }),
    ]
}

fn context() -> Arc<TerrainContext> {
    let mut cfg = TerrainConfig::default();
    cfg.grid.chunk_cells = 4;
    Arc::new(TerrainContext::from_config(&cfg).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    // every job that was never canceled answers exactly once; canceled ones at most once
    #[test]
    fn one_worker_answers_each_live_job_once(ops in prop::collection::vec(op(), 1..40)) {
        let ctx = context();
        let pool = WorkerPool::new(Arc::clone(&ctx), 1).unwrap();
        let mut sent = Vec::new();
        let mut canceled = HashSet::new();
        for op in &ops {
            match *op {
                Op::Generate { priority } => {
                    let id = sent.len() as u64 + 1;
                    let key = ChunkKey::new(id as i32, -(id as i32));
                    let (origin_x, origin_z) = ctx.grid().chunk_origin(key);
                    pool.send(0, WorkerRequest::Generate(GenerateJob {
                        request_id: RequestId(id),
                        key,
                        origin_x,
                        origin_z,
                        chunk_cells: ctx.grid().chunk_cells(),
                        priority,
                        generation: ctx.generation(),
                    })).unwrap();
                    sent.push(RequestId(id));
                }
                Op::Cancel { back } => {
                    if let Some(&id) = sent.iter().rev().nth(back) {
                        pool.send(0, WorkerRequest::Cancel { request_id: id }).unwrap();
                        canceled.insert(id);
                    }
                }
                Op::Reprioritize { back, priority } => {
                    if let Some(&id) = sent.iter().rev().nth(back) {
                        pool.send(0, WorkerRequest::Reprioritize { request_id: id, priority }).unwrap();
                    }
                }
            }
        }

        let live: HashSet<RequestId> = sent.iter().copied().filter(|id| !canceled.contains(id)).collect();
        let mut seen = HashSet::new();
        let deadline = Instant::now() + Duration::from_secs(20);
        while !live.is_subset(&seen) || pool.queue_debug_counts() != (0, 0) {
            prop_assert!(Instant::now() < deadline, "worker stalled");
            for res in pool.drain_responses() {
                prop_assert!(matches!(res, WorkerResponse::Generated { .. }), "unexpected response variant");
                prop_assert!(sent.contains(&res.request_id()));
                prop_assert!(seen.insert(res.request_id()), "duplicate response");
            }
            thread::sleep(Duration::from_millis(1));
        }
        for res in pool.drain_responses() {
            prop_assert!(canceled.contains(&res.request_id()));
            prop_assert!(seen.insert(res.request_id()), "duplicate response");
        }
    }
}
