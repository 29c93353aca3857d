mod common;

use std::collections::{HashMap, HashSet};

use common::{TestScheduler, scheduler, settings};
use hexterra_runtime::{GenerateJob, WorkerResponse};
use hexterra_world::ChunkKey;
use proptest::prelude::*;

fn is_live(s: &TestScheduler, job: &GenerateJob) -> bool {
    s.pending_request(job.key)
        .is_some_and(|r| r.request_id == job.request_id)
}

#[derive(Clone, Debug)]
enum Op {
    Request(i32, i32, f32),
    Admit,
    Complete(usize),
    Fail(usize),
    Cancel(i32, i32),
    Unload(i32, i32),
    Reconcile(f64, f64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-4i32..4, -4i32..4, -0.5f32..1.5).prop_map(|(x, z, p)| Op::Request(x, z, p)),
        2 => Just(Op::Admit),
        4 => (0usize..8).prop_map(Op::Complete),
        1 => (0usize..8).prop_map(Op::Fail),
        1 => (-4i32..4, -4i32..4).prop_map(|(x, z)| Op::Cancel(x, z)),
        1 => (-4i32..4, -4i32..4).prop_map(|(x, z)| Op::Unload(x, z)),
        1 => (-150.0f64..150.0, -150.0f64..150.0).prop_map(|(x, z)| Op::Reconcile(x, z)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // bookkeeping stays consistent under any interleaving of requests and replies
    #[test]
    fn invariants_hold(ops in prop::collection::vec(op(), 1..120), cap in 1usize..5, workers in 1usize..4) {
        let mut s = scheduler(workers, settings(60.0, 90.0, cap));
        let mut outstanding: Vec<GenerateJob> = Vec::new();
        let mut applied: HashSet<u64> = HashSet::new();

        for op in ops {
            match op {
                Op::Request(x, z, p) => {
                    s.request_chunk(ChunkKey::new(x, z), p);
                }
                Op::Admit => {
                    s.admit_work();
                }
                Op::Complete(i) if !outstanding.is_empty() => {
                    let job = outstanding.remove(i % outstanding.len());
                    let live = is_live(&s, &job);
                    let accepted = s.handle_response(WorkerResponse::Generated {
                        request_id: job.request_id,
                        worker: 0,
                        key: job.key,
                        generation: job.generation,
                        cells: Vec::new(),
                        elapsed_ms: 0,
                    });
                    // only the live request for a key is ever applied, and only once
                    prop_assert_eq!(accepted, live);
                    if accepted {
                        prop_assert!(applied.insert(job.request_id.0));
                        prop_assert!(s.is_loaded(job.key));
                    }
                }
                Op::Fail(i) if !outstanding.is_empty() => {
                    let job = outstanding.remove(i % outstanding.len());
                    let live = is_live(&s, &job);
                    let accepted = s.handle_response(WorkerResponse::Error {
                        request_id: job.request_id,
                        worker: 0,
                        key: job.key,
                        generation: job.generation,
                        message: "injected".into(),
                    });
                    prop_assert_eq!(accepted, live);
                    if accepted {
                        prop_assert!(!s.is_loaded(job.key) && !s.is_pending(job.key));
                    }
                }
                Op::Complete(_) | Op::Fail(_) => {}
                Op::Cancel(x, z) => {
                    s.cancel(ChunkKey::new(x, z));
                }
                Op::Unload(x, z) => {
                    s.unload(ChunkKey::new(x, z));
                }
                Op::Reconcile(x, z) => {
                    s.reconcile_around(x, z);
                }
            }
            outstanding.extend(s.dispatcher().take_jobs());

            let loaded: HashSet<ChunkKey> = s.loaded_keys().collect();
            let pending: HashSet<ChunkKey> = s.pending_keys().collect();
            prop_assert!(loaded.is_disjoint(&pending));
            prop_assert!(s.assigned_len() <= cap);
            let assigned = pending
                .iter()
                .filter(|k| s.pending_request(**k).is_some_and(|r| r.assigned_worker.is_some()))
                .count();
            prop_assert_eq!(assigned, s.assigned_len());
            prop_assert_eq!(s.unassigned_len() + s.assigned_len(), s.pending_len());

            let mut ids = HashMap::new();
            for key in &pending {
                let req = s.pending_request(*key).unwrap();
                prop_assert!((0.0..=1.0).contains(&req.priority));
                prop_assert!(ids.insert(req.request_id, *key).is_none());
            }
        }
    }
}
