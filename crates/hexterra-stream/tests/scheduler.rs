mod common;

use std::sync::Arc;

use common::{FlakyMesher, RecordingDispatcher, context, finish_all, generated, scheduler, settings};
use crossbeam_channel::unbounded;
use hexterra_runtime::{RequestId, WorkerRequest, WorkerResponse};
use hexterra_stream::{
    ChunkEvent, ChunkScheduler, ChunkState, NullMeshBuilder, RequestOutcome, StreamSettings,
};
use hexterra_world::ChunkKey;

fn created(outcome: RequestOutcome) -> RequestId {
    match outcome {
        RequestOutcome::Created(id) => id,
        other => panic!("expected a new request, got {other:?}"),
    }
}

#[test]
fn highest_priority_is_dispatched_first() {
    let mut s = scheduler(1, settings(100.0, 150.0, 1));
    let low = ChunkKey::new(0, 0);
    let high = ChunkKey::new(1, 0);
    let mid = ChunkKey::new(2, 0);
    s.request_chunk(low, 0.2);
    s.request_chunk(high, 0.9);
    s.request_chunk(mid, 0.5);
    s.admit_work();

    let mut order = Vec::new();
    loop {
        let jobs = s.dispatcher().take_jobs();
        if jobs.is_empty() {
            break;
        }
        assert_eq!(jobs.len(), 1);
        order.push(jobs[0].key);
        let ctx = Arc::clone(s.context());
        s.handle_response(generated(&ctx, &jobs[0]));
    }
    assert_eq!(order, vec![high, mid, low]);
}

#[test]
fn equal_priorities_go_in_request_order() {
    let mut s = scheduler(1, settings(100.0, 150.0, 3));
    let keys = [ChunkKey::new(5, 5), ChunkKey::new(-3, 2), ChunkKey::new(0, 9)];
    for key in keys {
        s.request_chunk(key, 0.5);
    }
    s.admit_work();
    let dispatched: Vec<ChunkKey> = s.dispatcher().take_jobs().iter().map(|j| j.key).collect();
    assert_eq!(dispatched, keys.to_vec());
}

#[test]
fn concurrency_cap_holds() {
    let mut s = scheduler(3, settings(100.0, 150.0, 4));
    for i in 0..10 {
        s.request_chunk(ChunkKey::new(i, i), 0.5);
    }
    assert_eq!(s.admit_work(), 4);
    assert_eq!(s.assigned_len(), 4);
    assert_eq!(s.unassigned_len(), 6);

    let jobs = s.dispatcher().take_jobs();
    assert_eq!(jobs.len(), 4);
    let ctx = Arc::clone(s.context());
    s.handle_response(generated(&ctx, &jobs[0]));
    assert_eq!(s.loaded_len(), 1);
    assert_eq!(s.assigned_len(), 4);
    assert_eq!(s.unassigned_len(), 5);
    assert_eq!(s.dispatcher().take_jobs().len(), 1);
}

#[test]
fn result_after_cancel_is_discarded() {
    let mut s = scheduler(1, settings(100.0, 150.0, 2));
    let key = ChunkKey::new(4, -4);
    created(s.request_chunk(key, 0.7));
    s.admit_work();
    let jobs = s.dispatcher().take_jobs();
    assert!(s.cancel(key));
    let sent = s.dispatcher().take();
    assert!(matches!(
        sent.as_slice(),
        [(0, WorkerRequest::Cancel { request_id })] if *request_id == jobs[0].request_id
    ));

    let ctx = Arc::clone(s.context());
    assert!(!s.handle_response(generated(&ctx, &jobs[0])));
    assert!(!s.is_loaded(key));
    assert_eq!(s.stats().stale, 1);
    assert_eq!(s.stats().canceled, 1);
}

#[test]
fn request_is_unique_per_key() {
    let mut s = scheduler(2, settings(100.0, 150.0, 4));
    let key = ChunkKey::new(1, 1);
    created(s.request_chunk(key, 0.4));
    assert_eq!(s.request_chunk(key, 0.4), RequestOutcome::AlreadyPending);
    assert_eq!(s.request_chunk(key, 0.1), RequestOutcome::AlreadyPending);
    assert_eq!(s.pending_len(), 1);
    assert_eq!(s.pending_request(key).unwrap().priority, 0.4);
}

#[test]
fn raising_priority_reaches_the_worker() {
    let mut s = scheduler(2, settings(100.0, 150.0, 4));
    let key = ChunkKey::new(0, 0);
    let id = created(s.request_chunk(key, 0.3));
    s.admit_work();
    s.dispatcher().take();
    assert_eq!(s.request_chunk(key, 0.8), RequestOutcome::Raised);
    let sent = s.dispatcher().take();
    assert!(matches!(
        sent.as_slice(),
        [(0, WorkerRequest::Reprioritize { request_id, priority })]
            if *request_id == id && *priority == 0.8
    ));
    assert_eq!(s.request_chunk(key, 0.5), RequestOutcome::AlreadyPending);
    assert_eq!(s.pending_request(key).unwrap().priority, 0.8);
    assert!(s.dispatcher().take().is_empty());
}

#[test]
fn loaded_chunk_is_not_requested_again() {
    let mut s = scheduler(1, settings(100.0, 150.0, 4));
    let key = ChunkKey::new(0, 0);
    created(s.request_chunk(key, 1.0));
    s.admit_work();
    finish_all(&mut s);
    let before = s.record(key).unwrap().last_used;
    assert_eq!(s.request_chunk(key, 1.0), RequestOutcome::Refreshed);
    assert!(s.record(key).unwrap().last_used > before);
    assert!(!s.is_pending(key));
    assert!(s.dispatcher().take().is_empty());
}

#[test]
fn least_recently_used_chunks_unload_first() {
    let mut s = scheduler(1, settings(100.0, 150.0, 4));
    let keys = [ChunkKey::new(0, 0), ChunkKey::new(1, 0), ChunkKey::new(2, 0)];
    for (i, key) in keys.iter().enumerate() {
        created(s.request_chunk(*key, 1.0 - i as f32 * 0.1));
    }
    s.admit_work();
    finish_all(&mut s);
    assert_eq!(s.loaded_len(), 3);

    // touch the first chunk again so it becomes the most recently used
    assert_eq!(s.request_chunk(keys[0], 1.0), RequestOutcome::Refreshed);
    let mut by_use: Vec<(u64, ChunkKey)> =
        keys.iter().map(|k| (s.record(*k).unwrap().last_used, *k)).collect();
    by_use.sort();
    assert_eq!(by_use.last().unwrap().1, keys[0]);

    let (tx, rx) = unbounded();
    s.add_observer(tx);
    let report = s.reconcile(10_000.0, 10_000.0, 100.0, 150.0);
    assert_eq!(report.unloaded, 3);
    let unloaded: Vec<ChunkKey> = rx
        .try_iter()
        .filter_map(|e| match e {
            ChunkEvent::Unloaded { key } => Some(key),
            _ => None,
        })
        .collect();
    let expected: Vec<ChunkKey> = by_use.into_iter().map(|(_, k)| k).collect();
    assert_eq!(unloaded, expected);
}

#[test]
fn worker_error_frees_the_slot() {
    let mut s = scheduler(1, settings(100.0, 150.0, 1));
    let (tx, rx) = unbounded();
    s.add_observer(tx);
    let first = ChunkKey::new(0, 0);
    let second = ChunkKey::new(1, 0);
    s.request_chunk(first, 0.9);
    s.request_chunk(second, 0.1);
    s.admit_work();
    let job = s.dispatcher().take_jobs().remove(0);
    assert_eq!(job.key, first);

    assert!(s.handle_response(WorkerResponse::Error {
        request_id: job.request_id,
        worker: 0,
        key: first,
        generation: job.generation,
        message: "boom".into(),
    }));
    assert_eq!(s.state_of(first), ChunkState::Unloaded);
    assert_eq!(s.state_of(second), ChunkState::Assigned(0));
    assert_eq!(s.stats().failed, 1);
    let events: Vec<ChunkEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![ChunkEvent::Failed {
            key: first,
            request_id: job.request_id,
            message: "boom".into(),
        }]
    );
}

#[test]
fn hysteresis_band_keeps_but_does_not_request() {
    let key = ChunkKey::new(0, 0);
    let mut s = scheduler(2, settings(100.0, 150.0, 8));
    let (cx, cz) = s.context().grid().chunk_center(key);
    s.reconcile_around(cx, cz);
    finish_all(&mut s);
    assert!(s.is_loaded(key));

    let report = s.reconcile_around(cx - 120.0, cz);
    assert!(s.is_loaded(key));
    assert!(report.unloaded > 0);

    let mut fresh = scheduler(2, settings(100.0, 150.0, 8));
    fresh.reconcile_around(cx - 120.0, cz);
    assert_eq!(fresh.state_of(key), ChunkState::Unloaded);

    s.reconcile_around(cx - 151.0, cz);
    assert_eq!(s.state_of(key), ChunkState::Unloaded);
}

#[test]
fn moving_far_replaces_the_loaded_set() {
    let mut s = scheduler(3, settings(100.0, 150.0, 4));
    s.reconcile_around(0.0, 0.0);
    finish_all(&mut s);
    let grid = *s.context().grid();
    let near: Vec<ChunkKey> = grid.keys_within(0.0, 0.0, 100.0).into_iter().map(|(k, _)| k).collect();
    assert_eq!(s.loaded_len(), near.len());
    assert!(s.is_loaded(grid.chunk_key_for(0.0, 0.0)));

    let report = s.reconcile_around(500.0, 500.0);
    assert_eq!(report.unloaded, near.len());
    assert!(near.iter().all(|k| !s.is_loaded(*k) && !s.is_pending(*k)));
    let far: Vec<ChunkKey> = grid.keys_within(500.0, 500.0, 100.0).into_iter().map(|(k, _)| k).collect();
    assert_eq!(report.requested, far.len());
    assert!(far.iter().all(|k| s.is_pending(*k)));

    finish_all(&mut s);
    assert_eq!(s.loaded_len(), far.len());
    for key in s.loaded_keys() {
        assert!(grid.distance_to_center(key, 500.0, 500.0) <= 150.0);
    }
    assert_eq!(s.mesher().live(), far.len());
}

#[test]
fn inverted_distances_are_clamped() {
    let mut s = scheduler(1, settings(100.0, 40.0, 8));
    let key = ChunkKey::new(0, 0);
    let (cx, cz) = s.context().grid().chunk_center(key);
    s.reconcile_around(cx, cz);
    finish_all(&mut s);
    // 90 is inside the load distance, so the chunk must survive
    s.reconcile_around(cx - 90.0, cz);
    assert!(s.is_loaded(key));
}

#[test]
fn failed_handoff_is_retried() {
    let mesher = FlakyMesher {
        failures: 1,
        inner: NullMeshBuilder::default(),
    };
    let mut s = ChunkScheduler::new(
        context(42),
        RecordingDispatcher::new(1),
        mesher,
        settings(100.0, 150.0, 4),
    );
    let (tx, rx) = unbounded();
    s.add_observer(tx);
    let key = ChunkKey::new(3, 3);
    s.request_chunk(key, 1.0);
    s.admit_work();
    finish_all(&mut s);

    let rec = s.record(key).unwrap();
    assert!(rec.geometry.is_none());
    assert_eq!(rec.cells.as_ref().map(|c| c.len()), Some(64));

    assert_eq!(s.retry_mesh_handoffs(), 1);
    let rec = s.record(key).unwrap();
    assert!(rec.geometry.is_some());
    assert!(rec.cells.is_none());
    assert_eq!(s.retry_mesh_handoffs(), 0);

    let events: Vec<ChunkEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            ChunkEvent::Loaded { key, meshed: false },
            ChunkEvent::Meshed { key },
        ]
    );
}

#[test]
fn terrain_ready_fires_once_per_generation() {
    let mut s = scheduler(2, settings(60.0, 90.0, 4));
    let (tx, rx) = unbounded();
    s.add_observer(tx);
    assert!(!s.is_terrain_ready());
    s.reconcile_around(0.0, 0.0);
    assert!(!s.is_terrain_ready());
    finish_all(&mut s);
    assert!(s.is_terrain_ready());
    s.reconcile_around(10.0, 0.0);
    finish_all(&mut s);

    let ready = |events: &[ChunkEvent]| {
        events
            .iter()
            .filter_map(|e| match e {
                ChunkEvent::TerrainReady { generation } => Some(*generation),
                _ => None,
            })
            .collect::<Vec<u64>>()
    };
    let events: Vec<ChunkEvent> = rx.try_iter().collect();
    assert_eq!(ready(&events), vec![0]);

    let next = Arc::new(s.context().successor(&common::config(7)).unwrap());
    s.reconfigure(next);
    assert!(!s.is_terrain_ready());
    s.reconcile_around(0.0, 0.0);
    finish_all(&mut s);
    let events: Vec<ChunkEvent> = rx.try_iter().collect();
    assert_eq!(ready(&events), vec![1]);
}

#[test]
fn reconfigure_resets_everything() {
    let mut s = scheduler(2, settings(80.0, 120.0, 2));
    s.reconcile_around(0.0, 0.0);
    let ctx = Arc::clone(s.context());
    let first_jobs = s.dispatcher().take_jobs();
    assert_eq!(first_jobs.len(), 2);
    s.handle_response(generated(&ctx, &first_jobs[0]));
    let in_flight = s.dispatcher().take_jobs();
    assert!(s.loaded_len() == 1 && s.pending_len() > 0);

    let next = Arc::new(ctx.successor(&common::config(9)).unwrap());
    s.reconfigure(Arc::clone(&next));
    assert_eq!(s.loaded_len(), 0);
    assert_eq!(s.pending_len(), 0);
    assert_eq!(s.assigned_len(), 0);
    assert_eq!(s.context().generation(), 1);
    assert_eq!(s.mesher().live(), 0);

    let sent = s.dispatcher().take();
    let cancels = sent
        .iter()
        .filter(|(_, r)| matches!(r, WorkerRequest::Cancel { .. }))
        .count();
    let resets: Vec<usize> = sent
        .iter()
        .filter_map(|(w, r)| matches!(r, WorkerRequest::Reset(_)).then_some(*w))
        .collect();
    assert_eq!(cancels, 2);
    assert_eq!(resets, vec![0, 1]);

    // late results from the previous terrain never land
    assert!(!s.handle_response(generated(&ctx, &first_jobs[1])));
    assert!(!s.handle_response(generated(&ctx, &in_flight[0])));
    assert_eq!(s.loaded_len(), 0);
}

#[test]
fn non_finite_subject_is_ignored() {
    let mut s = scheduler(1, StreamSettings::default());
    let report = s.reconcile_around(f64::NAN, 0.0);
    assert_eq!(report, Default::default());
    assert_eq!(s.pending_len(), 0);
}
